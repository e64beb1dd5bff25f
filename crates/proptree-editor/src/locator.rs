//! Resolving nodes to value locations.
//!
//! Each node resolves to one [`ValueLocation`] per editing slot (one slot
//! per edited instance). Resolution walks up to the nearest value-bearing
//! ancestor and appends a step:
//!
//! - item under an instance node: `Field(offset)` from the instance root, or
//!   from the sparse block of the declaring type for sparse fields
//! - static-array slot under its header: `Slot(i)`
//! - member under a struct item: `Field(offset)`
//! - element under a container: `Element(i)`, `SetSlot(..)`, `MapKey(..)` or
//!   `MapValue(..)`, translating logical indices to internal slots
//!
//! Results are cached per node until the next validation or structural
//! edit. Container bounds are checked when the location is applied, so a
//! cached element location past the end simply reads as `None`.

use proptree_reflect::location::{value_at, value_at_mut, LocationRoot, PathStep, ValueLocation};
use proptree_reflect::schema::FieldKind;
use proptree_reflect::store::InstanceStore;
use proptree_reflect::value::Value;

use crate::node::{NodeFlags, NodeId, NodeKind};
use crate::tree::PropertyTree;

impl PropertyTree {
    /// Number of editing slots for `id`: the instance count of its owning
    /// instance node, or one for standalone trees.
    pub fn slot_count(&self, id: NodeId) -> usize {
        let mut current = Some(id);
        while let Some(node_id) = current {
            let Some(node) = self.arena.get(node_id) else {
                return 0;
            };
            match &node.kind {
                NodeKind::Instance(set) => return set.instances.len(),
                NodeKind::Standalone { .. } => return 1,
                _ => current = node.parent,
            }
        }
        0
    }

    /// Nearest ancestor that is not a category.
    pub(crate) fn value_parent(&self, id: NodeId) -> Option<NodeId> {
        let mut current = self.arena.get(id)?.parent;
        while let Some(parent) = current {
            let node = self.arena.get(parent)?;
            if !node.is_category() {
                return Some(parent);
            }
            current = node.parent;
        }
        None
    }

    /// Nearest instance node at or above `id`.
    pub(crate) fn owning_instance_node(&self, id: NodeId) -> Option<NodeId> {
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = self.arena.get(node_id)?;
            if matches!(node.kind, NodeKind::Instance(_)) {
                return Some(node_id);
            }
            current = node.parent;
        }
        None
    }

    /// Location of `id` for every slot, `None` where it does not resolve.
    pub fn locations(&self, id: NodeId, store: &InstanceStore) -> Vec<Option<ValueLocation>> {
        let Some(node) = self.arena.get(id) else {
            return Vec::new();
        };
        if let Some(cached) = node.cached_locations.borrow().as_ref() {
            return cached.clone();
        }
        let resolved: Vec<Option<ValueLocation>> = (0..self.slot_count(id))
            .map(|slot| self.resolve(id, slot, store))
            .collect();
        node.cached_locations.replace(Some(resolved.clone()));
        resolved
    }

    /// Location of `id` in one slot.
    pub fn location(&self, id: NodeId, slot: usize, store: &InstanceStore) -> Option<ValueLocation> {
        self.locations(id, store).into_iter().nth(slot).flatten()
    }

    /// The location shared by every slot, when all slots resolve to the
    /// same path shape.
    pub fn shared_location(&self, id: NodeId, store: &InstanceStore) -> Option<ValueLocation> {
        let locations = self.locations(id, store);
        let (first, rest) = locations.split_first()?;
        let first = first.as_ref()?;
        rest.iter()
            .all(|l| l.as_ref().is_some_and(|l| l.same_shape(first)))
            .then(|| first.clone())
    }

    fn resolve(&self, id: NodeId, slot: usize, store: &InstanceStore) -> Option<ValueLocation> {
        let node = self.arena.get(id)?;
        let field = match node.kind {
            NodeKind::Item { field } => field,
            NodeKind::Standalone { .. } => return Some(ValueLocation::new(LocationRoot::Standalone)),
            NodeKind::Instance(_) | NodeKind::Category { .. } => return None,
        };
        let desc = self.schema.field(field);
        let parent_id = self.value_parent(id)?;
        let parent = self.arena.get(parent_id)?;

        match &parent.kind {
            NodeKind::Instance(set) => {
                let instance = (*set.instances.get(slot)?)?;
                let ty = store.type_of(instance)?;
                if !self.schema.is_child_of(ty, desc.declaring_type) {
                    return None;
                }
                let root = if desc.is_sparse() {
                    LocationRoot::Sparse {
                        owner: instance,
                        block: desc.declaring_type,
                    }
                } else {
                    LocationRoot::Instance(instance)
                };
                Some(ValueLocation::new(root).child(PathStep::Field(desc.offset)))
            }
            NodeKind::Standalone { .. } => {
                Some(ValueLocation::new(LocationRoot::Standalone).child(PathStep::Field(desc.offset)))
            }
            NodeKind::Category { .. } => None,
            NodeKind::Item { field: parent_field } => {
                let parent_loc = self.location(parent_id, slot, store)?;
                let parent_desc = self.schema.field(*parent_field);

                if *parent_field == field && parent.array_index.is_none() && parent_desc.is_static_array() {
                    let index = node.array_index?;
                    return (index < parent_desc.static_arity)
                        .then(|| parent_loc.child(PathStep::Slot(index)));
                }

                match parent_desc.kind {
                    FieldKind::Struct(_) => Some(parent_loc.child(PathStep::Field(desc.offset))),
                    FieldKind::Array { .. } => {
                        let index = node.array_index?;
                        let len = self.read_value(&parent_loc, store)?.container_len()?;
                        (index < len).then(|| parent_loc.child(PathStep::Element(index)))
                    }
                    FieldKind::Set { .. } => {
                        let Value::Set(items) = self.read_value(&parent_loc, store)? else {
                            return None;
                        };
                        let internal = items.logical_to_internal(node.array_index?)?;
                        Some(parent_loc.child(PathStep::SetSlot(internal)))
                    }
                    FieldKind::Map { .. } => {
                        let Value::Map(pairs) = self.read_value(&parent_loc, store)? else {
                            return None;
                        };
                        let internal = pairs.logical_to_internal(node.array_index?)?;
                        Some(parent_loc.child(if node.has_flags(NodeFlags::MAP_KEY) {
                            PathStep::MapKey(internal)
                        } else {
                            PathStep::MapValue(internal)
                        }))
                    }
                    FieldKind::Scalar(_) | FieldKind::ObjectReference { .. } => None,
                }
            }
        }
    }

    // -- value access -------------------------------------------------------

    /// Read the value at a location, from the store or from the tree's own
    /// standalone value.
    pub fn read_value<'a>(&'a self, loc: &ValueLocation, store: &'a InstanceStore) -> Option<&'a Value> {
        match loc.root {
            LocationRoot::Standalone => value_at(self.standalone.as_ref()?, &loc.steps),
            _ => store.value(loc),
        }
    }

    pub(crate) fn value_mut<'a>(
        &'a mut self,
        loc: &ValueLocation,
        store: &'a mut InstanceStore,
    ) -> Option<&'a mut Value> {
        match loc.root {
            LocationRoot::Standalone => value_at_mut(self.standalone.as_mut()?, &loc.steps),
            _ => store.value_mut(loc),
        }
    }

    /// Values of `id` per slot.
    pub(crate) fn read_all<'a>(&'a self, id: NodeId, store: &'a InstanceStore) -> Vec<Option<&'a Value>> {
        self.locations(id, store)
            .into_iter()
            .map(|loc| loc.and_then(|l| self.read_value(&l, store)))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
