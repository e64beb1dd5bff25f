//! Comparing values against their defaults.
//!
//! The reference value of a node depends on where its value lives:
//!
//! | root       | reference                                              |
//! |------------|--------------------------------------------------------|
//! | instance   | same path in the archetype, or the field default      |
//! | sparse     | same path in the type's default sparse block           |
//! | standalone | the field default                                      |
//!
//! Results are cached per node until a write under the node or the next
//! validation.

use proptree_reflect::location::{value_at, LocationRoot, ValueLocation};
use proptree_reflect::schema::FieldId;
use proptree_reflect::store::InstanceStore;
use proptree_reflect::value::Value;

use crate::access::EditFlags;
use crate::node::NodeId;
use crate::tree::PropertyTree;
use crate::AccessError;

impl PropertyTree {
    /// Whether any slot of `node` differs from its reference value.
    pub fn differs_from_default(&self, node: NodeId, store: &InstanceStore) -> bool {
        let Some(n) = self.arena.get(node) else {
            return false;
        };
        if let Some(cached) = n.diff_cache.get() {
            return cached;
        }
        let differs = self.compute_differs(node, store);
        n.diff_cache.set(Some(differs));
        differs
    }

    fn compute_differs(&self, node: NodeId, store: &InstanceStore) -> bool {
        let Ok(field) = self.item_field(node) else {
            return false;
        };
        let deep = self.schema.may_contain_instanced(field);
        for loc in self.locations(node, store).iter().flatten() {
            let Some(current) = self.read_value(loc, store) else {
                continue;
            };
            match self.reference_value(node, field, loc, store) {
                Some(reference) if store.values_identical(current, &reference, deep) => {}
                _ => return true,
            }
        }
        false
    }

    /// What `node` at `loc` would hold if never edited.
    pub(crate) fn reference_value(
        &self,
        node: NodeId,
        field: FieldId,
        loc: &ValueLocation,
        store: &InstanceStore,
    ) -> Option<Value> {
        let is_slot = self.arena.get(node)?.array_index.is_some();
        let field_default = || {
            if is_slot {
                self.schema.default_element(field)
            } else {
                self.schema.default_value(field)
            }
        };
        match loc.root {
            LocationRoot::Instance(id) => match store.archetype_of(id) {
                Some(archetype) => store.value(&loc.rerooted(archetype)?).cloned(),
                None => Some(field_default()),
            },
            LocationRoot::Sparse { block, .. } => {
                value_at(self.schema.sparse_default(block), &loc.steps).cloned()
            }
            LocationRoot::Standalone => Some(field_default()),
        }
    }

    /// Text of the reference value shared by every slot.
    pub fn default_value_as_text(&self, node: NodeId, store: &InstanceStore) -> Result<String, AccessError> {
        let field = self.item_field(node)?;
        let mut texts = self
            .checked_locations(node, store)?
            .iter()
            .map(|loc| {
                self.reference_value(node, field, loc, store)
                    .map(|v| self.export_text(field, &v, store))
                    .ok_or(AccessError::NoLocation)
            })
            .collect::<Result<Vec<_>, _>>()?
            .into_iter();
        let first = texts.next().ok_or(AccessError::NoLocation)?;
        if texts.any(|t| t != first) {
            return Err(AccessError::MultipleValues);
        }
        Ok(first)
    }

    /// Write each slot's reference value back.
    pub fn reset_to_default(&mut self, node: NodeId, store: &mut InstanceStore) -> Result<(), AccessError> {
        let field = self.item_field(node)?;
        let values = self
            .checked_locations(node, store)?
            .iter()
            .map(|loc| self.reference_value(node, field, loc, store).ok_or(AccessError::NoLocation))
            .collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(node = ?node, path = %self.property_path(node), "reset to default");
        self.write_values(node, values, store, EditFlags::empty())
    }

    /// Forget every cached comparison result.
    pub fn invalidate_diff_caches(&self) {
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.arena.get(id) else {
                continue;
            };
            node.diff_cache.set(None);
            stack.extend(node.children.iter().copied());
            stack.extend(node.key_node);
        }
    }
}
