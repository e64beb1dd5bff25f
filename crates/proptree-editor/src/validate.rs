//! Reconciling the tree with data changed behind its back.
//!
//! [`ensure_data_is_valid`](PropertyTree::ensure_data_is_valid) walks the
//! built part of the tree top-down, repairs every stale node it finds and
//! reports the first one:
//!
//! - a node rebuilt outside validation reports `ChildrenRebuilt` once
//! - a dead or retired edited instance reports `ObjectInvalid` until
//!   [`purge_invalid_instances`](PropertyTree::purge_invalid_instances)
//! - a container whose size changed in every instance alike is rebuilt and
//!   reports `ArraySizeChanged`; instances disagreeing on the size leave
//!   the node untouched
//! - an edit-inline reference pointing somewhere new is rebuilt and reports
//!   `EditInlineValueChanged`
//!
//! Repairs made here do not flag the node, so calling validation again
//! right after a repair returns `Valid`.

use proptree_reflect::schema::{FieldId, FieldKind};
use proptree_reflect::store::InstanceStore;

use crate::node::{NodeFlags, NodeId, NodeKind, PropertyNode};
use crate::tree::PropertyTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationResult {
    Valid,
    ChildrenRebuilt,
    ArraySizeChanged,
    ObjectInvalid,
    EditInlineValueChanged,
}

impl PropertyTree {
    /// Check the tree against current data, repairing what can be repaired.
    pub fn ensure_data_is_valid(&mut self, store: &InstanceStore) -> ValidationResult {
        let result = self.validate_node(self.root, store);
        if result != ValidationResult::Valid {
            tracing::debug!(result = ?result, "validation repaired the tree");
        }
        result
    }

    fn validate_node(&mut self, id: NodeId, store: &InstanceStore) -> ValidationResult {
        let is_root = id == self.root;
        let Some(node) = self.arena.get_mut(id) else {
            return ValidationResult::Valid;
        };
        if node.children_rebuilt {
            node.children_rebuilt = false;
            return ValidationResult::ChildrenRebuilt;
        }
        if is_root || node.has_flags(NodeFlags::REQUIRES_VALIDATION) {
            node.invalidate_caches();
        }

        let kind = node.kind.clone();
        match &kind {
            NodeKind::Instance(set) => {
                let invalid = set.live().any(|i| {
                    !store.is_alive(i) || store.type_of(i).is_some_and(|t| store.is_type_retired(t))
                });
                if invalid {
                    return ValidationResult::ObjectInvalid;
                }
            }
            NodeKind::Item { field } => {
                if let Some(result) = self.validate_item(id, *field, store) {
                    return result;
                }
            }
            NodeKind::Category { .. } | NodeKind::Standalone { .. } => {}
        }

        let requested = self.arena.get_mut(id).is_some_and(|n| std::mem::take(&mut n.rebuild_requested));
        if requested {
            self.rebuild_internal(id, store);
            return ValidationResult::ChildrenRebuilt;
        }

        let Some(node) = self.arena.get(id) else {
            return ValidationResult::Valid;
        };
        if node.has_flags(NodeFlags::SKIP_CHILD_VALIDATION) {
            return ValidationResult::Valid;
        }
        let mut next: Vec<NodeId> = node
            .children
            .iter()
            .copied()
            .filter(|c| self.needs_validation(*c))
            .collect();
        if let Some(key) = node.key_node.filter(|k| self.needs_validation(*k)) {
            next.push(key);
        }
        let mut first = ValidationResult::Valid;
        for child in next {
            let result = self.validate_node(child, store);
            if first == ValidationResult::Valid {
                first = result;
            }
        }
        first
    }

    /// Scalar leaves can never go stale.
    fn needs_validation(&self, id: NodeId) -> bool {
        let Some(node) = self.arena.get(id) else {
            return false;
        };
        match node.kind {
            NodeKind::Item { field } => {
                let desc = self.schema.field(field);
                !matches!(desc.kind, FieldKind::Scalar(_))
                    || (desc.is_static_array() && node.array_index.is_none())
                    || node.children_rebuilt
                    || node.rebuild_requested
            }
            _ => true,
        }
    }

    /// Container size and edit-inline checks for an item node. `None` when
    /// the node is fine.
    fn validate_item(&mut self, id: NodeId, field: FieldId, store: &InstanceStore) -> Option<ValidationResult> {
        if !self.arena.get(id)?.has_flags(NodeFlags::REQUIRES_VALIDATION) {
            return None;
        }
        if self.lost_location(id, store) {
            return Some(ValidationResult::ObjectInvalid);
        }
        let node = self.arena.get(id)?;
        if !node.children_built {
            return None;
        }
        let desc = self.schema.field(field);
        let is_header = desc.is_static_array() && node.array_index.is_none();
        let is_container = desc.kind.is_container() && !is_header;
        let is_inline = desc.kind.is_object() && node.has_flags(NodeFlags::EDIT_INLINE) && !is_header;
        let child_count = node.children.len();
        let shown = node
            .children
            .first()
            .and_then(|c| self.arena.get(*c))
            .and_then(PropertyNode::instance_set)
            .map(|set| set.instances.clone())
            .unwrap_or_default();

        if is_container {
            let Some(len) = self.consistent_len(id, store) else {
                if let Some(node) = self.arena.get_mut(id) {
                    node.flags.insert(NodeFlags::SKIP_CHILD_VALIDATION);
                }
                return None;
            };
            if len != child_count {
                tracing::debug!(node = ?id, from = child_count, to = len, "container size changed");
                self.rebuild_internal(id, store);
                if len > child_count {
                    self.auto_expand_last(id, store);
                }
                return Some(ValidationResult::ArraySizeChanged);
            }
        }

        if is_inline {
            let current = self.object_refs(id, store);
            let changed = if shown.is_empty() {
                current.iter().any(Option::is_some)
            } else {
                shown != current
            };
            if changed {
                tracing::debug!(node = ?id, "edit-inline reference changed");
                self.rebuild_internal(id, store);
                return Some(ValidationResult::EditInlineValueChanged);
            }
        }
        None
    }

    /// A slot whose instance is alive but whose value no longer resolves.
    fn lost_location(&self, id: NodeId, store: &InstanceStore) -> bool {
        let Some(owner) = self.owning_instance_node(id) else {
            return false;
        };
        let Some(set) = self.arena.get(owner).and_then(PropertyNode::instance_set) else {
            return false;
        };
        self.locations(id, store)
            .iter()
            .zip(&set.instances)
            .any(|(loc, instance)| loc.is_none() && instance.is_some_and(|i| store.is_alive(i)))
    }

    fn auto_expand_last(&mut self, id: NodeId, store: &InstanceStore) {
        let Some(last) = self.children(id).last().copied() else {
            return;
        };
        let count = self.ensure_children(last, store).len();
        if count > 0 && count < self.config.auto_expand_child_limit {
            self.set_expanded(last, true, store);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
