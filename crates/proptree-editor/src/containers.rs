//! Structural container edits: add, clear, insert, delete, duplicate,
//! swap, and move.
//!
//! Arrays support every operation. Sets and maps support add, clear, and
//! delete; adding inserts the element type's default and fails when that
//! value (or key) is already present. An operation is checked against every
//! edited instance before any of them is changed.

use proptree_reflect::change::ChangeKind;
use proptree_reflect::schema::{FieldFlags, FieldId, FieldKind, Schema};
use proptree_reflect::store::InstanceStore;
use proptree_reflect::text::TextCodec;
use proptree_reflect::value::Value;

use crate::access::EditFlags;
use crate::node::NodeId;
use crate::notify::EditOp;
use crate::tree::PropertyTree;
use crate::AccessError;

/// A structural edit of one container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerOp {
    /// Append a default element.
    Add,
    Clear,
    /// Insert a default element before `index`.
    Insert(usize),
    Delete(usize),
    /// Insert a copy of the element at `index` next to it.
    Duplicate(usize),
    Swap(usize, usize),
    Move { from: usize, to: usize },
}

impl ContainerOp {
    pub fn change_kind(self) -> ChangeKind {
        match self {
            ContainerOp::Add => ChangeKind::ArrayAdd,
            ContainerOp::Clear => ChangeKind::ArrayClear,
            ContainerOp::Insert(_) => ChangeKind::ArrayInsert,
            ContainerOp::Delete(_) => ChangeKind::ArrayRemove,
            ContainerOp::Duplicate(_) => ChangeKind::Duplicate,
            ContainerOp::Swap(..) => ChangeKind::Swap,
            ContainerOp::Move { .. } => ChangeKind::ArrayMove,
        }
    }

    /// Element index reported with the change.
    pub fn index(self) -> Option<usize> {
        match self {
            ContainerOp::Add | ContainerOp::Clear => None,
            ContainerOp::Insert(i)
            | ContainerOp::Delete(i)
            | ContainerOp::Duplicate(i)
            | ContainerOp::Swap(i, _)
            | ContainerOp::Move { from: i, .. } => Some(i),
        }
    }

    /// Whether the element count changes.
    pub fn resizes(self) -> bool {
        !matches!(self, ContainerOp::Swap(..) | ContainerOp::Move { .. })
    }

    fn name(self) -> &'static str {
        match self {
            ContainerOp::Add => "add",
            ContainerOp::Clear => "clear",
            ContainerOp::Insert(_) => "insert",
            ContainerOp::Delete(_) => "delete",
            ContainerOp::Duplicate(_) => "duplicate",
            ContainerOp::Swap(..) => "swap",
            ContainerOp::Move { .. } => "move",
        }
    }
}

fn check_index(index: usize, len: usize) -> Result<(), AccessError> {
    if index < len {
        Ok(())
    } else {
        Err(AccessError::IndexOutOfRange { index, len })
    }
}

/// Apply `op` to a container value of field `field`.
pub fn apply_container_op(
    schema: &Schema,
    field: FieldId,
    value: &mut Value,
    op: ContainerOp,
) -> Result<(), AccessError> {
    let unsupported = |container: &'static str| AccessError::UnsupportedOperation {
        operation: op.name(),
        container,
    };
    match (schema.field(field).kind, value) {
        (FieldKind::Array { element }, Value::Array(items)) => match op {
            ContainerOp::Add => items.push(schema.default_element(element)),
            ContainerOp::Clear => items.clear(),
            ContainerOp::Insert(index) => {
                check_index(index, items.len() + 1)?;
                items.insert(index, schema.default_element(element));
            }
            ContainerOp::Delete(index) => {
                check_index(index, items.len())?;
                items.remove(index);
            }
            ContainerOp::Duplicate(index) => {
                check_index(index, items.len())?;
                let copy = items[index].clone();
                items.insert(index, copy);
            }
            ContainerOp::Swap(a, b) => {
                check_index(a, items.len())?;
                check_index(b, items.len())?;
                items.swap(a, b);
            }
            ContainerOp::Move { from, to } => {
                check_index(from, items.len())?;
                check_index(to, items.len())?;
                let moved = items.remove(from);
                items.insert(to, moved);
            }
        },
        (FieldKind::Set { element }, Value::Set(items)) => match op {
            ContainerOp::Add => {
                let fresh = schema.default_element(element);
                if items.iter().any(|v| *v == fresh) {
                    return Err(AccessError::DuplicateElement {
                        text: format!("{fresh:?}"),
                    });
                }
                items.insert(fresh);
            }
            ContainerOp::Clear => items.clear(),
            ContainerOp::Delete(index) => {
                let internal = items
                    .logical_to_internal(index)
                    .ok_or(AccessError::IndexOutOfRange { index, len: items.len() })?;
                items.remove(internal);
            }
            _ => return Err(unsupported("set")),
        },
        (FieldKind::Map { key, value: value_field }, Value::Map(pairs)) => match op {
            ContainerOp::Add => {
                let fresh = schema.default_element(key);
                if pairs.iter().any(|(k, _)| *k == fresh) {
                    return Err(AccessError::DuplicateElement {
                        text: format!("{fresh:?}"),
                    });
                }
                pairs.insert((fresh, schema.default_element(value_field)));
            }
            ContainerOp::Clear => pairs.clear(),
            ContainerOp::Delete(index) => {
                let internal = pairs
                    .logical_to_internal(index)
                    .ok_or(AccessError::IndexOutOfRange { index, len: pairs.len() })?;
                pairs.remove(internal);
            }
            _ => return Err(unsupported("map")),
        },
        (_, other) => {
            return Err(AccessError::TypeMismatch {
                expected: "container",
                found: other.kind_name(),
            })
        }
    }
    Ok(())
}

impl PropertyTree {
    /// Apply a structural edit to the container at `node` in every edited
    /// instance, then rebuild the node's children.
    pub fn container_op(
        &mut self,
        node: NodeId,
        op: ContainerOp,
        store: &mut InstanceStore,
    ) -> Result<(), AccessError> {
        let field = self.item_field(node)?;
        let desc = self.schema.field(field);
        if !desc.kind.is_container() || desc.is_static_array() {
            return Err(AccessError::TypeMismatch {
                expected: "container",
                found: "field",
            });
        }
        if op.resizes() && desc.flags.contains(FieldFlags::EDIT_FIXED_SIZE) {
            return Err(AccessError::FixedSize);
        }
        if self.is_edit_const(node, store) {
            return Err(AccessError::ReadOnly);
        }

        let locations = self.checked_locations(node, store)?;
        let mut updated = Vec::with_capacity(locations.len());
        for loc in &locations {
            let mut value = self
                .read_value(loc, store)
                .cloned()
                .ok_or(AccessError::NoLocation)?;
            apply_container_op(&self.schema, field, &mut value, op)
                .map_err(|e| self.describe_duplicate(e, field, store))?;
            updated.push(value);
        }

        tracing::debug!(node = ?node, op = ?op, "container edit");
        self.apply_edit(node, store, EditOp::Container(op), updated, EditFlags::empty())
    }

    /// Replace the debug text of a duplicate with the element's value text.
    fn describe_duplicate(&self, error: AccessError, field: FieldId, store: &InstanceStore) -> AccessError {
        let AccessError::DuplicateElement { .. } = error else {
            return error;
        };
        let element = match self.schema.field(field).kind {
            FieldKind::Map { key, .. } => key,
            FieldKind::Set { element } | FieldKind::Array { element } => element,
            _ => field,
        };
        let codec = TextCodec::new(&self.schema, store);
        AccessError::DuplicateElement {
            text: codec.export_element(element, &self.schema.default_element(element)),
        }
    }

    pub fn add_item(&mut self, node: NodeId, store: &mut InstanceStore) -> Result<(), AccessError> {
        self.container_op(node, ContainerOp::Add, store)
    }

    pub fn clear_items(&mut self, node: NodeId, store: &mut InstanceStore) -> Result<(), AccessError> {
        self.container_op(node, ContainerOp::Clear, store)
    }

    pub fn insert_item(
        &mut self,
        node: NodeId,
        index: usize,
        store: &mut InstanceStore,
    ) -> Result<(), AccessError> {
        self.container_op(node, ContainerOp::Insert(index), store)
    }

    pub fn delete_item(
        &mut self,
        node: NodeId,
        index: usize,
        store: &mut InstanceStore,
    ) -> Result<(), AccessError> {
        self.container_op(node, ContainerOp::Delete(index), store)
    }

    pub fn duplicate_item(
        &mut self,
        node: NodeId,
        index: usize,
        store: &mut InstanceStore,
    ) -> Result<(), AccessError> {
        self.container_op(node, ContainerOp::Duplicate(index), store)
    }

    pub fn swap_items(
        &mut self,
        node: NodeId,
        a: usize,
        b: usize,
        store: &mut InstanceStore,
    ) -> Result<(), AccessError> {
        self.container_op(node, ContainerOp::Swap(a, b), store)
    }

    pub fn move_item(
        &mut self,
        node: NodeId,
        from: usize,
        to: usize,
        store: &mut InstanceStore,
    ) -> Result<(), AccessError> {
        self.container_op(node, ContainerOp::Move { from, to }, store)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use proptree_reflect::schema::{FieldSpec, SchemaBuilder};

    fn schema() -> (Schema, FieldId, FieldId, FieldId) {
        let mut b = SchemaBuilder::new();
        let bag = b
            .object("Bag", None)
            .field("Items", FieldSpec::array(FieldSpec::Int))
            .field("Tags", FieldSpec::set(FieldSpec::Int))
            .field("Lookup", FieldSpec::map(FieldSpec::Name, FieldSpec::Int))
            .finish()
            .unwrap();
        let (schema, _) = b.build();
        let items = schema.find_field(bag, "Items").unwrap();
        let tags = schema.find_field(bag, "Tags").unwrap();
        let lookup = schema.find_field(bag, "Lookup").unwrap();
        (schema, items, tags, lookup)
    }

    fn ints(values: &[i64]) -> Value {
        Value::Array(values.iter().copied().map(Value::Int).collect())
    }

    #[test]
    fn array_operations() {
        let (schema, items, _, _) = schema();
        let mut v = ints(&[1, 2, 3]);

        apply_container_op(&schema, items, &mut v, ContainerOp::Insert(1)).unwrap();
        assert_eq!(v, ints(&[1, 0, 2, 3]));
        apply_container_op(&schema, items, &mut v, ContainerOp::Duplicate(3)).unwrap();
        assert_eq!(v, ints(&[1, 0, 2, 3, 3]));
        apply_container_op(&schema, items, &mut v, ContainerOp::Move { from: 0, to: 4 }).unwrap();
        assert_eq!(v, ints(&[0, 2, 3, 3, 1]));
        apply_container_op(&schema, items, &mut v, ContainerOp::Swap(0, 1)).unwrap();
        assert_eq!(v, ints(&[2, 0, 3, 3, 1]));
        apply_container_op(&schema, items, &mut v, ContainerOp::Delete(2)).unwrap();
        assert_eq!(v, ints(&[2, 0, 3, 1]));
        apply_container_op(&schema, items, &mut v, ContainerOp::Add).unwrap();
        assert_eq!(v, ints(&[2, 0, 3, 1, 0]));
        apply_container_op(&schema, items, &mut v, ContainerOp::Clear).unwrap();
        assert_eq!(v, ints(&[]));
    }

    #[test]
    fn out_of_range_indices_fail() {
        let (schema, items, _, _) = schema();
        let mut v = ints(&[1]);
        assert_eq!(
            apply_container_op(&schema, items, &mut v, ContainerOp::Delete(1)),
            Err(AccessError::IndexOutOfRange { index: 1, len: 1 })
        );
        assert!(apply_container_op(&schema, items, &mut v, ContainerOp::Insert(1)).is_ok());
        assert!(apply_container_op(&schema, items, &mut v, ContainerOp::Insert(5)).is_err());
    }

    #[test]
    fn sets_reject_duplicate_defaults() {
        let (schema, _, tags, _) = schema();
        let mut v = Value::Set(Default::default());
        apply_container_op(&schema, tags, &mut v, ContainerOp::Add).unwrap();
        assert!(matches!(
            apply_container_op(&schema, tags, &mut v, ContainerOp::Add),
            Err(AccessError::DuplicateElement { .. })
        ));
        assert!(matches!(
            apply_container_op(&schema, tags, &mut v, ContainerOp::Swap(0, 0)),
            Err(AccessError::UnsupportedOperation { operation: "swap", container: "set" })
        ));
        apply_container_op(&schema, tags, &mut v, ContainerOp::Delete(0)).unwrap();
        assert_eq!(v.container_len(), Some(0));
    }

    #[test]
    fn maps_add_default_pairs() {
        let (schema, _, _, lookup) = schema();
        let mut v = Value::Map(Default::default());
        apply_container_op(&schema, lookup, &mut v, ContainerOp::Add).unwrap();
        match &v {
            Value::Map(pairs) => {
                assert_eq!(pairs.iter().next(), Some(&(Value::Name(String::new()), Value::Int(0))))
            }
            other => panic!("expected map, got {other:?}"),
        }
        assert!(apply_container_op(&schema, lookup, &mut v, ContainerOp::Add).is_err());
    }

    #[test]
    fn operation_metadata() {
        assert_eq!(ContainerOp::Insert(2).change_kind(), ChangeKind::ArrayInsert);
        assert_eq!(ContainerOp::Insert(2).index(), Some(2));
        assert_eq!(ContainerOp::Clear.index(), None);
        assert!(!ContainerOp::Swap(0, 1).resizes());
    }
}
