//! Reading and writing node values.
//!
//! Reads come back per slot ([`values`](PropertyTree::values)) or as one
//! value shared by every slot ([`value`](PropertyTree::value), which fails
//! with [`AccessError::MultipleValues`] when the edited instances
//! disagree). Writes parse and type-check first, then run the change
//! protocol in [`notify`](crate::notify), so a rejected write never fires
//! a notification.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use proptree_editor::prelude::*;
//!
//! let mut builder = SchemaBuilder::new();
//! let light = builder
//!     .object("Light", None)
//!     .field("Intensity", FieldSpec::Float)
//!     .meta(keys::CLAMP_MIN, "0")
//!     .meta(keys::CLAMP_MAX, "10")
//!     .finish()
//!     .unwrap();
//! let (schema, metadata) = builder.build();
//! let mut store = InstanceStore::new(Arc::new(schema));
//! let lamp = store.spawn(light, "Lamp").unwrap();
//!
//! let mut tree = PropertyTree::for_instances(&store, &[lamp], Arc::new(metadata), TreeConfig::default());
//! let intensity = tree.find_by_path("Intensity", &store).unwrap();
//! tree.set_float(intensity, 42.0, &mut store).unwrap();
//! assert_eq!(tree.get_float(intensity, &store).unwrap(), 10.0);
//! ```

use bitflags::bitflags;
use proptree_reflect::instance::InstanceId;
use proptree_reflect::location::ValueLocation;
use proptree_reflect::schema::{FieldFlags, FieldId, FieldKind, ScalarKind};
use proptree_reflect::store::InstanceStore;
use proptree_reflect::text::TextCodec;
use proptree_reflect::value::Value;

use crate::node::{NodeFlags, NodeId, NodeKind, PropertyNode};
use crate::notify::EditOp;
use crate::tree::PropertyTree;
use crate::AccessError;

bitflags! {
    /// Options for a single write.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EditFlags: u8 {
        /// Part of a continuous edit such as a slider drag. Post-change is
        /// deferred until the edit moves to another node or
        /// `finish_interactive_change` is called.
        const INTERACTIVE = 1 << 0;
        /// Do not push the edit to derived instances.
        const NO_PROPAGATION = 1 << 1;
    }
}

/// Short label of the value a field slot holds.
fn kind_label(kind: &FieldKind) -> &'static str {
    match kind {
        FieldKind::Scalar(ScalarKind::Bool) => "bool",
        FieldKind::Scalar(ScalarKind::Int) => "int",
        FieldKind::Scalar(ScalarKind::Float) => "float",
        FieldKind::Scalar(ScalarKind::Str) => "string",
        FieldKind::Scalar(ScalarKind::Name) => "name",
        FieldKind::Scalar(ScalarKind::Enum(_)) => "enum",
        FieldKind::Struct(_) => "struct",
        FieldKind::Array { .. } => "array",
        FieldKind::Set { .. } => "set",
        FieldKind::Map { .. } => "map",
        FieldKind::ObjectReference { .. } => "object reference",
    }
}

impl PropertyTree {
    // -- resolution ---------------------------------------------------------

    /// Field descriptor of an item node.
    pub(crate) fn item_field(&self, node: NodeId) -> Result<FieldId, AccessError> {
        match self.arena.get(node).ok_or(AccessError::StaleNode)?.kind {
            NodeKind::Item { field } => Ok(field),
            _ => Err(AccessError::NoLocation),
        }
    }

    /// Locations of every slot, failing if any edited instance has died or
    /// any slot does not resolve.
    pub(crate) fn checked_locations(
        &self,
        node: NodeId,
        store: &InstanceStore,
    ) -> Result<Vec<ValueLocation>, AccessError> {
        if !self.arena.contains(node) {
            return Err(AccessError::StaleNode);
        }
        let owner_set = self
            .owning_instance_node(node)
            .and_then(|owner| self.arena.get(owner))
            .and_then(PropertyNode::instance_set);
        if let Some(set) = owner_set {
            let invalid = set.live().any(|i| {
                !store.is_alive(i) || store.type_of(i).is_some_and(|t| store.is_type_retired(t))
            });
            if invalid {
                return Err(AccessError::ObjectInvalid);
            }
        }
        let locations = self.locations(node, store);
        if locations.is_empty() {
            return Err(AccessError::NoLocation);
        }
        locations
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or(AccessError::NoLocation)
    }

    pub(crate) fn export_text(&self, field: FieldId, value: &Value, store: &InstanceStore) -> String {
        TextCodec::new(&self.schema, store).export(field, value)
    }

    fn import_text(
        &self,
        node: NodeId,
        field: FieldId,
        text: &str,
        store: &InstanceStore,
    ) -> Result<Value, AccessError> {
        let codec = TextCodec::new(&self.schema, store);
        let is_slot = self.arena.get(node).is_some_and(|n| n.array_index.is_some());
        let value = if is_slot {
            codec.import_element(field, text)?
        } else {
            codec.import(field, text)?
        };
        Ok(value)
    }

    // -- reads --------------------------------------------------------------

    /// Value of `node` in every slot.
    pub fn values(&self, node: NodeId, store: &InstanceStore) -> Result<Vec<Value>, AccessError> {
        self.checked_locations(node, store)?
            .iter()
            .map(|loc| self.read_value(loc, store).cloned().ok_or(AccessError::NoLocation))
            .collect()
    }

    /// The value every slot shares.
    pub fn value(&self, node: NodeId, store: &InstanceStore) -> Result<Value, AccessError> {
        let mut values = self.values(node, store)?.into_iter();
        let first = values.next().ok_or(AccessError::NoLocation)?;
        if values.any(|v| v != first) {
            return Err(AccessError::MultipleValues);
        }
        Ok(first)
    }

    /// Text of `node` in every slot.
    pub fn values_as_text(&self, node: NodeId, store: &InstanceStore) -> Result<Vec<String>, AccessError> {
        let field = self.item_field(node)?;
        Ok(self
            .values(node, store)?
            .iter()
            .map(|v| self.export_text(field, v, store))
            .collect())
    }

    /// Text every slot shares.
    pub fn value_as_text(&self, node: NodeId, store: &InstanceStore) -> Result<String, AccessError> {
        let mut texts = self.values_as_text(node, store)?.into_iter();
        let first = texts.next().ok_or(AccessError::NoLocation)?;
        if texts.any(|t| t != first) {
            return Err(AccessError::MultipleValues);
        }
        Ok(first)
    }

    /// Like [`value_as_text`](Self::value_as_text), with enums shown by
    /// display name. The result is not meant to be imported.
    pub fn value_as_display_text(&self, node: NodeId, store: &InstanceStore) -> Result<String, AccessError> {
        let field = self.item_field(node)?;
        let value = self.value(node, store)?;
        Ok(TextCodec::new(&self.schema, store)
            .with_display_names(&self.metadata)
            .export(field, &value))
    }

    // -- writes -------------------------------------------------------------

    /// Parse `text` and write it to every slot.
    pub fn set_value_from_text(
        &mut self,
        node: NodeId,
        text: &str,
        store: &mut InstanceStore,
        flags: EditFlags,
    ) -> Result<(), AccessError> {
        let field = self.item_field(node)?;
        let value = self.import_text(node, field, text, store)?;
        let values = vec![value; self.slot_count(node)];
        self.write_values(node, values, store, flags)
    }

    /// Parse one text per slot and write them.
    pub fn set_values_from_text<S: AsRef<str>>(
        &mut self,
        node: NodeId,
        texts: &[S],
        store: &mut InstanceStore,
        flags: EditFlags,
    ) -> Result<(), AccessError> {
        let field = self.item_field(node)?;
        let expected = self.slot_count(node);
        if texts.len() != expected {
            return Err(AccessError::InstanceCountMismatch {
                expected,
                found: texts.len(),
            });
        }
        let values = texts
            .iter()
            .map(|t| self.import_text(node, field, t.as_ref(), store))
            .collect::<Result<Vec<_>, _>>()?;
        self.write_values(node, values, store, flags)
    }

    /// Write `value` to every slot.
    pub fn set_value(
        &mut self,
        node: NodeId,
        value: Value,
        store: &mut InstanceStore,
        flags: EditFlags,
    ) -> Result<(), AccessError> {
        self.item_field(node)?;
        let values = vec![value; self.slot_count(node)];
        self.write_values(node, values, store, flags)
    }

    pub(crate) fn write_values(
        &mut self,
        node: NodeId,
        values: Vec<Value>,
        store: &mut InstanceStore,
        flags: EditFlags,
    ) -> Result<(), AccessError> {
        let field = self.item_field(node)?;
        if self.is_edit_const(node, store) {
            return Err(AccessError::ReadOnly);
        }
        for value in &values {
            self.check_value(node, field, value, store)?;
        }
        tracing::debug!(node = ?node, path = %self.property_path(node), "set value");
        self.apply_edit(node, store, EditOp::Set, values, flags)
    }

    fn check_value(
        &self,
        node: NodeId,
        field: FieldId,
        value: &Value,
        store: &InstanceStore,
    ) -> Result<(), AccessError> {
        let n = self.arena.get(node).ok_or(AccessError::StaleNode)?;
        let desc = self.schema.field(field);
        let conforms = if n.array_index.is_some() {
            self.schema.conforms_element(field, value)
        } else {
            self.schema.conforms(field, value)
        };
        if !conforms {
            return Err(AccessError::TypeMismatch {
                expected: kind_label(&desc.kind),
                found: value.kind_name(),
            });
        }

        if let (FieldKind::ObjectReference { class }, Value::Object(reference)) = (desc.kind, value) {
            let flags_field = self.meta_field(node).unwrap_or(field);
            match reference {
                None if self.schema.field(flags_field).flags.contains(FieldFlags::NO_CLEAR) => {
                    return Err(AccessError::NotClearable)
                }
                None => {}
                Some(target) => {
                    let ty = store.type_of(*target).ok_or(AccessError::ObjectInvalid)?;
                    if !self.schema.is_child_of(ty, class) {
                        return Err(AccessError::WrongClass {
                            expected: self.schema.type_desc(class).name.clone(),
                            found: self.schema.type_desc(ty).name.clone(),
                        });
                    }
                }
            }
        }

        let Some(index) = n.array_index else {
            return Ok(());
        };
        let is_key = n.has_flags(NodeFlags::MAP_KEY);
        let Some(parent) = self.value_parent(node) else {
            return Ok(());
        };
        for container in self.read_all(parent, store).into_iter().flatten() {
            let clash = match container {
                Value::Set(items) => items.iter().enumerate().any(|(i, item)| i != index && item == value),
                Value::Map(pairs) if is_key => {
                    pairs.iter().enumerate().any(|(i, (key, _))| i != index && key == value)
                }
                _ => false,
            };
            if clash {
                return Err(AccessError::DuplicateElement {
                    text: self.export_text(field, value, store),
                });
            }
        }
        Ok(())
    }

    // -- typed access -------------------------------------------------------

    pub fn get_bool(&self, node: NodeId, store: &InstanceStore) -> Result<bool, AccessError> {
        let value = self.value(node, store)?;
        value.as_bool().ok_or(AccessError::TypeMismatch {
            expected: "bool",
            found: value.kind_name(),
        })
    }

    /// Integer or enum value.
    pub fn get_int(&self, node: NodeId, store: &InstanceStore) -> Result<i64, AccessError> {
        let value = self.value(node, store)?;
        value.as_int().ok_or(AccessError::TypeMismatch {
            expected: "int",
            found: value.kind_name(),
        })
    }

    pub fn get_float(&self, node: NodeId, store: &InstanceStore) -> Result<f64, AccessError> {
        let value = self.value(node, store)?;
        value.as_float().ok_or(AccessError::TypeMismatch {
            expected: "float",
            found: value.kind_name(),
        })
    }

    /// String or name value.
    pub fn get_string(&self, node: NodeId, store: &InstanceStore) -> Result<String, AccessError> {
        let value = self.value(node, store)?;
        value.as_str().map(str::to_owned).ok_or(AccessError::TypeMismatch {
            expected: "string",
            found: value.kind_name(),
        })
    }

    pub fn get_object(&self, node: NodeId, store: &InstanceStore) -> Result<Option<InstanceId>, AccessError> {
        let value = self.value(node, store)?;
        value.as_object().ok_or(AccessError::TypeMismatch {
            expected: "object reference",
            found: value.kind_name(),
        })
    }

    pub fn set_bool(&mut self, node: NodeId, value: bool, store: &mut InstanceStore) -> Result<(), AccessError> {
        self.set_value(node, Value::Bool(value), store, EditFlags::empty())
    }

    /// Set an integer or enum field, clamped to `ClampMin`/`ClampMax`.
    pub fn set_int(&mut self, node: NodeId, value: i64, store: &mut InstanceStore) -> Result<(), AccessError> {
        let field = self.item_field(node)?;
        let (min, max) = self.clamp_range(node);
        let mut clamped = value;
        if let Some(min) = min {
            clamped = clamped.max(min.ceil() as i64);
        }
        if let Some(max) = max {
            clamped = clamped.min(max.floor() as i64);
        }
        let value = match self.schema.field(field).kind {
            FieldKind::Scalar(ScalarKind::Enum(_)) => Value::Enum(clamped),
            _ => Value::Int(clamped),
        };
        self.set_value(node, value, store, EditFlags::empty())
    }

    /// Set a float field, clamped to `ClampMin`/`ClampMax`.
    pub fn set_float(&mut self, node: NodeId, value: f64, store: &mut InstanceStore) -> Result<(), AccessError> {
        let (min, max) = self.clamp_range(node);
        let mut clamped = value;
        if let Some(min) = min {
            clamped = clamped.max(min);
        }
        if let Some(max) = max {
            clamped = clamped.min(max);
        }
        self.set_value(node, Value::Float(clamped), store, EditFlags::empty())
    }

    /// Set a string or name field.
    pub fn set_string(&mut self, node: NodeId, value: &str, store: &mut InstanceStore) -> Result<(), AccessError> {
        let field = self.item_field(node)?;
        let value = match self.schema.field(field).kind {
            FieldKind::Scalar(ScalarKind::Name) => Value::Name(value.to_owned()),
            _ => Value::Str(value.to_owned()),
        };
        self.set_value(node, value, store, EditFlags::empty())
    }

    /// Point an object reference at `target`, or clear it.
    pub fn set_object(
        &mut self,
        node: NodeId,
        target: Option<InstanceId>,
        store: &mut InstanceStore,
    ) -> Result<(), AccessError> {
        self.set_value(node, Value::Object(target), store, EditFlags::empty())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
