//! Change events delivered to instances around an edit.
//!
//! Editors describe an edit by a [`FieldChain`] (the fields from the
//! outermost edited member down to the edited leaf) and a [`ChangeKind`].
//! Instances observe edits through [`InstanceHooks`] registered per type on
//! the [`InstanceStore`](crate::store::InstanceStore).

use serde::{Deserialize, Serialize};

use crate::instance::InstanceId;
use crate::schema::FieldId;

/// What kind of edit happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    ValueSet,
    ArrayAdd,
    ArrayRemove,
    ArrayClear,
    ArrayInsert,
    ArrayMove,
    Duplicate,
    Swap,
    Unspecified,
}

impl ChangeKind {
    /// Edits that change the element count or order of a container.
    pub fn is_structural(self) -> bool {
        !matches!(self, ChangeKind::ValueSet | ChangeKind::Unspecified)
    }
}

/// Fields from the outermost member to the edited leaf. Container element
/// descriptors are never part of a chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChain {
    fields: Vec<FieldId>,
}

impl FieldChain {
    pub fn new(fields: Vec<FieldId>) -> Self {
        Self { fields }
    }

    /// Outermost member.
    pub fn head(&self) -> Option<FieldId> {
        self.fields.first().copied()
    }

    /// Edited leaf.
    pub fn tail(&self) -> Option<FieldId> {
        self.fields.last().copied()
    }

    pub fn contains(&self, field: FieldId) -> bool {
        self.fields.contains(&field)
    }

    pub fn fields(&self) -> &[FieldId] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Event delivered after an edit completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChangedEvent {
    pub chain: FieldChain,
    /// Head of the chain inside the object receiving the event.
    pub member: Option<FieldId>,
    pub kind: ChangeKind,
    /// Element index for container operations.
    pub index: Option<usize>,
    /// Top-level instances the edit was applied to.
    pub instances: Vec<InstanceId>,
    /// Set while a drag or other continuous edit is still in progress.
    pub interactive: bool,
}

impl FieldChangedEvent {
    /// Edited leaf field.
    pub fn field(&self) -> Option<FieldId> {
        self.chain.tail()
    }
}

/// Per-type callbacks around edits. All methods have no-op defaults.
pub trait InstanceHooks {
    /// Called before the value at `chain` changes on `instance`.
    fn pre_edit_change(&mut self, instance: InstanceId, chain: &FieldChain, member: Option<FieldId>) {
        let _ = (instance, chain, member);
    }

    /// Called after the value changed.
    fn post_edit_change(&mut self, instance: InstanceId, event: &FieldChangedEvent) {
        let _ = (instance, event);
    }

    /// Return `false` to make the field read-only on `instance`.
    fn can_edit_change(&self, instance: InstanceId, chain: &FieldChain) -> bool {
        let _ = (instance, chain);
        true
    }
}
