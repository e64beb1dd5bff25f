//! Change journal for tracking field edits and archetype propagation.
//!
//! The [`ChangeJournal`] records every field change an editor commits. Each
//! entry ([`FieldChange`]) captures the instance, the dotted field path, the
//! [`ChangeKind`], the text of the value before and after, and, for edits
//! carried over from an archetype, the instance the edit originated on.
//!
//! Sequence numbers are assigned on [`record_change`](ChangeJournal::record_change)
//! and keep increasing across [`clear`](ChangeJournal::clear).
//!
//! # Query API
//!
//! - **Instance**: [`ChangeJournal::changes_for_instance`]
//! - **Field path**: [`ChangeJournal::changes_for_path`]
//! - **Kind**: [`ChangeJournal::changes_of_kind`]
//! - **Propagation source**: [`ChangeJournal::propagated_from`]
//!
//! # Example
//!
//! ```
//! use proptree_journal::journal::{ChangeJournal, FieldChange};
//! use proptree_reflect::change::ChangeKind;
//! use proptree_reflect::instance::InstanceId;
//!
//! let mut journal = ChangeJournal::new();
//! let car = InstanceId::new(0, 0);
//! journal.record_change(FieldChange::value_set(car, "Speed", "10", "20"));
//!
//! assert_eq!(journal.len(), 1);
//! assert_eq!(journal.changes_for_instance(car).count(), 1);
//! assert_eq!(journal.all_changes()[0].kind, ChangeKind::ValueSet);
//! ```

use proptree_reflect::change::ChangeKind;
use proptree_reflect::instance::InstanceId;
use serde::{Deserialize, Serialize};

use crate::JournalError;

// ---------------------------------------------------------------------------
// FieldChange
// ---------------------------------------------------------------------------

/// A single recorded field edit.
///
/// # Value semantics
///
/// - **Value set**: `old_value` and `new_value` are the field's text before
///   and after.
/// - **Container operation**: both hold the whole container's text; `index`
///   names the element operated on where there is one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    /// Assigned by the journal.
    pub sequence: u64,
    pub instance: InstanceId,
    /// Dotted path from the instance, e.g. `"Wheels[2].Radius"`.
    pub path: String,
    pub kind: ChangeKind,
    pub index: Option<usize>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    /// The edit was part of an uncommitted interactive drag.
    pub interactive: bool,
    /// Instance whose edit was propagated to this one.
    pub propagated_from: Option<InstanceId>,
}

impl FieldChange {
    /// A plain value assignment.
    pub fn value_set(instance: InstanceId, path: &str, old: &str, new: &str) -> Self {
        Self {
            sequence: 0,
            instance,
            path: path.to_owned(),
            kind: ChangeKind::ValueSet,
            index: None,
            old_value: Some(old.to_owned()),
            new_value: Some(new.to_owned()),
            interactive: false,
            propagated_from: None,
        }
    }

    /// Mark this change as carried over from `source`.
    pub fn propagated(mut self, source: InstanceId) -> Self {
        self.propagated_from = Some(source);
        self
    }
}

// ---------------------------------------------------------------------------
// ChangeJournal
// ---------------------------------------------------------------------------

/// Accumulates [`FieldChange`] entries in the order edits were applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeJournal {
    changes: Vec<FieldChange>,
    next_sequence: u64,
}

impl ChangeJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a change, stamping it with the next sequence number. Returns
    /// the number assigned.
    pub fn record_change(&mut self, mut change: FieldChange) -> u64 {
        change.sequence = self.next_sequence;
        self.next_sequence += 1;
        tracing::trace!(
            sequence = change.sequence,
            instance = ?change.instance,
            path = %change.path,
            kind = ?change.kind,
            "journal entry"
        );
        self.changes.push(change);
        self.next_sequence - 1
    }

    /// Drop recorded changes. Sequence numbering continues.
    pub fn clear(&mut self) {
        self.changes.clear();
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// All recorded changes in insertion order.
    pub fn all_changes(&self) -> &[FieldChange] {
        &self.changes
    }

    pub fn last(&self) -> Option<&FieldChange> {
        self.changes.last()
    }

    pub fn changes_for_instance(&self, instance: InstanceId) -> impl Iterator<Item = &FieldChange> {
        self.changes.iter().filter(move |c| c.instance == instance)
    }

    pub fn changes_for_path<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a FieldChange> {
        self.changes.iter().filter(move |c| c.path == path)
    }

    pub fn changes_of_kind(&self, kind: ChangeKind) -> impl Iterator<Item = &FieldChange> {
        self.changes.iter().filter(move |c| c.kind == kind)
    }

    /// Changes carried over from edits made on `source`.
    pub fn propagated_from(&self, source: InstanceId) -> impl Iterator<Item = &FieldChange> {
        self.changes
            .iter()
            .filter(move |c| c.propagated_from == Some(source))
    }

    /// Pretty JSON dump for debugging tools.
    pub fn to_json(&self) -> Result<String, JournalError> {
        Ok(serde_json::to_string_pretty(&self.changes)?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- helpers ------------------------------------------------------------

    fn instance(index: u32) -> InstanceId {
        InstanceId::new(index, 0)
    }

    fn container_op(inst: InstanceId, path: &str, kind: ChangeKind, index: usize) -> FieldChange {
        FieldChange {
            sequence: 0,
            instance: inst,
            path: path.to_owned(),
            kind,
            index: Some(index),
            old_value: Some("(1,2)".to_owned()),
            new_value: Some("(1,2,0)".to_owned()),
            interactive: false,
            propagated_from: None,
        }
    }

    // -- 1. Empty journal ---------------------------------------------------

    #[test]
    fn empty_journal() {
        let journal = ChangeJournal::new();
        assert!(journal.is_empty());
        assert_eq!(journal.len(), 0);
        assert!(journal.last().is_none());
        assert_eq!(journal.changes_for_instance(instance(0)).count(), 0);
        assert_eq!(journal.changes_for_path("Speed").count(), 0);
    }

    // -- 2. Sequencing ------------------------------------------------------

    #[test]
    fn sequence_numbers_survive_clear() {
        let mut journal = ChangeJournal::new();
        assert_eq!(journal.record_change(FieldChange::value_set(instance(0), "A", "1", "2")), 0);
        assert_eq!(journal.record_change(FieldChange::value_set(instance(0), "A", "2", "3")), 1);
        journal.clear();
        assert!(journal.is_empty());
        assert_eq!(journal.record_change(FieldChange::value_set(instance(0), "A", "3", "4")), 2);
        assert_eq!(journal.all_changes()[0].sequence, 2);
    }

    // -- 3. Queries ---------------------------------------------------------

    #[test]
    fn query_by_instance_path_and_kind() {
        let mut journal = ChangeJournal::new();
        let proto = instance(0);
        let derived = instance(1);

        journal.record_change(FieldChange::value_set(proto, "Speed", "10", "20"));
        journal.record_change(FieldChange::value_set(derived, "Speed", "10", "20").propagated(proto));
        journal.record_change(container_op(proto, "Items", ChangeKind::ArrayAdd, 2));

        assert_eq!(journal.changes_for_instance(proto).count(), 2);
        assert_eq!(journal.changes_for_path("Speed").count(), 2);
        assert_eq!(journal.changes_of_kind(ChangeKind::ArrayAdd).count(), 1);

        let carried: Vec<_> = journal.propagated_from(proto).collect();
        assert_eq!(carried.len(), 1);
        assert_eq!(carried[0].instance, derived);
        assert_eq!(journal.last().unwrap().index, Some(2));
    }

    // -- 4. JSON export -----------------------------------------------------

    #[test]
    fn json_dump_round_trips() {
        let mut journal = ChangeJournal::new();
        journal.record_change(FieldChange::value_set(instance(3), "Name", "a", "b"));
        let json = journal.to_json().unwrap();
        let back: Vec<FieldChange> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, journal.all_changes());
    }
}
