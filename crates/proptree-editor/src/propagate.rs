//! Archetype propagation.
//!
//! After an edit to an instance commits, every instance derived from it
//! that still held the value the edited instance had *before* the edit
//! receives the same edit. Derived instances that had diverged keep their
//! own value. The walk continues from every instance that was updated, so
//! edits flow down whole archetype hierarchies.
//!
//! Set edits copy the new value. Container edits are replayed on the
//! derived instance's own container, so an insert at index 2 inserts at
//! index 2 there too.

use std::collections::VecDeque;

use proptree_journal::journal::FieldChange;
use proptree_reflect::change::{ChangeKind, FieldChangedEvent};
use proptree_reflect::location::LocationRoot;
use proptree_reflect::store::InstanceStore;

use crate::containers::apply_container_op;
use crate::notify::{EditOp, PendingEdit};
use crate::tree::PropertyTree;

impl PropertyTree {
    pub(crate) fn propagate_edit(
        &mut self,
        pending: &PendingEdit,
        kind: ChangeKind,
        index: Option<usize>,
        store: &mut InstanceStore,
    ) {
        let Some(op) = pending.op else {
            return;
        };
        let field = pending.field;
        let deep = self.schema.may_contain_instanced(field);
        let member = pending.boundaries.first().and_then(|b| b.member);

        for (loc, previous) in pending.locations.iter().zip(&pending.previous) {
            let (LocationRoot::Instance(source), Some(previous)) = (loc.root, previous) else {
                continue;
            };
            let Some(new_value) = store.value(loc).cloned() else {
                continue;
            };

            let mut queue = VecDeque::from([source]);
            while let Some(current) = queue.pop_front() {
                for derived in store.derived_instances(current) {
                    let Some(target) = loc.rerooted(derived) else {
                        continue;
                    };
                    let Some(existing) = store.value(&target) else {
                        tracing::debug!(instance = ?derived, path = %pending.path, "derived instance lacks the edited value");
                        continue;
                    };
                    if !store.values_identical(existing, previous, deep) {
                        tracing::trace!(instance = ?derived, path = %pending.path, "derived value diverged");
                        continue;
                    }

                    let replacement = match op {
                        EditOp::Set => new_value.clone(),
                        EditOp::Container(container_op) => {
                            let mut value = existing.clone();
                            if let Err(err) = apply_container_op(&self.schema, field, &mut value, container_op) {
                                tracing::warn!(instance = ?derived, error = %err, "container edit did not replay");
                                continue;
                            }
                            value
                        }
                    };
                    let old_text = self.export_text(field, existing, store);
                    let new_text = self.export_text(field, &replacement, store);

                    store.pre_edit_change(derived, &pending.chain, member);
                    let Some(slot) = store.value_mut(&target) else {
                        continue;
                    };
                    *slot = replacement;
                    let event = FieldChangedEvent {
                        chain: pending.chain.clone(),
                        member,
                        kind,
                        index,
                        instances: vec![derived],
                        interactive: false,
                    };
                    store.post_edit_change(derived, &event);

                    self.notifier.journal.record_change(
                        FieldChange {
                            sequence: 0,
                            instance: derived,
                            path: pending.path.clone(),
                            kind,
                            index,
                            old_value: Some(old_text),
                            new_value: Some(new_text),
                            interactive: false,
                            propagated_from: None,
                        }
                        .propagated(current),
                    );
                    tracing::debug!(from = ?current, to = ?derived, path = %pending.path, "propagated edit");
                    queue.push_back(derived);
                }
            }
        }
    }
}
