//! The change protocol around every write.
//!
//! Every edit runs through the same state machine:
//!
//! ```text
//! Idle -> PreChangeFired -> Mutated -> PostChangeFired -> Idle
//! ```
//!
//! - **Pre-change** goes to the nearest enclosing object first, then to
//!   each enclosing object further out ([`ObjectBoundaries`]), each with
//!   the head of the field chain inside that object.
//! - **Mutated** may repeat while an interactive edit (a drag) is in
//!   progress on the same node. Editing another node, or calling
//!   [`finish_interactive_change`](PropertyTree::finish_interactive_change),
//!   commits it.
//! - **Post-change** is delivered in the same order as pre-change, then the
//!   edit is journaled and propagated to derived instances.
//!
//! `PreChangeFired -> PostChangeFired` is allowed so a failed write still
//! pairs its notifications. Any other transition is a [`NotifyError`].

use std::fmt;

use proptree_journal::journal::{ChangeJournal, FieldChange};
use proptree_reflect::change::{ChangeKind, FieldChain, FieldChangedEvent};
use proptree_reflect::instance::InstanceId;
use proptree_reflect::location::ValueLocation;
use proptree_reflect::schema::{FieldId, FieldKind};
use proptree_reflect::store::InstanceStore;
use proptree_reflect::value::Value;

use crate::access::EditFlags;
use crate::containers::ContainerOp;
use crate::node::{NodeFlags, NodeId, NodeKind};
use crate::tree::PropertyTree;
use crate::{AccessError, NotifyError};

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotifyState {
    Idle,
    PreChangeFired,
    Mutated,
    PostChangeFired,
}

impl NotifyState {
    fn can_become(self, next: NotifyState) -> bool {
        use NotifyState::*;
        matches!(
            (self, next),
            (Idle, PreChangeFired)
                | (PreChangeFired, Mutated)
                | (PreChangeFired, PostChangeFired)
                | (Mutated, Mutated)
                | (Mutated, PostChangeFired)
                | (PostChangeFired, Idle)
        )
    }
}

/// What an edit did to the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EditOp {
    Set,
    Container(ContainerOp),
}

impl EditOp {
    fn kind(self) -> ChangeKind {
        match self {
            EditOp::Set => ChangeKind::ValueSet,
            EditOp::Container(op) => op.change_kind(),
        }
    }

    fn index(self) -> Option<usize> {
        match self {
            EditOp::Set => None,
            EditOp::Container(op) => op.index(),
        }
    }
}

/// An edit between its pre-change and post-change notifications.
#[derive(Debug, Clone)]
pub(crate) struct PendingEdit {
    pub(crate) node: NodeId,
    pub(crate) field: FieldId,
    pub(crate) path: String,
    pub(crate) chain: FieldChain,
    pub(crate) boundaries: Vec<ObjectBoundary>,
    pub(crate) locations: Vec<ValueLocation>,
    /// Values before the first write, per slot.
    pub(crate) previous: Vec<Option<Value>>,
    /// Last operation written; `None` until the first write lands.
    pub(crate) op: Option<EditOp>,
    pub(crate) interactive: bool,
    pub(crate) propagate: bool,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeEventKind {
    PreChange,
    PostChange(ChangeKind),
    ChildrenRebuilt,
}

/// Delivered to listeners subscribed to `node` or one of its ancestors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeEvent {
    pub node: NodeId,
    pub kind: TreeEventKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Listener {
    id: ListenerId,
    node: NodeId,
    callback: Box<dyn FnMut(&TreeEvent)>,
}

// ---------------------------------------------------------------------------
// ChangeNotifier
// ---------------------------------------------------------------------------

/// Per-tree notification state, listeners, and change journal.
pub struct ChangeNotifier {
    state: NotifyState,
    pub(crate) pending: Option<PendingEdit>,
    pub(crate) journal: ChangeJournal,
    listeners: Vec<Listener>,
    next_listener: u64,
}

impl ChangeNotifier {
    pub(crate) fn new() -> Self {
        Self {
            state: NotifyState::Idle,
            pending: None,
            journal: ChangeJournal::new(),
            listeners: Vec::new(),
            next_listener: 0,
        }
    }

    pub fn state(&self) -> NotifyState {
        self.state
    }

    pub(crate) fn transition(&mut self, next: NotifyState) -> Result<(), NotifyError> {
        if !self.state.can_become(next) {
            return Err(NotifyError::IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::trace!(from = ?self.state, to = ?next, "notify transition");
        self.state = next;
        Ok(())
    }
}

impl fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("state", &self.state)
            .field("pending", &self.pending.as_ref().map(|p| p.node))
            .field("journal", &self.journal.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Object boundaries
// ---------------------------------------------------------------------------

/// An enclosing object of an edited node: the instances it stands for and
/// the head of the field chain inside it.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectBoundary {
    pub node: NodeId,
    pub instances: Vec<InstanceId>,
    pub member: Option<FieldId>,
}

/// Walks from a node out through its enclosing instance nodes, nearest
/// first.
pub struct ObjectBoundaries<'t> {
    tree: &'t PropertyTree,
    next: Option<NodeId>,
}

impl Iterator for ObjectBoundaries<'_> {
    type Item = ObjectBoundary;

    fn next(&mut self) -> Option<ObjectBoundary> {
        let mut member = None;
        let mut current = self.next.take();
        while let Some(id) = current {
            let node = self.tree.arena.get(id)?;
            match &node.kind {
                NodeKind::Instance(set) => {
                    self.next = node.parent;
                    return Some(ObjectBoundary {
                        node: id,
                        instances: set.live().collect(),
                        member,
                    });
                }
                NodeKind::Standalone { .. } => {
                    return Some(ObjectBoundary {
                        node: id,
                        instances: Vec::new(),
                        member,
                    });
                }
                NodeKind::Item { field } if self.tree.is_chain_member(id) => member = Some(*field),
                _ => {}
            }
            current = node.parent;
        }
        None
    }
}

impl PropertyTree {
    pub fn object_boundaries(&self, node: NodeId) -> ObjectBoundaries<'_> {
        ObjectBoundaries {
            tree: self,
            next: Some(node),
        }
    }

    fn is_chain_member(&self, id: NodeId) -> bool {
        self.arena.get(id).is_some_and(|n| {
            n.array_index.is_none()
                && !n.has_flags(NodeFlags::MAP_KEY)
                && n.field().is_some_and(|f| !self.schema.field(f).is_inner())
        })
    }

    /// Fields from the outermost member down to `node`. Container elements
    /// and static-array slots do not contribute.
    pub fn field_chain(&self, node: NodeId) -> FieldChain {
        let mut fields = Vec::new();
        let mut current = Some(node);
        while let Some(id) = current {
            let Some(n) = self.arena.get(id) else {
                break;
            };
            if self.is_chain_member(id) {
                fields.extend(n.field());
            }
            current = n.parent;
        }
        fields.reverse();
        FieldChain::new(fields)
    }

    // -- listeners ----------------------------------------------------------

    /// Call `callback` for events on `node` and everything below it.
    pub fn subscribe(&mut self, node: NodeId, callback: impl FnMut(&TreeEvent) + 'static) -> ListenerId {
        let id = ListenerId(self.notifier.next_listener);
        self.notifier.next_listener += 1;
        self.notifier.listeners.push(Listener {
            id,
            node,
            callback: Box::new(callback),
        });
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.notifier.listeners.len();
        self.notifier.listeners.retain(|l| l.id != id);
        self.notifier.listeners.len() != before
    }

    pub(crate) fn emit(&mut self, node: NodeId, kind: TreeEventKind) {
        if self.notifier.listeners.is_empty() {
            return;
        }
        let mut lineage = Vec::new();
        let mut current = Some(node);
        while let Some(id) = current {
            lineage.push(id);
            current = self.arena.get(id).and_then(|n| n.parent);
        }
        let event = TreeEvent { node, kind };
        for listener in &mut self.notifier.listeners {
            if lineage.contains(&listener.node) {
                (listener.callback)(&event);
            }
        }
    }

    // -- state --------------------------------------------------------------

    pub fn notify_state(&self) -> NotifyState {
        self.notifier.state()
    }

    /// Node of the edit awaiting its post-change notification.
    pub fn pending_edit(&self) -> Option<NodeId> {
        self.notifier.pending.as_ref().map(|p| p.node)
    }

    pub fn journal(&self) -> &ChangeJournal {
        &self.notifier.journal
    }

    pub fn journal_mut(&mut self) -> &mut ChangeJournal {
        &mut self.notifier.journal
    }

    /// Commit a pending interactive edit.
    pub fn finish_interactive_change(&mut self, store: &mut InstanceStore) -> Result<(), AccessError> {
        Ok(self.end_change(store)?)
    }

    // -- the protocol -------------------------------------------------------

    /// Write one value per slot to `node` under the change protocol.
    pub(crate) fn apply_edit(
        &mut self,
        node: NodeId,
        store: &mut InstanceStore,
        op: EditOp,
        values: Vec<Value>,
        flags: EditFlags,
    ) -> Result<(), AccessError> {
        let locations = self.checked_locations(node, store)?;
        if values.len() != locations.len() {
            return Err(AccessError::InstanceCountMismatch {
                expected: locations.len(),
                found: values.len(),
            });
        }
        let interactive = flags.contains(EditFlags::INTERACTIVE);
        self.begin_change(node, store, &locations, flags)?;

        let mut written = 0;
        for (loc, value) in locations.iter().zip(values) {
            match self.value_mut(loc, store) {
                Some(slot) => {
                    *slot = value;
                    written += 1;
                }
                None => break,
            }
        }
        if written > 0 {
            self.notifier.transition(NotifyState::Mutated)?;
            if let Some(pending) = self.notifier.pending.as_mut() {
                pending.op = Some(op);
            }
            self.after_write(node, op, store);
        }
        if written < locations.len() {
            tracing::warn!(node = ?node, written, "write stopped early");
            self.end_change(store)?;
            return Err(AccessError::NoLocation);
        }
        if !interactive {
            self.end_change(store)?;
        }
        Ok(())
    }

    fn begin_change(
        &mut self,
        node: NodeId,
        store: &mut InstanceStore,
        locations: &[ValueLocation],
        flags: EditFlags,
    ) -> Result<(), AccessError> {
        let interactive = flags.contains(EditFlags::INTERACTIVE);
        match self.notifier.state() {
            NotifyState::Idle => {}
            NotifyState::Mutated => {
                let continuing = self
                    .notifier
                    .pending
                    .as_ref()
                    .is_some_and(|p| p.node == node && p.interactive && interactive);
                if continuing {
                    return Ok(());
                }
                self.end_change(store)?;
            }
            state => {
                return Err(NotifyError::IllegalTransition {
                    from: state,
                    to: NotifyState::PreChangeFired,
                }
                .into())
            }
        }

        let field = self.item_field(node)?;
        let chain = self.field_chain(node);
        let boundaries: Vec<ObjectBoundary> = self.object_boundaries(node).collect();
        let previous = locations
            .iter()
            .map(|l| self.read_value(l, store).cloned())
            .collect();
        self.notifier.transition(NotifyState::PreChangeFired)?;
        for boundary in &boundaries {
            for instance in &boundary.instances {
                store.pre_edit_change(*instance, &chain, boundary.member);
            }
        }
        self.notifier.pending = Some(PendingEdit {
            node,
            field,
            path: self.property_path(node),
            chain,
            boundaries,
            locations: locations.to_vec(),
            previous,
            op: None,
            interactive,
            propagate: !flags.contains(EditFlags::NO_PROPAGATION),
        });
        self.emit(node, TreeEventKind::PreChange);
        Ok(())
    }

    /// Deliver post-change, journal, and propagate the pending edit.
    pub(crate) fn end_change(&mut self, store: &mut InstanceStore) -> Result<(), NotifyError> {
        let Some(pending) = self.notifier.pending.take() else {
            return Ok(());
        };
        self.notifier.transition(NotifyState::PostChangeFired)?;

        let kind = pending.op.map_or(ChangeKind::Unspecified, EditOp::kind);
        let index = pending.op.and_then(EditOp::index);
        let top_level = self.instances();
        for boundary in &pending.boundaries {
            let event = FieldChangedEvent {
                chain: pending.chain.clone(),
                member: boundary.member,
                kind,
                index,
                instances: top_level.clone(),
                interactive: pending.interactive,
            };
            for instance in &boundary.instances {
                store.post_edit_change(*instance, &event);
            }
        }

        if pending.op.is_some() {
            self.journal_edit(&pending, kind, index, store);
            if pending.propagate {
                self.propagate_edit(&pending, kind, index, store);
            }
            self.emit(pending.node, TreeEventKind::PostChange(kind));
        }
        tracing::debug!(path = %pending.path, kind = ?kind, "change committed");
        self.notifier.transition(NotifyState::Idle)
    }

    /// Refresh caches and children after a write to `node`.
    fn after_write(&mut self, node: NodeId, op: EditOp, store: &InstanceStore) {
        self.invalidate_upwards(node);
        let Some(n) = self.arena.get(node) else {
            return;
        };
        let reshapes = match op {
            EditOp::Container(_) => true,
            EditOp::Set => {
                n.children_built
                    && n.field().is_some_and(|f| {
                        let desc = self.schema.field(f);
                        !matches!(desc.kind, FieldKind::Scalar(_))
                            || (desc.is_static_array() && n.array_index.is_none())
                    })
            }
        };
        if reshapes {
            self.rebuild_internal(node, store);
            self.mark_rebuilt(node);
        }
    }

    fn journal_edit(&mut self, pending: &PendingEdit, kind: ChangeKind, index: Option<usize>, store: &InstanceStore) {
        for (loc, previous) in pending.locations.iter().zip(&pending.previous) {
            let Some(instance) = loc.owner() else {
                continue;
            };
            let old_value = previous
                .as_ref()
                .map(|v| self.export_text(pending.field, v, store));
            let new_value = self
                .read_value(loc, store)
                .map(|v| self.export_text(pending.field, v, store));
            self.notifier.journal.record_change(FieldChange {
                sequence: 0,
                instance,
                path: pending.path.clone(),
                kind,
                index,
                old_value,
                new_value,
                interactive: pending.interactive,
                propagated_from: None,
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_transitions() {
        use NotifyState::*;
        assert!(Idle.can_become(PreChangeFired));
        assert!(PreChangeFired.can_become(PostChangeFired));
        assert!(Mutated.can_become(Mutated));
        assert!(PostChangeFired.can_become(Idle));

        assert!(!Idle.can_become(Mutated));
        assert!(!Idle.can_become(PostChangeFired));
        assert!(!PreChangeFired.can_become(PreChangeFired));
        assert!(!PostChangeFired.can_become(Mutated));
    }

    #[test]
    fn notifier_rejects_illegal_transition() {
        let mut notifier = ChangeNotifier::new();
        assert_eq!(
            notifier.transition(NotifyState::Mutated),
            Err(NotifyError::IllegalTransition {
                from: NotifyState::Idle,
                to: NotifyState::Mutated,
            })
        );
        notifier.transition(NotifyState::PreChangeFired).unwrap();
        notifier.transition(NotifyState::PostChangeFired).unwrap();
        notifier.transition(NotifyState::Idle).unwrap();
        assert_eq!(notifier.state(), NotifyState::Idle);
    }
}
