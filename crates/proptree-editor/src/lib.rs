//! # proptree-editor
//!
//! A live property editor over reflected instances.
//!
//! A [`PropertyTree`](tree::PropertyTree) mirrors the fields of one or more
//! instances as a tree of nodes: instance nodes, category groupings, and
//! item nodes for fields, static-array slots, and container elements.
//! Children are built lazily on expansion and rebuilt when the data under
//! them changes shape. Every value access resolves the node to a
//! [`ValueLocation`](proptree_reflect::location::ValueLocation) against the
//! live [`InstanceStore`](proptree_reflect::store::InstanceStore).
//!
//! Writes go through a change protocol: pre-change notification to every
//! enclosing object, the write, post-change notification, then propagation
//! of the edit to derived instances that have not diverged from the
//! edited archetype.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use proptree_editor::prelude::*;
//!
//! let mut builder = SchemaBuilder::new();
//! let car = builder
//!     .object("Car", None)
//!     .field("Speed", FieldSpec::Float)
//!     .meta(keys::CATEGORY, "Physics")
//!     .finish()
//!     .unwrap();
//! let (schema, metadata) = builder.build();
//!
//! let mut store = InstanceStore::new(Arc::new(schema));
//! let proto = store.spawn_template(car, "CarProto").unwrap();
//! let car_a = store.spawn_derived(proto, "CarA").unwrap();
//!
//! let mut tree = PropertyTree::for_instances(&store, &[proto], Arc::new(metadata), TreeConfig::default());
//! let speed = tree.find_by_path("Speed", &store).unwrap();
//! tree.set_value_from_text(speed, "20", &mut store, EditFlags::empty()).unwrap();
//!
//! let mut derived = PropertyTree::for_instances(&store, &[car_a], tree.metadata().clone(), TreeConfig::default());
//! let derived_speed = derived.find_by_path("Speed", &store).unwrap();
//! assert_eq!(derived.value_as_text(derived_speed, &store).unwrap(), "20");
//! assert_eq!(derived.ensure_data_is_valid(&store), ValidationResult::Valid);
//! ```

#![deny(unsafe_code)]

pub mod access;
pub mod condition;
pub mod config;
pub mod containers;
pub mod diff;
pub mod locator;
pub mod node;
pub mod notify;
pub mod propagate;
pub mod queries;
pub mod restriction;
pub mod tree;
pub mod validate;

pub use proptree_journal;
pub use proptree_reflect;

use proptree_reflect::text::TextError;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors from reading or writing values through a property tree.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AccessError {
    /// The node id is stale or was never part of this tree.
    #[error("node is not part of the tree")]
    StaleNode,

    /// The node does not resolve to a value (categories, instance nodes,
    /// null references, or out-of-range elements).
    #[error("node does not resolve to a value")]
    NoLocation,

    /// Edited instances hold different values.
    #[error("instances hold different values")]
    MultipleValues,

    #[error("expected a {expected} value, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// An edited instance was destroyed or its type retired.
    #[error("an edited instance is no longer valid")]
    ObjectInvalid,

    #[error("invalid value text: {0}")]
    InvalidText(#[from] TextError),

    #[error("field is read-only")]
    ReadOnly,

    #[error("container has a fixed size")]
    FixedSize,

    #[error("index {index} out of range for {len} elements")]
    IndexOutOfRange { index: usize, len: usize },

    /// The value already exists in the set or map.
    #[error("duplicate element {text}")]
    DuplicateElement { text: String },

    #[error("{operation} is not supported on a {container}")]
    UnsupportedOperation {
        operation: &'static str,
        container: &'static str,
    },

    #[error("expected {expected} values, one per instance, found {found}")]
    InstanceCountMismatch { expected: usize, found: usize },

    /// Object reference of the wrong class.
    #[error("instance of '{found}' is not a '{expected}'")]
    WrongClass { expected: String, found: String },

    /// Object reference that may not be cleared.
    #[error("reference may not be cleared")]
    NotClearable,

    #[error(transparent)]
    Notify(#[from] NotifyError),
}

/// Misuse of the change-notification protocol.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NotifyError {
    #[error("illegal change-notification transition from {from:?} to {to:?}")]
    IllegalTransition {
        from: notify::NotifyState,
        to: notify::NotifyState,
    },
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Install a `tracing` subscriber filtered by `RUST_LOG`, defaulting to
/// `info` for the proptree crates. Does nothing if a global subscriber is
/// already set.
pub fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "proptree_editor=info,proptree_reflect=info,proptree_journal=info".into()
    });
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::access::EditFlags;
    pub use crate::condition::{ConditionError, EditCondition, Operand};
    pub use crate::config::TreeConfig;
    pub use crate::containers::ContainerOp;
    pub use crate::node::{NodeFlags, NodeId, NodeKind, PropertyNode};
    pub use crate::notify::{ListenerId, NotifyState, ObjectBoundary, TreeEvent, TreeEventKind};
    pub use crate::restriction::PropertyRestriction;
    pub use crate::tree::PropertyTree;
    pub use crate::validate::ValidationResult;
    pub use crate::{AccessError, NotifyError};

    pub use proptree_journal::journal::{ChangeJournal, FieldChange};
    pub use proptree_reflect::prelude::*;
}
