//! Proptree Reflect -- runtime type reflection for live property editing.
//!
//! This crate describes an object graph in terms of reflected types and
//! fields, stores live instances of those types, and lets callers address any
//! nested value through a [`ValueLocation`](location::ValueLocation) path that
//! is re-applied on every access. Instances are referenced through
//! generational [`InstanceId`](instance::InstanceId)s so a destroyed instance
//! is detected the moment a stale handle is used.
//!
//! # Quick Start
//!
//! ```
//! use proptree_reflect::prelude::*;
//! use std::sync::Arc;
//!
//! let mut builder = SchemaBuilder::new();
//! let car = builder
//!     .object("Car", None)
//!     .field("Speed", FieldSpec::Float)
//!     .meta("ClampMin", "0")
//!     .finish()
//!     .unwrap();
//! let (schema, _metadata) = builder.build();
//!
//! let mut store = InstanceStore::new(Arc::new(schema));
//! let proto = store.spawn_template(car, "CarProto").unwrap();
//! let car_a = store.spawn_derived(proto, "CarA").unwrap();
//!
//! assert_eq!(store.archetype_of(car_a), Some(proto));
//! assert_eq!(store.all_derived(proto), vec![car_a]);
//! ```

#![deny(unsafe_code)]

pub mod change;
pub mod instance;
pub mod location;
pub mod metadata;
pub mod schema;
pub mod store;
pub mod text;
pub mod value;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by schema construction and instance store operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReflectError {
    /// The instance does not exist (stale generation or never allocated).
    #[error("instance {instance:?} does not exist (stale or never allocated)")]
    StaleInstance { instance: instance::InstanceId },

    /// A type key was referenced that the schema does not know.
    #[error("type {key:?} is not part of the schema")]
    UnknownType { key: schema::TypeKey },

    /// An enum key was referenced that the schema does not know.
    #[error("enum {key:?} is not part of the schema")]
    UnknownEnum { key: schema::EnumKey },

    /// The type has been retired and can no longer back live instances.
    #[error("type '{name}' has been retired")]
    RetiredType { name: String },

    /// Two fields with the same name were declared on one type chain.
    #[error("field '{field}' is declared twice on type '{type_name}'")]
    DuplicateField { type_name: String, field: String },

    /// An instance name is already taken.
    #[error("an instance named '{name}' already exists")]
    DuplicateName { name: String },

    /// A field declaration does not form a consistent kind.
    #[error("field '{field}' on '{type_name}' is inconsistent: {details}")]
    InconsistentKind {
        type_name: String,
        field: String,
        details: String,
    },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::change::{ChangeKind, FieldChain, FieldChangedEvent, InstanceHooks};
    pub use crate::instance::{Instance, InstanceAllocator, InstanceId};
    pub use crate::location::{LocationRoot, PathStep, ValueLocation};
    pub use crate::metadata::{keys, MetaTarget, MetadataBuilder, MetadataRegistry};
    pub use crate::schema::{
        EnumDescriptor, EnumKey, FieldDescriptor, FieldFlags, FieldId, FieldKind, FieldSpec,
        ScalarKind, Schema, SchemaBuilder, TypeBuilder, TypeDescriptor, TypeKey, TypeKind,
    };
    pub use crate::store::InstanceStore;
    pub use crate::text::{ObjectResolver, TextCodec, TextError};
    pub use crate::value::{SparseSlots, Value};
    pub use crate::ReflectError;
}
