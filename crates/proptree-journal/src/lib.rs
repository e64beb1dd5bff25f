//! Proptree Journal - ordered record of every field edit made through a
//! property tree.
//!
//! # Modules
//!
//! - [`journal`]: Change journal recording each committed or propagated field
//!   change (instance, field path, kind, old/new text, propagation source).

#![deny(unsafe_code)]

pub mod journal;

/// Errors produced when exporting the journal.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("failed to serialize journal: {0}")]
    Serialization(#[from] serde_json::Error),
}
