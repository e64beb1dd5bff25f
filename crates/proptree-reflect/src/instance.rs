//! Instance identifiers, allocation, and the instance record.
//!
//! An [`InstanceId`] packs a *generation* counter in the high 32 bits and a
//! slot *index* in the low 32 bits. The generation is bumped every time a slot
//! is recycled, so a handle to a destroyed instance never aliases a newer one.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

use crate::schema::{FieldId, TypeKey};
use crate::value::Value;

// ---------------------------------------------------------------------------
// InstanceId
// ---------------------------------------------------------------------------

/// A generational instance handle.
///
/// Layout: `[generation: u32 | index: u32]`
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId(u64);

impl InstanceId {
    /// Construct an `InstanceId` from an index and generation.
    #[inline]
    pub fn new(index: u32, generation: u32) -> Self {
        Self((generation as u64) << 32 | index as u64)
    }

    /// The index portion (low 32 bits).
    #[inline]
    pub fn index(self) -> u32 {
        self.0 as u32
    }

    /// The generation portion (high 32 bits).
    #[inline]
    pub fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }
}

impl fmt::Debug for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstanceId({}v{})", self.index(), self.generation())
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index(), self.generation())
    }
}

// ---------------------------------------------------------------------------
// InstanceAllocator
// ---------------------------------------------------------------------------

/// Allocates and recycles [`InstanceId`]s with generational tracking.
#[derive(Debug, Default)]
pub struct InstanceAllocator {
    generations: Vec<u32>,
    alive: Vec<bool>,
    /// Recyclable indices, oldest first.
    free_indices: VecDeque<u32>,
}

impl InstanceAllocator {
    /// Create a new, empty allocator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh [`InstanceId`], reusing a recycled index when one is
    /// available.
    pub fn allocate(&mut self) -> InstanceId {
        if let Some(index) = self.free_indices.pop_front() {
            self.alive[index as usize] = true;
            InstanceId::new(index, self.generations[index as usize])
        } else {
            let index = self.generations.len() as u32;
            self.generations.push(0);
            self.alive.push(true);
            InstanceId::new(index, 0)
        }
    }

    /// Release `id`, bumping the slot generation so outstanding handles go
    /// stale. Returns `false` if the handle was already dead.
    pub fn deallocate(&mut self, id: InstanceId) -> bool {
        if !self.is_alive(id) {
            return false;
        }
        let idx = id.index() as usize;
        self.alive[idx] = false;
        self.generations[idx] = self.generations[idx].wrapping_add(1);
        self.free_indices.push_back(id.index());
        true
    }

    /// Returns `true` if `id` refers to a live slot of the current generation.
    pub fn is_alive(&self, id: InstanceId) -> bool {
        let idx = id.index() as usize;
        idx < self.generations.len() && self.alive[idx] && self.generations[idx] == id.generation()
    }

    /// Number of live handles.
    pub fn alive_count(&self) -> usize {
        self.alive.iter().filter(|&&a| a).count()
    }
}

// ---------------------------------------------------------------------------
// Instance
// ---------------------------------------------------------------------------

/// A live object of some reflected object type.
#[derive(Debug, Clone)]
pub struct Instance {
    pub id: InstanceId,
    /// Unique, human-readable name. Also the text form of references to it.
    pub name: String,
    /// Nominal (most derived) type.
    pub type_key: TypeKey,
    /// Prototype this instance was derived from, if any.
    pub archetype: Option<InstanceId>,
    /// Owning instance and field for instanced subobjects.
    pub outer: Option<(InstanceId, FieldId)>,
    /// Templates are prototypes other instances derive from.
    pub template: bool,
    /// Field storage; always a [`Value::Struct`] laid out by the type.
    pub data: Value,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
