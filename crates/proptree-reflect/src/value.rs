//! Dynamic field values.
//!
//! A [`Value`] is the live storage for one field of one instance. Structs are
//! stored as a positional list laid out by their type, static arrays as a
//! fixed-length list, and sets/maps as [`SparseSlots`]: a slot vector with
//! holes, where a *logical* index (the n-th live element) differs from the
//! *internal* slot index once elements have been removed.

use serde::{Deserialize, Serialize};

use crate::instance::InstanceId;

// ---------------------------------------------------------------------------
// SparseSlots
// ---------------------------------------------------------------------------

/// Slot storage with stable internal indices and a free list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparseSlots<T> {
    slots: Vec<Option<T>>,
    free: Vec<usize>,
}

impl<T> SparseSlots<T> {
    /// Create empty storage.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    /// Number of live elements.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Returns `true` if no element is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One past the highest internal slot ever used.
    pub fn max_index(&self) -> usize {
        self.slots.len()
    }

    /// Insert into the most recently freed slot, or append. Returns the
    /// internal index.
    pub fn insert(&mut self, value: T) -> usize {
        if let Some(slot) = self.free.pop() {
            self.slots[slot] = Some(value);
            slot
        } else {
            self.slots.push(Some(value));
            self.slots.len() - 1
        }
    }

    /// Remove the element at internal index `slot`.
    pub fn remove(&mut self, slot: usize) -> Option<T> {
        let taken = self.slots.get_mut(slot)?.take()?;
        self.free.push(slot);
        Some(taken)
    }

    /// Whether internal index `slot` holds a live element.
    pub fn is_valid(&self, slot: usize) -> bool {
        matches!(self.slots.get(slot), Some(Some(_)))
    }

    pub fn get(&self, slot: usize) -> Option<&T> {
        self.slots.get(slot)?.as_ref()
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut T> {
        self.slots.get_mut(slot)?.as_mut()
    }

    /// Translate a logical index into an internal slot index by scanning the
    /// live-slot bitmap.
    pub fn logical_to_internal(&self, logical: usize) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_some())
            .nth(logical)
            .map(|(i, _)| i)
    }

    /// Translate an internal slot index back into its logical position.
    pub fn internal_to_logical(&self, slot: usize) -> Option<usize> {
        if !self.is_valid(slot) {
            return None;
        }
        Some(self.slots[..slot].iter().filter(|s| s.is_some()).count())
    }

    /// Live elements in internal order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    /// Live elements paired with their internal index.
    pub fn iter_slots(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|v| (i, v)))
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
    }
}

impl<T> Default for SparseSlots<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FromIterator<T> for SparseSlots<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            slots: iter.into_iter().map(Some).collect(),
            free: Vec::new(),
        }
    }
}

/// Set-like equality: same number of live elements and every element of one
/// side is present in the other. Slot layout is irrelevant.
impl<T: PartialEq> PartialEq for SparseSlots<T> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|a| other.iter().any(|b| a == b))
    }
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// Live value of a field, a static-array slot, or a container element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Name(String),
    /// Underlying enum integer.
    Enum(i64),
    /// Positional field values in layout order.
    Struct(Vec<Value>),
    /// Static array storage; length equals the declared arity.
    Fixed(Vec<Value>),
    Array(Vec<Value>),
    Set(SparseSlots<Value>),
    Map(SparseSlots<(Value, Value)>),
    Object(Option<InstanceId>),
}

impl Value {
    /// Short name of the variant, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Name(_) => "name",
            Value::Enum(_) => "enum",
            Value::Struct(_) => "struct",
            Value::Fixed(_) => "static array",
            Value::Array(_) => "array",
            Value::Set(_) => "set",
            Value::Map(_) => "map",
            Value::Object(_) => "object reference",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) | Value::Enum(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) | Value::Name(s) => Some(s),
            _ => None,
        }
    }

    /// `Some(reference)` for object references, where the inner `None` is
    /// the null reference.
    pub fn as_object(&self) -> Option<Option<InstanceId>> {
        match self {
            Value::Object(o) => Some(*o),
            _ => None,
        }
    }

    /// Number of live elements for dynamic containers.
    pub fn container_len(&self) -> Option<usize> {
        match self {
            Value::Array(v) => Some(v.len()),
            Value::Set(s) => Some(s.len()),
            Value::Map(m) => Some(m.len()),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
