//! Value locations: a root plus a path of steps into nested values.
//!
//! A location never holds a reference into storage. It is re-applied to the
//! live root on every access, so resizing a container invalidates nothing but
//! the steps that now point past the end, and those resolve to `None`.

use serde::{Deserialize, Serialize};

use crate::instance::InstanceId;
use crate::schema::TypeKey;
use crate::value::Value;

/// Where a location path starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocationRoot {
    /// The data block of an instance.
    Instance(InstanceId),
    /// The sparse block of `block`, reached through `owner`.
    Sparse { owner: InstanceId, block: TypeKey },
    /// A struct value owned by the editor itself.
    Standalone,
}

/// One step of a location path. Container steps carry *internal* indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathStep {
    /// Member at this layout offset of a struct value.
    Field(usize),
    /// Slot of a static array.
    Slot(usize),
    /// Element of a dynamic array.
    Element(usize),
    /// Internal slot of a set.
    SetSlot(usize),
    /// Key of the pair at this internal map slot.
    MapKey(usize),
    /// Value of the pair at this internal map slot.
    MapValue(usize),
}

/// Root-plus-path address of a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValueLocation {
    pub root: LocationRoot,
    pub steps: Vec<PathStep>,
}

impl ValueLocation {
    pub fn new(root: LocationRoot) -> Self {
        Self {
            root,
            steps: Vec::new(),
        }
    }

    /// This location extended by one step.
    pub fn child(&self, step: PathStep) -> Self {
        let mut steps = Vec::with_capacity(self.steps.len() + 1);
        steps.extend_from_slice(&self.steps);
        steps.push(step);
        Self {
            root: self.root,
            steps,
        }
    }

    /// Location of the containing value, or `None` at the root.
    pub fn parent(&self) -> Option<Self> {
        let (_, rest) = self.steps.split_last()?;
        Some(Self {
            root: self.root,
            steps: rest.to_vec(),
        })
    }

    /// Instance owning the root, if any.
    pub fn owner(&self) -> Option<InstanceId> {
        match self.root {
            LocationRoot::Instance(id) | LocationRoot::Sparse { owner: id, .. } => Some(id),
            LocationRoot::Standalone => None,
        }
    }

    /// Same path applied to another instance of a compatible type. Sparse
    /// and standalone roots are shared, so they have no per-instance
    /// counterpart.
    pub fn rerooted(&self, instance: InstanceId) -> Option<Self> {
        match self.root {
            LocationRoot::Instance(_) => Some(Self {
                root: LocationRoot::Instance(instance),
                steps: self.steps.clone(),
            }),
            _ => None,
        }
    }

    /// Whether two locations have the same path shape, ignoring which
    /// instance they start from.
    pub fn same_shape(&self, other: &ValueLocation) -> bool {
        let roots_match = match (self.root, other.root) {
            (LocationRoot::Instance(_), LocationRoot::Instance(_)) => true,
            (LocationRoot::Sparse { block: a, .. }, LocationRoot::Sparse { block: b, .. }) => a == b,
            (LocationRoot::Standalone, LocationRoot::Standalone) => true,
            _ => false,
        };
        roots_match && self.steps == other.steps
    }
}

// ---------------------------------------------------------------------------
// Path application
// ---------------------------------------------------------------------------

fn step_ref(value: &Value, step: PathStep) -> Option<&Value> {
    match (value, step) {
        (Value::Struct(members), PathStep::Field(i)) => members.get(i),
        (Value::Fixed(slots), PathStep::Slot(i)) => slots.get(i),
        (Value::Array(items), PathStep::Element(i)) => items.get(i),
        (Value::Set(items), PathStep::SetSlot(i)) => items.get(i),
        (Value::Map(pairs), PathStep::MapKey(i)) => pairs.get(i).map(|(k, _)| k),
        (Value::Map(pairs), PathStep::MapValue(i)) => pairs.get(i).map(|(_, v)| v),
        _ => None,
    }
}

fn step_mut(value: &mut Value, step: PathStep) -> Option<&mut Value> {
    match (value, step) {
        (Value::Struct(members), PathStep::Field(i)) => members.get_mut(i),
        (Value::Fixed(slots), PathStep::Slot(i)) => slots.get_mut(i),
        (Value::Array(items), PathStep::Element(i)) => items.get_mut(i),
        (Value::Set(items), PathStep::SetSlot(i)) => items.get_mut(i),
        (Value::Map(pairs), PathStep::MapKey(i)) => pairs.get_mut(i).map(|(k, _)| k),
        (Value::Map(pairs), PathStep::MapValue(i)) => pairs.get_mut(i).map(|(_, v)| v),
        _ => None,
    }
}

/// Follow `steps` from `root`. Out-of-range or mis-shaped steps yield `None`.
pub fn value_at<'v>(root: &'v Value, steps: &[PathStep]) -> Option<&'v Value> {
    steps.iter().try_fold(root, |v, step| step_ref(v, *step))
}

/// Mutable counterpart of [`value_at`].
pub fn value_at_mut<'v>(root: &'v mut Value, steps: &[PathStep]) -> Option<&'v mut Value> {
    steps.iter().try_fold(root, |v, step| step_mut(v, *step))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
