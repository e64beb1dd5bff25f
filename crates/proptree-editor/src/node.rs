//! Property nodes and the generational arena that owns them.
//!
//! A [`PropertyTree`](crate::tree::PropertyTree) never hands out references
//! to nodes that outlive a rebuild. Callers hold [`NodeId`]s; once a subtree
//! is rebuilt, the old ids go stale and every lookup through them returns
//! `None`.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;
use proptree_reflect::instance::InstanceId;
use proptree_reflect::location::ValueLocation;
use proptree_reflect::schema::{FieldId, TypeKey};

use crate::condition::EditCondition;
use crate::restriction::PropertyRestriction;

// ---------------------------------------------------------------------------
// NodeId
// ---------------------------------------------------------------------------

/// Handle to a node in a property tree: index plus generation packed in a
/// `u64`, like [`InstanceId`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub fn new(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | index as u64)
    }

    pub fn index(self) -> u32 {
        self.0 as u32
    }

    pub fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({}v{})", self.index(), self.generation())
    }
}

// ---------------------------------------------------------------------------
// Flags
// ---------------------------------------------------------------------------

bitflags! {
    /// Per-node state bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct NodeFlags: u32 {
        const EXPANDED = 1 << 0;
        const CAN_BE_EXPANDED = 1 << 1;
        const HAS_EVER_BEEN_EXPANDED = 1 << 2;
        /// Object reference whose target is shown as a nested instance node.
        const EDIT_INLINE = 1 << 3;
        /// Group fields of instance nodes under category nodes.
        const SHOW_CATEGORIES = 1 << 4;
        const SHOW_HIDDEN = 1 << 5;
        const SHOW_DISABLE_EDIT_ON_INSTANCE = 1 << 6;
        const GAME_MODE_ONLY = 1 << 7;
        const ADVANCED = 1 << 8;
        /// Value may change shape under the node; validation inspects it.
        const REQUIRES_VALIDATION = 1 << 9;
        const READ_ONLY = 1 << 10;
        const SPARSE_DATA = 1 << 11;
        const MAP_KEY = 1 << 12;
        /// Instance node that already appears among its ancestors.
        const CIRCULAR_REFERENCE = 1 << 13;
        /// Instances disagree on the container size; children are left alone.
        const SKIP_CHILD_VALIDATION = 1 << 14;
    }
}

impl NodeFlags {
    /// Flags children copy from their parent.
    pub const INHERITED: NodeFlags = NodeFlags::SHOW_HIDDEN
        .union(NodeFlags::SHOW_DISABLE_EDIT_ON_INSTANCE)
        .union(NodeFlags::GAME_MODE_ONLY)
        .union(NodeFlags::READ_ONLY)
        .union(NodeFlags::REQUIRES_VALIDATION)
        .union(NodeFlags::SPARSE_DATA);
}

// ---------------------------------------------------------------------------
// Node kinds
// ---------------------------------------------------------------------------

/// The set of instances a node edits together.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceSet {
    /// One entry per editing slot. Nested instance nodes hold `None` where
    /// the owning reference is null.
    pub instances: Vec<Option<InstanceId>>,
    /// Most derived type all live instances share.
    pub base_type: Option<TypeKey>,
}

impl InstanceSet {
    /// Non-null entries in slot order.
    pub fn live(&self) -> impl Iterator<Item = InstanceId> + '_ {
        self.instances.iter().flatten().copied()
    }
}

/// What a node represents.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// A set of object instances (the root, or the target of an
    /// edit-inline reference).
    Instance(InstanceSet),
    /// A `|`-delimited category grouping.
    Category { name: String, path: String },
    /// One field, static-array slot, or container element.
    Item { field: FieldId },
    /// A struct value owned by the tree.
    Standalone { struct_type: TypeKey },
}

// ---------------------------------------------------------------------------
// PropertyNode
// ---------------------------------------------------------------------------

/// One node of a property tree.
#[derive(Debug)]
pub struct PropertyNode {
    pub(crate) kind: NodeKind,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    /// Key node paired with a map value node. Key nodes are parented to the
    /// map node but are not among its children.
    pub(crate) key_node: Option<NodeId>,
    /// Slot or element index.
    pub(crate) array_index: Option<usize>,
    pub(crate) flags: NodeFlags,
    pub(crate) children_built: bool,
    /// Set by an external rebuild, cleared when validation reports it.
    pub(crate) children_rebuilt: bool,
    pub(crate) rebuild_requested: bool,
    pub(crate) cached_locations: RefCell<Option<Vec<Option<ValueLocation>>>>,
    pub(crate) diff_cache: Cell<Option<bool>>,
    pub(crate) edit_condition: Option<Rc<EditCondition>>,
    pub(crate) restrictions: Vec<Rc<PropertyRestriction>>,
}

impl PropertyNode {
    pub(crate) fn new(kind: NodeKind, parent: Option<NodeId>, flags: NodeFlags) -> Self {
        Self {
            kind,
            parent,
            children: Vec::new(),
            key_node: None,
            array_index: None,
            flags,
            children_built: false,
            children_rebuilt: false,
            rebuild_requested: false,
            cached_locations: RefCell::new(None),
            diff_cache: Cell::new(None),
            edit_condition: None,
            restrictions: Vec::new(),
        }
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children built so far. Empty until the node has been expanded.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn key_node(&self) -> Option<NodeId> {
        self.key_node
    }

    pub fn array_index(&self) -> Option<usize> {
        self.array_index
    }

    pub fn flags(&self) -> NodeFlags {
        self.flags
    }

    pub fn has_flags(&self, flags: NodeFlags) -> bool {
        self.flags.contains(flags)
    }

    pub fn is_expanded(&self) -> bool {
        self.flags.contains(NodeFlags::EXPANDED)
    }

    /// Field of an item node.
    pub fn field(&self) -> Option<FieldId> {
        match self.kind {
            NodeKind::Item { field } => Some(field),
            _ => None,
        }
    }

    /// Instances of an instance node.
    pub fn instance_set(&self) -> Option<&InstanceSet> {
        match &self.kind {
            NodeKind::Instance(set) => Some(set),
            _ => None,
        }
    }

    pub fn is_category(&self) -> bool {
        matches!(self.kind, NodeKind::Category { .. })
    }

    /// Drop cached locations and the cached default comparison.
    pub(crate) fn invalidate_caches(&self) {
        self.cached_locations.replace(None);
        self.diff_cache.set(None);
    }
}

// ---------------------------------------------------------------------------
// NodeArena
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<PropertyNode>,
}

/// Generational storage for nodes. Freed indices are recycled FIFO with a
/// bumped generation so stale ids never alias a new node.
#[derive(Debug, Default)]
pub struct NodeArena {
    slots: Vec<Slot>,
    free_list: VecDeque<u32>,
    live: usize,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node: PropertyNode) -> NodeId {
        self.live += 1;
        if let Some(index) = self.free_list.pop_front() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return NodeId::new(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeId::new(index, 0)
    }

    /// Free a node. Returns it if `id` was live.
    pub fn remove(&mut self, id: NodeId) -> Option<PropertyNode> {
        let slot = self.slots.get_mut(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push_back(id.index());
        self.live -= 1;
        Some(node)
    }

    pub fn get(&self, id: NodeId) -> Option<&PropertyNode> {
        self.slots
            .get(id.index() as usize)
            .filter(|s| s.generation == id.generation())
            .and_then(|s| s.node.as_ref())
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut PropertyNode> {
        self.slots
            .get_mut(id.index() as usize)
            .filter(|s| s.generation == id.generation())
            .and_then(|s| s.node.as_mut())
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
