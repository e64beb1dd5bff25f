//! Tree construction, lazy expansion, and child rebuilding.
//!
//! The root is an instance node over the edited instances (or a standalone
//! struct node). Instance nodes build their children eagerly, grouped under
//! category nodes when categories are shown. Item nodes build children only
//! when expanded or explicitly requested.
//!
//! Rebuilding a node throws its subtree away and builds it again from the
//! current data. Expansion state below the node survives by path.

use std::collections::HashSet;
use std::rc::Rc;
use std::sync::Arc;

use proptree_reflect::instance::InstanceId;
use proptree_reflect::metadata::{keys, MetadataRegistry};
use proptree_reflect::schema::{FieldFlags, FieldId, FieldKind, Schema, TypeKey, TypeKind};
use proptree_reflect::store::InstanceStore;
use proptree_reflect::value::Value;

use crate::condition::EditCondition;
use crate::config::TreeConfig;
use crate::node::{InstanceSet, NodeArena, NodeFlags, NodeId, NodeKind, PropertyNode};
use crate::notify::{ChangeNotifier, TreeEventKind};
use crate::AccessError;

// ---------------------------------------------------------------------------
// PropertyTree
// ---------------------------------------------------------------------------

/// Editable view over a set of instances or a standalone struct value.
pub struct PropertyTree {
    pub(crate) arena: NodeArena,
    pub(crate) root: NodeId,
    pub(crate) schema: Arc<Schema>,
    pub(crate) metadata: Arc<MetadataRegistry>,
    pub(crate) config: TreeConfig,
    /// Value edited by a standalone tree.
    pub(crate) standalone: Option<Value>,
    pub(crate) notifier: ChangeNotifier,
}

impl PropertyTree {
    /// Tree over `instances`, edited together.
    pub fn for_instances(
        store: &InstanceStore,
        instances: &[InstanceId],
        metadata: Arc<MetadataRegistry>,
        config: TreeConfig,
    ) -> Self {
        let schema = Arc::clone(store.schema());
        let mut arena = NodeArena::new();
        let root = arena.insert(PropertyNode::new(
            NodeKind::Instance(InstanceSet {
                instances: Vec::new(),
                base_type: None,
            }),
            None,
            config.root_flags(),
        ));
        let mut tree = Self {
            arena,
            root,
            schema,
            metadata,
            config,
            standalone: None,
            notifier: ChangeNotifier::new(),
        };
        tree.assign_instances(instances, store);
        tree
    }

    /// Tree over a struct value it owns. `value` defaults to the type's
    /// default construction.
    pub fn for_struct(
        schema: Arc<Schema>,
        struct_type: TypeKey,
        value: Option<Value>,
        metadata: Arc<MetadataRegistry>,
        config: TreeConfig,
    ) -> Result<Self, AccessError> {
        let desc = schema.try_type(struct_type).ok_or(AccessError::NoLocation)?;
        if desc.kind != TypeKind::Struct {
            return Err(AccessError::TypeMismatch {
                expected: "struct",
                found: "object",
            });
        }
        let value = value.unwrap_or_else(|| schema.default_struct(struct_type));
        let members = desc.fields();
        let conforms = match &value {
            Value::Struct(values) => {
                values.len() == members.len()
                    && members.iter().zip(values).all(|(f, v)| schema.conforms(*f, v))
            }
            _ => false,
        };
        if !conforms {
            return Err(AccessError::TypeMismatch {
                expected: "struct",
                found: value.kind_name(),
            });
        }

        let mut arena = NodeArena::new();
        let root = arena.insert(PropertyNode::new(
            NodeKind::Standalone { struct_type },
            None,
            config.root_flags(),
        ));
        let mut tree = Self {
            arena,
            root,
            schema,
            metadata,
            config,
            standalone: Some(value),
            notifier: ChangeNotifier::new(),
        };
        tree.build_standalone_children(root);
        Ok(tree)
    }

    // -- accessors ----------------------------------------------------------

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&PropertyNode> {
        self.arena.get(id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.arena.contains(id)
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn metadata(&self) -> &Arc<MetadataRegistry> {
        &self.metadata
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Built children of `id`; empty for stale ids.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.arena.get(id).map_or(&[], |n| n.children.as_slice())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.arena.get(id)?.parent
    }

    /// Struct value edited by a standalone tree.
    pub fn standalone_value(&self) -> Option<&Value> {
        self.standalone.as_ref()
    }

    /// Instances edited at the root, including ones that have since died.
    pub fn instances(&self) -> Vec<InstanceId> {
        self.arena
            .get(self.root)
            .and_then(PropertyNode::instance_set)
            .map(|set| set.live().collect())
            .unwrap_or_default()
    }

    // -- root instances -----------------------------------------------------

    /// Replace the edited instances and rebuild the whole tree.
    pub fn set_instances(&mut self, instances: &[InstanceId], store: &InstanceStore) {
        self.assign_instances(instances, store);
        self.mark_rebuilt(self.root);
    }

    fn assign_instances(&mut self, instances: &[InstanceId], store: &InstanceStore) {
        let live_types: Vec<TypeKey> = instances.iter().filter_map(|i| store.type_of(*i)).collect();
        let base_type = self.schema.common_ancestor(&live_types);
        let all_templates = !instances.is_empty()
            && instances
                .iter()
                .all(|i| store.get(*i).is_some_and(|inst| inst.template));
        let show_disabled = self.config.show_disable_edit_on_instance || all_templates;

        let root = self.root;
        self.destroy_children(root);
        if let Some(node) = self.arena.get_mut(root) {
            node.kind = NodeKind::Instance(InstanceSet {
                instances: instances.iter().copied().map(Some).collect(),
                base_type,
            });
            node.flags
                .set(NodeFlags::SHOW_DISABLE_EDIT_ON_INSTANCE, show_disabled);
            node.invalidate_caches();
        }
        tracing::debug!(count = instances.len(), base_type = ?base_type, "editing instances");
        self.build_children(root, store);
    }

    /// Drop root instances that are no longer alive and rebuild. Returns the
    /// number removed.
    pub fn purge_invalid_instances(&mut self, store: &InstanceStore) -> usize {
        let Some(set) = self.arena.get(self.root).and_then(PropertyNode::instance_set) else {
            return 0;
        };
        let before = set.instances.len();
        let alive: Vec<InstanceId> = set
            .live()
            .filter(|i| {
                store.is_alive(*i)
                    && store
                        .type_of(*i)
                        .is_some_and(|t| !store.is_type_retired(t))
            })
            .collect();
        let removed = before - alive.len();
        if removed > 0 {
            tracing::debug!(removed, "purged invalid instances");
            self.set_instances(&alive, store);
        }
        removed
    }

    // -- expansion ----------------------------------------------------------

    /// Expand or collapse a node. Expanding builds children on first use.
    /// Returns `false` for stale ids.
    pub fn set_expanded(&mut self, id: NodeId, expanded: bool, store: &InstanceStore) -> bool {
        let Some(node) = self.arena.get_mut(id) else {
            return false;
        };
        if expanded {
            node.flags
                .insert(NodeFlags::EXPANDED | NodeFlags::HAS_EVER_BEEN_EXPANDED);
            self.build_children(id, store);
        } else {
            node.flags.remove(NodeFlags::EXPANDED);
        }
        true
    }

    /// Build the children of `id` without expanding it.
    pub fn ensure_children(&mut self, id: NodeId, store: &InstanceStore) -> &[NodeId] {
        self.build_children(id, store);
        self.children(id)
    }

    /// Expand every expandable node under `id`.
    pub fn expand_all(&mut self, id: NodeId, store: &InstanceStore) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let expandable = self.arena.get(current).is_some_and(|n| {
                n.has_flags(NodeFlags::CAN_BE_EXPANDED)
                    && !n.has_flags(NodeFlags::CIRCULAR_REFERENCE)
            });
            if expandable {
                self.set_expanded(current, true, store);
            }
            stack.extend(self.children(current).iter().copied());
        }
    }

    // -- rebuilding ---------------------------------------------------------

    /// Rebuild the children of `id` from current data. The next
    /// validation reports [`ChildrenRebuilt`](crate::validate::ValidationResult::ChildrenRebuilt).
    pub fn rebuild_children(&mut self, id: NodeId, store: &InstanceStore) {
        if !self.arena.contains(id) {
            return;
        }
        self.rebuild_internal(id, store);
        self.mark_rebuilt(id);
    }

    /// Ask the next validation to rebuild `id`.
    pub fn request_rebuild(&mut self, id: NodeId) {
        if let Some(node) = self.arena.get_mut(id) {
            node.rebuild_requested = true;
        }
    }

    pub(crate) fn mark_rebuilt(&mut self, id: NodeId) {
        if let Some(node) = self.arena.get_mut(id) {
            node.children_rebuilt = true;
        }
        self.emit(id, TreeEventKind::ChildrenRebuilt);
    }

    /// Rebuild without flagging the node as externally rebuilt.
    pub(crate) fn rebuild_internal(&mut self, id: NodeId, store: &InstanceStore) {
        let Some(node) = self.arena.get(id) else {
            return;
        };
        let was_built = node.children_built || node.is_expanded();
        let expanded = self.expanded_paths(id);
        self.destroy_children(id);
        if was_built {
            self.build_children(id, store);
            self.restore_expansion(id, id, &expanded, store);
        }
        self.invalidate_upwards(id);
        tracing::trace!(node = ?id, "rebuilt children");
    }

    fn destroy_children(&mut self, id: NodeId) {
        let Some(node) = self.arena.get_mut(id) else {
            return;
        };
        let children = std::mem::take(&mut node.children);
        node.children_built = false;
        for child in children {
            self.destroy_subtree(child);
        }
    }

    fn destroy_subtree(&mut self, id: NodeId) {
        let Some(node) = self.arena.remove(id) else {
            return;
        };
        if let Some(key) = node.key_node {
            self.destroy_subtree(key);
        }
        for child in node.children {
            self.destroy_subtree(child);
        }
    }

    /// Relative paths of every expanded node below `id`.
    fn expanded_paths(&self, id: NodeId) -> HashSet<String> {
        let mut out = HashSet::new();
        let mut stack: Vec<NodeId> = self.children(id).to_vec();
        while let Some(current) = stack.pop() {
            let Some(node) = self.arena.get(current) else {
                continue;
            };
            if node.is_expanded() {
                out.insert(self.path_between(current, Some(id), true));
            }
            stack.extend(node.children.iter().copied());
        }
        out
    }

    fn restore_expansion(
        &mut self,
        anchor: NodeId,
        id: NodeId,
        expanded: &HashSet<String>,
        store: &InstanceStore,
    ) {
        for child in self.children(id).to_vec() {
            let Some(node) = self.arena.get(child) else {
                continue;
            };
            let transparent = !matches!(node.kind, NodeKind::Item { .. });
            if expanded.contains(&self.path_between(child, Some(anchor), true)) {
                self.set_expanded(child, true, store);
            }
            let built = self.arena.get(child).is_some_and(|n| n.children_built);
            if built || transparent {
                self.restore_expansion(anchor, child, expanded, store);
            }
        }
    }

    /// Drop cached comparison results of `id` and every ancestor, and every
    /// cache of its subtree.
    pub(crate) fn invalidate_upwards(&self, id: NodeId) {
        let mut current = self.arena.get(id).and_then(|n| n.parent);
        while let Some(ancestor) = current {
            let Some(node) = self.arena.get(ancestor) else {
                break;
            };
            node.diff_cache.set(None);
            current = node.parent;
        }
        self.invalidate_subtree(id);
    }

    pub(crate) fn invalidate_subtree(&self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.arena.get(current) else {
                continue;
            };
            node.invalidate_caches();
            stack.extend(node.children.iter().copied());
            stack.extend(node.key_node);
        }
    }

    // -- building -----------------------------------------------------------

    pub(crate) fn build_children(&mut self, id: NodeId, store: &InstanceStore) {
        let Some(node) = self.arena.get(id) else {
            return;
        };
        if node.children_built {
            return;
        }
        let kind = node.kind.clone();
        let array_index = node.array_index;
        if let Some(node) = self.arena.get_mut(id) {
            node.children_built = true;
        }
        match kind {
            NodeKind::Instance(set) => self.build_instance_children(id, &set),
            NodeKind::Item { field } => self.build_item_children(id, field, array_index, store),
            NodeKind::Standalone { .. } => self.build_standalone_children(id),
            NodeKind::Category { .. } => {}
        }
    }

    fn build_instance_children(&mut self, id: NodeId, set: &InstanceSet) {
        let Some(base) = set.base_type else {
            return;
        };
        if self.is_circular(id, set) {
            tracing::debug!(node = ?id, "circular reference, not expanding");
            if let Some(node) = self.arena.get_mut(id) {
                node.flags.insert(NodeFlags::CIRCULAR_REFERENCE);
            }
            return;
        }
        let schema = Arc::clone(&self.schema);
        let desc = schema.type_desc(base);
        let flags = self.arena.get(id).map_or(NodeFlags::empty(), |n| n.flags);
        let hidden = self.metadata.hidden_categories(&schema, base);

        for field in desc.fields().iter().chain(desc.sparse_fields()).copied() {
            if !self.field_visible(field, flags) {
                continue;
            }
            let category = self.category_path(field);
            let top = category.split('|').next().unwrap_or_default().trim();
            if hidden.iter().any(|h| h == &category || h == top) {
                continue;
            }
            let parent = if flags.contains(NodeFlags::SHOW_CATEGORIES) {
                self.category_node(id, &category)
            } else {
                id
            };
            let child = self.alloc_child(parent, NodeKind::Item { field }, None, NodeFlags::empty());
            self.push_child(parent, child);
        }
    }

    fn build_standalone_children(&mut self, id: NodeId) {
        let Some(NodeKind::Standalone { struct_type }) = self.arena.get(id).map(|n| n.kind.clone())
        else {
            return;
        };
        if let Some(node) = self.arena.get_mut(id) {
            node.children_built = true;
        }
        self.build_struct_members(id, struct_type);
    }

    fn build_struct_members(&mut self, id: NodeId, ty: TypeKey) {
        let schema = Arc::clone(&self.schema);
        let flags = self.arena.get(id).map_or(NodeFlags::empty(), |n| n.flags);
        for member in schema.type_desc(ty).fields().iter().copied() {
            if self.field_visible(member, flags) {
                let child = self.alloc_child(id, NodeKind::Item { field: member }, None, NodeFlags::empty());
                self.push_child(id, child);
            }
        }
    }

    fn build_item_children(
        &mut self,
        id: NodeId,
        field: FieldId,
        array_index: Option<usize>,
        store: &InstanceStore,
    ) {
        let schema = Arc::clone(&self.schema);
        let desc = schema.field(field);

        if desc.is_static_array() && array_index.is_none() {
            for slot in 0..desc.static_arity {
                let child = self.alloc_child(id, NodeKind::Item { field }, Some(slot), NodeFlags::empty());
                self.push_child(id, child);
            }
            return;
        }

        match desc.kind {
            FieldKind::Struct(ty) => self.build_struct_members(id, ty),
            FieldKind::Array { element } | FieldKind::Set { element } => {
                let Some(len) = self.consistent_len(id, store) else {
                    self.set_flag(id, NodeFlags::SKIP_CHILD_VALIDATION, true);
                    return;
                };
                self.set_flag(id, NodeFlags::SKIP_CHILD_VALIDATION, false);
                for index in 0..len {
                    let child =
                        self.alloc_child(id, NodeKind::Item { field: element }, Some(index), NodeFlags::empty());
                    self.push_child(id, child);
                }
            }
            FieldKind::Map { key, value } => {
                let Some(len) = self.consistent_len(id, store) else {
                    self.set_flag(id, NodeFlags::SKIP_CHILD_VALIDATION, true);
                    return;
                };
                self.set_flag(id, NodeFlags::SKIP_CHILD_VALIDATION, false);
                for index in 0..len {
                    let key_node =
                        self.alloc_child(id, NodeKind::Item { field: key }, Some(index), NodeFlags::MAP_KEY);
                    let value_node =
                        self.alloc_child(id, NodeKind::Item { field: value }, Some(index), NodeFlags::empty());
                    if let Some(node) = self.arena.get_mut(value_node) {
                        node.key_node = Some(key_node);
                    }
                    self.push_child(id, value_node);
                }
            }
            FieldKind::ObjectReference { .. } => {
                let edit_inline = self
                    .arena
                    .get(id)
                    .is_some_and(|n| n.has_flags(NodeFlags::EDIT_INLINE));
                if edit_inline && self.inline_depth(id) < self.config.max_edit_inline_depth {
                    self.build_inline_object(id, store);
                }
            }
            FieldKind::Scalar(_) => {}
        }
    }

    fn build_inline_object(&mut self, id: NodeId, store: &InstanceStore) {
        let refs = self.object_refs(id, store);
        if refs.iter().all(Option::is_none) {
            return;
        }
        let types: Vec<TypeKey> = refs.iter().flatten().filter_map(|i| store.type_of(*i)).collect();
        let set = InstanceSet {
            instances: refs,
            base_type: self.schema.common_ancestor(&types),
        };
        let nested = self.alloc_child(
            id,
            NodeKind::Instance(set),
            None,
            NodeFlags::EXPANDED | NodeFlags::CAN_BE_EXPANDED,
        );
        self.push_child(id, nested);
        self.build_children(nested, store);
    }

    /// Create a node under `parent` without linking it into the parent's
    /// children.
    pub(crate) fn alloc_child(
        &mut self,
        parent: NodeId,
        kind: NodeKind,
        array_index: Option<usize>,
        extra: NodeFlags,
    ) -> NodeId {
        let parent_flags = self.arena.get(parent).map_or(NodeFlags::empty(), |p| p.flags);
        let mut flags = (parent_flags & NodeFlags::INHERITED) | extra;
        let mut condition = None;

        if let NodeKind::Item { field } = &kind {
            let desc = self.schema.field(*field);
            flags.set(NodeFlags::ADVANCED, desc.flags.contains(FieldFlags::ADVANCED));
            if desc.is_sparse() {
                flags.insert(NodeFlags::SPARSE_DATA);
            }
            if desc.kind.is_container() || desc.kind.is_object() || desc.kind.is_struct() {
                flags.insert(NodeFlags::REQUIRES_VALIDATION);
            }
            if desc.kind.is_object() && desc.flags.contains(FieldFlags::EDIT_INLINE) {
                flags.insert(NodeFlags::EDIT_INLINE);
            }
            let header = desc.is_static_array() && array_index.is_none();
            let expandable = header
                || desc.kind.is_struct()
                || desc.kind.is_container()
                || flags.contains(NodeFlags::EDIT_INLINE);
            flags.set(NodeFlags::CAN_BE_EXPANDED, expandable);
            if array_index.is_none() {
                condition = self
                    .metadata
                    .field_meta(*field, keys::EDIT_CONDITION)
                    .map(|text| Rc::new(EditCondition::parse(text)));
            }
        }

        let mut node = PropertyNode::new(kind, Some(parent), flags);
        node.array_index = array_index;
        node.edit_condition = condition;
        self.arena.insert(node)
    }

    pub(crate) fn push_child(&mut self, parent: NodeId, child: NodeId) {
        if let Some(node) = self.arena.get_mut(parent) {
            node.children.push(child);
        }
    }

    fn set_flag(&mut self, id: NodeId, flag: NodeFlags, on: bool) {
        if let Some(node) = self.arena.get_mut(id) {
            node.flags.set(flag, on);
        }
    }

    /// Category node for a `|`-delimited path under an instance node,
    /// created on first use.
    fn category_node(&mut self, instance: NodeId, path: &str) -> NodeId {
        let mut parent = instance;
        let mut full = String::new();
        for segment in path.split('|').map(str::trim).filter(|s| !s.is_empty()) {
            if !full.is_empty() {
                full.push('|');
            }
            full.push_str(segment);
            let existing = self.children(parent).iter().copied().find(|c| {
                self.arena
                    .get(*c)
                    .is_some_and(|n| matches!(&n.kind, NodeKind::Category { name, .. } if name == segment))
            });
            parent = match existing {
                Some(found) => found,
                None => {
                    let category = self.alloc_child(
                        parent,
                        NodeKind::Category {
                            name: segment.to_owned(),
                            path: full.clone(),
                        },
                        None,
                        NodeFlags::EXPANDED | NodeFlags::CAN_BE_EXPANDED,
                    );
                    if let Some(node) = self.arena.get_mut(category) {
                        node.children_built = true;
                    }
                    self.push_child(parent, category);
                    category
                }
            };
        }
        parent
    }

    /// Category of a field, defaulting to its declaring type's name.
    pub(crate) fn category_path(&self, field: FieldId) -> String {
        match self.metadata.category(field) {
            Some(category) => category.to_owned(),
            None => {
                let declaring = self.schema.field(field).declaring_type;
                self.schema.type_desc(declaring).name.clone()
            }
        }
    }

    /// Whether a field gets a node under a parent with `flags`.
    pub(crate) fn field_visible(&self, field: FieldId, flags: NodeFlags) -> bool {
        if flags.contains(NodeFlags::SHOW_HIDDEN) {
            return true;
        }
        if flags.contains(NodeFlags::GAME_MODE_ONLY) {
            return self.metadata.has_field_meta(field, keys::EDIT_IN_RUNTIME)
                || self.metadata.has_field_meta(field, keys::CALL_IN_RUNTIME);
        }
        let desc = self.schema.field(field);
        desc.flags.contains(FieldFlags::EDIT)
            && !self
                .metadata
                .has_field_meta(field, keys::INLINE_EDIT_CONDITION_TOGGLE)
            && (flags.contains(NodeFlags::SHOW_DISABLE_EDIT_ON_INSTANCE)
                || !desc.flags.contains(FieldFlags::DISABLE_EDIT_ON_INSTANCE))
    }

    /// An instance node whose instances already appear above it.
    fn is_circular(&self, id: NodeId, set: &InstanceSet) -> bool {
        let mut current = self.arena.get(id).and_then(|n| n.parent);
        while let Some(ancestor) = current {
            let Some(node) = self.arena.get(ancestor) else {
                break;
            };
            if let NodeKind::Instance(outer) = &node.kind {
                if set.live().any(|i| outer.instances.contains(&Some(i))) {
                    return true;
                }
            }
            current = node.parent;
        }
        false
    }

    /// Number of instance nodes above `id`.
    fn inline_depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut current = self.arena.get(id).and_then(|n| n.parent);
        while let Some(ancestor) = current {
            let Some(node) = self.arena.get(ancestor) else {
                break;
            };
            if matches!(node.kind, NodeKind::Instance(_)) && node.parent.is_some() {
                depth += 1;
            }
            current = node.parent;
        }
        depth
    }

    /// Container length shared by every edited instance, or `None` when
    /// they disagree or a value is unreachable.
    pub(crate) fn consistent_len(&self, id: NodeId, store: &InstanceStore) -> Option<usize> {
        let mut lens = self
            .locations(id, store)
            .into_iter()
            .map(|loc| self.read_value(loc.as_ref()?, store)?.container_len());
        let first = match lens.next() {
            None => return Some(0),
            Some(len) => len?,
        };
        for len in lens {
            if len? != first {
                return None;
            }
        }
        Some(first)
    }

    /// Live targets of an object reference node, per slot.
    pub(crate) fn object_refs(&self, id: NodeId, store: &InstanceStore) -> Vec<Option<InstanceId>> {
        self.locations(id, store)
            .into_iter()
            .map(|loc| {
                loc.and_then(|l| self.read_value(&l, store).and_then(Value::as_object))
                    .flatten()
                    .filter(|i| store.is_alive(*i))
            })
            .collect()
    }

    // -- paths and lookup ---------------------------------------------------

    /// Field path of a node from the root, e.g. `"Wheels[2].Radius"`.
    /// Categories and nested instance nodes do not contribute.
    pub fn property_path(&self, id: NodeId) -> String {
        self.path_between(id, None, false)
    }

    pub(crate) fn path_between(&self, id: NodeId, stop: Option<NodeId>, categories: bool) -> String {
        let mut segments = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            if Some(node_id) == stop {
                break;
            }
            let Some(node) = self.arena.get(node_id) else {
                break;
            };
            match (&node.kind, node.array_index) {
                (NodeKind::Item { .. }, Some(i)) if node.has_flags(NodeFlags::MAP_KEY) => {
                    segments.push(format!("[{i}]#key"))
                }
                (NodeKind::Item { .. }, Some(i)) => segments.push(format!("[{i}]")),
                (NodeKind::Item { field }, None) => {
                    segments.push(self.schema.field(*field).name.clone())
                }
                (NodeKind::Category { name, .. }, _) if categories => {
                    segments.push(format!("<{name}>"))
                }
                _ => {}
            }
            current = node.parent;
        }
        let mut out = String::new();
        for segment in segments.iter().rev() {
            if !out.is_empty() && !segment.starts_with('[') {
                out.push('.');
            }
            out.push_str(segment);
        }
        out
    }

    /// Child item of `parent` for the named field, looking through
    /// category and nested instance nodes.
    pub fn find_child_by_name(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        for child in self.children(parent) {
            let node = self.arena.get(*child)?;
            match &node.kind {
                NodeKind::Item { field }
                    if node.array_index.is_none() && self.schema.field(*field).name == name =>
                {
                    return Some(*child)
                }
                NodeKind::Category { .. } | NodeKind::Instance(_) => {
                    if let Some(found) = self.find_child_by_name(*child, name) {
                        return Some(found);
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// Resolve a field path such as `"Engine.Mass"` or `"Items[1]"`,
    /// building children along the way without expanding them.
    pub fn find_by_path(&mut self, path: &str, store: &InstanceStore) -> Option<NodeId> {
        let mut current = self.root;
        for segment in path.split('.') {
            let (name, indices) = match segment.find('[') {
                Some(at) => (&segment[..at], &segment[at..]),
                None => (segment, ""),
            };
            if !name.is_empty() {
                self.build_children(current, store);
                self.build_transparent(current, store);
                current = self.find_child_by_name(current, name)?;
            }
            for index in indices.split(']').filter(|s| !s.is_empty()) {
                let index: usize = index.trim_start_matches('[').trim().parse().ok()?;
                self.build_children(current, store);
                current = *self.children(current).get(index)?;
            }
        }
        Some(current)
    }

    fn build_transparent(&mut self, id: NodeId, store: &InstanceStore) {
        for child in self.children(id).to_vec() {
            let transparent = self
                .arena
                .get(child)
                .is_some_and(|n| !matches!(n.kind, NodeKind::Item { .. }));
            if transparent {
                self.build_children(child, store);
                self.build_transparent(child, store);
            }
        }
    }
}

impl std::fmt::Debug for PropertyTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyTree")
            .field("root", &self.root)
            .field("nodes", &self.arena.len())
            .field("config", &self.config)
            .field("notify_state", &self.notifier.state())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
