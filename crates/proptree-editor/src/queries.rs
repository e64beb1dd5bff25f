//! Per-node presentation and editability queries.
//!
//! Edit conditions are evaluated once per edited instance against the
//! node's sibling fields: the fields of the enclosing object for top-level
//! members, or of the enclosing struct for struct members. Container
//! elements and static-array slots use their container's condition. A
//! condition that fails to parse or evaluate for any instance counts as not
//! met.

use std::rc::Rc;

use proptree_reflect::instance::InstanceId;
use proptree_reflect::location::{LocationRoot, PathStep, ValueLocation};
use proptree_reflect::metadata::keys;
use proptree_reflect::schema::{FieldDescriptor, FieldFlags, FieldId, FieldKind, ScalarKind, TypeKey};
use proptree_reflect::store::InstanceStore;
use proptree_reflect::value::Value;

use crate::access::EditFlags;
use crate::condition::{ConditionContext, ConditionError, EditCondition, Operand};
use crate::node::{NodeFlags, NodeId, NodeKind};
use crate::tree::PropertyTree;
use crate::AccessError;

// ---------------------------------------------------------------------------
// Sibling scopes
// ---------------------------------------------------------------------------

/// Where the siblings of a node live for one slot.
#[derive(Debug, Clone)]
enum ScopeRoot {
    Instance(InstanceId),
    Nested(ValueLocation),
    Standalone,
}

/// Resolves condition operands against the siblings of a node in one slot.
struct SiblingScope<'a> {
    tree: &'a PropertyTree,
    store: &'a InstanceStore,
    ty: TypeKey,
    root: ScopeRoot,
}

impl SiblingScope<'_> {
    fn location(&self, desc: &FieldDescriptor) -> ValueLocation {
        let base = match &self.root {
            ScopeRoot::Instance(instance) if desc.is_sparse() => ValueLocation::new(LocationRoot::Sparse {
                owner: *instance,
                block: desc.declaring_type,
            }),
            ScopeRoot::Instance(instance) => ValueLocation::new(LocationRoot::Instance(*instance)),
            ScopeRoot::Nested(loc) => loc.clone(),
            ScopeRoot::Standalone => ValueLocation::new(LocationRoot::Standalone),
        };
        base.child(PathStep::Field(desc.offset))
    }
}

impl ConditionContext for SiblingScope<'_> {
    fn field(&self, name: &str) -> Result<Operand, ConditionError> {
        let schema = &self.tree.schema;
        let unknown = || ConditionError::UnknownField { name: name.to_owned() };
        let id = schema.find_field(self.ty, name).ok_or_else(unknown)?;
        let desc = schema.field(id);
        let unsupported = || ConditionError::UnsupportedField { name: name.to_owned() };
        if desc.is_static_array() {
            return Err(unsupported());
        }
        let value = self
            .tree
            .read_value(&self.location(desc), self.store)
            .ok_or_else(unknown)?;
        match (desc.kind, value) {
            (FieldKind::Scalar(ScalarKind::Bool), Value::Bool(b)) => Ok(Operand::Bool(*b)),
            (FieldKind::Scalar(ScalarKind::Int), Value::Int(i)) => Ok(Operand::Number(*i as f64)),
            (FieldKind::Scalar(ScalarKind::Float), Value::Float(f)) => Ok(Operand::Number(*f)),
            (FieldKind::Scalar(ScalarKind::Enum(key)), Value::Enum(v)) => Ok(Operand::Enum { key, value: *v }),
            (FieldKind::ObjectReference { .. }, Value::Object(reference)) => Ok(Operand::Object(*reference)),
            _ => Err(unsupported()),
        }
    }

    fn enum_value(&self, enum_name: &str, variant: &str) -> Result<Operand, ConditionError> {
        let schema = &self.tree.schema;
        let key = schema
            .enum_by_name(enum_name)
            .ok_or_else(|| ConditionError::UnknownEnum {
                name: enum_name.to_owned(),
            })?;
        let value = schema
            .enum_desc(key)
            .value_of(variant)
            .ok_or_else(|| ConditionError::UnknownEnumValue {
                enum_name: enum_name.to_owned(),
                variant: variant.to_owned(),
            })?;
        Ok(Operand::Enum { key, value })
    }
}

impl PropertyTree {
    // -- presentation -------------------------------------------------------

    /// Label shown for a node.
    pub fn display_name(&self, node: NodeId, store: &InstanceStore) -> String {
        let Some(n) = self.arena.get(node) else {
            return String::new();
        };
        match (&n.kind, n.array_index) {
            (NodeKind::Item { .. }, Some(index)) => format!("[{index}]"),
            (NodeKind::Item { field }, None) => self.metadata.display_name(self.schema.field(*field)),
            (NodeKind::Category { name, .. }, _) => name.clone(),
            (NodeKind::Instance(set), _) => {
                let live: Vec<InstanceId> = set.live().collect();
                match (live.as_slice(), set.base_type) {
                    ([only], _) => store
                        .get(*only)
                        .map_or_else(|| "None".to_owned(), |i| i.name.clone()),
                    (_, Some(ty)) => format!(
                        "{} ({})",
                        self.metadata.type_display_name(&self.schema, ty),
                        live.len()
                    ),
                    (_, None) => "None".to_owned(),
                }
            }
            (NodeKind::Standalone { struct_type }, _) => {
                self.metadata.type_display_name(&self.schema, *struct_type)
            }
        }
    }

    pub fn tooltip(&self, node: NodeId) -> Option<String> {
        self.metadata.tooltip(self.meta_field(node)?).map(str::to_owned)
    }

    /// `|`-delimited category path of an item or category node.
    pub fn category(&self, node: NodeId) -> Option<String> {
        match &self.arena.get(node)?.kind {
            NodeKind::Category { path, .. } => Some(path.clone()),
            NodeKind::Item { .. } => Some(self.category_path(self.meta_field(node)?)),
            _ => None,
        }
    }

    pub fn is_advanced(&self, node: NodeId) -> bool {
        self.arena.get(node).is_some_and(|n| n.has_flags(NodeFlags::ADVANCED))
    }

    /// Field carrying the metadata of `node`: the node's own field, or the
    /// outermost container field for element descriptors.
    pub fn meta_field(&self, node: NodeId) -> Option<FieldId> {
        let mut field = self.arena.get(node)?.field()?;
        while let Some(outer) = self.schema.field(field).outer {
            field = outer;
        }
        Some(field)
    }

    /// `ClampMin`/`ClampMax` of the node's field.
    pub fn clamp_range(&self, node: NodeId) -> (Option<f64>, Option<f64>) {
        self.meta_field(node)
            .map_or((None, None), |f| self.metadata.clamp_range(f))
    }

    pub fn ui_range(&self, node: NodeId) -> (Option<f64>, Option<f64>) {
        self.meta_field(node)
            .map_or((None, None), |f| self.metadata.ui_range(f))
    }

    // -- editability --------------------------------------------------------

    /// Whether writes to `node` are refused.
    pub fn is_edit_const(&self, node: NodeId, store: &InstanceStore) -> bool {
        let Some(n) = self.arena.get(node) else {
            return true;
        };
        if n.has_flags(NodeFlags::READ_ONLY) {
            return true;
        }
        let Some(field) = self.meta_field(node) else {
            return false;
        };

        let mut current = Some(node);
        while let Some(id) = current {
            let Some(ancestor) = self.arena.get(id) else {
                break;
            };
            match ancestor.kind {
                NodeKind::Item { field } if self.schema.field(field).flags.contains(FieldFlags::EDIT_CONST) => {
                    return true
                }
                NodeKind::Instance(_) => break,
                _ => {}
            }
            current = ancestor.parent;
        }

        let flags = self.schema.field(field).flags;
        let roots = self.instances();
        let is_template = |i: &InstanceId| store.get(*i).is_some_and(|inst| inst.template);
        if flags.contains(FieldFlags::DISABLE_EDIT_ON_INSTANCE) && roots.iter().any(|i| !is_template(i)) {
            return true;
        }
        if flags.contains(FieldFlags::DISABLE_EDIT_ON_TEMPLATE) && roots.iter().any(is_template) {
            return true;
        }

        let chain = self.field_chain(node);
        let vetoed = self
            .object_boundaries(node)
            .any(|b| b.instances.iter().any(|i| !store.can_edit_change(*i, &chain)));
        if vetoed {
            return true;
        }

        !self.is_edit_condition_met(node, store)
    }

    /// Node whose condition gates `node`: the node itself, or its container
    /// for elements and slots.
    fn condition_node(&self, node: NodeId) -> Option<NodeId> {
        let mut current = node;
        loop {
            let n = self.arena.get(current)?;
            if n.array_index.is_none() {
                return Some(current);
            }
            current = n.parent?;
        }
    }

    /// The condition gating `node`, if any.
    pub fn edit_condition(&self, node: NodeId) -> Option<Rc<EditCondition>> {
        self.arena.get(self.condition_node(node)?)?.edit_condition.clone()
    }

    pub fn has_edit_condition(&self, node: NodeId) -> bool {
        self.edit_condition(node).is_some()
    }

    /// Whether the condition gating `node` holds for every edited instance.
    /// Nodes without a condition always pass.
    pub fn is_edit_condition_met(&self, node: NodeId, store: &InstanceStore) -> bool {
        let Some(condition) = self.edit_condition(node) else {
            return true;
        };
        let Some(target) = self.condition_node(node) else {
            return false;
        };
        let scopes = match self.sibling_scopes(target, store) {
            Ok(scopes) => scopes,
            Err(err) => {
                tracing::debug!(node = ?node, error = %err, "edit condition has no scope");
                return false;
            }
        };
        if scopes.is_empty() {
            return false;
        }
        scopes.iter().all(|scope| match condition.evaluate(scope) {
            Ok(met) => met,
            Err(err) => {
                tracing::debug!(condition = %condition.text(), error = %err, "edit condition failed");
                false
            }
        })
    }

    /// Hidden when the field asks for `EditConditionHides` and its condition
    /// is not met.
    pub fn is_visible(&self, node: NodeId, store: &InstanceStore) -> bool {
        if !self.arena.contains(node) {
            return false;
        }
        let hides = self
            .meta_field(node)
            .is_some_and(|f| self.metadata.has_field_meta(f, keys::EDIT_CONDITION_HIDES));
        !(hides && self.has_edit_condition(node) && !self.is_edit_condition_met(node, store))
    }

    fn sibling_scopes<'a>(
        &'a self,
        node: NodeId,
        store: &'a InstanceStore,
    ) -> Result<Vec<SiblingScope<'a>>, ConditionError> {
        let parent_id = self.value_parent(node).ok_or(ConditionError::NoInstances)?;
        let parent = self.arena.get(parent_id).ok_or(ConditionError::NoInstances)?;
        match &parent.kind {
            NodeKind::Instance(set) => set
                .instances
                .iter()
                .map(|slot| {
                    let instance = slot.ok_or(ConditionError::NoInstances)?;
                    let ty = store.type_of(instance).ok_or(ConditionError::NoInstances)?;
                    Ok(SiblingScope {
                        tree: self,
                        store,
                        ty,
                        root: ScopeRoot::Instance(instance),
                    })
                })
                .collect(),
            NodeKind::Standalone { struct_type } => Ok(vec![SiblingScope {
                tree: self,
                store,
                ty: *struct_type,
                root: ScopeRoot::Standalone,
            }]),
            NodeKind::Item { field } => {
                let FieldKind::Struct(ty) = self.schema.field(*field).kind else {
                    return Err(ConditionError::NoInstances);
                };
                self.locations(parent_id, store)
                    .into_iter()
                    .map(|loc| {
                        Ok(SiblingScope {
                            tree: self,
                            store,
                            ty,
                            root: ScopeRoot::Nested(loc.ok_or(ConditionError::NoInstances)?),
                        })
                    })
                    .collect()
            }
            NodeKind::Category { .. } => Err(ConditionError::NoInstances),
        }
    }

    // -- inline toggles -----------------------------------------------------

    /// The bool sibling a single-field condition names.
    fn toggle_field(&self, node: NodeId) -> Option<FieldId> {
        let condition = self.edit_condition(node)?;
        let name = condition.single_field()?;
        let parent = self.arena.get(self.value_parent(self.condition_node(node)?)?)?;
        let ty = match &parent.kind {
            NodeKind::Instance(set) => set.base_type?,
            NodeKind::Standalone { struct_type } => *struct_type,
            NodeKind::Item { field } => match self.schema.field(*field).kind {
                FieldKind::Struct(ty) => ty,
                _ => return None,
            },
            NodeKind::Category { .. } => return None,
        };
        let toggle = self.schema.find_field(ty, name)?;
        (self.schema.field(toggle).kind == FieldKind::Scalar(ScalarKind::Bool)).then_some(toggle)
    }

    /// Whether the condition of `node` can be shown as an inline checkbox:
    /// a single bool sibling that is either marked
    /// `InlineEditConditionToggle` or not editable on its own.
    pub fn supports_edit_condition_toggle(&self, node: NodeId) -> bool {
        let Some(field) = self.meta_field(node) else {
            return false;
        };
        if self
            .metadata
            .has_field_meta(field, keys::HIDE_EDIT_CONDITION_TOGGLE)
        {
            return false;
        }
        let Some(toggle) = self.toggle_field(node) else {
            return false;
        };
        let inline = self
            .metadata
            .has_field_meta(toggle, keys::INLINE_EDIT_CONDITION_TOGGLE);
        let editable = self.schema.field(toggle).flags.contains(FieldFlags::EDIT);
        if inline && !editable {
            tracing::warn!(
                field = %self.schema.field(toggle).name,
                "inline edit condition toggle is not editable"
            );
        }
        inline || !editable
    }

    /// Whether a field only appears as an inline toggle next to another.
    pub fn is_inline_toggle_target(&self, field: FieldId) -> bool {
        self.metadata
            .has_field_meta(field, keys::INLINE_EDIT_CONDITION_TOGGLE)
    }

    /// Current state of the inline toggle of `node`.
    pub fn edit_condition_toggle_value(&self, node: NodeId, store: &InstanceStore) -> Result<bool, AccessError> {
        let toggle = self.toggle_field(node).ok_or(AccessError::NoLocation)?;
        let target = self.condition_node(node).ok_or(AccessError::StaleNode)?;
        let scopes = self.sibling_scopes(target, store).map_err(|_| AccessError::NoLocation)?;
        let desc = self.schema.field(toggle);
        let mut state = None;
        for scope in &scopes {
            let value = self
                .read_value(&scope.location(desc), store)
                .and_then(Value::as_bool)
                .ok_or(AccessError::NoLocation)?;
            match state {
                None => state = Some(value),
                Some(existing) if existing != value => return Err(AccessError::MultipleValues),
                Some(_) => {}
            }
        }
        state.ok_or(AccessError::NoLocation)
    }

    /// Write the inline toggle of `node` through the change protocol.
    pub fn set_edit_condition_toggle(
        &mut self,
        node: NodeId,
        enabled: bool,
        store: &mut InstanceStore,
    ) -> Result<(), AccessError> {
        if !self.supports_edit_condition_toggle(node) {
            return Err(AccessError::UnsupportedOperation {
                operation: "edit condition toggle",
                container: "field",
            });
        }
        let toggle = self.toggle_field(node).ok_or(AccessError::NoLocation)?;
        let target = self.condition_node(node).ok_or(AccessError::StaleNode)?;
        let parent = self.value_parent(target).ok_or(AccessError::NoLocation)?;

        let detached = self.alloc_child(parent, NodeKind::Item { field: toggle }, None, NodeFlags::empty());
        let result = self.set_value(detached, Value::Bool(enabled), store, EditFlags::empty());
        self.arena.remove(detached);
        self.invalidate_subtree(target);
        result
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TreeConfig;
    use proptree_reflect::schema::{FieldSpec, SchemaBuilder};
    use std::sync::Arc;

    struct Fixture {
        store: InstanceStore,
        tree: PropertyTree,
    }

    fn fixture() -> Fixture {
        let mut builder = SchemaBuilder::new();
        let mode = builder.add_enum("EngineMode", &[("Off", 0), ("Fast", 1), ("Slow", 2)]);
        let tuning = builder
            .structure("Tuning")
            .field("bLocked", FieldSpec::Bool)
            .field("Gain", FieldSpec::Float)
            .meta(keys::EDIT_CONDITION, "!bLocked")
            .finish()
            .unwrap();
        let engine = builder
            .object("Engine", None)
            .field("bUseTurbo", FieldSpec::Bool)
            .meta(keys::INLINE_EDIT_CONDITION_TOGGLE, "")
            .field("Boost", FieldSpec::Float)
            .meta(keys::EDIT_CONDITION, "bUseTurbo")
            .meta(keys::TOOL_TIP, "Extra power")
            .meta(keys::UI_MIN, "0")
            .meta(keys::UI_MAX, "5")
            .field("Mode", FieldSpec::Enum(mode))
            .field("Rpm", FieldSpec::Int)
            .meta(keys::EDIT_CONDITION, "Mode == EngineMode::Fast")
            .meta(keys::EDIT_CONDITION_HIDES, "")
            .field("Ghost", FieldSpec::Int)
            .meta(keys::EDIT_CONDITION, "Missing")
            .field("Broken", FieldSpec::Int)
            .meta(keys::EDIT_CONDITION, "Rpm >")
            .field("Gears", FieldSpec::array(FieldSpec::Int))
            .meta(keys::EDIT_CONDITION, "bUseTurbo")
            .field("Tuning", FieldSpec::Struct(tuning))
            .field("SerialNumber", FieldSpec::Int)
            .add_flags(FieldFlags::DISABLE_EDIT_ON_TEMPLATE)
            .field("bIsRunning", FieldSpec::Bool)
            .finish()
            .unwrap();
        let (schema, metadata) = builder.build();
        let mut store = InstanceStore::new(Arc::new(schema));
        let v8 = store.spawn(engine, "V8").unwrap();
        let config = TreeConfig {
            show_categories: false,
            ..TreeConfig::default()
        };
        let tree = PropertyTree::for_instances(&store, &[v8], Arc::new(metadata), config);
        Fixture { store, tree }
    }

    fn node(fx: &mut Fixture, path: &str) -> NodeId {
        fx.tree.find_by_path(path, &fx.store).unwrap()
    }

    // -- presentation --------------------------------------------------------

    #[test]
    fn names_and_tooltips() {
        let mut fx = fixture();
        let running = node(&mut fx, "bIsRunning");
        let boost = node(&mut fx, "Boost");
        assert_eq!(fx.tree.display_name(running, &fx.store), "Is Running");
        assert_eq!(fx.tree.display_name(fx.tree.root(), &fx.store), "V8");
        assert_eq!(fx.tree.tooltip(boost).as_deref(), Some("Extra power"));
        assert_eq!(fx.tree.ui_range(boost), (Some(0.0), Some(5.0)));
        assert_eq!(fx.tree.category(boost).as_deref(), Some("Engine"));
    }

    // -- conditions ----------------------------------------------------------

    #[test]
    fn bool_condition_gates_editing() {
        let mut fx = fixture();
        let boost = node(&mut fx, "Boost");
        assert!(!fx.tree.is_edit_condition_met(boost, &fx.store));
        assert!(fx.tree.is_edit_const(boost, &fx.store));
        assert_eq!(fx.tree.set_float(boost, 1.0, &mut fx.store), Err(AccessError::ReadOnly));

        fx.tree
            .set_edit_condition_toggle(boost, true, &mut fx.store)
            .unwrap();
        assert!(fx.tree.edit_condition_toggle_value(boost, &fx.store).unwrap());
        assert!(!fx.tree.is_edit_const(boost, &fx.store));
        fx.tree.set_float(boost, 1.0, &mut fx.store).unwrap();
    }

    #[test]
    fn enum_condition_hides_field() {
        let mut fx = fixture();
        let rpm = node(&mut fx, "Rpm");
        let mode = node(&mut fx, "Mode");
        assert!(!fx.tree.is_visible(rpm, &fx.store));

        fx.tree
            .set_value_from_text(mode, "Fast", &mut fx.store, EditFlags::empty())
            .unwrap();
        assert!(fx.tree.is_visible(rpm, &fx.store));
        assert!(fx.tree.is_edit_condition_met(rpm, &fx.store));
    }

    #[test]
    fn unresolvable_conditions_fail_closed() {
        let mut fx = fixture();
        let ghost = node(&mut fx, "Ghost");
        let broken = node(&mut fx, "Broken");
        assert!(!fx.tree.is_edit_condition_met(ghost, &fx.store));
        assert!(!fx.tree.is_edit_condition_met(broken, &fx.store));
        assert!(fx.tree.is_edit_const(broken, &fx.store));
        // Still visible: only `EditConditionHides` hides.
        assert!(fx.tree.is_visible(ghost, &fx.store));
    }

    #[test]
    fn elements_follow_container_condition() {
        let mut fx = fixture();
        let gears = node(&mut fx, "Gears");
        assert_eq!(fx.tree.add_item(gears, &mut fx.store), Err(AccessError::ReadOnly));

        let boost = node(&mut fx, "Boost");
        fx.tree
            .set_edit_condition_toggle(boost, true, &mut fx.store)
            .unwrap();
        fx.tree.add_item(gears, &mut fx.store).unwrap();
        let first = node(&mut fx, "Gears[0]");
        assert!(fx.tree.is_edit_condition_met(first, &fx.store));
    }

    #[test]
    fn struct_members_see_struct_siblings() {
        let mut fx = fixture();
        let gain = node(&mut fx, "Tuning.Gain");
        assert!(fx.tree.is_edit_condition_met(gain, &fx.store));
        let locked = node(&mut fx, "Tuning.bLocked");
        fx.tree.set_bool(locked, true, &mut fx.store).unwrap();
        assert!(!fx.tree.is_edit_condition_met(gain, &fx.store));
        assert!(!fx.tree.supports_edit_condition_toggle(gain));
    }

    #[test]
    fn inline_toggle_support() {
        let mut fx = fixture();
        let boost = node(&mut fx, "Boost");
        let rpm = node(&mut fx, "Rpm");
        assert!(fx.tree.supports_edit_condition_toggle(boost));
        assert!(!fx.tree.supports_edit_condition_toggle(rpm));
        assert!(fx.tree.find_by_path("bUseTurbo", &fx.store).is_none());
    }

    #[test]
    fn template_only_restrictions() {
        let mut fx = fixture();
        let serial = node(&mut fx, "SerialNumber");
        assert!(!fx.tree.is_edit_const(serial, &fx.store));

        let engine = fx.store.schema().type_by_name("Engine").unwrap();
        let proto = fx.store.spawn_template(engine, "EngineProto").unwrap();
        fx.tree.set_instances(&[proto], &fx.store);
        let serial = node(&mut fx, "SerialNumber");
        assert!(fx.tree.is_edit_const(serial, &fx.store));
    }
}
