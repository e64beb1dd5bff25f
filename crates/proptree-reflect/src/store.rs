//! The [`InstanceStore`] owns every live instance, the archetype links
//! between them, per-type sparse blocks, and per-type edit hooks.
//!
//! Editors never hold references into the store. They hold [`InstanceId`]s
//! and [`ValueLocation`]s and resolve them here on every access.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use crate::change::{FieldChain, FieldChangedEvent, InstanceHooks};
use crate::instance::{Instance, InstanceAllocator, InstanceId};
use crate::location::{value_at, value_at_mut, LocationRoot, PathStep, ValueLocation};
use crate::schema::{FieldFlags, FieldId, FieldKind, Schema, TypeKey, TypeKind};
use crate::text::ObjectResolver;
use crate::value::Value;
use crate::ReflectError;

// ---------------------------------------------------------------------------
// InstanceStore
// ---------------------------------------------------------------------------

/// Host-side lookup of live instances.
pub struct InstanceStore {
    schema: Arc<Schema>,
    allocator: InstanceAllocator,
    instances: HashMap<InstanceId, Instance>,
    names: HashMap<String, InstanceId>,
    /// Direct derivations, archetype -> derived instances in spawn order.
    derived: HashMap<InstanceId, Vec<InstanceId>>,
    /// Lazily allocated sparse blocks keyed by declaring type.
    sparse_blocks: HashMap<TypeKey, Value>,
    retired_types: HashSet<TypeKey>,
    hooks: Vec<(TypeKey, Box<dyn InstanceHooks>)>,
}

impl InstanceStore {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            allocator: InstanceAllocator::new(),
            instances: HashMap::new(),
            names: HashMap::new(),
            derived: HashMap::new(),
            sparse_blocks: HashMap::new(),
            retired_types: HashSet::new(),
            hooks: Vec::new(),
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    // -- spawning -----------------------------------------------------------

    /// Spawn a default-constructed instance of an object type.
    pub fn spawn(&mut self, ty: TypeKey, name: &str) -> Result<InstanceId, ReflectError> {
        self.spawn_fresh(ty, name, false)
    }

    /// Spawn a default-constructed template (a prototype for derivation).
    pub fn spawn_template(&mut self, ty: TypeKey, name: &str) -> Result<InstanceId, ReflectError> {
        self.spawn_fresh(ty, name, true)
    }

    /// Spawn a copy of `archetype` that records it as its prototype.
    ///
    /// Instanced subobjects are not shared: each one referenced through an
    /// `INSTANCED` field is itself derived, owned by the new instance.
    pub fn spawn_derived(
        &mut self,
        archetype: InstanceId,
        name: &str,
    ) -> Result<InstanceId, ReflectError> {
        let proto = self
            .get(archetype)
            .ok_or(ReflectError::StaleInstance { instance: archetype })?;
        let (ty, data) = (proto.type_key, proto.data.clone());
        if self.retired_types.contains(&ty) {
            return Err(self.retired(ty));
        }
        let id = self.insert(name, ty, Some(archetype), false, data)?;
        self.derived.entry(archetype).or_default().push(id);
        self.instance_subobjects(id)?;
        tracing::debug!(instance = %name, archetype = ?archetype, "spawned derived instance");
        Ok(id)
    }

    /// Destroy an instance and every subobject it owns. Handles to them go
    /// stale; instances derived from it lose their live archetype.
    pub fn despawn(&mut self, id: InstanceId) -> Result<(), ReflectError> {
        let instance = self
            .instances
            .remove(&id)
            .ok_or(ReflectError::StaleInstance { instance: id })?;
        self.allocator.deallocate(id);
        self.names.remove(&instance.name);
        self.derived.remove(&id);
        if let Some(proto) = instance.archetype {
            if let Some(list) = self.derived.get_mut(&proto) {
                list.retain(|d| *d != id);
            }
        }
        let owned: Vec<InstanceId> = self
            .instances
            .values()
            .filter(|i| i.outer.map(|(o, _)| o) == Some(id))
            .map(|i| i.id)
            .collect();
        for sub in owned {
            self.despawn(sub)?;
        }
        tracing::debug!(instance = ?id, "despawned instance");
        Ok(())
    }

    fn spawn_fresh(
        &mut self,
        ty: TypeKey,
        name: &str,
        template: bool,
    ) -> Result<InstanceId, ReflectError> {
        let desc = self
            .schema
            .try_type(ty)
            .ok_or(ReflectError::UnknownType { key: ty })?;
        if desc.kind != TypeKind::Object {
            return Err(ReflectError::InconsistentKind {
                type_name: desc.name.clone(),
                field: String::new(),
                details: "only object types can be instantiated".to_owned(),
            });
        }
        if self.retired_types.contains(&ty) {
            return Err(self.retired(ty));
        }
        let data = self.schema.default_struct(ty);
        self.insert(name, ty, None, template, data)
    }

    fn insert(
        &mut self,
        name: &str,
        type_key: TypeKey,
        archetype: Option<InstanceId>,
        template: bool,
        data: Value,
    ) -> Result<InstanceId, ReflectError> {
        if self.names.contains_key(name) {
            return Err(ReflectError::DuplicateName {
                name: name.to_owned(),
            });
        }
        let id = self.allocator.allocate();
        self.instances.insert(
            id,
            Instance {
                id,
                name: name.to_owned(),
                type_key,
                archetype,
                outer: None,
                template,
                data,
            },
        );
        self.names.insert(name.to_owned(), id);
        Ok(id)
    }

    fn instance_subobjects(&mut self, owner: InstanceId) -> Result<(), ReflectError> {
        let Some(instance) = self.get(owner) else {
            return Ok(());
        };
        let owner_name = instance.name.clone();
        let paths = instanced_paths(&self.schema, instance.type_key, &instance.data);
        for (field, path) in paths {
            let source = self
                .get(owner)
                .and_then(|i| value_at(&i.data, &path))
                .and_then(Value::as_object)
                .flatten();
            let Some(source) = source.filter(|s| self.is_alive(*s)) else {
                continue;
            };
            let descriptor = self.schema.field(field);
            let owning_field = descriptor.outer.unwrap_or(field);
            let name = self.unique_name(&format!("{owner_name}.{}", descriptor.name));
            let copy = self.spawn_derived(source, &name)?;
            if let Some(sub) = self.instances.get_mut(&copy) {
                sub.outer = Some((owner, owning_field));
            }
            if let Some(slot) = self
                .instances
                .get_mut(&owner)
                .and_then(|i| value_at_mut(&mut i.data, &path))
            {
                *slot = Value::Object(Some(copy));
            }
        }
        Ok(())
    }

    fn unique_name(&self, base: &str) -> String {
        if !self.names.contains_key(base) {
            return base.to_owned();
        }
        (1..)
            .map(|n| format!("{base}_{n}"))
            .find(|candidate| !self.names.contains_key(candidate))
            .unwrap_or_else(|| base.to_owned())
    }

    fn retired(&self, ty: TypeKey) -> ReflectError {
        ReflectError::RetiredType {
            name: self.schema.type_desc(ty).name.clone(),
        }
    }

    // -- lookup -------------------------------------------------------------

    pub fn is_alive(&self, id: InstanceId) -> bool {
        self.allocator.is_alive(id)
    }

    pub fn get(&self, id: InstanceId) -> Option<&Instance> {
        self.instances.get(&id)
    }

    pub fn get_mut(&mut self, id: InstanceId) -> Option<&mut Instance> {
        self.instances.get_mut(&id)
    }

    pub fn by_name(&self, name: &str) -> Option<InstanceId> {
        self.names.get(name).copied()
    }

    pub fn type_of(&self, id: InstanceId) -> Option<TypeKey> {
        self.get(id).map(|i| i.type_key)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instance> {
        self.instances.values()
    }

    // -- archetypes ---------------------------------------------------------

    /// Live archetype of `id`.
    pub fn archetype_of(&self, id: InstanceId) -> Option<InstanceId> {
        self.get(id)?.archetype.filter(|a| self.is_alive(*a))
    }

    /// Live instances derived directly from `id`.
    pub fn derived_instances(&self, id: InstanceId) -> Vec<InstanceId> {
        self.derived
            .get(&id)
            .map(|list| list.iter().copied().filter(|d| self.is_alive(*d)).collect())
            .unwrap_or_default()
    }

    /// Every live instance derived from `id`, transitively, breadth first.
    pub fn all_derived(&self, id: InstanceId) -> Vec<InstanceId> {
        let mut seen = HashSet::from([id]);
        let mut queue = VecDeque::from([id]);
        let mut out = Vec::new();
        while let Some(current) = queue.pop_front() {
            for d in self.derived_instances(current) {
                if seen.insert(d) {
                    out.push(d);
                    queue.push_back(d);
                }
            }
        }
        out
    }

    // -- types --------------------------------------------------------------

    /// Mark a type as invalidated (e.g. replaced by a reload). Existing
    /// instances keep their data but editors treat their fields as stale.
    pub fn retire_type(&mut self, ty: TypeKey) {
        if self.retired_types.insert(ty) {
            tracing::debug!(type_key = ?ty, "retired type");
        }
    }

    pub fn is_type_retired(&self, ty: TypeKey) -> bool {
        self.retired_types.contains(&ty)
    }

    // -- sparse blocks ------------------------------------------------------

    /// Sparse block of `ty`, or its defaults when it was never written.
    pub fn sparse_block(&self, ty: TypeKey) -> Option<&Value> {
        self.schema.try_type(ty)?;
        Some(
            self.sparse_blocks
                .get(&ty)
                .unwrap_or_else(|| self.schema.sparse_default(ty)),
        )
    }

    /// Mutable sparse block of `ty`, allocated from defaults on first use.
    pub fn sparse_block_mut(&mut self, ty: TypeKey) -> Option<&mut Value> {
        self.schema.try_type(ty)?;
        let schema = &self.schema;
        Some(self.sparse_blocks.entry(ty).or_insert_with(|| {
            tracing::debug!(type_key = ?ty, "allocated sparse block");
            schema.sparse_default(ty).clone()
        }))
    }

    pub fn is_sparse_allocated(&self, ty: TypeKey) -> bool {
        self.sparse_blocks.contains_key(&ty)
    }

    // -- locations ----------------------------------------------------------

    /// Resolve a location against live storage. Standalone roots are owned
    /// by editors, not the store, and resolve to `None`.
    pub fn value(&self, loc: &ValueLocation) -> Option<&Value> {
        let root = match loc.root {
            LocationRoot::Instance(id) => &self.get(id)?.data,
            LocationRoot::Sparse { owner, block } => {
                self.get(owner)?;
                self.sparse_block(block)?
            }
            LocationRoot::Standalone => return None,
        };
        value_at(root, &loc.steps)
    }

    pub fn value_mut(&mut self, loc: &ValueLocation) -> Option<&mut Value> {
        match loc.root {
            LocationRoot::Instance(id) => value_at_mut(&mut self.instances.get_mut(&id)?.data, &loc.steps),
            LocationRoot::Sparse { owner, block } => {
                if !self.is_alive(owner) {
                    return None;
                }
                value_at_mut(self.sparse_block_mut(block)?, &loc.steps)
            }
            LocationRoot::Standalone => None,
        }
    }

    // -- comparison ---------------------------------------------------------

    /// Compare two values. With `deep`, references to distinct instances
    /// compare equal when the referenced instances have the same type and
    /// identical data.
    pub fn values_identical(&self, a: &Value, b: &Value, deep: bool) -> bool {
        let mut visiting = Vec::new();
        self.identical_inner(a, b, deep, &mut visiting)
    }

    fn identical_inner(
        &self,
        a: &Value,
        b: &Value,
        deep: bool,
        visiting: &mut Vec<(InstanceId, InstanceId)>,
    ) -> bool {
        match (a, b) {
            (Value::Object(Some(x)), Value::Object(Some(y))) if deep && x != y => {
                if visiting.contains(&(*x, *y)) {
                    return true;
                }
                let (Some(ix), Some(iy)) = (self.get(*x), self.get(*y)) else {
                    return false;
                };
                if ix.type_key != iy.type_key {
                    return false;
                }
                visiting.push((*x, *y));
                let same = self.identical_inner(&ix.data, &iy.data, deep, visiting);
                visiting.pop();
                same
            }
            (Value::Struct(l), Value::Struct(r))
            | (Value::Fixed(l), Value::Fixed(r))
            | (Value::Array(l), Value::Array(r)) => {
                l.len() == r.len()
                    && l
                        .iter()
                        .zip(r)
                        .all(|(x, y)| self.identical_inner(x, y, deep, visiting))
            }
            (Value::Set(l), Value::Set(r)) => {
                l.len() == r.len()
                    && l.iter().all(|x| {
                        r.iter().any(|y| self.identical_inner(x, y, deep, visiting))
                    })
            }
            (Value::Map(l), Value::Map(r)) => {
                l.len() == r.len()
                    && l.iter().all(|(lk, lv)| {
                        r.iter().any(|(rk, rv)| {
                            self.identical_inner(lk, rk, deep, visiting)
                                && self.identical_inner(lv, rv, deep, visiting)
                        })
                    })
            }
            _ => a == b,
        }
    }

    // -- hooks --------------------------------------------------------------

    /// Register hooks for `ty` and every type deriving from it.
    pub fn register_hooks(&mut self, ty: TypeKey, hooks: Box<dyn InstanceHooks>) {
        self.hooks.push((ty, hooks));
    }

    pub fn pre_edit_change(&mut self, instance: InstanceId, chain: &FieldChain, member: Option<FieldId>) {
        let Some(ty) = self.type_of(instance) else {
            return;
        };
        let schema = &self.schema;
        for (hook_ty, hooks) in self.hooks.iter_mut() {
            if schema.is_child_of(ty, *hook_ty) {
                hooks.pre_edit_change(instance, chain, member);
            }
        }
    }

    pub fn post_edit_change(&mut self, instance: InstanceId, event: &FieldChangedEvent) {
        let Some(ty) = self.type_of(instance) else {
            return;
        };
        let schema = &self.schema;
        for (hook_ty, hooks) in self.hooks.iter_mut() {
            if schema.is_child_of(ty, *hook_ty) {
                hooks.post_edit_change(instance, event);
            }
        }
    }

    /// `false` if any hook vetoes editing `chain` on `instance`.
    pub fn can_edit_change(&self, instance: InstanceId, chain: &FieldChain) -> bool {
        let Some(ty) = self.type_of(instance) else {
            return false;
        };
        self.hooks
            .iter()
            .filter(|(hook_ty, _)| self.schema.is_child_of(ty, *hook_ty))
            .all(|(_, hooks)| hooks.can_edit_change(instance, chain))
    }
}

impl fmt::Debug for InstanceStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceStore")
            .field("instances", &self.instances.len())
            .field("sparse_blocks", &self.sparse_blocks.len())
            .field("retired_types", &self.retired_types)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

impl ObjectResolver for InstanceStore {
    fn object_name(&self, id: InstanceId) -> Option<&str> {
        self.get(id).map(|i| i.name.as_str())
    }

    fn object_by_name(&self, name: &str) -> Option<InstanceId> {
        self.by_name(name)
    }

    fn object_type(&self, id: InstanceId) -> Option<TypeKey> {
        self.type_of(id)
    }
}

// ---------------------------------------------------------------------------
// Instanced reference discovery
// ---------------------------------------------------------------------------

/// Paths (from the data root) of every non-null reference held by an
/// `INSTANCED` field, paired with the descriptor that holds it.
fn instanced_paths(schema: &Schema, ty: TypeKey, data: &Value) -> Vec<(FieldId, Vec<PathStep>)> {
    let mut out = Vec::new();
    let mut path = Vec::new();
    if let (Some(desc), Value::Struct(members)) = (schema.try_type(ty), data) {
        for (field, member) in desc.fields().iter().zip(members) {
            path.push(PathStep::Field(schema.field(*field).offset));
            collect_field(schema, *field, member, &mut path, &mut out);
            path.pop();
        }
    }
    out
}

fn collect_field(
    schema: &Schema,
    field: FieldId,
    value: &Value,
    path: &mut Vec<PathStep>,
    out: &mut Vec<(FieldId, Vec<PathStep>)>,
) {
    match value {
        Value::Fixed(slots) if schema.field(field).is_static_array() => {
            for (i, slot) in slots.iter().enumerate() {
                path.push(PathStep::Slot(i));
                collect_element(schema, field, slot, path, out);
                path.pop();
            }
        }
        _ => collect_element(schema, field, value, path, out),
    }
}

fn collect_element(
    schema: &Schema,
    field: FieldId,
    value: &Value,
    path: &mut Vec<PathStep>,
    out: &mut Vec<(FieldId, Vec<PathStep>)>,
) {
    let desc = schema.field(field);
    match (&desc.kind, value) {
        (FieldKind::ObjectReference { .. }, Value::Object(Some(_)))
            if desc.flags.contains(FieldFlags::INSTANCED) =>
        {
            out.push((field, path.clone()));
        }
        (FieldKind::Struct(ty), Value::Struct(members)) => {
            for (member_field, member) in schema.type_desc(*ty).fields().iter().zip(members) {
                path.push(PathStep::Field(schema.field(*member_field).offset));
                collect_field(schema, *member_field, member, path, out);
                path.pop();
            }
        }
        (FieldKind::Array { element }, Value::Array(items)) => {
            for (i, item) in items.iter().enumerate() {
                path.push(PathStep::Element(i));
                collect_element(schema, *element, item, path, out);
                path.pop();
            }
        }
        (FieldKind::Set { element }, Value::Set(items)) => {
            for (slot, item) in items.iter_slots() {
                path.push(PathStep::SetSlot(slot));
                collect_element(schema, *element, item, path, out);
                path.pop();
            }
        }
        (FieldKind::Map { value: value_field, .. }, Value::Map(pairs)) => {
            for (slot, (_, v)) in pairs.iter_slots() {
                path.push(PathStep::MapValue(slot));
                collect_element(schema, *value_field, v, path, out);
                path.pop();
            }
        }
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::ChangeKind;
    use crate::schema::{FieldSpec, SchemaBuilder};
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Fixture {
        store: InstanceStore,
        car: TypeKey,
        part: TypeKey,
    }

    fn fixture() -> Fixture {
        let mut b = SchemaBuilder::new();
        let part = b
            .object("Part", None)
            .field("Mass", FieldSpec::Float)
            .finish()
            .unwrap();
        let car = b
            .object("Car", None)
            .field("Speed", FieldSpec::Float)
            .field("Engine", FieldSpec::Object(part))
            .flags(FieldFlags::EDIT | FieldFlags::INSTANCED)
            .sparse_field("Registry", FieldSpec::Int)
            .finish()
            .unwrap();
        let (schema, _) = b.build();
        Fixture {
            store: InstanceStore::new(Arc::new(schema)),
            car,
            part,
        }
    }

    fn field_loc(store: &InstanceStore, id: InstanceId, ty: TypeKey, name: &str) -> ValueLocation {
        let field = store.schema().find_field(ty, name).unwrap();
        let offset = store.schema().field(field).offset;
        ValueLocation::new(LocationRoot::Instance(id)).child(PathStep::Field(offset))
    }

    // -- spawning -----------------------------------------------------------

    #[test]
    fn names_are_unique() {
        let mut fx = fixture();
        fx.store.spawn(fx.car, "A").unwrap();
        let err = fx.store.spawn(fx.car, "A").unwrap_err();
        assert_eq!(err, ReflectError::DuplicateName { name: "A".into() });
    }

    #[test]
    fn despawn_makes_handle_stale() {
        let mut fx = fixture();
        let a = fx.store.spawn(fx.car, "A").unwrap();
        fx.store.despawn(a).unwrap();
        assert!(!fx.store.is_alive(a));
        assert!(fx.store.get(a).is_none());
        assert!(fx.store.by_name("A").is_none());
        assert!(matches!(
            fx.store.despawn(a),
            Err(ReflectError::StaleInstance { .. })
        ));
    }

    #[test]
    fn derived_chain_is_transitive() {
        let mut fx = fixture();
        let proto = fx.store.spawn_template(fx.car, "Proto").unwrap();
        let a = fx.store.spawn_derived(proto, "A").unwrap();
        let b = fx.store.spawn_derived(a, "B").unwrap();
        let c = fx.store.spawn_derived(proto, "C").unwrap();

        assert_eq!(fx.store.derived_instances(proto), vec![a, c]);
        assert_eq!(fx.store.all_derived(proto), vec![a, c, b]);

        fx.store.despawn(a).unwrap();
        assert_eq!(fx.store.all_derived(proto), vec![c]);
        assert_eq!(fx.store.archetype_of(b), None);
    }

    #[test]
    fn derived_instances_get_their_own_subobjects() {
        let mut fx = fixture();
        let proto = fx.store.spawn_template(fx.car, "Proto").unwrap();
        let engine = fx.store.spawn(fx.part, "ProtoEngine").unwrap();
        let engine_loc = field_loc(&fx.store, proto, fx.car, "Engine");
        *fx.store.value_mut(&engine_loc).unwrap() = Value::Object(Some(engine));

        let derived = fx.store.spawn_derived(proto, "CarA").unwrap();
        let derived_engine = fx
            .store
            .value(&engine_loc.rerooted(derived).unwrap())
            .and_then(Value::as_object)
            .flatten()
            .unwrap();

        assert_ne!(derived_engine, engine);
        let sub = fx.store.get(derived_engine).unwrap();
        assert_eq!(sub.name, "CarA.Engine");
        assert_eq!(sub.archetype, Some(engine));
        assert_eq!(sub.outer.map(|(o, _)| o), Some(derived));

        fx.store.despawn(derived).unwrap();
        assert!(!fx.store.is_alive(derived_engine));
    }

    // -- sparse blocks ------------------------------------------------------

    #[test]
    fn sparse_block_is_allocated_on_first_write() {
        let mut fx = fixture();
        let a = fx.store.spawn(fx.car, "A").unwrap();
        let loc = ValueLocation::new(LocationRoot::Sparse {
            owner: a,
            block: fx.car,
        })
        .child(PathStep::Field(0));

        assert_eq!(fx.store.value(&loc), Some(&Value::Int(0)));
        assert!(!fx.store.is_sparse_allocated(fx.car));

        *fx.store.value_mut(&loc).unwrap() = Value::Int(5);
        assert!(fx.store.is_sparse_allocated(fx.car));
        assert_eq!(fx.store.value(&loc), Some(&Value::Int(5)));
    }

    // -- comparison ---------------------------------------------------------

    #[test]
    fn deep_comparison_follows_references() {
        let mut fx = fixture();
        let p1 = fx.store.spawn(fx.part, "P1").unwrap();
        let p2 = fx.store.spawn(fx.part, "P2").unwrap();
        let a = Value::Object(Some(p1));
        let b = Value::Object(Some(p2));

        assert!(!fx.store.values_identical(&a, &b, false));
        assert!(fx.store.values_identical(&a, &b, true));

        let mass = field_loc(&fx.store, p2, fx.part, "Mass");
        *fx.store.value_mut(&mass).unwrap() = Value::Float(3.0);
        assert!(!fx.store.values_identical(&a, &b, true));
    }

    // -- hooks --------------------------------------------------------------

    struct Recorder {
        log: Rc<RefCell<Vec<String>>>,
        veto: bool,
    }

    impl InstanceHooks for Recorder {
        fn pre_edit_change(&mut self, instance: InstanceId, _: &FieldChain, _: Option<FieldId>) {
            self.log.borrow_mut().push(format!("pre {instance}"));
        }

        fn post_edit_change(&mut self, instance: InstanceId, event: &FieldChangedEvent) {
            self.log.borrow_mut().push(format!("post {instance} {:?}", event.kind));
        }

        fn can_edit_change(&self, _: InstanceId, _: &FieldChain) -> bool {
            !self.veto
        }
    }

    #[test]
    fn hooks_dispatch_by_type() {
        let mut fx = fixture();
        let log = Rc::new(RefCell::new(Vec::new()));
        fx.store.register_hooks(
            fx.car,
            Box::new(Recorder {
                log: Rc::clone(&log),
                veto: true,
            }),
        );
        let car = fx.store.spawn(fx.car, "Car").unwrap();
        let part = fx.store.spawn(fx.part, "Part").unwrap();
        let chain = FieldChain::default();
        let event = FieldChangedEvent {
            chain: chain.clone(),
            member: None,
            kind: ChangeKind::ValueSet,
            index: None,
            instances: vec![car],
            interactive: false,
        };

        fx.store.pre_edit_change(car, &chain, None);
        fx.store.pre_edit_change(part, &chain, None);
        fx.store.post_edit_change(car, &event);

        assert_eq!(
            *log.borrow(),
            vec![format!("pre {car}"), format!("post {car} ValueSet")]
        );
        assert!(!fx.store.can_edit_change(car, &chain));
        assert!(fx.store.can_edit_change(part, &chain));
    }

    #[test]
    fn retired_types_cannot_spawn() {
        let mut fx = fixture();
        fx.store.retire_type(fx.car);
        assert!(fx.store.is_type_retired(fx.car));
        assert!(matches!(
            fx.store.spawn(fx.car, "A"),
            Err(ReflectError::RetiredType { .. })
        ));
    }
}
