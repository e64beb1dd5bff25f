//! Reflected schema: object and struct types, their fields, and enums.
//!
//! A [`Schema`] is built once through a [`SchemaBuilder`] and then shared
//! immutably (usually behind an `Arc`). Every field has a closed
//! [`FieldKind`]; container fields own *element descriptors* which are
//! themselves [`FieldDescriptor`]s with [`FieldDescriptor::outer`] pointing
//! back at the container.
//!
//! # Layout
//!
//! Object types inherit their parent's fields: the parent's layout comes
//! first, followed by the type's own fields, so a field's
//! [`offset`](FieldDescriptor::offset) is valid for every subtype. Sparse
//! fields live in a per-declaring-type block instead of the instance and are
//! numbered separately.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::metadata::{MetaTarget, MetadataBuilder, MetadataRegistry};
use crate::value::{SparseSlots, Value};
use crate::ReflectError;

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Index of a type inside its [`Schema`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeKey(pub u32);

/// Index of a field (or element descriptor) inside its [`Schema`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldId(pub u32);

/// Index of an enum inside its [`Schema`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EnumKey(pub u32);

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({})", self.0)
    }
}

impl fmt::Debug for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldId({})", self.0)
    }
}

impl fmt::Debug for EnumKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EnumKey({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// Flags and kinds
// ---------------------------------------------------------------------------

bitflags! {
    /// Reflection flags attached to a field.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FieldFlags: u32 {
        /// Visible to editors at all.
        const EDIT = 1 << 0;
        /// Visible but never writable.
        const EDIT_CONST = 1 << 1;
        /// Only editable on templates.
        const DISABLE_EDIT_ON_INSTANCE = 1 << 2;
        /// Only editable on non-template instances.
        const DISABLE_EDIT_ON_TEMPLATE = 1 << 3;
        /// Object reference owns a per-instance subobject.
        const INSTANCED = 1 << 4;
        /// Referenced object's fields are shown inline.
        const EDIT_INLINE = 1 << 5;
        const ADVANCED = 1 << 6;
        /// Container may not be resized by editors.
        const EDIT_FIXED_SIZE = 1 << 7;
        /// Object reference may not be cleared to null.
        const NO_CLEAR = 1 << 8;
        /// Stored in the per-type sparse block.
        const SPARSE = 1 << 9;
    }
}

/// Kind of a leaf value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Bool,
    Int,
    Float,
    Str,
    Name,
    Enum(EnumKey),
}

/// Closed set of field kinds. Every kind-dependent behavior dispatches on
/// this enum in one `match`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Scalar(ScalarKind),
    Struct(TypeKey),
    Array { element: FieldId },
    Set { element: FieldId },
    Map { key: FieldId, value: FieldId },
    ObjectReference { class: TypeKey },
}

impl FieldKind {
    /// Dynamic containers whose element count can change.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            FieldKind::Array { .. } | FieldKind::Set { .. } | FieldKind::Map { .. }
        )
    }

    pub fn is_object(&self) -> bool {
        matches!(self, FieldKind::ObjectReference { .. })
    }

    pub fn is_struct(&self) -> bool {
        matches!(self, FieldKind::Struct(_))
    }
}

/// Declarative field shape used by the [`SchemaBuilder`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldSpec {
    Bool,
    Int,
    Float,
    Str,
    Name,
    Enum(EnumKey),
    Struct(TypeKey),
    Object(TypeKey),
    Array(Box<FieldSpec>),
    Set(Box<FieldSpec>),
    Map(Box<FieldSpec>, Box<FieldSpec>),
}

impl FieldSpec {
    pub fn array(element: FieldSpec) -> Self {
        FieldSpec::Array(Box::new(element))
    }

    pub fn set(element: FieldSpec) -> Self {
        FieldSpec::Set(Box::new(element))
    }

    pub fn map(key: FieldSpec, value: FieldSpec) -> Self {
        FieldSpec::Map(Box::new(key), Box::new(value))
    }
}

// ---------------------------------------------------------------------------
// Descriptors
// ---------------------------------------------------------------------------

/// Reflected description of one field or container element.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub id: FieldId,
    pub name: String,
    pub kind: FieldKind,
    pub declaring_type: TypeKey,
    /// Position in the declaring layout (or in the sparse block).
    pub offset: usize,
    /// Number of slots for static arrays; `1` for ordinary fields.
    pub static_arity: usize,
    pub flags: FieldFlags,
    /// Container field this element descriptor belongs to.
    pub outer: Option<FieldId>,
    /// Declared per-slot default, overriding the kind's zero value.
    pub default: Option<Value>,
}

impl FieldDescriptor {
    /// Element descriptors of containers are *inner* fields.
    pub fn is_inner(&self) -> bool {
        self.outer.is_some()
    }

    pub fn is_static_array(&self) -> bool {
        self.static_arity > 1
    }

    pub fn is_sparse(&self) -> bool {
        self.flags.contains(FieldFlags::SPARSE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Object,
    Struct,
}

/// Reflected description of an object or struct type.
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    pub key: TypeKey,
    pub name: String,
    pub kind: TypeKind,
    pub parent: Option<TypeKey>,
    fields: Vec<FieldId>,
    own_start: usize,
    sparse_fields: Vec<FieldId>,
    sparse_default: Value,
}

impl TypeDescriptor {
    /// Full layout, inherited fields first.
    pub fn fields(&self) -> &[FieldId] {
        &self.fields
    }

    /// Fields declared on this type itself.
    pub fn own_fields(&self) -> &[FieldId] {
        &self.fields[self.own_start..]
    }

    /// Sparse fields visible on this type, inherited ones included.
    pub fn sparse_fields(&self) -> &[FieldId] {
        &self.sparse_fields
    }
}

/// Reflected enum: ordered `(name, value)` variants.
#[derive(Debug, Clone)]
pub struct EnumDescriptor {
    pub key: EnumKey,
    pub name: String,
    pub variants: Vec<(String, i64)>,
}

impl EnumDescriptor {
    /// Case-insensitive variant lookup.
    pub fn value_of(&self, variant: &str) -> Option<i64> {
        self.variants
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(variant))
            .map(|(_, v)| *v)
    }

    pub fn name_of(&self, value: i64) -> Option<&str> {
        self.variants
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(n, _)| n.as_str())
    }

    pub fn first_value(&self) -> i64 {
        self.variants.first().map_or(0, |(_, v)| *v)
    }
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// Immutable registry of types, fields, and enums.
///
/// Keys handed out by a schema are indices into it; looking up a key from a
/// different schema panics.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    types: Vec<TypeDescriptor>,
    fields: Vec<FieldDescriptor>,
    enums: Vec<EnumDescriptor>,
    type_names: HashMap<String, TypeKey>,
    enum_names: HashMap<String, EnumKey>,
}

impl Schema {
    pub fn type_desc(&self, key: TypeKey) -> &TypeDescriptor {
        &self.types[key.0 as usize]
    }

    pub fn try_type(&self, key: TypeKey) -> Option<&TypeDescriptor> {
        self.types.get(key.0 as usize)
    }

    pub fn field(&self, id: FieldId) -> &FieldDescriptor {
        &self.fields[id.0 as usize]
    }

    pub fn enum_desc(&self, key: EnumKey) -> &EnumDescriptor {
        &self.enums[key.0 as usize]
    }

    pub fn try_enum(&self, key: EnumKey) -> Option<&EnumDescriptor> {
        self.enums.get(key.0 as usize)
    }

    pub fn type_by_name(&self, name: &str) -> Option<TypeKey> {
        self.type_names.get(name).copied()
    }

    pub fn enum_by_name(&self, name: &str) -> Option<EnumKey> {
        self.enum_names.get(name).copied()
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.types.iter()
    }

    /// Find a field (ordinary or sparse) visible on `ty` by name.
    pub fn find_field(&self, ty: TypeKey, name: &str) -> Option<FieldId> {
        let desc = self.try_type(ty)?;
        desc.fields
            .iter()
            .chain(desc.sparse_fields.iter())
            .copied()
            .find(|id| self.field(*id).name == name)
    }

    /// Returns `true` if `ty` is `ancestor` or derives from it.
    pub fn is_child_of(&self, ty: TypeKey, ancestor: TypeKey) -> bool {
        let mut current = Some(ty);
        while let Some(key) = current {
            if key == ancestor {
                return true;
            }
            current = self.try_type(key).and_then(|d| d.parent);
        }
        false
    }

    /// Most derived type every entry of `types` derives from.
    pub fn common_ancestor(&self, types: &[TypeKey]) -> Option<TypeKey> {
        let (first, rest) = types.split_first()?;
        let mut candidate = Some(*first);
        while let Some(key) = candidate {
            if rest.iter().all(|t| self.is_child_of(*t, key)) {
                return Some(key);
            }
            candidate = self.try_type(key).and_then(|d| d.parent);
        }
        None
    }

    /// Element descriptor of an array or set, or the value descriptor of a
    /// map.
    pub fn element_of(&self, container: FieldId) -> Option<FieldId> {
        match self.field(container).kind {
            FieldKind::Array { element } | FieldKind::Set { element } => Some(element),
            FieldKind::Map { value, .. } => Some(value),
            _ => None,
        }
    }

    // -- defaults -----------------------------------------------------------

    /// Zero value of a kind.
    pub fn kind_default(&self, kind: &FieldKind) -> Value {
        match kind {
            FieldKind::Scalar(ScalarKind::Bool) => Value::Bool(false),
            FieldKind::Scalar(ScalarKind::Int) => Value::Int(0),
            FieldKind::Scalar(ScalarKind::Float) => Value::Float(0.0),
            FieldKind::Scalar(ScalarKind::Str) => Value::Str(String::new()),
            FieldKind::Scalar(ScalarKind::Name) => Value::Name(String::new()),
            FieldKind::Scalar(ScalarKind::Enum(e)) => {
                Value::Enum(self.try_enum(*e).map_or(0, |d| d.first_value()))
            }
            FieldKind::Struct(ty) => self.default_struct(*ty),
            FieldKind::Array { .. } => Value::Array(Vec::new()),
            FieldKind::Set { .. } => Value::Set(SparseSlots::new()),
            FieldKind::Map { .. } => Value::Map(SparseSlots::new()),
            FieldKind::ObjectReference { .. } => Value::Object(None),
        }
    }

    /// Default of a single slot (or container element) of `id`.
    pub fn default_element(&self, id: FieldId) -> Value {
        let field = self.field(id);
        match &field.default {
            Some(v) => v.clone(),
            None => self.kind_default(&field.kind),
        }
    }

    /// Default of the whole field, static arrays expanded.
    pub fn default_value(&self, id: FieldId) -> Value {
        let field = self.field(id);
        let element = self.default_element(id);
        if field.is_static_array() {
            Value::Fixed(vec![element; field.static_arity])
        } else {
            element
        }
    }

    /// Freshly default-constructed storage for a type.
    pub fn default_struct(&self, ty: TypeKey) -> Value {
        match self.try_type(ty) {
            Some(desc) => Value::Struct(desc.fields.iter().map(|f| self.default_value(*f)).collect()),
            None => Value::Struct(Vec::new()),
        }
    }

    /// Default sparse block of the type that declares sparse fields.
    pub fn sparse_default(&self, ty: TypeKey) -> &Value {
        &self.type_desc(ty).sparse_default
    }

    // -- shape queries ------------------------------------------------------

    /// Whether values of `id` can transitively hold instanced object
    /// references. Such values need deep comparison.
    pub fn may_contain_instanced(&self, id: FieldId) -> bool {
        let field = self.field(id);
        match field.kind {
            FieldKind::Scalar(_) => false,
            FieldKind::ObjectReference { .. } => field.flags.contains(FieldFlags::INSTANCED),
            FieldKind::Struct(ty) => self
                .type_desc(ty)
                .fields
                .iter()
                .any(|f| self.may_contain_instanced(*f)),
            FieldKind::Array { element } | FieldKind::Set { element } => {
                self.may_contain_instanced(element)
            }
            FieldKind::Map { key, value } => {
                self.may_contain_instanced(key) || self.may_contain_instanced(value)
            }
        }
    }

    /// Whether `value` is shaped like the whole field `id`.
    pub fn conforms(&self, id: FieldId, value: &Value) -> bool {
        let field = self.field(id);
        if field.is_static_array() {
            match value {
                Value::Fixed(slots) => {
                    slots.len() == field.static_arity
                        && slots.iter().all(|v| self.conforms_element(id, v))
                }
                _ => false,
            }
        } else {
            self.conforms_element(id, value)
        }
    }

    /// Whether `value` is shaped like one slot/element of `id`.
    pub fn conforms_element(&self, id: FieldId, value: &Value) -> bool {
        match (&self.field(id).kind, value) {
            (FieldKind::Scalar(ScalarKind::Bool), Value::Bool(_))
            | (FieldKind::Scalar(ScalarKind::Int), Value::Int(_))
            | (FieldKind::Scalar(ScalarKind::Float), Value::Float(_))
            | (FieldKind::Scalar(ScalarKind::Str), Value::Str(_))
            | (FieldKind::Scalar(ScalarKind::Name), Value::Name(_))
            | (FieldKind::Scalar(ScalarKind::Enum(_)), Value::Enum(_))
            | (FieldKind::ObjectReference { .. }, Value::Object(_)) => true,
            (FieldKind::Struct(ty), Value::Struct(members)) => {
                let fields = &self.type_desc(*ty).fields;
                fields.len() == members.len()
                    && fields
                        .iter()
                        .zip(members)
                        .all(|(f, v)| self.conforms(*f, v))
            }
            (FieldKind::Array { element }, Value::Array(items)) => {
                items.iter().all(|v| self.conforms_element(*element, v))
            }
            (FieldKind::Set { element }, Value::Set(items)) => {
                items.iter().all(|v| self.conforms_element(*element, v))
            }
            (FieldKind::Map { key, value }, Value::Map(pairs)) => pairs
                .iter()
                .all(|(k, v)| self.conforms_element(*key, k) && self.conforms_element(*value, v)),
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// SchemaBuilder
// ---------------------------------------------------------------------------

/// Mutable schema under construction. Also collects the metadata declared
/// alongside fields.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    schema: Schema,
    metadata: MetadataBuilder,
}

#[derive(Debug)]
struct PendingField {
    name: String,
    spec: FieldSpec,
    flags: FieldFlags,
    arity: usize,
    default: Option<Value>,
    meta: Vec<(String, String)>,
    sparse: bool,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an enum with ordered `(name, value)` variants.
    pub fn add_enum(&mut self, name: &str, variants: &[(&str, i64)]) -> EnumKey {
        let key = EnumKey(self.schema.enums.len() as u32);
        self.schema.enums.push(EnumDescriptor {
            key,
            name: name.to_owned(),
            variants: variants.iter().map(|(n, v)| ((*n).to_owned(), *v)).collect(),
        });
        self.schema.enum_names.insert(name.to_owned(), key);
        key
    }

    /// Begin an object type, optionally deriving from `parent`.
    pub fn object(&mut self, name: &str, parent: Option<TypeKey>) -> TypeBuilder<'_> {
        TypeBuilder::new(self, name, TypeKind::Object, parent)
    }

    /// Begin a plain struct type.
    pub fn structure(&mut self, name: &str) -> TypeBuilder<'_> {
        TypeBuilder::new(self, name, TypeKind::Struct, None)
    }

    /// Metadata sink for harvesting passes that run alongside the builder.
    pub fn metadata_mut(&mut self) -> &mut MetadataBuilder {
        &mut self.metadata
    }

    /// Read access to the types built so far.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Freeze into the immutable schema and its metadata registry.
    pub fn build(self) -> (Schema, MetadataRegistry) {
        (self.schema, self.metadata.freeze())
    }

    fn push_field(
        &mut self,
        spec: &FieldSpec,
        name: &str,
        declaring: (TypeKey, TypeKind),
        offset: usize,
        mut flags: FieldFlags,
        arity: usize,
        outer: Option<FieldId>,
    ) -> Result<FieldId, String> {
        if flags.contains(FieldFlags::INSTANCED) {
            flags |= FieldFlags::EDIT_INLINE;
        }
        let id = FieldId(self.schema.fields.len() as u32);
        let scalar = |kind| FieldKind::Scalar(kind);
        let kind = match spec {
            FieldSpec::Bool => scalar(ScalarKind::Bool),
            FieldSpec::Int => scalar(ScalarKind::Int),
            FieldSpec::Float => scalar(ScalarKind::Float),
            FieldSpec::Str => scalar(ScalarKind::Str),
            FieldSpec::Name => scalar(ScalarKind::Name),
            FieldSpec::Enum(e) => {
                if self.schema.try_enum(*e).is_none() {
                    return Err(format!("enum {e:?} does not exist"));
                }
                scalar(ScalarKind::Enum(*e))
            }
            FieldSpec::Struct(ty) => match self.schema.try_type(*ty) {
                Some(d) if d.kind == TypeKind::Struct => FieldKind::Struct(*ty),
                _ => return Err(format!("{ty:?} is not a struct type")),
            },
            FieldSpec::Object(ty) => {
                let self_reference = *ty == declaring.0 && declaring.1 == TypeKind::Object;
                match self.schema.try_type(*ty) {
                    _ if self_reference => FieldKind::ObjectReference { class: *ty },
                    Some(d) if d.kind == TypeKind::Object => {
                        FieldKind::ObjectReference { class: *ty }
                    }
                    _ => return Err(format!("{ty:?} is not an object type")),
                }
            }
            FieldSpec::Array(_) | FieldSpec::Set(_) | FieldSpec::Map(..) => {
                if outer.is_some() {
                    return Err("nested containers are not supported".to_owned());
                }
                if arity != 1 {
                    return Err("static arrays of containers are not supported".to_owned());
                }
                // Placeholder until the element descriptors exist.
                scalar(ScalarKind::Bool)
            }
        };
        if arity == 0 {
            return Err("static arity must be at least 1".to_owned());
        }
        self.schema.fields.push(FieldDescriptor {
            id,
            name: name.to_owned(),
            kind,
            declaring_type: declaring.0,
            offset,
            static_arity: arity,
            flags,
            outer,
            default: None,
        });

        let inner_flags = flags
            & (FieldFlags::EDIT
                | FieldFlags::EDIT_CONST
                | FieldFlags::INSTANCED
                | FieldFlags::EDIT_INLINE);
        let container_kind = match spec {
            FieldSpec::Array(element) => Some(FieldKind::Array {
                element: self.push_field(element, name, declaring, 0, inner_flags, 1, Some(id))?,
            }),
            FieldSpec::Set(element) => Some(FieldKind::Set {
                element: self.push_field(element, name, declaring, 0, inner_flags, 1, Some(id))?,
            }),
            FieldSpec::Map(key, value) => {
                let key = self.push_field(key, name, declaring, 0, inner_flags, 1, Some(id))?;
                let value = self.push_field(value, name, declaring, 1, inner_flags, 1, Some(id))?;
                Some(FieldKind::Map { key, value })
            }
            _ => None,
        };
        if let Some(kind) = container_kind {
            self.schema.fields[id.0 as usize].kind = kind;
        }
        Ok(id)
    }
}

// ---------------------------------------------------------------------------
// TypeBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for one type. Modifier methods (`flags`, `arity`,
/// `default_value`, `meta`) apply to the most recently added field.
#[derive(Debug)]
pub struct TypeBuilder<'a> {
    builder: &'a mut SchemaBuilder,
    name: String,
    kind: TypeKind,
    parent: Option<TypeKey>,
    pending: Vec<PendingField>,
    type_meta: Vec<(String, String)>,
}

impl<'a> TypeBuilder<'a> {
    fn new(
        builder: &'a mut SchemaBuilder,
        name: &str,
        kind: TypeKind,
        parent: Option<TypeKey>,
    ) -> Self {
        Self {
            builder,
            name: name.to_owned(),
            kind,
            parent,
            pending: Vec::new(),
            type_meta: Vec::new(),
        }
    }

    /// Add an editable field.
    pub fn field(mut self, name: &str, spec: FieldSpec) -> Self {
        self.pending.push(PendingField {
            name: name.to_owned(),
            spec,
            flags: FieldFlags::EDIT,
            arity: 1,
            default: None,
            meta: Vec::new(),
            sparse: false,
        });
        self
    }

    /// Add an editable field stored in the per-type sparse block.
    pub fn sparse_field(self, name: &str, spec: FieldSpec) -> Self {
        let mut this = self.field(name, spec);
        if let Some(last) = this.pending.last_mut() {
            last.sparse = true;
            last.flags |= FieldFlags::SPARSE;
        }
        this
    }

    /// Replace the flags of the last field.
    pub fn flags(mut self, flags: FieldFlags) -> Self {
        match self.pending.last_mut() {
            Some(last) => {
                last.flags = flags | (last.flags & FieldFlags::SPARSE);
            }
            None => tracing::warn!(type_name = %self.name, "flags() called before any field"),
        }
        self
    }

    /// Add flags to the last field.
    pub fn add_flags(mut self, flags: FieldFlags) -> Self {
        if let Some(last) = self.pending.last_mut() {
            last.flags |= flags;
        }
        self
    }

    /// Make the last field a static array of `arity` slots.
    pub fn arity(mut self, arity: usize) -> Self {
        if let Some(last) = self.pending.last_mut() {
            last.arity = arity;
        }
        self
    }

    /// Declared per-slot default of the last field.
    pub fn default_value(mut self, value: Value) -> Self {
        if let Some(last) = self.pending.last_mut() {
            last.default = Some(value);
        }
        self
    }

    /// Attach a metadata entry to the last field.
    pub fn meta(mut self, key: &str, value: &str) -> Self {
        if let Some(last) = self.pending.last_mut() {
            last.meta.push((key.to_owned(), value.to_owned()));
        }
        self
    }

    /// Attach a metadata entry to the type itself.
    pub fn type_meta(mut self, key: &str, value: &str) -> Self {
        self.type_meta.push((key.to_owned(), value.to_owned()));
        self
    }

    /// Validate and register the type. On error nothing is registered.
    pub fn finish(self) -> Result<TypeKey, ReflectError> {
        let TypeBuilder {
            builder,
            name,
            kind,
            parent,
            pending,
            type_meta,
        } = self;

        let (mut layout, mut sparse_fields) = match parent {
            Some(p) => {
                let parent_desc = builder
                    .schema
                    .try_type(p)
                    .ok_or(ReflectError::UnknownType { key: p })?;
                if parent_desc.kind != TypeKind::Object || kind != TypeKind::Object {
                    return Err(ReflectError::InconsistentKind {
                        type_name: name,
                        field: String::new(),
                        details: "only object types can derive from object types".to_owned(),
                    });
                }
                (parent_desc.fields.clone(), parent_desc.sparse_fields.clone())
            }
            None => (Vec::new(), Vec::new()),
        };
        let mut seen: HashSet<String> = layout
            .iter()
            .chain(sparse_fields.iter())
            .map(|f| builder.schema.field(*f).name.clone())
            .collect();
        if builder.schema.type_names.contains_key(&name) {
            return Err(ReflectError::InconsistentKind {
                type_name: name,
                field: String::new(),
                details: "a type with this name already exists".to_owned(),
            });
        }

        let key = TypeKey(builder.schema.types.len() as u32);
        let own_start = layout.len();
        let field_mark = builder.schema.fields.len();
        let mut own_sparse = Vec::new();
        let mut field_meta = Vec::new();

        for pf in pending {
            if !seen.insert(pf.name.clone()) {
                builder.schema.fields.truncate(field_mark);
                return Err(ReflectError::DuplicateField {
                    type_name: name,
                    field: pf.name,
                });
            }
            let offset = if pf.sparse { own_sparse.len() } else { layout.len() };
            let pushed = builder
                .push_field(&pf.spec, &pf.name, (key, kind), offset, pf.flags, pf.arity, None)
                .and_then(|id| match &pf.default {
                    Some(default) if !builder.schema.conforms_element(id, default) => Err(format!(
                        "declared default {} does not match the field kind",
                        default.kind_name()
                    )),
                    _ => Ok(id),
                });
            let id = match pushed {
                Ok(id) => id,
                Err(details) => {
                    builder.schema.fields.truncate(field_mark);
                    return Err(ReflectError::InconsistentKind {
                        type_name: name,
                        field: pf.name,
                        details,
                    });
                }
            };
            builder.schema.fields[id.0 as usize].default = pf.default;
            if pf.sparse {
                own_sparse.push(id);
            } else {
                layout.push(id);
            }
            field_meta.push((id, pf.meta));
        }

        let sparse_default =
            Value::Struct(own_sparse.iter().map(|f| builder.schema.default_value(*f)).collect());
        sparse_fields.extend(own_sparse);
        builder.schema.types.push(TypeDescriptor {
            key,
            name: name.clone(),
            kind,
            parent,
            fields: layout,
            own_start,
            sparse_fields,
            sparse_default,
        });
        builder.schema.type_names.insert(name.clone(), key);

        for (id, entries) in field_meta {
            for (k, v) in entries {
                builder.metadata.set(MetaTarget::Field(id), &k, &v);
            }
        }
        for (k, v) in type_meta {
            builder.metadata.set(MetaTarget::Type(key), &k, &v);
        }
        tracing::debug!(type_name = %name, type_key = ?key, "registered reflected type");
        Ok(key)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn vector_schema() -> (SchemaBuilder, TypeKey) {
        let mut b = SchemaBuilder::new();
        let vec3 = b
            .structure("Vector")
            .field("X", FieldSpec::Float)
            .field("Y", FieldSpec::Float)
            .field("Z", FieldSpec::Float)
            .finish()
            .unwrap();
        (b, vec3)
    }

    // -- layout -------------------------------------------------------------

    #[test]
    fn derived_type_layout_starts_with_parent_fields() {
        let mut b = SchemaBuilder::new();
        let base = b
            .object("Actor", None)
            .field("Health", FieldSpec::Int)
            .finish()
            .unwrap();
        let pawn = b
            .object("Pawn", Some(base))
            .field("Speed", FieldSpec::Float)
            .finish()
            .unwrap();
        let (schema, _) = b.build();

        let pawn_desc = schema.type_desc(pawn);
        assert_eq!(pawn_desc.fields().len(), 2);
        assert_eq!(pawn_desc.own_fields().len(), 1);
        let health = schema.find_field(pawn, "Health").unwrap();
        let speed = schema.find_field(pawn, "Speed").unwrap();
        assert_eq!(schema.field(health).offset, 0);
        assert_eq!(schema.field(speed).offset, 1);
        assert!(schema.is_child_of(pawn, base));
        assert!(!schema.is_child_of(base, pawn));
    }

    #[test]
    fn common_ancestor_walks_parent_chain() {
        let mut b = SchemaBuilder::new();
        let base = b.object("Base", None).finish().unwrap();
        let left = b.object("Left", Some(base)).finish().unwrap();
        let right = b.object("Right", Some(base)).finish().unwrap();
        let leaf = b.object("Leaf", Some(left)).finish().unwrap();
        let lone = b.object("Lone", None).finish().unwrap();
        let (schema, _) = b.build();

        assert_eq!(schema.common_ancestor(&[leaf, left]), Some(left));
        assert_eq!(schema.common_ancestor(&[leaf, right]), Some(base));
        assert_eq!(schema.common_ancestor(&[leaf, lone]), None);
        assert_eq!(schema.common_ancestor(&[]), None);
    }

    #[test]
    fn container_fields_own_element_descriptors() {
        let (mut b, vec3) = vector_schema();
        let holder = b
            .object("Holder", None)
            .field("Points", FieldSpec::array(FieldSpec::Struct(vec3)))
            .field("Lookup", FieldSpec::map(FieldSpec::Name, FieldSpec::Int))
            .finish()
            .unwrap();
        let (schema, _) = b.build();

        let points = schema.find_field(holder, "Points").unwrap();
        let element = schema.element_of(points).unwrap();
        assert_eq!(schema.field(element).outer, Some(points));
        assert!(schema.field(element).is_inner());
        assert_eq!(schema.field(element).kind, FieldKind::Struct(vec3));

        let lookup = schema.find_field(holder, "Lookup").unwrap();
        match schema.field(lookup).kind {
            FieldKind::Map { key, value } => {
                assert_eq!(schema.field(key).kind, FieldKind::Scalar(ScalarKind::Name));
                assert_eq!(schema.field(value).kind, FieldKind::Scalar(ScalarKind::Int));
            }
            other => panic!("expected map kind, got {other:?}"),
        }
    }

    // -- validation ---------------------------------------------------------

    #[test]
    fn duplicate_field_is_rejected_and_rolled_back() {
        let mut b = SchemaBuilder::new();
        let before = b.schema().fields.len();
        let err = b
            .object("Dup", None)
            .field("A", FieldSpec::Int)
            .field("A", FieldSpec::Float)
            .finish()
            .unwrap_err();
        assert!(matches!(err, ReflectError::DuplicateField { .. }));
        assert_eq!(b.schema().fields.len(), before);
        assert!(b.schema().type_by_name("Dup").is_none());
    }

    #[test]
    fn nested_containers_are_rejected() {
        let mut b = SchemaBuilder::new();
        let err = b
            .object("Bad", None)
            .field("Grid", FieldSpec::array(FieldSpec::array(FieldSpec::Int)))
            .finish()
            .unwrap_err();
        assert!(matches!(err, ReflectError::InconsistentKind { .. }));
    }

    #[test]
    fn struct_field_must_reference_struct_type() {
        let mut b = SchemaBuilder::new();
        let obj = b.object("Obj", None).finish().unwrap();
        let err = b
            .structure("S")
            .field("Inner", FieldSpec::Struct(obj))
            .finish()
            .unwrap_err();
        assert!(matches!(err, ReflectError::InconsistentKind { .. }));
    }

    #[test]
    fn self_referencing_object_field_is_allowed() {
        let mut b = SchemaBuilder::new();
        let node = b
            .object("ListNode", None)
            .field("Next", FieldSpec::Object(TypeKey(0)))
            .finish()
            .unwrap();
        let (schema, _) = b.build();
        let next = schema.find_field(node, "Next").unwrap();
        assert_eq!(schema.field(next).kind, FieldKind::ObjectReference { class: node });
    }

    #[test]
    fn mismatched_default_is_rejected() {
        let mut b = SchemaBuilder::new();
        let err = b
            .object("Bad", None)
            .field("Speed", FieldSpec::Float)
            .default_value(Value::Int(3))
            .finish()
            .unwrap_err();
        assert!(matches!(err, ReflectError::InconsistentKind { .. }));
    }

    // -- defaults and shape -------------------------------------------------

    #[test]
    fn defaults_expand_static_arrays_and_structs() {
        let (mut b, vec3) = vector_schema();
        let color = b.add_enum("Color", &[("Red", 4), ("Green", 5)]);
        let thing = b
            .object("Thing", None)
            .field("Offsets", FieldSpec::Struct(vec3))
            .arity(2)
            .field("Tint", FieldSpec::Enum(color))
            .field("Speed", FieldSpec::Float)
            .default_value(Value::Float(10.0))
            .finish()
            .unwrap();
        let (schema, _) = b.build();

        let zero = Value::Struct(vec![Value::Float(0.0); 3]);
        assert_eq!(
            schema.default_struct(thing),
            Value::Struct(vec![
                Value::Fixed(vec![zero.clone(), zero]),
                Value::Enum(4),
                Value::Float(10.0),
            ])
        );
        let offsets = schema.find_field(thing, "Offsets").unwrap();
        assert!(schema.conforms(offsets, &schema.default_value(offsets)));
        assert!(!schema.conforms(offsets, &schema.default_element(offsets)));
    }

    #[test]
    fn instanced_flag_implies_edit_inline_and_deep_compare() {
        let mut b = SchemaBuilder::new();
        let part = b.object("Part", None).finish().unwrap();
        let owner = b
            .object("Owner", None)
            .field("Parts", FieldSpec::array(FieldSpec::Object(part)))
            .flags(FieldFlags::EDIT | FieldFlags::INSTANCED)
            .field("Plain", FieldSpec::Object(part))
            .finish()
            .unwrap();
        let (schema, _) = b.build();

        let parts = schema.find_field(owner, "Parts").unwrap();
        let element = schema.element_of(parts).unwrap();
        assert!(schema.field(element).flags.contains(FieldFlags::EDIT_INLINE));
        assert!(schema.may_contain_instanced(parts));
        let plain = schema.find_field(owner, "Plain").unwrap();
        assert!(!schema.may_contain_instanced(plain));
    }

    #[test]
    fn sparse_fields_are_numbered_per_declaring_type() {
        let mut b = SchemaBuilder::new();
        let base = b
            .object("Base", None)
            .field("Local", FieldSpec::Int)
            .sparse_field("SharedA", FieldSpec::Int)
            .finish()
            .unwrap();
        let derived = b
            .object("Derived", Some(base))
            .sparse_field("SharedB", FieldSpec::Bool)
            .finish()
            .unwrap();
        let (schema, _) = b.build();

        let shared_b = schema.find_field(derived, "SharedB").unwrap();
        assert_eq!(schema.field(shared_b).offset, 0);
        assert!(schema.field(shared_b).is_sparse());
        assert_eq!(schema.type_desc(derived).sparse_fields().len(), 2);
        assert_eq!(schema.sparse_default(base), &Value::Struct(vec![Value::Int(0)]));
        assert_eq!(schema.sparse_default(derived), &Value::Struct(vec![Value::Bool(false)]));
    }

    #[test]
    fn enum_lookup_is_case_insensitive() {
        let mut b = SchemaBuilder::new();
        let key = b.add_enum("Mode", &[("Walk", 0), ("Run", 1)]);
        let (schema, _) = b.build();
        let desc = schema.enum_desc(key);
        assert_eq!(desc.value_of("run"), Some(1));
        assert_eq!(desc.name_of(0), Some("Walk"));
        assert_eq!(desc.value_of("Fly"), None);
        assert_eq!(schema.enum_by_name("Mode"), Some(key));
    }
}
