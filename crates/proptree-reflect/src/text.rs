//! Text form of field values.
//!
//! Scalars export as plain text (`True`, `42`, `1.5`, enum variant names),
//! and object references as the referenced instance's name or `None`.
//! Composite values use a parenthesized form:
//!
//! | value | text |
//! |---|---|
//! | struct | `(X=1,Y=2)` |
//! | array, set, static array | `(1,2,3)` |
//! | map | `(("a",1),("b",2))` |
//!
//! Strings are written raw at the top level and quoted inside composites.
//! Export followed by import reproduces the value exactly.
//!
//! # Example
//!
//! ```
//! use proptree_reflect::prelude::*;
//! use proptree_reflect::text::NoObjects;
//!
//! let mut b = SchemaBuilder::new();
//! let point = b.structure("Point")
//!     .field("X", FieldSpec::Int)
//!     .field("Y", FieldSpec::Int)
//!     .finish().unwrap();
//! let holder = b.object("Holder", None)
//!     .field("Points", FieldSpec::array(FieldSpec::Struct(point)))
//!     .finish().unwrap();
//! let (schema, _) = b.build();
//! let points = schema.find_field(holder, "Points").unwrap();
//!
//! let codec = TextCodec::new(&schema, &NoObjects);
//! let value = codec.import(points, "((X=1,Y=2),(X=3))").unwrap();
//! assert_eq!(codec.export(points, &value), "((X=1,Y=2),(X=3,Y=0))");
//! ```

use std::fmt::Write;

use crate::instance::InstanceId;
use crate::metadata::MetadataRegistry;
use crate::schema::{FieldId, FieldKind, ScalarKind, Schema, TypeKey};
use crate::value::{SparseSlots, Value};

// ---------------------------------------------------------------------------
// Errors and object resolution
// ---------------------------------------------------------------------------

/// Failure to parse text into a value of the expected field kind.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TextError {
    #[error("expected {expected}, found '{found}'")]
    Expected { expected: String, found: String },

    #[error("'{value}' is not a variant of enum {enum_name}")]
    UnknownEnumValue { enum_name: String, value: String },

    #[error("no instance named '{name}'")]
    UnknownObject { name: String },

    #[error("'{name}' is not an instance of {class}")]
    WrongClass { name: String, class: String },

    #[error("type {type_name} has no field '{field}'")]
    UnknownField { type_name: String, field: String },

    #[error("{found} elements exceed the fixed arity {arity}")]
    TooManyElements { found: usize, arity: usize },

    #[error("duplicate element '{text}'")]
    DuplicateElement { text: String },

    #[error("unexpected end of text")]
    UnexpectedEnd,

    #[error("unexpected trailing text '{rest}'")]
    Trailing { rest: String },
}

/// Name-based lookup of instances for object reference text.
pub trait ObjectResolver {
    fn object_name(&self, id: InstanceId) -> Option<&str>;
    fn object_by_name(&self, name: &str) -> Option<InstanceId>;
    fn object_type(&self, id: InstanceId) -> Option<TypeKey>;
}

/// Resolver for contexts without instances; every reference is unknown.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoObjects;

impl ObjectResolver for NoObjects {
    fn object_name(&self, _: InstanceId) -> Option<&str> {
        None
    }

    fn object_by_name(&self, _: &str) -> Option<InstanceId> {
        None
    }

    fn object_type(&self, _: InstanceId) -> Option<TypeKey> {
        None
    }
}

// ---------------------------------------------------------------------------
// TextCodec
// ---------------------------------------------------------------------------

/// Converts values of schema fields to and from text.
pub struct TextCodec<'a> {
    schema: &'a Schema,
    objects: &'a dyn ObjectResolver,
    display: Option<&'a MetadataRegistry>,
}

impl<'a> TextCodec<'a> {
    pub fn new(schema: &'a Schema, objects: &'a dyn ObjectResolver) -> Self {
        Self {
            schema,
            objects,
            display: None,
        }
    }

    /// Export enums through their display names. Such text is meant for
    /// people and does not import.
    pub fn with_display_names(mut self, metadata: &'a MetadataRegistry) -> Self {
        self.display = Some(metadata);
        self
    }

    // -- export -------------------------------------------------------------

    /// Text of a whole field value (static arrays included).
    pub fn export(&self, field: FieldId, value: &Value) -> String {
        match value {
            Value::Fixed(_) if self.schema.field(field).is_static_array() => {
                let mut out = String::new();
                self.write_field(field, value, &mut out);
                out
            }
            _ => self.export_element(field, value),
        }
    }

    /// Text of one slot or container element.
    pub fn export_element(&self, field: FieldId, value: &Value) -> String {
        match value {
            Value::Str(s) | Value::Name(s) => s.clone(),
            Value::Object(reference) => self.object_text(*reference).to_owned(),
            _ => {
                let mut out = String::new();
                self.write_element(field, value, &mut out);
                out
            }
        }
    }

    fn object_text(&self, reference: Option<InstanceId>) -> &str {
        reference
            .and_then(|id| self.objects.object_name(id))
            .unwrap_or("None")
    }

    fn write_field(&self, field: FieldId, value: &Value, out: &mut String) {
        match value {
            Value::Fixed(slots) if self.schema.field(field).is_static_array() => {
                out.push('(');
                for (i, slot) in slots.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    self.write_element(field, slot, out);
                }
                out.push(')');
            }
            _ => self.write_element(field, value, out),
        }
    }

    fn write_element(&self, field: FieldId, value: &Value, out: &mut String) {
        let kind = self.schema.field(field).kind;
        match (kind, value) {
            (_, Value::Bool(b)) => out.push_str(if *b { "True" } else { "False" }),
            (_, Value::Int(i)) => {
                let _ = write!(out, "{i}");
            }
            (_, Value::Float(f)) => {
                let _ = write!(out, "{f}");
            }
            (_, Value::Str(s)) | (_, Value::Name(s)) => quote(s, out),
            (FieldKind::Scalar(ScalarKind::Enum(e)), Value::Enum(v)) => {
                let name = match self.display {
                    Some(meta) => meta.enum_display_name(self.schema, e, *v),
                    None => self
                        .schema
                        .try_enum(e)
                        .and_then(|d| d.name_of(*v))
                        .map_or_else(|| v.to_string(), str::to_owned),
                };
                out.push_str(&name);
            }
            (_, Value::Enum(v)) => {
                let _ = write!(out, "{v}");
            }
            (_, Value::Object(reference)) => {
                let name = self.object_text(*reference);
                if needs_quotes(name) {
                    quote(name, out);
                } else {
                    out.push_str(name);
                }
            }
            (FieldKind::Struct(ty), Value::Struct(members)) => {
                out.push('(');
                for (i, (member_field, member)) in self
                    .schema
                    .type_desc(ty)
                    .fields()
                    .iter()
                    .zip(members)
                    .enumerate()
                {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(&self.schema.field(*member_field).name);
                    out.push('=');
                    self.write_field(*member_field, member, out);
                }
                out.push(')');
            }
            (FieldKind::Array { element }, Value::Array(items)) => {
                self.write_list(element, items.iter(), out)
            }
            (FieldKind::Set { element }, Value::Set(items)) => {
                self.write_list(element, items.iter(), out)
            }
            (FieldKind::Map { key, value }, Value::Map(pairs)) => {
                out.push('(');
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push('(');
                    self.write_element(key, k, out);
                    out.push(',');
                    self.write_element(value, v, out);
                    out.push(')');
                }
                out.push(')');
            }
            (_, Value::Fixed(slots)) => self.write_list(field, slots.iter(), out),
            (_, other) => out.push_str(other.kind_name()),
        }
    }

    fn write_list<'v>(&self, element: FieldId, items: impl Iterator<Item = &'v Value>, out: &mut String) {
        out.push('(');
        for (i, item) in items.enumerate() {
            if i > 0 {
                out.push(',');
            }
            self.write_element(element, item, out);
        }
        out.push(')');
    }

    // -- import -------------------------------------------------------------

    /// Parse a whole field value (static arrays included).
    pub fn import(&self, field: FieldId, text: &str) -> Result<Value, TextError> {
        if self.schema.field(field).is_static_array() {
            let node = parse(text)?;
            self.field_from_node(field, &node)
        } else {
            self.import_element(field, text)
        }
    }

    /// Parse one slot or container element.
    pub fn import_element(&self, field: FieldId, text: &str) -> Result<Value, TextError> {
        match self.schema.field(field).kind {
            FieldKind::Scalar(ScalarKind::Str) => Ok(Value::Str(text.to_owned())),
            FieldKind::Scalar(ScalarKind::Name) => Ok(Value::Name(text.to_owned())),
            FieldKind::Scalar(kind) => self.scalar_from_str(kind, text.trim()),
            FieldKind::ObjectReference { class } => self.object_from_str(class, text.trim()),
            _ => {
                let node = parse(text)?;
                self.element_from_node(field, &node)
            }
        }
    }

    fn field_from_node(&self, field: FieldId, node: &Node) -> Result<Value, TextError> {
        let desc = self.schema.field(field);
        if !desc.is_static_array() {
            return self.element_from_node(field, node);
        }
        let Node::List(entries) = node else {
            return Err(expected("static array", node));
        };
        if entries.len() > desc.static_arity {
            return Err(TextError::TooManyElements {
                found: entries.len(),
                arity: desc.static_arity,
            });
        }
        let mut slots = Vec::with_capacity(desc.static_arity);
        for (_, entry) in entries {
            slots.push(self.element_from_node(field, entry)?);
        }
        slots.resize(desc.static_arity, self.schema.default_element(field));
        Ok(Value::Fixed(slots))
    }

    fn element_from_node(&self, field: FieldId, node: &Node) -> Result<Value, TextError> {
        let kind = self.schema.field(field).kind;
        match (kind, node) {
            (FieldKind::Scalar(ScalarKind::Str), Node::Atom(s) | Node::Quoted(s)) => {
                Ok(Value::Str(s.clone()))
            }
            (FieldKind::Scalar(ScalarKind::Name), Node::Atom(s) | Node::Quoted(s)) => {
                Ok(Value::Name(s.clone()))
            }
            (FieldKind::Scalar(kind), Node::Atom(s) | Node::Quoted(s)) => {
                self.scalar_from_str(kind, s)
            }
            (FieldKind::ObjectReference { class }, Node::Atom(s) | Node::Quoted(s)) => {
                self.object_from_str(class, s)
            }
            (FieldKind::Struct(ty), Node::List(entries)) => self.struct_from_entries(ty, entries),
            (FieldKind::Array { element }, Node::List(entries)) => entries
                .iter()
                .map(|(_, n)| self.element_from_node(element, n))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            (FieldKind::Set { element }, Node::List(entries)) => {
                let mut set = SparseSlots::new();
                for (_, entry) in entries {
                    let item = self.element_from_node(element, entry)?;
                    if set.iter().any(|existing| *existing == item) {
                        return Err(TextError::DuplicateElement {
                            text: self.export_element(element, &item),
                        });
                    }
                    set.insert(item);
                }
                Ok(Value::Set(set))
            }
            (FieldKind::Map { key, value }, Node::List(entries)) => {
                let mut map: SparseSlots<(Value, Value)> = SparseSlots::new();
                for entry in entries {
                    let (k, v) = match entry {
                        (Some(k), v) => (self.import_element(key, k)?, self.element_from_node(value, v)?),
                        (None, Node::List(pair)) if pair.len() == 2 => (
                            self.element_from_node(key, &pair[0].1)?,
                            self.element_from_node(value, &pair[1].1)?,
                        ),
                        (None, other) => return Err(expected("(key,value) pair", other)),
                    };
                    if map.iter().any(|(existing, _)| *existing == k) {
                        return Err(TextError::DuplicateElement {
                            text: self.export_element(key, &k),
                        });
                    }
                    map.insert((k, v));
                }
                Ok(Value::Map(map))
            }
            (FieldKind::Scalar(_) | FieldKind::ObjectReference { .. }, other) => {
                Err(expected("a single value", other))
            }
            (_, other) => Err(expected("a parenthesized list", other)),
        }
    }

    fn struct_from_entries(
        &self,
        ty: TypeKey,
        entries: &[(Option<String>, Node)],
    ) -> Result<Value, TextError> {
        let desc = self.schema.type_desc(ty);
        let Value::Struct(mut members) = self.schema.default_struct(ty) else {
            return Err(TextError::UnexpectedEnd);
        };
        for (position, (key, node)) in entries.iter().enumerate() {
            let index = match key {
                Some(name) => desc
                    .fields()
                    .iter()
                    .position(|f| self.schema.field(*f).name.eq_ignore_ascii_case(name))
                    .ok_or_else(|| TextError::UnknownField {
                        type_name: desc.name.clone(),
                        field: name.clone(),
                    })?,
                None if position < desc.fields().len() => position,
                None => {
                    return Err(TextError::TooManyElements {
                        found: entries.len(),
                        arity: desc.fields().len(),
                    })
                }
            };
            members[index] = self.field_from_node(desc.fields()[index], node)?;
        }
        Ok(Value::Struct(members))
    }

    fn scalar_from_str(&self, kind: ScalarKind, s: &str) -> Result<Value, TextError> {
        let fail = |what: &str| TextError::Expected {
            expected: what.to_owned(),
            found: s.to_owned(),
        };
        match kind {
            ScalarKind::Bool => match s.to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(Value::Bool(true)),
                "false" | "no" | "0" => Ok(Value::Bool(false)),
                _ => Err(fail("a boolean")),
            },
            ScalarKind::Int => s.parse().map(Value::Int).map_err(|_| fail("an integer")),
            ScalarKind::Float => s.parse().map(Value::Float).map_err(|_| fail("a number")),
            ScalarKind::Str => Ok(Value::Str(s.to_owned())),
            ScalarKind::Name => Ok(Value::Name(s.to_owned())),
            ScalarKind::Enum(key) => {
                let desc = self.schema.try_enum(key).ok_or_else(|| fail("an enum value"))?;
                let variant = s.rsplit("::").next().unwrap_or(s);
                // Undeclared values export as plain numbers and must read back.
                let by_number = s.parse::<i64>().ok();
                desc.value_of(variant)
                    .or(by_number)
                    .map(Value::Enum)
                    .ok_or_else(|| TextError::UnknownEnumValue {
                        enum_name: desc.name.clone(),
                        value: s.to_owned(),
                    })
            }
        }
    }

    fn object_from_str(&self, class: TypeKey, s: &str) -> Result<Value, TextError> {
        if s.is_empty() || s.eq_ignore_ascii_case("none") {
            return Ok(Value::Object(None));
        }
        let id = self
            .objects
            .object_by_name(s)
            .ok_or_else(|| TextError::UnknownObject { name: s.to_owned() })?;
        let fits = self
            .objects
            .object_type(id)
            .is_some_and(|ty| self.schema.is_child_of(ty, class));
        if !fits {
            return Err(TextError::WrongClass {
                name: s.to_owned(),
                class: self.schema.type_desc(class).name.clone(),
            });
        }
        Ok(Value::Object(Some(id)))
    }
}

// ---------------------------------------------------------------------------
// Composite text parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Atom(String),
    Quoted(String),
    List(Vec<(Option<String>, Node)>),
}

fn expected(what: &str, node: &Node) -> TextError {
    let found = match node {
        Node::Atom(s) => s.clone(),
        Node::Quoted(s) => format!("\"{s}\""),
        Node::List(_) => "(...)".to_owned(),
    };
    TextError::Expected {
        expected: what.to_owned(),
        found,
    }
}

fn needs_quotes(s: &str) -> bool {
    s.is_empty()
        || s.trim() != s
        || s.contains(|c: char| matches!(c, ',' | '(' | ')' | '=' | '"' | '\\'))
}

fn quote(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out.push('"');
}

fn parse(text: &str) -> Result<Node, TextError> {
    let mut parser = Parser { text, pos: 0 };
    let node = parser.node()?;
    parser.skip_ws();
    if parser.pos < text.len() {
        return Err(TextError::Trailing {
            rest: text[parser.pos..].to_owned(),
        });
    }
    Ok(node)
}

struct Parser<'t> {
    text: &'t str,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn node(&mut self) -> Result<Node, TextError> {
        self.skip_ws();
        match self.peek() {
            Some('(') => {
                self.bump();
                self.list()
            }
            Some('"') => {
                self.bump();
                self.quoted()
            }
            Some(_) => Ok(Node::Atom(self.atom())),
            None => Err(TextError::UnexpectedEnd),
        }
    }

    fn atom(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if matches!(c, ',' | '(' | ')' | '=' | '"') {
                break;
            }
            self.bump();
        }
        self.text[start..self.pos].trim().to_owned()
    }

    fn quoted(&mut self) -> Result<Node, TextError> {
        let mut s = String::new();
        loop {
            match self.bump() {
                Some('\\') => match self.bump() {
                    Some('n') => s.push('\n'),
                    Some(c) => s.push(c),
                    None => return Err(TextError::UnexpectedEnd),
                },
                Some('"') => return Ok(Node::Quoted(s)),
                Some(c) => s.push(c),
                None => return Err(TextError::UnexpectedEnd),
            }
        }
    }

    fn list(&mut self) -> Result<Node, TextError> {
        let mut entries = Vec::new();
        self.skip_ws();
        if self.peek() == Some(')') {
            self.bump();
            return Ok(Node::List(entries));
        }
        loop {
            let first = self.node()?;
            self.skip_ws();
            let entry = if self.peek() == Some('=') {
                self.bump();
                let key = match first {
                    Node::Atom(k) | Node::Quoted(k) => k,
                    list @ Node::List(_) => return Err(expected("a field name", &list)),
                };
                (Some(key), self.node()?)
            } else {
                (None, first)
            };
            entries.push(entry);
            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some(')') => return Ok(Node::List(entries)),
                Some(c) => {
                    return Err(TextError::Expected {
                        expected: "',' or ')'".to_owned(),
                        found: c.to_string(),
                    })
                }
                None => return Err(TextError::UnexpectedEnd),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldSpec, SchemaBuilder};
    use crate::store::InstanceStore;
    use std::sync::Arc;

    struct Fixture {
        schema: Schema,
        holder: TypeKey,
    }

    impl Fixture {
        fn field(&self, name: &str) -> FieldId {
            self.schema.find_field(self.holder, name).unwrap()
        }
    }

    fn fixture() -> Fixture {
        let mut b = SchemaBuilder::new();
        let gear = b.add_enum("Gear", &[("Park", 0), ("Drive", 1)]);
        let point = b
            .structure("Point")
            .field("X", FieldSpec::Float)
            .field("Label", FieldSpec::Str)
            .finish()
            .unwrap();
        let holder = b
            .object("Holder", None)
            .field("Flag", FieldSpec::Bool)
            .field("Count", FieldSpec::Int)
            .field("Title", FieldSpec::Str)
            .field("Gear", FieldSpec::Enum(gear))
            .field("Origin", FieldSpec::Struct(point))
            .field("Corners", FieldSpec::Int)
            .arity(3)
            .field("Tags", FieldSpec::set(FieldSpec::Name))
            .field("Scores", FieldSpec::map(FieldSpec::Str, FieldSpec::Int))
            .field("Friend", FieldSpec::Object(TypeKey(1)))
            .finish()
            .unwrap();
        let (schema, _) = b.build();
        Fixture { schema, holder }
    }

    fn round_trip(fx: &Fixture, name: &str, text: &str) -> String {
        let codec = TextCodec::new(&fx.schema, &NoObjects);
        let field = fx.field(name);
        let value = codec.import(field, text).unwrap();
        let exported = codec.export(field, &value);
        assert_eq!(codec.import(field, &exported).unwrap(), value);
        exported
    }

    // -- scalars ------------------------------------------------------------

    #[test]
    fn scalar_forms() {
        let fx = fixture();
        assert_eq!(round_trip(&fx, "Flag", "yes"), "True");
        assert_eq!(round_trip(&fx, "Count", " 42 "), "42");
        assert_eq!(round_trip(&fx, "Title", "  spaced, (raw)  "), "  spaced, (raw)  ");
        assert_eq!(round_trip(&fx, "Gear", "Gear::Drive"), "Drive");
        assert_eq!(round_trip(&fx, "Gear", "0"), "Park");
    }

    #[test]
    fn bad_scalars_are_rejected() {
        let fx = fixture();
        let codec = TextCodec::new(&fx.schema, &NoObjects);
        assert!(matches!(
            codec.import(fx.field("Count"), "4.5"),
            Err(TextError::Expected { .. })
        ));
        assert!(matches!(
            codec.import(fx.field("Gear"), "Reverse"),
            Err(TextError::UnknownEnumValue { .. })
        ));
    }

    #[test]
    fn undeclared_enum_numbers_survive() {
        let fx = fixture();
        let codec = TextCodec::new(&fx.schema, &NoObjects);
        let field = fx.field("Gear");
        assert_eq!(codec.export(field, &Value::Enum(7)), "7");
        assert_eq!(codec.import(field, "7"), Ok(Value::Enum(7)));
        assert_eq!(round_trip(&fx, "Gear", "-2"), "-2");
    }

    // -- composites ---------------------------------------------------------

    #[test]
    fn struct_import_keeps_defaults_for_missing_members() {
        let fx = fixture();
        assert_eq!(round_trip(&fx, "Origin", "(Label=\"a, b\")"), "(X=0,Label=\"a, b\")");
        assert_eq!(round_trip(&fx, "Origin", "(2.5)"), "(X=2.5,Label=\"\")");
    }

    #[test]
    fn unknown_struct_member_is_an_error() {
        let fx = fixture();
        let codec = TextCodec::new(&fx.schema, &NoObjects);
        assert_eq!(
            codec.import(fx.field("Origin"), "(Z=1)"),
            Err(TextError::UnknownField {
                type_name: "Point".into(),
                field: "Z".into()
            })
        );
    }

    #[test]
    fn static_array_pads_and_bounds() {
        let fx = fixture();
        assert_eq!(round_trip(&fx, "Corners", "(1,2)"), "(1,2,0)");
        let codec = TextCodec::new(&fx.schema, &NoObjects);
        assert_eq!(
            codec.import(fx.field("Corners"), "(1,2,3,4)"),
            Err(TextError::TooManyElements { found: 4, arity: 3 })
        );
        assert_eq!(codec.import_element(fx.field("Corners"), "7"), Ok(Value::Int(7)));
    }

    #[test]
    fn sets_and_maps_reject_duplicates() {
        let fx = fixture();
        assert_eq!(round_trip(&fx, "Tags", "(a, \"b c\")"), "(\"a\",\"b c\")");
        assert_eq!(round_trip(&fx, "Scores", "((\"x\",1),(y,2))"), "((\"x\",1),(\"y\",2))");
        assert_eq!(round_trip(&fx, "Scores", "()"), "()");

        let codec = TextCodec::new(&fx.schema, &NoObjects);
        assert!(matches!(
            codec.import(fx.field("Tags"), "(a,a)"),
            Err(TextError::DuplicateElement { .. })
        ));
        assert!(matches!(
            codec.import(fx.field("Scores"), "((x,1),(x,2))"),
            Err(TextError::DuplicateElement { .. })
        ));
    }

    #[test]
    fn malformed_lists() {
        let fx = fixture();
        let codec = TextCodec::new(&fx.schema, &NoObjects);
        let tags = fx.field("Tags");
        assert_eq!(codec.import(tags, "(a,b"), Err(TextError::UnexpectedEnd));
        assert!(matches!(codec.import(tags, "(a) x"), Err(TextError::Trailing { .. })));
        assert!(matches!(codec.import(tags, "a"), Err(TextError::Expected { .. })));
    }

    // -- objects ------------------------------------------------------------

    #[test]
    fn object_references_use_instance_names() {
        let fx = fixture();
        let schema = Arc::new(fx.schema.clone());
        let mut store = InstanceStore::new(Arc::clone(&schema));
        let other = store.spawn(fx.holder, "Other Holder").unwrap();
        let codec = TextCodec::new(&schema, &store);
        let friend = fx.field("Friend");

        let value = codec.import(friend, "Other Holder").unwrap();
        assert_eq!(value, Value::Object(Some(other)));
        assert_eq!(codec.export(friend, &value), "Other Holder");
        assert_eq!(codec.import(friend, "None").unwrap(), Value::Object(None));
        assert_eq!(
            codec.import(friend, "Missing"),
            Err(TextError::UnknownObject {
                name: "Missing".into()
            })
        );
    }

    #[test]
    fn display_names_apply_to_enums() {
        let mut b = SchemaBuilder::new();
        let gear = b.add_enum("Gear", &[("Park", 0)]);
        b.metadata_mut().set(
            crate::metadata::MetaTarget::EnumVariant(gear, 0),
            crate::metadata::keys::DISPLAY_NAME,
            "P",
        );
        let ty = b.object("T", None).field("G", FieldSpec::Enum(gear)).finish().unwrap();
        let (schema, meta) = b.build();
        let field = schema.find_field(ty, "G").unwrap();

        let codec = TextCodec::new(&schema, &NoObjects).with_display_names(&meta);
        assert_eq!(codec.export(field, &Value::Enum(0)), "P");
    }
}
