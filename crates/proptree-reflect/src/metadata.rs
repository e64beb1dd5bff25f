//! String metadata attached to fields, types, and enum variants.
//!
//! Metadata is gathered into a mutable [`MetadataBuilder`] (by the schema
//! builder or an external harvesting pass) and then frozen into an immutable
//! [`MetadataRegistry`] that editors receive by injection.
//!
//! # Example
//!
//! ```
//! use proptree_reflect::metadata::{keys, MetaTarget, MetadataBuilder};
//! use proptree_reflect::schema::FieldId;
//!
//! let mut builder = MetadataBuilder::new();
//! builder.set(MetaTarget::Field(FieldId(0)), keys::CLAMP_MIN, "0");
//! builder.set(MetaTarget::Field(FieldId(0)), keys::CLAMP_MAX, "100");
//! let registry = builder.freeze();
//!
//! assert_eq!(registry.clamp_range(FieldId(0)), (Some(0.0), Some(100.0)));
//! ```

use std::collections::{BTreeMap, HashMap};

use crate::schema::{EnumKey, FieldDescriptor, FieldId, FieldKind, ScalarKind, Schema, TypeKey};

/// Well-known metadata keys.
pub mod keys {
    pub const DISPLAY_NAME: &str = "DisplayName";
    pub const TOOL_TIP: &str = "ToolTip";
    pub const CATEGORY: &str = "Category";
    pub const CLAMP_MIN: &str = "ClampMin";
    pub const CLAMP_MAX: &str = "ClampMax";
    pub const UI_MIN: &str = "UIMin";
    pub const UI_MAX: &str = "UIMax";
    pub const EDIT_CONDITION: &str = "EditCondition";
    pub const EDIT_CONDITION_HIDES: &str = "EditConditionHides";
    pub const INLINE_EDIT_CONDITION_TOGGLE: &str = "InlineEditConditionToggle";
    pub const HIDE_EDIT_CONDITION_TOGGLE: &str = "HideEditConditionToggle";
    pub const HIDE_CATEGORIES: &str = "HideCategories";
    pub const EDIT_IN_RUNTIME: &str = "EditInRuntime";
    pub const CALL_IN_RUNTIME: &str = "CallInRuntime";
}

/// What a metadata entry is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaTarget {
    Field(FieldId),
    Type(TypeKey),
    EnumVariant(EnumKey, i64),
}

type Entries = HashMap<MetaTarget, BTreeMap<String, String>>;

// ---------------------------------------------------------------------------
// MetadataBuilder
// ---------------------------------------------------------------------------

/// Mutable metadata collection.
#[derive(Debug, Clone, Default)]
pub struct MetadataBuilder {
    entries: Entries,
}

impl MetadataBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, target: MetaTarget, key: &str, value: &str) {
        self.entries
            .entry(target)
            .or_default()
            .insert(key.to_owned(), value.to_owned());
    }

    pub fn remove(&mut self, target: MetaTarget, key: &str) -> Option<String> {
        self.entries.get_mut(&target)?.remove(key)
    }

    /// Copy every entry of `source` onto `dest`, overwriting keys `dest`
    /// already has.
    pub fn copy_metadata(&mut self, source: MetaTarget, dest: MetaTarget) {
        let Some(copied) = self.entries.get(&source).cloned() else {
            return;
        };
        self.entries.entry(dest).or_default().extend(copied);
    }

    /// Freeze into the immutable registry.
    pub fn freeze(self) -> MetadataRegistry {
        MetadataRegistry {
            entries: self.entries,
        }
    }
}

// ---------------------------------------------------------------------------
// MetadataRegistry
// ---------------------------------------------------------------------------

/// Immutable metadata lookup.
#[derive(Debug, Clone, Default)]
pub struct MetadataRegistry {
    entries: Entries,
}

impl MetadataRegistry {
    /// Registry with no entries.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, target: MetaTarget, key: &str) -> Option<&str> {
        self.entries.get(&target)?.get(key).map(String::as_str)
    }

    pub fn has(&self, target: MetaTarget, key: &str) -> bool {
        self.get(target, key).is_some()
    }

    pub fn field_meta(&self, field: FieldId, key: &str) -> Option<&str> {
        self.get(MetaTarget::Field(field), key)
    }

    pub fn has_field_meta(&self, field: FieldId, key: &str) -> bool {
        self.has(MetaTarget::Field(field), key)
    }

    pub fn type_meta(&self, ty: TypeKey, key: &str) -> Option<&str> {
        self.get(MetaTarget::Type(ty), key)
    }

    /// Explicit `DisplayName`, or the field name made human readable.
    pub fn display_name(&self, field: &FieldDescriptor) -> String {
        match self.field_meta(field.id, keys::DISPLAY_NAME) {
            Some(name) => name.to_owned(),
            None => name_to_display_string(
                &field.name,
                field.kind == FieldKind::Scalar(ScalarKind::Bool),
            ),
        }
    }

    /// Explicit `DisplayName` of a type, or its name made human readable.
    pub fn type_display_name(&self, schema: &Schema, ty: TypeKey) -> String {
        match self.type_meta(ty, keys::DISPLAY_NAME) {
            Some(name) => name.to_owned(),
            None => name_to_display_string(&schema.type_desc(ty).name, false),
        }
    }

    /// Display name of an enum variant, falling back to its declared name
    /// and then to the raw number.
    pub fn enum_display_name(&self, schema: &Schema, key: EnumKey, value: i64) -> String {
        if let Some(name) = self.get(MetaTarget::EnumVariant(key, value), keys::DISPLAY_NAME) {
            return name.to_owned();
        }
        match schema.try_enum(key).and_then(|e| e.name_of(value)) {
            Some(name) => name.to_owned(),
            None => value.to_string(),
        }
    }

    pub fn tooltip(&self, field: FieldId) -> Option<&str> {
        self.field_meta(field, keys::TOOL_TIP)
    }

    /// `|`-delimited category path of a field.
    pub fn category(&self, field: FieldId) -> Option<&str> {
        self.field_meta(field, keys::CATEGORY)
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    /// `(ClampMin, ClampMax)`; unparsable bounds read as absent.
    pub fn clamp_range(&self, field: FieldId) -> (Option<f64>, Option<f64>) {
        (
            self.numeric(field, keys::CLAMP_MIN),
            self.numeric(field, keys::CLAMP_MAX),
        )
    }

    /// `(UIMin, UIMax)`; unparsable bounds read as absent.
    pub fn ui_range(&self, field: FieldId) -> (Option<f64>, Option<f64>) {
        (
            self.numeric(field, keys::UI_MIN),
            self.numeric(field, keys::UI_MAX),
        )
    }

    /// Categories hidden by `ty` or any of its ancestors. Entries are
    /// separated by spaces or commas.
    pub fn hidden_categories(&self, schema: &Schema, ty: TypeKey) -> Vec<String> {
        let mut hidden = Vec::new();
        let mut current = Some(ty);
        while let Some(key) = current {
            if let Some(list) = self.type_meta(key, keys::HIDE_CATEGORIES) {
                hidden.extend(
                    list.split([' ', ','])
                        .filter(|s| !s.is_empty())
                        .map(str::to_owned),
                );
            }
            current = schema.try_type(key).and_then(|d| d.parent);
        }
        hidden
    }

    fn numeric(&self, field: FieldId, key: &str) -> Option<f64> {
        self.field_meta(field, key)?.trim().parse().ok()
    }
}

// ---------------------------------------------------------------------------
// Display names
// ---------------------------------------------------------------------------

/// Turn an identifier into a human-readable label.
///
/// Words are split on case changes, digits, and underscores, and each word
/// is capitalized. Boolean fields drop a leading `b` prefix
/// (`bIsActive` becomes `Is Active`).
pub fn name_to_display_string(name: &str, is_bool: bool) -> String {
    let mut chars: Vec<char> = name.chars().collect();
    if is_bool && chars.len() > 1 && chars[0] == 'b' && chars[1].is_uppercase() {
        chars.remove(0);
    }

    let mut out = String::with_capacity(chars.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c == '_' {
            if !out.is_empty() && !out.ends_with(' ') {
                out.push(' ');
            }
            continue;
        }
        if i > 0 && !out.ends_with(' ') {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let word_start = (c.is_uppercase()
                && (prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_lower)))
                || (c.is_ascii_digit() && prev.is_alphabetic());
            if word_start {
                out.push(' ');
            }
        }
        if out.is_empty() || out.ends_with(' ') {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
