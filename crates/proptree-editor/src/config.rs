//! Tree construction options.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::node::NodeFlags;

/// Options applied when a [`PropertyTree`](crate::tree::PropertyTree) is
/// built. Unknown keys in JSON are rejected; missing keys take defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TreeConfig {
    /// Group instance fields under category nodes.
    pub show_categories: bool,
    /// Show every field regardless of its edit flags.
    pub show_hidden: bool,
    /// Show fields that are disabled on non-template instances.
    pub show_disable_edit_on_instance: bool,
    /// Only show fields marked for runtime editing.
    pub game_mode_only: bool,
    /// Treat every node as edit-const.
    pub read_only: bool,
    /// A newly added container element is expanded automatically when it
    /// has at least one and fewer than this many children.
    pub auto_expand_child_limit: usize,
    /// Nesting depth at which edit-inline references stop expanding.
    pub max_edit_inline_depth: usize,
}

impl Default for TreeConfig {
    /// Categories on, nothing hidden shown, editable.
    fn default() -> Self {
        Self {
            show_categories: true,
            show_hidden: false,
            show_disable_edit_on_instance: false,
            game_mode_only: false,
            read_only: false,
            auto_expand_child_limit: 10,
            max_edit_inline_depth: 16,
        }
    }
}

impl TreeConfig {
    /// Parse a config from JSON text.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Load a config file.
    pub fn from_file(path: &Path) -> Result<Self, anyhow::Error> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read tree config {}", path.display()))?;
        Self::from_json(&text)
            .with_context(|| format!("failed to parse tree config {}", path.display()))
    }

    /// Flags carried by the root node.
    pub(crate) fn root_flags(&self) -> NodeFlags {
        let mut flags = NodeFlags::EXPANDED | NodeFlags::CAN_BE_EXPANDED;
        flags.set(NodeFlags::SHOW_CATEGORIES, self.show_categories);
        flags.set(NodeFlags::SHOW_HIDDEN, self.show_hidden);
        flags.set(
            NodeFlags::SHOW_DISABLE_EDIT_ON_INSTANCE,
            self.show_disable_edit_on_instance,
        );
        flags.set(NodeFlags::GAME_MODE_ONLY, self.game_mode_only);
        flags.set(NodeFlags::READ_ONLY, self.read_only);
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_take_defaults() {
        let config = TreeConfig::from_json(r#"{ "read_only": true }"#).unwrap();
        assert!(config.read_only);
        assert!(config.show_categories);
        assert_eq!(config.auto_expand_child_limit, 10);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(TreeConfig::from_json(r#"{ "colour": "red" }"#).is_err());
    }

    #[test]
    fn root_flags_follow_options() {
        let config = TreeConfig {
            show_hidden: true,
            show_categories: false,
            ..TreeConfig::default()
        };
        let flags = config.root_flags();
        assert!(flags.contains(NodeFlags::SHOW_HIDDEN | NodeFlags::EXPANDED));
        assert!(!flags.contains(NodeFlags::SHOW_CATEGORIES));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = TreeConfig::from_file(Path::new("/nonexistent/tree.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/tree.json"));
    }
}
