//! Value restrictions attached to nodes.
//!
//! A restriction hides or disables specific values of a field (typically
//! enum variants) in value pickers, with a human-readable reason. Element
//! nodes of a container see the restrictions of the container too.

use std::collections::HashSet;
use std::rc::Rc;

use crate::node::NodeId;
use crate::tree::PropertyTree;

/// A set of hidden and disabled values sharing one reason.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyRestriction {
    reason: String,
    hidden: HashSet<String>,
    disabled: HashSet<String>,
}

impl PropertyRestriction {
    pub fn new(reason: &str) -> Self {
        Self {
            reason: reason.to_owned(),
            ..Self::default()
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn add_hidden_value(&mut self, value: &str) {
        self.hidden.insert(value.to_owned());
    }

    pub fn add_disabled_value(&mut self, value: &str) {
        self.disabled.insert(value.to_owned());
    }

    pub fn remove_hidden_value(&mut self, value: &str) {
        self.hidden.remove(value);
    }

    pub fn remove_disabled_value(&mut self, value: &str) {
        self.disabled.remove(value);
    }

    pub fn is_value_hidden(&self, value: &str) -> bool {
        self.hidden.contains(value)
    }

    pub fn is_value_disabled(&self, value: &str) -> bool {
        self.disabled.contains(value)
    }
}

impl PropertyTree {
    /// Attach a restriction to a node. Returns `false` for stale nodes.
    pub fn add_restriction(&mut self, node: NodeId, restriction: Rc<PropertyRestriction>) -> bool {
        match self.arena.get_mut(node) {
            Some(n) => {
                n.restrictions.push(restriction);
                true
            }
            None => false,
        }
    }

    /// Restrictions that apply to a node: its own, then those of the
    /// containers it is an element of.
    pub fn restrictions(&self, node: NodeId) -> Vec<Rc<PropertyRestriction>> {
        let mut out = Vec::new();
        let mut current = Some(node);
        while let Some(id) = current {
            let Some(n) = self.arena.get(id) else {
                break;
            };
            out.extend(n.restrictions.iter().cloned());
            current = if n.array_index.is_some() { n.parent } else { None };
        }
        out
    }

    /// Reasons `value` is hidden on `node`.
    pub fn hidden_reasons(&self, node: NodeId, value: &str) -> Vec<String> {
        self.restrictions(node)
            .iter()
            .filter(|r| r.is_value_hidden(value))
            .map(|r| r.reason().to_owned())
            .collect()
    }

    /// Reasons `value` is disabled on `node`.
    pub fn disabled_reasons(&self, node: NodeId, value: &str) -> Vec<String> {
        self.restrictions(node)
            .iter()
            .filter(|r| r.is_value_disabled(value))
            .map(|r| r.reason().to_owned())
            .collect()
    }

    pub fn is_value_hidden(&self, node: NodeId, value: &str) -> bool {
        !self.hidden_reasons(node, value).is_empty()
    }

    pub fn is_value_disabled(&self, node: NodeId, value: &str) -> bool {
        !self.disabled_reasons(node, value).is_empty()
    }

    /// Hidden or disabled. Reasons for both are returned, hidden first.
    pub fn restriction_reasons(&self, node: NodeId, value: &str) -> Vec<String> {
        let mut reasons = self.hidden_reasons(node, value);
        reasons.extend(self.disabled_reasons(node, value));
        reasons
    }

    pub fn is_value_restricted(&self, node: NodeId, value: &str) -> bool {
        self.is_value_hidden(node, value) || self.is_value_disabled(node, value)
    }

    /// First reason, followed by a count when several restrictions apply.
    pub fn restriction_tooltip(&self, node: NodeId, value: &str) -> Option<String> {
        let reasons = self.restriction_reasons(node, value);
        let first = reasons.first()?;
        Some(match reasons.len() {
            1 => first.clone(),
            n => format!("{first}({n} restrictions...)"),
        })
    }
}
