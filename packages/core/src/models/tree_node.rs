//! Tree Node Data Structures
//!
//! This module defines the generic `TreeNode` row shared by every hierarchical
//! entity kind, plus the `ForestId` that names the table a forest lives in.
//!
//! # Nested-Set Encoding
//!
//! Every node carries four positional fields next to its parent pointer:
//!
//! - `left` / `right`: interval bounds; a descendant's interval is strictly
//!   inside its ancestor's interval
//! - `depth`: distance from the nearest root (roots have depth 0)
//! - `ordering`: display order among siblings (dense, 0-based)
//!
//! Entity-specific data travels opaquely in `payload`.
//!
//! # Examples
//!
//! ```rust
//! use hierarchy_core::models::{NodeBounds, TreeNode};
//! use serde_json::json;
//!
//! let root = TreeNode::new("root".to_string(), None, json!({"name": "Acme"}))
//!     .with_bounds(NodeBounds::new(1, 4, 0), 0);
//! let child = TreeNode::new("child".to_string(), Some("root".to_string()), json!({}))
//!     .with_bounds(NodeBounds::new(2, 3, 1), 0);
//!
//! assert!(root.bounds().contains(&child.bounds()));
//! assert_eq!(root.bounds().subtree_size(), 2);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Longest table name accepted for a forest
const MAX_FOREST_ID_LEN: usize = 63;

/// One row of a forest: identity, parent pointer, positional fields and payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    /// Unique identifier within the forest (UUID unless supplied by the caller)
    pub id: String,

    /// Direct parent; `None` for roots
    pub parent_id: Option<String>,

    /// Nested-set left bound
    pub left: i64,

    /// Nested-set right bound
    pub right: i64,

    /// Distance from the nearest root
    pub depth: i64,

    /// Position among siblings of the same parent
    pub ordering: i64,

    /// Entity-specific fields, carried opaquely
    pub payload: serde_json::Value,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last modification timestamp
    pub modified_at: DateTime<Utc>,
}

impl TreeNode {
    /// Create a node with zeroed positional fields.
    ///
    /// Positions are assigned by the mutator (or by a rebuild); a freshly
    /// constructed node is not yet placed anywhere.
    pub fn new(id: String, parent_id: Option<String>, payload: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id,
            parent_id,
            left: 0,
            right: 0,
            depth: 0,
            ordering: 0,
            payload,
            created_at: now,
            modified_at: now,
        }
    }

    /// Generate a fresh node id
    pub fn generate_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Builder-style setter for positional fields
    pub fn with_bounds(mut self, bounds: NodeBounds, ordering: i64) -> Self {
        self.left = bounds.left;
        self.right = bounds.right;
        self.depth = bounds.depth;
        self.ordering = ordering;
        self
    }

    /// Positional view of this node
    pub fn bounds(&self) -> NodeBounds {
        NodeBounds {
            left: self.left,
            right: self.right,
            depth: self.depth,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// The `(left, right, depth)` triple of a node.
///
/// All containment questions (is B inside A's subtree?) are O(1) comparisons
/// on these bounds; no traversal is ever needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeBounds {
    pub left: i64,
    pub right: i64,
    pub depth: i64,
}

impl NodeBounds {
    pub fn new(left: i64, right: i64, depth: i64) -> Self {
        Self { left, right, depth }
    }

    /// Number of positions the subtree occupies (`right - left + 1`)
    pub fn width(&self) -> i64 {
        self.right - self.left + 1
    }

    /// Number of nodes in the subtree, self included
    pub fn subtree_size(&self) -> i64 {
        self.width() / 2
    }

    /// True when `other` lies strictly inside this range
    pub fn contains(&self, other: &NodeBounds) -> bool {
        self.left < other.left && other.right < self.right
    }

    /// True when `other` is this node or lies inside its subtree
    pub fn covers(&self, other: &NodeBounds) -> bool {
        self.left <= other.left && other.right <= self.right
    }

    pub fn is_leaf(&self) -> bool {
        self.right == self.left + 1
    }
}

/// Identity of a forest: the table holding one entity kind's trees.
///
/// Restricted to `[A-Za-z_][A-Za-z0-9_]*` because SQL backends use it verbatim
/// as a table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ForestId(String);

impl ForestId {
    /// Validate and wrap a forest name
    ///
    /// Returns `None` when the name is empty, too long, or contains anything
    /// other than ASCII letters, digits and underscores (or starts with a digit).
    pub fn new(name: impl Into<String>) -> Option<Self> {
        let name = name.into();
        let mut chars = name.chars();
        let first_ok = chars
            .next()
            .map(|c| c.is_ascii_alphabetic() || c == '_')
            .unwrap_or(false);
        let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

        if first_ok && rest_ok && name.len() <= MAX_FOREST_ID_LEN {
            Some(Self(name))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ForestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bounds_containment() {
        let outer = NodeBounds::new(1, 10, 0);
        let inner = NodeBounds::new(2, 5, 1);
        let sibling = NodeBounds::new(6, 9, 1);

        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
        assert!(!inner.contains(&sibling));
        assert!(!outer.contains(&outer));
        assert!(outer.covers(&outer));
    }

    #[test]
    fn test_bounds_width_and_size() {
        let bounds = NodeBounds::new(3, 8, 1);
        assert_eq!(bounds.width(), 6);
        assert_eq!(bounds.subtree_size(), 3);
        assert!(!bounds.is_leaf());
        assert!(NodeBounds::new(4, 5, 2).is_leaf());
    }

    #[test]
    fn test_forest_id_validation() {
        assert!(ForestId::new("organizations").is_some());
        assert!(ForestId::new("_media_v2").is_some());
        assert!(ForestId::new("").is_none());
        assert!(ForestId::new("2fast").is_none());
        assert!(ForestId::new("menus; DROP TABLE users").is_none());
        assert!(ForestId::new("a".repeat(64)).is_none());
    }

    #[test]
    fn test_new_node_is_unplaced() {
        let node = TreeNode::new("n1".to_string(), None, json!({"title": "x"}));
        assert_eq!(node.left, 0);
        assert_eq!(node.right, 0);
        assert!(node.is_root());
    }

    #[test]
    fn test_node_serializes_camel_case() {
        let node = TreeNode::new("n1".to_string(), Some("p".to_string()), json!({}));
        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(value.get("parentId").unwrap(), "p");
        assert!(value.get("createdAt").is_some());
    }
}
