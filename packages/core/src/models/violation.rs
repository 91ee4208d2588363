//! Invariant violations reported by the auditor

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which forest invariant a node breaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ViolationKind {
    /// `left >= right`
    InvalidBounds,
    /// Range partially overlaps a neighbour instead of nesting or being disjoint
    PartialOverlap,
    /// `parent_id` disagrees with the nearest enclosing range
    ParentMismatch,
    /// `depth` is not the parent's depth plus one (or 0 for a root)
    DepthMismatch,
    /// Sibling ordering is duplicated or disagrees with left-bound order
    OrderingConflict,
    /// `right - left` disagrees with the number of nodes in the subtree
    WidthMismatch,
    /// Row cannot be reached from any root through `parent_id`
    Unreachable,
}

impl ViolationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::InvalidBounds => "invalid-bounds",
            ViolationKind::PartialOverlap => "partial-overlap",
            ViolationKind::ParentMismatch => "parent-mismatch",
            ViolationKind::DepthMismatch => "depth-mismatch",
            ViolationKind::OrderingConflict => "ordering-conflict",
            ViolationKind::WidthMismatch => "width-mismatch",
            ViolationKind::Unreachable => "unreachable",
        }
    }
}

/// One node that breaks one invariant, with a human-readable explanation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub node_id: String,
    pub kind: ViolationKind,
    pub detail: String,
}

impl Violation {
    pub fn new(node_id: impl Into<String>, kind: ViolationKind, detail: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            kind,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] node '{}': {}", self.kind.as_str(), self.node_id, self.detail)
    }
}
