//! Structural change descriptions
//!
//! Two families of types live here:
//!
//! - **Write plans** (`ShiftSpec`, `RangeShift`, `OrderingShift`, `BoundsUpdate`)
//!   produced by the position allocator and applied verbatim by a
//!   `NodeTransaction` as ranged updates.
//! - **Requests** (`Placement`, `MoveSpec`, `InsertSpec`, `DeleteMode`,
//!   `ImportedNode`) that callers hand to the mutator and auditor.
//!
//! `NodeScan` describes the read side: every query shape the reader needs is a
//! single range or comparison scan with a fixed order.

use serde::{Deserialize, Serialize};

/// Open or close a gap in the position space.
///
/// Applied as two ranged updates over the whole forest:
/// `left += delta WHERE left >= from` and `right += delta WHERE right >= from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftSpec {
    pub from: i64,
    pub delta: i64,
}

impl ShiftSpec {
    /// Gap of `width` positions opened at `at`
    pub fn open(at: i64, width: i64) -> Self {
        Self {
            from: at,
            delta: width,
        }
    }

    /// Close the gap left behind by the range `[left, right]`
    pub fn close(left: i64, right: i64) -> Self {
        Self {
            from: right + 1,
            delta: -(right - left + 1),
        }
    }
}

/// Translate a contiguous block of rows.
///
/// Every row with `from_left <= left <= to_left` gets `left += delta`,
/// `right += delta` and `depth += depth_delta`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeShift {
    pub from_left: i64,
    pub to_left: i64,
    pub delta: i64,
    pub depth_delta: i64,
}

/// Renumber part of one sibling group.
///
/// Rows with `parent_id IS parent_id AND ordering >= from` (minus `exclude_id`)
/// get `ordering += delta`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderingShift {
    pub parent_id: Option<String>,
    pub from: i64,
    pub delta: i64,
    pub exclude_id: Option<String>,
}

/// Absolute positional overwrite of one row (used by rebuild)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundsUpdate {
    pub id: String,
    pub left: i64,
    pub right: i64,
    pub depth: i64,
    pub ordering: i64,
}

/// Read shapes supported by every node store.
///
/// Each variant maps to one indexed scan; the result order is part of the
/// contract. Variants keyed by a node id resolve that node in the same read
/// as the rows they return, include the node itself, and come back empty when
/// it does not exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeScan {
    /// Whole forest ordered by `left` (pre-order)
    All,
    /// Rows with `parent_id IS parent`, ordered by `ordering`
    Children(Option<String>),
    /// Rows with `left` in `[left, right]`, ordered by `left`
    Subtree { left: i64, right: i64 },
    /// The node and its direct children, ordered by `ordering`
    Family(String),
    /// Every row sharing the node's parent (the node included), ordered by
    /// `ordering`
    SiblingGroup(String),
    /// The node and all of its descendants, ordered by `left`
    SubtreeOf(String),
    /// The node's ancestors followed by the node, ordered by `left`
    PathTo(String),
}

/// Where a node lands among its new siblings
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "siblingId", rename_all = "camelCase")]
pub enum Placement {
    /// Before every existing sibling
    First,
    /// After every existing sibling
    #[default]
    Last,
    /// Directly after the given sibling
    After(String),
}

impl Placement {
    /// `None` appends, `Some(id)` places directly after `id`
    pub fn after(sibling_id: Option<&str>) -> Self {
        match sibling_id {
            Some(id) => Placement::After(id.to_string()),
            None => Placement::Last,
        }
    }

    pub fn anchor(&self) -> Option<&str> {
        match self {
            Placement::After(id) => Some(id.as_str()),
            _ => None,
        }
    }
}

/// One relocation inside a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveSpec {
    pub node_id: String,
    pub new_parent_id: Option<String>,
    #[serde(default)]
    pub placement: Placement,
}

impl MoveSpec {
    pub fn new(node_id: &str, new_parent_id: Option<&str>, after_sibling_id: Option<&str>) -> Self {
        Self {
            node_id: node_id.to_string(),
            new_parent_id: new_parent_id.map(str::to_string),
            placement: Placement::after(after_sibling_id),
        }
    }
}

/// One insertion inside a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertSpec {
    /// Caller-supplied id; generated when absent
    #[serde(default)]
    pub id: Option<String>,
    pub parent_id: Option<String>,
    #[serde(default)]
    pub placement: Placement,
    pub payload: serde_json::Value,
}

impl InsertSpec {
    pub fn new(
        parent_id: Option<&str>,
        after_sibling_id: Option<&str>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: None,
            parent_id: parent_id.map(str::to_string),
            placement: Placement::after(after_sibling_id),
            payload,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// What happens to a deleted node's descendants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeleteMode {
    /// Remove the whole subtree
    Cascade,
    /// Remove only the node; its children take its place under its parent
    ReparentChildren,
}

/// Parent-pointer row used to seed a forest that has no positional data yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedNode {
    pub id: String,
    pub parent_id: Option<String>,
    /// Sibling tiebreak; rows with equal ordering fall back to id order
    #[serde(default)]
    pub ordering: i64,
    #[serde(default)]
    pub payload: serde_json::Value,
}
