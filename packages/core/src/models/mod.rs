//! Data Models
//!
//! Generic node shape, forest identity, structural change descriptions and
//! audit results. Nothing here performs I/O.

pub mod plan;
pub mod tree_node;
pub mod violation;

pub use plan::{
    BoundsUpdate, DeleteMode, ImportedNode, InsertSpec, MoveSpec, NodeScan, OrderingShift,
    Placement, RangeShift, ShiftSpec,
};
pub use tree_node::{ForestId, NodeBounds, TreeNode};
pub use violation::{Violation, ViolationKind};
