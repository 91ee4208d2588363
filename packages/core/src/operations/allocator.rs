//! Position Allocator
//!
//! Pure arithmetic for nested-set structural changes. Given the bounds of the
//! rows involved, each `plan_*` function returns the exact set of ranged
//! updates the mutator must apply; nothing here reads or writes storage.
//!
//! # Move Strategy
//!
//! A move is a composition of three ranged updates, applied in order:
//!
//! 1. `open`: make room at the insertion point (`width` positions)
//! 2. `translate`: shift the moved block (now contiguous by `left`) into the
//!    gap, adjusting depth by a constant delta
//! 3. `close`: collapse the block's old location
//!
//! The block is identified by `left` alone at every step, so no temporary
//! marking of rows is needed.
//!
//! # Examples
//!
//! ```rust
//! use hierarchy_core::models::NodeBounds;
//! use hierarchy_core::operations::{PositionAllocator, SiblingSlot};
//!
//! // Empty forest: first root lands at (1, 2) without shifting anything
//! let plan = PositionAllocator::plan_insert(
//!     None,
//!     None,
//!     SiblingSlot::Last { child_count: 0, forest_end: 0 },
//!     PositionAllocator::NODE_WIDTH,
//! );
//! assert_eq!((plan.bounds.left, plan.bounds.right), (1, 2));
//! assert!(plan.shift.is_none());
//! ```

use crate::models::{NodeBounds, OrderingShift, RangeShift, ShiftSpec, TreeNode};

/// Where, among the target parent's children, a new block goes.
///
/// Built by the mutator from the rows it read; all values are in the
/// coordinates observed before the change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiblingSlot {
    /// Before every sibling
    First,
    /// After every sibling; `child_count` excludes the node being moved,
    /// `forest_end` is the largest `right` in the forest (0 when empty)
    Last { child_count: i64, forest_end: i64 },
    /// Directly after an existing sibling
    After { bounds: NodeBounds, ordering: i64 },
}

/// Writes needed to place a new block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertPlan {
    /// Bounds of the inserted block's top node
    pub bounds: NodeBounds,
    pub ordering: i64,
    /// `None` when the block is appended past the end of the forest
    pub shift: Option<ShiftSpec>,
    /// `None` when no later sibling needs renumbering
    pub ordering_shift: Option<OrderingShift>,
}

/// Writes needed to remove a node (and maybe its subtree)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovePlan {
    /// Inclusive `left` range of rows to delete
    pub delete_from: i64,
    pub delete_to: i64,
    /// Descendants pulled one level up (reparent mode only)
    pub lift: Option<RangeShift>,
    pub close: ShiftSpec,
    /// `(child_id, ordering)` for each former child whose ordering changes
    /// when it takes over the node's slot (reparent mode)
    pub child_orderings: Vec<(String, i64)>,
    /// Later siblings renumbered to close (or widen) the node's slot
    pub sibling_ordering: Option<OrderingShift>,
}

/// Writes needed to relocate a subtree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MovePlan {
    /// Target slot equals the current slot; nothing to write
    NoOp,
    Relocate(RelocatePlan),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelocatePlan {
    pub open: ShiftSpec,
    pub translate: RangeShift,
    pub close: ShiftSpec,
    pub depth_delta: i64,
    /// Closes the hole in the old sibling group
    pub remove_ordering: Option<OrderingShift>,
    /// Opens the slot in the new sibling group
    pub insert_ordering: Option<OrderingShift>,
    pub new_ordering: i64,
    /// Final bounds of the moved node
    pub bounds: NodeBounds,
}

/// Writes needed to exchange two sibling subtrees
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapPlan {
    pub translates: Vec<RangeShift>,
    /// `(node_id, new_ordering)` for both nodes
    pub orderings: [(String, i64); 2],
}

/// Stateless planner for nested-set changes
pub struct PositionAllocator;

impl PositionAllocator {
    /// Positions a single node occupies
    pub const NODE_WIDTH: i64 = 2;

    /// Plan placement of a block of `width` positions.
    ///
    /// `parent_id`/`parent` describe the target parent (`None` for a root).
    pub fn plan_insert(
        parent_id: Option<&str>,
        parent: Option<NodeBounds>,
        slot: SiblingSlot,
        width: i64,
    ) -> InsertPlan {
        let depth = parent.map(|p| p.depth + 1).unwrap_or(0);
        let (at, ordering) = Self::slot_position(parent, slot);

        let shift = match (parent, slot) {
            (None, SiblingSlot::Last { forest_end, .. }) if at > forest_end => None,
            _ => Some(ShiftSpec::open(at, width)),
        };

        let ordering_shift = match slot {
            SiblingSlot::Last { .. } => None,
            _ => Some(OrderingShift {
                parent_id: parent_id.map(str::to_string),
                from: ordering,
                delta: 1,
                exclude_id: None,
            }),
        };

        InsertPlan {
            bounds: NodeBounds::new(at, at + width - 1, depth),
            ordering,
            shift,
            ordering_shift,
        }
    }

    /// Plan removal of `node`.
    ///
    /// With `cascade`, the whole subtree goes and `children` is ignored.
    /// Otherwise only the node goes and its direct `children` take over its
    /// slot in `left` order, numbered densely from the node's own ordering
    /// whatever their previous orderings were.
    pub fn plan_remove(node: &TreeNode, children: &[TreeNode], cascade: bool) -> RemovePlan {
        let bounds = node.bounds();
        let parent_id = node.parent_id.clone();

        if cascade {
            return RemovePlan {
                delete_from: bounds.left,
                delete_to: bounds.right,
                lift: None,
                close: ShiftSpec::close(bounds.left, bounds.right),
                child_orderings: Vec::new(),
                sibling_ordering: Some(OrderingShift {
                    parent_id,
                    from: node.ordering + 1,
                    delta: -1,
                    exclude_id: None,
                }),
            };
        }

        let lift = (!bounds.is_leaf()).then(|| RangeShift {
            from_left: bounds.left + 1,
            to_left: bounds.right - 1,
            delta: -1,
            depth_delta: -1,
        });

        let mut ranked: Vec<&TreeNode> = children.iter().collect();
        ranked.sort_by(|a, b| (a.left, &a.id).cmp(&(b.left, &b.id)));
        let child_orderings = ranked
            .into_iter()
            .zip(node.ordering..)
            .filter(|(child, ordering)| child.ordering != *ordering)
            .map(|(child, ordering)| (child.id.clone(), ordering))
            .collect();

        let sibling_delta = children.len() as i64 - 1;
        let sibling_ordering = (sibling_delta != 0).then(|| OrderingShift {
            parent_id,
            from: node.ordering + 1,
            delta: sibling_delta,
            exclude_id: Some(node.id.clone()),
        });

        RemovePlan {
            delete_from: bounds.left,
            delete_to: bounds.left,
            lift,
            // after the lift the two freed positions are right-1 and right
            close: ShiftSpec::close(bounds.right - 1, bounds.right),
            child_orderings,
            sibling_ordering,
        }
    }

    /// Plan relocation of `node`'s subtree under `new_parent` at `slot`.
    ///
    /// The caller must already have rejected cyclic targets.
    pub fn plan_move(
        node: &TreeNode,
        new_parent: Option<&TreeNode>,
        slot: SiblingSlot,
    ) -> MovePlan {
        let bounds = node.bounds();
        let parent_bounds = new_parent.map(TreeNode::bounds);
        let (at, slot_ordering) = Self::slot_position(parent_bounds, slot);

        if at == bounds.left || at == bounds.right + 1 {
            return MovePlan::NoOp;
        }

        let width = bounds.width();
        let new_depth = parent_bounds.map(|p| p.depth + 1).unwrap_or(0);
        let depth_delta = new_depth - bounds.depth;

        let (left, right) = if at <= bounds.left {
            (bounds.left + width, bounds.right + width)
        } else {
            (bounds.left, bounds.right)
        };

        let new_parent_id = new_parent.map(|p| p.id.clone());
        let same_parent = new_parent_id == node.parent_id;

        // Orderings are computed as if the node had already left its old group.
        let new_ordering = match slot {
            SiblingSlot::After { ordering, .. } if same_parent && ordering > node.ordering => {
                slot_ordering - 1
            }
            _ => slot_ordering,
        };

        let final_left = if at > bounds.right { at - width } else { at };

        let insert_ordering = match slot {
            SiblingSlot::Last { .. } => None,
            _ => Some(OrderingShift {
                parent_id: new_parent_id,
                from: new_ordering,
                delta: 1,
                exclude_id: Some(node.id.clone()),
            }),
        };

        MovePlan::Relocate(RelocatePlan {
            open: ShiftSpec::open(at, width),
            translate: RangeShift {
                from_left: left,
                to_left: right,
                delta: at - left,
                depth_delta,
            },
            close: ShiftSpec::close(left, right),
            depth_delta,
            remove_ordering: Some(OrderingShift {
                parent_id: node.parent_id.clone(),
                from: node.ordering + 1,
                delta: -1,
                exclude_id: Some(node.id.clone()),
            }),
            insert_ordering,
            new_ordering,
            bounds: NodeBounds::new(final_left, final_left + width - 1, new_depth),
        })
    }

    /// Plan the exchange of two sibling subtrees (ranges and orderings).
    ///
    /// Both blocks are parked in negative position space while the rows
    /// between them shift, so each step selects its rows by `left` alone.
    /// `forest_end` must be at least the largest `right` in the forest.
    pub fn plan_swap(a: &TreeNode, b: &TreeNode, forest_end: i64) -> SwapPlan {
        let (x, y) = if a.left < b.left { (a, b) } else { (b, a) };
        let park = forest_end + 1;
        let xw = x.bounds().width();
        let yw = y.bounds().width();

        let mut translates = vec![
            RangeShift {
                from_left: x.left,
                to_left: x.right,
                delta: -park,
                depth_delta: 0,
            },
            RangeShift {
                from_left: y.left,
                to_left: y.right,
                delta: -2 * park,
                depth_delta: 0,
            },
        ];

        if y.left > x.right + 1 && xw != yw {
            translates.push(RangeShift {
                from_left: x.right + 1,
                to_left: y.left - 1,
                delta: yw - xw,
                depth_delta: 0,
            });
        }

        translates.push(RangeShift {
            from_left: x.left - park,
            to_left: x.right - park,
            delta: park + (y.right - xw + 1 - x.left),
            depth_delta: 0,
        });
        translates.push(RangeShift {
            from_left: y.left - 2 * park,
            to_left: y.right - 2 * park,
            delta: 2 * park + (x.left - y.left),
            depth_delta: 0,
        });

        SwapPlan {
            translates,
            orderings: [(a.id.clone(), b.ordering), (b.id.clone(), a.ordering)],
        }
    }

    /// Insertion point and raw sibling ordering for a slot
    fn slot_position(parent: Option<NodeBounds>, slot: SiblingSlot) -> (i64, i64) {
        match slot {
            SiblingSlot::First => (parent.map(|p| p.left + 1).unwrap_or(1), 0),
            SiblingSlot::Last {
                child_count,
                forest_end,
            } => (
                parent.map(|p| p.right).unwrap_or(forest_end + 1),
                child_count,
            ),
            SiblingSlot::After { bounds, ordering } => (bounds.right + 1, ordering + 1),
        }
    }
}
