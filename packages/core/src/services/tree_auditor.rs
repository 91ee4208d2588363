//! Tree Auditor
//!
//! Whole-forest checks and repair.
//!
//! - `validate` walks every row once in `left` order with a stack of open
//!   ranges and reports each node that breaks an invariant. It never writes.
//! - `rebuild` throws the positional fields away and recomputes them from the
//!   `parent_id` graph alone (children visited by `ordering`, then `left`,
//!   then id). Only rows whose fields actually change are written.
//! - `seed` loads parent-pointer rows into an empty forest and rebuilds them
//!   in the same transaction.
//!
//! Corruption is reported, never repaired implicitly; repair is always an
//! explicit `rebuild` call.

use crate::config::TreeConfig;
use crate::db::{NodeStore, NodeTransaction, TreeEvent};
use crate::models::{
    BoundsUpdate, ForestId, ImportedNode, NodeScan, TreeNode, Violation, ViolationKind,
};
use crate::operations::{CancelSignal, TreeError, TreeResult};
use crate::services::{begin_error, cancellable, finish, StorageResultExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::Instant;

/// An open range on the walker's stack
#[derive(Debug)]
struct Frame {
    id: String,
    left: i64,
    right: i64,
    depth: i64,
    /// Nodes seen inside this range, itself included
    size: i64,
    last_child_ordering: Option<i64>,
}

/// Incremental invariant checker over rows fed in `left` order.
///
/// Each node is reported at most once, for the first invariant it breaks.
/// A node whose range crosses a neighbour's is reported and dropped from the
/// walk so the remaining rows are still checked against a sane stack.
#[derive(Debug, Default)]
pub struct ViolationWalker {
    stack: Vec<Frame>,
    last_root_ordering: Option<i64>,
    flagged: HashSet<String>,
    violations: Vec<Violation>,
}

impl ViolationWalker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next row. Rows must arrive sorted by `left`.
    pub fn push(&mut self, node: &TreeNode) {
        if node.left >= node.right {
            self.flag(
                &node.id,
                ViolationKind::InvalidBounds,
                format!("left {} is not below right {}", node.left, node.right),
            );
            return;
        }

        self.close_before(node.left);

        // Resolve ranges that start before this node but end inside it
        loop {
            let (top_id, top_left, top_right) = match self.stack.last() {
                Some(top) => (top.id.clone(), top.left, top.right),
                None => break,
            };
            if top_left < node.left && node.right < top_right {
                break;
            }

            if node.parent_id.as_deref() == Some(top_id.as_str()) {
                self.flag(
                    &node.id,
                    ViolationKind::PartialOverlap,
                    format!(
                        "range [{}, {}] runs past the end of its parent '{}' [{}, {}]",
                        node.left, node.right, top_id, top_left, top_right
                    ),
                );
                return;
            }

            self.flag(
                &top_id,
                ViolationKind::PartialOverlap,
                format!(
                    "range [{}, {}] partially overlaps '{}' [{}, {}]",
                    top_left, top_right, node.id, node.left, node.right
                ),
            );
            if let Some(crossed) = self.stack.pop() {
                if let Some(parent) = self.stack.last_mut() {
                    parent.size += crossed.size;
                }
            }
        }

        let (expected_parent, expected_depth) = match self.stack.last() {
            Some(top) => (Some(top.id.clone()), top.depth + 1),
            None => (None, 0),
        };

        if node.parent_id != expected_parent {
            self.flag(
                &node.id,
                ViolationKind::ParentMismatch,
                format!(
                    "parent_id is {} but the nearest enclosing range is {}",
                    describe_parent(node.parent_id.as_deref()),
                    describe_parent(expected_parent.as_deref())
                ),
            );
        } else if node.depth != expected_depth {
            self.flag(
                &node.id,
                ViolationKind::DepthMismatch,
                format!("depth is {} but should be {}", node.depth, expected_depth),
            );
        }

        let last_ordering = match self.stack.last_mut() {
            Some(top) => &mut top.last_child_ordering,
            None => &mut self.last_root_ordering,
        };
        let previous = last_ordering.replace(node.ordering);
        if node.ordering < 0 || previous.is_some_and(|prev| node.ordering <= prev) {
            let detail = match previous {
                Some(prev) => format!(
                    "ordering {} does not follow the previous sibling's {}",
                    node.ordering, prev
                ),
                None => format!("ordering {} is negative", node.ordering),
            };
            self.flag(&node.id, ViolationKind::OrderingConflict, detail);
        }

        self.stack.push(Frame {
            id: node.id.clone(),
            left: node.left,
            right: node.right,
            depth: node.depth,
            size: 1,
            last_child_ordering: None,
        });
    }

    /// Close every open range and return what was found
    pub fn finish(mut self) -> Vec<Violation> {
        while let Some(frame) = self.stack.pop() {
            self.close_frame(frame);
        }
        self.violations
    }

    fn close_before(&mut self, left: i64) {
        while self.stack.last().is_some_and(|top| top.right < left) {
            if let Some(frame) = self.stack.pop() {
                self.close_frame(frame);
            }
        }
    }

    fn close_frame(&mut self, frame: Frame) {
        let width = frame.right - frame.left + 1;
        if width != 2 * frame.size {
            self.flag(
                &frame.id,
                ViolationKind::WidthMismatch,
                format!(
                    "range [{}, {}] spans {} positions but its subtree holds {} node(s)",
                    frame.left, frame.right, width, frame.size
                ),
            );
        }
        if let Some(parent) = self.stack.last_mut() {
            parent.size += frame.size;
        }
    }

    fn flag(&mut self, node_id: &str, kind: ViolationKind, detail: String) {
        if self.flagged.insert(node_id.to_string()) {
            self.violations.push(Violation::new(node_id, kind, detail));
        }
    }
}

fn describe_parent(parent: Option<&str>) -> String {
    match parent {
        Some(id) => format!("'{}'", id),
        None => "none (root)".to_string(),
    }
}

/// Positional fields recomputed from the parent-pointer graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildPlan {
    /// One entry per row, in pre-order
    pub updates: Vec<BoundsUpdate>,
}

impl RebuildPlan {
    /// Assign `left`/`right`/`depth`/`ordering` to every row by an iterative
    /// depth-first walk starting at `left = 1`.
    ///
    /// # Errors
    ///
    /// Rows that no root reaches (missing parent, parent cycle) come back as
    /// `Unreachable` violations and no plan is produced.
    pub fn compute(rows: &[TreeNode]) -> Result<Self, Vec<Violation>> {
        let mut children: HashMap<Option<&str>, Vec<&TreeNode>> = HashMap::new();
        for row in rows {
            children
                .entry(row.parent_id.as_deref())
                .or_default()
                .push(row);
        }
        for siblings in children.values_mut() {
            siblings.sort_by(|a, b| {
                (a.ordering, a.left, &a.id).cmp(&(b.ordering, b.left, &b.id))
            });
        }

        struct Walk<'a> {
            update: usize,
            children: &'a [&'a TreeNode],
            next: usize,
            depth: i64,
        }

        fn kids<'a>(
            children: &'a HashMap<Option<&'a str>, Vec<&'a TreeNode>>,
            id: Option<&'a str>,
        ) -> &'a [&'a TreeNode] {
            children.get(&id).map(Vec::as_slice).unwrap_or(&[])
        }

        let mut updates: Vec<BoundsUpdate> = Vec::with_capacity(rows.len());
        let mut counter = 1;
        let mut stack: Vec<Walk<'_>> = vec![Walk {
            update: usize::MAX,
            children: kids(&children, None),
            next: 0,
            depth: -1,
        }];

        while let Some(walk) = stack.last_mut() {
            let siblings = walk.children;
            match siblings.get(walk.next).copied() {
                Some(child) => {
                    let ordering = walk.next as i64;
                    let depth = walk.depth + 1;
                    walk.next += 1;

                    updates.push(BoundsUpdate {
                        id: child.id.clone(),
                        left: counter,
                        right: 0,
                        depth,
                        ordering,
                    });
                    counter += 1;
                    stack.push(Walk {
                        update: updates.len() - 1,
                        children: kids(&children, Some(child.id.as_str())),
                        next: 0,
                        depth,
                    });
                }
                None => {
                    let finished = walk.update;
                    stack.pop();
                    if let Some(update) = updates.get_mut(finished) {
                        update.right = counter;
                        counter += 1;
                    }
                }
            }
        }

        if updates.len() == rows.len() {
            return Ok(Self { updates });
        }

        let present: HashSet<&str> = rows.iter().map(|r| r.id.as_str()).collect();
        let placed: HashSet<&str> = updates.iter().map(|u| u.id.as_str()).collect();
        let violations = rows
            .iter()
            .filter(|row| !placed.contains(row.id.as_str()))
            .map(|row| {
                let detail = match row.parent_id.as_deref() {
                    Some(parent) if !present.contains(parent) => {
                        format!("parent '{}' does not exist", parent)
                    }
                    _ => "parent chain loops without reaching a root".to_string(),
                };
                Violation::new(row.id.clone(), ViolationKind::Unreachable, detail)
            })
            .collect();
        Err(violations)
    }

    /// Updates whose values differ from the rows they were computed from
    pub fn changed(self, rows: &[TreeNode]) -> Vec<BoundsUpdate> {
        let current: HashMap<&str, &TreeNode> =
            rows.iter().map(|r| (r.id.as_str(), r)).collect();
        self.updates
            .into_iter()
            .filter(|u| {
                current.get(u.id.as_str()).map_or(true, |row| {
                    (row.left, row.right, row.depth, row.ordering)
                        != (u.left, u.right, u.depth, u.ordering)
                })
            })
            .collect()
    }
}

/// Validation and repair for one forest
#[derive(Clone)]
pub struct TreeAuditor {
    store: Arc<dyn NodeStore>,
    forest: ForestId,
    config: TreeConfig,
    events: broadcast::Sender<TreeEvent>,
}

impl TreeAuditor {
    pub fn new(store: Arc<dyn NodeStore>, forest: ForestId, config: TreeConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_channel_capacity.max(1));
        Self {
            store,
            forest,
            config,
            events,
        }
    }

    /// Publish rebuild events on an existing channel (usually the mutator's)
    pub fn with_events(mut self, events: broadcast::Sender<TreeEvent>) -> Self {
        self.events = events;
        self
    }

    pub fn forest(&self) -> &ForestId {
        &self.forest
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TreeEvent> {
        self.events.subscribe()
    }

    /// Check every invariant over the committed forest
    ///
    /// Returns every violation found, not just the first. An empty list means
    /// the forest is sound.
    pub async fn validate(&self, cancel: Option<&CancelSignal>) -> TreeResult<Vec<Violation>> {
        let rows = cancellable(
            self.store.scan_range(&self.forest, NodeScan::All),
            cancel,
            "validate",
        )
        .await?;

        let interval = self.config.cancel_check_interval.max(1);
        let mut walker = ViolationWalker::new();
        for (i, row) in rows.iter().enumerate() {
            if i > 0 && i % interval == 0 {
                tokio::task::yield_now().await;
                if cancel.is_some_and(CancelSignal::is_cancelled) {
                    return Err(TreeError::cancelled("validate"));
                }
            }
            walker.push(row);
        }

        let violations = walker.finish();
        if violations.is_empty() {
            tracing::debug!("Forest '{}' is sound ({} nodes)", self.forest, rows.len());
        } else {
            tracing::warn!(
                "Forest '{}' has {} violation(s) over {} nodes",
                self.forest,
                violations.len(),
                rows.len()
            );
            for violation in &violations {
                tracing::debug!("{}", violation);
            }
        }
        Ok(violations)
    }

    /// `validate`, turning any violation into `TreeError::Corrupted`
    pub async fn check(&self, cancel: Option<&CancelSignal>) -> TreeResult<()> {
        let violations = self.validate(cancel).await?;
        if violations.is_empty() {
            Ok(())
        } else {
            Err(TreeError::Corrupted { violations })
        }
    }

    /// Recompute every positional field from `parent_id` and `ordering`
    ///
    /// Returns the number of nodes in the forest. Either every change commits
    /// or none does.
    pub async fn rebuild(&self, cancel: Option<&CancelSignal>) -> TreeResult<usize> {
        let mut tx = self.begin("rebuild").await?;
        let result = self.rebuild_in(tx.as_mut(), cancel).await;
        let count = finish(tx, result, "rebuild").await?;

        let _ = self.events.send(TreeEvent::rebuilt(&self.forest, count));
        Ok(count)
    }

    /// Load parent-pointer rows into an empty forest and place them
    ///
    /// # Errors
    ///
    /// `DuplicateId` when two rows share an id, `ConflictingBatch` when the
    /// forest already has nodes, `Corrupted` when some rows never reach a root.
    pub async fn seed(&self, rows: Vec<ImportedNode>) -> TreeResult<usize> {
        let mut seen = HashSet::new();
        for row in &rows {
            if !seen.insert(row.id.as_str()) {
                return Err(TreeError::duplicate_id(&row.id));
            }
        }

        let mut tx = self.begin("seed").await?;
        let result = self.seed_in(tx.as_mut(), rows).await;
        let count = finish(tx, result, "seed").await?;

        tracing::info!("Seeded forest '{}' with {} nodes", self.forest, count);
        let _ = self.events.send(TreeEvent::rebuilt(&self.forest, count));
        Ok(count)
    }

    async fn begin(&self, operation: &str) -> TreeResult<Box<dyn NodeTransaction>> {
        let deadline = Instant::now() + self.config.lock_timeout;
        self.store
            .begin(&self.forest, deadline)
            .await
            .map_err(|e| begin_error(operation, e))
    }

    async fn rebuild_in(
        &self,
        tx: &mut dyn NodeTransaction,
        cancel: Option<&CancelSignal>,
    ) -> TreeResult<usize> {
        let rows = cancellable(tx.scan_range(NodeScan::All), cancel, "rebuild").await?;

        let plan = RebuildPlan::compute(&rows).map_err(|violations| {
            tracing::warn!(
                "Refusing to rebuild '{}': {} unreachable row(s)",
                self.forest,
                violations.len()
            );
            TreeError::Corrupted { violations }
        })?;
        let changed = plan.changed(&rows);

        for chunk in changed.chunks(self.config.rebuild_batch_size.max(1)) {
            if cancel.is_some_and(CancelSignal::is_cancelled) {
                return Err(TreeError::cancelled("rebuild"));
            }
            tx.update_bounds(chunk).await.or_storage("rebuild")?;
        }

        tracing::info!(
            "Rebuilt forest '{}': {} nodes, {} rewritten",
            self.forest,
            rows.len(),
            changed.len()
        );
        Ok(rows.len())
    }

    async fn seed_in(
        &self,
        tx: &mut dyn NodeTransaction,
        rows: Vec<ImportedNode>,
    ) -> TreeResult<usize> {
        let existing = tx.count().await.or_storage("seed")?;
        if existing > 0 {
            return Err(TreeError::conflicting_batch(format!(
                "forest '{}' already holds {} node(s); seeding needs an empty forest",
                self.forest, existing
            )));
        }

        for row in rows {
            let mut node = TreeNode::new(row.id, row.parent_id, row.payload);
            node.ordering = row.ordering;
            tx.insert_node(&node).await.or_storage("seed")?;
        }

        self.rebuild_in(tx, None).await
    }
}
