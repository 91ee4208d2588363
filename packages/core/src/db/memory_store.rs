//! MemoryStore - In-Process NodeStore Implementation
//!
//! Keeps every forest in a `BTreeMap` behind a lock. Write transactions work on
//! a private copy taken at `begin` and swap it in on `commit`, so readers only
//! ever see whole committed states.
//!
//! Useful for tests, property tests and callers that want an ephemeral
//! forest without a database file.

use crate::db::forest_lock::{ForestGuard, ForestLocks};
use crate::db::node_store::{NodeStore, NodeTransaction};
use crate::db::DatabaseError;
use crate::models::{
    BoundsUpdate, ForestId, NodeScan, OrderingShift, RangeShift, ShiftSpec, TreeNode,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use tokio::time::Instant;

type Rows = BTreeMap<String, TreeNode>;

/// In-memory backend; cheap to create, gone when dropped
#[derive(Debug, Default)]
pub struct MemoryStore {
    forests: RwLock<HashMap<ForestId, Arc<RwLock<Rows>>>>,
    locks: ForestLocks,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn forest_rows(&self, forest: &ForestId) -> Result<Arc<RwLock<Rows>>> {
        let forests = self
            .forests
            .read()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        forests
            .get(forest)
            .cloned()
            .ok_or_else(|| anyhow!("Forest '{}' has not been initialized", forest))
    }

    /// Overwrite a row verbatim, bypassing the engine.
    ///
    /// Test hook for simulating drift; never used by the engine itself.
    #[doc(hidden)]
    pub fn overwrite_row(&self, forest: &ForestId, node: TreeNode) -> Result<()> {
        let rows = self.forest_rows(forest)?;
        let mut rows = rows
            .write()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        rows.insert(node.id.clone(), node);
        Ok(())
    }
}

fn select(rows: &Rows, keep: impl Fn(&TreeNode) -> bool) -> Vec<TreeNode> {
    rows.values().filter(|n| keep(n)).cloned().collect()
}

/// Run a `NodeScan` over a row map, honouring the scan's result order.
///
/// Anchored scans look their node up in the same map, so the anchor and the
/// rows it selects always come from one committed state.
fn scan_rows(rows: &Rows, scan: &NodeScan) -> Vec<TreeNode> {
    let mut matched: Vec<TreeNode> = match scan {
        NodeScan::All => rows.values().cloned().collect(),
        NodeScan::Children(parent) => select(rows, |n| n.parent_id == *parent),
        NodeScan::Subtree { left, right } => {
            select(rows, |n| n.left >= *left && n.left <= *right)
        }
        NodeScan::Family(id) => match rows.get(id) {
            Some(_) => select(rows, |n| {
                n.id == *id || n.parent_id.as_deref() == Some(id.as_str())
            }),
            None => Vec::new(),
        },
        NodeScan::SiblingGroup(id) => match rows.get(id) {
            Some(anchor) => select(rows, |n| n.parent_id == anchor.parent_id),
            None => Vec::new(),
        },
        NodeScan::SubtreeOf(id) => match rows.get(id) {
            Some(anchor) => select(rows, |n| n.left >= anchor.left && n.left <= anchor.right),
            None => Vec::new(),
        },
        NodeScan::PathTo(id) => match rows.get(id) {
            Some(anchor) => select(rows, |n| n.left <= anchor.left && n.right >= anchor.right),
            None => Vec::new(),
        },
    };

    match scan {
        NodeScan::Children(_) | NodeScan::Family(_) | NodeScan::SiblingGroup(_) => {
            matched.sort_by(|a, b| (a.ordering, a.left, &a.id).cmp(&(b.ordering, b.left, &b.id)))
        }
        _ => matched.sort_by(|a, b| (a.left, &a.id).cmp(&(b.left, &b.id))),
    }
    matched
}

#[async_trait]
impl NodeStore for MemoryStore {
    async fn ensure_forest(&self, forest: &ForestId) -> Result<()> {
        let mut forests = self
            .forests
            .write()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        forests.entry(forest.clone()).or_default();
        Ok(())
    }

    async fn get_node(&self, forest: &ForestId, id: &str) -> Result<Option<TreeNode>> {
        let rows = self.forest_rows(forest)?;
        let rows = rows
            .read()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        Ok(rows.get(id).cloned())
    }

    async fn scan_range(&self, forest: &ForestId, scan: NodeScan) -> Result<Vec<TreeNode>> {
        let rows = self.forest_rows(forest)?;
        let rows = rows
            .read()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        Ok(scan_rows(&rows, &scan))
    }

    async fn begin(
        &self,
        forest: &ForestId,
        deadline: Instant,
    ) -> Result<Box<dyn NodeTransaction>> {
        let committed = self.forest_rows(forest)?;
        let guard = self.locks.acquire(forest, deadline).await?;

        // Copy taken under the writer lock: no other transaction can commit
        // between this snapshot and our own commit.
        let working = committed
            .read()
            .map_err(|_| anyhow!("memory store lock poisoned"))?
            .clone();

        Ok(Box::new(MemoryTransaction {
            forest: forest.clone(),
            committed,
            working,
            _guard: guard,
        }))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Copy-on-begin transaction over one forest
struct MemoryTransaction {
    forest: ForestId,
    committed: Arc<RwLock<Rows>>,
    working: Rows,
    _guard: ForestGuard,
}

impl MemoryTransaction {
    fn row_mut(&mut self, id: &str) -> Result<&mut TreeNode> {
        let forest = self.forest.clone();
        self.working
            .get_mut(id)
            .ok_or_else(|| anyhow!("Node '{}' not found in forest '{}'", id, forest))
    }
}

#[async_trait]
impl NodeTransaction for MemoryTransaction {
    fn forest(&self) -> &ForestId {
        &self.forest
    }

    async fn get_node(&mut self, id: &str) -> Result<Option<TreeNode>> {
        Ok(self.working.get(id).cloned())
    }

    async fn scan_range(&mut self, scan: NodeScan) -> Result<Vec<TreeNode>> {
        Ok(scan_rows(&self.working, &scan))
    }

    async fn max_right(&mut self) -> Result<i64> {
        Ok(self.working.values().map(|n| n.right).max().unwrap_or(0))
    }

    async fn count(&mut self) -> Result<i64> {
        Ok(self.working.len() as i64)
    }

    async fn insert_node(&mut self, node: &TreeNode) -> Result<()> {
        if self.working.contains_key(&node.id) {
            return Err(DatabaseError::sql_execution(format!(
                "UNIQUE constraint failed: {}.id ({})",
                self.forest, node.id
            ))
            .into());
        }
        self.working.insert(node.id.clone(), node.clone());
        Ok(())
    }

    async fn apply_shift(&mut self, shift: ShiftSpec) -> Result<u64> {
        let mut touched = 0;
        for node in self.working.values_mut() {
            let mut hit = false;
            if node.left >= shift.from {
                node.left += shift.delta;
                hit = true;
            }
            if node.right >= shift.from {
                node.right += shift.delta;
                hit = true;
            }
            if hit {
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn translate_range(&mut self, shift: RangeShift) -> Result<u64> {
        let mut touched = 0;
        for node in self.working.values_mut() {
            if node.left >= shift.from_left && node.left <= shift.to_left {
                node.left += shift.delta;
                node.right += shift.delta;
                node.depth += shift.depth_delta;
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn shift_ordering(&mut self, shift: &OrderingShift) -> Result<u64> {
        let mut touched = 0;
        for node in self.working.values_mut() {
            if node.parent_id == shift.parent_id
                && node.ordering >= shift.from
                && shift.exclude_id.as_deref() != Some(node.id.as_str())
            {
                node.ordering += shift.delta;
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn update_link(
        &mut self,
        id: &str,
        parent_id: Option<&str>,
        ordering: i64,
    ) -> Result<()> {
        let node = self.row_mut(id)?;
        node.parent_id = parent_id.map(str::to_string);
        node.ordering = ordering;
        node.modified_at = Utc::now();
        Ok(())
    }

    async fn reparent_children(&mut self, from: &str, to: Option<&str>) -> Result<u64> {
        let mut touched = 0;
        for node in self.working.values_mut() {
            if node.parent_id.as_deref() == Some(from) {
                node.parent_id = to.map(str::to_string);
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn update_bounds(&mut self, updates: &[BoundsUpdate]) -> Result<()> {
        for update in updates {
            let node = self.row_mut(&update.id)?;
            node.left = update.left;
            node.right = update.right;
            node.depth = update.depth;
            node.ordering = update.ordering;
        }
        Ok(())
    }

    async fn update_payload(&mut self, id: &str, payload: &Value) -> Result<()> {
        let node = self.row_mut(id)?;
        node.payload = payload.clone();
        node.modified_at = Utc::now();
        Ok(())
    }

    async fn delete_range(&mut self, from_left: i64, to_left: i64) -> Result<u64> {
        let before = self.working.len();
        self.working
            .retain(|_, n| !(n.left >= from_left && n.left <= to_left));
        Ok((before - self.working.len()) as u64)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let this = *self;
        let mut committed = this
            .committed
            .write()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        *committed = this.working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
