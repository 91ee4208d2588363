//! NodeStore Trait - Storage Abstraction for Forests
//!
//! This module defines the contract the tree engine requires from a storage
//! backend. The engine is generic over it: it never sees table names, SQL or
//! entity types, only rows with an id, an optional parent id, four positional
//! fields and an opaque payload.
//!
//! # Architecture
//!
//! - **`NodeStore`**: snapshot reads (used by the reader and by validation)
//!   and the entry point for write transactions
//! - **`NodeTransaction`**: one structural change; holds the forest's
//!   exclusive lock until it is committed, rolled back or dropped
//!
//! # Design Decisions
//!
//! 1. **Async-First**: All methods are async so embedded and networked
//!    backends fit behind the same trait
//! 2. **Ranged Writes**: Shifts are expressed as range predicates
//!    (`ShiftSpec`, `RangeShift`, `OrderingShift`) so a backend applies them
//!    as a handful of bulk updates instead of row-by-row writes
//! 3. **Error Handling**: Uses `anyhow::Result` for flexible error context;
//!    `DatabaseError::ForestBusy` is the one condition callers downcast for
//! 4. **Drop = Rollback**: A transaction that goes out of scope unfinished
//!    leaves no trace
//!
//! # Examples
//!
//! ```rust,no_run
//! use hierarchy_core::db::{MemoryStore, NodeStore};
//! use hierarchy_core::models::{ForestId, NodeScan};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store: Arc<dyn NodeStore> = Arc::new(MemoryStore::new());
//!     let forest = ForestId::new("menus").unwrap();
//!     store.ensure_forest(&forest).await?;
//!
//!     let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
//!     let tx = store.begin(&forest, deadline).await?;
//!     tx.commit().await?;
//!
//!     let roots = store.scan_range(&forest, NodeScan::Children(None)).await?;
//!     assert!(roots.is_empty());
//!     Ok(())
//! }
//! ```

use crate::models::{
    BoundsUpdate, ForestId, NodeScan, OrderingShift, RangeShift, ShiftSpec, TreeNode,
};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;

/// Storage backend for one or more forests
///
/// Implementations must be `Send + Sync` so one handle can be shared by every
/// entity adapter in the process.
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Create the forest's backing storage if it does not exist yet
    ///
    /// Idempotent. Must be called before any other method on that forest.
    async fn ensure_forest(&self, forest: &ForestId) -> Result<()>;

    /// Get one node by id from the last committed state
    ///
    /// # Returns
    ///
    /// - `Ok(Some(node))` if node exists
    /// - `Ok(None)` if node doesn't exist (not an error)
    async fn get_node(&self, forest: &ForestId, id: &str) -> Result<Option<TreeNode>>;

    /// Run one range scan against the last committed state
    ///
    /// Result order is fixed by the `NodeScan` variant. Never observes a
    /// partially applied mutation.
    async fn scan_range(&self, forest: &ForestId, scan: NodeScan) -> Result<Vec<TreeNode>>;

    /// Take the forest's writer lock and open a transaction
    ///
    /// Waits at most until `deadline` for the lock.
    ///
    /// # Errors
    ///
    /// - `DatabaseError::ForestBusy` if the lock is still held at the deadline
    /// - backend errors if the transaction cannot be started
    async fn begin(&self, forest: &ForestId, deadline: Instant)
        -> Result<Box<dyn NodeTransaction>>;

    /// Release backend resources
    async fn close(&self) -> Result<()>;
}

/// One write transaction on one forest
///
/// Reads inside the transaction observe its own earlier writes.
#[async_trait]
pub trait NodeTransaction: Send {
    /// Forest this transaction writes to
    fn forest(&self) -> &ForestId;

    async fn get_node(&mut self, id: &str) -> Result<Option<TreeNode>>;

    async fn scan_range(&mut self, scan: NodeScan) -> Result<Vec<TreeNode>>;

    /// Largest `right` in the forest, 0 when empty
    async fn max_right(&mut self) -> Result<i64>;

    /// Number of rows in the forest
    async fn count(&mut self) -> Result<i64>;

    /// Insert a row with its positional fields as given
    async fn insert_node(&mut self, node: &TreeNode) -> Result<()>;

    /// Open or close a gap: `left += delta WHERE left >= from`, same for `right`
    ///
    /// Returns number of rows touched.
    async fn apply_shift(&mut self, shift: ShiftSpec) -> Result<u64>;

    /// Translate the block of rows whose `left` lies in `[from_left, to_left]`
    async fn translate_range(&mut self, shift: RangeShift) -> Result<u64>;

    /// Renumber part of a sibling group
    async fn shift_ordering(&mut self, shift: &OrderingShift) -> Result<u64>;

    /// Set one row's parent pointer and sibling ordering
    async fn update_link(&mut self, id: &str, parent_id: Option<&str>, ordering: i64)
        -> Result<()>;

    /// Point every child of `from` at `to` instead
    async fn reparent_children(&mut self, from: &str, to: Option<&str>) -> Result<u64>;

    /// Overwrite positional fields of many rows (batch form of UpdateBounds)
    async fn update_bounds(&mut self, updates: &[BoundsUpdate]) -> Result<()>;

    /// Replace one row's payload without touching positional fields
    async fn update_payload(&mut self, id: &str, payload: &Value) -> Result<()>;

    /// Delete every row whose `left` lies in `[from_left, to_left]`
    async fn delete_range(&mut self, from_left: i64, to_left: i64) -> Result<u64>;

    /// Make all writes visible and release the forest lock
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discard all writes and release the forest lock
    async fn rollback(self: Box<Self>) -> Result<()>;
}
