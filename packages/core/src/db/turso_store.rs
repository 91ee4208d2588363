//! TursoStore - NodeStore Implementation for Turso/libsql Backend
//!
//! Each forest is one table (see `DatabaseService::ensure_forest_table`).
//! Snapshot reads open a fresh connection per call; WAL mode guarantees they
//! see the last committed state and never a half-applied shift.
//!
//! # Write Path
//!
//! `begin` takes the in-process forest lock, opens a dedicated connection and
//! issues `BEGIN IMMEDIATE`, which also takes SQLite's write lock up front so a
//! writer in another process cannot interleave. Every plan type becomes one
//! ranged `UPDATE`:
//!
//! ```text
//! ShiftSpec     UPDATE t SET lft = lft + d (if lft >= from), rgt = rgt + d (if rgt >= from)
//! RangeShift    UPDATE t SET lft = lft + d, rgt = rgt + d, depth = depth + dd
//!               WHERE lft BETWEEN a AND b
//! OrderingShift UPDATE t SET ordering = ordering + d WHERE parent_id IS p AND ordering >= n
//! ```
//!
//! # Examples
//!
//! ```rust,no_run
//! use hierarchy_core::db::{DatabaseService, NodeStore, TursoStore};
//! use hierarchy_core::models::ForestId;
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let db = Arc::new(DatabaseService::new(PathBuf::from("./data/forests.db")).await?);
//!     let store: Arc<dyn NodeStore> = Arc::new(TursoStore::new(db));
//!
//!     let forest = ForestId::new("organizations").unwrap();
//!     store.ensure_forest(&forest).await?;
//!     let node = store.get_node(&forest, "node-123").await?;
//!     assert!(node.is_none());
//!     Ok(())
//! }
//! ```

use crate::db::database::NODE_COLUMNS;
use crate::db::forest_lock::{ForestGuard, ForestLocks};
use crate::db::node_store::{NodeStore, NodeTransaction};
use crate::db::{DatabaseError, DatabaseService};
use crate::models::{
    BoundsUpdate, ForestId, NodeScan, OrderingShift, RangeShift, ShiftSpec, TreeNode,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use libsql::{Connection, Row, Value as SqlValue};
use serde_json::Value;
use std::sync::Arc;
use tokio::time::Instant;

/// TursoStore implements NodeStore for the libsql backend
pub struct TursoStore {
    db: Arc<DatabaseService>,
    locks: ForestLocks,
}

impl TursoStore {
    pub fn new(db: Arc<DatabaseService>) -> Self {
        Self {
            db,
            locks: ForestLocks::new(),
        }
    }

    /// Underlying database service
    pub fn database(&self) -> &Arc<DatabaseService> {
        &self.db
    }
}

/// Parse timestamp from database - handles both SQLite and RFC3339 formats
///
/// SQLite CURRENT_TIMESTAMP returns: "YYYY-MM-DD HH:MM:SS"
/// Rows written by the engine use RFC3339.
fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }

    Err(anyhow::anyhow!(
        "Unable to parse timestamp '{}' as SQLite or RFC3339 format",
        s
    ))
}

/// Convert libsql::Row to TreeNode
///
/// Expected columns are `NODE_COLUMNS`, in order.
fn row_to_node(forest: &ForestId, row: &Row) -> Result<TreeNode> {
    let id: String = row.get(0).context("Failed to get id")?;
    let parent_id: Option<String> = row.get(1).context("Failed to get parent_id")?;
    let left: i64 = row.get(2).context("Failed to get lft")?;
    let right: i64 = row.get(3).context("Failed to get rgt")?;
    let depth: i64 = row.get(4).context("Failed to get depth")?;
    let ordering: i64 = row.get(5).context("Failed to get ordering")?;
    let payload_json: String = row.get(6).context("Failed to get payload")?;
    let created_at_str: String = row.get(7).context("Failed to get created_at")?;
    let modified_at_str: String = row.get(8).context("Failed to get modified_at")?;

    let payload: Value = serde_json::from_str(&payload_json).map_err(|e| {
        DatabaseError::malformed_row(forest.as_str(), format!("payload of '{}': {}", id, e))
    })?;
    let created_at = parse_timestamp(&created_at_str).context("Failed to parse created_at")?;
    let modified_at = parse_timestamp(&modified_at_str).context("Failed to parse modified_at")?;

    Ok(TreeNode {
        id,
        parent_id,
        left,
        right,
        depth,
        ordering,
        payload,
        created_at,
        modified_at,
    })
}

/// `SQLITE_BUSY` / `SQLITE_LOCKED` surfaced by the busy handler giving up
fn is_busy(err: &libsql::Error) -> bool {
    let message = err.to_string().to_ascii_lowercase();
    message.contains("database is locked") || message.contains("busy")
}

fn text_or_null(value: Option<&str>) -> SqlValue {
    match value {
        Some(s) => SqlValue::Text(s.to_string()),
        None => SqlValue::Null,
    }
}

/// SQL and bind values for one scan shape.
///
/// Anchored shapes resolve their node through subselects, so the whole read is
/// one statement against one snapshot.
fn scan_sql(forest: &ForestId, scan: &NodeScan) -> (String, Vec<SqlValue>) {
    let select = format!("SELECT {} FROM {}", NODE_COLUMNS, forest);
    let anchor = |column: &str| format!("(SELECT {} FROM {} WHERE id = ?1)", column, forest);
    let anchored = |id: &String| vec![SqlValue::Text(id.clone())];

    match scan {
        NodeScan::All => (format!("{} ORDER BY lft, id", select), Vec::new()),
        NodeScan::Children(parent) => (
            format!(
                "{} WHERE parent_id IS ? ORDER BY ordering, lft, id",
                select
            ),
            vec![text_or_null(parent.as_deref())],
        ),
        NodeScan::Subtree { left, right } => (
            format!("{} WHERE lft >= ? AND lft <= ? ORDER BY lft, id", select),
            vec![SqlValue::Integer(*left), SqlValue::Integer(*right)],
        ),
        NodeScan::Family(id) => (
            format!(
                "{} WHERE id = ?1 OR parent_id = ?1 ORDER BY ordering, lft, id",
                select
            ),
            anchored(id),
        ),
        // A root's parent is NULL, so the EXISTS guard keeps a missing
        // anchor from matching every root
        NodeScan::SiblingGroup(id) => (
            format!(
                "{} WHERE EXISTS {} AND parent_id IS {} ORDER BY ordering, lft, id",
                select,
                anchor("1"),
                anchor("parent_id")
            ),
            anchored(id),
        ),
        NodeScan::SubtreeOf(id) => (
            format!(
                "{} WHERE lft >= {} AND lft <= {} ORDER BY lft, id",
                select,
                anchor("lft"),
                anchor("rgt")
            ),
            anchored(id),
        ),
        NodeScan::PathTo(id) => (
            format!(
                "{} WHERE lft <= {} AND rgt >= {} ORDER BY lft, id",
                select,
                anchor("lft"),
                anchor("rgt")
            ),
            anchored(id),
        ),
    }
}

async fn query_nodes(
    conn: &Connection,
    forest: &ForestId,
    sql: &str,
    params: Vec<SqlValue>,
) -> Result<Vec<TreeNode>> {
    let mut rows = conn
        .query(sql, params)
        .await
        .with_context(|| format!("Failed to scan forest '{}'", forest))?;

    let mut nodes = Vec::new();
    while let Some(row) = rows.next().await? {
        nodes.push(row_to_node(forest, &row)?);
    }
    Ok(nodes)
}

async fn fetch_node(conn: &Connection, forest: &ForestId, id: &str) -> Result<Option<TreeNode>> {
    let sql = format!("SELECT {} FROM {} WHERE id = ?", NODE_COLUMNS, forest);
    let mut nodes = query_nodes(conn, forest, &sql, vec![SqlValue::Text(id.to_string())]).await?;
    Ok(nodes.pop())
}

async fn query_scalar(conn: &Connection, sql: &str) -> Result<i64> {
    let mut rows = conn.query(sql, ()).await?;
    match rows.next().await? {
        Some(row) => Ok(row.get::<i64>(0)?),
        None => Ok(0),
    }
}

#[async_trait]
impl NodeStore for TursoStore {
    async fn ensure_forest(&self, forest: &ForestId) -> Result<()> {
        self.db.ensure_forest_table(forest).await?;
        Ok(())
    }

    async fn get_node(&self, forest: &ForestId, id: &str) -> Result<Option<TreeNode>> {
        let conn = self.db.connect_with_timeout().await?;
        fetch_node(&conn, forest, id).await
    }

    async fn scan_range(&self, forest: &ForestId, scan: NodeScan) -> Result<Vec<TreeNode>> {
        let conn = self.db.connect_with_timeout().await?;
        let (sql, params) = scan_sql(forest, &scan);
        query_nodes(&conn, forest, &sql, params).await
    }

    async fn begin(
        &self,
        forest: &ForestId,
        deadline: Instant,
    ) -> Result<Box<dyn NodeTransaction>> {
        let guard = self.locks.acquire(forest, deadline).await?;
        let conn = self.db.connect_until(deadline).await?;

        // SQLite's own write lock may be held by another process; its busy
        // handler is bounded by the same deadline as the forest lock.
        let started = Instant::now();
        let busy = || {
            DatabaseError::forest_busy(forest.as_str(), started.elapsed().as_millis() as u64)
        };
        match tokio::time::timeout_at(deadline, conn.execute("BEGIN IMMEDIATE", ())).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) if is_busy(&e) => return Err(busy().into()),
            Ok(Err(e)) => {
                return Err(DatabaseError::sql_execution(format!(
                    "Failed to begin transaction on '{}': {}",
                    forest, e
                ))
                .into());
            }
            Err(_) => return Err(busy().into()),
        }

        Ok(Box::new(TursoTransaction {
            conn,
            forest: forest.clone(),
            finished: false,
            _guard: guard,
        }))
    }

    async fn close(&self) -> Result<()> {
        self.db.db_close().await?;
        Ok(())
    }
}

/// One `BEGIN IMMEDIATE` transaction on a dedicated connection
///
/// Field order matters: the connection (and with it any open transaction) is
/// closed before the forest guard is released.
struct TursoTransaction {
    conn: Connection,
    forest: ForestId,
    finished: bool,
    _guard: ForestGuard,
}

impl TursoTransaction {
    async fn execute(&self, sql: &str, params: Vec<SqlValue>) -> Result<u64> {
        if self.finished {
            return Err(DatabaseError::transaction_finished(self.forest.as_str()).into());
        }
        let affected = self.conn.execute(sql, params).await.map_err(|e| {
            DatabaseError::sql_execution(format!("'{}' on forest '{}': {}", sql, self.forest, e))
        })?;
        Ok(affected)
    }

    fn now() -> SqlValue {
        SqlValue::Text(Utc::now().to_rfc3339())
    }
}

impl Drop for TursoTransaction {
    fn drop(&mut self) {
        if !self.finished {
            // Closing the connection rolls the open transaction back
            tracing::warn!(
                "Transaction on forest '{}' dropped without commit; rolling back",
                self.forest
            );
        }
    }
}

#[async_trait]
impl NodeTransaction for TursoTransaction {
    fn forest(&self) -> &ForestId {
        &self.forest
    }

    async fn get_node(&mut self, id: &str) -> Result<Option<TreeNode>> {
        fetch_node(&self.conn, &self.forest, id).await
    }

    async fn scan_range(&mut self, scan: NodeScan) -> Result<Vec<TreeNode>> {
        let (sql, params) = scan_sql(&self.forest, &scan);
        query_nodes(&self.conn, &self.forest, &sql, params).await
    }

    async fn max_right(&mut self) -> Result<i64> {
        query_scalar(
            &self.conn,
            &format!("SELECT COALESCE(MAX(rgt), 0) FROM {}", self.forest),
        )
        .await
    }

    async fn count(&mut self) -> Result<i64> {
        query_scalar(&self.conn, &format!("SELECT COUNT(*) FROM {}", self.forest)).await
    }

    async fn insert_node(&mut self, node: &TreeNode) -> Result<()> {
        let payload =
            serde_json::to_string(&node.payload).context("Failed to serialize payload")?;
        self.execute(
            &format!(
                "INSERT INTO {} ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                self.forest, NODE_COLUMNS
            ),
            vec![
                SqlValue::Text(node.id.clone()),
                text_or_null(node.parent_id.as_deref()),
                SqlValue::Integer(node.left),
                SqlValue::Integer(node.right),
                SqlValue::Integer(node.depth),
                SqlValue::Integer(node.ordering),
                SqlValue::Text(payload),
                SqlValue::Text(node.created_at.to_rfc3339()),
                SqlValue::Text(node.modified_at.to_rfc3339()),
            ],
        )
        .await?;
        Ok(())
    }

    async fn apply_shift(&mut self, shift: ShiftSpec) -> Result<u64> {
        // left >= from implies right >= from, so filtering on rgt covers both
        self.execute(
            &format!(
                "UPDATE {} SET
                    lft = CASE WHEN lft >= ?2 THEN lft + ?1 ELSE lft END,
                    rgt = rgt + ?1
                 WHERE rgt >= ?2",
                self.forest
            ),
            vec![SqlValue::Integer(shift.delta), SqlValue::Integer(shift.from)],
        )
        .await
    }

    async fn translate_range(&mut self, shift: RangeShift) -> Result<u64> {
        self.execute(
            &format!(
                "UPDATE {} SET lft = lft + ?1, rgt = rgt + ?1, depth = depth + ?2
                 WHERE lft >= ?3 AND lft <= ?4",
                self.forest
            ),
            vec![
                SqlValue::Integer(shift.delta),
                SqlValue::Integer(shift.depth_delta),
                SqlValue::Integer(shift.from_left),
                SqlValue::Integer(shift.to_left),
            ],
        )
        .await
    }

    async fn shift_ordering(&mut self, shift: &OrderingShift) -> Result<u64> {
        self.execute(
            &format!(
                "UPDATE {} SET ordering = ordering + ?1
                 WHERE parent_id IS ?2 AND ordering >= ?3 AND id IS NOT ?4",
                self.forest
            ),
            vec![
                SqlValue::Integer(shift.delta),
                text_or_null(shift.parent_id.as_deref()),
                SqlValue::Integer(shift.from),
                text_or_null(shift.exclude_id.as_deref()),
            ],
        )
        .await
    }

    async fn update_link(
        &mut self,
        id: &str,
        parent_id: Option<&str>,
        ordering: i64,
    ) -> Result<()> {
        let affected = self
            .execute(
                &format!(
                    "UPDATE {} SET parent_id = ?1, ordering = ?2, modified_at = ?3 WHERE id = ?4",
                    self.forest
                ),
                vec![
                    text_or_null(parent_id),
                    SqlValue::Integer(ordering),
                    Self::now(),
                    SqlValue::Text(id.to_string()),
                ],
            )
            .await?;
        if affected == 0 {
            anyhow::bail!("Node '{}' not found in forest '{}'", id, self.forest);
        }
        Ok(())
    }

    async fn reparent_children(&mut self, from: &str, to: Option<&str>) -> Result<u64> {
        self.execute(
            &format!(
                "UPDATE {} SET parent_id = ?1, modified_at = ?2 WHERE parent_id = ?3",
                self.forest
            ),
            vec![text_or_null(to), Self::now(), SqlValue::Text(from.to_string())],
        )
        .await
    }

    async fn update_bounds(&mut self, updates: &[BoundsUpdate]) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET lft = ?1, rgt = ?2, depth = ?3, ordering = ?4 WHERE id = ?5",
            self.forest
        );
        for update in updates {
            let affected = self
                .execute(
                    &sql,
                    vec![
                        SqlValue::Integer(update.left),
                        SqlValue::Integer(update.right),
                        SqlValue::Integer(update.depth),
                        SqlValue::Integer(update.ordering),
                        SqlValue::Text(update.id.clone()),
                    ],
                )
                .await?;
            if affected == 0 {
                anyhow::bail!("Node '{}' not found in forest '{}'", update.id, self.forest);
            }
        }
        Ok(())
    }

    async fn update_payload(&mut self, id: &str, payload: &Value) -> Result<()> {
        let payload = serde_json::to_string(payload).context("Failed to serialize payload")?;
        let affected = self
            .execute(
                &format!(
                    "UPDATE {} SET payload = ?1, modified_at = ?2 WHERE id = ?3",
                    self.forest
                ),
                vec![
                    SqlValue::Text(payload),
                    Self::now(),
                    SqlValue::Text(id.to_string()),
                ],
            )
            .await?;
        if affected == 0 {
            anyhow::bail!("Node '{}' not found in forest '{}'", id, self.forest);
        }
        Ok(())
    }

    async fn delete_range(&mut self, from_left: i64, to_left: i64) -> Result<u64> {
        self.execute(
            &format!("DELETE FROM {} WHERE lft >= ?1 AND lft <= ?2", self.forest),
            vec![SqlValue::Integer(from_left), SqlValue::Integer(to_left)],
        )
        .await
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        if let Err(e) = self.conn.execute("COMMIT", ()).await {
            let _rollback = self.conn.execute("ROLLBACK", ()).await;
            self.finished = true;
            return Err(DatabaseError::sql_execution(format!(
                "Failed to commit transaction on '{}': {}",
                self.forest, e
            ))
            .into());
        }
        self.finished = true;
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        self.finished = true;
        self.conn.execute("ROLLBACK", ()).await.map_err(|e| {
            DatabaseError::sql_execution(format!(
                "Failed to roll back transaction on '{}': {}",
                self.forest, e
            ))
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NodeBounds;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn create_test_store() -> (TursoStore, ForestId, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = DatabaseService::new(temp_dir.path().join("test.db"))
            .await
            .unwrap();
        let store = TursoStore::new(Arc::new(db));
        let forest = ForestId::new("taxonomies").unwrap();
        store.ensure_forest(&forest).await.unwrap();
        (store, forest, temp_dir)
    }

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(2)
    }

    fn row(id: &str, parent: Option<&str>, l: i64, r: i64, d: i64, o: i64) -> TreeNode {
        TreeNode::new(id.to_string(), parent.map(str::to_string), json!({"label": id}))
            .with_bounds(NodeBounds::new(l, r, d), o)
    }

    async fn seed(store: &TursoStore, forest: &ForestId) {
        let mut tx = store.begin(forest, deadline()).await.unwrap();
        for node in [
            row("root", None, 1, 8, 0, 0),
            row("a", Some("root"), 2, 5, 1, 0),
            row("a1", Some("a"), 3, 4, 2, 0),
            row("b", Some("root"), 6, 7, 1, 1),
        ] {
            tx.insert_node(&node).await.unwrap();
        }
        tx.commit().await.unwrap();
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2025-01-15 10:30:00").is_ok());
        assert!(parse_timestamp("2025-01-15T10:30:00+00:00").is_ok());
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[tokio::test]
    async fn test_round_trip_row() {
        let (store, forest, _temp) = create_test_store().await;
        seed(&store, &forest).await;

        let a1 = store.get_node(&forest, "a1").await.unwrap().unwrap();
        assert_eq!(a1.parent_id.as_deref(), Some("a"));
        assert_eq!((a1.left, a1.right, a1.depth, a1.ordering), (3, 4, 2, 0));
        assert_eq!(a1.payload, json!({"label": "a1"}));

        let root = store.get_node(&forest, "root").await.unwrap().unwrap();
        assert!(root.is_root());
    }

    #[tokio::test]
    async fn test_scan_orders() {
        let (store, forest, _temp) = create_test_store().await;
        seed(&store, &forest).await;

        let tree = store.scan_range(&forest, NodeScan::All).await.unwrap();
        let ids: Vec<_> = tree.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["root", "a", "a1", "b"]);

        let roots = store
            .scan_range(&forest, NodeScan::Children(None))
            .await
            .unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].id, "root");

        let path = store
            .scan_range(&forest, NodeScan::PathTo("a1".to_string()))
            .await
            .unwrap();
        let ids: Vec<_> = path.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["root", "a", "a1"]);
    }

    #[tokio::test]
    async fn test_anchored_scans() {
        let (store, forest, _temp) = create_test_store().await;
        seed(&store, &forest).await;

        let scan_ids = |shape: NodeScan| {
            let store = &store;
            let forest = &forest;
            async move {
                let nodes = store.scan_range(forest, shape).await.unwrap();
                nodes.into_iter().map(|n| n.id).collect::<Vec<_>>()
            }
        };

        assert_eq!(scan_ids(NodeScan::SubtreeOf("a".into())).await, vec!["a", "a1"]);
        assert_eq!(scan_ids(NodeScan::Family("root".into())).await, vec!["root", "a", "b"]);
        assert_eq!(scan_ids(NodeScan::SiblingGroup("a".into())).await, vec!["a", "b"]);
        assert_eq!(scan_ids(NodeScan::SiblingGroup("root".into())).await, vec!["root"]);

        for shape in [
            NodeScan::Family("ghost".into()),
            NodeScan::SiblingGroup("ghost".into()),
            NodeScan::SubtreeOf("ghost".into()),
            NodeScan::PathTo("ghost".into()),
        ] {
            assert!(scan_ids(shape).await.is_empty());
        }
    }

    #[tokio::test]
    async fn test_uncommitted_writes_invisible_to_readers() {
        let (store, forest, _temp) = create_test_store().await;
        seed(&store, &forest).await;

        let mut tx = store.begin(&forest, deadline()).await.unwrap();
        tx.apply_shift(ShiftSpec::open(6, 2)).await.unwrap();
        assert_eq!(tx.get_node("root").await.unwrap().unwrap().right, 10);

        let root = store.get_node(&forest, "root").await.unwrap().unwrap();
        assert_eq!(root.right, 8);

        tx.rollback().await.unwrap();
        let root = store.get_node(&forest, "root").await.unwrap().unwrap();
        assert_eq!(root.right, 8);
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let (store, forest, _temp) = create_test_store().await;
        seed(&store, &forest).await;

        {
            let mut tx = store.begin(&forest, deadline()).await.unwrap();
            tx.delete_range(1, 8).await.unwrap();
        }

        let all = store.scan_range(&forest, NodeScan::All).await.unwrap();
        assert_eq!(all.len(), 4);
    }

    #[tokio::test]
    async fn test_second_writer_busy() {
        let (store, forest, _temp) = create_test_store().await;
        let _held = store.begin(&forest, deadline()).await.unwrap();

        let err = store
            .begin(&forest, Instant::now() + Duration::from_millis(30))
            .await
            .err()
            .expect("lock is held");
        assert!(matches!(
            err.downcast_ref::<DatabaseError>(),
            Some(DatabaseError::ForestBusy { .. })
        ));
    }

    #[tokio::test]
    async fn test_foreign_write_lock_reports_busy_by_deadline() {
        let temp_dir = TempDir::new().unwrap();
        // A busy handler this long would blow well past the caller's deadline
        let db = DatabaseService::with_busy_timeout(temp_dir.path().join("test.db"), 30_000)
            .await
            .unwrap();
        let store = TursoStore::new(Arc::new(db));
        let forest = ForestId::new("taxonomies").unwrap();
        store.ensure_forest(&forest).await.unwrap();

        // Another writer outside this store holds SQLite's write lock
        let foreign = store.database().connect().unwrap();
        foreign.execute("BEGIN IMMEDIATE", ()).await.unwrap();

        let started = Instant::now();
        let err = store
            .begin(&forest, started + Duration::from_millis(200))
            .await
            .err()
            .expect("write lock is held elsewhere");
        assert!(matches!(
            err.downcast_ref::<DatabaseError>(),
            Some(DatabaseError::ForestBusy { .. })
        ));
        assert!(started.elapsed() < Duration::from_secs(5));

        foreign.execute("ROLLBACK", ()).await.unwrap();
        let tx = store.begin(&forest, deadline()).await.unwrap();
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_ranged_updates() {
        let (store, forest, _temp) = create_test_store().await;
        seed(&store, &forest).await;

        let mut tx = store.begin(&forest, deadline()).await.unwrap();

        // gap opened at 6 touches root (right only) and b (both)
        assert_eq!(tx.apply_shift(ShiftSpec::open(6, 2)).await.unwrap(), 2);

        let moved = tx
            .translate_range(RangeShift {
                from_left: 2,
                to_left: 4,
                delta: 10,
                depth_delta: 1,
            })
            .await
            .unwrap();
        assert_eq!(moved, 2);

        let bumped = tx
            .shift_ordering(&OrderingShift {
                parent_id: Some("root".to_string()),
                from: 0,
                delta: 1,
                exclude_id: Some("b".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(bumped, 1);

        tx.update_link("a1", None, 3).await.unwrap();
        tx.commit().await.unwrap();

        let a = store.get_node(&forest, "a").await.unwrap().unwrap();
        assert_eq!((a.left, a.right, a.depth, a.ordering), (12, 15, 2, 1));
        let a1 = store.get_node(&forest, "a1").await.unwrap().unwrap();
        assert!(a1.parent_id.is_none());
        assert_eq!(a1.ordering, 3);
    }

    #[tokio::test]
    async fn test_max_right_and_count() {
        let (store, forest, _temp) = create_test_store().await;

        let mut tx = store.begin(&forest, deadline()).await.unwrap();
        assert_eq!(tx.max_right().await.unwrap(), 0);
        assert_eq!(tx.count().await.unwrap(), 0);
        tx.rollback().await.unwrap();

        seed(&store, &forest).await;
        let mut tx = store.begin(&forest, deadline()).await.unwrap();
        assert_eq!(tx.max_right().await.unwrap(), 8);
        assert_eq!(tx.count().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_update_missing_row_is_error() {
        let (store, forest, _temp) = create_test_store().await;
        let mut tx = store.begin(&forest, deadline()).await.unwrap();
        assert!(tx.update_payload("ghost", &json!({})).await.is_err());
        assert!(tx.update_link("ghost", None, 0).await.is_err());
    }
}
