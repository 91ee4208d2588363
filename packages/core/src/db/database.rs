//! Database Connection Management
//!
//! This module provides the libsql connection and the per-forest table layout
//! used by `TursoStore`.
//!
//! # Architecture
//!
//! - **Path-agnostic**: Accepts any valid PathBuf; parent directories are created
//! - **One table per forest**: Each entity kind's forest lives in its own table,
//!   named by a validated `ForestId`
//! - **WAL mode**: Write-Ahead Logging so snapshot readers never block the writer
//! - **JSON payloads**: Entity fields are stored opaquely in a `payload` column
//!
//! # Database Connection Patterns
//!
//! **ALWAYS use `connect_with_timeout()` in async functions.** It sets the
//! configured busy timeout so a connection waits for SQLite's own write lock
//! instead of failing immediately with `SQLITE_BUSY`.
//!
//! ```no_run
//! # use hierarchy_core::db::DatabaseService;
//! # use std::path::PathBuf;
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let db_service = DatabaseService::new(PathBuf::from("./data/forests.db")).await?;
//! let conn = db_service.connect_with_timeout().await?;
//! # Ok(())
//! # }
//! ```

use crate::db::error::DatabaseError;
use crate::models::ForestId;
use libsql::{Builder, Database};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::Instant;

/// Default SQLite busy timeout in milliseconds
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Column list shared by every query that decodes a `TreeNode`
pub(crate) const NODE_COLUMNS: &str =
    "id, parent_id, lft, rgt, depth, ordering, payload, created_at, modified_at";

/// Database service for managing the libsql connection and forest tables
///
/// # Examples
///
/// ```no_run
/// use hierarchy_core::db::DatabaseService;
/// use hierarchy_core::models::ForestId;
/// use std::path::PathBuf;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let db_service = DatabaseService::new(PathBuf::from("/path/to/forests.db")).await?;
///     db_service.ensure_forest_table(&ForestId::new("menus").unwrap()).await?;
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct DatabaseService {
    /// libsql database handle (wrapped in Arc for sharing)
    pub db: Arc<Database>,

    /// Path to the database file
    pub db_path: PathBuf,

    busy_timeout_ms: u64,
}

impl DatabaseService {
    /// Open (or create) the database at `db_path` with the default busy timeout
    ///
    /// This will:
    /// 1. Ensure the parent directory exists (create if needed)
    /// 2. Open/create the database file
    /// 3. Enable WAL mode and the busy timeout
    ///
    /// Forest tables are created lazily by `ensure_forest_table`.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if:
    /// - Parent directory cannot be created
    /// - Database connection fails
    /// - A PRAGMA cannot be applied
    pub async fn new(db_path: PathBuf) -> Result<Self, DatabaseError> {
        Self::with_busy_timeout(db_path, DEFAULT_BUSY_TIMEOUT_MS).await
    }

    /// Same as `new`, with an explicit SQLite busy timeout
    pub async fn with_busy_timeout(
        db_path: PathBuf,
        busy_timeout_ms: u64,
    ) -> Result<Self, DatabaseError> {
        // Only a brand-new file needs the schema checkpoint below
        let is_new_database = !db_path.exists();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::PermissionDenied {
                        DatabaseError::permission_denied(db_path.clone())
                    } else {
                        DatabaseError::DirectoryCreationFailed(e)
                    }
                })?;
            }
        }

        if db_path.is_dir() {
            return Err(DatabaseError::invalid_path(db_path));
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        let service = Self {
            db: Arc::new(db),
            db_path,
            busy_timeout_ms,
        };

        service.initialize(is_new_database).await?;

        tracing::debug!(
            "Opened forest database at {} (busy timeout {}ms)",
            service.db_path.display(),
            busy_timeout_ms
        );

        Ok(service)
    }

    /// Execute a PRAGMA statement
    ///
    /// PRAGMA statements return rows, so we must use query() instead of execute().
    async fn execute_pragma(
        &self,
        conn: &libsql::Connection,
        pragma: &str,
    ) -> Result<(), DatabaseError> {
        let mut stmt = conn.prepare(pragma).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        let _ = stmt.query(()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        Ok(())
    }

    async fn initialize(&self, is_new_database: bool) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        self.execute_pragma(&conn, "PRAGMA journal_mode = WAL")
            .await
            .map_err(|e| DatabaseError::initialization_failed(e.to_string()))?;

        if is_new_database {
            self.execute_pragma(&conn, "PRAGMA wal_checkpoint(TRUNCATE)")
                .await?;
        }

        Ok(())
    }

    /// Create the forest's table and indexes if they do not exist yet
    ///
    /// # Schema
    ///
    /// - `id TEXT PRIMARY KEY`, `parent_id TEXT` (NULL for roots)
    /// - `lft`, `rgt`, `depth`, `ordering` INTEGER positional fields
    /// - `payload JSON` opaque entity fields
    /// - `idx_{forest}_lft` for range scans, `idx_{forest}_parent_ordering`
    ///   for children and siblings
    ///
    /// Idempotent: safe to call on every startup.
    pub async fn ensure_forest_table(&self, forest: &ForestId) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {forest} (
                    id TEXT PRIMARY KEY,
                    parent_id TEXT,
                    lft INTEGER NOT NULL,
                    rgt INTEGER NOT NULL,
                    depth INTEGER NOT NULL DEFAULT 0,
                    ordering INTEGER NOT NULL DEFAULT 0,
                    payload JSON NOT NULL DEFAULT '{{}}',
                    created_at TEXT NOT NULL,
                    modified_at TEXT NOT NULL
                )"
            ),
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to create table '{}': {}", forest, e))
        })?;

        for (suffix, columns) in [("lft", "lft"), ("parent_ordering", "parent_id, ordering")] {
            let index = format!("idx_{}_{}", forest, suffix);
            conn.execute(
                &format!("CREATE INDEX IF NOT EXISTS {index} ON {forest}({columns})"),
                (),
            )
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to create index '{}': {}", index, e))
            })?;
        }

        Ok(())
    }

    /// Force a WAL checkpoint so every committed write reaches the main file
    pub async fn drain_and_checkpoint(&self) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;
        self.execute_pragma(&conn, "PRAGMA wal_checkpoint(TRUNCATE)")
            .await?;
        Ok(())
    }

    /// Get a synchronous connection to the database
    ///
    /// **⚠️ WARNING**: Only use this in synchronous, single-threaded contexts.
    /// In async functions use `connect_with_timeout()` instead.
    pub fn connect(&self) -> Result<libsql::Connection, DatabaseError> {
        self.db.connect().map_err(DatabaseError::LibsqlError)
    }

    /// Get an async connection with busy timeout configured
    ///
    /// **✅ RECOMMENDED**: Use this for all async functions.
    pub async fn connect_with_timeout(&self) -> Result<libsql::Connection, DatabaseError> {
        let conn = self.connect()?;
        self.execute_pragma(
            &conn,
            &format!("PRAGMA busy_timeout = {}", self.busy_timeout_ms),
        )
        .await?;
        Ok(conn)
    }

    /// Async connection whose busy handler gives up by `deadline`
    ///
    /// SQLite's busy handler blocks inside the call, so an outer async timeout
    /// cannot cut it short. The handler's own timeout is set to the time left
    /// (at least 1ms) instead of the configured busy timeout.
    pub async fn connect_until(
        &self,
        deadline: Instant,
    ) -> Result<libsql::Connection, DatabaseError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let timeout_ms = (remaining.as_millis() as u64).max(1);

        let conn = self.connect()?;
        self.execute_pragma(&conn, &format!("PRAGMA busy_timeout = {}", timeout_ms))
            .await?;
        Ok(conn)
    }

    /// Busy timeout applied to every connection
    pub fn busy_timeout_ms(&self) -> u64 {
        self.busy_timeout_ms
    }

    /// Close database connections gracefully
    ///
    /// Checkpoints the WAL so nothing is left only in the log file.
    pub async fn db_close(&self) -> Result<(), DatabaseError> {
        self.drain_and_checkpoint().await
    }
}
