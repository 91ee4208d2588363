//! Database Error Types
//!
//! This module defines error types for storage operations, providing
//! clear error handling for connection, initialization, locking and query
//! failures. Tree-shape errors live in `operations::TreeError`.

use std::path::PathBuf;
use thiserror::Error;

/// Database operation errors
///
/// Covers connection and initialization failures plus the two conditions the
/// engine needs to recognise by type: a forest lock that could not be taken in
/// time, and use of a transaction after it ended.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to establish database connection
    #[error("Failed to connect to database at {path}: {source}")]
    ConnectionFailed {
        path: PathBuf,
        source: libsql::Error,
    },

    /// Failed to initialize database schema
    #[error("Failed to initialize database schema: {0}")]
    InitializationFailed(String),

    /// Invalid database path provided
    #[error("Invalid database path: {path}")]
    InvalidPath { path: PathBuf },

    /// Permission denied when accessing database
    #[error("Permission denied for database path: {path}")]
    PermissionDenied { path: PathBuf },

    /// Failed to create parent directory
    #[error("Failed to create parent directory for database: {0}")]
    DirectoryCreationFailed(#[from] std::io::Error),

    /// libsql operation error
    #[error("Database operation failed: {0}")]
    LibsqlError(#[from] libsql::Error),

    /// SQL execution error with context
    #[error("SQL execution failed: {context}")]
    SqlExecutionError { context: String },

    /// Another writer holds the forest lock past the caller's deadline
    #[error("Forest '{forest}' is locked by another writer (waited {waited_ms}ms)")]
    ForestBusy { forest: String, waited_ms: u64 },

    /// Transaction was already committed or rolled back
    #[error("Transaction on forest '{forest}' has already finished")]
    TransactionFinished { forest: String },

    /// Row could not be decoded into a node
    #[error("Malformed row in forest '{forest}': {reason}")]
    MalformedRow { forest: String, reason: String },
}

impl DatabaseError {
    /// Create a connection failed error
    pub fn connection_failed(path: PathBuf, source: libsql::Error) -> Self {
        Self::ConnectionFailed { path, source }
    }

    /// Create an initialization failed error
    pub fn initialization_failed(msg: impl Into<String>) -> Self {
        Self::InitializationFailed(msg.into())
    }

    /// Create an invalid path error
    pub fn invalid_path(path: PathBuf) -> Self {
        Self::InvalidPath { path }
    }

    /// Create a permission denied error
    pub fn permission_denied(path: PathBuf) -> Self {
        Self::PermissionDenied { path }
    }

    /// Create a SQL execution error with context
    pub fn sql_execution(context: impl Into<String>) -> Self {
        Self::SqlExecutionError {
            context: context.into(),
        }
    }

    /// Create a forest busy error
    pub fn forest_busy(forest: impl Into<String>, waited_ms: u64) -> Self {
        Self::ForestBusy {
            forest: forest.into(),
            waited_ms,
        }
    }

    /// Create a transaction finished error
    pub fn transaction_finished(forest: impl Into<String>) -> Self {
        Self::TransactionFinished {
            forest: forest.into(),
        }
    }

    /// Create a malformed row error
    pub fn malformed_row(forest: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedRow {
            forest: forest.into(),
            reason: reason.into(),
        }
    }
}
