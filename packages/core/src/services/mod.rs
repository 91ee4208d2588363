//! Tree Services
//!
//! This module contains the engine proper:
//!
//! - `TreeMutator` - the only writer of positional fields (insert, move,
//!   delete, swap, batches, payload updates)
//! - `TreeReader` - hierarchical queries as single range scans
//! - `TreeAuditor` - whole-forest validation, rebuild and seeding
//! - `Forest` - the three bundled over one forest and one store handle
//!
//! Services are generic over `NodeStore`; they never see SQL or entity types.

mod forest;
mod tree_auditor;
mod tree_mutator;
mod tree_reader;

pub use forest::Forest;
pub use tree_auditor::{RebuildPlan, TreeAuditor, ViolationWalker};
pub use tree_mutator::TreeMutator;
pub use tree_reader::TreeReader;

use crate::db::{DatabaseError, NodeTransaction};
use crate::operations::{CancelSignal, TreeError, TreeResult};
use std::future::Future;

/// Attach an operation name to store failures
pub(crate) trait StorageResultExt<T> {
    fn or_storage(self, operation: &str) -> TreeResult<T>;
}

impl<T> StorageResultExt<T> for anyhow::Result<T> {
    fn or_storage(self, operation: &str) -> TreeResult<T> {
        self.map_err(|e| TreeError::storage(operation, e))
    }
}

/// Translate a failed `NodeStore::begin` into `Busy` or `Storage`
pub(crate) fn begin_error(operation: &str, err: anyhow::Error) -> TreeError {
    match err.downcast_ref::<DatabaseError>() {
        Some(DatabaseError::ForestBusy { forest, waited_ms }) => {
            TreeError::busy(forest.clone(), *waited_ms)
        }
        _ => TreeError::storage(operation, err),
    }
}

/// Commit on success, roll back on failure
pub(crate) async fn finish<T>(
    tx: Box<dyn NodeTransaction>,
    result: TreeResult<T>,
    operation: &str,
) -> TreeResult<T> {
    let forest = tx.forest().clone();
    match result {
        Ok(value) => {
            tx.commit().await.or_storage(operation)?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(
                    "Rollback of {} on '{}' failed: {}",
                    operation,
                    forest,
                    rollback_err
                );
            } else if err.is_precondition() {
                tracing::debug!("{} on '{}' rejected: {}", operation, forest, err);
            } else {
                tracing::warn!("Rolled back {} on '{}': {}", operation, forest, err);
            }
            Err(err)
        }
    }
}

/// Await a store read, giving up early if `cancel` fires first
pub(crate) async fn cancellable<T>(
    read: impl Future<Output = anyhow::Result<T>>,
    cancel: Option<&CancelSignal>,
    operation: &str,
) -> TreeResult<T> {
    match cancel {
        Some(signal) => {
            if signal.is_cancelled() {
                return Err(TreeError::cancelled(operation));
            }
            tokio::select! {
                result = read => result.or_storage(operation),
                _ = signal.cancelled() => Err(TreeError::cancelled(operation)),
            }
        }
        None => read.await.or_storage(operation),
    }
}
