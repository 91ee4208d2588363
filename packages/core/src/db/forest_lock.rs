//! Per-Forest Writer Locks
//!
//! A structural mutation may shift the positional fields of many unrelated
//! rows, so two writers on the same forest must never interleave. Each store
//! keeps one `ForestLocks` registry; a write transaction holds its forest's
//! guard from `begin` until commit, rollback or drop.
//!
//! Forests never contend with each other: every forest has its own mutex.

use crate::db::DatabaseError;
use crate::models::ForestId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;
use tokio::time::Instant;

/// Held for the lifetime of one write transaction
#[derive(Debug)]
pub struct ForestGuard {
    forest: ForestId,
    _guard: OwnedMutexGuard<()>,
}

impl ForestGuard {
    pub fn forest(&self) -> &ForestId {
        &self.forest
    }
}

/// Registry of exclusive writer locks, one per forest
#[derive(Debug, Default)]
pub struct ForestLocks {
    locks: Mutex<HashMap<ForestId, Arc<tokio::sync::Mutex<()>>>>,
}

impl ForestLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `forest`, giving up at `deadline`.
    ///
    /// # Errors
    ///
    /// `DatabaseError::ForestBusy` when another writer still holds the lock
    /// at the deadline.
    pub async fn acquire(
        &self,
        forest: &ForestId,
        deadline: Instant,
    ) -> Result<ForestGuard, DatabaseError> {
        let lock = self.lock_for(forest);
        let started = Instant::now();

        match tokio::time::timeout_at(deadline, lock.lock_owned()).await {
            Ok(guard) => {
                tracing::debug!(
                    "Acquired forest lock '{}' after {}ms",
                    forest,
                    started.elapsed().as_millis()
                );
                Ok(ForestGuard {
                    forest: forest.clone(),
                    _guard: guard,
                })
            }
            Err(_) => {
                let waited_ms = started.elapsed().as_millis() as u64;
                tracing::warn!("Forest '{}' still locked after {}ms", forest, waited_ms);
                Err(DatabaseError::forest_busy(forest.as_str(), waited_ms))
            }
        }
    }

    fn lock_for(&self, forest: &ForestId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry(forest.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}
