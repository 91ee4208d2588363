//! Engine Configuration
//!
//! `TreeConfig` carries the tunables shared by the mutator, reader and auditor
//! of one forest. Defaults suit an embedded database; `from_env` lets an
//! operator adjust them without a rebuild.

use crate::db::DEFAULT_BUSY_TIMEOUT_MS;
use std::time::Duration;

/// Tunables for one forest's engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeConfig {
    /// How long a mutation waits for the forest's writer lock
    pub lock_timeout: Duration,

    /// SQLite busy timeout applied to libsql connections
    pub busy_timeout_ms: u64,

    /// Rows scanned between cancellation checks in Validate/Rebuild
    pub cancel_check_interval: usize,

    /// Rows per `update_bounds` call during Rebuild
    pub rebuild_batch_size: usize,

    /// Capacity of the `TreeEvent` broadcast channel
    pub event_channel_capacity: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            cancel_check_interval: 1024,
            rebuild_batch_size: 500,
            event_channel_capacity: 256,
        }
    }
}

impl TreeConfig {
    /// Defaults, overridden by `HIERARCHY_LOCK_TIMEOUT_MS`,
    /// `HIERARCHY_BUSY_TIMEOUT_MS` and `HIERARCHY_REBUILD_BATCH_SIZE`.
    ///
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(ms) = parse_var::<u64>(&lookup, "HIERARCHY_LOCK_TIMEOUT_MS") {
            config.lock_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "HIERARCHY_BUSY_TIMEOUT_MS") {
            config.busy_timeout_ms = ms;
        }
        if let Some(size) = parse_var::<usize>(&lookup, "HIERARCHY_REBUILD_BATCH_SIZE") {
            config.rebuild_batch_size = size.max(1);
        }

        config
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_cancel_check_interval(mut self, rows: usize) -> Self {
        self.cancel_check_interval = rows.max(1);
        self
    }

    pub fn with_rebuild_batch_size(mut self, rows: usize) -> Self {
        self.rebuild_batch_size = rows.max(1);
        self
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring unparseable {}={:?}", key, raw);
            None
        }
    }
}
