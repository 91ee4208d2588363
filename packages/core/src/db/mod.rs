//! Database Layer
//!
//! This module holds everything the engine needs from storage:
//!
//! - The `NodeStore` / `NodeTransaction` contract the engine is generic over
//! - `TursoStore`: libsql backend, one table per forest
//! - `MemoryStore`: in-process backend for tests and ephemeral forests
//! - `ForestLocks`: per-forest exclusive writer locks shared by both backends
//! - `TreeEvent`: committed-change notifications
//!
//! # Architecture
//!
//! Stores are constructed explicitly by the process entry point and passed
//! down as `Arc<dyn NodeStore>`; there is no global connection.

mod database;
mod error;
pub mod events;
mod forest_lock;
mod memory_store;
mod node_store;
mod turso_store;

pub use database::{DatabaseService, DEFAULT_BUSY_TIMEOUT_MS};
pub use error::DatabaseError;
pub use events::TreeEvent;
pub use forest_lock::{ForestGuard, ForestLocks};
pub use memory_store::MemoryStore;
pub use node_store::{NodeStore, NodeTransaction};
pub use turso_store::TursoStore;
