//! Hierarchy Core
//!
//! Nested-set tree storage shared by every hierarchical entity kind
//! (organizations, taxonomy terms, menu items, media, comments).
//!
//! # Architecture
//!
//! - **One flat table per forest**: each row carries `parent_id` plus
//!   `left`/`right`/`depth`/`ordering`; hierarchical queries are single range
//!   scans, never recursion
//! - **Single writer per forest**: structural changes take the forest's lock
//!   and run in one store transaction; readers see the last committed state
//! - **libsql/Turso**: embedded SQLite-compatible backend, with an in-memory
//!   backend for tests and ephemeral forests
//!
//! # Modules
//!
//! - [`models`] - Node shape, forest identity, write-plan and scan types
//! - [`operations`] - Position allocator, error taxonomy, cancellation
//! - [`db`] - Node store contract and its libsql / in-memory backends
//! - [`services`] - Mutator, reader, auditor and the `Forest` bundle
//! - [`adapters`] - Typed access per entity kind
//! - [`config`] - Engine tunables

pub mod adapters;
pub mod config;
pub mod db;
pub mod models;
pub mod operations;
pub mod services;

// Re-export commonly used types
pub use config::TreeConfig;
pub use db::{MemoryStore, NodeStore, TreeEvent, TursoStore};
pub use models::{DeleteMode, ForestId, NodeBounds, Placement, TreeNode, Violation};
pub use operations::{CancelSignal, TreeError, TreeResult};
pub use services::{Forest, TreeAuditor, TreeMutator, TreeReader};
