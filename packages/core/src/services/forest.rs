//! One forest, ready to use
//!
//! `Forest` bundles the mutator, reader and auditor of a single forest over a
//! shared store handle. The mutator and auditor publish on the same event
//! channel, so one subscription sees every committed change.

use crate::config::TreeConfig;
use crate::db::{DatabaseService, NodeStore, TreeEvent, TursoStore};
use crate::models::ForestId;
use crate::operations::{TreeError, TreeResult};
use crate::services::{StorageResultExt, TreeAuditor, TreeMutator, TreeReader};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct Forest {
    id: ForestId,
    store: Arc<dyn NodeStore>,
    mutator: TreeMutator,
    reader: TreeReader,
    auditor: TreeAuditor,
}

impl Forest {
    /// Open `forest` on `store`, creating its backing table if needed
    pub async fn open(
        store: Arc<dyn NodeStore>,
        forest: ForestId,
        config: TreeConfig,
    ) -> TreeResult<Self> {
        store
            .ensure_forest(&forest)
            .await
            .or_storage("ensure_forest")?;

        let mutator = TreeMutator::new(store.clone(), forest.clone(), config.clone());
        let reader = TreeReader::new(store.clone(), forest.clone());
        let auditor = TreeAuditor::new(store.clone(), forest.clone(), config)
            .with_events(mutator.event_sender());

        tracing::debug!("Opened forest '{}'", forest);
        Ok(Self {
            id: forest,
            store,
            mutator,
            reader,
            auditor,
        })
    }

    /// `open` with a forest name that still needs validating
    ///
    /// # Errors
    ///
    /// `InvalidForest` when `name` is not a usable table identifier.
    pub async fn open_named(
        store: Arc<dyn NodeStore>,
        name: &str,
        config: TreeConfig,
    ) -> TreeResult<Self> {
        let forest = ForestId::new(name).ok_or_else(|| TreeError::invalid_forest(name))?;
        Self::open(store, forest, config).await
    }

    /// Open `name` in the libsql database file at `db_path`
    ///
    /// The connection's busy timeout comes from `config.busy_timeout_ms`.
    pub async fn open_file(db_path: PathBuf, name: &str, config: TreeConfig) -> TreeResult<Self> {
        let db = DatabaseService::with_busy_timeout(db_path, config.busy_timeout_ms)
            .await
            .map_err(|e| TreeError::storage("open_database", e.into()))?;
        let store: Arc<dyn NodeStore> = Arc::new(TursoStore::new(Arc::new(db)));
        Self::open_named(store, name, config).await
    }

    pub fn id(&self) -> &ForestId {
        &self.id
    }

    pub fn store(&self) -> &Arc<dyn NodeStore> {
        &self.store
    }

    pub fn mutator(&self) -> &TreeMutator {
        &self.mutator
    }

    pub fn reader(&self) -> &TreeReader {
        &self.reader
    }

    pub fn auditor(&self) -> &TreeAuditor {
        &self.auditor
    }

    /// Events from both the mutator and the auditor
    pub fn subscribe(&self) -> broadcast::Receiver<TreeEvent> {
        self.mutator.subscribe()
    }
}
