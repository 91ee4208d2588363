//! Entity Adapters
//!
//! The engine only knows `TreeNode` with an opaque JSON payload. Each entity
//! kind (organizations, taxonomy terms, menu items, media, comments) gets:
//!
//! - an `EntityKind` marker naming its forest and its user-facing nouns
//! - a typed payload struct
//! - an `EntityTree<Kind>` alias for typed access to the forest
//!
//! # Examples
//!
//! ```rust,no_run
//! use hierarchy_core::adapters::{Organization, OrganizationTree};
//! use hierarchy_core::config::TreeConfig;
//! use hierarchy_core::db::{MemoryStore, NodeStore};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store: Arc<dyn NodeStore> = Arc::new(MemoryStore::new());
//! let orgs = OrganizationTree::open(store, TreeConfig::default()).await?;
//!
//! let acme = orgs.create(None, None, &Organization::new("Acme")).await?;
//! orgs.create(Some(&acme), None, &Organization::new("Acme Labs")).await?;
//!
//! for org in orgs.children(&acme).await? {
//!     println!("{} ({})", org.data.name, org.data.slug);
//! }
//! # Ok(())
//! # }
//! ```

mod comments;
mod media;
mod menus;
mod organizations;
mod taxonomies;

pub use comments::{Comment, CommentTree, Comments};
pub use media::{MediaItem, MediaLibrary, MediaTree, MediaType};
pub use menus::{MenuItem, MenuTree, Menus};
pub use organizations::{Organization, OrganizationTree, Organizations};
pub use taxonomies::{Taxonomies, TaxonomyTree, Term};

use crate::config::TreeConfig;
use crate::db::NodeStore;
use crate::models::{DeleteMode, ForestId, TreeNode};
use crate::operations::{TreeError, TreeResult};
use crate::services::Forest;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;

/// One hierarchical entity kind
pub trait EntityKind: Send + Sync + 'static {
    /// Table holding this kind's forest
    const TABLE: &'static str;

    /// Singular noun used in messages ("organization")
    const NOUN: &'static str;

    /// Plural noun ("organizations")
    const PLURAL: &'static str;

    /// What a descendant is called ("subsidiary")
    const CHILD_NOUN: &'static str;

    type Payload: Serialize + DeserializeOwned + Send + Sync;

    fn forest_id() -> TreeResult<ForestId> {
        ForestId::new(Self::TABLE).ok_or_else(|| TreeError::invalid_forest(Self::TABLE))
    }
}

/// A node together with its decoded payload
#[derive(Debug, Clone, PartialEq)]
pub struct Entity<P> {
    pub node: TreeNode,
    pub data: P,
}

impl<P: DeserializeOwned> Entity<P> {
    pub fn from_node(node: TreeNode) -> TreeResult<Self> {
        let data = serde_json::from_value(node.payload.clone())?;
        Ok(Self { node, data })
    }

    pub fn id(&self) -> &str {
        &self.node.id
    }
}

fn decode_all<P: DeserializeOwned>(nodes: Vec<TreeNode>) -> TreeResult<Vec<Entity<P>>> {
    nodes.into_iter().map(Entity::from_node).collect()
}

/// Typed view of one entity kind's forest
pub struct EntityTree<K: EntityKind> {
    forest: Forest,
    _kind: PhantomData<K>,
}

impl<K: EntityKind> Clone for EntityTree<K> {
    fn clone(&self) -> Self {
        Self {
            forest: self.forest.clone(),
            _kind: PhantomData,
        }
    }
}

impl<K: EntityKind> EntityTree<K> {
    /// Open this kind's forest on `store`
    pub async fn open(store: Arc<dyn NodeStore>, config: TreeConfig) -> TreeResult<Self> {
        let forest = Forest::open(store, K::forest_id()?, config).await?;
        Ok(Self {
            forest,
            _kind: PhantomData,
        })
    }

    /// Untyped access, for structural calls not wrapped here (batches, audits)
    pub fn forest(&self) -> &Forest {
        &self.forest
    }

    pub async fn create(
        &self,
        parent_id: Option<&str>,
        after_sibling_id: Option<&str>,
        data: &K::Payload,
    ) -> TreeResult<String> {
        let payload = serde_json::to_value(data)?;
        self.forest
            .mutator()
            .insert(parent_id, after_sibling_id, payload)
            .await
    }

    pub async fn get(&self, id: &str) -> TreeResult<Entity<K::Payload>> {
        Entity::from_node(self.forest.reader().get_node(id).await?)
    }

    pub async fn update(&self, id: &str, data: &K::Payload) -> TreeResult<()> {
        let payload = serde_json::to_value(data)?;
        self.forest.mutator().update_payload(id, payload).await
    }

    pub async fn relocate(
        &self,
        id: &str,
        new_parent_id: Option<&str>,
        after_sibling_id: Option<&str>,
    ) -> TreeResult<()> {
        self.forest
            .mutator()
            .move_node(id, new_parent_id, after_sibling_id)
            .await
    }

    /// Delete `id`; returns the ids removed
    pub async fn remove(&self, id: &str, mode: DeleteMode) -> TreeResult<Vec<String>> {
        self.forest.mutator().delete(id, mode).await
    }

    pub async fn roots(&self) -> TreeResult<Vec<Entity<K::Payload>>> {
        decode_all(self.forest.reader().get_roots().await?)
    }

    pub async fn children(&self, id: &str) -> TreeResult<Vec<Entity<K::Payload>>> {
        decode_all(self.forest.reader().get_children(id).await?)
    }

    pub async fn descendants(&self, id: &str) -> TreeResult<Vec<Entity<K::Payload>>> {
        decode_all(self.forest.reader().get_descendants(id).await?)
    }

    pub async fn path(&self, id: &str) -> TreeResult<Vec<Entity<K::Payload>>> {
        decode_all(self.forest.reader().get_path(id).await?)
    }

    /// The whole forest in pre-order
    pub async fn all(&self) -> TreeResult<Vec<Entity<K::Payload>>> {
        decode_all(self.forest.reader().get_tree().await?)
    }

    /// `err` reworded in this kind's vocabulary
    pub fn describe_error(err: &TreeError) -> String {
        describe_error::<K>(err)
    }
}

/// Reword an engine error with `K`'s nouns
pub fn describe_error<K: EntityKind>(err: &TreeError) -> String {
    match err {
        TreeError::NotFound { node_id } => format!("{} '{}' does not exist", K::NOUN, node_id),
        TreeError::InvalidParent { parent_id } => {
            format!("parent {} '{}' does not exist", K::NOUN, parent_id)
        }
        TreeError::InvalidSibling { sibling_id, .. } => format!(
            "{} '{}' is not under the chosen parent",
            K::NOUN,
            sibling_id
        ),
        TreeError::CyclicMove { .. } => {
            format!("cannot move {} into its own {}", K::NOUN, K::CHILD_NOUN)
        }
        TreeError::NotSiblings { .. } => {
            format!("only {} under the same parent can swap places", K::PLURAL)
        }
        TreeError::DuplicateId { node_id } => {
            format!("{} '{}' already exists", K::NOUN, node_id)
        }
        TreeError::Busy { .. } | TreeError::Timeout { .. } => {
            format!("{} are being changed by someone else; try again", K::PLURAL)
        }
        TreeError::Corrupted { violations } => format!(
            "{} hierarchy needs repair ({} problem(s) found)",
            K::NOUN,
            violations.len()
        ),
        TreeError::Payload(e) => format!("{} data is invalid: {}", K::NOUN, e),
        other => other.to_string(),
    }
}
