//! Tree Reader
//!
//! Read-only hierarchical queries. Each query is exactly one `NodeScan`
//! against the store's last committed state. Queries anchored on a node use
//! the id-keyed scans, which resolve the anchor inside the same read, so a
//! concurrent commit can never pair the anchor's old bounds with new rows. No
//! locks are taken and nothing recurses.
//!
//! | Query | Scan | Order |
//! |---|---|---|
//! | children | `Family(id)` minus the node | ordering |
//! | siblings | `SiblingGroup(id)` minus the node | ordering |
//! | roots | `parent_id IS NULL` | ordering |
//! | descendants / subtree | `SubtreeOf(id)` | left (pre-order) |
//! | ancestors / path | `PathTo(id)` | left (root first) |
//! | tree | everything | left |

use crate::db::NodeStore;
use crate::models::{ForestId, NodeScan, TreeNode};
use crate::operations::{TreeError, TreeResult};
use crate::services::StorageResultExt;
use std::sync::Arc;

/// Query side of one forest
#[derive(Clone)]
pub struct TreeReader {
    store: Arc<dyn NodeStore>,
    forest: ForestId,
}

impl TreeReader {
    pub fn new(store: Arc<dyn NodeStore>, forest: ForestId) -> Self {
        Self { store, forest }
    }

    pub fn forest(&self) -> &ForestId {
        &self.forest
    }

    async fn scan(&self, scan: NodeScan, operation: &str) -> TreeResult<Vec<TreeNode>> {
        self.store
            .scan_range(&self.forest, scan)
            .await
            .or_storage(operation)
    }

    /// Get one node
    ///
    /// # Errors
    ///
    /// `NotFound` if the id is not in this forest.
    pub async fn get_node(&self, node_id: &str) -> TreeResult<TreeNode> {
        self.find_node(node_id)
            .await?
            .ok_or_else(|| TreeError::not_found(node_id))
    }

    /// Get one node, `None` when absent
    pub async fn find_node(&self, node_id: &str) -> TreeResult<Option<TreeNode>> {
        self.store
            .get_node(&self.forest, node_id)
            .await
            .or_storage("get_node")
    }

    /// Run an id-keyed scan and split the anchor row off the result.
    ///
    /// The remaining rows keep the scan's order.
    async fn anchored(
        &self,
        scan: NodeScan,
        node_id: &str,
        operation: &str,
    ) -> TreeResult<(TreeNode, Vec<TreeNode>)> {
        let mut rows = self.scan(scan, operation).await?;
        let position = rows
            .iter()
            .position(|n| n.id == node_id)
            .ok_or_else(|| TreeError::not_found(node_id))?;
        let node = rows.remove(position);
        Ok((node, rows))
    }

    /// Direct children, by sibling ordering
    pub async fn get_children(&self, node_id: &str) -> TreeResult<Vec<TreeNode>> {
        let (_, children) = self
            .anchored(NodeScan::Family(node_id.to_string()), node_id, "get_children")
            .await?;
        Ok(children)
    }

    /// Every node strictly inside `node_id`'s subtree, in pre-order
    pub async fn get_descendants(&self, node_id: &str) -> TreeResult<Vec<TreeNode>> {
        let (_, descendants) = self
            .anchored(
                NodeScan::SubtreeOf(node_id.to_string()),
                node_id,
                "get_descendants",
            )
            .await?;
        Ok(descendants)
    }

    /// Every node whose subtree contains `node_id`, root first
    pub async fn get_ancestors(&self, node_id: &str) -> TreeResult<Vec<TreeNode>> {
        let (_, ancestors) = self
            .anchored(NodeScan::PathTo(node_id.to_string()), node_id, "get_ancestors")
            .await?;
        Ok(ancestors)
    }

    /// Nodes sharing `node_id`'s parent, excluding itself, by ordering
    pub async fn get_siblings(&self, node_id: &str) -> TreeResult<Vec<TreeNode>> {
        let (_, siblings) = self
            .anchored(
                NodeScan::SiblingGroup(node_id.to_string()),
                node_id,
                "get_siblings",
            )
            .await?;
        Ok(siblings)
    }

    /// Ancestors followed by the node itself
    pub async fn get_path(&self, node_id: &str) -> TreeResult<Vec<TreeNode>> {
        let (node, mut path) = self
            .anchored(NodeScan::PathTo(node_id.to_string()), node_id, "get_path")
            .await?;
        path.push(node);
        Ok(path)
    }

    /// The node followed by its descendants, in pre-order
    pub async fn get_subtree(&self, node_id: &str) -> TreeResult<Vec<TreeNode>> {
        let (node, mut subtree) = self
            .anchored(
                NodeScan::SubtreeOf(node_id.to_string()),
                node_id,
                "get_subtree",
            )
            .await?;
        subtree.insert(0, node);
        Ok(subtree)
    }

    /// Top-level nodes, by ordering
    pub async fn get_roots(&self) -> TreeResult<Vec<TreeNode>> {
        self.scan(NodeScan::Children(None), "get_roots").await
    }

    /// The whole forest in pre-order
    pub async fn get_tree(&self) -> TreeResult<Vec<TreeNode>> {
        self.scan(NodeScan::All, "get_tree").await
    }
}
