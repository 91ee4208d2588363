//! Tree Mutator
//!
//! The only component that writes positional fields. Every public operation
//! follows the same shape:
//!
//! 1. take the forest's writer lock and open a transaction (`begin`)
//! 2. read the handful of rows the plan depends on
//! 3. check preconditions (nothing has been written yet)
//! 4. ask `PositionAllocator` for a plan and apply it as ranged updates
//! 5. commit, then publish a `TreeEvent`
//!
//! Any failure after step 1 rolls the whole transaction back.
//!
//! # Examples
//!
//! ```rust,no_run
//! use hierarchy_core::config::TreeConfig;
//! use hierarchy_core::db::{MemoryStore, NodeStore};
//! use hierarchy_core::models::ForestId;
//! use hierarchy_core::services::TreeMutator;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store: Arc<dyn NodeStore> = Arc::new(MemoryStore::new());
//! let forest = ForestId::new("menus").unwrap();
//! store.ensure_forest(&forest).await?;
//!
//! let mutator = TreeMutator::new(store, forest, TreeConfig::default());
//! let root = mutator.insert(None, None, json!({"label": "Main"})).await?;
//! let home = mutator.insert(Some(&root), None, json!({"label": "Home"})).await?;
//! mutator.insert(Some(&root), Some(&home), json!({"label": "About"})).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::TreeConfig;
use crate::db::{NodeStore, NodeTransaction, TreeEvent};
use crate::models::{DeleteMode, ForestId, InsertSpec, MoveSpec, NodeScan, Placement, TreeNode};
use crate::operations::{MovePlan, PositionAllocator, SiblingSlot, TreeError, TreeResult};
use crate::services::{begin_error, finish, StorageResultExt};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::Instant;

/// Structural writer for one forest
///
/// Cheap to clone; clones share the store handle and the event channel.
#[derive(Clone)]
pub struct TreeMutator {
    store: Arc<dyn NodeStore>,
    forest: ForestId,
    config: TreeConfig,
    events: broadcast::Sender<TreeEvent>,
    deadline: Option<Instant>,
}

impl TreeMutator {
    pub fn new(store: Arc<dyn NodeStore>, forest: ForestId, config: TreeConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_channel_capacity.max(1));
        Self {
            store,
            forest,
            config,
            events,
            deadline: None,
        }
    }

    /// Clone of this mutator whose operations give up waiting for the forest
    /// lock at `deadline` instead of after `lock_timeout`
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let mut cloned = self.clone();
        cloned.deadline = Some(deadline);
        cloned
    }

    pub fn forest(&self) -> &ForestId {
        &self.forest
    }

    /// Subscribe to events published after each committed change
    pub fn subscribe(&self) -> broadcast::Receiver<TreeEvent> {
        self.events.subscribe()
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<TreeEvent> {
        self.events.clone()
    }

    fn emit(&self, event: TreeEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    async fn begin(&self, operation: &str) -> TreeResult<Box<dyn NodeTransaction>> {
        let deadline = match self.deadline {
            Some(deadline) if deadline <= Instant::now() => {
                return Err(TreeError::timeout(operation));
            }
            Some(deadline) => deadline,
            None => Instant::now() + self.config.lock_timeout,
        };

        self.store
            .begin(&self.forest, deadline)
            .await
            .map_err(|e| begin_error(operation, e))
    }

    //
    // INSERT
    //

    /// Insert a node under `parent_id` (or as a root), directly after
    /// `after_sibling_id` or, when that is `None`, after every existing sibling
    ///
    /// # Errors
    ///
    /// - `InvalidParent` if `parent_id` is not in this forest
    /// - `NotFound` if `after_sibling_id` is not in this forest
    /// - `InvalidSibling` if `after_sibling_id` is not a child of `parent_id`
    pub async fn insert(
        &self,
        parent_id: Option<&str>,
        after_sibling_id: Option<&str>,
        payload: Value,
    ) -> TreeResult<String> {
        let node = self
            .insert_one(InsertSpec::new(parent_id, after_sibling_id, payload))
            .await?;
        Ok(node.id)
    }

    /// Same as `insert` with a caller-chosen id
    ///
    /// Fails with `DuplicateId` if the id is already taken.
    pub async fn insert_with_id(
        &self,
        id: &str,
        parent_id: Option<&str>,
        after_sibling_id: Option<&str>,
        payload: Value,
    ) -> TreeResult<String> {
        let node = self
            .insert_one(InsertSpec::new(parent_id, after_sibling_id, payload).with_id(id))
            .await?;
        Ok(node.id)
    }

    /// Insert with an explicit `Placement`, returning the stored row
    pub async fn insert_at(
        &self,
        parent_id: Option<&str>,
        placement: Placement,
        payload: Value,
    ) -> TreeResult<TreeNode> {
        self.insert_one(InsertSpec {
            id: None,
            parent_id: parent_id.map(str::to_string),
            placement,
            payload,
        })
        .await
    }

    async fn insert_one(&self, spec: InsertSpec) -> TreeResult<TreeNode> {
        let mut tx = self.begin("insert").await?;
        let result = insert_in(tx.as_mut(), spec).await;
        let node = finish(tx, result, "insert").await?;

        self.emit(TreeEvent::inserted(
            &self.forest,
            &node.id,
            node.parent_id.as_deref(),
        ));
        Ok(node)
    }

    //
    // MOVE
    //

    /// Move `node_id` (with its subtree) under `new_parent_id`, directly after
    /// `after_sibling_id` or last among the new siblings
    ///
    /// Moving a node into the slot it already occupies writes nothing.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the node, the new parent or the sibling is absent
    /// - `CyclicMove` if the new parent is the node or one of its descendants
    /// - `InvalidSibling` if the sibling is not a child of the new parent
    pub async fn move_node(
        &self,
        node_id: &str,
        new_parent_id: Option<&str>,
        after_sibling_id: Option<&str>,
    ) -> TreeResult<()> {
        self.move_to(node_id, new_parent_id, Placement::after(after_sibling_id))
            .await
    }

    /// Move with an explicit `Placement`
    pub async fn move_to(
        &self,
        node_id: &str,
        new_parent_id: Option<&str>,
        placement: Placement,
    ) -> TreeResult<()> {
        let spec = MoveSpec {
            node_id: node_id.to_string(),
            new_parent_id: new_parent_id.map(str::to_string),
            placement,
        };

        let mut tx = self.begin("move").await?;
        let result = move_in(tx.as_mut(), &spec).await;
        let event = finish(tx, result, "move").await?;

        if let Some(event) = event {
            self.emit(event);
        }
        Ok(())
    }

    //
    // DELETE
    //

    /// Delete a node
    ///
    /// `Cascade` removes the whole subtree. `ReparentChildren` removes only the
    /// node; its children take its place under its former parent (or become
    /// roots), keeping their relative order.
    ///
    /// Returns the ids of the removed rows.
    pub async fn delete(&self, node_id: &str, mode: DeleteMode) -> TreeResult<Vec<String>> {
        let mut tx = self.begin("delete").await?;
        let result = delete_in(tx.as_mut(), node_id, mode).await;
        let (deleted, reparented) = finish(tx, result, "delete").await?;

        self.emit(TreeEvent::deleted(
            &self.forest,
            deleted.clone(),
            reparented,
        ));
        Ok(deleted)
    }

    //
    // SWAP
    //

    /// Exchange the places of two siblings
    ///
    /// Both the `ordering` values and the subtrees' ranges are exchanged, so
    /// left-bound order keeps matching sibling order.
    ///
    /// # Errors
    ///
    /// - `NotFound` if either node is absent
    /// - `NotSiblings` if they have different parents
    ///
    /// Swapping an existing node with itself changes nothing and publishes no
    /// event.
    pub async fn swap_sibling_positions(&self, first_id: &str, second_id: &str) -> TreeResult<()> {
        let mut tx = self.begin("swap").await?;
        let result = swap_in(tx.as_mut(), first_id, second_id).await;
        let swapped = finish(tx, result, "swap").await?;

        if swapped {
            self.emit(TreeEvent::swapped(&self.forest, first_id, second_id));
        }
        Ok(())
    }

    //
    // BATCHES
    //

    /// Apply several moves in one transaction
    ///
    /// The batch is rejected with `ConflictingBatch` before any write when:
    /// - the same node appears twice
    /// - two moved nodes are in ancestor/descendant relation
    /// - a target parent or anchor sibling is (or lies inside) a subtree that
    ///   a later spec moves
    ///
    /// Specs then run in order, each seeing the previous ones' writes; any
    /// failure aborts the whole batch.
    pub async fn batch_move(&self, specs: Vec<MoveSpec>) -> TreeResult<()> {
        if specs.is_empty() {
            return Ok(());
        }

        let mut tx = self.begin("batch_move").await?;
        let result = batch_move_in(tx.as_mut(), &specs).await;
        let events = finish(tx, result, "batch_move").await?;

        tracing::debug!(
            "Batch of {} moves committed on '{}' ({} changed)",
            specs.len(),
            self.forest,
            events.len()
        );
        for event in events {
            self.emit(event);
        }
        Ok(())
    }

    /// Apply several inserts in one transaction, returning ids in spec order
    ///
    /// The batch is rejected with `ConflictingBatch` before any write when:
    /// - two specs carry the same explicit id
    /// - two specs target the same `(parent, First)` or `(parent, After(x))` slot
    /// - a spec's parent or anchor is an id that a later spec creates
    ///
    /// A spec may reference ids created by earlier specs.
    pub async fn batch_insert_between(&self, specs: Vec<InsertSpec>) -> TreeResult<Vec<String>> {
        check_insert_batch(&specs)?;
        if specs.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.begin("batch_insert").await?;
        let result = batch_insert_in(tx.as_mut(), specs).await;
        let nodes = finish(tx, result, "batch_insert").await?;

        for node in &nodes {
            self.emit(TreeEvent::inserted(
                &self.forest,
                &node.id,
                node.parent_id.as_deref(),
            ));
        }
        Ok(nodes.into_iter().map(|n| n.id).collect())
    }

    //
    // PAYLOAD
    //

    /// Replace a node's payload; positional fields are untouched
    pub async fn update_payload(&self, node_id: &str, payload: Value) -> TreeResult<()> {
        let mut tx = self.begin("update_payload").await?;
        let result = update_payload_in(tx.as_mut(), node_id, &payload).await;
        finish(tx, result, "update_payload").await?;

        self.emit(TreeEvent::payload_updated(&self.forest, node_id));
        Ok(())
    }
}

async fn require_node(
    tx: &mut dyn NodeTransaction,
    id: &str,
    operation: &str,
) -> TreeResult<TreeNode> {
    tx.get_node(id)
        .await
        .or_storage(operation)?
        .ok_or_else(|| TreeError::not_found(id))
}

/// Resolve a `Placement` under `parent` into allocator terms.
///
/// `moving` is excluded from the sibling count so a node moved within its own
/// parent does not count itself.
async fn resolve_slot(
    tx: &mut dyn NodeTransaction,
    parent: Option<&TreeNode>,
    placement: &Placement,
    moving: Option<&TreeNode>,
    operation: &str,
) -> TreeResult<SiblingSlot> {
    let parent_id = parent.map(|p| p.id.as_str());

    match placement {
        Placement::First => Ok(SiblingSlot::First),
        Placement::Last => {
            let siblings = tx
                .scan_range(NodeScan::Children(parent_id.map(str::to_string)))
                .await
                .or_storage(operation)?;
            let child_count = siblings
                .iter()
                .filter(|s| moving.map_or(true, |m| m.id != s.id))
                .count() as i64;
            let forest_end = tx.max_right().await.or_storage(operation)?;
            Ok(SiblingSlot::Last {
                child_count,
                forest_end,
            })
        }
        Placement::After(sibling_id) => {
            let sibling = require_node(tx, sibling_id, operation).await?;
            if sibling.parent_id.as_deref() != parent_id {
                return Err(TreeError::invalid_sibling(sibling_id.clone(), parent_id));
            }
            Ok(SiblingSlot::After {
                bounds: sibling.bounds(),
                ordering: sibling.ordering,
            })
        }
    }
}

async fn insert_in(tx: &mut dyn NodeTransaction, spec: InsertSpec) -> TreeResult<TreeNode> {
    let id = match spec.id {
        Some(id) => {
            if tx.get_node(&id).await.or_storage("insert")?.is_some() {
                return Err(TreeError::duplicate_id(id));
            }
            id
        }
        None => TreeNode::generate_id(),
    };

    let parent = match spec.parent_id.as_deref() {
        Some(parent_id) => Some(
            tx.get_node(parent_id)
                .await
                .or_storage("insert")?
                .ok_or_else(|| TreeError::invalid_parent(parent_id))?,
        ),
        None => None,
    };

    let slot = resolve_slot(tx, parent.as_ref(), &spec.placement, None, "insert").await?;
    let plan = PositionAllocator::plan_insert(
        spec.parent_id.as_deref(),
        parent.as_ref().map(TreeNode::bounds),
        slot,
        PositionAllocator::NODE_WIDTH,
    );
    tracing::debug!("Insert plan for '{}' on '{}': {:?}", id, tx.forest(), plan);

    if let Some(shift) = plan.shift {
        tx.apply_shift(shift).await.or_storage("insert")?;
    }
    if let Some(shift) = &plan.ordering_shift {
        tx.shift_ordering(shift).await.or_storage("insert")?;
    }

    let node = TreeNode::new(id, spec.parent_id, spec.payload).with_bounds(plan.bounds, plan.ordering);
    tx.insert_node(&node).await.or_storage("insert")?;
    Ok(node)
}

/// Returns the event to publish, or `None` when the move was a no-op
async fn move_in(tx: &mut dyn NodeTransaction, spec: &MoveSpec) -> TreeResult<Option<TreeEvent>> {
    let node = require_node(tx, &spec.node_id, "move").await?;

    let new_parent = match spec.new_parent_id.as_deref() {
        Some(parent_id) if parent_id == node.id => {
            return Err(TreeError::cyclic_move(&node.id, parent_id));
        }
        Some(parent_id) => {
            let parent = require_node(tx, parent_id, "move").await?;
            if node.bounds().contains(&parent.bounds()) {
                return Err(TreeError::cyclic_move(&node.id, parent_id));
            }
            Some(parent)
        }
        None => None,
    };

    let slot = resolve_slot(tx, new_parent.as_ref(), &spec.placement, Some(&node), "move").await?;

    let plan = match PositionAllocator::plan_move(&node, new_parent.as_ref(), slot) {
        MovePlan::NoOp => {
            tracing::debug!("Move of '{}' on '{}' is a no-op", node.id, tx.forest());
            return Ok(None);
        }
        MovePlan::Relocate(plan) => plan,
    };
    tracing::debug!("Move plan for '{}' on '{}': {:?}", node.id, tx.forest(), plan);

    tx.apply_shift(plan.open).await.or_storage("move")?;
    tx.translate_range(plan.translate).await.or_storage("move")?;
    tx.apply_shift(plan.close).await.or_storage("move")?;
    if let Some(shift) = &plan.remove_ordering {
        tx.shift_ordering(shift).await.or_storage("move")?;
    }
    if let Some(shift) = &plan.insert_ordering {
        tx.shift_ordering(shift).await.or_storage("move")?;
    }
    tx.update_link(&node.id, spec.new_parent_id.as_deref(), plan.new_ordering)
        .await
        .or_storage("move")?;

    Ok(Some(TreeEvent::moved(
        tx.forest(),
        &node.id,
        node.parent_id.as_deref(),
        spec.new_parent_id.as_deref(),
    )))
}

/// Returns `(deleted ids, reparented child ids)`
async fn delete_in(
    tx: &mut dyn NodeTransaction,
    node_id: &str,
    mode: DeleteMode,
) -> TreeResult<(Vec<String>, Vec<String>)> {
    let node = require_node(tx, node_id, "delete").await?;
    let bounds = node.bounds();

    match mode {
        DeleteMode::Cascade => {
            let doomed: Vec<String> = tx
                .scan_range(NodeScan::Subtree {
                    left: bounds.left,
                    right: bounds.right,
                })
                .await
                .or_storage("delete")?
                .into_iter()
                .map(|n| n.id)
                .collect();

            let plan = PositionAllocator::plan_remove(&node, &[], true);
            tracing::debug!("Cascade delete plan for '{}': {:?}", node.id, plan);

            tx.delete_range(plan.delete_from, plan.delete_to)
                .await
                .or_storage("delete")?;
            tx.apply_shift(plan.close).await.or_storage("delete")?;
            if let Some(shift) = &plan.sibling_ordering {
                tx.shift_ordering(shift).await.or_storage("delete")?;
            }

            Ok((doomed, Vec::new()))
        }
        DeleteMode::ReparentChildren => {
            let children = tx
                .scan_range(NodeScan::Children(Some(node.id.clone())))
                .await
                .or_storage("delete")?;

            let plan = PositionAllocator::plan_remove(&node, &children, false);
            tracing::debug!("Reparent delete plan for '{}': {:?}", node.id, plan);

            // Later siblings make room while the children are still
            // distinguishable from them
            if let Some(shift) = &plan.sibling_ordering {
                tx.shift_ordering(shift).await.or_storage("delete")?;
            }
            tx.reparent_children(&node.id, node.parent_id.as_deref())
                .await
                .or_storage("delete")?;
            for (child_id, ordering) in &plan.child_orderings {
                tx.update_link(child_id, node.parent_id.as_deref(), *ordering)
                    .await
                    .or_storage("delete")?;
            }

            tx.delete_range(plan.delete_from, plan.delete_to)
                .await
                .or_storage("delete")?;
            if let Some(lift) = plan.lift {
                tx.translate_range(lift).await.or_storage("delete")?;
            }
            tx.apply_shift(plan.close).await.or_storage("delete")?;

            let children = children.into_iter().map(|n| n.id).collect();
            Ok((vec![node.id], children))
        }
    }
}

/// Returns whether anything was exchanged
async fn swap_in(
    tx: &mut dyn NodeTransaction,
    first_id: &str,
    second_id: &str,
) -> TreeResult<bool> {
    let first = require_node(tx, first_id, "swap").await?;
    if first_id == second_id {
        return Ok(false);
    }
    let second = require_node(tx, second_id, "swap").await?;

    if first.parent_id != second.parent_id {
        return Err(TreeError::not_siblings(first_id, second_id));
    }

    let forest_end = tx.max_right().await.or_storage("swap")?;
    let plan = PositionAllocator::plan_swap(&first, &second, forest_end);
    tracing::debug!("Swap plan for '{}' <-> '{}': {:?}", first_id, second_id, plan);

    for translate in &plan.translates {
        tx.translate_range(*translate).await.or_storage("swap")?;
    }
    for (id, ordering) in &plan.orderings {
        tx.update_link(id, first.parent_id.as_deref(), *ordering)
            .await
            .or_storage("swap")?;
    }
    Ok(true)
}

async fn update_payload_in(
    tx: &mut dyn NodeTransaction,
    node_id: &str,
    payload: &Value,
) -> TreeResult<()> {
    require_node(tx, node_id, "update_payload").await?;
    tx.update_payload(node_id, payload)
        .await
        .or_storage("update_payload")
}

/// Reject move batches whose outcome would depend on application order
async fn check_move_batch(tx: &mut dyn NodeTransaction, specs: &[MoveSpec]) -> TreeResult<()> {
    let mut seen = HashSet::new();
    for spec in specs {
        if !seen.insert(spec.node_id.as_str()) {
            return Err(TreeError::conflicting_batch(format!(
                "node '{}' is moved more than once",
                spec.node_id
            )));
        }
    }

    let mut moved = Vec::with_capacity(specs.len());
    for spec in specs {
        moved.push(require_node(tx, &spec.node_id, "batch_move").await?);
    }

    for (i, a) in moved.iter().enumerate() {
        for b in &moved[i + 1..] {
            if a.bounds().covers(&b.bounds()) || b.bounds().covers(&a.bounds()) {
                return Err(TreeError::conflicting_batch(format!(
                    "'{}' and '{}' are in the same subtree",
                    a.id, b.id
                )));
            }
        }
    }

    for (i, spec) in specs.iter().enumerate() {
        let targets = spec
            .new_parent_id
            .as_deref()
            .into_iter()
            .chain(spec.placement.anchor());

        for target_id in targets {
            // Missing targets surface as NotFound when that move runs
            let Some(target) = tx.get_node(target_id).await.or_storage("batch_move")? else {
                continue;
            };
            for other in &moved[i + 1..] {
                if other.bounds().covers(&target.bounds()) {
                    return Err(TreeError::conflicting_batch(format!(
                        "target '{}' of the move of '{}' lies in the subtree of '{}', which a later move relocates",
                        target_id, spec.node_id, other.id
                    )));
                }
            }
        }
    }

    Ok(())
}

async fn batch_move_in(
    tx: &mut dyn NodeTransaction,
    specs: &[MoveSpec],
) -> TreeResult<Vec<TreeEvent>> {
    check_move_batch(tx, specs).await?;

    let mut events = Vec::new();
    for spec in specs {
        if let Some(event) = move_in(tx, spec).await? {
            events.push(event);
        }
    }
    Ok(events)
}

/// Static conflict rules for insert batches (no store access needed)
fn check_insert_batch(specs: &[InsertSpec]) -> TreeResult<()> {
    let mut created_at = std::collections::HashMap::new();
    for (index, spec) in specs.iter().enumerate() {
        if let Some(id) = &spec.id {
            if created_at.insert(id.as_str(), index).is_some() {
                return Err(TreeError::conflicting_batch(format!(
                    "id '{}' is inserted more than once",
                    id
                )));
            }
        }
    }

    let mut slots = HashSet::new();
    for spec in specs {
        let slot = match &spec.placement {
            Placement::Last => continue,
            Placement::First => (spec.parent_id.as_deref(), None),
            Placement::After(anchor) => (spec.parent_id.as_deref(), Some(anchor.as_str())),
        };
        if !slots.insert(slot) {
            return Err(TreeError::conflicting_batch(format!(
                "two inserts target the same slot under {}",
                spec.parent_id
                    .as_deref()
                    .map(|p| format!("'{}'", p))
                    .unwrap_or_else(|| "the forest root".to_string())
            )));
        }
    }

    for (index, spec) in specs.iter().enumerate() {
        let references = spec.parent_id.as_deref().into_iter().chain(spec.placement.anchor());
        for reference in references {
            if let Some(&creator) = created_at.get(reference) {
                if creator >= index {
                    return Err(TreeError::conflicting_batch(format!(
                        "'{}' is referenced before the insert that creates it",
                        reference
                    )));
                }
            }
        }
    }

    Ok(())
}

async fn batch_insert_in(
    tx: &mut dyn NodeTransaction,
    specs: Vec<InsertSpec>,
) -> TreeResult<Vec<TreeNode>> {
    let mut nodes = Vec::with_capacity(specs.len());
    for spec in specs {
        nodes.push(insert_in(tx, spec).await?);
    }
    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use serde_json::json;
    use std::time::Duration;

    async fn create_test_mutator() -> (TreeMutator, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let forest = ForestId::new("organizations").unwrap();
        store.ensure_forest(&forest).await.unwrap();
        let mutator = TreeMutator::new(store.clone(), forest, TreeConfig::default());
        (mutator, store)
    }

    async fn node(store: &MemoryStore, id: &str) -> TreeNode {
        store
            .get_node(&ForestId::new("organizations").unwrap(), id)
            .await
            .unwrap()
            .unwrap()
    }

    async fn child_ids(store: &MemoryStore, parent: Option<&str>) -> Vec<String> {
        store
            .scan_range(
                &ForestId::new("organizations").unwrap(),
                NodeScan::Children(parent.map(str::to_string)),
            )
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.id)
            .collect()
    }

    /// root -> a -> {a1, a2}, root -> b
    async fn sample_tree(mutator: &TreeMutator) {
        mutator.insert_with_id("root", None, None, json!({})).await.unwrap();
        mutator.insert_with_id("a", Some("root"), None, json!({})).await.unwrap();
        mutator.insert_with_id("a1", Some("a"), None, json!({})).await.unwrap();
        mutator.insert_with_id("a2", Some("a"), Some("a1"), json!({})).await.unwrap();
        mutator.insert_with_id("b", Some("root"), Some("a"), json!({})).await.unwrap();
    }

    #[tokio::test]
    async fn test_insert_three_children() {
        let (mutator, store) = create_test_mutator().await;

        let root = mutator.insert(None, None, json!({"name": "root"})).await.unwrap();
        let r = node(&store, &root).await;
        assert_eq!((r.left, r.right, r.depth), (1, 2, 0));

        let c1 = mutator.insert(Some(&root), None, json!({})).await.unwrap();
        let c2 = mutator.insert(Some(&root), Some(&c1), json!({})).await.unwrap();

        assert_eq!(child_ids(&store, Some(&root)).await, vec![c1.clone(), c2.clone()]);
        assert_eq!(node(&store, &root).await.right, 6);
        assert_eq!(node(&store, &c2).await.ordering, 1);
    }

    #[tokio::test]
    async fn test_insert_first_and_between() {
        let (mutator, store) = create_test_mutator().await;
        sample_tree(&mutator).await;

        let first = mutator
            .insert_at(Some("a"), Placement::First, json!({}))
            .await
            .unwrap();
        assert_eq!(first.ordering, 0);
        assert_eq!(first.left, node(&store, "a").await.left + 1);

        mutator
            .insert_with_id("mid", Some("a"), Some("a1"), json!({}))
            .await
            .unwrap();

        assert_eq!(
            child_ids(&store, Some("a")).await,
            vec![first.id.clone(), "a1".into(), "mid".into(), "a2".into()]
        );
        assert_eq!(node(&store, "a2").await.ordering, 3);
    }

    #[tokio::test]
    async fn test_insert_preconditions() {
        let (mutator, _store) = create_test_mutator().await;
        sample_tree(&mutator).await;

        let err = mutator.insert(Some("ghost"), None, json!({})).await.unwrap_err();
        assert!(matches!(err, TreeError::InvalidParent { .. }));

        let err = mutator.insert(Some("root"), Some("a1"), json!({})).await.unwrap_err();
        assert!(matches!(err, TreeError::InvalidSibling { .. }));

        let err = mutator.insert(Some("root"), Some("ghost"), json!({})).await.unwrap_err();
        assert!(matches!(err, TreeError::NotFound { .. }));

        let err = mutator
            .insert_with_id("a", None, None, json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, TreeError::DuplicateId { .. }));
    }

    #[tokio::test]
    async fn test_move_subtree() {
        let (mutator, store) = create_test_mutator().await;
        sample_tree(&mutator).await;
        let root_width = node(&store, "root").await.bounds().width();
        let old_a1_depth = node(&store, "a1").await.depth;

        mutator.move_node("a", Some("b"), None).await.unwrap();

        assert_eq!(child_ids(&store, Some("b")).await, vec!["a".to_string()]);
        let a = node(&store, "a").await;
        let a1 = node(&store, "a1").await;
        let b = node(&store, "b").await;
        assert_eq!(a1.depth, a.depth + 1);
        assert_eq!(a1.depth, old_a1_depth + 1);
        assert!(b.bounds().contains(&a1.bounds()));
        assert_eq!(node(&store, "root").await.bounds().width(), root_width);
        assert_eq!(node(&store, "b").await.ordering, 0);
    }

    #[tokio::test]
    async fn test_move_rejects_cycles() {
        let (mutator, _store) = create_test_mutator().await;
        sample_tree(&mutator).await;

        for target in ["a", "a1", "a2"] {
            let err = mutator.move_node("a", Some(target), None).await.unwrap_err();
            assert!(matches!(err, TreeError::CyclicMove { .. }), "target {target}");
        }
    }

    #[tokio::test]
    async fn test_move_into_current_slot_is_noop() {
        let (mutator, store) = create_test_mutator().await;
        sample_tree(&mutator).await;
        let mut events = mutator.subscribe();
        let before = node(&store, "a2").await;

        mutator.move_node("a2", Some("a"), Some("a1")).await.unwrap();
        mutator.move_node("a2", Some("a"), None).await.unwrap();

        assert_eq!(node(&store, "a2").await, before);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_reorder_within_parent() {
        let (mutator, store) = create_test_mutator().await;
        sample_tree(&mutator).await;

        mutator.move_to("a2", Some("a"), Placement::First).await.unwrap();
        assert_eq!(child_ids(&store, Some("a")).await, vec!["a2", "a1"]);
        assert_eq!(node(&store, "a1").await.ordering, 1);

        mutator.move_node("a2", Some("a"), Some("a1")).await.unwrap();
        assert_eq!(child_ids(&store, Some("a")).await, vec!["a1", "a2"]);
    }

    #[tokio::test]
    async fn test_delete_with_reparent() {
        let (mutator, store) = create_test_mutator().await;
        sample_tree(&mutator).await;

        let deleted = mutator
            .delete("a", DeleteMode::ReparentChildren)
            .await
            .unwrap();
        assert_eq!(deleted, vec!["a".to_string()]);

        assert_eq!(child_ids(&store, Some("root")).await, vec!["a1", "a2", "b"]);
        let a1 = node(&store, "a1").await;
        assert_eq!((a1.left, a1.right, a1.depth, a1.ordering), (2, 3, 1, 0));
        assert_eq!(node(&store, "b").await.ordering, 2);
        assert_eq!(node(&store, "root").await.right, 8);
    }

    #[tokio::test]
    async fn test_delete_with_reparent_renumbers_gapped_children() {
        let (mutator, store) = create_test_mutator().await;
        sample_tree(&mutator).await;

        let mut a2 = node(&store, "a2").await;
        a2.ordering = 5;
        store.overwrite_row(mutator.forest(), a2).unwrap();

        mutator
            .delete("a", DeleteMode::ReparentChildren)
            .await
            .unwrap();

        let orderings: Vec<(String, i64)> = store
            .scan_range(mutator.forest(), NodeScan::Children(Some("root".to_string())))
            .await
            .unwrap()
            .into_iter()
            .map(|n| (n.id, n.ordering))
            .collect();
        assert_eq!(
            orderings,
            vec![
                ("a1".to_string(), 0),
                ("a2".to_string(), 1),
                ("b".to_string(), 2)
            ]
        );
    }

    #[tokio::test]
    async fn test_delete_root_promotes_children() {
        let (mutator, store) = create_test_mutator().await;
        sample_tree(&mutator).await;
        mutator.insert_with_id("z", None, None, json!({})).await.unwrap();

        mutator
            .delete("root", DeleteMode::ReparentChildren)
            .await
            .unwrap();

        assert_eq!(child_ids(&store, None).await, vec!["a", "b", "z"]);
        assert_eq!(node(&store, "a").await.depth, 0);
        assert_eq!(node(&store, "a1").await.depth, 1);
    }

    #[tokio::test]
    async fn test_cascade_delete() {
        let (mutator, store) = create_test_mutator().await;
        sample_tree(&mutator).await;
        let mut events = mutator.subscribe();

        let mut deleted = mutator.delete("a", DeleteMode::Cascade).await.unwrap();
        deleted.sort();
        assert_eq!(deleted, vec!["a", "a1", "a2"]);

        let b = node(&store, "b").await;
        assert_eq!((b.left, b.right, b.ordering), (2, 3, 0));
        assert_eq!(node(&store, "root").await.right, 4);
        assert!(matches!(
            events.try_recv().unwrap(),
            TreeEvent::NodesDeleted { .. }
        ));
    }

    #[tokio::test]
    async fn test_swap_exchanges_order_and_ranges() {
        let (mutator, store) = create_test_mutator().await;
        sample_tree(&mutator).await;

        mutator.swap_sibling_positions("a", "b").await.unwrap();

        assert_eq!(child_ids(&store, Some("root")).await, vec!["b", "a"]);
        let a = node(&store, "a").await;
        let b = node(&store, "b").await;
        assert_eq!((b.left, b.right), (2, 3));
        assert_eq!((a.left, a.right), (4, 9));
        assert!(a.bounds().contains(&node(&store, "a1").await.bounds()));

        let err = mutator.swap_sibling_positions("a", "a1").await.unwrap_err();
        assert!(matches!(err, TreeError::NotSiblings { .. }));
    }

    #[tokio::test]
    async fn test_swap_with_itself_needs_an_existing_node() {
        let (mutator, store) = create_test_mutator().await;
        sample_tree(&mutator).await;
        let mut events = mutator.subscribe();

        let err = mutator
            .swap_sibling_positions("ghost", "ghost")
            .await
            .unwrap_err();
        assert!(matches!(err, TreeError::NotFound { .. }));

        mutator.swap_sibling_positions("a", "a").await.unwrap();
        assert_eq!(child_ids(&store, Some("root")).await, vec!["a", "b"]);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_update_payload_keeps_positions() {
        let (mutator, store) = create_test_mutator().await;
        sample_tree(&mutator).await;
        let before = node(&store, "a").await;

        mutator
            .update_payload("a", json!({"name": "Renamed"}))
            .await
            .unwrap();

        let after = node(&store, "a").await;
        assert_eq!(after.payload, json!({"name": "Renamed"}));
        assert_eq!(after.bounds(), before.bounds());

        let err = mutator.update_payload("ghost", json!({})).await.unwrap_err();
        assert!(matches!(err, TreeError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_batch_move_conflicts() {
        let (mutator, store) = create_test_mutator().await;
        sample_tree(&mutator).await;

        let twice = vec![
            MoveSpec::new("a1", Some("b"), None),
            MoveSpec::new("a1", None, None),
        ];
        assert!(matches!(
            mutator.batch_move(twice).await,
            Err(TreeError::ConflictingBatch { .. })
        ));

        let nested = vec![
            MoveSpec::new("a", None, None),
            MoveSpec::new("a1", Some("b"), None),
        ];
        assert!(matches!(
            mutator.batch_move(nested).await,
            Err(TreeError::ConflictingBatch { .. })
        ));

        let into_moved = vec![
            MoveSpec::new("b", Some("a1"), None),
            MoveSpec::new("a", None, None),
        ];
        assert!(matches!(
            mutator.batch_move(into_moved).await,
            Err(TreeError::ConflictingBatch { .. })
        ));

        // nothing was written
        assert_eq!(child_ids(&store, Some("root")).await, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_batch_move_applies_sequentially() {
        let (mutator, store) = create_test_mutator().await;
        sample_tree(&mutator).await;

        mutator
            .batch_move(vec![
                MoveSpec::new("a1", Some("b"), None),
                MoveSpec::new("a2", Some("b"), Some("a1")),
            ])
            .await
            .unwrap();

        assert_eq!(child_ids(&store, Some("b")).await, vec!["a1", "a2"]);
        assert!(node(&store, "a").await.bounds().is_leaf());
    }

    #[tokio::test]
    async fn test_batch_move_failure_rolls_back() {
        let (mutator, store) = create_test_mutator().await;
        sample_tree(&mutator).await;

        let result = mutator
            .batch_move(vec![
                MoveSpec::new("a1", Some("b"), None),
                MoveSpec::new("a2", Some("ghost"), None),
            ])
            .await;
        assert!(matches!(result, Err(TreeError::NotFound { .. })));
        assert_eq!(child_ids(&store, Some("a")).await, vec!["a1", "a2"]);
    }

    #[tokio::test]
    async fn test_batch_insert_between() {
        let (mutator, store) = create_test_mutator().await;
        sample_tree(&mutator).await;

        let ids = mutator
            .batch_insert_between(vec![
                InsertSpec::new(Some("root"), Some("a"), json!({})).with_id("x"),
                InsertSpec::new(Some("x"), None, json!({})),
                InsertSpec::new(Some("root"), Some("x"), json!({})).with_id("y"),
            ])
            .await
            .unwrap();

        assert_eq!(ids.len(), 3);
        assert_eq!(ids[0], "x");
        assert_eq!(child_ids(&store, Some("root")).await, vec!["a", "x", "y", "b"]);
        assert_eq!(child_ids(&store, Some("x")).await, vec![ids[1].clone()]);
    }

    #[test]
    fn test_insert_batch_conflicts() {
        let same_slot = vec![
            InsertSpec::new(Some("root"), Some("a"), json!({})),
            InsertSpec::new(Some("root"), Some("a"), json!({})),
        ];
        assert!(check_insert_batch(&same_slot).is_err());

        let forward_reference = vec![
            InsertSpec::new(Some("later"), None, json!({})),
            InsertSpec::new(None, None, json!({})).with_id("later"),
        ];
        assert!(check_insert_batch(&forward_reference).is_err());

        let duplicate = vec![
            InsertSpec::new(None, None, json!({})).with_id("x"),
            InsertSpec::new(None, None, json!({})).with_id("x"),
        ];
        assert!(check_insert_batch(&duplicate).is_err());

        let appends = vec![
            InsertSpec::new(Some("root"), None, json!({})),
            InsertSpec::new(Some("root"), None, json!({})),
        ];
        assert!(check_insert_batch(&appends).is_ok());
    }

    #[tokio::test]
    async fn test_busy_when_lock_held() {
        let (mutator, store) = create_test_mutator().await;
        sample_tree(&mutator).await;

        let _held = store
            .begin(mutator.forest(), Instant::now() + Duration::from_secs(5))
            .await
            .unwrap();

        let impatient = mutator.with_deadline(Instant::now() + Duration::from_millis(30));
        let err = impatient.insert(None, None, json!({})).await.unwrap_err();
        assert!(matches!(err, TreeError::Busy { .. }));
    }

    #[tokio::test]
    async fn test_elapsed_deadline_times_out() {
        let (mutator, _store) = create_test_mutator().await;
        let expired = mutator.with_deadline(Instant::now() - Duration::from_millis(1));
        let err = expired.insert(None, None, json!({})).await.unwrap_err();
        assert!(matches!(err, TreeError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_events_follow_commits() {
        let (mutator, _store) = create_test_mutator().await;
        let mut events = mutator.subscribe();

        let root = mutator.insert(None, None, json!({})).await.unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            TreeEvent::inserted(mutator.forest(), &root, None)
        );

        let _ = mutator.insert(Some("ghost"), None, json!({})).await;
        assert!(events.try_recv().is_err());
    }
}
