//! End-to-end forest scenarios against the libsql backend
//!
//! Every test opens its own database file in a temp directory, drives the
//! engine through `Forest`, and checks both the resulting positions and that
//! the auditor finds nothing wrong.

use anyhow::Result;
use hierarchy_core::config::TreeConfig;
use hierarchy_core::db::{DatabaseService, NodeStore, NodeTransaction, TursoStore};
use hierarchy_core::models::{DeleteMode, MoveSpec, NodeBounds, ViolationKind};
use hierarchy_core::operations::TreeError;
use hierarchy_core::services::Forest;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::Instant;

/// Test helper: libsql-backed `organizations` forest in a fresh temp dir
async fn create_test_env(config: TreeConfig) -> Result<(Forest, Arc<TursoStore>, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db = DatabaseService::new(temp_dir.path().join("test.db")).await?;
    let store = Arc::new(TursoStore::new(Arc::new(db)));
    let forest = Forest::open_named(store.clone(), "organizations", config).await?;
    Ok((forest, store, temp_dir))
}

/// root -> a -> {a1, a2}, root -> b
async fn build_sample(forest: &Forest) -> Result<()> {
    let mutator = forest.mutator();
    for (id, parent, after) in [
        ("root", None, None),
        ("a", Some("root"), None),
        ("a1", Some("a"), None),
        ("a2", Some("a"), Some("a1")),
        ("b", Some("root"), Some("a")),
    ] {
        mutator
            .insert_with_id(id, parent, after, json!({ "name": id }))
            .await?;
    }
    Ok(())
}

async fn position(forest: &Forest, id: &str) -> Result<(NodeBounds, i64)> {
    let node = forest.reader().get_node(id).await?;
    Ok((node.bounds(), node.ordering))
}

async fn assert_sound(forest: &Forest) -> Result<()> {
    let violations = forest.auditor().validate(None).await?;
    assert!(violations.is_empty(), "unexpected violations: {:?}", violations);
    Ok(())
}

#[tokio::test]
async fn test_insert_three_children() -> Result<()> {
    let (forest, _store, _temp_dir) = create_test_env(TreeConfig::default()).await?;
    let mutator = forest.mutator();

    let root = mutator.insert(None, None, json!({"name": "Acme"})).await?;
    let c1 = mutator.insert(Some(&root), None, json!({"name": "North"})).await?;
    let c2 = mutator.insert(Some(&root), Some(&c1), json!({"name": "South"})).await?;
    let c3 = mutator.insert(Some(&root), Some(&c2), json!({"name": "West"})).await?;

    assert_eq!(position(&forest, &root).await?, (NodeBounds::new(1, 8, 0), 0));
    assert_eq!(position(&forest, &c1).await?, (NodeBounds::new(2, 3, 1), 0));
    assert_eq!(position(&forest, &c2).await?, (NodeBounds::new(4, 5, 1), 1));
    assert_eq!(position(&forest, &c3).await?, (NodeBounds::new(6, 7, 1), 2));

    let names: Vec<String> = forest
        .reader()
        .get_children(&root)
        .await?
        .into_iter()
        .map(|n| n.payload["name"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(names, vec!["North", "South", "West"]);

    assert_sound(&forest).await
}

#[tokio::test]
async fn test_move_subtree_under_sibling() -> Result<()> {
    let (forest, _store, _temp_dir) = create_test_env(TreeConfig::default()).await?;
    build_sample(&forest).await?;

    forest.mutator().move_node("a", Some("b"), None).await?;

    assert_eq!(position(&forest, "root").await?, (NodeBounds::new(1, 10, 0), 0));
    assert_eq!(position(&forest, "b").await?, (NodeBounds::new(2, 9, 1), 0));
    assert_eq!(position(&forest, "a").await?, (NodeBounds::new(3, 8, 2), 0));
    assert_eq!(position(&forest, "a1").await?, (NodeBounds::new(4, 5, 3), 0));
    assert_eq!(position(&forest, "a2").await?, (NodeBounds::new(6, 7, 3), 1));

    let err = forest
        .mutator()
        .move_node("b", Some("a1"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, TreeError::CyclicMove { .. }));

    assert_sound(&forest).await
}

#[tokio::test]
async fn test_delete_reparents_children() -> Result<()> {
    let (forest, _store, _temp_dir) = create_test_env(TreeConfig::default()).await?;
    build_sample(&forest).await?;

    let removed = forest
        .mutator()
        .delete("a", DeleteMode::ReparentChildren)
        .await?;
    assert_eq!(removed, vec!["a".to_string()]);

    assert_eq!(position(&forest, "root").await?, (NodeBounds::new(1, 8, 0), 0));
    assert_eq!(position(&forest, "a1").await?, (NodeBounds::new(2, 3, 1), 0));
    assert_eq!(position(&forest, "a2").await?, (NodeBounds::new(4, 5, 1), 1));
    assert_eq!(position(&forest, "b").await?, (NodeBounds::new(6, 7, 1), 2));
    assert_eq!(
        forest.reader().get_node("a1").await?.parent_id.as_deref(),
        Some("root")
    );

    assert_sound(&forest).await
}

#[tokio::test]
async fn test_delete_reparents_children_with_ordering_gaps() -> Result<()> {
    let (forest, store, _temp_dir) = create_test_env(TreeConfig::default()).await?;
    build_sample(&forest).await?;

    // Orderings with a gap are tolerated by validate
    let conn = store.database().connect()?;
    conn.execute(
        "UPDATE organizations SET ordering = ?1 WHERE id = ?2",
        libsql::params![5i64, "a2"],
    )
    .await?;
    assert_sound(&forest).await?;

    forest
        .mutator()
        .delete("a", DeleteMode::ReparentChildren)
        .await?;

    assert_eq!(position(&forest, "a1").await?.1, 0);
    assert_eq!(position(&forest, "a2").await?.1, 1);
    assert_eq!(position(&forest, "b").await?.1, 2);
    assert_sound(&forest).await
}

#[tokio::test]
async fn test_corrupted_row_is_detected_and_rebuilt() -> Result<()> {
    let (forest, store, _temp_dir) = create_test_env(TreeConfig::default()).await?;
    build_sample(&forest).await?;

    // Push a1's right bound onto its sibling's left bound
    let conn = store.database().connect()?;
    conn.execute(
        "UPDATE organizations SET rgt = ?1 WHERE id = ?2",
        libsql::params![5i64, "a1"],
    )
    .await?;

    let violations = forest.auditor().validate(None).await?;
    assert_eq!(violations.len(), 1, "{:?}", violations);
    assert_eq!(violations[0].node_id, "a1");
    assert_eq!(violations[0].kind, ViolationKind::PartialOverlap);

    assert_eq!(forest.auditor().rebuild(None).await?, 5);
    assert_eq!(position(&forest, "a1").await?, (NodeBounds::new(3, 4, 2), 0));
    assert_sound(&forest).await
}

#[tokio::test]
async fn test_rebuild_round_trip_keeps_preorder() -> Result<()> {
    let (forest, _store, _temp_dir) = create_test_env(TreeConfig::default()).await?;
    build_sample(&forest).await?;
    forest.mutator().swap_sibling_positions("a", "b").await?;

    let before = forest.reader().get_tree().await?;
    forest.auditor().rebuild(None).await?;
    let after = forest.reader().get_tree().await?;

    assert_eq!(before, after);
    assert_sound(&forest).await
}

#[tokio::test]
async fn test_writer_waits_then_reports_busy() -> Result<()> {
    let config = TreeConfig::default().with_lock_timeout(Duration::from_millis(100));
    let (forest, store, _temp_dir) = create_test_env(config).await?;
    build_sample(&forest).await?;

    let held = store
        .begin(forest.id(), Instant::now() + Duration::from_secs(1))
        .await?;

    let err = forest
        .mutator()
        .insert(Some("root"), None, json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, TreeError::Busy { .. }), "got {:?}", err);

    held.rollback().await?;
    forest.mutator().insert(Some("root"), None, json!({})).await?;
    assert_sound(&forest).await
}

#[tokio::test]
async fn test_concurrent_writers_serialize() -> Result<()> {
    let (forest, _store, _temp_dir) = create_test_env(TreeConfig::default()).await?;
    let root = forest.mutator().insert(None, None, json!({})).await?;

    let mut handles = Vec::new();
    for i in 0..8 {
        let forest = forest.clone();
        let root = root.clone();
        handles.push(tokio::spawn(async move {
            forest
                .mutator()
                .insert(Some(&root), None, json!({ "n": i }))
                .await
        }));
    }
    for handle in handles {
        handle.await??;
    }

    let children = forest.reader().get_children(&root).await?;
    let orderings: Vec<i64> = children.iter().map(|c| c.ordering).collect();
    assert_eq!(orderings, (0..8).collect::<Vec<i64>>());
    assert_eq!(position(&forest, &root).await?.0, NodeBounds::new(1, 18, 0));
    assert_sound(&forest).await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reads_during_swaps_stay_consistent() -> Result<()> {
    let (forest, _store, _temp_dir) = create_test_env(TreeConfig::default()).await?;
    build_sample(&forest).await?;
    forest
        .mutator()
        .insert_with_id("b1", Some("b"), None, json!({}))
        .await?;

    let writer = {
        let forest = forest.clone();
        tokio::spawn(async move {
            for _ in 0..100 {
                forest.mutator().swap_sibling_positions("a", "b").await?;
            }
            Ok::<_, TreeError>(())
        })
    };

    let ids = |nodes: Vec<hierarchy_core::TreeNode>| {
        nodes.into_iter().map(|n| n.id).collect::<Vec<_>>()
    };
    let mut reads = 0;
    while !writer.is_finished() || reads == 0 {
        let reader = forest.reader();
        assert_eq!(ids(reader.get_descendants("a").await?), vec!["a1", "a2"]);
        assert_eq!(ids(reader.get_path("b1").await?), vec!["root", "b", "b1"]);
        assert_eq!(ids(reader.get_siblings("a").await?).len(), 1);
        reads += 1;
    }
    writer.await??;

    assert_sound(&forest).await
}

#[tokio::test]
async fn test_failed_batch_leaves_no_trace() -> Result<()> {
    let (forest, _store, _temp_dir) = create_test_env(TreeConfig::default()).await?;
    build_sample(&forest).await?;
    let before = forest.reader().get_tree().await?;

    // Second spec fails after the first one has already been applied
    let err = forest
        .mutator()
        .batch_move(vec![
            MoveSpec::new("b", Some("a"), None),
            MoveSpec::new("a2", Some("ghost"), None),
        ])
        .await
        .unwrap_err();
    assert!(err.is_precondition());

    assert_eq!(forest.reader().get_tree().await?, before);
    assert_sound(&forest).await
}
