//! Benchmarks for the forest engine's hot paths
//!
//! Run with: `cargo bench -p hierarchy-core`
//!
//! - Append-insert cost as a forest grows (every insert shifts the bounds
//!   to its right, so appends at the end are the cheap case and first-child
//!   inserts under the root the expensive one)
//! - Subtree move across a populated forest
//! - Whole-forest validate and rebuild

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use hierarchy_core::config::TreeConfig;
use hierarchy_core::db::{DatabaseService, MemoryStore, NodeStore, TursoStore};
use hierarchy_core::models::{ImportedNode, Placement};
use hierarchy_core::services::Forest;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::runtime::Runtime;

/// Fresh libsql-backed forest in a temp dir
async fn setup_turso_forest() -> (Forest, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db = DatabaseService::new(temp_dir.path().join("bench.db"))
        .await
        .unwrap();
    let store: Arc<dyn NodeStore> = Arc::new(TursoStore::new(Arc::new(db)));
    let forest = Forest::open_named(store, "organizations", TreeConfig::default())
        .await
        .unwrap();
    (forest, temp_dir)
}

async fn setup_memory_forest() -> Forest {
    let store: Arc<dyn NodeStore> = Arc::new(MemoryStore::new());
    Forest::open_named(store, "organizations", TreeConfig::default())
        .await
        .unwrap()
}

/// Balanced-ish forest: node i hangs under node (i - 1) / fanout
fn generate_rows(node_count: usize, fanout: usize) -> Vec<ImportedNode> {
    (0..node_count)
        .map(|i| ImportedNode {
            id: format!("n{}", i),
            parent_id: (i > 0).then(|| format!("n{}", (i - 1) / fanout)),
            ordering: i as i64,
            payload: json!({ "name": format!("Node {}", i) }),
        })
        .collect()
}

fn bench_inserts(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("insert");

    for &size in &[100usize, 1_000] {
        group.bench_with_input(BenchmarkId::new("append_last", size), &size, |b, &size| {
            let (forest, _temp) = rt.block_on(setup_turso_forest());
            rt.block_on(forest.auditor().seed(generate_rows(size, 8)))
                .unwrap();
            b.iter(|| {
                rt.block_on(forest.mutator().insert(Some("n0"), None, json!({})))
                    .unwrap()
            });
        });

        group.bench_with_input(BenchmarkId::new("first_child", size), &size, |b, &size| {
            let (forest, _temp) = rt.block_on(setup_turso_forest());
            rt.block_on(forest.auditor().seed(generate_rows(size, 8)))
                .unwrap();
            b.iter(|| {
                rt.block_on(
                    forest
                        .mutator()
                        .insert_at(Some("n0"), Placement::First, json!({})),
                )
                .unwrap()
            });
        });
    }

    group.finish();
}

fn bench_move(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let (forest, _temp) = rt.block_on(setup_turso_forest());
    rt.block_on(forest.auditor().seed(generate_rows(1_000, 8)))
        .unwrap();

    // Ping-pong one subtree between two parents
    let mut flip = false;
    c.bench_function("move_subtree", |b| {
        b.iter(|| {
            let target = if flip { "n2" } else { "n3" };
            flip = !flip;
            rt.block_on(forest.mutator().move_node("n9", Some(target), None))
                .unwrap()
        });
    });
}

fn bench_audit(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("audit");

    for &size in &[1_000usize, 10_000] {
        let forest = rt.block_on(setup_memory_forest());
        rt.block_on(forest.auditor().seed(generate_rows(size, 8)))
            .unwrap();

        group.bench_with_input(BenchmarkId::new("validate", size), &size, |b, _| {
            b.iter(|| black_box(rt.block_on(forest.auditor().validate(None)).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("rebuild", size), &size, |b, _| {
            b.iter(|| black_box(rt.block_on(forest.auditor().rebuild(None)).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_inserts, bench_move, bench_audit);
criterion_main!(benches);
