//! Bulk load benchmarks for the forest engine
//!
//! Run with: `cargo bench -p nodeforest-core`
//!
//! Compares two ways of loading the same flat category tree:
//! - Maintained inserts (every insert widens the tree)
//! - Deferred maintenance (placeholder inserts, then one rebuild)

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nodeforest_core::db::{DatabaseService, MemoryNodeStore, NodeStore, TursoStore};
use nodeforest_core::services::{MaintenanceContext, SequentialTreeIds, TreeMutator};
use nodeforest_core::TreeId;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::runtime::Runtime;

/// Insert a root plus `count` children, alternating between the root and the
/// previous child so the tree has some depth
async fn load(mutator: &TreeMutator, ctx: MaintenanceContext, count: usize) {
    let root = mutator.insert_root(ctx, 0, None).await.unwrap();
    let mut previous = root;
    for payload in 1..=count as i64 {
        let parent = if payload % 2 == 0 { previous } else { root };
        previous = mutator.insert_child(ctx, payload, parent).await.unwrap();
    }
    if !ctx.is_enabled() {
        black_box(mutator.rebuild(TreeId::FIRST).await.unwrap());
    }
}

fn memory_mutator() -> TreeMutator {
    TreeMutator::new(Arc::new(MemoryNodeStore::new()), Arc::new(SequentialTreeIds))
}

async fn turso_mutator() -> (TreeMutator, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db = DatabaseService::new(temp_dir.path().join("bench.db"))
        .await
        .unwrap();
    let store: Arc<dyn NodeStore> = Arc::new(TursoStore::new(Arc::new(db)));
    (TreeMutator::new(store, Arc::new(SequentialTreeIds)), temp_dir)
}

fn bench_memory_load(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("memory_load");

    for count in [100usize, 1000] {
        for (label, ctx) in [
            ("maintained", MaintenanceContext::enabled()),
            ("deferred", MaintenanceContext::disabled()),
        ] {
            group.bench_with_input(BenchmarkId::new(label, count), &count, |b, &count| {
                b.iter_custom(|iters| {
                    rt.block_on(async {
                        let mut total = Duration::ZERO;
                        for _ in 0..iters {
                            let mutator = memory_mutator();
                            let start = Instant::now();
                            load(&mutator, ctx, count).await;
                            total += start.elapsed();
                        }
                        total
                    })
                });
            });
        }
    }

    group.finish();
}

fn bench_turso_load(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("turso_load");
    group.sample_size(10); // Each sample opens a fresh database file

    for (label, ctx) in [
        ("maintained", MaintenanceContext::enabled()),
        ("deferred", MaintenanceContext::disabled()),
    ] {
        group.bench_function(label, |b| {
            b.iter_custom(|iters| {
                rt.block_on(async {
                    let mut total = Duration::ZERO;
                    for _ in 0..iters {
                        let (mutator, _temp) = turso_mutator().await;
                        let start = Instant::now();
                        load(&mutator, ctx, 200).await;
                        total += start.elapsed();
                    }
                    total
                })
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_memory_load, bench_turso_load);
criterion_main!(benches);
