//! Bulk write benchmarks against the in-memory store.

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use doctable::{BulkExecutor, DocumentStore, IndexModel, MemoryStore, WriteModel};
use bson::doc;

const COLLECTION: &str = "StockTable";

/// Fresh store with a unique index on `symbol`
fn keyed_store() -> MemoryStore {
    let store = MemoryStore::new();
    store
        .create_indexes(COLLECTION, &[IndexModel::new(doc! { "symbol": 1 }).unique()])
        .unwrap();
    store
}

/// `size` inserts where every `every`-th item repeats an earlier key
fn inserts(size: usize, every: Option<usize>) -> Vec<WriteModel> {
    (0..size)
        .map(|i| {
            let key = match every {
                Some(n) if i > 0 && i % n == 0 => i - 1,
                _ => i,
            };
            WriteModel::InsertOne {
                document: doc! { "symbol": format!("S{key}"), "volume": i as i64 },
            }
        })
        .collect()
}

fn bench_clean_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("bulk_clean");
    for size in [100usize, 1_000] {
        let models = inserts(size, None);
        group.bench_with_input(BenchmarkId::from_parameter(size), &models, |b, models| {
            b.iter_batched(
                keyed_store,
                |store| BulkExecutor::new(&store, COLLECTION).execute(models).unwrap(),
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_partial_failures(c: &mut Criterion) {
    let mut group = c.benchmark_group("bulk_partial_failures");
    for ordered in [true, false] {
        let models = inserts(1_000, Some(50));
        let label = if ordered { "ordered" } else { "unordered" };
        group.bench_with_input(BenchmarkId::from_parameter(label), &models, |b, models| {
            b.iter_batched(
                keyed_store,
                |store| {
                    BulkExecutor::new(&store, COLLECTION)
                        .ordered(ordered)
                        .execute(models)
                        .unwrap()
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_clean_batch, bench_partial_failures);
criterion_main!(benches);
