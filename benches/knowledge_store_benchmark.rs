//! Knowledge store throughput benchmarks: lesson insertion (with link
//! scoring against the recent-entry window) and a full decay pass over a
//! realistically sized store.
//!
//! Run with: `cargo bench --bench knowledge_store_benchmark`

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use poetiq_synth_core::memory::{JsonStoreBackend, KnowledgeStore, SourceType};
use poetiq_synth_core::types::Category;
use std::hint::black_box;

const CATEGORIES: [Category; 5] =
    [Category::StringManipulation, Category::Math, Category::ListOps, Category::DictOps, Category::Validation];

fn seed_store(dir: &std::path::Path, n: usize) -> KnowledgeStore<JsonStoreBackend> {
    let store = KnowledgeStore::load(JsonStoreBackend::new(dir), 100, 24).unwrap();
    for i in 0..n {
        let category = CATEGORIES[i % CATEGORIES.len()];
        store
            .add(
                format!("lesson number {i} about handling edge cases in {category} carefully"),
                category,
                SourceType::VerifiedSuccess,
                vec!["python_exec".to_string()],
                None,
                5,
            )
            .unwrap();
    }
    store
}

fn bench_add(c: &mut Criterion) {
    let mut group = c.benchmark_group("knowledge_store_add");
    for size in [0usize, 50, 200] {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let dir = tempfile::tempdir().unwrap();
            let store = seed_store(dir.path(), size);
            let mut counter = 0u64;
            b.iter(|| {
                counter += 1;
                black_box(
                    store
                        .add(
                            format!("freshly generated lesson {counter} about list bounds"),
                            Category::ListOps,
                            SourceType::Failure,
                            vec!["python_exec".to_string()],
                            Some("IndexError".to_string()),
                            4,
                        )
                        .unwrap(),
                );
            });
        });
    }
    group.finish();
}

fn bench_decay(c: &mut Criterion) {
    let mut group = c.benchmark_group("knowledge_store_decay");
    for size in [50usize, 200, 500] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let dir = tempfile::tempdir().unwrap();
            let store = seed_store(dir.path(), size);
            b.iter(|| black_box(store.decay().unwrap()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_add, bench_decay);
criterion_main!(benches);
