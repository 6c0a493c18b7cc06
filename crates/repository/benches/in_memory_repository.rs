use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use groundwork_core::Entity;
use groundwork_repository::InMemoryRepository;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Item {
    id: Option<u64>,
    name: String,
}

impl Entity for Item {
    type Key = u64;

    fn key(&self) -> Option<&u64> {
        self.id.as_ref()
    }
}

fn item(id: u64) -> Item {
    Item {
        id: Some(id),
        name: format!("item-{id}"),
    }
}

/// Throughput of `store` (check-then-act) for growing repositories.
fn bench_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("in_memory_store");
    for size in [100u64, 1_000, 10_000] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let repository = InMemoryRepository::new();
                for i in 0..size {
                    repository.store(black_box(item(i))).unwrap();
                }
                repository
            });
        });
    }
    group.finish();
}

/// Point lookups against a pre-populated repository (hit and miss).
fn bench_find(c: &mut Criterion) {
    let repository = InMemoryRepository::new();
    for i in 0..10_000u64 {
        repository.store(item(i)).unwrap();
    }

    let mut group = c.benchmark_group("in_memory_find");
    group.throughput(Throughput::Elements(1));
    group.bench_function("hit", |b| {
        b.iter(|| repository.find(black_box(&5_000)).unwrap());
    });
    group.bench_function("miss", |b| {
        b.iter(|| repository.find(black_box(&99_999)).unwrap());
    });
    group.finish();
}

criterion_group!(benches, bench_store, bench_find);
criterion_main!(benches);
