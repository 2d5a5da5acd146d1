use blocklist::List;
use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use storage::{BlockMeta, CompactedBlockMeta};
use uuid::Uuid;

const TENANT: &str = "bench";

fn meta(id: u128) -> Arc<BlockMeta> {
    Arc::new(BlockMeta::new(TENANT, Uuid::from_u128(id)))
}

fn compacted_meta(id: u128) -> Arc<CompactedBlockMeta> {
    Arc::new(CompactedBlockMeta::new(
        BlockMeta::new(TENANT, Uuid::from_u128(id)),
        Utc::now(),
    ))
}

/// Seed a list with one tenant holding `num_blocks` live and `num_compacted`
/// compacted blocks
fn seeded_list(num_blocks: usize, num_compacted: usize) -> List {
    let list = List::new();
    let existing: Vec<_> = (0..num_blocks).map(|_| meta(Uuid::new_v4().as_u128())).collect();
    let compacted: Vec<_> = (0..num_compacted)
        .map(|_| compacted_meta(Uuid::new_v4().as_u128()))
        .collect();
    list.update(TENANT, &existing, &[], &compacted, &[]);
    list
}

fn bench_update(c: &mut Criterion) {
    let add = [meta(1), meta(2)];
    let remove = [meta(3), meta(4)];
    let compacted_add = [compacted_meta(5), compacted_meta(6)];
    let compacted_remove = [compacted_meta(7), compacted_meta(8)];

    let mut group = c.benchmark_group("update");

    // 100k live blocks and 1k compacted blocks is a realistic large tenant
    for num_blocks in [1_000usize, 100_000] {
        let list = seeded_list(num_blocks, 1_000);
        group.bench_with_input(BenchmarkId::from_parameter(num_blocks), &list, |b, list| {
            b.iter(|| {
                list.update(
                    black_box(TENANT),
                    &add,
                    &remove,
                    &compacted_add,
                    &compacted_remove,
                )
            });
        });
    }

    group.finish();
}

fn bench_apply_poll_results(c: &mut Criterion) {
    let list = seeded_list(0, 0);
    list.update(TENANT, &[meta(1)], &[meta(2)], &[compacted_meta(3)], &[]);

    let blocks: Vec<_> = (0..100_000u128).map(|i| meta(i + 10)).collect();

    c.bench_function("apply_poll_results/100000", |b| {
        b.iter(|| {
            list.apply_poll_results(
                [(TENANT.to_string(), blocks.clone())].into(),
                Default::default(),
            )
        });
    });
}

criterion_group!(benches, bench_update, bench_apply_poll_results);
criterion_main!(benches);
