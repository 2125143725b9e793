use std::sync::Arc;

use core_cell::{Cell, MapTable};
use core_context::ContextTable;
use core_gc::{Collector, GcTables};
use core_mem::Allocator;
use core_series::{SeriesFlags, SeriesTable};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

/// Allocates `total` managed arrays, half of them reachable from a
/// guarded root, and times one full `recycle` pass over the result —
/// the shape spec 8's "recycle 10000 temporary arrays" property
/// exercises at smaller scale for profiling.
fn recycle_half_garbage(n: usize) {
    let allocator = Arc::new(Allocator::new(1 << 20));
    let mut arrays: SeriesTable<Cell> = SeriesTable::new(allocator.clone());
    let mut bytes: SeriesTable<u8> = SeriesTable::new(allocator.clone());
    let mut wide: SeriesTable<u16> = SeriesTable::new(allocator.clone());
    let mut contexts = ContextTable::new(allocator.clone());
    let mut maps = MapTable::new();
    let mut gc = Collector::new(allocator);

    let mut roots = Vec::with_capacity(n / 2);
    for i in 0..n {
        let handle = arrays.make(1, SeriesFlags::empty());
        arrays.push(handle, Cell::integer(i as i64)).unwrap();
        arrays.manage(handle).unwrap();
        if i % 2 == 0 {
            roots.push(Cell::block(handle, 0));
        }
    }

    let mut tables = GcTables {
        arrays: &mut arrays,
        bytes: &mut bytes,
        wide: &mut wide,
        contexts: &mut contexts,
        maps: &mut maps,
    };
    gc.recycle(&mut tables, &roots);
}

fn bench_recycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("gc_cycle");
    for &n in &[100usize, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| recycle_half_garbage(n));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_recycle);
criterion_main!(benches);
