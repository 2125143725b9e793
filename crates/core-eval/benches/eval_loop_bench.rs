use std::sync::Arc;

use core_bind::Specifier;
use core_cell::{Cell, MapTable};
use core_context::ContextTable;
use core_eval::natives::NativeTable;
use core_eval::{do_array, EvalContext, FrameStack};
use core_gc::{Collector, GcTables};
use core_mem::Allocator;
use core_series::{SeriesFlags, SeriesTable};
use core_symbols::SymbolTable;
use core_throw::{HaltFlag, ThrowState, TrapStack};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

/// Builds `1 + 2 * 3` repeated `n` times in one block and runs it
/// through `do_array` once, timing the steady-state cost of prefix
/// lookup + enfix dispatch the worked scenario in spec 8 exercises.
fn run_arithmetic_chain(n: usize) {
    let allocator = Arc::new(Allocator::new(1 << 20));
    let mut arrays: SeriesTable<Cell> = SeriesTable::new(allocator.clone());
    let mut bytes: SeriesTable<u8> = SeriesTable::new(allocator.clone());
    let mut wide: SeriesTable<u16> = SeriesTable::new(allocator.clone());
    let mut contexts = ContextTable::new(allocator.clone());
    let mut maps = MapTable::new();
    let mut symbols = SymbolTable::new();
    let mut collector = Collector::new(allocator);

    let natives = NativeTable::build(&mut arrays, &mut symbols).unwrap();
    let lib_context = contexts.create(natives.names());
    let mut plus_index = 0u32;
    let mut star_index = 0u32;
    for (id, name) in natives.names().iter().enumerate() {
        let spelling = symbols.spelling(*name).to_string();
        if spelling == "+" {
            plus_index = id as u32 + 1;
        }
        if spelling == "*" {
            star_index = id as u32 + 1;
        }
        contexts.set_var(lib_context, id + 1, natives.cell(id as u32)).unwrap();
    }
    let plus_symbol = natives.names()[(plus_index - 1) as usize];
    let star_symbol = natives.names()[(star_index - 1) as usize];

    let handle = arrays.make(n * 5, SeriesFlags::empty());
    for _ in 0..n {
        arrays.push(handle, Cell::integer(1)).unwrap();
        arrays.push(handle, Cell::word_bound(plus_symbol, lib_context, plus_index)).unwrap();
        arrays.push(handle, Cell::integer(2)).unwrap();
        arrays.push(handle, Cell::word_bound(star_symbol, lib_context, star_index)).unwrap();
        arrays.push(handle, Cell::integer(3)).unwrap();
    }
    arrays.manage(handle).unwrap();

    let tables = GcTables {
        arrays: &mut arrays,
        bytes: &mut bytes,
        wide: &mut wide,
        contexts: &mut contexts,
        maps: &mut maps,
    };
    let mut throw = ThrowState::new();
    let mut traps = TrapStack::new();
    let halt = HaltFlag::new();
    let mut ctx = EvalContext::new(tables, &mut symbols, &mut throw, &mut traps, &halt, &mut collector);
    let mut frames = FrameStack::new();
    let mut out = Cell::none_value();

    do_array(&mut ctx, &mut frames, &natives, lib_context, handle, 0, Specifier::None, &mut out).unwrap();
}

fn bench_eval_loop(c: &mut Criterion) {
    let mut group = c.benchmark_group("eval_loop");
    for &n in &[10usize, 100, 1_000] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| run_arithmetic_chain(n));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_eval_loop);
criterion_main!(benches);
