//! Mark-and-sweep garbage collector (spec 4.5).
//!
//! Non-incremental, non-moving, run at ballast exhaustion or on
//! explicit request. Roots are: the guarded stack (values a caller has
//! pushed to keep alive across a call that might recycle), an optional
//! registered root context, any series carrying the `ROOT` flag, and
//! whatever extra cells the caller supplies for its own live state —
//! the evaluator's frame stack lives in `core-eval`, one crate above
//! this one, so it hands its live out-cells/arg-cells in rather than
//! this crate reaching up for them.

pub mod guard;

use core_cell::{
    ArrayHandle, Cell, CellKind, ContextRef, FunctionPayload, MapHandle, MapTable, SeriesRef,
    WordBinding,
};
use core_context::ContextTable;
use core_mem::Allocator;
use core_series::{SeriesFlags, SeriesTable};
use smallvec::SmallVec;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub use guard::Guard;

/// Every table the collector needs to mark and sweep, borrowed for the
/// duration of one [`Collector::recycle`] call.
pub struct GcTables<'a> {
    pub arrays: &'a mut SeriesTable<Cell>,
    pub bytes: &'a mut SeriesTable<u8>,
    pub wide: &'a mut SeriesTable<u16>,
    pub contexts: &'a mut ContextTable,
    pub maps: &'a mut MapTable,
}

/// Cumulative GC counters. `AtomicU64`, not plain fields — a test or an
/// embedder's `:metrics` surface can read [`Collector::stats`] without
/// taking `&mut Collector`, the same reasoning `core-throw::HaltFlag`
/// applies to cooperative halt state with `AtomicBool`.
#[derive(Debug, Default)]
struct GcMetrics {
    cycles_run: AtomicU64,
    nodes_freed: AtomicU64,
    bytes_recycled: AtomicU64,
    frames_pushed: AtomicU64,
}

impl GcMetrics {
    fn snapshot(&self, last_run: Option<Duration>) -> GcStatsSnapshot {
        GcStatsSnapshot {
            cycles_run: self.cycles_run.load(Ordering::Relaxed),
            nodes_freed: self.nodes_freed.load(Ordering::Relaxed),
            bytes_recycled: self.bytes_recycled.load(Ordering::Relaxed),
            frames_pushed: self.frames_pushed.load(Ordering::Relaxed),
            last_run,
        }
    }
}

/// Inspectable GC statistics.
#[derive(Debug, Default, Clone, Copy)]
pub struct GcStatsSnapshot {
    pub cycles_run: u64,
    pub nodes_freed: u64,
    pub bytes_recycled: u64,
    pub frames_pushed: u64,
    pub last_run: Option<Duration>,
}

/// Owns the guarded stack, the root-context registration, and the
/// running GC statistics. One instance lives per interpreter task.
pub struct Collector {
    allocator: Arc<Allocator>,
    guarded: Vec<Cell>,
    root_context: Option<ArrayHandle>,
    metrics: GcMetrics,
    last_run: Option<Duration>,
}

impl Collector {
    pub fn new(allocator: Arc<Allocator>) -> Self {
        Self {
            allocator,
            guarded: Vec::new(),
            root_context: None,
            metrics: GcMetrics::default(),
            last_run: None,
        }
    }

    /// Registers a varlist as the GC root context (the "registered root
    /// context" root category) — typically the task context or the
    /// user/system object.
    pub fn set_root_context(&mut self, ctx: ArrayHandle) {
        self.root_context = Some(ctx);
    }

    pub fn root_context(&self) -> Option<ArrayHandle> {
        self.root_context
    }

    /// Unregisters the root context, so the next `recycle` treats it
    /// as ordinary garbage (shutdown's final sweep, spec 4.8: nothing
    /// should survive teardown).
    pub fn clear_root_context(&mut self) {
        self.root_context = None;
    }

    /// Pushes a value onto the guarded stack and returns an RAII
    /// [`Guard`] that pops it back off on drop — a guarded temporary
    /// can't be forgotten about across a call that might recycle.
    pub fn push_guard(&mut self, value: Cell) -> Guard<'_> {
        self.guarded.push(value);
        Guard::new(self)
    }

    pub(crate) fn pop_guard_raw(&mut self) {
        self.guarded.pop();
    }

    pub fn guarded_depth(&self) -> usize {
        self.guarded.len()
    }

    pub fn stats(&self) -> GcStatsSnapshot {
        self.metrics.snapshot(self.last_run)
    }

    pub fn needs_recycle(&self) -> bool {
        self.allocator.needs_recycle()
    }

    /// Reports one evaluator frame push. `core-eval::FrameStack` lives a
    /// crate above this one and has no counter of its own (only a `Vec`
    /// length), so it calls here instead through its held `&Collector`.
    pub fn record_frame_push(&self) {
        self.metrics.frames_pushed.fetch_add(1, Ordering::Relaxed);
    }

    /// Runs one full mark-and-sweep cycle. `extra_roots` carries
    /// whatever live cells the caller's own stack holds that aren't
    /// reachable any other way (the evaluator's frame out-cells/
    /// arg-cells).
    pub fn recycle(&mut self, tables: &mut GcTables<'_>, extra_roots: &[Cell]) -> GcStatsSnapshot {
        let start = Instant::now();
        let before_bytes = self.allocator.mem_in_use();

        let mut worklist: SmallVec<[Cell; 64]> = SmallVec::new();

        worklist.extend_from_slice(&self.guarded);
        worklist.extend_from_slice(extra_roots);
        if let Some(root) = self.root_context {
            worklist.push(Cell::object(root));
        }
        for (_, series) in tables.arrays.iter() {
            if series.flags().contains(SeriesFlags::ROOT) {
                worklist.extend_from_slice(series.as_slice());
            }
        }

        while let Some(cell) = worklist.pop() {
            mark_cell(&cell, tables, &mut worklist);
        }

        let freed_arrays = tables.arrays.sweep_unmarked();
        let freed_bytes = tables.bytes.sweep_unmarked();
        let freed_wide = tables.wide.sweep_unmarked();
        let freed_contexts = tables.contexts.sweep();
        let freed_maps = tables.maps.sweep_unmarked();

        let freed_total = freed_arrays + freed_bytes + freed_wide + freed_contexts + freed_maps;
        let after_bytes = self.allocator.mem_in_use();
        let recycled = before_bytes.saturating_sub(after_bytes) as u64;

        self.metrics.cycles_run.fetch_add(1, Ordering::Relaxed);
        self.metrics.nodes_freed.fetch_add(freed_total as u64, Ordering::Relaxed);
        self.metrics.bytes_recycled.fetch_add(recycled, Ordering::Relaxed);
        let elapsed = start.elapsed();
        self.last_run = Some(elapsed);
        self.allocator.reset_ballast();

        tracing::debug!(
            target: "gc.sweep",
            freed_arrays,
            freed_bytes,
            freed_wide,
            freed_contexts,
            freed_maps,
            recycled_bytes = recycled,
            elapsed_us = elapsed.as_micros() as u64,
            frames_pushed = self.metrics.frames_pushed.load(Ordering::Relaxed),
            "recycle_done"
        );

        self.stats()
    }
}

/// Marks one cell and pushes whatever it references onto `worklist` for
/// later processing — an explicit work-list rather than recursion so a
/// deeply nested block can't blow the native stack. Cycle-safety comes
/// from checking each table's mark bit before pushing a handle's
/// contents onto the worklist a second time.
fn mark_cell(cell: &Cell, tables: &mut GcTables<'_>, worklist: &mut SmallVec<[Cell; 64]>) {
    let kind = cell.kind();
    if kind.is_any_array() {
        if let Ok((handle, _)) = cell.as_array_handle() {
            mark_array(handle, tables, worklist);
        }
        return;
    }
    match kind {
        CellKind::StringValue | CellKind::BinaryValue => {
            if let Ok(series_ref) = cell.as_series_ref() {
                match series_ref {
                    SeriesRef::Bytes { handle, .. } => {
                        if let Some(s) = tables.bytes.get_mut(handle) {
                            s.mark();
                        }
                    }
                    SeriesRef::Wide { handle, .. } => {
                        if let Some(s) = tables.wide.get_mut(handle) {
                            s.mark();
                        }
                    }
                    SeriesRef::Array { .. } => unreachable!("handled above"),
                }
            }
        }
        CellKind::Function => {
            if let Ok(FunctionPayload {
                paramlist,
                body_holder,
                ..
            }) = cell.as_function()
            {
                mark_array(paramlist, tables, worklist);
                mark_array(body_holder, tables, worklist);
            }
        }
        CellKind::Map => {
            if let Ok(handle) = cell.as_map() {
                mark_map(handle, tables, worklist);
            }
        }
        _ if kind.is_any_word() => {
            if let Ok(binding) = cell.as_word_binding() {
                match binding {
                    WordBinding::Unbound => {}
                    WordBinding::Absolute { context, .. } => {
                        mark_context(context, tables, worklist);
                    }
                    WordBinding::Relative { paramlist, .. } => {
                        mark_array(paramlist, tables, worklist);
                    }
                }
            }
        }
        _ if kind.is_any_context() => {
            if let Ok(ContextRef { varlist }) = cell.as_context() {
                mark_context(varlist, tables, worklist);
            }
        }
        _ => {}
    }
}

fn mark_array(handle: ArrayHandle, tables: &mut GcTables<'_>, worklist: &mut SmallVec<[Cell; 64]>) {
    let already_marked = tables.arrays.get(handle).map(|s| s.is_marked()).unwrap_or(true);
    if already_marked {
        return;
    }
    let Some(series) = tables.arrays.get_mut(handle) else {
        return;
    };
    series.mark();
    worklist.extend_from_slice(series.as_slice());
}

fn mark_context(ctx: ArrayHandle, tables: &mut GcTables<'_>, worklist: &mut SmallVec<[Cell; 64]>) {
    if tables.contexts.is_marked(ctx) {
        return;
    }
    if tables.contexts.mark(ctx).is_err() {
        return;
    }
    // `raw_slots` deliberately bypasses the "expired" read-guard: the
    // memory is alive and must be traced until the sweep actually
    // reclaims it, regardless of whether application code may still
    // read it.
    if let Ok(slots) = tables.contexts.raw_slots(ctx) {
        worklist.extend_from_slice(slots);
    }
}

fn mark_map(handle: MapHandle, tables: &mut GcTables<'_>, worklist: &mut SmallVec<[Cell; 64]>) {
    if tables.maps.is_marked(handle) {
        return;
    }
    tables.maps.mark(handle);
    if let Some(map) = tables.maps.get(handle) {
        for (k, v) in map.iter() {
            worklist.push(*k);
            worklist.push(*v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_context::ContextTable;
    use core_series::SeriesTable;
    use core_symbols::SymbolTable;

    fn fresh() -> (
        Arc<Allocator>,
        SeriesTable<Cell>,
        SeriesTable<u8>,
        SeriesTable<u16>,
        ContextTable,
        MapTable,
    ) {
        let alloc = Arc::new(Allocator::new(1 << 20));
        (
            alloc.clone(),
            SeriesTable::new(alloc.clone()),
            SeriesTable::new(alloc.clone()),
            SeriesTable::new(alloc.clone()),
            ContextTable::new(alloc),
            MapTable::new(),
        )
    }

    #[test]
    fn unreachable_array_is_swept() {
        let (alloc, mut arrays, mut bytes, mut wide, mut contexts, mut maps) = fresh();
        let mut gc = Collector::new(alloc);

        let kept = arrays.make(1, SeriesFlags::empty());
        arrays.push(kept, Cell::integer(1)).unwrap();
        arrays.manage(kept).unwrap();
        let kept_cell = Cell::block(kept, 0);

        let orphan = arrays.make(1, SeriesFlags::empty());
        arrays.push(orphan, Cell::integer(2)).unwrap();
        arrays.manage(orphan).unwrap();

        let mut tables = GcTables {
            arrays: &mut arrays,
            bytes: &mut bytes,
            wide: &mut wide,
            contexts: &mut contexts,
            maps: &mut maps,
        };
        let stats = gc.recycle(&mut tables, &[kept_cell]);

        assert_eq!(stats.cycles_run, 1);
        assert!(tables.arrays.get(kept).is_some());
        assert!(tables.arrays.get(orphan).is_none());
        assert_eq!(stats.nodes_freed, 1);
    }

    #[test]
    fn guarded_cell_survives_a_cycle_then_is_collectible_after_pop() {
        let (alloc, mut arrays, mut bytes, mut wide, mut contexts, mut maps) = fresh();
        let mut gc = Collector::new(alloc);

        let h = arrays.make(0, SeriesFlags::empty());
        arrays.manage(h).unwrap();
        let cell = Cell::block(h, 0);

        {
            let _guard = gc.push_guard(cell);
            assert_eq!(gc.guarded_depth(), 1);
            let mut tables = GcTables {
                arrays: &mut arrays,
                bytes: &mut bytes,
                wide: &mut wide,
                contexts: &mut contexts,
                maps: &mut maps,
            };
            gc.recycle(&mut tables, &[]);
            assert!(tables.arrays.get(h).is_some(), "guarded array must survive");
        }
        assert_eq!(gc.guarded_depth(), 0);

        let mut tables = GcTables {
            arrays: &mut arrays,
            bytes: &mut bytes,
            wide: &mut wide,
            contexts: &mut contexts,
            maps: &mut maps,
        };
        gc.recycle(&mut tables, &[]);
        assert!(
            tables.arrays.get(h).is_none(),
            "unguarded array must be collected once the guard drops"
        );
    }

    #[test]
    fn context_slots_are_traced_through_word_binding() {
        let (alloc, mut arrays, mut bytes, mut wide, mut contexts, mut maps) = fresh();
        let mut gc = Collector::new(alloc);
        let mut symbols = SymbolTable::new();
        let x = symbols.intern(b"x");

        let inner = arrays.make(1, SeriesFlags::empty());
        arrays.manage(inner).unwrap();
        let ctx = contexts.create(&[x]);
        contexts.set_var(ctx, 1, Cell::block(inner, 0)).unwrap();

        let root_cell = Cell::object(ctx);
        let mut tables = GcTables {
            arrays: &mut arrays,
            bytes: &mut bytes,
            wide: &mut wide,
            contexts: &mut contexts,
            maps: &mut maps,
        };
        gc.recycle(&mut tables, &[root_cell]);
        assert!(
            tables.arrays.get(inner).is_some(),
            "array reachable only through a context slot must survive"
        );
    }

    #[test]
    fn root_context_registration_keeps_its_array_alive() {
        let (alloc, mut arrays, mut bytes, mut wide, mut contexts, mut maps) = fresh();
        let mut gc = Collector::new(alloc);
        let mut symbols = SymbolTable::new();
        let y = symbols.intern(b"y");

        let inner = arrays.make(1, SeriesFlags::empty());
        arrays.manage(inner).unwrap();
        let ctx = contexts.create(&[y]);
        contexts.set_var(ctx, 1, Cell::block(inner, 0)).unwrap();
        gc.set_root_context(ctx);

        let mut tables = GcTables {
            arrays: &mut arrays,
            bytes: &mut bytes,
            wide: &mut wide,
            contexts: &mut contexts,
            maps: &mut maps,
        };
        gc.recycle(&mut tables, &[]);
        assert!(tables.arrays.get(inner).is_some());
        assert!(tables.contexts.raw_slots(ctx).is_ok());
    }

    #[test]
    fn root_flagged_series_survives_without_any_other_reference() {
        let (alloc, mut arrays, mut bytes, mut wide, mut contexts, mut maps) = fresh();
        let mut gc = Collector::new(alloc);

        let h = arrays.make(0, SeriesFlags::ROOT);
        arrays.manage(h).unwrap();

        let mut tables = GcTables {
            arrays: &mut arrays,
            bytes: &mut bytes,
            wide: &mut wide,
            contexts: &mut contexts,
            maps: &mut maps,
        };
        gc.recycle(&mut tables, &[]);
        assert!(tables.arrays.get(h).is_some());
    }

    #[test]
    fn map_values_are_traced() {
        let (alloc, mut arrays, mut bytes, mut wide, mut contexts, mut maps) = fresh();
        let mut gc = Collector::new(alloc);

        let inner = arrays.make(0, SeriesFlags::empty());
        arrays.manage(inner).unwrap();

        let map_handle = maps.make();
        maps.get_mut(map_handle).unwrap().insert(
            Cell::integer(1),
            Cell::block(inner, 0),
            1,
            |a, b| a.as_integer().ok() == b.as_integer().ok(),
        );
        maps.manage(map_handle).unwrap();

        let root_cell = Cell::map(map_handle);
        let mut tables = GcTables {
            arrays: &mut arrays,
            bytes: &mut bytes,
            wide: &mut wide,
            contexts: &mut contexts,
            maps: &mut maps,
        };
        gc.recycle(&mut tables, &[root_cell]);
        assert!(
            tables.arrays.get(inner).is_some(),
            "array reachable only via a MAP! value must survive"
        );
        assert!(tables.maps.get(map_handle).is_some());
    }

    #[test]
    fn record_frame_push_accumulates_into_stats() {
        let (alloc, ..) = fresh();
        let gc = Collector::new(alloc);
        assert_eq!(gc.stats().frames_pushed, 0);
        gc.record_frame_push();
        gc.record_frame_push();
        assert_eq!(gc.stats().frames_pushed, 2);
    }

    #[test]
    fn ballast_driven_needs_recycle_resets_after_a_cycle() {
        let (alloc, mut arrays, mut bytes, mut wide, mut contexts, mut maps) = fresh();
        alloc.alloc_bytes((1 << 20) + 1);
        let mut gc = Collector::new(alloc.clone());
        assert!(gc.needs_recycle());
        let mut tables = GcTables {
            arrays: &mut arrays,
            bytes: &mut bytes,
            wide: &mut wide,
            contexts: &mut contexts,
            maps: &mut maps,
        };
        gc.recycle(&mut tables, &[]);
        assert!(!gc.needs_recycle());
    }
}
