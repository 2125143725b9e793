//! Variable-length, uniform-width heap vectors ("series").
//!
//! A [`Series<T>`] is the one aggregate storage shape the whole runtime
//! builds on: byte strings use `T = u8`, wide strings use `T = u16`,
//! code/object arrays use `T = Cell` (defined two crates up, in
//! `core-cell`, which instantiates [`SeriesTable<Cell>`] itself — this
//! crate stays generic and never needs to know what a cell is).
//!
//! Lifecycle: a series created by [`SeriesTable::make`] is *unmanaged* —
//! the caller who created it owns it and must either [`SeriesTable::free`]
//! it or [`SeriesTable::manage`] it before it becomes reachable from any
//! long-lived structure. Managed series are swept by the garbage
//! collector (`core-gc`), never by direct `free`. The conversion is
//! one-way, matching spec 3's "Ownership and lifecycle" invariant.
//!
//! Termination: the historical implementation keeps a one-element
//! sentinel past `len` so C code scanning the buffer knows where it
//! ends. We replace that with explicit `len`-bounded accessors (spec
//! Section 9's guidance to drop "pointer-back to enclosing series"
//! tricks in favor of bounds checking) — every mutation that changes
//! `len` goes through methods that keep `data.len() == len` exactly, so
//! there is no sentinel to maintain or to silently desync.

use bitflags::bitflags;
use core_mem::{Allocator, Handle, Pool};
use std::sync::Arc;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct SeriesFlags: u16 {
        /// Owned by the GC; `free` is illegal, only `core-gc`'s sweep may reclaim it.
        const MANAGED    = 0b0000_0001;
        /// Rejects every mutation (`SeriesError::Locked`).
        const LOCKED     = 0b0000_0010;
        /// Rejects length changes but permits in-place element mutation.
        const FIXED_SIZE = 0b0000_0100;
        /// Registered as a GC root independent of reachability.
        const ROOT       = 0b0000_1000;
        /// Carries file/line metadata (set by the scanner collaborator; stored, not interpreted, here).
        const FILE_LINE  = 0b0001_0000;
        /// GC mark bit. Cleared at the start of a cycle, set during mark, read during sweep.
        const MARKED     = 0b0010_0000;
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum SeriesError {
    #[error("series is locked")]
    Locked,
    #[error("series is fixed-size")]
    FixedSize,
    #[error("handle does not refer to a live series")]
    StaleHandle,
    #[error("series is managed by the GC and cannot be freed directly")]
    ManagedSeriesFreedDirectly,
    #[error("series is not managed and cannot be handed to the GC again")]
    AlreadyUnmanaged,
}

/// Opaque auxiliary slot. `core-context`/`core-cell` interpret the `u64`
/// payload (a packed handle index, a line number, a file descriptor);
/// this crate only stores and copies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AuxSlot(pub u64);

pub struct Series<T> {
    data: Vec<T>,
    flags: SeriesFlags,
    link: AuxSlot,
    misc: AuxSlot,
}

impl<T> Series<T> {
    pub fn len(&self) -> usize {
        self.data.len()
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }
    pub fn flags(&self) -> SeriesFlags {
        self.flags
    }
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }
    pub fn link(&self) -> AuxSlot {
        self.link
    }
    pub fn misc(&self) -> AuxSlot {
        self.misc
    }
    pub fn set_link(&mut self, link: AuxSlot) {
        self.link = link;
    }
    pub fn set_misc(&mut self, misc: AuxSlot) {
        self.misc = misc;
    }
    pub fn is_managed(&self) -> bool {
        self.flags.contains(SeriesFlags::MANAGED)
    }
    pub fn is_locked(&self) -> bool {
        self.flags.contains(SeriesFlags::LOCKED)
    }
    pub fn is_fixed_size(&self) -> bool {
        self.flags.contains(SeriesFlags::FIXED_SIZE)
    }
    pub fn is_marked(&self) -> bool {
        self.flags.contains(SeriesFlags::MARKED)
    }
    pub fn mark(&mut self) {
        self.flags.insert(SeriesFlags::MARKED);
    }
    pub fn unmark(&mut self) {
        self.flags.remove(SeriesFlags::MARKED);
    }
    pub fn width_bytes() -> usize {
        std::mem::size_of::<T>()
    }

    fn check_mutable(&self) -> Result<(), SeriesError> {
        if self.flags.contains(SeriesFlags::LOCKED) {
            return Err(SeriesError::Locked);
        }
        Ok(())
    }

    fn check_resizable(&self) -> Result<(), SeriesError> {
        self.check_mutable()?;
        if self.flags.contains(SeriesFlags::FIXED_SIZE) {
            return Err(SeriesError::FixedSize);
        }
        Ok(())
    }
}

impl<T: Clone> Series<T> {
    pub fn as_mut_slice(&mut self) -> Result<&mut [T], SeriesError> {
        self.check_mutable()?;
        Ok(&mut self.data)
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.data.get(index)
    }

    /// Mutate a single in-bounds element. Legal even on a `FIXED_SIZE`
    /// series since the length does not change.
    pub fn set(&mut self, index: usize, value: T) -> Result<(), SeriesError> {
        self.check_mutable()?;
        let slot = self.data.get_mut(index).ok_or(SeriesError::StaleHandle)?;
        *slot = value;
        Ok(())
    }
}

/// Owns the [`Pool`] of `Series<T>` nodes plus the set of unmanaged
/// ("manuals") handles that have not yet been freed or handed to the GC.
/// One instance exists per element width per interpreter task.
pub struct SeriesTable<T> {
    pool: Pool<Series<T>>,
    manuals: Vec<Handle<Series<T>>>,
    allocator: Arc<Allocator>,
}

impl<T: Clone + Default> SeriesTable<T> {
    pub fn new(allocator: Arc<Allocator>) -> Self {
        Self {
            pool: Pool::new(),
            manuals: Vec::new(),
            allocator,
        }
    }

    /// `make_series`: create an unmanaged series with room for `capacity`
    /// elements and zero length.
    pub fn make(&mut self, capacity: usize, flags: SeriesFlags) -> Handle<Series<T>> {
        let mut flags = flags;
        flags.remove(SeriesFlags::MANAGED);
        let series = Series {
            data: Vec::with_capacity(capacity),
            flags,
            link: AuxSlot::default(),
            misc: AuxSlot::default(),
        };
        self.allocator
            .alloc_bytes(capacity * Series::<T>::width_bytes());
        self.allocator.note_node_alloc();
        let handle = self.pool.alloc(series);
        self.manuals.push(handle);
        handle
    }

    pub fn get(&self, handle: Handle<Series<T>>) -> Option<&Series<T>> {
        self.pool.get(handle)
    }

    pub fn get_mut(&mut self, handle: Handle<Series<T>>) -> Option<&mut Series<T>> {
        self.pool.get_mut(handle)
    }

    /// `manage`: one-way transition from unmanaged to GC-owned. Removes
    /// the handle from the manuals list.
    pub fn manage(&mut self, handle: Handle<Series<T>>) -> Result<(), SeriesError> {
        let pos = self
            .manuals
            .iter()
            .position(|h| *h == handle)
            .ok_or(SeriesError::AlreadyUnmanaged)?;
        self.manuals.swap_remove(pos);
        let series = self.pool.get_mut(handle).ok_or(SeriesError::StaleHandle)?;
        series.flags.insert(SeriesFlags::MANAGED);
        Ok(())
    }

    /// `free_series`: only legal for unmanaged series; managed series
    /// are reclaimed exclusively by the GC sweep.
    pub fn free(&mut self, handle: Handle<Series<T>>) -> Result<(), SeriesError> {
        let series = self.pool.get(handle).ok_or(SeriesError::StaleHandle)?;
        if series.is_managed() {
            return Err(SeriesError::ManagedSeriesFreedDirectly);
        }
        let bytes = series.data.capacity() * Series::<T>::width_bytes();
        self.manuals.retain(|h| *h != handle);
        self.pool.free(handle);
        self.allocator.free_bytes(bytes);
        self.allocator.note_node_free();
        Ok(())
    }

    /// Reclaim a series the GC has determined is unreachable. Bypasses
    /// the `MANAGED`-only-by-sweep check above since the sweep is the
    /// one caller allowed to do this.
    pub(crate) fn sweep_free(&mut self, handle: Handle<Series<T>>) {
        if let Some(series) = self.pool.get(handle) {
            let bytes = series.data.capacity() * Series::<T>::width_bytes();
            self.pool.free(handle);
            self.allocator.free_bytes(bytes);
            self.allocator.note_node_free();
        }
    }

    /// `core-gc`'s sweep phase for this table: free every managed node
    /// the mark phase left unmarked, and clear `MARKED` from every
    /// surviving managed node so the next cycle starts clean. Unmanaged
    /// (manual) series are never touched here — they are the caller's
    /// responsibility regardless of reachability (spec 4.5 sweep rule:
    /// "for each unmarked, managed, non-zero node, free it").
    pub fn sweep_unmarked(&mut self) -> usize {
        let managed: Vec<Handle<Series<T>>> = self
            .pool
            .iter()
            .filter(|(_, s)| s.is_managed())
            .map(|(h, _)| h)
            .collect();
        let mut freed = 0;
        for handle in managed {
            let marked = self.pool.get(handle).map(|s| s.is_marked()).unwrap_or(false);
            if marked {
                if let Some(s) = self.pool.get_mut(handle) {
                    s.unmark();
                }
            } else {
                self.sweep_free(handle);
                freed += 1;
            }
        }
        if freed > 0 {
            tracing::trace!(target: "series.sweep", freed, width = Series::<T>::width_bytes(), "sweep_unmarked");
        }
        freed
    }

    /// `expand_tail`: ensure room for `delta` more elements without
    /// changing `len`.
    pub fn reserve_tail(
        &mut self,
        handle: Handle<Series<T>>,
        delta: usize,
    ) -> Result<(), SeriesError> {
        let series = self.pool.get_mut(handle).ok_or(SeriesError::StaleHandle)?;
        series.check_mutable()?;
        let before = series.data.capacity();
        series.data.reserve(delta);
        let after = series.data.capacity();
        if after > before {
            self.allocator
                .alloc_bytes((after - before) * Series::<T>::width_bytes());
        }
        Ok(())
    }

    /// `extend`: append `delta` clones of `value`, growing `len`.
    pub fn extend(
        &mut self,
        handle: Handle<Series<T>>,
        delta: usize,
        value: T,
    ) -> Result<(), SeriesError> {
        let series = self.pool.get_mut(handle).ok_or(SeriesError::StaleHandle)?;
        series.check_resizable()?;
        let before_cap = series.data.capacity();
        series.data.extend(std::iter::repeat(value).take(delta));
        let after_cap = series.data.capacity();
        if after_cap > before_cap {
            self.allocator
                .alloc_bytes((after_cap - before_cap) * Series::<T>::width_bytes());
        }
        Ok(())
    }

    pub fn push(&mut self, handle: Handle<Series<T>>, value: T) -> Result<(), SeriesError> {
        let series = self.pool.get_mut(handle).ok_or(SeriesError::StaleHandle)?;
        series.check_resizable()?;
        let before_cap = series.data.capacity();
        series.data.push(value);
        let after_cap = series.data.capacity();
        if after_cap > before_cap {
            self.allocator
                .alloc_bytes((after_cap - before_cap) * Series::<T>::width_bytes());
        }
        Ok(())
    }

    /// `remake`: reallocate to `new_cap`, optionally preserving existing
    /// elements (truncating if `new_cap < len`).
    pub fn remake(
        &mut self,
        handle: Handle<Series<T>>,
        new_cap: usize,
        preserve: bool,
    ) -> Result<(), SeriesError> {
        let series = self.pool.get_mut(handle).ok_or(SeriesError::StaleHandle)?;
        series.check_resizable()?;
        let before_cap = series.data.capacity();
        let mut replacement = Vec::with_capacity(new_cap);
        if preserve {
            let take = series.data.len().min(new_cap);
            replacement.extend_from_slice(&series.data[..take]);
        }
        series.data = replacement;
        let after_cap = series.data.capacity();
        self.allocator
            .free_bytes(before_cap * Series::<T>::width_bytes());
        self.allocator
            .alloc_bytes(after_cap * Series::<T>::width_bytes());
        Ok(())
    }

    pub fn truncate(&mut self, handle: Handle<Series<T>>, new_len: usize) -> Result<(), SeriesError> {
        let series = self.pool.get_mut(handle).ok_or(SeriesError::StaleHandle)?;
        series.check_resizable()?;
        series.data.truncate(new_len);
        Ok(())
    }

    pub fn lock(&mut self, handle: Handle<Series<T>>) -> Result<(), SeriesError> {
        let series = self.pool.get_mut(handle).ok_or(SeriesError::StaleHandle)?;
        series.flags.insert(SeriesFlags::LOCKED);
        Ok(())
    }

    pub fn manuals(&self) -> &[Handle<Series<T>>] {
        &self.manuals
    }

    /// Every occupied node, managed or not — the shape the GC mark/sweep
    /// walk needs.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<Series<T>>, &Series<T>)> {
        self.pool.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle<Series<T>>, &mut Series<T>)> {
        self.pool.iter_mut()
    }

    pub fn live_count(&self) -> usize {
        self.pool.live_count()
    }

    pub(crate) fn pool_mut(&mut self) -> &mut Pool<Series<T>> {
        &mut self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> SeriesTable<u8> {
        SeriesTable::new(Arc::new(Allocator::new(1 << 20)))
    }

    #[test]
    fn make_series_is_unmanaged_until_managed() {
        let mut t = table();
        let h = t.make(8, SeriesFlags::empty());
        assert!(!t.get(h).unwrap().is_managed());
        assert_eq!(t.manuals(), &[h]);
        t.manage(h).unwrap();
        assert!(t.get(h).unwrap().is_managed());
        assert!(t.manuals().is_empty());
    }

    #[test]
    fn free_rejects_managed_series() {
        let mut t = table();
        let h = t.make(4, SeriesFlags::empty());
        t.manage(h).unwrap();
        assert_eq!(
            t.free(h).unwrap_err(),
            SeriesError::ManagedSeriesFreedDirectly
        );
    }

    #[test]
    fn locked_series_rejects_mutation() {
        let mut t = table();
        let h = t.make(4, SeriesFlags::empty());
        t.push(h, 1).unwrap();
        t.lock(h).unwrap();
        assert_eq!(t.push(h, 2).unwrap_err(), SeriesError::Locked);
        assert_eq!(t.get(h).unwrap().get(0), Some(&1u8));
    }

    #[test]
    fn fixed_size_permits_element_mutation_not_length_change() {
        let mut t = table();
        let h = t.make(4, SeriesFlags::empty());
        t.extend(h, 2, 0).unwrap();
        t.get_mut(h).unwrap().flags.insert(SeriesFlags::FIXED_SIZE);
        t.get_mut(h).unwrap().set(0, 9).unwrap();
        assert_eq!(t.push(h, 1).unwrap_err(), SeriesError::FixedSize);
    }

    #[test]
    fn mem_in_use_tracks_allocation_and_free() {
        let alloc = Arc::new(Allocator::new(1 << 20));
        let mut t: SeriesTable<u8> = SeriesTable::new(alloc.clone());
        let h = t.make(100, SeriesFlags::empty());
        assert!(alloc.mem_in_use() >= 100);
        t.free(h).unwrap();
        assert_eq!(alloc.mem_in_use(), 0);
    }

    #[test]
    fn truncate_then_extend_preserves_len_invariant() {
        let mut t = table();
        let h = t.make(8, SeriesFlags::empty());
        t.extend(h, 5, 1).unwrap();
        assert_eq!(t.get(h).unwrap().len(), 5);
        t.truncate(h, 2).unwrap();
        assert_eq!(t.get(h).unwrap().len(), 2);
        t.extend(h, 3, 7).unwrap();
        assert_eq!(t.get(h).unwrap().as_slice(), &[1, 1, 7, 7, 7]);
    }

    #[test]
    fn sweep_unmarked_frees_only_unmarked_managed_series() {
        let mut t = table();
        let kept = t.make(4, SeriesFlags::empty());
        let freed = t.make(4, SeriesFlags::empty());
        let manual = t.make(4, SeriesFlags::empty());
        t.manage(kept).unwrap();
        t.manage(freed).unwrap();
        t.get_mut(kept).unwrap().mark();
        let reclaimed = t.sweep_unmarked();
        assert_eq!(reclaimed, 1);
        assert!(t.get(kept).is_some());
        assert!(t.get(freed).is_none());
        assert!(t.get(manual).is_some(), "unmanaged series must survive sweep untouched");
        assert!(!t.get(kept).unwrap().is_marked(), "surviving node's mark bit is cleared for the next cycle");
    }

    #[test]
    fn remake_preserve_keeps_prefix() {
        let mut t = table();
        let h = t.make(4, SeriesFlags::empty());
        t.extend(h, 4, 0).unwrap();
        for (i, v) in [10u8, 20, 30, 40].into_iter().enumerate() {
            t.get_mut(h).unwrap().set(i, v).unwrap();
        }
        t.remake(h, 2, true).unwrap();
        assert_eq!(t.get(h).unwrap().as_slice(), &[10, 20]);
    }
}
