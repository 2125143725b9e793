//! Object / frame / module / error / port: a pair of co-allocated
//! series (spec "Context"). The **varlist** (`Series<Cell>`) holds slot
//! 0 as the self-value and slots `1..N` as variables; the **keylist**
//! (`Series<KeyInfo>`) carries the symbol and hidden/locked flags for
//! each slot. `len(varlist) == len(keylist)` always.
//!
//! Keylists here are a plain `Series<KeyInfo>` rather than a literal
//! array of typeset cells — a deliberate simplification recorded in
//! `DESIGN.md` to avoid needing a full `TYPESET!` datatype the rest of
//! this crate has no other use for.

use core_cell::{ArrayHandle, Cell, CellKind};
use core_mem::{Allocator, Handle};
use core_series::{Series, SeriesFlags, SeriesTable};
use core_symbols::{SymbolId, SymbolTable};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub type KeylistHandle = Handle<Series<KeyInfo>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyInfo {
    /// `None` only for slot 0 (the self-value has no key).
    pub symbol: Option<SymbolId>,
    pub hidden: bool,
    pub locked: bool,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ContextError {
    #[error("variable index {0} is out of range")]
    IndexOutOfRange(usize),
    #[error("context has expired (its frame already returned)")]
    Expired,
    #[error("slot 0 (the self-value) cannot be reassigned")]
    SelfSlotImmutable,
    #[error("key is locked against reassignment")]
    KeyLocked,
    #[error("void is not a storable value in a context slot")]
    VoidNotAllowed,
    #[error("handle does not refer to a live context")]
    StaleHandle,
    #[error(transparent)]
    Series(#[from] core_series::SeriesError),
}

/// Owns every varlist/keylist pair in one interpreter task.
pub struct ContextTable {
    varlists: SeriesTable<Cell>,
    keylists: SeriesTable<KeyInfo>,
    keylist_of: HashMap<ArrayHandle, KeylistHandle>,
    expired: HashSet<ArrayHandle>,
}

impl ContextTable {
    pub fn new(allocator: Arc<Allocator>) -> Self {
        Self {
            varlists: SeriesTable::new(allocator.clone()),
            keylists: SeriesTable::new(allocator),
            keylist_of: HashMap::new(),
            expired: HashSet::new(),
        }
    }

    /// Allocates a new context with one slot per symbol in `keys`, plus
    /// the self-value at slot 0. Every variable slot starts holding an
    /// internal `Void` placeholder (spec's "tolerated as internal
    /// zombie marker" exception — this is the raw bypass the resolved
    /// Open Question in `DESIGN.md` calls out) until assigned through
    /// [`ContextTable::set_var`].
    pub fn create(&mut self, keys: &[SymbolId]) -> ArrayHandle {
        let len = keys.len() + 1;
        let varlist = self.varlists.make(len, SeriesFlags::empty());
        let keylist = self.keylists.make(len, SeriesFlags::empty());

        self.varlists
            .push(varlist, Cell::object(varlist))
            .expect("freshly made series is writable");
        self.keylists
            .push(
                keylist,
                KeyInfo {
                    symbol: None,
                    hidden: true,
                    locked: true,
                },
            )
            .expect("freshly made series is writable");

        for &symbol in keys {
            self.varlists
                .push(varlist, Cell::void())
                .expect("freshly made series is writable");
            self.keylists
                .push(
                    keylist,
                    KeyInfo {
                        symbol: Some(symbol),
                        hidden: false,
                        locked: false,
                    },
                )
                .expect("freshly made series is writable");
        }

        self.varlists.manage(varlist).expect("just created, unmanaged");
        self.keylists.manage(keylist).expect("just created, unmanaged");
        self.keylist_of.insert(varlist, keylist);
        varlist
    }

    fn varlist(&self, ctx: ArrayHandle) -> Result<&Series<Cell>, ContextError> {
        self.varlists.get(ctx).ok_or(ContextError::StaleHandle)
    }

    fn keylist_handle(&self, ctx: ArrayHandle) -> Result<KeylistHandle, ContextError> {
        self.keylist_of.get(&ctx).copied().ok_or(ContextError::StaleHandle)
    }

    pub fn len(&self, ctx: ArrayHandle) -> Result<usize, ContextError> {
        Ok(self.varlist(ctx)?.len())
    }

    pub fn self_value(&self, ctx: ArrayHandle) -> Result<&Cell, ContextError> {
        self.get_var(ctx, 0)
    }

    pub fn is_expired(&self, ctx: ArrayHandle) -> bool {
        self.expired.contains(&ctx)
    }

    /// Marks a frame's varlist as expired (its function body has
    /// returned); subsequent reads of its variables become errors
    /// rather than reading stale/reused storage (spec Context
    /// invariants).
    pub fn mark_expired(&mut self, ctx: ArrayHandle) {
        self.expired.insert(ctx);
        tracing::trace!(target: "context.lifecycle", ctx = ctx.index(), "mark_expired");
    }

    pub fn key_info(&self, ctx: ArrayHandle, index: usize) -> Result<KeyInfo, ContextError> {
        let keylist = self.keylist_handle(ctx)?;
        let series = self.keylists.get(keylist).ok_or(ContextError::StaleHandle)?;
        series
            .get(index)
            .copied()
            .ok_or(ContextError::IndexOutOfRange(index))
    }

    /// Case-insensitive slot lookup by symbol, consulting `symbols` for
    /// canon equivalence (spec 4.3's case-insensitive identity rule).
    pub fn find_word(
        &self,
        ctx: ArrayHandle,
        symbol: SymbolId,
        symbols: &SymbolTable,
    ) -> Result<Option<usize>, ContextError> {
        let keylist = self.keylist_handle(ctx)?;
        let series = self.keylists.get(keylist).ok_or(ContextError::StaleHandle)?;
        let canon = symbols.canon(symbol);
        for (index, key) in series.as_slice().iter().enumerate() {
            if let Some(key_symbol) = key.symbol {
                if symbols.canon(key_symbol) == canon {
                    return Ok(Some(index));
                }
            }
        }
        Ok(None)
    }

    /// Every variable cell including the self-value, bypassing the
    /// "expired" check — `core-gc`'s mark phase must still trace an
    /// expired frame's variables (the memory is alive until swept; only
    /// *application* reads through [`ContextTable::get_var`] are
    /// blocked).
    pub fn raw_slots(&self, ctx: ArrayHandle) -> Result<&[Cell], ContextError> {
        Ok(self.varlist(ctx)?.as_slice())
    }

    /// GC mark-phase hook: marks both the varlist's and keylist's
    /// backing nodes. Idempotent, so the caller can always check
    /// [`ContextTable::is_marked`] first to stop recursing into an
    /// already-visited context (spec 4.5: "cycle-safety is the mark
    /// bit").
    pub fn mark(&mut self, ctx: ArrayHandle) -> Result<(), ContextError> {
        let keylist = self.keylist_handle(ctx)?;
        self.varlists.get_mut(ctx).ok_or(ContextError::StaleHandle)?.mark();
        if let Some(k) = self.keylists.get_mut(keylist) {
            k.mark();
        }
        Ok(())
    }

    pub fn is_marked(&self, ctx: ArrayHandle) -> bool {
        self.varlists.get(ctx).map(|s| s.is_marked()).unwrap_or(false)
    }

    /// GC sweep-phase hook: reclaims every unmarked managed varlist and
    /// keylist, then drops bookkeeping (`keylist_of`, `expired`) for any
    /// varlist handle the sweep just freed. Returns the number of
    /// contexts reclaimed.
    pub fn sweep(&mut self) -> usize {
        let freed = self.varlists.sweep_unmarked();
        self.keylists.sweep_unmarked();
        self.keylist_of.retain(|&handle, _| self.varlists.get(handle).is_some());
        self.expired.retain(|&handle| self.varlists.get(handle).is_some());
        freed
    }

    pub fn get_var(&self, ctx: ArrayHandle, index: usize) -> Result<&Cell, ContextError> {
        if self.is_expired(ctx) {
            return Err(ContextError::Expired);
        }
        self.varlist(ctx)?
            .get(index)
            .ok_or(ContextError::IndexOutOfRange(index))
    }

    /// `set_var`: rejects `Void` (spec's public-surface invariant —
    /// Void may live in a slot only via [`ContextTable::create`]'s
    /// initial population, never through assignment), rejects
    /// reassigning slot 0, and rejects a key marked locked.
    pub fn set_var(&mut self, ctx: ArrayHandle, index: usize, value: Cell) -> Result<(), ContextError> {
        if value.kind() == CellKind::Void {
            return Err(ContextError::VoidNotAllowed);
        }
        if index == 0 {
            return Err(ContextError::SelfSlotImmutable);
        }
        if self.is_expired(ctx) {
            return Err(ContextError::Expired);
        }
        let key = self.key_info(ctx, index)?;
        if key.locked {
            return Err(ContextError::KeyLocked);
        }
        let series = self.varlists.get_mut(ctx).ok_or(ContextError::StaleHandle)?;
        series.set(index, value)?;
        Ok(())
    }

    pub fn lock_key(&mut self, ctx: ArrayHandle, index: usize) -> Result<(), ContextError> {
        let keylist = self.keylist_handle(ctx)?;
        let series = self.keylists.get_mut(keylist).ok_or(ContextError::StaleHandle)?;
        let slot = series
            .as_mut_slice()?
            .get_mut(index)
            .ok_or(ContextError::IndexOutOfRange(index))?;
        slot.locked = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ContextTable {
        ContextTable::new(Arc::new(Allocator::new(1 << 20)))
    }

    #[test]
    fn create_populates_self_value_and_voids() {
        let mut t = table();
        let mut symbols = SymbolTable::new();
        let a = symbols.intern(b"a");
        let b = symbols.intern(b"b");
        let ctx = t.create(&[a, b]);
        assert_eq!(t.len(ctx).unwrap(), 3);
        assert_eq!(t.self_value(ctx).unwrap().as_context().unwrap().varlist, ctx);
        assert_eq!(t.get_var(ctx, 1).unwrap().kind(), CellKind::Void);
        assert_eq!(t.get_var(ctx, 2).unwrap().kind(), CellKind::Void);
    }

    #[test]
    fn sweep_reclaims_unmarked_and_keeps_marked() {
        let mut t = table();
        let mut symbols = SymbolTable::new();
        let a = symbols.intern(b"a");
        let kept = t.create(&[a]);
        let freed = t.create(&[a]);
        t.mark(kept).unwrap();
        let reclaimed = t.sweep();
        assert_eq!(reclaimed, 1);
        assert!(t.raw_slots(kept).is_ok());
        assert!(t.raw_slots(freed).is_err());
    }

    #[test]
    fn set_var_rejects_void_and_self_slot() {
        let mut t = table();
        let mut symbols = SymbolTable::new();
        let a = symbols.intern(b"a");
        let ctx = t.create(&[a]);
        assert_eq!(
            t.set_var(ctx, 1, Cell::void()).unwrap_err(),
            ContextError::VoidNotAllowed
        );
        assert_eq!(
            t.set_var(ctx, 0, Cell::integer(1)).unwrap_err(),
            ContextError::SelfSlotImmutable
        );
        t.set_var(ctx, 1, Cell::integer(99)).unwrap();
        assert_eq!(t.get_var(ctx, 1).unwrap().as_integer().unwrap(), 99);
    }

    #[test]
    fn find_word_is_case_insensitive() {
        let mut t = table();
        let mut symbols = SymbolTable::new();
        let foo = symbols.intern(b"foo");
        let ctx = t.create(&[foo]);
        let query = symbols.intern(b"FOO");
        assert_eq!(t.find_word(ctx, query, &symbols).unwrap(), Some(1));
    }

    #[test]
    fn expired_context_rejects_reads() {
        let mut t = table();
        let mut symbols = SymbolTable::new();
        let a = symbols.intern(b"a");
        let ctx = t.create(&[a]);
        t.mark_expired(ctx);
        assert_eq!(t.get_var(ctx, 1).unwrap_err(), ContextError::Expired);
    }

    #[test]
    fn locked_key_rejects_reassignment() {
        let mut t = table();
        let mut symbols = SymbolTable::new();
        let a = symbols.intern(b"a");
        let ctx = t.create(&[a]);
        t.set_var(ctx, 1, Cell::integer(1)).unwrap();
        t.lock_key(ctx, 1).unwrap();
        assert_eq!(
            t.set_var(ctx, 1, Cell::integer(2)).unwrap_err(),
            ContextError::KeyLocked
        );
    }
}
