//! Throw / trap protocol and the error taxonomy (spec 4.7, 7).
//!
//! Non-local exits (RETURN, BREAK, CONTINUE, THROW, a user error) are
//! encoded the same way regardless of which one they are: the
//! evaluator's own out-cell gets its `THROWN` flag set, and the actual
//! payload being carried is stashed in a task-local slot
//! ([`ThrowState`]) rather than in the cell itself — a thrown cell may
//! never live inside an aggregate (spec's Cell invariants), so there is
//! nowhere on the cell itself to keep a second value.
//!
//! TRAP/CATCH boundaries are not implemented as a literal longjmp (the
//! redesign flag the spec calls out explicitly): every evaluator entry
//! point instead returns `Result<_, RebolError>`, and a trap boundary is
//! just the point where a caller `match`es that `Result` instead of
//! propagating it with `?`. [`TrapStack`] only tracks the depth
//! bookkeeping the spec's testable properties ask for — actual
//! unwinding is ordinary Rust control flow.

use core_cell::{ArrayHandle, Cell};
use core_context::ContextTable;
use core_mem::Handle;
use core_symbols::{SymbolId, SymbolTable};
use std::sync::atomic::{AtomicBool, Ordering};

/// Identifies who a non-local exit is meant for. Kept as a small typed
/// enum in the task-local slot rather than re-derived by inspecting the
/// out-cell's payload shape: THROW's target is a name (a symbol),
/// RETURN's is a specific function's identity, BREAK/CONTINUE need no
/// identity at all, and none of that belongs in `core-cell`'s `Payload`
/// — this crate is the one place in the workspace that knows what a
/// "catcher" is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrowCatcher {
    /// `THROW value` with no `/name` — caught by a bare `CATCH`.
    Unnamed,
    /// `THROW/NAME value 'foo` — caught by `CATCH/NAME [...] 'foo`.
    Named(SymbolId),
    /// `RETURN value` — caught only by the frame whose paramlist this is.
    Function(ArrayHandle),
    /// `BREAK` — caught unconditionally by the nearest loop, which stops
    /// iterating.
    LoopBreak,
    /// `CONTINUE` — caught unconditionally by the nearest loop, which
    /// skips the rest of the current iteration's body and re-tests its
    /// condition.
    LoopContinue,
}

/// Per-task state for one in-flight non-local exit. A task has at most
/// one of these in flight at a time (spec 5: no two frames execute
/// concurrently against the same task).
#[derive(Debug, Default)]
pub struct ThrowState {
    catcher: Option<ThrowCatcher>,
    arg: Option<Cell>,
}

impl ThrowState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a non-local exit: flags `out` as thrown and stashes the
    /// catcher identity and the carried value in the task-local slot.
    pub fn throw(&mut self, out: &mut Cell, catcher: ThrowCatcher, arg: Cell) {
        out.set_thrown();
        self.catcher = Some(catcher);
        self.arg = Some(arg);
    }

    /// "Take thrown arg": clears the flag on `out` and hands back the
    /// catcher identity and value. Returns `None` if `out` was not
    /// actually thrown — callers use this to decide between handling
    /// and propagating (spec 4.7).
    pub fn take_thrown(&mut self, out: &mut Cell) -> Option<(ThrowCatcher, Cell)> {
        if !out.is_thrown() {
            return None;
        }
        out.clear_thrown();
        match (self.catcher.take(), self.arg.take()) {
            (Some(catcher), Some(arg)) => Some((catcher, arg)),
            _ => None,
        }
    }

    /// Inspects the pending catcher without consuming it — used by
    /// enfix/loop dispatch to decide whether *this* layer is the
    /// intended catcher before committing to `take_thrown`.
    pub fn peek_catcher(&self) -> Option<ThrowCatcher> {
        self.catcher
    }
}

/// Does an unnamed `CATCH` (no `/name`, no `/any`) catch this throw?
pub fn catches_unnamed(catcher: ThrowCatcher) -> bool {
    matches!(catcher, ThrowCatcher::Unnamed)
}

/// Does `CATCH/NAME [...] name` catch this throw? Symbol comparison is
/// case-insensitive, matching every other word comparison in this
/// runtime.
pub fn catches_named(catcher: ThrowCatcher, name: SymbolId, symbols: &SymbolTable) -> bool {
    match catcher {
        ThrowCatcher::Named(sym) => symbols.canon(sym) == symbols.canon(name),
        _ => false,
    }
}

/// Does `CATCH/ANY` catch this throw? Everything except a `RETURN`
/// (which is never meant for a `CATCH`, only for the function it
/// returns from) or a loop exit (meant only for the nearest loop).
pub fn catches_any(catcher: ThrowCatcher) -> bool {
    matches!(catcher, ThrowCatcher::Unnamed | ThrowCatcher::Named(_))
}

/// Is this a `BREAK`/`CONTINUE` loop exit, and if so which one? Loop
/// natives use this instead of `catches_*` since a loop unconditionally
/// intercepts either kind regardless of name.
pub fn catches_loop(catcher: ThrowCatcher) -> Option<bool> {
    match catcher {
        ThrowCatcher::LoopBreak => Some(false),
        ThrowCatcher::LoopContinue => Some(true),
        _ => None,
    }
}

/// Does a pending `RETURN` target this exact function's frame?
pub fn returns_to(catcher: ThrowCatcher, paramlist: ArrayHandle) -> bool {
    matches!(catcher, ThrowCatcher::Function(p) if p == paramlist)
}

/// The eight error categories spec 7 groups error kinds into. Closed:
/// every `RebolError` belongs to exactly one.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    #[error("type error")]
    Type,
    #[error("arity error")]
    Arity,
    #[error("lookup error")]
    Lookup,
    #[error("limit error")]
    Limit,
    #[error("protection error")]
    Protection,
    #[error("syntax error")]
    Syntax,
    #[error("halt")]
    Halt,
    #[error("user error")]
    User,
}

/// A raised error at the Rust level, before it has been materialized
/// into a language-visible `error!` context. `id` is the specific
/// symbol (e.g. `zero-divide`); `kind` is its category.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct RebolError {
    pub kind: ErrorKind,
    pub id: SymbolId,
    pub message: String,
}

impl RebolError {
    pub fn new(kind: ErrorKind, id: SymbolId, message: impl Into<String>) -> Self {
        Self {
            kind,
            id,
            message: message.into(),
        }
    }
}

/// The fields of an `error!` context (spec 7's field list), already
/// converted to cells by the caller — `where`/`near` need a call-stack
/// snapshot only the evaluator has, and `message` may be a string or a
/// block, so this crate takes them as opaque `Cell`s rather than typing
/// them itself.
pub struct ErrorFields {
    pub kind: Cell,
    pub id: Cell,
    pub message: Cell,
    pub where_: Cell,
    pub near: Cell,
    pub file: Cell,
    pub line: Cell,
}

/// Builds the `error!` context shape spec 7 requires: a context with
/// exactly the fields `type id message where near file line`, in that
/// order (so slot 1 is `type`, slot 7 is `line`).
pub fn make_error_context(
    contexts: &mut ContextTable,
    symbols: &mut SymbolTable,
    fields: ErrorFields,
) -> ArrayHandle {
    let keys = [
        symbols.intern(b"type"),
        symbols.intern(b"id"),
        symbols.intern(b"message"),
        symbols.intern(b"where"),
        symbols.intern(b"near"),
        symbols.intern(b"file"),
        symbols.intern(b"line"),
    ];
    let ctx = contexts.create(&keys);
    let values = [
        fields.kind,
        fields.id,
        fields.message,
        fields.where_,
        fields.near,
        fields.file,
        fields.line,
    ];
    for (i, value) in values.into_iter().enumerate() {
        contexts
            .set_var(ctx, i + 1, value)
            .expect("error field slots accept any non-void value");
    }
    ctx
}

/// A snapshot of every counter a TRAP/CATCH boundary must save and
/// later restore (spec 4.7's "state snapshot"). `core-throw` only
/// carries the numbers; the evaluator (`core-eval`) is the one thing
/// that knows how to read and restore them from its own live state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrapState {
    pub data_stack_ptr: usize,
    pub frame_stack_top: usize,
    pub mold_buffer_len: usize,
    pub guarded_depth: usize,
    pub manuals_depth: usize,
    pub trap_stack_top: usize,
}

/// The nested stack of in-flight trap boundaries. Pushing and popping
/// happens in strict LIFO order; `unwind_to` is the recovery path an
/// error takes when it escapes one or more nested traps without
/// visiting their normal drop (ordinary `?`-propagation already
/// unwound the Rust call stack by the time `unwind_to` runs — this only
/// reconciles the bookkeeping).
#[derive(Debug, Default)]
pub struct TrapStack {
    stack: Vec<TrapState>,
}

impl TrapStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// `push_trap`: records the state at the moment a trap boundary is
    /// entered.
    pub fn push_trap(&mut self, state: TrapState) {
        self.stack.push(state);
    }

    /// `drop_trap`: pops the innermost trap and asserts the state
    /// observed at drop time matches what was captured at push (spec 8
    /// testable property 4). A mismatch is a bug in the caller, not a
    /// recoverable condition.
    pub fn drop_trap(&mut self, observed: TrapState) -> Option<TrapState> {
        let popped = self.stack.pop()?;
        debug_assert_eq!(popped, observed, "trap state imbalance at drop");
        Some(popped)
    }

    /// Truncates back to `depth` without checking state equality — the
    /// path an error takes unwinding past however many nested traps it
    /// escapes on its way to the one that actually catches it.
    pub fn unwind_to(&mut self, depth: usize) {
        self.stack.truncate(depth);
    }

    pub fn innermost(&self) -> Option<TrapState> {
        self.stack.last().copied()
    }
}

/// Cooperative cancellation flag (spec 5 "Cancellation"). Unlike the
/// GC's plain-`u64` counters, this one really can be touched from
/// outside the single cooperative task — a host's signal handler or a
/// UI thread raises it — so it is a genuine atomic, the same way this
/// codebase's other cross-thread counters are (e.g. its async-input
/// failure counters).
#[derive(Debug, Default)]
pub struct HaltFlag(AtomicBool);

impl HaltFlag {
    pub fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// The evaluator's signal-poll call: if a halt is pending, clears it
    /// and reports it so the caller can raise a halt error.
    pub fn check_and_clear(&self) -> bool {
        self.0.swap(false, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throw_then_take_round_trips_and_clears_the_flag() {
        let mut state = ThrowState::new();
        let mut out = Cell::integer(0);
        state.throw(&mut out, ThrowCatcher::Unnamed, Cell::integer(42));
        assert!(out.is_thrown());

        let (catcher, arg) = state.take_thrown(&mut out).unwrap();
        assert!(!out.is_thrown());
        assert_eq!(catcher, ThrowCatcher::Unnamed);
        assert_eq!(arg.as_integer().unwrap(), 42);
        assert!(state.take_thrown(&mut out).is_none());
    }

    #[test]
    fn named_catch_matches_case_insensitively() {
        let mut symbols = SymbolTable::new();
        let foo = symbols.intern(b"foo");
        let query = symbols.intern(b"FOO");
        let other = symbols.intern(b"bar");

        assert!(catches_named(ThrowCatcher::Named(foo), query, &symbols));
        assert!(!catches_named(ThrowCatcher::Named(foo), other, &symbols));
        assert!(!catches_named(ThrowCatcher::Unnamed, query, &symbols));
    }

    #[test]
    fn catches_any_excludes_return_and_loop() {
        let mut symbols = SymbolTable::new();
        let foo = symbols.intern(b"foo");
        assert!(catches_any(ThrowCatcher::Unnamed));
        assert!(catches_any(ThrowCatcher::Named(foo)));
        assert!(!catches_any(ThrowCatcher::LoopBreak));
        assert!(!catches_any(ThrowCatcher::LoopContinue));
    }

    #[test]
    fn catches_loop_distinguishes_break_from_continue() {
        assert_eq!(catches_loop(ThrowCatcher::LoopBreak), Some(false));
        assert_eq!(catches_loop(ThrowCatcher::LoopContinue), Some(true));
        assert_eq!(catches_loop(ThrowCatcher::Unnamed), None);
    }

    #[test]
    fn return_targets_only_its_own_function() {
        let mut arrays: core_series::SeriesTable<Cell> =
            core_series::SeriesTable::new(std::sync::Arc::new(core_mem::Allocator::new(1 << 16)));
        let a = arrays.make(0, core_series::SeriesFlags::empty());
        let b = arrays.make(0, core_series::SeriesFlags::empty());
        assert!(returns_to(ThrowCatcher::Function(a), a));
        assert!(!returns_to(ThrowCatcher::Function(a), b));
    }

    #[test]
    fn trap_stack_tracks_depth_and_asserts_on_balanced_drop() {
        let mut traps = TrapStack::new();
        let state = TrapState {
            data_stack_ptr: 4,
            ..Default::default()
        };
        traps.push_trap(state);
        assert_eq!(traps.depth(), 1);
        let popped = traps.drop_trap(state).unwrap();
        assert_eq!(popped, state);
        assert_eq!(traps.depth(), 0);
    }

    #[test]
    fn unwind_to_drops_traps_skipped_by_an_escaping_error() {
        let mut traps = TrapStack::new();
        traps.push_trap(TrapState::default());
        traps.push_trap(TrapState {
            data_stack_ptr: 1,
            ..Default::default()
        });
        traps.push_trap(TrapState {
            data_stack_ptr: 2,
            ..Default::default()
        });
        assert_eq!(traps.depth(), 3);
        traps.unwind_to(1);
        assert_eq!(traps.depth(), 1);
    }

    #[test]
    fn halt_flag_is_one_shot() {
        let flag = HaltFlag::new();
        assert!(!flag.check_and_clear());
        flag.raise();
        assert!(flag.check_and_clear());
        assert!(!flag.check_and_clear());
    }

    #[test]
    fn make_error_context_lays_out_fields_in_spec_order() {
        let alloc = std::sync::Arc::new(core_mem::Allocator::new(1 << 16));
        let mut contexts = ContextTable::new(alloc);
        let mut symbols = SymbolTable::new();
        let id_sym = symbols.intern(b"zero-divide");

        let ctx = make_error_context(
            &mut contexts,
            &mut symbols,
            ErrorFields {
                kind: Cell::word_unbound(symbols.intern(b"type")),
                id: Cell::word_unbound(id_sym),
                message: Cell::none_value(),
                where_: Cell::none_value(),
                near: Cell::none_value(),
                file: Cell::none_value(),
                line: Cell::none_value(),
            },
        );

        assert_eq!(contexts.len(ctx).unwrap(), 8); // self-value + 7 fields
        assert_eq!(contexts.get_var(ctx, 2).unwrap().symbol(), Some(id_sym));
    }
}
