//! The stack-frame evaluator (`Do_Core`): walks an array of cells,
//! performing prefix/enfix dispatch, argument gathering, and function
//! calls, threading the throw/trap protocol and GC recycle dose
//! through every step.

mod convention;
mod dispatch;
pub mod natives;

pub use convention::{ParamConvention, Param};
pub use dispatch::{apply_function, do_array, do_next, eval_step, StepOutcome};

use core_bind::BindError;
use core_cell::{ArrayHandle, Cell, CellError};
use core_context::ContextError;
use core_gc::{Collector, GcTables};
use core_series::SeriesError;
use core_symbols::SymbolTable;
use core_throw::{HaltFlag, RebolError, ThrowState, TrapStack};

/// How many frames a call may nest before the core treats it as a
/// runaway recursion rather than legitimate depth.
pub const MAX_FRAME_DEPTH: usize = 4_000;

/// Number of evaluated steps between signal polls (the "eval dose").
pub const EVAL_DOSE: u32 = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    /// A user-visible error: wrong type, unbound word, arity mismatch,
    /// zero-divide, an explicit FAIL. Caught by TRAP, otherwise
    /// propagates to the embedder.
    #[error(transparent)]
    User(#[from] RebolError),
    #[error("call stack exceeded {MAX_FRAME_DEPTH} frames")]
    StackOverflow,
    #[error("cooperative halt requested")]
    Halted,
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Bind(#[from] BindError),
    #[error(transparent)]
    Cell(#[from] CellError),
    #[error(transparent)]
    Series(#[from] SeriesError),
}

/// The three-way result of running the evaluator over a span of cells,
/// replacing the historical "flag in the out cell" trick with an
/// explicit sum type (the error case is carried by `Result` itself).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// `out` holds an ordinary value.
    Value,
    /// `out` holds a thrown marker; the thrown argument and intended
    /// catcher live in `EvalContext::throw`.
    Thrown,
}

/// One call-in-progress. Frames chain through a plain `Vec` rather
/// than a `prior` pointer; depth is `frames.len()`.
#[derive(Debug, Clone, Copy)]
pub struct Frame {
    pub paramlist: ArrayHandle,
    pub varlist: ArrayHandle,
}

#[derive(Debug, Default)]
pub struct FrameStack(Vec<Frame>);

impl FrameStack {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn push(&mut self, frame: Frame) -> Result<(), EvalError> {
        if self.0.len() >= MAX_FRAME_DEPTH {
            return Err(EvalError::StackOverflow);
        }
        self.0.push(frame);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<Frame> {
        self.0.pop()
    }

    pub fn top(&self) -> Option<&Frame> {
        self.0.last()
    }

    /// The paramlist of the frame that called the one currently on
    /// top (used by the `return` native to find the function it
    /// should unwind to).
    pub fn caller_of_top(&self) -> Option<ArrayHandle> {
        let len = self.0.len();
        if len < 2 {
            None
        } else {
            Some(self.0[len - 2].paramlist)
        }
    }
}

/// Everything the evaluator touches besides the frame stack itself,
/// bundled so call sites thread one value instead of eight. `tables`
/// reuses `core_gc::GcTables` verbatim since recycling needs exactly
/// these five references.
pub struct EvalContext<'a> {
    pub tables: GcTables<'a>,
    pub symbols: &'a mut SymbolTable,
    pub throw: &'a mut ThrowState,
    pub traps: &'a mut TrapStack,
    pub halt: &'a HaltFlag,
    pub collector: &'a mut Collector,
    dose_remaining: u32,
}

impl<'a> EvalContext<'a> {
    pub fn new(
        tables: GcTables<'a>,
        symbols: &'a mut SymbolTable,
        throw: &'a mut ThrowState,
        traps: &'a mut TrapStack,
        halt: &'a HaltFlag,
        collector: &'a mut Collector,
    ) -> Self {
        Self {
            tables,
            symbols,
            throw,
            traps,
            halt,
            collector,
            dose_remaining: EVAL_DOSE,
        }
    }

    /// Cooperative signal poll: called once per evaluated step. Checks
    /// the halt flag and, if the allocator's ballast is exhausted,
    /// runs a recycle rooted additionally by `extra_roots` (the
    /// caller's live `out`/gathered cells that aren't reachable any
    /// other way at this instant).
    fn poll(&mut self, extra_roots: &[Cell]) -> Result<(), EvalError> {
        self.dose_remaining = self.dose_remaining.saturating_sub(1);
        if self.dose_remaining > 0 {
            return Ok(());
        }
        self.dose_remaining = EVAL_DOSE;
        if self.halt.check_and_clear() {
            return Err(EvalError::User(RebolError::new(
                core_throw::ErrorKind::Halt,
                self.symbols.intern(b"halt"),
                "halted".to_string(),
            )));
        }
        if self.collector.needs_recycle() {
            self.collector.recycle(&mut self.tables, extra_roots);
        }
        Ok(())
    }
}

/// Only `none` and `false` are falsy; every other value (including
/// zero and empty blocks) is truthy.
pub fn is_truthy(cell: &Cell) -> bool {
    !matches!(
        (cell.kind(), cell.as_logic()),
        (core_cell::CellKind::None, _) | (_, Ok(false))
    )
}

fn lookup_error(symbols: &mut SymbolTable, spelling: &str) -> RebolError {
    let id = symbols.intern(b"no-value");
    RebolError::new(
        core_throw::ErrorKind::Lookup,
        id,
        format!("{spelling} has no value"),
    )
}

fn arity_error(symbols: &mut SymbolTable, spelling: &str) -> RebolError {
    let id = symbols.intern(b"no-arg");
    RebolError::new(
        core_throw::ErrorKind::Arity,
        id,
        format!("{spelling} is missing an argument"),
    )
}

fn void_store_error(symbols: &mut SymbolTable) -> RebolError {
    let id = symbols.intern(b"need-value");
    RebolError::new(
        core_throw::ErrorKind::Type,
        id,
        "cannot store a void value".to_string(),
    )
}
