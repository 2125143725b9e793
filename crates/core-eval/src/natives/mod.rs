//! The native function registry (spec 4.8's "lib context"): a fixed
//! table of Rust-implemented dispatchers, each exposed to the evaluator
//! as an ordinary `FUNCTION!` cell whose `native_id` selects which
//! table entry runs instead of stepping through a body block.
//!
//! Mirrors `core-throw`'s closed, table-driven approach to errors
//! rather than a dynamic plugin registry — the set of natives is fixed
//! at bootstrap (spec 4.8, `BOOT_LOADED`) and never grows at runtime.

mod arithmetic;
mod control;
mod function;

use crate::convention::{build_paramlist, Param, ParamConvention};
use crate::{EvalContext, EvalError, FrameStack, Outcome};
use core_cell::{ArrayHandle, Cell, FunctionPayload};
use core_series::SeriesTable;
use core_symbols::SymbolTable;

/// One call's worth of context handed to a native's Rust function:
/// everything [`crate::dispatch::apply_function`] already gathered,
/// plus the frame it pushed, so a native reads its arguments out of
/// `frame_varlist` the same way a user-defined function's body would
/// via its paramlist's word cells.
pub struct NativeCallCtx<'x, 'a> {
    pub ctx: &'x mut EvalContext<'a>,
    pub frames: &'x mut FrameStack,
    pub natives: &'x NativeTable,
    pub lib_context: ArrayHandle,
    pub frame_varlist: ArrayHandle,
    pub paramlist: ArrayHandle,
}

pub type NativeFn = fn(&mut NativeCallCtx<'_, '_>, &mut Cell) -> Result<Outcome, EvalError>;

/// The compile-time description of one native, independent of any
/// runtime handle; [`NativeTable::build`] turns a list of these into
/// live [`NativeSpec`] entries by interning names and allocating
/// paramlists.
struct NativeBuilder {
    name: &'static str,
    params: &'static [(&'static str, ParamConvention)],
    enfix: bool,
    func: NativeFn,
}

pub struct NativeSpec {
    pub paramlist: ArrayHandle,
    pub enfix: bool,
    pub func: NativeFn,
}

/// The live, built table: one [`NativeSpec`] per registered native,
/// indexed by the same `native_id` stored in each native's
/// [`FunctionPayload`].
pub struct NativeTable {
    specs: Vec<NativeSpec>,
    names: Vec<core_symbols::SymbolId>,
}

impl NativeTable {
    /// Interns every native's name and parameter spelling, builds each
    /// one's paramlist, and returns the table in registration order —
    /// the order callers must use when wiring `native_id`s into the
    /// lib context (spec 4.8).
    pub fn build(arrays: &mut SeriesTable<Cell>, symbols: &mut SymbolTable) -> Result<Self, EvalError> {
        let builders: Vec<&NativeBuilder> = arithmetic::NATIVES
            .iter()
            .chain(control::NATIVES.iter())
            .chain(function::NATIVES.iter())
            .collect();

        let mut specs = Vec::with_capacity(builders.len());
        let mut names = Vec::with_capacity(builders.len());
        for builder in builders {
            let params: Vec<Param> = builder
                .params
                .iter()
                .map(|(name, convention)| Param {
                    symbol: symbols.intern(name.as_bytes()),
                    convention: *convention,
                })
                .collect();
            let paramlist = build_paramlist(arrays, &params)?;
            names.push(symbols.intern(builder.name.as_bytes()));
            specs.push(NativeSpec {
                paramlist,
                enfix: builder.enfix,
                func: builder.func,
            });
        }
        Ok(Self { specs, names })
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn get(&self, id: u32) -> &NativeSpec {
        &self.specs[id as usize]
    }

    /// The names in registration order, suitable for a single
    /// `ContextTable::create` call to build the lib context (contexts
    /// cannot grow incrementally, spec 4.3).
    pub fn names(&self) -> &[core_symbols::SymbolId] {
        &self.names
    }

    /// Builds the `FUNCTION!` cell for native `id`, with its enfix flag
    /// already set. Natives have no body block of their own, so
    /// `body_holder` reuses the paramlist handle as a placeholder —
    /// never read, since `native_id.is_some()` always short-circuits
    /// `body_holder` use in `apply_function`.
    pub fn cell(&self, id: u32) -> Cell {
        let spec = &self.specs[id as usize];
        let mut cell = Cell::function(FunctionPayload {
            paramlist: spec.paramlist,
            body_holder: spec.paramlist,
            native_id: Some(id),
        });
        if spec.enfix {
            cell.set_enfix(true);
        }
        cell
    }
}

pub(crate) fn arg(call: &NativeCallCtx<'_, '_>, slot: usize) -> Result<Cell, EvalError> {
    Ok(*call.ctx.tables.contexts.get_var(call.frame_varlist, slot)?)
}
