//! `FUNC`: builds a user-defined `FUNCTION!` value from a spec block
//! and a body block (spec 4.8's mezzanine-adjacent bootstrap native —
//! kept in core for this reduced runtime rather than written as Rebol
//! source, since there is no mezzanine loader here).
//!
//! The spec block reuses exactly the same cell-kind encoding a
//! paramlist already uses (`convention.rs`'s doc comment), so decoding
//! it is the same `CellKind -> ParamConvention` mapping run in reverse.

use super::{arg, NativeBuilder, NativeCallCtx};
use crate::convention::build_paramlist;
use crate::{EvalError, Outcome, Param, ParamConvention};
use core_bind::bind_word;
use core_cell::{ArrayHandle, Cell, CellKind, FunctionPayload};
use core_context::ContextTable;
use core_series::SeriesTable;
use core_symbols::SymbolTable;

pub(crate) const NATIVES: &[NativeBuilder] = &[NativeBuilder {
    name: "func",
    params: &[("spec", ParamConvention::Normal), ("body", ParamConvention::Normal)],
    enfix: false,
    func: func_native,
}];

fn type_error(symbols: &mut SymbolTable, message: &str) -> EvalError {
    let id = symbols.intern(b"bad-func-arg");
    EvalError::User(core_throw::RebolError::new(core_throw::ErrorKind::Type, id, message.to_string()))
}

fn func_native(call: &mut NativeCallCtx<'_, '_>, out: &mut Cell) -> Result<Outcome, EvalError> {
    let spec = arg(call, 1)?;
    let body = arg(call, 2)?;
    if spec.kind() != CellKind::Block {
        return Err(type_error(call.ctx.symbols, "func requires a block! spec"));
    }
    if body.kind() != CellKind::Block {
        return Err(type_error(call.ctx.symbols, "func requires a block! body"));
    }

    let (spec_handle, spec_index) = spec.as_array_handle()?;
    let params = {
        let series = call
            .ctx
            .tables
            .arrays
            .get(spec_handle)
            .ok_or(core_series::SeriesError::StaleHandle)?;
        let mut params = Vec::new();
        for cell in &series.as_slice()[spec_index as usize..] {
            let Some(convention) = ParamConvention::from_kind(cell.kind()) else {
                return Err(type_error(call.ctx.symbols, "func spec words must be any-word!"));
            };
            let Some(symbol) = cell.symbol() else {
                return Err(type_error(call.ctx.symbols, "func spec words must carry a symbol"));
            };
            params.push(Param { symbol, convention });
        }
        params
    };

    let paramlist = build_paramlist(call.ctx.tables.arrays, &params)?;
    let (body_handle, _) = body.as_array_handle()?;
    bind_body_to_function(
        call.ctx.tables.arrays,
        body_handle,
        paramlist,
        &params,
        call.lib_context,
        call.ctx.tables.contexts,
        call.ctx.symbols,
    )?;

    *out = Cell::function(FunctionPayload {
        paramlist,
        body_holder: body_handle,
        native_id: None,
    });
    Ok(Outcome::Value)
}

/// Deep-binds `handle`'s array: a word matching one of `params` (by
/// canon spelling) becomes relatively bound to `paramlist` at that
/// parameter's slot; anything else falls back to an absolute bind
/// against `lib_context`, the same as top-level code sees. Mirrors
/// `core_bind::bind_deep`'s two-phase borrow pattern (collect child
/// array handles, then recurse after the borrow of `handle`'s own slice
/// ends) since this bind is not uniform across the whole tree.
#[allow(clippy::too_many_arguments)]
fn bind_body_to_function(
    arrays: &mut SeriesTable<Cell>,
    handle: ArrayHandle,
    paramlist: ArrayHandle,
    params: &[Param],
    lib_context: ArrayHandle,
    contexts: &ContextTable,
    symbols: &SymbolTable,
) -> Result<(), EvalError> {
    let mut children: Vec<ArrayHandle> = Vec::new();
    {
        let series = arrays.get_mut(handle).ok_or(core_series::SeriesError::StaleHandle)?;
        let slice = series.as_mut_slice()?;
        for cell in slice.iter_mut() {
            let kind = cell.kind();
            if kind.is_any_word() {
                if let Some(sym) = cell.symbol() {
                    let canon = symbols.canon(sym);
                    if let Some(slot) = params.iter().position(|p| symbols.canon(p.symbol) == canon) {
                        cell.rebind_relative(paramlist, (slot + 1) as u32)?;
                    } else {
                        bind_word(cell, lib_context, contexts, symbols)?;
                    }
                }
            } else if kind.is_any_array() {
                if let Ok((child, _)) = cell.as_array_handle() {
                    children.push(child);
                }
            }
        }
    }
    for child in children {
        bind_body_to_function(arrays, child, paramlist, params, lib_context, contexts, symbols)?;
    }
    Ok(())
}
