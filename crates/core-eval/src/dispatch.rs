//! `Do_Core`: the stack-frame evaluator proper (spec 4.6).
//!
//! Three layers, each a thin wrapper around the one below:
//! - [`eval_step`] dispatches exactly one cell, including a full prefix
//!   function call (which consumes its own arguments) but *not* any
//!   enfix continuation.
//! - [`do_next`] evaluates one complete expression: one [`eval_step`]
//!   plus a loop that keeps extending the result for as long as the
//!   next token is a word bound to an enfix function.
//! - [`do_array`] runs [`do_next`] to completion over a span, the shape
//!   a function body or a top-level program needs.
//!
//! The prefix/enfix split is what gives `1 + 2 * 3` its value of `9`
//! rather than `7`: an enfix operator's own *remaining* arguments are
//! gathered with [`eval_step`] (a single primitive term, no further
//! enfix extension), while a prefix call's arguments are gathered with
//! [`do_next`] (a full expression). Left-to-right evaluation with no
//! precedence falls out of that distinction for free — the outer
//! `do_next` loop is what chains `+` into `*` afterward, not the other
//! way around.

use crate::convention::{decode_paramlist, Param, ParamConvention};
use crate::natives::{NativeCallCtx, NativeTable};
use crate::{EvalContext, EvalError, Frame, FrameStack, Outcome};
use core_bind::{resolve, Specifier};
use core_cell::{ArrayHandle, Cell, CellKind, FunctionPayload};
use core_series::SeriesError;
use core_symbols::SymbolId;
use core_throw::ThrowCatcher;
use smallvec::SmallVec;
use std::collections::HashSet;

/// The result of running the evaluator over a span of cells: either it
/// ran off the end with nothing more to evaluate, produced a value at
/// the given next index, or produced a thrown exit at the given next
/// index (the index is kept even when thrown so a caller mid-gather can
/// report where the feed was left).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    End,
    Value(u32),
    Thrown(u32),
}

fn fetch(ctx: &EvalContext, array: ArrayHandle, index: u32) -> Result<Option<Cell>, EvalError> {
    let series = ctx.tables.arrays.get(array).ok_or(SeriesError::StaleHandle)?;
    Ok(series.get(index as usize).copied())
}

fn word_spelling(ctx: &EvalContext, cell: &Cell) -> String {
    cell.symbol()
        .map(|s| ctx.symbols.spelling(s).to_string())
        .unwrap_or_else(|| "word".to_string())
}

/// Dispatches exactly one cell at `index`. Function calls reached via a
/// `WORD!` or a literal `FUNCTION!` consume their own arguments from the
/// same feed before this returns.
pub fn eval_step(
    ctx: &mut EvalContext,
    frames: &mut FrameStack,
    natives: &NativeTable,
    lib_context: ArrayHandle,
    array: ArrayHandle,
    index: u32,
    specifier: Specifier,
    out: &mut Cell,
) -> Result<StepOutcome, EvalError> {
    ctx.poll(&[*out])?;

    let Some(cell) = fetch(ctx, array, index)? else {
        return Ok(StepOutcome::End);
    };
    let next_index = index + 1;

    match cell.kind() {
        CellKind::Bar => {
            *out = Cell::void();
            Ok(StepOutcome::Value(next_index))
        }
        CellKind::LitWord | CellKind::LitPath => {
            *out = cell.unquote()?;
            Ok(StepOutcome::Value(next_index))
        }
        CellKind::GetWord => {
            let Some(resolved) = resolve(&cell, specifier)? else {
                let spelling = word_spelling(ctx, &cell);
                return Err(crate::lookup_error(ctx.symbols, &spelling).into());
            };
            *out = *ctx.tables.contexts.get_var(resolved.context, resolved.index as usize)?;
            Ok(StepOutcome::Value(next_index))
        }
        CellKind::GetPath => {
            *out = eval_path_value(ctx, specifier, &cell)?;
            Ok(StepOutcome::Value(next_index))
        }
        CellKind::SetWord => match do_next(ctx, frames, natives, lib_context, array, next_index, specifier, out)? {
            StepOutcome::End => {
                let spelling = word_spelling(ctx, &cell);
                Err(crate::arity_error(ctx.symbols, &spelling).into())
            }
            StepOutcome::Thrown(after) => Ok(StepOutcome::Thrown(after)),
            StepOutcome::Value(after) => {
                if out.is_void() {
                    return Err(crate::void_store_error(ctx.symbols).into());
                }
                let Some(resolved) = resolve(&cell, specifier)? else {
                    let spelling = word_spelling(ctx, &cell);
                    return Err(crate::lookup_error(ctx.symbols, &spelling).into());
                };
                ctx.tables
                    .contexts
                    .set_var(resolved.context, resolved.index as usize, *out)?;
                Ok(StepOutcome::Value(after))
            }
        },
        CellKind::SetPath => match do_next(ctx, frames, natives, lib_context, array, next_index, specifier, out)? {
            StepOutcome::End => Err(crate::arity_error(ctx.symbols, "set-path!").into()),
            StepOutcome::Thrown(after) => Ok(StepOutcome::Thrown(after)),
            StepOutcome::Value(after) => {
                if out.is_void() {
                    return Err(crate::void_store_error(ctx.symbols).into());
                }
                set_path_value(ctx, specifier, &cell, *out)?;
                Ok(StepOutcome::Value(after))
            }
        },
        CellKind::Group => {
            let (handle, gindex) = cell.as_array_handle()?;
            match do_array(ctx, frames, natives, lib_context, handle, gindex, specifier, out)? {
                StepOutcome::End => {
                    *out = Cell::none_value();
                    Ok(StepOutcome::Value(next_index))
                }
                StepOutcome::Value(_) => Ok(StepOutcome::Value(next_index)),
                StepOutcome::Thrown(_) => Ok(StepOutcome::Thrown(next_index)),
            }
        }
        CellKind::Path => eval_path_call(
            ctx,
            frames,
            natives,
            lib_context,
            &cell,
            array,
            next_index,
            specifier,
            out,
        ),
        CellKind::Word => {
            let Some(resolved) = resolve(&cell, specifier)? else {
                let spelling = word_spelling(ctx, &cell);
                return Err(crate::lookup_error(ctx.symbols, &spelling).into());
            };
            let value = *ctx.tables.contexts.get_var(resolved.context, resolved.index as usize)?;
            if value.kind() == CellKind::Function {
                apply_function(
                    ctx,
                    frames,
                    natives,
                    lib_context,
                    value,
                    false,
                    None,
                    &HashSet::new(),
                    array,
                    next_index,
                    specifier,
                    out,
                )
            } else {
                *out = value;
                Ok(StepOutcome::Value(next_index))
            }
        }
        CellKind::Function => apply_function(
            ctx,
            frames,
            natives,
            lib_context,
            cell,
            false,
            None,
            &HashSet::new(),
            array,
            next_index,
            specifier,
            out,
        ),
        _ => {
            *out = cell;
            Ok(StepOutcome::Value(next_index))
        }
    }
}

/// One complete expression: an [`eval_step`], then as many enfix
/// continuations as the feed offers.
pub fn do_next(
    ctx: &mut EvalContext,
    frames: &mut FrameStack,
    natives: &NativeTable,
    lib_context: ArrayHandle,
    array: ArrayHandle,
    index: u32,
    specifier: Specifier,
    out: &mut Cell,
) -> Result<StepOutcome, EvalError> {
    let mut idx = match eval_step(ctx, frames, natives, lib_context, array, index, specifier, out)? {
        StepOutcome::End => return Ok(StepOutcome::End),
        StepOutcome::Thrown(after) => return Ok(StepOutcome::Thrown(after)),
        StepOutcome::Value(after) => after,
    };

    loop {
        let Some(next_cell) = fetch(ctx, array, idx)? else {
            break;
        };
        if next_cell.kind() != CellKind::Word {
            break;
        }
        let Some(resolved) = resolve(&next_cell, specifier)? else {
            break;
        };
        let func_val = *ctx.tables.contexts.get_var(resolved.context, resolved.index as usize)?;
        if func_val.kind() != CellKind::Function || !func_val.is_enfix() {
            break;
        }
        let left = *out;
        match apply_function(
            ctx,
            frames,
            natives,
            lib_context,
            func_val,
            true,
            Some(left),
            &HashSet::new(),
            array,
            idx + 1,
            specifier,
            out,
        )? {
            StepOutcome::Thrown(after) => return Ok(StepOutcome::Thrown(after)),
            StepOutcome::End => return Ok(StepOutcome::End),
            StepOutcome::Value(after) => idx = after,
        }
    }

    Ok(StepOutcome::Value(idx))
}

/// Runs [`do_next`] to completion over `array` starting at `index`,
/// leaving `out` holding the last expression's value (or `none` if the
/// span was empty).
pub fn do_array(
    ctx: &mut EvalContext,
    frames: &mut FrameStack,
    natives: &NativeTable,
    lib_context: ArrayHandle,
    array: ArrayHandle,
    index: u32,
    specifier: Specifier,
    out: &mut Cell,
) -> Result<StepOutcome, EvalError> {
    let mut idx = index;
    let mut produced = false;
    loop {
        match do_next(ctx, frames, natives, lib_context, array, idx, specifier, out)? {
            StepOutcome::End => {
                if !produced {
                    *out = Cell::none_value();
                }
                return Ok(StepOutcome::End);
            }
            StepOutcome::Thrown(after) => return Ok(StepOutcome::Thrown(after)),
            StepOutcome::Value(after) => {
                idx = after;
                produced = true;
            }
        }
    }
}

/// Pushes a frame sized to `func_cell`'s paramlist, gathers one argument
/// per parameter according to its [`ParamConvention`], invokes the
/// function's dispatcher (a native or a user body), and always pops the
/// frame again before returning — including on error, so a `TRAP` that
/// catches an error several calls down does not have to reconcile a
/// leaked frame stack itself.
#[allow(clippy::too_many_arguments)]
pub fn apply_function(
    ctx: &mut EvalContext,
    frames: &mut FrameStack,
    natives: &NativeTable,
    lib_context: ArrayHandle,
    func_cell: Cell,
    is_enfix_call: bool,
    left_operand: Option<Cell>,
    provided_refinements: &HashSet<SymbolId>,
    array: ArrayHandle,
    index: u32,
    specifier: Specifier,
    out: &mut Cell,
) -> Result<StepOutcome, EvalError> {
    let payload = func_cell.as_function()?;
    let params = decode_paramlist(ctx.tables.arrays, payload.paramlist)?;
    let param_symbols: Vec<SymbolId> = params.iter().map(|p| p.symbol).collect();
    let frame_varlist = ctx.tables.contexts.create(&param_symbols);
    frames.push(Frame {
        paramlist: payload.paramlist,
        varlist: frame_varlist,
    })?;
    ctx.collector.record_frame_push();

    let result = apply_function_inner(
        ctx,
        frames,
        natives,
        lib_context,
        payload,
        &params,
        frame_varlist,
        is_enfix_call,
        left_operand,
        provided_refinements,
        array,
        index,
        specifier,
        out,
    );

    frames.pop();
    ctx.tables.contexts.mark_expired(frame_varlist);

    let (idx, mut outcome) = result?;

    if outcome == Outcome::Thrown {
        if let Some(ThrowCatcher::Function(p)) = ctx.throw.peek_catcher() {
            if p == payload.paramlist {
                if let Some((_, arg)) = ctx.throw.take_thrown(out) {
                    *out = arg;
                    outcome = Outcome::Value;
                }
            }
        }
    }

    Ok(match outcome {
        Outcome::Value => StepOutcome::Value(idx),
        Outcome::Thrown => StepOutcome::Thrown(idx),
    })
}

#[allow(clippy::too_many_arguments)]
fn apply_function_inner(
    ctx: &mut EvalContext,
    frames: &mut FrameStack,
    natives: &NativeTable,
    lib_context: ArrayHandle,
    payload: FunctionPayload,
    params: &[Param],
    frame_varlist: ArrayHandle,
    is_enfix_call: bool,
    left_operand: Option<Cell>,
    provided_refinements: &HashSet<SymbolId>,
    array: ArrayHandle,
    index: u32,
    specifier: Specifier,
    out: &mut Cell,
) -> Result<(u32, Outcome), EvalError> {
    let mut idx = index;
    let mut active = true;
    let mut left_used = false;

    for (i, p) in params.iter().enumerate() {
        let slot = i + 1;
        match p.convention {
            ParamConvention::Local => {}
            ParamConvention::Refinement => {
                let canon = ctx.symbols.canon(p.symbol);
                let provided = provided_refinements.contains(&canon);
                active = provided;
                ctx.tables
                    .contexts
                    .set_var(frame_varlist, slot, Cell::logic(provided))?;
            }
            conv => {
                if !active {
                    continue;
                }
                let value = if !left_used && is_enfix_call {
                    left_used = true;
                    left_operand.expect("enfix dispatch always supplies a left operand")
                } else {
                    left_used = true;
                    match conv {
                        ParamConvention::HardQuote => {
                            let cell = fetch(ctx, array, idx)?
                                .ok_or_else(|| crate::arity_error(ctx.symbols, "function"))?;
                            idx += 1;
                            cell
                        }
                        ParamConvention::SoftQuote => match fetch(ctx, array, idx)? {
                            Some(c)
                                if matches!(
                                    c.kind(),
                                    CellKind::Group | CellKind::GetWord | CellKind::GetPath
                                ) =>
                            {
                                match do_next(ctx, frames, natives, lib_context, array, idx, specifier, out)? {
                                    StepOutcome::End => {
                                        return Err(crate::arity_error(ctx.symbols, "function").into());
                                    }
                                    StepOutcome::Thrown(after) => return Ok((after, Outcome::Thrown)),
                                    StepOutcome::Value(after) => {
                                        idx = after;
                                        *out
                                    }
                                }
                            }
                            Some(c) => {
                                idx += 1;
                                c
                            }
                            None => return Err(crate::arity_error(ctx.symbols, "function").into()),
                        },
                        ParamConvention::Normal => {
                            let stepped = if is_enfix_call {
                                eval_step(ctx, frames, natives, lib_context, array, idx, specifier, out)?
                            } else {
                                do_next(ctx, frames, natives, lib_context, array, idx, specifier, out)?
                            };
                            match stepped {
                                StepOutcome::End => {
                                    return Err(crate::arity_error(ctx.symbols, "function").into());
                                }
                                StepOutcome::Thrown(after) => return Ok((after, Outcome::Thrown)),
                                StepOutcome::Value(after) => {
                                    idx = after;
                                    *out
                                }
                            }
                        }
                        ParamConvention::Local | ParamConvention::Refinement => {
                            unreachable!("handled by the outer match arms")
                        }
                    }
                };
                ctx.tables.contexts.set_var(frame_varlist, slot, value)?;
            }
        }
    }

    let outcome = if let Some(native_id) = payload.native_id {
        let spec = natives.get(native_id);
        let mut call = NativeCallCtx {
            ctx,
            frames,
            natives,
            lib_context,
            frame_varlist,
            paramlist: payload.paramlist,
        };
        (spec.func)(&mut call, out)?
    } else {
        match do_array(
            ctx,
            frames,
            natives,
            lib_context,
            payload.body_holder,
            0,
            Specifier::Frame {
                paramlist: payload.paramlist,
                frame_varlist,
            },
            out,
        )? {
            StepOutcome::End => {
                *out = Cell::none_value();
                Outcome::Value
            }
            StepOutcome::Value(_) => Outcome::Value,
            StepOutcome::Thrown(_) => Outcome::Thrown,
        }
    };

    Ok((idx, outcome))
}

/// Reads a `PATH!`'s cells out as an owned buffer (so callers don't hold
/// a borrow of `ctx.tables.arrays` while also needing `ctx.symbols`).
/// `PATH!`s are almost always a handful of segments (`a/b/c`), so this
/// stays on the stack rather than allocating like a `Vec` would.
fn path_segments(ctx: &EvalContext, cell: &Cell) -> Result<SmallVec<[Cell; 4]>, EvalError> {
    let (handle, index) = cell.as_array_handle()?;
    let series = ctx.tables.arrays.get(handle).ok_or(SeriesError::StaleHandle)?;
    Ok(series.as_slice()[index as usize..].iter().copied().collect())
}

/// `PATH!` used as a call: the head word names a function, the
/// remaining segments name which refinements it was called with.
/// Non-function heads fall back to a pure field walk with no further
/// argument gathering (spec 4.6's reduced treatment of `ANY-PATH!`,
/// recorded as a simplification in `DESIGN.md`).
#[allow(clippy::too_many_arguments)]
fn eval_path_call(
    ctx: &mut EvalContext,
    frames: &mut FrameStack,
    natives: &NativeTable,
    lib_context: ArrayHandle,
    cell: &Cell,
    outer_array: ArrayHandle,
    next_index: u32,
    specifier: Specifier,
    out: &mut Cell,
) -> Result<StepOutcome, EvalError> {
    let segments = path_segments(ctx, cell)?;
    let Some(head) = segments.first().copied() else {
        return Err(crate::lookup_error(ctx.symbols, "path!").into());
    };

    let Some(resolved) = resolve(&head, specifier)? else {
        let spelling = word_spelling(ctx, &head);
        return Err(crate::lookup_error(ctx.symbols, &spelling).into());
    };
    let head_value = *ctx.tables.contexts.get_var(resolved.context, resolved.index as usize)?;

    if head_value.kind() == CellKind::Function {
        let mut provided = HashSet::new();
        for seg in &segments[1..] {
            if let Some(sym) = seg.symbol() {
                provided.insert(ctx.symbols.canon(sym));
            }
        }
        return apply_function(
            ctx,
            frames,
            natives,
            lib_context,
            head_value,
            false,
            None,
            &provided,
            outer_array,
            next_index,
            specifier,
            out,
        );
    }

    *out = walk_fields(ctx, head_value, &segments[1..])?;
    Ok(StepOutcome::Value(next_index))
}

/// A bare `GET-PATH!`: walks fields without ever invoking a function.
fn eval_path_value(ctx: &mut EvalContext, specifier: Specifier, cell: &Cell) -> Result<Cell, EvalError> {
    let segments = path_segments(ctx, cell)?;
    let Some(head) = segments.first().copied() else {
        return Err(crate::lookup_error(ctx.symbols, "get-path!").into());
    };
    let Some(resolved) = resolve(&head, specifier)? else {
        let spelling = word_spelling(ctx, &head);
        return Err(crate::lookup_error(ctx.symbols, &spelling).into());
    };
    let head_value = *ctx.tables.contexts.get_var(resolved.context, resolved.index as usize)?;
    walk_fields(ctx, head_value, &segments[1..])
}

fn walk_fields(ctx: &mut EvalContext, mut value: Cell, segments: &[Cell]) -> Result<Cell, EvalError> {
    for seg in segments {
        let Some(sym) = seg.symbol() else {
            return Err(crate::lookup_error(ctx.symbols, "path!").into());
        };
        let ctx_ref = value.as_context()?;
        let Some(slot) = ctx.tables.contexts.find_word(ctx_ref.varlist, sym, ctx.symbols)? else {
            let spelling = word_spelling(ctx, seg);
            return Err(crate::lookup_error(ctx.symbols, &spelling).into());
        };
        value = *ctx.tables.contexts.get_var(ctx_ref.varlist, slot)?;
    }
    Ok(value)
}

/// `SET-PATH!`: walks every segment but the last as a field lookup, then
/// stores into the final segment.
fn set_path_value(ctx: &mut EvalContext, specifier: Specifier, cell: &Cell, value: Cell) -> Result<(), EvalError> {
    let segments = path_segments(ctx, cell)?;
    let Some(head) = segments.first().copied() else {
        return Err(crate::lookup_error(ctx.symbols, "set-path!").into());
    };
    let Some(resolved) = resolve(&head, specifier)? else {
        let spelling = word_spelling(ctx, &head);
        return Err(crate::lookup_error(ctx.symbols, &spelling).into());
    };
    let mut target = *ctx.tables.contexts.get_var(resolved.context, resolved.index as usize)?;

    if segments.len() < 2 {
        return Err(crate::lookup_error(ctx.symbols, "set-path!").into());
    }
    for seg in &segments[1..segments.len() - 1] {
        target = walk_fields(ctx, target, std::slice::from_ref(seg))?;
    }
    let last = &segments[segments.len() - 1];
    let Some(sym) = last.symbol() else {
        return Err(crate::lookup_error(ctx.symbols, "set-path!").into());
    };
    let ctx_ref = target.as_context()?;
    let Some(slot) = ctx.tables.contexts.find_word(ctx_ref.varlist, sym, ctx.symbols)? else {
        let spelling = word_spelling(ctx, last);
        return Err(crate::lookup_error(ctx.symbols, &spelling).into());
    };
    ctx.tables.contexts.set_var(ctx_ref.varlist, slot, value)?;
    Ok(())
}
