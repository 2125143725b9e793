//! Control-flow and the throw/trap/error natives: `either if do return
//! throw catch trap recycle` — spec 4.7/4.8's worked control forms,
//! each built directly on [`core_throw`]'s catcher/trap-state API.

use super::{arg, NativeBuilder, NativeCallCtx};
use crate::{do_array, is_truthy, EvalError, Outcome, ParamConvention, StepOutcome};
use core_bind::Specifier;
use core_cell::{Cell, CellKind};
use core_throw::{
    catches_loop, catches_named, catches_unnamed, make_error_context, ErrorFields, ErrorKind, RebolError,
    ThrowCatcher, TrapState,
};

pub(crate) const NATIVES: &[NativeBuilder] = &[
    NativeBuilder {
        name: "either",
        params: &[
            ("condition", ParamConvention::Normal),
            ("true-branch", ParamConvention::Normal),
            ("false-branch", ParamConvention::Normal),
        ],
        enfix: false,
        func: either_native,
    },
    NativeBuilder {
        name: "if",
        params: &[("condition", ParamConvention::Normal), ("branch", ParamConvention::Normal)],
        enfix: false,
        func: if_native,
    },
    NativeBuilder {
        name: "do",
        params: &[("value", ParamConvention::Normal)],
        enfix: false,
        func: do_native,
    },
    NativeBuilder {
        name: "return",
        params: &[("value", ParamConvention::Normal)],
        enfix: false,
        func: return_native,
    },
    NativeBuilder {
        name: "throw",
        params: &[
            ("value", ParamConvention::Normal),
            ("name", ParamConvention::Refinement),
            ("name-value", ParamConvention::Normal),
        ],
        enfix: false,
        func: throw_native,
    },
    NativeBuilder {
        name: "catch",
        params: &[
            ("body", ParamConvention::Normal),
            ("name", ParamConvention::Refinement),
            ("name-value", ParamConvention::Normal),
        ],
        enfix: false,
        func: catch_native,
    },
    NativeBuilder {
        name: "trap",
        params: &[("body", ParamConvention::Normal)],
        enfix: false,
        func: trap_native,
    },
    NativeBuilder {
        name: "recycle",
        params: &[],
        enfix: false,
        func: recycle_native,
    },
    NativeBuilder {
        name: "while",
        params: &[
            ("condition", ParamConvention::Normal),
            ("body", ParamConvention::Normal),
        ],
        enfix: false,
        func: while_native,
    },
    NativeBuilder {
        name: "break",
        params: &[],
        enfix: false,
        func: break_native,
    },
    NativeBuilder {
        name: "continue",
        params: &[],
        enfix: false,
        func: continue_native,
    },
];

/// Runs a block-valued argument to completion; non-blocks are a type
/// error (every control native above expects a literal `[...]` branch,
/// matching the worked scenarios in spec 8).
fn run_block(call: &mut NativeCallCtx<'_, '_>, branch: Cell, out: &mut Cell) -> Result<Outcome, EvalError> {
    if branch.kind() != CellKind::Block {
        let id = call.ctx.symbols.intern(b"bad-branch");
        return Err(EvalError::User(RebolError::new(
            ErrorKind::Type,
            id,
            "branch must be a block!".to_string(),
        )));
    }
    let (handle, index) = branch.as_array_handle()?;
    match do_array(call.ctx, call.frames, call.natives, call.lib_context, handle, index, Specifier::None, out)? {
        StepOutcome::Thrown(_) => Ok(Outcome::Thrown),
        StepOutcome::Value(_) | StepOutcome::End => Ok(Outcome::Value),
    }
}

fn either_native(call: &mut NativeCallCtx<'_, '_>, out: &mut Cell) -> Result<Outcome, EvalError> {
    let condition = arg(call, 1)?;
    let branch = if is_truthy(&condition) { arg(call, 2)? } else { arg(call, 3)? };
    run_block(call, branch, out)
}

fn if_native(call: &mut NativeCallCtx<'_, '_>, out: &mut Cell) -> Result<Outcome, EvalError> {
    let condition = arg(call, 1)?;
    if is_truthy(&condition) {
        let branch = arg(call, 2)?;
        run_block(call, branch, out)
    } else {
        *out = Cell::none_value();
        Ok(Outcome::Value)
    }
}

fn do_native(call: &mut NativeCallCtx<'_, '_>, out: &mut Cell) -> Result<Outcome, EvalError> {
    let value = arg(call, 1)?;
    if value.kind() == CellKind::Block {
        let (handle, index) = value.as_array_handle()?;
        match do_array(call.ctx, call.frames, call.natives, call.lib_context, handle, index, Specifier::None, out)? {
            StepOutcome::Thrown(_) => Ok(Outcome::Thrown),
            StepOutcome::Value(_) | StepOutcome::End => Ok(Outcome::Value),
        }
    } else {
        *out = value;
        Ok(Outcome::Value)
    }
}

fn return_native(call: &mut NativeCallCtx<'_, '_>, out: &mut Cell) -> Result<Outcome, EvalError> {
    let value = arg(call, 1)?;
    let Some(target) = call.frames.caller_of_top() else {
        let id = call.ctx.symbols.intern(b"return-outside-function");
        return Err(EvalError::User(RebolError::new(
            ErrorKind::Lookup,
            id,
            "return used outside of a function call".to_string(),
        )));
    };
    tracing::trace!(target: "eval.throw", kind = "return", "throw_start");
    call.ctx.throw.throw(out, ThrowCatcher::Function(target), value);
    Ok(Outcome::Thrown)
}

fn throw_native(call: &mut NativeCallCtx<'_, '_>, out: &mut Cell) -> Result<Outcome, EvalError> {
    let value = arg(call, 1)?;
    let named = arg(call, 2)?.as_logic().unwrap_or(false);
    let catcher = if named {
        let name_cell = arg(call, 3)?;
        let Some(sym) = name_cell.symbol() else {
            let id = call.ctx.symbols.intern(b"bad-throw-name");
            return Err(EvalError::User(RebolError::new(
                ErrorKind::Type,
                id,
                "throw/name requires a word! name".to_string(),
            )));
        };
        ThrowCatcher::Named(sym)
    } else {
        ThrowCatcher::Unnamed
    };
    tracing::debug!(target: "eval.throw", named, "throw_start");
    call.ctx.throw.throw(out, catcher, value);
    Ok(Outcome::Thrown)
}

fn catch_native(call: &mut NativeCallCtx<'_, '_>, out: &mut Cell) -> Result<Outcome, EvalError> {
    let body = arg(call, 1)?;
    let named = arg(call, 2)?.as_logic().unwrap_or(false);
    let wanted_name = if named { arg(call, 3)?.symbol() } else { None };

    match run_block(call, body, out)? {
        Outcome::Value => Ok(Outcome::Value),
        Outcome::Thrown => {
            let Some(catcher) = call.ctx.throw.peek_catcher() else {
                return Ok(Outcome::Thrown);
            };
            let caught = if named {
                wanted_name
                    .map(|name| catches_named(catcher, name, call.ctx.symbols))
                    .unwrap_or(false)
            } else {
                catches_unnamed(catcher)
            };
            if caught {
                tracing::debug!(target: "eval.throw", named, "catch_caught");
                if let Some((_, value)) = call.ctx.throw.take_thrown(out) {
                    *out = value;
                }
                Ok(Outcome::Value)
            } else {
                tracing::trace!(target: "eval.throw", named, "catch_propagated");
                Ok(Outcome::Thrown)
            }
        }
    }
}

fn trap_native(call: &mut NativeCallCtx<'_, '_>, out: &mut Cell) -> Result<Outcome, EvalError> {
    let body = arg(call, 1)?;
    if body.kind() != CellKind::Block {
        let id = call.ctx.symbols.intern(b"bad-branch");
        return Err(EvalError::User(RebolError::new(
            ErrorKind::Type,
            id,
            "trap requires a block!".to_string(),
        )));
    }
    let (handle, index) = body.as_array_handle()?;

    let snapshot = TrapState {
        frame_stack_top: call.frames.depth(),
        guarded_depth: call.ctx.collector.guarded_depth(),
        trap_stack_top: call.ctx.traps.depth(),
        ..Default::default()
    };
    call.ctx.traps.push_trap(snapshot);

    match do_array(call.ctx, call.frames, call.natives, call.lib_context, handle, index, Specifier::None, out) {
        Ok(StepOutcome::Thrown(_)) => {
            call.ctx.traps.drop_trap(snapshot);
            Ok(Outcome::Thrown)
        }
        Ok(StepOutcome::Value(_)) | Ok(StepOutcome::End) => {
            call.ctx.traps.drop_trap(snapshot);
            Ok(Outcome::Value)
        }
        Err(EvalError::User(rebol_err)) => {
            tracing::debug!(target: "eval.throw", kind = ?rebol_err.kind, "trap_caught");
            call.ctx.traps.unwind_to(snapshot.trap_stack_top);
            *out = error_cell(call, rebol_err);
            Ok(Outcome::Value)
        }
        Err(other) => {
            call.ctx.traps.unwind_to(snapshot.trap_stack_top);
            Err(other)
        }
    }
}

/// Materializes a Rust-level error as an `error!` context. `message`
/// and the call-site fields are left `none` — this runtime has no
/// molder/former layer to render them into strings (spec's Non-goals),
/// so TRAP only round-trips the `type`/`id` a script can branch on.
fn error_cell(call: &mut NativeCallCtx<'_, '_>, err: RebolError) -> Cell {
    let kind_name = match err.kind {
        ErrorKind::Type => "type",
        ErrorKind::Arity => "arity",
        ErrorKind::Lookup => "lookup",
        ErrorKind::Limit => "limit",
        ErrorKind::Protection => "protection",
        ErrorKind::Syntax => "syntax",
        ErrorKind::Halt => "halt",
        ErrorKind::User => "user",
    };
    let kind_sym = call.ctx.symbols.intern(kind_name.as_bytes());
    let fields = ErrorFields {
        kind: Cell::word_unbound(kind_sym),
        id: Cell::word_unbound(err.id),
        message: Cell::none_value(),
        where_: Cell::none_value(),
        near: Cell::none_value(),
        file: Cell::none_value(),
        line: Cell::none_value(),
    };
    let varlist = make_error_context(call.ctx.tables.contexts, call.ctx.symbols, fields);
    Cell::error(varlist)
}

fn recycle_native(call: &mut NativeCallCtx<'_, '_>, out: &mut Cell) -> Result<Outcome, EvalError> {
    call.ctx.collector.recycle(&mut call.ctx.tables, &[]);
    *out = Cell::none_value();
    Ok(Outcome::Value)
}

/// `WHILE condition body`: re-evaluates `condition` before every
/// iteration, running `body` for as long as it's truthy. `BREAK` inside
/// `body` stops the loop (the whole `WHILE` evaluates to `none`);
/// `CONTINUE` skips the rest of the current iteration's body and jumps
/// straight back to re-testing `condition`. Neither is a `CATCH`-style
/// name match — a loop intercepts either one unconditionally, per
/// `core_throw::catches_loop`.
fn while_native(call: &mut NativeCallCtx<'_, '_>, out: &mut Cell) -> Result<Outcome, EvalError> {
    let condition = arg(call, 1)?;
    let body = arg(call, 2)?;
    if condition.kind() != CellKind::Block || body.kind() != CellKind::Block {
        let id = call.ctx.symbols.intern(b"bad-branch");
        return Err(EvalError::User(RebolError::new(
            ErrorKind::Type,
            id,
            "while requires block! condition and body".to_string(),
        )));
    }
    let (cond_handle, cond_index) = condition.as_array_handle()?;
    let (body_handle, body_index) = body.as_array_handle()?;

    *out = Cell::none_value();
    loop {
        let mut cond_out = Cell::none_value();
        match do_array(
            call.ctx,
            call.frames,
            call.natives,
            call.lib_context,
            cond_handle,
            cond_index,
            Specifier::None,
            &mut cond_out,
        )? {
            StepOutcome::Thrown(_) => {
                *out = cond_out;
                return Ok(Outcome::Thrown);
            }
            StepOutcome::Value(_) | StepOutcome::End => {}
        }
        if !is_truthy(&cond_out) {
            return Ok(Outcome::Value);
        }

        match do_array(
            call.ctx,
            call.frames,
            call.natives,
            call.lib_context,
            body_handle,
            body_index,
            Specifier::None,
            out,
        )? {
            StepOutcome::Thrown(_) => match call.ctx.throw.peek_catcher().and_then(catches_loop) {
                Some(is_continue) => {
                    tracing::trace!(target: "eval.throw", is_continue, "loop_caught");
                    call.ctx.throw.take_thrown(out);
                    *out = Cell::none_value();
                    if !is_continue {
                        return Ok(Outcome::Value);
                    }
                }
                None => return Ok(Outcome::Thrown),
            },
            StepOutcome::Value(_) | StepOutcome::End => {}
        }
    }
}

fn break_native(call: &mut NativeCallCtx<'_, '_>, out: &mut Cell) -> Result<Outcome, EvalError> {
    tracing::trace!(target: "eval.throw", kind = "break", "throw_start");
    call.ctx.throw.throw(out, ThrowCatcher::LoopBreak, Cell::none_value());
    Ok(Outcome::Thrown)
}

fn continue_native(call: &mut NativeCallCtx<'_, '_>, out: &mut Cell) -> Result<Outcome, EvalError> {
    tracing::trace!(target: "eval.throw", kind = "continue", "throw_start");
    call.ctx.throw.throw(out, ThrowCatcher::LoopContinue, Cell::none_value());
    Ok(Outcome::Thrown)
}
