//! `+ - * / =`: the handful of enfix math operators spec 8's worked
//! examples exercise. Integer arithmetic stays exact; mixing an
//! `INTEGER!` with a `FLOAT!` promotes to float, matching the
//! supplemented numeric tower noted in `SPEC_FULL.md`.

use super::{arg, NativeBuilder, NativeCallCtx};
use crate::{EvalError, Outcome, ParamConvention};
use core_cell::{Cell, CellKind};
use core_throw::{ErrorKind, RebolError};

pub(crate) const NATIVES: &[NativeBuilder] = &[
    NativeBuilder {
        name: "+",
        params: &[("value1", ParamConvention::Normal), ("value2", ParamConvention::Normal)],
        enfix: true,
        func: add_native,
    },
    NativeBuilder {
        name: "-",
        params: &[("value1", ParamConvention::Normal), ("value2", ParamConvention::Normal)],
        enfix: true,
        func: subtract_native,
    },
    NativeBuilder {
        name: "*",
        params: &[("value1", ParamConvention::Normal), ("value2", ParamConvention::Normal)],
        enfix: true,
        func: multiply_native,
    },
    NativeBuilder {
        name: "/",
        params: &[("value1", ParamConvention::Normal), ("value2", ParamConvention::Normal)],
        enfix: true,
        func: divide_native,
    },
    NativeBuilder {
        name: "=",
        params: &[("value1", ParamConvention::Normal), ("value2", ParamConvention::Normal)],
        enfix: true,
        func: equal_native,
    },
];

enum Number {
    Int(i64),
    Float(f64),
}

fn as_number(cell: &Cell) -> Result<Number, EvalError> {
    match cell.kind() {
        CellKind::Integer => Ok(Number::Int(cell.as_integer()?)),
        CellKind::Float => Ok(Number::Float(cell.as_float()?)),
        found => Err(core_cell::CellError::WrongKind {
            expected: "integer! or float!",
            found,
        }
        .into()),
    }
}

fn math_error(call: &mut NativeCallCtx<'_, '_>, id: &'static [u8], message: &str) -> EvalError {
    let symbol = call.ctx.symbols.intern(id);
    EvalError::User(RebolError::new(ErrorKind::Type, symbol, message.to_string()))
}

fn binary_op(
    call: &mut NativeCallCtx<'_, '_>,
    out: &mut Cell,
    int_op: impl Fn(i64, i64) -> Option<i64>,
    float_op: impl Fn(f64, f64) -> f64,
    overflow_id: &'static [u8],
) -> Result<Outcome, EvalError> {
    let a = as_number(&arg(call, 1)?)?;
    let b = as_number(&arg(call, 2)?)?;
    *out = match (a, b) {
        (Number::Int(x), Number::Int(y)) => match int_op(x, y) {
            Some(v) => Cell::integer(v),
            None => return Err(math_error(call, overflow_id, "integer math overflowed")),
        },
        (Number::Int(x), Number::Float(y)) => Cell::float(float_op(x as f64, y)),
        (Number::Float(x), Number::Int(y)) => Cell::float(float_op(x, y as f64)),
        (Number::Float(x), Number::Float(y)) => Cell::float(float_op(x, y)),
    };
    Ok(Outcome::Value)
}

fn add_native(call: &mut NativeCallCtx<'_, '_>, out: &mut Cell) -> Result<Outcome, EvalError> {
    binary_op(call, out, i64::checked_add, |x, y| x + y, b"overflow")
}

fn subtract_native(call: &mut NativeCallCtx<'_, '_>, out: &mut Cell) -> Result<Outcome, EvalError> {
    binary_op(call, out, i64::checked_sub, |x, y| x - y, b"overflow")
}

fn multiply_native(call: &mut NativeCallCtx<'_, '_>, out: &mut Cell) -> Result<Outcome, EvalError> {
    binary_op(call, out, i64::checked_mul, |x, y| x * y, b"overflow")
}

fn divide_native(call: &mut NativeCallCtx<'_, '_>, out: &mut Cell) -> Result<Outcome, EvalError> {
    let a = as_number(&arg(call, 1)?)?;
    let b = as_number(&arg(call, 2)?)?;
    *out = match (a, b) {
        (Number::Int(_), Number::Int(0)) => {
            return Err(math_error(call, b"zero-divide", "attempt to divide by zero"));
        }
        (Number::Int(x), Number::Int(y)) => Cell::integer(x / y),
        (Number::Int(x), Number::Float(y)) if y == 0.0 => Cell::float(x as f64 / y),
        (Number::Int(x), Number::Float(y)) => Cell::float(x as f64 / y),
        (Number::Float(x), Number::Int(y)) => Cell::float(x / y as f64),
        (Number::Float(x), Number::Float(y)) => Cell::float(x / y),
    };
    Ok(Outcome::Value)
}

fn equal_native(call: &mut NativeCallCtx<'_, '_>, out: &mut Cell) -> Result<Outcome, EvalError> {
    let a = arg(call, 1)?;
    let b = arg(call, 2)?;
    let equal = match (as_number(&a), as_number(&b)) {
        (Ok(Number::Int(x)), Ok(Number::Int(y))) => x == y,
        (Ok(x), Ok(y)) => {
            let (fx, fy) = (
                match x {
                    Number::Int(v) => v as f64,
                    Number::Float(v) => v,
                },
                match y {
                    Number::Int(v) => v as f64,
                    Number::Float(v) => v,
                },
            );
            fx == fy
        }
        _ => match (a.kind(), b.kind()) {
            (CellKind::Logic, CellKind::Logic) => a.as_logic()? == b.as_logic()?,
            (CellKind::None, CellKind::None) => true,
            _ if a.symbol().is_some() && b.symbol().is_some() => a.symbol() == b.symbol(),
            _ => false,
        },
    };
    *out = Cell::logic(equal);
    Ok(Outcome::Value)
}
