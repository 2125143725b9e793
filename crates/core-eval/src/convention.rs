//! Parameter conventions, encoded directly as the `CellKind` of each
//! slot in a function's paramlist array — no separate typeset
//! datatype, matching the simplification already recorded for
//! keylists in `core-context`.

use crate::EvalError;
use core_cell::{ArrayHandle, Cell, CellKind};
use core_series::{SeriesFlags, SeriesTable};
use core_symbols::SymbolId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamConvention {
    /// Evaluate one expression (with enfix look-ahead when gathered
    /// by a prefix call; a single primitive term when gathered as an
    /// enfix operator's right operand).
    Normal,
    /// Take the next value verbatim, never evaluating it.
    HardQuote,
    /// Take the next value verbatim unless it is a `GROUP!`,
    /// `GET-WORD!`, or `GET-PATH!`, in which case evaluate it.
    SoftQuote,
    /// A named optional switch; never filled by positional gathering.
    Refinement,
    /// Not filled by the caller; initialized to void.
    Local,
}

#[derive(Debug, Clone, Copy)]
pub struct Param {
    pub symbol: SymbolId,
    pub convention: ParamConvention,
}

impl ParamConvention {
    /// Exposed crate-wide so `natives::function` can turn a FUNC spec
    /// block's raw word cells into conventions the same way a
    /// paramlist's own cells decode back into them.
    pub(crate) fn from_kind(kind: CellKind) -> Option<Self> {
        match kind {
            CellKind::Word => Some(ParamConvention::Normal),
            CellKind::LitWord => Some(ParamConvention::HardQuote),
            CellKind::GetWord => Some(ParamConvention::SoftQuote),
            CellKind::Refinement => Some(ParamConvention::Refinement),
            CellKind::SetWord => Some(ParamConvention::Local),
            _ => None,
        }
    }

    fn to_cell(self, symbol: SymbolId) -> Cell {
        match self {
            ParamConvention::Normal => Cell::word_unbound(symbol),
            ParamConvention::HardQuote => Cell::lit_word_unbound(symbol),
            ParamConvention::SoftQuote => Cell::get_word_unbound(symbol),
            ParamConvention::Refinement => Cell::refinement_unbound(symbol),
            ParamConvention::Local => Cell::set_word_unbound(symbol),
        }
    }
}

/// Slot 0 of a paramlist is an unused placeholder, kept so a
/// parameter's paramlist index and its eventual varlist slot index
/// always agree (mirroring the self-value convention used by
/// `core_context::ContextTable`).
pub fn build_paramlist(
    arrays: &mut SeriesTable<Cell>,
    params: &[Param],
) -> Result<ArrayHandle, EvalError> {
    let handle = arrays.make(params.len() + 1, SeriesFlags::empty());
    arrays.push(handle, Cell::none_value())?;
    for p in params {
        arrays.push(handle, p.convention.to_cell(p.symbol))?;
    }
    arrays.manage(handle)?;
    Ok(handle)
}

pub fn decode_paramlist(
    arrays: &SeriesTable<Cell>,
    paramlist: ArrayHandle,
) -> Result<Vec<Param>, EvalError> {
    let series = arrays.get(paramlist).ok_or(core_series::SeriesError::StaleHandle)?;
    let slots = series.as_slice();
    let mut params = Vec::with_capacity(slots.len().saturating_sub(1));
    for cell in slots.iter().skip(1) {
        let convention = ParamConvention::from_kind(cell.kind()).ok_or_else(|| {
            core_cell::CellError::WrongKind {
                expected: "any-word!/refinement!",
                found: cell.kind(),
            }
        })?;
        let symbol = cell.symbol().ok_or(core_cell::CellError::WrongKind {
            expected: "a symbol-bearing cell",
            found: cell.kind(),
        })?;
        params.push(Param { symbol, convention });
    }
    Ok(params)
}
