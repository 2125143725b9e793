//! The cell's payload shapes and the `extra` slot (spec "Cell" layout
//! and the Binding data model).

use core_mem::Handle;
use core_series::Series;
use core_symbols::SymbolId;

use crate::Cell;

pub type ArrayHandle = Handle<Series<Cell>>;
pub type BytesHandle = Handle<Series<u8>>;
pub type WideHandle = Handle<Series<u16>>;

/// `{series*, index}` — shared by every `ANY-SERIES!` kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesRef {
    Bytes { handle: BytesHandle, index: u32 },
    Wide { handle: WideHandle, index: u32 },
    Array { handle: ArrayHandle, index: u32 },
}

impl SeriesRef {
    pub fn index(&self) -> u32 {
        match self {
            SeriesRef::Bytes { index, .. }
            | SeriesRef::Wide { index, .. }
            | SeriesRef::Array { index, .. } => *index,
        }
    }

    pub fn array_handle(&self) -> Option<ArrayHandle> {
        match self {
            SeriesRef::Array { handle, .. } => Some(*handle),
            _ => None,
        }
    }
}

/// `{context*, index}` — the binding carried by every `ANY-WORD!` kind
/// (spec "Binding" data model). The bound symbol identity itself lives
/// in the cell's `extra` slot, not here, so that an unbound word still
/// knows its own name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WordBinding {
    #[default]
    Unbound,
    /// Resolved against a context's varlist directly.
    Absolute { context: ArrayHandle, index: u32 },
    /// Resolved against a function's paramlist; requires a specifier
    /// (the enclosing frame) to become absolute — spec 4.6/Design Notes.
    Relative { paramlist: ArrayHandle, index: u32 },
}

/// `{paramlist*, body_holder*}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionPayload {
    pub paramlist: ArrayHandle,
    pub body_holder: ArrayHandle,
    pub native_id: Option<u32>,
}

/// `{context*}` — shared by `OBJECT!`/`FRAME!`/`ERROR!`/`PORT!`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextRef {
    pub varlist: ArrayHandle,
}

pub type MapHandle = Handle<crate::map_table::ManagedMap>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    None,
    Logic(bool),
    Integer(i64),
    Float(u64), // bit pattern; f64 is not Eq/Hash, stored as bits for the derive below
    Char(char),
    Pair(u32, u32),
    AnySeries(SeriesRef),
    AnyWord(WordBinding),
    Function(FunctionPayload),
    AnyContext(ContextRef),
    Map(MapHandle),
}

impl Payload {
    pub fn float(v: f64) -> Self {
        Payload::Float(v.to_bits())
    }
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Payload::Float(bits) => Some(f64::from_bits(*bits)),
            _ => None,
        }
    }
}

/// The `extra` slot: a binding-adjacent value that does not fit the
/// per-kind payload shape above.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Extra {
    #[default]
    None,
    Symbol(SymbolId),
    LineNumber(u32),
}
