//! The cell's type tag and header-level flags (spec "Cell" layout).

use bitflags::bitflags;

/// `header: type tag (≤255 kinds)`. Kinds that share a payload *shape*
/// (all four word sub-types hold a binding; all six array sub-types
/// hold a series+index) are still distinct kinds — the shape lives in
/// [`crate::payload::Payload`], the kind is what the evaluator and
/// type-checking switch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CellKind {
    /// Read-only sentinel marking one-past-the-last position of a feed.
    End,
    /// Write-only "trash" marker; reading one trips a debug check.
    Unreadable,
    /// Absence-of-value. Illegal inside arrays and inside a "set" object slot.
    Void,
    /// `NONE!` — REBOL's explicit no-value *value*, distinct from `Void`.
    None,
    Logic,
    Integer,
    Float,
    Char,
    Pair,
    Word,
    SetWord,
    GetWord,
    LitWord,
    Refinement,
    Block,
    Group,
    Path,
    SetPath,
    GetPath,
    LitPath,
    StringValue,
    BinaryValue,
    Function,
    Object,
    Frame,
    Error,
    Port,
    Map,
    /// `|` expression barrier.
    Bar,
}

impl CellKind {
    pub fn is_any_word(self) -> bool {
        matches!(
            self,
            CellKind::Word
                | CellKind::SetWord
                | CellKind::GetWord
                | CellKind::LitWord
                | CellKind::Refinement
        )
    }

    pub fn is_any_path(self) -> bool {
        matches!(
            self,
            CellKind::Path | CellKind::SetPath | CellKind::GetPath | CellKind::LitPath
        )
    }

    pub fn is_any_array(self) -> bool {
        self.is_any_path() || matches!(self, CellKind::Block | CellKind::Group)
    }

    pub fn is_any_series(self) -> bool {
        self.is_any_array() || matches!(self, CellKind::StringValue | CellKind::BinaryValue)
    }

    pub fn is_any_context(self) -> bool {
        matches!(
            self,
            CellKind::Object | CellKind::Frame | CellKind::Error | CellKind::Port
        )
    }

    /// "Inert" kinds evaluate to themselves (spec 4.6 transition rules).
    pub fn is_inert(self) -> bool {
        matches!(
            self,
            CellKind::Block
                | CellKind::StringValue
                | CellKind::BinaryValue
                | CellKind::Integer
                | CellKind::Float
                | CellKind::Logic
                | CellKind::Char
                | CellKind::Pair
                | CellKind::None
                | CellKind::Map
        )
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CellFlags: u16 {
        /// Set by the scanner; preserved for mold/error reporting, not interpreted here.
        const LINE       = 0b0000_0001;
        /// This cell is the result of evaluation (vs. a literal copy of source).
        const EVALUATED  = 0b0000_0010;
        /// A `Function`-kind cell marked as taking its first argument by lookback.
        const ENFIX      = 0b0000_0100;
        /// A non-local exit in flight. May only live in an evaluator out-slot or
        /// task-local save cell — never in an aggregate (spec Cell invariants).
        const THROWN     = 0b0000_1000;
        /// Reading this cell's payload is a debug-checked error.
        const UNREADABLE = 0b0001_0000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellHeader {
    pub kind: CellKind,
    pub flags: CellFlags,
}

impl CellHeader {
    pub fn new(kind: CellKind) -> Self {
        Self {
            kind,
            flags: CellFlags::empty(),
        }
    }
}
