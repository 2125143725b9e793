//! The 4-word universal value record.

use crate::kind::{CellFlags, CellHeader, CellKind};
use crate::payload::{
    ArrayHandle, BytesHandle, Extra, FunctionPayload, Payload, SeriesRef, WideHandle, WordBinding,
};
use core_symbols::SymbolId;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum CellError {
    #[error("expected {expected} but found {found:?}")]
    WrongKind { expected: &'static str, found: CellKind },
    #[error("read of an unreadable (trash) cell")]
    Unreadable,
    #[error("void is not a storable value here")]
    VoidNotAllowed,
}

/// The universal value representation: header (type tag + flags),
/// payload (type-specific data), and extra (binding-adjacent data that
/// doesn't fit the payload shape). Four machine words on a 64-bit
/// target: `CellHeader` packs into one, `Payload` is the largest
/// variant (two words), `Extra` is one word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    header: CellHeader,
    payload: Payload,
    extra: Extra,
}

impl Default for Cell {
    /// The "trash" cell: write-only until overwritten with a real value.
    fn default() -> Self {
        Self {
            header: CellHeader {
                kind: CellKind::Unreadable,
                flags: CellFlags::UNREADABLE,
            },
            payload: Payload::None,
            extra: Extra::None,
        }
    }
}

impl Cell {
    pub fn kind(&self) -> CellKind {
        self.header.kind
    }

    pub fn flags(&self) -> CellFlags {
        self.header.flags
    }

    pub fn is_thrown(&self) -> bool {
        self.header.flags.contains(CellFlags::THROWN)
    }

    pub fn set_thrown(&mut self) {
        self.header.flags.insert(CellFlags::THROWN);
    }

    pub fn clear_thrown(&mut self) {
        self.header.flags.remove(CellFlags::THROWN);
    }

    pub fn is_enfix(&self) -> bool {
        self.header.flags.contains(CellFlags::ENFIX)
    }

    pub fn set_enfix(&mut self, enfix: bool) {
        if enfix {
            self.header.flags.insert(CellFlags::ENFIX);
        } else {
            self.header.flags.remove(CellFlags::ENFIX);
        }
    }

    pub fn is_evaluated(&self) -> bool {
        self.header.flags.contains(CellFlags::EVALUATED)
    }

    pub fn set_evaluated(&mut self, v: bool) {
        if v {
            self.header.flags.insert(CellFlags::EVALUATED);
        } else {
            self.header.flags.remove(CellFlags::EVALUATED);
        }
    }

    pub fn is_void(&self) -> bool {
        self.header.kind == CellKind::Void
    }

    pub fn is_end(&self) -> bool {
        self.header.kind == CellKind::End
    }

    pub fn is_unreadable(&self) -> bool {
        self.header.flags.contains(CellFlags::UNREADABLE)
    }

    fn check_readable(&self) -> Result<(), CellError> {
        if self.is_unreadable() {
            return Err(CellError::Unreadable);
        }
        Ok(())
    }

    // ---- constructors ----------------------------------------------

    pub fn end() -> Self {
        Self {
            header: CellHeader::new(CellKind::End),
            payload: Payload::None,
            extra: Extra::None,
        }
    }

    pub fn void() -> Self {
        Self {
            header: CellHeader::new(CellKind::Void),
            payload: Payload::None,
            extra: Extra::None,
        }
    }

    pub fn none_value() -> Self {
        Self {
            header: CellHeader::new(CellKind::None),
            payload: Payload::None,
            extra: Extra::None,
        }
    }

    pub fn bar() -> Self {
        Self {
            header: CellHeader::new(CellKind::Bar),
            payload: Payload::None,
            extra: Extra::None,
        }
    }

    pub fn logic(v: bool) -> Self {
        Self {
            header: CellHeader::new(CellKind::Logic),
            payload: Payload::Logic(v),
            extra: Extra::None,
        }
    }

    pub fn integer(v: i64) -> Self {
        Self {
            header: CellHeader::new(CellKind::Integer),
            payload: Payload::Integer(v),
            extra: Extra::None,
        }
    }

    pub fn float(v: f64) -> Self {
        Self {
            header: CellHeader::new(CellKind::Float),
            payload: Payload::float(v),
            extra: Extra::None,
        }
    }

    pub fn char_value(c: char) -> Self {
        Self {
            header: CellHeader::new(CellKind::Char),
            payload: Payload::Char(c),
            extra: Extra::None,
        }
    }

    pub fn pair(x: u32, y: u32) -> Self {
        Self {
            header: CellHeader::new(CellKind::Pair),
            payload: Payload::Pair(x, y),
            extra: Extra::None,
        }
    }

    pub fn block(handle: ArrayHandle, index: u32) -> Self {
        Self::array_kind(CellKind::Block, handle, index)
    }

    pub fn group(handle: ArrayHandle, index: u32) -> Self {
        Self::array_kind(CellKind::Group, handle, index)
    }

    pub fn path(handle: ArrayHandle, index: u32) -> Self {
        Self::array_kind(CellKind::Path, handle, index)
    }

    pub fn set_path(handle: ArrayHandle, index: u32) -> Self {
        Self::array_kind(CellKind::SetPath, handle, index)
    }

    pub fn get_path(handle: ArrayHandle, index: u32) -> Self {
        Self::array_kind(CellKind::GetPath, handle, index)
    }

    pub fn lit_path(handle: ArrayHandle, index: u32) -> Self {
        Self::array_kind(CellKind::LitPath, handle, index)
    }

    fn array_kind(kind: CellKind, handle: ArrayHandle, index: u32) -> Self {
        Self {
            header: CellHeader::new(kind),
            payload: Payload::AnySeries(SeriesRef::Array { handle, index }),
            extra: Extra::None,
        }
    }

    pub fn string_value(handle: WideHandle, index: u32) -> Self {
        Self {
            header: CellHeader::new(CellKind::StringValue),
            payload: Payload::AnySeries(SeriesRef::Wide { handle, index }),
            extra: Extra::None,
        }
    }

    pub fn binary_value(handle: BytesHandle, index: u32) -> Self {
        Self {
            header: CellHeader::new(CellKind::BinaryValue),
            payload: Payload::AnySeries(SeriesRef::Bytes { handle, index }),
            extra: Extra::None,
        }
    }

    fn word_kind(kind: CellKind, symbol: SymbolId, binding: WordBinding) -> Self {
        Self {
            header: CellHeader::new(kind),
            payload: Payload::AnyWord(binding),
            extra: Extra::Symbol(symbol),
        }
    }

    pub fn word_unbound(symbol: SymbolId) -> Self {
        Self::word_kind(CellKind::Word, symbol, WordBinding::Unbound)
    }

    pub fn word_bound(symbol: SymbolId, context: ArrayHandle, index: u32) -> Self {
        Self::word_kind(CellKind::Word, symbol, WordBinding::Absolute { context, index })
    }

    pub fn set_word_unbound(symbol: SymbolId) -> Self {
        Self::word_kind(CellKind::SetWord, symbol, WordBinding::Unbound)
    }

    pub fn set_word_bound(symbol: SymbolId, context: ArrayHandle, index: u32) -> Self {
        Self::word_kind(CellKind::SetWord, symbol, WordBinding::Absolute { context, index })
    }

    pub fn get_word_bound(symbol: SymbolId, context: ArrayHandle, index: u32) -> Self {
        Self::word_kind(CellKind::GetWord, symbol, WordBinding::Absolute { context, index })
    }

    pub fn get_word_unbound(symbol: SymbolId) -> Self {
        Self::word_kind(CellKind::GetWord, symbol, WordBinding::Unbound)
    }

    pub fn lit_word_unbound(symbol: SymbolId) -> Self {
        Self::word_kind(CellKind::LitWord, symbol, WordBinding::Unbound)
    }

    pub fn refinement_unbound(symbol: SymbolId) -> Self {
        Self::word_kind(CellKind::Refinement, symbol, WordBinding::Unbound)
    }

    pub fn function(payload: FunctionPayload) -> Self {
        Self {
            header: CellHeader::new(CellKind::Function),
            payload: Payload::Function(payload),
            extra: Extra::None,
        }
    }

    pub fn object(varlist: ArrayHandle) -> Self {
        Self::context_kind(CellKind::Object, varlist)
    }

    pub fn frame(varlist: ArrayHandle) -> Self {
        Self::context_kind(CellKind::Frame, varlist)
    }

    pub fn error(varlist: ArrayHandle) -> Self {
        Self::context_kind(CellKind::Error, varlist)
    }

    pub fn port(varlist: ArrayHandle) -> Self {
        Self::context_kind(CellKind::Port, varlist)
    }

    fn context_kind(kind: CellKind, varlist: ArrayHandle) -> Self {
        Self {
            header: CellHeader::new(kind),
            payload: Payload::AnyContext(crate::payload::ContextRef { varlist }),
            extra: Extra::None,
        }
    }

    pub fn map(handle: crate::payload::MapHandle) -> Self {
        Self {
            header: CellHeader::new(CellKind::Map),
            payload: Payload::Map(handle),
            extra: Extra::None,
        }
    }

    // ---- accessors ---------------------------------------------------

    pub fn as_logic(&self) -> Result<bool, CellError> {
        self.check_readable()?;
        match self.payload {
            Payload::Logic(v) => Ok(v),
            _ => Err(CellError::WrongKind {
                expected: "logic!",
                found: self.kind(),
            }),
        }
    }

    pub fn as_integer(&self) -> Result<i64, CellError> {
        self.check_readable()?;
        match self.payload {
            Payload::Integer(v) => Ok(v),
            _ => Err(CellError::WrongKind {
                expected: "integer!",
                found: self.kind(),
            }),
        }
    }

    pub fn as_float(&self) -> Result<f64, CellError> {
        self.check_readable()?;
        self.payload.as_float().ok_or(CellError::WrongKind {
            expected: "float!",
            found: self.kind(),
        })
    }

    pub fn as_series_ref(&self) -> Result<SeriesRef, CellError> {
        self.check_readable()?;
        match self.payload {
            Payload::AnySeries(s) => Ok(s),
            _ => Err(CellError::WrongKind {
                expected: "any-series!",
                found: self.kind(),
            }),
        }
    }

    pub fn as_array_handle(&self) -> Result<(ArrayHandle, u32), CellError> {
        match self.as_series_ref()? {
            SeriesRef::Array { handle, index } => Ok((handle, index)),
            _ => Err(CellError::WrongKind {
                expected: "any-array!",
                found: self.kind(),
            }),
        }
    }

    pub fn as_word_binding(&self) -> Result<WordBinding, CellError> {
        self.check_readable()?;
        match self.payload {
            Payload::AnyWord(b) => Ok(b),
            _ => Err(CellError::WrongKind {
                expected: "any-word!",
                found: self.kind(),
            }),
        }
    }

    pub fn symbol(&self) -> Option<SymbolId> {
        match self.extra {
            Extra::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Result<FunctionPayload, CellError> {
        self.check_readable()?;
        match self.payload {
            Payload::Function(f) => Ok(f),
            _ => Err(CellError::WrongKind {
                expected: "function!",
                found: self.kind(),
            }),
        }
    }

    pub fn as_context(&self) -> Result<crate::payload::ContextRef, CellError> {
        self.check_readable()?;
        match self.payload {
            Payload::AnyContext(c) => Ok(c),
            _ => Err(CellError::WrongKind {
                expected: "any-context!",
                found: self.kind(),
            }),
        }
    }

    pub fn as_map(&self) -> Result<crate::payload::MapHandle, CellError> {
        self.check_readable()?;
        match self.payload {
            Payload::Map(m) => Ok(m),
            _ => Err(CellError::WrongKind {
                expected: "map!",
                found: self.kind(),
            }),
        }
    }

    /// Re-bind this word/path cell in place to an absolute binding.
    /// Only legal for `ANY-WORD!`/`ANY-PATH!` kinds; used by the binder
    /// (`core-bind`) when it resolves an unbound or relative cell.
    pub fn rebind_absolute(&mut self, context: ArrayHandle, index: u32) -> Result<(), CellError> {
        if !self.kind().is_any_word() {
            return Err(CellError::WrongKind {
                expected: "any-word!",
                found: self.kind(),
            });
        }
        self.payload = Payload::AnyWord(WordBinding::Absolute { context, index });
        Ok(())
    }

    pub fn rebind_relative(&mut self, paramlist: ArrayHandle, index: u32) -> Result<(), CellError> {
        if !self.kind().is_any_word() {
            return Err(CellError::WrongKind {
                expected: "any-word!",
                found: self.kind(),
            });
        }
        self.payload = Payload::AnyWord(WordBinding::Relative { paramlist, index });
        Ok(())
    }

    /// Strip one level of quoting: `LIT-WORD!` -> `WORD!`, `LIT-PATH!` -> `PATH!`.
    pub fn unquote(&self) -> Result<Cell, CellError> {
        match self.kind() {
            CellKind::LitWord => {
                let mut c = *self;
                c.header.kind = CellKind::Word;
                Ok(c)
            }
            CellKind::LitPath => {
                let mut c = *self;
                c.header.kind = CellKind::Path;
                Ok(c)
            }
            other => Err(CellError::WrongKind {
                expected: "lit-word!/lit-path!",
                found: other,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_symbols::SymbolTable;

    #[test]
    fn default_cell_is_unreadable() {
        let c = Cell::default();
        assert!(c.is_unreadable());
        assert_eq!(c.as_integer().unwrap_err(), CellError::Unreadable);
    }

    #[test]
    fn integer_round_trips() {
        let c = Cell::integer(42);
        assert_eq!(c.as_integer().unwrap(), 42);
        assert_eq!(c.as_logic().unwrap_err(), CellError::WrongKind {
            expected: "logic!",
            found: CellKind::Integer,
        });
    }

    #[test]
    fn float_round_trips_through_bit_pattern() {
        let c = Cell::float(3.5);
        assert_eq!(c.as_float().unwrap(), 3.5);
    }

    #[test]
    fn word_carries_its_symbol_even_when_unbound() {
        let mut table = SymbolTable::new();
        let sym = table.intern(b"foo");
        let w = Cell::word_unbound(sym);
        assert_eq!(w.symbol(), Some(sym));
        assert_eq!(w.as_word_binding().unwrap(), WordBinding::Unbound);
    }

    #[test]
    fn thrown_flag_is_orthogonal_to_kind() {
        let mut c = Cell::integer(1);
        assert!(!c.is_thrown());
        c.set_thrown();
        assert!(c.is_thrown());
        assert_eq!(c.as_integer().unwrap(), 1, "thrown flag doesn't hide the payload");
        c.clear_thrown();
        assert!(!c.is_thrown());
    }

    #[test]
    fn unquote_strips_one_level() {
        let mut table = SymbolTable::new();
        let sym = table.intern(b"x");
        let lit = Cell::lit_word_unbound(sym);
        let word = lit.unquote().unwrap();
        assert_eq!(word.kind(), CellKind::Word);
        assert!(word.unquote().is_err());
    }

    #[test]
    fn void_and_none_are_distinct_kinds() {
        assert_ne!(Cell::void().kind(), Cell::none_value().kind());
        assert!(Cell::void().is_void());
        assert!(!Cell::none_value().is_void());
    }
}
