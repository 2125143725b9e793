//! Resolving word-shaped cells to context slots (spec "Binding").
//!
//! A word cell's binding is one of: unbound, absolute (context + slot
//! index), or relative (a function's paramlist + slot index). A
//! relative binding only means something paired with a [`Specifier`] —
//! the currently-running frame for that paramlist — so a relative cell
//! must never be stored anywhere without one traveling alongside it.

use core_cell::{ArrayHandle, Cell, WordBinding};
use core_context::ContextTable;
use core_mem::Handle;
use core_series::{Series, SeriesTable};
use core_symbols::SymbolTable;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum BindError {
    #[error("cell is not an ANY-WORD! or ANY-PATH! kind")]
    NotAWord,
    #[error("relative binding encountered without a matching specifier")]
    RelativeWithoutSpecifier,
    #[error("relative binding's paramlist does not match the specifier's")]
    SpecifierMismatch,
    #[error("word carries no symbol to bind by")]
    NoSymbol,
    #[error(transparent)]
    Cell(#[from] core_cell::CellError),
    #[error(transparent)]
    Context(#[from] core_context::ContextError),
    #[error(transparent)]
    Series(#[from] core_series::SeriesError),
}

/// Pairs a relatively-bound code array with the frame that makes its
/// relative words resolvable. `None` when evaluating a cell that carries
/// no enclosing frame (e.g. a freshly bound top-level array).
#[derive(Debug, Clone, Copy)]
pub enum Specifier {
    None,
    Frame {
        paramlist: ArrayHandle,
        frame_varlist: ArrayHandle,
    },
}

/// A binding resolved all the way down to a concrete context slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedSlot {
    pub context: ArrayHandle,
    pub index: u32,
}

/// Resolves `cell`'s binding to a concrete context slot, consulting
/// `specifier` if the binding turns out to be relative. Returns `Ok(None)`
/// for an unbound word — not an error, since an unbound word is legal,
/// just unresolvable to a variable.
pub fn resolve(cell: &Cell, specifier: Specifier) -> Result<Option<ResolvedSlot>, BindError> {
    match cell.as_word_binding()? {
        WordBinding::Unbound => Ok(None),
        WordBinding::Absolute { context, index } => Ok(Some(ResolvedSlot { context, index })),
        WordBinding::Relative { paramlist, index } => match specifier {
            Specifier::None => Err(BindError::RelativeWithoutSpecifier),
            Specifier::Frame {
                paramlist: spec_paramlist,
                frame_varlist,
            } => {
                if spec_paramlist != paramlist {
                    return Err(BindError::SpecifierMismatch);
                }
                Ok(Some(ResolvedSlot {
                    context: frame_varlist,
                    index,
                }))
            }
        },
    }
}

/// Binds a single word cell in place to an absolute slot in `context`,
/// if `context` has a key matching the word's symbol. Leaves the cell
/// unbound (not an error) if no such key exists — callers doing a
/// partial/virtual bind rely on this.
pub fn bind_word(
    cell: &mut Cell,
    context: ArrayHandle,
    contexts: &ContextTable,
    symbols: &SymbolTable,
) -> Result<(), BindError> {
    if !cell.kind().is_any_word() {
        return Err(BindError::NotAWord);
    }
    let symbol = cell.symbol().ok_or(BindError::NoSymbol)?;
    if let Some(index) = contexts.find_word(context, symbol, symbols)? {
        cell.rebind_absolute(context, index as u32)?;
    }
    Ok(())
}

/// Deep-binds every word cell reachable from `handle`'s array (and every
/// array nested inside it) to `context` — the bootstrap-time "bind these
/// cells to a context" step (spec data flow: scanner → bootstrap binds
/// → evaluator executes). Assumes the array forest has no cycles.
pub fn bind_deep(
    arrays: &mut SeriesTable<Cell>,
    handle: Handle<Series<Cell>>,
    context: ArrayHandle,
    contexts: &ContextTable,
    symbols: &SymbolTable,
) -> Result<(), BindError> {
    let mut children: Vec<Handle<Series<Cell>>> = Vec::new();
    {
        let series = arrays.get_mut(handle).ok_or(core_series::SeriesError::StaleHandle)?;
        let slice = series.as_mut_slice()?;
        for cell in slice.iter_mut() {
            let kind = cell.kind();
            if kind.is_any_word() {
                if cell.symbol().is_some() {
                    bind_word(cell, context, contexts, symbols)?;
                }
            } else if kind.is_any_array() {
                if let Ok((child, _)) = cell.as_array_handle() {
                    children.push(child);
                }
            }
        }
    }
    for child in children {
        bind_deep(arrays, child, context, contexts, symbols)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_cell::CellKind;
    use core_mem::Allocator;
    use core_series::SeriesFlags;
    use std::sync::Arc;

    fn fresh() -> (SeriesTable<Cell>, ContextTable, SymbolTable) {
        let alloc = Arc::new(Allocator::new(1 << 20));
        (
            SeriesTable::new(alloc.clone()),
            ContextTable::new(alloc),
            SymbolTable::new(),
        )
    }

    #[test]
    fn unbound_word_resolves_to_none() {
        let mut symbols = SymbolTable::new();
        let sym = symbols.intern(b"x");
        let word = Cell::word_unbound(sym);
        assert_eq!(resolve(&word, Specifier::None).unwrap(), None);
    }

    #[test]
    fn bind_word_resolves_against_matching_context() {
        let (_arrays, mut contexts, mut symbols) = fresh();
        let sym = symbols.intern(b"x");
        let ctx = contexts.create(&[sym]);
        let mut word = Cell::word_unbound(sym);
        bind_word(&mut word, ctx, &contexts, &symbols).unwrap();
        let resolved = resolve(&word, Specifier::None).unwrap().unwrap();
        assert_eq!(resolved.context, ctx);
        assert_eq!(resolved.index, 1);
    }

    #[test]
    fn bind_word_leaves_unmatched_symbol_unbound() {
        let (_arrays, mut contexts, mut symbols) = fresh();
        let known = symbols.intern(b"known");
        let other = symbols.intern(b"other");
        let ctx = contexts.create(&[known]);
        let mut word = Cell::word_unbound(other);
        bind_word(&mut word, ctx, &contexts, &symbols).unwrap();
        assert_eq!(resolve(&word, Specifier::None).unwrap(), None);
    }

    #[test]
    fn relative_binding_requires_matching_specifier() {
        let (mut arrays, _contexts, mut symbols) = fresh();
        let sym = symbols.intern(b"y");
        let paramlist = arrays.make(0, SeriesFlags::empty());
        let other_paramlist = arrays.make(0, SeriesFlags::empty());
        let frame_varlist = arrays.make(0, SeriesFlags::empty());
        let mut word = Cell::word_unbound(sym);
        word.rebind_relative(paramlist, 2).unwrap();

        assert_eq!(
            resolve(&word, Specifier::None).unwrap_err(),
            BindError::RelativeWithoutSpecifier
        );
        assert_eq!(
            resolve(
                &word,
                Specifier::Frame {
                    paramlist: other_paramlist,
                    frame_varlist,
                }
            )
            .unwrap_err(),
            BindError::SpecifierMismatch
        );
        let resolved = resolve(
            &word,
            Specifier::Frame {
                paramlist,
                frame_varlist,
            },
        )
        .unwrap()
        .unwrap();
        assert_eq!(resolved.context, frame_varlist);
        assert_eq!(resolved.index, 2);
    }

    #[test]
    fn bind_deep_reaches_words_nested_inside_blocks() {
        let (mut arrays, mut contexts, mut symbols) = fresh();
        let sym = symbols.intern(b"z");
        let ctx = contexts.create(&[sym]);

        let inner = arrays.make(1, SeriesFlags::empty());
        arrays.push(inner, Cell::word_unbound(sym)).unwrap();
        arrays.manage(inner).unwrap();

        let outer = arrays.make(1, SeriesFlags::empty());
        arrays.push(outer, Cell::block(inner, 0)).unwrap();
        arrays.manage(outer).unwrap();

        bind_deep(&mut arrays, outer, ctx, &contexts, &symbols).unwrap();

        let inner_series = arrays.get(inner).unwrap();
        let bound_word = &inner_series.as_slice()[0];
        assert_eq!(bound_word.kind(), CellKind::Word);
        let resolved = resolve(bound_word, Specifier::None).unwrap().unwrap();
        assert_eq!(resolved.context, ctx);
        assert_eq!(resolved.index, 1);
    }
}
