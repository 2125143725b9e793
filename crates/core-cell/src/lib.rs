//! The universal tagged value (`Cell`) and its satellite types: the
//! kind/flags header, the payload shapes, and `MAP!`'s hash table.

mod cell;
mod kind;
mod map;
mod map_table;
mod payload;

pub use cell::{Cell, CellError};
pub use kind::{CellFlags, CellHeader, CellKind};
pub use map::Map;
pub use map_table::{ManagedMap, MapTable, MapTableError};
pub use payload::{
    ArrayHandle, BytesHandle, ContextRef, Extra, FunctionPayload, MapHandle, Payload, SeriesRef,
    WideHandle, WordBinding,
};
