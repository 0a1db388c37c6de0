pub mod block;
pub mod data_table;
pub mod layout;
pub mod projected_row;
pub mod storage_util;
pub mod tuple_access;
pub mod undo;

#[cfg(test)]
pub mod test_util;

pub use block::{BlockStore, RawBlock};
pub use data_table::DataTable;
pub use layout::BlockLayout;
pub use projected_row::{ProjectedRow, ProjectedRowInitializer};
pub use tuple_access::{TupleAccessStrategy, TupleSlot};
pub use undo::{BufferSegment, UndoBuffer, UndoRecord};
