//! The table core: one extracted table as an editable grid.
//!
//! [`TableModel`] owns the column order, the row order and every cell. Rows
//! are addressed by an opaque [`RowId`] handed out at creation time, never by
//! position, so reordering rows cannot make an outstanding reference point at
//! the wrong record. Columns are addressed by their key.
//!
//! The only representation that leaves the core is the canonical form: a
//! `Vec<Record>` in row order with keys in column order
//! ([`TableModel::to_canonical_form`]).

pub mod model;
pub mod observer;

pub use model::{ColumnKey, Record, RowId, TableModel, TableSnapshot};
pub use observer::{TableObserver, TableObserverRef};
