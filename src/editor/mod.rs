//! Interactive editing on top of [`crate::table::TableModel`].
//!
//! 1. [`grid`]    — [`GridEditor`]: gestures (cell edit, header rename,
//!    add/delete, drag-and-drop) and the render snapshot
//! 2. [`command`] — a line language that maps typed commands onto gestures

pub mod command;
pub mod grid;

pub use command::{Command, CommandError, ItemRef};
pub use grid::{
    Axis, DragItem, DragState, DropOutcome, EditOutcome, GridEditor, GridView, HeaderView, RowView,
};
