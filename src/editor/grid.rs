//! [`GridEditor`]: user gestures in, [`TableModel`] mutations out.
//!
//! The editor holds no copy of the table. Every gesture becomes a model
//! call, every render reads the model afresh, so the view cannot drift from
//! the data. The one piece of local state is the transient drag:
//!
//! ```text
//!            begin_drag(item)
//!   Idle ───────────────────────▶ Dragging { axis, source_index }
//!    ▲                                   │
//!    └──── drop_on(..) / cancel_drag() ──┘
//! ```
//!
//! Gestures never return `Err`. A refused edit comes back as
//! [`EditOutcome::Rejected`] so the caller can flag the field while the
//! session carries on.

use crate::error::TableError;
use crate::table::{ColumnKey, RowId, TableModel, TableObserverRef, TableSnapshot};
use serde::Serialize;
use tracing::{debug, warn};

/// Which axis a drag moves along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Axis {
    Column,
    Row,
}

/// A draggable thing: a column header or a row handle.
///
/// Column keys and row ids live in separate namespaces, so a column named
/// like a row id can never be confused with that row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragItem {
    Column(ColumnKey),
    Row(RowId),
}

impl DragItem {
    pub fn axis(&self) -> Axis {
        match self {
            DragItem::Column(_) => Axis::Column,
            DragItem::Row(_) => Axis::Row,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum DragState {
    #[default]
    Idle,
    Dragging { axis: Axis, source_index: usize },
}

/// Result of a gesture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    /// The model changed and emitted.
    Applied,
    /// The gesture was valid but changed nothing.
    Unchanged,
    /// The model refused the change and is exactly as before.
    Rejected(TableError),
}

impl EditOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, EditOutcome::Applied)
    }

    fn from_result(result: Result<(), TableError>) -> Self {
        match result {
            Ok(()) => EditOutcome::Applied,
            Err(e) => {
                warn!("Edit rejected: {}", e);
                EditOutcome::Rejected(e)
            }
        }
    }
}

/// Result of finishing a drag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropOutcome {
    /// The dragged item moved.
    Reordered { axis: Axis, from: usize, to: usize },
    /// Dropped onto itself.
    Unchanged,
    /// No drag in progress, no target, a target on the other axis, or a
    /// target that no longer exists. Nothing changed.
    Ignored,
}

/// One header cell as the view should draw it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeaderView {
    pub key: ColumnKey,
    /// False when this is the only column left.
    pub deletable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowView {
    pub id: RowId,
    /// Cell text in header order.
    pub cells: Vec<String>,
}

/// A read-only picture of the editor, rebuilt on every render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GridView {
    pub headers: Vec<HeaderView>,
    pub rows: Vec<RowView>,
    pub drag: DragState,
}

impl GridView {
    /// Resolve a display position to the row shown there.
    pub fn row_at(&self, index: usize) -> Option<RowId> {
        self.rows.get(index).map(|r| r.id)
    }
}

/// Binds one [`TableModel`] to user gestures.
#[derive(Debug)]
pub struct GridEditor {
    model: TableModel,
    drag: DragState,
}

impl GridEditor {
    pub fn new(model: TableModel) -> Self {
        Self {
            model,
            drag: DragState::Idle,
        }
    }

    pub fn model(&self) -> &TableModel {
        &self.model
    }

    pub fn into_model(self) -> TableModel {
        self.model
    }

    /// Forward model emissions to `observer`.
    pub fn subscribe(&mut self, observer: TableObserverRef) {
        self.model.subscribe(observer);
    }

    pub fn drag_state(&self) -> DragState {
        self.drag
    }

    pub fn snapshot(&self) -> TableSnapshot {
        self.model.snapshot()
    }

    pub fn render(&self) -> GridView {
        let deletable = self.can_delete_column();
        let headers = self
            .model
            .columns()
            .iter()
            .map(|key| HeaderView {
                key: key.clone(),
                deletable,
            })
            .collect();
        let rows = self
            .model
            .row_ids()
            .map(|id| RowView {
                id,
                cells: self
                    .model
                    .row_values(id)
                    .unwrap_or_default()
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
            })
            .collect();

        GridView {
            headers,
            rows,
            drag: self.drag,
        }
    }

    // ── Headers ──────────────────────────────────────────────────────────

    /// Commit header text typed into the field for `key`.
    ///
    /// Safe to call on every keystroke: unchanged text is a no-op and text
    /// that collides with another column is rejected while the column keeps
    /// its current key and data.
    pub fn edit_header(&mut self, key: &str, text: &str) -> EditOutcome {
        if key == text {
            return EditOutcome::Unchanged;
        }
        EditOutcome::from_result(self.model.rename_column(key, text))
    }

    pub fn can_delete_column(&self) -> bool {
        self.model.column_count() > 1
    }

    /// Delete-column button. Does nothing when only one column is left.
    pub fn delete_column(&mut self, key: &str) -> EditOutcome {
        if self.model.has_column(key) && !self.can_delete_column() {
            debug!("Ignoring delete of last column '{}'", key);
            return EditOutcome::Unchanged;
        }
        EditOutcome::from_result(self.model.delete_column(key))
    }

    /// Add-column button: appends an auto-named column.
    pub fn add_column(&mut self) -> ColumnKey {
        self.model.add_auto_column()
    }

    // ── Rows and cells ───────────────────────────────────────────────────

    pub fn edit_cell(&mut self, row: RowId, key: &str, text: &str) -> EditOutcome {
        if self.model.cell(row, key) == Some(text) {
            return EditOutcome::Unchanged;
        }
        EditOutcome::from_result(self.model.set_cell(row, key, text))
    }

    pub fn add_row(&mut self) -> RowId {
        self.model.add_row()
    }

    pub fn delete_row(&mut self, row: RowId) -> EditOutcome {
        EditOutcome::from_result(self.model.delete_row(row))
    }

    // ── Drag and drop ────────────────────────────────────────────────────

    /// Pick up a column header or row handle.
    ///
    /// Returns false (and stays idle) if the item no longer exists.
    pub fn begin_drag(&mut self, item: &DragItem) -> bool {
        match self.index_of(item) {
            Some(source_index) => {
                self.drag = DragState::Dragging {
                    axis: item.axis(),
                    source_index,
                };
                true
            }
            None => {
                self.drag = DragState::Idle;
                false
            }
        }
    }

    /// Drop the dragged item onto `target`. `None` means released outside
    /// any target. The editor is idle afterwards in every case.
    pub fn drop_on(&mut self, target: Option<&DragItem>) -> DropOutcome {
        let state = std::mem::take(&mut self.drag);
        let DragState::Dragging { axis, source_index } = state else {
            return DropOutcome::Ignored;
        };
        let Some(target) = target else {
            return DropOutcome::Ignored;
        };
        if target.axis() != axis {
            debug!("Ignoring cross-axis drop: {:?} onto {:?}", axis, target.axis());
            return DropOutcome::Ignored;
        }
        let Some(to) = self.index_of(target) else {
            return DropOutcome::Ignored;
        };
        if source_index == to {
            return DropOutcome::Unchanged;
        }

        let result = match axis {
            Axis::Column => self.model.reorder_columns(source_index, to),
            Axis::Row => self.model.reorder_rows(source_index, to),
        };
        match result {
            Ok(()) => DropOutcome::Reordered {
                axis,
                from: source_index,
                to,
            },
            Err(e) => {
                warn!("Drop rejected: {}", e);
                DropOutcome::Ignored
            }
        }
    }

    /// Abort a drag (escape key, pointer left the grid).
    pub fn cancel_drag(&mut self) {
        self.drag = DragState::Idle;
    }

    /// Keyboard reorder of a column by 0-based position.
    pub fn move_column(&mut self, from: usize, to: usize) -> EditOutcome {
        if from == to && from < self.model.column_count() {
            return EditOutcome::Unchanged;
        }
        EditOutcome::from_result(self.model.reorder_columns(from, to))
    }

    /// Keyboard reorder of a row by 0-based position.
    pub fn move_row(&mut self, from: usize, to: usize) -> EditOutcome {
        if from == to && from < self.model.row_count() {
            return EditOutcome::Unchanged;
        }
        EditOutcome::from_result(self.model.reorder_rows(from, to))
    }

    /// Convenience for a complete drag gesture.
    pub fn drag_and_drop(&mut self, source: &DragItem, target: &DragItem) -> DropOutcome {
        if !self.begin_drag(source) {
            return DropOutcome::Ignored;
        }
        self.drop_on(Some(target))
    }

    fn index_of(&self, item: &DragItem) -> Option<usize> {
        match item {
            DragItem::Column(key) => self.model.column_index(key),
            DragItem::Row(id) => self.model.row_index(*id),
        }
    }
}
