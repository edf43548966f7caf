//! [`TableModel`]: the authoritative in-memory form of one extracted table.
//!
//! ## Storage
//!
//! ```text
//! columns: ["Name", "Age"]                 ordered, pairwise distinct
//! rows:    RowId(…a1) → {Name: "Alice", Age: "30"}
//!          RowId(…f7) → {Name: "Bob",   Age: "25"}
//!          ^ IndexMap: lookup by id, iteration in row order
//! ```
//!
//! Cells are keyed by column name, not position, so moving a column never
//! touches row data. Every row stores only keys that are current columns;
//! a missing key reads as the empty string.
//!
//! ## Atomicity
//!
//! Each mutator validates everything before touching state. A returned
//! `Err(TableError)` means nothing changed and nothing was emitted.

use crate::error::TableError;
use crate::table::observer::TableObserverRef;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::debug;
use uuid::Uuid;

/// A column key: unique within its table, doubles as the header text.
pub type ColumnKey = String;

/// A plain record: column key → cell text, iterated in insertion order.
pub type Record = IndexMap<ColumnKey, String>;

/// Stable identity of one row.
///
/// Generated when the row is created and never reused. It is a distinct type
/// from [`ColumnKey`], so a row id can never be mistaken for a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowId(Uuid);

impl RowId {
    fn generate() -> Self {
        RowId(Uuid::new_v4())
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row-{}", self.0.simple())
    }
}

/// Columns plus canonical rows: what export collaborators consume.
///
/// `columns` is carried explicitly so a table with no rows still exports
/// its header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSnapshot {
    pub columns: Vec<ColumnKey>,
    pub rows: Vec<Record>,
}

type Cells = HashMap<ColumnKey, String>;

/// One editable table. See the [module docs](self) for the storage layout.
pub struct TableModel {
    columns: Vec<ColumnKey>,
    rows: IndexMap<RowId, Cells>,
    observers: Vec<TableObserverRef>,
}

impl fmt::Debug for TableModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableModel")
            .field("columns", &self.columns)
            .field("rows", &self.rows.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl TableModel {
    /// Seed a model from extracted rows.
    ///
    /// Columns are the keys of `rows[0]` in their order; an empty input gives
    /// an empty table. Keys of later rows that are not columns are dropped.
    /// Every row receives a fresh [`RowId`].
    pub fn new(rows: Vec<Record>) -> Self {
        let columns: Vec<ColumnKey> = rows
            .first()
            .map(|first| first.keys().cloned().collect())
            .unwrap_or_default();
        let known: HashSet<&str> = columns.iter().map(String::as_str).collect();

        let rows = rows
            .into_iter()
            .map(|record| {
                let cells: Cells = record
                    .into_iter()
                    .filter(|(key, _)| known.contains(key.as_str()))
                    .collect();
                (RowId::generate(), cells)
            })
            .collect();

        Self {
            columns,
            rows,
            observers: Vec::new(),
        }
    }

    /// Rebuild a model from a saved snapshot, keeping its column order even
    /// when there are no rows. Repeated column names keep their first place.
    pub fn from_snapshot(snapshot: TableSnapshot) -> Self {
        if snapshot.columns.is_empty() {
            return Self::new(snapshot.rows);
        }
        let mut model = Self::new(Vec::new());
        for key in snapshot.columns {
            if !model.has_column(&key) {
                model.columns.push(key);
            }
        }
        let known: HashSet<&str> = model.columns.iter().map(String::as_str).collect();
        let rows: IndexMap<RowId, Cells> = snapshot
            .rows
            .into_iter()
            .map(|record| {
                let cells: Cells = record
                    .into_iter()
                    .filter(|(key, _)| known.contains(key.as_str()))
                    .collect();
                (RowId::generate(), cells)
            })
            .collect();
        model.rows = rows;
        model
    }

    /// Like [`TableModel::new`] but refuses an empty payload.
    pub fn try_new(rows: Vec<Record>) -> Result<Self, TableError> {
        if rows.is_empty() {
            return Err(TableError::EmptyPayload);
        }
        Ok(Self::new(rows))
    }

    /// Register an observer for every future committed change.
    pub fn subscribe(&mut self, observer: TableObserverRef) {
        self.observers.push(observer);
    }

    // ── Reads ────────────────────────────────────────────────────────────

    pub fn columns(&self) -> &[ColumnKey] {
        &self.columns
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, key: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == key)
    }

    pub fn has_column(&self, key: &str) -> bool {
        self.column_index(key).is_some()
    }

    /// Row ids in current row order.
    pub fn row_ids(&self) -> impl Iterator<Item = RowId> + '_ {
        self.rows.keys().copied()
    }

    pub fn row_id_at(&self, index: usize) -> Option<RowId> {
        self.rows.get_index(index).map(|(id, _)| *id)
    }

    pub fn row_index(&self, row: RowId) -> Option<usize> {
        self.rows.get_index_of(&row)
    }

    /// Cell text, `None` if the row or column does not exist.
    pub fn cell(&self, row: RowId, key: &str) -> Option<&str> {
        if !self.has_column(key) {
            return None;
        }
        let cells = self.rows.get(&row)?;
        Some(cells.get(key).map(String::as_str).unwrap_or(""))
    }

    /// One row's cells in current column order.
    pub fn row_values(&self, row: RowId) -> Option<Vec<&str>> {
        let cells = self.rows.get(&row)?;
        Some(
            self.columns
                .iter()
                .map(|c| cells.get(c).map(String::as_str).unwrap_or(""))
                .collect(),
        )
    }

    /// Rows in row order, each with exactly the current columns in column
    /// order. Missing cells read as `""`. Row ids are not included.
    pub fn to_canonical_form(&self) -> Vec<Record> {
        self.rows
            .values()
            .map(|cells| {
                self.columns
                    .iter()
                    .map(|c| (c.clone(), cells.get(c).cloned().unwrap_or_default()))
                    .collect()
            })
            .collect()
    }

    pub fn snapshot(&self) -> TableSnapshot {
        TableSnapshot {
            columns: self.columns.clone(),
            rows: self.to_canonical_form(),
        }
    }

    // ── Mutations ────────────────────────────────────────────────────────

    /// Rename a column in place, carrying every row's value to the new key.
    pub fn rename_column(&mut self, old_key: &str, new_key: &str) -> Result<(), TableError> {
        if old_key == new_key {
            return Ok(());
        }
        let pos = self.require_column(old_key)?;
        if self.has_column(new_key) {
            return Err(TableError::DuplicateColumn {
                key: new_key.to_string(),
            });
        }

        self.columns[pos] = new_key.to_string();
        for cells in self.rows.values_mut() {
            if let Some(value) = cells.remove(old_key) {
                cells.insert(new_key.to_string(), value);
            }
        }

        debug!("Renamed column '{}' → '{}'", old_key, new_key);
        self.emit();
        Ok(())
    }

    /// Move the column at `from` to `to`, shifting the ones in between.
    pub fn reorder_columns(&mut self, from: usize, to: usize) -> Result<(), TableError> {
        check_bounds("column", from, self.columns.len())?;
        check_bounds("column", to, self.columns.len())?;
        if from == to {
            return Ok(());
        }

        let key = self.columns.remove(from);
        self.columns.insert(to, key);
        self.emit();
        Ok(())
    }

    /// Move the row at `from` to `to`; its [`RowId`] moves with it.
    pub fn reorder_rows(&mut self, from: usize, to: usize) -> Result<(), TableError> {
        check_bounds("row", from, self.rows.len())?;
        check_bounds("row", to, self.rows.len())?;
        if from == to {
            return Ok(());
        }

        self.rows.move_index(from, to);
        self.emit();
        Ok(())
    }

    /// Set one cell. Only existing rows and columns can be addressed.
    pub fn set_cell(
        &mut self,
        row: RowId,
        key: &str,
        value: impl Into<String>,
    ) -> Result<(), TableError> {
        if !self.rows.contains_key(&row) {
            return Err(TableError::RowNotFound(row));
        }
        self.require_column(key)?;

        let value = value.into();
        let Some(cells) = self.rows.get_mut(&row) else {
            return Err(TableError::RowNotFound(row));
        };
        if cells.get(key).map(String::as_str).unwrap_or("") == value {
            return Ok(());
        }
        cells.insert(key.to_string(), value);
        self.emit();
        Ok(())
    }

    /// Append a column. Without a key, a free `New Column N` name is chosen.
    /// Every existing row gets an empty cell for it.
    pub fn add_column(&mut self, key: Option<&str>) -> Result<ColumnKey, TableError> {
        match key {
            Some(k) if self.has_column(k) => Err(TableError::DuplicateColumn { key: k.to_string() }),
            Some(k) => Ok(self.push_column(k.to_string())),
            None => Ok(self.add_auto_column()),
        }
    }

    /// Append a column under the first free `New Column N` name.
    pub fn add_auto_column(&mut self) -> ColumnKey {
        let key = self.next_column_name();
        self.push_column(key)
    }

    fn push_column(&mut self, key: ColumnKey) -> ColumnKey {
        self.columns.push(key.clone());
        for cells in self.rows.values_mut() {
            cells.insert(key.clone(), String::new());
        }

        debug!("Added column '{}'", key);
        self.emit();
        key
    }

    /// Remove a column and its cells. The last column cannot be removed.
    pub fn delete_column(&mut self, key: &str) -> Result<(), TableError> {
        let pos = self.require_column(key)?;
        if self.columns.len() == 1 {
            return Err(TableError::LastColumn {
                key: key.to_string(),
            });
        }

        self.columns.remove(pos);
        for cells in self.rows.values_mut() {
            cells.remove(key);
        }

        debug!("Deleted column '{}'", key);
        self.emit();
        Ok(())
    }

    /// Append an empty row and return its id.
    pub fn add_row(&mut self) -> RowId {
        let id = RowId::generate();
        let cells = self
            .columns
            .iter()
            .map(|c| (c.clone(), String::new()))
            .collect();
        self.rows.insert(id, cells);
        self.emit();
        id
    }

    pub fn delete_row(&mut self, row: RowId) -> Result<(), TableError> {
        if self.rows.shift_remove(&row).is_none() {
            return Err(TableError::RowNotFound(row));
        }
        self.emit();
        Ok(())
    }

    // ── Internal helpers ─────────────────────────────────────────────────

    fn require_column(&self, key: &str) -> Result<usize, TableError> {
        self.column_index(key).ok_or_else(|| TableError::ColumnNotFound {
            key: key.to_string(),
        })
    }

    fn next_column_name(&self) -> ColumnKey {
        let mut n = self.columns.len() + 1;
        loop {
            let candidate = format!("New Column {n}");
            if !self.has_column(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    fn emit(&self) {
        if self.observers.is_empty() {
            return;
        }
        let snapshot = self.snapshot();
        debug!(
            "Emitting table: {} columns × {} rows",
            snapshot.columns.len(),
            snapshot.rows.len()
        );
        for observer in &self.observers {
            observer.on_table_changed(&snapshot.rows);
            observer.on_snapshot(&snapshot);
        }
    }
}

fn check_bounds(axis: &'static str, index: usize, len: usize) -> Result<(), TableError> {
    if index < len {
        Ok(())
    } else {
        Err(TableError::IndexOutOfRange { axis, index, len })
    }
}
