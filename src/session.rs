//! The hosting page: every extracted table with its own editor.
//!
//! A [`Session`] owns one [`TableDocument`] (name + [`GridEditor`]) per
//! payload, tracks which table is active and which are selected for export,
//! and runs [`Command`]s typed at the terminal against the active table.
//!
//! Tables are independent: an edit to one never touches another, and each
//! table's observers only hear about their own table.
//!
//! ```text
//! Vec<TablePayload> ──from_payloads──▶ Session ──execute(Command)──▶ Reply
//!                                        │
//!                                        ├─ export / export_each ──▶ files
//!                                        └─ save_json / autosave ──▶ payload JSON
//! ```

use crate::editor::{Command, DragItem, DropOutcome, EditOutcome, GridEditor, GridView, ItemRef};
use crate::error::Pic2CsvError;
use crate::export::{self, CsvOptions, ExportFormat, NamedTable};
use crate::output::TablePayload;
use crate::table::{ColumnKey, RowId, TableModel, TableObserver, TableSnapshot};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// One table on the page.
#[derive(Debug)]
pub struct TableDocument {
    pub name: String,
    pub editor: GridEditor,
}

impl TableDocument {
    pub fn named_table(&self) -> NamedTable {
        NamedTable {
            name: self.name.clone(),
            table: self.editor.snapshot(),
        }
    }
}

/// Summary line for `tables`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSummary {
    /// 1-based position.
    pub position: usize,
    pub name: String,
    pub columns: usize,
    pub rows: usize,
    pub active: bool,
    pub selected: bool,
}

/// What a command did, for the terminal to display.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Draw the active table.
    Show(GridView),
    Tables(Vec<TableSummary>),
    Switched { position: usize, name: String },
    Edited(EditOutcome),
    Dropped(DropOutcome),
    AddedColumn(ColumnKey),
    /// 1-based position of the new row.
    AddedRow(usize),
    Exported { path: PathBuf, bytes: u64 },
    Help,
    Quit,
    /// The command could not run (bad position, no tables, I/O failure).
    Failed(String),
}

#[derive(Debug)]
pub struct Session {
    tables: Vec<TableDocument>,
    active: usize,
    /// `None` means every table is selected.
    selection: Option<BTreeSet<usize>>,
    csv_options: CsvOptions,
}

impl Session {
    /// One editor per payload, in payload order. The first table is active
    /// and every table is selected.
    pub fn from_payloads(payloads: Vec<TablePayload>) -> Self {
        let tables = payloads
            .into_iter()
            .enumerate()
            .map(|(i, payload)| {
                let name = if payload.name.trim().is_empty() {
                    format!("Table {}", i + 1)
                } else {
                    payload.name
                };
                let model = TableModel::from_snapshot(TableSnapshot {
                    columns: payload.columns,
                    rows: payload.rows,
                });
                TableDocument {
                    name,
                    editor: GridEditor::new(model),
                }
            })
            .collect::<Vec<_>>();
        debug!("Session created with {} table(s)", tables.len());
        Self {
            tables,
            active: 0,
            selection: None,
            csv_options: CsvOptions::default(),
        }
    }

    pub fn with_csv_options(mut self, options: CsvOptions) -> Self {
        self.csv_options = options;
        self
    }

    // ── Tables ───────────────────────────────────────────────────────────

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn tables(&self) -> &[TableDocument] {
        &self.tables
    }

    pub fn table_mut(&mut self, index: usize) -> Option<&mut TableDocument> {
        self.tables.get_mut(index)
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn active(&self) -> Option<&TableDocument> {
        self.tables.get(self.active)
    }

    pub fn active_mut(&mut self) -> Option<&mut TableDocument> {
        self.tables.get_mut(self.active)
    }

    /// Switch the active table (0-based). Returns false if out of range.
    pub fn set_active(&mut self, index: usize) -> bool {
        if index < self.tables.len() {
            self.active = index;
            true
        } else {
            false
        }
    }

    // ── Selection ────────────────────────────────────────────────────────

    /// Select tables for export by 0-based index; out-of-range indices are
    /// ignored. An empty selection falls back to all tables.
    pub fn select(&mut self, indices: impl IntoIterator<Item = usize>) {
        let len = self.tables.len();
        let set: BTreeSet<usize> = indices.into_iter().filter(|&i| i < len).collect();
        self.selection = if set.is_empty() { None } else { Some(set) };
    }

    pub fn select_all(&mut self) {
        self.selection = None;
    }

    pub fn is_selected(&self, index: usize) -> bool {
        index < self.tables.len()
            && self
                .selection
                .as_ref()
                .is_none_or(|set| set.contains(&index))
    }

    /// Every table, in page order.
    pub fn all_snapshots(&self) -> Vec<NamedTable> {
        self.tables.iter().map(TableDocument::named_table).collect()
    }

    /// Selected tables in page order, or all tables when none are selected.
    pub fn selected_snapshots(&self) -> Vec<NamedTable> {
        self.tables
            .iter()
            .enumerate()
            .filter(|(i, _)| self.is_selected(*i))
            .map(|(_, doc)| doc.named_table())
            .collect()
    }

    pub fn summaries(&self) -> Vec<TableSummary> {
        self.tables
            .iter()
            .enumerate()
            .map(|(i, doc)| TableSummary {
                position: i + 1,
                name: doc.name.clone(),
                columns: doc.editor.model().column_count(),
                rows: doc.editor.model().row_count(),
                active: i == self.active,
                selected: self.is_selected(i),
            })
            .collect()
    }

    // ── Export ───────────────────────────────────────────────────────────

    /// Export the selected tables to one file: merged CSV, one XLSX sheet
    /// per table, or one PDF with a page run per table.
    pub fn export(&self, format: ExportFormat, path: impl AsRef<Path>) -> Result<u64, Pic2CsvError> {
        let tables = self.selected_snapshots();
        if tables.is_empty() {
            return Err(Pic2CsvError::NoDataFound);
        }
        export::export_to_file(&tables, format, path, &self.csv_options)
    }

    /// Export each selected table to its own `<name>.<ext>` in `dir`.
    pub fn export_each(
        &self,
        format: ExportFormat,
        dir: impl AsRef<Path>,
    ) -> Result<Vec<PathBuf>, Pic2CsvError> {
        let dir = dir.as_ref();
        let mut used: HashSet<String> = HashSet::new();
        let mut written = Vec::new();

        for (i, named) in self.selected_snapshots().into_iter().enumerate() {
            let stem = export::file_stem(&named.name, i);
            let mut unique = stem.clone();
            let mut n = 2;
            while !used.insert(unique.to_lowercase()) {
                unique = format!("{stem}_{n}");
                n += 1;
            }
            let path = dir.join(format!("{unique}.{}", format.extension()));
            export::export_to_file(std::slice::from_ref(&named), format, &path, &self.csv_options)?;
            written.push(path);
        }
        Ok(written)
    }

    // ── Persistence ──────────────────────────────────────────────────────

    /// Current tables as payloads, columns included.
    pub fn to_payloads(&self) -> Vec<TablePayload> {
        self.tables
            .iter()
            .map(|doc| {
                let snapshot = doc.editor.snapshot();
                TablePayload {
                    name: doc.name.clone(),
                    columns: snapshot.columns,
                    rows: snapshot.rows,
                }
            })
            .collect()
    }

    pub fn to_json(&self) -> Result<String, Pic2CsvError> {
        Ok(serde_json::to_string_pretty(&self.to_payloads())?)
    }

    /// Parse payload JSON: an array of tables, or `{"tables": [...]}`.
    pub fn from_json(json: &str) -> Result<Self, Pic2CsvError> {
        #[derive(serde::Deserialize)]
        #[serde(untagged)]
        enum Saved {
            List(Vec<TablePayload>),
            Envelope { tables: Vec<TablePayload> },
        }
        let payloads = match serde_json::from_str::<Saved>(json)? {
            Saved::List(tables) | Saved::Envelope { tables } => tables,
        };
        Ok(Self::from_payloads(payloads))
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), Pic2CsvError> {
        let path = path.as_ref();
        export::write_atomic(path, self.to_json()?.as_bytes())?;
        debug!("Session saved to {}", path.display());
        Ok(())
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, Pic2CsvError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Pic2CsvError::FileNotFound {
                path: path.to_path_buf(),
            },
            std::io::ErrorKind::PermissionDenied => Pic2CsvError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => Pic2CsvError::Internal(format!("read {}: {e}", path.display())),
        })?;
        let session = Self::from_json(&json)?;
        info!("Loaded {} table(s) from {}", session.len(), path.display());
        Ok(session)
    }

    /// Rewrite `path` with the whole session every time any table commits
    /// a change. The file is written once immediately.
    pub fn enable_autosave(&mut self, path: impl Into<PathBuf>) -> Result<(), Pic2CsvError> {
        let path = path.into();
        let state = Arc::new(Mutex::new(self.to_payloads()));
        self.save_json(&path)?;

        for (index, doc) in self.tables.iter_mut().enumerate() {
            doc.editor.subscribe(Arc::new(AutosaveObserver {
                index,
                path: path.clone(),
                state: Arc::clone(&state),
            }));
        }
        info!("Autosaving session to {}", path.display());
        Ok(())
    }

    // ── Commands ─────────────────────────────────────────────────────────

    /// Run one command against the active table.
    pub fn execute(&mut self, command: Command) -> Reply {
        match command {
            Command::Help => return Reply::Help,
            Command::Quit => return Reply::Quit,
            Command::Tables => return Reply::Tables(self.summaries()),
            Command::Use(position) => {
                let index = position.checked_sub(1);
                return match index {
                    Some(index) if self.set_active(index) => Reply::Switched {
                        position,
                        name: self.tables[index].name.clone(),
                    },
                    _ => Reply::Failed(format!(
                        "no table {position} (there are {})",
                        self.tables.len()
                    )),
                };
            }
            Command::Export { path, format } => {
                let format = format
                    .or_else(|| ExportFormat::from_path(&path))
                    .unwrap_or_default();
                return match self.export(format, &path) {
                    Ok(bytes) => Reply::Exported { path, bytes },
                    Err(e) => Reply::Failed(e.to_string()),
                };
            }
            _ => {}
        }

        let Some(doc) = self.tables.get_mut(self.active) else {
            return Reply::Failed("there are no tables to edit".to_string());
        };
        let editor = &mut doc.editor;

        match command {
            Command::Show => Reply::Show(editor.render()),
            Command::Rename { column, to } => Reply::Edited(editor.edit_header(&column, &to)),
            Command::MoveColumn { from, to } => match index_pair(from, to) {
                Some((from, to)) => Reply::Edited(editor.move_column(from, to)),
                None => Reply::Failed(format!("no column {}", from.min(to))),
            },
            Command::MoveRow { from, to } => match index_pair(from, to) {
                Some((from, to)) => Reply::Edited(editor.move_row(from, to)),
                None => Reply::Failed(no_row(from.min(to))),
            },
            Command::Drag { source, target } => {
                let Some(source) = drag_item(editor, source) else {
                    return Reply::Dropped(DropOutcome::Ignored);
                };
                if !editor.begin_drag(&source) {
                    return Reply::Dropped(DropOutcome::Ignored);
                }
                let target = target.and_then(|t| drag_item(editor, t));
                Reply::Dropped(editor.drop_on(target.as_ref()))
            }
            Command::Set { row, column, value } => match row_at(editor, row) {
                Some(id) => Reply::Edited(editor.edit_cell(id, &column, &value)),
                None => Reply::Failed(no_row(row)),
            },
            Command::AddColumn => Reply::AddedColumn(editor.add_column()),
            Command::DeleteColumn(key) => Reply::Edited(editor.delete_column(&key)),
            Command::AddRow => {
                editor.add_row();
                Reply::AddedRow(editor.model().row_count())
            }
            Command::DeleteRow(row) => match row_at(editor, row) {
                Some(id) => Reply::Edited(editor.delete_row(id)),
                None => Reply::Failed(no_row(row)),
            },
            Command::Help
            | Command::Quit
            | Command::Tables
            | Command::Use(_)
            | Command::Export { .. } => Reply::Failed("not a table command".to_string()),
        }
    }
}

/// Resolve a 1-based display position against the current render.
fn row_at(editor: &GridEditor, position: usize) -> Option<RowId> {
    position
        .checked_sub(1)
        .and_then(|i| editor.render().row_at(i))
}

/// Two 1-based positions as 0-based indices; `None` if either is 0.
fn index_pair(from: usize, to: usize) -> Option<(usize, usize)> {
    Some((from.checked_sub(1)?, to.checked_sub(1)?))
}

fn no_row(position: usize) -> String {
    format!("no row {position}")
}

fn drag_item(editor: &GridEditor, item: ItemRef) -> Option<DragItem> {
    match item {
        ItemRef::Column(key) => Some(DragItem::Column(key)),
        ItemRef::Row(position) => row_at(editor, position).map(DragItem::Row),
    }
}

// ── Autosave ─────────────────────────────────────────────────────────────────

/// Keeps the last emitted snapshot of every table and rewrites the session
/// file on each emission.
struct AutosaveObserver {
    index: usize,
    path: PathBuf,
    state: Arc<Mutex<Vec<TablePayload>>>,
}

impl TableObserver for AutosaveObserver {
    fn on_snapshot(&self, snapshot: &TableSnapshot) {
        let Ok(mut tables) = self.state.lock() else {
            warn!("Autosave state poisoned; skipping write");
            return;
        };
        let Some(table) = tables.get_mut(self.index) else {
            return;
        };
        table.columns = snapshot.columns.clone();
        table.rows = snapshot.rows.clone();

        let result = serde_json::to_string_pretty(&*tables)
            .map_err(Pic2CsvError::from)
            .and_then(|json| export::write_atomic(&self.path, json.as_bytes()));
        if let Err(e) = result {
            warn!("Autosave to {} failed: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TableError;
    use pretty_assertions::assert_eq;

    fn payload(name: &str, pairs: &[&[(&str, &str)]]) -> TablePayload {
        TablePayload::new(
            name,
            pairs
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect()
                })
                .collect(),
        )
    }

    fn session() -> Session {
        Session::from_payloads(vec![
            payload(
                "People",
                &[&[("Name", "Alice"), ("Age", "30")], &[("Name", "Bob"), ("Age", "25")]],
            ),
            payload("Totals", &[&[("Type", "VAT"), ("Amount", "33.14")]]),
        ])
    }

    fn run(s: &mut Session, line: &str) -> Reply {
        s.execute(Command::parse(line).unwrap().unwrap())
    }

    #[test]
    fn payloads_become_independent_tables() {
        let mut s = session();
        assert_eq!(s.len(), 2);
        assert_eq!(run(&mut s, "rename Age Years"), Reply::Edited(EditOutcome::Applied));
        assert_eq!(s.tables()[0].editor.model().columns(), ["Name", "Years"]);
        assert_eq!(s.tables()[1].editor.model().columns(), ["Type", "Amount"]);
    }

    #[test]
    fn unnamed_payloads_get_positional_names() {
        let s = Session::from_payloads(vec![payload("", &[&[("a", "1")]])]);
        assert_eq!(s.tables()[0].name, "Table 1");
    }

    #[test]
    fn rows_are_addressed_by_display_position() {
        let mut s = session();
        run(&mut s, "move-row 2 1");
        assert_eq!(run(&mut s, "set 1 Age 26"), Reply::Edited(EditOutcome::Applied));
        let snap = s.tables()[0].editor.snapshot();
        assert_eq!(snap.rows[0]["Name"], "Bob");
        assert_eq!(snap.rows[0]["Age"], "26");
        assert_eq!(run(&mut s, "set 9 Age 1"), Reply::Failed("no row 9".into()));
    }

    #[test]
    fn drag_commands() {
        let mut s = session();
        assert!(matches!(
            run(&mut s, "drag col:Age col:Name"),
            Reply::Dropped(DropOutcome::Reordered { from: 1, to: 0, .. })
        ));
        assert_eq!(
            run(&mut s, "drag col:Age row:1"),
            Reply::Dropped(DropOutcome::Ignored)
        );
        assert_eq!(run(&mut s, "drag row:2"), Reply::Dropped(DropOutcome::Ignored));
        assert_eq!(run(&mut s, "drag row:7 row:1"), Reply::Dropped(DropOutcome::Ignored));
        assert_eq!(s.tables()[0].editor.model().columns(), ["Age", "Name"]);
    }

    #[test]
    fn last_column_and_duplicates() {
        let mut s = session();
        run(&mut s, "use 2");
        assert_eq!(run(&mut s, "del-col Amount"), Reply::Edited(EditOutcome::Applied));
        assert_eq!(run(&mut s, "del-col Type"), Reply::Edited(EditOutcome::Unchanged));
        assert!(matches!(
            run(&mut s, "rename Type Type2"),
            Reply::Edited(EditOutcome::Applied)
        ));
        run(&mut s, "add-col");
        assert!(matches!(
            run(&mut s, "rename Type2 \"New Column 2\""),
            Reply::Edited(EditOutcome::Rejected(TableError::DuplicateColumn { .. }))
        ));
    }

    #[test]
    fn use_switches_and_reports_range() {
        let mut s = session();
        assert_eq!(
            run(&mut s, "use 2"),
            Reply::Switched {
                position: 2,
                name: "Totals".into()
            }
        );
        assert_eq!(s.active_index(), 1);
        assert!(matches!(run(&mut s, "use 5"), Reply::Failed(_)));
        assert_eq!(s.active_index(), 1);
    }

    #[test]
    fn add_row_reports_position() {
        let mut s = session();
        assert_eq!(run(&mut s, "add-row"), Reply::AddedRow(3));
        assert_eq!(run(&mut s, "add-col"), Reply::AddedColumn("New Column 3".into()));
    }

    #[test]
    fn selection_filters_exports() {
        let mut s = session();
        assert_eq!(s.selected_snapshots().len(), 2);
        s.select([1]);
        let names: Vec<String> = s.selected_snapshots().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["Totals"]);
        s.select([9]);
        assert_eq!(s.selected_snapshots().len(), 2);
    }

    #[test]
    fn export_merged_and_each() {
        let dir = tempfile::tempdir().unwrap();
        let s = session();

        let merged = dir.path().join("all.csv");
        s.export(ExportFormat::Csv, &merged).unwrap();
        let text = std::fs::read_to_string(&merged).unwrap();
        assert!(text.starts_with("# TABLE: People\nName,Age\n"));
        assert!(text.contains("\n# TABLE: Totals\nType,Amount\nVAT,33.14\n"));

        let files = s.export_each(ExportFormat::Csv, dir.path()).unwrap();
        assert_eq!(files, vec![dir.path().join("People.csv"), dir.path().join("Totals.csv")]);
        assert_eq!(
            std::fs::read_to_string(&files[1]).unwrap(),
            "Type,Amount\nVAT,33.14\n"
        );
    }

    #[test]
    fn export_each_deduplicates_names() {
        let dir = tempfile::tempdir().unwrap();
        let s = Session::from_payloads(vec![
            payload("Sheet", &[&[("a", "1")]]),
            payload("Sheet", &[&[("b", "2")]]),
        ]);
        let files = s.export_each(ExportFormat::Json, dir.path()).unwrap();
        assert_eq!(files[1], dir.path().join("Sheet_2.json"));
    }

    #[test]
    fn export_command_infers_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xlsx");
        let mut s = session();
        let reply = s.execute(Command::Export {
            path: path.clone(),
            format: None,
        });
        assert!(matches!(reply, Reply::Exported { .. }));
        assert_eq!(&std::fs::read(&path).unwrap()[..2], b"PK");
    }

    #[test]
    fn json_round_trip_keeps_header_only_tables() {
        let mut s = session();
        run(&mut s, "use 2");
        run(&mut s, "del-row 1");
        let json = s.to_json().unwrap();

        let back = Session::from_json(&json).unwrap();
        assert_eq!(back.to_payloads(), s.to_payloads());
        assert_eq!(back.tables()[1].editor.model().columns(), ["Type", "Amount"]);

        let envelope = r#"{"tables":[{"name":"X","data":[{"k":"v"}]}]}"#;
        assert_eq!(Session::from_json(envelope).unwrap().tables()[0].name, "X");
    }

    #[test]
    fn autosave_tracks_every_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let mut s = session();
        s.enable_autosave(&path).unwrap();

        run(&mut s, "set 1 Name Alicia");
        let saved = Session::load_json(&path).unwrap();
        assert_eq!(saved.tables()[0].editor.snapshot().rows[0]["Name"], "Alicia");

        run(&mut s, "use 2");
        run(&mut s, "rename Amount Total");
        let saved = Session::load_json(&path).unwrap();
        assert_eq!(saved.to_payloads(), s.to_payloads());
    }

    #[test]
    fn autosave_keeps_header_edits_of_an_emptied_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let mut s = session();
        s.enable_autosave(&path).unwrap();

        run(&mut s, "use 2");
        assert_eq!(run(&mut s, "del-row 1"), Reply::Edited(EditOutcome::Applied));
        assert_eq!(run(&mut s, "rename Amount Total"), Reply::Edited(EditOutcome::Applied));
        assert!(matches!(run(&mut s, "add-col"), Reply::AddedColumn(_)));
        assert_eq!(run(&mut s, "del-col Type"), Reply::Edited(EditOutcome::Applied));

        let saved = Session::load_json(&path).unwrap();
        assert_eq!(saved.to_payloads(), s.to_payloads());
        assert_eq!(saved.tables()[1].editor.model().columns().len(), 2);
        assert_eq!(saved.tables()[1].editor.model().columns()[0], "Total");
    }

    #[test]
    fn zero_positions_fail_without_panicking() {
        let mut s = session();
        let before = s.to_payloads();

        assert!(matches!(s.execute(Command::Use(0)), Reply::Failed(_)));
        assert_eq!(s.active_index(), 0);
        assert_eq!(
            s.execute(Command::MoveColumn { from: 0, to: 1 }),
            Reply::Failed("no column 0".into())
        );
        assert_eq!(
            s.execute(Command::MoveColumn { from: 2, to: 0 }),
            Reply::Failed("no column 0".into())
        );
        assert_eq!(
            s.execute(Command::MoveRow { from: 0, to: 2 }),
            Reply::Failed("no row 0".into())
        );
        assert_eq!(s.execute(Command::DeleteRow(0)), Reply::Failed("no row 0".into()));
        assert_eq!(s.to_payloads(), before);
    }

    #[test]
    fn empty_session_reports_instead_of_panicking() {
        let mut s = Session::from_payloads(vec![]);
        assert!(matches!(run(&mut s, "show"), Reply::Failed(_)));
        assert!(matches!(s.export(ExportFormat::Csv, "x.csv"), Err(Pic2CsvError::NoDataFound)));
    }
}
