//! Export collaborators: turn canonical tables into files.
//!
//! Every exporter consumes the same contract, a [`NamedTable`] (display name
//! + [`TableSnapshot`]), and none of them ever sees row ids or editor state.
//!
//! | Format | Module | Multi-table layout |
//! |--------|--------|--------------------|
//! | CSV    | [`csv`]  | `# TABLE: <name>` block per table |
//! | XLSX   | [`xlsx`] | one worksheet per table |
//! | PDF    | [`pdf`]  | each table starts on a new page |
//! | JSON   | —        | array of `{name, columns, rows}` (reloadable) |

pub mod csv;
pub mod pdf;
pub mod xlsx;

pub use self::csv::CsvOptions;

use crate::error::Pic2CsvError;
use crate::table::TableSnapshot;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// A table with the name it is exported under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedTable {
    pub name: String,
    #[serde(flatten)]
    pub table: TableSnapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExportFormat {
    #[default]
    Csv,
    Xlsx,
    Pdf,
    Json,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Pdf => "pdf",
            ExportFormat::Json => "json",
        }
    }

    /// Infer the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()?.to_str()?.parse().ok()
    }
}

impl FromStr for ExportFormat {
    type Err = Pic2CsvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "csv" | "txt" => Ok(ExportFormat::Csv),
            "xlsx" | "excel" => Ok(ExportFormat::Xlsx),
            "pdf" => Ok(ExportFormat::Pdf),
            "json" => Ok(ExportFormat::Json),
            other => Err(Pic2CsvError::InvalidConfig(format!(
                "unknown export format '{other}'"
            ))),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Render `tables` in `format` to bytes.
pub fn render(
    tables: &[NamedTable],
    format: ExportFormat,
    csv_options: &CsvOptions,
) -> Result<Vec<u8>, Pic2CsvError> {
    match format {
        ExportFormat::Csv => {
            if let [single] = tables {
                self::csv::to_string(&single.table, csv_options).map(String::into_bytes)
            } else {
                self::csv::merged(tables, csv_options).map(String::into_bytes)
            }
        }
        ExportFormat::Xlsx => xlsx::workbook_bytes(tables),
        ExportFormat::Pdf => pdf::document_bytes(tables),
        ExportFormat::Json => Ok(serde_json::to_vec_pretty(tables)?),
    }
}

/// Render and write to `path` atomically (temp file + rename).
pub fn export_to_file(
    tables: &[NamedTable],
    format: ExportFormat,
    path: impl AsRef<Path>,
    csv_options: &CsvOptions,
) -> Result<u64, Pic2CsvError> {
    let path = path.as_ref();
    let bytes = render(tables, format, csv_options)?;
    write_atomic(path, &bytes)?;
    info!(
        "Exported {} table(s) as {} to {} ({} bytes)",
        tables.len(),
        format,
        path.display(),
        bytes.len()
    );
    Ok(bytes.len() as u64)
}

pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), Pic2CsvError> {
    let write_err = |source| Pic2CsvError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = std::path::PathBuf::from(tmp_name);

    std::fs::write(&tmp_path, bytes).map_err(write_err)?;
    std::fs::rename(&tmp_path, path).map_err(write_err)
}

/// A file-system-safe stem for a table: its name, or `table_<n>` (1-based).
pub fn file_stem(name: &str, index: usize) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if cleaned.is_empty() {
        format!("table_{}", index + 1)
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Record;

    pub(crate) fn sample(name: &str) -> NamedTable {
        let rows: Vec<Record> = vec![
            [("Item", "Pens"), ("Amount", "4.50")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            [("Item", "Paper, A4"), ("Amount", "12")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ];
        NamedTable {
            name: name.to_string(),
            table: TableSnapshot {
                columns: vec!["Item".into(), "Amount".into()],
                rows,
            },
        }
    }

    #[test]
    fn format_from_path_and_str() {
        assert_eq!(ExportFormat::from_path(Path::new("a/b.XLSX")), Some(ExportFormat::Xlsx));
        assert_eq!(ExportFormat::from_path(Path::new("noext")), None);
        assert_eq!("pdf".parse::<ExportFormat>().unwrap(), ExportFormat::Pdf);
        assert!("docx".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn file_stems() {
        assert_eq!(file_stem("Tax Summary", 0), "Tax Summary");
        assert_eq!(file_stem("a/b:c", 0), "a_b_c");
        assert_eq!(file_stem("   ", 2), "table_3");
    }

    #[test]
    fn json_export_is_reloadable() {
        let tables = vec![sample("Expenses")];
        let bytes = render(&tables, ExportFormat::Json, &CsvOptions::default()).unwrap();
        let back: Vec<NamedTable> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, tables);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.find("\"Item\"").unwrap() < text.find("\"Amount\"").unwrap());
    }

    #[test]
    fn export_to_file_writes_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.csv");
        let written =
            export_to_file(&[sample("T")], ExportFormat::Csv, &path, &CsvOptions::default())
                .unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written as usize, text.len());
        assert!(text.starts_with("Item,Amount\n"));
        assert!(!dir.path().join("nested/out.csv.tmp").exists());
    }
}
