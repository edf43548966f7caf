//! Extraction results: the tables a VLM found plus per-page bookkeeping.

use crate::error::PageError;
use crate::table::{ColumnKey, Record};
use serde::{Deserialize, Serialize};

/// One extracted table, as handed from the extraction service to the editor.
///
/// `rows` is an ordered list of plain records; the first row's key order
/// becomes the table's column order. `columns` is only present when a table
/// was saved from the editor: it preserves headers of tables with no rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TablePayload {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<ColumnKey>,
    #[serde(default, alias = "data")]
    pub rows: Vec<Record>,
}

impl TablePayload {
    pub fn new(name: impl Into<String>, rows: Vec<Record>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            rows,
        }
    }
}

/// Result of processing a single page (or the single image).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    /// 1-indexed page number.
    pub page_num: usize,
    /// Tables parsed from the model's answer, in answer order.
    pub tables: Vec<TablePayload>,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
    /// Retries used before the call succeeded (or gave up).
    pub retries: u8,
    /// Set when this page failed; `tables` is then empty.
    pub error: Option<PageError>,
}

/// Aggregate numbers for one extraction run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub total_pages: usize,
    pub processed_pages: usize,
    pub failed_pages: usize,
    pub table_count: usize,
    pub row_count: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_duration_ms: u64,
    pub render_duration_ms: u64,
    pub llm_duration_ms: u64,
}

/// Everything an extraction run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutput {
    /// All non-empty tables across pages, in page order.
    pub tables: Vec<TablePayload>,
    pub pages: Vec<PageResult>,
    pub stats: ExtractionStats,
}
