//! # pic2csv
//!
//! Pull tables out of images and PDFs with a Vision Language Model, edit them
//! as grids, and export them as CSV, Excel, PDF or JSON.
//!
//! ## Why this crate?
//!
//! OCR tools give you text, not tables: merged cells, ruled lines and
//! right-aligned numbers come out as a jumble that still needs hand-fixing in
//! a spreadsheet. Here a VLM reads the page and answers with structured rows,
//! and every table lands in an editor that keeps the data consistent while
//! you rename headers, reorder columns and fix cells before exporting.
//!
//! ## Pipeline Overview
//!
//! ```text
//! image / PDF
//!  │
//!  ├─ 1. Input    resolve local file or download from URL, sniff the type
//!  ├─ 2. Render   PDF pages via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 3. Encode   PNG/JPEG → base64 ImageData
//!  ├─ 4. VLM      concurrent calls, JSON answer parsed + repaired
//!  ├─ 5. Edit     one TableModel + GridEditor per table (Session)
//!  └─ 6. Export   CSV · XLSX · PDF · JSON
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pic2csv::{extract, ExportFormat, ExtractionConfig, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENROUTER_API_KEY / OPENAI_API_KEY / …
//!     let config = ExtractionConfig::default();
//!     let output = extract("receipt.png", &config).await?;
//!
//!     let mut session = Session::from_payloads(output.tables);
//!     if let Some(table) = session.active_mut() {
//!         table.editor.edit_header("Amt", "Amount");
//!     }
//!     session.export(ExportFormat::Xlsx, "receipt.xlsx")?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pic2csv` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pic2csv = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod editor;
pub mod error;
pub mod export;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod session;
pub mod table;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder, PageSelection};
pub use editor::{Command, DragItem, DropOutcome, EditOutcome, GridEditor, GridView};
pub use error::{ErrorCategory, PageError, Pic2CsvError, TableError};
pub use export::{export_to_file, CsvOptions, ExportFormat, NamedTable};
pub use extract::{extract, extract_from_bytes, extract_sync};
pub use output::{ExtractionOutput, ExtractionStats, PageResult, TablePayload};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use session::{Reply, Session, TableDocument};
pub use table::{ColumnKey, Record, RowId, TableModel, TableObserver, TableSnapshot};
