//! Error types for the pic2csv library.
//!
//! Three error types reflect three distinct failure modes:
//!
//! * [`TableError`] — **Rejected edit**: a table mutation failed validation.
//!   The model is left exactly as it was and the editing session continues.
//!
//! * [`Pic2CsvError`] — **Fatal**: extraction or export cannot proceed at
//!   all (bad input file, provider not configured, nothing found). Returned
//!   as `Err(Pic2CsvError)` from the top-level `extract*` and `export*`
//!   functions.
//!
//! * [`PageError`] — **Non-fatal**: a single page failed (render glitch,
//!   transient API error, unreadable response) but other pages are fine.
//!   Stored inside [`crate::output::PageResult`].
//!
//! [`ErrorCategory`] folds fatal errors into the short list of situations a
//! user can actually act on (file too large, wrong type, offline, …).

use crate::table::RowId;
use std::path::PathBuf;
use thiserror::Error;

/// A rejected table mutation.
///
/// None of these are fatal: the operation is refused, the model is unchanged
/// and the caller decides how to surface it (revert the field, flash a
/// warning, disable a button).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    /// A rename or add would collide with an existing column key.
    #[error("a column named '{key}' already exists")]
    DuplicateColumn { key: String },

    /// Deleting this column would leave the table with no columns.
    #[error("cannot delete '{key}': a table needs at least one column")]
    LastColumn { key: String },

    /// A reorder referenced a position outside the current bounds.
    #[error("position {index} is out of range ({len} {axis}s)")]
    IndexOutOfRange {
        axis: &'static str,
        index: usize,
        len: usize,
    },

    /// No row carries this identity token (it was deleted).
    #[error("row {0} no longer exists")]
    RowNotFound(RowId),

    /// The key is not one of the current columns.
    #[error("no column named '{key}'")]
    ColumnNotFound { key: String },

    /// The caller required at least one row and got none.
    #[error("table payload contains no rows")]
    EmptyPayload,
}

/// All fatal errors returned by the pic2csv library.
#[derive(Debug, Error)]
pub enum Pic2CsvError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// The file is bigger than `max_file_bytes`.
    #[error("File is too large: {size} bytes (limit {limit} bytes)")]
    FileTooLarge { size: u64, limit: u64 },

    /// The file is neither a supported image nor a PDF.
    #[error("File type not supported for '{path}' (first bytes {magic:02X?}).\nUse JPG, PNG, WebP, GIF or PDF.")]
    UnsupportedFileType { path: PathBuf, magic: Vec<u8> },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your network connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Document errors ───────────────────────────────────────────────────
    /// The image header was recognised but the pixels could not be decoded.
    #[error("Image '{path}' could not be decoded: {detail}")]
    CorruptImage { path: PathBuf, detail: String },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// Selected page numbers exceed the actual page count.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error("Failed to bind to pdfium library: {0}\nSet PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.")]
    PdfiumBindingFailed(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// VLM API returned HTTP 429 or a quota message.
    #[error("Rate limit or quota exceeded for provider '{provider}': {detail}")]
    RateLimitExceeded { provider: String, detail: String },

    /// Every page failed after all retries; nothing to edit.
    #[error("All {total} pages failed after {retries} retries each.\nFirst error: {first_error}")]
    AllPagesFailed {
        total: usize,
        retries: u32,
        first_error: String,
    },

    /// The model answered, but no table with at least one row was found.
    #[error("No tables found: this data cannot be extracted")]
    NoDataFound,

    // ── Export / output errors ────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A spreadsheet or document backend refused the data.
    #[error("Failed to build {format} export: {detail}")]
    ExportFailed { format: &'static str, detail: String },

    /// Session JSON could not be read or written.
    #[error("Invalid table JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Pic2CsvError {
    /// Fold this error into the user-facing taxonomy.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Pic2CsvError::FileTooLarge { .. } => ErrorCategory::FileTooLarge,
            Pic2CsvError::UnsupportedFileType { .. } => ErrorCategory::UnsupportedType,
            Pic2CsvError::DownloadFailed { .. } | Pic2CsvError::DownloadTimeout { .. } => {
                ErrorCategory::Network
            }
            Pic2CsvError::RateLimitExceeded { .. } => ErrorCategory::QuotaExceeded,
            Pic2CsvError::NoDataFound => ErrorCategory::NoDataFound,
            Pic2CsvError::AllPagesFailed { first_error, .. } => {
                ErrorCategory::classify(first_error)
            }
            _ => ErrorCategory::Generic,
        }
    }
}

/// A non-fatal error for a single page.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// Page rasterisation or image encoding failed.
    #[error("Page {page}: rendering failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// LLM call failed after retries.
    #[error("Page {page}: LLM call failed after {retries} retries: {detail}")]
    LlmFailed {
        page: usize,
        retries: u8,
        detail: String,
    },

    /// LLM call timed out.
    #[error("Page {page}: LLM call timed out after {secs}s")]
    Timeout { page: usize, secs: u64 },

    /// The model answered with something that is not table JSON.
    #[error("Page {page}: response is not valid table JSON: {detail}")]
    InvalidResponse { page: usize, detail: String },
}

/// The situations a user can act on when extraction fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorCategory {
    FileTooLarge,
    UnsupportedType,
    Network,
    QuotaExceeded,
    NoDataFound,
    Generic,
}

impl ErrorCategory {
    /// Classify an opaque error message by the phrases providers use.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

        if has(&["too large", "file size"]) {
            ErrorCategory::FileTooLarge
        } else if has(&["not supported", "file type", "unsupported"]) {
            ErrorCategory::UnsupportedType
        } else if has(&["quota", "rate limit", "429"]) {
            ErrorCategory::QuotaExceeded
        } else if has(&["network", "connection", "fetch", "timed out", "dns"]) {
            ErrorCategory::Network
        } else if has(&["cannot be extracted", "no tables", "no data"]) {
            ErrorCategory::NoDataFound
        } else {
            ErrorCategory::Generic
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            ErrorCategory::FileTooLarge => "File Too Large",
            ErrorCategory::UnsupportedType => "Invalid File Type",
            ErrorCategory::Network => "Connection Problem",
            ErrorCategory::QuotaExceeded => "Service Temporarily Unavailable",
            ErrorCategory::NoDataFound => "Extraction Failed",
            ErrorCategory::Generic => "Something Went Wrong",
        }
    }

    pub fn suggestions(self) -> &'static [&'static str] {
        match self {
            ErrorCategory::FileTooLarge => &[
                "Reduce the image resolution",
                "Convert the image to JPEG",
                "Split large PDFs with --pages",
            ],
            ErrorCategory::UnsupportedType => &[
                "Use JPG, PNG, WebP or GIF for images",
                "Convert documents to PDF",
            ],
            ErrorCategory::Network => &[
                "Check your internet connection",
                "Retry with a longer --api-timeout",
            ],
            ErrorCategory::QuotaExceeded => &[
                "Wait a few minutes and try again",
                "Lower --concurrency",
            ],
            ErrorCategory::NoDataFound => &[
                "Make sure the image contains a clear table or list",
                "Crop the image to focus on the table",
            ],
            ErrorCategory::Generic => &["Try again or use a different file"],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_column_display() {
        let e = TableError::DuplicateColumn { key: "Age".into() };
        assert!(e.to_string().contains("'Age'"));
    }

    #[test]
    fn out_of_range_display_names_axis() {
        let e = TableError::IndexOutOfRange {
            axis: "column",
            index: 7,
            len: 2,
        };
        let msg = e.to_string();
        assert!(msg.contains("7"), "got: {msg}");
        assert!(msg.contains("2 columns"), "got: {msg}");
    }

    #[test]
    fn classify_provider_messages() {
        assert_eq!(
            ErrorCategory::classify("HTTP 429 Too Many Requests"),
            ErrorCategory::QuotaExceeded
        );
        assert_eq!(
            ErrorCategory::classify("error sending request: connection refused"),
            ErrorCategory::Network
        );
        assert_eq!(
            ErrorCategory::classify("payload file size exceeds 20MB"),
            ErrorCategory::FileTooLarge
        );
        assert_eq!(
            ErrorCategory::classify("No tables were detected"),
            ErrorCategory::NoDataFound
        );
        assert_eq!(ErrorCategory::classify("boom"), ErrorCategory::Generic);
    }

    #[test]
    fn fatal_error_categories() {
        assert_eq!(
            Pic2CsvError::FileTooLarge { size: 11, limit: 10 }.category(),
            ErrorCategory::FileTooLarge
        );
        assert_eq!(Pic2CsvError::NoDataFound.category(), ErrorCategory::NoDataFound);
        let all_failed = Pic2CsvError::AllPagesFailed {
            total: 1,
            retries: 3,
            first_error: "rate limit reached".into(),
        };
        assert_eq!(all_failed.category(), ErrorCategory::QuotaExceeded);
    }

    #[test]
    fn every_category_has_suggestions() {
        for c in [
            ErrorCategory::FileTooLarge,
            ErrorCategory::UnsupportedType,
            ErrorCategory::Network,
            ErrorCategory::QuotaExceeded,
            ErrorCategory::NoDataFound,
            ErrorCategory::Generic,
        ] {
            assert!(!c.title().is_empty());
            assert!(!c.suggestions().is_empty());
        }
    }
}
