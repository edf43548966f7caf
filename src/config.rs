//! Configuration types for table extraction.
//!
//! All extraction behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. One struct holds every knob so a
//! config can be cloned into concurrent page tasks and logged as a unit.
//!
//! The editing core ([`crate::table`], [`crate::editor`]) takes no
//! configuration at all; only the extraction service does.

use crate::error::Pic2CsvError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Upload limit applied before any work is done: 10 MiB.
pub const DEFAULT_MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;

/// Configuration for extracting tables from an image or PDF.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use pic2csv::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .concurrency(2)
///     .model("google/gemini-2.0-flash-001")
///     .build()
///     .unwrap();
/// assert_eq!(config.max_tokens, 16_000);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// LLM model identifier. If None, the resolved provider's default is used.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openrouter", "openai", "gemini").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1.
    ///
    /// Transcription wants the model to copy what it sees, not improvise.
    pub temperature: f32,

    /// Maximum tokens the model may generate per page. Default: 16000.
    ///
    /// A dense spreadsheet photo serialised as JSON rows is long; a short
    /// limit truncates the array mid-row and forces the repair path.
    pub max_tokens: usize,

    /// Retry attempts on a transient VLM failure. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Custom system prompt. If None, uses [`crate::prompts::DEFAULT_SYSTEM_PROMPT`].
    pub system_prompt: Option<String>,

    /// Reject inputs larger than this many bytes. Default: 10 MiB.
    pub max_file_bytes: u64,

    /// Longest side, in pixels, of any image sent to the model. Default: 2000.
    ///
    /// PDF pages are rendered to fit; photos larger than this are downscaled.
    pub max_rendered_pixels: u32,

    /// PDF pages to extract from. Ignored for images. Default: all.
    pub pages: PageSelection,

    /// Concurrent VLM calls for multi-page PDFs. Default: 4.
    pub concurrency: usize,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Per-VLM-call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Receives per-page events while extraction runs.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 16_000,
            max_retries: 3,
            retry_backoff_ms: 500,
            system_prompt: None,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            max_rendered_pixels: 2000,
            pages: PageSelection::default(),
            concurrency: 4,
            password: None,
            download_timeout_secs: 120,
            api_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("max_file_bytes", &self.max_file_bytes)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("pages", &self.pages)
            .field("concurrency", &self.concurrency)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn callback>"),
            )
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn max_file_bytes(mut self, bytes: u64) -> Self {
        self.config.max_file_bytes = bytes;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.config.progress_callback = Some(callback);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, Pic2CsvError> {
        let c = &self.config;
        if c.max_tokens == 0 {
            return Err(Pic2CsvError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.max_file_bytes == 0 {
            return Err(Pic2CsvError::InvalidConfig(
                "max_file_bytes must be ≥ 1".into(),
            ));
        }
        if c.concurrency == 0 {
            return Err(Pic2CsvError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if let PageSelection::Range(start, end) = c.pages {
            if start == 0 || start > end {
                return Err(Pic2CsvError::InvalidConfig(format!(
                    "page range {start}-{end} is empty (pages are 1-indexed)"
                )));
            }
        }
        Ok(self.config)
    }
}

// ── Page selection ───────────────────────────────────────────────────────

/// Which pages of a PDF to extract from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// Every page (default).
    #[default]
    All,
    /// A single page (1-indexed).
    Single(usize),
    /// A contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    /// Parse `"all"`, `"3"`, `"2-5"` or `"1,3,7"`.
    pub fn parse(selection: &str) -> Result<Self, Pic2CsvError> {
        let selection = selection.trim();
        let bad =
            || Pic2CsvError::InvalidConfig(format!("invalid page selection '{selection}'"));
        let num = |s: &str| s.trim().parse::<usize>().map_err(|_| bad());

        if selection.is_empty() || selection.eq_ignore_ascii_case("all") {
            Ok(PageSelection::All)
        } else if let Some((a, b)) = selection.split_once('-') {
            Ok(PageSelection::Range(num(a)?, num(b)?))
        } else if selection.contains(',') {
            selection
                .split(',')
                .map(num)
                .collect::<Result<Vec<_>, _>>()
                .map(PageSelection::Set)
        } else {
            num(selection).map(PageSelection::Single)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ExtractionConfig::default();
        assert_eq!(c.max_tokens, 16_000);
        assert_eq!(c.max_file_bytes, 10 * 1024 * 1024);
        assert!((c.temperature - 0.1).abs() < f32::EPSILON);
        assert_eq!(c.pages, PageSelection::All);
    }

    #[test]
    fn builder_clamps() {
        let c = ExtractionConfig::builder()
            .temperature(9.0)
            .concurrency(0)
            .max_rendered_pixels(1)
            .build()
            .unwrap();
        assert_eq!(c.temperature, 2.0);
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.max_rendered_pixels, 100);
    }

    #[test]
    fn builder_rejects_invalid() {
        assert!(ExtractionConfig::builder().max_tokens(0).build().is_err());
        assert!(ExtractionConfig::builder().max_file_bytes(0).build().is_err());
        assert!(ExtractionConfig::builder()
            .pages(PageSelection::Range(5, 2))
            .build()
            .is_err());
    }

    #[test]
    fn page_selection_indices() {
        assert_eq!(PageSelection::All.to_indices(3), vec![0, 1, 2]);
        assert_eq!(PageSelection::Single(4).to_indices(3), Vec::<usize>::new());
        assert_eq!(PageSelection::Range(2, 10).to_indices(4), vec![1, 2, 3]);
        assert_eq!(PageSelection::Set(vec![3, 1, 3, 9]).to_indices(5), vec![0, 2]);
    }

    #[test]
    fn page_selection_parse() {
        assert_eq!(PageSelection::parse("all").unwrap(), PageSelection::All);
        assert_eq!(PageSelection::parse("3").unwrap(), PageSelection::Single(3));
        assert_eq!(PageSelection::parse("2-5").unwrap(), PageSelection::Range(2, 5));
        assert_eq!(
            PageSelection::parse("1, 3,7").unwrap(),
            PageSelection::Set(vec![1, 3, 7])
        );
        assert!(PageSelection::parse("x-2").is_err());
    }
}
