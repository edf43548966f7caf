//! Extraction entry points: image or PDF in, tables out.
//!
//! The extraction service is the editor's upstream collaborator. It returns
//! plain [`TablePayload`]s; it never touches a [`crate::table::TableModel`].

use crate::config::ExtractionConfig;
use crate::error::{ErrorCategory, PageError, Pic2CsvError};
use crate::output::{ExtractionOutput, ExtractionStats, PageResult, TablePayload};
use crate::pipeline::input::{self, ResolvedInput};
use crate::pipeline::{encode, llm, render};
use edgequake_llm::{ImageData, LLMProvider, ProviderFactory};
use futures::stream::{self, StreamExt};
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Default model when the OpenRouter key is what the environment offers.
pub const OPENROUTER_DEFAULT_MODEL: &str = "google/gemini-2.0-flash-001";

/// Default model when an OpenAI key is what the environment offers.
pub const OPENAI_DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Extract tables from an image or PDF file path or URL.
///
/// # Returns
/// `Ok(ExtractionOutput)` when at least one table with at least one row was
/// found, even if some PDF pages failed (see `output.stats.failed_pages`).
///
/// # Errors
/// Fatal errors only: unreadable, oversized or unsupported input, no usable
/// provider, every page failed ([`Pic2CsvError::AllPagesFailed`] or
/// [`Pic2CsvError::RateLimitExceeded`]), or nothing tabular found
/// ([`Pic2CsvError::NoDataFound`]).
pub async fn extract(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, Pic2CsvError> {
    let total_start = Instant::now();
    let input_str = input_str.as_ref();
    info!("Starting extraction: {}", input_str);

    // ── Step 1: Resolve input ────────────────────────────────────────────
    let resolved = input::resolve_input(
        input_str,
        config.max_file_bytes,
        config.download_timeout_secs,
    )
    .await?;

    // ── Step 2: Get/create provider ──────────────────────────────────────
    let provider = resolve_provider(config).await?;

    // ── Step 3: Prepare page images ──────────────────────────────────────
    let render_start = Instant::now();
    let (prepared, total_pages) = prepare_images(&resolved, config).await?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;
    let selected = prepared.len();
    debug!("Prepared {} page image(s) in {}ms", selected, render_duration_ms);

    if let Some(ref cb) = config.progress_callback {
        cb.on_extraction_start(selected);
    }

    // ── Step 4: Process pages through VLM ────────────────────────────────
    let llm_start = Instant::now();
    let mut render_failures = Vec::new();
    let mut encoded = Vec::with_capacity(prepared.len());
    for (page_num, image) in prepared {
        match image {
            Ok(data) => encoded.push((page_num, data)),
            Err(error) => {
                if let Some(ref cb) = config.progress_callback {
                    cb.on_page_error(page_num, selected, &error.to_string());
                }
                render_failures.push(failed_page(page_num, error));
            }
        }
    }
    let mut pages = process_concurrent(&provider, &encoded, selected, config).await;
    pages.extend(render_failures);
    pages.sort_by_key(|p| p.page_num);
    let llm_duration_ms = llm_start.elapsed().as_millis() as u64;

    // ── Step 5: Collect tables and stats ─────────────────────────────────
    let processed = pages.iter().filter(|p| p.error.is_none()).count();
    let failed = pages.len() - processed;

    if let Some(ref cb) = config.progress_callback {
        cb.on_extraction_complete(selected, processed);
    }

    if processed == 0 {
        let first_error = pages
            .iter()
            .find_map(|p| p.error.as_ref())
            .map(|e| e.to_string())
            .unwrap_or_else(|| "Unknown error".to_string());

        if ErrorCategory::classify(&first_error) == ErrorCategory::QuotaExceeded {
            return Err(Pic2CsvError::RateLimitExceeded {
                provider: config
                    .provider_name
                    .clone()
                    .unwrap_or_else(|| "auto".to_string()),
                detail: first_error,
            });
        }
        return Err(Pic2CsvError::AllPagesFailed {
            total: pages.len(),
            retries: config.max_retries,
            first_error,
        });
    }

    let tables = collect_tables(&pages);
    if tables.is_empty() {
        return Err(Pic2CsvError::NoDataFound);
    }

    let stats = ExtractionStats {
        total_pages,
        processed_pages: processed,
        failed_pages: failed,
        table_count: tables.len(),
        row_count: tables.iter().map(|t| t.rows.len()).sum(),
        total_input_tokens: pages.iter().map(|p| p.input_tokens as u64).sum(),
        total_output_tokens: pages.iter().map(|p| p.output_tokens as u64).sum(),
        total_duration_ms: total_start.elapsed().as_millis() as u64,
        render_duration_ms,
        llm_duration_ms,
    };

    info!(
        "Extraction complete: {} table(s), {} row(s) from {}/{} page(s), {}ms total",
        stats.table_count, stats.row_count, processed, selected, stats.total_duration_ms
    );

    Ok(ExtractionOutput {
        tables,
        pages,
        stats,
    })
}

/// Synchronous wrapper around [`extract`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, Pic2CsvError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Pic2CsvError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract(input_str, config))
}

/// Extract tables from an in-memory image or PDF.
///
/// The bytes are written to a managed [`tempfile`] that is removed when this
/// returns.
pub async fn extract_from_bytes(
    bytes: &[u8],
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, Pic2CsvError> {
    let mut tmp = tempfile::NamedTempFile::new()
        .map_err(|e| Pic2CsvError::Internal(format!("tempfile: {e}")))?;
    tmp.write_all(bytes)
        .map_err(|e| Pic2CsvError::Internal(format!("tempfile write: {e}")))?;
    let path = tmp.path().to_string_lossy().to_string();
    extract(&path, config).await
}

// ── Internal helpers ─────────────────────────────────────────────────────

type PreparedPage = (usize, Result<ImageData, PageError>);

/// Page images ready to send, plus the document's page count.
async fn prepare_images(
    resolved: &ResolvedInput,
    config: &ExtractionConfig,
) -> Result<(Vec<PreparedPage>, usize), Pic2CsvError> {
    let path = resolved.path().to_path_buf();

    if !resolved.kind.is_pdf() {
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| Pic2CsvError::Internal(format!("read {}: {e}", path.display())))?;
        let kind = resolved.kind;
        let max_pixels = config.max_rendered_pixels;
        let data = tokio::task::spawn_blocking(move || {
            encode::encode_image_file(&bytes, kind, max_pixels)
        })
        .await
        .map_err(|e| Pic2CsvError::Internal(format!("Encode task panicked: {}", e)))?
        .map_err(|e| Pic2CsvError::CorruptImage {
            path: path.clone(),
            detail: e.to_string(),
        })?;
        return Ok((vec![(1, Ok(data))], 1));
    }

    let password = config.password.as_deref();
    let total_pages = render::page_count(&path, password).await?;
    info!("PDF has {} pages", total_pages);

    let indices = config.pages.to_indices(total_pages);
    if indices.is_empty() {
        return Err(Pic2CsvError::PageOutOfRange {
            page: first_requested_page(config),
            total: total_pages,
        });
    }

    let rendered =
        render::render_pages(&path, config.max_rendered_pixels, password, &indices).await?;
    let prepared = rendered
        .iter()
        .map(|(idx, img)| {
            let page_num = idx + 1;
            let data = encode::encode_page(img).map_err(|e| {
                warn!("Failed to encode page {}: {}", page_num, e);
                PageError::RenderFailed {
                    page: page_num,
                    detail: format!("Image encoding failed: {}", e),
                }
            });
            (page_num, data)
        })
        .collect();

    Ok((prepared, total_pages))
}

fn first_requested_page(config: &ExtractionConfig) -> usize {
    use crate::config::PageSelection;
    match &config.pages {
        PageSelection::All => 0,
        PageSelection::Single(p) => *p,
        PageSelection::Range(start, _) => *start,
        PageSelection::Set(pages) => pages.iter().copied().min().unwrap_or(0),
    }
}

fn failed_page(page_num: usize, error: PageError) -> PageResult {
    PageResult {
        page_num,
        tables: Vec::new(),
        input_tokens: 0,
        output_tokens: 0,
        duration_ms: 0,
        retries: 0,
        error: Some(error),
    }
}

/// Tables with at least one row, in page order.
fn collect_tables(pages: &[PageResult]) -> Vec<TablePayload> {
    pages
        .iter()
        .flat_map(|p| p.tables.iter())
        .filter(|t| !t.rows.is_empty())
        .cloned()
        .collect()
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, Pic2CsvError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        Pic2CsvError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider** (`config.provider_name`) with `config.model` or the
///    provider's usual vision model.
/// 3. **Environment pair** `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`.
/// 4. **OpenRouter** when `OPENROUTER_API_KEY` is set
///    (default model [`OPENROUTER_DEFAULT_MODEL`]).
/// 5. **OpenAI** when `OPENAI_API_KEY` is set
///    (default model [`OPENAI_DEFAULT_MODEL`]).
/// 6. **Full auto-detection** via `ProviderFactory::from_env`.
async fn resolve_provider(
    config: &ExtractionConfig,
) -> Result<Arc<dyn LLMProvider>, Pic2CsvError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let default_model = if name.eq_ignore_ascii_case("openrouter") {
            OPENROUTER_DEFAULT_MODEL
        } else {
            OPENAI_DEFAULT_MODEL
        };
        let model = config.model.as_deref().unwrap_or(default_model);
        return create_vision_provider(name, model);
    }

    if let (Some(prov), Some(model)) = (
        env_non_empty("EDGEQUAKE_LLM_PROVIDER"),
        env_non_empty("EDGEQUAKE_MODEL"),
    ) {
        return create_vision_provider(&prov, &model);
    }

    if env_non_empty("OPENROUTER_API_KEY").is_some() {
        let model = config.model.as_deref().unwrap_or(OPENROUTER_DEFAULT_MODEL);
        return create_vision_provider("openrouter", model);
    }

    if env_non_empty("OPENAI_API_KEY").is_some() {
        let model = config.model.as_deref().unwrap_or(OPENAI_DEFAULT_MODEL);
        return create_vision_provider("openai", model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| Pic2CsvError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENROUTER_API_KEY or OPENAI_API_KEY, or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

/// Send pages to the VLM, at most `config.concurrency` at a time.
async fn process_concurrent(
    provider: &Arc<dyn LLMProvider>,
    pages: &[(usize, ImageData)],
    total_pages: usize,
    config: &ExtractionConfig,
) -> Vec<PageResult> {
    stream::iter(pages.iter().map(|(page_num, img_data)| {
        let provider = Arc::clone(provider);
        let page_num = *page_num;
        let img = img_data.clone();
        async move {
            if let Some(ref cb) = config.progress_callback {
                cb.on_page_start(page_num, total_pages);
            }
            let result = llm::process_page(&provider, page_num, total_pages, img, config).await;
            if let Some(ref cb) = config.progress_callback {
                match &result.error {
                    None => cb.on_page_complete(page_num, total_pages, result.tables.len()),
                    Some(e) => cb.on_page_error(page_num, total_pages, &e.to_string()),
                }
            }
            result
        }
    }))
    .buffer_unordered(config.concurrency.max(1))
    .collect()
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PageSelection;
    use crate::table::Record;

    fn page(num: usize, tables: Vec<TablePayload>) -> PageResult {
        PageResult {
            page_num: num,
            tables,
            input_tokens: 0,
            output_tokens: 0,
            duration_ms: 0,
            retries: 0,
            error: None,
        }
    }

    fn row(k: &str, v: &str) -> Record {
        Record::from_iter([(k.to_string(), v.to_string())])
    }

    #[test]
    fn empty_tables_are_dropped_in_page_order() {
        let pages = vec![
            page(1, vec![TablePayload::new("Empty", vec![]), TablePayload::new("A", vec![row("x", "1")])]),
            page(2, vec![TablePayload::new("B", vec![row("y", "2")])]),
        ];
        let names: Vec<_> = collect_tables(&pages).into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn first_requested_page_for_errors() {
        let config = ExtractionConfig::builder()
            .pages(PageSelection::Set(vec![9, 7]))
            .build()
            .unwrap();
        assert_eq!(first_requested_page(&config), 7);
        assert_eq!(first_requested_page(&ExtractionConfig::default()), 0);
    }

    #[tokio::test]
    async fn missing_input_fails_before_provider_lookup() {
        let err = extract("/no/such/receipt.png", &ExtractionConfig::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Pic2CsvError::FileNotFound { .. }));
    }
}
