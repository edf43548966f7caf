//! VLM interaction: build the vision request, call the provider, parse.
//!
//! Prompt text lives in [`crate::prompts`]; this module owns the retry,
//! timeout and error-classification logic only.
//!
//! ## Retry Strategy
//!
//! Failed calls, timeouts and unparseable answers are retried with
//! exponential backoff (`retry_backoff_ms * 2^(attempt-1)`): with a 500 ms
//! base and 3 retries the waits are 500 ms → 1 s → 2 s.

use crate::config::ExtractionConfig;
use crate::error::PageError;
use crate::output::PageResult;
use crate::pipeline::parse::parse_tables;
use crate::prompts::{page_instruction, DEFAULT_SYSTEM_PROMPT};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

enum Failure {
    Call(String),
    Timeout,
    Unparseable(String),
}

/// Send one page image to the VLM and parse the tables out of its answer.
///
/// Always returns a `PageResult`: a failed page is recorded in
/// `result.error` so the other pages of a PDF still count.
pub async fn process_page(
    provider: &Arc<dyn LLMProvider>,
    page_num: usize,
    total_pages: usize,
    image_data: ImageData,
    config: &ExtractionConfig,
) -> PageResult {
    let start = Instant::now();
    let system_prompt = config
        .system_prompt
        .as_deref()
        .unwrap_or(DEFAULT_SYSTEM_PROMPT);

    let messages = vec![
        ChatMessage::system(system_prompt),
        ChatMessage::user_with_images(page_instruction(page_num, total_pages), vec![image_data]),
    ];
    let options = build_options(config);
    let call_timeout = Duration::from_secs(config.api_timeout_secs.max(1));

    let mut last_failure = Failure::Call("no attempt made".to_string());

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = config.retry_backoff_ms * 2u64.pow(attempt - 1);
            warn!(
                "Page {}: retry {}/{} after {}ms",
                page_num, attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        let response = match timeout(call_timeout, provider.chat(&messages, Some(&options))).await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                let msg = e.to_string();
                warn!("Page {}: attempt {} failed: {}", page_num, attempt + 1, msg);
                last_failure = Failure::Call(msg);
                continue;
            }
            Err(_) => {
                warn!(
                    "Page {}: attempt {} timed out after {}s",
                    page_num,
                    attempt + 1,
                    call_timeout.as_secs()
                );
                last_failure = Failure::Timeout;
                continue;
            }
        };

        debug!(
            "Page {}: {} input tokens, {} output tokens, {:?}",
            page_num,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        match parse_tables(&response.content) {
            Ok(tables) => {
                return PageResult {
                    page_num,
                    tables,
                    input_tokens: response.prompt_tokens,
                    output_tokens: response.completion_tokens,
                    duration_ms: start.elapsed().as_millis() as u64,
                    retries: attempt as u8,
                    error: None,
                };
            }
            Err(e) => {
                warn!(
                    "Page {}: attempt {} returned unparseable JSON: {}",
                    page_num,
                    attempt + 1,
                    e
                );
                last_failure = Failure::Unparseable(e.to_string());
            }
        }
    }

    let retries = config.max_retries.min(u8::MAX as u32) as u8;
    let error = match last_failure {
        Failure::Call(detail) => PageError::LlmFailed {
            page: page_num,
            retries,
            detail,
        },
        Failure::Timeout => PageError::Timeout {
            page: page_num,
            secs: call_timeout.as_secs(),
        },
        Failure::Unparseable(detail) => PageError::InvalidResponse {
            page: page_num,
            detail,
        },
    };

    PageResult {
        page_num,
        tables: Vec::new(),
        input_tokens: 0,
        output_tokens: 0,
        duration_ms: start.elapsed().as_millis() as u64,
        retries,
        error: Some(error),
    }
}

/// Build `CompletionOptions` from the extraction config.
fn build_options(config: &ExtractionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}
