//! Progress-callback trait for per-page extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the pipeline processes each page. The CLI forwards them to a
//! terminal progress bar; a server could forward them to a channel.
//!
//! # Example
//!
//! ```rust
//! use pic2csv::{ExtractionConfig, ExtractionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct TableCounter {
//!     tables: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for TableCounter {
//!     fn on_page_complete(&self, _page: usize, _total: usize, table_count: usize) {
//!         self.tables.fetch_add(table_count, Ordering::SeqCst);
//!     }
//! }
//!
//! let counter = Arc::new(TableCounter { tables: AtomicUsize::new(0) });
//! let config = ExtractionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the extraction pipeline as it processes each page.
///
/// Pages of a PDF are processed concurrently, so `on_page_*` may be called
/// from different tasks at once. All methods default to no-ops.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once before any page is sent, with the number of pages that
    /// will be processed (1 for an image).
    fn on_extraction_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called just before the VLM request is sent for a page (1-indexed).
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page's response has been parsed.
    ///
    /// `table_count` is the number of tables found on that page.
    fn on_page_complete(&self, page_num: usize, total_pages: usize, table_count: usize) {
        let _ = (page_num, total_pages, table_count);
    }

    /// Called when a page fails after all retries are exhausted.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once after all pages have been attempted.
    fn on_extraction_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Tracking {
        starts: AtomicUsize,
        tables: AtomicUsize,
        errors: AtomicUsize,
        succeeded: AtomicUsize,
    }

    impl ExtractionProgressCallback for Tracking {
        fn on_page_start(&self, _page_num: usize, _total_pages: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_complete(&self, _page_num: usize, _total_pages: usize, table_count: usize) {
            self.tables.fetch_add(table_count, Ordering::SeqCst);
        }

        fn on_page_error(&self, _page_num: usize, _total_pages: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_extraction_complete(&self, _total_pages: usize, success_count: usize) {
            self.succeeded.store(success_count, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_extraction_start(2);
        cb.on_page_start(1, 2);
        cb.on_page_complete(1, 2, 3);
        cb.on_page_error(2, 2, "timeout");
        cb.on_extraction_complete(2, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = Arc::new(Tracking::default());
        let cb: ProgressCallback = tracker.clone();

        cb.on_extraction_start(3);
        cb.on_page_start(1, 3);
        cb.on_page_complete(1, 3, 2);
        cb.on_page_start(2, 3);
        cb.on_page_complete(2, 3, 1);
        cb.on_page_start(3, 3);
        cb.on_page_error(3, 3, "VLM timeout");
        cb.on_extraction_complete(3, 2);

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.tables.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.succeeded.load(Ordering::SeqCst), 2);
    }
}
