//! Progress-callback trait for per-page run events.
//!
//! Inject an [`Arc<dyn OcrProgressCallback>`] via
//! [`crate::config::OcrConfigBuilder::progress_callback`] to observe a run as
//! it happens: a terminal progress bar, a log sink, a job-status record.
//!
//! Events are always delivered in ascending page order, including when
//! `concurrency > 1`, because they are fired from the ordered merge loop.

use std::sync::Arc;

/// Called by the pipeline as it works through the pages of a run.
///
/// All methods default to no-ops so implementors override only what they
/// need.
pub trait OcrProgressCallback: Send + Sync {
    /// Called once pages are available, before the first remote call.
    fn on_run_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called when a page's result has been merged.
    ///
    /// `rows` is the number of table rows the page contributed (always 0 in
    /// Text mode).
    fn on_page_complete(&self, page_num: usize, total_pages: usize, rows: usize) {
        let _ = (page_num, total_pages, rows);
    }

    /// Called when a page answered but its payload was skipped.
    fn on_page_skipped(&self, page_num: usize, total_pages: usize, reason: &str) {
        let _ = (page_num, total_pages, reason);
    }

    /// Called once after every page has been merged.
    fn on_run_complete(&self, total_pages: usize, skipped_pages: usize) {
        let _ = (total_pages, skipped_pages);
    }
}

/// A no-op implementation.
pub struct NoopProgressCallback;

impl OcrProgressCallback for NoopProgressCallback {}

/// Type stored in [`crate::config::OcrConfig`].
pub type ProgressCallback = Arc<dyn OcrProgressCallback>;
