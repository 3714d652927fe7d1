//! Progress-callback trait for per-page extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the pipeline works through a document. Pages are processed one
//! after another, so events for a document arrive in page order.
//!
//! # Example
//!
//! ```rust
//! use edgequake_ocr2md::{ExtractionConfig, ExtractionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, page_num: usize, total_pages: usize, chars: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Page {}/{} done ({} chars)", page_num, total_pages, chars);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the extraction pipeline as it processes each page.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once, after segmentation and before the first OCR call.
    ///
    /// # Arguments
    /// * `total_pages` — number of pages that will be processed
    fn on_extraction_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called just before the engine is invoked for a page.
    ///
    /// # Arguments
    /// * `page_num`    — 1-indexed page number
    /// * `total_pages` — pages being processed
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when the engine returns text for a page.
    ///
    /// # Arguments
    /// * `page_num`    — 1-indexed page number
    /// * `total_pages` — pages being processed
    /// * `chars`       — characters of raw text produced (0 for blank pages)
    fn on_page_complete(&self, page_num: usize, total_pages: usize, chars: usize) {
        let _ = (page_num, total_pages, chars);
    }

    /// Called when a page fails. Extraction stops after this event.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once when extraction finishes, successfully or not.
    ///
    /// # Arguments
    /// * `total_pages`   — pages that were to be processed
    /// * `success_count` — pages that completed without error
    fn on_extraction_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// Callback that ignores every event. Used when none is configured.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        chars: AtomicUsize,
        started_total: AtomicUsize,
        completed_total: AtomicUsize,
    }

    impl ExtractionProgressCallback for TrackingCallback {
        fn on_extraction_start(&self, total_pages: usize) {
            self.started_total.store(total_pages, Ordering::SeqCst);
        }

        fn on_page_start(&self, _page_num: usize, _total_pages: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_complete(&self, _page_num: usize, _total_pages: usize, chars: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
            self.chars.fetch_add(chars, Ordering::SeqCst);
        }

        fn on_page_error(&self, _page_num: usize, _total_pages: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_extraction_complete(&self, _total_pages: usize, success_count: usize) {
            self.completed_total.store(success_count, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_extraction_start(5);
        cb.on_page_start(1, 5);
        cb.on_page_complete(1, 5, 42);
        cb.on_page_error(2, 5, "tesseract crashed");
        cb.on_extraction_complete(5, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();

        tracker.on_extraction_start(2);
        tracker.on_page_start(1, 2);
        tracker.on_page_complete(1, 2, 100);
        tracker.on_page_start(2, 2);
        tracker.on_page_error(2, 2, "quota exceeded");
        tracker.on_extraction_complete(2, 1);

        assert_eq!(tracker.started_total.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.chars.load(Ordering::SeqCst), 100);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.completed_total.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_extraction_start(10);
        cb.on_page_complete(1, 10, 0);
    }
}
