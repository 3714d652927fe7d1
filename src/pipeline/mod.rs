//! Pipeline stages for document-to-Markdown extraction.
//!
//! Each submodule implements one transformation step and is testable on
//! its own.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ segment ──▶ engine ──▶ postprocess
//! (URL/path) (pdfium/    (OCR)     (cleanup)
//!            image)
//! ```
//!
//! 1. [`input`]   — load the path or URL and detect the document kind
//! 2. [`segment`] — split into page images; runs in `spawn_blocking`
//!    because pdfium is not async-safe
//! 3. [`crate::engine`] — recognise text on each page
//! 4. [`postprocess`] — deterministic cleanup, with [`formula`] keeping
//!    math and code spans byte-identical
//!
//! [`encode`] is shared by the engines that need PNG bytes or base64
//! attachments.

pub mod encode;
pub mod formula;
pub mod input;
pub mod postprocess;
pub mod segment;
