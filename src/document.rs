//! Data model shared by every pipeline stage.
//!
//! ```text
//! Document ──segment──▶ PageImage* ──extract──▶ PageResult*
//!          ──postprocess──▶ MarkdownDocument ──summarize──▶ SummaryDocument
//! ```
//!
//! `Document` and `PageImage` live only in memory. `MarkdownDocument` and
//! `SummaryDocument` are what [`crate::store`] writes to disk.

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of an input document, detected from its bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Png,
    Jpeg,
}

impl DocumentKind {
    /// Detect the kind from magic bytes, falling back to the file extension.
    ///
    /// Returns `None` for anything that is not a PDF, PNG or JPEG.
    pub fn detect(bytes: &[u8], name: &str) -> Option<Self> {
        if bytes.starts_with(b"%PDF") {
            return Some(DocumentKind::Pdf);
        }
        if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(DocumentKind::Png);
        }
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(DocumentKind::Jpeg);
        }
        // Some scanners prepend junk before the %PDF header; pdfium accepts
        // the header anywhere in the first KiB.
        let head = &bytes[..bytes.len().min(1024)];
        if head.windows(4).any(|w| w == b"%PDF") {
            return Some(DocumentKind::Pdf);
        }
        if !bytes.is_empty() {
            return None;
        }
        Self::from_extension(name)
    }

    /// Map a file name's extension to a kind.
    pub fn from_extension(name: &str) -> Option<Self> {
        let ext = name.rsplit_once('.')?.1.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(DocumentKind::Pdf),
            "png" => Some(DocumentKind::Png),
            "jpg" | "jpeg" => Some(DocumentKind::Jpeg),
            _ => None,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            DocumentKind::Pdf => "application/pdf",
            DocumentKind::Png => "image/png",
            DocumentKind::Jpeg => "image/jpeg",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DocumentKind::Pdf => "pdf",
            DocumentKind::Png => "png",
            DocumentKind::Jpeg => "jpeg",
        })
    }
}

/// One rasterised page.
#[derive(Debug, Clone)]
pub struct PageImage {
    /// 0-based index of the page in the source document.
    pub index: usize,
    pub image: DynamicImage,
}

/// An input document split into page images.
#[derive(Debug, Clone)]
pub struct Document {
    /// File name of the source (no directory part).
    pub source_name: String,
    pub kind: DocumentKind,
    /// Total pages in the source, including unselected ones.
    pub total_pages: usize,
    /// Selected pages in ascending page order.
    pub pages: Vec<PageImage>,
}

/// Text extracted from one page by an OCR engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    /// 0-based index of the page in the source document.
    pub page_index: usize,
    /// Raw engine output. Empty when the page carries no text.
    pub text: String,
    /// Engine that produced the text (e.g. "tesseract", "gemini").
    pub engine: String,
    pub duration_ms: u64,
    /// Retries spent on transient remote failures.
    pub retries: u32,
    /// Prompt tokens (remote engines only).
    pub input_tokens: usize,
    /// Completion tokens (remote engines only).
    pub output_tokens: usize,
}

impl PageResult {
    /// Convenience constructor used by tests and local engines.
    pub fn new(page_index: usize, text: impl Into<String>) -> Self {
        Self {
            page_index,
            text: text.into(),
            engine: String::new(),
            duration_ms: 0,
            retries: 0,
            input_tokens: 0,
            output_tokens: 0,
        }
    }

    /// 1-based page number, as shown to users.
    pub fn page_num(&self) -> usize {
        self.page_index + 1
    }
}

/// Post-processed Markdown for a whole document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkdownDocument {
    pub source_name: String,
    pub page_count: usize,
    pub markdown: String,
}

impl MarkdownDocument {
    pub fn new(source_name: impl Into<String>, markdown: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            page_count: 1,
            markdown: markdown.into(),
        }
    }
}

/// Output style requested from the summarizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryStyle {
    /// Multi-paragraph study summary. (default)
    #[default]
    Summary,
    /// Question/answer flashcards.
    Flashcards,
}

impl fmt::Display for SummaryStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SummaryStyle::Summary => "summary",
            SummaryStyle::Flashcards => "flashcards",
        })
    }
}

/// LLM-generated condensation of one [`MarkdownDocument`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryDocument {
    pub source_name: String,
    pub style: SummaryStyle,
    /// Requested output language; `None` means "same as the source".
    pub language: Option<String>,
    /// Provider and model that produced the summary, e.g. "gemini/gemini-1.5-pro".
    pub generated_by: String,
    pub markdown: String,
}

/// Timing and usage figures for one extraction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub total_pages: usize,
    pub processed_pages: usize,
    /// Pages for which the engine found no text.
    pub empty_pages: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub segment_duration_ms: u64,
    pub ocr_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Everything produced by one extraction run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutput {
    pub document: MarkdownDocument,
    pub pages: Vec<PageResult>,
    pub kind: DocumentKind,
    pub stats: ExtractionStats,
}
