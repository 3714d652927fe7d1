//! # edgequake-ocr2md
//!
//! Turn scanned PDFs and photos of documents into clean Markdown, and
//! optionally into an LLM-written summary or flashcards.
//!
//! ## Why this crate?
//!
//! Lecture notes, textbook chapters and whiteboard photos are images, not
//! text. This crate splits a document into page images, runs one of several
//! OCR engines on each page (local Tesseract, EasyOCR or PaddleOCR, or a
//! Gemini / OpenAI vision model) and normalises the result into one
//! Markdown document where formulas survive untouched.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF / PNG / JPEG
//!  │
//!  ├─ 1. Input     resolve local file or download from URL, detect kind
//!  ├─ 2. Segment   rasterise PDF pages via pdfium (spawn_blocking)
//!  ├─ 3. Engine    OCR each page in order (local process or vision model)
//!  ├─ 4. Polish    delimiters, theorem headings, tables, whitespace
//!  ├─ 5. Store     timestamped, never-overwritten .md files
//!  └─ 6. Summarize optional LLM summary with formulas kept verbatim
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_ocr2md::{extract, EngineKind, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExtractionConfig::builder()
//!         .engine(EngineKind::Tesseract)
//!         .languages(["eng"])
//!         .build()?;
//!     let output = extract("chapter3.pdf", &config).await?;
//!     println!("{}", output.document.markdown);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ocr2md` binary (clap + anyhow + tracing-subscriber + indicatif + dotenvy) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-ocr2md = { version = "0.1", default-features = false }
//! ```
//!
//! ## Choosing an Engine
//!
//! | Engine      | Needs                          | Best for                       |
//! |-------------|--------------------------------|--------------------------------|
//! | `tesseract` | `tesseract` + language packs   | Clean printed scans, offline   |
//! | `easyocr`   | `pip install easyocr`          | Photos, mixed scripts          |
//! | `paddleocr` | `pip install paddleocr`        | Dense printed text             |
//! | `gemini`    | `GEMINI_API_KEY`               | Math, tables, handwriting      |
//! | `openai`    | `OPENAI_API_KEY`               | Math, tables, handwriting      |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod document;
pub mod engine;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod store;
pub mod summarize;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder, PageSelection, PageSeparator};
pub use convert::{
    extract, extract_bytes, extract_sync, extract_to_dir, extract_with_engine, inspect,
    InspectReport,
};
pub use document::{
    Document, DocumentKind, ExtractionOutput, ExtractionStats, MarkdownDocument, PageImage,
    PageResult, SummaryDocument, SummaryStyle,
};
pub use engine::{Engine, EngineKind};
pub use error::OcrError;
pub use llm::{ChatBackend, ChatReply, RemoteProvider};
pub use pipeline::postprocess::{normalize_page, postprocess};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use store::OutputDirs;
pub use summarize::{detect_language, summarize, Summarizer, SummaryOptions};
