//! Extraction entry points: document in, Markdown out.
//!
//! Every entry point runs the same linear pipeline:
//!
//! ```text
//! resolve input → connect engine → segment → OCR each page → postprocess
//! ```
//!
//! Pages are processed one at a time in page order. The first page that
//! fails aborts the whole document, so callers either get Markdown for
//! every selected page or an error and nothing on disk.

use crate::config::ExtractionConfig;
use crate::document::{
    DocumentKind, ExtractionOutput, ExtractionStats, MarkdownDocument, PageResult,
};
use crate::engine::Engine;
use crate::error::OcrError;
use crate::pipeline::input::{self, ResolvedInput};
use crate::pipeline::{postprocess, segment};
use crate::store::{self, OutputDirs};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Extract Markdown from a local file or HTTP(S) URL.
///
/// This is the primary entry point for the library. The engine named by
/// `config.engine` is connected first, so a missing binary or API key
/// fails before anything is rendered.
///
/// # Errors
/// Input errors from [`input::resolve_input`], engine construction errors
/// ([`OcrError::EngineUnavailable`], [`OcrError::AuthError`]), segmentation
/// errors, and the first page-level engine error.
///
/// # Example
/// ```rust,no_run
/// use edgequake_ocr2md::{extract, ExtractionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let output = extract("scan.png", &ExtractionConfig::default()).await?;
/// println!("{}", output.document.markdown);
/// # Ok(())
/// # }
/// ```
pub async fn extract(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, OcrError> {
    let input_str = input_str.as_ref();
    info!("Starting extraction: {}", input_str);

    // ── Step 1: Resolve input ────────────────────────────────────────────
    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;

    // ── Step 2: Connect engine ───────────────────────────────────────────
    let engine = Engine::connect(config.engine, config).await?;

    extract_with_engine(&engine, resolved, config).await
}

/// Extract Markdown from an in-memory document.
///
/// `source_name` is used for kind detection fallback and output naming.
pub async fn extract_bytes(
    bytes: Vec<u8>,
    source_name: impl Into<String>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, OcrError> {
    let resolved = input::from_bytes(bytes, source_name.into())?;
    let engine = Engine::connect(config.engine, config).await?;
    extract_with_engine(&engine, resolved, config).await
}

/// Run segmentation, OCR and post-processing with an already connected
/// engine.
///
/// Reusing one engine across documents avoids probing local binaries or
/// rebuilding provider clients for every file.
pub async fn extract_with_engine(
    engine: &Engine,
    resolved: ResolvedInput,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, OcrError> {
    let total_start = Instant::now();
    let ResolvedInput {
        bytes,
        source_name,
        kind,
    } = resolved;

    // ── Step 3: Segment into page images ─────────────────────────────────
    let segment_start = Instant::now();
    let document = segment::segment(bytes, kind, &source_name, config).await?;
    let segment_duration_ms = segment_start.elapsed().as_millis() as u64;
    let selected = document.pages.len();
    info!(
        "Segmented '{}' into {} page image(s) in {}ms",
        source_name, selected, segment_duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_extraction_start(selected);
    }

    // ── Step 4: OCR each page in order ───────────────────────────────────
    let ocr_start = Instant::now();
    let mut pages: Vec<PageResult> = Vec::with_capacity(selected);
    for page in &document.pages {
        let page_num = page.index + 1;
        if let Some(ref cb) = config.progress_callback {
            cb.on_page_start(page_num, selected);
        }

        let page_start = Instant::now();
        let output = match engine.extract_detailed(page).await {
            Ok(output) => output,
            Err(e) => {
                warn!("Page {} failed: {}", page_num, e);
                if let Some(ref cb) = config.progress_callback {
                    cb.on_page_error(page_num, selected, &e.to_string());
                    cb.on_extraction_complete(selected, pages.len());
                }
                return Err(e);
            }
        };

        let duration_ms = page_start.elapsed().as_millis() as u64;
        debug!(
            "Page {}: {} chars in {}ms ({} retries)",
            page_num,
            output.text.len(),
            duration_ms,
            output.retries
        );
        if let Some(ref cb) = config.progress_callback {
            cb.on_page_complete(page_num, selected, output.text.len());
        }

        pages.push(PageResult {
            page_index: page.index,
            text: output.text,
            engine: engine.label(),
            duration_ms,
            retries: output.retries,
            input_tokens: output.input_tokens,
            output_tokens: output.output_tokens,
        });
    }
    let ocr_duration_ms = ocr_start.elapsed().as_millis() as u64;

    // ── Step 5: Post-process into one Markdown document ──────────────────
    let markdown_doc = postprocess::postprocess(&source_name, &pages, &config.page_separator);

    // ── Step 6: Compute stats ────────────────────────────────────────────
    let stats = ExtractionStats {
        total_pages: document.total_pages,
        processed_pages: pages.len(),
        empty_pages: pages.iter().filter(|p| p.text.trim().is_empty()).count(),
        total_input_tokens: pages.iter().map(|p| p.input_tokens as u64).sum(),
        total_output_tokens: pages.iter().map(|p| p.output_tokens as u64).sum(),
        segment_duration_ms,
        ocr_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Extraction complete: {}/{} pages, {}ms total",
        stats.processed_pages, stats.total_pages, stats.total_duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_extraction_complete(selected, pages.len());
    }

    Ok(ExtractionOutput {
        document: markdown_doc,
        pages,
        kind,
        stats,
    })
}

/// Extract a document and save its Markdown under `dirs.saved_markdown`.
///
/// Nothing is written when extraction fails.
pub async fn extract_to_dir(
    input_str: impl AsRef<str>,
    dirs: &OutputDirs,
    config: &ExtractionConfig,
) -> Result<(ExtractionOutput, PathBuf), OcrError> {
    let output = extract(input_str, config).await?;
    let path = save_output(&output.document, dirs)?;
    Ok((output, path))
}

/// Save an already extracted document.
pub fn save_output(doc: &MarkdownDocument, dirs: &OutputDirs) -> Result<PathBuf, OcrError> {
    store::save_markdown(doc, dirs)
}

/// Synchronous wrapper around [`extract`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, OcrError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| OcrError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract(input_str, config))
}

/// What [`inspect`] learns about a document without running OCR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InspectReport {
    pub source_name: String,
    pub kind: DocumentKind,
    pub page_count: usize,
    pub size_bytes: usize,
}

/// Detect a document's kind and count its pages.
///
/// Needs no OCR engine or API key.
pub async fn inspect(
    input_str: impl AsRef<str>,
    password: Option<String>,
) -> Result<InspectReport, OcrError> {
    let resolved = input::resolve_input(input_str.as_ref(), 120).await?;
    let size_bytes = resolved.bytes.len();
    let page_count =
        segment::count_pages(resolved.bytes, resolved.kind, &resolved.source_name, password)
            .await?;
    Ok(InspectReport {
        source_name: resolved.source_name,
        kind: resolved.kind,
        page_count,
        size_bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineKind;
    use crate::llm::{ChatBackend, ChatMessage, ChatReply, CompletionOptions};
    use crate::pipeline::encode::png_bytes;
    use crate::progress::ExtractionProgressCallback;
    use async_trait::async_trait;
    use image::{DynamicImage, GrayImage, Luma};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct Fixed(Result<&'static str, fn() -> OcrError>);

    #[async_trait]
    impl ChatBackend for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn chat(
            &self,
            _: &[ChatMessage],
            _: &CompletionOptions,
        ) -> Result<ChatReply, OcrError> {
            match &self.0 {
                Ok(text) => Ok(ChatReply {
                    content: text.to_string(),
                    prompt_tokens: 10,
                    completion_tokens: 4,
                }),
                Err(make) => Err(make()),
            }
        }
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
        completed: AtomicUsize,
    }

    impl ExtractionProgressCallback for Recorder {
        fn on_extraction_start(&self, total: usize) {
            self.events.lock().unwrap().push(format!("start {total}"));
        }
        fn on_page_complete(&self, page: usize, _: usize, _: usize) {
            self.completed.fetch_add(1, Ordering::SeqCst);
            self.events.lock().unwrap().push(format!("page {page}"));
        }
        fn on_page_error(&self, page: usize, _: usize, _: &str) {
            self.events.lock().unwrap().push(format!("error {page}"));
        }
        fn on_extraction_complete(&self, total: usize, ok: usize) {
            self.events.lock().unwrap().push(format!("done {ok}/{total}"));
        }
    }

    fn inked_png() -> Vec<u8> {
        let mut img = GrayImage::from_pixel(40, 20, Luma([255]));
        for x in 5..35 {
            img.put_pixel(x, 10, Luma([0]));
        }
        png_bytes(&DynamicImage::ImageLuma8(img)).unwrap()
    }

    fn config_with(backend: Arc<dyn ChatBackend>, cb: Arc<Recorder>) -> ExtractionConfig {
        ExtractionConfig::builder()
            .engine(EngineKind::Gemini)
            .backend(backend)
            .max_retries(0)
            .progress_callback(cb)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn image_goes_through_remote_engine_and_postprocess() {
        let cb = Arc::new(Recorder::default());
        let config = config_with(Arc::new(Fixed(Ok("Theorem 1: x+y=z"))), cb.clone());

        let output = extract_bytes(inked_png(), "board.png", &config).await.unwrap();
        assert_eq!(output.document.markdown, "## Theorem\nx+y=z");
        assert_eq!(output.document.source_name, "board.png");
        assert_eq!(output.kind, DocumentKind::Png);
        assert_eq!(output.stats.processed_pages, 1);
        assert_eq!(output.stats.total_input_tokens, 10);
        assert_eq!(output.pages[0].engine, "fixed");
        assert_eq!(
            *cb.events.lock().unwrap(),
            vec!["start 1", "page 1", "done 1/1"]
        );
    }

    #[tokio::test]
    async fn page_failure_aborts_and_reports() {
        let cb = Arc::new(Recorder::default());
        let failing = Fixed(Err(|| OcrError::QuotaExceeded {
            provider: "fixed".into(),
            detail: "429".into(),
        }));
        let config = config_with(Arc::new(failing), cb.clone());

        let err = extract_bytes(inked_png(), "board.png", &config).await.unwrap_err();
        assert!(matches!(err, OcrError::QuotaExceeded { .. }), "got: {err:?}");
        assert_eq!(cb.completed.load(Ordering::SeqCst), 0);
        assert_eq!(
            *cb.events.lock().unwrap(),
            vec!["start 1", "error 1", "done 0/1"]
        );
    }

    #[tokio::test]
    async fn inspect_reports_image_as_one_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.png");
        std::fs::write(&path, inked_png()).unwrap();
        let report = inspect(path.to_str().unwrap(), None).await.unwrap();
        assert_eq!(report.kind, DocumentKind::Png);
        assert_eq!(report.page_count, 1);
        assert_eq!(report.source_name, "photo.png");
    }
}
