//! Configuration types for document extraction.
//!
//! All extraction behaviour is controlled through [`ExtractionConfig`],
//! built via [`ExtractionConfigBuilder`]. Summarization has its own, much
//! smaller option set in [`crate::summarize::SummaryOptions`].

use crate::engine::EngineKind;
use crate::error::OcrError;
use crate::llm::ChatBackend;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Configuration for turning one document into Markdown.
///
/// # Example
/// ```rust
/// use edgequake_ocr2md::{EngineKind, ExtractionConfig, PageSelection};
///
/// let config = ExtractionConfig::builder()
///     .engine(EngineKind::Tesseract)
///     .languages(["eng", "fra"])
///     .pages(PageSelection::Range(1, 3))
///     .build()
///     .unwrap();
/// assert_eq!(config.tesseract_languages(), "eng+fra");
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// OCR engine used for every page. Default: Tesseract.
    pub engine: EngineKind,

    /// Rendering DPI for PDF pages. Range: 72–400. Default: 200.
    ///
    /// Local OCR engines are trained on 200–300 DPI scans; below 150 DPI
    /// Tesseract starts dropping diacritics and subscripts.
    pub dpi: u32,

    /// Cap on the longest rendered edge in pixels. Default: 3000.
    pub max_rendered_pixels: u32,

    /// Page selection. Default: all pages.
    pub pages: PageSelection,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// OCR language hints, e.g. `["eng", "ara"]` for Tesseract or
    /// `["en", "ar"]` for EasyOCR. Empty means the engine's default.
    pub languages: Vec<String>,

    /// Grayscale + upscale + contrast stretch before local OCR. Default: true.
    pub preprocess: bool,

    /// Model identifier for remote engines. `None` uses the engine default.
    pub model: Option<String>,

    /// Pre-constructed chat backend for remote engines. Takes precedence
    /// over provider lookup by name.
    pub backend: Option<Arc<dyn ChatBackend>>,

    /// Sampling temperature for remote engines. Default: 0.2.
    pub temperature: f32,

    /// Maximum tokens generated per page by remote engines. Default: 4096.
    pub max_tokens: usize,

    /// Retries on transient remote failures. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-call timeout for remote engines in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Custom OCR prompt for remote engines. `None` uses the built-in prompt.
    pub system_prompt: Option<String>,

    /// Separator between pages in the assembled Markdown. Default: `---`.
    pub page_separator: PageSeparator,

    /// Per-page progress events.
    pub progress_callback: Option<ProgressCallback>,

    /// Python interpreter for the EasyOCR / PaddleOCR bridges.
    /// `None` reads `OCR2MD_PYTHON`, then falls back to `python3`.
    pub python: Option<String>,

    /// Tesseract executable. `None` reads `TESSERACT_CMD`, then `tesseract`.
    pub tesseract_cmd: Option<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            engine: EngineKind::default(),
            dpi: 200,
            max_rendered_pixels: 3000,
            pages: PageSelection::default(),
            password: None,
            languages: Vec::new(),
            preprocess: true,
            model: None,
            backend: None,
            temperature: 0.2,
            max_tokens: 4096,
            max_retries: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            download_timeout_secs: 120,
            system_prompt: None,
            page_separator: PageSeparator::default(),
            progress_callback: None,
            python: None,
            tesseract_cmd: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("engine", &self.engine)
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("pages", &self.pages)
            .field("languages", &self.languages)
            .field("preprocess", &self.preprocess)
            .field("model", &self.model)
            .field("backend", &self.backend.as_ref().map(|_| "<dyn ChatBackend>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("page_separator", &self.page_separator)
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

    /// Language argument for `tesseract -l`.
    pub fn tesseract_languages(&self) -> String {
        if self.languages.is_empty() {
            "eng".to_string()
        } else {
            self.languages.join("+")
        }
    }

    /// Language list for the Python engines (EasyOCR takes several,
    /// PaddleOCR only the first).
    pub fn python_languages(&self) -> Vec<String> {
        if self.languages.is_empty() {
            vec!["en".to_string()]
        } else {
            self.languages.clone()
        }
    }

    pub fn python_cmd(&self) -> String {
        self.python
            .clone()
            .or_else(|| std::env::var("OCR2MD_PYTHON").ok().filter(|s| !s.is_empty()))
            .unwrap_or_else(|| "python3".to_string())
    }

    pub fn tesseract_cmd(&self) -> String {
        self.tesseract_cmd
            .clone()
            .or_else(|| std::env::var("TESSERACT_CMD").ok().filter(|s| !s.is_empty()))
            .unwrap_or_else(|| "tesseract".to_string())
    }
}

/// Builder for [`ExtractionConfig`].
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl fmt::Debug for ExtractionConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ExtractionConfigBuilder {
    pub fn engine(mut self, engine: EngineKind) -> Self {
        self.config.engine = engine;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
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

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn languages<I, S>(mut self, langs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.languages = langs
            .into_iter()
            .map(|s| {
                let s: String = s.into();
                s.trim().to_string()
            })
            .filter(|s| !s.is_empty())
            .collect();
        self
    }

    pub fn preprocess(mut self, v: bool) -> Self {
        self.config.preprocess = v;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn backend(mut self, backend: Arc<dyn ChatBackend>) -> Self {
        self.config.backend = Some(backend);
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

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn page_separator(mut self, sep: PageSeparator) -> Self {
        self.config.page_separator = sep;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn python(mut self, cmd: impl Into<String>) -> Self {
        self.config.python = Some(cmd.into());
        self
    }

    pub fn tesseract_cmd(mut self, cmd: impl Into<String>) -> Self {
        self.config.tesseract_cmd = Some(cmd.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, OcrError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(OcrError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.max_tokens == 0 {
            return Err(OcrError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.api_timeout_secs == 0 {
            return Err(OcrError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        c.pages.validate()?;
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Specifies which pages of a PDF to extract. Ignored for images.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// All pages (default).
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
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
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

    fn validate(&self) -> Result<(), OcrError> {
        match self {
            PageSelection::Single(0) => Err(OcrError::InvalidConfig(
                "Pages are 1-indexed, got 0".into(),
            )),
            PageSelection::Range(s, e) if s > e => Err(OcrError::InvalidConfig(format!(
                "Invalid page range {s}-{e}: start must be <= end"
            ))),
            PageSelection::Set(pages) if pages.contains(&0) => Err(OcrError::InvalidConfig(
                "Pages are 1-indexed, got 0".into(),
            )),
            _ => Ok(()),
        }
    }
}

/// How pages are separated in the assembled Markdown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSeparator {
    /// Blank line only.
    None,
    /// Horizontal rule: "\n\n---\n\n". (default)
    #[default]
    HorizontalRule,
    /// HTML comment with page number: "<!-- page N -->"
    Comment,
    /// Custom string inserted between pages.
    Custom(String),
}

impl PageSeparator {
    /// Render the separator placed before the given page (1-indexed).
    pub fn render(&self, page_num: usize) -> String {
        match self {
            PageSeparator::None => "\n\n".to_string(),
            PageSeparator::HorizontalRule => "\n\n---\n\n".to_string(),
            PageSeparator::Comment => format!("\n\n<!-- page {} -->\n\n", page_num),
            PageSeparator::Custom(s) => format!("\n\n{}\n\n", s.trim()),
        }
    }
}
