//! LLM summarization of extracted Markdown.
//!
//! ## Formula Safety
//!
//! Models like to "tidy up" LaTeX. Before the request every math and code
//! span is replaced by a token `⟦F0⟧`, `⟦F1⟧`, … and the prompt tells the
//! model to copy tokens verbatim. After the reply the tokens are swapped
//! back. Any span whose token the model dropped is appended under a
//! `## Formulas` section, so every span of the source appears byte-for-byte
//! in the summary.

use crate::document::{MarkdownDocument, SummaryDocument, SummaryStyle};
use crate::error::OcrError;
use crate::llm::{
    backend_label, chat_with_retry, ChatBackend, ChatMessage, CompletionOptions, RemoteProvider,
    RetryPolicy,
};
use crate::pipeline::formula;
use crate::prompts::{summary_instruction, summary_user_message};
use crate::store::{self, OutputDirs};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Options for one summarization run.
#[derive(Clone)]
pub struct SummaryOptions {
    /// Provider used when no backend is injected. Default: Gemini.
    pub engine: RemoteProvider,
    pub style: SummaryStyle,
    /// Output language; `None` uses the detected document language, or
    /// tells the model to keep it when detection is unsure.
    pub language: Option<String>,
    /// Model override. `None` uses the provider default.
    pub model: Option<String>,
    /// Default: 0.3.
    pub temperature: f32,
    /// Default: 8192.
    pub max_tokens: usize,
    /// Default: 3.
    pub max_retries: u32,
    /// Default: 500.
    pub retry_backoff_ms: u64,
    /// Default: 180.
    pub api_timeout_secs: u64,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            engine: RemoteProvider::Gemini,
            style: SummaryStyle::default(),
            language: None,
            model: None,
            temperature: 0.3,
            max_tokens: 8192,
            max_retries: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 180,
        }
    }
}

impl fmt::Debug for SummaryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SummaryOptions")
            .field("engine", &self.engine)
            .field("style", &self.style)
            .field("language", &self.language)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl SummaryOptions {
    pub fn builder() -> SummaryOptionsBuilder {
        SummaryOptionsBuilder {
            options: Self::default(),
        }
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff_ms: self.retry_backoff_ms,
            timeout: Duration::from_secs(self.api_timeout_secs),
        }
    }
}

/// Builder for [`SummaryOptions`].
#[derive(Debug)]
pub struct SummaryOptionsBuilder {
    options: SummaryOptions,
}

impl SummaryOptionsBuilder {
    pub fn engine(mut self, engine: RemoteProvider) -> Self {
        self.options.engine = engine;
        self
    }

    pub fn style(mut self, style: SummaryStyle) -> Self {
        self.options.style = style;
        self
    }

    /// Blank strings mean "same language as the document".
    pub fn language(mut self, language: impl Into<String>) -> Self {
        let language: String = language.into();
        let language = language.trim();
        self.options.language = (!language.is_empty()).then(|| language.to_string());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.options.model = Some(model.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.options.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.options.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.options.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.options.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.options.api_timeout_secs = secs;
        self
    }

    pub fn build(self) -> Result<SummaryOptions, OcrError> {
        if self.options.max_tokens == 0 {
            return Err(OcrError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if self.options.api_timeout_secs == 0 {
            return Err(OcrError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        Ok(self.options)
    }
}

/// A connected summarizer.
pub struct Summarizer {
    backend: Arc<dyn ChatBackend>,
    options: SummaryOptions,
}

impl fmt::Debug for Summarizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Summarizer")
            .field("backend", &backend_label(self.backend.as_ref()))
            .field("options", &self.options)
            .finish()
    }
}

impl Summarizer {
    /// Connect to `options.engine`, failing with [`OcrError::AuthError`]
    /// when its API key is missing.
    pub fn connect(options: SummaryOptions) -> Result<Self, OcrError> {
        let backend = options.engine.connect(options.model.as_deref())?;
        Ok(Self { backend, options })
    }

    /// Use a pre-built backend.
    pub fn with_backend(backend: Arc<dyn ChatBackend>, options: SummaryOptions) -> Self {
        Self { backend, options }
    }

    pub fn options(&self) -> &SummaryOptions {
        &self.options
    }

    /// Summarize one document in a single request.
    ///
    /// # Errors
    /// [`OcrError::AuthError`], [`OcrError::QuotaExceeded`] or
    /// [`OcrError::RemoteError`] from the backend. An empty reply is a
    /// `RemoteError`.
    pub async fn summarize(&self, doc: &MarkdownDocument) -> Result<SummaryDocument, OcrError> {
        let start = Instant::now();
        let label = backend_label(self.backend.as_ref());
        info!(
            "Summarizing '{}' ({} chars) with {} as {}",
            doc.source_name,
            doc.markdown.len(),
            label,
            self.options.style
        );

        let tokenized = tokenize(&doc.markdown);
        debug!("Protected {} formula/code span(s)", tokenized.spans.len());

        let language = self.options.language.clone().or_else(|| {
            let detected = detect_language(&tokenized.text);
            if let Some(lang) = &detected {
                debug!("Detected document language: {}", lang);
            }
            detected
        });

        let messages = vec![
            ChatMessage::system(summary_instruction(self.options.style, language.as_deref())),
            ChatMessage::user(summary_user_message(&doc.source_name, &tokenized.text)),
        ];
        let options = CompletionOptions {
            temperature: Some(self.options.temperature),
            max_tokens: Some(self.options.max_tokens),
            ..Default::default()
        };

        let outcome = chat_with_retry(
            self.backend.as_ref(),
            &messages,
            &options,
            &self.options.retry_policy(),
        )
        .await?;

        let content = outcome.reply.content.trim();
        if content.is_empty() {
            return Err(OcrError::RemoteError {
                provider: self.backend.name().to_string(),
                detail: "model returned an empty summary".into(),
            });
        }

        let markdown = detokenize(content, &tokenized.spans);
        info!(
            "Summary ready: {} chars in {}ms",
            markdown.len(),
            start.elapsed().as_millis()
        );

        Ok(SummaryDocument {
            source_name: doc.source_name.clone(),
            style: self.options.style,
            language,
            generated_by: label,
            markdown,
        })
    }

    /// Summarize and save under `dirs.summaries`.
    ///
    /// No file is written when summarization fails.
    pub async fn summarize_to_dir(
        &self,
        doc: &MarkdownDocument,
        dirs: &OutputDirs,
    ) -> Result<(SummaryDocument, PathBuf), OcrError> {
        let summary = self.summarize(doc).await?;
        let path = store::save_summary(&summary, dirs)?;
        Ok((summary, path))
    }
}

/// Summarize with a freshly connected [`Summarizer`].
pub async fn summarize(
    doc: &MarkdownDocument,
    options: &SummaryOptions,
) -> Result<SummaryDocument, OcrError> {
    Summarizer::connect(options.clone())?.summarize(doc).await
}

/// English name of the language `text` is written in ("French"), when the
/// detection is reliable.
pub fn detect_language(text: &str) -> Option<String> {
    let info = whatlang::detect(text)?;
    info.is_reliable().then(|| info.lang().eng_name().to_string())
}

// ── Tokens ───────────────────────────────────────────────────────────────

const TOKEN_OPEN: &str = "⟦F";
const TOKEN_CLOSE: char = '⟧';

fn token(n: usize) -> String {
    format!("{TOKEN_OPEN}{n}{TOKEN_CLOSE}")
}

/// Markdown with every formula and code span swapped for a token.
#[derive(Debug, Clone)]
struct Tokenized {
    text: String,
    /// Raw span text, indexed by token number.
    spans: Vec<String>,
}

fn tokenize(markdown: &str) -> Tokenized {
    let mut text = String::with_capacity(markdown.len());
    let mut spans = Vec::new();
    let mut cursor = 0;
    for span in formula::find_spans(markdown) {
        text.push_str(&markdown[cursor..span.range.start]);
        text.push_str(&token(spans.len()));
        cursor = span.range.end;
        spans.push(span.raw);
    }
    text.push_str(&markdown[cursor..]);
    Tokenized { text, spans }
}

/// Swap tokens back and append any span the reply no longer contains.
///
/// Tokens that name no span are removed.
fn detokenize(reply: &str, spans: &[String]) -> String {
    let mut out = String::with_capacity(reply.len() + 64);
    let mut rest = reply;
    while let Some(open) = rest.find(TOKEN_OPEN) {
        out.push_str(&rest[..open]);
        let after = &rest[open + TOKEN_OPEN.len()..];
        let parsed = after.find(TOKEN_CLOSE).and_then(|close| {
            let n: usize = after[..close].parse().ok()?;
            Some((n, close))
        });
        match parsed {
            Some((n, close)) => {
                match spans.get(n) {
                    Some(raw) => out.push_str(raw),
                    None => warn!("Reply referenced unknown formula token {}", n),
                }
                rest = &after[close + TOKEN_CLOSE.len_utf8()..];
            }
            None => {
                out.push_str(TOKEN_OPEN);
                rest = after;
            }
        }
    }
    out.push_str(rest);

    let mut missing: Vec<&str> = Vec::new();
    for raw in spans {
        if !out.contains(raw.as_str()) && !missing.contains(&raw.as_str()) {
            missing.push(raw);
        }
    }
    if !missing.is_empty() {
        debug!("Appending {} formula(s) the reply dropped", missing.len());
        out.push_str("\n\n## Formulas\n");
        for raw in missing {
            out.push('\n');
            out.push_str(raw);
            out.push('\n');
        }
        out.truncate(out.trim_end().len());
    }
    out
}
