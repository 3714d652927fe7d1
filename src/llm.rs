//! Remote model access: the [`ChatBackend`] seam, provider wiring, and the
//! retry loop shared by the remote OCR engines and the summarizer.
//!
//! ## Retry Strategy
//!
//! Only [`OcrError::RemoteError`] is retried. Bad credentials and exhausted
//! quotas fail immediately. The wait before retry `n` is
//! `backoff_ms * 2^(n-1)` plus up to 25% random jitter; with the defaults
//! (500 ms, 3 retries) that is roughly 0.5 s → 1 s → 2 s. Every attempt is
//! bounded by the per-call timeout, and a timeout counts as a remote error.

use crate::error::OcrError;
use async_trait::async_trait;
use edgequake_llm::{LLMProvider, ProviderFactory};
use rand::Rng;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub use edgequake_llm::{ChatMessage, CompletionOptions, ImageData};

/// Text and token usage returned by one chat call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatReply {
    pub content: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

/// A chat-completion endpoint.
///
/// [`ProviderBackend`] adapts any `edgequake-llm` provider; tests plug in
/// scripted implementations. Implementations classify their own failures
/// into [`OcrError::AuthError`], [`OcrError::QuotaExceeded`] or
/// [`OcrError::RemoteError`].
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Provider name used in errors and logs, e.g. "gemini".
    fn name(&self) -> &str;

    /// Model identifier, when known.
    fn model(&self) -> &str {
        ""
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<ChatReply, OcrError>;
}

/// "provider/model", or just the provider when the model is unknown.
pub fn backend_label(backend: &dyn ChatBackend) -> String {
    match backend.model() {
        "" => backend.name().to_string(),
        model => format!("{}/{}", backend.name(), model),
    }
}

// ── Providers ────────────────────────────────────────────────────────────

/// Remote model families supported for OCR and summarization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteProvider {
    Gemini,
    OpenAi,
}

impl RemoteProvider {
    /// Provider name understood by `edgequake-llm`.
    pub fn name(&self) -> &'static str {
        match self {
            RemoteProvider::Gemini => "gemini",
            RemoteProvider::OpenAi => "openai",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            RemoteProvider::Gemini => "gemini-1.5-pro",
            RemoteProvider::OpenAi => "gpt-4o",
        }
    }

    /// Environment variables accepted as the API key, in lookup order.
    pub fn key_vars(&self) -> &'static [&'static str] {
        match self {
            RemoteProvider::Gemini => &["GEMINI_API_KEY", "GEMINI_AI_API_KEY", "GOOGLE_API_KEY"],
            RemoteProvider::OpenAi => &["OPENAI_API_KEY"],
        }
    }

    /// Fail fast with [`OcrError::AuthError`] when no key is set.
    pub fn check_credentials(&self) -> Result<(), OcrError> {
        let present = self
            .key_vars()
            .iter()
            .any(|var| std::env::var(var).is_ok_and(|v| !v.trim().is_empty()));
        if present {
            Ok(())
        } else {
            Err(OcrError::AuthError {
                provider: self.name().to_string(),
                detail: format!("no API key found; set {}", self.key_vars().join(" or ")),
            })
        }
    }

    /// Build a backend for this provider after checking credentials.
    pub fn connect(&self, model: Option<&str>) -> Result<Arc<dyn ChatBackend>, OcrError> {
        self.check_credentials()?;
        let model = model.unwrap_or(self.default_model());
        let backend = ProviderBackend::create(self.name(), model)?;
        Ok(Arc::new(backend))
    }
}

impl fmt::Display for RemoteProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// [`ChatBackend`] over an `edgequake-llm` provider.
pub struct ProviderBackend {
    name: String,
    model: String,
    provider: Arc<dyn LLMProvider>,
}

impl ProviderBackend {
    /// Wrap an already-configured provider.
    pub fn new(
        name: impl Into<String>,
        model: impl Into<String>,
        provider: Arc<dyn LLMProvider>,
    ) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            provider,
        }
    }

    /// Instantiate a named provider via [`ProviderFactory`], which reads the
    /// provider's API key from the environment.
    pub fn create(provider_name: &str, model: &str) -> Result<Self, OcrError> {
        let provider = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
            match OcrError::from_provider_message(provider_name, &e.to_string()) {
                auth @ OcrError::AuthError { .. } => auth,
                _ => OcrError::InvalidConfig(format!(
                    "cannot create provider '{provider_name}' with model '{model}': {e}"
                )),
            }
        })?;
        Ok(Self::new(provider_name, model, provider))
    }
}

#[async_trait]
impl ChatBackend for ProviderBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<ChatReply, OcrError> {
        let response = self
            .provider
            .chat(messages, Some(options))
            .await
            .map_err(|e| OcrError::from_provider_message(&self.name, &e.to_string()))?;
        Ok(ChatReply {
            content: response.content,
            prompt_tokens: response.prompt_tokens,
            completion_tokens: response.completion_tokens,
        })
    }
}

// ── Retry ────────────────────────────────────────────────────────────────

/// Bounded retry with exponential backoff for remote calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_ms: 500,
            timeout: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// Base delay before retry `attempt` (1-based), without jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.backoff_ms.saturating_mul(factor))
    }

    fn delay_with_jitter(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        let max_jitter = base.as_millis() as u64 / 4;
        let jitter = if max_jitter == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=max_jitter)
        };
        base + Duration::from_millis(jitter)
    }
}

/// A successful reply plus the retries it took.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub reply: ChatReply,
    pub retries: u32,
}

/// Call `backend`, retrying transient failures according to `policy`.
pub async fn chat_with_retry(
    backend: &dyn ChatBackend,
    messages: &[ChatMessage],
    options: &CompletionOptions,
    policy: &RetryPolicy,
) -> Result<ChatOutcome, OcrError> {
    let mut attempt = 0u32;
    loop {
        if attempt > 0 {
            let delay = policy.delay_with_jitter(attempt);
            warn!(
                "{}: retry {}/{} after {}ms",
                backend.name(),
                attempt,
                policy.max_retries,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
        }

        let result = match tokio::time::timeout(policy.timeout, backend.chat(messages, options)).await
        {
            Ok(result) => result,
            Err(_) => Err(OcrError::RemoteError {
                provider: backend.name().to_string(),
                detail: format!("request timed out after {}s", policy.timeout.as_secs()),
            }),
        };

        match result {
            Ok(reply) => {
                debug!(
                    "{}: {} prompt tokens, {} completion tokens",
                    backend.name(),
                    reply.prompt_tokens,
                    reply.completion_tokens
                );
                return Ok(ChatOutcome {
                    reply,
                    retries: attempt,
                });
            }
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                warn!("{}: attempt {} failed: {}", backend.name(), attempt + 1, e);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
