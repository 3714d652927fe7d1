//! Remote vision-model engines (Gemini, OpenAI).
//!
//! ## Message Layout
//!
//! 1. **System message**: the OCR prompt (or the configured override)
//! 2. **User message**: a one-line instruction plus the page as a base64
//!    PNG attachment with `detail: high`

use super::EngineOutput;
use crate::config::ExtractionConfig;
use crate::error::OcrError;
use crate::llm::{
    backend_label, chat_with_retry, ChatBackend, ChatMessage, CompletionOptions, RemoteProvider,
    RetryPolicy,
};
use crate::pipeline::encode::encode_page;
use crate::prompts::OCR_SYSTEM_PROMPT;
use image::DynamicImage;
use std::sync::Arc;
use std::time::Duration;

/// A remote OCR engine bound to one chat backend.
pub struct RemoteEngine {
    provider: RemoteProvider,
    backend: Arc<dyn ChatBackend>,
    prompt: String,
    options: CompletionOptions,
    retry: RetryPolicy,
}

impl RemoteEngine {
    /// Use `config.backend` when set, otherwise create a provider backend
    /// after checking that its API key is present.
    pub fn connect(provider: RemoteProvider, config: &ExtractionConfig) -> Result<Self, OcrError> {
        let backend = match &config.backend {
            Some(backend) => Arc::clone(backend),
            None => provider.connect(config.model.as_deref())?,
        };
        Ok(Self {
            provider,
            backend,
            prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| OCR_SYSTEM_PROMPT.to_string()),
            options: build_options(config),
            retry: RetryPolicy {
                max_retries: config.max_retries,
                backoff_ms: config.retry_backoff_ms,
                timeout: Duration::from_secs(config.api_timeout_secs),
            },
        })
    }

    pub fn provider(&self) -> RemoteProvider {
        self.provider
    }

    pub fn label(&self) -> String {
        backend_label(self.backend.as_ref())
    }

    /// Send one page to the model and return its transcription.
    pub async fn recognise(&self, image: &DynamicImage) -> Result<EngineOutput, OcrError> {
        let image_data = encode_page(image)?;
        let messages = vec![
            ChatMessage::system(self.prompt.as_str()),
            ChatMessage::user_with_images(
                "Transcribe this page to Markdown.",
                vec![image_data],
            ),
        ];

        let outcome =
            chat_with_retry(self.backend.as_ref(), &messages, &self.options, &self.retry).await?;
        Ok(EngineOutput {
            text: outcome.reply.content.trim().to_string(),
            retries: outcome.retries,
            input_tokens: outcome.reply.prompt_tokens,
            output_tokens: outcome.reply.completion_tokens,
        })
    }
}

fn build_options(config: &ExtractionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatReply;
    use async_trait::async_trait;
    use image::{Luma, GrayImage};
    use std::sync::Mutex;

    struct Recording {
        seen: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl ChatBackend for Recording {
        fn name(&self) -> &str {
            "gemini"
        }

        fn model(&self) -> &str {
            "gemini-test"
        }

        async fn chat(
            &self,
            messages: &[ChatMessage],
            _options: &CompletionOptions,
        ) -> Result<ChatReply, OcrError> {
            self.seen.lock().unwrap().push(messages.len());
            Ok(ChatReply {
                content: "  # Page\n\n$x^2$  \n".into(),
                prompt_tokens: 800,
                completion_tokens: 12,
            })
        }
    }

    #[test]
    fn build_options_defaults() {
        let opts = build_options(&ExtractionConfig::default());
        assert_eq!(opts.temperature, Some(0.2));
        assert_eq!(opts.max_tokens, Some(4096));
    }

    #[tokio::test]
    async fn sends_prompt_and_image_and_reports_usage() {
        let backend = Arc::new(Recording {
            seen: Mutex::new(Vec::new()),
        });
        let config = ExtractionConfig::builder()
            .backend(backend.clone())
            .build()
            .unwrap();
        let engine = RemoteEngine::connect(RemoteProvider::Gemini, &config).unwrap();
        assert_eq!(engine.label(), "gemini/gemini-test");

        let mut img = GrayImage::from_pixel(16, 16, Luma([255]));
        img.put_pixel(4, 4, Luma([0]));
        let out = engine
            .recognise(&DynamicImage::ImageLuma8(img))
            .await
            .unwrap();

        assert_eq!(out.text, "# Page\n\n$x^2$");
        assert_eq!(out.input_tokens, 800);
        assert_eq!(out.retries, 0);
        assert_eq!(*backend.seen.lock().unwrap(), vec![2]);
    }
}
