//! OCR engine adapter.
//!
//! Five engines sit behind one closed enum, [`Engine`], with a single
//! `extract` operation:
//!
//! | Kind        | Runs   | Backend                                   |
//! |-------------|--------|-------------------------------------------|
//! | Tesseract   | local  | `tesseract` executable                    |
//! | EasyOcr     | local  | Python `easyocr` through a bridge script  |
//! | PaddleOcr   | local  | Python `paddleocr` through a bridge script|
//! | Gemini      | remote | Gemini vision model via `edgequake-llm`   |
//! | OpenAi      | remote | OpenAI vision model via `edgequake-llm`   |
//!
//! Engines are explicit values built once by [`Engine::connect`], which
//! probes local dependencies and checks remote credentials up front so a
//! missing binary or key fails before any page is rendered.
//!
//! A blank page is not an error: every engine returns `Ok("")` for it.
//!
//! Text from the local engines also gets [`repair_links`] and
//! [`light_markup`]; vision models already return Markdown.

mod links;
mod python;
mod remote;
mod tesseract;

pub use links::repair_links;
pub use python::{group_lines, layout_markdown, PythonEngine, PythonFlavor, WordBox};
pub use remote::RemoteEngine;
pub use tesseract::{preprocess, TesseractEngine};

use crate::config::ExtractionConfig;
use crate::document::PageImage;
use crate::error::OcrError;
use crate::llm::RemoteProvider;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// Which OCR engine to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Local Tesseract (default).
    #[default]
    Tesseract,
    EasyOcr,
    PaddleOcr,
    Gemini,
    OpenAi,
}

impl EngineKind {
    pub const ALL: [EngineKind; 5] = [
        EngineKind::Tesseract,
        EngineKind::EasyOcr,
        EngineKind::PaddleOcr,
        EngineKind::Gemini,
        EngineKind::OpenAi,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EngineKind::Tesseract => "tesseract",
            EngineKind::EasyOcr => "easyocr",
            EngineKind::PaddleOcr => "paddleocr",
            EngineKind::Gemini => "gemini",
            EngineKind::OpenAi => "openai",
        }
    }

    pub fn is_remote(&self) -> bool {
        self.remote_provider().is_some()
    }

    pub fn remote_provider(&self) -> Option<RemoteProvider> {
        match self {
            EngineKind::Gemini => Some(RemoteProvider::Gemini),
            EngineKind::OpenAi => Some(RemoteProvider::OpenAi),
            _ => None,
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EngineKind {
    type Err = OcrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tesseract" => Ok(EngineKind::Tesseract),
            "easyocr" | "easy" => Ok(EngineKind::EasyOcr),
            "paddleocr" | "paddle" => Ok(EngineKind::PaddleOcr),
            "gemini" => Ok(EngineKind::Gemini),
            "openai" | "gpt" => Ok(EngineKind::OpenAi),
            other => Err(OcrError::InvalidConfig(format!(
                "unknown engine '{other}'; expected one of: tesseract, easyocr, paddleocr, gemini, openai"
            ))),
        }
    }
}

/// Text plus usage figures from one engine call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineOutput {
    pub text: String,
    pub retries: u32,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl EngineOutput {
    fn text(text: String) -> Self {
        Self {
            text,
            ..Default::default()
        }
    }
}

/// A connected OCR engine.
pub enum Engine {
    Tesseract(TesseractEngine),
    /// EasyOCR or PaddleOCR; the flavour is carried by the engine.
    Python(PythonEngine),
    Remote(RemoteEngine),
}

impl Engine {
    /// Construct and probe the engine selected by `kind`.
    ///
    /// # Errors
    /// - [`OcrError::EngineUnavailable`] when a local binary or Python
    ///   package is missing
    /// - [`OcrError::AuthError`] when a remote engine has no API key
    pub async fn connect(kind: EngineKind, config: &ExtractionConfig) -> Result<Self, OcrError> {
        let engine = match kind {
            EngineKind::Tesseract => Engine::Tesseract(TesseractEngine::probe(config).await?),
            EngineKind::EasyOcr => {
                Engine::Python(PythonEngine::probe(PythonFlavor::EasyOcr, config).await?)
            }
            EngineKind::PaddleOcr => {
                Engine::Python(PythonEngine::probe(PythonFlavor::PaddleOcr, config).await?)
            }
            EngineKind::Gemini => {
                Engine::Remote(RemoteEngine::connect(RemoteProvider::Gemini, config)?)
            }
            EngineKind::OpenAi => {
                Engine::Remote(RemoteEngine::connect(RemoteProvider::OpenAi, config)?)
            }
        };
        info!("OCR engine ready: {}", engine.label());
        Ok(engine)
    }

    pub fn kind(&self) -> EngineKind {
        match self {
            Engine::Tesseract(_) => EngineKind::Tesseract,
            Engine::Python(p) => match p.flavor() {
                PythonFlavor::EasyOcr => EngineKind::EasyOcr,
                PythonFlavor::PaddleOcr => EngineKind::PaddleOcr,
            },
            Engine::Remote(r) => match r.provider() {
                RemoteProvider::Gemini => EngineKind::Gemini,
                RemoteProvider::OpenAi => EngineKind::OpenAi,
            },
        }
    }

    /// Engine name, with the model for remote engines ("gemini/gemini-1.5-pro").
    pub fn label(&self) -> String {
        match self {
            Engine::Remote(r) => r.label(),
            other => other.kind().name().to_string(),
        }
    }

    /// Recognise the text on one page image.
    ///
    /// Returns `Ok("")` for blank pages.
    pub async fn extract(&self, page: &PageImage) -> Result<String, OcrError> {
        self.extract_detailed(page).await.map(|out| out.text)
    }

    /// Like [`Engine::extract`], also reporting retries and token usage.
    pub async fn extract_detailed(&self, page: &PageImage) -> Result<EngineOutput, OcrError> {
        if is_blank(&page.image) {
            debug!("Page {}: blank image, skipping OCR", page.index + 1);
            return Ok(EngineOutput::default());
        }
        match self {
            Engine::Tesseract(t) => {
                let raw = t.recognise(&page.image).await?;
                Ok(EngineOutput::text(light_markup(&repair_links(&raw))))
            }
            Engine::Python(p) => {
                let raw = p.recognise(&page.image).await?;
                Ok(EngineOutput::text(light_markup(&repair_links(&raw))))
            }
            Engine::Remote(r) => r.recognise(&page.image).await,
        }
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Engine").field(&self.label()).finish()
    }
}

/// Luminance spread under which a page counts as blank.
const BLANK_LUMA_RANGE: u8 = 8;

/// True for zero-sized images and images of (near) uniform luminance.
pub fn is_blank(image: &DynamicImage) -> bool {
    if image.width() == 0 || image.height() == 0 {
        return true;
    }
    let luma = image.to_luma8();
    let (mut lo, mut hi) = (u8::MAX, u8::MIN);
    for p in luma.pixels() {
        lo = lo.min(p.0[0]);
        hi = hi.max(p.0[0]);
        if hi - lo > BLANK_LUMA_RANGE {
            return false;
        }
    }
    true
}

/// Light Markdown for plain local-engine text.
///
/// Bullet glyphs at the start of a line become `- ` list items, form feeds
/// are dropped and trailing blanks trimmed.
pub fn light_markup(text: &str) -> String {
    text.replace('\u{000C}', "")
        .lines()
        .map(|line| {
            let trimmed = line.trim_start();
            match trimmed.chars().next() {
                Some(c @ ('•' | '·' | '▪')) => {
                    format!("- {}", trimmed[c.len_utf8()..].trim())
                }
                _ => line.trim_end().to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, RgbImage, Rgb};

    #[test]
    fn engine_kind_round_trips_names() {
        for kind in EngineKind::ALL {
            assert_eq!(kind.name().parse::<EngineKind>().unwrap(), kind);
        }
        assert_eq!("Paddle".parse::<EngineKind>().unwrap(), EngineKind::PaddleOcr);
        assert!("abbyy".parse::<EngineKind>().is_err());
    }

    #[test]
    fn only_llm_engines_are_remote() {
        assert!(EngineKind::Gemini.is_remote());
        assert!(EngineKind::OpenAi.is_remote());
        assert!(!EngineKind::Tesseract.is_remote());
        assert!(!EngineKind::EasyOcr.is_remote());
    }

    #[test]
    fn uniform_and_empty_images_are_blank() {
        let white = DynamicImage::ImageRgb8(RgbImage::from_pixel(50, 40, Rgb([255, 255, 255])));
        assert!(is_blank(&white));
        assert!(is_blank(&DynamicImage::new_rgb8(0, 0)));
        // Scanner noise of a few levels is still blank.
        let mut noisy = GrayImage::from_pixel(20, 20, Luma([250]));
        noisy.put_pixel(3, 3, Luma([245]));
        assert!(is_blank(&DynamicImage::ImageLuma8(noisy)));
    }

    #[test]
    fn image_with_ink_is_not_blank() {
        let mut img = GrayImage::from_pixel(20, 20, Luma([255]));
        img.put_pixel(10, 10, Luma([0]));
        assert!(!is_blank(&DynamicImage::ImageLuma8(img)));
    }

    #[tokio::test]
    async fn blank_page_short_circuits_remote_engine() {
        use crate::llm::{ChatBackend, ChatMessage, ChatReply, CompletionOptions};
        use async_trait::async_trait;
        use std::sync::Arc;

        struct Unreachable;

        #[async_trait]
        impl ChatBackend for Unreachable {
            fn name(&self) -> &str {
                "unreachable"
            }
            async fn chat(
                &self,
                _: &[ChatMessage],
                _: &CompletionOptions,
            ) -> Result<ChatReply, OcrError> {
                panic!("blank pages must not reach the model");
            }
        }

        let config = ExtractionConfig::builder()
            .backend(Arc::new(Unreachable))
            .build()
            .unwrap();
        let engine = Engine::connect(EngineKind::Gemini, &config).await.unwrap();
        let page = PageImage {
            index: 0,
            image: DynamicImage::ImageRgb8(RgbImage::from_pixel(30, 30, Rgb([255, 255, 255]))),
        };
        assert_eq!(engine.extract(&page).await.unwrap(), "");
    }

    #[test]
    fn bullets_become_list_items() {
        let text = "Intro  \n• first\n  · second\n▪third\n\u{000C}";
        assert_eq!(light_markup(text), "Intro\n- first\n- second\n- third");
    }
}
