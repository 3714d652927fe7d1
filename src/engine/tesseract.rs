//! Tesseract engine: runs the `tesseract` executable on a temporary PNG.
//!
//! Invocation: `tesseract <img> stdout -l <langs> --oem 3 --psm 6`
//! (LSTM engine, page treated as one uniform block of text).

use crate::config::ExtractionConfig;
use crate::error::OcrError;
use crate::pipeline::encode::png_bytes;
use image::{imageops::FilterType, DynamicImage, GrayImage};
use std::io::ErrorKind;
use tokio::process::Command;
use tracing::debug;

const ENGINE: &str = "tesseract";

/// Longest edge beyond which preprocessing no longer upscales.
const MAX_UPSCALED_EDGE: u32 = 5000;

/// A probed Tesseract installation.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    cmd: String,
    languages: String,
    preprocess: bool,
}

impl TesseractEngine {
    /// Check that the executable runs and every requested language is installed.
    pub async fn probe(config: &ExtractionConfig) -> Result<Self, OcrError> {
        let cmd = config.tesseract_cmd();
        let languages = config.tesseract_languages();

        let output = Command::new(&cmd)
            .arg("--list-langs")
            .output()
            .await
            .map_err(|e| spawn_error(&cmd, e))?;
        if !output.status.success() {
            return Err(OcrError::EngineUnavailable {
                engine: ENGINE.into(),
                hint: format!("'{cmd} --list-langs' exited with {}", output.status),
            });
        }

        // Older releases print the list on stderr.
        let listing = format!(
            "{}\n{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        let installed = parse_language_list(&listing);
        if let Some(missing) = languages
            .split('+')
            .find(|lang| !installed.iter().any(|l| l == lang))
        {
            return Err(OcrError::EngineUnavailable {
                engine: ENGINE.into(),
                hint: format!(
                    "language pack '{missing}' is not installed (available: {})",
                    installed.join(", ")
                ),
            });
        }

        debug!("tesseract at '{}' with languages {}", cmd, languages);
        Ok(Self {
            cmd,
            languages,
            preprocess: config.preprocess,
        })
    }

    /// Recognise the text in `image`.
    pub async fn recognise(&self, image: &DynamicImage) -> Result<String, OcrError> {
        let image = image.clone();
        let preprocess_enabled = self.preprocess;
        let png = tokio::task::spawn_blocking(move || {
            let prepared = if preprocess_enabled {
                preprocess(&image)
            } else {
                image
            };
            png_bytes(&prepared)
        })
        .await
        .map_err(|e| OcrError::Internal(format!("Preprocess task panicked: {e}")))??;

        let file = tempfile::Builder::new()
            .prefix("ocr2md-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| OcrError::Internal(format!("Cannot create temp image: {e}")))?;
        tokio::fs::write(file.path(), &png)
            .await
            .map_err(|e| OcrError::Internal(format!("Cannot write temp image: {e}")))?;

        let output = Command::new(&self.cmd)
            .arg(file.path())
            .arg("stdout")
            .args(["-l", &self.languages, "--oem", "3", "--psm", "6"])
            .output()
            .await
            .map_err(|e| spawn_error(&self.cmd, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.contains("Failed loading language") {
                return Err(OcrError::EngineUnavailable {
                    engine: ENGINE.into(),
                    hint: stderr,
                });
            }
            return Err(OcrError::EngineFailed {
                engine: ENGINE.into(),
                detail: format!("exited with {}: {}", output.status, stderr),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn spawn_error(cmd: &str, e: std::io::Error) -> OcrError {
    if e.kind() == ErrorKind::NotFound {
        OcrError::EngineUnavailable {
            engine: ENGINE.into(),
            hint: format!(
                "executable '{cmd}' not found; install tesseract-ocr or set TESSERACT_CMD"
            ),
        }
    } else {
        OcrError::EngineFailed {
            engine: ENGINE.into(),
            detail: format!("cannot run '{cmd}': {e}"),
        }
    }
}

/// Language codes from `tesseract --list-langs` output.
fn parse_language_list(listing: &str) -> Vec<String> {
    listing
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("List of available languages"))
        .filter(|l| l.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'))
        .map(str::to_string)
        .collect()
}

/// Grayscale, 1.5× upscale and linear contrast stretch.
///
/// Tesseract's LSTM models expect dark text on a light background at
/// roughly 300 DPI; pages rendered at 200 DPI gain noticeably from the
/// upscale.
pub fn preprocess(image: &DynamicImage) -> DynamicImage {
    let gray = image.to_luma8();
    let (w, h) = gray.dimensions();

    let gray = if (w.max(h) as f32 * 1.5) as u32 <= MAX_UPSCALED_EDGE {
        let nw = (w as f32 * 1.5).round() as u32;
        let nh = (h as f32 * 1.5).round() as u32;
        image::imageops::resize(&gray, nw.max(1), nh.max(1), FilterType::Triangle)
    } else {
        gray
    };

    DynamicImage::ImageLuma8(stretch_contrast(gray))
}

fn stretch_contrast(mut gray: GrayImage) -> GrayImage {
    let (lo, hi) = gray
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p.0[0]), hi.max(p.0[0])));
    if hi <= lo {
        return gray;
    }
    let span = (hi - lo) as f32;
    for p in gray.pixels_mut() {
        p.0[0] = (((p.0[0] - lo) as f32 / span) * 255.0).round() as u8;
    }
    gray
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbImage};

    #[test]
    fn parses_language_listing() {
        let listing = "List of available languages in \"/usr/share/tessdata/\" (3):\neng\nara\nosd\n";
        assert_eq!(parse_language_list(listing), vec!["eng", "ara", "osd"]);
    }

    #[test]
    fn preprocess_upscales_and_grays() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(100, 40, Rgb([120, 30, 200])));
        let out = preprocess(&img);
        assert_eq!((out.width(), out.height()), (150, 60));
        assert!(matches!(out, DynamicImage::ImageLuma8(_)));
    }

    #[test]
    fn contrast_is_stretched_to_full_range() {
        let mut gray = GrayImage::from_pixel(4, 1, Luma([100]));
        gray.put_pixel(0, 0, Luma([50]));
        gray.put_pixel(3, 0, Luma([150]));
        let out = stretch_contrast(gray);
        assert_eq!(out.get_pixel(0, 0).0[0], 0);
        assert_eq!(out.get_pixel(3, 0).0[0], 255);
        assert_eq!(out.get_pixel(1, 0).0[0], 128);
    }

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let config = ExtractionConfig::builder()
            .tesseract_cmd("/nonexistent/ocr2md-tesseract")
            .build()
            .unwrap();
        let err = TesseractEngine::probe(&config).await.unwrap_err();
        assert!(matches!(err, OcrError::EngineUnavailable { .. }), "got: {err:?}");
    }
}
