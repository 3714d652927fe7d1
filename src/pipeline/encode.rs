//! Image encoding: `DynamicImage` → PNG bytes, and → base64 `ImageData`
//! for vision-model requests.
//!
//! PNG is lossless; JPEG artefacts around glyph edges hurt both local OCR
//! and vision models far more than the larger payload costs.

use crate::error::OcrError;
use crate::llm::ImageData;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode an image as PNG bytes.
pub fn png_bytes(img: &DynamicImage) -> Result<Vec<u8>, OcrError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| OcrError::Internal(format!("PNG encoding failed: {e}")))?;
    Ok(buf)
}

/// Encode a page as a base64 PNG ready for a vision-model request.
///
/// `detail: "high"` lets OpenAI-style models tile the full image; the low
/// detail mode downsamples to one 512 px tile and loses subscripts and
/// small print.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, OcrError> {
    let buf = png_bytes(img)?;
    let b64 = STANDARD.encode(&buf);
    debug!("Encoded image → {} bytes base64", b64.len());
    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}
