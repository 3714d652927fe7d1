//! Document segmentation: split an input into one image per page.
//!
//! PDFs are rasterised with pdfium; PNG and JPEG inputs are decoded into a
//! single page. The whole selection is rendered before any OCR call.
//!
//! ## Why spawn_blocking?
//!
//! pdfium is a C++ library with thread-local state and rendering is
//! CPU-bound, so all pdfium work and image decoding runs on the blocking
//! pool instead of a Tokio worker.
//!
//! ## DPI and the pixel cap
//!
//! Pages are rendered at `dpi / 72` times their point size. The longest
//! edge is then capped at `max_rendered_pixels` so an A0 poster does not
//! turn into a 12,000 px bitmap.

use crate::config::{ExtractionConfig, PageSelection};
use crate::document::{Document, DocumentKind, PageImage};
use crate::error::OcrError;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// Bind to pdfium: `PDFIUM_LIB_PATH` (file or directory), then the working
/// directory, then the system library.
pub fn bind_pdfium() -> Result<Pdfium, OcrError> {
    let explicit = std::env::var("PDFIUM_LIB_PATH")
        .ok()
        .filter(|p| !p.is_empty());

    let bindings = match explicit {
        Some(path) if Path::new(&path).is_file() => Pdfium::bind_to_library(&path),
        Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir)),
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./")),
    }
    .or_else(|_| Pdfium::bind_to_system_library())
    .map_err(|e| OcrError::PdfiumBindingFailed(format!("{e:?}")))?;

    Ok(Pdfium::new(bindings))
}

/// Split `bytes` into page images according to `kind` and `config`.
///
/// # Errors
/// - [`OcrError::UnsupportedFormat`] when an image cannot be decoded
/// - [`OcrError::PasswordRequired`] / [`OcrError::WrongPassword`] for
///   encrypted PDFs
/// - [`OcrError::CorruptPdf`], [`OcrError::RasterisationFailed`]
/// - [`OcrError::PageOutOfRange`] when the selection matches no page
pub async fn segment(
    bytes: Vec<u8>,
    kind: DocumentKind,
    source_name: &str,
    config: &ExtractionConfig,
) -> Result<Document, OcrError> {
    let name = source_name.to_string();
    let dpi = config.dpi;
    let max_pixels = config.max_rendered_pixels;
    let password = config.password.clone();
    let selection = config.pages.clone();

    tokio::task::spawn_blocking(move || match kind {
        DocumentKind::Pdf => render_pdf(
            &bytes,
            &name,
            dpi,
            max_pixels,
            password.as_deref(),
            &selection,
        ),
        DocumentKind::Png | DocumentKind::Jpeg => decode_image(&bytes, &name, kind),
    })
    .await
    .map_err(|e| OcrError::Internal(format!("Segment task panicked: {e}")))?
}

/// Number of pages in a document without rendering anything.
pub async fn count_pages(
    bytes: Vec<u8>,
    kind: DocumentKind,
    source_name: &str,
    password: Option<String>,
) -> Result<usize, OcrError> {
    if kind != DocumentKind::Pdf {
        return Ok(1);
    }
    let name = source_name.to_string();
    tokio::task::spawn_blocking(move || {
        let pdfium = bind_pdfium()?;
        let document = open_pdf(&pdfium, &bytes, &name, password.as_deref())?;
        Ok(document.pages().len() as usize)
    })
    .await
    .map_err(|e| OcrError::Internal(format!("Page-count task panicked: {e}")))?
}

fn open_pdf<'a>(
    pdfium: &'a Pdfium,
    bytes: &'a [u8],
    name: &str,
    password: Option<&str>,
) -> Result<PdfDocument<'a>, OcrError> {
    pdfium.load_pdf_from_byte_slice(bytes, password).map_err(|e| {
        let err_str = format!("{e:?}");
        if err_str.contains("Password") || err_str.contains("password") {
            if password.is_some() {
                OcrError::WrongPassword { name: name.into() }
            } else {
                OcrError::PasswordRequired { name: name.into() }
            }
        } else {
            OcrError::CorruptPdf {
                name: name.into(),
                detail: err_str,
            }
        }
    })
}

fn render_pdf(
    bytes: &[u8],
    name: &str,
    dpi: u32,
    max_pixels: u32,
    password: Option<&str>,
    selection: &PageSelection,
) -> Result<Document, OcrError> {
    let pdfium = bind_pdfium()?;
    let document = open_pdf(&pdfium, bytes, name, password)?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF '{}' loaded: {} pages", name, total_pages);

    let indices = selection.to_indices(total_pages);
    if indices.is_empty() && total_pages > 0 {
        return Err(OcrError::PageOutOfRange {
            page: first_requested(selection),
            total: total_pages,
        });
    }

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(dpi as f32 / 72.0)
        .set_maximum_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut images = Vec::with_capacity(indices.len());
    for idx in indices {
        let page = pages
            .get(idx as u16)
            .map_err(|e| OcrError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{e:?}"),
            })?;

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| OcrError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{e:?}"),
            })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );
        images.push(PageImage { index: idx, image });
    }

    Ok(Document {
        source_name: name.to_string(),
        kind: DocumentKind::Pdf,
        total_pages,
        pages: images,
    })
}

fn decode_image(bytes: &[u8], name: &str, kind: DocumentKind) -> Result<Document, OcrError> {
    let image = image::load_from_memory(bytes).map_err(|e| OcrError::UnsupportedFormat {
        name: name.to_string(),
        detail: format!("cannot decode {kind} image: {e}"),
    })?;
    debug!("Decoded {} image {}x{}", kind, image.width(), image.height());
    Ok(Document {
        source_name: name.to_string(),
        kind,
        total_pages: 1,
        pages: vec![PageImage { index: 0, image }],
    })
}

fn first_requested(selection: &PageSelection) -> usize {
    match selection {
        PageSelection::All => 1,
        PageSelection::Single(p) => *p,
        PageSelection::Range(start, _) => *start,
        PageSelection::Set(pages) => pages.iter().copied().min().unwrap_or(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::encode::png_bytes;
    use image::{DynamicImage, Rgb, RgbImage};

    #[tokio::test]
    async fn image_input_is_one_page() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(12, 8, Rgb([10, 20, 30])));
        let bytes = png_bytes(&img).unwrap();
        let doc = segment(bytes, DocumentKind::Png, "scan.png", &ExtractionConfig::default())
            .await
            .unwrap();
        assert_eq!(doc.total_pages, 1);
        assert_eq!(doc.pages.len(), 1);
        assert_eq!(doc.pages[0].index, 0);
        assert_eq!((doc.pages[0].image.width(), doc.pages[0].image.height()), (12, 8));
    }

    #[tokio::test]
    async fn undecodable_image_is_unsupported() {
        let err = segment(
            b"\x89PNG\r\n\x1a\ngarbage".to_vec(),
            DocumentKind::Png,
            "bad.png",
            &ExtractionConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, OcrError::UnsupportedFormat { .. }), "got: {err:?}");
    }

    #[tokio::test]
    async fn images_count_as_one_page() {
        assert_eq!(count_pages(vec![], DocumentKind::Jpeg, "a.jpg", None).await.unwrap(), 1);
    }

    #[test]
    fn first_requested_page() {
        assert_eq!(first_requested(&PageSelection::Range(7, 9)), 7);
        assert_eq!(first_requested(&PageSelection::Set(vec![9, 4])), 4);
    }
}
