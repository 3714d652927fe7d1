//! Input resolution: load a user-supplied path or URL into memory.
//!
//! Both pdfium and the image decoder work from byte buffers, so a URL is
//! downloaded straight into memory and no temp file is needed. The
//! document kind is detected from magic bytes before returning so callers
//! get `UnsupportedFormat` rather than a decoder failure later on.

use crate::document::DocumentKind;
use crate::error::OcrError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A loaded input document.
#[derive(Debug, Clone)]
pub struct ResolvedInput {
    pub bytes: Vec<u8>,
    /// File name without directories, e.g. "chapter3.pdf".
    pub source_name: String,
    pub kind: DocumentKind,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve a local path or HTTP(S) URL to bytes, name and kind.
///
/// # Errors
/// `FileNotFound`, `PermissionDenied`, `DownloadFailed`, `DownloadTimeout`,
/// or `UnsupportedFormat` when the bytes are not a PDF, PNG or JPEG.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, OcrError> {
    let (bytes, source_name) = if is_url(input) {
        download_url(input, timeout_secs).await?
    } else {
        read_local(input).await?
    };
    from_bytes(bytes, source_name)
}

/// Detect the kind of an in-memory document.
pub fn from_bytes(bytes: Vec<u8>, source_name: String) -> Result<ResolvedInput, OcrError> {
    let kind = DocumentKind::detect(&bytes, &source_name).ok_or_else(|| {
        let head: Vec<String> = bytes.iter().take(4).map(|b| format!("{b:02x}")).collect();
        OcrError::UnsupportedFormat {
            name: source_name.clone(),
            detail: if bytes.is_empty() {
                "empty input".to_string()
            } else {
                format!("unrecognised magic bytes {}", head.join(" "))
            },
        }
    })?;
    debug!("Detected {} input '{}' ({} bytes)", kind, source_name, bytes.len());
    Ok(ResolvedInput {
        bytes,
        source_name,
        kind,
    })
}

async fn read_local(path_str: &str) -> Result<(Vec<u8>, String), OcrError> {
    let path = PathBuf::from(path_str);
    if !path.exists() {
        return Err(OcrError::FileNotFound { path });
    }

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(OcrError::PermissionDenied { path });
        }
        Err(_) => return Err(OcrError::FileNotFound { path }),
    };

    debug!("Read local input: {}", path.display());
    Ok((bytes, file_name_of(&path)))
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string())
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<(Vec<u8>, String), OcrError> {
    info!("Downloading: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| OcrError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let map_err = |e: reqwest::Error| {
        if e.is_timeout() {
            OcrError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            OcrError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(map_err)?;

    if !response.status().is_success() {
        return Err(OcrError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let filename = filename_from_url(url, content_type.as_deref());

    let bytes = response.bytes().await.map_err(map_err)?;
    info!("Downloaded {} bytes as '{}'", bytes.len(), filename);
    Ok((bytes.to_vec(), filename))
}

/// Pick a file name from the URL path, else from the content type.
fn filename_from_url(url: &str, content_type: Option<&str>) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    let ext = match content_type.map(|c| c.split(';').next().unwrap_or("").trim()) {
        Some("image/png") => "png",
        Some("image/jpeg") | Some("image/jpg") => "jpg",
        _ => "pdf",
    };
    format!("downloaded.{ext}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn filename_prefers_url_path() {
        assert_eq!(filename_from_url("https://x.org/a/ch3.pdf?dl=1", None), "ch3.pdf");
        assert_eq!(
            filename_from_url("https://x.org/scan", Some("image/png; charset=binary")),
            "downloaded.png"
        );
        assert_eq!(filename_from_url("https://x.org/", None), "downloaded.pdf");
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let err = resolve_input("/definitely/not/here.pdf", 5).await.unwrap_err();
        assert!(matches!(err, OcrError::FileNotFound { .. }), "got: {err:?}");
    }

    #[tokio::test]
    async fn text_file_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.pdf");
        std::fs::write(&path, "just some text").unwrap();
        let err = resolve_input(path.to_str().unwrap(), 5).await.unwrap_err();
        assert!(matches!(err, OcrError::UnsupportedFormat { .. }), "got: {err:?}");
    }

    #[tokio::test]
    async fn local_pdf_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paper.pdf");
        std::fs::write(&path, b"%PDF-1.4\n%%EOF\n").unwrap();
        let input = resolve_input(path.to_str().unwrap(), 5).await.unwrap();
        assert_eq!(input.kind, DocumentKind::Pdf);
        assert_eq!(input.source_name, "paper.pdf");
    }
}
