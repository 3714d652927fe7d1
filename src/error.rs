//! Error type for the edgequake-ocr2md library.
//!
//! Every fallible operation returns [`OcrError`]. The variants follow the
//! life of a document: input resolution, PDF segmentation, engine calls,
//! summarization and finally persistence.
//!
//! An engine that finds no text is **not** an error: `extract` returns an
//! empty string. Only [`OcrError::RemoteError`] is considered transient;
//! see [`OcrError::is_retryable`].

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the edgequake-ocr2md library.
#[derive(Debug, Error)]
pub enum OcrError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The input is neither a PDF nor a supported image.
    #[error("Unsupported document format for '{name}': {detail}\nSupported inputs: PDF, PNG, JPEG.")]
    UnsupportedFormat { name: String, detail: String },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{name}' is corrupt: {detail}")]
    CorruptPdf { name: String, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{name}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { name: String },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{name}'")]
    WrongPassword { name: String },

    /// The page selection matches no page of the document.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// pdfium returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── Engine errors ─────────────────────────────────────────────────────
    /// A local OCR engine (binary, Python package, model weights) is missing.
    #[error("OCR engine '{engine}' is unavailable: {hint}")]
    EngineUnavailable { engine: String, hint: String },

    /// A local OCR engine ran but failed on a page.
    #[error("OCR engine '{engine}' failed: {detail}")]
    EngineFailed { engine: String, detail: String },

    /// Missing or rejected credential for a remote provider. Never retried.
    #[error("Authentication error from provider '{provider}': {detail}")]
    AuthError { provider: String, detail: String },

    /// Provider quota exhausted or rate limit hit. Never retried.
    #[error("Quota exceeded for provider '{provider}': {detail}")]
    QuotaExceeded { provider: String, detail: String },

    /// Network failure, timeout or non-2xx answer from a provider.
    #[error("Remote error from provider '{provider}': {detail}")]
    RemoteError { provider: String, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OcrError {
    /// True for failures worth retrying with backoff.
    ///
    /// Credentials and quotas will not fix themselves within a few seconds,
    /// so only plain remote errors (network, timeout, 5xx) qualify.
    pub fn is_retryable(&self) -> bool {
        matches!(self, OcrError::RemoteError { .. })
    }

    /// Classify a provider failure message into auth, quota or remote error.
    pub fn from_provider_message(provider: &str, message: &str) -> Self {
        let lower = message.to_lowercase();
        let provider = provider.to_string();
        let detail = message.to_string();

        const AUTH_MARKERS: [&str; 8] = [
            "401",
            "403",
            "unauthorized",
            "unauthenticated",
            "api key",
            "api_key",
            "permission denied",
            "authentication",
        ];
        const QUOTA_MARKERS: [&str; 6] = [
            "429",
            "quota",
            "rate limit",
            "ratelimit",
            "resource exhausted",
            "resource_exhausted",
        ];

        if AUTH_MARKERS.iter().any(|m| lower.contains(m)) {
            OcrError::AuthError { provider, detail }
        } else if QUOTA_MARKERS.iter().any(|m| lower.contains(m)) {
            OcrError::QuotaExceeded { provider, detail }
        } else {
            OcrError::RemoteError { provider, detail }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_auth_failures() {
        let e = OcrError::from_provider_message("openai", "HTTP 401: Incorrect API key provided");
        assert!(matches!(e, OcrError::AuthError { .. }), "got: {e:?}");
        assert!(!e.is_retryable());
    }

    #[test]
    fn classify_quota_failures() {
        let e = OcrError::from_provider_message("gemini", "429 RESOURCE_EXHAUSTED: quota");
        assert!(matches!(e, OcrError::QuotaExceeded { .. }), "got: {e:?}");
        assert!(!e.is_retryable());
    }

    #[test]
    fn classify_other_failures_as_remote() {
        let e = OcrError::from_provider_message("gemini", "connection reset by peer");
        assert!(matches!(e, OcrError::RemoteError { .. }), "got: {e:?}");
        assert!(e.is_retryable());
    }

    #[test]
    fn unsupported_format_display() {
        let e = OcrError::UnsupportedFormat {
            name: "notes.docx".into(),
            detail: "unknown magic bytes".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("notes.docx"), "got: {msg}");
        assert!(msg.contains("PDF, PNG, JPEG"));
    }

    #[test]
    fn auth_error_display() {
        let e = OcrError::AuthError {
            provider: "gemini".into(),
            detail: "GEMINI_API_KEY is not set".into(),
        };
        assert!(e.to_string().contains("gemini"));
        assert!(e.to_string().contains("GEMINI_API_KEY"));
    }
}
