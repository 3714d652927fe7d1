//! Persistence of Markdown and summaries.
//!
//! Every file is named `<stem><suffix>_<YYYYmmdd-HHMMSS-mmm>.md` and written
//! atomically: the contents go to a temp file in the target directory,
//! which is then linked into place without overwriting anything. Two runs
//! landing on the same millisecond get a `-N` counter instead of
//! clobbering each other, so the directories are append-only.

use crate::document::{MarkdownDocument, SummaryDocument};
use crate::error::OcrError;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::info;

/// Suffix appended to the stem of summary files.
pub const SUMMARY_SUFFIX: &str = "_summary";

/// Suffix appended to the stem of flashcard files.
pub const FLASHCARDS_SUFFIX: &str = "_flashcards";

/// Where extracted Markdown and summaries are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDirs {
    pub saved_markdown: PathBuf,
    pub summaries: PathBuf,
}

impl Default for OutputDirs {
    fn default() -> Self {
        Self::under("outputs")
    }
}

impl OutputDirs {
    /// `<root>/saved_markdown` and `<root>/summaries`.
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            saved_markdown: root.join("saved_markdown"),
            summaries: root.join("summaries"),
        }
    }
}

/// Keep alphanumerics, space, `_` and `-` of the file stem.
pub fn sanitise_stem(source_name: &str) -> String {
    let base = Path::new(source_name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = match base.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => base,
    };
    let cleaned: String = stem
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '_' | '-'))
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned.to_string()
    }
}

/// File name for `source_name` at the current local time.
pub fn output_file_name(source_name: &str, suffix: &str) -> String {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S-%3f");
    format!("{}{}_{}.md", sanitise_stem(source_name), suffix, stamp)
}

/// Write `contents` into `dir` under a fresh timestamped name.
///
/// # Errors
/// [`OcrError::OutputWriteFailed`] when the directory cannot be created or
/// the file cannot be written.
pub fn save(
    contents: &str,
    source_name: &str,
    dir: &Path,
    suffix: &str,
) -> Result<PathBuf, OcrError> {
    let write_err = |path: &Path, source: std::io::Error| OcrError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    std::fs::create_dir_all(dir).map_err(|e| write_err(dir, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| write_err(dir, e))?;
    tmp.write_all(contents.as_bytes())
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| write_err(tmp.path(), e))?;

    let file_name = output_file_name(source_name, suffix);
    let (stem, ext) = file_name
        .rsplit_once('.')
        .unwrap_or((file_name.as_str(), "md"));

    let mut attempt = 0u32;
    loop {
        let candidate = if attempt == 0 {
            dir.join(&file_name)
        } else {
            dir.join(format!("{stem}-{attempt}.{ext}"))
        };
        match tmp.persist_noclobber(&candidate) {
            Ok(_) => {
                info!("Wrote {}", candidate.display());
                return Ok(candidate);
            }
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                tmp = e.file;
                attempt += 1;
            }
            Err(e) => return Err(write_err(&candidate, e.error)),
        }
    }
}

/// Save extracted Markdown into `dirs.saved_markdown`.
pub fn save_markdown(doc: &MarkdownDocument, dirs: &OutputDirs) -> Result<PathBuf, OcrError> {
    save(&doc.markdown, &doc.source_name, &dirs.saved_markdown, "")
}

/// Save a summary into `dirs.summaries`.
pub fn save_summary(summary: &SummaryDocument, dirs: &OutputDirs) -> Result<PathBuf, OcrError> {
    let suffix = match summary.style {
        crate::document::SummaryStyle::Summary => SUMMARY_SUFFIX,
        crate::document::SummaryStyle::Flashcards => FLASHCARDS_SUFFIX,
    };
    save(&summary.markdown, &summary.source_name, &dirs.summaries, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn stem_is_sanitised() {
        assert_eq!(sanitise_stem("Chapter 3: Limits?.pdf"), "Chapter 3 Limits");
        assert_eq!(sanitise_stem("/tmp/dir/scan_01-a.png"), "scan_01-a");
        assert_eq!(sanitise_stem("الفصل.pdf"), "الفصل");
        assert_eq!(sanitise_stem("???.pdf"), "document");
        assert_eq!(sanitise_stem(".pdf"), "pdf");
    }

    #[test]
    fn file_name_has_timestamp() {
        let name = output_file_name("notes.pdf", SUMMARY_SUFFIX);
        let re = Regex::new(r"^notes_summary_\d{8}-\d{6}-\d{3}\.md$").unwrap();
        assert!(re.is_match(&name), "got: {name}");
    }

    #[test]
    fn save_writes_contents_and_never_clobbers() {
        let dir = tempfile::tempdir().unwrap();
        let first = save("one", "a.pdf", dir.path(), "").unwrap();
        let second = save("two", "a.pdf", dir.path(), "").unwrap();
        assert_ne!(first, second);
        assert_eq!(std::fs::read_to_string(&first).unwrap(), "one");
        assert_eq!(std::fs::read_to_string(&second).unwrap(), "two");
        // No temp files left behind.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn save_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let dirs = OutputDirs::under(dir.path().join("outputs"));
        let doc = MarkdownDocument::new("x.png", "# X");
        let path = save_markdown(&doc, &dirs).unwrap();
        assert!(path.starts_with(&dirs.saved_markdown));
    }
}
