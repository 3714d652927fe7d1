//! Post-processing: deterministic cleanup of OCR output into Markdown.
//!
//! Local engines return plain text and vision models return Markdown with
//! their own quirks. Either way the same cheap, deterministic rules bring
//! the text into one shape:
//!
//! - outer ` ```markdown ` fences removed
//! - `\r\n` line endings normalised
//! - `\(…\)` and `\[…\]` rewritten to `$…$` and `$$…$$`
//! - "Theorem 2.1: …" style lines promoted to `## Theorem` headings
//! - placeholder image links turned into captions
//! - GFM tables given a header separator and padded rows
//! - invisible Unicode, trailing blanks and runs of blank lines removed
//!
//! Formula and code spans are swapped for placeholders before any rule
//! runs (see [`super::formula`]), so their bodies come out byte-identical.
//! Running [`normalize_page`] on its own output changes nothing.
//!
//! ## Rule Order
//!
//! Fences are stripped before span protection so the outer fence is not
//! mistaken for a code block. Image links are dropped before theorem
//! promotion, and trailing blanks are trimmed only after every rule that
//! can delete text mid-line. Theorem promotion runs before heading spacing
//! so the new headings get their blank line.

use crate::config::PageSeparator;
use crate::document::{MarkdownDocument, PageResult};
use crate::pipeline::formula;
use once_cell::sync::Lazy;
use regex::Regex;

/// Normalise one page of engine output.
///
/// Rules (applied in order):
/// 1. Strip outer markdown fences
/// 2. Normalise line endings (CRLF → LF)
/// 3. Protect formula and code spans
/// 4. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens, etc.)
/// 5. Replace hallucinated image links with their caption
/// 6. Promote theorem-like lines to headings
/// 7. Repair GFM tables
/// 8. Trim trailing whitespace per line
/// 9. Ensure heading lines have a blank line before them
/// 10. Collapse runs of blank lines to one
/// 11. Restore spans with normalised math delimiters
/// 12. Trim the page
pub fn normalize_page(input: &str) -> String {
    let s = strip_markdown_fences(input);
    let s = normalise_line_endings(&s);

    let mut protected = formula::protect(&s);
    let s = remove_invisible_chars(&protected.text);
    let s = remove_hallucinated_images(&s);
    let s = promote_theorem_lines(&s);
    let s = normalise_tables(&s);
    let s = trim_trailing_whitespace(&s);
    let s = normalise_heading_spacing(&s);
    protected.text = collapse_blank_lines(&s);

    formula::restore(&protected, true).trim().to_string()
}

/// Join normalised pages in order with `separator` between them.
///
/// Pages with no text are skipped; the separator is never doubled and the
/// result carries no trailing newline.
pub fn assemble(pages: &[PageResult], separator: &PageSeparator) -> String {
    let mut ordered: Vec<&PageResult> = pages.iter().collect();
    ordered.sort_by_key(|p| p.page_index);

    let mut out = String::new();
    for page in ordered {
        let body = normalize_page(&page.text);
        if body.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push_str(&separator.render(page.page_num()));
        }
        out.push_str(&body);
    }
    out
}

/// Turn ordered page results into one [`MarkdownDocument`].
pub fn postprocess(
    source_name: &str,
    pages: &[PageResult],
    separator: &PageSeparator,
) -> MarkdownDocument {
    MarkdownDocument {
        source_name: source_name.to_string(),
        page_count: pages.len(),
        markdown: assemble(pages, separator),
    }
}

// ── Rule 1: Strip outer markdown fences ──────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```(?:markdown|md)?[ \t]*\n(.*)\n```\s*$").expect("valid fence regex")
});

fn strip_markdown_fences(input: &str) -> String {
    match RE_OUTER_FENCES.captures(input.trim()) {
        // Nested fences mean the page really is a code block.
        Some(caps) if !caps[1].contains("```") => caps[1].to_string(),
        _ => input.to_string(),
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 4: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 5: Remove hallucinated image links ───────────────────────────────────
//
// Vision models invent placeholder image URLs (`image-url`, `chart.png`,
// `https://example.com/image.png`) for figures they cannot transcribe.
// Keep `![alt](url)` only for absolute HTTP(S) links to a non-placeholder
// host; otherwise keep the alt text as an italic caption.

static RE_IMAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)]*)\)").expect("valid image regex"));

fn is_placeholder_url(url: &str) -> bool {
    let u = url.trim();
    if u.is_empty() {
        return true;
    }
    if !u.starts_with("http://") && !u.starts_with("https://") {
        return true;
    }
    let fake_domains = [
        "example.com",
        "placeholder.com",
        "via.placeholder.com",
        "dummyimage.com",
        "lorempixel.com",
        "picsum.photos",
        "placehold.it",
    ];
    fake_domains.iter().any(|d| u.contains(d))
}

fn remove_hallucinated_images(input: &str) -> String {
    RE_IMAGE
        .replace_all(input, |caps: &regex::Captures<'_>| {
            let alt = caps[1].trim();
            if is_placeholder_url(&caps[2]) {
                if alt.is_empty() {
                    String::new()
                } else {
                    format!("*{alt}*")
                }
            } else {
                caps[0].to_string()
            }
        })
        .to_string()
}

// ── Rule 6: Promote theorem-like lines ──────────────────────────────────────
//
// "Theorem 1: x+y=z", "**Lemma 2.3 (Zorn).** text" and "Proof. text" become
// a level-2 heading naming the environment, with the statement on the next
// line. The ordinal is dropped; a parenthesised title is kept. Lines that
// are already headings never match because they start with `#`.
//
// The terminator must be followed by a blank or the end of the line, so
// "Theorem 3.2 implies" is prose, not a heading. A statement that itself
// opens with a keyword ("Remark: Example: …") is promoted again.

static RE_THEOREM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^[ ]{0,3}(?:\*\*|__)?(theorem|lemma|corollary|proposition|definition|proof|remark|example)(?:[ \t]+\d+(?:\.\d+)*)?[ \t]*(?:\*\*|__)?[ \t]*(?:\(([^)\n]*)\))?[ \t]*(?:\*\*|__)?[ \t]*[:.](?:\*\*|__)?(?:[ \t]+(.*))?$",
    )
    .expect("valid theorem regex")
});

fn canonical_keyword(word: &str) -> String {
    let lower = word.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn promote_theorem_lines(input: &str) -> String {
    input
        .lines()
        .map(promote_theorem_line)
        .collect::<Vec<_>>()
        .join("\n")
}

fn promote_theorem_line(line: &str) -> String {
    let Some(caps) = RE_THEOREM.captures(line) else {
        return line.to_string();
    };
    let mut heading = format!("## {}", canonical_keyword(&caps[1]));
    if let Some(title) = caps.get(2).map(|m| m.as_str().trim()) {
        if !title.is_empty() {
            heading.push_str(&format!(" ({title})"));
        }
    }
    let rest = caps.get(3).map(|m| m.as_str().trim()).unwrap_or("");
    if rest.is_empty() {
        heading
    } else {
        format!("{heading}\n{}", promote_theorem_line(rest))
    }
}

// ── Rule 7: Repair GFM tables ────────────────────────────────────────────────
//
// Within each block of consecutive `|`-delimited rows: the header must be
// followed by exactly one separator row, separators anywhere else are
// dropped, and rows with fewer cells than the header are padded with empty
// cells. Longer rows are left alone so no content is lost.

fn is_table_row(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('|') && trimmed.ends_with('|') && trimmed.len() > 2
}

fn is_separator_row(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('|')
        && trimmed.contains('-')
        && trimmed
            .chars()
            .all(|c| c == '|' || c == '-' || c == ':' || c == ' ')
}

fn cell_count(line: &str) -> usize {
    let inner = line.trim().trim_start_matches('|').trim_end_matches('|');
    inner.split('|').count()
}

fn separator_row(cols: usize) -> String {
    std::iter::once("|")
        .chain(std::iter::repeat_n(" --- |", cols.max(1)))
        .collect()
}

fn normalise_table_block(block: &[&str], out: &mut Vec<String>) {
    let header = block[0];
    out.push(header.to_string());
    if block.len() == 1 {
        return;
    }
    let cols = cell_count(header);
    out.push(if is_separator_row(block[1]) {
        block[1].to_string()
    } else {
        separator_row(cols)
    });
    let body_start = if is_separator_row(block[1]) { 2 } else { 1 };
    for row in &block[body_start..] {
        if is_separator_row(row) {
            continue;
        }
        let missing = cols.saturating_sub(cell_count(row));
        let mut row = row.trim_end().to_string();
        for _ in 0..missing {
            row.push_str("  |");
        }
        out.push(row);
    }
}

fn normalise_tables(input: &str) -> String {
    let lines: Vec<&str> = input.lines().collect();
    let mut out = Vec::with_capacity(lines.len() + 4);
    let mut i = 0;
    while i < lines.len() {
        if is_table_row(lines[i]) && !is_separator_row(lines[i]) {
            let start = i;
            while i < lines.len() && is_table_row(lines[i]) {
                i += 1;
            }
            normalise_table_block(&lines[start..i], &mut out);
        } else {
            out.push(lines[i].to_string());
            i += 1;
        }
    }
    out.join("\n")
}

// ── Rule 8: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 9: Normalise heading spacing ────────────────────────────────────────

static RE_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#{1,6}(?:[ \t]|$)").expect("valid heading regex"));

fn normalise_heading_spacing(input: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for line in input.lines() {
        if RE_HEADING.is_match(line) && out.last().is_some_and(|prev| !prev.is_empty()) {
            out.push("");
        }
        out.push(line);
    }
    out.join("\n")
}

// ── Rule 10: Collapse excessive blank lines ─────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n{3,}").expect("valid blank-line regex"));

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn page(i: usize, text: &str) -> PageResult {
        PageResult::new(i, text)
    }

    #[test]
    fn test_theorem_scenario() {
        let pages = vec![page(0, "Theorem 1: x+y=z"), page(1, "QED")];
        let doc = postprocess("paper.pdf", &pages, &PageSeparator::HorizontalRule);
        assert_eq!(doc.markdown, "## Theorem\nx+y=z\n\n---\n\nQED");
        assert_eq!(doc.page_count, 2);
        assert_eq!(doc.source_name, "paper.pdf");
    }

    #[test]
    fn test_theorem_variants() {
        assert_eq!(
            promote_theorem_lines("**Lemma 2.3 (Zorn).** Every chain has a bound."),
            "## Lemma (Zorn)\nEvery chain has a bound."
        );
        assert_eq!(promote_theorem_lines("Proof. Trivial."), "## Proof\nTrivial.");
        assert_eq!(promote_theorem_lines("DEFINITION 4:"), "## Definition");
    }

    #[test]
    fn test_theorem_non_matches() {
        for line in [
            "## Theorem",
            "Examples: many",
            "Proofread the text.",
            "The theorem 1: holds",
            "Theorem 3.2 implies that f is continuous.",
            "Lemma 4.1.3 gives the bound.",
            "Proof.Trivial",
        ] {
            assert_eq!(promote_theorem_lines(line), line);
        }
    }

    #[test]
    fn test_cited_theorem_number_preserved() {
        let out = normalize_page("Theorem 3.2 implies that f is continuous.");
        assert_eq!(out, "Theorem 3.2 implies that f is continuous.");
    }

    #[test]
    fn test_nested_keywords_promoted_in_one_pass() {
        assert_eq!(
            promote_theorem_lines("Remark: Example: take n = 2."),
            "## Remark\n## Example\ntake n = 2."
        );
        let once = normalize_page("Remark: Example: take n = 2.");
        assert_eq!(once, "## Remark\n\n## Example\ntake n = 2.");
        assert_eq!(normalize_page(&once), once);
    }

    #[test]
    fn test_removed_image_leaves_no_trailing_blank() {
        assert_eq!(normalize_page("See ![](fig.png)\nNext line"), "See\nNext line");
        assert_eq!(
            normalize_page("![](a.png) Lemma 2. Bounded"),
            "## Lemma\nBounded"
        );
    }

    #[test]
    fn test_backslash_delimiters_normalised() {
        let out = normalize_page(r"Let \(a_1\) be given, then \[\sum a_i\] holds.");
        assert_eq!(out, r"Let $a_1$ be given, then $$\sum a_i$$ holds.");
    }

    #[test]
    fn test_formula_bodies_untouched() {
        // Trailing blanks and blank lines inside display math survive.
        let input = "Intro\n$$\n  a   \n\n\n\nb\n$$\nEnd\u{200B}";
        let out = normalize_page(input);
        assert!(out.contains("$$\n  a   \n\n\n\nb\n$$"), "got: {out:?}");
        assert!(out.ends_with("End"));
    }

    #[test]
    fn test_theorem_keeps_formula() {
        let out = normalize_page("Theorem 3: $x^2 \\geq 0$ for all $x$");
        assert_eq!(out, "## Theorem\n$x^2 \\geq 0$ for all $x$");
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "```markdown\n# Title\r\n\r\nSome text   \n\n\n\n## Section\n| A | B |\n| 1 |\n```",
            "Text\nTheorem 1 (Main): \\(x\\) and \\( y \\)\n![fig](fig.png)",
            "| a | b |\n| --- | --- |\n| 1 | 2 |\n| --- | --- |\n| 3 | 4 |",
            "costs $5 and \\(z\\)2 then `$HOME`",
            "See ![](fig.png)\nNext line",
            "Remark: Example: take n = 2.",
            "Theorem 3.2 implies that f is continuous.",
            "| ![](x.png) | b |\n| 1 |",
        ];
        for input in inputs {
            let once = normalize_page(input);
            assert_eq!(normalize_page(&once), once, "input: {input:?}");
        }
    }

    #[test]
    fn test_document_idempotent() {
        let pages = vec![page(0, "Lemma 1. a"), page(1, ""), page(2, "b\n\n\n")];
        let first = assemble(&pages, &PageSeparator::HorizontalRule);
        let again = assemble(&[page(0, &first)], &PageSeparator::HorizontalRule);
        assert_eq!(first, again);
        assert!(!first.ends_with('\n'));
    }

    #[test]
    fn test_empty_pages_skipped() {
        let pages = vec![page(0, "a"), page(1, "  \n "), page(2, "c")];
        assert_eq!(assemble(&pages, &PageSeparator::Comment), "a\n\n<!-- page 3 -->\n\nc");
        assert_eq!(assemble(&[page(0, "")], &PageSeparator::HorizontalRule), "");
    }

    #[test]
    fn test_strip_fences() {
        assert_eq!(strip_markdown_fences("```markdown\n# Hello\nWorld\n```"), "# Hello\nWorld");
        assert_eq!(strip_markdown_fences("```\n# Hello\nWorld\n```"), "# Hello\nWorld");
        assert_eq!(strip_markdown_fences("# Hello\nWorld"), "# Hello\nWorld");
    }

    #[test]
    fn test_code_page_not_unwrapped() {
        let input = "```\n```python\nx = 1\n```\n```";
        assert_eq!(strip_markdown_fences(input), input);
    }

    #[test]
    fn test_normalise_line_endings() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_collapse_blank_lines() {
        assert_eq!(collapse_blank_lines("a\n\n\n\n\n\nb"), "a\n\nb");
    }

    #[test]
    fn test_heading_spacing() {
        let result = normalise_heading_spacing("some text\n# Heading\nmore text");
        assert_eq!(result, "some text\n\n# Heading\nmore text");
        assert_eq!(normalise_heading_spacing("#hashtag\nx"), "#hashtag\nx");
    }

    #[test]
    fn test_fix_broken_table() {
        let result = normalise_tables("| A | B |\n| 1 | 2 |");
        let lines: Vec<&str> = result.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(is_separator_row(lines[1]));
    }

    #[test]
    fn test_table_with_separator_unchanged() {
        let input = "| H1 | H2 |\n| --- | --- |\n| a | b |\n| c | d |";
        assert_eq!(normalise_tables(input), input);
    }

    #[test]
    fn test_remove_mid_table_separator() {
        let input = "| A | B |\n| --- | --- |\n| 1 | 2 |\n| --- | --- |\n| 3 | 4 |";
        let result = normalise_tables(input);
        let sep_count = result.lines().filter(|l| is_separator_row(l)).count();
        assert_eq!(sep_count, 1);
        assert!(result.contains("| 3 | 4 |"));
    }

    #[test]
    fn test_short_rows_padded() {
        let result = normalise_tables("| A | B | C |\n| --- | --- | --- |\n| 1 |");
        let last = result.lines().last().unwrap_or_default();
        assert_eq!(cell_count(last), 3, "got: {last}");
    }

    #[test]
    fn test_remove_invisible() {
        let input = "hello\u{200B}world\u{FEFF}foo\u{00AD}bar";
        assert_eq!(remove_invisible_chars(input), "helloworldfoobar");
    }

    #[test]
    fn test_remove_hallucinated_image() {
        let result = remove_hallucinated_images("Some text\n![Chart Title](chart.png)\nMore");
        assert!(!result.contains("!["));
        assert!(result.contains("*Chart Title*"));
        let kept = remove_hallucinated_images("![Figure](https://arxiv.org/figures/fig1.png)");
        assert!(kept.contains("![Figure]"));
    }
}
