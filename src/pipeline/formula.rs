//! Formula span detection and protection.
//!
//! A [`FormulaSpan`] is a region of text that must survive every rewrite
//! byte-for-byte: inline math (`$…$`, `\(…\)`), display math (`$$…$$`,
//! `\[…\]`) and code (fenced blocks and backtick runs, which are protected
//! the same way so that `$` inside shell snippets is never mistaken for
//! math).
//!
//! Spans are found by a single left-to-right scan, so they never overlap.
//! [`protect`] swaps each span for an opaque placeholder made of
//! private-use code points; prose rules then run on the protected text and
//! [`restore`] puts the spans back.

use std::ops::Range;

const PLACEHOLDER_OPEN: char = '\u{E000}';
const PLACEHOLDER_CLOSE: char = '\u{E001}';

/// What a protected span contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanKind {
    /// `$…$` or `\(…\)`
    InlineMath,
    /// `$$…$$` or `\[…\]`
    DisplayMath,
    /// Fenced code block or inline backtick code.
    Code,
}

/// A protected region of a text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormulaSpan {
    pub kind: SpanKind,
    /// Byte range of the whole span, delimiters included.
    pub range: Range<usize>,
    /// The span exactly as it appeared in the source.
    pub raw: String,
    /// Byte range of the body inside `raw`.
    body: Range<usize>,
}

impl FormulaSpan {
    /// The text between the delimiters.
    pub fn body(&self) -> &str {
        &self.raw[self.body.clone()]
    }

    pub fn is_math(&self) -> bool {
        self.kind != SpanKind::Code
    }

    /// True when the span already uses the `$` / `$$` convention.
    pub fn is_canonical(&self) -> bool {
        match self.kind {
            SpanKind::InlineMath => self.raw.starts_with('$'),
            SpanKind::DisplayMath => self.raw.starts_with("$$"),
            SpanKind::Code => true,
        }
    }

    /// The span rewritten to the `$…$` / `$$…$$` convention.
    ///
    /// The body is never touched. When the body cannot be expressed with
    /// dollar delimiters without changing how it would be re-read (leading
    /// or trailing blanks, embedded `$`, a digit right after the span), the
    /// original delimiters are kept.
    pub fn normalized(&self, next_char: Option<char>) -> String {
        if self.is_canonical() {
            return self.raw.clone();
        }
        let body = self.body();
        match self.kind {
            SpanKind::InlineMath => {
                let convertible = !body.is_empty()
                    && !body.contains('$')
                    && !body.contains('\n')
                    && !body.starts_with(char::is_whitespace)
                    && !body.ends_with(char::is_whitespace)
                    && !body.ends_with('\\')
                    && !next_char.is_some_and(|c| c.is_ascii_digit());
                if convertible {
                    format!("${body}$")
                } else {
                    self.raw.clone()
                }
            }
            SpanKind::DisplayMath => {
                if body.trim().is_empty() || body.contains("$$") {
                    self.raw.clone()
                } else {
                    format!("$${body}$$")
                }
            }
            SpanKind::Code => self.raw.clone(),
        }
    }
}

/// Find every protected span in `text`, in order.
pub fn find_spans(text: &str) -> Vec<FormulaSpan> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let at_line_start = i == 0 || bytes[i - 1] == b'\n';

        if at_line_start {
            if let Some(end) = fenced_block_end(text, i) {
                spans.push(make_span(text, SpanKind::Code, i..end, 0, 0));
                i = end;
                continue;
            }
        }

        match bytes[i] {
            b'\\' => match bytes.get(i + 1) {
                Some(b'(') => {
                    if let Some(close) = find_from(text, i + 2, "\\)", false) {
                        let end = close + 2;
                        spans.push(make_span(text, SpanKind::InlineMath, i..end, 2, 2));
                        i = end;
                    } else {
                        i += 2;
                    }
                }
                Some(b'[') => {
                    if let Some(close) = find_from(text, i + 2, "\\]", true) {
                        let end = close + 2;
                        spans.push(make_span(text, SpanKind::DisplayMath, i..end, 2, 2));
                        i = end;
                    } else {
                        i += 2;
                    }
                }
                // Escaped character (`\$`, `\\`, …) is literal text.
                Some(_) => i += 2,
                None => i += 1,
            },
            b'$' if bytes.get(i + 1) == Some(&b'$') => {
                match find_from(text, i + 2, "$$", true) {
                    Some(close) if !text[i + 2..close].trim().is_empty() => {
                        let end = close + 2;
                        spans.push(make_span(text, SpanKind::DisplayMath, i..end, 2, 2));
                        i = end;
                    }
                    _ => i += 2,
                }
            }
            b'$' => {
                if let Some(end) = inline_dollar_end(bytes, i) {
                    spans.push(make_span(text, SpanKind::InlineMath, i..end, 1, 1));
                    i = end;
                } else {
                    i += 1;
                }
            }
            b'`' => {
                let run = bytes[i..].iter().take_while(|&&b| b == b'`').count();
                match find_backtick_run(bytes, i + run, run) {
                    Some(close) => {
                        let end = close + run;
                        spans.push(make_span(text, SpanKind::Code, i..end, run, run));
                        i = end;
                    }
                    None => i += run,
                }
            }
            _ => i += 1,
        }
    }

    spans
}

fn make_span(
    text: &str,
    kind: SpanKind,
    range: Range<usize>,
    open_len: usize,
    close_len: usize,
) -> FormulaSpan {
    let raw = text[range.clone()].to_string();
    let body = open_len..raw.len() - close_len;
    FormulaSpan {
        kind,
        range,
        raw,
        body,
    }
}

/// Byte offset of `needle` at or after `from`, skipping backslash escapes.
/// With `multiline = false` the search stops at the end of the line.
fn find_from(text: &str, from: usize, needle: &str, multiline: bool) -> Option<usize> {
    let bytes = text.as_bytes();
    let n = needle.as_bytes();
    let mut j = from;
    while j + n.len() <= bytes.len() {
        if !multiline && bytes[j] == b'\n' {
            return None;
        }
        if bytes[j..].starts_with(n) {
            return Some(j);
        }
        if bytes[j] == b'\\' && n[0] != b'\\' {
            j += 2;
            continue;
        }
        j += 1;
    }
    None
}

/// End (exclusive) of a `$…$` span opening at `start`, if it is one.
///
/// Rules: the opening `$` must be followed by a non-blank character, the
/// closing `$` must be preceded by a non-blank character and not followed
/// by a digit, and both must sit on the same line. This keeps prices such
/// as "$5 and $6" out of math mode.
fn inline_dollar_end(bytes: &[u8], start: usize) -> Option<usize> {
    let first = *bytes.get(start + 1)?;
    if first.is_ascii_whitespace() || first == b'$' {
        return None;
    }
    let mut j = start + 1;
    while j < bytes.len() {
        match bytes[j] {
            b'\n' => return None,
            b'\\' => j += 2,
            b'$' => {
                let prev = bytes[j - 1];
                let next = bytes.get(j + 1).copied();
                if !prev.is_ascii_whitespace() && !next.is_some_and(|b| b.is_ascii_digit()) {
                    return Some(j + 1);
                }
                j += 1;
            }
            _ => j += 1,
        }
    }
    None
}

/// Position of the next backtick run of exactly `len` backticks.
fn find_backtick_run(bytes: &[u8], from: usize, len: usize) -> Option<usize> {
    let mut j = from;
    while j < bytes.len() {
        if bytes[j] == b'`' {
            let run = bytes[j..].iter().take_while(|&&b| b == b'`').count();
            if run == len {
                return Some(j);
            }
            j += run;
        } else {
            j += 1;
        }
    }
    None
}

/// If a fenced code block opens at `line_start`, return its end offset
/// (end of the closing fence line, or end of text when unclosed).
fn fenced_block_end(text: &str, line_start: usize) -> Option<usize> {
    let line_end = text[line_start..]
        .find('\n')
        .map(|p| line_start + p)
        .unwrap_or(text.len());
    let line = &text[line_start..line_end];
    let indent = line.len() - line.trim_start_matches(' ').len();
    if indent > 3 {
        return None;
    }
    let trimmed = &line[indent..];
    let marker = trimmed.chars().next()?;
    if marker != '`' && marker != '~' {
        return None;
    }
    let fence_len = trimmed.chars().take_while(|&c| c == marker).count();
    if fence_len < 3 {
        return None;
    }
    if marker == '`' && trimmed[fence_len..].contains('`') {
        return None;
    }

    let mut pos = line_end;
    while pos < text.len() {
        let next_start = pos + 1;
        let next_end = text[next_start..]
            .find('\n')
            .map(|p| next_start + p)
            .unwrap_or(text.len());
        let candidate = text[next_start..next_end].trim();
        if candidate.len() >= fence_len && candidate.chars().all(|c| c == marker) {
            return Some(next_end);
        }
        pos = next_end;
    }
    Some(text.len())
}

/// Text with every span replaced by a placeholder, plus the spans.
#[derive(Debug, Clone)]
pub struct Protected {
    pub text: String,
    pub spans: Vec<FormulaSpan>,
}

/// Replace every protected span with an opaque single-line placeholder.
pub fn protect(text: &str) -> Protected {
    let spans = find_spans(text);
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for (n, span) in spans.iter().enumerate() {
        out.push_str(&text[cursor..span.range.start]);
        out.push_str(&placeholder(n));
        cursor = span.range.end;
    }
    out.push_str(&text[cursor..]);
    Protected { text: out, spans }
}

pub fn placeholder(n: usize) -> String {
    format!("{PLACEHOLDER_OPEN}{n}{PLACEHOLDER_CLOSE}")
}

/// Put the spans back, with math delimiters normalised when `normalize`.
pub fn restore(protected: &Protected, normalize: bool) -> String {
    let mut out = String::with_capacity(protected.text.len() + 64);
    let mut rest = protected.text.as_str();
    while let Some(open) = rest.find(PLACEHOLDER_OPEN) {
        out.push_str(&rest[..open]);
        let after = &rest[open + PLACEHOLDER_OPEN.len_utf8()..];
        let parsed = after.find(PLACEHOLDER_CLOSE).and_then(|close| {
            let n: usize = after[..close].parse().ok()?;
            let span = protected.spans.get(n)?;
            Some((span, close))
        });
        match parsed {
            Some((span, close)) => {
                let tail = &after[close + PLACEHOLDER_CLOSE.len_utf8()..];
                if normalize {
                    out.push_str(&span.normalized(tail.chars().next()));
                } else {
                    out.push_str(&span.raw);
                }
                rest = tail;
            }
            None => {
                out.push(PLACEHOLDER_OPEN);
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raws(text: &str) -> Vec<String> {
        find_spans(text).into_iter().map(|s| s.raw).collect()
    }

    #[test]
    fn finds_all_delimiter_styles() {
        let text = r"Let $a^2$ and \(b\) hold. Then $$c = d$$ and \[e\].";
        assert_eq!(raws(text), vec!["$a^2$", r"\(b\)", "$$c = d$$", r"\[e\]"]);
    }

    #[test]
    fn prices_are_not_math() {
        assert!(find_spans("It costs $5 and $6 today.").is_empty());
        assert!(find_spans("Only $ 3 $ left").is_empty());
    }

    #[test]
    fn escaped_dollar_is_literal() {
        assert!(find_spans(r"Pay \$10 now").is_empty());
    }

    #[test]
    fn display_math_spans_lines() {
        let text = "Before\n$$\n\\sum_i x_i\n$$\nAfter";
        let spans = find_spans(text);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].kind, SpanKind::DisplayMath);
        assert_eq!(spans[0].body(), "\n\\sum_i x_i\n");
    }

    #[test]
    fn code_protects_dollars() {
        let text = "Run `echo $HOME` then\n```sh\nexport A=$B\n```\nok $x$";
        let spans = find_spans(text);
        let kinds: Vec<SpanKind> = spans.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![SpanKind::Code, SpanKind::Code, SpanKind::InlineMath]);
        assert_eq!(spans[2].raw, "$x$");
    }

    #[test]
    fn normalized_converts_backslash_delimiters() {
        let spans = find_spans(r"\(x+1\) and \[y\]");
        assert_eq!(spans[0].normalized(None), "$x+1$");
        assert_eq!(spans[1].normalized(None), "$$y$$");
    }

    #[test]
    fn normalized_keeps_unsafe_bodies() {
        let spans = find_spans(r"\( x \) and \(y\)");
        assert_eq!(spans[0].normalized(None), r"\( x \)");
        // A digit right after `$y$` would stop it from re-reading as math.
        assert_eq!(spans[1].normalized(Some('2')), r"\(y\)");
    }

    #[test]
    fn protect_restore_round_trip() {
        let text = "A $x$ B\n$$\ny\n$$\n`c` \\(d\\)";
        let p = protect(text);
        assert!(!p.text.contains('$'));
        assert_eq!(restore(&p, false), text);
    }

    #[test]
    fn unclosed_fence_protects_rest() {
        let text = "intro\n```\n$not math";
        let spans = find_spans(text);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].kind, SpanKind::Code);
        assert_eq!(spans[0].range.end, text.len());
    }
}
