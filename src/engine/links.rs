//! Repair of URLs and e-mail addresses mangled by local OCR.
//!
//! Character recognisers read `//` as `II`, split a host from its top-level
//! domain with a blank and turn dots into commas. Only text that already
//! looks like a link is touched.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

const TLDS: &str = "com|org|net|edu|gov|io";

static RE_SCHEME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(https?)[:;.,]?(?:[Il1|\\/]{2})").expect("valid scheme regex")
});

static RE_WWW: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bwww\.").expect("valid www regex"));

static RE_EMAIL_GAP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"([\w.+-])[ \t]*@[ \t]*([A-Za-z][\w.-]*?)(?:\.|[ _]+)({TLDS})\b"
    ))
    .expect("valid e-mail regex")
});

static RE_URL_TLD_GAP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)((?:https?://|www\.)[\w.-]*\w)[ _]+({TLDS})\b"
    ))
    .expect("valid url regex")
});

static RE_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\S+").expect("valid token regex"));

static RE_DOTS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.{2,}").expect("valid dots regex"));

/// Repair links in plain OCR text; other text is returned unchanged.
pub fn repair_links(text: &str) -> String {
    let s = RE_SCHEME.replace_all(text, |caps: &Captures<'_>| {
        format!("{}://", caps[1].to_lowercase())
    });
    let s = RE_WWW.replace_all(&s, "www.");
    let s = RE_EMAIL_GAP.replace_all(&s, "$1@$2.$3");
    let s = RE_URL_TLD_GAP.replace_all(&s, "$1.$2");
    RE_TOKEN
        .replace_all(&s, |caps: &Captures<'_>| repair_link_token(&caps[0]))
        .into_owned()
}

fn is_link(token: &str) -> bool {
    let lower = token.to_ascii_lowercase();
    lower.contains("://") || lower.starts_with("www.") || (token.contains('@') && token.contains('.'))
}

/// Commas and semicolons between alphanumerics become dots.
fn repair_link_token(token: &str) -> String {
    if !is_link(token) {
        return token.to_string();
    }
    let chars: Vec<char> = token.chars().collect();
    let fixed: String = chars
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            let inner = i > 0
                && i + 1 < chars.len()
                && chars[i - 1].is_alphanumeric()
                && chars[i + 1].is_alphanumeric();
            if inner && matches!(c, ',' | ';') {
                '.'
            } else {
                c
            }
        })
        .collect();
    RE_DOTS.replace_all(&fixed, ".").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_and_separators_repaired() {
        assert_eq!(
            repair_links("Visit httpsIIwww,example,com today"),
            "Visit https://www.example.com today"
        );
        assert_eq!(repair_links("HTTP:ll WWW.site.org"), "http:// www.site.org");
    }

    #[test]
    fn split_top_level_domain_joined() {
        assert_eq!(repair_links("see www.univ-rabat com."), "see www.univ-rabat.com.");
    }

    #[test]
    fn email_gaps_closed() {
        assert_eq!(repair_links("Write to john @ gmail com"), "Write to john@gmail.com");
        assert_eq!(repair_links("a.b@mail.example.org"), "a.b@mail.example.org");
    }

    #[test]
    fn prose_untouched() {
        for text in [
            "Theorem 3, part 2; see p,q and f(x)=1.",
            "meet @ noon",
            "Define the www of a graph",
            "costs 1,5 euros...",
        ] {
            assert_eq!(repair_links(text), text);
        }
    }
}
