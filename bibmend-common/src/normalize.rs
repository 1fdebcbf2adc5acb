//! Text normalization for matching and query building
//!
//! Matching compares normalized text only: comparisons must not depend on
//! case, diacritics, punctuation, or whitespace layout. Query construction
//! uses the lighter [`collapse_whitespace`] / [`strip_markup`] helpers so
//! that the raw title (markup included) stays observable by the retry
//! transform.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Aggressive normalization for similarity comparison: NFKD with combining
/// marks removed, lowercased, every non-alphanumeric character treated as a
/// separator, whitespace collapsed.
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for ch in text.nfkd().filter(|c| !is_combining_mark(*c)) {
        if ch.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            for lower in ch.to_lowercase() {
                out.push(lower);
            }
        } else {
            pending_space = true;
        }
    }
    out
}

/// Collapse interior whitespace runs to single spaces and trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extract a normalized DOI from a raw field value.
///
/// Accepts bare DOIs as well as `doi:` and `https://doi.org/` style
/// prefixes. Returns `None` when the remainder does not look like a DOI
/// (`10.<registrant>/<suffix>`).
pub fn normalize_doi(raw: &str) -> Option<String> {
    let mut doi = raw.trim().to_ascii_lowercase();
    for prefix in [
        "https://",
        "http://",
        "www.",
        "dx.doi.org/",
        "doi.org/",
        "doi:",
    ] {
        if let Some(rest) = doi.strip_prefix(prefix) {
            doi = rest.to_string();
        }
    }
    let doi = doi.trim_matches('/').to_string();
    if doi.starts_with("10.") && doi.contains('/') {
        Some(doi)
    } else {
        None
    }
}

/// Strip formatting markup from a title: LaTeX commands, grouping braces,
/// math delimiters, and HTML tags. Words survive, markup does not.
///
/// Used by the retry transform: a title that queried poorly with its markup
/// intact is retried once in this stripped form.
pub fn strip_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '{' | '}' | '$' => {}
            '\\' => {
                // LaTeX command: drop the name, keep escaped symbols
                match chars.peek() {
                    Some(c) if c.is_ascii_alphabetic() => {
                        while matches!(chars.peek(), Some(c) if c.is_ascii_alphabetic()) {
                            chars.next();
                        }
                    }
                    Some(_) => {
                        if let Some(symbol) = chars.next() {
                            out.push(symbol);
                        }
                    }
                    None => {}
                }
            }
            '<' => {
                // HTML tag: skip to the closing bracket, or keep a bare '<'
                let mut skipped = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '>' {
                        closed = true;
                        break;
                    }
                    skipped.push(c);
                }
                if !closed {
                    out.push('<');
                    out.push_str(&skipped);
                }
            }
            _ => out.push(ch),
        }
    }
    collapse_whitespace(&out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_strips_case_punctuation_and_accents() {
        assert_eq!(normalize_text("Théorie des Opérateurs!"), "theorie des operateurs");
        assert_eq!(normalize_text("  A--B:  c  "), "a b c");
    }

    #[test]
    fn normalize_text_is_idempotent() {
        let once = normalize_text("Łukasiewicz, J.: On Three-Valued Logic");
        assert_eq!(normalize_text(&once), once);
    }

    #[test]
    fn normalize_doi_accepts_common_prefixes() {
        let expected = Some("10.1007/978-3-319-00000-0".to_string());
        assert_eq!(normalize_doi("10.1007/978-3-319-00000-0"), expected);
        assert_eq!(normalize_doi("DOI:10.1007/978-3-319-00000-0"), expected);
        assert_eq!(
            normalize_doi("https://doi.org/10.1007/978-3-319-00000-0"),
            expected
        );
        assert_eq!(
            normalize_doi("http://dx.doi.org/10.1007/978-3-319-00000-0"),
            expected
        );
    }

    #[test]
    fn normalize_doi_rejects_non_dois() {
        assert_eq!(normalize_doi("not a doi"), None);
        assert_eq!(normalize_doi("10.1007"), None);
        assert_eq!(normalize_doi(""), None);
    }

    #[test]
    fn strip_markup_removes_latex_and_html() {
        assert_eq!(strip_markup("{On \\emph{Strange} Loops}"), "On Strange Loops");
        assert_eq!(strip_markup("$O(n^2)$ algorithms"), "O(n^2) algorithms");
        assert_eq!(strip_markup("A <i>fancy</i> title"), "A fancy title");
        assert_eq!(strip_markup("Erd\\H{o}s problems"), "Erdos problems");
    }

    #[test]
    fn strip_markup_keeps_plain_text_unchanged() {
        assert_eq!(strip_markup("Plain title"), "Plain title");
    }
}
