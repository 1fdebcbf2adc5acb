//! Tolerant BibTeX parser
//!
//! Accepts `{…}` and `(…)` entry delimiters, brace-nested and quoted
//! values, bare numbers, `@string` macros with `#` concatenation, and the
//! standard three-letter month macros. Field names and entry types are
//! case-insensitive. Unknown fields are kept as extras; `@comment`,
//! `@preamble`, `@string`, and free text are kept as opaque blocks.
//! Structural errors are fatal and report the offending line.

use super::{Bibliography, Block};
use bibmend_common::fields::month_macro;
use bibmend_common::normalize::collapse_whitespace;
use bibmend_common::{Entry, Error, FieldName, Result};
use std::collections::HashMap;

pub fn parse(input: &str) -> Result<Bibliography> {
    let mut cursor = Cursor::new(input);
    let mut strings: HashMap<String, String> = HashMap::new();
    let mut blocks = Vec::new();

    loop {
        let free_text = cursor.take_until_at();
        let free_text = free_text.trim();
        if !free_text.is_empty() {
            blocks.push(Block::Opaque(free_text.to_string()));
        }
        if cursor.eof() {
            break;
        }

        let block_start = cursor.pos;
        cursor.bump();
        let name = cursor.ident();
        if name.is_empty() {
            return Err(cursor.error("expected a block type after '@'"));
        }
        match name.to_ascii_lowercase().as_str() {
            "comment" | "preamble" => {
                cursor.skip_whitespace();
                cursor.consume_balanced()?;
                blocks.push(Block::Opaque(cursor.slice(block_start, cursor.pos)));
            }
            "string" => {
                let (name, value) = parse_string_definition(&mut cursor, &strings)?;
                strings.insert(name, value);
                blocks.push(Block::Opaque(cursor.slice(block_start, cursor.pos)));
            }
            entry_type => {
                blocks.push(Block::Entry(parse_entry(
                    &mut cursor,
                    entry_type,
                    &strings,
                )?));
            }
        }
    }

    Ok(Bibliography { blocks })
}

fn parse_entry(
    cursor: &mut Cursor,
    entry_type: &str,
    strings: &HashMap<String, String>,
) -> Result<Entry> {
    cursor.skip_whitespace();
    let close = cursor.open_delimiter("entry body")?;

    cursor.skip_whitespace();
    let mut key = String::new();
    loop {
        match cursor.peek() {
            None => return Err(cursor.error("unterminated entry")),
            Some(',') => {
                cursor.bump();
                break;
            }
            Some(c) if c == close => break,
            Some(c) => {
                key.push(c);
                cursor.bump();
            }
        }
    }
    let key = key.trim();
    if key.is_empty() {
        return Err(cursor.error("entry has no citation key"));
    }
    let mut entry = Entry::new(entry_type, key);

    loop {
        cursor.skip_whitespace();
        match cursor.peek() {
            None => return Err(cursor.error(format!("unterminated entry '{}'", entry.key))),
            Some(c) if c == close => {
                cursor.bump();
                break;
            }
            // Trailing or doubled separators are accepted.
            Some(',') => {
                cursor.bump();
                continue;
            }
            _ => {}
        }

        let name = cursor.ident().to_ascii_lowercase();
        if name.is_empty() {
            return Err(cursor.error(format!(
                "expected a field name in entry '{}'",
                entry.key
            )));
        }
        cursor.skip_whitespace();
        if cursor.peek() != Some('=') {
            return Err(cursor.error(format!("expected '=' after field '{}'", name)));
        }
        cursor.bump();
        let value = parse_value(cursor, strings)?;
        match FieldName::parse(&name) {
            Some(field) => entry.fields.set(field, value),
            None => {
                entry.extra.insert(name, value);
            }
        }
    }

    Ok(entry)
}

/// `@string{name = value}`; the value may itself reference earlier macros.
fn parse_string_definition(
    cursor: &mut Cursor,
    strings: &HashMap<String, String>,
) -> Result<(String, String)> {
    cursor.skip_whitespace();
    let close = cursor.open_delimiter("@string")?;
    cursor.skip_whitespace();
    let name = cursor.ident().to_ascii_lowercase();
    if name.is_empty() {
        return Err(cursor.error("expected a name in @string"));
    }
    cursor.skip_whitespace();
    if cursor.peek() != Some('=') {
        return Err(cursor.error(format!("expected '=' after @string name '{}'", name)));
    }
    cursor.bump();
    let value = parse_value(cursor, strings)?;
    cursor.skip_whitespace();
    if cursor.peek() != Some(close) {
        return Err(cursor.error(format!("unterminated @string '{}'", name)));
    }
    cursor.bump();
    Ok((name, value))
}

/// One field value: `#`-joined parts, each braced, quoted, a bare number,
/// or a macro reference. Whitespace runs collapse to single spaces so
/// hard-wrapped values come out on one line.
fn parse_value(cursor: &mut Cursor, strings: &HashMap<String, String>) -> Result<String> {
    let mut value = String::new();
    loop {
        cursor.skip_whitespace();
        match cursor.peek() {
            Some('{') => value.push_str(&cursor.braced_text()?),
            Some('"') => value.push_str(&cursor.quoted_text()?),
            Some(c) if is_token_char(c) => {
                let token = cursor.bare_token();
                if token.chars().all(|c| c.is_ascii_digit()) {
                    value.push_str(&token);
                } else {
                    let expansion = strings
                        .get(&token.to_ascii_lowercase())
                        .map(String::as_str)
                        .or_else(|| month_macro(&token));
                    match expansion {
                        Some(expansion) => value.push_str(expansion),
                        None => {
                            return Err(cursor.error(format!("undefined string '{}'", token)))
                        }
                    }
                }
            }
            _ => return Err(cursor.error("expected a field value")),
        }
        cursor.skip_whitespace();
        if cursor.peek() == Some('#') {
            cursor.bump();
            continue;
        }
        break;
    }
    Ok(collapse_whitespace(&value))
}

fn is_token_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':' | '+')
}

struct Cursor {
    chars: Vec<char>,
    pos: usize,
    line: usize,
}

impl Cursor {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
            line: 1,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn eof(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn slice(&self, start: usize, end: usize) -> String {
        self.chars[start..end].iter().collect()
    }

    fn error(&self, message: impl std::fmt::Display) -> Error {
        Error::Parse(format!("line {}: {}", self.line, message))
    }

    /// Everything up to the next `@` (or end of input).
    fn take_until_at(&mut self) -> String {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c != '@') {
            self.bump();
        }
        self.slice(start, self.pos)
    }

    /// Identifier for entry types, field names, and macro names.
    fn ident(&mut self) -> String {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_' || c == '-') {
            self.bump();
        }
        self.slice(start, self.pos)
    }

    /// Bare value token (number or macro reference).
    fn bare_token(&mut self) -> String {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if is_token_char(c)) {
            self.bump();
        }
        self.slice(start, self.pos)
    }

    /// Consume the opening delimiter of a block, returning its closer.
    fn open_delimiter(&mut self, what: &str) -> Result<char> {
        match self.bump() {
            Some('{') => Ok('}'),
            Some('(') => Ok(')'),
            _ => Err(self.error(format!("expected '{{' to open {}", what))),
        }
    }

    /// Braced value: consumes the outer braces, keeps inner ones verbatim.
    fn braced_text(&mut self) -> Result<String> {
        let open_line = self.line;
        self.bump();
        let mut depth = 1usize;
        let mut text = String::new();
        loop {
            match self.bump() {
                None => {
                    return Err(Error::Parse(format!(
                        "line {}: unterminated braced value",
                        open_line
                    )))
                }
                Some('{') => {
                    depth += 1;
                    text.push('{');
                }
                Some('}') => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(text);
                    }
                    text.push('}');
                }
                Some(c) => text.push(c),
            }
        }
    }

    /// Quoted value: braces may nest inside, and a quote inside braces
    /// does not close the value.
    fn quoted_text(&mut self) -> Result<String> {
        let open_line = self.line;
        self.bump();
        let mut depth = 0usize;
        let mut text = String::new();
        loop {
            match self.bump() {
                None => {
                    return Err(Error::Parse(format!(
                        "line {}: unterminated quoted value",
                        open_line
                    )))
                }
                Some('"') if depth == 0 => return Ok(text),
                Some(c) => {
                    match c {
                        '{' => depth += 1,
                        '}' => depth = depth.saturating_sub(1),
                        _ => {}
                    }
                    text.push(c);
                }
            }
        }
    }

    /// Consume a `{…}` or `(…)` block wholesale (for @comment/@preamble).
    fn consume_balanced(&mut self) -> Result<()> {
        let open_line = self.line;
        let close = self.open_delimiter("block")?;
        let open = if close == '}' { '{' } else { '(' };
        let mut depth = 1usize;
        loop {
            match self.bump() {
                None => {
                    return Err(Error::Parse(format!(
                        "line {}: unterminated block",
                        open_line
                    )))
                }
                Some(c) if c == open => depth += 1,
                Some(c) if c == close => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                Some(_) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_entry(input: &str) -> Entry {
        let bibliography = parse(input).expect("parse failure");
        let mut entries = bibliography.entries();
        let entry = entries.next().expect("no entry parsed").clone();
        assert!(entries.next().is_none(), "more than one entry");
        entry
    }

    #[test]
    fn parses_a_standard_entry() {
        let entry = single_entry(
            r#"@Article{Abels2011,
                Title = {Pseudodifferential and Singular Integral Operators},
                Author = {Abels, Helmut},
                Publisher = {De Gruyter},
                Year = 2011,
                doi = {10.1515/9783110250312}
            }"#,
        );
        assert_eq!(entry.entry_type, "article");
        assert_eq!(entry.key, "Abels2011");
        assert_eq!(
            entry.title(),
            Some("Pseudodifferential and Singular Integral Operators")
        );
        assert_eq!(entry.fields.get(FieldName::Year), Some("2011"));
        assert_eq!(
            entry.doi(),
            Some("10.1515/9783110250312".to_string())
        );
    }

    #[test]
    fn nested_braces_and_quotes_are_kept() {
        let entry = single_entry(
            r#"@book{knuth86, title = "The {\TeX}book", author = {Knuth, Donald E.}}"#,
        );
        assert_eq!(entry.title(), Some(r"The {\TeX}book"));
    }

    #[test]
    fn hard_wrapped_values_collapse_to_one_line() {
        let entry = single_entry(
            "@misc{wrapped, note = {spread\n          over three\n          lines}}",
        );
        assert_eq!(
            entry.fields.get(FieldName::Note),
            Some("spread over three lines")
        );
    }

    #[test]
    fn string_macros_expand_with_concatenation() {
        let bibliography = parse(
            r#"@string{jde = "Journal of Differential Equations"}
@article{a1, journal = jde, month = jan # "~15"}"#,
        )
        .expect("parse failure");
        let entry = bibliography.entries().next().expect("entry");
        assert_eq!(
            entry.fields.get(FieldName::Journal),
            Some("Journal of Differential Equations")
        );
        assert_eq!(entry.fields.get(FieldName::Month), Some("January~15"));
    }

    #[test]
    fn undefined_macro_is_fatal_with_a_line_number() {
        let err = parse("@article{a1,\n  journal = jde,\n}")
            .err()
            .expect("expected parse failure");
        let message = err.to_string();
        assert!(message.contains("undefined string 'jde'"), "{}", message);
        assert!(message.contains("line 2"), "{}", message);
    }

    #[test]
    fn unknown_fields_become_extras() {
        let entry = single_entry(
            "@article{a1, title = {T}, keywords = {fluid dynamics}, archiveprefix = {arXiv}}",
        );
        assert_eq!(
            entry.extra.get("keywords").map(String::as_str),
            Some("fluid dynamics")
        );
        assert_eq!(
            entry.extra.get("archiveprefix").map(String::as_str),
            Some("arXiv")
        );
    }

    #[test]
    fn nonstandard_types_and_paren_delimiters_are_accepted() {
        let entry = single_entry("@customtype(weird-key, title = {Whatever})");
        assert_eq!(entry.entry_type, "customtype");
        assert_eq!(entry.key, "weird-key");
        assert_eq!(entry.title(), Some("Whatever"));
    }

    #[test]
    fn comments_preambles_and_free_text_are_preserved() {
        let input = r#"This file was created by hand.

@comment{jabref-meta: databaseType:bibtex;}
@preamble{"\newcommand{\noop}[1]{}"}
@article{a1, title = {T}}"#;
        let bibliography = parse(input).expect("parse failure");
        let opaque: Vec<&str> = bibliography
            .blocks
            .iter()
            .filter_map(|block| match block {
                Block::Opaque(text) => Some(text.as_str()),
                Block::Entry(_) => None,
            })
            .collect();
        assert_eq!(opaque.len(), 3);
        assert_eq!(opaque[0], "This file was created by hand.");
        assert_eq!(opaque[1], "@comment{jabref-meta: databaseType:bibtex;}");
        assert!(opaque[2].starts_with("@preamble"));
        assert_eq!(bibliography.entry_count(), 1);
    }

    #[test]
    fn trailing_comma_and_missing_final_comma_both_parse() {
        let with = single_entry("@misc{m1, title = {A},}");
        let without = single_entry("@misc{m2, title = {A}}");
        assert_eq!(with.title(), without.title());
    }

    #[test]
    fn entry_without_fields_parses() {
        let entry = single_entry("@misc{lonely}");
        assert_eq!(entry.key, "lonely");
        assert!(entry.fields.is_empty());
    }

    #[test]
    fn unterminated_entry_reports_the_open_line() {
        let err = parse("@article{a1,\n  title = {Unclosed")
            .err()
            .expect("expected parse failure");
        assert!(matches!(err, Error::Parse(_)));
        assert!(err.to_string().contains("line 2"), "{}", err);
    }

    #[test]
    fn field_names_and_types_are_case_insensitive() {
        let entry = single_entry("@ARTICLE{a1, TITLE = {T}, JOURNAL = {J}}");
        assert_eq!(entry.entry_type, "article");
        assert_eq!(entry.title(), Some("T"));
        assert_eq!(entry.fields.get(FieldName::Journal), Some("J"));
    }
}
