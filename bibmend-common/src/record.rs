//! Bibliographic record model
//!
//! An [`Entry`] is one bibliography item: a citation key, an entry type, the
//! recognized fields in a [`FieldMap`], and any unrecognized fields kept
//! verbatim so file round-trips stay lossless. Fields hold trimmed,
//! non-empty strings; setting an empty value removes the field.

use crate::fields::FieldName;
use crate::normalize;
use std::collections::BTreeMap;
use std::fmt;

/// Ordered map of recognized fields to their raw string values.
///
/// Values are stored trimmed; an empty or whitespace-only value is treated
/// as absent. This is what makes "present" mean "usable" everywhere
/// downstream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    fields: BTreeMap<FieldName, String>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field. Empty values clear it instead.
    pub fn set(&mut self, name: FieldName, value: impl Into<String>) {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            self.fields.remove(&name);
        } else if trimmed.len() == value.len() {
            self.fields.insert(name, value);
        } else {
            self.fields.insert(name, trimmed.to_string());
        }
    }

    pub fn get(&self, name: FieldName) -> Option<&str> {
        self.fields.get(&name).map(String::as_str)
    }

    pub fn remove(&mut self, name: FieldName) -> Option<String> {
        self.fields.remove(&name)
    }

    pub fn contains(&self, name: FieldName) -> bool {
        self.fields.contains_key(&name)
    }

    /// True when the field holds a real value, not a `?`/empty-brace
    /// placeholder left behind for later completion.
    pub fn has_content(&self, name: FieldName) -> bool {
        match self.get(name) {
            Some(value) => !is_placeholder(value),
            None => false,
        }
    }

    /// Iterate fields in canonical (alphabetical) order.
    pub fn iter(&self) -> impl Iterator<Item = (FieldName, &str)> {
        self.fields.iter().map(|(name, value)| (*name, value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A value that marks a field as "to be filled in" rather than filled.
fn is_placeholder(value: &str) -> bool {
    let meaningful: String = value
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '{' && *c != '}')
        .collect();
    meaningful.is_empty() || meaningful.chars().all(|c| c == '?')
}

/// One person in an author or editor list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub family: String,
    pub given: Option<String>,
}

impl Author {
    pub fn new(family: impl Into<String>, given: Option<String>) -> Self {
        Self {
            family: family.into(),
            given: given.filter(|g| !g.trim().is_empty()),
        }
    }

    /// Parse a single name in either `Family, Given` or `Given Family` form.
    ///
    /// A fully-braced name (`{Barnes and Noble}`) is taken verbatim as a
    /// family name. No attempt is made to split von-particles; a bare
    /// multi-word name keeps its last word as the family name.
    pub fn parse(name: &str) -> Option<Author> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        if let Some(inner) = braced_whole(name) {
            let inner = inner.trim();
            if inner.is_empty() {
                return None;
            }
            return Some(Author::new(inner, None));
        }
        if let Some((family, given)) = name.split_once(',') {
            let family = family.trim();
            if family.is_empty() {
                return None;
            }
            let given = given.trim();
            return Some(Author::new(
                family,
                (!given.is_empty()).then(|| given.to_string()),
            ));
        }
        let mut words: Vec<&str> = name.split_whitespace().collect();
        let family = words.pop()?;
        let given = if words.is_empty() {
            None
        } else {
            Some(words.join(" "))
        };
        Some(Author::new(family, given))
    }

    /// Parse a BibTeX `and`-separated name list. `and` inside braces does
    /// not split.
    pub fn parse_list(value: &str) -> Vec<Author> {
        split_top_level_and(value)
            .into_iter()
            .filter_map(|part| Author::parse(part))
            .collect()
    }

    /// Serialize a name list back to BibTeX `and`-separated form,
    /// `Family, Given` per name.
    pub fn format_list(authors: &[Author]) -> String {
        authors
            .iter()
            .map(Author::to_string)
            .collect::<Vec<_>>()
            .join(" and ")
    }

    /// Normalized family name used for author-overlap comparison.
    pub fn family_key(&self) -> String {
        normalize::normalize_text(&self.family)
    }
}

impl fmt::Display for Author {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.given {
            Some(given) => write!(f, "{}, {}", self.family, given),
            None => f.write_str(&self.family),
        }
    }
}

/// Returns the inner text when the whole string is one braced group.
fn braced_whole(text: &str) -> Option<&str> {
    if !text.starts_with('{') || !text.ends_with('}') || text.len() < 2 {
        return None;
    }
    let mut depth = 0usize;
    for (i, ch) in text.char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 && i != text.len() - 1 {
                    return None;
                }
            }
            _ => {}
        }
    }
    if depth == 0 {
        Some(&text[1..text.len() - 1])
    } else {
        None
    }
}

/// Split on the word `and` at brace depth zero.
fn split_top_level_and(value: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let bytes = value.as_bytes();
    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => depth += 1,
            b'}' => depth = depth.saturating_sub(1),
            b'a' | b'A' if depth == 0 => {
                let is_and = value[i..]
                    .get(..3)
                    .map(|w| w.eq_ignore_ascii_case("and"))
                    .unwrap_or(false);
                let space_before = i > 0 && bytes[i - 1].is_ascii_whitespace();
                let space_after = bytes
                    .get(i + 3)
                    .map(|b| b.is_ascii_whitespace())
                    .unwrap_or(false);
                if is_and && space_before && space_after {
                    parts.push(&value[start..i - 1]);
                    i += 4;
                    start = i;
                    continue;
                }
            }
            _ => {}
        }
        i += 1;
    }
    parts.push(&value[start..]);
    parts
}

/// One bibliography entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// Citation key, unique within one bibliography.
    pub key: String,
    /// Lowercase entry type (`article`, `book`, ...). Non-standard types
    /// are kept as-is.
    pub entry_type: String,
    /// Recognized fields.
    pub fields: FieldMap,
    /// Unrecognized fields, preserved verbatim for round-trips. These do
    /// not participate in lookups or merging.
    pub extra: BTreeMap<String, String>,
}

impl Entry {
    pub fn new(entry_type: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            entry_type: entry_type.into().to_ascii_lowercase(),
            fields: FieldMap::new(),
            extra: BTreeMap::new(),
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.fields.get(FieldName::Title)
    }

    /// Normalized DOI, when the entry has a usable one.
    pub fn doi(&self) -> Option<String> {
        self.fields
            .get(FieldName::Doi)
            .and_then(normalize::normalize_doi)
    }

    /// Parsed author list; empty when the field is absent.
    pub fn authors(&self) -> Vec<Author> {
        self.fields
            .get(FieldName::Author)
            .map(Author::parse_list)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_map_drops_empty_values() {
        let mut fields = FieldMap::new();
        fields.set(FieldName::Title, "  A Title  ");
        assert_eq!(fields.get(FieldName::Title), Some("A Title"));
        fields.set(FieldName::Title, "   ");
        assert_eq!(fields.get(FieldName::Title), None);
        assert!(fields.is_empty());
    }

    #[test]
    fn placeholders_do_not_count_as_content() {
        let mut fields = FieldMap::new();
        fields.set(FieldName::Note, "??");
        fields.set(FieldName::Pages, "{}");
        fields.set(FieldName::Year, "1995");
        assert!(!fields.has_content(FieldName::Note));
        assert!(!fields.has_content(FieldName::Pages));
        assert!(!fields.has_content(FieldName::Journal));
        assert!(fields.has_content(FieldName::Year));
    }

    #[test]
    fn author_parse_handles_both_name_orders() {
        assert_eq!(
            Author::parse("Lamport, Leslie"),
            Some(Author::new("Lamport", Some("Leslie".into())))
        );
        assert_eq!(
            Author::parse("Leslie Lamport"),
            Some(Author::new("Lamport", Some("Leslie".into())))
        );
        assert_eq!(Author::parse("Aristotle"), Some(Author::new("Aristotle", None)));
        assert_eq!(Author::parse("   "), None);
    }

    #[test]
    fn author_list_respects_braces() {
        let authors = Author::parse_list("{Barnes and Noble} and Doe, Jane");
        assert_eq!(authors.len(), 2);
        assert_eq!(authors[0].family, "Barnes and Noble");
        assert_eq!(authors[1].family, "Doe");
        assert_eq!(authors[1].given.as_deref(), Some("Jane"));
    }

    #[test]
    fn author_list_formats_back_to_bibtex() {
        let authors = Author::parse_list("Knuth, Donald E. and Plass, Michael F.");
        assert_eq!(
            Author::format_list(&authors),
            "Knuth, Donald E. and Plass, Michael F."
        );
    }

    #[test]
    fn family_key_normalizes_accents() {
        let author = Author::new("Erdős", Some("Pál".into()));
        assert_eq!(author.family_key(), "erdos");
    }

    #[test]
    fn entry_doi_is_normalized() {
        let mut entry = Entry::new("article", "knuth81");
        entry
            .fields
            .set(FieldName::Doi, "https://doi.org/10.1137/0210055");
        assert_eq!(entry.doi(), Some("10.1137/0210055".to_string()));
    }
}
