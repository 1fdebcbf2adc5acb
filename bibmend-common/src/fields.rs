//! Field names recognized by the lookup and merge machinery
//!
//! BibTeX entries may carry arbitrary fields; only the fields listed here
//! participate in lookups and merging. Anything else is preserved verbatim
//! by the parser/writer as an extra field.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A recognized bibliographic field.
///
/// Variants are ordered alphabetically so that ordered maps keyed by
/// `FieldName` iterate in the writer's canonical field order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldName {
    Address,
    Author,
    Booktitle,
    Doi,
    Edition,
    Editor,
    Howpublished,
    Institution,
    Isbn,
    Issn,
    Journal,
    Month,
    Note,
    Number,
    Organization,
    Pages,
    Publisher,
    School,
    Series,
    Title,
    Type,
    Url,
    Volume,
    Year,
}

impl FieldName {
    /// Every recognized field, in canonical (alphabetical) order.
    pub const ALL: [FieldName; 24] = [
        FieldName::Address,
        FieldName::Author,
        FieldName::Booktitle,
        FieldName::Doi,
        FieldName::Edition,
        FieldName::Editor,
        FieldName::Howpublished,
        FieldName::Institution,
        FieldName::Isbn,
        FieldName::Issn,
        FieldName::Journal,
        FieldName::Month,
        FieldName::Note,
        FieldName::Number,
        FieldName::Organization,
        FieldName::Pages,
        FieldName::Publisher,
        FieldName::School,
        FieldName::Series,
        FieldName::Title,
        FieldName::Type,
        FieldName::Url,
        FieldName::Volume,
        FieldName::Year,
    ];

    /// Lowercase BibTeX name of this field.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldName::Address => "address",
            FieldName::Author => "author",
            FieldName::Booktitle => "booktitle",
            FieldName::Doi => "doi",
            FieldName::Edition => "edition",
            FieldName::Editor => "editor",
            FieldName::Howpublished => "howpublished",
            FieldName::Institution => "institution",
            FieldName::Isbn => "isbn",
            FieldName::Issn => "issn",
            FieldName::Journal => "journal",
            FieldName::Month => "month",
            FieldName::Note => "note",
            FieldName::Number => "number",
            FieldName::Organization => "organization",
            FieldName::Pages => "pages",
            FieldName::Publisher => "publisher",
            FieldName::School => "school",
            FieldName::Series => "series",
            FieldName::Title => "title",
            FieldName::Type => "type",
            FieldName::Url => "url",
            FieldName::Volume => "volume",
            FieldName::Year => "year",
        }
    }

    /// Parse a field name, case-insensitive. Returns `None` for fields the
    /// lookup machinery does not know about.
    pub fn parse(name: &str) -> Option<FieldName> {
        let lower = name.to_ascii_lowercase();
        FieldName::ALL
            .iter()
            .copied()
            .find(|field| field.as_str() == lower)
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical month field values, used when expanding the standard BibTeX
/// month macros and when mapping numeric months from provider payloads.
pub const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Month name for a 1-based month number.
pub fn month_name(month: u32) -> Option<&'static str> {
    let index = month.checked_sub(1)? as usize;
    MONTH_NAMES.get(index).copied()
}

/// Expand one of the standard three-letter month macros (`jan` .. `dec`).
pub fn month_macro(name: &str) -> Option<&'static str> {
    MONTH_NAMES
        .iter()
        .find(|full| full[..3].eq_ignore_ascii_case(name))
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_roundtrips_every_field() {
        for field in FieldName::ALL {
            assert_eq!(FieldName::parse(field.as_str()), Some(field));
        }
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(FieldName::parse("TITLE"), Some(FieldName::Title));
        assert_eq!(FieldName::parse("BookTitle"), Some(FieldName::Booktitle));
    }

    #[test]
    fn parse_rejects_unknown_fields() {
        assert_eq!(FieldName::parse("keywords"), None);
        assert_eq!(FieldName::parse(""), None);
    }

    #[test]
    fn all_is_sorted_and_unique() {
        let mut sorted = FieldName::ALL.to_vec();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.as_slice(), &FieldName::ALL[..]);
    }

    #[test]
    fn month_lookups() {
        assert_eq!(month_name(1), Some("January"));
        assert_eq!(month_name(12), Some("December"));
        assert_eq!(month_name(0), None);
        assert_eq!(month_name(13), None);
        assert_eq!(month_macro("jan"), Some("January"));
        assert_eq!(month_macro("SEP"), Some("September"));
        assert_eq!(month_macro("janvier"), None);
    }
}
