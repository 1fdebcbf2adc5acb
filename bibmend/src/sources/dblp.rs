//! DBLP source
//!
//! Queries the DBLP publication search API
//! (https://dblp.org/search/publ/api). DBLP has no DOI endpoint, so this
//! source only runs the search modes. The JSON shape has some quirks:
//! counts arrive as strings under `@`-prefixed keys, and list-valued
//! members collapse to a bare object when there is exactly one element.

use crate::sources::{fetch, http_client, normalize_pages, MAX_RESULTS_PER_QUERY};
use crate::types::{
    Candidate, ParsedBatch, QueryMode, QuerySpec, RawResponse, Source, SourceError,
};
use async_trait::async_trait;
use bibmend_common::{Author, FieldName};
use reqwest::Client;
use serde::Deserialize;

/// DBLP publication search API URL
const BASE_URL: &str = "https://dblp.org/search/publ/api";

/// Fields this source can supply.
const DECLARED: [FieldName; 10] = [
    FieldName::Author,
    FieldName::Booktitle,
    FieldName::Doi,
    FieldName::Journal,
    FieldName::Number,
    FieldName::Pages,
    FieldName::Title,
    FieldName::Url,
    FieldName::Volume,
    FieldName::Year,
];

pub struct DblpSource {
    http_client: Client,
}

impl DblpSource {
    pub fn new() -> Self {
        Self {
            http_client: http_client(None),
        }
    }

    fn search_terms(spec: &QuerySpec) -> String {
        let mut terms = spec.title.clone().unwrap_or_default();
        for family in &spec.authors {
            terms.push(' ');
            terms.push_str(family);
        }
        terms
    }

    /// DBLP disambiguates homonymous names with a numeric suffix
    /// ("Wei Wang 0017") that has no place in a bibliography.
    fn strip_homonym_suffix(name: &str) -> &str {
        let name = name.trim_end();
        match name.rsplit_once(' ') {
            Some((base, suffix))
                if suffix.len() == 4 && suffix.chars().all(|c| c.is_ascii_digit()) =>
            {
                base.trim_end()
            }
            _ => name,
        }
    }

    fn candidate_from(info: HitInfo) -> Candidate {
        let mut candidate = Candidate::new();
        if let Some(title) = info.title {
            let title = title.strip_suffix('.').unwrap_or(&title);
            candidate.set(FieldName::Title, title);
        }
        let authors: Vec<Author> = info
            .authors
            .map(|list| list.author.into_vec())
            .unwrap_or_default()
            .into_iter()
            .filter_map(|a| Author::parse(Self::strip_homonym_suffix(a.text())))
            .collect();
        candidate.set_authors(&authors);
        if let Some(doi) = info.doi {
            candidate.set_doi(&doi);
        }
        if let Some(venue) = info.venue.map(OneOrMany::into_vec).and_then(|v| v.into_iter().next()) {
            let is_conference = info
                .publication_type
                .as_deref()
                .map(|t| t.contains("Conference"))
                .unwrap_or(false);
            if is_conference {
                candidate.set(FieldName::Booktitle, venue);
            } else {
                candidate.set(FieldName::Journal, venue);
            }
        }
        if let Some(year) = info.year.filter(|y| y.len() == 4 && y.parse::<u32>().is_ok()) {
            candidate.set(FieldName::Year, year);
        }
        if let Some(volume) = info.volume {
            candidate.set(FieldName::Volume, volume);
        }
        if let Some(number) = info.number {
            candidate.set(FieldName::Number, number);
        }
        if let Some(pages) = info.pages {
            candidate.set(FieldName::Pages, normalize_pages(&pages));
        }
        if let Some(ee) = info.ee.map(OneOrMany::into_vec).and_then(|v| v.into_iter().next()) {
            candidate.set(FieldName::Url, ee);
        }
        candidate
    }
}

impl Default for DblpSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Source for DblpSource {
    fn name(&self) -> &'static str {
        "dblp"
    }

    fn declared_fields(&self) -> &'static [FieldName] {
        &DECLARED
    }

    fn supported_modes(&self) -> &'static [QueryMode] {
        &[QueryMode::ByTitleAuthor, QueryMode::ByTitle]
    }

    async fn execute(&self, spec: &QuerySpec) -> Result<RawResponse, SourceError> {
        let request = self.http_client.get(BASE_URL).query(&[
            ("q", Self::search_terms(spec)),
            ("format", "json".to_string()),
            ("h", MAX_RESULTS_PER_QUERY.to_string()),
        ]);
        fetch(request).await
    }

    fn parse(&self, raw: &RawResponse) -> Result<ParsedBatch, SourceError> {
        let envelope: Envelope = serde_json::from_slice(&raw.body)
            .map_err(|e| SourceError::Parse(format!("Failed to parse DBLP response: {}", e)))?;
        let hits = envelope.result.hits;
        let candidates: Vec<Candidate> = hits
            .hit
            .map(OneOrMany::into_vec)
            .unwrap_or_default()
            .into_iter()
            .map(|hit| Self::candidate_from(hit.info))
            .collect();
        let result_count = hits
            .total
            .as_deref()
            .and_then(|t| t.parse::<usize>().ok())
            .unwrap_or(candidates.len());
        Ok(ParsedBatch {
            candidates,
            result_count,
        })
    }
}

// ============================================================================
// DBLP API Response Types
// ============================================================================

/// `Many` must be tried first: untagged variants are attempted in order,
/// and a derived struct also deserializes positionally from a sequence, so
/// `One` would swallow single-element arrays of struct values.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    result: SearchResult,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    hits: Hits,
}

#[derive(Debug, Deserialize)]
struct Hits {
    #[serde(rename = "@total")]
    total: Option<String>,
    hit: Option<OneOrMany<Hit>>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    info: HitInfo,
}

#[derive(Debug, Deserialize, Default)]
struct HitInfo {
    title: Option<String>,
    authors: Option<AuthorList>,
    venue: Option<OneOrMany<String>>,
    volume: Option<String>,
    number: Option<String>,
    pages: Option<String>,
    year: Option<String>,
    #[serde(rename = "type")]
    publication_type: Option<String>,
    doi: Option<String>,
    ee: Option<OneOrMany<String>>,
}

#[derive(Debug, Deserialize)]
struct AuthorList {
    author: OneOrMany<AuthorRef>,
}

/// Author entries are `{"@pid": …, "text": …}` objects in current payloads
/// but were bare strings historically.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AuthorRef {
    Structured {
        text: String,
    },
    Plain(String),
}

impl AuthorRef {
    fn text(&self) -> &str {
        match self {
            AuthorRef::Structured { text } => text,
            AuthorRef::Plain(text) => text,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
