//! arXiv source
//!
//! Queries the arXiv Atom API (https://export.arxiv.org/api/query). arXiv
//! has no DOI endpoint, so this source only runs the search modes, using
//! the `ti:`/`au:` query syntax. Responses are Atom XML decoded with
//! quick-xml.

use crate::sources::{fetch, http_client, year_string, MAX_RESULTS_PER_QUERY};
use crate::types::{
    Candidate, ParsedBatch, QueryMode, QuerySpec, RawResponse, Source, SourceError,
};
use async_trait::async_trait;
use bibmend_common::fields::month_name;
use bibmend_common::normalize::collapse_whitespace;
use bibmend_common::{Author, FieldName};
use reqwest::Client;
use serde::Deserialize;

/// arXiv query API URL
const BASE_URL: &str = "https://export.arxiv.org/api/query";

/// Fields this source can supply.
const DECLARED: [FieldName; 7] = [
    FieldName::Author,
    FieldName::Doi,
    FieldName::Month,
    FieldName::Note,
    FieldName::Title,
    FieldName::Url,
    FieldName::Year,
];

pub struct ArxivSource {
    http_client: Client,
}

impl ArxivSource {
    pub fn new() -> Self {
        Self {
            http_client: http_client(None),
        }
    }

    /// arXiv search expression for one attempt. Embedded double quotes
    /// would break the phrase syntax, so they are dropped from the terms.
    fn search_query(spec: &QuerySpec) -> String {
        let title = spec
            .title
            .as_deref()
            .unwrap_or_default()
            .replace('"', "");
        if spec.authors.is_empty() {
            format!("ti:\"{}\"", title)
        } else {
            let authors = spec.authors.join(" ").replace('"', "");
            format!("ti:\"{}\" AND au:\"{}\"", title, authors)
        }
    }

    fn candidate_from(entry: FeedEntry) -> Candidate {
        let mut candidate = Candidate::new();
        // Atom titles arrive hard-wrapped.
        if let Some(title) = entry.title.map(|t| collapse_whitespace(&t)) {
            candidate.set(FieldName::Title, title);
        }
        let authors: Vec<Author> = entry
            .authors
            .into_iter()
            .filter_map(|a| a.name)
            .filter_map(|name| Author::parse(&name))
            .collect();
        candidate.set_authors(&authors);
        if let Some(doi) = entry.doi {
            candidate.set_doi(&doi);
        }
        if let Some(published) = entry.published {
            if let Some(year) = published
                .get(0..4)
                .and_then(|y| y.parse::<i64>().ok())
                .and_then(year_string)
            {
                candidate.set(FieldName::Year, year);
            }
            let month = published
                .get(5..7)
                .and_then(|m| m.parse::<u32>().ok())
                .and_then(month_name);
            if let Some(month) = month {
                candidate.set(FieldName::Month, month);
            }
        }
        if let Some(id) = entry.id {
            candidate.set(FieldName::Url, id);
        }
        if let Some(journal_ref) = entry.journal_ref {
            candidate.set(FieldName::Note, collapse_whitespace(&journal_ref));
        }
        candidate
    }
}

impl Default for ArxivSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Source for ArxivSource {
    fn name(&self) -> &'static str {
        "arxiv"
    }

    fn declared_fields(&self) -> &'static [FieldName] {
        &DECLARED
    }

    fn supported_modes(&self) -> &'static [QueryMode] {
        &[QueryMode::ByTitleAuthor, QueryMode::ByTitle]
    }

    async fn execute(&self, spec: &QuerySpec) -> Result<RawResponse, SourceError> {
        let request = self.http_client.get(BASE_URL).query(&[
            ("search_query", Self::search_query(spec)),
            ("max_results", MAX_RESULTS_PER_QUERY.to_string()),
        ]);
        fetch(request).await
    }

    fn parse(&self, raw: &RawResponse) -> Result<ParsedBatch, SourceError> {
        let feed: Feed = quick_xml::de::from_str(raw.body_str()?)
            .map_err(|e| SourceError::Parse(format!("Failed to parse arXiv feed: {}", e)))?;
        let candidates: Vec<Candidate> = feed
            .entries
            .into_iter()
            .map(Self::candidate_from)
            .collect();
        let result_count = feed.total_results.unwrap_or(candidates.len());
        Ok(ParsedBatch {
            candidates,
            result_count,
        })
    }
}

// ============================================================================
// arXiv Atom Feed Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(rename = "entry", default)]
    entries: Vec<FeedEntry>,
    // quick-xml's serde deserializer sees element names with the
    // namespace prefix stripped.
    #[serde(rename = "totalResults")]
    total_results: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct FeedEntry {
    id: Option<String>,
    title: Option<String>,
    published: Option<String>,
    #[serde(rename = "author", default)]
    authors: Vec<FeedAuthor>,
    #[serde(rename = "doi")]
    doi: Option<String>,
    #[serde(rename = "journal_ref")]
    journal_ref: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FeedAuthor {
    name: Option<String>,
}

// ============================================================================
// Tests
// ============================================================================
