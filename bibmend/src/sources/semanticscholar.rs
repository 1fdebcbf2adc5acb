//! Semantic Scholar source
//!
//! Queries the Semantic Scholar Graph API
//! (https://api.semanticscholar.org/graph/v1). DOIs resolve via
//! `/paper/DOI:{doi}`; searches use `/paper/search`. The wanted fields
//! must be selected explicitly with the `fields` parameter. Unauthenticated
//! access is limited to roughly one request per second, enforced here with
//! a pacer.

use crate::sources::{
    fetch, http_client, normalize_pages, year_string, RequestPacer, MAX_RESULTS_PER_QUERY,
};
use crate::types::{
    Candidate, ParsedBatch, QueryMode, QuerySpec, RawResponse, Source, SourceError,
};
use async_trait::async_trait;
use bibmend_common::{Author, FieldName};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

/// Semantic Scholar Graph API base URL
const BASE_URL: &str = "https://api.semanticscholar.org/graph/v1";

/// Paper fields requested from the API
const FIELDS: &str = "title,authors,externalIds,year,venue,journal,url";

/// Minimum interval between requests (unauthenticated rate limit)
const REQUEST_INTERVAL: Duration = Duration::from_secs(1);

/// Fields this source can supply.
const DECLARED: [FieldName; 8] = [
    FieldName::Author,
    FieldName::Doi,
    FieldName::Journal,
    FieldName::Pages,
    FieldName::Title,
    FieldName::Url,
    FieldName::Volume,
    FieldName::Year,
];

pub struct SemanticScholarSource {
    http_client: Client,
    pacer: RequestPacer,
}

impl SemanticScholarSource {
    pub fn new() -> Self {
        Self {
            http_client: http_client(None),
            pacer: RequestPacer::new(REQUEST_INTERVAL),
        }
    }

    fn request_url(&self, spec: &QuerySpec) -> String {
        match (spec.mode, &spec.doi) {
            (QueryMode::ById, Some(doi)) => format!("{}/paper/DOI:{}", BASE_URL, doi),
            _ => format!("{}/paper/search", BASE_URL),
        }
    }

    fn query_params(&self, spec: &QuerySpec) -> Vec<(&'static str, String)> {
        let mut params = vec![("fields", FIELDS.to_string())];
        if spec.mode == QueryMode::ById {
            return params;
        }
        let mut query = spec.title.clone().unwrap_or_default();
        if !spec.authors.is_empty() {
            query.push(' ');
            query.push_str(&spec.authors.join(" "));
        }
        params.push(("query", query));
        params.push(("limit", MAX_RESULTS_PER_QUERY.to_string()));
        params
    }

    fn candidate_from(paper: Paper) -> Candidate {
        let mut candidate = Candidate::new();
        if let Some(title) = paper.title {
            candidate.set(FieldName::Title, title);
        }
        let authors: Vec<Author> = paper
            .authors
            .into_iter()
            .filter_map(|a| a.name)
            .filter_map(|name| Author::parse(&name))
            .collect();
        candidate.set_authors(&authors);
        if let Some(doi) = paper.external_ids.and_then(|ids| ids.doi) {
            candidate.set_doi(&doi);
        }
        if let Some(year) = paper.year.and_then(year_string) {
            candidate.set(FieldName::Year, year);
        }
        if let Some(journal) = paper.journal {
            if let Some(name) = journal.name {
                candidate.set(FieldName::Journal, name);
            } else if let Some(venue) = paper.venue {
                candidate.set(FieldName::Journal, venue);
            }
            if let Some(volume) = journal.volume {
                candidate.set(FieldName::Volume, volume);
            }
            if let Some(pages) = journal.pages {
                candidate.set(FieldName::Pages, normalize_pages(&pages));
            }
        } else if let Some(venue) = paper.venue {
            candidate.set(FieldName::Journal, venue);
        }
        if let Some(url) = paper.url {
            candidate.set(FieldName::Url, url);
        }
        candidate
    }
}

impl Default for SemanticScholarSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Source for SemanticScholarSource {
    fn name(&self) -> &'static str {
        "semanticscholar"
    }

    fn declared_fields(&self) -> &'static [FieldName] {
        &DECLARED
    }

    async fn execute(&self, spec: &QuerySpec) -> Result<RawResponse, SourceError> {
        self.pacer.wait().await;
        let request = self
            .http_client
            .get(self.request_url(spec))
            .query(&self.query_params(spec));
        fetch(request).await
    }

    fn parse(&self, raw: &RawResponse) -> Result<ParsedBatch, SourceError> {
        let payload: Payload = serde_json::from_slice(&raw.body).map_err(|e| {
            SourceError::Parse(format!("Failed to parse Semantic Scholar response: {}", e))
        })?;
        Ok(match payload {
            Payload::List { data, total } => {
                let candidates: Vec<Candidate> =
                    data.into_iter().map(Self::candidate_from).collect();
                let result_count = total.map(|t| t as usize).unwrap_or(candidates.len());
                ParsedBatch {
                    candidates,
                    result_count,
                }
            }
            Payload::Single(paper) => {
                ParsedBatch::from_candidates(vec![Self::candidate_from(*paper)])
            }
        })
    }
}

// ============================================================================
// Semantic Scholar API Response Types
// ============================================================================

/// `/paper/search` wraps papers in `data`; `/paper/DOI:{doi}` answers with
/// the bare paper object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Payload {
    List {
        data: Vec<Paper>,
        total: Option<u64>,
    },
    Single(Box<Paper>),
}

#[derive(Debug, Deserialize, Default)]
struct Paper {
    title: Option<String>,
    #[serde(default)]
    authors: Vec<PaperAuthor>,
    #[serde(rename = "externalIds")]
    external_ids: Option<ExternalIds>,
    year: Option<i64>,
    venue: Option<String>,
    journal: Option<Journal>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaperAuthor {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExternalIds {
    #[serde(rename = "DOI")]
    doi: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Journal {
    name: Option<String>,
    volume: Option<String>,
    pages: Option<String>,
}

// ============================================================================
// Tests
// ============================================================================
