//! OpenAlex source
//!
//! Queries the OpenAlex works API (https://api.openalex.org). DOIs resolve
//! directly via `/works/https://doi.org/{doi}` (404 = unknown DOI); title
//! searches use the `search` parameter with an optional raw-author-name
//! filter. A configured contact address is forwarded as the `mailto`
//! parameter for the polite pool.

use crate::sources::{fetch, http_client, join_pages, year_string, MAX_RESULTS_PER_QUERY};
use crate::types::{
    Candidate, ParsedBatch, QueryMode, QuerySpec, RawResponse, Source, SourceError,
};
use async_trait::async_trait;
use bibmend_common::{Author, FieldName};
use reqwest::Client;
use serde::Deserialize;

/// OpenAlex API base URL
const BASE_URL: &str = "https://api.openalex.org";

/// Fields this source can supply.
const DECLARED: [FieldName; 11] = [
    FieldName::Author,
    FieldName::Doi,
    FieldName::Issn,
    FieldName::Journal,
    FieldName::Number,
    FieldName::Pages,
    FieldName::Publisher,
    FieldName::Title,
    FieldName::Url,
    FieldName::Volume,
    FieldName::Year,
];

pub struct OpenAlexSource {
    http_client: Client,
    mailto: Option<String>,
}

impl OpenAlexSource {
    pub fn new(mailto: Option<&str>) -> Self {
        Self {
            http_client: http_client(mailto),
            mailto: mailto.map(str::to_string),
        }
    }

    fn request_url(&self, spec: &QuerySpec) -> String {
        match (spec.mode, &spec.doi) {
            (QueryMode::ById, Some(doi)) => {
                format!("{}/works/https://doi.org/{}", BASE_URL, doi)
            }
            _ => format!("{}/works", BASE_URL),
        }
    }

    fn query_params(&self, spec: &QuerySpec) -> Vec<(&'static str, String)> {
        let mut params: Vec<(&'static str, String)> = Vec::new();
        if let Some(ref mailto) = self.mailto {
            params.push(("mailto", mailto.clone()));
        }
        if spec.mode == QueryMode::ById {
            return params;
        }
        if let Some(ref title) = spec.title {
            params.push(("search", title.clone()));
        }
        if !spec.authors.is_empty() {
            params.push((
                "filter",
                format!("raw_author_name.search:{}", spec.authors.join(" ")),
            ));
        }
        params.push(("per-page", MAX_RESULTS_PER_QUERY.to_string()));
        params
    }

    fn candidate_from(work: Work) -> Candidate {
        let mut candidate = Candidate::new();
        if let Some(title) = work.title.or(work.display_name) {
            candidate.set(FieldName::Title, title);
        }
        let authors: Vec<Author> = work
            .authorships
            .into_iter()
            .filter_map(|a| a.author.and_then(|inner| inner.display_name))
            .filter_map(|name| Author::parse(&name))
            .collect();
        candidate.set_authors(&authors);
        if let Some(doi) = work.doi {
            candidate.set_doi(&doi);
        }
        if let Some(year) = work.publication_year.and_then(year_string) {
            candidate.set(FieldName::Year, year);
        }
        if let Some(biblio) = work.biblio {
            if let Some(volume) = biblio.volume {
                candidate.set(FieldName::Volume, volume);
            }
            if let Some(issue) = biblio.issue {
                candidate.set(FieldName::Number, issue);
            }
            if let Some(pages) =
                join_pages(biblio.first_page.as_deref(), biblio.last_page.as_deref())
            {
                candidate.set(FieldName::Pages, pages);
            }
        }
        if let Some(location) = work.primary_location {
            if let Some(url) = location.landing_page_url {
                candidate.set(FieldName::Url, url);
            }
            if let Some(venue) = location.source {
                if let Some(name) = venue.display_name {
                    candidate.set(FieldName::Journal, name);
                }
                if let Some(issn) = venue.issn_l {
                    candidate.set(FieldName::Issn, issn);
                }
                if let Some(publisher) = venue.host_organization_name {
                    candidate.set(FieldName::Publisher, publisher);
                }
            }
        }
        candidate
    }
}

#[async_trait]
impl Source for OpenAlexSource {
    fn name(&self) -> &'static str {
        "openalex"
    }

    fn declared_fields(&self) -> &'static [FieldName] {
        &DECLARED
    }

    async fn execute(&self, spec: &QuerySpec) -> Result<RawResponse, SourceError> {
        let request = self
            .http_client
            .get(self.request_url(spec))
            .query(&self.query_params(spec));
        fetch(request).await
    }

    fn parse(&self, raw: &RawResponse) -> Result<ParsedBatch, SourceError> {
        let payload: Payload = serde_json::from_slice(&raw.body)
            .map_err(|e| SourceError::Parse(format!("Failed to parse OpenAlex response: {}", e)))?;
        Ok(match payload {
            Payload::List { results, meta } => {
                let candidates: Vec<Candidate> =
                    results.into_iter().map(Self::candidate_from).collect();
                let result_count = meta
                    .and_then(|m| m.count)
                    .map(|c| c as usize)
                    .unwrap_or(candidates.len());
                ParsedBatch {
                    candidates,
                    result_count,
                }
            }
            Payload::Single(work) => ParsedBatch::from_candidates(vec![Self::candidate_from(*work)]),
        })
    }
}

// ============================================================================
// OpenAlex API Response Types
// ============================================================================

/// Search responses wrap works in `results`; a DOI lookup answers with the
/// bare work object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Payload {
    List {
        results: Vec<Work>,
        meta: Option<Meta>,
    },
    Single(Box<Work>),
}

#[derive(Debug, Deserialize)]
struct Meta {
    count: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct Work {
    title: Option<String>,
    display_name: Option<String>,
    doi: Option<String>,
    publication_year: Option<i64>,
    #[serde(default)]
    authorships: Vec<Authorship>,
    biblio: Option<Biblio>,
    primary_location: Option<Location>,
}

#[derive(Debug, Deserialize)]
struct Authorship {
    author: Option<AuthorRef>,
}

#[derive(Debug, Deserialize)]
struct AuthorRef {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Biblio {
    volume: Option<String>,
    issue: Option<String>,
    first_page: Option<String>,
    last_page: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Location {
    landing_page_url: Option<String>,
    source: Option<Venue>,
}

#[derive(Debug, Deserialize)]
struct Venue {
    display_name: Option<String>,
    issn_l: Option<String>,
    host_organization_name: Option<String>,
}

// ============================================================================
// Tests
// ============================================================================
