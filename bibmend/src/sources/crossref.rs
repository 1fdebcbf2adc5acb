//! Crossref source
//!
//! Queries the Crossref REST API (https://api.crossref.org). Supports
//! direct DOI lookup plus bibliographic search; a configured contact
//! address is forwarded as the `mailto` parameter to join Crossref's
//! polite pool.

use crate::sources::{fetch, http_client, normalize_pages, MAX_RESULTS_PER_QUERY};
use crate::types::{
    Candidate, ParsedBatch, QueryMode, QuerySpec, RawResponse, Source, SourceError,
};
use async_trait::async_trait;
use bibmend_common::fields::month_name;
use bibmend_common::{Author, FieldName};
use reqwest::Client;
use serde::Deserialize;

/// Crossref REST API base URL
const BASE_URL: &str = "https://api.crossref.org";

/// Fields this source can supply.
const DECLARED: [FieldName; 14] = [
    FieldName::Author,
    FieldName::Booktitle,
    FieldName::Doi,
    FieldName::Isbn,
    FieldName::Issn,
    FieldName::Journal,
    FieldName::Month,
    FieldName::Number,
    FieldName::Pages,
    FieldName::Publisher,
    FieldName::Title,
    FieldName::Url,
    FieldName::Volume,
    FieldName::Year,
];

pub struct CrossrefSource {
    http_client: Client,
    mailto: Option<String>,
}

impl CrossrefSource {
    pub fn new(mailto: Option<&str>) -> Self {
        Self {
            http_client: http_client(mailto),
            mailto: mailto.map(str::to_string),
        }
    }

    /// Query parameters for one attempt: `/works/{doi}` takes only the
    /// polite-pool address, searches add the bibliographic query.
    fn query_params(&self, spec: &QuerySpec) -> Vec<(&'static str, String)> {
        let mut params: Vec<(&'static str, String)> = Vec::new();
        if let Some(ref mailto) = self.mailto {
            params.push(("mailto", mailto.clone()));
        }
        if spec.mode == QueryMode::ById {
            return params;
        }
        if let Some(ref title) = spec.title {
            params.push(("query.bibliographic", title.clone()));
        }
        if !spec.authors.is_empty() {
            params.push(("query.author", spec.authors.join(" ")));
        }
        params.push(("rows", MAX_RESULTS_PER_QUERY.to_string()));
        params
    }

    fn request_url(&self, spec: &QuerySpec) -> String {
        match (spec.mode, &spec.doi) {
            (QueryMode::ById, Some(doi)) => format!("{}/works/{}", BASE_URL, doi),
            _ => format!("{}/works", BASE_URL),
        }
    }

    fn candidate_from(work: Work) -> Candidate {
        let mut candidate = Candidate::new();
        if let Some(title) = work.title.into_iter().next() {
            candidate.set(FieldName::Title, title);
        }
        let authors: Vec<Author> = work
            .author
            .into_iter()
            .filter_map(|a| match (a.family, a.given) {
                (Some(family), given) => Some(Author::new(family, given)),
                (None, Some(given)) => Author::parse(&given),
                (None, None) => None,
            })
            .collect();
        candidate.set_authors(&authors);
        if let Some(doi) = work.doi {
            candidate.set_doi(&doi);
        }

        // The container is the journal for articles and the collection
        // title for anything in proceedings or books.
        if let Some(container) = work.container_title.into_iter().next() {
            let is_collection = work
                .work_type
                .as_deref()
                .map(|t| t.contains("proceedings") || t.contains("book"))
                .unwrap_or(false);
            if is_collection {
                candidate.set(FieldName::Booktitle, container);
            } else {
                candidate.set(FieldName::Journal, container);
            }
        }

        if let Some(parts) = work.issued.and_then(|d| d.date_parts.into_iter().next()) {
            if let Some(year) = parts.first().copied().flatten() {
                if let Some(year) = crate::sources::year_string(year) {
                    candidate.set(FieldName::Year, year);
                }
            }
            let month = parts
                .get(1)
                .copied()
                .flatten()
                .and_then(|m| u32::try_from(m).ok());
            if let Some(month) = month.and_then(month_name) {
                candidate.set(FieldName::Month, month);
            }
        }

        if let Some(volume) = work.volume {
            candidate.set(FieldName::Volume, volume);
        }
        if let Some(issue) = work.issue {
            candidate.set(FieldName::Number, issue);
        }
        if let Some(page) = work.page {
            candidate.set(FieldName::Pages, normalize_pages(&page));
        }
        if let Some(publisher) = work.publisher {
            candidate.set(FieldName::Publisher, publisher);
        }
        if let Some(issn) = work.issn.into_iter().next() {
            candidate.set(FieldName::Issn, issn);
        }
        if let Some(isbn) = work.isbn.into_iter().next() {
            candidate.set(FieldName::Isbn, isbn);
        }
        if let Some(url) = work.url {
            candidate.set(FieldName::Url, url);
        }
        candidate
    }
}

#[async_trait]
impl Source for CrossrefSource {
    fn name(&self) -> &'static str {
        "crossref"
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
        let envelope: Envelope = serde_json::from_slice(&raw.body)
            .map_err(|e| SourceError::Parse(format!("Failed to parse Crossref response: {}", e)))?;
        Ok(match envelope.message {
            Message::List {
                items,
                total_results,
            } => {
                let candidates: Vec<Candidate> =
                    items.into_iter().map(Self::candidate_from).collect();
                let result_count = total_results
                    .map(|t| t as usize)
                    .unwrap_or(candidates.len());
                ParsedBatch {
                    candidates,
                    result_count,
                }
            }
            Message::Single(work) => {
                ParsedBatch::from_candidates(vec![Self::candidate_from(*work)])
            }
        })
    }
}

// ============================================================================
// Crossref API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct Envelope {
    message: Message,
}

/// `/works/{doi}` answers with a single work, `/works?query…` with an item
/// list. The list shape is tried first since a bare work never carries
/// `items`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Message {
    List {
        items: Vec<Work>,
        #[serde(rename = "total-results")]
        total_results: Option<u64>,
    },
    Single(Box<Work>),
}

#[derive(Debug, Deserialize, Default)]
struct Work {
    #[serde(default)]
    title: Vec<String>,
    #[serde(default)]
    author: Vec<WorkAuthor>,
    #[serde(rename = "DOI")]
    doi: Option<String>,
    #[serde(rename = "container-title", default)]
    container_title: Vec<String>,
    #[serde(rename = "type")]
    work_type: Option<String>,
    issued: Option<DateField>,
    volume: Option<String>,
    issue: Option<String>,
    page: Option<String>,
    publisher: Option<String>,
    #[serde(rename = "ISSN", default)]
    issn: Vec<String>,
    #[serde(rename = "ISBN", default)]
    isbn: Vec<String>,
    #[serde(rename = "URL")]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WorkAuthor {
    family: Option<String>,
    given: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DateField {
    #[serde(rename = "date-parts", default)]
    date_parts: Vec<Vec<Option<i64>>>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> CrossrefSource {
        CrossrefSource::new(Some("tests@example.org"))
    }

    #[test]
    fn doi_lookup_targets_the_work_path() {
        let spec = QuerySpec::by_id("10.1007/s00205-011-0446-7".into());
        assert_eq!(
            source().request_url(&spec),
            "https://api.crossref.org/works/10.1007/s00205-011-0446-7"
        );
        let params = source().query_params(&spec);
        assert_eq!(params, vec![("mailto", "tests@example.org".to_string())]);
    }

    #[test]
    fn search_params_cover_title_and_authors() {
        let spec = QuerySpec::by_title_author(
            "Large time existence".into(),
            vec!["Abels".into(), "Terasawa".into()],
        );
        let params = source().query_params(&spec);
        assert!(params.contains(&("query.bibliographic", "Large time existence".to_string())));
        assert!(params.contains(&("query.author", "Abels Terasawa".to_string())));
        assert!(params.contains(&("rows", "10".to_string())));
    }

    #[test]
    fn parses_a_search_response() {
        let body = r#"{
            "status": "ok",
            "message": {
                "total-results": 2372,
                "items": [{
                    "title": ["On generalized Csiszar-Kullback inequalities"],
                    "author": [
                        {"given": "Anton", "family": "Arnold"},
                        {"given": "Peter", "family": "Markowich"}
                    ],
                    "DOI": "10.1007/s00605-005-0000-0",
                    "container-title": ["Monatshefte für Mathematik"],
                    "type": "journal-article",
                    "issued": {"date-parts": [[2000, 4]]},
                    "volume": "131",
                    "issue": "3",
                    "page": "235-253",
                    "publisher": "Springer",
                    "ISSN": ["0026-9255"],
                    "URL": "https://doi.org/10.1007/s00605-005-0000-0"
                }]
            }
        }"#;
        let raw = RawResponse {
            status: 200,
            body: body.as_bytes().to_vec(),
        };
        let batch = source().parse(&raw).expect("valid payload");
        assert_eq!(batch.result_count, 2372);
        assert_eq!(batch.candidates.len(), 1);

        let candidate = &batch.candidates[0];
        assert_eq!(
            candidate.title(),
            Some("On generalized Csiszar-Kullback inequalities")
        );
        assert_eq!(
            candidate.get(FieldName::Author),
            Some("Arnold, Anton and Markowich, Peter")
        );
        assert_eq!(candidate.get(FieldName::Year), Some("2000"));
        assert_eq!(candidate.get(FieldName::Month), Some("April"));
        assert_eq!(candidate.get(FieldName::Pages), Some("235--253"));
        assert_eq!(
            candidate.get(FieldName::Journal),
            Some("Monatshefte für Mathematik")
        );
        assert_eq!(candidate.get(FieldName::Number), Some("3"));
    }

    #[test]
    fn parses_a_single_work_response() {
        let body = r#"{
            "status": "ok",
            "message": {
                "title": ["Sharp interface limit"],
                "DOI": "10.1051/cocv/2020032",
                "type": "journal-article"
            }
        }"#;
        let raw = RawResponse {
            status: 200,
            body: body.as_bytes().to_vec(),
        };
        let batch = source().parse(&raw).expect("valid payload");
        assert_eq!(batch.result_count, 1);
        assert_eq!(batch.candidates[0].title(), Some("Sharp interface limit"));
        assert_eq!(
            batch.candidates[0].doi(),
            Some("10.1051/cocv/2020032".to_string())
        );
    }

    #[test]
    fn proceedings_container_becomes_booktitle() {
        let body = r#"{
            "message": {
                "title": ["A hybrid approach"],
                "container-title": ["Proceedings of STACS 2004"],
                "type": "proceedings-article"
            }
        }"#;
        let raw = RawResponse {
            status: 200,
            body: body.as_bytes().to_vec(),
        };
        let batch = source().parse(&raw).expect("valid payload");
        let candidate = &batch.candidates[0];
        assert_eq!(
            candidate.get(FieldName::Booktitle),
            Some("Proceedings of STACS 2004")
        );
        assert_eq!(candidate.get(FieldName::Journal), None);
    }

    #[test]
    fn malformed_body_is_a_parse_error() {
        let raw = RawResponse {
            status: 200,
            body: b"<html>proxy error</html>".to_vec(),
        };
        assert!(matches!(
            source().parse(&raw),
            Err(SourceError::Parse(_))
        ));
    }
}
