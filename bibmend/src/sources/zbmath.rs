//! zbMATH source
//!
//! Queries the zbMATH Open document API (https://api.zbmath.org). Every
//! mode goes through `/v1/document/_search` with a `search_string`: DOIs
//! as `doi:{doi}`, searches as free text (title plus author names).
//! zbMATH requires agreement to its terms of use, signalled by the
//! `tsnc=agreed` cookie.

use crate::sources::{fetch, normalize_pages, user_agent, MAX_RESULTS_PER_QUERY, REQUEST_TIMEOUT};
use crate::types::{
    Candidate, ParsedBatch, QuerySpec, RawResponse, Source, SourceError,
};
use async_trait::async_trait;
use bibmend_common::{Author, FieldName};
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use reqwest::Client;
use serde::Deserialize;

/// zbMATH Open API search URL
const BASE_URL: &str = "https://api.zbmath.org/v1/document/_search";

/// Fields this source can supply.
const DECLARED: [FieldName; 6] = [
    FieldName::Author,
    FieldName::Doi,
    FieldName::Pages,
    FieldName::Title,
    FieldName::Url,
    FieldName::Year,
];

pub struct ZbMathSource {
    http_client: Client,
}

impl ZbMathSource {
    pub fn new() -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("tsnc=agreed"));
        let http_client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(user_agent(None))
            .default_headers(headers)
            .build()
            .expect("Failed to create HTTP client");
        Self { http_client }
    }

    fn search_string(spec: &QuerySpec) -> String {
        if let Some(ref doi) = spec.doi {
            return format!("doi:{}", doi);
        }
        let mut search = spec.title.clone().unwrap_or_default();
        for family in &spec.authors {
            search.push(' ');
            search.push_str(family);
        }
        search
    }

    fn candidate_from(document: Document) -> Candidate {
        let mut candidate = Candidate::new();
        let authors: Vec<Author> = document
            .contributors
            .map(|c| c.authors)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|a| a.name)
            .filter_map(|name| Author::parse(&name))
            .collect();
        candidate.set_authors(&authors);

        // A missing top-level DOI is sometimes still present among the
        // document links.
        let doi = document.doi.or_else(|| {
            document
                .links
                .into_iter()
                .find(|link| link.link_type.as_deref() == Some("doi"))
                .and_then(|link| link.identifier)
        });
        if let Some(doi) = doi {
            candidate.set_doi(&doi);
        }

        if let Some(pages) = document.source.and_then(|s| s.pages) {
            candidate.set(FieldName::Pages, normalize_pages(&pages));
        }
        if let Some(title) = document.title.and_then(|t| t.title) {
            candidate.set(FieldName::Title, title);
        }
        if let Some(url) = document.zbmath_url {
            candidate.set(FieldName::Url, url);
        }
        if let Some(year) = document.year.as_ref().and_then(year_value) {
            candidate.set(FieldName::Year, year);
        }
        candidate
    }
}

impl Default for ZbMathSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Source for ZbMathSource {
    fn name(&self) -> &'static str {
        "zbmath"
    }

    fn declared_fields(&self) -> &'static [FieldName] {
        &DECLARED
    }

    async fn execute(&self, spec: &QuerySpec) -> Result<RawResponse, SourceError> {
        let request = self.http_client.get(BASE_URL).query(&[
            ("format", "json".to_string()),
            ("results_per_page", MAX_RESULTS_PER_QUERY.to_string()),
            ("search_string", Self::search_string(spec)),
        ]);
        fetch(request).await
    }

    fn parse(&self, raw: &RawResponse) -> Result<ParsedBatch, SourceError> {
        let envelope: Envelope = serde_json::from_slice(&raw.body)
            .map_err(|e| SourceError::Parse(format!("Failed to parse zbMATH response: {}", e)))?;
        Ok(ParsedBatch::from_candidates(
            envelope
                .result
                .into_iter()
                .map(Self::candidate_from)
                .collect(),
        ))
    }
}

/// zbMATH serializes the year inconsistently (string or number).
fn year_value(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(year) if year.len() == 4 && year.parse::<u32>().is_ok() => {
            Some(year.clone())
        }
        serde_json::Value::Number(year) => {
            year.as_i64().and_then(crate::sources::year_string)
        }
        _ => None,
    }
}

// ============================================================================
// zbMATH API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    result: Vec<Document>,
}

#[derive(Debug, Deserialize, Default)]
struct Document {
    contributors: Option<Contributors>,
    doi: Option<String>,
    #[serde(default)]
    links: Vec<Link>,
    source: Option<SourceInfo>,
    title: Option<TitleInfo>,
    zbmath_url: Option<String>,
    year: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Contributors {
    #[serde(default)]
    authors: Vec<Contributor>,
}

#[derive(Debug, Deserialize)]
struct Contributor {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Link {
    #[serde(rename = "type")]
    link_type: Option<String>,
    identifier: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SourceInfo {
    pages: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TitleInfo {
    title: Option<String>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> ZbMathSource {
        ZbMathSource::new()
    }

    #[test]
    fn doi_queries_use_the_prefix_syntax() {
        let spec = QuerySpec::by_id("10.1007/3-540-46425-5_21".into());
        assert_eq!(
            ZbMathSource::search_string(&spec),
            "doi:10.1007/3-540-46425-5_21"
        );
    }

    #[test]
    fn search_string_joins_title_and_authors() {
        let spec = QuerySpec::by_title_author(
            "Smooth manifolds".into(),
            vec!["Lamiraux".into()],
        );
        assert_eq!(
            ZbMathSource::search_string(&spec),
            "Smooth manifolds Lamiraux"
        );
        let spec = QuerySpec::by_title("Smooth manifolds".into());
        assert_eq!(ZbMathSource::search_string(&spec), "Smooth manifolds");
    }

    #[test]
    fn parses_a_search_response() {
        let body = r#"{
            "result": [{
                "contributors": {"authors": [
                    {"name": "Abels, Helmut"},
                    {"name": "Kassmann, Moritz"}
                ]},
                "doi": null,
                "links": [
                    {"type": "http", "identifier": "http://example.org/paper"},
                    {"type": "doi", "identifier": "10.1017/is008004021jkt045"}
                ],
                "source": {"pages": "779-809"},
                "title": {"title": "The Cauchy problem and the martingale problem"},
                "zbmath_url": "https://zbmath.org/?q=an:1168.35023",
                "year": "2009"
            }],
            "status": {"execution": "ok"}
        }"#;
        let raw = RawResponse {
            status: 200,
            body: body.as_bytes().to_vec(),
        };
        let batch = source().parse(&raw).expect("valid payload");
        assert_eq!(batch.result_count, 1);

        let candidate = &batch.candidates[0];
        assert_eq!(
            candidate.get(FieldName::Author),
            Some("Abels, Helmut and Kassmann, Moritz")
        );
        assert_eq!(
            candidate.doi(),
            Some("10.1017/is008004021jkt045".to_string())
        );
        assert_eq!(candidate.get(FieldName::Pages), Some("779--809"));
        assert_eq!(
            candidate.title(),
            Some("The Cauchy problem and the martingale problem")
        );
        assert_eq!(
            candidate.get(FieldName::Url),
            Some("https://zbmath.org/?q=an:1168.35023")
        );
        assert_eq!(candidate.get(FieldName::Year), Some("2009"));
    }

    #[test]
    fn numeric_years_are_accepted() {
        let body = r#"{"result": [{"title": {"title": "On a thing"}, "year": 2013}]}"#;
        let raw = RawResponse {
            status: 200,
            body: body.as_bytes().to_vec(),
        };
        let batch = source().parse(&raw).expect("valid payload");
        assert_eq!(batch.candidates[0].get(FieldName::Year), Some("2013"));
    }

    #[test]
    fn empty_result_list_yields_no_candidates() {
        let body = r#"{"result": [], "status": {"execution": "ok"}}"#;
        let raw = RawResponse {
            status: 200,
            body: body.as_bytes().to_vec(),
        };
        let batch = source().parse(&raw).expect("valid payload");
        assert!(batch.candidates.is_empty());
        assert_eq!(batch.result_count, 0);
    }
}
