//! Lookup source implementations
//!
//! Each submodule wraps one scholarly metadata API behind the
//! [`Source`](crate::types::Source) contract: it builds requests for the
//! planned query modes, and maps the provider's payload shape onto
//! candidates. Shared plumbing (client construction, pacing, response
//! capture) lives here.

pub mod arxiv;
pub mod crossref;
pub mod dblp;
pub mod openalex;
pub mod semanticscholar;
pub mod zbmath;

use crate::types::{RawResponse, Source, SourceError};
use bibmend_common::Error;
use reqwest::{Client, RequestBuilder};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Default enable order; doubles as the default merge priority.
pub const DEFAULT_SOURCE_ORDER: [&str; 6] = [
    "openalex",
    "crossref",
    "arxiv",
    "semanticscholar",
    "dblp",
    "zbmath",
];

/// Maximum results requested per search query.
pub(crate) const MAX_RESULTS_PER_QUERY: usize = 10;

/// Per-request timeout for provider clients. The per-record deadline in
/// the dispatcher bounds the overall time a record may take.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub fn is_known(name: &str) -> bool {
    DEFAULT_SOURCE_ORDER.contains(&name)
}

/// Instantiate sources by name, in the order given (which is also the
/// merge priority order).
pub fn build_sources(
    names: &[String],
    mailto: Option<&str>,
) -> Result<Vec<Arc<dyn Source>>, Error> {
    let mut sources: Vec<Arc<dyn Source>> = Vec::with_capacity(names.len());
    for name in names {
        let source: Arc<dyn Source> = match name.as_str() {
            "openalex" => Arc::new(openalex::OpenAlexSource::new(mailto)),
            "crossref" => Arc::new(crossref::CrossrefSource::new(mailto)),
            "arxiv" => Arc::new(arxiv::ArxivSource::new()),
            "semanticscholar" => Arc::new(semanticscholar::SemanticScholarSource::new()),
            "dblp" => Arc::new(dblp::DblpSource::new()),
            "zbmath" => Arc::new(zbmath::ZbMathSource::new()),
            other => return Err(Error::Config(format!("unknown source '{}'", other))),
        };
        sources.push(source);
    }
    Ok(sources)
}

/// User-Agent advertised to providers. The contact address, when
/// configured, joins the polite pools that reward one.
pub(crate) fn user_agent(mailto: Option<&str>) -> String {
    match mailto {
        Some(mailto) => format!("bibmend/{} (mailto:{})", env!("CARGO_PKG_VERSION"), mailto),
        None => format!("bibmend/{}", env!("CARGO_PKG_VERSION")),
    }
}

/// HTTP client with the shared timeout and User-Agent.
pub(crate) fn http_client(mailto: Option<&str>) -> Client {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(user_agent(mailto))
        .build()
        .expect("Failed to create HTTP client")
}

/// Minimum-interval pacer for providers that bound their request rate.
///
/// Holds the lock while sleeping, so concurrent callers queue up behind
/// the interval instead of stampeding the provider.
pub(crate) struct RequestPacer {
    interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RequestPacer {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_request: Mutex::new(None),
        }
    }

    pub(crate) async fn wait(&self) {
        let mut last_request = self.last_request.lock().await;
        if let Some(last_time) = *last_request {
            let elapsed = last_time.elapsed();
            if elapsed < self.interval {
                let pause = self.interval - elapsed;
                debug!("Rate limiting: waiting {:?} before next request", pause);
                sleep(pause).await;
            }
        }
        *last_request = Some(Instant::now());
    }
}

/// Send one request and capture status plus body. Transport failures map
/// to `Network`; HTTP status classification is the dispatcher's job.
pub(crate) async fn fetch(request: RequestBuilder) -> Result<RawResponse, SourceError> {
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            SourceError::Network(format!("request timed out: {}", e))
        } else {
            SourceError::Network(e.to_string())
        }
    })?;
    let status = response.status().as_u16();
    let body = response
        .bytes()
        .await
        .map_err(|e| SourceError::Network(format!("failed to read response body: {}", e)))?
        .to_vec();
    Ok(RawResponse { status, body })
}

/// BibTeX page range from a provider's first/last page pair.
pub(crate) fn join_pages(first: Option<&str>, last: Option<&str>) -> Option<String> {
    let first = first.map(str::trim).filter(|p| !p.is_empty())?;
    match last.map(str::trim).filter(|p| !p.is_empty()) {
        Some(last) if last != first => Some(format!("{}--{}", first, last)),
        _ => Some(first.to_string()),
    }
}

/// Normalize a provider page string: single dashes and en-dashes become
/// the BibTeX `--` separator.
pub(crate) fn normalize_pages(pages: &str) -> String {
    let pages = pages.trim().replace('\u{2013}', "--");
    if pages.contains("--") || !pages.contains('-') {
        return pages;
    }
    pages.replace('-', "--")
}

/// Render a provider year as a 4-digit field value.
pub(crate) fn year_string(year: i64) -> Option<String> {
    if (1000..=9999).contains(&year) {
        Some(year.to_string())
    } else {
        None
    }
}
