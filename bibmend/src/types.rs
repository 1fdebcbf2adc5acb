//! Core types for multi-source bibliographic lookup
//!
//! Defines the [`Source`] contract every metadata provider implements, the
//! query-plan types the dispatcher drives it with, and the per-source
//! [`QueryOutcome`] the merger and reporter consume.
//!
//! A provider is stateless per call: everything that varies per record
//! (current query mode, retry bookkeeping) lives in values owned by the
//! dispatcher, so one `Source` instance serves many records concurrently.

use async_trait::async_trait;
use bibmend_common::normalize::collapse_whitespace;
use bibmend_common::{Author, Entry, FieldMap, FieldName};
use serde_json::Value;
use thiserror::Error;

/// Search mode for one query attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    /// Direct identifier lookup (DOI).
    ById,
    /// Full-text search over title and author names.
    ByTitleAuthor,
    /// Full-text search over the title alone.
    ByTitle,
}

impl QueryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryMode::ById => "doi",
            QueryMode::ByTitleAuthor => "title+author",
            QueryMode::ByTitle => "title",
        }
    }
}

/// Which query modes a run is allowed to use. Each scope can be disabled
/// independently from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryScopes {
    pub by_doi: bool,
    pub by_title_author: bool,
    pub by_title: bool,
}

impl Default for QueryScopes {
    fn default() -> Self {
        Self {
            by_doi: true,
            by_title_author: true,
            by_title: true,
        }
    }
}

impl QueryScopes {
    pub fn any_enabled(&self) -> bool {
        self.by_doi || self.by_title_author || self.by_title
    }
}

/// One planned query attempt: the mode plus exactly the parameters that
/// mode uses.
///
/// Parameters degrade across a plan: the identifier attempt carries the
/// DOI, the title+author attempt carries title and author families but no
/// DOI, the title-only attempt carries just the title. The title is the raw
/// field value with whitespace collapsed (markup intact), so the retry
/// transform can still observe and strip markup.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub mode: QueryMode,
    pub doi: Option<String>,
    pub title: Option<String>,
    /// Family names used as author search keys.
    pub authors: Vec<String>,
}

impl QuerySpec {
    pub fn by_id(doi: String) -> Self {
        Self {
            mode: QueryMode::ById,
            doi: Some(doi),
            title: None,
            authors: Vec::new(),
        }
    }

    pub fn by_title_author(title: String, authors: Vec<String>) -> Self {
        Self {
            mode: QueryMode::ByTitleAuthor,
            doi: None,
            title: Some(title),
            authors,
        }
    }

    pub fn by_title(title: String) -> Self {
        Self {
            mode: QueryMode::ByTitle,
            doi: None,
            title: Some(title),
            authors: Vec::new(),
        }
    }
}

/// Raw HTTP response handed from `execute` to `parse`.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn body_str(&self) -> Result<&str, SourceError> {
        std::str::from_utf8(&self.body)
            .map_err(|e| SourceError::Parse(format!("response body is not UTF-8: {}", e)))
    }
}

/// A record proposed by one source for one query attempt. Same field shape
/// as an [`Entry`], but partial and without a key; provenance is the owning
/// source's name, tracked by the dispatcher.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Candidate {
    pub fields: FieldMap,
}

impl Candidate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field; empty values are dropped (see [`FieldMap::set`]).
    pub fn set(&mut self, name: FieldName, value: impl Into<String>) {
        self.fields.set(name, value);
    }

    pub fn get(&self, name: FieldName) -> Option<&str> {
        self.fields.get(name)
    }

    /// Set the DOI field from a raw provider value, normalizing away URL
    /// prefixes. Unusable values leave the field absent.
    pub fn set_doi(&mut self, raw: &str) {
        if let Some(doi) = bibmend_common::normalize::normalize_doi(raw) {
            self.fields.set(FieldName::Doi, doi);
        }
    }

    /// Set the author field from a parsed list; an empty list leaves the
    /// field absent.
    pub fn set_authors(&mut self, authors: &[Author]) {
        if !authors.is_empty() {
            self.fields
                .set(FieldName::Author, Author::format_list(authors));
        }
    }

    pub fn authors(&self) -> Vec<Author> {
        self.fields
            .get(FieldName::Author)
            .map(Author::parse_list)
            .unwrap_or_default()
    }

    pub fn title(&self) -> Option<&str> {
        self.fields.get(FieldName::Title)
    }

    /// Normalized DOI, when the candidate carries a usable one.
    pub fn doi(&self) -> Option<String> {
        self.fields
            .get(FieldName::Doi)
            .and_then(|raw| bibmend_common::normalize::normalize_doi(raw))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Parsed form of one raw response.
#[derive(Debug, Clone, Default)]
pub struct ParsedBatch {
    pub candidates: Vec<Candidate>,
    /// Provider-reported total when it sends one, otherwise the number of
    /// candidates parsed.
    pub result_count: usize,
}

impl ParsedBatch {
    pub fn from_candidates(candidates: Vec<Candidate>) -> Self {
        let result_count = candidates.len();
        Self {
            candidates,
            result_count,
        }
    }
}

/// Failure classes a source can report from `execute`/`parse`.
///
/// `Network`, `Api`, and `Parse` abandon the current attempt only; the
/// dispatcher proceeds to the source's next attempt. `RateLimited` stops
/// the source for the current record so a throttling provider is not
/// hammered further within the run.
#[derive(Error, Debug)]
pub enum SourceError {
    /// Connection-level failure (timeout, DNS, refused connection)
    #[error("Network error: {0}")]
    Network(String),

    /// Provider throttling (HTTP 429 or 5xx)
    #[error("Rate limited (HTTP {status})")]
    RateLimited { status: u16 },

    /// Unexpected HTTP status outside the provider's documented behavior
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// Malformed or unexpected payload shape
    #[error("Parse error: {0}")]
    Parse(String),
}

impl SourceError {
    /// HTTP status associated with this failure, when there is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            SourceError::RateLimited { status } | SourceError::Api { status, .. } => Some(*status),
            SourceError::Network(_) | SourceError::Parse(_) => None,
        }
    }
}

/// Per-source result for one input record.
#[derive(Debug, Clone, Default)]
pub struct QueryOutcome {
    /// Best-scoring candidate that cleared the match threshold, if any.
    pub accepted: Option<Candidate>,
    /// Number of candidates returned by the attempt that produced the
    /// accepted candidate (or the last attempt when none matched).
    pub hit_count: usize,
    /// HTTP status of that attempt, when a response was received.
    pub response_status: Option<u16>,
    /// Structured diagnostics: attempt mode, attempt count, retry /
    /// rate-limit / timeout markers.
    pub extra: serde_json::Map<String, Value>,
}

impl QueryOutcome {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn tag(&mut self, key: &str, value: Value) {
        self.extra.insert(key.to_string(), value);
    }

    pub fn mark_rate_limited(&mut self) {
        self.tag("rate-limited", Value::Bool(true));
    }

    pub fn rate_limited(&self) -> bool {
        matches!(self.extra.get("rate-limited"), Some(Value::Bool(true)))
    }

    pub fn mark_timeout(&mut self) {
        self.tag("timeout", Value::Bool(true));
    }

    pub fn timed_out(&self) -> bool {
        matches!(self.extra.get("timeout"), Some(Value::Bool(true)))
    }

    /// Number of candidates that cleared the match threshold in the
    /// accepting attempt. More than one flags an ambiguous match.
    pub fn set_matches(&mut self, count: usize) {
        self.tag("matches", Value::from(count));
    }

    pub fn matches(&self) -> usize {
        self.extra
            .get("matches")
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize
    }
}

/// Contract for one external metadata provider.
///
/// Implementations are stateless per call and shared behind `Arc` across
/// every record in a batch. The dispatcher owns all sequencing: it calls
/// `plan_queries` once per record, then `execute`/`parse` per attempt, and
/// scores the candidates itself.
///
/// # Example
/// ```rust,ignore
/// use bibmend::types::{ParsedBatch, RawResponse, Source, SourceError};
///
/// pub struct MyApi { client: reqwest::Client }
///
/// #[async_trait::async_trait]
/// impl Source for MyApi {
///     fn name(&self) -> &'static str { "myapi" }
///     fn declared_fields(&self) -> &'static [FieldName] { &[FieldName::Doi] }
///     async fn execute(&self, spec: &QuerySpec) -> Result<RawResponse, SourceError> { /* ... */ }
///     fn parse(&self, raw: &RawResponse) -> Result<ParsedBatch, SourceError> { /* ... */ }
/// }
/// ```
#[async_trait]
pub trait Source: Send + Sync {
    /// Stable lowercase identifier, used in priority lists, reports, and
    /// annotations.
    fn name(&self) -> &'static str;

    /// Fields this provider can possibly supply. A record that already has
    /// real content in every declared field skips this source entirely.
    fn declared_fields(&self) -> &'static [FieldName];

    /// Query modes this provider supports. Providers without an identifier
    /// endpoint narrow this to the search modes.
    fn supported_modes(&self) -> &'static [QueryMode] {
        &[QueryMode::ById, QueryMode::ByTitleAuthor, QueryMode::ByTitle]
    }

    /// Statuses that carry parseable data.
    fn ok_status(&self) -> &'static [u16] {
        &[200]
    }

    /// Statuses meaning "nothing found" rather than failure. Providers
    /// that answer identifier lookups with 404 on unknown DOIs list it
    /// here.
    fn no_result_status(&self) -> &'static [u16] {
        &[404]
    }

    /// Build the ordered attempt plan for one record under the run's query
    /// scopes. The default covers the common DOI → title+author → title
    /// degradation; attempts whose inputs are missing, whose scope is
    /// disabled, or whose mode is unsupported are dropped.
    fn plan_queries(&self, entry: &Entry, scopes: &QueryScopes) -> Vec<QuerySpec> {
        let supports = |mode: QueryMode| self.supported_modes().contains(&mode);
        let mut plan = Vec::new();

        if scopes.by_doi && supports(QueryMode::ById) {
            if let Some(doi) = entry.doi() {
                plan.push(QuerySpec::by_id(doi));
            }
        }

        let title = entry
            .title()
            .map(collapse_whitespace)
            .filter(|t| !t.is_empty());
        let title = match title {
            Some(title) => title,
            None => return plan,
        };

        let authors: Vec<String> = entry.authors().into_iter().map(|a| a.family).collect();
        if scopes.by_title_author && supports(QueryMode::ByTitleAuthor) && !authors.is_empty() {
            plan.push(QuerySpec::by_title_author(title.clone(), authors));
        }
        if scopes.by_title && supports(QueryMode::ByTitle) {
            plan.push(QuerySpec::by_title(title));
        }
        plan
    }

    /// Perform the network call for one attempt.
    async fn execute(&self, spec: &QuerySpec) -> Result<RawResponse, SourceError>;

    /// Turn one raw response into candidates. Deterministic, no I/O.
    /// Missing members of individual results yield absent fields, not
    /// errors; only a structurally unreadable body is a `Parse` failure.
    fn parse(&self, raw: &RawResponse) -> Result<ParsedBatch, SourceError>;
}
