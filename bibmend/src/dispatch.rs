//! Concurrent per-record dispatch across lookup sources
//!
//! One [`Dispatcher`] serves the whole run. For each record it fans out
//! over the enabled sources with `join_all`, drives each source's attempt
//! plan one query at a time, and isolates failures so one bad source never
//! costs the others their results. Every network call holds a permit from
//! the global request budget, which is shared across all records in
//! flight.

use crate::matcher;
use crate::types::{
    QueryMode, QueryOutcome, QueryScopes, QuerySpec, Source, SourceError,
};
use bibmend_common::normalize::strip_markup;
use bibmend_common::Entry;
use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, warn};

/// Outcome of one executed query attempt, before it is folded into the
/// source's `QueryOutcome`.
enum Attempt {
    /// A candidate cleared the threshold.
    Accepted {
        candidate: crate::types::Candidate,
        score: f32,
        matches: usize,
        hits: usize,
        status: u16,
    },
    /// Successful response, nothing matched.
    Empty { hits: usize, status: u16 },
    /// Provider asked us to back off.
    RateLimited { status: u16 },
    /// Network/API/parse failure; the attempt is abandoned.
    Failed { status: Option<u16> },
}

/// What the attempt loop should do next.
enum Flow {
    Halt,
    Continue { successful_empty: bool },
}

/// One-shot retry allowance for a source on one record.
///
/// Threaded through the attempt loop as a value so `Source` implementations
/// stay stateless across concurrently processed records.
struct RetryPolicy {
    used: bool,
}

impl RetryPolicy {
    fn new() -> Self {
        Self { used: false }
    }

    /// Build the retry attempt after a successful, zero-result final
    /// attempt: the title with markup stripped, as a pure content search
    /// (no identifier). `None` when the transform changes nothing, the
    /// plan had no title to transform, or the retry was already spent.
    fn plan_retry(&mut self, plan: &[QuerySpec]) -> Option<QuerySpec> {
        if self.used {
            return None;
        }
        let title = plan.iter().rev().find_map(|spec| spec.title.as_deref())?;
        let stripped = strip_markup(title);
        if stripped.is_empty() || stripped == title {
            return None;
        }
        self.used = true;
        Some(QuerySpec::by_title(stripped))
    }
}

/// Runs every enabled source for one record within the global request
/// budget and a per-record deadline.
pub struct Dispatcher {
    sources: Vec<Arc<dyn Source>>,
    scopes: QueryScopes,
    budget: Arc<Semaphore>,
    record_timeout: Duration,
    skip_satisfied: bool,
}

impl Dispatcher {
    pub fn new(
        sources: Vec<Arc<dyn Source>>,
        scopes: QueryScopes,
        max_requests: usize,
        record_timeout: Duration,
    ) -> Self {
        Self {
            sources,
            scopes,
            budget: Arc::new(Semaphore::new(max_requests.max(1))),
            record_timeout,
            skip_satisfied: true,
        }
    }

    /// Control the satisfied-source skip. Replace runs pass `false`:
    /// existing field values are up for replacement, so a source is
    /// worth querying even when the entry already has everything it
    /// declares.
    pub fn with_skip_satisfied(mut self, skip: bool) -> Self {
        self.skip_satisfied = skip;
        self
    }

    /// Query every source that can still add information to `entry`.
    ///
    /// Returns `(source_name, outcome)` pairs in configured source order
    /// (the merge priority order), regardless of completion order. Sources
    /// whose declared fields the entry already satisfies are omitted,
    /// unless the skip is disabled for a replace run. All sources share
    /// one deadline; a source that misses it is recorded as a timeout and
    /// its outstanding query abandoned, while finished sources keep their
    /// results.
    pub async fn run(&self, entry: &Entry) -> Vec<(String, QueryOutcome)> {
        let deadline = Instant::now() + self.record_timeout;
        let mut pending = Vec::new();

        for source in &self.sources {
            if self.skip_satisfied && declared_satisfied(entry, source.as_ref()) {
                debug!(
                    "{}: '{}' already has every field this source could add, skipping",
                    source.name(),
                    entry.key
                );
                continue;
            }
            let source = Arc::clone(source);
            pending.push(async move {
                let name = source.name().to_string();
                let outcome = match timeout_at(deadline, self.run_source(source.as_ref(), entry)).await
                {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        warn!(
                            "{}: timed out on '{}', abandoning outstanding queries",
                            name, entry.key
                        );
                        let mut outcome = QueryOutcome::none();
                        outcome.mark_timeout();
                        outcome
                    }
                };
                (name, outcome)
            });
        }

        join_all(pending).await
    }

    /// Drive one source's attempt plan for one record.
    async fn run_source(&self, source: &dyn Source, entry: &Entry) -> QueryOutcome {
        let plan = source.plan_queries(entry, &self.scopes);
        let mut outcome = QueryOutcome::none();
        if plan.is_empty() {
            debug!("{}: no usable query for '{}'", source.name(), entry.key);
            return outcome;
        }

        let mut retry = RetryPolicy::new();
        let mut attempts = 0usize;
        let mut halted = false;
        let mut successful_empty = false;

        for spec in &plan {
            attempts += 1;
            let attempt = self.run_attempt(source, entry, spec).await;
            match apply_attempt(&mut outcome, spec.mode, attempt) {
                Flow::Halt => {
                    halted = true;
                    break;
                }
                Flow::Continue {
                    successful_empty: empty,
                } => successful_empty = empty,
            }
        }

        if !halted && successful_empty {
            if let Some(retry_spec) = retry.plan_retry(&plan) {
                attempts += 1;
                debug!(
                    "{}: retrying '{}' with stripped title '{}'",
                    source.name(),
                    entry.key,
                    retry_spec.title.as_deref().unwrap_or_default()
                );
                let attempt = self.run_attempt(source, entry, &retry_spec).await;
                apply_attempt(&mut outcome, retry_spec.mode, attempt);
                outcome.tag("retried", Value::Bool(true));
            }
        }

        outcome.tag("attempts", Value::from(attempts));
        outcome
    }

    /// Execute one query attempt end to end: budget permit, network call,
    /// status classification, parse, scoring.
    async fn run_attempt(&self, source: &dyn Source, entry: &Entry, spec: &QuerySpec) -> Attempt {
        let response = {
            let _permit = match self.budget.acquire().await {
                Ok(permit) => permit,
                Err(_) => {
                    error!("request budget semaphore closed, abandoning attempt");
                    return Attempt::Failed { status: None };
                }
            };
            source.execute(spec).await
        };

        let raw = match response {
            Ok(raw) => raw,
            Err(err) => return classify_error(source, entry, spec, err),
        };

        let status = raw.status;
        if source.no_result_status().contains(&status) {
            debug!(
                "{}: {} query for '{}' found nothing (HTTP {})",
                source.name(),
                spec.mode.as_str(),
                entry.key,
                status
            );
            return Attempt::Empty { hits: 0, status };
        }
        if !source.ok_status().contains(&status) {
            if status == 429 || (500..=599).contains(&status) {
                warn!(
                    "{}: rate limited (HTTP {}) on '{}'",
                    source.name(),
                    status,
                    entry.key
                );
                return Attempt::RateLimited { status };
            }
            warn!(
                "{}: unexpected HTTP {} on '{}' ({} query)",
                source.name(),
                status,
                entry.key,
                spec.mode.as_str()
            );
            return Attempt::Failed {
                status: Some(status),
            };
        }

        let batch = match source.parse(&raw) {
            Ok(batch) => batch,
            Err(err) => {
                error!(
                    "{}: unparseable response for '{}': {}",
                    source.name(),
                    entry.key,
                    err
                );
                return Attempt::Failed {
                    status: Some(status),
                };
            }
        };

        let hits = batch.result_count;
        let selection = matcher::select_best(entry, batch.candidates);
        debug!(
            "{}: {} query for '{}' returned {} results, {} above threshold",
            source.name(),
            spec.mode.as_str(),
            entry.key,
            hits,
            selection.matches
        );
        match selection.best {
            Some(candidate) => Attempt::Accepted {
                candidate,
                score: selection.score,
                matches: selection.matches,
                hits,
                status,
            },
            None => Attempt::Empty { hits, status },
        }
    }
}

/// Fold one attempt into the source's outcome. Each attempt overwrites the
/// status/hit diagnostics, so the outcome always describes the accepting
/// attempt or the last one executed.
fn apply_attempt(outcome: &mut QueryOutcome, mode: QueryMode, attempt: Attempt) -> Flow {
    outcome.tag("mode", Value::from(mode.as_str()));
    match attempt {
        Attempt::Accepted {
            candidate,
            score,
            matches,
            hits,
            status,
        } => {
            outcome.accepted = Some(candidate);
            outcome.hit_count = hits;
            outcome.response_status = Some(status);
            outcome.set_matches(matches);
            outcome.tag("score", Value::from(f64::from(score)));
            Flow::Halt
        }
        Attempt::Empty { hits, status } => {
            outcome.hit_count = hits;
            outcome.response_status = Some(status);
            Flow::Continue {
                successful_empty: true,
            }
        }
        Attempt::RateLimited { status } => {
            outcome.hit_count = 0;
            outcome.response_status = Some(status);
            outcome.mark_rate_limited();
            Flow::Halt
        }
        Attempt::Failed { status } => {
            outcome.hit_count = 0;
            outcome.response_status = status;
            Flow::Continue {
                successful_empty: false,
            }
        }
    }
}

/// Map an `execute` failure onto the attempt classification, with the
/// logging each class deserves.
fn classify_error(source: &dyn Source, entry: &Entry, spec: &QuerySpec, err: SourceError) -> Attempt {
    match err {
        SourceError::RateLimited { status } => {
            warn!(
                "{}: rate limited (HTTP {}) on '{}'",
                source.name(),
                status,
                entry.key
            );
            Attempt::RateLimited { status }
        }
        SourceError::Network(message) => {
            warn!(
                "{}: {} query failed for '{}': {}",
                source.name(),
                spec.mode.as_str(),
                entry.key,
                message
            );
            Attempt::Failed { status: None }
        }
        SourceError::Api { status, message } => {
            warn!(
                "{}: API error (HTTP {}) for '{}': {}",
                source.name(),
                status,
                entry.key,
                message
            );
            Attempt::Failed {
                status: Some(status),
            }
        }
        SourceError::Parse(message) => {
            error!(
                "{}: unparseable response for '{}': {}",
                source.name(),
                entry.key,
                message
            );
            Attempt::Failed { status: None }
        }
    }
}

fn declared_satisfied(entry: &Entry, source: &dyn Source) -> bool {
    source
        .declared_fields()
        .iter()
        .all(|field| entry.fields.has_content(*field))
}
