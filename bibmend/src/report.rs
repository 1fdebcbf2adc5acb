//! Batch-level outcome aggregation and report rendering
//!
//! The reporter is shared by every record task in a run; it only collects.
//! Nothing here feeds back into matching or merging.

use crate::merge::MergedEntry;
use crate::types::QueryOutcome;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Mutex;
use tracing::{info, warn};

/// One ambiguous-match observation: an accepted attempt that returned more
/// than one candidate above the threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipleHit {
    pub key: String,
    pub source: String,
    pub hits: usize,
}

/// One rate-limited observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitHit {
    pub key: String,
    pub source: String,
    pub status: Option<u16>,
}

#[derive(Debug, Default)]
struct ReportState {
    not_found: Vec<String>,
    multiple_hits: Vec<MultipleHit>,
    rate_limited: Vec<RateLimitHit>,
    records_processed: usize,
    records_enriched: usize,
    fields_changed: usize,
}

/// Collects per-record outcomes across the whole batch.
pub struct RunReporter {
    state: Mutex<ReportState>,
    started_at: DateTime<Utc>,
}

impl RunReporter {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ReportState::default()),
            started_at: Utc::now(),
        }
    }

    /// Record one finished record. `outcomes` is the dispatcher's mapping
    /// for the record, `merged` the merger's result.
    pub fn record(&self, key: &str, outcomes: &[(String, QueryOutcome)], merged: &MergedEntry) {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };

        state.records_processed += 1;
        let changed = merged.changed();
        state.fields_changed += changed;
        if changed > 0 {
            state.records_enriched += 1;
        }

        let mut any_accepted = false;
        let mut any_rate_limited = false;
        for (source, outcome) in outcomes {
            if outcome.rate_limited() {
                any_rate_limited = true;
                state.rate_limited.push(RateLimitHit {
                    key: key.to_string(),
                    source: source.clone(),
                    status: outcome.response_status,
                });
            }
            if outcome.accepted.is_some() {
                any_accepted = true;
                if outcome.matches() > 1 {
                    state.multiple_hits.push(MultipleHit {
                        key: key.to_string(),
                        source: source.clone(),
                        hits: outcome.hit_count,
                    });
                }
            }
        }

        // A record that was rate-limited somewhere is not a confirmed miss,
        // and one with nothing to ask (every source skipped) is not a miss
        // at all.
        if !outcomes.is_empty() && !any_accepted && !any_rate_limited {
            state.not_found.push(key.to_string());
        }
    }

    /// Owned snapshot for end-of-run output.
    pub fn snapshot(&self) -> RunReport {
        let state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        RunReport {
            not_found: state.not_found.clone(),
            multiple_hits: state.multiple_hits.clone(),
            rate_limited: state.rate_limited.clone(),
            records_processed: state.records_processed,
            records_enriched: state.records_enriched,
            fields_changed: state.fields_changed,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}

impl Default for RunReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable end-of-run summary.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub not_found: Vec<String>,
    pub multiple_hits: Vec<MultipleHit>,
    pub rate_limited: Vec<RateLimitHit>,
    pub records_processed: usize,
    pub records_enriched: usize,
    pub fields_changed: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    /// Not-found report body: one key per line.
    pub fn render_not_found(&self) -> String {
        let mut out = self.not_found.join("\n");
        if !out.is_empty() {
            out.push('\n');
        }
        out
    }

    /// Multiple-hit report body: `key: source_name (N hits)` per line.
    pub fn render_multiple_hits(&self) -> String {
        let mut out = String::new();
        for hit in &self.multiple_hits {
            out.push_str(&format!("{}: {} ({} hits)\n", hit.key, hit.source, hit.hits));
        }
        out
    }

    pub fn write_not_found(&self, path: &Path) -> bibmend_common::Result<()> {
        std::fs::write(path, self.render_not_found())?;
        Ok(())
    }

    pub fn write_multiple_hits(&self, path: &Path) -> bibmend_common::Result<()> {
        std::fs::write(path, self.render_multiple_hits())?;
        Ok(())
    }

    /// Log the per-record findings and the run totals.
    pub fn log_summary(&self) {
        for key in &self.not_found {
            warn!("No matches found for '{}'", key);
        }
        for hit in &self.multiple_hits {
            warn!(
                "Entry '{}' matched multiple results: {} ({} hits)",
                hit.key, hit.source, hit.hits
            );
        }
        for hit in &self.rate_limited {
            match hit.status {
                Some(status) => warn!(
                    "Entry '{}': {} rate limited (HTTP {})",
                    hit.key, hit.source, status
                ),
                None => warn!("Entry '{}': {} rate limited", hit.key, hit.source),
            }
        }
        let elapsed = (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or_default();
        info!(
            "Processed {} entries in {:.1}s: {} enriched, {} fields updated, {} not found, {} rate limited",
            self.records_processed,
            elapsed.as_secs_f64(),
            self.records_enriched,
            self.fields_changed,
            self.not_found.len(),
            self.rate_limited.len()
        );
    }
}
