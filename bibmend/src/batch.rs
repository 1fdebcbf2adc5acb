//! Batch driver: concurrent completion of a whole bibliography
//!
//! Entries are dispatched under a worker budget and folded back into the
//! bibliography in input order, no matter which task finishes first. A
//! panicking task loses its own entry's results and nothing else.

use crate::bibtex::Bibliography;
use crate::dispatch::Dispatcher;
use crate::merge::{merge, MergeMode, MergedEntry};
use crate::report::RunReporter;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

/// Runs the lookup pipeline over every entry of a bibliography.
pub struct BatchRunner {
    dispatcher: Arc<Dispatcher>,
    reporter: Arc<RunReporter>,
    mode: MergeMode,
    jobs: usize,
}

impl BatchRunner {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        reporter: Arc<RunReporter>,
        mode: MergeMode,
        jobs: usize,
    ) -> Self {
        Self {
            dispatcher,
            reporter,
            mode,
            jobs: jobs.max(1),
        }
    }

    /// Complete every entry in place.
    ///
    /// Returns the annotation text for entries the merge changed, keyed by
    /// the entry's position in the bibliography so duplicate keys stay
    /// distinct, for the writer to place above each entry.
    pub async fn run(&self, bibliography: &mut Bibliography) -> BTreeMap<usize, String> {
        let entries: Vec<_> = bibliography.entries().cloned().collect();
        let total = entries.len();
        info!("Looking up {} entries ({} workers)", total, self.jobs);

        let workers = Arc::new(Semaphore::new(self.jobs));
        let mut handles = Vec::with_capacity(total);
        for (index, entry) in entries.into_iter().enumerate() {
            let dispatcher = Arc::clone(&self.dispatcher);
            let reporter = Arc::clone(&self.reporter);
            let workers = Arc::clone(&workers);
            let mode = self.mode;
            handles.push(tokio::spawn(async move {
                let outcomes = match workers.acquire_owned().await {
                    Ok(_permit) => {
                        debug!("Looking up '{}'", entry.key);
                        dispatcher.run(&entry).await
                    }
                    Err(_) => {
                        error!("worker semaphore closed, skipping '{}'", entry.key);
                        Vec::new()
                    }
                };
                let merged = merge(&entry, &outcomes, mode);
                reporter.record(&entry.key, &outcomes, &merged);
                if merged.changed() > 0 {
                    info!("'{}': {} fields updated", entry.key, merged.changed());
                }
                (index, merged)
            }));
        }

        let mut results: Vec<Option<MergedEntry>> = Vec::new();
        results.resize_with(total, || None);
        for handle in handles {
            match handle.await {
                Ok((index, merged)) => results[index] = Some(merged),
                Err(err) => error!("Lookup task failed: {}", err),
            }
        }

        let mut annotations = BTreeMap::new();
        for (index, (entry, result)) in bibliography.entries_mut().zip(results).enumerate() {
            if let Some(merged) = result {
                if let Some(text) = merged.annotation() {
                    annotations.insert(index, text);
                }
                *entry = merged.entry;
            }
        }
        annotations
    }
}
