//! Integration tests for the concurrency budgets
//!
//! The request budget caps in-flight network calls across every source and
//! entry; the worker budget caps how many entries are dispatched at once.

use async_trait::async_trait;
use bibmend::batch::BatchRunner;
use bibmend::bibtex;
use bibmend::dispatch::Dispatcher;
use bibmend::merge::MergeMode;
use bibmend::report::RunReporter;
use bibmend::types::{ParsedBatch, QueryScopes, QuerySpec, RawResponse, Source, SourceError};
use bibmend_common::{Entry, FieldName};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Lookup stub that records how many of its requests run at the same time.
struct GaugedSource {
    name: &'static str,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl GaugedSource {
    fn new(name: &'static str, in_flight: Arc<AtomicUsize>, peak: Arc<AtomicUsize>) -> Self {
        Self {
            name,
            in_flight,
            peak,
        }
    }
}

#[async_trait]
impl Source for GaugedSource {
    fn name(&self) -> &'static str {
        self.name
    }

    fn declared_fields(&self) -> &'static [FieldName] {
        &[FieldName::Doi]
    }

    async fn execute(&self, _spec: &QuerySpec) -> Result<RawResponse, SourceError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(15)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(RawResponse {
            status: 200,
            body: Vec::new(),
        })
    }

    fn parse(&self, _raw: &RawResponse) -> Result<ParsedBatch, SourceError> {
        Ok(ParsedBatch::from_candidates(Vec::new()))
    }
}

fn searchable_entry(key: &str) -> Entry {
    let mut entry = Entry::new("article", key);
    entry.fields.set(FieldName::Title, "A Perfectly Ordinary Title");
    entry.fields.set(FieldName::Author, "Doe, Jane");
    entry
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn request_budget_caps_concurrent_calls_across_sources() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    // Eight sources, two attempts each, three permits: sixteen calls have
    // to squeeze through a window of three.
    const NAMES: [&str; 8] = [
        "lookup0", "lookup1", "lookup2", "lookup3", "lookup4", "lookup5", "lookup6", "lookup7",
    ];
    let sources: Vec<Arc<dyn Source>> = NAMES
        .iter()
        .map(|name| {
            Arc::new(GaugedSource::new(
                name,
                Arc::clone(&in_flight),
                Arc::clone(&peak),
            )) as Arc<dyn Source>
        })
        .collect();

    let dispatcher = Dispatcher::new(sources, QueryScopes::default(), 3, Duration::from_secs(10));
    let outcomes = dispatcher.run(&searchable_entry("budget1")).await;

    assert_eq!(outcomes.len(), 8);
    let observed = peak.load(Ordering::SeqCst);
    assert!(observed >= 1);
    assert!(observed <= 3, "peak of {} in-flight requests exceeded the budget", observed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn worker_budget_caps_entries_in_flight() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    // One source per entry and a generous request budget, so any
    // concurrency above two would have to come from extra workers.
    let source = GaugedSource::new("lookup", Arc::clone(&in_flight), Arc::clone(&peak));
    let dispatcher = Arc::new(Dispatcher::new(
        vec![Arc::new(source)],
        QueryScopes::default(),
        16,
        Duration::from_secs(10),
    ));
    let reporter = Arc::new(RunReporter::new());
    let runner = BatchRunner::new(dispatcher, Arc::clone(&reporter), MergeMode::FillOnly, 2);

    let body: String = (0..6)
        .map(|i| {
            format!(
                "@article{{k{},\n\ttitle = {{Title Number {}}},\n\tauthor = {{Doe, Jane}},\n}}\n\n",
                i, i
            )
        })
        .collect();
    let mut bibliography = bibtex::parse(&body).expect("parses");
    runner.run(&mut bibliography).await;

    assert_eq!(reporter.snapshot().records_processed, 6);
    let observed = peak.load(Ordering::SeqCst);
    assert!(observed <= 2, "peak of {} entries in flight exceeded the worker budget", observed);
}
