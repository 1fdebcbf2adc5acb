//! bibmend - BibTeX completion tool
//!
//! Reads a .bib file, queries scholarly metadata APIs for fields the
//! entries are missing, and writes the completed bibliography.

use anyhow::{Context, Result};
use clap::Parser;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use bibmend::batch::BatchRunner;
use bibmend::bibtex;
use bibmend::cli::Cli;
use bibmend::config::{OutputTarget, RunConfig};
use bibmend::dispatch::Dispatcher;
use bibmend::merge::MergeMode;
use bibmend::report::RunReporter;
use bibmend::sources;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; RUST_LOG overrides the -v flags
    let default_filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    info!("Starting bibmend v{}", env!("CARGO_PKG_VERSION"));

    let config = RunConfig::resolve(&cli)?;

    let mut bibliography = bibtex::read_file(&config.input)
        .with_context(|| format!("Failed to read '{}'", config.input.display()))?;
    info!(
        "Read {} entries from '{}'",
        bibliography.entry_count(),
        config.input.display()
    );

    let enabled = sources::build_sources(&config.sources, config.mailto.as_deref())?;
    info!("Sources enabled: {}", config.sources.join(", "));

    // Replace runs requery every source, including those whose declared
    // fields the entry already has.
    let dispatcher = Arc::new(
        Dispatcher::new(enabled, config.scopes, config.max_requests, config.timeout)
            .with_skip_satisfied(!config.replace),
    );
    let reporter = Arc::new(RunReporter::new());
    let mode = if config.replace {
        MergeMode::ReplaceComplete
    } else {
        MergeMode::FillOnly
    };
    let runner = BatchRunner::new(dispatcher, Arc::clone(&reporter), mode, config.jobs);

    let annotations = runner.run(&mut bibliography).await;
    let annotations = if config.annotate {
        annotations
    } else {
        BTreeMap::new()
    };
    let rendered = bibtex::render(&bibliography, &annotations);

    match &config.output {
        OutputTarget::Stdout => print!("{}", rendered),
        OutputTarget::Path(path) => {
            std::fs::write(path, &rendered)
                .with_context(|| format!("Failed to write '{}'", path.display()))?;
            info!("Wrote completed bibliography to '{}'", path.display());
        }
    }

    let report = reporter.snapshot();
    if let Some(path) = &config.report_missing {
        report
            .write_not_found(path)
            .with_context(|| format!("Failed to write '{}'", path.display()))?;
        info!("Wrote not-found report to '{}'", path.display());
    }
    if let Some(path) = &config.report_multi {
        report
            .write_multiple_hits(path)
            .with_context(|| format!("Failed to write '{}'", path.display()))?;
        info!("Wrote multiple-hit report to '{}'", path.display());
    }
    report.log_summary();

    Ok(())
}
