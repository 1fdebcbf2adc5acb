//! Command line interface
//!
//! Options that have a configuration-file counterpart are declared without
//! a clap default so the resolver in [`config`](crate::config) can tell
//! "flag given" apart from "use the next tier".

use clap::Parser;
use std::path::PathBuf;

/// Complete BibTeX entries from scholarly metadata APIs
#[derive(Parser, Debug)]
#[clap(name = "bibmend", version)]
#[clap(about = "Completes BibTeX entries by querying scholarly metadata APIs")]
pub struct Cli {
    /// Input .bib file
    #[clap(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output path, '-' for stdout [default: <input stem>.mend.bib]
    #[clap(short, long, value_name = "FILE", conflicts_with = "inplace")]
    pub output: Option<PathBuf>,

    /// Rewrite the input file in place
    #[clap(short, long)]
    pub inplace: bool,

    /// Enable only these sources, in priority order (repeatable)
    #[clap(short, long, value_name = "NAME")]
    pub source: Vec<String>,

    /// Disable these sources (repeatable)
    #[clap(short = 'x', long, value_name = "NAME", conflicts_with = "source")]
    pub exclude: Vec<String>,

    /// Overwrite existing field values with looked-up ones; requires an
    /// explicit --source list
    #[clap(short = 'R', long)]
    pub replace: bool,

    /// Skip identifier (DOI) query attempts
    #[clap(long)]
    pub no_doi_search: bool,

    /// Skip title+author query attempts
    #[clap(long)]
    pub no_author_search: bool,

    /// Skip title-only query attempts
    #[clap(long)]
    pub no_title_search: bool,

    /// Entries processed concurrently [default: 4]
    #[clap(short, long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Network requests in flight across all entries [default: 8]
    #[clap(long, value_name = "N")]
    pub max_requests: Option<usize>,

    /// Per-entry timeout in seconds [default: 20]
    #[clap(short, long, value_name = "SECONDS")]
    pub timeout: Option<f64>,

    /// Do not write "% bibmend:" comments above changed entries
    #[clap(long)]
    pub no_annotate: bool,

    /// Write keys that matched nothing to this file
    #[clap(long, value_name = "FILE")]
    pub report_missing: Option<PathBuf>,

    /// Write ambiguous matches ("key: source (N hits)") to this file
    #[clap(long, value_name = "FILE")]
    pub report_multi: Option<PathBuf>,

    /// TOML configuration file
    #[clap(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Contact address advertised to polite-pool APIs
    #[clap(long, value_name = "EMAIL", env = "BIBMEND_MAILTO")]
    pub mailto: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[clap(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_invocation_parses() {
        let cli = Cli::try_parse_from(["bibmend", "refs.bib"]).expect("valid args");
        assert_eq!(cli.input, PathBuf::from("refs.bib"));
        assert!(cli.output.is_none());
        assert!(!cli.replace);
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn sources_accumulate_in_order() {
        let cli = Cli::try_parse_from(["bibmend", "-s", "dblp", "-s", "crossref", "refs.bib"])
            .expect("valid args");
        assert_eq!(cli.source, vec!["dblp".to_string(), "crossref".to_string()]);
    }

    #[test]
    fn output_conflicts_with_inplace() {
        assert!(Cli::try_parse_from(["bibmend", "-o", "out.bib", "--inplace", "refs.bib"]).is_err());
    }

    #[test]
    fn source_conflicts_with_exclude() {
        assert!(Cli::try_parse_from(["bibmend", "-s", "dblp", "-x", "zbmath", "refs.bib"]).is_err());
    }

    #[test]
    fn verbosity_counts_occurrences() {
        let cli = Cli::try_parse_from(["bibmend", "-vv", "refs.bib"]).expect("valid args");
        assert_eq!(cli.verbose, 2);
    }
}
