//! Run configuration
//!
//! Settings are resolved per value in priority order:
//! 1. Command-line flag (highest priority)
//! 2. Environment variable (mailto only, applied by clap)
//! 3. TOML configuration file
//! 4. Compiled default (fallback)

use crate::cli::Cli;
use crate::sources;
use crate::types::QueryScopes;
use bibmend_common::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Entries completed concurrently when --jobs is not given
pub const DEFAULT_JOBS: usize = 4;

/// Network requests in flight across all entries
pub const DEFAULT_MAX_REQUESTS: usize = 8;

/// Per-entry lookup deadline in seconds
pub const DEFAULT_TIMEOUT_SECS: f64 = 20.0;

/// TOML configuration file contents
///
/// Every section and value is optional; anything missing falls through to
/// the compiled defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub lookup: LookupSection,

    #[serde(default)]
    pub output: OutputSection,

    #[serde(default)]
    pub contact: ContactSection,
}

/// `[lookup]` section
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LookupSection {
    /// Source names in priority order
    #[serde(default)]
    pub sources: Option<Vec<String>>,

    /// Entries completed concurrently
    #[serde(default)]
    pub jobs: Option<usize>,

    /// Network requests in flight across all entries
    #[serde(default)]
    pub max_requests: Option<usize>,

    /// Per-entry deadline in seconds
    #[serde(default)]
    pub timeout_secs: Option<f64>,
}

/// `[output]` section
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputSection {
    /// Write "% bibmend:" provenance comments above changed entries
    #[serde(default)]
    pub annotate: Option<bool>,
}

/// `[contact]` section
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactSection {
    /// Contact address advertised to polite-pool APIs
    #[serde(default)]
    pub mailto: Option<String>,
}

impl TomlConfig {
    /// Load and parse a TOML configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config '{}': {}", path.display(), e))
        })?;
        toml::from_str(&text).map_err(|e| {
            Error::Config(format!("Failed to parse config '{}': {}", path.display(), e))
        })
    }
}

// ============================================================================
// Resolved settings
// ============================================================================

/// Where the completed bibliography is written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Path(PathBuf),
    Stdout,
}

/// Fully resolved settings for one run
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub input: PathBuf,
    pub output: OutputTarget,
    /// Source names in priority order
    pub sources: Vec<String>,
    pub scopes: QueryScopes,
    pub replace: bool,
    pub jobs: usize,
    pub max_requests: usize,
    pub timeout: Duration,
    pub annotate: bool,
    pub mailto: Option<String>,
    pub report_missing: Option<PathBuf>,
    pub report_multi: Option<PathBuf>,
}

impl RunConfig {
    /// Resolve the effective settings from CLI flags and the optional TOML file
    pub fn resolve(cli: &Cli) -> Result<Self> {
        let toml = match &cli.config {
            Some(path) => TomlConfig::load(path)?,
            None => TomlConfig::default(),
        };
        Self::resolve_with(cli, &toml)
    }

    fn resolve_with(cli: &Cli, toml: &TomlConfig) -> Result<Self> {
        let sources = resolve_sources(cli, toml)?;

        let scopes = QueryScopes {
            by_doi: !cli.no_doi_search,
            by_title_author: !cli.no_author_search,
            by_title: !cli.no_title_search,
        };
        if !scopes.any_enabled() {
            return Err(Error::Config(
                "all query modes are disabled; drop one of --no-doi-search, \
                 --no-author-search or --no-title-search"
                    .to_string(),
            ));
        }

        if cli.replace && cli.source.is_empty() {
            return Err(Error::Config(
                "--replace overwrites existing fields and requires an explicit \
                 --source list naming the sources to trust"
                    .to_string(),
            ));
        }

        let jobs = pick("jobs", cli.jobs, toml.lookup.jobs, DEFAULT_JOBS);
        if jobs == 0 {
            return Err(Error::Config("jobs must be at least 1".to_string()));
        }

        let max_requests = pick(
            "max_requests",
            cli.max_requests,
            toml.lookup.max_requests,
            DEFAULT_MAX_REQUESTS,
        );
        if max_requests == 0 {
            return Err(Error::Config("max_requests must be at least 1".to_string()));
        }

        let timeout_secs = pick(
            "timeout",
            cli.timeout,
            toml.lookup.timeout_secs,
            DEFAULT_TIMEOUT_SECS,
        );
        if !timeout_secs.is_finite() || timeout_secs <= 0.0 {
            return Err(Error::Config(
                "timeout must be a positive number of seconds".to_string(),
            ));
        }

        let mailto = pick_opt("mailto", cli.mailto.clone(), toml.contact.mailto.clone());

        let annotate = !cli.no_annotate && toml.output.annotate.unwrap_or(true);

        let output = resolve_output(cli)?;

        Ok(Self {
            input: cli.input.clone(),
            output,
            sources,
            scopes,
            replace: cli.replace,
            jobs,
            max_requests,
            timeout: Duration::from_secs_f64(timeout_secs),
            annotate,
            mailto,
            report_missing: cli.report_missing.clone(),
            report_multi: cli.report_multi.clone(),
        })
    }
}

/// Pick a value by priority, warning when more than one tier supplies one
fn pick<T: Copy>(name: &str, cli: Option<T>, toml: Option<T>, default: T) -> T {
    if cli.is_some() && toml.is_some() {
        warn!(
            "{} given on both the command line and in the config file. \
             Using the command line value (highest priority).",
            name
        );
    }
    cli.or(toml).unwrap_or(default)
}

fn pick_opt<T>(name: &str, cli: Option<T>, toml: Option<T>) -> Option<T> {
    if cli.is_some() && toml.is_some() {
        warn!(
            "{} given on both the command line and in the config file. \
             Using the command line value (highest priority).",
            name
        );
    }
    cli.or(toml)
}

/// Effective source list in priority order
///
/// --source replaces the list outright; --exclude filters the configured or
/// default list. Unknown names are fatal in either position so a typo never
/// silently drops a source.
fn resolve_sources(cli: &Cli, toml: &TomlConfig) -> Result<Vec<String>> {
    for name in cli.source.iter().chain(cli.exclude.iter()) {
        if !sources::is_known(name) {
            return Err(Error::Config(format!(
                "unknown source '{}' (known sources: {})",
                name,
                sources::DEFAULT_SOURCE_ORDER.join(", ")
            )));
        }
    }

    let mut selected: Vec<String> = if !cli.source.is_empty() {
        cli.source.clone()
    } else {
        let base = match &toml.lookup.sources {
            Some(list) => {
                for name in list {
                    if !sources::is_known(name) {
                        return Err(Error::Config(format!(
                            "unknown source '{}' in config file (known sources: {})",
                            name,
                            sources::DEFAULT_SOURCE_ORDER.join(", ")
                        )));
                    }
                }
                list.clone()
            }
            None => sources::DEFAULT_SOURCE_ORDER
                .iter()
                .map(|s| s.to_string())
                .collect(),
        };
        base.into_iter()
            .filter(|name| !cli.exclude.contains(name))
            .collect()
    };

    // Duplicates would query the same API twice per entry
    let mut seen = Vec::new();
    selected.retain(|name| {
        if seen.contains(name) {
            warn!("source '{}' listed more than once, keeping the first occurrence", name);
            false
        } else {
            seen.push(name.clone());
            true
        }
    });

    if selected.is_empty() {
        return Err(Error::Config(
            "no sources left to query; relax --exclude or pass --source".to_string(),
        ));
    }

    Ok(selected)
}

/// Output target from --output / --inplace, defaulting to a sibling file
fn resolve_output(cli: &Cli) -> Result<OutputTarget> {
    if cli.inplace {
        return Ok(OutputTarget::Path(cli.input.clone()));
    }
    match &cli.output {
        Some(path) if path.as_os_str() == "-" => Ok(OutputTarget::Stdout),
        Some(path) => Ok(OutputTarget::Path(path.clone())),
        None => Ok(OutputTarget::Path(default_output_path(&cli.input)?)),
    }
}

/// `refs.bib` becomes `refs.mend.bib` next to the input
fn default_output_path(input: &Path) -> Result<PathBuf> {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| {
            Error::Config(format!(
                "cannot derive an output name from '{}'; pass --output",
                input.display()
            ))
        })?;
    Ok(input.with_file_name(format!("{}.mend.bib", stem)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli(args: &[&str]) -> Cli {
        let mut full = vec!["bibmend"];
        full.extend_from_slice(args);
        full.push("refs.bib");
        Cli::try_parse_from(full).expect("valid args")
    }

    #[test]
    fn defaults_apply_when_nothing_is_given() {
        let config = RunConfig::resolve_with(&cli(&[]), &TomlConfig::default()).expect("resolves");
        assert_eq!(config.jobs, DEFAULT_JOBS);
        assert_eq!(config.max_requests, DEFAULT_MAX_REQUESTS);
        assert_eq!(config.timeout, Duration::from_secs_f64(DEFAULT_TIMEOUT_SECS));
        assert!(config.annotate);
        assert!(!config.replace);
        assert_eq!(config.sources, sources::DEFAULT_SOURCE_ORDER.to_vec());
        assert_eq!(
            config.output,
            OutputTarget::Path(PathBuf::from("refs.mend.bib"))
        );
    }

    #[test]
    fn command_line_outranks_the_config_file() {
        let toml: TomlConfig = toml::from_str(
            "[lookup]\njobs = 2\ntimeout_secs = 5.0\n\n[contact]\nmailto = \"toml@example.org\"\n",
        )
        .expect("valid toml");
        let config = RunConfig::resolve_with(
            &cli(&["--jobs", "6", "--mailto", "cli@example.org"]),
            &toml,
        )
        .expect("resolves");
        assert_eq!(config.jobs, 6);
        assert_eq!(config.timeout, Duration::from_secs_f64(5.0));
        assert_eq!(config.mailto.as_deref(), Some("cli@example.org"));
    }

    #[test]
    fn explicit_sources_replace_the_list() {
        let config = RunConfig::resolve_with(
            &cli(&["-s", "dblp", "-s", "crossref"]),
            &TomlConfig::default(),
        )
        .expect("resolves");
        assert_eq!(config.sources, vec!["dblp".to_string(), "crossref".to_string()]);
    }

    #[test]
    fn exclude_filters_the_default_list() {
        let config = RunConfig::resolve_with(
            &cli(&["-x", "zbmath", "-x", "arxiv"]),
            &TomlConfig::default(),
        )
        .expect("resolves");
        assert!(!config.sources.contains(&"zbmath".to_string()));
        assert!(!config.sources.contains(&"arxiv".to_string()));
        assert_eq!(config.sources.len(), sources::DEFAULT_SOURCE_ORDER.len() - 2);
    }

    #[test]
    fn unknown_source_names_are_fatal() {
        let err = RunConfig::resolve_with(&cli(&["-s", "scholar"]), &TomlConfig::default())
            .expect_err("must fail");
        assert!(err.to_string().contains("unknown source 'scholar'"));

        let err = RunConfig::resolve_with(&cli(&["-x", "scholar"]), &TomlConfig::default())
            .expect_err("must fail");
        assert!(err.to_string().contains("unknown source 'scholar'"));
    }

    #[test]
    fn excluding_everything_is_fatal() {
        let args: Vec<String> = sources::DEFAULT_SOURCE_ORDER
            .iter()
            .flat_map(|name| ["-x".to_string(), name.to_string()])
            .collect();
        let mut full: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
        full.insert(0, "bibmend");
        full.push("refs.bib");
        let cli = Cli::try_parse_from(full).expect("valid args");
        let err =
            RunConfig::resolve_with(&cli, &TomlConfig::default()).expect_err("must fail");
        assert!(err.to_string().contains("no sources left"));
    }

    #[test]
    fn duplicate_sources_keep_the_first_occurrence() {
        let config = RunConfig::resolve_with(
            &cli(&["-s", "dblp", "-s", "crossref", "-s", "dblp"]),
            &TomlConfig::default(),
        )
        .expect("resolves");
        assert_eq!(config.sources, vec!["dblp".to_string(), "crossref".to_string()]);
    }

    #[test]
    fn disabling_every_query_mode_is_fatal() {
        let err = RunConfig::resolve_with(
            &cli(&["--no-doi-search", "--no-author-search", "--no-title-search"]),
            &TomlConfig::default(),
        )
        .expect_err("must fail");
        assert!(err.to_string().contains("all query modes"));
    }

    #[test]
    fn replace_requires_an_explicit_source_list() {
        let err = RunConfig::resolve_with(&cli(&["--replace"]), &TomlConfig::default())
            .expect_err("must fail");
        assert!(err.to_string().contains("--replace"));

        let config = RunConfig::resolve_with(
            &cli(&["--replace", "-s", "crossref"]),
            &TomlConfig::default(),
        )
        .expect("resolves");
        assert!(config.replace);
    }

    #[test]
    fn zero_and_negative_limits_are_rejected() {
        assert!(RunConfig::resolve_with(&cli(&["--jobs", "0"]), &TomlConfig::default()).is_err());
        assert!(
            RunConfig::resolve_with(&cli(&["--max-requests", "0"]), &TomlConfig::default())
                .is_err()
        );
        assert!(
            RunConfig::resolve_with(&cli(&["--timeout", "0"]), &TomlConfig::default()).is_err()
        );
        let toml: TomlConfig =
            toml::from_str("[lookup]\ntimeout_secs = -3.5\n").expect("valid toml");
        assert!(RunConfig::resolve_with(&cli(&[]), &toml).is_err());
    }

    #[test]
    fn output_flags_resolve_to_targets() {
        let config =
            RunConfig::resolve_with(&cli(&["-o", "-"]), &TomlConfig::default()).expect("resolves");
        assert_eq!(config.output, OutputTarget::Stdout);

        let config = RunConfig::resolve_with(&cli(&["--inplace"]), &TomlConfig::default())
            .expect("resolves");
        assert_eq!(config.output, OutputTarget::Path(PathBuf::from("refs.bib")));

        let config = RunConfig::resolve_with(&cli(&["-o", "done.bib"]), &TomlConfig::default())
            .expect("resolves");
        assert_eq!(config.output, OutputTarget::Path(PathBuf::from("done.bib")));
    }

    #[test]
    fn annotate_can_be_disabled_from_either_tier() {
        let config = RunConfig::resolve_with(&cli(&["--no-annotate"]), &TomlConfig::default())
            .expect("resolves");
        assert!(!config.annotate);

        let toml: TomlConfig =
            toml::from_str("[output]\nannotate = false\n").expect("valid toml");
        let config = RunConfig::resolve_with(&cli(&[]), &toml).expect("resolves");
        assert!(!config.annotate);
    }

    #[test]
    fn config_file_sources_are_validated_and_excludable() {
        let toml: TomlConfig =
            toml::from_str("[lookup]\nsources = [\"dblp\", \"openalex\"]\n").expect("valid toml");
        let config =
            RunConfig::resolve_with(&cli(&["-x", "dblp"]), &toml).expect("resolves");
        assert_eq!(config.sources, vec!["openalex".to_string()]);

        let toml: TomlConfig =
            toml::from_str("[lookup]\nsources = [\"nope\"]\n").expect("valid toml");
        let err = RunConfig::resolve_with(&cli(&[]), &toml).expect_err("must fail");
        assert!(err.to_string().contains("unknown source 'nope'"));
    }

    #[test]
    fn weird_input_names_still_get_an_output_path() {
        assert_eq!(
            default_output_path(Path::new("a/b/library.bib")).expect("derives"),
            PathBuf::from("a/b/library.mend.bib")
        );
        assert_eq!(
            default_output_path(Path::new("noext")).expect("derives"),
            PathBuf::from("noext.mend.bib")
        );
    }
}
