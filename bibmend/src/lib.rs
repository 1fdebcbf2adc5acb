//! bibmend library interface
//!
//! Exposes the completion pipeline for integration testing: BibTeX parsing
//! and writing, the source registry, per-entry dispatch, merging, and run
//! reporting.

pub mod batch;
pub mod bibtex;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod matcher;
pub mod merge;
pub mod report;
pub mod sources;
pub mod types;

pub use crate::bibtex::{Bibliography, Block};
pub use crate::config::{OutputTarget, RunConfig};
pub use crate::merge::{MergeMode, MergedEntry};
pub use crate::types::{Candidate, QueryOutcome, Source};
