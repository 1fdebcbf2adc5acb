//! Field-level merge of accepted candidates into one output entry
//!
//! The merge is a fold over the per-source outcomes in configured priority
//! order: for each field, the earliest source that supplies it wins. Mode
//! decides whether values already present in the input may be replaced.

use crate::types::QueryOutcome;
use bibmend_common::{Entry, FieldName};
use std::collections::{BTreeMap, BTreeSet};

/// Whether lookup results may replace values the input already has.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// Only fill fields the input is missing (or holds placeholders for).
    FillOnly,
    /// Field-by-field, the highest-priority source that supplies a field
    /// overrides the input's value; fields nobody supplies keep their
    /// original value. Key and entry type are never replaced.
    ReplaceComplete,
}

/// One merged entry plus, per changed field, the source that supplied it.
#[derive(Debug, Clone)]
pub struct MergedEntry {
    pub entry: Entry,
    pub provenance: BTreeMap<FieldName, String>,
}

impl MergedEntry {
    /// Number of fields the merge changed.
    pub fn changed(&self) -> usize {
        self.provenance.len()
    }

    /// Annotation text for the writer: `bibmend: doi from crossref, ...`
    /// in field order. `None` when nothing changed.
    pub fn annotation(&self) -> Option<String> {
        if self.provenance.is_empty() {
            return None;
        }
        let parts: Vec<String> = self
            .provenance
            .iter()
            .map(|(field, source)| format!("{} from {}", field, source))
            .collect();
        Some(format!("bibmend: {}", parts.join(", ")))
    }
}

/// Merge the accepted candidates into the input entry.
///
/// `outcomes` must already be in field-priority order (the dispatcher
/// returns them that way); completion order plays no part here.
pub fn merge(input: &Entry, outcomes: &[(String, QueryOutcome)], mode: MergeMode) -> MergedEntry {
    let mut entry = input.clone();
    let mut provenance: BTreeMap<FieldName, String> = BTreeMap::new();
    // A field is claimed by the earliest source that supplies it, even when
    // the supplied value equals the input's and records no change.
    let mut settled: BTreeSet<FieldName> = BTreeSet::new();

    for (source, outcome) in outcomes {
        let candidate = match &outcome.accepted {
            Some(candidate) => candidate,
            None => continue,
        };
        for (field, value) in candidate.fields.iter() {
            if settled.contains(&field) {
                continue;
            }
            if mode == MergeMode::FillOnly && input.fields.has_content(field) {
                continue;
            }
            settled.insert(field);
            if input.fields.get(field) == Some(value) {
                continue;
            }
            entry.fields.set(field, value);
            provenance.insert(field, source.clone());
        }
    }

    MergedEntry { entry, provenance }
}
