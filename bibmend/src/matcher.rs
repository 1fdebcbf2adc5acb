//! Similarity scoring between an input entry and lookup candidates
//!
//! Scores are in `[0.0, 1.0]`. DOI equality is authoritative and scores
//! [`CERTAIN_MATCH`] outright. Otherwise the score is built from normalized
//! title similarity, corroborated by author-surname overlap; a title below
//! [`TITLE_SIMILARITY_FLOOR`] scores zero no matter how well the authors
//! agree.

use crate::types::Candidate;
use bibmend_common::normalize::normalize_text;
use bibmend_common::{Author, Entry};

/// Score for an authoritative identifier match.
pub const CERTAIN_MATCH: f32 = 1.0;

/// Minimum title similarity for a candidate to be considered at all.
pub const TITLE_SIMILARITY_FLOOR: f32 = 0.75;

/// Weights for combining title similarity and author overlap.
const TITLE_WEIGHT: f32 = 0.7;
const AUTHOR_WEIGHT: f32 = 0.3;

/// Minimum normalized prefix length before a shorter title counts as the
/// subtitle-stripped form of a longer one.
const SUBTITLE_MIN_PREFIX: usize = 10;

/// Compute the match score between the record being enriched and one
/// candidate. `0.0` means reject.
pub fn score(input: &Entry, candidate: &Candidate) -> f32 {
    if let (Some(a), Some(b)) = (input.doi(), candidate.doi()) {
        if a == b {
            return CERTAIN_MATCH;
        }
    }

    let input_title = input
        .title()
        .map(normalize_text)
        .filter(|t| !t.is_empty());
    let candidate_title = candidate
        .title()
        .map(normalize_text)
        .filter(|t| !t.is_empty());
    let (input_title, candidate_title) = match (input_title, candidate_title) {
        (Some(a), Some(b)) => (a, b),
        _ => return 0.0,
    };

    let title = title_similarity(&input_title, &candidate_title);
    if title < TITLE_SIMILARITY_FLOOR {
        return 0.0;
    }

    match author_overlap(&input.authors(), &candidate.authors()) {
        Some(overlap) => TITLE_WEIGHT * title + AUTHOR_WEIGHT * overlap,
        None => title,
    }
}

/// The best candidate of one query attempt plus the ambiguity count.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub best: Option<Candidate>,
    pub score: f32,
    /// How many candidates cleared the threshold. More than one means the
    /// attempt was ambiguous (worth flagging, still resolved by top score).
    pub matches: usize,
}

/// Scan one attempt's candidates, keeping the maximum-scoring one.
/// Strictly-greater comparison, so ties keep the first candidate seen.
pub fn select_best(input: &Entry, candidates: Vec<Candidate>) -> Selection {
    let mut selection = Selection::default();
    for candidate in candidates {
        let score = score(input, &candidate);
        if score > 0.0 {
            selection.matches += 1;
        }
        if score > selection.score {
            selection.score = score;
            selection.best = Some(candidate);
        }
    }
    selection
}

/// Similarity of two already-normalized titles.
///
/// Equal titles and subtitle-style prefixes (the shorter title is the
/// longer one truncated at a word boundary) are full matches; everything
/// else falls back to normalized Levenshtein.
fn title_similarity(a: &str, b: &str) -> f32 {
    if a == b {
        return 1.0;
    }
    let (shorter, longer) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    if shorter.chars().count() >= SUBTITLE_MIN_PREFIX
        && longer.starts_with(shorter)
        && longer.as_bytes().get(shorter.len()) == Some(&b' ')
    {
        return 1.0;
    }
    strsim::normalized_levenshtein(a, b) as f32
}

/// Fraction of input authors whose normalized family name appears among
/// the candidate's. `None` when either side has no usable author names.
fn author_overlap(input: &[Author], candidate: &[Author]) -> Option<f32> {
    if input.is_empty() {
        return None;
    }
    let candidate_keys: Vec<String> = candidate
        .iter()
        .map(Author::family_key)
        .filter(|k| !k.is_empty())
        .collect();
    if candidate_keys.is_empty() {
        return None;
    }
    let matched = input
        .iter()
        .filter(|author| {
            let key = author.family_key();
            !key.is_empty() && candidate_keys.contains(&key)
        })
        .count();
    Some(matched as f32 / input.len() as f32)
}
