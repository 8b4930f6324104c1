//! Cross-detector span merging.
//!
//! When several detectors run over the same text their outputs overlap.
//! [`merge_spans`] folds them into one list where overlaps are settled by
//! an explicit per-type source preference, then span length, then score.

use super::entity::EntityType;
use super::span::Span;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::debug;

/// Preferred detector source per entity type.
///
/// ```
/// use phi_redactor::domain::{EntityType, SourcePreference};
///
/// let prefer = SourcePreference::default().prefer(EntityType::Person, "stanford");
/// assert_eq!(prefer.preferred(&EntityType::Person), Some("stanford"));
/// assert_eq!(prefer.preferred(&EntityType::Email), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourcePreference(BTreeMap<EntityType, String>);

impl SourcePreference {
    /// Prefers `source` whenever a span of `entity_type` is in a conflict.
    pub fn prefer(mut self, entity_type: EntityType, source: impl Into<String>) -> Self {
        self.0.insert(entity_type, source.into());
        self
    }

    pub fn preferred(&self, entity_type: &EntityType) -> Option<&str> {
        self.0.get(entity_type).map(String::as_str)
    }
}

/// Merges one or more detector outputs into a single span list.
///
/// Candidates are scanned in `(start, -length, -score)` order. A candidate
/// that overlaps an accepted span competes with the first such span only:
///
/// 1. if exactly one of the two spans comes from the source preferred for
///    its type, that span wins;
/// 2. otherwise the longer span wins;
/// 3. otherwise the strictly higher score wins.
///
/// Ties keep the span accepted first, so the result is stable with respect
/// to scan order. The output is sorted by `(start, end)`.
pub fn merge_spans(sets: &[Vec<Span>], prefer: &SourcePreference) -> Vec<Span> {
    let mut candidates: Vec<Span> = sets.iter().flatten().cloned().collect();
    candidates.sort_by(scan_order);

    let mut merged: Vec<Span> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        match merged.iter().position(|accepted| accepted.overlaps(&candidate)) {
            Some(idx) => {
                if candidate_wins(&candidate, &merged[idx], prefer) {
                    debug!(
                        winner = %candidate.entity_type,
                        start = candidate.start,
                        end = candidate.end,
                        "overlapping span replaced"
                    );
                    merged.remove(idx);
                    merged.push(candidate);
                }
            }
            None => merged.push(candidate),
        }
    }

    merged.sort_by_key(|s| (s.start, s.end));
    merged
}

fn scan_order(a: &Span, b: &Span) -> Ordering {
    a.start
        .cmp(&b.start)
        .then_with(|| b.len().cmp(&a.len()))
        .then_with(|| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal))
}

fn candidate_wins(candidate: &Span, accepted: &Span, prefer: &SourcePreference) -> bool {
    let from_preferred = |span: &Span| {
        prefer
            .preferred(&span.entity_type)
            .is_some_and(|source| span.source == source)
    };
    match (from_preferred(candidate), from_preferred(accepted)) {
        (true, false) => return true,
        (false, true) => return false,
        _ => {}
    }
    if candidate.len() != accepted.len() {
        return candidate.len() > accepted.len();
    }
    candidate.score > accepted.score
}
