//! Clinical domain filter.
//!
//! Decides which detected spans are true positives to redact. Rules run in
//! a fixed order, and the order changes the output:
//!
//! 0. PERSON cleanup: trim name spans to the leading run of name-like words
//! 1. preserve list: relative times, durations, history context, young ages,
//!    reviewer allow list
//! 2. false-positive list: bare duration words, context-free 5-digit numbers,
//!    clinical vocabulary, one- and two-letter names
//! 3. same-position conflicts: one span per `(start, end)`, by priority
//! 4. nested-entity removal: subordinate types inside container types
//!
//! A last pass settles any partial overlaps left after step 4. Reviewer
//! flags absorb whatever they overlap; other spans go through the merger's
//! winner rule, so later stages see disjoint, sorted spans.

use super::entity::EntityType;
use super::merge::{merge_spans, SourcePreference};
use super::span::{Span, TextIndex};
use crate::config::FilterConfig;
use crate::error::RedactorResult;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Why a span was removed from the redaction set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    EmptyName,
    Preserved,
    AllowListed,
    FalsePositive,
    PositionConflict,
    Nested,
    Overlap,
    /// Folded into an overlapping reviewer flag.
    AbsorbedByFlag,
}

/// Result of running the filter over one document.
#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    /// Retained spans, disjoint and sorted by start.
    pub spans: Vec<Span>,
    pub dropped: Vec<(Span, DropReason)>,
}

impl FilterOutcome {
    /// Number of spans dropped for `reason`.
    pub fn dropped_for(&self, reason: DropReason) -> usize {
        self.dropped.iter().filter(|(_, r)| *r == reason).count()
    }
}

/// Compiled, immutable domain filter.
#[derive(Debug, Clone)]
pub struct DomainFilter {
    relative_times: HashSet<String>,
    duration_patterns: Vec<Regex>,
    duration_context_window: usize,
    duration_markers: Vec<String>,
    duration_in_text: Regex,
    history_context_window: usize,
    history_keywords: Vec<String>,
    bare_duration: Regex,
    clinical_vocabulary: HashSet<String>,
    min_entity_length: usize,
    short_entity_types: HashSet<EntityType>,
    zip_context_window: usize,
    zip_context: Regex,
    priorities: BTreeMap<EntityType, i32>,
    container_types: HashSet<EntityType>,
    subordinate_types: HashSet<EntityType>,
    age_ceiling: u32,
}

fn name_pattern() -> &'static Regex {
    static PATTERN: Lazy<Regex> = Lazy::new(|| {
        let word = r"(?:\p{Lu}[\p{L}'\-]*\p{Ll}\p{L}*|\p{Lu}(?:\.|\b))";
        Regex::new(&format!(r"^{word}(?:[ \t]+{word})*")).expect("Valid name regex")
    });
    &PATTERN
}

fn five_digits() -> &'static Regex {
    static PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{5}$").expect("Valid regex"));
    &PATTERN
}

fn digits() -> &'static Regex {
    static PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+").expect("Valid regex"));
    &PATTERN
}

fn case_insensitive(pattern: &str) -> RedactorResult<Regex> {
    Ok(RegexBuilder::new(pattern).case_insensitive(true).build()?)
}

impl DomainFilter {
    /// Compiles the filter tables. Fails only on an invalid pattern.
    pub fn new(config: &FilterConfig, age_ceiling: u32) -> RedactorResult<Self> {
        Ok(Self {
            relative_times: config
                .relative_times
                .iter()
                .map(|s| s.to_lowercase())
                .collect(),
            duration_patterns: config
                .duration_patterns
                .iter()
                .map(|p| case_insensitive(p))
                .collect::<RedactorResult<_>>()?,
            duration_context_window: config.duration_context_window,
            duration_markers: config.duration_markers.clone(),
            duration_in_text: case_insensitive(&config.duration_in_text_pattern)?,
            history_context_window: config.history_context_window,
            history_keywords: config.history_keywords.clone(),
            bare_duration: case_insensitive(&config.bare_duration_pattern)?,
            clinical_vocabulary: config
                .clinical_vocabulary
                .iter()
                .map(|s| s.to_lowercase())
                .collect(),
            min_entity_length: config.min_entity_length,
            short_entity_types: config.short_entity_types.iter().cloned().collect(),
            zip_context_window: config.zip_context_window,
            zip_context: Regex::new(&config.zip_context_pattern)?,
            priorities: config.priorities.clone(),
            container_types: config.container_types.iter().cloned().collect(),
            subordinate_types: config.subordinate_types.iter().cloned().collect(),
            age_ceiling,
        })
    }

    /// Runs every rule in order over `spans`.
    ///
    /// `allow_list` holds reviewer-approved strings that must never be
    /// redacted; it is folded into the preserve step.
    pub fn apply(&self, index: &TextIndex<'_>, spans: Vec<Span>, allow_list: &[String]) -> FilterOutcome {
        let mut outcome = FilterOutcome::default();
        let allow: HashSet<&str> = allow_list.iter().map(|s| s.trim()).collect();

        let mut candidates = Vec::with_capacity(spans.len());
        for span in spans {
            match self.clean_person(index, span) {
                Ok(span) => candidates.push(span),
                Err(span) => outcome.dropped.push((span, DropReason::EmptyName)),
            }
        }

        let mut kept = Vec::with_capacity(candidates.len());
        for span in candidates {
            let text = index.span_text(&span).trim();
            let reason = if allow.contains(text) {
                Some(DropReason::AllowListed)
            } else if self.should_preserve(index, &span, text) {
                Some(DropReason::Preserved)
            } else if self.is_false_positive(index, &span, text) {
                Some(DropReason::FalsePositive)
            } else {
                None
            };

            match reason {
                Some(reason) => {
                    debug!(entity = %span.entity_type, start = span.start, ?reason, "span dropped");
                    outcome.dropped.push((span, reason));
                }
                None => kept.push(span),
            }
        }

        let kept = self.resolve_conflicts(kept, &mut outcome.dropped);
        let kept = self.remove_nested(kept, &mut outcome.dropped);
        let kept = absorb_into_flags(kept, &mut outcome.dropped);

        let disjoint = merge_spans(&[kept.clone()], &SourcePreference::default());
        if disjoint.len() != kept.len() {
            for span in kept {
                if !disjoint.contains(&span) {
                    outcome.dropped.push((span, DropReason::Overlap));
                }
            }
        }
        outcome.spans = disjoint;
        outcome
    }

    /// Trims a PERSON span to the maximal leading run of name-like words.
    ///
    /// Returns `Err` with the original span when nothing is left after
    /// trimming leading whitespace.
    pub fn clean_person(&self, index: &TextIndex<'_>, span: Span) -> Result<Span, Span> {
        if !span.entity_type.is_person() {
            return Ok(span);
        }

        let text = index.span_text(&span);
        let leading = text.chars().take_while(|c| c.is_whitespace()).count();
        let start = span.start + leading;
        if start >= span.end {
            return Err(span);
        }

        let rest = index.slice(start, span.end);
        let end = match name_pattern().find(rest) {
            Some(found) => start + found.as_str().chars().count(),
            None => span.end,
        };

        Ok(Span { start, end, ..span })
    }

    fn should_preserve(&self, index: &TextIndex<'_>, span: &Span, text: &str) -> bool {
        match span.entity_type {
            EntityType::DateTime => {
                let lower = text.to_lowercase();
                if self.relative_times.contains(&lower) {
                    return true;
                }
                if self.duration_patterns.iter().any(|p| p.is_match(text)) {
                    return true;
                }

                let near = index
                    .left_context(span.start, self.duration_context_window)
                    .to_lowercase();
                if self.duration_markers.iter().any(|m| near.contains(m.as_str()))
                    && self.duration_in_text.is_match(text)
                {
                    return true;
                }

                let history = index
                    .left_context(span.start, self.history_context_window)
                    .to_lowercase();
                self.history_keywords
                    .iter()
                    .any(|k| history.contains(k.as_str()))
            }
            EntityType::Age => digits()
                .find(text)
                .and_then(|m| m.as_str().parse::<u64>().ok())
                .is_some_and(|age| age < u64::from(self.age_ceiling)),
            _ => false,
        }
    }

    fn is_false_positive(&self, index: &TextIndex<'_>, span: &Span, text: &str) -> bool {
        match span.entity_type {
            EntityType::DateTime => {
                if self.bare_duration.is_match(text) || five_digits().is_match(text) {
                    return true;
                }
            }
            EntityType::ZipCode => {
                if five_digits().is_match(text) {
                    let context = index.left_context(span.start, self.zip_context_window);
                    if !self.zip_context.is_match(context) {
                        return true;
                    }
                }
            }
            _ => {}
        }

        if self.short_entity_types.contains(&span.entity_type) {
            if text.chars().count() < self.min_entity_length {
                return true;
            }
            if self.clinical_vocabulary.contains(&text.to_lowercase()) {
                return true;
            }
        }

        false
    }

    fn priority(&self, entity_type: &EntityType) -> i32 {
        self.priorities.get(entity_type).copied().unwrap_or(0)
    }

    /// Keeps the highest-priority span for every identical `(start, end)`.
    /// Equal priorities keep the span seen first.
    fn resolve_conflicts(&self, spans: Vec<Span>, dropped: &mut Vec<(Span, DropReason)>) -> Vec<Span> {
        let mut by_position: BTreeMap<(usize, usize), Vec<Span>> = BTreeMap::new();
        for span in spans {
            by_position.entry((span.start, span.end)).or_default().push(span);
        }

        let mut resolved = Vec::with_capacity(by_position.len());
        for (_, candidates) in by_position {
            let mut candidates = candidates.into_iter();
            let Some(mut best) = candidates.next() else {
                continue;
            };
            for candidate in candidates {
                if self.priority(&candidate.entity_type) > self.priority(&best.entity_type) {
                    dropped.push((std::mem::replace(&mut best, candidate), DropReason::PositionConflict));
                } else {
                    dropped.push((candidate, DropReason::PositionConflict));
                }
            }
            resolved.push(best);
        }
        resolved
    }

    /// Drops subordinate-type spans nested inside retained container spans.
    fn remove_nested(&self, mut spans: Vec<Span>, dropped: &mut Vec<(Span, DropReason)>) -> Vec<Span> {
        spans.sort_by(|a, b| b.len().cmp(&a.len()));

        let mut keep: Vec<Span> = Vec::with_capacity(spans.len());
        for span in spans {
            let nested = self.subordinate_types.contains(&span.entity_type)
                && keep.iter().any(|kept| {
                    self.container_types.contains(&kept.entity_type) && kept.contains(&span)
                });

            if nested {
                dropped.push((span, DropReason::Nested));
            } else {
                keep.push(span);
            }
        }

        keep.sort_by_key(|s| (s.start, s.end));
        keep
    }
}

/// Grows each reviewer flag to the union of itself and every span that
/// overlaps it, so a flagged string is covered end to end.
fn absorb_into_flags(spans: Vec<Span>, dropped: &mut Vec<(Span, DropReason)>) -> Vec<Span> {
    let (mut flags, mut pending): (Vec<Span>, Vec<Span>) = spans
        .into_iter()
        .partition(|span| span.entity_type == EntityType::ReviewerFlag);
    if flags.is_empty() {
        return pending;
    }

    loop {
        flags.sort_by_key(|s| (s.start, s.end));
        let mut disjoint: Vec<Span> = Vec::with_capacity(flags.len());
        for flag in flags {
            if let Some(last) = disjoint.last_mut().filter(|last| last.overlaps(&flag)) {
                last.end = last.end.max(flag.end);
                dropped.push((flag, DropReason::AbsorbedByFlag));
                continue;
            }
            disjoint.push(flag);
        }
        flags = disjoint;

        let mut grown = false;
        let mut rest = Vec::with_capacity(pending.len());
        for span in pending {
            match flags.iter_mut().find(|flag| flag.overlaps(&span)) {
                Some(flag) => {
                    flag.start = flag.start.min(span.start);
                    flag.end = flag.end.max(span.end);
                    debug!(entity = %span.entity_type, start = span.start, "span absorbed by reviewer flag");
                    dropped.push((span, DropReason::AbsorbedByFlag));
                    grown = true;
                }
                None => rest.push(span),
            }
        }
        pending = rest;
        if !grown {
            break;
        }
    }

    pending.extend(flags);
    pending.sort_by_key(|s| (s.start, s.end));
    pending
}
