//! Span model.
//!
//! All offsets in this crate are character (Unicode scalar value) offsets
//! into the document text, matching what upstream detectors and the OCR
//! subsystem report. [`TextIndex`] converts them to byte ranges for slicing.

use super::entity::EntityType;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A raw detection as emitted by a detector, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub start: usize,
    pub end: usize,
    pub entity_type: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub source: String,
}

/// A validated half-open interval `[start, end)` over the document text.
///
/// The covered text is never stored; slice it from the document with
/// [`TextIndex::slice`] when needed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub entity_type: EntityType,
    pub score: f64,
    pub source: String,
}

impl Span {
    /// Creates a span, returning `None` when `end <= start`.
    pub fn new(
        start: usize,
        end: usize,
        entity_type: EntityType,
        score: f64,
        source: impl Into<String>,
    ) -> Option<Self> {
        (end > start).then(|| Self {
            start,
            end,
            entity_type,
            score,
            source: source.into(),
        })
    }

    /// Number of characters covered.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Spans are never empty; provided for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Returns true if the two spans share at least one character.
    pub fn overlaps(&self, other: &Span) -> bool {
        !(self.end <= other.start || self.start >= other.end)
    }

    /// Returns true if `other` lies entirely within this span.
    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// Outcome of validating raw detector output.
#[derive(Debug, Clone, Default)]
pub struct NormalizedSpans {
    pub spans: Vec<Span>,
    pub rejected: Vec<RawDetection>,
}

/// Validates raw detections against a document of `text_len` characters.
///
/// Detections with `end <= start` or `end > text_len` are rejected and
/// reported, never passed on to the merger.
pub fn normalize_detections(raw: Vec<RawDetection>, text_len: usize) -> NormalizedSpans {
    let mut result = NormalizedSpans::default();

    for detection in raw {
        if detection.end > text_len {
            warn!(
                start = detection.start,
                end = detection.end,
                text_len,
                "rejecting detection past end of text"
            );
            result.rejected.push(detection);
            continue;
        }

        match Span::new(
            detection.start,
            detection.end,
            EntityType::parse(&detection.entity_type),
            detection.score,
            detection.source.clone(),
        ) {
            Some(span) => result.spans.push(span),
            None => {
                warn!(
                    start = detection.start,
                    end = detection.end,
                    "rejecting empty or inverted detection"
                );
                result.rejected.push(detection);
            }
        }
    }

    result
}

/// Character-offset view over a document string.
#[derive(Debug, Clone)]
pub struct TextIndex<'a> {
    text: &'a str,
    /// Byte offset of every character, plus `text.len()` as a sentinel.
    boundaries: Vec<usize>,
}

impl<'a> TextIndex<'a> {
    pub fn new(text: &'a str) -> Self {
        let mut boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        boundaries.push(text.len());
        Self { text, boundaries }
    }

    /// The underlying text.
    pub fn text(&self) -> &'a str {
        self.text
    }

    /// Length of the text in characters.
    pub fn char_len(&self) -> usize {
        self.boundaries.len() - 1
    }

    /// Byte offset of a character offset, clamped to the end of the text.
    pub fn byte_offset(&self, char_offset: usize) -> usize {
        self.boundaries[char_offset.min(self.char_len())]
    }

    /// Character offset of a byte offset that falls on a char boundary.
    pub fn char_offset(&self, byte_offset: usize) -> usize {
        match self.boundaries.binary_search(&byte_offset) {
            Ok(idx) | Err(idx) => idx,
        }
    }

    /// Slices `[start, end)` in character offsets, clamped to the text.
    pub fn slice(&self, start: usize, end: usize) -> &'a str {
        let start = self.byte_offset(start);
        let end = self.byte_offset(end).max(start);
        &self.text[start..end]
    }

    /// The text covered by a span.
    pub fn span_text(&self, span: &Span) -> &'a str {
        self.slice(span.start, span.end)
    }

    /// Up to `window` characters immediately before `start`.
    pub fn left_context(&self, start: usize, window: usize) -> &'a str {
        self.slice(start.saturating_sub(window), start)
    }

    /// Up to `window` characters immediately after `end`.
    pub fn right_context(&self, end: usize, window: usize) -> &'a str {
        self.slice(end, end.saturating_add(window))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(start: usize, end: usize, label: &str) -> RawDetection {
        RawDetection {
            start,
            end,
            entity_type: label.to_string(),
            score: 0.9,
            source: "A".to_string(),
        }
    }

    #[test]
    fn test_span_rejects_inverted_interval() {
        assert!(Span::new(5, 5, EntityType::Person, 1.0, "A").is_none());
        assert!(Span::new(6, 5, EntityType::Person, 1.0, "A").is_none());
        assert!(Span::new(5, 6, EntityType::Person, 1.0, "A").is_some());
    }

    #[test]
    fn test_overlap_is_half_open() {
        let a = Span::new(0, 4, EntityType::Person, 1.0, "A").unwrap();
        let b = Span::new(4, 8, EntityType::Person, 1.0, "A").unwrap();
        let c = Span::new(3, 5, EntityType::Person, 1.0, "A").unwrap();
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(b.overlaps(&c));
    }

    #[test]
    fn test_normalize_rejects_invalid() {
        let result = normalize_detections(
            vec![raw(0, 4, "PERSON"), raw(4, 4, "PERSON"), raw(2, 50, "DATE")],
            10,
        );
        assert_eq!(result.spans.len(), 1);
        assert_eq!(result.rejected.len(), 2);
        assert_eq!(result.spans[0].entity_type, EntityType::Person);
    }

    #[test]
    fn test_text_index_uses_char_offsets() {
        let index = TextIndex::new("José Ruiz, 3/5/81");
        assert_eq!(index.char_len(), 17);
        assert_eq!(index.slice(0, 4), "José");
        assert_eq!(index.slice(5, 9), "Ruiz");
        assert_eq!(index.left_context(5, 3), "sé ");
        assert_eq!(index.right_context(9, 100), ", 3/5/81");
    }
}
