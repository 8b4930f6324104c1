//! Custom assertions for de-identification testing.
//!
//! Provides domain-specific assertions that make tests more readable
//! and provide better error messages.

use image::RgbImage;
use phi_redactor::{DetectionRecord, Span};

/// Asserts that spans are sorted by start and pairwise disjoint.
///
/// # Panics
/// Panics on the first pair that overlaps or is out of order.
pub fn assert_disjoint_sorted(spans: &[Span]) {
    for pair in spans.windows(2) {
        assert!(
            pair[0].end <= pair[1].start,
            "Spans must be disjoint and sorted, found {:?} before {:?}",
            (pair[0].start, pair[0].end, pair[0].entity_type.as_str()),
            (pair[1].start, pair[1].end, pair[1].entity_type.as_str()),
        );
    }
}

/// Character offsets covered by some span in `inputs` but by none in
/// `spans`.
pub fn uncovered_chars(spans: &[Span], inputs: &[Span]) -> Vec<usize> {
    let mut missing: Vec<usize> = inputs
        .iter()
        .flat_map(|input| input.start..input.end)
        .filter(|&c| !spans.iter().any(|s| s.start <= c && c < s.end))
        .collect();
    missing.sort_unstable();
    missing.dedup();
    missing
}

/// Asserts that records are sorted by start and pairwise disjoint.
pub fn assert_records_disjoint(records: &[DetectionRecord]) {
    for pair in records.windows(2) {
        assert!(
            pair[0].end <= pair[1].start,
            "Records must be disjoint and sorted, found ({}, {}) before ({}, {})",
            pair[0].start,
            pair[0].end,
            pair[1].start,
            pair[1].end,
        );
    }
}

/// Asserts that none of `originals` survives in `output`.
pub fn assert_no_leak(output: &str, originals: &[&str]) {
    for original in originals {
        assert!(
            !output.contains(original),
            "'{}' should have been substituted but was found in:\n{}",
            original,
            output
        );
    }
}

/// Asserts that two images are pixel-identical.
pub fn assert_images_identical(actual: &RgbImage, expected: &RgbImage) {
    assert_eq!(actual.dimensions(), expected.dimensions(), "Image sizes differ");
    let differing = actual
        .pixels()
        .zip(expected.pixels())
        .filter(|(a, b)| a != b)
        .count();
    assert_eq!(differing, 0, "{differing} pixel(s) differ");
}

/// Asserts that at least one pixel differs between two images.
pub fn assert_images_differ(actual: &RgbImage, original: &RgbImage) {
    assert_eq!(actual.dimensions(), original.dimensions(), "Image sizes differ");
    assert!(
        actual.pixels().zip(original.pixels()).any(|(a, b)| a != b),
        "Image should have been modified"
    );
}
