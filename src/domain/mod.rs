//! Span algebra.
//!
//! Pure, stateless logic that turns raw detector output into the final set
//! of spans to redact: validation, cross-detector merging, the clinical
//! domain filter, reviewer corrections, and identity grouping of names.

pub mod entity;
pub mod filter;
pub mod grouping;
pub mod merge;
pub mod review;
pub mod span;

pub use entity::EntityType;
pub use filter::{DomainFilter, DropReason, FilterOutcome};
pub use grouping::IdentityGroups;
pub use merge::{merge_spans, SourcePreference};
pub use review::ReviewCorrections;
pub use span::{normalize_detections, NormalizedSpans, RawDetection, Span, TextIndex};
