//! Identity-consistent de-identification of clinical documents.
//!
//! This library reconciles PHI/PII detections from one or more detectors
//! into a single set of non-overlapping spans, substitutes each span with a
//! synthetic value that stays consistent across every mention in a case,
//! and projects the result onto OCR page layouts so the redaction is burned
//! into the page images themselves.
//!
//! # Features
//!
//! - **Span Resolution**: Validation, cross-detector merging, and a clinical
//!   domain filter that keeps durations, relative times and young ages
//! - **Identity Grouping**: Name variants ("Jon", "John") share one substitute
//! - **Consistent Substitution**: One day-shift per case, label-preserving
//!   identifier replacement, gender-coherent synthetic names
//! - **Reviewer Corrections**: Allow and deny lists folded into a second pass
//! - **Layout Projection**: Global-offset linking onto OCR tokens, box
//!   coalescing, text burn-in and PDF assembly
//!
//! # Architecture
//!
//! - [`domain`]: Span algebra (merge, filter, grouping, reviewer lists)
//! - [`redaction`]: Substitution, identity store, rendering, and the service layer
//! - [`layout`]: OCR tokens, page offsets, the offset linker, PDF assembly
//! - [`config`]: Immutable pipeline configuration
//! - [`error`]: Error taxonomy
//!
//! # Quick Start
//!
//! ```
//! use phi_redactor::{PipelineConfig, RawDetection, RedactionService};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let service = RedactionService::with_block_out(PipelineConfig::default().with_seed(7))?;
//! let mut session = service.new_session();
//!
//! let text = "Jon saw John on 03/05/2021.";
//! let detections = vec![vec![
//!     RawDetection { start: 0, end: 3, entity_type: "PERSON".into(), score: 0.9, source: "ner".into() },
//!     RawDetection { start: 8, end: 12, entity_type: "PERSON".into(), score: 0.9, source: "ner".into() },
//!     RawDetection { start: 16, end: 26, entity_type: "DATE".into(), score: 0.8, source: "ner".into() },
//! ]];
//!
//! let output = service.first_pass(&mut session, text, detections)?;
//! assert_eq!(output.records.len(), 3);
//! assert_eq!(output.records[0].replacement, output.records[1].replacement);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod domain;
pub mod error;
pub mod layout;
pub mod redaction;

// Re-exports for convenient access
pub use config::PipelineConfig;
pub use domain::{EntityType, RawDetection, ReviewCorrections, Span};
pub use error::{RedactorError, RedactorResult};
pub use layout::{Document, LinkReport, OcrPage, Token};
pub use redaction::{
    BlockOutStrategy, BurnInStrategy, DetectionRecord, IdentityStore, PassOutput,
    RedactionService, RenderResult, RenderStrategy, Session, Substitution,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_creation() {
        let _service = RedactionService::with_block_out(PipelineConfig::default()).unwrap();
    }
}
