//! Error types for the de-identification pipeline.
//!
//! Errors are categorized by their source. Malformed but well-typed input
//! (bad spans, unparseable dates, missing fonts) is handled inside the
//! pipeline and never surfaces here; what does surface is I/O, decoding,
//! and programmer-contract violations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pipeline operations.
pub type RedactorResult<T> = Result<T, RedactorError>;

/// Error type for all pipeline operations.
#[derive(Debug, Error)]
pub enum RedactorError {
    /// Error occurred while reading or writing files
    #[error("IO error for path '{}': {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },

    /// JSON encoding or decoding failed
    #[error("JSON error in {context}: {source}")]
    Json {
        context: String,
        source: serde_json::Error,
    },

    /// Page image could not be decoded or encoded
    #[error("Image error for '{}': {source}", .path.display())]
    Image {
        path: PathBuf,
        source: image::ImageError,
    },

    /// PDF assembly failed
    #[error("PDF assembly error: {message}")]
    Pdf {
        message: String,
        #[source]
        source: Option<lopdf::Error>,
    },

    /// Invalid configuration or parameters
    #[error("Invalid input for '{parameter}': {reason}")]
    InvalidInput { parameter: String, reason: String },

    /// Configuration could not be built
    #[error("Configuration error: {reason}")]
    Config { reason: String },

    /// A caller broke a documented precondition
    #[error("Contract violation: {reason}")]
    ContractViolation { reason: String },
}

impl RedactorError {
    /// Wraps a `serde_json` error with a description of what was being processed.
    pub fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Json {
            context: context.into(),
            source,
        }
    }

    /// Wraps an I/O error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<regex::Error> for RedactorError {
    fn from(err: regex::Error) -> Self {
        Self::Config {
            reason: format!("invalid pattern: {}", err),
        }
    }
}

impl From<lopdf::Error> for RedactorError {
    fn from(err: lopdf::Error) -> Self {
        Self::Pdf {
            message: err.to_string(),
            source: Some(err),
        }
    }
}
