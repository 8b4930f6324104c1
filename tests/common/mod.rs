//! Common test utilities and helpers.
//!
//! This module provides shared functionality for all tests, including:
//! - Detection and OCR page builders
//! - Case directories laid out the way the CLI expects them
//! - Custom assertions over spans, text and images

#![allow(dead_code)]

pub mod assertions;
pub mod fixtures;

pub use assertions::*;
pub use fixtures::*;
