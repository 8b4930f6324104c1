//! Pipeline configuration.
//!
//! Every lookup table the pipeline consults (preserve lists, clinical
//! vocabulary, priority table, date formats, rendering tolerances) lives
//! here as plain data. A [`PipelineConfig`] is built once, optionally from
//! JSON, and shared read-only by every stage of a session.

use crate::domain::{EntityType, SourcePreference};
use crate::error::{RedactorError, RedactorResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Top-level configuration for one pipeline instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Ages below this value are clinically useful and never redacted.
    pub age_ceiling: u32,
    /// Characters of left/right context captured in detection records.
    pub context_window: usize,
    pub source_preference: SourcePreference,
    pub filter: FilterConfig,
    pub grouping: GroupingConfig,
    pub substitution: SubstitutionConfig,
    pub layout: LayoutConfig,
    pub render: RenderConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            age_ceiling: 89,
            context_window: 40,
            source_preference: SourcePreference::default(),
            filter: FilterConfig::default(),
            grouping: GroupingConfig::default(),
            substitution: SubstitutionConfig::default(),
            layout: LayoutConfig::default(),
            render: RenderConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Loads a configuration from a JSON file. Missing fields take defaults.
    pub fn from_json_file(path: &Path) -> RedactorResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| RedactorError::io(path, e))?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> RedactorResult<Self> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| RedactorError::json("pipeline config", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints that serde cannot express.
    pub fn validate(&self) -> RedactorResult<()> {
        if self.substitution.shift_min_days > self.substitution.shift_max_days {
            return Err(RedactorError::Config {
                reason: "substitution.shift_min_days exceeds shift_max_days".to_string(),
            });
        }
        if self.substitution.date_formats.is_empty() {
            return Err(RedactorError::Config {
                reason: "substitution.date_formats must not be empty".to_string(),
            });
        }
        if !(0.0..=100.0).contains(&self.grouping.similarity_cutoff) {
            return Err(RedactorError::Config {
                reason: "grouping.similarity_cutoff must be within 0..=100".to_string(),
            });
        }
        if self.render.dpi == 0 {
            return Err(RedactorError::Config {
                reason: "render.dpi must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Sets the RNG seed used for synthetic values.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.substitution.seed = Some(seed);
        self
    }
}

/// Domain filter tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Relative-time phrases kept verbatim (compared lowercase).
    pub relative_times: Vec<String>,
    /// Whole-text duration patterns kept verbatim (case-insensitive).
    pub duration_patterns: Vec<String>,
    /// Width of the context window inspected for duration markers.
    pub duration_context_window: usize,
    pub duration_markers: Vec<String>,
    /// Pattern a span must contain for a duration marker to preserve it.
    pub duration_in_text_pattern: String,
    /// Width of the context window inspected for history keywords.
    pub history_context_window: usize,
    pub history_keywords: Vec<String>,
    /// Bare duration words that are never dates.
    pub bare_duration_pattern: String,
    /// Clinical terms detectors mistake for names, places, or organizations.
    pub clinical_vocabulary: Vec<String>,
    /// Entities of `short_entity_types` shorter than this are discarded.
    pub min_entity_length: usize,
    pub short_entity_types: Vec<EntityType>,
    pub zip_context_window: usize,
    /// Left-context pattern that makes a bare 5-digit number a ZIP code.
    pub zip_context_pattern: String,
    /// Same-position conflict priority; unlisted types rank 0.
    pub priorities: BTreeMap<EntityType, i32>,
    pub container_types: Vec<EntityType>,
    pub subordinate_types: Vec<EntityType>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        let priorities = [
            (EntityType::ReviewerFlag, 11),
            (EntityType::Ssn, 10),
            (EntityType::CreditCard, 10),
            (EntityType::Mrn, 9),
            (EntityType::Id, 9),
            (EntityType::BankNumber, 9),
            (EntityType::PhoneNumber, 8),
            (EntityType::Email, 8),
            (EntityType::Dob, 7),
            (EntityType::ZipCode, 6),
            (EntityType::Address, 5),
            (EntityType::Person, 4),
            (EntityType::Organization, 3),
            (EntityType::License, 3),
            (EntityType::Age, 2),
            (EntityType::Location, 1),
            (EntityType::DateTime, 0),
        ]
        .into_iter()
        .collect();

        Self {
            relative_times: strings(&[
                "today",
                "yesterday",
                "tomorrow",
                "tonight",
                "last week",
                "last month",
                "last year",
                "last night",
                "this morning",
                "this afternoon",
                "this evening",
                "this week",
                "next week",
                "next month",
            ]),
            duration_patterns: strings(&[
                r"^\d+\s+(week|day|month|year)s?$",
                r"^x\s*~?\s*\d+\s+(week|day|month)s?$",
                r"^(week|day|month|year)s?$",
            ]),
            duration_context_window: 20,
            duration_markers: strings(&["in ", "for ", "x ", "x~"]),
            duration_in_text_pattern: r"\d+\s+(week|day|month|year)s?".to_string(),
            history_context_window: 50,
            history_keywords: strings(&[
                "began",
                "started",
                "onset",
                "quit",
                "stopped",
                "diagnosed",
                "since",
                "symptoms",
                "history",
            ]),
            bare_duration_pattern: r"^(week|day|month|year)s?$".to_string(),
            clinical_vocabulary: strings(&[
                "bp", "hr", "rr", "ct", "mri", "ekg", "ecg", "er", "icu", "ed", "copd", "chf",
                "cabg", "hba1c", "covid", "tylenol", "advil", "motrin", "lasix", "coumadin",
                "metformin", "lisinopril", "parkinson", "alzheimer", "crohn", "hodgkin",
                "apgar", "glasgow", "foley", "doppler",
            ]),
            min_entity_length: 3,
            short_entity_types: vec![
                EntityType::Person,
                EntityType::Organization,
                EntityType::Location,
            ],
            zip_context_window: 20,
            zip_context_pattern: r"(?i:zip)|\b[A-Z]{2},?\s+$".to_string(),
            priorities,
            container_types: vec![
                EntityType::Address,
                EntityType::Person,
                EntityType::Organization,
            ],
            subordinate_types: vec![
                EntityType::Location,
                EntityType::ZipCode,
                EntityType::DateTime,
            ],
        }
    }
}

/// Identity grouping parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupingConfig {
    /// Similarity (0..=100) that two forms must strictly exceed to be linked.
    pub similarity_cutoff: f64,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            similarity_cutoff: 70.0,
        }
    }
}

/// Substitution parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubstitutionConfig {
    /// `chrono` formats tried in order when shifting a date.
    pub date_formats: Vec<String>,
    /// Format of synthetic fallback dates.
    pub fallback_date_format: String,
    pub shift_min_days: i64,
    pub shift_max_days: i64,
    /// Key whose day-shift applies when no patient/document key is given.
    pub default_date_key: String,
    /// Age range for synthetic fallback dates of birth.
    pub fallback_min_age: i64,
    pub fallback_max_age: i64,
    /// Character used for non-reversible identifier masking.
    pub mask_char: char,
    /// Replacement that the renderer paints as a solid block.
    pub block_marker: String,
    /// Fixed seed for reproducible runs; a fresh OS seed otherwise.
    pub seed: Option<u64>,
}

impl Default for SubstitutionConfig {
    fn default() -> Self {
        Self {
            date_formats: strings(&[
                "%m-%d-%Y",
                "%m-%d-%y",
                "%m/%d/%Y",
                "%m/%d/%y",
                "%Y-%m-%d",
                "%d/%m/%Y",
                "%d/%m/%y",
                "%d-%m-%Y",
                "%d-%m-%y",
                "%B %d, %Y",
            ]),
            fallback_date_format: "%m-%d-%y".to_string(),
            shift_min_days: 30,
            shift_max_days: 365,
            default_date_key: "default_patient".to_string(),
            fallback_min_age: 18,
            fallback_max_age: 89,
            mask_char: 'X',
            block_marker: "*".to_string(),
            seed: None,
        }
    }
}

/// Document layout parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Inserted between page texts when building the document text. Its
    /// character length is the separator length used for page offsets.
    pub page_separator: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            page_separator: "\n".to_string(),
        }
    }
}

/// Rendering parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Vertical tolerance, as a fraction of the anchor token's height,
    /// within which two tokens count as the same line.
    pub line_tolerance: f32,
    /// Pixels a token may sit left of the anchor before it counts as a wrap.
    pub left_jump_slack: i32,
    /// Initial font size as a multiple of the region height.
    pub font_scale: f32,
    /// Font size floor when shrinking replacement text to fit.
    pub min_font_size: f32,
    /// Upward nudge of the text baseline as a fraction of region height.
    pub vertical_nudge: f32,
    /// Candidate TrueType fonts, tried in order.
    pub font_paths: Vec<PathBuf>,
    pub text_color: [u8; 3],
    pub fill_color: [u8; 3],
    pub block_color: [u8; 3],
    /// Resolution the page images were rasterized at.
    pub dpi: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            line_tolerance: 0.6,
            left_jump_slack: 2,
            font_scale: 1.3,
            min_font_size: 15.0,
            vertical_nudge: 0.15,
            font_paths: vec![
                PathBuf::from("fonts/arial.ttf"),
                PathBuf::from("/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf"),
                PathBuf::from("/usr/share/fonts/TTF/DejaVuSans.ttf"),
                PathBuf::from("/Library/Fonts/Arial.ttf"),
                PathBuf::from("C:\\Windows\\Fonts\\arial.ttf"),
            ],
            text_color: [0, 0, 0],
            fill_color: [255, 255, 255],
            block_color: [0, 0, 0],
            dpi: 300,
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config =
            PipelineConfig::from_json_str(r#"{"age_ceiling": 90, "grouping": {}}"#).unwrap();
        assert_eq!(config.age_ceiling, 90);
        assert_eq!(config.grouping.similarity_cutoff, 70.0);
        assert_eq!(config.layout.page_separator, "\n");
    }

    #[test]
    fn test_priority_table_from_json() {
        let config = PipelineConfig::from_json_str(
            r#"{"filter": {"priorities": {"PERSON": 20, "GPE": 1}}}"#,
        )
        .unwrap();
        assert_eq!(config.filter.priorities.get(&EntityType::Person), Some(&20));
        assert_eq!(config.filter.priorities.get(&EntityType::Location), Some(&1));
    }

    #[test]
    fn test_invalid_shift_range_rejected() {
        let result = PipelineConfig::from_json_str(
            r#"{"substitution": {"shift_min_days": 10, "shift_max_days": 5}}"#,
        );
        assert!(matches!(result, Err(RedactorError::Config { .. })));
    }
}
