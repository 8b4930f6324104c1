//! Reviewer corrections folded into a second pass.

use super::entity::EntityType;
use super::span::{Span, TextIndex};
use crate::error::RedactorResult;
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};

/// Source label attached to deny-list spans.
pub const REVIEWER_SOURCE: &str = "reviewer";

/// Allow and deny lists supplied by a human reviewer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewCorrections {
    /// Strings that must not be redacted (false positives).
    #[serde(default)]
    pub allow_list: Vec<String>,
    /// Strings that must be redacted wherever they occur (false negatives).
    #[serde(default)]
    pub deny_list: Vec<String>,
}

impl ReviewCorrections {
    /// Builds corrections from newline-separated lists, skipping blank lines.
    pub fn from_lines(allow: &str, deny: &str) -> Self {
        fn parse(raw: &str) -> Vec<String> {
            raw.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect()
        }

        Self {
            allow_list: parse(allow),
            deny_list: parse(deny),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.allow_list.is_empty() && self.deny_list.is_empty()
    }

    /// Finds every occurrence of a deny-list entry in the document.
    ///
    /// Matching is case-insensitive and respects word boundaries at entry
    /// edges that are word characters, so "Lee" does not match inside
    /// "Leeds". Longer entries win where entries overlap.
    pub fn deny_spans(&self, index: &TextIndex<'_>) -> RedactorResult<Vec<Span>> {
        let mut entries: Vec<&str> = self
            .deny_list
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();
        if entries.is_empty() {
            return Ok(Vec::new());
        }
        entries.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()));

        let alternation = entries
            .iter()
            .map(|entry| {
                let lead = if entry.starts_with(|c: char| c.is_alphanumeric()) { r"\b" } else { "" };
                let tail = if entry.ends_with(|c: char| c.is_alphanumeric()) { r"\b" } else { "" };
                format!("{lead}{}{tail}", regex::escape(entry))
            })
            .collect::<Vec<_>>()
            .join("|");
        let pattern = RegexBuilder::new(&alternation).case_insensitive(true).build()?;

        Ok(pattern
            .find_iter(index.text())
            .filter_map(|found| {
                Span::new(
                    index.char_offset(found.start()),
                    index.char_offset(found.end()),
                    EntityType::ReviewerFlag,
                    1.0,
                    REVIEWER_SOURCE,
                )
            })
            .collect())
    }
}
