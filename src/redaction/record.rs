//! Detection records: the per-entity output of a pass and the input to
//! the layout linker.

use super::substitution::{AppliedSubstitution, Substitution};
use crate::domain::{EntityType, TextIndex};
use crate::error::{RedactorError, RedactorResult};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// One final entity with its surrounding context and replacement text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub entity_type: EntityType,
    pub start: usize,
    pub end: usize,
    #[serde(default)]
    pub score: f64,
    pub text: String,
    #[serde(default)]
    pub left_context: String,
    #[serde(default)]
    pub right_context: String,
    /// Output text for the span; equal to `text` when nothing changed.
    pub replacement: String,
}

impl DetectionRecord {
    /// Builds a record with `window` characters of context on each side.
    pub fn from_applied(index: &TextIndex<'_>, applied: &AppliedSubstitution, window: usize) -> Self {
        let span = &applied.span;
        Self {
            entity_type: span.entity_type.clone(),
            start: span.start,
            end: span.end,
            score: span.score,
            text: applied.original.clone(),
            left_context: index.left_context(span.start, window).to_string(),
            right_context: index.right_context(span.end, window).to_string(),
            replacement: applied.substitution.output(&applied.original).to_string(),
        }
    }

    /// The substitution this record carries.
    pub fn substitution(&self) -> Substitution {
        if self.replacement == self.text {
            Substitution::Unchanged
        } else if self.replacement.is_empty() {
            Substitution::Erased
        } else {
            Substitution::Replaced(self.replacement.clone())
        }
    }
}

/// Writes records as JSON Lines.
pub fn write_jsonl(path: &Path, records: &[DetectionRecord]) -> RedactorResult<()> {
    let file = std::fs::File::create(path).map_err(|e| RedactorError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    for record in records {
        serde_json::to_writer(&mut writer, record)
            .map_err(|e| RedactorError::json("detection record", e))?;
        writer.write_all(b"\n").map_err(|e| RedactorError::io(path, e))?;
    }
    writer.flush().map_err(|e| RedactorError::io(path, e))
}

/// Reads JSON Lines records, skipping blank lines.
pub fn read_jsonl(path: &Path) -> RedactorResult<Vec<DetectionRecord>> {
    let file = std::fs::File::open(path).map_err(|e| RedactorError::io(path, e))?;
    let mut records = Vec::new();
    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| RedactorError::io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line)
            .map_err(|e| RedactorError::json(format!("{} line {}", path.display(), number + 1), e))?;
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Span;

    #[test]
    fn test_record_context_and_replacement() {
        let text = "Patient Jon Smith was seen.";
        let index = TextIndex::new(text);
        let applied = AppliedSubstitution {
            span: Span::new(8, 17, EntityType::Person, 0.8, "A").unwrap(),
            original: "Jon Smith".to_string(),
            substitution: Substitution::Replaced("Paul Quinn".to_string()),
        };
        let record = DetectionRecord::from_applied(&index, &applied, 4);
        assert_eq!(record.left_context, "ent ");
        assert_eq!(record.right_context, " was");
        assert_eq!(record.replacement, "Paul Quinn");
        assert_eq!(record.substitution(), applied.substitution);
    }

    #[test]
    fn test_jsonl_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");
        let record = DetectionRecord {
            entity_type: EntityType::Ssn,
            start: 0,
            end: 11,
            score: 1.0,
            text: "123-45-6789".to_string(),
            left_context: String::new(),
            right_context: String::new(),
            replacement: "XXX-XX-XXXX".to_string(),
        };
        write_jsonl(&path, &[record.clone(), record.clone()]).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw.lines().count(), 2);
        assert!(raw.contains("\"entity_type\":\"SSN\""));
        assert_eq!(read_jsonl(&path).unwrap(), vec![record.clone(), record]);
    }

    #[test]
    fn test_unchanged_record() {
        let record = DetectionRecord {
            entity_type: EntityType::Age,
            start: 0,
            end: 2,
            score: 0.5,
            text: "29".to_string(),
            left_context: String::new(),
            right_context: String::new(),
            replacement: "29".to_string(),
        };
        assert_eq!(record.substitution(), Substitution::Unchanged);
    }
}
