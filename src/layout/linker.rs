//! Offset linker.
//!
//! Projects document-level detection records onto per-page OCR tokens in a
//! single forward pass over both sequences.

use super::Document;
use crate::error::{RedactorError, RedactorResult};
use crate::redaction::DetectionRecord;
use tracing::{debug, info, warn};

/// Statistics and diagnostics from one linking pass.
#[derive(Debug, Clone, Default)]
pub struct LinkReport {
    /// Records whose replacement landed on a token.
    pub linked: usize,
    /// Records whose replacement equals their text, ignored.
    pub unchanged: usize,
    pub tokens_replaced: usize,
    pub tokens_erased: usize,
    /// Records that overlapped no token. Each one is text that never
    /// reaches the rendered page.
    pub unlinked: Vec<DetectionRecord>,
}

impl LinkReport {
    pub fn is_complete(&self) -> bool {
        self.unlinked.is_empty()
    }
}

/// Annotates the tokens of `document` with the replacements in `records`.
///
/// `records` must be sorted by `start`; anything else is a
/// [`RedactorError::ContractViolation`]. Within an entity, the first token
/// it overlaps (the token holding its start, when one does) receives the
/// replacement and every other overlapped token is erased. A token shared
/// by several entities carries their replacements joined by spaces. Running the
/// linker twice with the same inputs leaves the tokens unchanged.
pub fn link_entities(
    document: &mut Document,
    records: &[DetectionRecord],
) -> RedactorResult<LinkReport> {
    if let Some(pair) = records.windows(2).find(|pair| pair[0].start > pair[1].start) {
        return Err(RedactorError::ContractViolation {
            reason: format!(
                "detection records not sorted by start ({} before {})",
                pair[0].start, pair[1].start
            ),
        });
    }

    let mut report = LinkReport::default();
    let entities: Vec<&DetectionRecord> = records
        .iter()
        .filter(|record| {
            let changed = record.replacement != record.text;
            if !changed {
                report.unchanged += 1;
            }
            changed
        })
        .collect();

    let mut anchored = vec![false; entities.len()];
    let mut cursor = 0;

    'pages: for page in document.pages_mut() {
        let offset = page.offset;
        for token in &mut page.ocr.tokens {
            let token_start = offset + token.char_start;
            let token_end = offset + token.char_end;

            while cursor < entities.len() && entities[cursor].end <= token_start {
                cursor += 1;
            }
            let Some(entity) = entities.get(cursor) else {
                break 'pages;
            };

            if token_start >= entity.end || token_end <= entity.start {
                continue;
            }

            let mut output = None;
            if !anchored[cursor] {
                debug!(
                    page = page.number,
                    entity_type = %entity.entity_type,
                    start = entity.start,
                    "linking entity"
                );
                output = Some(entity.replacement.clone());
                anchored[cursor] = true;
            }

            // Later entities that begin inside this token share it.
            let mut next = cursor + 1;
            while next < entities.len() && entities[next].start < token_end {
                if !anchored[next] && entities[next].end > token_start {
                    let replacement = &entities[next].replacement;
                    output = Some(match output {
                        Some(text) if !text.is_empty() => format!("{text} {replacement}"),
                        _ => replacement.clone(),
                    });
                    anchored[next] = true;
                }
                next += 1;
            }

            match output {
                Some(text) => {
                    token.replacement = Some(text);
                    report.tokens_replaced += 1;
                }
                None => {
                    token.replacement = Some(String::new());
                    report.tokens_erased += 1;
                }
            }
        }
    }

    for (entity, linked) in entities.iter().zip(&anchored) {
        if *linked {
            report.linked += 1;
        } else {
            warn!(
                entity_type = %entity.entity_type,
                start = entity.start,
                end = entity.end,
                "entity overlaps no OCR token; check page separator and OCR text"
            );
            report.unlinked.push((*entity).clone());
        }
    }

    info!(
        linked = report.linked,
        unlinked = report.unlinked.len(),
        erased = report.tokens_erased,
        "linked entities to tokens"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EntityType;
    use crate::layout::{OcrPage, Token};

    fn record(start: usize, end: usize, text: &str, replacement: &str) -> DetectionRecord {
        DetectionRecord {
            entity_type: EntityType::Person,
            start,
            end,
            score: 0.9,
            text: text.to_string(),
            left_context: String::new(),
            right_context: String::new(),
            replacement: replacement.to_string(),
        }
    }

    fn page_of(words: &[&str]) -> OcrPage {
        let mut tokens = Vec::new();
        let mut pos = 0;
        let mut left = 0;
        for word in words {
            tokens.push(Token::new(*word, pos, (left, 10, 10 * word.len() as i32, 12)));
            pos += word.chars().count() + 1;
            left += 10 * word.len() as i32 + 5;
        }
        OcrPage {
            full_text: words.join(" "),
            tokens,
            ..Default::default()
        }
    }

    fn outputs(doc: &Document) -> Vec<Vec<String>> {
        doc.pages()
            .iter()
            .map(|p| p.ocr.tokens.iter().map(|t| t.output().to_string()).collect())
            .collect()
    }

    #[test]
    fn test_multi_token_entity() {
        let mut doc = Document::new(vec![page_of(&["Seen", "J", "R", "Smith", "today"])], "\n");
        let report = link_entities(&mut doc, &[record(5, 14, "J R Smith", "Paul Quinn")]).unwrap();
        assert_eq!(
            outputs(&doc),
            vec![vec!["Seen", "Paul Quinn", "", "", "today"]]
        );
        assert_eq!(report.linked, 1);
        assert_eq!(report.tokens_erased, 2);
    }

    #[test]
    fn test_second_page_uses_global_offset() {
        let mut doc = Document::new(vec![page_of(&["Page", "one"]), page_of(&["Jon", "here"])], "\n");
        // "Page one\nJon here": "Jon" starts at 9.
        let report = link_entities(&mut doc, &[record(9, 12, "Jon", "Mark")]).unwrap();
        assert!(report.is_complete());
        assert_eq!(outputs(&doc)[1], vec!["Mark", "here"]);
    }

    #[test]
    fn test_unsorted_records_rejected() {
        let mut doc = Document::new(vec![page_of(&["a", "b"])], "\n");
        let result = link_entities(&mut doc, &[record(2, 3, "b", "x"), record(0, 1, "a", "y")]);
        assert!(matches!(result, Err(RedactorError::ContractViolation { .. })));
    }

    #[test]
    fn test_unchanged_records_skipped_and_unlinked_reported() {
        let mut doc = Document::new(vec![page_of(&["age", "29"])], "\n");
        let records = [record(4, 6, "29", "29"), record(40, 44, "gone", "x")];
        let report = link_entities(&mut doc, &records).unwrap();
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.unlinked.len(), 1);
        assert_eq!(outputs(&doc), vec![vec!["age", "29"]]);
    }

    #[test]
    fn test_linking_twice_is_idempotent() {
        let mut doc = Document::new(vec![page_of(&["Dr", "Jon", "Smith", "MRN", "123"])], "\n");
        let records = [record(3, 12, "Jon Smith", "Mark Hayes"), record(17, 20, "123", "555")];
        link_entities(&mut doc, &records).unwrap();
        let first = outputs(&doc);
        link_entities(&mut doc, &records).unwrap();
        assert_eq!(outputs(&doc), first);
    }

    #[test]
    fn test_token_shared_by_two_entities_links_both() {
        let mut doc = Document::new(vec![page_of(&["Seen", "Smith,Boston", "today"])], "\n");
        let records = [record(5, 10, "Smith", "Quinn"), record(11, 17, "Boston", "Dover")];
        let report = link_entities(&mut doc, &records).unwrap();

        assert!(report.is_complete());
        assert_eq!(report.linked, 2);
        assert_eq!(report.tokens_replaced, 1);
        assert_eq!(outputs(&doc), vec![vec!["Seen", "Quinn Dover", "today"]]);

        link_entities(&mut doc, &records).unwrap();
        assert_eq!(outputs(&doc), vec![vec!["Seen", "Quinn Dover", "today"]]);
    }

    #[test]
    fn test_entity_starting_in_erased_token_replaces_it() {
        let mut doc = Document::new(vec![page_of(&["Jon", "Smith-Lee", "here"])], "\n");
        // "Jon Smith-Lee here": the name ends inside the second token, "Lee" starts there.
        let records = [record(0, 9, "Jon Smith", "Mark Hayes"), record(10, 13, "Lee", "Ross")];
        let report = link_entities(&mut doc, &records).unwrap();

        assert!(report.is_complete());
        assert_eq!(outputs(&doc), vec![vec!["Mark Hayes", "Ross", "here"]]);
        assert_eq!(report.tokens_erased, 0);
    }
}
