//! OCR layout model.
//!
//! A [`Document`] is an ordered list of OCR pages. Entity offsets are
//! computed over the concatenation of every page's `full_text` joined by a
//! fixed separator, so a page's global offset is the running sum of the
//! previous pages' character lengths plus one separator per page boundary.

pub mod linker;
pub mod pdf;

pub use linker::{link_entities, LinkReport};

use crate::error::{RedactorError, RedactorResult};
use crate::redaction::Substitution;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One OCR word with page-local character offsets and a pixel box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    pub char_start: usize,
    pub char_end: usize,
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
    #[serde(default)]
    pub conf: f64,
    /// Output text; absent means the token is untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,
    /// Fields the OCR collaborator emits that this crate does not use.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Token {
    pub fn new(text: impl Into<String>, char_start: usize, bbox: (i32, i32, i32, i32)) -> Self {
        let text = text.into();
        let char_end = char_start + text.chars().count();
        let (left, top, width, height) = bbox;
        Self {
            text,
            char_start,
            char_end,
            left,
            top,
            width,
            height,
            conf: 0.0,
            replacement: None,
            extra: Map::new(),
        }
    }

    /// The text this token renders as.
    pub fn output(&self) -> &str {
        self.replacement.as_deref().unwrap_or(&self.text)
    }

    pub fn substitution(&self) -> Substitution {
        match self.replacement.as_deref() {
            None => Substitution::Unchanged,
            Some(r) if r == self.text => Substitution::Unchanged,
            Some("") => Substitution::Erased,
            Some(r) => Substitution::Replaced(r.to_string()),
        }
    }

    /// True when the token renders as nothing visible.
    pub fn is_blank(&self) -> bool {
        self.output().trim().is_empty()
    }

    pub fn right(&self) -> i32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.top + self.height
    }
}

/// OCR output for one page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrPage {
    pub full_text: String,
    #[serde(default)]
    pub tokens: Vec<Token>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OcrPage {
    pub fn load(path: &Path) -> RedactorResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| RedactorError::io(path, e))?;
        serde_json::from_str(&raw)
            .map_err(|e| RedactorError::json(format!("OCR page {}", path.display()), e))
    }

    pub fn save(&self, path: &Path) -> RedactorResult<()> {
        let raw = serde_json::to_string_pretty(self)
            .map_err(|e| RedactorError::json(format!("OCR page {}", path.display()), e))?;
        std::fs::write(path, raw).map_err(|e| RedactorError::io(path, e))
    }

    pub fn char_len(&self) -> usize {
        self.full_text.chars().count()
    }
}

/// A page placed in its document.
#[derive(Debug, Clone)]
pub struct Page {
    /// One-based page number.
    pub number: usize,
    /// Global character offset of the page's first character.
    pub offset: usize,
    pub ocr: OcrPage,
    /// File the page was loaded from, if any.
    pub path: Option<PathBuf>,
}

fn page_file_pattern() -> &'static Regex {
    static PATTERN: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"_page(\d+)_ocr\.json$").expect("Valid regex"));
    &PATTERN
}

/// Page number encoded in an OCR file name such as `scan_page3_ocr.json`.
pub fn page_number(file_name: &str) -> Option<usize> {
    page_file_pattern()
        .captures(file_name)
        .and_then(|caps| caps[1].parse().ok())
}

#[derive(Debug, Clone)]
pub struct Document {
    pages: Vec<Page>,
    separator: String,
}

impl Document {
    /// Builds a document from pages in order, numbering them from one.
    pub fn new(pages: Vec<OcrPage>, separator: &str) -> Self {
        let pages = pages
            .into_iter()
            .enumerate()
            .map(|(i, ocr)| (i + 1, ocr, None))
            .collect();
        Self::from_numbered(pages, separator)
    }

    fn from_numbered(pages: Vec<(usize, OcrPage, Option<PathBuf>)>, separator: &str) -> Self {
        let separator_len = separator.chars().count();
        let mut offset = 0;
        let pages = pages
            .into_iter()
            .map(|(number, ocr, path)| {
                let page = Page {
                    number,
                    offset,
                    ocr,
                    path,
                };
                offset += page.ocr.char_len() + separator_len;
                page
            })
            .collect();
        Self {
            pages,
            separator: separator.to_string(),
        }
    }

    /// Loads every `*_pageN_ocr.json` file in `dir`, ordered by page number.
    ///
    /// A page file that cannot be read or parsed is skipped with a warning;
    /// offsets of later pages then no longer match the document text, which
    /// the linker reports as unlinked entities.
    pub fn load_dir(dir: &Path, separator: &str) -> RedactorResult<Self> {
        let entries = std::fs::read_dir(dir).map_err(|e| RedactorError::io(dir, e))?;

        let mut found: Vec<(usize, PathBuf)> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| RedactorError::io(dir, e))?;
            let path = entry.path();
            let Some(number) = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(page_number)
            else {
                continue;
            };
            found.push((number, path));
        }
        found.sort_by_key(|(number, _)| *number);

        let mut pages = Vec::with_capacity(found.len());
        for (number, path) in found {
            match OcrPage::load(&path) {
                Ok(ocr) => {
                    debug!(page = number, tokens = ocr.tokens.len(), "loaded OCR page");
                    pages.push((number, ocr, Some(path)));
                }
                Err(err) => warn!(page = number, error = %err, "skipping unreadable OCR page"),
            }
        }

        Ok(Self::from_numbered(pages, separator))
    }

    /// The concatenated text that entity offsets refer to.
    pub fn text(&self) -> String {
        self.pages
            .iter()
            .map(|page| page.ocr.full_text.as_str())
            .collect::<Vec<_>>()
            .join(&self.separator)
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn pages_mut(&mut self) -> &mut [Page] {
        &mut self.pages
    }

    pub fn page(&self, number: usize) -> Option<&Page> {
        self.pages.iter().find(|page| page.number == number)
    }

    /// Writes every page loaded from disk back to its file.
    pub fn save(&self) -> RedactorResult<usize> {
        let mut written = 0;
        for page in &self.pages {
            if let Some(path) = &page.path {
                page.ocr.save(path)?;
                written += 1;
            }
        }
        Ok(written)
    }
}
