//! Test fixtures and builders.
//!
//! Detections are written against a text by needle rather than by hand
//! counted offsets, so fixtures stay correct when the text changes.

use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use phi_redactor::{OcrPage, RawDetection, Token};
use std::path::{Path, PathBuf};

/// Character offsets of the first occurrence of `needle` in `text`.
///
/// # Panics
/// Panics if `needle` does not occur.
pub fn locate(text: &str, needle: &str) -> (usize, usize) {
    locate_nth(text, needle, 0)
}

/// Character offsets of the `nth` (zero-based) occurrence of `needle`.
pub fn locate_nth(text: &str, needle: &str, nth: usize) -> (usize, usize) {
    let (byte, _) = text
        .match_indices(needle)
        .nth(nth)
        .unwrap_or_else(|| panic!("'{needle}' occurrence {nth} not found in '{text}'"));
    let start = text[..byte].chars().count();
    (start, start + needle.chars().count())
}

pub fn detection(start: usize, end: usize, label: &str, score: f64, source: &str) -> RawDetection {
    RawDetection {
        start,
        end,
        entity_type: label.to_string(),
        score,
        source: source.to_string(),
    }
}

/// Builder for one detector's output over a fixed text.
///
/// # Example
///
/// ```no_run
/// let text = "Jon saw John";
/// let detections = DetectionBuilder::new(text, "ner")
///     .add("Jon", "PERSON")
///     .add("John", "PERSON")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct DetectionBuilder<'a> {
    text: &'a str,
    source: String,
    score: f64,
    detections: Vec<RawDetection>,
}

impl<'a> DetectionBuilder<'a> {
    pub fn new(text: &'a str, source: &str) -> Self {
        Self {
            text,
            source: source.to_string(),
            score: 0.85,
            detections: Vec::new(),
        }
    }

    /// Score applied to detections added after this call.
    pub fn score(mut self, score: f64) -> Self {
        self.score = score;
        self
    }

    /// Adds a detection over the first occurrence of `needle`.
    pub fn add(self, needle: &str, label: &str) -> Self {
        self.add_nth(needle, 0, label)
    }

    pub fn add_nth(mut self, needle: &str, nth: usize, label: &str) -> Self {
        let (start, end) = locate_nth(self.text, needle, nth);
        self.detections
            .push(detection(start, end, label, self.score, &self.source));
        self
    }

    /// Adds a detection with explicit offsets.
    pub fn add_raw(mut self, start: usize, end: usize, label: &str) -> Self {
        self.detections
            .push(detection(start, end, label, self.score, &self.source));
        self
    }

    pub fn build(self) -> Vec<RawDetection> {
        self.detections
    }
}

/// Builds an OCR page from words laid out left to right on lines.
///
/// Words are joined with single spaces and lines with `\n`; each word
/// becomes one token whose box is derived from its position.
#[derive(Debug, Clone)]
pub struct OcrPageBuilder {
    lines: Vec<Vec<String>>,
    char_width: i32,
    line_height: i32,
    margin: i32,
}

impl OcrPageBuilder {
    pub fn new() -> Self {
        Self {
            lines: vec![Vec::new()],
            char_width: 10,
            line_height: 20,
            margin: 10,
        }
    }

    pub fn words(mut self, words: &[&str]) -> Self {
        if let Some(line) = self.lines.last_mut() {
            line.extend(words.iter().map(|w| w.to_string()));
        }
        self
    }

    pub fn line(mut self, words: &[&str]) -> Self {
        if self.lines.last().is_some_and(|line| !line.is_empty()) {
            self.lines.push(Vec::new());
        }
        self.words(words)
    }

    pub fn build(self) -> OcrPage {
        let mut full_text = String::new();
        let mut tokens = Vec::new();
        let mut offset = 0;

        for (row, line) in self.lines.iter().enumerate() {
            if row > 0 {
                full_text.push('\n');
                offset += 1;
            }
            let top = self.margin + row as i32 * (self.line_height + 10);
            let mut left = self.margin;
            for (col, word) in line.iter().enumerate() {
                if col > 0 {
                    full_text.push(' ');
                    offset += 1;
                    left += self.char_width;
                }
                let len = word.chars().count();
                let width = len as i32 * self.char_width;
                tokens.push(Token::new(
                    word.clone(),
                    offset,
                    (left, top, width, self.line_height),
                ));
                full_text.push_str(word);
                offset += len;
                left += width;
            }
        }

        OcrPage {
            full_text,
            tokens,
            extra: Default::default(),
        }
    }
}

impl Default for OcrPageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A white page image with a dark stripe under every token.
pub fn page_image(page: &OcrPage, width: u32, height: u32) -> RgbImage {
    let mut image = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
    for token in &page.tokens {
        for y in token.top.max(0)..token.bottom().min(height as i32) {
            for x in token.left.max(0)..token.right().min(width as i32) {
                image.put_pixel(x as u32, y as u32, Rgb([40, 40, 40]));
            }
        }
    }
    image
}

/// A case directory laid out the way the CLI reads it.
pub struct CaseDir {
    pub root: tempfile::TempDir,
}

impl CaseDir {
    pub fn new() -> Result<Self> {
        Ok(Self {
            root: tempfile::tempdir()?,
        })
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.path().join(name)
    }

    pub fn write(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.path(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, contents).with_context(|| format!("writing {}", path.display()))?;
        Ok(path)
    }

    pub fn write_detections(&self, name: &str, detections: &[RawDetection]) -> Result<PathBuf> {
        self.write(name, &serde_json::to_string(detections)?)
    }

    /// Writes `pages` as `ocr/<stem>_pageN_ocr.json` and their images as
    /// `images/<stem>_pageN.png`.
    pub fn write_pages(&self, stem: &str, pages: &[OcrPage]) -> Result<(PathBuf, PathBuf)> {
        let ocr_dir = self.path("ocr");
        let image_dir = self.path("images");
        std::fs::create_dir_all(&ocr_dir)?;
        std::fs::create_dir_all(&image_dir)?;

        for (i, page) in pages.iter().enumerate() {
            let number = i + 1;
            page.save(&ocr_dir.join(format!("{stem}_page{number}_ocr.json")))?;
            page_image(page, 400, 200).save(image_dir.join(format!("{stem}_page{number}.png")))?;
        }
        Ok((ocr_dir, image_dir))
    }
}

pub fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}
