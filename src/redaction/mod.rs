//! Substitution, rendering and the service that runs a redaction pass.
//!
//! A pass turns raw detector output into final spans (validation, merging,
//! reviewer corrections, domain filtering), groups name variants, and
//! substitutes every span through a session-wide identity store. The
//! resulting detection records drive the layout linker and the page
//! renderer.

pub mod dates;
pub mod generate;
pub mod identity;
pub mod record;
pub mod render;
pub mod strategy;
pub mod substitution;

pub use identity::{Identity, IdentityAttributes, IdentityStore, Session};
pub use record::{read_jsonl, write_jsonl, DetectionRecord};
pub use render::{coalesce, fit_text, BlockOutStrategy, BurnInStrategy, FittedText, PageLayout, Region};
pub use strategy::{RenderResult, RenderStrategy};
pub use substitution::{Anonymized, Substitution, SubstitutionEngine};

use crate::config::PipelineConfig;
use crate::domain::{
    merge_spans, normalize_detections, DomainFilter, DropReason, EntityType, IdentityGroups,
    RawDetection, ReviewCorrections, Span, TextIndex,
};
use crate::error::{RedactorError, RedactorResult};
use crate::layout::{link_entities, pdf, Document, LinkReport, OcrPage};
use image::RgbImage;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Which review round a pass belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassKind {
    First,
    Second,
}

/// Everything a pass produced.
#[derive(Debug, Clone)]
pub struct PassOutput {
    pub kind: PassKind,
    pub anonymized_text: String,
    /// Final entities, sorted by start.
    pub records: Vec<DetectionRecord>,
    /// Detections rejected as malformed before merging.
    pub rejected: Vec<RawDetection>,
    /// Spans removed by the domain filter, with the rule that removed them.
    pub dropped: Vec<(Span, DropReason)>,
    pub corrections: ReviewCorrections,
}

#[derive(Serialize)]
struct PassParams<'a> {
    pass: PassKind,
    date_key: Option<&'a str>,
    allow_list: &'a [String],
    deny_list: &'a [String],
    config: &'a PipelineConfig,
}

impl PassOutput {
    /// Writes `anonymized_text.txt`, `results.jsonl`, `identities.json` and
    /// `params.json` into `dir`, creating it if needed.
    pub fn write_artifacts(
        &self,
        dir: &Path,
        session: &Session,
        config: &PipelineConfig,
    ) -> RedactorResult<()> {
        std::fs::create_dir_all(dir).map_err(|e| RedactorError::io(dir, e))?;

        let text_path = dir.join("anonymized_text.txt");
        std::fs::write(&text_path, &self.anonymized_text)
            .map_err(|e| RedactorError::io(&text_path, e))?;

        write_jsonl(&dir.join("results.jsonl"), &self.records)?;
        session.store.save(&dir.join("identities.json"))?;

        let params = PassParams {
            pass: self.kind,
            date_key: session.date_key(),
            allow_list: &self.corrections.allow_list,
            deny_list: &self.corrections.deny_list,
            config,
        };
        let params_path = dir.join("params.json");
        let raw = serde_json::to_string_pretty(&params)
            .map_err(|e| RedactorError::json("pass parameters", e))?;
        std::fs::write(&params_path, raw).map_err(|e| RedactorError::io(&params_path, e))
    }
}

/// Paths produced by rendering a document.
#[derive(Debug, Clone, Default)]
pub struct RenderedDocument {
    pub pages: Vec<PathBuf>,
    pub pdf: Option<PathBuf>,
    pub result: RenderResult,
    /// Pages left out because their image was missing or unreadable.
    pub skipped: usize,
}

/// Redaction service coordinating every pipeline stage.
///
/// The configuration and compiled filter are immutable and shared by all
/// passes; per-case state lives in the [`Session`] handed to each call.
pub struct RedactionService {
    config: PipelineConfig,
    filter: DomainFilter,
    engine: SubstitutionEngine,
    strategy: Box<dyn RenderStrategy>,
}

impl RedactionService {
    /// Creates a service with the specified render strategy.
    pub fn new(config: PipelineConfig, strategy: Box<dyn RenderStrategy>) -> RedactorResult<Self> {
        config.validate()?;
        let filter = DomainFilter::new(&config.filter, config.age_ceiling)?;
        let engine = SubstitutionEngine::new(&config.substitution, config.age_ceiling);
        Ok(Self {
            config,
            filter,
            engine,
            strategy,
        })
    }

    /// Creates a service that burns replacement text onto page images.
    pub fn with_burn_in(config: PipelineConfig) -> RedactorResult<Self> {
        let strategy = BurnInStrategy::new(&config.render, config.substitution.block_marker.clone());
        Self::new(config, Box::new(strategy))
    }

    /// Creates a service that paints every redaction as a solid block.
    pub fn with_block_out(config: PipelineConfig) -> RedactorResult<Self> {
        let strategy = BlockOutStrategy::new(&config.render);
        Self::new(config, Box::new(strategy))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    /// A fresh session seeded from the configuration.
    pub fn new_session(&self) -> Session {
        Session::new(self.config.substitution.seed)
    }

    /// Runs a pass without reviewer corrections.
    pub fn first_pass(
        &self,
        session: &mut Session,
        text: &str,
        detections: Vec<Vec<RawDetection>>,
    ) -> RedactorResult<PassOutput> {
        self.run_pass(PassKind::First, session, text, detections, ReviewCorrections::default())
    }

    /// Re-runs detection output with a reviewer's allow and deny lists.
    ///
    /// Reuse the first pass's session (or a session over its saved identity
    /// store) so unchanged entities keep their first-pass substitutes.
    pub fn second_pass(
        &self,
        session: &mut Session,
        text: &str,
        detections: Vec<Vec<RawDetection>>,
        corrections: ReviewCorrections,
    ) -> RedactorResult<PassOutput> {
        self.run_pass(PassKind::Second, session, text, detections, corrections)
    }

    fn run_pass(
        &self,
        kind: PassKind,
        session: &mut Session,
        text: &str,
        detections: Vec<Vec<RawDetection>>,
        corrections: ReviewCorrections,
    ) -> RedactorResult<PassOutput> {
        let index = TextIndex::new(text);
        let text_len = index.char_len();

        let mut rejected = Vec::new();
        let mut sets = Vec::with_capacity(detections.len());
        for raw in detections {
            let normalized = normalize_detections(raw, text_len);
            rejected.extend(normalized.rejected);
            sets.push(normalized.spans);
        }

        let mut spans = if sets.len() >= 2 {
            merge_spans(&sets, &self.config.source_preference)
        } else {
            sets.into_iter().flatten().collect()
        };
        spans.extend(corrections.deny_spans(&index)?);

        let outcome = self.filter.apply(&index, spans, &corrections.allow_list);

        let names: Vec<&str> = outcome
            .spans
            .iter()
            .filter(|span| span.entity_type == EntityType::Person)
            .map(|span| index.span_text(span))
            .collect();
        let groups = IdentityGroups::build(&names, self.config.grouping.similarity_cutoff);

        let anonymized = self.engine.anonymize(session, text, &outcome.spans, &groups);
        let records: Vec<DetectionRecord> = anonymized
            .applied
            .iter()
            .map(|applied| DetectionRecord::from_applied(&index, applied, self.config.context_window))
            .collect();

        info!(
            pass = ?kind,
            entities = records.len(),
            dropped = outcome.dropped.len(),
            rejected = rejected.len(),
            identity_groups = groups.groups().len(),
            "pass complete"
        );

        Ok(PassOutput {
            kind,
            anonymized_text: anonymized.text,
            records,
            rejected,
            dropped: outcome.dropped,
            corrections,
        })
    }

    /// Annotates the document's tokens with the records' replacements.
    pub fn link(&self, document: &mut Document, records: &[DetectionRecord]) -> RedactorResult<LinkReport> {
        link_entities(document, records)
    }

    /// Burns one page's annotated tokens onto its image.
    pub fn render_page(&self, image: &mut RgbImage, page: &OcrPage) -> RenderResult {
        self.strategy.render(image, &page.tokens)
    }

    /// Renders every page of `document` whose image is found in
    /// `images_dir`, writes `<name>_deid.png` files and `redacted.pdf` to
    /// `out_dir`. Pages whose image is missing or cannot be decoded are
    /// skipped with a warning and counted in [`RenderedDocument::skipped`].
    pub fn render_document(
        &self,
        document: &Document,
        images_dir: &Path,
        out_dir: &Path,
    ) -> RedactorResult<RenderedDocument> {
        std::fs::create_dir_all(out_dir).map_err(|e| RedactorError::io(out_dir, e))?;

        let mut rendered = RenderedDocument::default();
        let mut images = Vec::new();
        for page in document.pages() {
            let Some(stem) = page_stem(page.path.as_deref(), page.number) else {
                continue;
            };
            let Some(image_path) = find_page_image(images_dir, &stem) else {
                warn!(page = page.number, image = %stem, "page image not found; skipping");
                rendered.skipped += 1;
                continue;
            };

            let mut image = match image::open(&image_path) {
                Ok(image) => image.to_rgb8(),
                Err(err) => {
                    warn!(
                        page = page.number,
                        path = %image_path.display(),
                        error = %err,
                        "page image unreadable; skipping"
                    );
                    rendered.skipped += 1;
                    continue;
                }
            };
            let result = self.render_page(&mut image, &page.ocr);
            rendered.result.absorb(&result);

            let output = out_dir.join(format!("{stem}_deid.png"));
            image.save(&output).map_err(|source| RedactorError::Image {
                path: output.clone(),
                source,
            })?;
            rendered.pages.push(output);
            images.push(image);
        }

        if !images.is_empty() {
            let pdf_path = out_dir.join("redacted.pdf");
            pdf::assemble_pdf(&images, self.config.render.dpi, &pdf_path)?;
            rendered.pdf = Some(pdf_path);
        }

        info!(
            pages = rendered.pages.len(),
            skipped = rendered.skipped,
            strategy = self.strategy.name(),
            "rendered document"
        );
        Ok(rendered)
    }
}

/// `scan_page3` for `scan_page3_ocr.json`; `page3` for in-memory pages.
fn page_stem(path: Option<&Path>, number: usize) -> Option<String> {
    match path {
        Some(path) => path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.strip_suffix("_ocr.json"))
            .map(str::to_string),
        None => Some(format!("page{number}")),
    }
}

fn find_page_image(dir: &Path, stem: &str) -> Option<PathBuf> {
    ["png", "jpg", "jpeg"]
        .iter()
        .map(|ext| dir.join(format!("{stem}.{ext}")))
        .find(|path| path.is_file())
}
