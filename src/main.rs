//! De-identification CLI.
//!
//! Runs review passes over a document's text and detector output, links the
//! result onto OCR page files, and burns redactions into page images.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use phi_redactor::layout::Document;
use phi_redactor::redaction::{read_jsonl, PassOutput};
use phi_redactor::{
    IdentityStore, OcrPage, PipelineConfig, RawDetection, RedactionService, ReviewCorrections,
    Session,
};

/// Clinical Document De-identification Tool
///
/// Reconciles PHI detections, substitutes consistent synthetic values, and
/// projects the redaction onto OCR page images.
#[derive(Parser)]
#[command(name = "phi-redactor")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Pipeline configuration (JSON); defaults apply to missing fields
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct PassArgs {
    /// Document text the detections were computed over
    #[arg(short, long, value_name = "FILE")]
    text: PathBuf,

    /// Detector output, one JSON array of detections per detector
    #[arg(short, long, value_name = "FILE", num_args = 1.., required = true)]
    detections: Vec<PathBuf>,

    /// Directory for pass artefacts
    #[arg(short, long, value_name = "DIR")]
    out_dir: PathBuf,

    /// Patient or document key that date shifts are tied to
    #[arg(long, value_name = "KEY")]
    date_key: Option<String>,

    /// Seed for reproducible synthetic values
    #[arg(long, value_name = "N")]
    seed: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve and substitute detections without reviewer input
    FirstPass {
        #[command(flatten)]
        pass: PassArgs,
    },

    /// Re-run with reviewer allow/deny lists and optionally render pages
    SecondPass {
        #[command(flatten)]
        pass: PassArgs,

        /// Newline-separated strings that must not be redacted
        #[arg(long, value_name = "FILE")]
        allow_list: Option<PathBuf>,

        /// Newline-separated strings that must be redacted everywhere
        #[arg(long, value_name = "FILE")]
        deny_list: Option<PathBuf>,

        /// Identity store from the first pass
        #[arg(long, value_name = "FILE")]
        identities: Option<PathBuf>,

        /// Directory of `*_pageN_ocr.json` files to link and render
        #[arg(long, value_name = "DIR", requires = "images")]
        ocr_dir: Option<PathBuf>,

        /// Directory of `*_pageN.png` page images
        #[arg(long, value_name = "DIR", requires = "ocr_dir")]
        images: Option<PathBuf>,

        /// Paint solid blocks instead of burning in replacement text
        #[arg(long)]
        block: bool,
    },

    /// Annotate page OCR files in place with detection records
    Link {
        /// Detection records (JSON Lines)
        #[arg(short, long, value_name = "FILE")]
        records: PathBuf,

        /// Directory of `*_pageN_ocr.json` files
        #[arg(long, value_name = "DIR")]
        ocr_dir: PathBuf,
    },

    /// Burn one annotated page onto its image
    Render {
        /// Page image
        #[arg(short, long, value_name = "FILE")]
        image: PathBuf,

        /// Annotated page OCR file
        #[arg(long, value_name = "FILE")]
        ocr: PathBuf,

        /// Output image path
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// Paint solid blocks instead of burning in replacement text
        #[arg(long)]
        block: bool,
    },
}

/// Command handler sharing one configuration across commands.
struct PipelineHandler {
    config: PipelineConfig,
    verbose: bool,
}

impl PipelineHandler {
    fn new(config: Option<&Path>, verbose: bool) -> Result<Self> {
        let config = match config {
            Some(path) => PipelineConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => PipelineConfig::default(),
        };
        Ok(Self { config, verbose })
    }

    fn service(&self, seed: Option<u64>, block: bool) -> Result<RedactionService> {
        let mut config = self.config.clone();
        if let Some(seed) = seed {
            config = config.with_seed(seed);
        }
        let service = if block {
            RedactionService::with_block_out(config)
        } else {
            RedactionService::with_burn_in(config)
        };
        service.with_context(|| "Invalid pipeline configuration")
    }

    fn session(
        &self,
        service: &RedactionService,
        args: &PassArgs,
        identities: Option<&Path>,
    ) -> Result<Session> {
        let mut session = service.new_session();
        if let Some(path) = identities {
            let store = IdentityStore::load(path)
                .with_context(|| format!("Failed to load identities {}", path.display()))?;
            session = session.with_store(store);
        }
        if let Some(key) = &args.date_key {
            session = session.with_date_key(key.clone());
        }
        Ok(session)
    }

    fn first_pass(&self, args: &PassArgs) -> Result<()> {
        let service = self.service(args.seed, true)?;
        let mut session = self.session(&service, args, None)?;
        let (text, detections) = load_pass_inputs(args)?;

        let output = service
            .first_pass(&mut session, &text, detections)
            .with_context(|| "First pass failed")?;
        self.finish_pass(&service, &session, &output, &args.out_dir)
    }

    #[allow(clippy::too_many_arguments)]
    fn second_pass(
        &self,
        args: &PassArgs,
        allow_list: Option<&Path>,
        deny_list: Option<&Path>,
        identities: Option<&Path>,
        ocr_dir: Option<&Path>,
        images: Option<&Path>,
        block: bool,
    ) -> Result<()> {
        let service = self.service(args.seed, block)?;
        let mut session = self.session(&service, args, identities)?;
        let (text, detections) = load_pass_inputs(args)?;
        let corrections = ReviewCorrections::from_lines(
            &read_optional(allow_list)?,
            &read_optional(deny_list)?,
        );

        let output = service
            .second_pass(&mut session, &text, detections, corrections)
            .with_context(|| "Second pass failed")?;
        self.finish_pass(&service, &session, &output, &args.out_dir)?;

        if let (Some(ocr_dir), Some(images)) = (ocr_dir, images) {
            let mut document = self.load_document(ocr_dir)?;
            let report = service
                .link(&mut document, &output.records)
                .with_context(|| "Linking failed")?;
            if !report.is_complete() {
                println!(
                    "⚠ {} entit(ies) did not land on any OCR token",
                    report.unlinked.len()
                );
            }

            let rendered = service
                .render_document(&document, images, &args.out_dir)
                .with_context(|| "Rendering failed")?;
            match rendered.pdf {
                Some(pdf) => println!(
                    "✓ Rendered {} page(s) → {}",
                    rendered.pages.len(),
                    pdf.display()
                ),
                None => println!("⚠ No page images found in {}", images.display()),
            }
            if rendered.skipped > 0 {
                println!("⚠ Skipped {} page(s) without a usable image", rendered.skipped);
            }
        }

        Ok(())
    }

    fn finish_pass(
        &self,
        service: &RedactionService,
        session: &Session,
        output: &PassOutput,
        out_dir: &Path,
    ) -> Result<()> {
        output
            .write_artifacts(out_dir, session, service.config())
            .with_context(|| format!("Failed to write artefacts to {}", out_dir.display()))?;

        if self.verbose {
            println!("\nPass Summary:");
            println!("  Entities:   {}", output.records.len());
            println!("  Dropped:    {}", output.dropped.len());
            println!("  Rejected:   {}", output.rejected.len());
            println!("  Identities: {}", session.store.len());
        }
        println!(
            "✓ Substituted {} entit(ies) → {}",
            output.records.len(),
            out_dir.display()
        );
        Ok(())
    }

    fn load_document(&self, ocr_dir: &Path) -> Result<Document> {
        Document::load_dir(ocr_dir, &self.config.layout.page_separator)
            .with_context(|| format!("Failed to read OCR pages from {}", ocr_dir.display()))
    }

    fn link(&self, records: &Path, ocr_dir: &Path) -> Result<()> {
        let records = read_jsonl(records)
            .with_context(|| format!("Failed to read records {}", records.display()))?;
        let service = self.service(None, true)?;
        let mut document = self.load_document(ocr_dir)?;

        let report = service
            .link(&mut document, &records)
            .with_context(|| "Linking failed")?;
        let written = document
            .save()
            .with_context(|| "Failed to write OCR pages")?;

        if self.verbose {
            println!("  Tokens replaced: {}", report.tokens_replaced);
            println!("  Tokens erased:   {}", report.tokens_erased);
            println!("  Unchanged:       {}", report.unchanged);
        }
        println!(
            "✓ Linked {} entit(ies) across {} page(s)",
            report.linked, written
        );
        if !report.is_complete() {
            println!(
                "⚠ {} entit(ies) did not land on any OCR token",
                report.unlinked.len()
            );
        }
        Ok(())
    }

    fn render(&self, image: &Path, ocr: &Path, output: &Path, block: bool) -> Result<()> {
        let service = self.service(None, block)?;
        let page = OcrPage::load(ocr).with_context(|| format!("Failed to read {}", ocr.display()))?;
        let mut pixels = image::open(image)
            .with_context(|| format!("Failed to open image {}", image.display()))?
            .to_rgb8();

        let result = service.render_page(&mut pixels, &page);
        pixels
            .save(output)
            .with_context(|| format!("Failed to write {}", output.display()))?;

        if self.verbose {
            println!("  Strategy: {}", service.strategy_name());
            println!("  Burned:   {}", result.regions_burned);
            println!("  Blocked:  {}", result.regions_blocked);
            println!("  Orphans:  {}", result.orphans_filled);
        }
        if result.font_fallback {
            println!("⚠ No usable font; regions were blocked out");
        }
        println!("✓ Rendered page → {}", output.display());
        Ok(())
    }
}

/// Reads one detector's output, labelling unlabelled detections with the
/// file stem so source preferences can refer to it.
fn load_detections(path: &Path) -> Result<Vec<RawDetection>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read detections {}", path.display()))?;
    let mut detections: Vec<RawDetection> = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid detections JSON in {}", path.display()))?;

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    for detection in &mut detections {
        if detection.source.is_empty() {
            detection.source = stem.clone();
        }
    }
    Ok(detections)
}

fn load_pass_inputs(args: &PassArgs) -> Result<(String, Vec<Vec<RawDetection>>)> {
    let text = std::fs::read_to_string(&args.text)
        .with_context(|| format!("Failed to read text {}", args.text.display()))?;
    let detections = args
        .detections
        .iter()
        .map(|path| load_detections(path))
        .collect::<Result<Vec<_>>>()?;
    Ok((text, detections))
}

fn read_optional(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => Ok(String::new()),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let handler = PipelineHandler::new(cli.config.as_deref(), cli.verbose)?;

    match &cli.command {
        Commands::FirstPass { pass } => handler.first_pass(pass)?,
        Commands::SecondPass {
            pass,
            allow_list,
            deny_list,
            identities,
            ocr_dir,
            images,
            block,
        } => handler.second_pass(
            pass,
            allow_list.as_deref(),
            deny_list.as_deref(),
            identities.as_deref(),
            ocr_dir.as_deref(),
            images.as_deref(),
            *block,
        )?,
        Commands::Link { records, ocr_dir } => handler.link(records, ocr_dir)?,
        Commands::Render {
            image,
            ocr,
            output,
            block,
        } => handler.render(image, ocr, output, *block)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_detections_take_file_stem_as_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ner.json");
        std::fs::write(
            &path,
            r#"[{"start":0,"end":3,"entity_type":"PERSON","score":0.9},
                {"start":4,"end":7,"entity_type":"PERSON","source":"regex"}]"#,
        )
        .unwrap();
        let detections = load_detections(&path).unwrap();
        assert_eq!(detections[0].source, "ner");
        assert_eq!(detections[1].source, "regex");
    }
}
