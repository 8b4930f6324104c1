//! Redaction renderer.
//!
//! Tokens are walked in reading order. A token with a replacement starts a
//! region; the erased tokens that immediately follow it on the same visual
//! line are absorbed and their boxes unioned. Each region is then either
//! painted solid (block marker, or no font available) or filled and
//! overwritten with the replacement text shrunk to fit.

use super::strategy::{RenderResult, RenderStrategy};
use super::substitution::Substitution;
use crate::config::RenderConfig;
use crate::layout::Token;
use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Pixel box with exclusive right and bottom edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl BoxRect {
    pub fn of_token(token: &Token) -> Self {
        Self {
            left: token.left,
            top: token.top,
            right: token.right(),
            bottom: token.bottom(),
        }
    }

    pub fn union(self, other: Self) -> Self {
        Self {
            left: self.left.min(other.left),
            top: self.top.min(other.top),
            right: self.right.max(other.right),
            bottom: self.bottom.max(other.bottom),
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    fn to_rect(self) -> Option<Rect> {
        (self.width() > 0 && self.height() > 0)
            .then(|| Rect::at(self.left, self.top).of_size(self.width() as u32, self.height() as u32))
    }
}

/// One redaction rectangle and the text that goes into it.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    /// Index of the token that started the region.
    pub anchor: usize,
    /// Indices of absorbed tokens, anchor excluded.
    pub absorbed: Vec<usize>,
    pub bounds: BoxRect,
    pub text: String,
}

/// Regions and orphan erasures of one page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageLayout {
    pub regions: Vec<Region>,
    /// Erased tokens not absorbed into any region.
    pub orphans: Vec<usize>,
}

fn same_line(anchor: &Token, next: &Token, tolerance: f32) -> bool {
    ((anchor.top - next.top).abs() as f32) <= anchor.height as f32 * tolerance
}

fn is_left_jump(anchor: &Token, next: &Token, slack: i32) -> bool {
    next.left < anchor.left - slack
}

/// Groups a page's annotated tokens into redaction regions.
pub fn coalesce(tokens: &[Token], config: &RenderConfig) -> PageLayout {
    let mut layout = PageLayout::default();
    let mut i = 0;

    while i < tokens.len() {
        let anchor = &tokens[i];
        let text = match anchor.substitution() {
            Substitution::Replaced(text) => text,
            Substitution::Erased => {
                layout.orphans.push(i);
                i += 1;
                continue;
            }
            Substitution::Unchanged => {
                i += 1;
                continue;
            }
        };

        let mut bounds = BoxRect::of_token(anchor);
        let mut absorbed = Vec::new();
        let mut j = i + 1;
        while j < tokens.len() {
            let next = &tokens[j];
            if !next.is_blank()
                || !same_line(anchor, next, config.line_tolerance)
                || is_left_jump(anchor, next, config.left_jump_slack)
            {
                break;
            }
            bounds = bounds.union(BoxRect::of_token(next));
            absorbed.push(j);
            j += 1;
        }

        layout.regions.push(Region {
            anchor: i,
            absorbed,
            bounds,
            text,
        });
        i = j;
    }

    layout
}

fn fill(image: &mut RgbImage, bounds: BoxRect, color: [u8; 3]) -> bool {
    match bounds.to_rect() {
        Some(rect) => {
            draw_filled_rect_mut(image, rect, Rgb(color));
            true
        }
        None => false,
    }
}

fn fill_orphans(image: &mut RgbImage, tokens: &[Token], layout: &PageLayout, color: [u8; 3]) -> usize {
    layout
        .orphans
        .iter()
        .filter(|&&idx| fill(image, BoxRect::of_token(&tokens[idx]), color))
        .count()
}

/// Reads the first candidate that parses as a TrueType/OpenType font.
pub fn load_font(paths: &[PathBuf]) -> Option<FontVec> {
    for path in paths {
        let Ok(bytes) = std::fs::read(path) else {
            continue;
        };
        match FontVec::try_from_vec(bytes) {
            Ok(font) => {
                debug!(path = %path.display(), "loaded font");
                return Some(font);
            }
            Err(err) => warn!(path = %path.display(), error = %err, "font file not usable"),
        }
    }
    None
}

/// Paints every region solid.
#[derive(Debug, Clone)]
pub struct BlockOutStrategy {
    config: RenderConfig,
}

impl BlockOutStrategy {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

impl RenderStrategy for BlockOutStrategy {
    fn render(&self, image: &mut RgbImage, tokens: &[Token]) -> RenderResult {
        let layout = coalesce(tokens, &self.config);
        let regions_blocked = layout
            .regions
            .iter()
            .filter(|region| fill(image, region.bounds, self.config.block_color))
            .count();
        RenderResult {
            regions_blocked,
            orphans_filled: fill_orphans(image, tokens, &layout, self.config.fill_color),
            ..RenderResult::none()
        }
    }

    fn name(&self) -> &str {
        "block-out"
    }
}

/// Writes replacement text into each region.
pub struct BurnInStrategy {
    config: RenderConfig,
    block_marker: String,
    font: Option<FontVec>,
}

impl BurnInStrategy {
    /// Creates the strategy, loading the first usable configured font.
    pub fn new(config: &RenderConfig, block_marker: impl Into<String>) -> Self {
        let font = load_font(&config.font_paths);
        if font.is_none() {
            warn!("no configured font could be loaded; regions will be blocked out");
        }
        Self {
            config: config.clone(),
            block_marker: block_marker.into(),
            font,
        }
    }

    /// Replaces the font (or clears it with `None`).
    pub fn with_font(mut self, font: Option<FontVec>) -> Self {
        self.font = font;
        self
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    fn draw_fitted(&self, image: &mut RgbImage, font: &FontVec, region: &Region) {
        let bounds = region.bounds;
        let h = bounds.height();
        let fitted = fit_text(&region.text, bounds.width(), h, &self.config, |size, text| {
            text_size(PxScale::from(size), font, text).0 as i32
        });

        let scale = PxScale::from(fitted.size);
        let line_height = fitted.size.round() as i32;
        let text_height = match fitted.lines.as_slice() {
            [single] => text_size(scale, font, single).1 as i32,
            many => line_height * many.len() as i32,
        };
        let mut y = (bounds.top as f32 + (h - text_height) as f32 / 2.0
            - h as f32 * self.config.vertical_nudge)
            .round() as i32;

        for line in &fitted.lines {
            draw_text_mut(
                image,
                Rgb(self.config.text_color),
                bounds.left,
                y,
                scale,
                font,
                line,
            );
            y += line_height;
        }
    }
}

/// Font size and line breaks chosen for one region.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedText {
    pub size: f32,
    pub lines: Vec<String>,
}

/// Picks the font size and lines for `text` in a `width` x `height` box.
///
/// Starts at `font_scale` times the box height and shrinks one pixel at a
/// time until the text fits or `min_font_size` is reached. Text still too
/// wide at the floor is split in half with a trailing hyphen on the first
/// line. `width_of` measures a string at a given pixel size.
pub fn fit_text(
    text: &str,
    width: i32,
    height: i32,
    config: &RenderConfig,
    width_of: impl Fn(f32, &str) -> i32,
) -> FittedText {
    let mut size = (height as f32 * config.font_scale).max(1.0);
    while width_of(size, text) > width && size > config.min_font_size {
        size -= 1.0;
    }

    let lines = if width_of(size, text) > width {
        let chars: Vec<char> = text.chars().collect();
        let mid = chars.len() / 2;
        vec![
            format!("{}-", chars[..mid].iter().collect::<String>()),
            chars[mid..].iter().collect(),
        ]
    } else {
        vec![text.to_string()]
    };

    FittedText { size, lines }
}

impl RenderStrategy for BurnInStrategy {
    fn render(&self, image: &mut RgbImage, tokens: &[Token]) -> RenderResult {
        let Some(font) = &self.font else {
            let mut result = BlockOutStrategy::new(&self.config).render(image, tokens);
            result.font_fallback = result.regions_blocked > 0;
            return result;
        };

        let layout = coalesce(tokens, &self.config);
        let mut result = RenderResult::none();
        for region in &layout.regions {
            if region.text == self.block_marker {
                if fill(image, region.bounds, self.config.block_color) {
                    result.regions_blocked += 1;
                }
                continue;
            }
            if fill(image, region.bounds, self.config.fill_color) {
                self.draw_fitted(image, font, region);
                result.regions_burned += 1;
            }
        }
        result.orphans_filled = fill_orphans(image, tokens, &layout, self.config.fill_color);
        result
    }

    fn name(&self) -> &str {
        "burn-in"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;

    fn token(text: &str, replacement: Option<&str>, left: i32, top: i32, width: i32) -> Token {
        let mut token = Token::new(text, 0, (left, top, width, 20));
        token.replacement = replacement.map(str::to_string);
        token
    }

    fn page() -> RgbImage {
        RgbImage::from_fn(200, 100, |x, y| Rgb([(x % 251) as u8, (y % 251) as u8, 128]))
    }

    #[test]
    fn test_unchanged_tokens_leave_image_identical() {
        let tokens = vec![
            token("Seen", Some("Seen"), 5, 10, 40),
            token("today", None, 50, 10, 50),
        ];
        let mut image = page();
        let result = BurnInStrategy::new(&RenderConfig::default(), "*").render(&mut image, &tokens);
        assert_eq!(image, page());
        assert!(!result.has_redactions());
    }

    #[test]
    fn test_erased_tokens_on_same_line_are_absorbed() {
        let tokens = vec![
            token("J", Some("Paul Quinn"), 10, 10, 10),
            token("R", Some(""), 25, 11, 10),
            token("Smith", Some(""), 40, 10, 50),
            token("today", None, 95, 10, 50),
        ];
        let layout = coalesce(&tokens, &RenderConfig::default());
        assert_eq!(layout.regions.len(), 1);
        assert_eq!(layout.regions[0].absorbed, vec![1, 2]);
        assert_eq!(
            layout.regions[0].bounds,
            BoxRect {
                left: 10,
                top: 10,
                right: 90,
                bottom: 31
            }
        );
        assert!(layout.orphans.is_empty());
    }

    #[test]
    fn test_wrapped_tail_becomes_orphan() {
        let tokens = vec![
            token("Jon", Some("Mark Hayes"), 150, 10, 40),
            token("Smith", Some(""), 5, 40, 50),
        ];
        let layout = coalesce(&tokens, &RenderConfig::default());
        assert_eq!(layout.regions.len(), 1);
        assert!(layout.regions[0].absorbed.is_empty());
        assert_eq!(layout.orphans, vec![1]);
    }

    #[test]
    fn test_block_marker_and_missing_font_paint_solid() {
        let tokens = vec![token("Lee", Some("*"), 10, 10, 30)];
        let mut image = page();
        let strategy = BurnInStrategy::new(&RenderConfig::default(), "*").with_font(None);
        let result = strategy.render(&mut image, &tokens);
        assert_eq!(result.regions_blocked, 1);
        assert!(result.font_fallback);
        assert_eq!(*image.get_pixel(20, 20), Rgb([0, 0, 0]));
        assert_eq!(*image.get_pixel(100, 50), *page().get_pixel(100, 50));
    }

    #[test]
    fn test_burn_in_writes_text_when_font_available() {
        let config = RenderConfig::default();
        let Some(font) = load_font(&config.font_paths) else {
            return;
        };
        let tokens = vec![token("Jon", Some("Mark"), 10, 10, 80)];
        let mut image = RgbImage::from_pixel(200, 100, Rgb([200, 200, 200]));
        let strategy = BurnInStrategy::new(&config, "*").with_font(Some(font));
        let result = strategy.render(&mut image, &tokens);
        assert_eq!(result.regions_burned, 1);

        let region = image.view(10, 10, 80, 20).to_image();
        assert!(region.pixels().any(|p| *p == Rgb([255, 255, 255])));
        assert!(region.pixels().any(|p| p[0] < 128));
    }

    #[test]
    fn test_block_out_strategy() {
        let tokens = vec![
            token("Jon", Some("Mark"), 10, 10, 30),
            token("x", Some(""), 0, 60, 10),
        ];
        let mut image = page();
        let result = BlockOutStrategy::new(&RenderConfig::default()).render(&mut image, &tokens);
        assert_eq!(result.regions_blocked, 1);
        assert_eq!(result.orphans_filled, 1);
        assert_eq!(*image.get_pixel(5, 65), Rgb([255, 255, 255]));
    }

    /// Half an em per character.
    fn measure(size: f32, text: &str) -> i32 {
        (text.chars().count() as f32 * size * 0.5) as i32
    }

    fn fit_config() -> RenderConfig {
        RenderConfig {
            font_scale: 1.0,
            min_font_size: 15.0,
            ..RenderConfig::default()
        }
    }

    #[test]
    fn test_fit_keeps_starting_size_when_text_fits() {
        let fitted = fit_text("Ann", 200, 20, &fit_config(), measure);
        assert_eq!(fitted.size, 20.0);
        assert_eq!(fitted.lines, vec!["Ann".to_string()]);
    }

    #[test]
    fn test_fit_shrinks_until_text_fits() {
        // Ten characters at size s measure 5s, so 16 is the largest fit for 80.
        let fitted = fit_text("Paul Quinn", 80, 20, &fit_config(), measure);
        assert_eq!(fitted.size, 16.0);
        assert_eq!(fitted.lines.len(), 1);
    }

    #[test]
    fn test_fit_splits_long_text_at_floor() {
        let fitted = fit_text("Maximilianus", 40, 20, &fit_config(), measure);
        assert_eq!(fitted.size, 15.0);
        assert_eq!(fitted.lines, vec!["Maximi-".to_string(), "lianus".to_string()]);
    }
}
