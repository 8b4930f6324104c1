//! Render strategy trait and supporting types.
//!
//! A strategy burns a page's annotated tokens onto its image. Burn-in
//! writes replacement text into each region; block-out paints every region
//! solid and is also the fallback when no font is available.

use crate::layout::Token;
use image::RgbImage;

/// Statistics about rendering one page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderResult {
    /// Regions filled and overwritten with replacement text
    pub regions_burned: usize,

    /// Regions painted as solid blocks
    pub regions_blocked: usize,

    /// Erased tokens outside any region, painted with the neutral fill
    pub orphans_filled: usize,

    /// Whether the page fell back to block-out for lack of a font
    pub font_fallback: bool,
}

impl RenderResult {
    /// Creates a result indicating nothing was painted.
    pub fn none() -> Self {
        Self::default()
    }

    /// Returns true if any pixels were changed.
    pub fn has_redactions(&self) -> bool {
        self.regions_burned + self.regions_blocked + self.orphans_filled > 0
    }

    /// Adds another page's counts to this one.
    pub fn absorb(&mut self, other: &RenderResult) {
        self.regions_burned += other.regions_burned;
        self.regions_blocked += other.regions_blocked;
        self.orphans_filled += other.orphans_filled;
        self.font_fallback |= other.font_fallback;
    }
}

/// Strategy for projecting token replacements onto a page image.
pub trait RenderStrategy: Send + Sync {
    /// Paints the redactions for `tokens` onto `image`.
    ///
    /// Tokens whose replacement equals their text must leave the image
    /// untouched.
    fn render(&self, image: &mut RgbImage, tokens: &[Token]) -> RenderResult;

    /// Returns a human-readable name for this strategy.
    fn name(&self) -> &str;
}
