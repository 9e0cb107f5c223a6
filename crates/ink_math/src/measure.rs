//! Text measurement strategies
//!
//! Layout asks a [`TextMeasure`] for the size of every text run. The
//! default [`CharWidthEstimate`] approximates glyph widths; hosts with
//! access to real font metrics can plug in their own implementation.

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

/// Size of a measured text run
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TextMetrics {
    pub width: f32,
    pub height: f32,
    /// Distance from the top of the run to its baseline
    pub baseline: f32,
}

/// Capability to measure a text run at a font size
pub trait TextMeasure: Send + Sync {
    fn measure(&self, text: &str, font_size: f32) -> TextMetrics;
}

/// Fixed per-character width heuristic
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CharWidthEstimate {
    /// Character advance as a fraction of the font size
    pub width_factor: f32,
    /// Baseline offset as a fraction of the font size
    pub baseline_factor: f32,
}

impl Default for CharWidthEstimate {
    fn default() -> Self {
        Self {
            width_factor: 0.6,
            baseline_factor: 0.25,
        }
    }
}

impl TextMeasure for CharWidthEstimate {
    fn measure(&self, text: &str, font_size: f32) -> TextMetrics {
        let length = text.graphemes(true).count() as f32;
        TextMetrics {
            width: length * font_size * self.width_factor,
            height: font_size,
            baseline: font_size * self.baseline_factor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_width() {
        let m = CharWidthEstimate::default().measure("abc", 20.0);
        assert!((m.width - 36.0).abs() < 1e-4);
        assert_eq!(m.height, 20.0);
        assert_eq!(m.baseline, 5.0);
    }

    #[test]
    fn test_estimate_counts_graphemes() {
        // "e" + combining acute is one cluster
        let m = CharWidthEstimate::default().measure("e\u{0301}", 10.0);
        assert!((m.width - 6.0).abs() < 1e-4);
    }

    #[test]
    fn test_empty_text_has_zero_width() {
        let m = CharWidthEstimate::default().measure("", 10.0);
        assert_eq!(m.width, 0.0);
        assert_eq!(m.height, 10.0);
    }
}
