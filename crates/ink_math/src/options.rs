//! Render options
//!
//! Options arrive from the host canvas as a JSON object with camelCase
//! keys. Every field is optional; missing fields take their defaults.

use crate::error::{MathError, MathResult};
use crate::layout::{LayoutContext, LayoutSettings};
use crate::parser::DEFAULT_MAX_DEPTH;
use crate::render::{Color, RenderConfig};
use serde::{Deserialize, Serialize};

/// Options for one render call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct RenderOptions {
    /// CSS-style font family list for text runs
    pub font_family: String,
    /// Base font size in pixels
    pub font_size: f32,
    /// Ink color for text and strokes
    pub color: Color,
    /// Width of structural strokes in pixels
    pub stroke_width: f32,
    /// Whether single glyphs get a small random rotation
    pub handwriting_variance: bool,
    /// Fixed seed for the rotation jitter
    pub jitter_seed: Option<u64>,
    /// Left edge of the layout
    pub origin_x: f32,
    /// Top edge of the layout
    pub origin_y: f32,
    /// Nesting depth past which parsing and layout stop descending
    pub max_nesting_depth: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            font_family: "Caveat, cursive".to_string(),
            font_size: 32.0,
            color: Color::INK,
            stroke_width: 2.0,
            handwriting_variance: true,
            jitter_seed: None,
            origin_x: 0.0,
            origin_y: 0.0,
            max_nesting_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl RenderOptions {
    /// Parse options from a JSON object and validate them
    pub fn from_json(json: &str) -> MathResult<Self> {
        let options: RenderOptions = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    /// Reject values layout cannot work with
    pub fn validate(&self) -> MathResult<()> {
        if !self.font_size.is_finite() || self.font_size <= 0.0 {
            return Err(MathError::InvalidOptions(format!(
                "font size must be positive, got {}",
                self.font_size
            )));
        }
        if !self.stroke_width.is_finite() || self.stroke_width <= 0.0 {
            return Err(MathError::InvalidOptions(format!(
                "stroke width must be positive, got {}",
                self.stroke_width
            )));
        }
        if !self.origin_x.is_finite() || !self.origin_y.is_finite() {
            return Err(MathError::InvalidOptions("origin must be finite".to_string()));
        }
        if self.max_nesting_depth == 0 {
            return Err(MathError::InvalidOptions(
                "nesting limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Disable jitter for exact reproduction
    pub fn steady(mut self) -> Self {
        self.handwriting_variance = false;
        self
    }

    pub fn layout_context(&self) -> LayoutContext {
        LayoutContext::new(self.origin_x, self.origin_y, self.font_size)
    }

    pub fn layout_settings(&self) -> LayoutSettings {
        LayoutSettings {
            stroke_width: self.stroke_width,
            max_depth: self.max_nesting_depth,
        }
    }

    pub fn render_config(&self) -> RenderConfig {
        RenderConfig {
            font_family: self.font_family.clone(),
            color: self.color,
            stroke_width: self.stroke_width,
            handwriting_variance: self.handwriting_variance,
            jitter_seed: self.jitter_seed,
        }
    }
}
