//! Rendering facade
//!
//! [`MathRenderer`] runs parse, layout and generation for one expression
//! and never fails: empty input, invalid options and generation failures
//! all end in a plain-text fallback of the raw input.

use crate::error::{MathError, MathResult};
use crate::layout::{LayoutEngine, Rect};
use crate::measure::TextMeasure;
use crate::options::RenderOptions;
use crate::parser::parse_with_limit;
use crate::render::{self, RenderPrimitive, Renderer};
use serde::{Deserialize, Serialize};
use std::future::Future;

/// How a rendered object was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderStatus {
    /// Parsed, laid out and generated as math
    Typeset,
    /// Raw input drawn as a single plain-text run
    Fallback,
}

#[derive(Debug, Clone, Copy)]
enum Stage {
    Parsing,
    Layout,
    Generation,
    Success,
    Fallback,
}

/// Result of one render call, owned by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedObject {
    pub primitives: Vec<RenderPrimitive>,
    pub bounds: Rect,
    /// Baseline offset from the top of `bounds`
    pub baseline: f32,
    pub status: RenderStatus,
    /// The input this object was rendered from
    pub source: String,
}

impl RenderedObject {
    pub fn is_fallback(&self) -> bool {
        self.status == RenderStatus::Fallback
    }

    /// Move every primitive so the top-left of `bounds` lands on `(left, top)`
    pub fn placed_at(mut self, left: f32, top: f32) -> Self {
        let dx = left - self.bounds.x;
        let dy = top - self.bounds.y;
        for primitive in &mut self.primitives {
            primitive.translate(dx, dy);
        }
        self.bounds.x = left;
        self.bounds.y = top;
        self
    }

    /// The primitives as bare markup elements
    pub fn to_markup(&self) -> MathResult<String> {
        render::to_markup(&self.primitives)
    }
}

/// Serialize a rendered object as a standalone SVG document
pub fn to_svg(object: &RenderedObject) -> MathResult<String> {
    render::to_svg_document(&object.primitives, object.bounds)
}

/// Renders LaTeX strings with fixed options. Holds no per-call state, so
/// one instance can serve concurrent callers.
pub struct MathRenderer {
    options: RenderOptions,
    engine: LayoutEngine,
    renderer: Renderer,
}

impl MathRenderer {
    pub fn new(options: RenderOptions) -> Self {
        Self {
            engine: LayoutEngine::with_settings(options.layout_settings()),
            renderer: Renderer::with_config(options.render_config()),
            options,
        }
    }

    /// Replace the text measurement strategy
    pub fn with_measure(mut self, measure: impl TextMeasure + 'static) -> Self {
        self.engine = self.engine.with_measure(measure);
        self
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Render an expression. Never fails; see [`RenderStatus`].
    pub fn render(&self, latex: &str) -> RenderedObject {
        match self.typeset(latex) {
            Ok(object) => {
                tracing::debug!(stage = ?Stage::Success, primitives = object.primitives.len(), "expression typeset");
                object
            }
            Err(err) => {
                tracing::warn!(%err, stage = ?Stage::Fallback, "rendering raw input as plain text");
                self.fallback(latex)
            }
        }
    }

    /// Render a host value; anything but a string is rejected before parsing
    pub fn render_value(&self, value: &serde_json::Value) -> RenderedObject {
        match value.as_str() {
            Some(latex) => self.render(latex),
            None => {
                let err = MathError::InputValidation(format!(
                    "expected a string expression, got {}",
                    json_kind(value)
                ));
                tracing::warn!(%err, stage = ?Stage::Fallback, "rejected non-string input");
                self.fallback("")
            }
        }
    }

    /// Wait for the host's font-readiness signal once, then render
    pub async fn render_when_ready<F>(&self, latex: &str, ready: F) -> RenderedObject
    where
        F: Future<Output = ()>,
    {
        ready.await;
        self.render(latex)
    }

    fn typeset(&self, latex: &str) -> MathResult<RenderedObject> {
        if latex.trim().is_empty() {
            return Err(MathError::InputValidation("empty expression".to_string()));
        }
        self.options.validate()?;

        tracing::debug!(stage = ?Stage::Parsing, len = latex.len(), "parsing expression");
        let ast = parse_with_limit(latex, self.options.max_nesting_depth);

        tracing::debug!(stage = ?Stage::Layout, depth = ast.depth(), "laying out tree");
        let tree = self.engine.layout(&ast, self.options.layout_context());

        tracing::debug!(
            stage = ?Stage::Generation,
            width = tree.width,
            height = tree.height,
            "generating primitives"
        );
        let output = self.renderer.generate(&tree)?;

        Ok(RenderedObject {
            primitives: output.primitives,
            bounds: output.bounds,
            baseline: output.baseline,
            status: RenderStatus::Typeset,
            source: latex.to_string(),
        })
    }

    /// One plain-text run of the raw input; nothing at all for blank input
    fn fallback(&self, latex: &str) -> RenderedObject {
        let options = &self.options;
        let origin_x = finite_or_zero(options.origin_x);
        let origin_y = finite_or_zero(options.origin_y);

        if latex.trim().is_empty() {
            return RenderedObject {
                primitives: Vec::new(),
                bounds: Rect::new(origin_x, origin_y, 0.0, 0.0),
                baseline: 0.0,
                status: RenderStatus::Fallback,
                source: latex.to_string(),
            };
        }

        let font_size = if options.font_size.is_finite() && options.font_size > 0.0 {
            options.font_size
        } else {
            RenderOptions::default().font_size
        };
        let metrics = self.engine.measure_text(latex, font_size);

        RenderedObject {
            primitives: vec![RenderPrimitive::TextRun {
                text: latex.to_string(),
                x: origin_x,
                y: origin_y + metrics.baseline,
                font_size,
                font_family: options.font_family.clone(),
                color: options.color,
                rotation: None,
            }],
            bounds: Rect::new(origin_x, origin_y, metrics.width, metrics.height),
            baseline: metrics.baseline,
            status: RenderStatus::Fallback,
            source: latex.to_string(),
        }
    }
}

impl Default for MathRenderer {
    fn default() -> Self {
        Self::new(RenderOptions::default())
    }
}

/// Render one expression with the given options
pub fn render(latex: &str, options: &RenderOptions) -> RenderedObject {
    MathRenderer::new(options.clone()).render(latex)
}

fn finite_or_zero(value: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
