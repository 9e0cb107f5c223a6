//! Ink Math - handwritten-style math rendering for the drawing canvas
//!
//! This crate turns a LaTeX-like expression string into vector primitives:
//! - A recursive-descent parser producing a math AST
//! - Box layout computing positions, sizes and baselines
//! - Rendering to text runs, lines and paths, with optional handwriting jitter
//! - SVG markup serialization
//! - A facade that never fails, falling back to the raw input as plain text
//!
//! ```
//! use ink_math::{MathRenderer, RenderOptions};
//!
//! let renderer = MathRenderer::new(RenderOptions::default().steady());
//! let object = renderer.render("\\frac{1}{2}");
//! assert_eq!(object.primitives.len(), 3);
//! ```

pub mod error;
pub mod layout;
pub mod measure;
pub mod model;
pub mod options;
pub mod parser;
pub mod pipeline;
pub mod render;

pub use error::*;
pub use layout::{
    layout, AttachedScript, Bar, LayoutContext, LayoutEngine, LayoutKind, LayoutNode,
    LayoutSettings, Rect,
};
pub use measure::{CharWidthEstimate, TextMeasure, TextMetrics};
pub use model::MathNode;
pub use options::RenderOptions;
pub use parser::{parse, parse_with_limit, LatexParser};
pub use pipeline::{render, to_svg, MathRenderer, RenderStatus, RenderedObject};
pub use render::{Color, PathCommand, RenderConfig, RenderOutput, RenderPrimitive, Renderer};
