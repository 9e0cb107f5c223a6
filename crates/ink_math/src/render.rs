//! Math Rendering - Convert layout to render primitives
//!
//! This module walks a laid out tree in document order and emits the
//! vector primitives a host graphics layer draws: text runs, lines and
//! paths. It also serializes primitives into a small SVG dialect.

use crate::error::{MathError, MathResult};
use crate::layout::{
    AttachedScript, BigOperator, Delimiter, LayoutKind, LayoutNode, Rect,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write};
use unicode_segmentation::UnicodeSegmentation;

/// Maximum handwriting jitter in degrees, either direction
pub const JITTER_DEGREES: f32 = 0.15;

// =============================================================================
// Render Primitives
// =============================================================================

/// A color in RGBA format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const INK: Color = Color::rgb(0x1a, 0x1a, 0x1a);

    /// Parse `#rrggbb` or `#rrggbbaa`
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.strip_prefix('#')?;
        if !digits.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(digits.get(i..i + 2)?, 16).ok();
        match digits.len() {
            6 => Some(Self::rgb(channel(0)?, channel(2)?, channel(4)?)),
            8 => Some(Self::new(channel(0)?, channel(2)?, channel(4)?, channel(6)?)),
            _ => None,
        }
    }

    /// Format as `#rrggbb`, or `#rrggbbaa` when not opaque
    pub fn to_hex(&self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::INK
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Color::from_hex(&value).ok_or_else(|| format!("invalid color: {}", value))
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_hex()
    }
}

/// Rotation about a center point, in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rotation {
    pub degrees: f32,
    pub cx: f32,
    pub cy: f32,
}

/// Path drawing commands (similar to SVG)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PathCommand {
    MoveTo(f32, f32),
    LineTo(f32, f32),
    QuadTo(f32, f32, f32, f32),            // control point, end point
    CubicTo(f32, f32, f32, f32, f32, f32), // two control points, end point
    Close,
}

impl PathCommand {
    fn translate(&mut self, dx: f32, dy: f32) {
        match self {
            PathCommand::MoveTo(x, y) | PathCommand::LineTo(x, y) => {
                *x += dx;
                *y += dy;
            }
            PathCommand::QuadTo(x1, y1, x, y) => {
                *x1 += dx;
                *y1 += dy;
                *x += dx;
                *y += dy;
            }
            PathCommand::CubicTo(x1, y1, x2, y2, x, y) => {
                *x1 += dx;
                *y1 += dy;
                *x2 += dx;
                *y2 += dy;
                *x += dx;
                *y += dy;
            }
            PathCommand::Close => {}
        }
    }
}

/// Serialize path commands into SVG path data
pub fn path_data(commands: &[PathCommand]) -> String {
    let parts: Vec<String> = commands
        .iter()
        .map(|c| match *c {
            PathCommand::MoveTo(x, y) => format!("M {} {}", num(x), num(y)),
            PathCommand::LineTo(x, y) => format!("L {} {}", num(x), num(y)),
            PathCommand::QuadTo(x1, y1, x, y) => {
                format!("Q {} {} {} {}", num(x1), num(y1), num(x), num(y))
            }
            PathCommand::CubicTo(x1, y1, x2, y2, x, y) => format!(
                "C {} {} {} {} {} {}",
                num(x1),
                num(y1),
                num(x2),
                num(y2),
                num(x),
                num(y)
            ),
            PathCommand::Close => "Z".to_string(),
        })
        .collect();
    parts.join(" ")
}

/// A render primitive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RenderPrimitive {
    /// Draw text with its baseline at `y`
    TextRun {
        text: String,
        x: f32,
        y: f32,
        font_size: f32,
        font_family: String,
        color: Color,
        rotation: Option<Rotation>,
    },
    /// Draw a straight stroke
    Line {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        stroke: Color,
        width: f32,
    },
    /// Draw a path (for radicals, delimiters, big operators)
    Path {
        data: Vec<PathCommand>,
        stroke: Color,
        fill: Option<Color>,
        width: f32,
    },
}

impl RenderPrimitive {
    pub fn is_text(&self) -> bool {
        matches!(self, RenderPrimitive::TextRun { .. })
    }

    pub fn translate(&mut self, dx: f32, dy: f32) {
        match self {
            RenderPrimitive::TextRun { x, y, rotation, .. } => {
                *x += dx;
                *y += dy;
                if let Some(r) = rotation {
                    r.cx += dx;
                    r.cy += dy;
                }
            }
            RenderPrimitive::Line { x1, y1, x2, y2, .. } => {
                *x1 += dx;
                *y1 += dy;
                *x2 += dx;
                *y2 += dy;
            }
            RenderPrimitive::Path { data, .. } => {
                for command in data {
                    command.translate(dx, dy);
                }
            }
        }
    }
}

// =============================================================================
// Render Output
// =============================================================================

/// The complete render output for a math expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderOutput {
    /// All render primitives, in document order
    pub primitives: Vec<RenderPrimitive>,
    /// Total bounding box
    pub bounds: Rect,
    /// Baseline offset from the top of `bounds`
    pub baseline: f32,
}

// =============================================================================
// Renderer
// =============================================================================

/// Configuration for the renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    pub font_family: String,
    pub color: Color,
    pub stroke_width: f32,
    /// Rotate single-glyph runs slightly to look hand drawn
    pub handwriting_variance: bool,
    /// Seed for the jitter generator; fresh entropy when absent
    pub jitter_seed: Option<u64>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            font_family: "Caveat, cursive".to_string(),
            color: Color::INK,
            stroke_width: 2.0,
            handwriting_variance: true,
            jitter_seed: None,
        }
    }
}

/// Renderer for converting layout to render primitives
pub struct Renderer {
    config: RenderConfig,
}

impl Renderer {
    /// Create a new renderer with default config
    pub fn new() -> Self {
        Self::with_config(RenderConfig::default())
    }

    /// Create with custom config
    pub fn with_config(config: RenderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Render a layout tree to primitives. Producing nothing is a
    /// generation failure.
    pub fn generate(&self, layout: &LayoutNode) -> MathResult<RenderOutput> {
        let mut jitter = if self.config.handwriting_variance {
            Some(match self.config.jitter_seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            })
        } else {
            None
        };

        let mut primitives = Vec::new();
        self.render_node(layout, &mut jitter, &mut primitives);

        if primitives.is_empty() {
            return Err(MathError::Generation(
                "layout produced no drawable primitives".to_string(),
            ));
        }

        let bounds = layout.extent();
        Ok(RenderOutput {
            primitives,
            bounds,
            baseline: layout.baseline_y() - bounds.y,
        })
    }

    /// Render a node, then any scripts attached to it
    fn render_node(
        &self,
        node: &LayoutNode,
        jitter: &mut Option<StdRng>,
        out: &mut Vec<RenderPrimitive>,
    ) {
        match &node.kind {
            LayoutKind::Text {
                text, font_size, ..
            } => {
                let single_glyph = text.graphemes(true).count() == 1;
                let rotation = match jitter.as_mut() {
                    Some(rng) if single_glyph => Some(Rotation {
                        degrees: rng.gen_range(-JITTER_DEGREES..=JITTER_DEGREES),
                        cx: node.x + node.width / 2.0,
                        cy: node.y + node.height / 2.0,
                    }),
                    _ => None,
                };
                out.push(RenderPrimitive::TextRun {
                    text: text.clone(),
                    x: node.x,
                    y: node.baseline_y(),
                    font_size: *font_size,
                    font_family: self.config.font_family.clone(),
                    color: self.config.color,
                    rotation,
                });
            }
            LayoutKind::Sequence { children } => {
                for child in children {
                    self.render_node(child, jitter, out);
                }
            }
            LayoutKind::Fraction {
                numerator,
                bar,
                denominator,
            } => {
                let y = bar.y + bar.thickness / 2.0;
                out.push(self.line(bar.x, y, bar.x + bar.width, y));
                self.render_node(numerator, jitter, out);
                self.render_node(denominator, jitter, out);
            }
            LayoutKind::Sqrt {
                radical,
                overline,
                index,
                content,
            } => {
                out.push(self.stroke_path(radical_path(radical)));
                out.push(self.line(
                    overline.x,
                    overline.y,
                    overline.x + overline.width,
                    overline.y,
                ));
                if let Some(index) = index {
                    self.render_node(index, jitter, out);
                }
                self.render_node(content, jitter, out);
            }
            LayoutKind::Script { content, .. } => self.render_node(content, jitter, out),
            LayoutKind::BigOperator {
                operator,
                glyph,
                upper,
                lower,
            } => {
                let path = match operator {
                    BigOperator::Integral => integral_path(glyph),
                    BigOperator::Sum => sigma_path(glyph),
                };
                out.push(self.stroke_path(path));
                for limit in upper.iter().chain(lower.iter()) {
                    self.render_node(limit, jitter, out);
                }
            }
            LayoutKind::Limit { label, approach } => {
                self.render_node(label, jitter, out);
                if let Some(approach) = approach {
                    self.render_node(approach, jitter, out);
                }
            }
            LayoutKind::Delimited {
                delimiter,
                open,
                content,
                close,
            } => {
                out.push(self.delimiter(*delimiter, open, true));
                self.render_node(content, jitter, out);
                out.push(self.delimiter(*delimiter, close, false));
            }
            LayoutKind::Empty => {}
        }

        match &node.attached_script {
            Some(AttachedScript::Superscript(s)) | Some(AttachedScript::Subscript(s)) => {
                self.render_node(s, jitter, out);
            }
            Some(AttachedScript::Both {
                superscript,
                subscript,
            }) => {
                self.render_node(superscript, jitter, out);
                self.render_node(subscript, jitter, out);
            }
            None => {}
        }
    }

    fn line(&self, x1: f32, y1: f32, x2: f32, y2: f32) -> RenderPrimitive {
        RenderPrimitive::Line {
            x1,
            y1,
            x2,
            y2,
            stroke: self.config.color,
            width: self.config.stroke_width,
        }
    }

    fn stroke_path(&self, data: Vec<PathCommand>) -> RenderPrimitive {
        RenderPrimitive::Path {
            data,
            stroke: self.config.color,
            fill: None,
            width: self.config.stroke_width,
        }
    }

    fn delimiter(&self, delimiter: Delimiter, rect: &Rect, opening: bool) -> RenderPrimitive {
        match delimiter {
            Delimiter::Absolute => {
                let x = rect.center_x();
                self.line(x, rect.y, x, rect.bottom())
            }
            Delimiter::Parentheses => {
                // Bow outward: left for the opener, right for the closer
                let (tip, bulge) = if opening {
                    (rect.x + rect.width * 0.8, rect.x)
                } else {
                    (rect.x + rect.width * 0.2, rect.right())
                };
                self.stroke_path(vec![
                    PathCommand::MoveTo(tip, rect.y),
                    PathCommand::QuadTo(bulge, rect.center_y(), tip, rect.bottom()),
                ])
            }
        }
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

fn radical_path(r: &Rect) -> Vec<PathCommand> {
    vec![
        PathCommand::MoveTo(r.x, r.y + r.height * 0.55),
        PathCommand::LineTo(r.x + r.width * 0.2, r.y + r.height * 0.45),
        PathCommand::LineTo(r.x + r.width * 0.5, r.bottom()),
        PathCommand::LineTo(r.right(), r.y),
    ]
}

fn integral_path(r: &Rect) -> Vec<PathCommand> {
    let (x, y, w, h) = (r.x, r.y, r.width, r.height);
    vec![
        PathCommand::MoveTo(x + w * 0.85, y + h * 0.08),
        PathCommand::CubicTo(
            x + w * 0.6,
            y - h * 0.02,
            x + w * 0.5,
            y + h * 0.15,
            x + w * 0.5,
            y + h * 0.5,
        ),
        PathCommand::CubicTo(
            x + w * 0.5,
            y + h * 0.85,
            x + w * 0.4,
            y + h * 1.02,
            x + w * 0.15,
            y + h * 0.92,
        ),
    ]
}

fn sigma_path(r: &Rect) -> Vec<PathCommand> {
    vec![
        PathCommand::MoveTo(r.right(), r.y),
        PathCommand::LineTo(r.x, r.y),
        PathCommand::LineTo(r.x + r.width * 0.55, r.center_y()),
        PathCommand::LineTo(r.x, r.bottom()),
        PathCommand::LineTo(r.right(), r.bottom()),
    ]
}

// =============================================================================
// Markup
// =============================================================================

/// Format a coordinate with at most two decimals
fn num(value: f32) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    if rounded == 0.0 {
        "0".to_string()
    } else {
        format!("{}", rounded)
    }
}

/// Escape XML special characters
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Write one `<text>`, `<line>` or `<path>` element per primitive
pub fn write_markup(primitives: &[RenderPrimitive], out: &mut impl Write) -> fmt::Result {
    for primitive in primitives {
        match primitive {
            RenderPrimitive::TextRun {
                text,
                x,
                y,
                font_size,
                font_family,
                color,
                rotation,
            } => {
                write!(
                    out,
                    r#"<text x="{}" y="{}" font-family="{}" font-size="{}" fill="{}""#,
                    num(*x),
                    num(*y),
                    escape_xml(font_family),
                    num(*font_size),
                    color.to_hex()
                )?;
                if let Some(r) = rotation {
                    write!(
                        out,
                        r#" transform="rotate({} {} {})""#,
                        r.degrees,
                        num(r.cx),
                        num(r.cy)
                    )?;
                }
                writeln!(out, ">{}</text>", escape_xml(text))?;
            }
            RenderPrimitive::Line {
                x1,
                y1,
                x2,
                y2,
                stroke,
                width,
            } => {
                writeln!(
                    out,
                    r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="{}" stroke-linecap="round"/>"#,
                    num(*x1),
                    num(*y1),
                    num(*x2),
                    num(*y2),
                    stroke.to_hex(),
                    num(*width)
                )?;
            }
            RenderPrimitive::Path {
                data,
                stroke,
                fill,
                width,
            } => {
                let fill = fill.map_or_else(|| "none".to_string(), |c| c.to_hex());
                writeln!(
                    out,
                    r#"<path d="{}" stroke="{}" fill="{}" stroke-width="{}" stroke-linecap="round" stroke-linejoin="round"/>"#,
                    path_data(data),
                    stroke.to_hex(),
                    fill,
                    num(*width)
                )?;
            }
        }
    }
    Ok(())
}

/// Serialize primitives as markup elements
pub fn to_markup(primitives: &[RenderPrimitive]) -> MathResult<String> {
    let mut out = String::new();
    write_markup(primitives, &mut out)?;
    Ok(out)
}

/// Serialize primitives as a standalone SVG document covering `bounds`
pub fn to_svg_document(primitives: &[RenderPrimitive], bounds: Rect) -> MathResult<String> {
    let mut svg = String::new();
    writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}" viewBox="{} {} {} {}">"#,
        num(bounds.width),
        num(bounds.height),
        num(bounds.x),
        num(bounds.y),
        num(bounds.width),
        num(bounds.height)
    )?;
    write_markup(primitives, &mut svg)?;
    svg.push_str("</svg>");
    Ok(svg)
}

// =============================================================================
// Tests
// =============================================================================
