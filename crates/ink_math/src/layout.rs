//! Math Layout - Calculate positions and sizes for math expressions
//!
//! This module turns a parsed [`MathNode`] tree into a [`LayoutNode`] tree
//! carrying absolute geometry. Coordinates are top-left based, rooted at
//! the origin given in the [`LayoutContext`]; `baseline` is always an
//! offset from a node's own top edge.
//!
//! Superscripts and subscripts are parsed as standalone siblings. While
//! laying out a sequence they are folded into the preceding sibling's
//! [`AttachedScript`] slot instead of taking a slot of their own.

use crate::measure::{CharWidthEstimate, TextMeasure, TextMetrics};
use crate::model::MathNode;
use crate::parser::DEFAULT_MAX_DEPTH;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Gap between stacked parts of a structure, in pixels
pub const PADDING: f32 = 4.0;
/// Minimum inner width of a fraction bar
pub const MIN_FRACTION_WIDTH: f32 = 20.0;
/// Script size relative to the surrounding font size
pub const SCRIPT_SCALE: f32 = 0.6;
/// Numerator/denominator size relative to the surrounding font size
pub const FRACTION_SCALE: f32 = 0.7;
/// Integral/sum limit size relative to the surrounding font size
pub const BIG_OPERATOR_LIMIT_SCALE: f32 = 0.5;
/// Sqrt index size relative to the surrounding font size
pub const ROOT_INDEX_SCALE: f32 = 0.5;

const SUPERSCRIPT_RISE: f32 = 0.45;
const SUBSCRIPT_DROP: f32 = 0.3;
const STANDALONE_SUPERSCRIPT_RISE: f32 = 0.4;
const SCRIPT_OVERLAP: f32 = 0.1;

// =============================================================================
// Geometry
// =============================================================================

/// An axis-aligned rectangle
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn center_x(&self) -> f32 {
        self.x + self.width / 2.0
    }

    pub fn center_y(&self) -> f32 {
        self.y + self.height / 2.0
    }

    /// Smallest rectangle containing both
    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Rect::new(
            x,
            y,
            self.right().max(other.right()) - x,
            self.bottom().max(other.bottom()) - y,
        )
    }

    fn translate(&mut self, dx: f32, dy: f32) {
        self.x += dx;
        self.y += dy;
    }
}

/// A horizontal rule (fraction bar, radical overline)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Bar {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub thickness: f32,
}

impl Bar {
    fn translate(&mut self, dx: f32, dy: f32) {
        self.x += dx;
        self.y += dy;
    }
}

// =============================================================================
// Layout Tree
// =============================================================================

/// Where a layout computation starts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayoutContext {
    pub x: f32,
    pub y: f32,
    pub font_size: f32,
    /// How many fraction/root/script levels deep this context is. Reported
    /// in diagnostics only; the recursion limit counts every descent,
    /// sequences included, through [`LayoutSettings::max_depth`].
    pub nesting_level: usize,
}

impl LayoutContext {
    pub fn new(x: f32, y: f32, font_size: f32) -> Self {
        Self {
            x,
            y,
            font_size,
            nesting_level: 0,
        }
    }

    /// Same size and level at another position
    pub fn at(&self, x: f32, y: f32) -> Self {
        Self { x, y, ..*self }
    }

    /// One level deeper at a scaled font size
    pub fn nested(&self, scale: f32) -> Self {
        Self {
            font_size: self.font_size * scale,
            nesting_level: self.nesting_level + 1,
            ..*self
        }
    }

    fn is_valid(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.font_size.is_finite() && self.font_size > 0.0
    }
}

/// Which leaf kind a text run came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextRole {
    Number,
    Variable,
    Operator,
    Greek,
    Function,
    Text,
}

/// Superscript or subscript
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScriptPosition {
    Superscript,
    Subscript,
}

impl ScriptPosition {
    fn of(node: &MathNode) -> Option<(ScriptPosition, &MathNode)> {
        match node {
            MathNode::Superscript(inner) => Some((ScriptPosition::Superscript, inner)),
            MathNode::Subscript(inner) => Some((ScriptPosition::Subscript, inner)),
            _ => None,
        }
    }
}

/// Integral or summation sign
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BigOperator {
    Integral,
    Sum,
}

/// Round brackets or absolute-value bars
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Delimiter {
    Parentheses,
    Absolute,
}

/// Scripts bound to the preceding sibling in a sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttachedScript {
    Superscript(Box<LayoutNode>),
    Subscript(Box<LayoutNode>),
    Both {
        superscript: Box<LayoutNode>,
        subscript: Box<LayoutNode>,
    },
}

impl AttachedScript {
    pub fn superscript(&self) -> Option<&LayoutNode> {
        match self {
            AttachedScript::Superscript(s) | AttachedScript::Both { superscript: s, .. } => {
                Some(s)
            }
            AttachedScript::Subscript(_) => None,
        }
    }

    pub fn subscript(&self) -> Option<&LayoutNode> {
        match self {
            AttachedScript::Subscript(s) | AttachedScript::Both { subscript: s, .. } => Some(s),
            AttachedScript::Superscript(_) => None,
        }
    }

    /// Attached layouts in document order (superscript first)
    pub fn nodes(&self) -> Vec<&LayoutNode> {
        self.superscript().into_iter().chain(self.subscript()).collect()
    }

    fn nodes_mut(&mut self) -> Vec<&mut LayoutNode> {
        match self {
            AttachedScript::Superscript(s) | AttachedScript::Subscript(s) => vec![s.as_mut()],
            AttachedScript::Both {
                superscript,
                subscript,
            } => vec![superscript.as_mut(), subscript.as_mut()],
        }
    }
}

/// Content of a layout node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LayoutKind {
    /// A leaf text run
    Text {
        text: String,
        font_size: f32,
        role: TextRole,
    },
    /// Horizontal sequence (Equation or Group)
    Sequence { children: Vec<LayoutNode> },
    Fraction {
        numerator: Box<LayoutNode>,
        bar: Bar,
        denominator: Box<LayoutNode>,
    },
    Sqrt {
        /// Box occupied by the radical sign
        radical: Rect,
        overline: Bar,
        index: Option<Box<LayoutNode>>,
        content: Box<LayoutNode>,
    },
    /// A script with no preceding sibling to attach to
    Script {
        position: ScriptPosition,
        content: Box<LayoutNode>,
    },
    BigOperator {
        operator: BigOperator,
        /// Box occupied by the operator sign
        glyph: Rect,
        upper: Option<Box<LayoutNode>>,
        lower: Option<Box<LayoutNode>>,
    },
    Limit {
        label: Box<LayoutNode>,
        approach: Option<Box<LayoutNode>>,
    },
    Delimited {
        delimiter: Delimiter,
        open: Rect,
        content: Box<LayoutNode>,
        close: Rect,
    },
    /// Zero-size placeholder for anything that could not be laid out
    Empty,
}

/// A laid out node with absolute geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutNode {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Distance from the top edge to the text baseline
    pub baseline: f32,
    pub kind: LayoutKind,
    pub attached_script: Option<AttachedScript>,
}

impl LayoutNode {
    fn new(bounds: Rect, baseline: f32, kind: LayoutKind) -> Self {
        Self {
            x: bounds.x,
            y: bounds.y,
            width: bounds.width.max(0.0),
            height: bounds.height.max(0.0),
            baseline,
            kind,
            attached_script: None,
        }
    }

    fn empty(ctx: &LayoutContext) -> Self {
        let (x, y) = if ctx.x.is_finite() && ctx.y.is_finite() {
            (ctx.x, ctx.y)
        } else {
            (0.0, 0.0)
        };
        Self::new(Rect::new(x, y, 0.0, 0.0), 0.0, LayoutKind::Empty)
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }

    /// Absolute y of the baseline
    pub fn baseline_y(&self) -> f32 {
        self.y + self.baseline
    }

    /// Bounds including any attached scripts
    pub fn extent(&self) -> Rect {
        let own = self.bounds();
        match &self.attached_script {
            Some(scripts) => scripts
                .nodes()
                .into_iter()
                .fold(own, |acc, s| acc.union(&s.extent())),
            None => own,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.kind, LayoutKind::Empty)
    }

    /// Direct sub-layouts in document order, attached scripts last
    pub fn children(&self) -> Vec<&LayoutNode> {
        let mut out: Vec<&LayoutNode> = match &self.kind {
            LayoutKind::Sequence { children } => children.iter().collect(),
            LayoutKind::Fraction {
                numerator,
                denominator,
                ..
            } => vec![numerator.as_ref(), denominator.as_ref()],
            LayoutKind::Sqrt { index, content, .. } => {
                index.iter().map(|b| b.as_ref()).chain([content.as_ref()]).collect()
            }
            LayoutKind::Script { content, .. } => vec![content.as_ref()],
            LayoutKind::BigOperator { upper, lower, .. } => {
                upper.iter().chain(lower.iter()).map(|b| b.as_ref()).collect()
            }
            LayoutKind::Limit { label, approach } => {
                [label.as_ref()].into_iter().chain(approach.as_deref()).collect()
            }
            LayoutKind::Delimited { content, .. } => vec![content.as_ref()],
            LayoutKind::Text { .. } | LayoutKind::Empty => vec![],
        };
        if let Some(scripts) = &self.attached_script {
            out.extend(scripts.nodes());
        }
        out
    }

    /// Move this node and everything under it
    pub fn translate(&mut self, dx: f32, dy: f32) {
        self.x += dx;
        self.y += dy;

        match &mut self.kind {
            LayoutKind::Sequence { children } => {
                for child in children {
                    child.translate(dx, dy);
                }
            }
            LayoutKind::Fraction {
                numerator,
                bar,
                denominator,
            } => {
                numerator.translate(dx, dy);
                bar.translate(dx, dy);
                denominator.translate(dx, dy);
            }
            LayoutKind::Sqrt {
                radical,
                overline,
                index,
                content,
            } => {
                radical.translate(dx, dy);
                overline.translate(dx, dy);
                if let Some(index) = index {
                    index.translate(dx, dy);
                }
                content.translate(dx, dy);
            }
            LayoutKind::Script { content, .. } => content.translate(dx, dy),
            LayoutKind::BigOperator {
                glyph,
                upper,
                lower,
                ..
            } => {
                glyph.translate(dx, dy);
                for limit in upper.iter_mut().chain(lower.iter_mut()) {
                    limit.translate(dx, dy);
                }
            }
            LayoutKind::Limit { label, approach } => {
                label.translate(dx, dy);
                if let Some(approach) = approach {
                    approach.translate(dx, dy);
                }
            }
            LayoutKind::Delimited {
                open,
                content,
                close,
                ..
            } => {
                open.translate(dx, dy);
                content.translate(dx, dy);
                close.translate(dx, dy);
            }
            LayoutKind::Text { .. } | LayoutKind::Empty => {}
        }

        if let Some(scripts) = &mut self.attached_script {
            for script in scripts.nodes_mut() {
                script.translate(dx, dy);
            }
        }
    }

    fn accepts_script(&self, position: ScriptPosition) -> bool {
        match (&self.attached_script, position) {
            (None, _) => true,
            (Some(AttachedScript::Superscript(_)), ScriptPosition::Subscript) => true,
            (Some(AttachedScript::Subscript(_)), ScriptPosition::Superscript) => true,
            _ => false,
        }
    }

    fn attach_script(&mut self, position: ScriptPosition, script: LayoutNode) {
        let script = Box::new(script);
        self.attached_script = match (self.attached_script.take(), position) {
            (Some(AttachedScript::Subscript(subscript)), ScriptPosition::Superscript) => {
                Some(AttachedScript::Both {
                    superscript: script,
                    subscript,
                })
            }
            (Some(AttachedScript::Superscript(superscript)), ScriptPosition::Subscript) => {
                Some(AttachedScript::Both {
                    superscript,
                    subscript: script,
                })
            }
            (_, ScriptPosition::Superscript) => Some(AttachedScript::Superscript(script)),
            (_, ScriptPosition::Subscript) => Some(AttachedScript::Subscript(script)),
        };
    }
}

// =============================================================================
// Layout Engine
// =============================================================================

/// Settings that shape layout independently of the start context
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayoutSettings {
    /// Stroke width of the renderer; fraction bars scale with it
    pub stroke_width: f32,
    /// Recursion depth past which subtrees become empty layouts
    pub max_depth: usize,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            stroke_width: 2.0,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Engine for computing math layout
pub struct LayoutEngine {
    settings: LayoutSettings,
    measure: Box<dyn TextMeasure>,
}

impl LayoutEngine {
    /// Create a new layout engine with default settings
    pub fn new() -> Self {
        Self::with_settings(LayoutSettings::default())
    }

    /// Create with specific settings
    pub fn with_settings(settings: LayoutSettings) -> Self {
        Self {
            settings,
            measure: Box::new(CharWidthEstimate::default()),
        }
    }

    /// Replace the text measurement strategy
    pub fn with_measure(mut self, measure: impl TextMeasure + 'static) -> Self {
        self.measure = Box::new(measure);
        self
    }

    pub fn settings(&self) -> &LayoutSettings {
        &self.settings
    }

    /// Measure a run with this engine's strategy
    pub fn measure_text(&self, text: &str, font_size: f32) -> TextMetrics {
        self.measure.measure(text, font_size)
    }

    /// Lay out a tree. Always succeeds; anything that cannot be laid out
    /// becomes a zero-size [`LayoutKind::Empty`].
    pub fn layout(&self, node: &MathNode, context: LayoutContext) -> LayoutNode {
        self.layout_node(node, &context, 0)
    }

    fn layout_node(&self, node: &MathNode, ctx: &LayoutContext, depth: usize) -> LayoutNode {
        if depth > self.settings.max_depth {
            warn!(
                node = node.kind_name(),
                depth,
                nesting_level = ctx.nesting_level,
                "layout nesting limit reached, substituting empty layout"
            );
            return LayoutNode::empty(ctx);
        }
        if !ctx.is_valid() {
            warn!(node = node.kind_name(), ?ctx, "unusable layout context, substituting empty layout");
            return LayoutNode::empty(ctx);
        }
        let depth = depth + 1;

        match node {
            MathNode::Number(n) => self.layout_text(n, TextRole::Number, ctx),
            MathNode::Variable(c) => self.layout_text(&c.to_string(), TextRole::Variable, ctx),
            MathNode::Operator(c) => self.layout_text(&c.to_string(), TextRole::Operator, ctx),
            MathNode::Greek(c) => self.layout_text(&c.to_string(), TextRole::Greek, ctx),
            MathNode::Function(name) => self.layout_text(name, TextRole::Function, ctx),
            MathNode::Text(t) => self.layout_text(t, TextRole::Text, ctx),
            MathNode::Equation(children) | MathNode::Group(children) => {
                self.layout_sequence(children, ctx, depth)
            }
            MathNode::Fraction {
                numerator,
                denominator,
            } => self.layout_fraction(numerator, denominator, ctx, depth),
            MathNode::Sqrt { index, content } => {
                self.layout_sqrt(index.as_deref(), content, ctx, depth)
            }
            MathNode::Superscript(inner) => {
                self.layout_standalone_script(ScriptPosition::Superscript, inner, ctx, depth)
            }
            MathNode::Subscript(inner) => {
                self.layout_standalone_script(ScriptPosition::Subscript, inner, ctx, depth)
            }
            MathNode::Integral { lower, upper } => self.layout_big_operator(
                BigOperator::Integral,
                lower.as_deref(),
                upper.as_deref(),
                ctx,
                depth,
            ),
            MathNode::Sum { lower, upper } => self.layout_big_operator(
                BigOperator::Sum,
                lower.as_deref(),
                upper.as_deref(),
                ctx,
                depth,
            ),
            MathNode::Limit { approach } => self.layout_limit(approach.as_deref(), ctx, depth),
            MathNode::Parentheses(children) => {
                self.layout_delimited(Delimiter::Parentheses, children, ctx, depth)
            }
            MathNode::Absolute(children) => {
                self.layout_delimited(Delimiter::Absolute, children, ctx, depth)
            }
        }
    }

    /// Layout a horizontal sequence, folding scripts into their bases
    fn layout_sequence(
        &self,
        children: &[MathNode],
        ctx: &LayoutContext,
        depth: usize,
    ) -> LayoutNode {
        let font_size = ctx.font_size;
        let mut items: Vec<LayoutNode> = Vec::with_capacity(children.len());
        let mut previous: Option<&MathNode> = None;
        let mut cursor = ctx.x;

        for child in children {
            if let Some((position, inner)) = ScriptPosition::of(child) {
                if let Some(base) = items.last_mut() {
                    if base.accepts_script(position) {
                        let script = self.layout_attached_script(position, inner, base, ctx, depth);
                        base.attach_script(position, script);
                        cursor = cursor.max(base.extent().right());
                        continue;
                    }
                }
            }

            let x = match previous {
                Some(prev) => cursor + sibling_spacing(prev, child, font_size),
                None => cursor,
            };
            let node = self.layout_node(child, &ctx.at(x, ctx.y), depth);
            cursor = node.extent().right();
            previous = Some(child);
            items.push(node);
        }

        // Align every item on the tallest ascent
        let mut max_ascent = 0.0f32;
        let mut max_descent = 0.0f32;
        for item in &items {
            let extent = item.extent();
            max_ascent = max_ascent.max(item.baseline_y() - extent.y);
            max_descent = max_descent.max(extent.bottom() - item.baseline_y());
        }
        for item in &mut items {
            let dy = ctx.y + max_ascent - item.baseline_y();
            item.translate(0.0, dy);
        }

        LayoutNode::new(
            Rect::new(ctx.x, ctx.y, cursor - ctx.x, max_ascent + max_descent),
            max_ascent,
            LayoutKind::Sequence { children: items },
        )
    }

    /// Layout a script against the base it attaches to
    fn layout_attached_script(
        &self,
        position: ScriptPosition,
        inner: &MathNode,
        base: &LayoutNode,
        ctx: &LayoutContext,
        depth: usize,
    ) -> LayoutNode {
        let offset = match position {
            ScriptPosition::Superscript => -SUPERSCRIPT_RISE * ctx.font_size,
            ScriptPosition::Subscript => SUBSCRIPT_DROP * ctx.font_size,
        };
        let x = base.x + base.width * (1.0 - SCRIPT_OVERLAP);
        let script_ctx = ctx.nested(SCRIPT_SCALE).at(x, base.y + offset);
        self.layout_node(inner, &script_ctx, depth)
    }

    /// Layout a script with no base; its offset is carried in the baseline
    fn layout_standalone_script(
        &self,
        position: ScriptPosition,
        inner: &MathNode,
        ctx: &LayoutContext,
        depth: usize,
    ) -> LayoutNode {
        let content = self.layout_node(inner, &ctx.nested(SCRIPT_SCALE), depth);
        let baseline = match position {
            ScriptPosition::Superscript => {
                content.baseline + STANDALONE_SUPERSCRIPT_RISE * ctx.font_size
            }
            ScriptPosition::Subscript => content.baseline - SUBSCRIPT_DROP * ctx.font_size,
        };
        LayoutNode::new(
            content.bounds(),
            baseline,
            LayoutKind::Script {
                position,
                content: Box::new(content),
            },
        )
    }

    /// Layout a fraction: numerator, bar and denominator stacked with padding
    fn layout_fraction(
        &self,
        numerator: &MathNode,
        denominator: &MathNode,
        ctx: &LayoutContext,
        depth: usize,
    ) -> LayoutNode {
        let inner = ctx.nested(FRACTION_SCALE);
        let mut num = self.layout_node(numerator, &inner, depth);
        let mut den = self.layout_node(denominator, &inner, depth);

        let width = num.width.max(den.width).max(MIN_FRACTION_WIDTH) + 2.0 * PADDING;
        let thickness = (self.settings.stroke_width * 1.5).max(2.0);

        num.translate(ctx.x + (width - num.width) / 2.0 - num.x, ctx.y - num.y);
        let bar = Bar {
            x: ctx.x,
            y: num.y + num.height + PADDING,
            width,
            thickness,
        };
        den.translate(
            ctx.x + (width - den.width) / 2.0 - den.x,
            bar.y + thickness + PADDING - den.y,
        );

        let height = den.y + den.height - ctx.y;
        let baseline = num.height + PADDING + thickness / 2.0;

        LayoutNode::new(
            Rect::new(ctx.x, ctx.y, width, height),
            baseline,
            LayoutKind::Fraction {
                numerator: Box::new(num),
                bar,
                denominator: Box::new(den),
            },
        )
    }

    /// Layout a radical. An index sits above-left, its right edge on the
    /// radical's horizontal midpoint and its bottom on its vertical midpoint.
    fn layout_sqrt(
        &self,
        index: Option<&MathNode>,
        content: &MathNode,
        ctx: &LayoutContext,
        depth: usize,
    ) -> LayoutNode {
        let radical_width = ctx.font_size * 0.5;
        let mut body = self.layout_node(content, &ctx.nested(1.0), depth);
        let body_height = body.height + PADDING;

        let mut index_layout =
            index.map(|i| self.layout_node(i, &ctx.nested(ROOT_INDEX_SCALE), depth));

        let (shift_x, lift) = match &index_layout {
            Some(ix) => (
                (ix.width - radical_width / 2.0).max(0.0),
                (ix.height - body_height / 2.0).max(0.0),
            ),
            None => (0.0, 0.0),
        };

        let top = ctx.y + lift;
        let radical = Rect::new(ctx.x + shift_x, top, radical_width, body_height);
        let overline = Bar {
            x: radical.right(),
            y: top,
            width: body.width + 1.5 * PADDING,
            thickness: self.settings.stroke_width,
        };
        body.translate(overline.x + 0.5 * PADDING - body.x, top + PADDING - body.y);

        if let Some(ix) = index_layout.as_mut() {
            let x = radical.center_x() - ix.width;
            let y = top + body_height / 2.0 - ix.height;
            ix.translate(x - ix.x, y - ix.y);
        }

        let width = overline.x + overline.width - ctx.x;
        let baseline = lift + body.baseline + PADDING;

        LayoutNode::new(
            Rect::new(ctx.x, ctx.y, width, lift + body_height),
            baseline,
            LayoutKind::Sqrt {
                radical,
                overline,
                index: index_layout.map(Box::new),
                content: Box::new(body),
            },
        )
    }

    /// Layout an integral or summation sign with limits stacked around it
    fn layout_big_operator(
        &self,
        operator: BigOperator,
        lower: Option<&MathNode>,
        upper: Option<&MathNode>,
        ctx: &LayoutContext,
        depth: usize,
    ) -> LayoutNode {
        let (glyph_width, glyph_height) = match operator {
            BigOperator::Integral => (ctx.font_size * 0.6, ctx.font_size * 1.5),
            BigOperator::Sum => (ctx.font_size * 0.9, ctx.font_size * 1.2),
        };
        let limit_ctx = ctx.nested(BIG_OPERATOR_LIMIT_SCALE);
        let mut upper = upper.map(|u| self.layout_node(u, &limit_ctx, depth));
        let mut lower = lower.map(|l| self.layout_node(l, &limit_ctx, depth));

        let width = upper
            .iter()
            .chain(lower.iter())
            .map(|l| l.width)
            .fold(glyph_width, f32::max);

        let mut y = ctx.y;
        if let Some(u) = upper.as_mut() {
            u.translate(ctx.x + (width - u.width) / 2.0 - u.x, y - u.y);
            y += u.height + PADDING;
        }
        let glyph = Rect::new(ctx.x + (width - glyph_width) / 2.0, y, glyph_width, glyph_height);
        y += glyph_height;
        if let Some(l) = lower.as_mut() {
            y += PADDING;
            l.translate(ctx.x + (width - l.width) / 2.0 - l.x, y - l.y);
            y += l.height;
        }

        let height = y - ctx.y;
        LayoutNode::new(
            Rect::new(ctx.x, ctx.y, width, height),
            height / 2.0,
            LayoutKind::BigOperator {
                operator,
                glyph,
                upper: upper.map(Box::new),
                lower: lower.map(Box::new),
            },
        )
    }

    /// Layout `lim` with its approach clause beneath
    fn layout_limit(
        &self,
        approach: Option<&MathNode>,
        ctx: &LayoutContext,
        depth: usize,
    ) -> LayoutNode {
        let mut label = self.layout_text("lim", TextRole::Function, ctx);
        let mut approach = approach.map(|a| self.layout_node(a, &ctx.nested(SCRIPT_SCALE), depth));

        let width = approach
            .as_ref()
            .map_or(label.width, |a| a.width.max(label.width));
        label.translate((width - label.width) / 2.0, 0.0);

        let mut height = label.height;
        if let Some(a) = approach.as_mut() {
            let gap = ctx.font_size * 0.1;
            a.translate(
                ctx.x + (width - a.width) / 2.0 - a.x,
                label.y + label.height + gap - a.y,
            );
            height += gap + a.height;
        }

        let baseline = label.baseline;
        LayoutNode::new(
            Rect::new(ctx.x, ctx.y, width, height),
            baseline,
            LayoutKind::Limit {
                label: Box::new(label),
                approach: approach.map(Box::new),
            },
        )
    }

    /// Layout a delimited sequence: `(...)` or `|...|`
    fn layout_delimited(
        &self,
        delimiter: Delimiter,
        children: &[MathNode],
        ctx: &LayoutContext,
        depth: usize,
    ) -> LayoutNode {
        let delim_width = match delimiter {
            Delimiter::Parentheses => ctx.font_size * 0.3,
            Delimiter::Absolute => self.settings.stroke_width * 1.5,
        };
        let mut content = self.layout_sequence(children, &ctx.at(ctx.x + delim_width, ctx.y), depth);
        let height = content.height.max(ctx.font_size);
        let dy = (height - content.height) / 2.0;
        content.translate(0.0, dy);

        let open = Rect::new(ctx.x, ctx.y, delim_width, height);
        let close = Rect::new(content.x + content.width, ctx.y, delim_width, height);
        let baseline = dy + content.baseline;

        LayoutNode::new(
            Rect::new(ctx.x, ctx.y, close.right() - ctx.x, height),
            baseline,
            LayoutKind::Delimited {
                delimiter,
                open,
                content: Box::new(content),
                close,
            },
        )
    }

    /// Layout a text run using the measurement strategy
    fn layout_text(&self, text: &str, role: TextRole, ctx: &LayoutContext) -> LayoutNode {
        let metrics = self.measure.measure(text, ctx.font_size);
        LayoutNode::new(
            Rect::new(ctx.x, ctx.y, metrics.width, metrics.height),
            metrics.baseline,
            LayoutKind::Text {
                text: text.to_string(),
                font_size: ctx.font_size,
                role,
            },
        )
    }
}

impl Default for LayoutEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Horizontal gap between two adjacent sequence slots
fn sibling_spacing(left: &MathNode, right: &MathNode, font_size: f32) -> f32 {
    if matches!(left, MathNode::Operator(_)) || matches!(right, MathNode::Operator(_)) {
        font_size * 0.25
    } else if matches!(left, MathNode::Function(_) | MathNode::Limit { .. }) {
        font_size * 0.1
    } else {
        font_size * 0.15
    }
}

/// Lay out a tree with the default engine
pub fn layout(node: &MathNode, context: LayoutContext) -> LayoutNode {
    LayoutEngine::new().layout(node, context)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    const FS: f32 = 20.0;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    fn layout_str(src: &str) -> LayoutNode {
        layout(&parse(src), LayoutContext::new(0.0, 0.0, FS))
    }

    fn sequence(node: &LayoutNode) -> &[LayoutNode] {
        match &node.kind {
            LayoutKind::Sequence { children } => children,
            other => panic!("Expected Sequence, got {:?}", other),
        }
    }

    #[test]
    fn test_rect_operations() {
        let r = Rect::new(10.0, 20.0, 30.0, 40.0);
        assert_eq!(r.right(), 40.0);
        assert_eq!(r.bottom(), 60.0);
        assert_eq!(r.center_x(), 25.0);
        let u = r.union(&Rect::new(0.0, 50.0, 5.0, 20.0));
        assert_eq!(u, Rect::new(0.0, 20.0, 40.0, 50.0));
    }

    #[test]
    fn test_nested_context_counts_levels() {
        let ctx = LayoutContext::new(0.0, 0.0, FS);
        let inner = ctx.nested(SCRIPT_SCALE).nested(SCRIPT_SCALE);
        assert_eq!(inner.nesting_level, 2);
        assert!(approx(inner.font_size, FS * SCRIPT_SCALE * SCRIPT_SCALE));
    }

    #[test]
    fn test_layout_text_leaf() {
        let node = layout(&MathNode::Variable('x'), LayoutContext::new(5.0, 7.0, FS));
        assert_eq!(node.x, 5.0);
        assert_eq!(node.y, 7.0);
        assert!(approx(node.width, FS * 0.6));
        assert_eq!(node.height, FS);
        assert_eq!(node.baseline, FS * 0.25);
    }

    #[test]
    fn test_operator_spacing() {
        let root = layout_str("x = 5");
        let items = sequence(&root);
        assert_eq!(items.len(), 3);
        let gap1 = items[1].x - (items[0].x + items[0].width);
        let gap2 = items[2].x - (items[1].x + items[1].width);
        assert!(approx(gap1, FS * 0.25));
        assert!(approx(gap2, FS * 0.25));
        let expected = 3.0 * FS * 0.6 + 2.0 * FS * 0.25;
        assert!(approx(root.width, expected));
    }

    #[test]
    fn test_default_and_function_spacing() {
        let root = layout_str("xy");
        let items = sequence(&root);
        assert!(approx(items[1].x - items[0].width, FS * 0.15));

        let root = layout_str("\\sin x");
        let items = sequence(&root);
        assert!(approx(items[1].x - items[0].width, FS * 0.1));
    }

    #[test]
    fn test_superscript_attaches_to_previous_sibling() {
        let root = layout_str("x^2");
        let items = sequence(&root);
        assert_eq!(items.len(), 1);

        let base = &items[0];
        let script = base
            .attached_script
            .as_ref()
            .and_then(|s| s.superscript())
            .expect("superscript attached");
        assert!(approx(script.x - base.x, base.width * 0.9));
        assert!(approx(script.y - base.y, -0.45 * FS));
        match &script.kind {
            LayoutKind::Text { font_size, .. } => assert!(approx(*font_size, FS * 0.6)),
            other => panic!("Expected Text, got {:?}", other),
        }
        // The sequence grows upward to contain the raised script
        assert!(approx(script.y, root.y));
        assert!(approx(root.width, base.width * 0.9 + FS * 0.6 * 0.6));
    }

    #[test]
    fn test_subscript_attaches_lowered() {
        let root = layout_str("a_1");
        let base = &sequence(&root)[0];
        let script = base
            .attached_script
            .as_ref()
            .and_then(|s| s.subscript())
            .expect("subscript attached");
        assert!(approx(script.y - base.y, 0.3 * FS));
    }

    #[test]
    fn test_both_scripts_attach() {
        let root = layout_str("x_i^2");
        let items = sequence(&root);
        assert_eq!(items.len(), 1);
        assert!(matches!(
            items[0].attached_script,
            Some(AttachedScript::Both { .. })
        ));
    }

    #[test]
    fn test_repeated_script_kind_stands_alone() {
        let root = layout_str("x^2^3");
        let items = sequence(&root);
        assert_eq!(items.len(), 2);
        assert!(matches!(
            items[1].kind,
            LayoutKind::Script {
                position: ScriptPosition::Superscript,
                ..
            }
        ));
    }

    #[test]
    fn test_leading_script_is_standalone() {
        let root = layout_str("^2");
        let items = sequence(&root);
        assert_eq!(items.len(), 1);
        if let LayoutKind::Script { position, content } = &items[0].kind {
            assert_eq!(*position, ScriptPosition::Superscript);
            assert!(approx(items[0].baseline, content.baseline + 0.4 * FS));
        } else {
            panic!("Expected Script");
        }
    }

    fn text_size(node: &LayoutNode) -> f32 {
        match &node.kind {
            LayoutKind::Text { font_size, .. } => *font_size,
            other => panic!("Expected Text, got {:?}", other),
        }
    }

    #[test]
    fn test_leading_subscript_is_lowered() {
        let root = layout_str("_2");
        let items = sequence(&root);
        assert_eq!(items.len(), 1);
        if let LayoutKind::Script { position, content } = &items[0].kind {
            assert_eq!(*position, ScriptPosition::Subscript);
            assert!(approx(items[0].baseline, content.baseline - 0.3 * FS));
            assert!(approx(text_size(content), FS * SCRIPT_SCALE));
        } else {
            panic!("Expected Script");
        }
    }

    #[test]
    fn test_fraction_geometry() {
        let root = layout_str("\\frac{1}{2}");
        let frac = &sequence(&root)[0];
        if let LayoutKind::Fraction {
            numerator,
            bar,
            denominator,
        } = &frac.kind
        {
            assert!(approx(bar.y, numerator.y + numerator.height + PADDING));
            assert!(approx(denominator.y, bar.y + bar.thickness + PADDING));
            assert_eq!(bar.thickness, 3.0);
            assert!(approx(frac.width, MIN_FRACTION_WIDTH + 2.0 * PADDING));
            assert!(approx(
                frac.baseline,
                numerator.height + PADDING + bar.thickness / 2.0
            ));
            // Centered horizontally
            assert!(approx(numerator.x + numerator.width / 2.0, frac.x + frac.width / 2.0));
            assert!(approx(
                denominator.x + denominator.width / 2.0,
                frac.x + frac.width / 2.0
            ));
            match &numerator.kind {
                LayoutKind::Text { font_size, .. } => assert!(approx(*font_size, FS * 0.7)),
                other => panic!("Expected Text, got {:?}", other),
            }
        } else {
            panic!("Expected Fraction");
        }
    }

    #[test]
    fn test_fraction_aligns_bar_with_neighbour_baseline() {
        let root = layout_str("1 + \\frac{a}{b}");
        let items = sequence(&root);
        if let LayoutKind::Fraction { bar, .. } = &items[2].kind {
            assert!(approx(bar.y + bar.thickness / 2.0, items[0].baseline_y()));
        } else {
            panic!("Expected Fraction");
        }
    }

    #[test]
    fn test_sqrt_geometry() {
        let root = layout_str("\\sqrt{x}");
        let node = &sequence(&root)[0];
        if let LayoutKind::Sqrt {
            radical,
            overline,
            content,
            index,
        } = &node.kind
        {
            assert!(index.is_none());
            assert!(approx(radical.width, FS * 0.5));
            assert!(approx(overline.width, content.width + 1.5 * PADDING));
            assert!(approx(node.baseline, content.baseline + PADDING));
            assert!(content.x >= radical.right());
        } else {
            panic!("Expected Sqrt");
        }
    }

    #[test]
    fn test_sqrt_index_sits_above_left() {
        let root = layout_str("\\sqrt[3]{x}");
        let node = &sequence(&root)[0];
        if let LayoutKind::Sqrt { radical, index, .. } = &node.kind {
            let index = index.as_ref().expect("index laid out");
            assert!(approx(index.x + index.width, radical.center_x()));
            assert!(index.y + index.height <= radical.center_y() + 1e-3);
            assert!(index.x >= node.x - 1e-3);
        } else {
            panic!("Expected Sqrt");
        }
    }

    #[test]
    fn test_integral_with_limits() {
        let root = layout_str("\\int_0^1");
        let node = &sequence(&root)[0];
        if let LayoutKind::BigOperator {
            operator,
            glyph,
            upper,
            lower,
        } = &node.kind
        {
            assert_eq!(*operator, BigOperator::Integral);
            let upper = upper.as_ref().unwrap();
            let lower = lower.as_ref().unwrap();
            assert!(approx(glyph.height, FS * 1.5));
            assert!(approx(glyph.y, upper.y + upper.height + PADDING));
            assert!(approx(lower.y, glyph.bottom() + PADDING));
            assert!(approx(node.baseline, node.height / 2.0));
        } else {
            panic!("Expected BigOperator");
        }
    }

    #[test]
    fn test_sum_without_limits() {
        let root = layout_str("\\sum");
        let node = &sequence(&root)[0];
        assert!(approx(node.width, FS * 0.9));
        assert!(approx(node.height, FS * 1.2));
    }

    #[test]
    fn test_limit_layout() {
        let root = layout_str("\\lim_{x \\to 0}");
        let node = &sequence(&root)[0];
        if let LayoutKind::Limit { label, approach } = &node.kind {
            let approach = approach.as_ref().unwrap();
            assert!(approach.y > label.y + label.height);
            assert!(matches!(&label.kind, LayoutKind::Text { text, .. } if text == "lim"));
        } else {
            panic!("Expected Limit");
        }
    }

    #[test]
    fn test_big_operator_limits_are_half_size() {
        let root = layout_str("\\sum_0^1");
        let node = &sequence(&root)[0];
        if let LayoutKind::BigOperator { upper, lower, .. } = &node.kind {
            assert!(approx(text_size(upper.as_ref().unwrap()), FS * 0.5));
            assert!(approx(text_size(lower.as_ref().unwrap()), FS * 0.5));
        } else {
            panic!("Expected BigOperator");
        }
    }

    #[test]
    fn test_limit_approach_is_script_size() {
        let root = layout_str("\\lim_x");
        let node = &sequence(&root)[0];
        if let LayoutKind::Limit { label, approach } = &node.kind {
            assert!(approx(text_size(label), FS));
            assert!(approx(text_size(approach.as_ref().unwrap()), FS * 0.6));
        } else {
            panic!("Expected Limit");
        }
    }

    #[test]
    fn test_limit_spaced_like_function() {
        let root = layout_str("\\lim x");
        let items = sequence(&root);
        assert_eq!(items.len(), 2);
        assert!(approx(items[1].x - (items[0].x + items[0].width), FS * 0.1));
    }

    #[test]
    fn test_parentheses_minimum_height() {
        let root = layout_str("()");
        let node = &sequence(&root)[0];
        assert_eq!(node.height, FS);
        assert!(approx(node.width, 2.0 * FS * 0.3));
    }

    #[test]
    fn test_absolute_bar_width() {
        let root = layout_str("|x|");
        let node = &sequence(&root)[0];
        if let LayoutKind::Delimited {
            delimiter, open, ..
        } = &node.kind
        {
            assert_eq!(*delimiter, Delimiter::Absolute);
            assert!(approx(open.width, 3.0));
        } else {
            panic!("Expected Delimited");
        }
    }

    #[test]
    fn test_depth_limit_yields_empty() {
        let engine = LayoutEngine::with_settings(LayoutSettings {
            stroke_width: 2.0,
            max_depth: 2,
        });
        let node = MathNode::equation(vec![MathNode::Group(vec![MathNode::Group(vec![
            MathNode::Variable('x'),
            MathNode::Variable('y'),
        ])])]);
        let root = engine.layout(&node, LayoutContext::new(0.0, 0.0, FS));
        let outer = &sequence(&root)[0];
        let inner = &sequence(outer)[0];
        assert_eq!(sequence(inner).len(), 2);
        assert!(sequence(inner)[0].is_empty());
    }

    #[test]
    fn test_invalid_font_size_yields_empty() {
        let root = layout(
            &parse("x"),
            LayoutContext::new(0.0, 0.0, f32::NAN),
        );
        assert!(root.is_empty());
        assert_eq!(root.width, 0.0);
    }

    #[test]
    fn test_custom_measure() {
        struct Fixed;
        impl TextMeasure for Fixed {
            fn measure(&self, _text: &str, font_size: f32) -> TextMetrics {
                TextMetrics {
                    width: 10.0,
                    height: font_size,
                    baseline: font_size * 0.8,
                }
            }
        }
        let engine = LayoutEngine::new().with_measure(Fixed);
        let root = engine.layout(&parse("abc"), LayoutContext::new(0.0, 0.0, FS));
        assert!(approx(root.width, 30.0 + 2.0 * FS * 0.15));
        assert!(approx(root.baseline, FS * 0.8));
    }

    #[test]
    fn test_origin_is_respected() {
        let root = layout(&parse("x+1"), LayoutContext::new(100.0, 50.0, FS));
        assert_eq!(root.x, 100.0);
        assert_eq!(root.y, 50.0);
        assert_eq!(sequence(&root)[0].x, 100.0);
    }
}
