//! Math AST - Abstract Syntax Tree for LaTeX-like expressions
//!
//! The parser produces these nodes and the layout engine consumes them.
//! Trees are immutable once built and every node is owned by its parent.

use serde::{Deserialize, Serialize};

// =============================================================================
// Math Node - Core AST
// =============================================================================

/// A node in the math expression tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MathNode {
    // Leaves
    /// A run of digits and decimal points
    Number(String),
    /// A single-letter variable
    Variable(char),
    /// A binary operator or relation, already normalized (`*` becomes `×`)
    Operator(char),
    /// A Greek letter resolved from its command name
    Greek(char),
    /// A named function (sin, log, ...), kept atomic
    Function(String),
    /// Literal text; also the degraded form of anything unparseable
    Text(String),

    // Structures
    /// Fraction: numerator over denominator
    Fraction {
        numerator: Box<MathNode>,
        denominator: Box<MathNode>,
    },
    /// Superscript holding only the exponent; attached to a base during layout
    Superscript(Box<MathNode>),
    /// Subscript holding only the index; attached to a base during layout
    Subscript(Box<MathNode>),
    /// Square root with an optional index (`\sqrt[n]{...}`)
    Sqrt {
        index: Option<Box<MathNode>>,
        content: Box<MathNode>,
    },
    /// Integral sign with optional limits
    Integral {
        lower: Option<Box<MathNode>>,
        upper: Option<Box<MathNode>>,
    },
    /// Summation sign with optional limits
    Sum {
        lower: Option<Box<MathNode>>,
        upper: Option<Box<MathNode>>,
    },
    /// `lim` with an optional approach clause beneath it
    Limit { approach: Option<Box<MathNode>> },

    // Sequences
    /// Braced group with zero or several children
    Group(Vec<MathNode>),
    /// Round brackets around a sequence
    Parentheses(Vec<MathNode>),
    /// Vertical bars around a sequence
    Absolute(Vec<MathNode>),
    /// Root of every parsed expression
    Equation(Vec<MathNode>),
}

impl MathNode {
    /// Create the root container
    pub fn equation(children: Vec<MathNode>) -> Self {
        MathNode::Equation(children)
    }

    /// Create a number leaf
    pub fn number(n: impl Into<String>) -> Self {
        MathNode::Number(n.into())
    }

    /// Create a text leaf
    pub fn text(t: impl Into<String>) -> Self {
        MathNode::Text(t.into())
    }

    /// Create a function leaf
    pub fn function(name: impl Into<String>) -> Self {
        MathNode::Function(name.into())
    }

    /// Create a fraction
    pub fn fraction(numerator: MathNode, denominator: MathNode) -> Self {
        MathNode::Fraction {
            numerator: Box::new(numerator),
            denominator: Box::new(denominator),
        }
    }

    /// Create a square root
    pub fn sqrt(content: MathNode) -> Self {
        MathNode::Sqrt {
            index: None,
            content: Box::new(content),
        }
    }

    /// Create an nth root
    pub fn nthroot(index: MathNode, content: MathNode) -> Self {
        MathNode::Sqrt {
            index: Some(Box::new(index)),
            content: Box::new(content),
        }
    }

    /// Create a superscript
    pub fn superscript(exponent: MathNode) -> Self {
        MathNode::Superscript(Box::new(exponent))
    }

    /// Create a subscript
    pub fn subscript(index: MathNode) -> Self {
        MathNode::Subscript(Box::new(index))
    }

    /// Create an integral
    pub fn integral(lower: Option<MathNode>, upper: Option<MathNode>) -> Self {
        MathNode::Integral {
            lower: lower.map(Box::new),
            upper: upper.map(Box::new),
        }
    }

    /// Create a summation
    pub fn sum(lower: Option<MathNode>, upper: Option<MathNode>) -> Self {
        MathNode::Sum {
            lower: lower.map(Box::new),
            upper: upper.map(Box::new),
        }
    }

    /// Create a limit
    pub fn limit(approach: Option<MathNode>) -> Self {
        MathNode::Limit {
            approach: approach.map(Box::new),
        }
    }

    /// Short name of the node's variant, used in diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            MathNode::Number(_) => "Number",
            MathNode::Variable(_) => "Variable",
            MathNode::Operator(_) => "Operator",
            MathNode::Greek(_) => "Greek",
            MathNode::Function(_) => "Function",
            MathNode::Text(_) => "Text",
            MathNode::Fraction { .. } => "Fraction",
            MathNode::Superscript(_) => "Superscript",
            MathNode::Subscript(_) => "Subscript",
            MathNode::Sqrt { .. } => "Sqrt",
            MathNode::Integral { .. } => "Integral",
            MathNode::Sum { .. } => "Sum",
            MathNode::Limit { .. } => "Limit",
            MathNode::Group(_) => "Group",
            MathNode::Parentheses(_) => "Parentheses",
            MathNode::Absolute(_) => "Absolute",
            MathNode::Equation(_) => "Equation",
        }
    }

    /// Get all children of this node
    pub fn children(&self) -> Vec<&MathNode> {
        match self {
            MathNode::Group(children)
            | MathNode::Parentheses(children)
            | MathNode::Absolute(children)
            | MathNode::Equation(children) => children.iter().collect(),
            MathNode::Fraction {
                numerator,
                denominator,
            } => vec![numerator.as_ref(), denominator.as_ref()],
            MathNode::Superscript(inner) | MathNode::Subscript(inner) => vec![inner.as_ref()],
            MathNode::Sqrt { index, content } => {
                let mut v = Vec::new();
                if let Some(i) = index {
                    v.push(i.as_ref());
                }
                v.push(content.as_ref());
                v
            }
            MathNode::Integral { lower, upper } | MathNode::Sum { lower, upper } => {
                lower.iter().chain(upper.iter()).map(|b| b.as_ref()).collect()
            }
            MathNode::Limit { approach } => approach.iter().map(|b| b.as_ref()).collect(),
            MathNode::Number(_)
            | MathNode::Variable(_)
            | MathNode::Operator(_)
            | MathNode::Greek(_)
            | MathNode::Function(_)
            | MathNode::Text(_) => vec![],
        }
    }

    /// Depth of the deepest leaf, counting this node as 1
    pub fn depth(&self) -> usize {
        1 + self
            .children()
            .into_iter()
            .map(MathNode::depth)
            .max()
            .unwrap_or(0)
    }
}

// =============================================================================
// Command Tables
// =============================================================================

/// What a single-glyph substitution command turns into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Substitution {
    /// Spaced like a binary operator or relation
    Operator(char),
    /// Plain symbol laid out as a text leaf
    Symbol(char),
}

/// Resolve a Greek letter command (`alpha`, `Omega`, ...)
pub fn greek_letter(name: &str) -> Option<char> {
    use symbols::*;
    let glyph = match name {
        "alpha" => ALPHA,
        "beta" => BETA,
        "gamma" => GAMMA,
        "delta" => DELTA,
        "epsilon" => EPSILON,
        "varepsilon" => VAREPSILON,
        "zeta" => ZETA,
        "eta" => ETA,
        "theta" => THETA,
        "vartheta" => VARTHETA,
        "iota" => IOTA,
        "kappa" => KAPPA,
        "lambda" => LAMBDA,
        "mu" => MU,
        "nu" => NU,
        "xi" => XI,
        "omicron" => OMICRON,
        "pi" => PI,
        "rho" => RHO,
        "sigma" => SIGMA,
        "tau" => TAU,
        "upsilon" => UPSILON,
        "phi" => PHI,
        "varphi" => VARPHI,
        "chi" => CHI,
        "psi" => PSI,
        "omega" => OMEGA,
        "Gamma" => GAMMA_UPPER,
        "Delta" => DELTA_UPPER,
        "Theta" => THETA_UPPER,
        "Lambda" => LAMBDA_UPPER,
        "Xi" => XI_UPPER,
        "Pi" => PI_UPPER,
        "Sigma" => SIGMA_UPPER,
        "Upsilon" => UPSILON_UPPER,
        "Phi" => PHI_UPPER,
        "Psi" => PSI_UPPER,
        "Omega" => OMEGA_UPPER,
        _ => return None,
    };
    Some(glyph)
}

/// Check if a command names an atomic function
pub fn is_function_name(s: &str) -> bool {
    matches!(
        s,
        "sin" | "cos" | "tan" | "cot" | "sec" | "csc" | "arcsin" | "arccos" | "arctan" | "sinh"
            | "cosh" | "tanh" | "log" | "ln" | "lg" | "exp" | "min" | "max" | "sup" | "inf"
            | "det" | "dim" | "ker" | "deg" | "gcd" | "arg"
    )
}

/// Resolve a single-glyph substitution command
pub fn substitution(name: &str) -> Option<Substitution> {
    use symbols::*;
    let sub = match name {
        "cdot" => Substitution::Operator(DOT),
        "times" => Substitution::Operator(TIMES),
        "div" => Substitution::Operator(DIVIDE),
        "pm" => Substitution::Operator(PLUS_MINUS),
        "mp" => Substitution::Operator(MINUS_PLUS),
        "neq" | "ne" => Substitution::Operator(NOT_EQUAL),
        "leq" | "le" => Substitution::Operator(LESS_EQUAL),
        "geq" | "ge" => Substitution::Operator(GREATER_EQUAL),
        "approx" => Substitution::Operator(APPROX),
        "equiv" => Substitution::Operator(EQUIV),
        "in" => Substitution::Operator(ELEMENT_OF),
        "to" | "rightarrow" => Substitution::Operator(RIGHT_ARROW),
        "leftarrow" => Substitution::Operator(LEFT_ARROW),
        "Rightarrow" | "implies" => Substitution::Operator(DOUBLE_RIGHT_ARROW),
        "infty" => Substitution::Symbol(INFINITY),
        "partial" => Substitution::Symbol(PARTIAL),
        "nabla" => Substitution::Symbol(NABLA),
        "cdots" => Substitution::Symbol(CDOTS),
        "ldots" | "dots" => Substitution::Symbol(LDOTS),
        _ => return None,
    };
    Some(sub)
}

/// Normalize a plain-ASCII operator character; `None` if it is not one
pub fn normalize_operator(c: char) -> Option<char> {
    match c {
        '*' => Some(symbols::TIMES),
        '/' => Some(symbols::DIVIDE),
        '+' | '-' | '=' | '<' | '>' => Some(c),
        symbols::TIMES | symbols::DIVIDE => Some(c),
        _ => None,
    }
}

// =============================================================================
// Common Math Symbols
// =============================================================================

/// Glyphs the parser substitutes for commands
pub mod symbols {
    // Greek letters (lowercase)
    pub const ALPHA: char = '\u{03B1}';
    pub const BETA: char = '\u{03B2}';
    pub const GAMMA: char = '\u{03B3}';
    pub const DELTA: char = '\u{03B4}';
    pub const EPSILON: char = '\u{03F5}';
    pub const VAREPSILON: char = '\u{03B5}';
    pub const ZETA: char = '\u{03B6}';
    pub const ETA: char = '\u{03B7}';
    pub const THETA: char = '\u{03B8}';
    pub const VARTHETA: char = '\u{03D1}';
    pub const IOTA: char = '\u{03B9}';
    pub const KAPPA: char = '\u{03BA}';
    pub const LAMBDA: char = '\u{03BB}';
    pub const MU: char = '\u{03BC}';
    pub const NU: char = '\u{03BD}';
    pub const XI: char = '\u{03BE}';
    pub const OMICRON: char = '\u{03BF}';
    pub const PI: char = '\u{03C0}';
    pub const RHO: char = '\u{03C1}';
    pub const SIGMA: char = '\u{03C3}';
    pub const TAU: char = '\u{03C4}';
    pub const UPSILON: char = '\u{03C5}';
    pub const PHI: char = '\u{03D5}';
    pub const VARPHI: char = '\u{03C6}';
    pub const CHI: char = '\u{03C7}';
    pub const PSI: char = '\u{03C8}';
    pub const OMEGA: char = '\u{03C9}';

    // Greek letters (uppercase)
    pub const GAMMA_UPPER: char = '\u{0393}';
    pub const DELTA_UPPER: char = '\u{0394}';
    pub const THETA_UPPER: char = '\u{0398}';
    pub const LAMBDA_UPPER: char = '\u{039B}';
    pub const XI_UPPER: char = '\u{039E}';
    pub const PI_UPPER: char = '\u{03A0}';
    pub const SIGMA_UPPER: char = '\u{03A3}';
    pub const UPSILON_UPPER: char = '\u{03A5}';
    pub const PHI_UPPER: char = '\u{03A6}';
    pub const PSI_UPPER: char = '\u{03A8}';
    pub const OMEGA_UPPER: char = '\u{03A9}';

    // Binary operators
    pub const TIMES: char = '\u{00D7}';
    pub const DIVIDE: char = '\u{00F7}';
    pub const DOT: char = '\u{00B7}';
    pub const PLUS_MINUS: char = '\u{00B1}';
    pub const MINUS_PLUS: char = '\u{2213}';

    // Relations
    pub const NOT_EQUAL: char = '\u{2260}';
    pub const LESS_EQUAL: char = '\u{2264}';
    pub const GREATER_EQUAL: char = '\u{2265}';
    pub const APPROX: char = '\u{2248}';
    pub const EQUIV: char = '\u{2261}';
    pub const ELEMENT_OF: char = '\u{2208}';

    // Arrows
    pub const RIGHT_ARROW: char = '\u{2192}';
    pub const LEFT_ARROW: char = '\u{2190}';
    pub const DOUBLE_RIGHT_ARROW: char = '\u{21D2}';

    // Miscellaneous
    pub const INFINITY: char = '\u{221E}';
    pub const PARTIAL: char = '\u{2202}';
    pub const NABLA: char = '\u{2207}';
    pub const CDOTS: char = '\u{22EF}';
    pub const LDOTS: char = '\u{2026}';
}

// =============================================================================
// Tests
// =============================================================================
