//! LaTeX Parser - Parse LaTeX-like math strings into MathNode trees
//!
//! A single left-to-right pass over the input with an explicit cursor and
//! one character of lookahead. Parsing is total: malformed input yields a
//! best-effort tree, and an internal failure (nesting past the configured
//! limit) degrades the whole input to a single text leaf.

use crate::error::{MathError, MathResult};
use crate::model::*;
use tracing::warn;

/// Nesting limit used by [`parse`]
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Where a sequence stops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Close {
    End,
    Brace,
    Paren,
    Pipe,
    Bracket,
}

impl Close {
    fn matches(self, c: char) -> bool {
        matches!(
            (self, c),
            (Close::Brace, '}') | (Close::Paren, ')') | (Close::Pipe, '|') | (Close::Bracket, ']')
        )
    }
}

/// Recursive-descent parser for the supported LaTeX subset
pub struct LatexParser {
    chars: Vec<char>,
    position: usize,
    depth: usize,
    max_depth: usize,
    /// Terminators of the sequences currently being parsed, innermost last
    enclosing: Vec<Close>,
}

impl LatexParser {
    /// Create a new parser for the given input
    pub fn new(input: &str, max_depth: usize) -> Self {
        Self {
            chars: input.chars().collect(),
            position: 0,
            depth: 0,
            max_depth,
            enclosing: Vec::new(),
        }
    }

    /// Parse the whole input into an `Equation` root
    pub fn parse(&mut self) -> MathResult<MathNode> {
        let children = self.parse_sequence(Close::End)?;
        Ok(MathNode::Equation(children))
    }

    /// Parse nodes until `close` (left unconsumed) or end of input
    fn parse_sequence(&mut self, close: Close) -> MathResult<Vec<MathNode>> {
        self.enclosing.push(close);
        let result = self.parse_until(close);
        self.enclosing.pop();
        result
    }

    fn parse_until(&mut self, close: Close) -> MathResult<Vec<MathNode>> {
        let mut nodes = Vec::new();

        loop {
            self.skip_whitespace();
            let Some(c) = self.peek() else {
                break;
            };
            if close.matches(c) {
                break;
            }
            if let Some(node) = self.parse_primary()? {
                nodes.push(node);
            }
        }

        Ok(nodes)
    }

    /// Parse one atom or structure. `None` means the input was consumed
    /// without producing a node (spacing commands, `\left`, ...).
    fn parse_primary(&mut self) -> MathResult<Option<MathNode>> {
        let Some(c) = self.advance() else {
            return Ok(None);
        };

        let node = match c {
            '\\' => return self.parse_command(),
            '{' => self.parse_group()?,
            '(' => MathNode::Parentheses(self.parse_delimited(Close::Paren)?),
            '|' => MathNode::Absolute(self.parse_delimited(Close::Pipe)?),
            '^' => MathNode::Superscript(Box::new(self.nested(Self::parse_argument)?)),
            '_' => MathNode::Subscript(Box::new(self.nested(Self::parse_argument)?)),
            '0'..='9' | '.' => self.read_number(c),
            c if c.is_alphabetic() => MathNode::Variable(c),
            '}' | ')' | ']' => {
                warn!(delimiter = %c, "unmatched closing delimiter kept as text");
                MathNode::Text(c.to_string())
            }
            c => match normalize_operator(c) {
                Some(op) => MathNode::Operator(op),
                None => MathNode::Text(c.to_string()),
            },
        };

        Ok(Some(node))
    }

    /// Parse a backslash command; the backslash is already consumed
    fn parse_command(&mut self) -> MathResult<Option<MathNode>> {
        let name = self.read_command_name();

        if name.is_empty() {
            return Ok(match self.advance() {
                // Spacing and line breaks carry no ink
                Some(',' | ';' | ':' | '!' | ' ' | '\\') => None,
                Some(c) => Some(MathNode::Text(c.to_string())),
                None => Some(MathNode::Text("\\".to_string())),
            });
        }

        let node = match name.as_str() {
            "frac" | "dfrac" | "tfrac" => self.parse_frac()?,
            "sqrt" => self.parse_sqrt()?,
            "int" => {
                let (lower, upper) = self.parse_limits()?;
                MathNode::Integral { lower, upper }
            }
            "sum" => {
                let (lower, upper) = self.parse_limits()?;
                MathNode::Sum { lower, upper }
            }
            "lim" => self.parse_limit()?,
            "left" | "right" => {
                // `\left.` is an invisible delimiter
                if self.peek() == Some('.') {
                    self.advance();
                }
                return Ok(None);
            }
            "quad" | "qquad" => return Ok(None),
            "text" | "mathrm" | "textrm" => match self.read_raw_braced() {
                Some(raw) if raw.is_empty() => return Ok(None),
                Some(raw) => MathNode::Text(raw),
                None => MathNode::Text(name),
            },
            _ => {
                if let Some(glyph) = greek_letter(&name) {
                    MathNode::Greek(glyph)
                } else if is_function_name(&name) {
                    MathNode::Function(name)
                } else if let Some(sub) = substitution(&name) {
                    match sub {
                        Substitution::Operator(op) => MathNode::Operator(op),
                        Substitution::Symbol(sym) => MathNode::Text(sym.to_string()),
                    }
                } else {
                    warn!(command = %name, "unknown command rendered as text");
                    MathNode::Text(name)
                }
            }
        };

        Ok(Some(node))
    }

    /// Parse `\frac{num}{den}`
    fn parse_frac(&mut self) -> MathResult<MathNode> {
        let numerator = self.nested(Self::parse_argument)?;
        let denominator = self.nested(Self::parse_argument)?;
        Ok(MathNode::fraction(numerator, denominator))
    }

    /// Parse `\sqrt{content}` or `\sqrt[n]{content}`
    fn parse_sqrt(&mut self) -> MathResult<MathNode> {
        self.skip_whitespace();
        let index = if self.peek() == Some('[') {
            self.advance();
            let children = self.nested(|p| p.parse_sequence(Close::Bracket))?;
            self.consume_close(Close::Bracket);
            Some(Box::new(collapse(children)))
        } else {
            None
        };

        let content = self.nested(Self::parse_argument)?;

        Ok(MathNode::Sqrt {
            index,
            content: Box::new(content),
        })
    }

    /// Parse optional `_{lower}` and `^{upper}` in either order
    #[allow(clippy::type_complexity)]
    fn parse_limits(&mut self) -> MathResult<(Option<Box<MathNode>>, Option<Box<MathNode>>)> {
        let mut lower = None;
        let mut upper = None;

        loop {
            self.skip_whitespace();
            match self.peek() {
                Some('_') if lower.is_none() => {
                    self.advance();
                    lower = Some(Box::new(self.nested(Self::parse_argument)?));
                }
                Some('^') if upper.is_none() => {
                    self.advance();
                    upper = Some(Box::new(self.nested(Self::parse_argument)?));
                }
                _ => break,
            }
        }

        Ok((lower, upper))
    }

    /// Parse `\lim` with an optional `_{approach}`
    fn parse_limit(&mut self) -> MathResult<MathNode> {
        self.skip_whitespace();
        let approach = if self.peek() == Some('_') {
            self.advance();
            Some(Box::new(self.nested(Self::parse_argument)?))
        } else {
            None
        };
        Ok(MathNode::Limit { approach })
    }

    /// Parse a command or script argument: a braced group, one digit,
    /// or one atom. Missing arguments become an empty group, leaving the
    /// closer of an enclosing sequence in place.
    fn parse_argument(&mut self) -> MathResult<MathNode> {
        self.skip_whitespace();
        match self.peek() {
            None => Ok(MathNode::Group(Vec::new())),
            Some(c) if self.closes_enclosing(c) => {
                warn!(delimiter = %c, "missing argument before closing delimiter");
                Ok(MathNode::Group(Vec::new()))
            }
            Some('{') => {
                self.advance();
                self.parse_group()
            }
            Some(c) if c.is_ascii_digit() => {
                self.advance();
                Ok(MathNode::Number(c.to_string()))
            }
            Some(_) => Ok(self
                .parse_primary()?
                .unwrap_or_else(|| MathNode::Group(Vec::new()))),
        }
    }

    /// Parse the rest of a `{...}` group; the opening brace is consumed
    fn parse_group(&mut self) -> MathResult<MathNode> {
        let children = self.nested(|p| p.parse_sequence(Close::Brace))?;
        self.consume_close(Close::Brace);
        Ok(collapse(children))
    }

    /// Parse the rest of a `(...)` or `|...|`; the opener is consumed
    fn parse_delimited(&mut self, close: Close) -> MathResult<Vec<MathNode>> {
        let children = self.nested(|p| p.parse_sequence(close))?;
        self.consume_close(close);
        Ok(children)
    }

    fn closes_enclosing(&self, c: char) -> bool {
        self.enclosing.iter().any(|close| close.matches(c))
    }

    /// Run `f` one nesting level deeper, failing past the limit
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> MathResult<T>) -> MathResult<T> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(MathError::NestingTooDeep {
                depth: self.depth,
                limit: self.max_depth,
            });
        }
        let result = f(self);
        self.depth -= 1;
        result
    }

    /// Consume the closing delimiter if present. Unmatched openers simply
    /// run to the end of input.
    fn consume_close(&mut self, close: Close) {
        match self.peek() {
            Some(c) if close.matches(c) => {
                self.advance();
            }
            _ => warn!(?close, "unclosed group consumed to end of input"),
        }
    }

    fn read_number(&mut self, first: char) -> MathNode {
        let mut num = String::from(first);
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '.' {
                num.push(c);
                self.advance();
            } else {
                break;
            }
        }
        MathNode::Number(num)
    }

    fn read_command_name(&mut self) -> String {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphabetic() {
                name.push(c);
                self.advance();
            } else {
                break;
            }
        }
        name
    }

    /// Read `{...}` verbatim, honoring nested braces
    fn read_raw_braced(&mut self) -> Option<String> {
        self.skip_whitespace();
        if self.peek() != Some('{') {
            return None;
        }
        self.advance();

        let mut raw = String::new();
        let mut open = 1usize;
        while let Some(c) = self.advance() {
            match c {
                '{' => open += 1,
                '}' => {
                    open -= 1;
                    if open == 0 {
                        break;
                    }
                }
                _ => {}
            }
            raw.push(c);
        }
        Some(raw)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.position += 1;
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.position).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.position += 1;
        }
        c
    }
}

/// A group with exactly one child is that child
fn collapse(mut children: Vec<MathNode>) -> MathNode {
    if children.len() == 1 {
        children.remove(0)
    } else {
        MathNode::Group(children)
    }
}

/// Parse LaTeX into an `Equation` root using the default nesting limit
pub fn parse(source: &str) -> MathNode {
    parse_with_limit(source, DEFAULT_MAX_DEPTH)
}

/// Parse LaTeX into an `Equation` root. Never fails: input the parser
/// cannot handle becomes `Equation[Text(source)]`.
pub fn parse_with_limit(source: &str, max_depth: usize) -> MathNode {
    let mut parser = LatexParser::new(source, max_depth);
    match parser.parse() {
        Ok(node) => node,
        Err(err) => {
            warn!(%err, "expression degraded to plain text");
            MathNode::Equation(vec![MathNode::Text(source.to_string())])
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn children(node: MathNode) -> Vec<MathNode> {
        match node {
            MathNode::Equation(children) => children,
            other => panic!("Expected Equation, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_simple_equation() {
        let result = children(parse("x = 5"));
        assert_eq!(
            result,
            vec![
                MathNode::Variable('x'),
                MathNode::Operator('='),
                MathNode::number("5"),
            ]
        );
    }

    #[test]
    fn test_parse_decimal() {
        let result = children(parse("3.14"));
        assert_eq!(result, vec![MathNode::number("3.14")]);
    }

    #[test]
    fn test_parse_frac() {
        let result = children(parse("\\frac{1}{2}"));
        assert_eq!(
            result,
            vec![MathNode::fraction(MathNode::number("1"), MathNode::number("2"))]
        );
    }

    #[test]
    fn test_parse_frac_unbraced() {
        let result = children(parse("\\frac12"));
        assert_eq!(
            result,
            vec![MathNode::fraction(MathNode::number("1"), MathNode::number("2"))]
        );
    }

    #[test]
    fn test_parse_superscript_is_standalone() {
        let result = children(parse("x^2"));
        assert_eq!(
            result,
            vec![
                MathNode::Variable('x'),
                MathNode::superscript(MathNode::number("2")),
            ]
        );
    }

    #[test]
    fn test_unbraced_script_takes_one_digit() {
        let result = children(parse("x^23"));
        assert_eq!(
            result,
            vec![
                MathNode::Variable('x'),
                MathNode::superscript(MathNode::number("2")),
                MathNode::number("3"),
            ]
        );
    }

    #[test]
    fn test_braced_group_collapses() {
        let result = children(parse("x_{i}"));
        assert_eq!(result[1], MathNode::subscript(MathNode::Variable('i')));

        let result = children(parse("x_{i+1}"));
        assert!(matches!(&result[1], MathNode::Subscript(inner)
            if matches!(inner.as_ref(), MathNode::Group(g) if g.len() == 3)));
    }

    #[test]
    fn test_parentheses_never_collapse() {
        let result = children(parse("(x)"));
        assert_eq!(result, vec![MathNode::Parentheses(vec![MathNode::Variable('x')])]);
    }

    #[test]
    fn test_parse_absolute() {
        let result = children(parse("|x-1|"));
        assert_eq!(
            result,
            vec![MathNode::Absolute(vec![
                MathNode::Variable('x'),
                MathNode::Operator('-'),
                MathNode::number("1"),
            ])]
        );
    }

    #[test]
    fn test_operator_normalization() {
        let result = children(parse("a*b/c"));
        assert_eq!(result[1], MathNode::Operator('\u{00D7}'));
        assert_eq!(result[3], MathNode::Operator('\u{00F7}'));
    }

    #[test]
    fn test_parse_greek_and_functions() {
        let result = children(parse("\\sin \\theta"));
        assert_eq!(
            result,
            vec![MathNode::function("sin"), MathNode::Greek(symbols::THETA)]
        );
    }

    #[test]
    fn test_parse_substitutions() {
        let result = children(parse("a \\cdot b \\leq \\infty"));
        assert_eq!(result[1], MathNode::Operator('\u{00B7}'));
        assert_eq!(result[3], MathNode::Operator('\u{2264}'));
        assert_eq!(result[4], MathNode::text("\u{221E}"));
    }

    #[test]
    fn test_unknown_command_degrades_to_text() {
        let result = children(parse("\\unknownCmd"));
        assert_eq!(result, vec![MathNode::text("unknownCmd")]);
    }

    #[test]
    fn test_parse_sqrt_with_index() {
        let result = children(parse("\\sqrt[3]{x}"));
        assert_eq!(
            result,
            vec![MathNode::nthroot(MathNode::number("3"), MathNode::Variable('x'))]
        );
    }

    #[test]
    fn test_parse_integral_limits_any_order() {
        let a = children(parse("\\int_0^1"));
        let b = children(parse("\\int^1_0"));
        assert_eq!(a, b);
        assert_eq!(
            a,
            vec![MathNode::integral(
                Some(MathNode::number("0")),
                Some(MathNode::number("1"))
            )]
        );
    }

    #[test]
    fn test_sum_body_stays_a_sibling() {
        let result = children(parse("\\sum_{i=1}^{n} i"));
        assert_eq!(result.len(), 2);
        assert!(matches!(result[0], MathNode::Sum { .. }));
        assert_eq!(result[1], MathNode::Variable('i'));
    }

    #[test]
    fn test_parse_limit() {
        let result = children(parse("\\lim_{x \\to 0}"));
        assert_eq!(
            result,
            vec![MathNode::limit(Some(MathNode::Group(vec![
                MathNode::Variable('x'),
                MathNode::Operator('\u{2192}'),
                MathNode::number("0"),
            ])))]
        );
    }

    #[test]
    fn test_left_right_are_transparent() {
        let result = children(parse("\\left( x \\right)"));
        assert_eq!(result, vec![MathNode::Parentheses(vec![MathNode::Variable('x')])]);

        let result = children(parse("\\left. x \\right|"));
        assert_eq!(result, vec![MathNode::Variable('x'), MathNode::Absolute(vec![])]);
    }

    #[test]
    fn test_spacing_commands_skipped() {
        let result = children(parse("a\\,b\\quad c"));
        assert_eq!(
            result,
            vec![
                MathNode::Variable('a'),
                MathNode::Variable('b'),
                MathNode::Variable('c'),
            ]
        );
    }

    #[test]
    fn test_text_command() {
        let result = children(parse("\\text{if } x"));
        assert_eq!(result, vec![MathNode::text("if "), MathNode::Variable('x')]);
    }

    #[test]
    fn test_unmatched_openers_consume_to_end() {
        let result = children(parse("(x + {y"));
        assert_eq!(result.len(), 1);
        if let MathNode::Parentheses(inner) = &result[0] {
            assert_eq!(inner.len(), 3);
            assert_eq!(inner[2], MathNode::Variable('y'));
        } else {
            panic!("Expected Parentheses");
        }
    }

    #[test]
    fn test_stray_closer_kept() {
        let result = children(parse("x)"));
        assert_eq!(result, vec![MathNode::Variable('x'), MathNode::text(")")]);
    }

    #[test]
    fn test_empty_frac_args() {
        let result = children(parse("\\frac{}{"));
        assert_eq!(
            result,
            vec![MathNode::fraction(MathNode::Group(vec![]), MathNode::Group(vec![]))]
        );
    }

    #[test]
    fn test_missing_script_argument_keeps_group_closer() {
        let result = children(parse("\\frac{a^}{b}"));
        assert_eq!(
            result,
            vec![MathNode::fraction(
                MathNode::Group(vec![
                    MathNode::Variable('a'),
                    MathNode::superscript(MathNode::Group(vec![])),
                ]),
                MathNode::Variable('b'),
            )]
        );

        let result = children(parse("{x_}+1"));
        assert_eq!(
            result,
            vec![
                MathNode::Group(vec![
                    MathNode::Variable('x'),
                    MathNode::subscript(MathNode::Group(vec![])),
                ]),
                MathNode::Operator('+'),
                MathNode::number("1"),
            ]
        );
    }

    #[test]
    fn test_missing_script_argument_keeps_delimiters() {
        let empty_sup = MathNode::superscript(MathNode::Group(vec![]));
        let result = children(parse("(x^) y"));
        assert_eq!(
            result,
            vec![
                MathNode::Parentheses(vec![MathNode::Variable('x'), empty_sup.clone()]),
                MathNode::Variable('y'),
            ]
        );

        let result = children(parse("|x^| y"));
        assert_eq!(
            result,
            vec![
                MathNode::Absolute(vec![MathNode::Variable('x'), empty_sup]),
                MathNode::Variable('y'),
            ]
        );
    }

    #[test]
    fn test_script_may_open_absolute() {
        let result = children(parse("x^|y|"));
        assert_eq!(
            result,
            vec![
                MathNode::Variable('x'),
                MathNode::superscript(MathNode::Absolute(vec![MathNode::Variable('y')])),
            ]
        );
    }

    #[test]
    fn test_empty_text_command_draws_nothing() {
        assert!(children(parse("\\text{}")).is_empty());
        assert_eq!(children(parse("\\mathrm{} x")), vec![MathNode::Variable('x')]);
    }

    #[test]
    fn test_nesting_limit_degrades_to_text() {
        let deep = format!("{}x{}", "{".repeat(10), "}".repeat(10));
        let result = parse_with_limit(&deep, 5);
        assert_eq!(result, MathNode::Equation(vec![MathNode::text(deep.clone())]));

        let result = parse_with_limit(&deep, 20);
        assert_eq!(result, MathNode::Equation(vec![MathNode::Variable('x')]));
    }

    #[test]
    fn test_escaped_characters() {
        let result = children(parse("\\{ \\%"));
        assert_eq!(result, vec![MathNode::text("{"), MathNode::text("%")]);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(parse(""), MathNode::Equation(vec![]));
        assert_eq!(parse("   "), MathNode::Equation(vec![]));
    }
}
