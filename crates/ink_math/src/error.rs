//! Error types for the ink_math crate

use thiserror::Error;

/// Errors that can occur while turning LaTeX into vector primitives.
///
/// Parsing and layout are total: their anomalies are logged and repaired
/// in place. Only generation failures and input validation surface here,
/// and the facade turns both into a plain-text fallback.
#[derive(Error, Debug)]
pub enum MathError {
    /// Input rejected before it reached the parser
    #[error("Invalid input: {0}")]
    InputValidation(String),

    /// Expression nesting exceeded the configured limit
    #[error("Nesting depth {depth} exceeds limit of {limit}")]
    NestingTooDeep { depth: usize, limit: usize },

    /// The renderer produced nothing drawable
    #[error("Generation error: {0}")]
    Generation(String),

    /// Writing the markup document failed
    #[error("Markup error: {0}")]
    Markup(#[from] std::fmt::Error),

    /// Options JSON could not be decoded
    #[error("Options error: {0}")]
    Options(#[from] serde_json::Error),

    /// Options decoded but hold unusable values
    #[error("Invalid options: {0}")]
    InvalidOptions(String),
}

/// Result type for math operations
pub type MathResult<T> = Result<T, MathError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MathError::InputValidation("empty expression".to_string());
        assert_eq!(err.to_string(), "Invalid input: empty expression");
    }

    #[test]
    fn test_nesting_display() {
        let err = MathError::NestingTooDeep { depth: 65, limit: 64 };
        assert_eq!(err.to_string(), "Nesting depth 65 exceeds limit of 64");
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let math_err: MathError = json_err.into();
        assert!(matches!(math_err, MathError::Options(_)));
    }
}
