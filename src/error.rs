use thiserror::Error;

/// Every way a conversion can fail. All of them are client errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConvertError {
    /// The root value is not a recognizable schema node.
    #[error("invalid schema input: {0}")]
    InvalidSchemaInput(String),

    /// Builder source did not evaluate to a schema (syntax error, bad call).
    #[error("invalid builder source at line {line}, column {column}: {message}")]
    Evaluation {
        message: String,
        line: usize,
        column: usize,
    },

    /// Sample input is not JSON.
    #[error("invalid JSON: {0}")]
    InvalidJsonInput(String),

    /// Input nests deeper than the configured limit.
    #[error("input nesting exceeds the maximum depth of {limit}")]
    DepthExceeded { limit: usize },

    /// The request itself is unusable (blank code, bad envelope).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ConvertError {
    /// Stable name reported alongside the message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidSchemaInput(_) => "InvalidSchemaInput",
            Self::Evaluation { .. } => "EvaluationError",
            Self::InvalidJsonInput(_) => "InvalidJsonInput",
            Self::DepthExceeded { .. } => "DepthExceeded",
            Self::InvalidRequest(_) => "InvalidRequest",
        }
    }

    /// HTTP-style status for this error.
    pub fn status(&self) -> u16 {
        400
    }

    /// Build an evaluation error located at a byte offset of `src`.
    pub(crate) fn evaluation_at(src: &str, offset: usize, message: impl Into<String>) -> Self {
        let (line, column) = line_col(src, offset);
        Self::Evaluation { message: message.into(), line, column }
    }
}

pub type Result<T, E = ConvertError> = std::result::Result<T, E>;

/// 1-based line and column (in chars) of a byte offset.
fn line_col(src: &str, offset: usize) -> (usize, usize) {
    let mut end = offset.min(src.len());
    while !src.is_char_boundary(end) {
        end -= 1;
    }
    let before = &src[..end];
    let line = before.matches('\n').count() + 1;
    let column = match before.rfind('\n') {
        Some(nl) => before[nl + 1..].chars().count() + 1,
        None => before.chars().count() + 1,
    };
    (line, column)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluation_errors_carry_line_and_column() {
        let src = "z.object({\n  a: z.strin()\n})";
        let offset = src.find("strin").unwrap();
        let err = ConvertError::evaluation_at(src, offset, "unknown constructor");
        assert_eq!(
            err,
            ConvertError::Evaluation { message: "unknown constructor".into(), line: 2, column: 8 }
        );
        assert_eq!(err.kind(), "EvaluationError");
        assert_eq!(err.status(), 400);
    }

    #[test]
    fn offsets_past_the_end_clamp() {
        let err = ConvertError::evaluation_at("ab", 99, "eof");
        assert!(matches!(err, ConvertError::Evaluation { line: 1, column: 3, .. }));
    }
}
