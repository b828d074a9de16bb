//! Error taxonomy for equation binding and configuration.

use thiserror::Error;

/// Malformed equation text, reported by the S-expression reader.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} at offset {offset}")]
pub struct ParseError {
    pub message: String,
    /// Byte offset into the source text.
    pub offset: usize,
}

impl ParseError {
    pub(crate) fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// A symbol other than the state variables was referenced.
    #[error("Unknown variable: {0}")]
    UnknownVariable(String),
    /// Wrong arity, unknown operator or a node that cannot be evaluated.
    #[error("Unsupported expression: {0}")]
    UnsupportedExpression(String),
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    /// A configuration value collapsed to something unusable and was clamped.
    #[error("Degenerate {field}: requested {requested}, using {applied}")]
    DegenerateConfiguration {
        field: &'static str,
        requested: f64,
        applied: f64,
    },
}

pub type Result<T> = std::result::Result<T, EngineError>;
