//! Error types for query parsing

use crate::error::AppError;

/// Result type for query parsing
pub type ParseResult<T> = std::result::Result<T, ParseError>;

/// Errors produced while parsing a search query
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Parentheses do not pair up
    #[error("Unbalanced parentheses in query")]
    UnbalancedGroup,

    /// Nothing searchable left after trimming
    #[error("Query is empty")]
    EmptyQuery,
}

impl From<ParseError> for AppError {
    fn from(err: ParseError) -> Self {
        AppError::Query(err.to_string())
    }
}
