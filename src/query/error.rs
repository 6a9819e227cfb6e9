use thiserror::Error;

use super::parser::ParseError;

/// Errors raised while compiling a query.
///
/// All of these are deterministic properties of the query shape: a query that
/// fails once will fail every time, so callers should never retry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),

    #[error("Unsupported query shape: {0}")]
    UnsupportedShape(String),

    #[error("Unknown field '{field}' on {resource}")]
    UnknownField { field: String, resource: String },

    #[error("Unsupported constant for field '{field}': {detail}")]
    UnsupportedConstant { field: String, detail: String },

    #[error("Conflicting {half} bound for date field '{field}'")]
    ConflictingDateTerm { field: String, half: &'static str },

    #[error("Expansion '{field}' is a link and does not accept offset or limit")]
    ExpansionPaging { field: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No schema registered for resource kind {0}")]
    UnknownResource(String),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
}

impl QueryError {
    pub(crate) fn shape(detail: impl Into<String>) -> Self {
        QueryError::UnsupportedShape(detail.into())
    }
}

pub type QueryResult<T> = Result<T, QueryError>;
