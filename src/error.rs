use thiserror::Error;

use crate::{cache::CacheError, query::QueryError, transport::TransportError};

/// Top-level error returned by data-store and cursor operations.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// The response body did not have the expected shape.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Programmer error, e.g. reading a cursor page before the first advance.
    #[error("Usage error: {0}")]
    Usage(String),

    /// The requested execution discipline has no transport configured.
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

pub type ClientResult<T> = Result<T, ClientError>;
