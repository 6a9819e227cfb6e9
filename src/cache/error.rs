use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CacheError {
    /// The backing store could not serve the call. Filters treat it as a
    /// miss on reads and skip the update on writes.
    #[error("Cache store unavailable: {0}")]
    Unavailable(String),
}

pub type CacheResult<T> = Result<T, CacheError>;
