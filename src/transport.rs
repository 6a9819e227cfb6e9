//! Seam to the HTTP layer.
//!
//! Signing, connection handling and retries live behind these traits; the
//! core only hands over a request and receives a JSON object back.

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::query::{QueryArg, render_query_string};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Read,
    Create,
    Update,
    Delete,
}

/// One request as seen by the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub action: Action,
    pub href: String,
    pub query: Vec<QueryArg>,
    pub body: Option<Map<String, Value>>,
}

impl TransportRequest {
    pub fn read(href: impl Into<String>) -> Self {
        Self {
            action: Action::Read,
            href: href.into(),
            query: Vec::new(),
            body: None,
        }
    }

    /// Full request URL including the rendered query string.
    pub fn url(&self) -> String {
        format!("{}{}", self.href, render_query_string(&self.query))
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Transport error: {0}")]
    Other(String),
}

impl TransportError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, TransportError::NotFound(_))
    }
}

/// Blocking transport. Deletes return an empty map.
pub trait Transport: Send + Sync {
    fn execute(&self, request: &TransportRequest) -> Result<Map<String, Value>, TransportError>;
}

/// Non-blocking transport.
#[async_trait]
pub trait AsyncTransport: Send + Sync {
    async fn execute(
        &self,
        request: &TransportRequest,
    ) -> Result<Map<String, Value>, TransportError>;
}
