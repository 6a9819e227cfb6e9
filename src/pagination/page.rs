use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{
    cache::ResourceKind,
    error::{ClientError, ClientResult},
    query::QueryArg,
};

/// One page of a collection listing.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PageResponse {
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub limit: u64,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub items: Vec<Map<String, Value>>,
}

impl PageResponse {
    /// Read the paging envelope out of a collection body.
    pub fn from_body(body: Map<String, Value>) -> ClientResult<Self> {
        serde_json::from_value(Value::Object(body))
            .map_err(|e| ClientError::MalformedResponse(format!("invalid collection page: {}", e)))
    }
}

/// Executes one page request (blocking).
pub trait PageSource: Send + Sync {
    fn execute_page(
        &self,
        kind: ResourceKind,
        href: &str,
        query: &[QueryArg],
    ) -> ClientResult<PageResponse>;
}

/// Executes one page request (non-blocking).
#[async_trait]
pub trait AsyncPageSource: Send + Sync {
    async fn execute_page(
        &self,
        kind: ResourceKind,
        href: &str,
        query: &[QueryArg],
    ) -> ClientResult<PageResponse>;
}
