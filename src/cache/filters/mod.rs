//! Filter chain wrapped around every data-store operation.
//!
//! Filters run in order; each either answers the request itself or hands it
//! to the rest of the chain with [`FilterChain::proceed`]. The chain ends at
//! the transport.

mod read;
mod write;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

pub use read::ReadCacheFilter;
pub use write::WriteCacheFilter;

use super::{kinds::KindTable, traits::AsyncCacheStore};
use crate::{
    cache::ResourceKind,
    error::ClientResult,
    query::QueryArg,
    transport::{Action, AsyncTransport, TransportRequest},
};

/// Why a request is being made. Only plain resource reads may be served
/// from cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RequestPurpose {
    #[default]
    Resource,
    /// Login attempt; always reaches the server.
    Authentication,
    /// Provider account access probe; always reaches the server.
    ProviderAccount,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRequest {
    pub action: Action,
    pub kind: ResourceKind,
    pub href: String,
    pub query: Vec<QueryArg>,
    pub body: Option<Map<String, Value>>,
    /// Collection listing rather than a single instance.
    pub collection: bool,
    pub purpose: RequestPurpose,
}

impl ResourceRequest {
    pub fn new(action: Action, kind: ResourceKind, href: impl Into<String>) -> Self {
        Self {
            action,
            kind,
            href: href.into(),
            query: Vec::new(),
            body: None,
            collection: false,
            purpose: RequestPurpose::Resource,
        }
    }

    pub fn with_body(mut self, body: Map<String, Value>) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, query: Vec<QueryArg>) -> Self {
        self.query = query;
        self
    }

    pub fn collection(mut self) -> Self {
        self.collection = true;
        self
    }

    pub fn with_purpose(mut self, purpose: RequestPurpose) -> Self {
        self.purpose = purpose;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceResult {
    pub action: Action,
    pub kind: ResourceKind,
    pub href: String,
    pub body: Map<String, Value>,
    /// Answered by the read filter without reaching the transport.
    pub from_cache: bool,
}

/// Shared state available to every filter of one request.
#[derive(Clone, Copy)]
pub struct FilterContext<'a> {
    /// Store for the current execution discipline, if it has one.
    pub cache: Option<&'a dyn AsyncCacheStore>,
    pub kinds: &'a KindTable,
}

#[async_trait]
pub trait ResourceFilter: Send + Sync {
    async fn filter(
        &self,
        request: ResourceRequest,
        chain: FilterChain<'_>,
    ) -> ClientResult<ResourceResult>;
}

/// The not-yet-run remainder of a filter chain.
#[derive(Clone, Copy)]
pub struct FilterChain<'a> {
    filters: &'a [Arc<dyn ResourceFilter>],
    terminal: &'a dyn AsyncTransport,
    context: FilterContext<'a>,
}

impl<'a> FilterChain<'a> {
    pub fn new(
        filters: &'a [Arc<dyn ResourceFilter>],
        terminal: &'a dyn AsyncTransport,
        context: FilterContext<'a>,
    ) -> Self {
        Self {
            filters,
            terminal,
            context,
        }
    }

    pub fn context(&self) -> FilterContext<'a> {
        self.context
    }

    /// Run the next filter, or the transport once no filters remain.
    pub async fn proceed(self, request: ResourceRequest) -> ClientResult<ResourceResult> {
        match self.filters.split_first() {
            Some((next, rest)) => {
                let chain = FilterChain {
                    filters: rest,
                    ..self
                };
                next.filter(request, chain).await
            }
            None => self.execute(request).await,
        }
    }

    async fn execute(self, request: ResourceRequest) -> ClientResult<ResourceResult> {
        let ResourceRequest {
            action,
            kind,
            href,
            query,
            body,
            ..
        } = request;
        let transport_request = TransportRequest {
            action,
            href,
            query,
            body,
        };
        let body = self.terminal.execute(&transport_request).await?;
        Ok(ResourceResult {
            action,
            kind,
            href: transport_request.href,
            body,
            from_cache: false,
        })
    }
}
