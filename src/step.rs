//! Execution disciplines.
//!
//! Every operation in this crate is written once, as an async function over
//! the non-blocking traits. Blocking callers run the same function through
//! [`Inline`], which presents a blocking implementation as its async
//! counterpart with futures that are ready on first poll, and
//! [`run_blocking`] drives it to completion on the calling thread.

use std::future::Future;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::{
    cache::{AsyncCacheStore, CacheStore, FlatEntry, ResourceKind, error::CacheResult},
    error::ClientResult,
    pagination::{AsyncPageSource, PageResponse, PageSource},
    query::QueryArg,
    transport::{AsyncTransport, Transport, TransportError, TransportRequest},
};

/// A blocking implementation exposed through an async trait.
pub struct Inline<'a, T: ?Sized>(pub &'a T);

#[async_trait]
impl<T: Transport + ?Sized> AsyncTransport for Inline<'_, T> {
    async fn execute(
        &self,
        request: &TransportRequest,
    ) -> Result<Map<String, Value>, TransportError> {
        self.0.execute(request)
    }
}

#[async_trait]
impl<T: CacheStore + ?Sized> AsyncCacheStore for Inline<'_, T> {
    async fn get(&self, kind: ResourceKind, key: &str) -> CacheResult<Option<FlatEntry>> {
        self.0.get(kind, key)
    }

    async fn put(&self, kind: ResourceKind, key: &str, entry: FlatEntry) -> CacheResult<()> {
        self.0.put(kind, key, entry)
    }

    async fn remove(&self, kind: ResourceKind, key: &str) -> CacheResult<()> {
        self.0.remove(kind, key)
    }
}

#[async_trait]
impl<T: PageSource + ?Sized> AsyncPageSource for Inline<'_, T> {
    async fn execute_page(
        &self,
        kind: ResourceKind,
        href: &str,
        query: &[QueryArg],
    ) -> ClientResult<PageResponse> {
        self.0.execute_page(kind, href, query)
    }
}

/// Drive a future to completion on the current thread.
///
/// Only used with futures whose leaves are [`Inline`] adapters, so it never
/// parks waiting on I/O.
pub fn run_blocking<F: Future>(future: F) -> F::Output {
    futures::executor::block_on(future)
}
