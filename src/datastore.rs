//! Entry point tying transport, cache and query compilation together.
//!
//! Every operation has a blocking and a non-blocking form. Both run the same
//! async dispatch; the blocking form wraps the blocking transport and cache
//! in [`Inline`] and drives the future with [`run_blocking`].

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::{
    cache::{
        AsyncCacheStore, CacheProvider, FilterChain, FilterContext, KindTable, ReadCacheFilter,
        ResourceFilter, ResourceKind, ResourceRequest, ResourceResult, WriteCacheFilter,
    },
    config::ClientConfig,
    error::{ClientError, ClientResult},
    pagination::{AsyncPageSource, PageResponse, PageSource, PaginatedCursor},
    query::{Query, QueryArg, QueryCompiler},
    step::{Inline, run_blocking},
    transport::{Action, AsyncTransport, Transport},
};

/// Resource operations over a transport, behind the cache filter chain.
///
/// Either transport may be absent; calling an operation of a discipline with
/// no transport returns [`ClientError::Unsupported`]. A discipline whose
/// cache provider has no store runs without the cache filters.
#[derive(Clone)]
pub struct DataStore {
    transport: Option<Arc<dyn Transport>>,
    async_transport: Option<Arc<dyn AsyncTransport>>,
    cache: CacheProvider,
    kinds: Arc<KindTable>,
    compiler: QueryCompiler,
    /// Caller filters only; used when the discipline has no cache store.
    plain_filters: Vec<Arc<dyn ResourceFilter>>,
    /// Caller filters followed by the read and write cache filters.
    cached_filters: Vec<Arc<dyn ResourceFilter>>,
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new(Arc::new(KindTable::default()), QueryCompiler::default())
    }
}

impl DataStore {
    pub fn new(kinds: Arc<KindTable>, compiler: QueryCompiler) -> Self {
        Self {
            transport: None,
            async_transport: None,
            cache: CacheProvider::disabled(),
            kinds,
            compiler,
            plain_filters: Vec::new(),
            cached_filters: vec![Arc::new(ReadCacheFilter), Arc::new(WriteCacheFilter)],
        }
    }

    /// Data store with the default kind and schema tables, cache and page
    /// size taken from `config`. Transports still have to be attached.
    pub fn from_config(config: &ClientConfig) -> Self {
        let compiler = QueryCompiler::default().with_page_max(config.query.page_max);
        Self::new(Arc::new(KindTable::default()), compiler)
            .with_cache(CacheProvider::from_config(&config.cache))
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_async_transport(mut self, transport: Arc<dyn AsyncTransport>) -> Self {
        self.async_transport = Some(transport);
        self
    }

    pub fn with_cache(mut self, cache: CacheProvider) -> Self {
        let capabilities = cache.capabilities();
        debug!(
            blocking = capabilities.blocking,
            non_blocking = capabilities.non_blocking,
            "Configured resource cache"
        );
        self.cache = cache;
        self
    }

    /// Add a filter. Caller filters run in the order added, before the cache
    /// filters, so a cache hit still passes through them.
    pub fn with_filter(mut self, filter: Arc<dyn ResourceFilter>) -> Self {
        let position = self.plain_filters.len();
        self.cached_filters.insert(position, filter.clone());
        self.plain_filters.push(filter);
        self
    }

    pub fn cache(&self) -> &CacheProvider {
        &self.cache
    }

    pub fn kinds(&self) -> &KindTable {
        &self.kinds
    }

    pub fn compiler(&self) -> &QueryCompiler {
        &self.compiler
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Blocking operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Run an arbitrary request through the filter chain.
    pub fn execute(&self, request: ResourceRequest) -> ClientResult<ResourceResult> {
        let transport = self.transport.as_deref().ok_or_else(|| {
            ClientError::Unsupported("no blocking transport configured".to_string())
        })?;
        let transport = Inline(transport);
        let cache = self.cache.blocking().map(Inline);
        let cache = cache.as_ref().map(|store| store as &dyn AsyncCacheStore);
        run_blocking(self.dispatch(request, &transport, cache))
    }

    pub fn get(&self, kind: ResourceKind, href: &str) -> ClientResult<Map<String, Value>> {
        self.execute(ResourceRequest::new(Action::Read, kind, href))
            .map(|result| result.body)
    }

    /// Read with extra query arguments (e.g. `expand`). Never served from
    /// cache.
    pub fn get_with(
        &self,
        kind: ResourceKind,
        href: &str,
        query: Vec<QueryArg>,
    ) -> ClientResult<Map<String, Value>> {
        self.execute(ResourceRequest::new(Action::Read, kind, href).with_query(query))
            .map(|result| result.body)
    }

    /// Create a resource by posting `body` to the collection at `href`.
    /// `kind` is the kind of the created resource.
    pub fn create(
        &self,
        kind: ResourceKind,
        href: &str,
        body: Map<String, Value>,
    ) -> ClientResult<Map<String, Value>> {
        self.execute(ResourceRequest::new(Action::Create, kind, href).with_body(body))
            .map(|result| result.body)
    }

    pub fn update(
        &self,
        kind: ResourceKind,
        href: &str,
        body: Map<String, Value>,
    ) -> ClientResult<Map<String, Value>> {
        self.execute(ResourceRequest::new(Action::Update, kind, href).with_body(body))
            .map(|result| result.body)
    }

    pub fn delete(&self, kind: ResourceKind, href: &str) -> ClientResult<()> {
        self.execute(ResourceRequest::new(Action::Delete, kind, href))
            .map(|_| ())
    }

    /// Every item of the collection at `href` matching `query`.
    pub fn list(&self, href: &str, query: Query) -> ClientResult<Vec<Map<String, Value>>> {
        self.cursor(href, query).collect_all(self)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Non-blocking operations
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn execute_async(&self, request: ResourceRequest) -> ClientResult<ResourceResult> {
        let transport = self.async_transport.as_deref().ok_or_else(|| {
            ClientError::Unsupported("no non-blocking transport configured".to_string())
        })?;
        self.dispatch(request, transport, self.cache.non_blocking())
            .await
    }

    pub async fn get_async(
        &self,
        kind: ResourceKind,
        href: &str,
    ) -> ClientResult<Map<String, Value>> {
        self.execute_async(ResourceRequest::new(Action::Read, kind, href))
            .await
            .map(|result| result.body)
    }

    pub async fn get_with_async(
        &self,
        kind: ResourceKind,
        href: &str,
        query: Vec<QueryArg>,
    ) -> ClientResult<Map<String, Value>> {
        self.execute_async(ResourceRequest::new(Action::Read, kind, href).with_query(query))
            .await
            .map(|result| result.body)
    }

    pub async fn create_async(
        &self,
        kind: ResourceKind,
        href: &str,
        body: Map<String, Value>,
    ) -> ClientResult<Map<String, Value>> {
        self.execute_async(ResourceRequest::new(Action::Create, kind, href).with_body(body))
            .await
            .map(|result| result.body)
    }

    pub async fn update_async(
        &self,
        kind: ResourceKind,
        href: &str,
        body: Map<String, Value>,
    ) -> ClientResult<Map<String, Value>> {
        self.execute_async(ResourceRequest::new(Action::Update, kind, href).with_body(body))
            .await
            .map(|result| result.body)
    }

    pub async fn delete_async(&self, kind: ResourceKind, href: &str) -> ClientResult<()> {
        self.execute_async(ResourceRequest::new(Action::Delete, kind, href))
            .await
            .map(|_| ())
    }

    pub async fn list_async(
        &self,
        href: &str,
        query: Query,
    ) -> ClientResult<Vec<Map<String, Value>>> {
        self.cursor(href, query).collect_all_async(self).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Cursors
    // ─────────────────────────────────────────────────────────────────────────

    /// Cursor over the collection at `href`, compiled with this store's
    /// compiler. Advance it with the store as page source.
    pub fn cursor(&self, href: impl Into<String>, query: Query) -> PaginatedCursor {
        PaginatedCursor::new(href, query, self.compiler.clone())
    }

    pub fn cursor_for_href(&self, href: impl Into<String>, kind: ResourceKind) -> PaginatedCursor {
        PaginatedCursor::for_href(href, kind)
    }

    async fn dispatch(
        &self,
        request: ResourceRequest,
        transport: &dyn AsyncTransport,
        cache: Option<&dyn AsyncCacheStore>,
    ) -> ClientResult<ResourceResult> {
        let filters = match cache {
            Some(_) => &self.cached_filters,
            None => {
                trace!(
                    kind = %request.kind,
                    href = %request.href,
                    "No cache store for this discipline, skipping cache filters"
                );
                &self.plain_filters
            }
        };

        let context = FilterContext {
            cache,
            kinds: &self.kinds,
        };
        FilterChain::new(filters, transport, context)
            .proceed(request)
            .await
    }
}

fn page_request(kind: ResourceKind, href: &str, query: &[QueryArg]) -> ResourceRequest {
    ResourceRequest::new(Action::Read, kind, href)
        .with_query(query.to_vec())
        .collection()
}

impl PageSource for DataStore {
    fn execute_page(
        &self,
        kind: ResourceKind,
        href: &str,
        query: &[QueryArg],
    ) -> ClientResult<PageResponse> {
        let result = self.execute(page_request(kind, href, query))?;
        PageResponse::from_body(result.body)
    }
}

#[async_trait]
impl AsyncPageSource for DataStore {
    async fn execute_page(
        &self,
        kind: ResourceKind,
        href: &str,
        query: &[QueryArg],
    ) -> ClientResult<PageResponse> {
        let result = self.execute_async(page_request(kind, href, query)).await?;
        PageResponse::from_body(result.body)
    }
}

impl std::fmt::Debug for DataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataStore")
            .field("blocking", &self.transport.is_some())
            .field("non_blocking", &self.async_transport.is_some())
            .field("cache", &self.cache)
            .field("filters", &self.plain_filters.len())
            .finish()
    }
}
