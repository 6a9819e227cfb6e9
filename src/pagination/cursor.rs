use serde_json::{Map, Value};
use tracing::debug;

use super::page::{AsyncPageSource, PageResponse, PageSource};
use crate::{
    cache::ResourceKind,
    error::{ClientError, ClientResult},
    query::{Query, QueryArg, QueryCompiler, QueryModel, compile_request, render_query_string},
    step::{Inline, run_blocking},
};

/// Where a cursor's model comes from.
#[derive(Debug, Clone)]
enum CursorSource {
    Query { query: Query, compiler: QueryCompiler },
    Href { kind: ResourceKind },
}

/// Lifecycle of a [`PaginatedCursor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    Uncompiled,
    /// Model compiled, no page fetched yet.
    Compiled,
    HasPage,
    Exhausted,
}

/// Single-step pagination driver.
///
/// Each call to [`advance`](Self::advance) or
/// [`advance_async`](Self::advance_async) fetches at most one page and
/// replaces the current page. Advancing takes `&mut self`; iterate
/// concurrently with independent cursors.
#[derive(Debug, Clone)]
pub struct PaginatedCursor {
    href: String,
    source: CursorSource,
    model: Option<QueryModel>,
    state: CursorState,
    total_retrieved: u64,
    page: Option<PageResponse>,
    last_url: Option<String>,
}

impl PaginatedCursor {
    /// Cursor over `href` filtered by `query`. The query is compiled on the
    /// first advance.
    pub fn new(href: impl Into<String>, query: Query, compiler: QueryCompiler) -> Self {
        Self::with_source(href.into(), CursorSource::Query { query, compiler })
    }

    /// Cursor over the whole collection at `href`, server default paging.
    pub fn for_href(href: impl Into<String>, kind: ResourceKind) -> Self {
        Self::with_source(href.into(), CursorSource::Href { kind })
    }

    fn with_source(href: String, source: CursorSource) -> Self {
        Self {
            href,
            source,
            model: None,
            state: CursorState::Uncompiled,
            total_retrieved: 0,
            page: None,
            last_url: None,
        }
    }

    pub fn href(&self) -> &str {
        &self.href
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    pub fn is_exhausted(&self) -> bool {
        self.state == CursorState::Exhausted
    }

    pub fn total_retrieved(&self) -> u64 {
        self.total_retrieved
    }

    /// The compiled model, once the first advance has run. Its offset is the
    /// query's own; page requests add the number of items already retrieved.
    pub fn model(&self) -> Option<&QueryModel> {
        self.model.as_ref()
    }

    /// URL of the most recent page request.
    pub fn last_url(&self) -> Option<&str> {
        self.last_url.as_deref()
    }

    fn kind(&self) -> ResourceKind {
        match &self.source {
            CursorSource::Query { query, .. } => query.source(),
            CursorSource::Href { kind } => *kind,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Current page
    // ─────────────────────────────────────────────────────────────────────────

    fn current_page(&self) -> ClientResult<&PageResponse> {
        self.page.as_ref().ok_or_else(|| {
            ClientError::Usage("cursor has no page; call advance first".to_string())
        })
    }

    pub fn current_items(&self) -> ClientResult<&[Map<String, Value>]> {
        Ok(&self.current_page()?.items)
    }

    pub fn offset(&self) -> ClientResult<u64> {
        Ok(self.current_page()?.offset)
    }

    pub fn limit(&self) -> ClientResult<u64> {
        Ok(self.current_page()?.limit)
    }

    pub fn size(&self) -> ClientResult<u64> {
        Ok(self.current_page()?.size)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Advancing
    // ─────────────────────────────────────────────────────────────────────────

    /// Fetch the next page (blocking). Returns `false` once exhausted.
    pub fn advance(&mut self, source: &dyn PageSource) -> ClientResult<bool> {
        run_blocking(self.advance_async(&Inline(source)))
    }

    /// Fetch the next page (non-blocking). Returns `false` once exhausted.
    pub async fn advance_async(&mut self, source: &dyn AsyncPageSource) -> ClientResult<bool> {
        let Some(query) = self.prepare()? else {
            return Ok(false);
        };
        let page = source.execute_page(self.kind(), &self.href, &query).await?;
        Ok(self.absorb(page))
    }

    /// Drain every remaining page (blocking).
    pub fn collect_all(&mut self, source: &dyn PageSource) -> ClientResult<Vec<Map<String, Value>>> {
        run_blocking(self.collect_all_async(&Inline(source)))
    }

    /// Drain every remaining page (non-blocking).
    pub async fn collect_all_async(
        &mut self,
        source: &dyn AsyncPageSource,
    ) -> ClientResult<Vec<Map<String, Value>>> {
        let mut items = Vec::new();
        while self.advance_async(source).await? {
            items.extend(self.current_items()?.iter().cloned());
        }
        Ok(items)
    }

    /// Compute the arguments of the next page request, or `None` when no
    /// request should be made.
    fn prepare(&mut self) -> ClientResult<Option<Vec<QueryArg>>> {
        if self.state == CursorState::Exhausted {
            return Ok(None);
        }

        if self.model.is_none() {
            let model = match &self.source {
                CursorSource::Query { query, compiler } => compiler.compile(query)?,
                CursorSource::Href { kind } => QueryModel::default_for(*kind),
            };
            self.model = Some(model);
            self.state = CursorState::Compiled;
        }
        let page_max = match &self.source {
            CursorSource::Query { compiler, .. } => compiler.page_max(),
            CursorSource::Href { .. } => crate::query::DEFAULT_PAGE_MAX,
        };

        let Some(model) = self.model.as_ref() else {
            return Ok(None);
        };

        let remaining = match model.execution_plan.max_items {
            Some(max) if self.total_retrieved >= max => {
                debug!(
                    href = %self.href,
                    total = self.total_retrieved,
                    max_items = max,
                    "Cursor reached its item cap"
                );
                self.state = CursorState::Exhausted;
                return Ok(None);
            }
            Some(max) => Some(max - self.total_retrieved),
            None => None,
        };

        // The stored model keeps its compiled offset; requests start past the
        // items already retrieved.
        let mut request = model.clone();
        if self.total_retrieved > 0 {
            request.add_offset(self.total_retrieved);
        }
        if let Some(remaining) = remaining {
            request.limit = Some(request.limit.unwrap_or(page_max).min(remaining));
        }

        let args = compile_request(&request)?;
        self.last_url = Some(format!("{}{}", self.href, render_query_string(&args)));
        Ok(Some(args))
    }

    /// Merge a fetched page. Returns whether it carried any items.
    fn absorb(&mut self, mut page: PageResponse) -> bool {
        if page.items.is_empty() {
            debug!(href = %self.href, total = self.total_retrieved, "Cursor exhausted");
            self.state = CursorState::Exhausted;
            return false;
        }

        if let Some(max) = self.model.as_ref().and_then(|m| m.execution_plan.max_items) {
            let remaining = max.saturating_sub(self.total_retrieved);
            if page.items.len() as u64 > remaining {
                page.items.truncate(remaining as usize);
            }
        }

        self.total_retrieved += page.items.len() as u64;
        debug!(
            url = self.last_url.as_deref().unwrap_or(&self.href),
            items = page.items.len(),
            total = self.total_retrieved,
            "Fetched page"
        );
        self.page = Some(page);
        self.state = CursorState::HasPage;
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::{query::QueryError, transport::TransportError};

    /// Collection of `total` accounts honouring `offset`/`limit`, default
    /// page size 25, capped at 100.
    struct Backend {
        total: u64,
        requests: Mutex<Vec<Vec<(String, String)>>>,
    }

    impl Backend {
        fn new(total: u64) -> Self {
            Self {
                total,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<Vec<(String, String)>> {
            self.requests.lock().unwrap().clone()
        }

        fn page(&self, query: &[QueryArg]) -> PageResponse {
            let arg = |name: &str| {
                query
                    .iter()
                    .find(|a| a.name == name)
                    .and_then(|a| a.value.parse::<u64>().ok())
            };
            let offset = arg("offset").unwrap_or(0);
            let limit = arg("limit").unwrap_or(25).min(100);
            let end = (offset + limit).min(self.total);
            let items = (offset.min(end)..end)
                .map(|i| match json!({"href": format!("/v1/accounts/{}", i)}) {
                    Value::Object(map) => map,
                    _ => unreachable!(),
                })
                .collect();
            PageResponse {
                offset,
                limit,
                size: self.total,
                items,
            }
        }

        fn record(&self, query: &[QueryArg]) {
            self.requests.lock().unwrap().push(
                query
                    .iter()
                    .map(|a| (a.name.clone(), a.value.clone()))
                    .collect(),
            );
        }
    }

    impl PageSource for Backend {
        fn execute_page(
            &self,
            _kind: ResourceKind,
            _href: &str,
            query: &[QueryArg],
        ) -> ClientResult<PageResponse> {
            self.record(query);
            Ok(self.page(query))
        }
    }

    #[async_trait]
    impl AsyncPageSource for Backend {
        async fn execute_page(
            &self,
            _kind: ResourceKind,
            _href: &str,
            query: &[QueryArg],
        ) -> ClientResult<PageResponse> {
            self.record(query);
            Ok(self.page(query))
        }
    }

    /// Fails every request whose position is listed in `failing`.
    struct Flaky {
        inner: Backend,
        calls: Mutex<usize>,
        failing: Vec<usize>,
    }

    impl PageSource for Flaky {
        fn execute_page(
            &self,
            _kind: ResourceKind,
            _href: &str,
            query: &[QueryArg],
        ) -> ClientResult<PageResponse> {
            let call = {
                let mut calls = self.calls.lock().unwrap();
                *calls += 1;
                *calls
            };
            self.inner.record(query);
            if self.failing.contains(&call) {
                return Err(ClientError::Transport(TransportError::Other(
                    "connection reset".to_string(),
                )));
            }
            Ok(self.inner.page(query))
        }
    }

    fn offsets(requests: &[Vec<(String, String)>]) -> Vec<Option<String>> {
        requests
            .iter()
            .map(|r| r.iter().find(|(n, _)| n == "offset").map(|(_, v)| v.clone()))
            .collect()
    }

    fn cursor(query: Query) -> PaginatedCursor {
        PaginatedCursor::new("/v1/accounts", query, QueryCompiler::default())
    }

    fn accounts() -> Query {
        Query::new(ResourceKind::Account)
    }

    #[test]
    fn test_reading_before_advance_is_usage_error() {
        let cursor = cursor(accounts());
        assert_eq!(cursor.state(), CursorState::Uncompiled);
        assert!(matches!(cursor.current_items(), Err(ClientError::Usage(_))));
        assert!(matches!(cursor.offset(), Err(ClientError::Usage(_))));
        assert!(matches!(cursor.limit(), Err(ClientError::Usage(_))));
        assert!(matches!(cursor.size(), Err(ClientError::Usage(_))));
    }

    #[test]
    fn test_first_request_has_no_offset_second_has_page_length() {
        let backend = Backend::new(60);
        let mut cursor = PaginatedCursor::for_href("/v1/accounts", ResourceKind::Account);

        assert!(cursor.advance(&backend).unwrap());
        assert_eq!(cursor.current_items().unwrap().len(), 25);
        assert!(cursor.advance(&backend).unwrap());

        let requests = backend.requests();
        assert!(requests[0].is_empty());
        assert_eq!(requests[1], vec![("offset".to_string(), "25".to_string())]);
    }

    #[test]
    fn test_take_smaller_than_page() {
        let backend = Backend::new(250);
        let mut cursor = cursor(accounts().take(7));

        let items = cursor.collect_all(&backend).unwrap();
        assert_eq!(items.len(), 7);
        assert_eq!(
            backend.requests(),
            vec![vec![("limit".to_string(), "7".to_string())]]
        );
        assert!(cursor.is_exhausted());
    }

    #[tokio::test]
    async fn test_take_larger_than_page_max() {
        let backend = Backend::new(750);
        let mut cursor = cursor(accounts().take(500));

        let items = cursor.collect_all_async(&backend).await.unwrap();
        assert_eq!(items.len(), 500);
        assert_eq!(cursor.total_retrieved(), 500);

        let requests = backend.requests();
        assert_eq!(requests.len(), 5);
        for (i, request) in requests.iter().enumerate() {
            assert!(request.contains(&("limit".to_string(), "100".to_string())));
            let offset = request.iter().find(|(n, _)| n == "offset");
            if i == 0 {
                assert!(offset.is_none());
            } else {
                assert_eq!(offset.unwrap().1, (i * 100).to_string());
            }
        }
    }

    #[test]
    fn test_final_request_limited_to_remaining() {
        let backend = Backend::new(750);
        let mut cursor = cursor(accounts().take(130));

        let items = cursor.collect_all(&backend).unwrap();
        assert_eq!(items.len(), 130);
        let requests = backend.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].contains(&("limit".to_string(), "30".to_string())));
        assert!(requests[1].contains(&("offset".to_string(), "100".to_string())));
    }

    #[test]
    fn test_skip_offsets_first_request() {
        let backend = Backend::new(100);
        let mut cursor = cursor(accounts().skip(10).take(5));
        assert!(cursor.advance(&backend).unwrap());
        assert_eq!(cursor.offset().unwrap(), 10);
        assert_eq!(
            cursor.last_url(),
            Some("/v1/accounts?limit=5&offset=10")
        );
    }

    #[test]
    fn test_empty_page_exhausts() {
        let backend = Backend::new(0);
        let mut cursor = PaginatedCursor::for_href("/v1/accounts", ResourceKind::Account);
        assert!(!cursor.advance(&backend).unwrap());
        assert!(cursor.is_exhausted());
        assert!(!cursor.advance(&backend).unwrap());
        assert_eq!(backend.requests().len(), 1);
    }

    #[test]
    fn test_uncapped_cursor_stops_on_empty_page() {
        let backend = Backend::new(50);
        let mut cursor = PaginatedCursor::for_href("/v1/accounts", ResourceKind::Account);
        let items = cursor.collect_all(&backend).unwrap();
        assert_eq!(items.len(), 50);
        assert_eq!(backend.requests().len(), 3);
    }

    #[test]
    fn test_compile_error_surfaces_on_first_advance() {
        let backend = Backend::new(10);
        let mut cursor = cursor(accounts().where_(r#"x => x.Email == "a" || x.Email == "b""#));
        let err = cursor.advance(&backend).unwrap_err();
        assert!(matches!(
            err,
            ClientError::Query(QueryError::UnsupportedOperator(_))
        ));
        assert!(backend.requests().is_empty());
    }

    #[tokio::test]
    async fn test_disciplines_issue_identical_requests() {
        let blocking_backend = Backend::new(120);
        let async_backend = Backend::new(120);
        let query = accounts()
            .where_(r#"x => x.Email.EndsWith("@galacticempire.co")"#)
            .order_by("x => x.Surname")
            .take(110);

        let mut blocking = cursor(query.clone());
        let blocking_items = blocking.collect_all(&blocking_backend).unwrap();

        let mut non_blocking = cursor(query);
        let async_items = non_blocking.collect_all_async(&async_backend).await.unwrap();

        assert_eq!(blocking_items, async_items);
        assert_eq!(blocking_backend.requests(), async_backend.requests());
    }

    #[test]
    fn test_failed_advance_retries_same_page() {
        let source = Flaky {
            inner: Backend::new(60),
            calls: Mutex::new(0),
            failing: vec![2],
        };
        let mut cursor = PaginatedCursor::for_href("/v1/accounts", ResourceKind::Account);

        assert!(cursor.advance(&source).unwrap());
        assert!(cursor.advance(&source).is_err());
        assert_eq!(cursor.state(), CursorState::HasPage);
        assert_eq!(cursor.total_retrieved(), 25);

        assert!(cursor.advance(&source).unwrap());
        assert_eq!(cursor.offset().unwrap(), 25);
        assert_eq!(cursor.current_items().unwrap()[0]["href"], "/v1/accounts/25");

        assert!(cursor.advance(&source).unwrap());
        assert!(!cursor.advance(&source).unwrap());
        assert_eq!(cursor.total_retrieved(), 60);
        assert_eq!(
            offsets(&source.inner.requests()),
            vec![
                None,
                Some("25".to_string()),
                Some("25".to_string()),
                Some("50".to_string()),
                Some("60".to_string()),
            ]
        );
    }

    #[test]
    fn test_model_keeps_compiled_offset() {
        let backend = Backend::new(40);
        let mut cursor = cursor(accounts().skip(10));
        let items = cursor.collect_all(&backend).unwrap();
        assert_eq!(items.len(), 30);
        assert_eq!(cursor.model().unwrap().offset, Some(10));
        assert_eq!(
            offsets(&backend.requests()),
            vec![
                Some("10".to_string()),
                Some("35".to_string()),
                Some("40".to_string()),
            ]
        );
    }
}
