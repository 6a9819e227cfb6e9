use async_trait::async_trait;
use tracing::{trace, warn};

use super::{FilterChain, RequestPurpose, ResourceFilter, ResourceRequest, ResourceResult};
use crate::{cache::entry::canonical_key, error::ClientResult, transport::Action};

/// Answers plain instance reads from the cache when it can.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadCacheFilter;

impl ReadCacheFilter {
    /// Only plain instance reads of cacheable kinds are looked up. Logins,
    /// provider probes, listings and reads carrying query arguments (e.g.
    /// expansions) always reach the server.
    pub fn applies_to(request: &ResourceRequest) -> bool {
        request.action == Action::Read
            && request.purpose == RequestPurpose::Resource
            && !request.collection
            && request.query.is_empty()
            && request.kind.is_cacheable()
    }
}

#[async_trait]
impl ResourceFilter for ReadCacheFilter {
    async fn filter(
        &self,
        request: ResourceRequest,
        chain: FilterChain<'_>,
    ) -> ClientResult<ResourceResult> {
        if let Some(cache) = chain.context().cache
            && Self::applies_to(&request)
        {
            let key = canonical_key(&request.href);
            match cache.get(request.kind, &key).await {
                Ok(Some(body)) => {
                    trace!(kind = %request.kind, key = %key, "Cache hit");
                    return Ok(ResourceResult {
                        action: Action::Read,
                        kind: request.kind,
                        href: request.href,
                        body,
                        from_cache: true,
                    });
                }
                Ok(None) => trace!(kind = %request.kind, key = %key, "Cache miss"),
                Err(e) => warn!(
                    kind = %request.kind,
                    key = %key,
                    error = %e,
                    "Cache lookup failed, reading from server"
                ),
            }
        }

        chain.proceed(request).await
    }
}
