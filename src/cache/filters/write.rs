use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, trace, warn};

use super::{FilterChain, FilterContext, ResourceFilter, ResourceRequest, ResourceResult};
use crate::{
    cache::{
        entry::{
            CUSTOM_DATA, FlatEntry, HREF, canonical_key, custom_data_key, custom_data_property,
            href_of, is_resource_like, normalize,
        },
        error::CacheResult,
        kinds::{ResourceKind, Shape},
        traits::AsyncCacheStore,
    },
    error::ClientResult,
    transport::Action,
};

/// Keeps the cache in step with every completed operation.
///
/// Runs after the rest of the chain: deletes purge, results are flattened
/// and stored, inline custom-data changes are merged into the cached
/// custom-data entry. Cache failures are logged and never fail the request.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteCacheFilter;

/// What the filter needs from the request once it has been handed on.
struct Origin {
    action: Action,
    kind: ResourceKind,
    href: String,
    collection: bool,
    custom_data: Option<Map<String, Value>>,
}

impl Origin {
    fn of(request: &ResourceRequest) -> Self {
        let custom_data = match (request.action, &request.body) {
            (Action::Create | Action::Update, Some(body)) if request.kind.is_extendable() => {
                match body.get(CUSTOM_DATA) {
                    Some(Value::Object(changes)) => Some(changes.clone()),
                    _ => None,
                }
            }
            _ => None,
        };

        Self {
            action: request.action,
            kind: request.kind,
            href: request.href.clone(),
            collection: request.collection,
            custom_data,
        }
    }
}

#[async_trait]
impl ResourceFilter for WriteCacheFilter {
    async fn filter(
        &self,
        request: ResourceRequest,
        chain: FilterChain<'_>,
    ) -> ClientResult<ResourceResult> {
        let context = chain.context();
        let origin = Origin::of(&request);

        let result = chain.proceed(request).await?;
        if result.from_cache {
            return Ok(result);
        }

        if let Some(cache) = context.cache
            && let Err(e) = update(cache, &context, &origin, &result).await
        {
            warn!(
                kind = %origin.kind,
                href = %origin.href,
                error = %e,
                "Cache update failed"
            );
        }

        Ok(result)
    }
}

async fn update(
    cache: &dyn AsyncCacheStore,
    context: &FilterContext<'_>,
    origin: &Origin,
    result: &ResourceResult,
) -> CacheResult<()> {
    if origin.action == Action::Delete {
        return purge(cache, origin).await;
    }

    if result.kind == ResourceKind::EmailVerificationToken
        && let Some(Value::Object(account)) = result.body.get("account")
        && let Some(href) = href_of(account)
    {
        debug!(account = %href, "Email verified, purging cached account");
        cache.remove(ResourceKind::Account, &canonical_key(href)).await?;
    }

    if let Some(changes) = &origin.custom_data {
        let parent = href_of(&result.body).unwrap_or(origin.href.as_str());
        merge_custom_data(cache, origin.action, parent, changes).await?;
    }

    store(cache, context, origin, result).await
}

async fn purge(cache: &dyn AsyncCacheStore, origin: &Origin) -> CacheResult<()> {
    if let Some((parent, property)) = custom_data_property(&origin.href) {
        if let Some(mut entry) = cache.get(ResourceKind::CustomData, &parent).await? {
            entry.remove(&property);
            cache.put(ResourceKind::CustomData, &parent, entry).await?;
        }
        trace!(custom_data = %parent, property = %property, "Removed cached custom data property");
        return Ok(());
    }

    let key = canonical_key(&origin.href);
    trace!(kind = %origin.kind, key = %key, "Purged cache entry");
    cache.remove(origin.kind, &key).await
}

/// Fold inline custom-data changes into the cached custom-data entry.
///
/// Without a cached entry there is no trusted base to merge onto, so only a
/// create (whose changes are the whole custom data) is stored.
async fn merge_custom_data(
    cache: &dyn AsyncCacheStore,
    action: Action,
    parent_href: &str,
    changes: &Map<String, Value>,
) -> CacheResult<()> {
    let key = custom_data_key(parent_href);
    let merged = match cache.get(ResourceKind::CustomData, &key).await? {
        Some(mut existing) => {
            for (name, value) in changes {
                existing.insert(name.clone(), value.clone());
            }
            existing
        }
        None if action == Action::Create => {
            let mut created = FlatEntry::new();
            created.insert(HREF.to_string(), Value::String(key.clone()));
            for (name, value) in changes {
                if name != HREF {
                    created.insert(name.clone(), value.clone());
                }
            }
            created
        }
        None => {
            trace!(custom_data = %key, "No cached custom data to merge onto");
            return Ok(());
        }
    };
    cache.put(ResourceKind::CustomData, &key, merged).await
}

async fn store(
    cache: &dyn AsyncCacheStore,
    context: &FilterContext<'_>,
    origin: &Origin,
    result: &ResourceResult,
) -> CacheResult<()> {
    let shape = if origin.collection {
        Shape::Collection(result.kind)
    } else if is_resource_like(&result.body) && result.kind.is_cacheable() {
        Shape::Instance(result.kind)
    } else {
        trace!(kind = %result.kind, "Result is not cacheable");
        return Ok(());
    };

    let graph = match normalize(shape, &result.body, context.kinds) {
        Ok(graph) => graph,
        Err(e) => {
            warn!(
                kind = %result.kind,
                href = %result.href,
                error = %e,
                "Not caching response"
            );
            return Ok(());
        }
    };

    for entry in graph.into_entries() {
        if entry.kind.is_cacheable() {
            cache.put(entry.kind, &entry.key, entry.entry).await?;
        }
    }
    Ok(())
}
