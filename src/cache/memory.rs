use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::trace;

use super::{
    entry::FlatEntry,
    error::CacheResult,
    kinds::ResourceKind,
    traits::{AsyncCacheStore, CacheStore},
};
use crate::config::MemoryCacheConfig;

struct CacheEntry {
    data: FlatEntry,
    expires_at: Option<Instant>,
    last_accessed: Instant,
}

impl CacheEntry {
    fn new(data: FlatEntry, expires_at: Option<Instant>) -> Self {
        Self {
            data,
            expires_at,
            last_accessed: Instant::now(),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| Instant::now() > exp)
    }

    fn touch(&mut self) {
        self.last_accessed = Instant::now();
    }
}

/// In-process region cache backed by DashMap.
///
/// Regions share one map; keys are `region:canonical-href`. Each region may
/// override the default TTL, and a TTL of zero means entries never expire.
/// State is local to the process, so two clients in different processes never
/// see each other's writes.
pub struct MemoryCache {
    data: DashMap<String, CacheEntry>,
    max_entries: usize,
    eviction_batch_size: usize,
    default_ttl: Duration,
    region_ttls: HashMap<String, Duration>,
}

impl MemoryCache {
    pub fn new(config: &MemoryCacheConfig) -> Self {
        Self {
            data: DashMap::new(),
            max_entries: config.max_entries.max(1),
            eviction_batch_size: config.eviction_batch_size.max(1),
            default_ttl: Duration::from_secs(config.default_ttl_secs),
            region_ttls: config
                .regions
                .iter()
                .map(|(region, c)| (region.clone(), Duration::from_secs(c.ttl_secs)))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn clear(&self) {
        self.data.clear();
    }

    fn ttl_for(&self, kind: ResourceKind) -> Duration {
        self.region_ttls
            .get(kind.region())
            .copied()
            .unwrap_or(self.default_ttl)
    }

    fn composite_key(kind: ResourceKind, key: &str) -> String {
        format!("{}:{}", kind.region(), key)
    }

    fn evict_if_needed(&self) {
        if self.data.len() < self.max_entries {
            return;
        }

        // Expired entries go first
        self.data.retain(|_, entry| !entry.is_expired());

        let current_len = self.data.len();
        if current_len < self.max_entries {
            return;
        }

        let target_size = self.max_entries.saturating_sub(self.eviction_batch_size);
        let to_evict = current_len.saturating_sub(target_size);
        if to_evict == 0 {
            return;
        }

        let mut entries: Vec<_> = self
            .data
            .iter()
            .map(|entry| (entry.key().clone(), entry.last_accessed))
            .collect();
        entries.sort_by_key(|(_, last_accessed)| *last_accessed);

        for (key, _) in entries.into_iter().take(to_evict) {
            self.data.remove(&key);
        }
        trace!(evicted = to_evict, "Evicted least recently used cache entries");
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, kind: ResourceKind, key: &str) -> CacheResult<Option<FlatEntry>> {
        let composite = Self::composite_key(kind, key);
        if let Some(mut entry) = self.data.get_mut(&composite) {
            if entry.is_expired() {
                drop(entry);
                self.data.remove(&composite);
                return Ok(None);
            }

            entry.touch();
            Ok(Some(entry.data.clone()))
        } else {
            Ok(None)
        }
    }

    fn put(&self, kind: ResourceKind, key: &str, entry: FlatEntry) -> CacheResult<()> {
        self.evict_if_needed();

        let ttl = self.ttl_for(kind);
        let expires_at = if !ttl.is_zero() {
            Some(Instant::now() + ttl)
        } else {
            None
        };

        self.data.insert(
            Self::composite_key(kind, key),
            CacheEntry::new(entry, expires_at),
        );
        Ok(())
    }

    fn remove(&self, kind: ResourceKind, key: &str) -> CacheResult<()> {
        self.data.remove(&Self::composite_key(kind, key));
        Ok(())
    }
}

#[async_trait]
impl AsyncCacheStore for MemoryCache {
    async fn get(&self, kind: ResourceKind, key: &str) -> CacheResult<Option<FlatEntry>> {
        CacheStore::get(self, kind, key)
    }

    async fn put(&self, kind: ResourceKind, key: &str, entry: FlatEntry) -> CacheResult<()> {
        CacheStore::put(self, kind, key, entry)
    }

    async fn remove(&self, kind: ResourceKind, key: &str) -> CacheResult<()> {
        CacheStore::remove(self, kind, key)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::{Value, json};
    use tokio::time::sleep;

    use super::*;
    use crate::config::RegionConfig;

    fn test_config(max_entries: usize) -> MemoryCacheConfig {
        MemoryCacheConfig {
            max_entries,
            ..Default::default()
        }
    }

    fn test_config_with_eviction(
        max_entries: usize,
        eviction_batch_size: usize,
    ) -> MemoryCacheConfig {
        MemoryCacheConfig {
            max_entries,
            eviction_batch_size,
            ..Default::default()
        }
    }

    fn entry(value: Value) -> FlatEntry {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn account(id: &str) -> FlatEntry {
        entry(json!({"href": format!("/v1/accounts/{}", id), "email": format!("{}@empire.co", id)}))
    }

    #[test]
    fn test_get_put() {
        let cache = MemoryCache::new(&test_config(100));

        CacheStore::put(&cache, ResourceKind::Account, "/v1/accounts/a1", account("a1")).unwrap();
        let result = CacheStore::get(&cache, ResourceKind::Account, "/v1/accounts/a1").unwrap();
        assert_eq!(result, Some(account("a1")));

        let result = CacheStore::get(&cache, ResourceKind::Account, "/v1/accounts/nope").unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn test_regions_are_separate() {
        let cache = MemoryCache::new(&test_config(100));

        CacheStore::put(&cache, ResourceKind::Account, "/v1/x", account("a1")).unwrap();
        assert!(
            CacheStore::get(&cache, ResourceKind::Group, "/v1/x")
                .unwrap()
                .is_none()
        );
        assert!(
            CacheStore::get(&cache, ResourceKind::Account, "/v1/x")
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_remove() {
        let cache = MemoryCache::new(&test_config(100));

        AsyncCacheStore::put(&cache, ResourceKind::Account, "/v1/accounts/a1", account("a1"))
            .await
            .unwrap();
        assert!(
            AsyncCacheStore::get(&cache, ResourceKind::Account, "/v1/accounts/a1")
                .await
                .unwrap()
                .is_some()
        );

        AsyncCacheStore::remove(&cache, ResourceKind::Account, "/v1/accounts/a1")
            .await
            .unwrap();
        assert!(
            AsyncCacheStore::get(&cache, ResourceKind::Account, "/v1/accounts/a1")
                .await
                .unwrap()
                .is_none()
        );

        // Removing a missing key is fine
        AsyncCacheStore::remove(&cache, ResourceKind::Account, "/v1/accounts/a1")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_region_ttl_expiration() {
        let mut config = test_config(100);
        config.default_ttl_secs = 0;
        config
            .regions
            .insert("accounts".to_string(), RegionConfig { ttl_secs: 1 });
        let cache = MemoryCache::new(&config);

        CacheStore::put(&cache, ResourceKind::Account, "/v1/accounts/a1", account("a1")).unwrap();
        CacheStore::put(&cache, ResourceKind::Group, "/v1/groups/g1", account("g1")).unwrap();
        assert!(
            CacheStore::get(&cache, ResourceKind::Account, "/v1/accounts/a1")
                .unwrap()
                .is_some()
        );

        sleep(Duration::from_millis(1100)).await;

        assert!(
            CacheStore::get(&cache, ResourceKind::Account, "/v1/accounts/a1")
                .unwrap()
                .is_none()
        );
        // Zero TTL means no expiration
        assert!(
            CacheStore::get(&cache, ResourceKind::Group, "/v1/groups/g1")
                .unwrap()
                .is_some()
        );
    }

    #[test]
    fn test_overwrite_value() {
        let cache = MemoryCache::new(&test_config(100));

        CacheStore::put(&cache, ResourceKind::Account, "/v1/accounts/a1", account("a1")).unwrap();
        CacheStore::put(&cache, ResourceKind::Account, "/v1/accounts/a1", account("a2")).unwrap();

        assert_eq!(
            CacheStore::get(&cache, ResourceKind::Account, "/v1/accounts/a1").unwrap(),
            Some(account("a2"))
        );
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_lru_eviction_evicts_oldest() {
        // max_entries=5, eviction_batch_size=2
        let cache = MemoryCache::new(&test_config_with_eviction(5, 2));

        for i in 0..5 {
            CacheStore::put(
                &cache,
                ResourceKind::Account,
                &format!("key{}", i),
                account(&i.to_string()),
            )
            .unwrap();
            sleep(Duration::from_millis(10)).await;
        }

        CacheStore::get(&cache, ResourceKind::Account, "key0").unwrap();
        sleep(Duration::from_millis(10)).await;
        CacheStore::get(&cache, ResourceKind::Account, "key1").unwrap();

        CacheStore::put(&cache, ResourceKind::Account, "new_key", account("new")).unwrap();

        for key in ["key0", "key1", "new_key"] {
            assert!(
                CacheStore::get(&cache, ResourceKind::Account, key)
                    .unwrap()
                    .is_some(),
                "{} should exist",
                key
            );
        }

        let remaining = ["key2", "key3", "key4"]
            .iter()
            .filter(|key| {
                CacheStore::get(&cache, ResourceKind::Account, key)
                    .unwrap()
                    .is_some()
            })
            .count();
        assert!(
            remaining <= 2,
            "Expected at most 2 of key2/key3/key4 to remain, got {}",
            remaining
        );
    }

    #[test]
    fn test_no_eviction_below_capacity() {
        let cache = MemoryCache::new(&test_config_with_eviction(10, 2));

        for i in 0..5 {
            CacheStore::put(
                &cache,
                ResourceKind::Group,
                &format!("key{}", i),
                account(&i.to_string()),
            )
            .unwrap();
        }
        assert_eq!(cache.len(), 5);
    }
}
