use std::sync::Arc;

use async_trait::async_trait;

use super::{
    entry::FlatEntry, error::CacheResult, kinds::ResourceKind, memory::MemoryCache,
};
use crate::config::CacheConfig;

/// Blocking named-region store of flat entries.
///
/// Each call must be atomic on its own; nothing above this trait relies on
/// multi-key atomicity. A store that cannot reach its backing storage returns
/// [`CacheError::Unavailable`](super::CacheError::Unavailable); the request
/// still completes against the server.
pub trait CacheStore: Send + Sync {
    /// Get the entry stored under `key` in the region of `kind`
    fn get(&self, kind: ResourceKind, key: &str) -> CacheResult<Option<FlatEntry>>;

    /// Store (or replace) an entry
    fn put(&self, kind: ResourceKind, key: &str, entry: FlatEntry) -> CacheResult<()>;

    /// Remove an entry; removing a missing key is not an error
    fn remove(&self, kind: ResourceKind, key: &str) -> CacheResult<()>;
}

/// Non-blocking counterpart of [`CacheStore`].
#[async_trait]
pub trait AsyncCacheStore: Send + Sync {
    async fn get(&self, kind: ResourceKind, key: &str) -> CacheResult<Option<FlatEntry>>;

    async fn put(&self, kind: ResourceKind, key: &str, entry: FlatEntry) -> CacheResult<()>;

    async fn remove(&self, kind: ResourceKind, key: &str) -> CacheResult<()>;
}

/// Which execution disciplines a provider can serve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheCapabilities {
    pub blocking: bool,
    pub non_blocking: bool,
}

/// Cache stores available to a data store, one slot per discipline.
///
/// A provider may implement only one discipline. Callers check
/// [`capabilities`](Self::capabilities) and skip caching for a discipline
/// with no store instead of failing at call time.
#[derive(Clone, Default)]
pub struct CacheProvider {
    blocking: Option<Arc<dyn CacheStore>>,
    non_blocking: Option<Arc<dyn AsyncCacheStore>>,
}

impl CacheProvider {
    /// No caching in either discipline.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// One in-memory store serving both disciplines.
    pub fn memory(cache: Arc<MemoryCache>) -> Self {
        Self {
            blocking: Some(cache.clone()),
            non_blocking: Some(cache),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        match config {
            CacheConfig::None => Self::disabled(),
            CacheConfig::Memory(memory) => Self::memory(Arc::new(MemoryCache::new(memory))),
        }
    }

    pub fn with_blocking(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.blocking = Some(store);
        self
    }

    pub fn with_non_blocking(mut self, store: Arc<dyn AsyncCacheStore>) -> Self {
        self.non_blocking = Some(store);
        self
    }

    pub fn capabilities(&self) -> CacheCapabilities {
        CacheCapabilities {
            blocking: self.blocking.is_some(),
            non_blocking: self.non_blocking.is_some(),
        }
    }

    pub fn blocking(&self) -> Option<&dyn CacheStore> {
        self.blocking.as_deref()
    }

    pub fn non_blocking(&self) -> Option<&dyn AsyncCacheStore> {
        self.non_blocking.as_deref()
    }
}

impl std::fmt::Debug for CacheProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheProvider")
            .field("capabilities", &self.capabilities())
            .finish()
    }
}
