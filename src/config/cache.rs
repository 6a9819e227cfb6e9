use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Resource cache configuration.
///
/// The cache holds normalized resource entries, one region per resource
/// kind. Without a cache every read reaches the server.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
pub enum CacheConfig {
    /// No caching.
    #[default]
    None,

    /// In-process cache shared by the blocking and non-blocking paths.
    Memory(MemoryCacheConfig),
}

impl CacheConfig {
    pub fn is_none(&self) -> bool {
        matches!(self, CacheConfig::None)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            CacheConfig::None => Ok(()),
            CacheConfig::Memory(c) => c.validate(),
        }
    }
}

/// In-memory cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryCacheConfig {
    /// Maximum number of entries across all regions.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Number of entries to evict when cache is full.
    /// Eviction removes expired entries first, then uses LRU.
    #[serde(default = "default_eviction_batch_size")]
    pub eviction_batch_size: usize,

    /// TTL for regions without an override, in seconds. Zero disables expiry.
    #[serde(default = "default_ttl")]
    pub default_ttl_secs: u64,

    /// Per-region overrides, keyed by region name (e.g. `accounts`).
    #[serde(default)]
    pub regions: HashMap<String, RegionConfig>,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            eviction_batch_size: default_eviction_batch_size(),
            default_ttl_secs: default_ttl(),
            regions: HashMap::new(),
        }
    }
}

impl MemoryCacheConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_entries == 0 {
            return Err(ConfigError::Validation(
                "Memory cache max_entries must be greater than 0".into(),
            ));
        }
        if self.eviction_batch_size == 0 {
            return Err(ConfigError::Validation(
                "Memory cache eviction_batch_size must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Overrides for a single cache region.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RegionConfig {
    /// Entry lifetime in seconds. Zero disables expiry.
    pub ttl_secs: u64,
}

fn default_max_entries() -> usize {
    10_000
}

fn default_eviction_batch_size() -> usize {
    100
}

fn default_ttl() -> u64 {
    3600 // 1 hour
}
