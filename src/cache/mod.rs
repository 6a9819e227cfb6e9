//! Normalizing write-through resource cache.
//!
//! Responses are flattened into one [`FlatEntry`] per resource, keyed by
//! canonical href within the region of the resource's kind. Nested resources
//! are stored as separate entries and referenced by `{"href": ...}` links.

pub mod entry;
pub mod error;
pub mod filters;
pub mod kinds;
mod memory;
mod traits;

pub use entry::{FlatEntry, NormalizeError, NormalizedGraph, canonical_key, normalize};
pub use error::{CacheError, CacheResult};
pub use filters::{
    FilterChain, FilterContext, ReadCacheFilter, RequestPurpose, ResourceFilter, ResourceRequest,
    ResourceResult, WriteCacheFilter,
};
pub use kinds::{KindTable, ResourceKind, Shape};
pub use memory::MemoryCache;
pub use traits::{AsyncCacheStore, CacheCapabilities, CacheProvider, CacheStore};
