//! Caching layers
//!
//! - [`LruStore`]: bounded key/value store with item or memory limits
//! - [`CacheManager`]: expiry, tag invalidation and stale-while-revalidate
//!   on top of the LRU store
//! - [`SharedFetchCache`]: deduplicates concurrent identical period fetches

mod fetch;
mod lru;
mod manager;
mod size;

pub use fetch::{FetchCacheStats, FetchKey, FetchResult, SharedFetch, SharedFetchCache};
pub use lru::{LruConfig, LruStats, LruStore};
pub use manager::{
    CacheConfig, CacheEntry, CacheManager, CacheManagerStats, CacheStrategy, EntryState,
};
pub use size::{FixedSizeEstimator, JsonSizeEstimator, SizeEstimator, estimate_json};
