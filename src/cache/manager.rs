//! Cache Manager: LRU storage with time-based expiry, tag invalidation and
//! stale-while-revalidate.
//!
//! Entries move through three states by age:
//!
//! ```text
//!   0 ──── max_age ──── max_age + stale_window ────▶
//!   │ Fresh │      Stale       │      Expired
//! ```
//!
//! Fresh entries are served as-is. Any entry past max-age, stale or expired,
//! is served immediately when the caller of [`CacheManager::get_or_fetch`]
//! opts into stale-while-revalidate, with one background refresh per key.
//! The stale window only bounds plain reads: expired entries are never served
//! by [`CacheManager::get`] and are removed by [`CacheManager::purge_expired`].
//!
//! # Tag index
//!
//! A key is listed under a tag exactly when its current entry carries that
//! tag: overwrites drop tags the new entry no longer has, and deletions,
//! evictions and sweeps unlink the key from every tag.

use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use super::lru::{LruConfig, LruStore};
use super::size::{JsonSizeEstimator, SizeEstimator};
use crate::constants::cache::*;

/// Cache Manager configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entries (ignored when `max_memory` is set)
    pub max_entries: usize,
    /// Memory budget in bytes
    pub max_memory: Option<usize>,
    /// Default max-age in milliseconds
    pub default_max_age_ms: u64,
    /// Default stale window in milliseconds
    pub default_stale_window_ms: u64,
    /// Interval between expiry sweeps in milliseconds
    pub cleanup_interval_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            max_memory: Some(DEFAULT_MAX_MEMORY),
            default_max_age_ms: DEFAULT_MAX_AGE_MS,
            default_stale_window_ms: DEFAULT_STALE_WINDOW_MS,
            cleanup_interval_ms: DEFAULT_CLEANUP_INTERVAL_MS,
        }
    }
}

impl CacheConfig {
    pub fn default_max_age(&self) -> Duration {
        Duration::from_millis(self.default_max_age_ms)
    }

    pub fn default_stale_window(&self) -> Duration {
        Duration::from_millis(self.default_stale_window_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }
}

/// Per-call caching options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStrategy {
    /// Overrides the configured max-age
    pub max_age: Option<Duration>,
    /// Overrides the configured stale window
    pub stale_window: Option<Duration>,
    /// Serve stale entries immediately and refresh in the background
    pub stale_while_revalidate: bool,
    /// Tags attached to entries stored with this strategy
    pub tags: Vec<String>,
}

impl CacheStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn with_stale_window(mut self, window: Duration) -> Self {
        self.stale_window = Some(window);
        self
    }

    pub fn stale_while_revalidate(mut self) -> Self {
        self.stale_while_revalidate = true;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// Freshness of an entry relative to a max-age and stale window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Fresh,
    Stale,
    Expired,
}

/// A cached value with its bookkeeping. Replaced wholesale on update.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub data: V,
    pub created_at: Instant,
    pub size_bytes: usize,
    pub tags: Vec<String>,
    /// Max-age the entry was stored with, used by expiry sweeps
    pub max_age: Duration,
    /// Stale window the entry was stored with, used by expiry sweeps
    pub stale_window: Duration,
}

impl<V> CacheEntry<V> {
    pub fn state(&self, now: Instant, max_age: Duration, stale_window: Duration) -> EntryState {
        let age = now.saturating_duration_since(self.created_at);
        if age < max_age {
            EntryState::Fresh
        } else if age < max_age + stale_window {
            EntryState::Stale
        } else {
            EntryState::Expired
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.state(now, self.max_age, self.stale_window) == EntryState::Expired
    }
}

/// Cache Manager statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheManagerStats {
    pub entries: usize,
    pub memory_usage: usize,
    pub max_memory: Option<usize>,
    pub tag_count: usize,
    pub pending_revalidations: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheManagerStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Tag -> keys carrying that tag
#[derive(Debug, Default)]
struct TagIndex {
    buckets: HashMap<String, HashSet<String>>,
}

impl TagIndex {
    fn link(&mut self, key: &str, tags: &[String]) {
        for tag in tags {
            self.buckets
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }
    }

    fn unlink(&mut self, key: &str, tags: &[String]) {
        for tag in tags {
            if let Some(bucket) = self.buckets.get_mut(tag) {
                bucket.remove(key);
                if bucket.is_empty() {
                    self.buckets.remove(tag);
                }
            }
        }
    }

    fn take(&mut self, tag: &str) -> Option<HashSet<String>> {
        self.buckets.remove(tag)
    }

    fn len(&self) -> usize {
        self.buckets.len()
    }

    fn clear(&mut self) {
        self.buckets.clear();
    }
}

struct ManagerInner<V> {
    store: LruStore<String, CacheEntry<V>>,
    /// Also serializes every mutation of `store`
    tags: Mutex<TagIndex>,
    /// key -> token of the refresh currently allowed to write it
    revalidating: Mutex<HashMap<String, u64>>,
    next_token: AtomicU64,
    estimator: Arc<dyn SizeEstimator<V>>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Shared cache handle. Clones refer to the same cache.
pub struct CacheManager<V> {
    inner: Arc<ManagerInner<V>>,
}

impl<V> Clone for CacheManager<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> CacheManager<V>
where
    V: Serialize + Clone + Send + Sync + 'static,
{
    /// Create a cache that sizes values through their JSON representation.
    pub fn new(config: CacheConfig) -> Self {
        Self::with_estimator(config, Arc::new(JsonSizeEstimator))
    }
}

impl<V> CacheManager<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a cache with a custom size estimation policy.
    pub fn with_estimator(config: CacheConfig, estimator: Arc<dyn SizeEstimator<V>>) -> Self {
        let store = LruStore::new(
            LruConfig {
                capacity: Some(config.max_entries),
                max_memory: config.max_memory,
            },
            Arc::new(|entry: &CacheEntry<V>| entry.size_bytes),
        );
        Self {
            inner: Arc::new(ManagerInner {
                store,
                tags: Mutex::new(TagIndex::default()),
                revalidating: Mutex::new(HashMap::new()),
                next_token: AtomicU64::new(0),
                estimator,
                config,
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    fn windows(&self, strategy: &CacheStrategy) -> (Duration, Duration) {
        (
            strategy
                .max_age
                .unwrap_or_else(|| self.inner.config.default_max_age()),
            strategy
                .stale_window
                .unwrap_or_else(|| self.inner.config.default_stale_window()),
        )
    }

    /// Get a fresh or stale value without fetching, judged against the
    /// windows the entry was stored with.
    pub fn get(&self, key: &str) -> Option<V> {
        let hit = self
            .inner
            .store
            .get(key)
            .filter(|e| !e.is_expired(Instant::now()));
        self.count(hit)
    }

    /// Get a fresh or stale value judged against `strategy`'s windows.
    pub fn get_with(&self, key: &str, strategy: &CacheStrategy) -> Option<V> {
        let (max_age, stale_window) = self.windows(strategy);
        let hit = self
            .inner
            .store
            .get(key)
            .filter(|e| e.state(Instant::now(), max_age, stale_window) != EntryState::Expired);
        self.count(hit)
    }

    fn count(&self, hit: Option<CacheEntry<V>>) -> Option<V> {
        match hit {
            Some(entry) => {
                self.inner.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.data)
            }
            None => {
                self.inner.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Get a value, fetching it when missing or out of date.
    ///
    /// - Fresh entries are returned without calling `fetcher`.
    /// - With `stale_while_revalidate`, any entry past max-age is returned
    ///   immediately and refreshed in the background, at most one refresh per
    ///   key. A failed refresh leaves the old entry in place.
    /// - Otherwise `fetcher` is awaited and its value stored with the
    ///   strategy's tags, or its error returned.
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        key: &str,
        strategy: &CacheStrategy,
        fetcher: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let (max_age, stale_window) = self.windows(strategy);

        if let Some(entry) = self.inner.store.get(key) {
            // Past max-age the stale window no longer matters to revalidation
            match entry.state(Instant::now(), max_age, stale_window) {
                EntryState::Fresh => {
                    self.inner.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(entry.data);
                }
                _ if strategy.stale_while_revalidate => {
                    self.inner.hits.fetch_add(1, Ordering::Relaxed);
                    self.revalidate(key, strategy, fetcher);
                    return Ok(entry.data);
                }
                _ => {}
            }
        }

        self.inner.misses.fetch_add(1, Ordering::Relaxed);
        let value = fetcher().await?;
        self.set(key, value.clone(), strategy);
        Ok(value)
    }

    fn revalidate<F, Fut, E>(&self, key: &str, strategy: &CacheStrategy, fetcher: F)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let token = {
            let mut revalidating = self.inner.revalidating.lock();
            if revalidating.contains_key(key) {
                trace!(key, "Revalidation already in flight");
                return;
            }
            let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
            revalidating.insert(key.to_string(), token);
            token
        };

        debug!(key, token, "Revalidating stale entry");
        let refresh = fetcher();
        let manager = self.clone();
        let key = key.to_string();
        let strategy = strategy.clone();
        tokio::spawn(async move {
            let result = refresh.await;
            // Tags lock first, as every other mutation takes it
            let mut tags = manager.inner.tags.lock();
            let still_wanted = {
                let mut revalidating = manager.inner.revalidating.lock();
                if revalidating.get(&key) == Some(&token) {
                    revalidating.remove(&key);
                    true
                } else {
                    false
                }
            };
            match result {
                Ok(value) if still_wanted => {
                    let entry = manager.entry(value, &strategy);
                    manager.store_entry(&mut tags, &key, entry);
                }
                Ok(_) => debug!(key, token, "Discarding refresh for invalidated entry"),
                Err(e) => warn!(key, error = %e, "Background revalidation failed"),
            }
        });
    }

    fn entry(&self, value: V, strategy: &CacheStrategy) -> CacheEntry<V> {
        let (max_age, stale_window) = self.windows(strategy);
        CacheEntry {
            size_bytes: self.inner.estimator.estimate(&value),
            data: value,
            created_at: Instant::now(),
            tags: strategy.tags.clone(),
            max_age,
            stale_window,
        }
    }

    fn store_entry(&self, tags: &mut TagIndex, key: &str, entry: CacheEntry<V>) {
        if let Some(previous) = self.inner.store.peek(key) {
            tags.unlink(key, &previous.tags);
        }
        tags.link(key, &entry.tags);
        let evicted = self.inner.store.set(key.to_string(), entry);
        for (evicted_key, evicted_entry) in &evicted {
            tags.unlink(evicted_key, &evicted_entry.tags);
        }
        if !evicted.is_empty() {
            debug!(key, evicted = evicted.len(), "Cache evicted entries");
        }
    }

    /// Store a value, replacing any previous entry and its tags.
    pub fn set(&self, key: &str, value: V, strategy: &CacheStrategy) {
        let entry = self.entry(value, strategy);
        let mut tags = self.inner.tags.lock();
        self.store_entry(&mut tags, key, entry);
    }

    /// Remove a key. Returns whether it was present.
    pub fn delete(&self, key: &str) -> bool {
        let mut tags = self.inner.tags.lock();
        self.inner.revalidating.lock().remove(key);
        match self.inner.store.take(key) {
            Some(entry) => {
                tags.unlink(key, &entry.tags);
                true
            }
            None => false,
        }
    }

    /// Delete every key `matcher` accepts. Returns the number deleted.
    pub fn invalidate_pattern(&self, matcher: impl Fn(&str) -> bool) -> usize {
        let mut tags = self.inner.tags.lock();
        let removed = self.inner.store.remove_where(|key, _| matcher(key));
        let mut revalidating = self.inner.revalidating.lock();
        for (key, entry) in &removed {
            tags.unlink(key, &entry.tags);
            revalidating.remove(key);
        }
        debug!(count = removed.len(), "Invalidated entries by pattern");
        removed.len()
    }

    /// Delete every key starting with `prefix`.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        self.invalidate_pattern(|key| key.starts_with(prefix))
    }

    /// Delete every entry carrying any of `tags`, dropping those tag buckets.
    pub fn invalidate_tags<S: AsRef<str>>(&self, tags: &[S]) -> usize {
        let mut index = self.inner.tags.lock();
        let mut revalidating = self.inner.revalidating.lock();
        let mut count = 0;
        for tag in tags {
            let Some(keys) = index.take(tag.as_ref()) else {
                continue;
            };
            for key in keys {
                if let Some(entry) = self.inner.store.take(key.as_str()) {
                    index.unlink(&key, &entry.tags);
                    revalidating.remove(&key);
                    count += 1;
                }
            }
        }
        debug!(count, "Invalidated entries by tag");
        count
    }

    /// Remove entries past their max-age and stale window.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut tags = self.inner.tags.lock();
        let removed = self.inner.store.remove_where(|_, entry| entry.is_expired(now));
        for (key, entry) in &removed {
            tags.unlink(key, &entry.tags);
        }
        removed.len()
    }

    /// Run [`purge_expired`](Self::purge_expired) on an interval.
    ///
    /// The task ends on its own once every handle to the cache is dropped.
    pub fn spawn_cleanup(&self, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<ManagerInner<V>> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let purged = CacheManager { inner }.purge_expired();
                if purged > 0 {
                    debug!(purged, "Expired cache entries swept");
                }
            }
        })
    }

    /// Remove every entry, tag and pending revalidation marker.
    pub fn clear(&self) {
        let mut tags = self.inner.tags.lock();
        self.inner.store.clear();
        tags.clear();
        self.inner.revalidating.lock().clear();
    }

    pub fn stats(&self) -> CacheManagerStats {
        let store = self.inner.store.stats();
        CacheManagerStats {
            entries: store.len,
            memory_usage: store.memory_usage,
            max_memory: store.max_memory,
            tag_count: self.inner.tags.lock().len(),
            pending_revalidations: self.inner.revalidating.lock().len(),
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
            evictions: store.evictions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::size::FixedSizeEstimator;
    use std::sync::atomic::AtomicUsize;

    fn manager(max_age_ms: u64) -> CacheManager<String> {
        CacheManager::new(CacheConfig {
            default_max_age_ms: max_age_ms,
            ..CacheConfig::default()
        })
    }

    fn counting_fetcher(
        calls: &Arc<AtomicUsize>,
        value: &str,
    ) -> impl FnOnce() -> std::future::Ready<Result<String, String>> {
        let calls = Arc::clone(calls);
        let value = value.to_string();
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(value))
        }
    }

    fn failing_fetcher() -> impl FnOnce() -> std::future::Ready<Result<String, String>> {
        || std::future::ready(Err("provider down".to_string()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_controls_refetch() {
        let cache = manager(100);
        let calls = Arc::new(AtomicUsize::new(0));
        let strategy = CacheStrategy::new();
        cache.set("k", "v1".to_string(), &strategy);

        tokio::time::advance(Duration::from_millis(50)).await;
        let value = cache
            .get_or_fetch("k", &strategy, counting_fetcher(&calls, "v2"))
            .await
            .unwrap();
        assert_eq!(value, "v1");
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_millis(100)).await;
        let value = cache
            .get_or_fetch("k", &strategy, counting_fetcher(&calls, "v2"))
            .await
            .unwrap();
        assert_eq!(value, "v2");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_call_max_age_override() {
        let cache = manager(10_000);
        let calls = Arc::new(AtomicUsize::new(0));
        cache.set("k", "v1".to_string(), &CacheStrategy::new());

        tokio::time::advance(Duration::from_millis(200)).await;
        let strategy = CacheStrategy::new().with_max_age(Duration::from_millis(100));
        let value = cache
            .get_or_fetch("k", &strategy, counting_fetcher(&calls, "v2"))
            .await
            .unwrap();
        assert_eq!(value, "v2");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_while_revalidate_dedups_refresh() {
        let cache = manager(100);
        let calls = Arc::new(AtomicUsize::new(0));
        let strategy = CacheStrategy::new().stale_while_revalidate();
        cache.set("k", "old".to_string(), &strategy);
        tokio::time::advance(Duration::from_millis(150)).await;

        let slow_fetcher = || {
            let calls = Arc::clone(&calls);
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Ok::<_, String>("new".to_string())
                }
            }
        };

        let (a, b) = tokio::join!(
            cache.get_or_fetch("k", &strategy, slow_fetcher()),
            cache.get_or_fetch("k", &strategy, slow_fetcher()),
        );
        assert_eq!(a.unwrap(), "old");
        assert_eq!(b.unwrap(), "old");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().pending_revalidations, 1);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get("k").as_deref(), Some("new"));
        assert_eq!(cache.stats().pending_revalidations, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_entry_survives_failed_refresh() {
        let cache = CacheManager::<String>::new(CacheConfig {
            default_max_age_ms: 100,
            default_stale_window_ms: 100,
            ..CacheConfig::default()
        });
        let swr = CacheStrategy::new().stale_while_revalidate();
        cache.set("k", "old".to_string(), &swr);

        tokio::time::advance(Duration::from_millis(150)).await;
        let value = cache.get_or_fetch("k", &swr, failing_fetcher()).await;
        assert_eq!(value.unwrap(), "old");

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(cache.stats().pending_revalidations, 0);
        assert_eq!(cache.stats().entries, 1);

        let plain = CacheStrategy::new();
        let value = cache.get_or_fetch("k", &plain, failing_fetcher()).await;
        assert_eq!(value.unwrap_err(), "provider down");
    }

    #[tokio::test(start_paused = true)]
    async fn test_revalidate_serves_entries_past_stale_window() {
        let cache = manager(100);
        let swr = CacheStrategy::new().stale_while_revalidate();
        cache.set("k", "old".to_string(), &swr);

        // Well past max-age plus the default stale window
        tokio::time::advance(Duration::from_secs(61)).await;
        let started = Instant::now();
        let value = cache
            .get_or_fetch("k", &swr, || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, String>("new".to_string())
            })
            .await
            .unwrap();
        assert_eq!(value, "old");
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(cache.stats().pending_revalidations, 1);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(cache.get("k").as_deref(), Some("new"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_refresh_does_not_overwrite() {
        let cache = manager(100);
        let swr = CacheStrategy::new().stale_while_revalidate();
        let delayed = |value: &'static str, ms: u64| {
            move || async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok::<_, String>(value.to_string())
            }
        };

        cache.set("k", "old".to_string(), &swr);
        tokio::time::sleep(Duration::from_millis(150)).await;
        // Refresh A lands at t=450
        let value = cache.get_or_fetch("k", &swr, delayed("a", 300)).await;
        assert_eq!(value.unwrap(), "old");

        assert!(cache.delete("k"));
        cache.set("k", "mid".to_string(), &swr);
        tokio::time::sleep(Duration::from_millis(150)).await;
        // Refresh B lands at t=800
        let value = cache.get_or_fetch("k", &swr, delayed("b", 500)).await;
        assert_eq!(value.unwrap(), "mid");

        tokio::time::sleep(Duration::from_millis(160)).await;
        assert_eq!(cache.get("k").as_deref(), Some("mid"));
        assert_eq!(cache.stats().pending_revalidations, 1);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(cache.get("k").as_deref(), Some("b"));
        assert_eq!(cache.stats().pending_revalidations, 0);
    }

    #[tokio::test]
    async fn test_fetch_error_propagates_on_miss() {
        let cache = manager(100);
        let strategy = CacheStrategy::new().stale_while_revalidate();
        let result = cache.get_or_fetch("missing", &strategy, failing_fetcher()).await;
        assert!(result.is_err());
        assert!(cache.get("missing").is_none());
    }

    #[tokio::test]
    async fn test_fetched_value_stored_with_tags() {
        let cache = manager(10_000);
        let calls = Arc::new(AtomicUsize::new(0));
        let strategy = CacheStrategy::new().with_tag("period:7");
        cache
            .get_or_fetch("k", &strategy, counting_fetcher(&calls, "v"))
            .await
            .unwrap();

        assert_eq!(cache.invalidate_tags(&["period:7"]), 1);
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn test_tag_invalidation() {
        let cache = manager(10_000);
        cache.set("k1", "a".to_string(), &CacheStrategy::new().with_tag("x"));
        cache.set("k2", "b".to_string(), &CacheStrategy::new().with_tag("y"));

        assert_eq!(cache.invalidate_tags(&["x"]), 1);
        assert!(cache.get("k1").is_none());
        assert_eq!(cache.get("k2").as_deref(), Some("b"));
        assert_eq!(cache.stats().tag_count, 1);
    }

    #[test]
    fn test_overwrite_purges_stale_tags() {
        let cache = manager(10_000);
        cache.set("k1", "a".to_string(), &CacheStrategy::new().with_tag("x"));
        cache.set("k1", "b".to_string(), &CacheStrategy::new().with_tag("y"));

        assert_eq!(cache.invalidate_tags(&["x"]), 0);
        assert_eq!(cache.get("k1").as_deref(), Some("b"));
        assert_eq!(cache.stats().tag_count, 1);

        assert_eq!(cache.invalidate_tags(&["y"]), 1);
        assert_eq!(cache.stats().tag_count, 0);
    }

    #[test]
    fn test_invalidate_pattern() {
        let cache = manager(10_000);
        let strategy = CacheStrategy::new().with_tag("charts");
        cache.set("chart:1", "a".to_string(), &strategy);
        cache.set("chart:2", "b".to_string(), &strategy);
        cache.set("period:1", "c".to_string(), &CacheStrategy::new());

        assert_eq!(cache.invalidate_prefix("chart:"), 2);
        assert_eq!(cache.stats().entries, 1);
        assert_eq!(cache.stats().tag_count, 0);
        assert_eq!(cache.invalidate_pattern(|k| k.ends_with(":1")), 1);
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn test_eviction_unlinks_tags() {
        let cache: CacheManager<String> = CacheManager::with_estimator(
            CacheConfig {
                max_memory: Some(100),
                ..CacheConfig::default()
            },
            Arc::new(FixedSizeEstimator(40)),
        );
        cache.set("a", "1".to_string(), &CacheStrategy::new().with_tag("a-tag"));
        cache.set("b", "2".to_string(), &CacheStrategy::new().with_tag("b-tag"));
        cache.set("c", "3".to_string(), &CacheStrategy::new().with_tag("c-tag"));

        let stats = cache.stats();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.memory_usage, 80);
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.tag_count, 2);
        assert_eq!(cache.invalidate_tags(&["a-tag"]), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = CacheManager::<String>::new(CacheConfig {
            default_max_age_ms: 100,
            default_stale_window_ms: 50,
            ..CacheConfig::default()
        });
        cache.set("old", "a".to_string(), &CacheStrategy::new().with_tag("t"));
        tokio::time::advance(Duration::from_millis(120)).await;
        cache.set("new", "b".to_string(), &CacheStrategy::new());

        // "old" is stale but still inside its window
        assert_eq!(cache.purge_expired(), 0);
        assert_eq!(cache.get("old").as_deref(), Some("a"));

        tokio::time::advance(Duration::from_millis(40)).await;
        assert!(cache.get("old").is_none());
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.stats().tag_count, 0);
        assert_eq!(cache.get("new").as_deref(), Some("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_plain_get_uses_stored_windows() {
        let cache = manager(10_000);
        let short = CacheStrategy::new()
            .with_max_age(Duration::from_millis(50))
            .with_stale_window(Duration::ZERO);
        cache.set("k", "v".to_string(), &short);

        tokio::time::advance(Duration::from_millis(60)).await;
        assert!(cache.get("k").is_none());
        // Judged against the caller's windows instead
        assert_eq!(cache.get_with("k", &CacheStrategy::new()).as_deref(), Some("v"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_task_sweeps() {
        let cache = CacheManager::<String>::new(CacheConfig {
            default_max_age_ms: 100,
            default_stale_window_ms: 0,
            ..CacheConfig::default()
        });
        let handle = cache.spawn_cleanup(Duration::from_millis(50));
        cache.set("k", "v".to_string(), &CacheStrategy::new());

        tokio::time::sleep(Duration::from_millis(160)).await;
        assert_eq!(cache.stats().entries, 0);
        handle.abort();
    }

    #[test]
    fn test_clear_and_hit_rate() {
        let cache = manager(10_000);
        cache.set("k", "v".to_string(), &CacheStrategy::new().with_tag("t"));
        assert!(cache.get("k").is_some());
        assert!(cache.get("nope").is_none());
        assert_eq!(cache.stats().hit_rate(), 0.5);

        cache.clear();
        let stats = cache.stats();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.tag_count, 0);
        assert_eq!(stats.memory_usage, 0);
    }
}
