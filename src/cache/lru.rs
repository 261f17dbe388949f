//! Bounded LRU store.
//!
//! Evicts least-recently-used entries when either an item-count capacity or a
//! tracked memory budget is exceeded. When a memory budget is configured it is
//! authoritative and the item capacity is not enforced.
//!
//! Recency is tracked with a monotonically increasing access ordinal per
//! entry plus an ordered ordinal → key index, so picking the eviction victim
//! is a `pop_first` on the index.

use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use super::size::{FixedSizeEstimator, SizeEstimator};

/// Limits for an [`LruStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LruConfig {
    /// Maximum number of entries (ignored when `max_memory` is set)
    pub capacity: Option<usize>,
    /// Maximum tracked bytes
    pub max_memory: Option<usize>,
}

/// Point-in-time report of an [`LruStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LruStats {
    pub len: usize,
    pub capacity: Option<usize>,
    pub memory_usage: usize,
    pub max_memory: Option<usize>,
    pub evictions: u64,
}

struct Slot<V> {
    value: V,
    size: usize,
    ordinal: u64,
}

struct LruInner<K, V> {
    entries: HashMap<K, Slot<V>>,
    /// access ordinal -> key, oldest first
    order: BTreeMap<u64, K>,
    next_ordinal: u64,
    memory: usize,
    evictions: u64,
}

impl<K: Eq + Hash + Clone, V> LruInner<K, V> {
    fn tick(&mut self) -> u64 {
        self.next_ordinal += 1;
        self.next_ordinal
    }

    fn pop_lru(&mut self) -> Option<(K, V)> {
        let (_, key) = self.order.pop_first()?;
        let slot = self.entries.remove(&key)?;
        self.memory = self.memory.saturating_sub(slot.size);
        self.evictions += 1;
        Some((key, slot.value))
    }

    fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let slot = self.entries.remove(key)?;
        self.order.remove(&slot.ordinal);
        self.memory = self.memory.saturating_sub(slot.size);
        Some(slot.value)
    }
}

/// Thread-safe bounded LRU store.
///
/// All mutation happens under one lock, so an insert and the evictions it
/// causes are observed as a single step.
pub struct LruStore<K, V> {
    inner: Mutex<LruInner<K, V>>,
    config: LruConfig,
    estimator: Arc<dyn SizeEstimator<V>>,
}

impl<K, V> LruStore<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a store bounded by both limits in `config`.
    pub fn new(config: LruConfig, estimator: Arc<dyn SizeEstimator<V>>) -> Self {
        let config = LruConfig {
            capacity: config.capacity.map(|c| c.max(1)),
            ..config
        };
        Self {
            inner: Mutex::new(LruInner {
                entries: HashMap::new(),
                order: BTreeMap::new(),
                next_ordinal: 0,
                memory: 0,
                evictions: 0,
            }),
            config,
            estimator,
        }
    }

    /// Create a store bounded by item count only.
    pub fn with_capacity(capacity: usize) -> Self
    where
        V: 'static,
    {
        Self::new(
            LruConfig {
                capacity: Some(capacity),
                max_memory: None,
            },
            Arc::new(FixedSizeEstimator(0)),
        )
    }

    /// Create a store bounded by tracked bytes.
    pub fn with_memory_budget(max_memory: usize, estimator: Arc<dyn SizeEstimator<V>>) -> Self {
        Self::new(
            LruConfig {
                capacity: None,
                max_memory: Some(max_memory),
            },
            estimator,
        )
    }

    /// Get a value, marking it most recently used.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let slot = inner.entries.get_mut(key)?;
        inner.next_ordinal += 1;
        let ordinal = inner.next_ordinal;
        if let Some(k) = inner.order.remove(&slot.ordinal) {
            inner.order.insert(ordinal, k);
        }
        slot.ordinal = ordinal;
        Some(slot.value.clone())
    }

    /// Get a value without touching recency.
    pub fn peek<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.lock().entries.get(key).map(|s| s.value.clone())
    }

    /// Insert or replace a value.
    ///
    /// Returns the entries evicted to make room, least recently used first.
    /// A value larger than the whole memory budget is still admitted and ends
    /// up as the only resident.
    pub fn set(&self, key: K, value: V) -> Vec<(K, V)> {
        let size = self.estimator.estimate(&value);
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let ordinal = inner.tick();
        let mut evicted = Vec::new();

        if let Some(slot) = inner.entries.get_mut(&key) {
            inner.order.remove(&slot.ordinal);
            inner.memory = inner.memory.saturating_sub(slot.size) + size;
            slot.value = value;
            slot.size = size;
            slot.ordinal = ordinal;
            inner.order.insert(ordinal, key.clone());

            // The replaced key is the newest; evict older entries only.
            while self.over_budget(inner, 0, false) && inner.entries.len() > 1 {
                match inner.pop_lru() {
                    Some(entry) => evicted.push(entry),
                    None => break,
                }
            }
        } else {
            while self.over_budget(inner, size, true) {
                match inner.pop_lru() {
                    Some(entry) => evicted.push(entry),
                    None => break,
                }
            }
            inner.memory += size;
            inner.entries.insert(
                key.clone(),
                Slot {
                    value,
                    size,
                    ordinal,
                },
            );
            inner.order.insert(ordinal, key);
        }

        if !evicted.is_empty() {
            trace!(
                evicted = evicted.len(),
                memory = inner.memory,
                len = inner.entries.len(),
                "LRU eviction"
            );
        }
        evicted
    }

    /// Whether the store would exceed its limits after adding `incoming`
    /// bytes, plus one entry when `new_entry` is set.
    fn over_budget(&self, inner: &LruInner<K, V>, incoming: usize, new_entry: bool) -> bool {
        if let Some(max) = self.config.max_memory {
            return inner.memory + incoming > max;
        }
        match self.config.capacity {
            Some(cap) => inner.entries.len() + usize::from(new_entry) > cap,
            None => false,
        }
    }

    /// Check presence without touching recency.
    pub fn has<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.lock().entries.contains_key(key)
    }

    /// Remove a key. Returns whether it was present.
    pub fn delete<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.lock().remove(key).is_some()
    }

    /// Remove a key, returning its value.
    pub fn take<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.lock().remove(key)
    }

    /// Remove every entry matching `pred`, returning the removed entries.
    pub fn remove_where(&self, mut pred: impl FnMut(&K, &V) -> bool) -> Vec<(K, V)> {
        let mut guard = self.inner.lock();
        let doomed: Vec<K> = guard
            .entries
            .iter()
            .filter(|(k, slot)| pred(k, &slot.value))
            .map(|(k, _)| k.clone())
            .collect();
        doomed
            .into_iter()
            .filter_map(|k| guard.remove(&k).map(|v| (k, v)))
            .collect()
    }

    /// Remove all entries.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.order.clear();
        inner.memory = 0;
    }

    /// Keys ordered most recently used first.
    pub fn keys(&self) -> Vec<K> {
        self.inner.lock().order.values().rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.config.capacity
    }

    pub fn memory_usage(&self) -> usize {
        self.inner.lock().memory
    }

    pub fn max_memory(&self) -> Option<usize> {
        self.config.max_memory
    }

    pub fn stats(&self) -> LruStats {
        let inner = self.inner.lock();
        LruStats {
            len: inner.entries.len(),
            capacity: self.config.capacity,
            memory_usage: inner.memory,
            max_memory: self.config.max_memory,
            evictions: inner.evictions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn byte_store(max_memory: usize) -> LruStore<&'static str, Vec<u8>> {
        LruStore::with_memory_budget(max_memory, Arc::new(|v: &Vec<u8>| v.len()))
    }

    fn evicted_keys<V>(evicted: Vec<(&'static str, V)>) -> Vec<&'static str> {
        evicted.into_iter().map(|(k, _)| k).collect()
    }

    #[test]
    fn test_memory_eviction_order() {
        let store = byte_store(120);
        assert!(store.set("a", vec![0; 40]).is_empty());
        assert!(store.set("b", vec![0; 30]).is_empty());
        assert!(store.set("c", vec![0; 40]).is_empty());

        // 110 + 60 needs two victims: a first, then b
        let evicted = store.set("d", vec![0; 60]);
        assert_eq!(evicted_keys(evicted), vec!["a", "b"]);
        assert!(store.has("c"));
        assert!(store.has("d"));
        assert_eq!(store.memory_usage(), 100);
    }

    #[test]
    fn test_read_refreshes_recency() {
        let store: LruStore<&str, u32> = LruStore::with_capacity(3);
        store.set("a", 1);
        store.set("b", 2);
        store.set("c", 3);

        assert_eq!(store.get("a"), Some(1));
        let evicted = store.set("d", 4);

        assert_eq!(evicted_keys(evicted), vec!["b"]);
        assert!(store.has("a"));
        assert_eq!(store.keys(), vec!["d", "a", "c"]);
    }

    #[test]
    fn test_miss_has_no_side_effects() {
        let store: LruStore<&str, u32> = LruStore::with_capacity(2);
        store.set("a", 1);
        store.set("b", 2);
        let ordinal = store.inner.lock().next_ordinal;
        assert_eq!(store.get("zzz"), None);
        assert_eq!(store.keys(), vec!["b", "a"]);
        assert_eq!(store.inner.lock().next_ordinal, ordinal);
        assert_eq!(store.stats().evictions, 0);
    }

    #[test]
    fn test_replace_adjusts_memory() {
        let store = byte_store(100);
        store.set("a", vec![0; 10]);
        store.set("b", vec![0; 20]);
        store.set("a", vec![0; 50]);

        assert_eq!(store.memory_usage(), 70);
        assert_eq!(store.len(), 2);
        assert_eq!(store.keys(), vec!["a", "b"]);

        // growing "a" past the budget evicts the older "b", never "a" itself
        let evicted = store.set("a", vec![0; 90]);
        assert_eq!(evicted_keys(evicted), vec!["b"]);
        assert_eq!(store.memory_usage(), 90);
    }

    #[test]
    fn test_oversized_value_becomes_sole_resident() {
        let store = byte_store(50);
        store.set("a", vec![0; 20]);
        store.set("b", vec![0; 20]);

        let evicted = store.set("huge", vec![0; 500]);
        assert_eq!(evicted.len(), 2);
        assert_eq!(store.keys(), vec!["huge"]);
        assert_eq!(store.memory_usage(), 500);
    }

    #[test]
    fn test_memory_budget_is_authoritative() {
        let store: LruStore<u32, Vec<u8>> = LruStore::new(
            LruConfig {
                capacity: Some(2),
                max_memory: Some(1000),
            },
            Arc::new(|v: &Vec<u8>| v.len()),
        );
        for i in 0..5 {
            store.set(i, vec![0; 10]);
        }
        assert_eq!(store.len(), 5);
        assert_eq!(store.stats().max_memory, Some(1000));
    }

    #[test]
    fn test_delete_and_clear() {
        let store = byte_store(100);
        store.set("a", vec![0; 10]);
        store.set("b", vec![0; 10]);

        assert!(store.delete("a"));
        assert!(!store.delete("a"));
        assert_eq!(store.memory_usage(), 10);

        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.memory_usage(), 0);
    }

    #[test]
    fn test_remove_where() {
        let store: LruStore<String, u32> = LruStore::with_capacity(10);
        store.set("chart:1".to_string(), 1);
        store.set("chart:2".to_string(), 2);
        store.set("period:1".to_string(), 3);

        let removed = store.remove_where(|k, _| k.starts_with("chart:"));
        assert_eq!(removed.len(), 2);
        assert_eq!(store.keys(), vec!["period:1".to_string()]);
    }

    #[test]
    fn test_concurrent_sets_respect_budget() {
        let store = Arc::new(LruStore::<u32, Vec<u8>>::with_memory_budget(
            1000,
            Arc::new(|v: &Vec<u8>| v.len()),
        ));

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..200 {
                        store.set(t * 1000 + i, vec![0; 30]);
                        assert!(store.memory_usage() <= 1000);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stats = store.stats();
        assert_eq!(stats.memory_usage, stats.len * 30);
        assert!(stats.memory_usage <= 1000);
    }
}
