//! Shared fetch cache: per-period request deduplication.
//!
//! The cache stores the in-flight computation itself, a
//! [`Shared`](futures::future::Shared) future, not its resolved value.
//! Callers asking for the same key within the TTL get a clone of the same
//! future and therefore the same outcome, including the same failure.
//!
//! ```text
//! Chart A ─┐
//!          ├──► SharedFetchCache ──(one fetcher call)──► PeriodDataProvider
//! Chart B ─┘         │
//!                    └── both await the same Shared<BoxFuture<..>>
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::chart::AxisMode;
use crate::error::FetchError;

/// Outcome of a period fetch
pub type FetchResult<T> = Result<T, FetchError>;

/// A fetch that may still be running; clones resolve to the same result.
pub type SharedFetch<T> = Shared<BoxFuture<'static, FetchResult<T>>>;

/// Identity of a fetch: axis mode, period, parameter set and signature.
///
/// Parameters are sorted and de-duplicated so their order does not matter;
/// the signature is kept verbatim so Y-parameter reorderings still miss.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchKey {
    pub axis_mode: Option<AxisMode>,
    pub period: String,
    pub parameters: Vec<String>,
    pub signature: String,
}

impl FetchKey {
    pub fn new(
        period: &str,
        parameters: &[String],
        axis_mode: Option<AxisMode>,
        signature: Option<&str>,
    ) -> Self {
        let mut parameters = parameters.to_vec();
        parameters.sort();
        parameters.dedup();
        Self {
            axis_mode,
            period: period.to_string(),
            parameters,
            signature: signature.unwrap_or_default().to_string(),
        }
    }
}

impl fmt::Display for FetchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let axis = self.axis_mode.map(AxisMode::as_str).unwrap_or("any");
        write!(
            f,
            "{}|{}|{}|{}",
            axis,
            self.period,
            self.parameters.join(","),
            self.signature
        )
    }
}

struct FetchRecord<T: Clone> {
    fetch: SharedFetch<T>,
    created_at: Instant,
}

/// Fetch cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchCacheStats {
    pub records: usize,
    /// Requests that joined an existing fetch
    pub hits: u64,
    /// Requests that started a fetch
    pub misses: u64,
}

/// Deduplicating cache of in-flight and recently completed fetches.
pub struct SharedFetchCache<T: Clone> {
    records: Mutex<HashMap<FetchKey, FetchRecord<T>>>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<T> SharedFetchCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the fetch for this key, starting one with `fetcher` when no
    /// record younger than the TTL exists.
    ///
    /// `fetcher` only builds the future; it runs when the returned handle is
    /// first awaited. It is called with the cache locked and must not call
    /// back into this cache.
    pub fn get<F, Fut>(
        &self,
        period: &str,
        parameters: &[String],
        axis_mode: Option<AxisMode>,
        signature: Option<&str>,
        fetcher: F,
    ) -> SharedFetch<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchResult<T>> + Send + 'static,
    {
        let key = FetchKey::new(period, parameters, axis_mode, signature);
        let now = Instant::now();
        let mut records = self.records.lock();

        let before = records.len();
        records.retain(|_, record| now.saturating_duration_since(record.created_at) < self.ttl);
        if records.len() < before {
            trace!(expired = before - records.len(), "Swept expired fetch records");
        }

        if let Some(record) = records.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Joining cached fetch");
            return record.fetch.clone();
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, "Starting period fetch");
        let fetch = fetcher().boxed().shared();
        records.insert(
            key,
            FetchRecord {
                fetch: fetch.clone(),
                created_at: now,
            },
        );
        fetch
    }

    /// Drop every record.
    pub fn clear(&self) {
        self.records.lock().clear();
    }

    /// Drop every record fetched for `period`, whatever its axis mode or
    /// signature. Returns the number dropped.
    pub fn clear_for_period(&self, period: &str) -> usize {
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|key, _| key.period != period);
        before - records.len()
    }

    /// Drop every record fetched for any of `periods`.
    pub fn clear_for_sources<S: AsRef<str>>(&self, periods: &[S]) -> usize {
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|key, _| !periods.iter().any(|p| p.as_ref() == key.period));
        before - records.len()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn stats(&self) -> FetchCacheStats {
        FetchCacheStats {
            records: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    type Rows = Arc<Vec<i64>>;

    fn params(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn slow_rows(
        calls: &Arc<AtomicUsize>,
        rows: Vec<i64>,
    ) -> impl FnOnce() -> BoxFuture<'static, FetchResult<Rows>> {
        let calls = Arc::clone(calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(Arc::new(rows))
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_requests_share_one_fetch() {
        let cache = SharedFetchCache::<Rows>::new(Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));

        let first = cache.get(
            "p1",
            &params(&["a", "b"]),
            None,
            Some("sig"),
            slow_rows(&calls, vec![1]),
        );
        let second = cache.get(
            "p1",
            &params(&["a", "b"]),
            None,
            Some("sig"),
            slow_rows(&calls, vec![2]),
        );

        let (a, b) = tokio::join!(first, second);
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(*a, vec![1]);
        assert_eq!(cache.stats().hits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parameter_order_is_ignored() {
        let cache = SharedFetchCache::<Rows>::new(Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));

        let _ = cache.get(
            "p1",
            &params(&["b", "a"]),
            Some(AxisMode::Datetime),
            Some("s"),
            slow_rows(&calls, vec![]),
        );
        let _ = cache.get(
            "p1",
            &params(&["a", "b", "a"]),
            Some(AxisMode::Datetime),
            Some("s"),
            slow_rows(&calls, vec![]),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_signature_change_forces_fetch() {
        let cache = SharedFetchCache::<Rows>::new(Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));
        let names = params(&["temp", "pressure"]);

        let _ = cache.get(
            "p1",
            &names,
            Some(AxisMode::Datetime),
            Some("line:temp|line:pressure"),
            slow_rows(&calls, vec![]),
        );
        let _ = cache.get(
            "p1",
            &names,
            Some(AxisMode::Datetime),
            Some("line:pressure|line:temp"),
            slow_rows(&calls, vec![]),
        );
        let _ = cache.get(
            "p1",
            &names,
            Some(AxisMode::Datetime),
            Some("scatter:temp|line:pressure"),
            slow_rows(&calls, vec![]),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_record_refetches_and_is_swept() {
        let cache = SharedFetchCache::<Rows>::new(Duration::from_millis(100));
        let calls = Arc::new(AtomicUsize::new(0));

        cache.get("p1", &params(&["a"]), None, None, slow_rows(&calls, vec![1])).await.unwrap();
        cache.get("p2", &params(&["a"]), None, None, slow_rows(&calls, vec![2])).await.unwrap();
        assert_eq!(cache.len(), 2);

        tokio::time::advance(Duration::from_millis(150)).await;
        let rows = cache
            .get("p1", &params(&["a"]), None, None, slow_rows(&calls, vec![3]))
            .await
            .unwrap();

        assert_eq!(*rows, vec![3]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // p2 was swept by the last request
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_shared_but_not_kept_past_ttl() {
        let cache = SharedFetchCache::<Rows>::new(Duration::from_millis(100));
        let calls = Arc::new(AtomicUsize::new(0));
        let failing = || {
            let calls = Arc::clone(&calls);
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<Rows, _>(FetchError::Provider {
                        period: "p1".to_string(),
                        message: "boom".to_string(),
                    })
                }
                .boxed()
            }
        };

        let first = cache.get("p1", &params(&["a"]), None, None, failing());
        let second = cache.get("p1", &params(&["a"]), None, None, failing());
        let (a, b) = tokio::join!(first, second);
        assert_eq!(a.unwrap_err(), b.unwrap_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_millis(100)).await;
        let retry = cache.get("p1", &params(&["a"]), None, None, slow_rows(&calls, vec![9]));
        assert_eq!(*retry.await.unwrap(), vec![9]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_clear_for_period_ignores_prefix_and_suffix() {
        let cache = SharedFetchCache::<Rows>::new(Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));
        let names = params(&["a"]);

        let _ = cache.get(
            "p1",
            &names,
            Some(AxisMode::Datetime),
            Some("x"),
            slow_rows(&calls, vec![]),
        );
        let _ = cache.get(
            "p1",
            &names,
            Some(AxisMode::Parameter),
            Some("y|z"),
            slow_rows(&calls, vec![]),
        );
        let _ = cache.get(
            "p10",
            &names,
            Some(AxisMode::Datetime),
            Some("p1"),
            slow_rows(&calls, vec![]),
        );
        let _ = cache.get("p2", &names, None, None, slow_rows(&calls, vec![]));

        assert_eq!(cache.clear_for_period("p1"), 2);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.clear_for_sources(&["p10", "p2", "p3"]), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_key_display() {
        let key = FetchKey::new("p1", &params(&["b", "a"]), Some(AxisMode::Time), Some("line:a"));
        assert_eq!(key.to_string(), "time|p1|a,b|line:a");
    }
}
