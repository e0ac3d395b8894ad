//! Aggregate Cache
//!
//! Memoizes chart, list and count results per (shape, window, filter). One
//! coarse lock guards the map; computation runs outside it.
//!
//! # Invalidation
//!
//! ```text
//! insert event at t:
//!   drop every entry whose window contains t
//!   drop every open ("up to now") entry
//!   bump epoch
//!
//! compute on miss:
//!   read epoch → compute → store only if epoch unchanged
//! ```
//!
//! The epoch check keeps a result computed against pre-insert data from being
//! stored after the insert's invalidation already ran.
//!
//! Open windows are also stale once "now" moves: an entry remembers the end
//! it was computed for and is only served to lookups resolved to that end.

pub mod key;

pub use key::{CacheKey, CachedValue, QueryShape, WindowKey};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// When disabled every query is computed directly
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Maximum number of cached aggregates; least recently used go first
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

fn default_enabled() -> bool {
    true
}

fn default_max_entries() -> usize {
    4096
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_entries: default_max_entries(),
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub enabled: bool,
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub invalidated: u64,
}

struct CacheEntry {
    value: CachedValue,
    /// Resolved window end the value was computed for
    end: i64,
    last_used: AtomicU64,
}

/// Memoization layer for read-side aggregates
pub struct CacheLayer {
    config: CacheConfig,
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    /// Bumped by every invalidation
    epoch: AtomicU64,
    /// Logical clock for LRU
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidated: AtomicU64,
}

impl CacheLayer {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
            epoch: AtomicU64::new(0),
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidated: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled && self.config.max_entries > 0
    }

    /// Look up a cached value
    pub async fn get(&self, key: &CacheKey) -> Option<CachedValue> {
        if !self.is_enabled() {
            return None;
        }

        let entries = self.entries.read().await;
        let entry = entries.get(key).filter(|entry| entry.end == key.end)?;
        entry
            .last_used
            .store(self.clock.fetch_add(1, Ordering::Relaxed), Ordering::Relaxed);
        Some(entry.value.clone())
    }

    /// Return the cached value for `key`, computing and storing it on a miss
    ///
    /// Errors from `compute` are returned as-is and never cached.
    pub async fn get_or_compute<F, Fut, E>(&self, key: CacheKey, compute: F) -> Result<CachedValue, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CachedValue, E>>,
    {
        if !self.is_enabled() {
            return compute().await;
        }

        if let Some(value) = self.get(&key).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(shape = ?key.shape, since = key.window.since, "Cache hit");
            return Ok(value);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(shape = ?key.shape, since = key.window.since, "Cache miss - computing");

        let epoch = self.epoch.load(Ordering::SeqCst);
        let value = compute().await?;

        let mut entries = self.entries.write().await;
        if self.epoch.load(Ordering::SeqCst) != epoch {
            debug!(shape = ?key.shape, "Discarding result computed across an invalidation");
            return Ok(value);
        }

        if !entries.contains_key(&key) && entries.len() >= self.config.max_entries {
            evict_least_recent(&mut entries);
        }
        let end = key.end;
        entries.insert(
            key,
            CacheEntry {
                value: value.clone(),
                end,
                last_used: AtomicU64::new(self.clock.fetch_add(1, Ordering::Relaxed)),
            },
        );

        Ok(value)
    }

    /// Drop every entry a new event at `time` could change
    ///
    /// Returns the number of entries removed.
    pub async fn invalidate(&self, time: i64) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !key.window.affected_by(time));
        self.epoch.fetch_add(1, Ordering::SeqCst);

        let removed = before - entries.len();
        self.invalidated.fetch_add(removed as u64, Ordering::Relaxed);
        debug!(time, removed, remaining = entries.len(), "Cache invalidated");
        removed
    }

    /// Drop everything
    pub async fn invalidate_all(&self) -> usize {
        let mut entries = self.entries.write().await;
        let removed = entries.len();
        entries.clear();
        self.epoch.fetch_add(1, Ordering::SeqCst);

        self.invalidated.fetch_add(removed as u64, Ordering::Relaxed);
        info!(removed, "Cache cleared");
        removed
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            enabled: self.is_enabled(),
            entries: self.len().await,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidated: self.invalidated.load(Ordering::Relaxed),
        }
    }
}

impl Default for CacheLayer {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

fn evict_least_recent(entries: &mut HashMap<CacheKey, CacheEntry>) {
    let oldest = entries
        .iter()
        .min_by_key(|(_, entry)| entry.last_used.load(Ordering::Relaxed))
        .map(|(key, _)| key.clone());

    if let Some(key) = oldest {
        entries.remove(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::TimeWindow;
    use std::sync::atomic::AtomicUsize;

    type TestResult = Result<CachedValue, String>;

    async fn count_through(cache: &CacheLayer, key: CacheKey, value: u64, calls: &AtomicUsize) -> u64 {
        cache
            .get_or_compute(key, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                TestResult::Ok(CachedValue::Count(value))
            })
            .await
            .unwrap()
            .into_count()
            .unwrap()
    }

    #[tokio::test]
    async fn test_hit_after_miss() {
        let cache = CacheLayer::default();
        let calls = AtomicUsize::new(0);
        let key = CacheKey::scrobble_count(&TimeWindow::new(0, 100), None);

        assert_eq!(count_through(&cache, key.clone(), 7, &calls).await, 7);
        assert_eq!(count_through(&cache, key, 8, &calls).await, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[tokio::test]
    async fn test_invalidate_only_touches_affected_windows() {
        let cache = CacheLayer::default();
        let calls = AtomicUsize::new(0);

        let january = CacheKey::artist_chart(&TimeWindow::new(0, 100));
        let february = CacheKey::artist_chart(&TimeWindow::new(100, 200));
        let alltime = CacheKey::artist_chart(&TimeWindow::open_ended(0, 500));

        for key in [&january, &february, &alltime] {
            count_through(&cache, key.clone(), 1, &calls).await;
        }
        assert_eq!(cache.len().await, 3);

        let removed = cache.invalidate(150).await;
        assert_eq!(removed, 2);
        assert!(cache.get(&january).await.is_some());
        assert!(cache.get(&february).await.is_none());
        assert!(cache.get(&alltime).await.is_none());
    }

    #[tokio::test]
    async fn test_result_computed_across_invalidation_is_not_stored() {
        let cache = CacheLayer::default();
        let key = CacheKey::scrobble_count(&TimeWindow::new(0, 100), None);

        let value = cache
            .get_or_compute(key.clone(), || async {
                cache.invalidate(50).await;
                TestResult::Ok(CachedValue::Count(1))
            })
            .await
            .unwrap();

        assert_eq!(value, CachedValue::Count(1));
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let cache = CacheLayer::default();
        let key = CacheKey::scrobble_count(&TimeWindow::new(0, 100), None);

        let result = cache
            .get_or_compute(key.clone(), || async { TestResult::Err("store down".to_string()) })
            .await;
        assert_eq!(result, Err("store down".to_string()));
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_disabled_cache_always_computes() {
        let cache = CacheLayer::new(CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        });
        let calls = AtomicUsize::new(0);
        let key = CacheKey::scrobble_count(&TimeWindow::new(0, 100), None);

        count_through(&cache, key.clone(), 1, &calls).await;
        count_through(&cache, key, 1, &calls).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty().await);
        assert!(!cache.stats().await.enabled);
    }

    #[tokio::test]
    async fn test_evicts_least_recently_used() {
        let cache = CacheLayer::new(CacheConfig {
            enabled: true,
            max_entries: 2,
        });
        let calls = AtomicUsize::new(0);
        let a = CacheKey::scrobble_count(&TimeWindow::new(0, 100), None);
        let b = CacheKey::scrobble_count(&TimeWindow::new(100, 200), None);
        let c = CacheKey::scrobble_count(&TimeWindow::new(200, 300), None);

        count_through(&cache, a.clone(), 1, &calls).await;
        count_through(&cache, b.clone(), 2, &calls).await;
        assert!(cache.get(&a).await.is_some());
        count_through(&cache, c.clone(), 3, &calls).await;

        assert_eq!(cache.len().await, 2);
        assert!(cache.get(&a).await.is_some());
        assert!(cache.get(&b).await.is_none());
        assert!(cache.get(&c).await.is_some());
    }

    #[tokio::test]
    async fn test_open_window_recomputed_once_now_moves() {
        let cache = CacheLayer::default();
        let calls = AtomicUsize::new(0);
        let earlier = CacheKey::scrobble_count(&TimeWindow::open_ended(0, 500), None);
        let later = CacheKey::scrobble_count(&TimeWindow::open_ended(0, 504), None);

        assert_eq!(count_through(&cache, earlier.clone(), 1, &calls).await, 1);
        assert_eq!(count_through(&cache, earlier, 9, &calls).await, 1);
        assert_eq!(count_through(&cache, later.clone(), 2, &calls).await, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // Replaced in place rather than growing a slot per second
        assert_eq!(cache.len().await, 1);
        assert!(cache.get(&later).await.is_some());
    }

    #[tokio::test]
    async fn test_windows_sharing_a_start_do_not_collide() {
        let cache = CacheLayer::default();
        let calls = AtomicUsize::new(0);
        let month = CacheKey::scrobble_count(&TimeWindow::new(100, 1_000), None);
        let since_month = CacheKey::scrobble_count(&TimeWindow::open_ended(100, 500), None);

        assert_eq!(count_through(&cache, month, 2, &calls).await, 2);
        assert_eq!(count_through(&cache, since_month, 1, &calls).await, 1);
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn test_invalidate_all() {
        let cache = CacheLayer::default();
        let calls = AtomicUsize::new(0);
        count_through(&cache, CacheKey::artist_chart(&TimeWindow::new(0, 10)), 1, &calls).await;
        count_through(&cache, CacheKey::track_chart(&TimeWindow::new(0, 10), None), 1, &calls).await;

        assert_eq!(cache.invalidate_all().await, 2);
        assert!(cache.is_empty().await);
        assert_eq!(cache.stats().await.invalidated, 2);
    }
}
