//! Process-wide keyed store with per-entry expiry.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;

use crate::clock::SharedClock;
use crate::observability::metrics;

/// A cached payload. Never mutated after insertion.
#[derive(Debug, Clone)]
struct CacheEntry {
    value: Arc<Value>,
    created_at: Instant,
    ttl: Duration,
    size_bytes: usize,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) >= self.ttl
    }
}

/// Result of an expired-entry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearReport {
    pub deleted_count: usize,
    pub reclaimed_bytes: usize,
    pub dry_run: bool,
}

/// Size and content snapshot of the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSnapshot {
    pub entries: usize,
    pub expired: usize,
    pub approximate_bytes: usize,
}

/// A thread-safe TTL cache for upstream payloads.
#[derive(Debug, Clone)]
pub struct TtlCache {
    inner: Arc<DashMap<String, CacheEntry>>,
    clock: SharedClock,
}

impl TtlCache {
    /// Create a new empty cache.
    pub fn new(clock: SharedClock) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            clock,
        }
    }

    /// Look up a live entry. Expired entries read as misses and stay until swept.
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = self.clock.now();
        self.inner
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| Value::clone(&entry.value))
    }

    /// Insert or replace an entry; the new entry fully overwrites the old one.
    pub fn set(&self, key: &str, value: Value, ttl: Duration) {
        let size_bytes = serde_json::to_vec(&value).map(|v| v.len()).unwrap_or(0);
        let entry = CacheEntry {
            value: Arc::new(value),
            created_at: self.clock.now(),
            ttl,
            size_bytes,
        };
        self.inner.insert(key.to_string(), entry);
        metrics::record_cache_size(self.inner.len());
    }

    /// Remove an entry. Returns whether one existed.
    pub fn invalidate(&self, key: &str) -> bool {
        let removed = self.inner.remove(key).is_some();
        if removed {
            metrics::record_cache_size(self.inner.len());
        }
        removed
    }

    /// Remove expired entries, or only count them when `dry_run` is set.
    pub fn clear_expired(&self, dry_run: bool) -> ClearReport {
        let now = self.clock.now();
        let expired: Vec<(String, usize)> = self
            .inner
            .iter()
            .filter(|entry| entry.value().is_expired(now))
            .map(|entry| (entry.key().clone(), entry.value().size_bytes))
            .collect();

        let mut report = ClearReport {
            dry_run,
            ..ClearReport::default()
        };

        if dry_run {
            report.deleted_count = expired.len();
            report.reclaimed_bytes = expired.iter().map(|(_, size)| size).sum();
            return report;
        }

        for (key, _) in expired {
            // Re-check: the entry may have been refreshed since the scan.
            if let Some((_, entry)) = self.inner.remove_if(&key, |_, e| e.is_expired(now)) {
                report.deleted_count += 1;
                report.reclaimed_bytes += entry.size_bytes;
            }
        }

        metrics::record_cache_size(self.inner.len());
        if report.deleted_count > 0 {
            tracing::info!(
                deleted = report.deleted_count,
                reclaimed_bytes = report.reclaimed_bytes,
                "Cleared expired cache entries"
            );
        }
        report
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.inner.clear();
        metrics::record_cache_size(0);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        let now = self.clock.now();
        let mut snapshot = CacheSnapshot::default();
        for entry in self.inner.iter() {
            snapshot.entries += 1;
            snapshot.approximate_bytes += entry.size_bytes;
            if entry.is_expired(now) {
                snapshot.expired += 1;
            }
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde_json::json;

    fn cache() -> (TtlCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (TtlCache::new(clock.clone()), clock)
    }

    #[test]
    fn test_entry_expires_after_ttl() {
        let (cache, clock) = cache();
        cache.set("fx:eur", json!({"rate": 1.08}), Duration::from_secs(300));

        clock.advance(Duration::from_secs(299));
        assert_eq!(cache.get("fx:eur"), Some(json!({"rate": 1.08})));

        clock.advance(Duration::from_secs(2));
        assert_eq!(cache.get("fx:eur"), None);
    }

    #[test]
    fn test_set_overwrites() {
        let (cache, clock) = cache();
        cache.set("k", json!(1), Duration::from_secs(10));
        clock.advance(Duration::from_secs(8));
        cache.set("k", json!(2), Duration::from_secs(10));
        clock.advance(Duration::from_secs(8));

        assert_eq!(cache.get("k"), Some(json!(2)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_invalidate() {
        let (cache, _) = cache();
        cache.set("k", json!("v"), Duration::from_secs(10));
        assert!(cache.invalidate("k"));
        assert!(!cache.invalidate("k"));
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn test_clear_expired_dry_run() {
        let (cache, clock) = cache();
        cache.set("short", json!("abcd"), Duration::from_secs(1));
        cache.set("long", json!("efgh"), Duration::from_secs(100));
        clock.advance(Duration::from_secs(5));

        let report = cache.clear_expired(true);
        assert_eq!(report.deleted_count, 1);
        assert_eq!(report.reclaimed_bytes, "\"abcd\"".len());
        assert!(report.dry_run);
        assert_eq!(cache.len(), 2);

        let report = cache.clear_expired(false);
        assert_eq!(report.deleted_count, 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("long").is_some());
    }

    #[test]
    fn test_snapshot() {
        let (cache, clock) = cache();
        cache.set("a", json!([1, 2, 3]), Duration::from_secs(1));
        cache.set("b", json!(null), Duration::from_secs(60));
        clock.advance(Duration::from_secs(2));

        let snapshot = cache.snapshot();
        assert_eq!(snapshot.entries, 2);
        assert_eq!(snapshot.expired, 1);
        assert_eq!(snapshot.approximate_bytes, "[1,2,3]".len() + "null".len());
    }
}
