//! Hit and miss accounting for a [`Cache`](crate::Cache)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lookup counters, safe to bump from any thread
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    /// Create zeroed counters
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one lookup that found a result
    pub fn add_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one lookup that found nothing
    pub fn add_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Lookups that found a result
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Lookups that found nothing
    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// All lookups
    #[must_use]
    pub fn total(&self) -> u64 {
        self.hits() + self.misses()
    }

    /// Copy the counters for reporting
    #[must_use]
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        let hits = self.hits();
        let misses = self.misses();
        CacheStatsSnapshot {
            hits,
            misses,
            total: hits + misses,
        }
    }
}

/// Point-in-time copy of [`CacheStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStatsSnapshot {
    /// Lookups that found a result
    pub hits: u64,
    /// Lookups that found nothing
    pub misses: u64,
    /// All lookups
    pub total: u64,
}

impl CacheStatsSnapshot {
    /// Fraction of lookups that hit (0.0 - 1.0)
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.hits as f64 / self.total as f64
    }
}

impl fmt::Display for CacheStatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hits={} misses={} total={}",
            self.hits, self.misses, self.total
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_at_zero() {
        let stats = CacheStats::new();
        assert_eq!((stats.hits(), stats.misses(), stats.total()), (0, 0, 0));
    }

    #[test]
    fn test_counts() {
        let stats = CacheStats::new();
        stats.add_miss();
        stats.add_hit();
        stats.add_hit();
        assert_eq!(stats.hits(), 2);
        assert_eq!(stats.misses(), 1);
        assert_eq!(stats.total(), 3);
    }

    #[test]
    fn test_snapshot() {
        let stats = CacheStats::new();
        stats.add_hit();
        stats.add_hit();
        stats.add_hit();
        stats.add_miss();
        let snapshot = stats.snapshot();
        assert_eq!(
            snapshot,
            CacheStatsSnapshot {
                hits: 3,
                misses: 1,
                total: 4
            }
        );
        assert!((snapshot.hit_rate() - 0.75).abs() < 0.001);
        assert_eq!(snapshot.to_string(), "hits=3 misses=1 total=4");

        // Later updates do not leak into an earlier snapshot
        stats.add_miss();
        assert_eq!(snapshot.misses, 1);
    }

    #[test]
    fn test_hit_rate_zero() {
        assert!(CacheStats::new().snapshot().hit_rate().abs() < f64::EPSILON);
    }

    #[test]
    fn test_snapshot_serializes() {
        let stats = CacheStats::new();
        stats.add_miss();
        let json = serde_json::to_value(stats.snapshot()).unwrap();
        assert_eq!(json, serde_json::json!({"hits": 0, "misses": 1, "total": 1}));
    }

    #[test]
    fn test_concurrent_updates() {
        let stats = CacheStats::new();
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..250 {
                        stats.add_hit();
                        stats.add_miss();
                    }
                });
            }
        });
        assert_eq!(stats.hits(), 1000);
        assert_eq!(stats.total(), 2000);
    }
}
