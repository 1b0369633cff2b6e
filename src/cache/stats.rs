use super::RemoteStatus;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Running counters of one cache
#[derive(Debug, Default)]
pub(crate) struct CacheStats {
    pub hits: AtomicU64,
    pub remote_hits: AtomicU64,
    pub misses: AtomicU64,
    pub expirations: AtomicU64,
    pub sets: AtomicU64,
    pub invalidations: AtomicU64,
    pub evictions: AtomicU64,
}

impl CacheStats {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn snapshot(
        &self,
        memory_size: usize,
        memory_capacity: usize,
        remote: RemoteStatus,
    ) -> CacheStatsSnapshot {
        let hits = self.hits.load(Ordering::Relaxed);
        let remote_hits = self.remote_hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + remote_hits + misses;

        CacheStatsSnapshot {
            hits,
            remote_hits,
            misses,
            expirations: self.expirations.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            hit_rate: if lookups == 0 {
                0.0
            } else {
                (hits + remote_hits) as f64 / lookups as f64
            },
            memory_size,
            memory_capacity,
            remote,
        }
    }
}

/// Point-in-time view of cache activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStatsSnapshot {
    /// Served from the memory tier
    pub hits: u64,
    /// Served from the remote tier after a memory miss
    pub remote_hits: u64,
    pub misses: u64,
    /// Memory entries found past their TTL on read
    pub expirations: u64,
    pub sets: u64,
    pub invalidations: u64,
    pub evictions: u64,
    pub hit_rate: f64,
    pub memory_size: usize,
    pub memory_capacity: usize,
    pub remote: RemoteStatus,
}
