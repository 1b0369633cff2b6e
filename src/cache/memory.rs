use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Share of entries dropped when the tier is full
const EVICTION_DIVISOR: usize = 5;

/// Result of a memory tier lookup
#[derive(Debug, PartialEq)]
pub(crate) enum Lookup<V> {
    Hit(V),
    /// The entry existed but had outlived its TTL; it has been removed
    Expired,
    Miss,
}

struct Entry<V> {
    value: V,
    expires_at: Instant,
    seq: u64,
}

struct Entries<V> {
    map: HashMap<String, Entry<V>>,
    next_seq: u64,
}

/// Bounded in-process tier with per-entry expiry.
///
/// Every read-modify-write sequence on the map happens under one lock.
/// When a new key arrives at capacity the oldest-inserted fifth of the
/// entries (at least one) is evicted as a batch.
pub(crate) struct MemoryTier<V> {
    entries: Mutex<Entries<V>>,
    capacity: usize,
    ttl: Duration,
}

impl<V: Clone> MemoryTier<V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(Entries {
                map: HashMap::new(),
                next_seq: 0,
            }),
            capacity: capacity.max(1),
            ttl,
        }
    }

    pub fn get(&self, key: &str) -> Lookup<V> {
        let mut entries = self.entries.lock();
        let now = Instant::now();

        match entries.map.get(key) {
            None => Lookup::Miss,
            Some(entry) if entry.expires_at <= now => {
                entries.map.remove(key);
                Lookup::Expired
            }
            Some(entry) => Lookup::Hit(entry.value.clone()),
        }
    }

    /// Insert or replace an entry, returning how many entries were evicted.
    ///
    /// Replacing a key moves it to the young end of the eviction order.
    pub fn insert(&self, key: &str, value: V) -> usize {
        self.insert_with_ttl(key, value, self.ttl)
    }

    /// Insert with a lifetime shorter than the tier default
    pub fn insert_with_ttl(&self, key: &str, value: V, ttl: Duration) -> usize {
        let mut entries = self.entries.lock();

        let evicted = if !entries.map.contains_key(key) && entries.map.len() >= self.capacity {
            Self::evict_oldest(&mut entries)
        } else {
            0
        };

        let seq = entries.next_seq;
        entries.next_seq += 1;
        entries.map.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl.min(self.ttl),
                seq,
            },
        );

        evicted
    }

    fn evict_oldest(entries: &mut Entries<V>) -> usize {
        let count = (entries.map.len() / EVICTION_DIVISOR).max(1);

        let mut order: Vec<(u64, String)> = entries
            .map
            .iter()
            .map(|(key, entry)| (entry.seq, key.clone()))
            .collect();

        if count < order.len() {
            order.select_nth_unstable(count - 1);
            order.truncate(count);
        }

        for (_, key) in &order {
            entries.map.remove(key);
        }
        order.len()
    }

    pub fn remove(&self, key: &str) -> bool {
        self.entries.lock().map.remove(key).is_some()
    }

    pub fn remove_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.map.len();
        entries.map.retain(|key, _| !key.starts_with(prefix));
        before - entries.map.len()
    }

    /// Drop every expired entry
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        let before = entries.map.len();
        entries.map.retain(|_, entry| entry.expires_at > now);
        before - entries.map.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
