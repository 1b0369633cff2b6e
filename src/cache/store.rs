use super::health::{RemoteHealth, RemoteStatus};
use super::memory::{Lookup, MemoryTier};
use super::stats::{CacheStats, CacheStatsSnapshot};
use super::{CacheError, CacheResult, RemoteTier};
use crate::config::CacheConfig;
use crate::metrics::SEARCH_METRICS;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Tuning of a single cache instance
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Label used in logs and metrics
    pub name: String,
    pub ttl: Duration,
    pub max_items: usize,
    /// Budget for one remote read, write or delete
    pub remote_timeout: Duration,
    /// Budget for a (re)connection attempt
    pub connect_timeout: Duration,
    /// Minimum delay between reconnection attempts while degraded
    pub reconnect_interval: Duration,
}

impl CacheOptions {
    pub fn new(name: impl Into<String>, ttl: Duration, max_items: usize) -> Self {
        let defaults = CacheConfig::default();
        Self {
            name: name.into(),
            ttl,
            max_items,
            remote_timeout: defaults.remote_timeout(),
            connect_timeout: defaults.connect_timeout(),
            reconnect_interval: defaults.reconnect_interval(),
        }
    }

    pub fn from_config(name: impl Into<String>, config: &CacheConfig) -> Self {
        Self {
            name: name.into(),
            ttl: config.ttl(),
            max_items: config.max_items,
            remote_timeout: config.remote_timeout(),
            connect_timeout: config.connect_timeout(),
            reconnect_interval: config.reconnect_interval(),
        }
    }

    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }
}

/// Payload stored in the remote tier. The absolute expiry lets a reader
/// keep the entry locally only for the lifetime it has left.
#[derive(Serialize, Deserialize)]
struct RemoteEntry<T> {
    expires_at: DateTime<Utc>,
    value: T,
}

/// Ordering state of the remote writes for one key.
///
/// `generation` moves forward on every set or invalidate. A background
/// write only goes out if no newer operation on the key was issued, and
/// deletes wait behind a write that is already on the wire.
#[derive(Default)]
struct KeySlot {
    generation: AtomicU64,
    order: AsyncMutex<()>,
}

/// Remote tier together with its health state
struct RemoteLink {
    cache: String,
    tier: Arc<dyn RemoteTier>,
    health: RemoteHealth,
    timeout: Duration,
    connect_timeout: Duration,
    slots: DashMap<String, Arc<KeySlot>>,
}

impl RemoteLink {
    /// Claim the next generation of `key`
    fn advance(&self, key: &str) -> (Arc<KeySlot>, u64) {
        let slot = self.slots.entry(key.to_string()).or_default().clone();
        let generation = slot.generation.fetch_add(1, Ordering::SeqCst) + 1;
        (slot, generation)
    }

    /// Drop the slot of `key` once nothing else refers to it
    fn release(&self, key: &str, slot: Arc<KeySlot>) {
        self.slots
            .remove_if(key, |_, held| Arc::ptr_eq(held, &slot) && Arc::strong_count(held) == 2);
    }

    async fn write(&self, key: &str, payload: &str, ttl: Duration, slot: &KeySlot, generation: u64) {
        let _order = slot.order.lock().await;
        if slot.generation.load(Ordering::SeqCst) != generation {
            debug!(cache = %self.cache, key, "Remote write superseded");
            return;
        }
        if self.available().await {
            self.call(self.tier.set_with_ttl(key, payload, ttl)).await;
        }
    }

    /// Whether remote traffic may be sent now, reconnecting first if one is due
    async fn available(&self) -> bool {
        if self.health.is_healthy() {
            return true;
        }

        let Some(_attempt) = self.health.try_begin_reconnect() else {
            return false;
        };

        match tokio::time::timeout(self.connect_timeout, self.tier.ping()).await {
            Ok(Ok(())) => {
                self.health.mark_healthy();
                info!(cache = %self.cache, "Remote cache tier available");
                true
            }
            Ok(Err(e)) => {
                self.fail(&e);
                false
            }
            Err(_) => {
                self.fail(&CacheError::Timeout(self.connect_timeout.as_millis()));
                false
            }
        }
    }

    fn fail(&self, err: &CacheError) {
        if self.health.mark_degraded(&err.to_string()) {
            SEARCH_METRICS
                .remote_degradations
                .with_label_values(&[self.cache.as_str()])
                .inc();
            warn!(
                cache = %self.cache,
                error = %err,
                "Remote cache tier degraded, serving from memory only"
            );
        } else {
            debug!(cache = %self.cache, error = %err, "Remote cache tier still unavailable");
        }
    }

    /// Run one remote call under the call timeout, degrading on any failure
    async fn call<T>(&self, op: impl Future<Output = CacheResult<T>>) -> Option<T> {
        match tokio::time::timeout(self.timeout, op).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                self.fail(&e);
                None
            }
            Err(_) => {
                self.fail(&CacheError::Timeout(self.timeout.as_millis()));
                None
            }
        }
    }
}

/// Read-through cache with a bounded memory tier and an optional remote tier.
///
/// No operation ever fails: remote problems only reduce the cache to its
/// memory tier. See the module docs for the lookup path.
pub struct CacheStore<V> {
    options: CacheOptions,
    memory: MemoryTier<V>,
    remote: Option<Arc<RemoteLink>>,
    stats: CacheStats,
}

impl<V> CacheStore<V>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Memory-only cache
    pub fn new(options: CacheOptions) -> Self {
        Self {
            memory: MemoryTier::new(options.max_items, options.ttl),
            remote: None,
            stats: CacheStats::default(),
            options,
        }
    }

    /// Cache backed by a remote tier. No connection is made until first use.
    pub fn with_remote(options: CacheOptions, tier: Arc<dyn RemoteTier>) -> Self {
        let link = RemoteLink {
            cache: options.name.clone(),
            tier,
            health: RemoteHealth::new(options.reconnect_interval),
            timeout: options.remote_timeout,
            connect_timeout: options.connect_timeout,
            slots: DashMap::new(),
        };

        Self {
            remote: Some(Arc::new(link)),
            ..Self::new(options)
        }
    }

    pub fn name(&self) -> &str {
        &self.options.name
    }

    /// Try to bring up the remote tier now, subject to the reconnect interval.
    ///
    /// Returns whether the remote tier is usable afterwards.
    pub async fn connect(&self) -> bool {
        match &self.remote {
            Some(link) => link.available().await,
            None => false,
        }
    }

    fn record_lookup(&self, tier: &str, result: &str) {
        SEARCH_METRICS
            .cache_lookups
            .with_label_values(&[self.options.name.as_str(), tier, result])
            .inc();
    }

    fn record_evictions(&self, evicted: usize) {
        if evicted == 0 {
            return;
        }
        CacheStats::add(&self.stats.evictions, evicted);
        SEARCH_METRICS
            .cache_evictions
            .with_label_values(&[self.options.name.as_str()])
            .inc_by(evicted as f64);
        debug!(cache = %self.options.name, evicted, "Evicted oldest memory entries");
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        match self.memory.get(key) {
            Lookup::Hit(value) => {
                CacheStats::incr(&self.stats.hits);
                self.record_lookup("memory", "hit");
                debug!(cache = %self.options.name, key, "Cache hit");
                return Some(value);
            }
            Lookup::Expired => {
                CacheStats::incr(&self.stats.expirations);
                self.record_lookup("memory", "expired");
            }
            Lookup::Miss => self.record_lookup("memory", "miss"),
        }

        match self.remote_get(key).await {
            Some((value, remaining)) => {
                CacheStats::incr(&self.stats.remote_hits);
                self.record_lookup("remote", "hit");
                let evicted = self.memory.insert_with_ttl(key, value.clone(), remaining);
                self.record_evictions(evicted);
                debug!(cache = %self.options.name, key, "Remote cache hit");
                Some(value)
            }
            None => {
                CacheStats::incr(&self.stats.misses);
                None
            }
        }
    }

    /// Value and remaining lifetime of a live remote entry
    async fn remote_get(&self, key: &str) -> Option<(V, Duration)> {
        let link = self.remote.as_ref()?;
        if !link.available().await {
            return None;
        }

        let payload = match link.call(link.tier.get(key)).await {
            Some(Some(payload)) => payload,
            Some(None) => {
                self.record_lookup("remote", "miss");
                return None;
            }
            None => return None,
        };

        match serde_json::from_str::<RemoteEntry<V>>(&payload) {
            Ok(entry) => match (entry.expires_at - Utc::now()).to_std() {
                Ok(remaining) if !remaining.is_zero() => Some((entry.value, remaining)),
                _ => {
                    self.record_lookup("remote", "expired");
                    None
                }
            },
            Err(e) => {
                warn!(cache = %self.options.name, key, error = %e, "Discarding undecodable remote entry");
                None
            }
        }
    }

    /// Store a value. The memory write is immediate; the remote write runs
    /// in the background and its outcome never reaches the caller.
    ///
    /// The remote write needs a Tokio runtime. Called outside one, only the
    /// memory tier is written.
    pub fn set(&self, key: &str, value: V) {
        let ttl = self.options.ttl;
        let payload = self.remote.as_ref().and_then(|_| {
            let entry = RemoteEntry {
                expires_at: chrono::Duration::from_std(ttl)
                    .ok()
                    .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
                value: &value,
            };
            serde_json::to_string(&entry)
                .map_err(|e| {
                    warn!(cache = %self.options.name, key, error = %e, "Value not written to remote tier");
                })
                .ok()
        });

        let evicted = self.memory.insert(key, value);
        self.record_evictions(evicted);
        CacheStats::incr(&self.stats.sets);

        let (Some(link), Some(payload)) = (self.remote.clone(), payload) else {
            return;
        };
        let Ok(runtime) = Handle::try_current() else {
            debug!(cache = %self.options.name, key, "No runtime, remote write skipped");
            return;
        };

        let (slot, generation) = link.advance(key);
        let key = key.to_string();
        runtime.spawn(async move {
            link.write(&key, &payload, ttl, &slot, generation).await;
            link.release(&key, slot);
        });
    }

    /// Remove a key from both tiers. Remote writes of the key still pending
    /// from earlier `set` calls are dropped or complete before the delete.
    pub async fn invalidate(&self, key: &str) {
        self.memory.remove(key);
        CacheStats::incr(&self.stats.invalidations);

        if let Some(link) = &self.remote {
            let (slot, _) = link.advance(key);
            {
                let _order = slot.order.lock().await;
                if link.available().await {
                    link.call(link.tier.delete(key)).await;
                }
            }
            link.release(key, slot);
        }
    }

    /// Remove every key starting with `prefix` from both tiers.
    ///
    /// Returns the number of memory entries removed.
    pub async fn invalidate_prefix(&self, prefix: &str) -> usize {
        let removed = self.memory.remove_prefix(prefix);
        CacheStats::add(&self.stats.invalidations, removed);

        if let Some(link) = &self.remote {
            let mut pending: Vec<String> = link
                .slots
                .iter()
                .filter(|slot| slot.key().starts_with(prefix))
                .map(|slot| slot.key().clone())
                .collect();
            // One lock order for every caller
            pending.sort();
            let slots: Vec<(String, Arc<KeySlot>)> = pending
                .into_iter()
                .map(|key| {
                    let (slot, _) = link.advance(&key);
                    (key, slot)
                })
                .collect();

            {
                let mut held = Vec::with_capacity(slots.len());
                for (_, slot) in &slots {
                    held.push(slot.order.lock().await);
                }
                if link.available().await {
                    if let Some(remote_removed) = link.call(link.tier.delete_prefix(prefix)).await {
                        debug!(cache = %self.options.name, prefix, remote_removed, "Invalidated remote keys");
                    }
                }
            }

            for (key, slot) in slots {
                link.release(&key, slot);
            }
        }

        removed
    }

    /// Sweep expired entries out of the memory tier
    pub fn cleanup_expired(&self) -> usize {
        self.memory.purge_expired()
    }

    /// Periodically sweep expired entries until the store is dropped
    pub fn spawn_cleanup_task(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let store = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                let purged = store.cleanup_expired();
                if purged > 0 {
                    debug!(cache = %store.options.name, purged, "Purged expired cache entries");
                }
            }
        })
    }

    pub fn remote_status(&self) -> RemoteStatus {
        self.remote
            .as_ref()
            .map_or(RemoteStatus::Disabled, |link| link.health.status())
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot(
            self.memory.len(),
            self.memory.capacity(),
            self.remote_status(),
        )
    }

    pub fn len(&self) -> usize {
        self.memory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
