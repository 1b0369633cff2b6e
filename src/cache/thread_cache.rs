use super::{build_remote_tier, CacheOptions, CacheStatsSnapshot, CacheStore, RemoteStatus};
use crate::config::CacheConfig;
use crate::error::Result;
use crate::models::ThreadRecord;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Key namespace of cached thread records
pub const THREAD_KEY_PREFIX: &str = "thread_stats:";

/// Typed view of a [`CacheStore`] holding [`ThreadRecord`]s by thread id
#[derive(Clone)]
pub struct ThreadCache {
    store: Arc<CacheStore<ThreadRecord>>,
}

impl ThreadCache {
    pub fn new(store: Arc<CacheStore<ThreadRecord>>) -> Self {
        Self { store }
    }

    /// Memory-only cache with the given TTL and capacity
    pub fn in_memory(ttl: Duration, max_items: usize) -> Self {
        Self::new(Arc::new(CacheStore::new(CacheOptions::new(
            "thread_stats",
            ttl,
            max_items,
        ))))
    }

    /// Cache built from configuration, including the remote tier if enabled
    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        let options = CacheOptions::from_config("thread_stats", config);
        let store = match build_remote_tier(config)? {
            Some(remote) => CacheStore::with_remote(options, remote),
            None => CacheStore::new(options),
        };
        Ok(Self::new(Arc::new(store)))
    }

    pub fn key(thread_id: u64) -> String {
        format!("{}{}", THREAD_KEY_PREFIX, thread_id)
    }

    pub async fn get(&self, thread_id: u64) -> Option<ThreadRecord> {
        self.store.get(&Self::key(thread_id)).await
    }

    pub fn put(&self, record: ThreadRecord) {
        self.store.set(&Self::key(record.id), record);
    }

    pub async fn invalidate(&self, thread_id: u64) {
        self.store.invalidate(&Self::key(thread_id)).await;
    }

    /// Drop every cached thread record
    pub async fn invalidate_all(&self) -> usize {
        self.store.invalidate_prefix(THREAD_KEY_PREFIX).await
    }

    pub async fn connect(&self) -> bool {
        self.store.connect().await
    }

    pub fn spawn_cleanup_task(&self, interval: Duration) -> JoinHandle<()> {
        self.store.spawn_cleanup_task(interval)
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.store.stats()
    }

    pub fn remote_status(&self) -> RemoteStatus {
        self.store.remote_status()
    }

    pub fn store(&self) -> &Arc<CacheStore<ThreadRecord>> {
        &self.store
    }
}
