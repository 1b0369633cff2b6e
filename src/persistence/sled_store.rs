use super::{SearchPersistence, HISTORY_PER_USER};
use crate::error::{AppError, Result};
use crate::models::{SearchHistoryEntry, ThreadRecord};
use async_trait::async_trait;
use sled::Db;
use std::path::Path;
use std::sync::Arc;

/// Persistence backed by an embedded sled database
#[derive(Clone)]
pub struct SledPersistence {
    db: Arc<Db>,
    threads_tree: sled::Tree,
    history_tree: sled::Tree,
}

impl SledPersistence {
    /// Open (or create) the database at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let db = sled::open(path_ref)
            .map_err(|e| AppError::Storage(format!("Failed to open Sled database: {}", e)))?;

        let threads_tree = db
            .open_tree("thread_stats")
            .map_err(|e| AppError::Storage(format!("Failed to open thread_stats tree: {}", e)))?;

        let history_tree = db
            .open_tree("search_history")
            .map_err(|e| AppError::Storage(format!("Failed to open search_history tree: {}", e)))?;

        tracing::info!("Initialized Sled persistence at {:?}", path_ref);

        Ok(Self {
            db: Arc::new(db),
            threads_tree,
            history_tree,
        })
    }

    /// History keys sort by user, then by insertion
    fn history_key(user_id: u64, seq: u64) -> [u8; 16] {
        let mut key = [0u8; 16];
        key[..8].copy_from_slice(&user_id.to_be_bytes());
        key[8..].copy_from_slice(&seq.to_be_bytes());
        key
    }

    fn trim_history(&self, user_id: u64) -> Result<()> {
        let keys: Vec<sled::IVec> = self
            .history_tree
            .scan_prefix(user_id.to_be_bytes())
            .keys()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| AppError::Storage(format!("Failed to scan search history: {}", e)))?;

        if keys.len() > HISTORY_PER_USER {
            for key in &keys[..keys.len() - HISTORY_PER_USER] {
                self.history_tree
                    .remove(key)
                    .map_err(|e| AppError::Storage(format!("Failed to trim search history: {}", e)))?;
            }
        }
        Ok(())
    }

    pub async fn flush(&self) -> Result<()> {
        self.db
            .flush_async()
            .await
            .map_err(|e| AppError::Storage(format!("Failed to flush Sled database: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl SearchPersistence for SledPersistence {
    async fn upsert_thread_stats(&self, record: &ThreadRecord) -> Result<()> {
        let bytes = bincode::serialize(record)?;
        self.threads_tree
            .insert(record.id.to_be_bytes(), bytes)
            .map_err(|e| AppError::Storage(format!("Failed to store thread stats: {}", e)))?;
        Ok(())
    }

    async fn thread_stats(&self, thread_id: u64) -> Result<Option<ThreadRecord>> {
        let bytes = self
            .threads_tree
            .get(thread_id.to_be_bytes())
            .map_err(|e| AppError::Storage(format!("Failed to read thread stats: {}", e)))?;

        match bytes {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn record_search_history(&self, entry: &SearchHistoryEntry) -> Result<()> {
        let seq = self
            .db
            .generate_id()
            .map_err(|e| AppError::Storage(format!("Failed to allocate history id: {}", e)))?;

        let bytes = bincode::serialize(entry)?;
        self.history_tree
            .insert(Self::history_key(entry.user_id, seq), bytes)
            .map_err(|e| AppError::Storage(format!("Failed to store search history: {}", e)))?;

        self.trim_history(entry.user_id)
    }

    async fn recent_history(&self, user_id: u64, limit: usize) -> Result<Vec<SearchHistoryEntry>> {
        let mut entries = Vec::new();

        for item in self.history_tree.scan_prefix(user_id.to_be_bytes()).rev().take(limit) {
            let (_, bytes) =
                item.map_err(|e| AppError::Storage(format!("Failed to read search history: {}", e)))?;
            entries.push(bincode::deserialize(&bytes)?);
        }

        Ok(entries)
    }
}
