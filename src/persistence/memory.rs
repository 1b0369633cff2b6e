use super::{SearchPersistence, HISTORY_PER_USER};
use crate::error::Result;
use crate::models::{SearchHistoryEntry, ThreadRecord};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;

/// Process-local persistence, lost on restart
#[derive(Default)]
pub struct InMemoryPersistence {
    threads: DashMap<u64, ThreadRecord>,
    history: DashMap<u64, VecDeque<SearchHistoryEntry>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }
}

#[async_trait]
impl SearchPersistence for InMemoryPersistence {
    async fn upsert_thread_stats(&self, record: &ThreadRecord) -> Result<()> {
        self.threads.insert(record.id, record.clone());
        Ok(())
    }

    async fn thread_stats(&self, thread_id: u64) -> Result<Option<ThreadRecord>> {
        Ok(self.threads.get(&thread_id).map(|r| r.clone()))
    }

    async fn record_search_history(&self, entry: &SearchHistoryEntry) -> Result<()> {
        let mut history = self.history.entry(entry.user_id).or_default();
        history.push_back(entry.clone());
        while history.len() > HISTORY_PER_USER {
            history.pop_front();
        }
        Ok(())
    }

    async fn recent_history(&self, user_id: u64, limit: usize) -> Result<Vec<SearchHistoryEntry>> {
        Ok(self
            .history
            .get(&user_id)
            .map(|h| h.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}
