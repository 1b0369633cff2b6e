//! Storage for thread statistics and search history.
//!
//! The executor only ever writes through this seam on spawned tasks, so a
//! slow or failing backend never holds up a search.

mod factory;
mod memory;
mod sled_store;

pub use factory::{create_in_memory_persistence, create_persistence};
pub use memory::InMemoryPersistence;
pub use sled_store::SledPersistence;

use crate::error::Result;
use crate::models::{SearchHistoryEntry, ThreadRecord};
use async_trait::async_trait;

/// Number of history entries kept per user
pub const HISTORY_PER_USER: usize = 10;

#[async_trait]
pub trait SearchPersistence: Send + Sync {
    /// Store the latest known statistics of a thread, replacing older ones
    async fn upsert_thread_stats(&self, record: &ThreadRecord) -> Result<()>;

    async fn thread_stats(&self, thread_id: u64) -> Result<Option<ThreadRecord>>;

    /// Append a finished search to the user's history
    async fn record_search_history(&self, entry: &SearchHistoryEntry) -> Result<()>;

    /// Most recent searches of a user, newest first
    async fn recent_history(&self, user_id: u64, limit: usize) -> Result<Vec<SearchHistoryEntry>>;
}
