//! Access to the forum platform.
//!
//! The executor pulls pages of thread handles and resolves each thread's
//! record through [`ForumDataSource`]. Implementations report failures as
//! [`SourceError`]; which of them are per-thread and which are fatal is
//! decided by the caller.

mod memory;
mod retry;

pub use memory::{ForumFixture, InMemoryForumSource, SeededThread};
pub use retry::RetryingSource;

use crate::error::AppError;
use crate::models::{ForumMessage, ServerSideFilters, ThreadHandle, ThreadRecord};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors reported by the forum platform
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("thread {0} not found")]
    NotFound(u64),

    #[error("access to thread {0} is forbidden")]
    Forbidden(u64),

    #[error("forum data source unavailable: {0}")]
    Unavailable(String),

    #[error("rate limited, retry after {} ms", .retry_after.as_millis())]
    RateLimited { retry_after: Duration },
}

impl SourceError {
    /// Transient failures that may succeed when repeated
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SourceError::Unavailable(_) | SourceError::RateLimited { .. }
        )
    }

    /// Failures confined to a single thread
    pub fn is_per_thread(&self) -> bool {
        matches!(self, SourceError::NotFound(_) | SourceError::Forbidden(_))
    }

    /// Short label for metrics
    pub fn label(&self) -> &'static str {
        match self {
            SourceError::NotFound(_) => "not_found",
            SourceError::Forbidden(_) => "forbidden",
            SourceError::Unavailable(_) => "unavailable",
            SourceError::RateLimited { .. } => "rate_limited",
        }
    }
}

pub type SourceResult<T> = std::result::Result<T, SourceError>;

impl From<SourceError> for AppError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::NotFound(id) => AppError::NotFound(format!("thread {}", id)),
            other => AppError::DataSource(other.to_string()),
        }
    }
}

/// One page of a forum listing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadPage {
    pub threads: Vec<ThreadHandle>,
    /// Opaque cursor of the next page; `None` on the last page
    pub next_cursor: Option<String>,
}

/// One page of messages inside a thread, oldest first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessagePage {
    pub messages: Vec<ForumMessage>,
    pub next_cursor: Option<String>,
}

/// Read access to a forum platform
#[async_trait]
pub trait ForumDataSource: Send + Sync {
    /// List threads of a forum, applying the filters the platform supports.
    ///
    /// Cursors are stable: paging through a forum yields every thread at
    /// most once, in a fixed order.
    async fn list_threads(
        &self,
        forum_id: u64,
        filters: &ServerSideFilters,
        cursor: Option<String>,
        limit: usize,
    ) -> SourceResult<ThreadPage>;

    async fn fetch_thread_record(&self, thread_id: u64) -> SourceResult<ThreadRecord>;

    async fn list_messages(
        &self,
        thread_id: u64,
        cursor: Option<String>,
        batch_size: usize,
    ) -> SourceResult<MessagePage>;
}
