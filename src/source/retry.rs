use super::{ForumDataSource, MessagePage, SourceError, SourceResult, ThreadPage};
use crate::models::{ServerSideFilters, ThreadRecord};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retries transient data source failures.
///
/// `RateLimited` waits for the advised delay; `Unavailable` backs off
/// linearly (`backoff`, `2 * backoff`, ...). `NotFound` and `Forbidden`
/// are returned as is.
pub struct RetryingSource<S> {
    inner: S,
    max_retries: u32,
    backoff: Duration,
}

impl<S: ForumDataSource> RetryingSource<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            max_retries: 2,
            backoff: Duration::from_millis(500),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn delay_for(&self, error: &SourceError, attempt: u32) -> Duration {
        match error {
            SourceError::RateLimited { retry_after } => *retry_after,
            _ => self.backoff * attempt,
        }
    }

    async fn with_retries<T, F, Fut>(&self, operation: &str, mut call: F) -> SourceResult<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = SourceResult<T>> + Send,
        T: Send,
    {
        let mut attempts = 0;

        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempts < self.max_retries => {
                    attempts += 1;
                    let delay = self.delay_for(&e, attempts);
                    warn!(
                        operation,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying forum data source call"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl<S: ForumDataSource> ForumDataSource for RetryingSource<S> {
    async fn list_threads(
        &self,
        forum_id: u64,
        filters: &ServerSideFilters,
        cursor: Option<String>,
        limit: usize,
    ) -> SourceResult<ThreadPage> {
        let inner = &self.inner;
        self.with_retries("list_threads", move || {
            inner.list_threads(forum_id, filters, cursor.clone(), limit)
        })
        .await
    }

    async fn fetch_thread_record(&self, thread_id: u64) -> SourceResult<ThreadRecord> {
        let inner = &self.inner;
        self.with_retries("fetch_thread_record", move || {
            inner.fetch_thread_record(thread_id)
        })
        .await
    }

    async fn list_messages(
        &self,
        thread_id: u64,
        cursor: Option<String>,
        batch_size: usize,
    ) -> SourceResult<MessagePage> {
        let inner = &self.inner;
        self.with_retries("list_messages", move || {
            inner.list_messages(thread_id, cursor.clone(), batch_size)
        })
        .await
    }
}
