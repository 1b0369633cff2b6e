use super::{ForumDataSource, MessagePage, SourceError, SourceResult, ThreadPage};
use crate::error::Result;
use crate::models::{ForumMessage, ServerSideFilters, ThreadHandle, ThreadRecord};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Everything known about one thread of a fixture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeededThread {
    pub handle: ThreadHandle,
    pub record: ThreadRecord,
    #[serde(default)]
    pub messages: Vec<ForumMessage>,
}

/// Serialized forum contents, as loaded by the CLI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForumFixture {
    pub threads: Vec<SeededThread>,
}

impl ForumFixture {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

/// Forum platform held in memory.
///
/// Threads are listed in ascending id order and the cursor is the last id
/// returned. Failures can be injected per thread or for listings.
pub struct InMemoryForumSource {
    threads: RwLock<BTreeMap<u64, SeededThread>>,
    thread_failures: DashMap<u64, SourceError>,
    listing_failures: Mutex<VecDeque<SourceError>>,
    fail_listing_after: Mutex<Option<usize>>,
    page_delay: RwLock<Duration>,
    pages_served: AtomicUsize,
    record_fetches: AtomicUsize,
}

impl Default for InMemoryForumSource {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryForumSource {
    pub fn new() -> Self {
        Self {
            threads: RwLock::new(BTreeMap::new()),
            thread_failures: DashMap::new(),
            listing_failures: Mutex::new(VecDeque::new()),
            fail_listing_after: Mutex::new(None),
            page_delay: RwLock::new(Duration::ZERO),
            pages_served: AtomicUsize::new(0),
            record_fetches: AtomicUsize::new(0),
        }
    }

    pub fn from_fixture(fixture: ForumFixture) -> Self {
        let source = Self::new();
        for thread in fixture.threads {
            source.insert(thread);
        }
        source
    }

    pub fn insert(&self, thread: SeededThread) {
        self.threads.write().insert(thread.handle.id, thread);
    }

    pub fn len(&self) -> usize {
        self.threads.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make every lookup of one thread fail with `error`
    pub fn fail_thread(&self, thread_id: u64, error: SourceError) {
        self.thread_failures.insert(thread_id, error);
    }

    /// Queue an error for the next listing call; queued errors are consumed in order
    pub fn push_listing_failure(&self, error: SourceError) {
        self.listing_failures.lock().push_back(error);
    }

    /// Serve `pages` listing pages, then report the platform as unavailable
    pub fn fail_listing_after(&self, pages: usize) {
        *self.fail_listing_after.lock() = Some(pages);
    }

    /// Delay every listing call
    pub fn set_page_delay(&self, delay: Duration) {
        *self.page_delay.write() = delay;
    }

    pub fn pages_served(&self) -> usize {
        self.pages_served.load(Ordering::SeqCst)
    }

    pub fn record_fetches(&self) -> usize {
        self.record_fetches.load(Ordering::SeqCst)
    }

    fn parse_cursor(cursor: Option<String>) -> SourceResult<Option<u64>> {
        cursor
            .map(|c| {
                c.parse::<u64>()
                    .map_err(|_| SourceError::Unavailable(format!("invalid cursor '{}'", c)))
            })
            .transpose()
    }

    fn check_thread(&self, thread_id: u64) -> SourceResult<()> {
        match self.thread_failures.get(&thread_id) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

fn admits(filters: &ServerSideFilters, handle: &ThreadHandle) -> bool {
    let tags_ok = filters.tags.is_empty()
        || handle
            .tags
            .iter()
            .any(|t| filters.tags.contains(&t.to_lowercase()));
    let authors_ok = filters.authors.is_empty() || filters.authors.contains(&handle.author_id);
    tags_ok && authors_ok
}

#[async_trait]
impl ForumDataSource for InMemoryForumSource {
    async fn list_threads(
        &self,
        forum_id: u64,
        filters: &ServerSideFilters,
        cursor: Option<String>,
        limit: usize,
    ) -> SourceResult<ThreadPage> {
        let delay = *self.page_delay.read();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.listing_failures.lock().pop_front() {
            return Err(error);
        }
        if let Some(limit) = *self.fail_listing_after.lock() {
            if self.pages_served.load(Ordering::SeqCst) >= limit {
                return Err(SourceError::Unavailable("forum platform outage".to_string()));
            }
        }

        let after = Self::parse_cursor(cursor)?;
        let limit = limit.max(1);

        let threads = self.threads.read();
        let mut matching = threads
            .values()
            .map(|t| &t.handle)
            .filter(|h| h.forum_id == forum_id)
            .filter(|h| after.map_or(true, |after| h.id > after))
            .filter(|h| admits(filters, h));

        let page: Vec<ThreadHandle> = matching.by_ref().take(limit).cloned().collect();
        let has_more = matching.next().is_some();
        drop(threads);

        self.pages_served.fetch_add(1, Ordering::SeqCst);

        let next_cursor = match page.last() {
            Some(last) if has_more => Some(last.id.to_string()),
            _ => None,
        };

        Ok(ThreadPage {
            threads: page,
            next_cursor,
        })
    }

    async fn fetch_thread_record(&self, thread_id: u64) -> SourceResult<ThreadRecord> {
        self.record_fetches.fetch_add(1, Ordering::SeqCst);
        self.check_thread(thread_id)?;

        self.threads
            .read()
            .get(&thread_id)
            .map(|t| t.record.clone())
            .ok_or(SourceError::NotFound(thread_id))
    }

    async fn list_messages(
        &self,
        thread_id: u64,
        cursor: Option<String>,
        batch_size: usize,
    ) -> SourceResult<MessagePage> {
        self.check_thread(thread_id)?;

        let offset = Self::parse_cursor(cursor)?.unwrap_or(0) as usize;
        let batch_size = batch_size.max(1);

        let threads = self.threads.read();
        let thread = threads
            .get(&thread_id)
            .ok_or(SourceError::NotFound(thread_id))?;

        let mut messages = thread.messages.clone();
        drop(threads);
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let end = offset.saturating_add(batch_size).min(messages.len());
        let page: Vec<ForumMessage> = messages
            .get(offset.min(end)..end)
            .map(|s| s.to_vec())
            .unwrap_or_default();

        Ok(MessagePage {
            messages: page,
            next_cursor: (end < messages.len()).then(|| end.to_string()),
        })
    }
}
