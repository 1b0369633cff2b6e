//! Shared builders and fakes for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use dashmap::DashMap;
use forum_search::cache::{CacheError, CacheResult, RemoteTier, ThreadCache};
use forum_search::config::SearchConfig;
use forum_search::limiter::ConcurrencyLimiter;
use forum_search::models::{ForumMessage, ThreadHandle, ThreadRecord};
use forum_search::persistence::InMemoryPersistence;
use forum_search::search::SearchExecutor;
use forum_search::source::{ForumDataSource, SeededThread};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const FORUM_ID: u64 = 500;
pub const GUILD_ID: u64 = 1;

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

/// Thread builder with sensible defaults
pub struct ThreadBuilder {
    id: u64,
    title: String,
    tags: Vec<String>,
    author_id: u64,
    age_days: i64,
    reactions: u64,
    replies: u64,
    first_post: Option<String>,
}

impl ThreadBuilder {
    pub fn new(id: u64, title: &str) -> Self {
        Self {
            id,
            title: title.to_string(),
            tags: vec![],
            author_id: 100,
            age_days: 0,
            reactions: 0,
            replies: 0,
            first_post: None,
        }
    }

    pub fn tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn author(mut self, author_id: u64) -> Self {
        self.author_id = author_id;
        self
    }

    pub fn age_days(mut self, days: i64) -> Self {
        self.age_days = days;
        self
    }

    pub fn reactions(mut self, reactions: u64) -> Self {
        self.reactions = reactions;
        self
    }

    pub fn replies(mut self, replies: u64) -> Self {
        self.replies = replies;
        self
    }

    pub fn first_post(mut self, text: &str) -> Self {
        self.first_post = Some(text.to_string());
        self
    }

    pub fn build(self) -> SeededThread {
        let created_at = base_time() - ChronoDuration::days(self.age_days);
        let messages = self
            .first_post
            .map(|content| {
                vec![ForumMessage {
                    id: self.id * 1000 + 1,
                    thread_id: self.id,
                    author_id: self.author_id,
                    content,
                    created_at,
                    reaction_count: 0,
                }]
            })
            .unwrap_or_default();

        SeededThread {
            handle: ThreadHandle {
                id: self.id,
                forum_id: FORUM_ID,
                title: self.title,
                tags: self.tags.clone(),
                author_id: self.author_id,
                created_at,
                archived: false,
            },
            record: ThreadRecord {
                id: self.id,
                guild_id: GUILD_ID,
                channel_id: FORUM_ID,
                tags: self.tags,
                author_id: self.author_id,
                created_at,
                last_active_at: created_at + ChronoDuration::hours(1),
                reaction_count: self.reactions,
                reply_count: self.replies,
                locked: false,
                archived: false,
            },
            messages,
        }
    }
}

pub fn record(id: u64, reactions: u64) -> ThreadRecord {
    ThreadBuilder::new(id, "record").reactions(reactions).build().record
}

/// Executor over a memory-only cache and persistence
pub fn executor_with(
    source: Arc<dyn ForumDataSource>,
    config: SearchConfig,
    limiter: ConcurrencyLimiter,
) -> SearchExecutor {
    SearchExecutor::new(
        config,
        ThreadCache::in_memory(Duration::from_secs(300), 1000),
        limiter,
        source,
        Arc::new(InMemoryPersistence::new()),
    )
}

pub fn executor(source: Arc<dyn ForumDataSource>) -> SearchExecutor {
    executor_with(
        source,
        SearchConfig {
            batch_size: 4,
            ..SearchConfig::default()
        },
        ConcurrencyLimiter::new(3, 5, Duration::ZERO),
    )
}

/// Remote tier held in a map, with switchable failures and latency
#[derive(Default)]
pub struct FakeRemote {
    pub entries: DashMap<String, String>,
    pub failing: AtomicBool,
    pub delay_ms: AtomicUsize,
    pub calls: AtomicUsize,
    pub pings: AtomicUsize,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as usize, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> CacheResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(CacheError::Remote("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteTier for FakeRemote {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.enter().await?;
        Ok(self.entries.get(key).map(|v| v.clone()))
    }

    async fn set_with_ttl(&self, key: &str, payload: &str, _ttl: Duration) -> CacheResult<()> {
        self.enter().await?;
        self.entries.insert(key.to_string(), payload.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.enter().await?;
        self.entries.remove(key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> CacheResult<usize> {
        self.enter().await?;
        let before = self.entries.len();
        self.entries.retain(|k, _| !k.starts_with(prefix));
        Ok(before - self.entries.len())
    }

    async fn ping(&self) -> CacheResult<()> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        self.enter().await
    }
}

/// Wait for background tasks spawned by the code under test
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
