use crate::models::{Requester, ThreadMatch};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How long a finished search stays browsable
pub const SESSION_LIFETIME_MINUTES: i64 = 15;

/// A completed search, handed to the caller for paging.
///
/// The caller owns its lifetime; it is dropped on expiry or explicit close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSession {
    pub id: Uuid,
    pub requester: Requester,
    pub results: Vec<ThreadMatch>,
    pub truncated: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SearchSession {
    pub fn new(requester: Requester, results: Vec<ThreadMatch>, truncated: bool) -> Self {
        let created_at = Utc::now();
        Self {
            id: Uuid::new_v4(),
            requester,
            results,
            truncated,
            created_at,
            expires_at: created_at + Duration::minutes(SESSION_LIFETIME_MINUTES),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Slice of results for a zero-based page
    pub fn page(&self, page: usize, page_size: usize) -> &[ThreadMatch] {
        if page_size == 0 {
            return &[];
        }
        let start = page.saturating_mul(page_size).min(self.results.len());
        let end = start.saturating_add(page_size).min(self.results.len());
        &self.results[start..end]
    }

    pub fn page_count(&self, page_size: usize) -> usize {
        if page_size == 0 {
            return 0;
        }
        self.results.len().div_ceil(page_size)
    }
}

/// One finished search, as recorded by the persistence collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHistoryEntry {
    pub user_id: u64,
    pub guild_id: u64,
    pub query_text: String,
    pub result_count: usize,
    pub elapsed_seconds: f64,
    pub recorded_at: DateTime<Utc>,
}
