use crate::config::SearchConfig;
use crate::models::SearchSession;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Live search sessions, dropped after their lifetime or on close
#[derive(Clone)]
pub struct SessionStore {
    sessions: Cache<Uuid, Arc<SearchSession>>,
}

impl SessionStore {
    pub fn new(max_sessions: u64, ttl: Duration) -> Self {
        let sessions = Cache::builder()
            .max_capacity(max_sessions)
            .time_to_live(ttl)
            .build();

        Self { sessions }
    }

    pub fn from_config(config: &SearchConfig) -> Self {
        Self::new(config.max_sessions, config.session_ttl())
    }

    pub async fn insert(&self, session: SearchSession) -> Arc<SearchSession> {
        let session = Arc::new(session);
        self.sessions.insert(session.id, Arc::clone(&session)).await;
        session
    }

    pub async fn get(&self, id: &Uuid) -> Option<Arc<SearchSession>> {
        let session = self.sessions.get(id).await?;
        if session.is_expired() {
            self.sessions.invalidate(id).await;
            return None;
        }
        Some(session)
    }

    /// Close a session; returns whether it was still open
    pub async fn close(&self, id: &Uuid) -> bool {
        self.sessions.remove(id).await.is_some()
    }

    pub fn entry_count(&self) -> u64 {
        self.sessions.entry_count()
    }
}
