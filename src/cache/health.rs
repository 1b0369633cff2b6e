//! Health tracking for the remote tier.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, MutexGuard};

/// Availability of the remote tier as seen by one cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteStatus {
    /// No remote tier configured
    Disabled,
    /// Reads and writes go to the remote tier
    Healthy,
    /// Remote traffic is suspended until a reconnect succeeds
    Degraded,
}

impl fmt::Display for RemoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteStatus::Disabled => write!(f, "disabled"),
            RemoteStatus::Healthy => write!(f, "healthy"),
            RemoteStatus::Degraded => write!(f, "degraded"),
        }
    }
}

#[derive(Debug)]
struct HealthData {
    status: RemoteStatus,
    last_attempt: Option<Instant>,
    degraded_since: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

/// Remote tier state machine: Healthy <-> Degraded.
///
/// A fresh tracker starts degraded with no attempt on record, so the first
/// use performs the initial connection.
pub(crate) struct RemoteHealth {
    data: RwLock<HealthData>,
    reconnect_lock: Mutex<()>,
    reconnect_interval: Duration,
}

impl RemoteHealth {
    pub fn new(reconnect_interval: Duration) -> Self {
        Self {
            data: RwLock::new(HealthData {
                status: RemoteStatus::Degraded,
                last_attempt: None,
                degraded_since: None,
                last_error: None,
            }),
            reconnect_lock: Mutex::new(()),
            reconnect_interval,
        }
    }

    pub fn status(&self) -> RemoteStatus {
        self.data.read().status
    }

    pub fn is_healthy(&self) -> bool {
        self.status() == RemoteStatus::Healthy
    }

    pub fn last_error(&self) -> Option<String> {
        self.data.read().last_error.clone()
    }

    pub fn degraded_since(&self) -> Option<DateTime<Utc>> {
        self.data.read().degraded_since
    }

    /// Record a failure. Returns true if this moved the tier out of Healthy.
    pub fn mark_degraded(&self, reason: &str) -> bool {
        let mut data = self.data.write();
        let was_healthy = data.status == RemoteStatus::Healthy;

        data.status = RemoteStatus::Degraded;
        data.last_error = Some(reason.to_string());
        if was_healthy {
            // The failing call counts as the latest attempt
            data.last_attempt = Some(Instant::now());
        }
        if was_healthy || data.degraded_since.is_none() {
            data.degraded_since = Some(Utc::now());
        }

        was_healthy
    }

    pub fn mark_healthy(&self) {
        let mut data = self.data.write();
        data.status = RemoteStatus::Healthy;
        data.degraded_since = None;
        data.last_error = None;
    }

    fn reconnect_due(&self, now: Instant) -> bool {
        let data = self.data.read();
        data.status == RemoteStatus::Degraded
            && data
                .last_attempt
                .map_or(true, |at| now.duration_since(at) >= self.reconnect_interval)
    }

    /// Claim the right to attempt a reconnect.
    ///
    /// Returns `None` while healthy, while another caller holds the attempt,
    /// or when the previous attempt is more recent than the reconnect interval.
    pub fn try_begin_reconnect(&self) -> Option<MutexGuard<'_, ()>> {
        if !self.reconnect_due(Instant::now()) {
            return None;
        }

        let guard = self.reconnect_lock.try_lock().ok()?;

        // Re-check under the lock; a concurrent attempt may have just finished
        let now = Instant::now();
        if !self.reconnect_due(now) {
            return None;
        }
        self.data.write().last_attempt = Some(now);

        Some(guard)
    }
}
