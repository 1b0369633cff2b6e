//! Admission control for searches.
//!
//! Three independent checks guard every search:
//! - a per-user cooldown measured from the user's last admitted search
//! - a global cap on concurrently running searches
//! - a per-guild cap on concurrently running searches
//!
//! Rejections are immediate; nothing queues. An admitted search holds a
//! [`Lease`] that gives its slots back when released or dropped.

mod lease;

pub use lease::Lease;

use crate::config::LimiterConfig;
use crate::error::AppError;
use crate::metrics::SEARCH_METRICS;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// Which concurrency cap refused a search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitScope {
    Guild(u64),
    Global,
}

impl fmt::Display for LimitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitScope::Guild(id) => write!(f, "guild {}", id),
            LimitScope::Global => write!(f, "global"),
        }
    }
}

/// Why a search was not admitted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("too many concurrent searches ({scope} limit is {limit})")]
    TooManyConcurrentSearches { scope: LimitScope, limit: usize },

    #[error("searching again is possible in {:.1}s", .retry_after.as_secs_f64())]
    UserOnCooldown { retry_after: Duration },
}

impl Rejection {
    /// Short label for metrics
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::TooManyConcurrentSearches {
                scope: LimitScope::Guild(_),
                ..
            } => "guild_limit",
            Rejection::TooManyConcurrentSearches {
                scope: LimitScope::Global,
                ..
            } => "global_limit",
            Rejection::UserOnCooldown { .. } => "cooldown",
        }
    }
}

impl From<Rejection> for AppError {
    fn from(err: Rejection) -> Self {
        AppError::Rejected(err.to_string())
    }
}

pub(crate) struct LimiterState {
    guild_limit: usize,
    global_limit: usize,
    cooldown: Duration,
    guilds: DashMap<u64, usize>,
    global: AtomicUsize,
    last_issued: DashMap<u64, Instant>,
}

impl LimiterState {
    pub(crate) fn release(&self, guild_id: u64) {
        if let Some(mut count) = self.guilds.get_mut(&guild_id) {
            *count = count.saturating_sub(1);
        }
        self.guilds.remove_if(&guild_id, |_, count| *count == 0);

        let _ = self
            .global
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        SEARCH_METRICS.active_searches.dec();
    }
}

/// Shared admission controller; clones refer to the same counters
#[derive(Clone)]
pub struct ConcurrencyLimiter {
    state: Arc<LimiterState>,
}

impl ConcurrencyLimiter {
    pub fn new(guild_limit: usize, global_limit: usize, cooldown: Duration) -> Self {
        Self {
            state: Arc::new(LimiterState {
                guild_limit,
                global_limit,
                cooldown,
                guilds: DashMap::new(),
                global: AtomicUsize::new(0),
                last_issued: DashMap::new(),
            }),
        }
    }

    pub fn from_config(config: &LimiterConfig) -> Self {
        Self::new(
            config.guild_concurrent_searches,
            config.global_concurrent_searches,
            config.user_cooldown(),
        )
    }

    /// Admit a search or say why not.
    ///
    /// On success the user's cooldown restarts and one guild slot plus one
    /// global slot are held by the returned lease.
    pub fn acquire(&self, guild_id: u64, user_id: u64) -> Result<Lease, Rejection> {
        let result = self.try_acquire(guild_id, user_id);
        if let Err(rejection) = &result {
            SEARCH_METRICS
                .limiter_rejections
                .with_label_values(&[rejection.reason()])
                .inc();
            debug!(guild_id, user_id, reason = rejection.reason(), "Search rejected");
        }
        result
    }

    fn try_acquire(&self, guild_id: u64, user_id: u64) -> Result<Lease, Rejection> {
        let state = &self.state;
        let now = Instant::now();

        // The user's entry stays locked until admission is decided
        let user_entry = state.last_issued.entry(user_id);
        if let Entry::Occupied(issued) = &user_entry {
            let elapsed = now.duration_since(*issued.get());
            if elapsed < state.cooldown {
                return Err(Rejection::UserOnCooldown {
                    retry_after: state.cooldown - elapsed,
                });
            }
        }

        let global_limit = state.global_limit;
        if state
            .global
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < global_limit).then_some(n + 1)
            })
            .is_err()
        {
            return Err(Rejection::TooManyConcurrentSearches {
                scope: LimitScope::Global,
                limit: global_limit,
            });
        }

        {
            let mut active = state.guilds.entry(guild_id).or_insert(0);
            if *active >= state.guild_limit {
                drop(active);
                state.global.fetch_sub(1, Ordering::SeqCst);
                return Err(Rejection::TooManyConcurrentSearches {
                    scope: LimitScope::Guild(guild_id),
                    limit: state.guild_limit,
                });
            }
            *active += 1;
        }

        user_entry.insert(now);
        SEARCH_METRICS.active_searches.inc();

        Ok(Lease::new(Arc::clone(&self.state), guild_id, user_id))
    }

    pub fn active_for_guild(&self, guild_id: u64) -> usize {
        self.state.guilds.get(&guild_id).map_or(0, |count| *count)
    }

    pub fn active_total(&self) -> usize {
        self.state.global.load(Ordering::SeqCst)
    }

    /// Forget cooldowns that have already run out
    pub fn prune_cooldowns(&self) -> usize {
        let cooldown = self.state.cooldown;
        let now = Instant::now();
        let before = self.state.last_issued.len();
        self.state
            .last_issued
            .retain(|_, issued| now.duration_since(*issued) < cooldown);
        before.saturating_sub(self.state.last_issued.len())
    }

    /// Let a user search again immediately
    pub fn clear_cooldown(&self, user_id: u64) -> bool {
        self.state.last_issued.remove(&user_id).is_some()
    }
}
