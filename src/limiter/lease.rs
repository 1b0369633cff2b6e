use super::LimiterState;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Admission ticket for one running search.
///
/// Holds one guild slot and one global slot. They are returned exactly once,
/// either by [`Lease::release`] or when the lease is dropped.
#[must_use = "dropping a lease releases it immediately"]
pub struct Lease {
    state: Arc<LimiterState>,
    guild_id: u64,
    user_id: u64,
    acquired_at: Instant,
    released: bool,
}

impl Lease {
    pub(super) fn new(state: Arc<LimiterState>, guild_id: u64, user_id: u64) -> Self {
        Self {
            state,
            guild_id,
            user_id,
            acquired_at: Instant::now(),
            released: false,
        }
    }

    pub fn guild_id(&self) -> u64 {
        self.guild_id
    }

    pub fn user_id(&self) -> u64 {
        self.user_id
    }

    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }

    /// Give the slots back now
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.state.release(self.guild_id);
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.release_once();
    }
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("guild_id", &self.guild_id)
            .field("user_id", &self.user_id)
            .field("released", &self.released)
            .finish()
    }
}
