//! Two-tier cache for thread records.
//!
//! ```text
//!             get(key)
//!                │
//!        ┌───────▼────────┐   hit
//!        │  Memory tier   ├────────► value
//!        │ (bounded, TTL) │
//!        └───────┬────────┘
//!                │ miss / expired
//!        ┌───────▼────────┐   hit (repopulates memory)
//!        │  Remote tier   ├────────► value
//!        │ (Redis, shared)│
//!        └───────┬────────┘
//!                │ miss, degraded or timed out
//!                ▼
//!              None
//! ```
//!
//! The memory tier is authoritative for the local process and never fails.
//! The remote tier is optional and best-effort: any remote error marks it
//! degraded, after which all traffic stays local until a reconnect attempt
//! succeeds. Reconnects are attempted lazily, at most once per reconnect
//! interval, and only by one caller at a time.

mod health;
mod memory;
mod remote;
mod stats;
mod store;
mod thread_cache;

pub use health::RemoteStatus;
pub use remote::{build_remote_tier, RedisTier, RemoteTier};
pub use stats::CacheStatsSnapshot;
pub use store::{CacheOptions, CacheStore};
pub use thread_cache::{ThreadCache, THREAD_KEY_PREFIX};

use crate::error::AppError;
use thiserror::Error;

/// Failures of the remote tier. Never surfaced to cache callers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CacheError {
    #[error("remote tier error: {0}")]
    Remote(String),

    #[error("payload could not be (de)serialized: {0}")]
    Serialization(String),

    #[error("remote call timed out after {0} ms")]
    Timeout(u128),

    #[error("remote tier unavailable")]
    Unavailable,
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::Remote(err.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

impl From<CacheError> for AppError {
    fn from(err: CacheError) -> Self {
        AppError::Cache(err.to_string())
    }
}
