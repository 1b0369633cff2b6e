//! Search execution.
//!
//! ```text
//!  SearchRequest
//!       │ validate, acquire lease ──► SearchFailure
//!       ▼
//!  list_threads page ──► structural pre-filter (listing data)
//!       │
//!       ▼  bounded concurrency, order preserved
//!  resolve record (cache, then data source) ──► record filters
//!       │
//!       ▼
//!  first post + query / exclude words ──► matches
//!       │ cap, timeout, cancel checked per batch
//!       ▼
//!  sort ──► SearchResult ──► history (background)
//! ```

mod cancel;
mod executor;
mod result;
mod session;
mod sort;

pub use cancel::CancellationToken;
pub use executor::SearchExecutor;
pub use result::{SearchResult, StopReason};
pub use session::SessionStore;
pub use sort::sort_matches;

use crate::error::AppError;
use crate::limiter::Rejection;
use crate::query::ParseError;
use crate::source::SourceError;
use thiserror::Error;

/// Data source problems observed during a search
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataSourceError {
    /// One thread could not be read; it was skipped
    #[error("thread {thread_id} unavailable: {reason}")]
    ThreadUnavailable { thread_id: u64, reason: SourceError },

    /// The platform failed as a whole; enumeration stopped
    #[error("forum data source unavailable: {0}")]
    DataSourceUnavailable(String),
}

/// Reasons a search produced no result at all
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SearchFailure {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Rejected(#[from] Rejection),

    #[error("invalid search request: {0}")]
    InvalidRequest(String),
}

impl From<SearchFailure> for AppError {
    fn from(err: SearchFailure) -> Self {
        match err {
            SearchFailure::Parse(e) => e.into(),
            SearchFailure::Rejected(e) => e.into(),
            SearchFailure::InvalidRequest(msg) => AppError::Validation(msg),
        }
    }
}

impl From<DataSourceError> for AppError {
    fn from(err: DataSourceError) -> Self {
        AppError::DataSource(err.to_string())
    }
}
