//! Boolean-query search over forum threads.
//!
//! A search parses the user's query, asks the [`limiter`] for admission,
//! pages through a forum via a [`source::ForumDataSource`], resolves each
//! thread's statistics through a two-tier [`cache`], and returns sorted
//! matches that can be browsed as a [`models::SearchSession`].
//!
//! ```no_run
//! use forum_search::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn run() -> forum_search::error::Result<()> {
//! let config = Config::load()?;
//! let source = Arc::new(InMemoryForumSource::new());
//! let executor = SearchExecutor::from_config(&config, source)?;
//!
//! let request = SearchRequest::new(10, Requester::new(1, 2), "rust -draft")?;
//! let result = executor.execute_search(request, &CancellationToken::new()).await?;
//! println!("{} matches", result.len());
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod limiter;
pub mod metrics;
pub mod models;
pub mod persistence;
pub mod query;
pub mod search;
pub mod source;

pub use error::{AppError, Result};

/// Commonly used types
pub mod prelude {
    pub use crate::cache::{CacheStore, ThreadCache};
    pub use crate::config::Config;
    pub use crate::limiter::{ConcurrencyLimiter, Lease, Rejection};
    pub use crate::models::{
        parse_date_bound, Requester, SearchRequest, SearchSession, SortDirection, SortKey,
        StructuralFilters, ThreadMatch, ThreadRecord,
    };
    pub use crate::query::{evaluate, parse_query, QueryNode};
    pub use crate::search::{
        CancellationToken, SearchExecutor, SearchFailure, SearchResult, SessionStore, StopReason,
    };
    pub use crate::source::{ForumDataSource, InMemoryForumSource, RetryingSource};
}
