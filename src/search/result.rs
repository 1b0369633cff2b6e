use super::DataSourceError;
use crate::models::{Requester, SearchSession, ThreadMatch};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use strum::Display;

/// Why enumeration ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StopReason {
    /// Every candidate was examined
    Exhausted,
    /// The result cap was hit with candidates left
    CapReached,
    /// The wall-clock budget ran out
    TimedOut,
    /// The caller cancelled the search
    Cancelled,
    /// The data source failed as a whole
    SourceFailed,
}

impl StopReason {
    /// Whether the result set is known to be incomplete for reasons other
    /// than a data source failure
    pub fn truncates(&self) -> bool {
        matches!(
            self,
            StopReason::CapReached | StopReason::TimedOut | StopReason::Cancelled
        )
    }
}

/// Outcome of an admitted search. Always carries whatever matched so far.
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// Matches in the requested order
    pub items: Vec<ThreadMatch>,
    pub truncated: bool,
    pub stop_reason: StopReason,
    /// Set when the data source failed and `items` is partial
    pub error: Option<DataSourceError>,
    /// Threads returned by the listing
    pub scanned: usize,
    /// Threads dropped because their record could not be read
    pub skipped: usize,
    pub elapsed: Duration,
}

impl SearchResult {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_partial(&self) -> bool {
        self.truncated || self.error.is_some()
    }

    /// Hand the results over to a pageable session
    pub fn into_session(self, requester: Requester) -> SearchSession {
        let partial = self.is_partial();
        SearchSession::new(requester, self.items, partial)
    }
}
