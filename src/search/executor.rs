use super::{
    sort_matches, CancellationToken, DataSourceError, SearchFailure, SearchResult, StopReason,
};
use crate::cache::ThreadCache;
use crate::config::{Config, SearchConfig};
use crate::error::Result as AppResult;
use crate::limiter::ConcurrencyLimiter;
use crate::metrics::SEARCH_METRICS;
use crate::models::{SearchHistoryEntry, SearchRequest, ThreadHandle, ThreadMatch, ThreadRecord};
use crate::persistence::{create_persistence, SearchPersistence};
use crate::source::{ForumDataSource, SourceError, SourceResult};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, instrument, warn};

/// Verdict on one listed thread
enum Candidate {
    Matched(ThreadMatch),
    Rejected,
    Skipped(DataSourceError),
    Failed(SourceError),
}

#[derive(Default)]
struct ScanState {
    items: Vec<ThreadMatch>,
    scanned: usize,
    skipped: usize,
}

/// Runs searches against a forum data source.
///
/// Holds no per-search state; one executor serves any number of
/// concurrent searches, bounded by its limiter.
pub struct SearchExecutor {
    config: SearchConfig,
    cache: ThreadCache,
    limiter: ConcurrencyLimiter,
    source: Arc<dyn ForumDataSource>,
    persistence: Arc<dyn SearchPersistence>,
}

impl SearchExecutor {
    pub fn new(
        config: SearchConfig,
        cache: ThreadCache,
        limiter: ConcurrencyLimiter,
        source: Arc<dyn ForumDataSource>,
        persistence: Arc<dyn SearchPersistence>,
    ) -> Self {
        Self {
            config,
            cache,
            limiter,
            source,
            persistence,
        }
    }

    /// Wire cache, limiter and persistence as configured around a data source
    pub fn from_config(config: &Config, source: Arc<dyn ForumDataSource>) -> AppResult<Self> {
        let cache = ThreadCache::from_config(&config.cache)?;
        let persistence = create_persistence(&config.persistence)?;

        Ok(Self::new(
            config.search.clone(),
            cache,
            ConcurrencyLimiter::from_config(&config.limiter),
            source,
            persistence,
        ))
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn cache(&self) -> &ThreadCache {
        &self.cache
    }

    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    /// Effective result cap, or why the request cannot run
    fn check_request(&self, request: &SearchRequest) -> Result<usize, SearchFailure> {
        if request.result_cap == 0 {
            return Err(SearchFailure::InvalidRequest(
                "result cap must be at least 1".to_string(),
            ));
        }
        request
            .filters
            .validate()
            .map_err(SearchFailure::InvalidRequest)?;

        Ok(request.result_cap.min(self.config.max_results))
    }

    /// Run one search to completion.
    ///
    /// Errors only when the request is invalid or not admitted; once
    /// admitted, every outcome (including cancellation, timeout and data
    /// source outages) is a [`SearchResult`] holding the matches found so far.
    #[instrument(
        skip_all,
        fields(
            forum_id = request.forum_id,
            guild_id = request.requester.guild_id,
            user_id = request.requester.user_id
        )
    )]
    pub async fn execute_search(
        &self,
        mut request: SearchRequest,
        cancel: &CancellationToken,
    ) -> Result<SearchResult, SearchFailure> {
        // Filters may have been assigned or deserialized without normalizing
        request.filters = std::mem::take(&mut request.filters).normalized();
        let cap = self.check_request(&request)?;

        let lease = match self
            .limiter
            .acquire(request.requester.guild_id, request.requester.user_id)
        {
            Ok(lease) => lease,
            Err(rejection) => {
                SEARCH_METRICS
                    .searches_total
                    .with_label_values(&["rejected"])
                    .inc();
                info!(reason = %rejection, "Search not admitted");
                return Err(rejection.into());
            }
        };

        let started = Instant::now();
        info!(query = %request.query_text, cap, "Search started");

        let mut state = ScanState::default();
        let (stop_reason, error) = self.scan(&request, cap, started, cancel, &mut state).await;
        lease.release();

        let mut items = state.items;
        sort_matches(&mut items, request.sort, request.direction);

        let elapsed = started.elapsed();
        let result = SearchResult {
            items,
            truncated: stop_reason.truncates(),
            stop_reason,
            error,
            scanned: state.scanned,
            skipped: state.skipped,
            elapsed,
        };

        SEARCH_METRICS
            .searches_total
            .with_label_values(&[stop_reason.to_string().as_str()])
            .inc();
        SEARCH_METRICS.search_duration.observe(elapsed.as_secs_f64());
        SEARCH_METRICS.search_results.observe(result.len() as f64);

        info!(
            results = result.len(),
            scanned = result.scanned,
            skipped = result.skipped,
            stop_reason = %stop_reason,
            elapsed_ms = elapsed.as_millis() as u64,
            "Search finished"
        );

        self.record_history(&request, result.len(), elapsed.as_secs_f64());
        Ok(result)
    }

    async fn scan(
        &self,
        request: &SearchRequest,
        cap: usize,
        started: Instant,
        cancel: &CancellationToken,
        state: &mut ScanState,
    ) -> (StopReason, Option<DataSourceError>) {
        let deadline = started + self.config.search_timeout();
        let server_filters = request.filters.server_side();
        let mut cursor: Option<String> = None;

        loop {
            if cancel.is_cancelled() {
                info!(matches = state.items.len(), "Search cancelled");
                return (StopReason::Cancelled, None);
            }
            if Instant::now() >= deadline {
                return Self::timed_out(state);
            }

            let listing = self.source.list_threads(
                request.forum_id,
                &server_filters,
                cursor.take(),
                self.config.batch_size,
            );
            let page = match timeout_at(deadline, listing).await {
                Err(_) => return Self::timed_out(state),
                Ok(Err(e)) => {
                    error!(error = %e, matches = state.items.len(), "Forum listing failed, returning partial results");
                    return (
                        StopReason::SourceFailed,
                        Some(DataSourceError::DataSourceUnavailable(e.to_string())),
                    );
                }
                Ok(Ok(page)) => page,
            };

            state.scanned += page.threads.len();
            let next_cursor = page.next_cursor;
            let candidates: Vec<ThreadHandle> = page
                .threads
                .into_iter()
                .filter(|handle| request.filters.admits_handle(handle))
                .collect();
            let candidate_count = candidates.len();
            debug!(candidates = candidate_count, "Evaluating page");

            let mut verdicts = std::pin::pin!(stream::iter(candidates)
                .map(|handle| self.evaluate(handle, request))
                .buffered(self.config.thread_concurrency.max(1)));
            let mut consumed = 0;

            loop {
                let verdict = match timeout_at(deadline, verdicts.next()).await {
                    Err(_) => return Self::timed_out(state),
                    Ok(None) => break,
                    Ok(Some(verdict)) => verdict,
                };
                consumed += 1;

                match verdict {
                    Candidate::Matched(item) => {
                        state.items.push(item);
                        if state.items.len() >= cap {
                            let more_left = consumed < candidate_count || next_cursor.is_some();
                            if more_left {
                                info!(cap, "Result cap reached");
                                return (StopReason::CapReached, None);
                            }
                            return (StopReason::Exhausted, None);
                        }
                    }
                    Candidate::Rejected => {}
                    Candidate::Skipped(reason) => {
                        state.skipped += 1;
                        if let DataSourceError::ThreadUnavailable { reason: cause, .. } = &reason {
                            SEARCH_METRICS
                                .threads_skipped
                                .with_label_values(&[cause.label()])
                                .inc();
                        }
                        warn!(error = %reason, "Skipping thread");
                    }
                    Candidate::Failed(e) => {
                        error!(error = %e, matches = state.items.len(), "Forum data source failed, returning partial results");
                        return (
                            StopReason::SourceFailed,
                            Some(DataSourceError::DataSourceUnavailable(e.to_string())),
                        );
                    }
                }
            }

            match next_cursor {
                Some(next) => cursor = Some(next),
                None => return (StopReason::Exhausted, None),
            }
        }
    }

    fn timed_out(state: &ScanState) -> (StopReason, Option<DataSourceError>) {
        warn!(matches = state.items.len(), "Search timed out");
        (StopReason::TimedOut, None)
    }

    /// Cached record, or a fresh one that is then cached and persisted
    async fn resolve_record(&self, thread_id: u64) -> SourceResult<ThreadRecord> {
        if let Some(record) = self.cache.get(thread_id).await {
            return Ok(record);
        }

        let record = self.source.fetch_thread_record(thread_id).await?;
        self.cache.put(record.clone());

        let persistence = Arc::clone(&self.persistence);
        let stats = record.clone();
        tokio::spawn(async move {
            if let Err(e) = persistence.upsert_thread_stats(&stats).await {
                warn!(thread_id = stats.id, error = %e, "Failed to persist thread stats");
            }
        });

        Ok(record)
    }

    async fn first_post(&self, thread_id: u64) -> Result<Option<String>, SourceError> {
        match self.source.list_messages(thread_id, None, 1).await {
            Ok(page) => Ok(page.messages.into_iter().next().map(|m| m.content)),
            Err(e @ SourceError::Unavailable(_)) => Err(e),
            Err(e) => {
                debug!(thread_id, error = %e, "First post unavailable, matching on title only");
                Ok(None)
            }
        }
    }

    async fn evaluate(&self, handle: ThreadHandle, request: &SearchRequest) -> Candidate {
        let record = match self.resolve_record(handle.id).await {
            Ok(record) => record,
            Err(e @ SourceError::Unavailable(_)) => return Candidate::Failed(e),
            Err(reason) => {
                return Candidate::Skipped(DataSourceError::ThreadUnavailable {
                    thread_id: handle.id,
                    reason,
                })
            }
        };

        if !request.filters.admits_record(&record) {
            return Candidate::Rejected;
        }

        let needs_text = request.ast.is_some() || !request.filters.exclude_words.is_empty();
        let first_post = if request.include_first_post && needs_text {
            match self.first_post(handle.id).await {
                Ok(post) => post,
                Err(e) => return Candidate::Failed(e),
            }
        } else {
            None
        };

        let mut haystack = handle.title.to_lowercase();
        if let Some(body) = &first_post {
            haystack.push('\n');
            haystack.push_str(&body.to_lowercase());
        }

        if request.filters.excludes_text(&haystack) {
            return Candidate::Rejected;
        }
        if let Some(ast) = &request.ast {
            if !ast.matches_folded(&haystack) {
                return Candidate::Rejected;
            }
        }

        Candidate::Matched(ThreadMatch {
            thread_id: handle.id,
            title: handle.title,
            record,
            first_post,
        })
    }

    fn record_history(&self, request: &SearchRequest, result_count: usize, elapsed_seconds: f64) {
        let entry = SearchHistoryEntry {
            user_id: request.requester.user_id,
            guild_id: request.requester.guild_id,
            query_text: request.query_text.clone(),
            result_count,
            elapsed_seconds,
            recorded_at: Utc::now(),
        };

        let persistence = Arc::clone(&self.persistence);
        tokio::spawn(async move {
            if let Err(e) = persistence.record_search_history(&entry).await {
                warn!(user_id = entry.user_id, error = %e, "Failed to record search history");
            }
        });
    }
}
