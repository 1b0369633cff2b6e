//! Prometheus metrics for searches, caches and admission control.
//!
//! All collectors live in one process-wide container so components can
//! record without carrying a handle. Nothing is exported until
//! [`init_metrics`] registers them with a registry.

use lazy_static::lazy_static;
use prometheus::{CounterVec, Gauge, Histogram, HistogramOpts, Opts, Registry};

const NAMESPACE: &str = "forum_search";

/// Container for all search metrics
pub struct SearchMetrics {
    /// Finished searches by outcome
    /// (exhausted, cap_reached, timed_out, cancelled, source_failed, rejected)
    pub searches_total: CounterVec,

    /// Wall-clock duration of admitted searches
    pub search_duration: Histogram,

    /// Results returned per search
    pub search_results: Histogram,

    /// Threads skipped because their record could not be read
    pub threads_skipped: CounterVec,

    /// Searches currently holding a lease
    pub active_searches: Gauge,

    /// Cache lookups by cache, tier and result
    pub cache_lookups: CounterVec,

    /// Memory tier entries evicted for capacity
    pub cache_evictions: CounterVec,

    /// Times a remote tier was marked degraded
    pub remote_degradations: CounterVec,

    /// Admission rejections by reason (guild_limit, global_limit, cooldown)
    pub limiter_rejections: CounterVec,
}

impl SearchMetrics {
    fn new() -> Self {
        Self {
            searches_total: CounterVec::new(
                Opts::new("searches_total", "Total number of searches by outcome")
                    .namespace(NAMESPACE),
                &["outcome"],
            )
            .expect("Failed to create searches_total metric"),

            search_duration: Histogram::with_opts(
                HistogramOpts::new("search_duration_seconds", "Search duration in seconds")
                    .namespace(NAMESPACE)
                    .buckets(vec![
                        0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
                    ]),
            )
            .expect("Failed to create search_duration_seconds metric"),

            search_results: Histogram::with_opts(
                HistogramOpts::new("search_results", "Number of results returned per search")
                    .namespace(NAMESPACE)
                    .buckets(vec![0.0, 1.0, 5.0, 10.0, 50.0, 100.0, 250.0, 500.0, 1000.0]),
            )
            .expect("Failed to create search_results metric"),

            threads_skipped: CounterVec::new(
                Opts::new(
                    "threads_skipped_total",
                    "Threads skipped because their record was unavailable",
                )
                .namespace(NAMESPACE),
                &["reason"],
            )
            .expect("Failed to create threads_skipped_total metric"),

            active_searches: Gauge::with_opts(
                Opts::new("active_searches", "Searches currently running").namespace(NAMESPACE),
            )
            .expect("Failed to create active_searches metric"),

            cache_lookups: CounterVec::new(
                Opts::new("cache_lookups_total", "Cache lookups by tier and result")
                    .namespace(NAMESPACE),
                &["cache", "tier", "result"],
            )
            .expect("Failed to create cache_lookups_total metric"),

            cache_evictions: CounterVec::new(
                Opts::new(
                    "cache_evictions_total",
                    "Memory tier entries evicted for capacity",
                )
                .namespace(NAMESPACE),
                &["cache"],
            )
            .expect("Failed to create cache_evictions_total metric"),

            remote_degradations: CounterVec::new(
                Opts::new(
                    "cache_remote_degradations_total",
                    "Times the remote tier was marked degraded",
                )
                .namespace(NAMESPACE),
                &["cache"],
            )
            .expect("Failed to create cache_remote_degradations_total metric"),

            limiter_rejections: CounterVec::new(
                Opts::new(
                    "limiter_rejections_total",
                    "Searches rejected by admission control",
                )
                .namespace(NAMESPACE),
                &["reason"],
            )
            .expect("Failed to create limiter_rejections_total metric"),
        }
    }
}

lazy_static! {
    /// Global search metrics instance
    pub static ref SEARCH_METRICS: SearchMetrics = SearchMetrics::new();
}

/// Register all search metrics with the given registry
pub fn init_metrics(registry: &Registry) -> Result<(), prometheus::Error> {
    registry.register(Box::new(SEARCH_METRICS.searches_total.clone()))?;
    registry.register(Box::new(SEARCH_METRICS.search_duration.clone()))?;
    registry.register(Box::new(SEARCH_METRICS.search_results.clone()))?;
    registry.register(Box::new(SEARCH_METRICS.threads_skipped.clone()))?;
    registry.register(Box::new(SEARCH_METRICS.active_searches.clone()))?;
    registry.register(Box::new(SEARCH_METRICS.cache_lookups.clone()))?;
    registry.register(Box::new(SEARCH_METRICS.cache_evictions.clone()))?;
    registry.register(Box::new(SEARCH_METRICS.remote_degradations.clone()))?;
    registry.register(Box::new(SEARCH_METRICS.limiter_rejections.clone()))?;

    tracing::info!("Search metrics initialized");
    Ok(())
}

/// Encode a registry in Prometheus text format
pub fn gather_metrics(registry: &Registry) -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Failed to convert metrics to string: {}", e);
        String::from("# Error converting metrics\n")
    })
}
