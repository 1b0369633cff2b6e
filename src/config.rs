use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

/// Hard upper bound on the number of results a single search may return
pub const MAX_RESULT_CAP: usize = 1000;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct Config {
    /// Search executor configuration
    #[serde(default)]
    #[validate(nested)]
    pub search: SearchConfig,

    /// Two-tier cache configuration
    #[serde(default)]
    #[validate(nested)]
    pub cache: CacheConfig,

    /// Admission control configuration
    #[serde(default)]
    #[validate(nested)]
    pub limiter: LimiterConfig,

    /// Search history / thread stats persistence
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the embedded defaults, an optional file, and environment
    pub fn load() -> Result<Self, crate::error::AppError> {
        let config_path = std::env::var("FORUM_SEARCH_CONFIG")
            .unwrap_or_else(|_| "config/forum-search.toml".to_string());

        let config: Config = config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(&config_path).required(false))
            // Override with environment variables (prefix: FORUM_SEARCH__)
            .add_source(
                config::Environment::with_prefix("FORUM_SEARCH")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SearchConfig {
    /// Maximum number of results a search may accumulate
    #[serde(default = "default_max_results")]
    #[validate(range(min = 1, max = 1000))]
    pub max_results: usize,

    /// Threads requested from the data source per page
    #[serde(default = "default_batch_size")]
    #[validate(range(min = 1, max = 1000))]
    pub batch_size: usize,

    /// Wall-clock budget for a single search (seconds)
    #[serde(default = "default_search_timeout")]
    #[validate(range(min = 1))]
    pub search_timeout_secs: u64,

    /// Concurrent record lookups within one page
    #[serde(default = "default_thread_concurrency")]
    #[validate(range(min = 1, max = 64))]
    pub thread_concurrency: usize,

    /// Lifetime of a produced search session (seconds)
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,

    /// Maximum number of live sessions kept by the session store
    #[serde(default = "default_max_sessions")]
    pub max_sessions: u64,
}

impl SearchConfig {
    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            batch_size: default_batch_size(),
            search_timeout_secs: default_search_timeout(),
            thread_concurrency: default_thread_concurrency(),
            session_ttl_secs: default_session_ttl(),
            max_sessions: default_max_sessions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CacheConfig {
    /// Entry time-to-live (seconds)
    #[serde(default = "default_cache_ttl")]
    #[validate(range(min = 1))]
    pub ttl_secs: u64,

    /// Memory tier capacity (entries)
    #[serde(default = "default_cache_max_items")]
    #[validate(range(min = 1))]
    pub max_items: usize,

    /// Enable the shared Redis tier
    #[serde(default)]
    pub remote_enabled: bool,

    /// Redis connection string
    pub redis_url: Option<String>,

    /// Key prefix for entries in the remote tier
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Timeout for a single remote call (milliseconds)
    #[serde(default = "default_remote_timeout")]
    #[validate(range(min = 1))]
    pub remote_timeout_ms: u64,

    /// Timeout for establishing the remote connection (milliseconds)
    #[serde(default = "default_connect_timeout")]
    #[validate(range(min = 1))]
    pub connect_timeout_ms: u64,

    /// Minimum delay between reconnect attempts while degraded (seconds)
    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval_secs: u64,

    /// Interval of the background expiry sweep (seconds)
    #[serde(default = "default_cleanup_interval")]
    #[validate(range(min = 1))]
    pub cleanup_interval_secs: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl(),
            max_items: default_cache_max_items(),
            remote_enabled: false,
            redis_url: None,
            key_prefix: default_key_prefix(),
            remote_timeout_ms: default_remote_timeout(),
            connect_timeout_ms: default_connect_timeout(),
            reconnect_interval_secs: default_reconnect_interval(),
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LimiterConfig {
    /// Concurrent searches allowed per guild
    #[serde(default = "default_guild_concurrent")]
    #[validate(range(min = 1))]
    pub guild_concurrent_searches: usize,

    /// Concurrent searches allowed across all guilds
    #[serde(default = "default_global_concurrent")]
    #[validate(range(min = 1))]
    pub global_concurrent_searches: usize,

    /// Minimum delay between two searches of the same user (seconds)
    #[serde(default = "default_user_cooldown")]
    pub user_cooldown_secs: u64,
}

impl LimiterConfig {
    pub fn user_cooldown(&self) -> Duration {
        Duration::from_secs(self.user_cooldown_secs)
    }
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            guild_concurrent_searches: default_guild_concurrent(),
            global_concurrent_searches: default_global_concurrent(),
            user_cooldown_secs: default_user_cooldown(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Persistence backend
    #[serde(default)]
    pub backend: PersistenceBackend,

    /// Path for the embedded database (sled)
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceBackend {
    #[default]
    Memory,
    Sled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub prometheus_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            prometheus_enabled: default_true(),
        }
    }
}

// Default value functions
fn default_max_results() -> usize {
    MAX_RESULT_CAP
}

fn default_batch_size() -> usize {
    100
}

fn default_search_timeout() -> u64 {
    60
}

fn default_thread_concurrency() -> usize {
    8
}

fn default_session_ttl() -> u64 {
    900 // 15 minutes
}

fn default_max_sessions() -> u64 {
    10_000
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_cache_max_items() -> usize {
    5000
}

fn default_key_prefix() -> String {
    "forum-search".to_string()
}

fn default_remote_timeout() -> u64 {
    250
}

fn default_connect_timeout() -> u64 {
    2000
}

fn default_reconnect_interval() -> u64 {
    60
}

fn default_cleanup_interval() -> u64 {
    300
}

fn default_guild_concurrent() -> usize {
    3
}

fn default_global_concurrent() -> usize {
    5
}

fn default_user_cooldown() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}
