use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use forum_search::cache::RemoteStatus;
use forum_search::config::{Config, ObservabilityConfig};
use forum_search::metrics::{gather_metrics, init_metrics};
use forum_search::models::{
    parse_date_bound, Requester, SearchRequest, SortDirection, SortKey, StructuralFilters,
};
use forum_search::query::parse_query;
use forum_search::search::{CancellationToken, SearchExecutor, SessionStore};
use forum_search::source::{ForumFixture, InMemoryForumSource, RetryingSource};
use prometheus::Registry;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "forum-search")]
#[command(about = "Search forum threads with boolean queries and filters", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a query and print its canonical form
    Parse {
        #[arg(value_name = "QUERY")]
        query: String,
    },

    /// Run a search against a forum fixture
    Search(SearchArgs),
}

#[derive(Args)]
struct SearchArgs {
    /// JSON file with the forum's threads
    #[arg(short, long)]
    fixture: PathBuf,

    #[arg(long)]
    forum: u64,

    #[arg(short, long, default_value = "")]
    query: String,

    #[arg(long, default_value = "1")]
    guild: u64,

    #[arg(long, default_value = "1")]
    user: u64,

    /// reaction_count, reply_count, created_at or last_active_at
    #[arg(short, long, default_value = "reaction_count")]
    sort: SortKey,

    /// ascending or descending
    #[arg(short, long, default_value = "descending")]
    direction: SortDirection,

    #[arg(short, long)]
    cap: Option<usize>,

    #[arg(long, value_delimiter = ',')]
    tags: Vec<String>,

    #[arg(long, value_delimiter = ',')]
    exclude_tags: Vec<String>,

    #[arg(long, value_delimiter = ',')]
    authors: Vec<u64>,

    #[arg(long, value_delimiter = ',')]
    exclude_authors: Vec<u64>,

    /// Date (2024-01-15) or offset (7d, 2w, 3m, 1y)
    #[arg(long)]
    after: Option<String>,

    #[arg(long)]
    before: Option<String>,

    #[arg(long)]
    min_reactions: Option<u64>,

    #[arg(long)]
    min_replies: Option<u64>,

    #[arg(long, value_delimiter = ',')]
    exclude_words: Vec<String>,

    /// Match on thread titles only
    #[arg(long)]
    no_first_post: bool,

    #[arg(short, long, default_value = "0")]
    page: usize,

    #[arg(long, default_value = "10")]
    page_size: usize,

    /// Dump Prometheus metrics to stderr afterwards
    #[arg(long)]
    metrics: bool,
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    let (json_layer, text_layer) = if config.json_logs {
        (Some(fmt::layer().json().with_writer(std::io::stderr)), None)
    } else {
        (None, Some(fmt::layer().with_writer(std::io::stderr)))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}

fn date_bound(text: Option<&str>, flag: &str) -> anyhow::Result<Option<chrono::DateTime<Utc>>> {
    match text {
        None => Ok(None),
        Some(text) => match parse_date_bound(text, Utc::now()) {
            Some(bound) => Ok(Some(bound)),
            None => bail!("--{}: unrecognised date '{}'", flag, text),
        },
    }
}

fn build_request(args: &SearchArgs) -> anyhow::Result<SearchRequest> {
    let filters = StructuralFilters {
        include_tags: args.tags.clone(),
        exclude_tags: args.exclude_tags.clone(),
        include_authors: args.authors.clone(),
        exclude_authors: args.exclude_authors.clone(),
        created_after: date_bound(args.after.as_deref(), "after")?,
        created_before: date_bound(args.before.as_deref(), "before")?,
        min_reactions: args.min_reactions,
        min_replies: args.min_replies,
        exclude_words: args.exclude_words.clone(),
    };

    let mut request = SearchRequest::new(
        args.forum,
        Requester::new(args.user, args.guild),
        &args.query,
    )?
    .with_filters(filters)
    .with_sort(args.sort, args.direction)
    .with_first_post(!args.no_first_post);

    if let Some(cap) = args.cap {
        request = request.with_result_cap(cap);
    }
    Ok(request)
}

async fn run_search(config: Config, args: SearchArgs) -> anyhow::Result<()> {
    let registry = Registry::new();
    if config.observability.prometheus_enabled || args.metrics {
        init_metrics(&registry).context("registering metrics")?;
    }

    let fixture = ForumFixture::load(&args.fixture)
        .with_context(|| format!("loading fixture {}", args.fixture.display()))?;
    info!(threads = fixture.threads.len(), "Fixture loaded");

    let source = Arc::new(RetryingSource::new(InMemoryForumSource::from_fixture(fixture)));
    let executor = SearchExecutor::from_config(&config, source)?;

    if executor.cache().remote_status() != RemoteStatus::Disabled
        && !executor.cache().connect().await
    {
        warn!("Remote cache unreachable, continuing with the memory tier");
    }
    let cleanup = executor
        .cache()
        .spawn_cleanup_task(config.cache.cleanup_interval());

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling search");
            on_interrupt.cancel();
        }
    });

    let request = build_request(&args)?;
    let requester = request.requester;
    let result = executor.execute_search(request, &cancel).await?;

    let stop_reason = result.stop_reason;
    let scanned = result.scanned;
    let skipped = result.skipped;
    let elapsed_ms = result.elapsed.as_millis() as u64;
    let error = result.error.as_ref().map(|e| e.to_string());

    let sessions = SessionStore::from_config(&config.search);
    let session = sessions.insert(result.into_session(requester)).await;

    let output = json!({
        "session_id": session.id,
        "total": session.results.len(),
        "truncated": session.truncated,
        "stop_reason": stop_reason.to_string(),
        "error": error,
        "scanned": scanned,
        "skipped": skipped,
        "elapsed_ms": elapsed_ms,
        "page": args.page,
        "page_count": session.page_count(args.page_size),
        "results": session.page(args.page, args.page_size),
        "expires_at": session.expires_at,
        "cache": executor.cache().stats(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    sessions.close(&session.id).await;
    cleanup.abort();

    if args.metrics {
        eprintln!("{}", gather_metrics(&registry));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;
    init_tracing(&config.observability);

    match cli.command {
        Commands::Parse { query } => {
            let ast = parse_query(&query)?;
            println!("{}", ast);
            println!("{}", serde_json::to_string_pretty(&ast)?);
        }
        Commands::Search(args) => run_search(config, args).await?,
    }

    Ok(())
}
