mod common;

use chrono::Duration as ChronoDuration;
use common::{base_time, executor, executor_with, settle, ThreadBuilder, FORUM_ID, GUILD_ID};
use forum_search::cache::ThreadCache;
use forum_search::config::SearchConfig;
use forum_search::limiter::{ConcurrencyLimiter, Rejection};
use forum_search::models::{
    Requester, SearchRequest, SortDirection, SortKey, StructuralFilters,
};
use forum_search::persistence::{InMemoryPersistence, SearchPersistence};
use forum_search::search::{
    CancellationToken, DataSourceError, SearchExecutor, SearchFailure, SearchResult, StopReason,
};
use forum_search::source::{InMemoryForumSource, RetryingSource, SourceError};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn request(query: &str) -> SearchRequest {
    SearchRequest::new(FORUM_ID, Requester::new(9, GUILD_ID), query).unwrap()
}

fn ids(result: &SearchResult) -> Vec<u64> {
    result.items.iter().map(|m| m.thread_id).collect()
}

async fn run(executor: &SearchExecutor, request: SearchRequest) -> SearchResult {
    executor
        .execute_search(request, &CancellationToken::new())
        .await
        .unwrap()
}

fn forum_of(count: u64, title: &str) -> Arc<InMemoryForumSource> {
    let source = Arc::new(InMemoryForumSource::new());
    for id in 1..=count {
        source.insert(ThreadBuilder::new(id, title).reactions(id).build());
    }
    source
}

#[tokio::test]
async fn test_cap_truncates_when_more_matches_remain() {
    let executor = executor(forum_of(10, "rust question"));

    let result = run(&executor, request("rust").with_result_cap(5)).await;

    assert_eq!(result.len(), 5);
    assert!(result.truncated);
    assert_eq!(result.stop_reason, StopReason::CapReached);
    assert!(result.error.is_none());
}

#[tokio::test]
async fn test_cap_equal_to_match_count_is_not_truncated() {
    let executor = executor(forum_of(4, "rust question"));

    let result = run(&executor, request("rust").with_result_cap(4)).await;

    assert_eq!(result.len(), 4);
    assert!(!result.truncated);
    assert_eq!(result.stop_reason, StopReason::Exhausted);
}

#[tokio::test]
async fn test_cap_is_bounded_by_configured_maximum() {
    let executor = executor_with(
        forum_of(10, "rust"),
        SearchConfig {
            max_results: 3,
            batch_size: 4,
            ..SearchConfig::default()
        },
        ConcurrencyLimiter::new(3, 5, Duration::ZERO),
    );

    let result = run(&executor, request("rust").with_result_cap(100)).await;
    assert_eq!(result.len(), 3);
    assert!(result.truncated);
}

#[tokio::test]
async fn test_results_are_sorted_after_collection() {
    let source = Arc::new(InMemoryForumSource::new());
    source.insert(ThreadBuilder::new(1, "guide a").reactions(5).replies(1).build());
    source.insert(ThreadBuilder::new(2, "guide b").reactions(9).replies(3).build());
    source.insert(ThreadBuilder::new(3, "guide c").reactions(5).replies(2).build());
    source.insert(ThreadBuilder::new(4, "news").reactions(50).build());
    let executor = executor(source);

    let by_reactions = run(&executor, request("guide")).await;
    assert_eq!(ids(&by_reactions), vec![2, 1, 3]);

    let by_replies = run(
        &executor,
        SearchRequest::new(FORUM_ID, Requester::new(10, GUILD_ID), "guide")
            .unwrap()
            .with_sort(SortKey::ReplyCount, SortDirection::Ascending),
    )
    .await;
    assert_eq!(ids(&by_replies), vec![1, 3, 2]);
}

#[tokio::test]
async fn test_boolean_query_over_title_and_first_post() {
    let source = Arc::new(InMemoryForumSource::new());
    source.insert(
        ThreadBuilder::new(1, "Lifetimes explained")
            .first_post("A beginner guide to borrowing")
            .build(),
    );
    source.insert(
        ThreadBuilder::new(2, "Async guide (draft)")
            .first_post("tokio basics")
            .build(),
    );
    source.insert(ThreadBuilder::new(3, "Tutorial: serde").build());
    source.insert(ThreadBuilder::new(4, "Unrelated").first_post("nothing here").build());
    let executor = executor(source);

    let result = run(&executor, request("(guide OR tutorial) -draft")).await;
    let mut found = ids(&result);
    found.sort_unstable();
    assert_eq!(found, vec![1, 3]);

    let with_body = result.items.iter().find(|m| m.thread_id == 1).unwrap();
    assert_eq!(
        with_body.first_post.as_deref(),
        Some("A beginner guide to borrowing")
    );
}

#[tokio::test]
async fn test_titles_only_when_first_post_disabled() {
    let source = Arc::new(InMemoryForumSource::new());
    source.insert(
        ThreadBuilder::new(1, "Lifetimes explained")
            .first_post("A beginner guide")
            .build(),
    );
    let executor = executor(source);

    let result = run(&executor, request("guide").with_first_post(false)).await;
    assert!(result.is_empty());
    assert_eq!(result.scanned, 1);
}

#[tokio::test]
async fn test_phrase_requires_exact_sequence() {
    let source = Arc::new(InMemoryForumSource::new());
    source.insert(ThreadBuilder::new(1, "error handling in rust").build());
    source.insert(ThreadBuilder::new(2, "handling an error").build());
    let executor = executor(source);

    let result = run(&executor, request("\"error handling\"")).await;
    assert_eq!(ids(&result), vec![1]);
}

#[tokio::test]
async fn test_structural_filters() {
    let source = Arc::new(InMemoryForumSource::new());
    source.insert(
        ThreadBuilder::new(1, "a")
            .tags(&["Guide"])
            .author(1)
            .reactions(10)
            .replies(4)
            .age_days(2)
            .build(),
    );
    source.insert(
        ThreadBuilder::new(2, "b")
            .tags(&["guide", "draft"])
            .author(1)
            .reactions(10)
            .replies(4)
            .age_days(2)
            .build(),
    );
    source.insert(
        ThreadBuilder::new(3, "c")
            .tags(&["guide"])
            .author(2)
            .reactions(10)
            .replies(4)
            .age_days(2)
            .build(),
    );
    source.insert(
        ThreadBuilder::new(4, "d")
            .tags(&["guide"])
            .author(1)
            .reactions(1)
            .replies(4)
            .age_days(2)
            .build(),
    );
    source.insert(
        ThreadBuilder::new(5, "e")
            .tags(&["guide"])
            .author(1)
            .reactions(10)
            .replies(4)
            .age_days(40)
            .build(),
    );
    source.insert(
        ThreadBuilder::new(6, "f spoiler")
            .tags(&["guide"])
            .author(1)
            .reactions(10)
            .replies(4)
            .age_days(2)
            .build(),
    );
    source.insert(
        ThreadBuilder::new(7, "g")
            .tags(&["help"])
            .author(1)
            .reactions(10)
            .replies(4)
            .age_days(2)
            .build(),
    );
    let executor = executor(source);

    let filters = StructuralFilters {
        include_tags: vec!["GUIDE".to_string()],
        exclude_tags: vec!["draft".to_string()],
        include_authors: vec![1],
        created_after: Some(base_time() - ChronoDuration::days(30)),
        created_before: Some(base_time()),
        min_reactions: Some(5),
        min_replies: Some(2),
        exclude_words: vec!["Spoiler".to_string()],
        ..Default::default()
    };

    let result = run(&executor, request("").with_filters(filters)).await;
    assert_eq!(ids(&result), vec![1]);
}

#[tokio::test]
async fn test_filters_assigned_directly_ignore_case() {
    let source = Arc::new(InMemoryForumSource::new());
    source.insert(ThreadBuilder::new(1, "cheap spam offer").tags(&["guide"]).build());
    source.insert(ThreadBuilder::new(2, "clean thread").tags(&["guide"]).build());
    source.insert(ThreadBuilder::new(3, "clean but untagged").build());
    let executor = executor(source);

    let mut words = request("");
    words.filters = StructuralFilters {
        exclude_words: vec!["Spam".to_string()],
        ..Default::default()
    };
    assert_eq!(ids(&run(&executor, words).await), vec![2, 3]);

    let mut tags = request("");
    tags.filters = StructuralFilters {
        include_tags: vec![" Guide ".to_string()],
        exclude_words: vec!["SPAM".to_string()],
        ..Default::default()
    };
    assert_eq!(ids(&run(&executor, tags).await), vec![2]);

    let json = serde_json::json!({
        "include_tags": ["GUIDE"],
        "exclude_tags": [],
        "include_authors": [],
        "exclude_authors": [],
        "created_after": null,
        "created_before": null,
        "min_reactions": null,
        "min_replies": null,
        "exclude_words": ["Cheap"]
    });
    let mut deserialized = request("");
    deserialized.filters = serde_json::from_value(json).unwrap();
    assert_eq!(ids(&run(&executor, deserialized).await), vec![2]);
}

#[tokio::test]
async fn test_excluded_author() {
    let source = Arc::new(InMemoryForumSource::new());
    source.insert(ThreadBuilder::new(1, "post").author(1).build());
    source.insert(ThreadBuilder::new(2, "post").author(2).build());
    let executor = executor(source);

    let filters = StructuralFilters {
        exclude_authors: vec![2],
        ..Default::default()
    };
    let result = run(&executor, request("post").with_filters(filters)).await;
    assert_eq!(ids(&result), vec![1]);
}

#[tokio::test]
async fn test_timeout_returns_partial_results() {
    let source = forum_of(40, "rust");
    source.set_page_delay(Duration::from_millis(300));
    let executor = executor_with(
        source,
        SearchConfig {
            batch_size: 4,
            search_timeout_secs: 1,
            ..SearchConfig::default()
        },
        ConcurrencyLimiter::new(3, 5, Duration::ZERO),
    );

    let started = Instant::now();
    let result = run(&executor, request("rust")).await;

    assert_eq!(result.stop_reason, StopReason::TimedOut);
    assert!(result.truncated);
    assert!(!result.is_empty());
    assert!(result.len() < 40);
    assert!(started.elapsed() < Duration::from_millis(1800));
    assert_eq!(executor.limiter().active_total(), 0);
}

#[tokio::test]
async fn test_cancellation_before_start() {
    let executor = executor(forum_of(10, "rust"));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = executor
        .execute_search(request("rust"), &cancel)
        .await
        .unwrap();

    assert_eq!(result.stop_reason, StopReason::Cancelled);
    assert!(result.truncated);
    assert!(result.is_empty());
    assert_eq!(executor.limiter().active_total(), 0);
}

#[tokio::test]
async fn test_cancellation_mid_search_keeps_matches() {
    let source = forum_of(40, "rust");
    source.set_page_delay(Duration::from_millis(100));
    let executor = executor(source);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(250)).await;
        trigger.cancel();
    });

    let result = executor
        .execute_search(request("rust"), &cancel)
        .await
        .unwrap();

    assert_eq!(result.stop_reason, StopReason::Cancelled);
    assert!(!result.is_empty());
    assert!(result.len() < 40);
}

#[tokio::test]
async fn test_outage_returns_partial_results_with_error() {
    let source = forum_of(12, "rust");
    source.fail_listing_after(1);
    let executor = executor(source);

    let result = run(&executor, request("rust")).await;

    assert_eq!(result.len(), 4);
    assert_eq!(result.stop_reason, StopReason::SourceFailed);
    assert!(!result.truncated);
    assert!(result.is_partial());
    assert!(matches!(
        result.error,
        Some(DataSourceError::DataSourceUnavailable(_))
    ));
}

#[tokio::test]
async fn test_record_outage_stops_enumeration() {
    let source = forum_of(6, "rust");
    source.fail_thread(3, SourceError::Unavailable("gateway down".to_string()));
    let executor = executor_with(
        source,
        SearchConfig {
            batch_size: 4,
            thread_concurrency: 1,
            ..SearchConfig::default()
        },
        ConcurrencyLimiter::new(3, 5, Duration::ZERO),
    );

    let result = run(&executor, request("rust")).await;

    assert_eq!(result.stop_reason, StopReason::SourceFailed);
    let mut found = ids(&result);
    found.sort_unstable();
    assert_eq!(found, vec![1, 2]);
}

#[tokio::test]
async fn test_forbidden_and_missing_threads_are_skipped() {
    let source = forum_of(5, "rust");
    source.fail_thread(2, SourceError::Forbidden(2));
    source.fail_thread(4, SourceError::NotFound(4));
    let executor = executor(source);

    let result = run(&executor, request("rust")).await;

    assert_eq!(result.stop_reason, StopReason::Exhausted);
    assert_eq!(result.skipped, 2);
    assert!(result.error.is_none());
    let mut found = ids(&result);
    found.sort_unstable();
    assert_eq!(found, vec![1, 3, 5]);
}

#[tokio::test]
async fn test_sort_is_deterministic_across_runs() {
    let source = Arc::new(InMemoryForumSource::new());
    for id in 1..=30 {
        source.insert(ThreadBuilder::new(id, "same").reactions(id % 3).build());
    }
    let executor = executor_with(
        source,
        SearchConfig {
            batch_size: 7,
            thread_concurrency: 5,
            ..SearchConfig::default()
        },
        ConcurrencyLimiter::new(3, 5, Duration::ZERO),
    );

    let first = run(&executor, request("same")).await;
    let second = run(&executor, request("same")).await;
    assert_eq!(ids(&first), ids(&second));

    // Equal keys fall back to ascending thread id
    let top: Vec<u64> = first.items.iter().take(3).map(|m| m.thread_id).collect();
    assert_eq!(top, vec![2, 5, 8]);
}

#[tokio::test]
async fn test_rejections_surface_as_failures() {
    let executor = executor_with(
        forum_of(3, "rust"),
        SearchConfig::default(),
        ConcurrencyLimiter::new(3, 5, Duration::from_secs(60)),
    );

    run(&executor, request("rust")).await;

    match executor
        .execute_search(request("rust"), &CancellationToken::new())
        .await
    {
        Err(SearchFailure::Rejected(Rejection::UserOnCooldown { .. })) => {}
        other => panic!("expected cooldown rejection, got {:?}", other.map(|r| r.len())),
    }
    assert_eq!(executor.limiter().active_total(), 0);
}

#[tokio::test]
async fn test_retrying_source_rides_out_transient_failures() {
    let inner = InMemoryForumSource::new();
    for id in 1..=3 {
        inner.insert(ThreadBuilder::new(id, "rust").build());
    }
    inner.push_listing_failure(SourceError::RateLimited {
        retry_after: Duration::from_millis(10),
    });
    inner.push_listing_failure(SourceError::Unavailable("blip".to_string()));

    let source = Arc::new(RetryingSource::new(inner).with_backoff(Duration::from_millis(10)));
    let executor = executor(source.clone());

    let result = run(&executor, request("rust")).await;
    assert_eq!(result.len(), 3);
    assert_eq!(result.stop_reason, StopReason::Exhausted);
    assert_eq!(source.inner().pages_served(), 1);
}

#[tokio::test]
async fn test_history_and_stats_are_persisted() {
    let source = forum_of(3, "rust");
    let persistence = Arc::new(InMemoryPersistence::new());
    let executor = SearchExecutor::new(
        SearchConfig::default(),
        ThreadCache::in_memory(Duration::from_secs(60), 100),
        ConcurrencyLimiter::new(3, 5, Duration::ZERO),
        source,
        persistence.clone(),
    );

    run(&executor, request("rust")).await;
    settle().await;

    let history = persistence.recent_history(9, 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].query_text, "rust");
    assert_eq!(history[0].result_count, 3);

    assert_eq!(persistence.thread_count(), 3);
    let stored = persistence.thread_stats(2).await.unwrap().unwrap();
    assert_eq!(stored.reaction_count, 2);
}

#[tokio::test]
async fn test_concurrent_searches_share_cache() {
    let source = forum_of(20, "rust");
    let executor = Arc::new(executor_with(
        source.clone(),
        SearchConfig::default(),
        ConcurrencyLimiter::new(5, 5, Duration::ZERO),
    ));

    let handles: Vec<_> = (0..4u64)
        .map(|user| {
            let executor = Arc::clone(&executor);
            tokio::spawn(async move {
                let request =
                    SearchRequest::new(FORUM_ID, Requester::new(user, GUILD_ID), "rust").unwrap();
                executor
                    .execute_search(request, &CancellationToken::new())
                    .await
                    .map(|r| r.len())
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), 20);
    }
    assert!(source.record_fetches() >= 20);
    assert_eq!(executor.limiter().active_total(), 0);
}
