mod common;

use common::{record, settle, FakeRemote};
use forum_search::cache::{CacheOptions, CacheStore, RemoteStatus, ThreadCache};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn options(max_items: usize) -> CacheOptions {
    CacheOptions::new("test", Duration::from_secs(60), max_items)
        .with_remote_timeout(Duration::from_millis(50))
        .with_connect_timeout(Duration::from_millis(50))
        .with_reconnect_interval(Duration::from_millis(100))
}

#[tokio::test]
async fn test_memory_only_store_reports_disabled_remote() {
    let store: CacheStore<u64> = CacheStore::new(options(10));

    store.set("a", 1);
    assert_eq!(store.get("a").await, Some(1));
    assert_eq!(store.get("b").await, None);
    assert!(!store.connect().await);

    let stats = store.stats();
    assert_eq!(stats.remote, RemoteStatus::Disabled);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
}

#[tokio::test]
async fn test_read_through_repopulates_memory() {
    let remote = FakeRemote::new();

    let writer: CacheStore<u64> = CacheStore::with_remote(options(10), remote.clone());
    writer.set("shared", 42);
    settle().await;
    assert!(remote.entries.contains_key("shared"));

    // A second process with a cold memory tier
    let reader: CacheStore<u64> = CacheStore::with_remote(options(10), remote.clone());
    assert_eq!(reader.get("shared").await, Some(42));
    assert_eq!(reader.len(), 1);

    let calls = remote.calls();
    assert_eq!(reader.get("shared").await, Some(42));
    assert_eq!(remote.calls(), calls, "second read must be served from memory");

    let stats = reader.stats();
    assert_eq!(stats.remote_hits, 1);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.remote, RemoteStatus::Healthy);
}

#[tokio::test]
async fn test_unreachable_remote_degrades_silently() {
    let remote = FakeRemote::new();
    remote.set_failing(true);

    let store: CacheStore<u64> = CacheStore::with_remote(options(10), remote.clone());
    assert_eq!(store.get("missing").await, None);
    assert_eq!(store.remote_status(), RemoteStatus::Degraded);

    store.set("local", 7);
    assert_eq!(store.get("local").await, Some(7));
}

#[tokio::test]
async fn test_reconnect_waits_for_interval() {
    let remote = FakeRemote::new();
    remote.set_failing(true);

    let store: CacheStore<u64> = CacheStore::with_remote(options(10), remote.clone());
    assert_eq!(store.get("k").await, None);
    assert_eq!(remote.pings(), 1);

    remote.set_failing(false);
    assert_eq!(store.get("k").await, None);
    assert_eq!(remote.pings(), 1, "no reconnect before the interval elapses");
    assert_eq!(store.remote_status(), RemoteStatus::Degraded);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(store.get("k").await, None);
    assert_eq!(remote.pings(), 2);
    assert_eq!(store.remote_status(), RemoteStatus::Healthy);
}

#[tokio::test]
async fn test_failure_while_healthy_stops_remote_traffic() {
    let remote = FakeRemote::new();
    let store: CacheStore<u64> = CacheStore::with_remote(options(10), remote.clone());
    assert!(store.connect().await);

    remote.set_failing(true);
    assert_eq!(store.get("k").await, None);
    assert_eq!(store.remote_status(), RemoteStatus::Degraded);

    let calls = remote.calls();
    assert_eq!(store.get("k").await, None);
    store.set("k", 1);
    settle().await;
    assert_eq!(remote.calls(), calls, "degraded tier receives no traffic");
}

#[tokio::test]
async fn test_slow_remote_is_bounded_by_timeout() {
    let remote = FakeRemote::new();
    remote.set_delay(Duration::from_millis(500));

    let store: CacheStore<u64> = CacheStore::with_remote(options(10), remote.clone());

    let started = Instant::now();
    assert_eq!(store.get("k").await, None);
    assert!(started.elapsed() < Duration::from_millis(400));
    assert_eq!(store.remote_status(), RemoteStatus::Degraded);
}

#[tokio::test]
async fn test_invalidate_right_after_set_stays_invalidated() {
    let remote = FakeRemote::new();
    let writer: CacheStore<u64> = CacheStore::with_remote(options(10), remote.clone());
    assert!(writer.connect().await);

    writer.set("k", 1);
    writer.invalidate("k").await;
    settle().await;

    assert!(!remote.entries.contains_key("k"));
    let reader: CacheStore<u64> = CacheStore::with_remote(options(10), remote.clone());
    assert_eq!(reader.get("k").await, None);
    assert_eq!(writer.get("k").await, None);
}

#[tokio::test]
async fn test_invalidate_waits_for_write_in_flight() {
    let remote = FakeRemote::new();
    let writer: CacheStore<u64> = CacheStore::with_remote(options(10), remote.clone());
    assert!(writer.connect().await);

    remote.set_delay(Duration::from_millis(20));
    writer.set("k", 1);
    // Let the background write reach the remote before invalidating
    tokio::time::sleep(Duration::from_millis(5)).await;
    writer.invalidate("k").await;
    settle().await;

    assert!(!remote.entries.contains_key("k"));
}

#[tokio::test]
async fn test_set_after_invalidate_reaches_remote() {
    let remote = FakeRemote::new();
    let writer: CacheStore<u64> = CacheStore::with_remote(options(10), remote.clone());
    assert!(writer.connect().await);

    writer.set("k", 1);
    writer.invalidate("k").await;
    writer.set("k", 2);
    settle().await;

    let reader: CacheStore<u64> = CacheStore::with_remote(options(10), remote.clone());
    assert_eq!(reader.get("k").await, Some(2));
}

#[tokio::test]
async fn test_invalidate_prefix_drops_pending_writes() {
    let remote = FakeRemote::new();
    let writer: CacheStore<u64> = CacheStore::with_remote(options(10), remote.clone());
    assert!(writer.connect().await);

    writer.set("thread_stats:1", 1);
    writer.set("thread_stats:2", 2);
    writer.set("session:1", 3);
    writer.invalidate_prefix("thread_stats:").await;
    settle().await;

    assert_eq!(remote.entries.len(), 1);
    assert!(remote.entries.contains_key("session:1"));
}

#[tokio::test]
async fn test_remote_hit_keeps_remaining_lifetime_only() {
    let remote = FakeRemote::new();
    let ttl_options = || {
        CacheOptions::new("test", Duration::from_millis(300), 10)
            .with_remote_timeout(Duration::from_millis(50))
            .with_connect_timeout(Duration::from_millis(50))
    };

    let writer: CacheStore<u64> = CacheStore::with_remote(ttl_options(), remote.clone());
    writer.set("k", 1);
    tokio::time::sleep(Duration::from_millis(200)).await;

    // The entry has about 100ms left; the reader must not restart the clock
    let reader: CacheStore<u64> = CacheStore::with_remote(ttl_options(), remote.clone());
    assert_eq!(reader.get("k").await, Some(1));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(reader.get("k").await, None);
    assert_eq!(reader.stats().expirations, 1);

    // Still held by the fake tier, which ignores TTLs, but past its expiry
    assert!(remote.entries.contains_key("k"));
    let late: CacheStore<u64> = CacheStore::with_remote(ttl_options(), remote.clone());
    assert_eq!(late.get("k").await, None);
}

#[tokio::test]
async fn test_capacity_evicts_oldest_fifth() {
    let store: CacheStore<usize> = CacheStore::new(options(10));
    for i in 0..10 {
        store.set(&format!("k{}", i), i);
    }

    // Refreshing k0 moves it to the back of the eviction order
    store.set("k0", 100);
    assert_eq!(store.len(), 10);

    store.set("k10", 10);
    assert_eq!(store.len(), 9);
    assert_eq!(store.stats().evictions, 2);

    assert_eq!(store.get("k1").await, None);
    assert_eq!(store.get("k2").await, None);
    assert_eq!(store.get("k0").await, Some(100));
    assert_eq!(store.get("k10").await, Some(10));
}

#[tokio::test]
async fn test_concurrent_access_stays_within_capacity() {
    let store: Arc<CacheStore<u64>> = Arc::new(CacheStore::new(options(50)));

    let handles: Vec<_> = (0..8u64)
        .map(|worker| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                for i in 0..200u64 {
                    let key = format!("w{}-{}", worker, i % 40);
                    store.set(&key, i);
                    store.get(&key).await;
                }
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap();
    }

    assert!(store.len() <= 50);
}

#[tokio::test]
async fn test_thread_cache_invalidate_all_clears_both_tiers() {
    let remote = FakeRemote::new();
    let store = CacheStore::with_remote(options(100), remote.clone());
    let cache = ThreadCache::new(Arc::new(store));
    assert!(cache.connect().await);

    for id in 1..=3 {
        cache.put(record(id, id));
    }
    settle().await;
    assert_eq!(remote.entries.len(), 3);
    assert!(remote.entries.contains_key(&ThreadCache::key(2)));

    assert_eq!(cache.invalidate_all().await, 3);
    assert_eq!(cache.get(1).await, None);
    assert!(remote.entries.is_empty());
}

#[tokio::test]
async fn test_thread_cache_invalidate_single_record() {
    let cache = ThreadCache::in_memory(Duration::from_secs(60), 10);
    cache.put(record(1, 5));
    cache.put(record(2, 6));

    cache.invalidate(1).await;
    assert_eq!(cache.get(1).await, None);
    assert_eq!(cache.get(2).await.map(|r| r.reaction_count), Some(6));
}
