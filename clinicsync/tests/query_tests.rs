//! Query executor integration tests
//!
//! Coalescing, freshness, stale-while-revalidate, retries and failure
//! handling through the public API.

#[path = "testutils/mod.rs"]
mod testutils;

use clinicsync::{keys, CacheStatus, QueryOptions, RefetchPolicy, RetryPolicy, SyncError};
use serde_json::json;
use std::time::Duration;
use testutils::backend::FakeBackend;
use testutils::sync_fixture::SyncFixture;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_queries_share_one_fetch() {
    let fixture = SyncFixture::new();
    let backend = FakeBackend::returning(json!([{"id": 1}])).with_latency(Duration::from_millis(100));
    let key = keys::patients::lists();

    let mut handles = Vec::new();
    for _ in 0..16 {
        let executor = fixture.executor.clone();
        let source = backend.source();
        let key = key.clone();
        handles.push(tokio::spawn(async move {
            executor.query(key, source, QueryOptions::default()).await
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), json!([{"id": 1}]));
    }
    assert_eq!(backend.calls(), 1);
    assert_eq!(fixture.store.peek(&key).unwrap().status, CacheStatus::Fresh);

    let stats = fixture.executor.stats();
    assert_eq!(stats.fetches, 1);
    assert_eq!(stats.fetches + stats.coalesced + stats.cache_hits, 16);
    assert_eq!(fixture.executor.in_flight(), 0);
}

#[tokio::test]
async fn test_fresh_entry_served_from_cache() {
    let fixture = SyncFixture::new();
    let backend = FakeBackend::returning(json!({"total": 3}));
    let key = keys::dashboard::revenue();

    for _ in 0..3 {
        let data = fixture
            .executor
            .query(key.clone(), backend.source(), QueryOptions::default())
            .await
            .unwrap();
        assert_eq!(data, json!({"total": 3}));
    }
    assert_eq!(backend.calls(), 1);
    assert_eq!(fixture.executor.stats().cache_hits, 2);
}

#[tokio::test]
async fn test_stale_entry_refetched_before_returning() {
    let fixture = SyncFixture::new();
    let backend = FakeBackend::returning(json!("v1"));
    backend.push(Ok(json!("v0")));
    let key = keys::stock::low_stock();
    let options = QueryOptions::default().stale_after(Duration::ZERO);

    let first = fixture.executor.query(key.clone(), backend.source(), options.clone()).await.unwrap();
    let second = fixture.executor.query(key.clone(), backend.source(), options).await.unwrap();
    assert_eq!(first, json!("v0"));
    assert_eq!(second, json!("v1"));
    assert_eq!(backend.calls(), 2);
}

#[tokio::test]
async fn test_stale_while_revalidate_serves_old_data() {
    let fixture = SyncFixture::new();
    let backend = FakeBackend::returning(json!("new")).with_latency(Duration::from_millis(20));
    let key = keys::appointments::lists();
    fixture
        .executor
        .register_policy(keys::appointments::all(), RefetchPolicy::StaleWhileRevalidate);
    fixture.store.set(key.clone(), json!("old"), CacheStatus::Stale);

    let served = fixture
        .executor
        .query(key.clone(), backend.source(), QueryOptions::default())
        .await
        .unwrap();
    assert_eq!(served, json!("old"));

    let mut refreshed = false;
    for _ in 0..100 {
        if fixture.store.data(&key) == Some(json!("new")) {
            refreshed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(refreshed, "background refresh never landed");
    assert_eq!(fixture.executor.stats().background_refreshes, 1);
}

#[tokio::test]
async fn test_transient_failures_retried() {
    let fixture = SyncFixture::new();
    let backend = FakeBackend::returning(json!("ok"));
    backend.push(Err(SyncError::api("503")));
    backend.push(Err(SyncError::api("503")));

    let data = fixture
        .executor
        .query(
            keys::staff::lists(),
            backend.source(),
            QueryOptions::default().retry(RetryPolicy::immediate(3)),
        )
        .await
        .unwrap();
    assert_eq!(data, json!("ok"));
    assert_eq!(backend.calls(), 3);
    assert_eq!(fixture.executor.stats().retries, 2);
}

#[tokio::test]
async fn test_failure_without_data_is_an_error() {
    let fixture = SyncFixture::new();
    let backend = FakeBackend::failing("backend down");
    let key = keys::invoices::detail(4);

    let result = fixture
        .executor
        .query(key.clone(), backend.source(), QueryOptions::default())
        .await;
    assert!(result.is_err());

    let entry = fixture.store.peek(&key).unwrap();
    assert_eq!(entry.status, CacheStatus::Error);
    assert!(entry.error.unwrap().contains("backend down"));
    assert!(entry.data.is_none());
}

#[tokio::test]
async fn test_failure_serves_last_known_good_data() {
    let fixture = SyncFixture::new();
    let key = keys::invoices::lists();
    fixture.store.set(key.clone(), json!([{"id": 1}]), CacheStatus::Stale);

    let backend = FakeBackend::failing("timeout");
    let data = fixture
        .executor
        .query(key.clone(), backend.source(), QueryOptions::default())
        .await
        .unwrap();
    assert_eq!(data, json!([{"id": 1}]));

    let entry = fixture.store.peek(&key).unwrap();
    assert_eq!(entry.status, CacheStatus::Error);
    assert_eq!(entry.data, Some(json!([{"id": 1}])));
    assert_eq!(fixture.executor.stats().served_last_known_good, 1);
}

#[tokio::test]
async fn test_cancelled_fetch_does_not_overwrite_cache() {
    let fixture = SyncFixture::new();
    let key = keys::patients::detail(9);
    fixture.store.set(key.clone(), json!({"name": "before"}), CacheStatus::Stale);

    let backend = FakeBackend::returning(json!({"name": "late"})).with_latency(Duration::from_millis(50));
    let executor = fixture.executor.clone();
    let source = backend.source();
    let task_key = key.clone();
    let reader = tokio::spawn(async move {
        executor.refetch(task_key, source, QueryOptions::default()).await
    });

    for _ in 0..100 {
        if fixture.executor.is_fetching(&key) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert_eq!(fixture.executor.cancel(&keys::patients::all()), 1);
    fixture.store.set(key.clone(), json!({"name": "written"}), CacheStatus::Fresh);

    // The detached reader still gets its response
    assert_eq!(reader.await.unwrap().unwrap(), json!({"name": "late"}));
    assert_eq!(fixture.store.data(&key), Some(json!({"name": "written"})));
}

#[tokio::test]
async fn test_typed_query() {
    #[derive(serde::Deserialize, Debug, PartialEq)]
    struct StaffMember {
        id: u32,
        name: String,
    }

    let fixture = SyncFixture::new();
    let backend = FakeBackend::returning(json!([{"id": 1, "name": "Dr. Vega"}]));
    let staff: Vec<StaffMember> = fixture
        .executor
        .query_as(keys::staff::lists(), backend.source(), QueryOptions::default())
        .await
        .unwrap();
    assert_eq!(staff, vec![StaffMember { id: 1, name: "Dr. Vega".to_string() }]);

    let mismatch: Result<Vec<u32>, _> = fixture
        .executor
        .query_as(keys::staff::lists(), backend.source(), QueryOptions::default())
        .await;
    assert!(matches!(mismatch, Err(SyncError::Serialization(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_invalidation_during_fetch_keeps_single_fetch() {
    let fixture = SyncFixture::new();
    let backend = FakeBackend::returning(json!(["9:00"])).with_latency(Duration::from_millis(150));
    let key = keys::dashboard::today_appointments();

    let first = {
        let executor = fixture.executor.clone();
        let source = backend.source();
        let key = key.clone();
        tokio::spawn(async move { executor.query(key, source, QueryOptions::default()).await })
    };
    while backend.calls() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert_eq!(fixture.store.invalidate(&keys::dashboard::all()), 1);
    assert_eq!(fixture.store.peek(&key).unwrap().status, CacheStatus::Fetching);

    let second = fixture
        .executor
        .query(key.clone(), backend.source(), QueryOptions::default())
        .await
        .unwrap();
    assert_eq!(second, json!(["9:00"]));
    assert_eq!(first.await.unwrap().unwrap(), json!(["9:00"]));
    assert_eq!(backend.calls(), 1);

    // The result predates the invalidation, so the next read goes to the server
    assert_eq!(fixture.store.peek(&key).unwrap().status, CacheStatus::Stale);
    fixture
        .executor
        .query(key.clone(), backend.source(), QueryOptions::default())
        .await
        .unwrap();
    assert_eq!(backend.calls(), 2);
    assert_eq!(fixture.store.peek(&key).unwrap().status, CacheStatus::Fresh);
}
