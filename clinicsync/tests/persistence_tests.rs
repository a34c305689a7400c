//! Durable snapshot tests against the sled backend
//!
//! Each test persists through one store, drops it, and restores into a new
//! one, the way an application restart does.

#![cfg(feature = "sled-backend")]

#[path = "testutils/mod.rs"]
mod testutils;

use clinicsync::cache::{DiscardReason, RestoreOutcome};
use clinicsync::{keys, CacheStatus, QueryOptions};
use serde_json::json;
use testutils::backend::FakeBackend;
use testutils::sync_fixture::PersistenceFixture;

#[tokio::test]
async fn test_round_trip_across_restart() {
    let fixture = PersistenceFixture::new().unwrap();
    let today = keys::dashboard::today_appointments();
    let patient = keys::patients::detail(4);

    {
        let (store, persister) = fixture.open("v1").unwrap();
        store.set(today.clone(), json!([{"id": 1}]), CacheStatus::Fresh);
        store.set(patient.clone(), json!({"name": "Rex"}), CacheStatus::Stale);
        assert_eq!(persister.persist().await.unwrap(), 2);
    }

    let (store, persister) = fixture.open("v1").unwrap();
    assert!(store.is_empty());
    let outcome = persister.restore().await.unwrap();
    assert_eq!(outcome, RestoreOutcome::Restored { entries: 2, dropped: 0 });

    let restored = store.peek(&today).unwrap();
    assert_eq!(restored.data, Some(json!([{"id": 1}])));
    assert_eq!(restored.status, CacheStatus::Fresh);
    assert!(restored.fetched_at.is_some());
    assert_eq!(store.peek(&patient).unwrap().status, CacheStatus::Stale);
}

#[tokio::test]
async fn test_restored_data_serves_reads_without_fetching() {
    let fixture = PersistenceFixture::new().unwrap();
    let key = keys::staff::lists();
    {
        let (store, persister) = fixture.open("v1").unwrap();
        store.set(key.clone(), json!(["Dr. Vega"]), CacheStatus::Fresh);
        persister.persist().await.unwrap();
    }

    let (store, persister) = fixture.open("v1").unwrap();
    persister.restore().await.unwrap();
    let executor = clinicsync::QueryExecutor::new(store);
    let backend = FakeBackend::returning(json!([]));
    let data = executor
        .query(key, backend.source(), QueryOptions::default())
        .await
        .unwrap();
    assert_eq!(data, json!(["Dr. Vega"]));
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_buster_change_discards_snapshot() {
    let fixture = PersistenceFixture::new().unwrap();
    {
        let (store, persister) = fixture.open("v1").unwrap();
        store.set(keys::stock::lists(), json!([]), CacheStatus::Fresh);
        persister.persist().await.unwrap();
    }

    {
        let (store, persister) = fixture.open("v2").unwrap();
        let outcome = persister.restore().await.unwrap();
        assert_eq!(
            outcome,
            RestoreOutcome::Discarded(DiscardReason::BusterMismatch {
                found: "v1".to_string(),
                expected: "v2".to_string(),
            })
        );
        assert!(store.is_empty());
    }

    // The discarded snapshot is gone for good
    let (_, persister) = fixture.open("v1").unwrap();
    assert_eq!(persister.restore().await.unwrap(), RestoreOutcome::Missing);
}

#[tokio::test]
async fn test_corrupted_snapshot_starts_empty() {
    let fixture = PersistenceFixture::new().unwrap();
    let config = fixture.config("v1");
    let durable = fixture.durable();
    durable
        .set(&config.persistence.cache_identifier, b"0badc0de\n{\"buster\":")
        .unwrap();
    durable.flush().unwrap();

    let (store, persister) = fixture.open("v1").unwrap();
    let outcome = persister.restore().await.unwrap();
    assert!(matches!(outcome, RestoreOutcome::Discarded(DiscardReason::Corrupted(_))));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_missing_snapshot() {
    let fixture = PersistenceFixture::new().unwrap();
    let (store, persister) = fixture.open("v1").unwrap();
    assert_eq!(persister.restore().await.unwrap(), RestoreOutcome::Missing);
    assert!(store.is_empty());
}
