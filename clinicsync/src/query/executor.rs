// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Fetch-or-serve query execution
//!
//! A read returns fresh cached data without touching the network. Otherwise
//! it joins the key's in-flight fetch if there is one, or becomes the leader
//! of a new fetch. Failed fetches fall back to last-known-good data.

use chrono::Utc;
use log::{debug, warn};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use super::inflight::{InflightFetch, InflightMap, LeaderGuard};
use super::observer::QueryObserver;
use super::policy::{QueryOptions, RefetchPolicy, RetryPolicy};
use super::source::QuerySource;
use crate::cache::{CacheStore, Payload, QueryKey};
use crate::error::{SyncError, SyncResult};

/// Executor statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutorStats {
    /// Served from a fresh entry
    pub cache_hits: u64,
    /// Fetches led by this executor
    pub fetches: u64,
    /// Reads that joined another reader's fetch
    pub coalesced: u64,
    pub retries: u64,
    pub failures: u64,
    /// Failed fetches answered with last-known-good data
    pub served_last_known_good: u64,
    pub background_refreshes: u64,
}

enum Role {
    Leader(LeaderGuard),
    Follower(watch::Receiver<Option<SyncResult<Payload>>>),
}

pub(crate) struct ExecutorInner {
    store: Arc<CacheStore>,
    inflight: InflightMap,
    /// Family prefix -> policy; longest matching prefix wins
    policies: RwLock<Vec<(QueryKey, RefetchPolicy)>>,
    next_fetch_id: AtomicU64,
    stats: Mutex<ExecutorStats>,
}

/// Cheaply cloneable handle; clones share in-flight state
#[derive(Clone)]
pub struct QueryExecutor {
    inner: Arc<ExecutorInner>,
}

impl QueryExecutor {
    pub fn new(store: Arc<CacheStore>) -> Self {
        Self {
            inner: Arc::new(ExecutorInner {
                store,
                inflight: Arc::new(Mutex::new(HashMap::new())),
                policies: RwLock::new(Vec::new()),
                next_fetch_id: AtomicU64::new(1),
                stats: Mutex::new(ExecutorStats::default()),
            }),
        }
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.inner.store
    }

    /// Set the refetch policy of every key under `family`
    pub fn register_policy(&self, family: QueryKey, policy: RefetchPolicy) {
        let mut policies = self.inner.policies.write();
        policies.retain(|(prefix, _)| prefix != &family);
        policies.push((family, policy));
    }

    /// Policy that applies to `key` absent a per-call override
    pub fn policy_for(&self, key: &QueryKey) -> RefetchPolicy {
        self.inner.family_policy(key)
    }

    /// Return data for `key`, fetching through `source` when needed
    pub async fn query<S>(&self, key: QueryKey, source: S, options: QueryOptions) -> SyncResult<Payload>
    where
        S: QuerySource + 'static,
    {
        self.inner.query(key, Arc::new(source), options).await
    }

    /// [`query`](Self::query) decoded into `T`
    pub async fn query_as<T, S>(&self, key: QueryKey, source: S, options: QueryOptions) -> SyncResult<T>
    where
        T: DeserializeOwned,
        S: QuerySource + 'static,
    {
        let display = key.to_string();
        let payload = self.query(key, source, options).await?;
        serde_json::from_value(payload).map_err(|e| {
            SyncError::Serialization(format!("Query {} does not decode: {}", display, e))
        })
    }

    /// Fetch regardless of freshness, still coalescing with in-flight reads
    pub async fn refetch<S>(&self, key: QueryKey, source: S, options: QueryOptions) -> SyncResult<Payload>
    where
        S: QuerySource + 'static,
    {
        self.inner.fetch_shared(key, Arc::new(source), &options).await
    }

    /// Detach every in-flight fetch under `prefix`
    ///
    /// Their results are not written to the cache. Readers already waiting on
    /// them still receive the response.
    pub fn cancel(&self, prefix: &QueryKey) -> usize {
        let mut inflight = self.inner.inflight.lock();
        let detached: Vec<QueryKey> = inflight
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        for key in &detached {
            inflight.remove(key);
            // Under the registry lock so no new leader can start in between
            self.inner.store.cancel_fetch(key);
        }
        if !detached.is_empty() {
            debug!("Cancelled {} in-flight fetches under {}", detached.len(), prefix);
        }
        detached.len()
    }

    pub fn in_flight(&self) -> usize {
        self.inner.inflight.lock().len()
    }

    pub fn is_fetching(&self, key: &QueryKey) -> bool {
        self.inner.inflight.lock().contains_key(key)
    }

    /// Keep `key` loaded and follow its changes until the observer is dropped
    pub fn observe<S>(&self, key: QueryKey, source: S, options: QueryOptions) -> QueryObserver
    where
        S: QuerySource + 'static,
    {
        QueryObserver::spawn(self.inner.clone(), key, Arc::new(source), options)
    }

    pub fn stats(&self) -> ExecutorStats {
        self.inner.stats.lock().clone()
    }
}

impl ExecutorInner {
    pub(crate) fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    fn family_policy(&self, key: &QueryKey) -> RefetchPolicy {
        self.policies
            .read()
            .iter()
            .filter(|(prefix, _)| key.starts_with(prefix))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, policy)| *policy)
            .unwrap_or(self.store.config().default_refetch)
    }

    fn stale_after(&self, options: &QueryOptions) -> Duration {
        options
            .stale_after
            .unwrap_or(self.store.config().default_stale_after)
    }

    pub(crate) async fn query(
        self: &Arc<Self>,
        key: QueryKey,
        source: Arc<dyn QuerySource>,
        options: QueryOptions,
    ) -> SyncResult<Payload> {
        if let Some(entry) = self.store.get(&key) {
            if let Some(data) = entry.data.clone() {
                if entry.is_fresh_at(Utc::now()) {
                    self.stats.lock().cache_hits += 1;
                    return Ok(data);
                }

                let policy = options.refetch.unwrap_or_else(|| self.family_policy(&key));
                if policy == RefetchPolicy::StaleWhileRevalidate {
                    self.spawn_refresh(key, source, options);
                    return Ok(data);
                }
            }
        }

        self.fetch_shared(key, source, &options).await
    }

    fn spawn_refresh(self: &Arc<Self>, key: QueryKey, source: Arc<dyn QuerySource>, options: QueryOptions) {
        self.stats.lock().background_refreshes += 1;
        let inner = self.clone();
        tokio::spawn(async move {
            if let Err(e) = inner.fetch_shared(key.clone(), source, &options).await {
                debug!("Background refresh of {} failed: {}", key, e);
            }
        });
    }

    pub(crate) async fn fetch_shared(
        self: &Arc<Self>,
        key: QueryKey,
        source: Arc<dyn QuerySource>,
        options: &QueryOptions,
    ) -> SyncResult<Payload> {
        let stale_after = self.stale_after(options);
        let retry = options
            .retry
            .clone()
            .unwrap_or_else(|| self.store.config().retry.clone());

        loop {
            let role = {
                let mut inflight = self.inflight.lock();
                match inflight.get(&key) {
                    Some(fetch) if fetch.is_joinable(&self.store, &key) => {
                        Role::Follower(fetch.receiver.clone())
                    }
                    _ => {
                        let revision = self.store.begin_fetch(&key, stale_after)?;
                        let id = self.next_fetch_id.fetch_add(1, Ordering::Relaxed);
                        let (sender, receiver) = watch::channel(None);
                        inflight.insert(
                            key.clone(),
                            InflightFetch {
                                id,
                                revision,
                                receiver,
                            },
                        );
                        Role::Leader(LeaderGuard::new(
                            self.inflight.clone(),
                            self.store.clone(),
                            key.clone(),
                            id,
                            revision,
                            sender,
                        ))
                    }
                }
            };

            match role {
                Role::Follower(mut receiver) => {
                    self.stats.lock().coalesced += 1;
                    let outcome = receiver
                        .wait_for(Option::is_some)
                        .await
                        .ok()
                        .and_then(|published| (*published).clone());
                    match outcome {
                        Some(result) => return result,
                        // Leader went away without publishing
                        None => {
                            debug!("Fetch leader for {} vanished, re-electing", key);
                            continue;
                        }
                    }
                }
                Role::Leader(guard) => {
                    self.stats.lock().fetches += 1;
                    let result = self.fetch_with_retry(&key, source.as_ref(), &retry).await;
                    let outcome = self.settle(&key, guard.revision(), result);
                    guard.finish(outcome.clone());
                    return outcome;
                }
            }
        }
    }

    async fn fetch_with_retry(
        &self,
        key: &QueryKey,
        source: &dyn QuerySource,
        retry: &RetryPolicy,
    ) -> SyncResult<Payload> {
        let mut attempt = 0;
        loop {
            match source.fetch().await {
                Ok(data) => return Ok(data),
                Err(e) if attempt < retry.max_retries && !matches!(e, SyncError::Cancelled(_)) => {
                    let delay = retry.delay_for(attempt);
                    attempt += 1;
                    self.stats.lock().retries += 1;
                    debug!(
                        "Fetch for {} failed (attempt {}): {}; retrying in {:?}",
                        key, attempt, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Write the fetch outcome and decide what readers get
    fn settle(&self, key: &QueryKey, revision: u64, result: SyncResult<Payload>) -> SyncResult<Payload> {
        match result {
            Ok(data) => {
                self.store.complete_fetch(key, revision, data.clone());
                Ok(data)
            }
            Err(e) => {
                self.stats.lock().failures += 1;
                self.store.fail_fetch(key, revision, &e.to_string());
                match self.store.data(key) {
                    Some(data) => {
                        warn!("Fetch for {} failed, serving last-known-good data: {}", key, e);
                        self.stats.lock().served_last_known_good += 1;
                        Ok(data)
                    }
                    None => Err(e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, CacheStatus};
    use crate::query_key;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn executor() -> QueryExecutor {
        QueryExecutor::new(Arc::new(CacheStore::new(CacheConfig::testing())))
    }

    fn counting(calls: Arc<AtomicUsize>, value: Payload) -> impl QuerySource + 'static {
        move || {
            let calls = calls.clone();
            let value = value.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, SyncError>(value)
            }
        }
    }

    #[tokio::test]
    async fn test_fresh_entry_skips_fetch() {
        let executor = executor();
        let key = query_key!("staff", "list");
        let calls = Arc::new(AtomicUsize::new(0));

        let first = executor
            .query(key.clone(), counting(calls.clone(), json!(["dr-lee"])), QueryOptions::default())
            .await
            .unwrap();
        let second = executor
            .query(key.clone(), counting(calls.clone(), json!(["other"])), QueryOptions::default())
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(executor.stats().cache_hits, 1);
        assert_eq!(executor.store().peek(&key).unwrap().status, CacheStatus::Fresh);
    }

    #[tokio::test]
    async fn test_stale_entry_is_refetched() {
        let executor = executor();
        let key = query_key!("staff", "list");
        let calls = Arc::new(AtomicUsize::new(0));
        let options = QueryOptions::default().stale_after(Duration::ZERO);

        executor.query(key.clone(), counting(calls.clone(), json!(1)), options.clone()).await.unwrap();
        let value = executor.query(key.clone(), counting(calls.clone(), json!(2)), options).await.unwrap();

        assert_eq!(value, json!(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failure_serves_last_known_good() {
        let executor = executor();
        let key = query_key!("billing-invoice", "list");
        executor.store().set(key.clone(), json!(["INV-1"]), CacheStatus::Stale);

        let value = executor
            .query(key.clone(), || async { Err::<Payload, _>(SyncError::api("503")) }, QueryOptions::default())
            .await
            .unwrap();
        assert_eq!(value, json!(["INV-1"]));

        let entry = executor.store().peek(&key).unwrap();
        assert_eq!(entry.status, CacheStatus::Error);
        assert_eq!(entry.error.as_deref(), Some("API error: 503"));
    }

    #[tokio::test]
    async fn test_failure_without_data_propagates() {
        let executor = executor();
        let result = executor
            .query(query_key!("staff", "detail", 4), || async { Err::<Payload, _>(SyncError::api("404")) }, QueryOptions::default())
            .await;
        assert_eq!(result, Err(SyncError::api("404")));
        assert_eq!(executor.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let executor = executor();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let failing = move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<Payload, _>(SyncError::api("timeout"))
            }
        };

        let options = QueryOptions::default().retry(RetryPolicy::immediate(2));
        assert!(executor.query(query_key!("staff", "list"), failing, options).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(executor.stats().retries, 2);
    }

    #[tokio::test]
    async fn test_cancelled_source_is_not_retried() {
        let executor = executor();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let cancelled = move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<Payload, _>(SyncError::Cancelled("screen closed".to_string()))
            }
        };

        let options = QueryOptions::default().retry(RetryPolicy::immediate(3));
        let result = executor.query(query_key!("stock-item", "list"), cancelled, options).await;
        assert_eq!(result, Err(SyncError::Cancelled("screen closed".to_string())));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(executor.stats().retries, 0);
    }

    #[tokio::test]
    async fn test_stale_while_revalidate_returns_immediately() {
        let executor = executor();
        let key = query_key!("dashboard", "revenue");
        executor.register_policy(query_key!("dashboard"), RefetchPolicy::StaleWhileRevalidate);
        executor.store().set(key.clone(), json!(100), CacheStatus::Stale);

        let (release, gate) = tokio::sync::oneshot::channel::<()>();
        let gate = Arc::new(tokio::sync::Mutex::new(Some(gate)));
        let source = move || {
            let gate = gate.clone();
            async move {
                if let Some(gate) = gate.lock().await.take() {
                    let _ = gate.await;
                }
                Ok::<_, SyncError>(json!(250))
            }
        };

        let value = executor.query(key.clone(), source, QueryOptions::default()).await.unwrap();
        assert_eq!(value, json!(100));

        release.send(()).unwrap();
        let mut changes = executor.store().subscribe(crate::cache::KeyFilter::Exact(key.clone()));
        while executor.store().data(&key) != Some(json!(250)) {
            changes.recv().await;
        }
        assert_eq!(executor.stats().background_refreshes, 1);
    }

    #[test]
    fn test_longest_prefix_policy_wins() {
        let executor = executor();
        executor.register_policy(query_key!("appointments"), RefetchPolicy::StaleWhileRevalidate);
        executor.register_policy(query_key!("appointments", "detail"), RefetchPolicy::Blocking);

        assert_eq!(
            executor.policy_for(&query_key!("appointments", "list")),
            RefetchPolicy::StaleWhileRevalidate
        );
        assert_eq!(
            executor.policy_for(&query_key!("appointments", "detail", 2)),
            RefetchPolicy::Blocking
        );
        assert_eq!(executor.policy_for(&query_key!("staff")), RefetchPolicy::Blocking);
    }

    #[tokio::test]
    async fn test_query_as_decodes() {
        #[derive(serde::Deserialize)]
        struct Staff {
            name: String,
        }

        let executor = executor();
        let staff: Staff = executor
            .query_as(query_key!("staff", "detail", 1), || async { Ok::<_, SyncError>(json!({"name": "Dr. Lee"})) }, QueryOptions::default())
            .await
            .unwrap();
        assert_eq!(staff.name, "Dr. Lee");

        let bad: SyncResult<Staff> = executor
            .query_as(query_key!("staff", "detail", 2), || async { Ok::<_, SyncError>(json!(7)) }, QueryOptions::default())
            .await;
        assert!(matches!(bad, Err(SyncError::Serialization(_))));
    }
}
