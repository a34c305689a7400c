// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Optimistic mutation protocol
//!
//! 1. Cancel in-flight reads of the affected keys
//! 2. Snapshot the affected keys
//! 3. Apply the optimistic write
//! 4. Issue the remote call
//! 5. Success: drop the snapshot and invalidate dependent keys
//! 6. Failure: restore the snapshot and surface the error
//!
//! Steps 4 to 6 run on a spawned task, so a mutation always settles once its
//! remote call is issued, even if the caller stops waiting.

use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use super::context::{MutationContext, MutationId};
use super::request::MutationRequest;
use crate::cache::{CacheStore, InvalidationGraph, InvalidationScope, MutationDomain, QueryKey};
use crate::error::{SyncError, SyncResult};
use crate::query::QueryExecutor;

/// Mutation statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct MutationStats {
    pub started: u64,
    pub committed: u64,
    pub rolled_back: u64,
    /// Optimistic writes that failed before the remote call
    pub aborted: u64,
    /// Mutations started while another touched the same keys
    pub overlapping: u64,
}

struct PendingMutation {
    domain: MutationDomain,
    keys: Vec<QueryKey>,
}

/// Runs writes against the remote API with optimistic cache updates
#[derive(Clone)]
pub struct MutationCoordinator {
    store: Arc<CacheStore>,
    executor: QueryExecutor,
    graph: Arc<InvalidationGraph>,
    pending: Arc<Mutex<HashMap<MutationId, PendingMutation>>>,
    stats: Arc<Mutex<MutationStats>>,
}

impl MutationCoordinator {
    pub fn new(executor: QueryExecutor, graph: Arc<InvalidationGraph>) -> Self {
        Self {
            store: executor.store().clone(),
            executor,
            graph,
            pending: Arc::new(Mutex::new(HashMap::new())),
            stats: Arc::new(Mutex::new(MutationStats::default())),
        }
    }

    /// Coordinator with the clinic invalidation table
    pub fn with_clinic_defaults(executor: QueryExecutor) -> Self {
        let depth = executor.store().config().max_cascade_depth;
        Self::new(executor, Arc::new(InvalidationGraph::clinic_defaults(depth)))
    }

    pub fn graph(&self) -> &Arc<InvalidationGraph> {
        &self.graph
    }

    /// Execute `request`, sending its payload through `remote_call`
    ///
    /// Readers see the optimistic value from before the remote call is issued
    /// until it resolves. Failures are never retried.
    pub async fn execute<P, R, F, Fut>(&self, request: MutationRequest<P>, remote_call: F) -> SyncResult<R>
    where
        F: FnOnce(P) -> Fut,
        Fut: Future<Output = SyncResult<R>> + Send + 'static,
        R: Send + 'static,
    {
        let MutationRequest {
            domain,
            payload,
            affected_keys,
            optimistic,
            scope,
        } = request;

        for key in &affected_keys {
            self.executor.cancel(key);
        }

        let snapshot = self.store.snapshot(&affected_keys);
        let mut context = MutationContext::new(domain, snapshot);
        self.stats.lock().started += 1;
        self.register(&context, affected_keys);
        debug!("Mutation {} started in {}", context.id, domain);

        if let Some(apply) = optimistic {
            if let Err(e) = apply(&self.store, &payload) {
                context.roll_back(&self.store)?;
                self.deregister(&context.id);
                self.stats.lock().aborted += 1;
                warn!("Optimistic update for mutation {} failed: {}", context.id, e);
                return Err(match e {
                    SyncError::OptimisticUpdate(_) => e,
                    other => SyncError::OptimisticUpdate(other.to_string()),
                });
            }
        }

        let call = remote_call(payload);
        let coordinator = self.clone();
        let settle = tokio::spawn(async move {
            let result = call.await;
            coordinator.settle(context, scope, result)
        });
        settle.await?
    }

    fn settle<R>(
        &self,
        mut context: MutationContext,
        scope: InvalidationScope,
        result: SyncResult<R>,
    ) -> SyncResult<R> {
        self.deregister(&context.id);
        match result {
            Ok(value) => {
                context.commit()?;
                let report = self.graph.invalidate(&self.store, context.domain, &scope);
                self.stats.lock().committed += 1;
                info!(
                    "Mutation {} committed in {} ({} entries invalidated)",
                    context.id, context.domain, report.entries_invalidated
                );
                Ok(value)
            }
            Err(e) => {
                context.roll_back(&self.store)?;
                self.stats.lock().rolled_back += 1;
                warn!("Mutation {} rolled back: {}", context.id, e);
                Err(e)
            }
        }
    }

    fn register(&self, context: &MutationContext, keys: Vec<QueryKey>) {
        let mut pending = self.pending.lock();
        for (id, other) in pending.iter() {
            let overlaps = keys
                .iter()
                .any(|k| other.keys.iter().any(|o| k.starts_with(o) || o.starts_with(k)));
            if overlaps {
                self.stats.lock().overlapping += 1;
                warn!(
                    "Mutation {} in {} overlaps pending mutation {} in {}; writes are not coordinated",
                    context.id, context.domain, id, other.domain
                );
            }
        }
        pending.insert(
            context.id,
            PendingMutation {
                domain: context.domain,
                keys,
            },
        );
    }

    fn deregister(&self, id: &MutationId) {
        self.pending.lock().remove(id);
    }

    /// Mutations whose remote call has not resolved
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn stats(&self) -> MutationStats {
        self.stats.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{keys, CacheConfig, CacheStatus};
    use serde_json::json;

    fn coordinator() -> MutationCoordinator {
        let store = Arc::new(CacheStore::new(CacheConfig::testing()));
        MutationCoordinator::with_clinic_defaults(QueryExecutor::new(store))
    }

    #[tokio::test]
    async fn test_commit_invalidates_domain() {
        let coordinator = coordinator();
        let store = coordinator.store.clone();
        let detail = keys::staff::detail(1);
        let list = keys::staff::lists();
        store.set(detail.clone(), json!({"name": "A"}), CacheStatus::Fresh);
        store.set(list.clone(), json!([{"name": "A"}]), CacheStatus::Fresh);

        let request = MutationRequest::new(MutationDomain::Staff, json!({"name": "B"}))
            .entity(1)
            .affecting(detail.clone())
            .optimistic(move |store, payload| {
                store.set(keys::staff::detail(1), payload.clone(), CacheStatus::Fresh);
                Ok(())
            });

        let saved = coordinator
            .execute(request, |payload| async move { Ok::<_, SyncError>(payload) })
            .await
            .unwrap();
        assert_eq!(saved, json!({"name": "B"}));

        let entry = store.peek(&detail).unwrap();
        assert_eq!(entry.data, Some(json!({"name": "B"})));
        assert_eq!(entry.status, CacheStatus::Stale);
        assert_eq!(store.peek(&list).unwrap().status, CacheStatus::Stale);
        assert_eq!(coordinator.stats().committed, 1);
        assert_eq!(coordinator.pending(), 0);
    }

    #[tokio::test]
    async fn test_failed_optimistic_apply_aborts_before_remote_call() {
        let coordinator = coordinator();
        let store = coordinator.store.clone();
        let key = keys::stock::detail(5);
        store.set(key.clone(), json!({"qty": 2}), CacheStatus::Fresh);
        let before = store.peek(&key);

        let request = MutationRequest::new(MutationDomain::StockItem, 1)
            .affecting(key.clone())
            .optimistic(|store, _| {
                store.set(keys::stock::detail(5), json!({"qty": -1}), CacheStatus::Fresh);
                Err(SyncError::Internal("negative stock".to_string()))
            });

        let called = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = called.clone();
        let result = coordinator
            .execute(request, move |_| {
                flag.store(true, std::sync::atomic::Ordering::SeqCst);
                async { Ok::<_, SyncError>(()) }
            })
            .await;

        assert!(matches!(result, Err(SyncError::OptimisticUpdate(_))));
        assert!(!called.load(std::sync::atomic::Ordering::SeqCst));
        assert_eq!(store.peek(&key), before);
        assert_eq!(coordinator.stats().aborted, 1);
    }
}
