// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Mounted readers
//!
//! An observer stands for a screen that shows one key: it loads the key,
//! follows every change to it and refetches as soon as the key is
//! invalidated. While alive it protects the entry from garbage collection.

use log::debug;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::executor::ExecutorInner;
use super::policy::QueryOptions;
use super::source::QuerySource;
use crate::cache::{CacheEntry, CacheEventKind, CacheStore, KeyFilter, Payload, QueryKey};

pub struct QueryObserver {
    key: QueryKey,
    store: Arc<CacheStore>,
    receiver: watch::Receiver<Option<CacheEntry>>,
    task: JoinHandle<()>,
}

impl QueryObserver {
    pub(crate) fn spawn(
        executor: Arc<ExecutorInner>,
        key: QueryKey,
        source: Arc<dyn QuerySource>,
        options: QueryOptions,
    ) -> Self {
        let store = executor.store().clone();
        store.retain(&key);

        // Subscribe before the first load so no change is missed
        let mut changes = store.subscribe(KeyFilter::Exact(key.clone()));
        let (sender, receiver) = watch::channel(store.peek(&key));

        let task_key = key.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = executor
                .query(task_key.clone(), source.clone(), options.clone())
                .await
            {
                debug!("Initial load of {} failed: {}", task_key, e);
            }

            while let Some(event) = changes.recv().await {
                sender.send_replace(executor.store().peek(&task_key));
                if event.kind == CacheEventKind::Invalidated {
                    debug!("{} invalidated, refetching for observer", task_key);
                    if let Err(e) = executor
                        .query(task_key.clone(), source.clone(), options.clone())
                        .await
                    {
                        debug!("Refetch of {} failed: {}", task_key, e);
                    }
                }
            }
        });

        Self {
            key,
            store,
            receiver,
            task,
        }
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Latest entry state
    pub fn current(&self) -> Option<CacheEntry> {
        self.receiver.borrow().clone()
    }

    pub fn data(&self) -> Option<Payload> {
        self.receiver
            .borrow()
            .as_ref()
            .and_then(|entry| entry.data.clone())
    }

    /// Wait until the entry satisfies `predicate`
    ///
    /// Returns `None` if the observer stopped first.
    pub async fn wait_for<F>(&mut self, mut predicate: F) -> Option<CacheEntry>
    where
        F: FnMut(Option<&CacheEntry>) -> bool,
    {
        self.receiver
            .wait_for(|entry| predicate(entry.as_ref()))
            .await
            .ok()
            .and_then(|entry| (*entry).clone())
    }

    /// Wait for the next published change
    pub async fn changed(&mut self) -> bool {
        self.receiver.changed().await.is_ok()
    }
}

impl Drop for QueryObserver {
    fn drop(&mut self) {
        self.task.abort();
        self.store.release(&self.key);
    }
}
