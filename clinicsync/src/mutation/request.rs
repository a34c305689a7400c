// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Mutation requests

use crate::cache::{CacheStore, InvalidationScope, KeySegment, MutationDomain, QueryKey};
use crate::error::SyncResult;

/// Speculative cache write applied before the remote call
pub type OptimisticApply<P> = Box<dyn FnOnce(&CacheStore, &P) -> SyncResult<()> + Send>;

/// A write intent against one domain
///
/// ```ignore
/// let request = MutationRequest::new(MutationDomain::Appointments, update)
///     .entity(7)
///     .affecting(keys::appointments::detail(7))
///     .optimistic(|store, update| {
///         store.set(keys::appointments::detail(7), serde_json::to_value(update)?, CacheStatus::Fresh);
///         Ok(())
///     });
/// ```
pub struct MutationRequest<P> {
    pub(crate) domain: MutationDomain,
    pub(crate) payload: P,
    pub(crate) affected_keys: Vec<QueryKey>,
    pub(crate) optimistic: Option<OptimisticApply<P>>,
    pub(crate) scope: InvalidationScope,
}

impl<P> MutationRequest<P> {
    pub fn new(domain: MutationDomain, payload: P) -> Self {
        Self {
            domain,
            payload,
            affected_keys: Vec::new(),
            optimistic: None,
            scope: InvalidationScope::default(),
        }
    }

    /// Key the optimistic write touches; captured for rollback
    pub fn affecting(mut self, key: QueryKey) -> Self {
        if !self.affected_keys.contains(&key) {
            self.affected_keys.push(key);
        }
        self
    }

    pub fn affecting_all<I: IntoIterator<Item = QueryKey>>(mut self, keys: I) -> Self {
        for key in keys {
            self = self.affecting(key);
        }
        self
    }

    pub fn optimistic<F>(mut self, apply: F) -> Self
    where
        F: FnOnce(&CacheStore, &P) -> SyncResult<()> + Send + 'static,
    {
        self.optimistic = Some(Box::new(apply));
        self
    }

    /// Id of the entity being written, for detail-key invalidation
    pub fn entity(mut self, id: impl Into<KeySegment>) -> Self {
        self.scope.entity_id = Some(id.into());
        self
    }

    /// Id of the owning entity (invoice of a payment, patient of an appointment)
    pub fn parent(mut self, id: impl Into<KeySegment>) -> Self {
        self.scope.parent_id = Some(id.into());
        self
    }

    pub fn domain(&self) -> MutationDomain {
        self.domain
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn affected_keys(&self) -> &[QueryKey] {
        &self.affected_keys
    }

    pub fn scope(&self) -> &InvalidationScope {
        &self.scope
    }
}
