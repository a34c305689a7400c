// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Mutation state management
//!
//! A context lives for exactly one mutation. It holds the snapshot taken
//! before the optimistic write and settles exactly once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::cache::{CacheSnapshot, CacheStore, MutationDomain, QueryKey};
use crate::error::{SyncError, SyncResult};

/// Unique identifier for a mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MutationId(Uuid);

impl MutationId {
    pub fn new() -> Self {
        MutationId(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for MutationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mut_{}", self.0.simple())
    }
}

/// Mutation lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MutationOutcome {
    /// Remote call not yet resolved
    Pending,
    /// Remote call succeeded, snapshot discarded
    Committed,
    /// Snapshot written back
    RolledBack,
}

/// State of one in-progress mutation
#[derive(Debug)]
pub struct MutationContext {
    pub id: MutationId,
    pub domain: MutationDomain,
    snapshot: CacheSnapshot,
    outcome: MutationOutcome,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl MutationContext {
    pub fn new(domain: MutationDomain, snapshot: CacheSnapshot) -> Self {
        Self {
            id: MutationId::new(),
            domain,
            snapshot,
            outcome: MutationOutcome::Pending,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    pub fn outcome(&self) -> MutationOutcome {
        self.outcome
    }

    pub fn snapshot(&self) -> &CacheSnapshot {
        &self.snapshot
    }

    pub fn affected_keys(&self) -> impl Iterator<Item = &QueryKey> {
        self.snapshot.keys()
    }

    fn ensure_pending(&self, action: &str) -> SyncResult<()> {
        if self.outcome != MutationOutcome::Pending {
            return Err(SyncError::Internal(format!(
                "Cannot {} mutation {}: already {:?}",
                action, self.id, self.outcome
            )));
        }
        Ok(())
    }

    /// Mark the mutation committed and drop the snapshot
    pub fn commit(&mut self) -> SyncResult<()> {
        self.ensure_pending("commit")?;
        self.snapshot = CacheSnapshot::new();
        self.outcome = MutationOutcome::Committed;
        self.ended_at = Some(Utc::now());
        Ok(())
    }

    /// Write the snapshot back into `store`
    pub fn roll_back(&mut self, store: &CacheStore) -> SyncResult<()> {
        self.ensure_pending("roll back")?;
        store.restore(&self.snapshot);
        self.outcome = MutationOutcome::RolledBack;
        self.ended_at = Some(Utc::now());
        Ok(())
    }
}
