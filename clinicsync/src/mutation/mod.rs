// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Optimistic mutations
//!
//! Writes go through [`MutationCoordinator`], which applies them to the cache
//! before the server confirms them and rolls back if the server refuses.

pub mod context;
pub mod coordinator;
pub mod request;

pub use context::{MutationContext, MutationId, MutationOutcome};
pub use coordinator::{MutationCoordinator, MutationStats};
pub use request::{MutationRequest, OptimisticApply};
