// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Synchronization error types

use crate::storage::PersistenceError;
use thiserror::Error;

/// Errors surfaced by the synchronization core
///
/// The type is `Clone` because one fetch outcome is handed to every reader
/// that coalesced onto it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    #[error("API error: {message}")]
    Api {
        code: Option<String>,
        message: String,
    },

    #[error("Optimistic update failed: {0}")]
    OptimisticUpdate(String),

    #[error("Invalid cache transition for {key}: {from} -> {to}")]
    InvalidTransition {
        key: String,
        from: String,
        to: String,
    },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Returned by a query source to stop the fetch without retrying
    #[error("Query cancelled: {0}")]
    Cancelled(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Create an API error without an error code
    pub fn api<S: Into<String>>(message: S) -> Self {
        Self::Api {
            code: None,
            message: message.into(),
        }
    }
}

impl From<PersistenceError> for SyncError {
    fn from(error: PersistenceError) -> Self {
        SyncError::Persistence(error.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(error: serde_json::Error) -> Self {
        SyncError::Serialization(error.to_string())
    }
}

impl From<tokio::task::JoinError> for SyncError {
    fn from(error: tokio::task::JoinError) -> Self {
        SyncError::Internal(format!("Background task failed: {}", error))
    }
}

/// Result type used throughout the synchronization core
pub type SyncResult<T> = Result<T, SyncError>;
