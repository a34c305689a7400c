// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Backend API response envelope
//!
//! Every backend call answers `{ "success": bool, "data"?: T, "error"?: {...} }`.
//! A non-success envelope is handled exactly like a transport error.

use serde::{Deserialize, Serialize};

use crate::cache::Payload;
use crate::error::{SyncError, SyncResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<ApiErrorBody>,
}

impl<T> ApiEnvelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(code: Option<&str>, message: &str) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiErrorBody {
                code: code.map(str::to_string),
                message: message.to_string(),
            }),
        }
    }

    /// Data of a successful envelope, or the error it carries
    pub fn into_result(self) -> SyncResult<T> {
        match (self.success, self.data, self.error) {
            (true, Some(data), _) => Ok(data),
            (true, None, _) => Err(SyncError::api("successful response without data")),
            (false, _, Some(error)) => Err(SyncError::Api {
                code: error.code,
                message: error.message,
            }),
            (false, _, None) => Err(SyncError::api("request failed without an error body")),
        }
    }
}

impl ApiEnvelope<Payload> {
    /// Decode a raw response body
    pub fn from_slice(body: &[u8]) -> SyncResult<Self> {
        Ok(serde_json::from_slice(body)?)
    }
}
