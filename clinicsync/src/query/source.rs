// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Remote data sources

use async_trait::async_trait;
use std::future::Future;

use crate::cache::Payload;
use crate::error::SyncResult;

/// Something that can fetch the payload of one query
///
/// Implemented for any `Fn() -> impl Future<Output = SyncResult<Payload>>`
/// closure, so API calls can be passed inline.
#[async_trait]
pub trait QuerySource: Send + Sync {
    async fn fetch(&self) -> SyncResult<Payload>;
}

#[async_trait]
impl<F, Fut> QuerySource for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = SyncResult<Payload>> + Send,
{
    async fn fetch(&self) -> SyncResult<Payload> {
        (self)().await
    }
}
