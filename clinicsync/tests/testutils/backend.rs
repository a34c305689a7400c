//! Scripted stand-in for the backend API

use clinicsync::{Payload, SyncError, SyncResult};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub type BoxedFetch = Pin<Box<dyn Future<Output = SyncResult<Payload>> + Send>>;

/// Backend whose responses are queued by the test
///
/// When the queue runs dry the fallback response is served.
#[derive(Clone)]
pub struct FakeBackend {
    calls: Arc<AtomicUsize>,
    responses: Arc<Mutex<VecDeque<SyncResult<Payload>>>>,
    fallback: Arc<Mutex<SyncResult<Payload>>>,
    latency: Duration,
}

impl FakeBackend {
    pub fn returning(payload: Payload) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            responses: Arc::new(Mutex::new(VecDeque::new())),
            fallback: Arc::new(Mutex::new(Ok(payload))),
            latency: Duration::ZERO,
        }
    }

    pub fn failing(message: &str) -> Self {
        let backend = Self::returning(Payload::Null);
        *backend.fallback.lock() = Err(SyncError::api(message));
        backend
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn push(&self, response: SyncResult<Payload>) {
        self.responses.lock().push_back(response);
    }

    pub fn set_fallback(&self, response: SyncResult<Payload>) {
        *self.fallback.lock() = response;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// A query source bound to this backend
    pub fn source(&self) -> impl Fn() -> BoxedFetch + Send + Sync + 'static {
        let backend = self.clone();
        move || -> BoxedFetch {
            let backend = backend.clone();
            Box::pin(async move { backend.respond().await })
        }
    }

    async fn respond(&self) -> SyncResult<Payload> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let queued = self.responses.lock().pop_front();
        match queued {
            Some(response) => response,
            None => self.fallback.lock().clone(),
        }
    }
}
