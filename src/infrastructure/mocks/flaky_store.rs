//! Backing store double that can be taken offline.

use crate::application::ports::{Clock, KeyValueStore, StoreError};
use crate::infrastructure::local_store::LocalStore;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// In-memory stand-in for a distributed store.
///
/// While unreachable every operation fails with `StoreError::Unavailable`.
/// Data written while reachable survives an outage, like a real server would.
#[derive(Debug)]
pub struct FlakyStore {
    inner: LocalStore,
    reachable: AtomicBool,
    latency_ms: AtomicU64,
    calls: AtomicUsize,
}

impl FlakyStore {
    /// Create a reachable store.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: LocalStore::new(clock),
            reachable: AtomicBool::new(true),
            latency_ms: AtomicU64::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    /// Take the store offline or bring it back.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Check whether the store currently answers.
    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    /// Delay every operation by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(millis, Ordering::SeqCst);
    }

    /// Operations attempted against this store.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.is_reachable() {
            Ok(())
        } else {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.enter().await?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError> {
        self.enter().await?;
        self.inner.set(key, value, ttl).await
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        self.enter().await?;
        self.inner.incr(key, ttl).await
    }

    async fn push_bounded(
        &self,
        key: &str,
        value: Vec<u8>,
        cap: usize,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.enter().await?;
        self.inner.push_bounded(key, value, cap, ttl).await
    }

    async fn range(&self, key: &str) -> Result<Vec<Vec<u8>>, StoreError> {
        self.enter().await?;
        self.inner.range(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.enter().await?;
        self.inner.delete(key).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.enter().await
    }
}
