//! Distributed store with an explicit local fallback.
//!
//! `FailoverStore` is what the admission controller, session store and result
//! cache actually talk to. It routes every operation to the distributed store
//! while that store is healthy and to the process-local store otherwise. The
//! routing decision is made per operation, so a store failure in the middle of
//! a request only affects the operations that follow it.
//!
//! ## Mode signal
//!
//! The currently active mode is published on a `tokio::sync::watch` channel.
//! Operators and tests read it with `mode()` or follow it with `subscribe()`
//! instead of inferring degradation from side effects. Every transition is
//! logged: `warn` when falling back to local, `info` when the distributed store
//! recovers.
//!
//! ## Consistency while degraded
//!
//! State written locally during an outage is not replayed to the distributed
//! store. Rate limits become per process, sessions started locally stay local
//! and cached results are recomputed once the distributed store is back.

use crate::application::circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, Transition,
};
use crate::application::metrics::GatewayMetrics;
use crate::application::ports::{KeyValueStore, StoreError};
use crate::infrastructure::local_store::LocalStore;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Which store is currently serving operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendMode {
    /// The shared distributed store
    Distributed,
    /// Node-local memory, limits and sessions are per process
    Local,
}

impl fmt::Display for BackendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendMode::Distributed => f.write_str("distributed"),
            BackendMode::Local => f.write_str("local"),
        }
    }
}

/// Tuning for failure detection.
#[derive(Debug, Clone, Copy)]
pub struct FailoverConfig {
    /// Upper bound on a single distributed store operation
    pub op_timeout: Duration,
    /// Breaker thresholds for declaring the store down and probing it again
    pub breaker: CircuitBreakerConfig,
    /// Pin the local mode regardless of store health
    pub force_local: bool,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            op_timeout: Duration::from_millis(250),
            breaker: CircuitBreakerConfig::default(),
            force_local: false,
        }
    }
}

/// Key-value store routing between a distributed primary and a local fallback.
pub struct FailoverStore {
    primary: Option<Arc<dyn KeyValueStore>>,
    local: Arc<LocalStore>,
    breaker: CircuitBreaker,
    op_timeout: Duration,
    force_local: AtomicBool,
    mode_tx: watch::Sender<BackendMode>,
    metrics: GatewayMetrics,
}

impl fmt::Debug for FailoverStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailoverStore")
            .field("mode", &self.mode())
            .field("has_primary", &self.primary.is_some())
            .field("breaker", &self.breaker.state())
            .field("op_timeout", &self.op_timeout)
            .finish_non_exhaustive()
    }
}

impl FailoverStore {
    /// Create a failover store.
    ///
    /// Without a primary the store runs in local mode for its whole lifetime.
    pub fn new(
        primary: Option<Arc<dyn KeyValueStore>>,
        local: Arc<LocalStore>,
        config: FailoverConfig,
        metrics: GatewayMetrics,
    ) -> Self {
        let initial = if primary.is_some() && !config.force_local {
            BackendMode::Distributed
        } else {
            BackendMode::Local
        };
        let (mode_tx, _) = watch::channel(initial);

        Self {
            primary,
            local,
            breaker: CircuitBreaker::new(config.breaker),
            op_timeout: config.op_timeout,
            force_local: AtomicBool::new(config.force_local),
            mode_tx,
            metrics,
        }
    }

    /// A store that only ever uses local memory.
    pub fn local_only(local: Arc<LocalStore>, metrics: GatewayMetrics) -> Self {
        Self::new(None, local, FailoverConfig::default(), metrics)
    }

    /// Currently active mode.
    pub fn mode(&self) -> BackendMode {
        *self.mode_tx.borrow()
    }

    /// Follow mode changes.
    pub fn subscribe(&self) -> watch::Receiver<BackendMode> {
        self.mode_tx.subscribe()
    }

    /// The local fallback store.
    pub fn local(&self) -> &Arc<LocalStore> {
        &self.local
    }

    /// State of the breaker guarding the distributed store.
    pub fn breaker_state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// Pin or unpin the local mode.
    ///
    /// Unpinning only returns to the distributed mode if the breaker considers
    /// the distributed store healthy.
    pub fn set_force_local(&self, force: bool) {
        self.force_local.store(force, Ordering::Release);
        if force {
            self.set_mode(BackendMode::Local, "forced local mode");
        } else if self.primary.is_some() && self.breaker.state() == CircuitState::Closed {
            self.set_mode(BackendMode::Distributed, "local mode no longer forced");
        }
    }

    fn set_mode(&self, mode: BackendMode, reason: &'static str) {
        let changed = self.mode_tx.send_if_modified(|current| {
            if *current == mode {
                false
            } else {
                *current = mode;
                true
            }
        });

        if !changed {
            return;
        }
        match mode {
            BackendMode::Local => {
                tracing::warn!(mode = %mode, reason, "Backing store degraded, serving from local memory")
            }
            BackendMode::Distributed => {
                tracing::info!(mode = %mode, reason, "Backing store recovered, serving from distributed store")
            }
        }
    }

    /// The primary, if it should be tried for the next operation.
    fn distributed(&self) -> Option<&Arc<dyn KeyValueStore>> {
        if self.force_local.load(Ordering::Acquire) {
            return None;
        }
        let primary = self.primary.as_ref()?;
        self.breaker.allow_request().then_some(primary)
    }

    /// Run one distributed operation, recording its outcome.
    ///
    /// Returns `None` when the caller must fall back to the local store.
    async fn attempt<T, F>(&self, op: &'static str, key: &str, call: F) -> Option<T>
    where
        F: Future<Output = Result<T, StoreError>> + Send,
    {
        let outcome = match tokio::time::timeout(self.op_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.op_timeout)),
        };

        match outcome {
            Ok(value) => {
                if self.breaker.record_success() == Transition::Closed {
                    self.set_mode(BackendMode::Distributed, "recovery call succeeded");
                }
                Some(value)
            }
            Err(e) => {
                tracing::warn!(op, key, error = %e, "Distributed store operation failed, using local store");
                self.metrics.record_store_fallback();
                if self.breaker.record_failure() == Transition::Opened {
                    self.set_mode(BackendMode::Local, "failure threshold reached");
                }
                None
            }
        }
    }
}

#[async_trait]
impl KeyValueStore for FailoverStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        if let Some(primary) = self.distributed() {
            if let Some(value) = self.attempt("get", key, primary.get(key)).await {
                return Ok(value);
            }
        }
        self.local.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError> {
        if let Some(primary) = self.distributed() {
            if let Some(()) = self
                .attempt("set", key, primary.set(key, value.clone(), ttl))
                .await
            {
                return Ok(());
            }
        }
        self.local.set(key, value, ttl).await
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        if let Some(primary) = self.distributed() {
            if let Some(count) = self.attempt("incr", key, primary.incr(key, ttl)).await {
                return Ok(count);
            }
        }
        self.local.incr(key, ttl).await
    }

    async fn push_bounded(
        &self,
        key: &str,
        value: Vec<u8>,
        cap: usize,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        if let Some(primary) = self.distributed() {
            if let Some(()) = self
                .attempt(
                    "push_bounded",
                    key,
                    primary.push_bounded(key, value.clone(), cap, ttl),
                )
                .await
            {
                return Ok(());
            }
        }
        self.local.push_bounded(key, value, cap, ttl).await
    }

    async fn range(&self, key: &str) -> Result<Vec<Vec<u8>>, StoreError> {
        if let Some(primary) = self.distributed() {
            if let Some(items) = self.attempt("range", key, primary.range(key)).await {
                return Ok(items);
            }
        }
        self.local.range(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        if let Some(primary) = self.distributed() {
            if let Some(()) = self.attempt("delete", key, primary.delete(key)).await {
                return Ok(());
            }
        }
        self.local.delete(key).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        if let Some(primary) = self.distributed() {
            if let Some(()) = self.attempt("ping", "", primary.ping()).await {
                return Ok(());
            }
        }
        self.local.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mocks::{FlakyStore, MockClock};

    fn setup(threshold: u32) -> (FailoverStore, Arc<FlakyStore>, GatewayMetrics) {
        let clock = Arc::new(MockClock::at_unix_secs(1_000));
        let primary = Arc::new(FlakyStore::new(clock.clone()));
        let local = Arc::new(LocalStore::new(clock));
        let metrics = GatewayMetrics::new();
        let config = FailoverConfig {
            op_timeout: Duration::from_millis(100),
            breaker: CircuitBreakerConfig {
                failure_threshold: threshold,
                recovery_timeout: Duration::from_millis(50),
            },
            force_local: false,
        };
        let store = FailoverStore::new(
            Some(primary.clone() as Arc<dyn KeyValueStore>),
            local,
            config,
            metrics.clone(),
        );
        (store, primary, metrics)
    }

    #[tokio::test]
    async fn test_healthy_primary_serves_everything() {
        let (store, primary, metrics) = setup(3);
        let ttl = Duration::from_secs(10);

        store.set("k", b"v".to_vec(), ttl).await.unwrap();
        assert_eq!(store.incr("c", ttl).await.unwrap(), 1);

        assert_eq!(store.mode(), BackendMode::Distributed);
        assert_eq!(primary.get("k").await.unwrap(), Some(b"v".to_vec()));
        assert!(store.local().is_empty());
        assert_eq!(metrics.store_fallbacks(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_primary_falls_back_and_switches_mode() {
        let (store, primary, metrics) = setup(2);
        let ttl = Duration::from_secs(10);
        primary.set_reachable(false);

        assert_eq!(store.incr("c", ttl).await.unwrap(), 1);
        assert_eq!(store.mode(), BackendMode::Distributed);
        assert_eq!(store.incr("c", ttl).await.unwrap(), 2);
        assert_eq!(store.mode(), BackendMode::Local);

        // Breaker open, primary no longer touched
        let calls = primary.calls();
        assert_eq!(store.incr("c", ttl).await.unwrap(), 3);
        assert_eq!(primary.calls(), calls);
        assert_eq!(metrics.store_fallbacks(), 2);
    }

    #[tokio::test]
    async fn test_recovery_call_restores_distributed_mode() {
        let (store, primary, _metrics) = setup(1);
        let mut modes = store.subscribe();

        primary.set_reachable(false);
        store.get("k").await.unwrap();
        modes.changed().await.unwrap();
        assert_eq!(*modes.borrow_and_update(), BackendMode::Local);

        primary.set_reachable(true);
        tokio::time::sleep(Duration::from_millis(80)).await;
        store.get("k").await.unwrap();

        modes.changed().await.unwrap();
        assert_eq!(*modes.borrow_and_update(), BackendMode::Distributed);
        assert_eq!(store.breaker_state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_cancelled_recovery_call_does_not_pin_local_mode() {
        let (store, primary, _metrics) = setup(1);

        primary.set_reachable(false);
        store.get("k").await.unwrap();
        assert_eq!(store.mode(), BackendMode::Local);

        // The recovery caller gives up while the store is still answering
        primary.set_reachable(true);
        primary.set_latency(Duration::from_millis(200));
        tokio::time::sleep(Duration::from_millis(80)).await;
        let cancelled = tokio::time::timeout(Duration::from_millis(20), store.get("k")).await;
        assert!(cancelled.is_err());
        assert_eq!(store.breaker_state(), CircuitState::HalfOpen);

        primary.set_latency(Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(80)).await;
        store.get("k").await.unwrap();

        assert_eq!(store.breaker_state(), CircuitState::Closed);
        assert_eq!(store.mode(), BackendMode::Distributed);
    }

    #[tokio::test]
    async fn test_slow_primary_times_out() {
        let (store, primary, metrics) = setup(5);
        primary.set_latency(Duration::from_millis(500));

        let started = std::time::Instant::now();
        store
            .set("k", b"v".to_vec(), Duration::from_secs(1))
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_millis(400));
        assert_eq!(metrics.store_fallbacks(), 1);
        assert_eq!(store.local().len(), 1);
    }

    #[tokio::test]
    async fn test_force_local() {
        let (store, primary, _metrics) = setup(3);

        store.set_force_local(true);
        assert_eq!(store.mode(), BackendMode::Local);
        store
            .set("k", b"v".to_vec(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(primary.calls(), 0);

        store.set_force_local(false);
        assert_eq!(store.mode(), BackendMode::Distributed);
    }

    #[tokio::test]
    async fn test_without_primary_is_local() {
        let clock = Arc::new(MockClock::at_unix_secs(1_000));
        let store = FailoverStore::local_only(
            Arc::new(LocalStore::new(clock)),
            GatewayMetrics::new(),
        );

        assert_eq!(store.mode(), BackendMode::Local);
        assert_eq!(store.incr("c", Duration::from_secs(1)).await.unwrap(), 1);
        store.ping().await.unwrap();
    }
}
