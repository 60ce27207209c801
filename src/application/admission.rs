//! Per-client admission control.
//!
//! Each client identity gets one counter per fixed window bucket. A request is
//! admitted when the atomic increment of its bucket counter does not exceed
//! the limit, so concurrent requests can never overshoot it.
//!
//! The counter key embeds the bucket number, so a new window simply starts a
//! new counter and old ones expire on their own.

use crate::application::metrics::GatewayMetrics;
use crate::application::ports::{Clock, KeyValueStore};
use crate::domain::translation::ClientIdentity;
use crate::domain::window::{AdmissionDecision, FixedWindow};
use std::sync::Arc;

/// Fixed-window rate limiter over the shared store.
#[derive(Debug, Clone)]
pub struct AdmissionController {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    window: FixedWindow,
    key_prefix: String,
    metrics: GatewayMetrics,
}

impl AdmissionController {
    /// Create a controller.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        window: FixedWindow,
        key_prefix: impl Into<String>,
        metrics: GatewayMetrics,
    ) -> Self {
        Self {
            store,
            clock,
            window,
            key_prefix: key_prefix.into(),
            metrics,
        }
    }

    /// The window this controller enforces.
    pub fn window(&self) -> FixedWindow {
        self.window
    }

    fn counter_key(&self, identity: &ClientIdentity, bucket: u64) -> String {
        format!("{}rl:{}:{}", self.key_prefix, identity, bucket)
    }

    /// Count one request against `identity` and decide whether it may proceed.
    ///
    /// If the counter cannot be updated at all the request is admitted.
    pub async fn admit(&self, identity: &ClientIdentity) -> AdmissionDecision {
        let now = self.clock.now();
        let key = self.counter_key(identity, self.window.bucket(now));

        let decision = match self.store.incr(&key, self.window.length()).await {
            Ok(count) => self.window.decide(count, now),
            Err(e) => {
                tracing::warn!(identity = %identity, error = %e, "Rate limit counter unavailable, admitting request");
                AdmissionDecision::Allowed {
                    count: 0,
                    remaining: self.window.limit(),
                }
            }
        };

        match decision {
            AdmissionDecision::Allowed { count, remaining } => {
                self.metrics.record_admitted();
                tracing::debug!(identity = %identity, count, remaining, "Request admitted");
            }
            AdmissionDecision::Denied { retry_after, .. } => {
                self.metrics.record_denied();
                tracing::debug!(
                    identity = %identity,
                    retry_after_ms = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX),
                    "Request denied"
                );
            }
        }
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::StoreError;
    use crate::infrastructure::local_store::LocalStore;
    use crate::infrastructure::mocks::{FlakyStore, MockCaptureLayer, MockClock};
    use std::time::Duration;
    use tracing::Level;
    use tracing_subscriber::layer::SubscriberExt;

    fn controller(limit: u64, clock: &MockClock) -> AdmissionController {
        let clock: Arc<dyn Clock> = Arc::new(clock.clone());
        AdmissionController::new(
            Arc::new(LocalStore::new(clock.clone())),
            clock,
            FixedWindow::new(limit, Duration::from_secs(60)).unwrap(),
            "test:",
            GatewayMetrics::new(),
        )
    }

    #[tokio::test]
    async fn test_limit_per_identity() {
        let clock = MockClock::at_unix_secs(600);
        let admission = controller(2, &clock);
        let a = ClientIdentity::new("a");
        let b = ClientIdentity::new("b");

        assert!(admission.admit(&a).await.is_allowed());
        assert!(admission.admit(&a).await.is_allowed());
        assert!(admission.admit(&a).await.is_denied());
        assert!(admission.admit(&b).await.is_allowed());
    }

    #[tokio::test]
    async fn test_new_window_resets() {
        let clock = MockClock::at_unix_secs(600);
        let admission = controller(1, &clock);
        let a = ClientIdentity::new("a");

        assert!(admission.admit(&a).await.is_allowed());
        let denied = admission.admit(&a).await;
        assert_eq!(denied.retry_after(), Some(Duration::from_secs(60)));

        clock.advance(Duration::from_secs(60));
        assert!(admission.admit(&a).await.is_allowed());
    }

    #[tokio::test]
    async fn test_denial_logs_retry_after() {
        let capture = MockCaptureLayer::new();
        let subscriber = tracing_subscriber::registry().with(capture.clone());
        let _guard = tracing::subscriber::set_default(subscriber);

        let clock = MockClock::at_unix_secs(600);
        let admission = controller(1, &clock);
        let a = ClientIdentity::new("a");

        admission.admit(&a).await;
        assert!(admission.admit(&a).await.is_denied());

        let denied: Vec<_> = capture
            .get_captured()
            .into_iter()
            .filter(|e| e.level == Level::DEBUG && e.message == "Request denied")
            .collect();
        assert_eq!(denied.len(), 1);
        assert_eq!(denied[0].fields["retry_after_ms"], "60000");
    }

    #[tokio::test]
    async fn test_fails_open_when_store_errors() {
        let clock = MockClock::at_unix_secs(600);
        let shared: Arc<dyn Clock> = Arc::new(clock.clone());
        let store = Arc::new(FlakyStore::new(shared.clone()));
        store.set_reachable(false);
        let metrics = GatewayMetrics::new();
        let admission = AdmissionController::new(
            store.clone(),
            shared,
            FixedWindow::new(1, Duration::from_secs(60)).unwrap(),
            "test:",
            metrics.clone(),
        );

        for _ in 0..5 {
            assert!(admission.admit(&ClientIdentity::new("a")).await.is_allowed());
        }
        assert_eq!(metrics.snapshot().requests_admitted, 5);
        assert!(matches!(
            store.incr("x", Duration::from_secs(1)).await,
            Err(StoreError::Unavailable(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_admission_never_overshoots() {
        let clock = MockClock::at_unix_secs(600);
        let admission = controller(10, &clock);
        let identity = ClientIdentity::new("burst");

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let admission = admission.clone();
                let identity = identity.clone();
                tokio::spawn(async move { admission.admit(&identity).await.is_allowed() })
            })
            .collect();

        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap() {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 10);
    }
}
