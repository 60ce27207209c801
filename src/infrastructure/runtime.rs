//! Gateway assembly and lifecycle.
//!
//! `GatewayBuilder` wires the stores, components and translator together from a
//! `GatewayConfig`. The resulting `GatewayRuntime` owns the background reaper
//! and must be shut down explicitly.
//!
//! ## Example
//!
//! ```rust,no_run
//! use lingua_gate::{GatewayBuilder, GatewayConfig, TranslationRequest, ClientIdentity};
//! use lingua_gate::infrastructure::mocks::MockTranslator;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let runtime = GatewayBuilder::new(GatewayConfig::from_env()?)
//!     .with_translator(Arc::new(MockTranslator::new()))
//!     .build()
//!     .await?;
//!
//! let request = TranslationRequest::new(ClientIdentity::new("10.0.0.1"), "Hello", "es");
//! let response = runtime.gateway().handle(request).await?;
//! println!("{} ({:?})", response.translated_text, runtime.mode());
//!
//! runtime.shutdown().await?;
//! # Ok(())
//! # }
//! ```

use crate::application::admission::AdmissionController;
use crate::application::cache::ResultCache;
use crate::application::circuit_breaker::CircuitBreakerConfig;
use crate::application::context::SessionContextStore;
use crate::application::gateway::{GatewayOptions, TranslationGateway};
use crate::application::metrics::GatewayMetrics;
use crate::application::ports::{Clock, KeyValueStore, Translator};
use crate::domain::session::ContextLimits;
use crate::domain::window::{FixedWindow, WindowError};
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::config::{ConfigError, GatewayConfig};
use crate::infrastructure::failover::{BackendMode, FailoverConfig, FailoverStore};
use crate::infrastructure::local_store::{LocalStore, ReaperHandle};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinError;

/// Bound on the initial connection to the distributed store.
#[cfg(feature = "redis-store")]
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors that can occur when building a gateway.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The configuration is invalid
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The rate-limit window is invalid
    #[error(transparent)]
    Window(#[from] WindowError),
    /// No translator was supplied
    #[error("a translator is required")]
    MissingTranslator,
}

/// Builder for a [`GatewayRuntime`].
#[derive(Debug)]
pub struct GatewayBuilder {
    config: GatewayConfig,
    translator: Option<Arc<dyn Translator>>,
    clock: Arc<dyn Clock>,
    distributed: Option<Arc<dyn KeyValueStore>>,
}

impl GatewayBuilder {
    /// Start from a configuration.
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            translator: None,
            clock: Arc::new(SystemClock::new()),
            distributed: None,
        }
    }

    /// Set the translation backend.
    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = Some(translator);
        self
    }

    /// Set a custom clock (useful for testing).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use `store` as the distributed store instead of connecting to `redis_url`.
    pub fn with_distributed_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.distributed = Some(store);
        self
    }

    /// Assemble the gateway and start its background tasks.
    ///
    /// An unreachable Redis does not fail the build; the gateway starts in local mode.
    ///
    /// # Errors
    /// Returns `BuildError` if the configuration is invalid or no translator was set.
    pub async fn build(self) -> Result<GatewayRuntime, BuildError> {
        let config = self.config;
        config.validate()?;
        let translator = self.translator.ok_or(BuildError::MissingTranslator)?;
        let window = FixedWindow::new(config.rate_limit, config.rate_window)?;
        let clock = self.clock;

        let primary = match self.distributed {
            Some(store) => Some(store),
            None => connect_distributed(&config).await,
        };

        let metrics = GatewayMetrics::new();
        let local = Arc::new(LocalStore::new(Arc::clone(&clock)));
        let reaper = local.spawn_reaper(config.reaper_interval);
        let store = Arc::new(FailoverStore::new(
            primary,
            local,
            FailoverConfig {
                op_timeout: config.store_timeout,
                breaker: CircuitBreakerConfig {
                    failure_threshold: config.store_failure_threshold,
                    recovery_timeout: config.store_recovery,
                },
                force_local: config.force_local,
            },
            metrics.clone(),
        ));
        let shared: Arc<dyn KeyValueStore> = store.clone();

        let admission = AdmissionController::new(
            Arc::clone(&shared),
            Arc::clone(&clock),
            window,
            config.key_prefix.clone(),
            metrics.clone(),
        );
        let sessions = SessionContextStore::new(
            Arc::clone(&shared),
            Arc::clone(&clock),
            config.key_prefix.clone(),
            config.session_history,
            config.session_ttl,
            ContextLimits {
                max_exchanges: config.context_exchanges,
                max_chars: config.context_max_chars,
            },
        );
        let cache = ResultCache::new(shared, Arc::clone(&clock), config.key_prefix.clone());

        let gateway = TranslationGateway::new(
            admission,
            sessions,
            cache,
            translator,
            clock,
            GatewayOptions {
                max_text_chars: config.max_text_chars,
                translate_timeout: config.translate_timeout,
                cache_ttl: config.cache_ttl,
            },
            metrics,
        );

        tracing::info!(
            mode = %store.mode(),
            rate_limit = config.rate_limit,
            window_secs = config.rate_window.as_secs(),
            "Translation gateway started"
        );

        Ok(GatewayRuntime {
            gateway,
            store,
            reaper,
        })
    }
}

#[cfg(feature = "redis-store")]
async fn connect_distributed(config: &GatewayConfig) -> Option<Arc<dyn KeyValueStore>> {
    use crate::infrastructure::redis_store::RedisStore;

    let url = config.redis_url.as_deref()?;
    match tokio::time::timeout(CONNECT_TIMEOUT, RedisStore::connect(url)).await {
        Ok(Ok(store)) => Some(Arc::new(store)),
        Ok(Err(e)) => {
            tracing::warn!(url, error = %e, "Redis unavailable, starting in local mode");
            None
        }
        Err(_) => {
            tracing::warn!(url, timeout = ?CONNECT_TIMEOUT, "Redis connection timed out, starting in local mode");
            None
        }
    }
}

#[cfg(not(feature = "redis-store"))]
async fn connect_distributed(config: &GatewayConfig) -> Option<Arc<dyn KeyValueStore>> {
    if let Some(url) = config.redis_url.as_deref() {
        tracing::warn!(url, "Built without redis-store support, starting in local mode");
    }
    None
}

/// A running gateway together with the resources it owns.
#[derive(Debug)]
pub struct GatewayRuntime {
    gateway: TranslationGateway,
    store: Arc<FailoverStore>,
    reaper: ReaperHandle,
}

impl GatewayRuntime {
    /// The request entry point. Cheap to clone into request handlers.
    pub fn gateway(&self) -> &TranslationGateway {
        &self.gateway
    }

    /// The store all components share.
    pub fn store(&self) -> &Arc<FailoverStore> {
        &self.store
    }

    /// Currently active backing mode.
    pub fn mode(&self) -> BackendMode {
        self.store.mode()
    }

    /// Follow backing mode changes.
    pub fn subscribe_mode(&self) -> watch::Receiver<BackendMode> {
        self.store.subscribe()
    }

    /// Gateway counters.
    pub fn metrics(&self) -> &GatewayMetrics {
        self.gateway.metrics()
    }

    /// Stop background tasks.
    ///
    /// Requests already holding a clone of the gateway keep working against
    /// the stores, but expired local entries are no longer purged.
    ///
    /// # Errors
    /// Returns the join error if the reaper task panicked.
    pub async fn shutdown(self) -> Result<(), JoinError> {
        let result = self.reaper.shutdown().await;
        tracing::info!(
            mode = %self.store.mode(),
            "Translation gateway stopped"
        );
        result
    }
}
