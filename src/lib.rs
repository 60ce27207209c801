//! # lingua-gate
//!
//! Request governance for slow, expensive translation backends.
//!
//! This crate sits in front of a translation capability and decides, for each
//! request, whether it is admitted, whether an earlier result can be reused and
//! what conversational context the translator should see. The translator itself
//! is a port you implement.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lingua_gate::{ClientIdentity, GatewayBuilder, GatewayConfig, SessionId, Style, TranslationRequest};
//! # use lingua_gate::infrastructure::mocks::MockTranslator;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! # let my_translator = Arc::new(MockTranslator::new());
//! let runtime = GatewayBuilder::new(GatewayConfig::from_env()?)
//!     .with_translator(my_translator)
//!     .build()
//!     .await?;
//!
//! let request = TranslationRequest::new(ClientIdentity::new("203.0.113.7"), "Good morning", "es")
//!     .with_style(Style::Formal)
//!     .with_session(SessionId::new("conversation-42"), true);
//!
//! match runtime.gateway().handle(request).await {
//!     Ok(response) => println!("{} (cached: {})", response.translated_text, response.cached()),
//!     Err(e) => eprintln!("HTTP {}: {}", e.status_code(), e),
//! }
//!
//! runtime.shutdown().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! ### Admission control
//! - **Fixed-window counting**: N requests per client per window, window
//!   boundaries aligned to wall-clock time so every node agrees on them
//! - **Atomic increments**: concurrent requests never overshoot the limit
//! - **Fail-open**: a limiter that cannot count admits the request
//!
//! ### Conversation context
//! - **Bounded history**: the last K exchanges per session, oldest evicted first
//! - **Idle expiry**: sessions disappear after a period without new exchanges
//! - **Context hint**: the last three exchanges rendered as
//!   `"Previous: {source} -> {translation}"`, joined with `" | "`
//!
//! ### Result cache
//! - **Normalized fingerprints**: case and whitespace differences share one entry
//! - **Fixed TTL**: entries are never served past their deadline and reads do
//!   not extend it
//! - **Request coalescing**: concurrent identical misses trigger one translator call
//!
//! ## Backing Store
//!
//! All three components share one [`KeyValueStore`]. With a Redis URL configured
//! the state is global across nodes. Without one, or while Redis is unreachable,
//! the same operations run against process-local memory and limits become per
//! process. The active mode is observable:
//!
//! ```rust,no_run
//! # use lingua_gate::{BackendMode, GatewayRuntime};
//! # async fn watch_mode(runtime: &GatewayRuntime) {
//! let mut modes = runtime.subscribe_mode();
//! while modes.changed().await.is_ok() {
//!     match *modes.borrow() {
//!         BackendMode::Distributed => println!("shared state restored"),
//!         BackendMode::Local => println!("degraded: per-process limits"),
//!     }
//! }
//! # }
//! ```
//!
//! ## Configuration
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `LINGUA_RATE_LIMIT` | 100 | Requests per client per window |
//! | `LINGUA_RATE_WINDOW_SECS` | 60 | Window length |
//! | `LINGUA_SESSION_HISTORY` | 10 | Exchanges kept per session |
//! | `LINGUA_SESSION_TTL_SECS` | 10800 | Session idle expiry |
//! | `LINGUA_CACHE_TTL_SECS` | 3600 | Cached result lifetime |
//! | `LINGUA_REDIS_URL` | unset | Distributed store, local mode when unset |
//! | `LINGUA_STORE_TIMEOUT_MS` | 250 | Bound on one store operation |
//! | `LINGUA_FORCE_LOCAL` | false | Ignore Redis even when configured |
//!
//! See [`GatewayConfig`] for the complete list.

// Domain layer - pure business logic
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - external adapters
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use domain::{
    fingerprint::{normalize_text, CacheFingerprint},
    session::{ContextLimits, ConversationHistory, Exchange},
    translation::{
        CacheEntry, ClientIdentity, ResultOrigin, SessionId, Style, Translation,
        TranslationRequest, TranslationResponse, ValidationError,
    },
    window::{AdmissionDecision, FixedWindow, WindowError},
};

pub use application::{
    admission::AdmissionController,
    cache::ResultCache,
    circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState},
    context::SessionContextStore,
    gateway::{GatewayError, GatewayOptions, TranslationGateway, MAX_BATCH_SIZE},
    metrics::{GatewayMetrics, MetricsSnapshot},
    ports::{Clock, KeyValueStore, StoreError, TranslateCall, Translator, TranslatorError},
    singleflight::SingleFlight,
};

pub use infrastructure::{
    clock::SystemClock,
    config::{ConfigError, GatewayConfig},
    failover::{BackendMode, FailoverConfig, FailoverStore},
    local_store::{LocalStore, ReaperHandle},
    runtime::{BuildError, GatewayBuilder, GatewayRuntime},
    telemetry::{init_tracing, LogFormat},
};

#[cfg(feature = "redis-store")]
pub use infrastructure::redis_store::RedisStore;
