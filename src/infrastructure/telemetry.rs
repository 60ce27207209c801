//! Tracing subscriber setup for binaries embedding the gateway.
//!
//! The library itself only emits events. Installing a subscriber is left to the
//! application, which can call [`init_tracing`] once at startup.

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Failure to install the global subscriber.
#[derive(Debug, Error)]
#[error("failed to set global tracing subscriber: {0}")]
pub struct TelemetryError(String);

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Install a global subscriber filtered by `RUST_LOG`, or by `level` when it is unset.
///
/// # Errors
/// Returns `TelemetryError` if a global subscriber is already installed.
pub fn init_tracing(level: &str, format: LogFormat) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = match format {
        LogFormat::Text => tracing_subscriber::fmt::layer().with_target(true).boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(false)
            .boxed(),
    };

    let subscriber = Registry::default().with(fmt_layer).with(filter);
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| TelemetryError(e.to_string()))
}
