//! Gateway configuration.
//!
//! Defaults suit a single node without Redis. Every value can be overridden
//! from `LINGUA_*` environment variables; `REDIS_HOST` and `REDIS_PORT` are
//! also honoured when no explicit Redis URL is given.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while reading or validating configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A variable was set but could not be parsed
    #[error("invalid value for {var}: {value:?}")]
    InvalidVariable {
        /// Variable name
        var: String,
        /// Raw value
        value: String,
    },
    /// A setting has a value the gateway cannot run with
    #[error("invalid configuration: {0}")]
    InvalidValue(String),
}

/// Runtime configuration of the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Requests admitted per client per window
    pub rate_limit: u64,
    /// Length of a rate-limit window
    pub rate_window: Duration,
    /// Exchanges kept per session
    pub session_history: usize,
    /// Idle time after which a session is forgotten
    pub session_ttl: Duration,
    /// Lifetime of a cached translation
    pub cache_ttl: Duration,
    /// Exchanges rendered into the context hint
    pub context_exchanges: usize,
    /// Upper bound on the context hint length in characters
    pub context_max_chars: usize,
    /// Default bound on a translator call
    pub translate_timeout: Duration,
    /// Bound on a single distributed store operation
    pub store_timeout: Duration,
    /// Consecutive store failures before switching to local mode
    pub store_failure_threshold: u32,
    /// Time in local mode before probing the distributed store again
    pub store_recovery: Duration,
    /// Interval between purges of expired local entries
    pub reaper_interval: Duration,
    /// Maximum request text length in characters
    pub max_text_chars: usize,
    /// Prefix of every storage key
    pub key_prefix: String,
    /// Distributed store URL, local mode when absent
    pub redis_url: Option<String>,
    /// Stay in local mode even when a Redis URL is configured
    pub force_local: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            rate_limit: 100,
            rate_window: Duration::from_secs(60),
            session_history: 10,
            session_ttl: Duration::from_secs(3 * 3600),
            cache_ttl: Duration::from_secs(3600),
            context_exchanges: 3,
            context_max_chars: 1000,
            translate_timeout: Duration::from_secs(30),
            store_timeout: Duration::from_millis(250),
            store_failure_threshold: 3,
            store_recovery: Duration::from_secs(30),
            reaper_interval: Duration::from_secs(60),
            max_text_chars: 5000,
            key_prefix: "lingua:".to_string(),
            redis_url: None,
            force_local: false,
        }
    }
}

fn parse<T: FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidVariable {
        var: var.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(var: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidVariable {
            var: var.to_string(),
            value: value.to_string(),
        }),
    }
}

impl GatewayConfig {
    /// Read configuration from the process environment.
    ///
    /// # Errors
    /// Returns `ConfigError` if a variable is malformed or the result is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read configuration from a map, mostly useful in tests.
    ///
    /// # Errors
    /// Same as [`GatewayConfig::from_lookup`].
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_lookup(|var| vars.get(var).cloned())
    }

    /// Read configuration through `lookup`, starting from the defaults.
    ///
    /// # Errors
    /// Returns `ConfigError` if a variable is malformed or the result is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        let secs = |var: &str| -> Result<Option<Duration>, ConfigError> {
            lookup(var)
                .map(|v| parse::<u64>(var, &v).map(Duration::from_secs))
                .transpose()
        };
        let millis = |var: &str| -> Result<Option<Duration>, ConfigError> {
            lookup(var)
                .map(|v| parse::<u64>(var, &v).map(Duration::from_millis))
                .transpose()
        };

        if let Some(v) = lookup("LINGUA_RATE_LIMIT") {
            config.rate_limit = parse("LINGUA_RATE_LIMIT", &v)?;
        }
        if let Some(d) = secs("LINGUA_RATE_WINDOW_SECS")? {
            config.rate_window = d;
        }
        if let Some(v) = lookup("LINGUA_SESSION_HISTORY") {
            config.session_history = parse("LINGUA_SESSION_HISTORY", &v)?;
        }
        if let Some(d) = secs("LINGUA_SESSION_TTL_SECS")? {
            config.session_ttl = d;
        }
        if let Some(d) = secs("LINGUA_CACHE_TTL_SECS")? {
            config.cache_ttl = d;
        }
        if let Some(v) = lookup("LINGUA_CONTEXT_EXCHANGES") {
            config.context_exchanges = parse("LINGUA_CONTEXT_EXCHANGES", &v)?;
        }
        if let Some(v) = lookup("LINGUA_CONTEXT_MAX_CHARS") {
            config.context_max_chars = parse("LINGUA_CONTEXT_MAX_CHARS", &v)?;
        }
        if let Some(d) = millis("LINGUA_TRANSLATE_TIMEOUT_MS")? {
            config.translate_timeout = d;
        }
        if let Some(d) = millis("LINGUA_STORE_TIMEOUT_MS")? {
            config.store_timeout = d;
        }
        if let Some(v) = lookup("LINGUA_STORE_FAILURE_THRESHOLD") {
            config.store_failure_threshold = parse("LINGUA_STORE_FAILURE_THRESHOLD", &v)?;
        }
        if let Some(d) = secs("LINGUA_STORE_RECOVERY_SECS")? {
            config.store_recovery = d;
        }
        if let Some(d) = secs("LINGUA_REAPER_INTERVAL_SECS")? {
            config.reaper_interval = d;
        }
        if let Some(v) = lookup("LINGUA_MAX_TEXT_CHARS") {
            config.max_text_chars = parse("LINGUA_MAX_TEXT_CHARS", &v)?;
        }
        if let Some(v) = lookup("LINGUA_KEY_PREFIX") {
            config.key_prefix = v;
        }
        if let Some(v) = lookup("LINGUA_FORCE_LOCAL") {
            config.force_local = parse_bool("LINGUA_FORCE_LOCAL", &v)?;
        }

        config.redis_url = match lookup("LINGUA_REDIS_URL") {
            Some(url) if !url.trim().is_empty() => Some(url.trim().to_string()),
            _ => match lookup("REDIS_HOST") {
                Some(host) if !host.trim().is_empty() => {
                    let port: u16 = match lookup("REDIS_PORT") {
                        Some(p) => parse("REDIS_PORT", &p)?,
                        None => 6379,
                    };
                    Some(format!("redis://{}:{}/", host.trim(), port))
                }
                _ => None,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Check that the gateway can run with these values.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidValue` naming the first offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks: [(bool, &str); 10] = [
            (self.rate_limit == 0, "rate limit must be greater than zero"),
            (self.rate_window.as_millis() == 0, "rate window must be greater than zero"),
            (self.session_history == 0, "session history must be greater than zero"),
            (self.session_ttl.is_zero(), "session TTL must be greater than zero"),
            (self.cache_ttl.is_zero(), "cache TTL must be greater than zero"),
            (self.translate_timeout.is_zero(), "translate timeout must be greater than zero"),
            (self.store_timeout.is_zero(), "store timeout must be greater than zero"),
            (
                self.store_failure_threshold == 0,
                "store failure threshold must be greater than zero",
            ),
            (self.reaper_interval.is_zero(), "reaper interval must be greater than zero"),
            (self.max_text_chars == 0, "max text length must be greater than zero"),
        ];

        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, message)) => Err(ConfigError::InvalidValue((*message).to_string())),
            None => Ok(()),
        }
    }
}
