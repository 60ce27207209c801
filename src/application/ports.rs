//! Ports (interfaces) for the application layer.
//!
//! In hexagonal architecture, ports define the interfaces that the application
//! layer needs. Infrastructure adapters implement these ports.

use async_trait::async_trait;
use std::fmt::Debug;
use std::time::{Duration, SystemTime};
use thiserror::Error;

use crate::domain::translation::{Style, Translation};

/// Port for obtaining the current wall-clock time.
///
/// Window buckets and cache deadlines are wall-clock based so that every node
/// sharing a backing store agrees on them.
/// Infrastructure provides concrete implementations (SystemClock, MockClock).
pub trait Clock: Send + Sync + Debug {
    /// Get the current time.
    fn now(&self) -> SystemTime;
}

/// Errors raised by a backing store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store could not be reached
    #[error("backing store unavailable: {0}")]
    Unavailable(String),
    /// The store did not answer within the configured timeout
    #[error("backing store timed out after {0:?}")]
    Timeout(Duration),
    /// A stored value could not be encoded or decoded
    #[error("codec error: {0}")]
    Codec(String),
    /// The store rejected the command
    #[error("backing store error: {0}")]
    Backend(String),
}

/// Port for a shared key-value store.
///
/// This is the storage capability the admission controller, session store and
/// result cache are written against. Two kinds of adapters implement it: a
/// distributed one shared by all nodes and a process-local one.
///
/// Every operation is atomic per key. Expiry is expressed as a duration from
/// the time of the call.
#[async_trait]
pub trait KeyValueStore: Send + Sync + Debug {
    /// Fetch a value, `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Store a value, replacing any previous one, expiring after `ttl`.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError>;

    /// Atomically increment a counter and return the new value.
    ///
    /// A counter that does not exist starts at zero and expires `ttl` after
    /// its creation; later increments do not move the expiry.
    async fn incr(&self, key: &str, ttl: Duration) -> Result<u64, StoreError>;

    /// Atomically append to a list, keep only the newest `cap` items and
    /// reset the list expiry to `ttl`.
    async fn push_bounded(
        &self,
        key: &str,
        value: Vec<u8>,
        cap: usize,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// All items of a list, oldest first. Empty if the list is absent.
    async fn range(&self, key: &str) -> Result<Vec<Vec<u8>>, StoreError>;

    /// Remove a key.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Check connectivity.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Errors raised by the external translator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslatorError {
    /// The translator reported a failure
    #[error("translation failed: {0}")]
    Failed(String),
    /// The translator did not answer in time
    #[error("translation timed out after {0:?}")]
    Timeout(Duration),
}

/// Inputs of a single translator invocation.
#[derive(Debug, Clone, Copy)]
pub struct TranslateCall<'a> {
    /// Text to translate
    pub text: &'a str,
    /// Source language code, or `auto`
    pub source_lang: &'a str,
    /// Target language code
    pub target_lang: &'a str,
    /// Translation register
    pub style: Style,
    /// Rendered conversation context, empty when unused
    pub context_hint: &'a str,
    /// Deadline the caller will enforce on this call
    pub timeout: Duration,
}

/// Port for the translation capability.
///
/// Implementations may be arbitrarily slow. The gateway bounds every call by
/// `TranslateCall::timeout` regardless of whether the implementation honours it.
#[async_trait]
pub trait Translator: Send + Sync + Debug {
    /// Translate text.
    async fn translate(&self, call: TranslateCall<'_>) -> Result<Translation, TranslatorError>;
}
