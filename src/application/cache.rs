//! Translation result cache.
//!
//! Entries are keyed by fingerprint and carry their own deadline. The deadline
//! is checked on every read, so an entry is never served past its TTL even if
//! the backing store has not purged it yet.

use crate::application::ports::{Clock, KeyValueStore};
use crate::domain::fingerprint::CacheFingerprint;
use crate::domain::translation::CacheEntry;
use std::sync::Arc;

/// Fingerprint to result cache with fixed per-entry TTL.
#[derive(Debug, Clone)]
pub struct ResultCache {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    key_prefix: String,
}

impl ResultCache {
    /// Create a cache.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            clock,
            key_prefix: key_prefix.into(),
        }
    }

    fn key(&self, fingerprint: &CacheFingerprint) -> String {
        format!("{}cache:{}", self.key_prefix, fingerprint)
    }

    /// Fetch a fresh entry.
    ///
    /// Absent, expired, undecodable and unreadable entries all read as a miss.
    pub async fn lookup(&self, fingerprint: &CacheFingerprint) -> Option<CacheEntry> {
        let key = self.key(fingerprint);
        let bytes = match self.store.get(&key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(fingerprint = %fingerprint, error = %e, "Cache lookup failed");
                return None;
            }
        };

        let entry: CacheEntry = match bincode::deserialize(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(fingerprint = %fingerprint, error = %e, "Dropping corrupt cache entry");
                if let Err(e) = self.store.delete(&key).await {
                    tracing::warn!(fingerprint = %fingerprint, error = %e, "Failed to drop corrupt cache entry");
                }
                return None;
            }
        };

        entry.is_fresh(self.clock.now()).then_some(entry)
    }

    /// Store an entry. Its expiry is the entry's own TTL.
    pub async fn store(&self, fingerprint: &CacheFingerprint, entry: &CacheEntry) {
        let bytes = match bincode::serialize(entry) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(fingerprint = %fingerprint, error = %e, "Failed to encode cache entry");
                return;
            }
        };

        if let Err(e) = self
            .store
            .set(&self.key(fingerprint), bytes, entry.ttl())
            .await
        {
            tracing::warn!(fingerprint = %fingerprint, error = %e, "Cache store failed");
        }
    }
}
