//! Per-session conversation context.
//!
//! Every session keeps its last K exchanges in a bounded list in the shared
//! store. Appending trims the list to K and slides the idle expiry, so an
//! abandoned session disappears on its own. Reads do not extend it.

use crate::application::ports::{Clock, KeyValueStore};
use crate::domain::session::{ContextLimits, ConversationHistory, Exchange};
use crate::domain::translation::SessionId;
use crate::domain::window::unix_millis;
use std::sync::Arc;
use std::time::Duration;

/// Bounded session history store.
#[derive(Debug, Clone)]
pub struct SessionContextStore {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    key_prefix: String,
    capacity: usize,
    idle_ttl: Duration,
    limits: ContextLimits,
}

impl SessionContextStore {
    /// Create a session store keeping `capacity` exchanges per session.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        key_prefix: impl Into<String>,
        capacity: usize,
        idle_ttl: Duration,
        limits: ContextLimits,
    ) -> Self {
        Self {
            store,
            clock,
            key_prefix: key_prefix.into(),
            capacity,
            idle_ttl,
            limits,
        }
    }

    fn key(&self, session: &SessionId) -> String {
        format!("{}session:{}", self.key_prefix, session)
    }

    /// Stored exchanges, oldest first, at most `capacity` of them.
    ///
    /// Undecodable items are skipped. A store failure reads as an empty history.
    pub async fn history(&self, session: &SessionId) -> Vec<Exchange> {
        self.load(session).await.into_exchanges()
    }

    /// Context hint for the next request of `session`, empty for a new session.
    pub async fn context(&self, session: &SessionId) -> String {
        self.load(session).await.context_hint(self.limits)
    }

    // The stored list may be longer than our capacity when it was written by
    // a node configured with a larger one
    async fn load(&self, session: &SessionId) -> ConversationHistory {
        let items = match self.store.range(&self.key(session)).await {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(session = %session, error = %e, "Failed to read session history");
                return ConversationHistory::new(self.capacity);
            }
        };

        let exchanges = items
            .iter()
            .filter_map(|bytes| match bincode::deserialize::<Exchange>(bytes) {
                Ok(exchange) => Some(exchange),
                Err(e) => {
                    tracing::warn!(session = %session, error = %e, "Skipping corrupt session entry");
                    None
                }
            });
        ConversationHistory::from_exchanges(self.capacity, exchanges)
    }

    /// Record a completed exchange.
    pub async fn append(&self, session: &SessionId, source_text: &str, translated_text: &str) {
        let exchange = Exchange::new(
            source_text,
            translated_text,
            unix_millis(self.clock.now()),
        );
        let bytes = match bincode::serialize(&exchange) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(session = %session, error = %e, "Failed to encode exchange");
                return;
            }
        };

        if let Err(e) = self
            .store
            .push_bounded(&self.key(session), bytes, self.capacity, self.idle_ttl)
            .await
        {
            tracing::warn!(session = %session, error = %e, "Failed to append to session history");
        }
    }

    /// Forget a session.
    pub async fn clear(&self, session: &SessionId) {
        if let Err(e) = self.store.delete(&self.key(session)).await {
            tracing::warn!(session = %session, error = %e, "Failed to clear session");
        }
    }
}
