//! Redis-backed key-value store.
//!
//! The distributed variant of the storage capability. All gateway nodes
//! pointing at the same Redis share rate-limit counters, session histories and
//! cached results.
//!
//! ## Data model
//!
//! - Counters: plain integer keys created with `SET NX PX` then `INCR` in one
//!   `MULTI` block, so the expiry is fixed when the window counter is born
//! - Lists: `RPUSH`, `LTRIM` and `PEXPIRE` in one `MULTI` block, so a reader
//!   never sees more than `cap` items
//! - Values: opaque bytes written with `PSETEX`
//!
//! All expiries are in milliseconds.
//!
//! ## Connection handling
//!
//! `redis::aio::ConnectionManager` multiplexes commands over one connection and
//! reconnects on its own. Each operation clones the manager, so no lock is held
//! across an await point.
//!
//! ## Example
//!
//! ```rust,ignore
//! use lingua_gate::infrastructure::redis_store::RedisStore;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = RedisStore::connect("redis://127.0.0.1/")
//!         .await
//!         .expect("Failed to connect to Redis");
//! }
//! ```

use crate::application::ports::{KeyValueStore, StoreError};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError};
use std::fmt;
use std::time::Duration;

fn millis(ttl: Duration) -> u64 {
    // Redis rejects a zero expiry
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

fn map_redis_error(err: RedisError) -> StoreError {
    if err.is_io_error()
        || err.is_connection_dropped()
        || err.is_connection_refusal()
        || err.is_timeout()
    {
        StoreError::Unavailable(err.to_string())
    } else {
        StoreError::Backend(err.to_string())
    }
}

/// Redis-backed store shared by every gateway node.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    url: String,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect to Redis.
    ///
    /// # Arguments
    /// * `url` - Redis connection URL (e.g., "redis://127.0.0.1/")
    ///
    /// # Errors
    /// Returns `StoreError::Unavailable` if the server cannot be reached and
    /// `StoreError::Backend` if the URL is invalid.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = Client::open(url).map_err(|e| StoreError::Backend(e.to_string()))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(map_redis_error)?;

        tracing::info!(url, "Connected to Redis");

        Ok(Self {
            connection,
            url: url.to_string(),
        })
    }

    fn conn(&self) -> ConnectionManager {
        self.connection.clone()
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.conn();
        let value: Option<Vec<u8>> = conn.get(key).await.map_err(map_redis_error)?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let () = redis::cmd("PSETEX")
            .arg(key)
            .arg(millis(ttl))
            .arg(value)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        let mut conn = self.conn();
        let (count,): (u64,) = redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(key)
            .arg(0)
            .arg("PX")
            .arg(millis(ttl))
            .arg("NX")
            .ignore()
            .cmd("INCR")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(count)
    }

    async fn push_bounded(
        &self,
        key: &str,
        value: Vec<u8>,
        cap: usize,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn();

        if cap == 0 {
            let () = conn.del(key).await.map_err(map_redis_error)?;
            return Ok(());
        }

        let keep_from = -i64::try_from(cap).unwrap_or(i64::MAX);
        let () = redis::pipe()
            .atomic()
            .cmd("RPUSH")
            .arg(key)
            .arg(value)
            .ignore()
            .cmd("LTRIM")
            .arg(key)
            .arg(keep_from)
            .arg(-1)
            .ignore()
            .cmd("PEXPIRE")
            .arg(key)
            .arg(millis(ttl))
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }

    async fn range(&self, key: &str) -> Result<Vec<Vec<u8>>, StoreError> {
        let mut conn = self.conn();
        let items: Vec<Vec<u8>> = conn.lrange(key, 0, -1).await.map_err(map_redis_error)?;
        Ok(items)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let () = conn.del(key).await.map_err(map_redis_error)?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_never_zero() {
        assert_eq!(millis(Duration::ZERO), 1);
        assert_eq!(millis(Duration::from_millis(1500)), 1500);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_invalid_url_is_backend_error() {
        let result = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(RedisStore::connect("not a url"));
        assert!(matches!(result, Err(StoreError::Backend(_))));
    }
}
