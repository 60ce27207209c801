//! Process-local key-value store.
//!
//! The local variant of the storage capability. It backs every component when
//! no distributed store is configured and takes over when the distributed store
//! is unreachable. Limits enforced through it are per process, not global.
//!
//! Entries carry a wall-clock deadline from the injected clock. Expired entries
//! read as absent and are physically removed by `purge_expired`, which the
//! background reaper runs periodically.

use crate::application::ports::{Clock, KeyValueStore, StoreError};
use ahash::RandomState;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle};

#[derive(Debug, Clone)]
enum Slot {
    Bytes(Vec<u8>),
    Counter(u64),
    List(VecDeque<Vec<u8>>),
}

#[derive(Debug)]
struct LocalEntry {
    slot: Slot,
    expires_at: SystemTime,
}

impl LocalEntry {
    fn new(slot: Slot, now: SystemTime, ttl: Duration) -> Self {
        Self {
            slot,
            expires_at: deadline(now, ttl),
        }
    }

    fn is_live(&self, now: SystemTime) -> bool {
        now < self.expires_at
    }
}

fn deadline(now: SystemTime, ttl: Duration) -> SystemTime {
    // Saturate absurd TTLs to roughly a century
    now.checked_add(ttl)
        .unwrap_or_else(|| now + Duration::from_secs(100 * 365 * 24 * 3600))
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::Backend(format!(
        "WRONGTYPE operation against key '{}' holding the wrong kind of value",
        key
    ))
}

/// Thread-safe local store backed by DashMap.
///
/// DashMap shards its locks, so each operation is one short critical section
/// on a single shard and concurrent operations on different keys rarely contend.
#[derive(Debug)]
pub struct LocalStore {
    map: DashMap<String, LocalEntry, RandomState>,
    clock: Arc<dyn Clock>,
}

impl LocalStore {
    /// Create an empty store reading time from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            map: DashMap::with_hasher(RandomState::new()),
            clock,
        }
    }

    /// Number of physically present entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Remove every expired entry and return how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let removed = AtomicUsize::new(0);
        self.map.retain(|_, entry| {
            let live = entry.is_live(now);
            if !live {
                removed.fetch_add(1, Ordering::Relaxed);
            }
            live
        });
        removed.into_inner()
    }

    /// Remove all entries.
    pub fn clear(&self) {
        self.map.clear();
    }

    /// Start a background task purging expired entries every `interval`.
    ///
    /// The task stops when the returned handle is shut down or dropped.
    ///
    /// # Panics
    /// Panics if called outside of a tokio runtime.
    pub fn spawn_reaper(self: &Arc<Self>, interval: Duration) -> ReaperHandle {
        let store = Arc::clone(self);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = store.purge_expired();
                        if removed > 0 {
                            tracing::debug!(removed, remaining = store.len(), "Purged expired local entries");
                        }
                    }
                    _ = &mut shutdown_rx => break,
                }
            }
        });

        ReaperHandle {
            shutdown_tx: Some(shutdown_tx),
            join,
        }
    }

    fn expire_if_stale(&self, key: &str, now: SystemTime) {
        self.map.remove_if(key, |_, entry| !entry.is_live(now));
    }
}

#[async_trait]
impl KeyValueStore for LocalStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let now = self.clock.now();
        let found = match self.map.get(key) {
            Some(entry) if entry.is_live(now) => match &entry.slot {
                Slot::Bytes(bytes) => Some(bytes.clone()),
                Slot::Counter(count) => Some(count.to_string().into_bytes()),
                Slot::List(_) => return Err(wrong_type(key)),
            },
            Some(_) => {
                // Guard must be released before removal
                None
            }
            None => return Ok(None),
        };

        if found.is_none() {
            self.expire_if_stale(key, now);
        }
        Ok(found)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError> {
        let now = self.clock.now();
        self.map
            .insert(key.to_string(), LocalEntry::new(Slot::Bytes(value), now, ttl));
        Ok(())
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        let now = self.clock.now();
        match self.map.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if !entry.is_live(now) {
                    *entry = LocalEntry::new(Slot::Counter(1), now, ttl);
                    return Ok(1);
                }
                match &mut entry.slot {
                    Slot::Counter(count) => {
                        *count = count.saturating_add(1);
                        Ok(*count)
                    }
                    _ => Err(wrong_type(key)),
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(LocalEntry::new(Slot::Counter(1), now, ttl));
                Ok(1)
            }
        }
    }

    async fn push_bounded(
        &self,
        key: &str,
        value: Vec<u8>,
        cap: usize,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        if cap == 0 {
            self.map.remove(key);
            return Ok(());
        }

        let now = self.clock.now();
        match self.map.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if !entry.is_live(now) {
                    *entry = LocalEntry::new(Slot::List(VecDeque::from([value])), now, ttl);
                    return Ok(());
                }
                match &mut entry.slot {
                    Slot::List(items) => {
                        // Evict before inserting so the list never exceeds `cap`
                        while items.len() >= cap {
                            items.pop_front();
                        }
                        items.push_back(value);
                        entry.expires_at = deadline(now, ttl);
                        Ok(())
                    }
                    _ => Err(wrong_type(key)),
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(LocalEntry::new(
                    Slot::List(VecDeque::from([value])),
                    now,
                    ttl,
                ));
                Ok(())
            }
        }
    }

    async fn range(&self, key: &str) -> Result<Vec<Vec<u8>>, StoreError> {
        let now = self.clock.now();
        let items = match self.map.get(key) {
            Some(entry) if entry.is_live(now) => match &entry.slot {
                Slot::List(items) => return Ok(items.iter().cloned().collect()),
                _ => return Err(wrong_type(key)),
            },
            Some(_) => Vec::new(),
            None => return Ok(Vec::new()),
        };

        self.expire_if_stale(key, now);
        Ok(items)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.map.remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Handle to a running reaper task.
#[derive(Debug)]
pub struct ReaperHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
}

impl ReaperHandle {
    /// Stop the reaper and wait for the task to finish.
    ///
    /// # Errors
    /// Returns the join error if the task panicked.
    pub async fn shutdown(mut self) -> Result<(), JoinError> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        (&mut self.join).await
    }

    /// Check if the reaper task has exited.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mocks::MockClock;

    fn store() -> (Arc<LocalStore>, MockClock) {
        let clock = MockClock::at_unix_secs(1_000);
        (Arc::new(LocalStore::new(Arc::new(clock.clone()))), clock)
    }

    #[tokio::test]
    async fn test_set_get_and_expiry() {
        let (store, clock) = store();

        store
            .set("k", b"v".to_vec(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));

        clock.advance(Duration::from_millis(1500));
        assert_eq!(store.get("k").await.unwrap(), None);
        // Stale entry removed on read
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let (store, _clock) = store();
        let ttl = Duration::from_secs(60);

        store.set("k", b"one".to_vec(), ttl).await.unwrap();
        store.set("k", b"two".to_vec(), ttl).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"two".to_vec()));
    }

    #[tokio::test]
    async fn test_incr_expiry_fixed_at_creation() {
        let (store, clock) = store();
        let ttl = Duration::from_secs(60);

        assert_eq!(store.incr("c", ttl).await.unwrap(), 1);
        clock.advance(Duration::from_secs(50));
        assert_eq!(store.incr("c", ttl).await.unwrap(), 2);

        // 60s after creation the counter is gone even though it was touched at 50s
        clock.advance(Duration::from_secs(10));
        assert_eq!(store.incr("c", ttl).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_counter_readable_as_bytes() {
        let (store, _clock) = store();
        store.incr("c", Duration::from_secs(5)).await.unwrap();
        store.incr("c", Duration::from_secs(5)).await.unwrap();
        assert_eq!(store.get("c").await.unwrap(), Some(b"2".to_vec()));
    }

    #[tokio::test]
    async fn test_push_bounded_keeps_newest() {
        let (store, _clock) = store();
        let ttl = Duration::from_secs(60);

        for item in ["a", "b", "c"] {
            store
                .push_bounded("l", item.as_bytes().to_vec(), 2, ttl)
                .await
                .unwrap();
        }

        let items = store.range("l").await.unwrap();
        assert_eq!(items, vec![b"b".to_vec(), b"c".to_vec()]);
    }

    #[tokio::test]
    async fn test_push_bounded_slides_expiry() {
        let (store, clock) = store();
        let ttl = Duration::from_secs(10);

        store.push_bounded("l", b"a".to_vec(), 5, ttl).await.unwrap();
        clock.advance(Duration::from_secs(8));
        store.push_bounded("l", b"b".to_vec(), 5, ttl).await.unwrap();
        clock.advance(Duration::from_secs(8));
        assert_eq!(store.range("l").await.unwrap().len(), 2);

        clock.advance(Duration::from_secs(3));
        assert!(store.range("l").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_type_is_an_error() {
        let (store, _clock) = store();
        let ttl = Duration::from_secs(10);

        store.set("k", b"v".to_vec(), ttl).await.unwrap();
        assert!(matches!(
            store.incr("k", ttl).await,
            Err(StoreError::Backend(_))
        ));
        assert!(store.range("k").await.is_err());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let (store, clock) = store();

        store
            .set("short", b"1".to_vec(), Duration::from_secs(1))
            .await
            .unwrap();
        store
            .set("long", b"2".to_vec(), Duration::from_secs(100))
            .await
            .unwrap();

        clock.advance(Duration::from_secs(2));
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_lose_nothing() {
        let (store, _clock) = store();
        let mut handles = Vec::new();

        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    store.incr("hot", Duration::from_secs(60)).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.get("hot").await.unwrap(), Some(b"800".to_vec()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_pushes_respect_cap() {
        let (store, _clock) = store();
        let mut handles = Vec::new();

        for t in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                for i in 0..50 {
                    let item = format!("{}-{}", t, i).into_bytes();
                    store
                        .push_bounded("s", item, 10, Duration::from_secs(60))
                        .await
                        .unwrap();
                    assert!(store.range("s").await.unwrap().len() <= 10);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.range("s").await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_reaper_purges_and_shuts_down() {
        let (store, clock) = store();
        store
            .set("k", b"v".to_vec(), Duration::from_secs(1))
            .await
            .unwrap();
        clock.advance(Duration::from_secs(5));

        let reaper = store.spawn_reaper(Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.is_empty());

        reaper.shutdown().await.unwrap();
    }
}
