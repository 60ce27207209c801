//! Request coalescing.
//!
//! Concurrent callers asking for the same key share one execution: the first
//! caller becomes the leader and runs the work, everyone arriving while it runs
//! waits for the leader's result. If the leader is cancelled before producing a
//! result, one of the waiting callers takes over and runs the work itself.
//!
//! Each caller may bound its own wait. A follower whose bound elapses gives up
//! without affecting the leader, which still completes and publishes its result
//! to everyone else.

use ahash::RandomState;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::error::Elapsed;
use tokio::time::Instant;

type Flights<K, V> = DashMap<K, (u64, watch::Receiver<Option<V>>), RandomState>;

/// Per-key call deduplication.
pub struct SingleFlight<K, V> {
    flights: Arc<Flights<K, V>>,
    next_id: AtomicU64,
}

impl<K, V> fmt::Debug for SingleFlight<K, V>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleFlight")
            .field("in_flight", &self.flights.len())
            .finish()
    }
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

enum Role<V> {
    Leader(u64, watch::Sender<Option<V>>),
    Follower(watch::Receiver<Option<V>>),
}

/// Registration of a running leader. Dropping it unregisters the flight before
/// the sender closes, so woken followers never see a stale entry.
struct Flight<K, V>
where
    K: Eq + Hash,
{
    flights: Arc<Flights<K, V>>,
    key: K,
    id: u64,
    tx: watch::Sender<Option<V>>,
}

impl<K, V> Drop for Flight<K, V>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        let id = self.id;
        self.flights
            .remove_if(&self.key, |_, (flight_id, _)| *flight_id == id);
    }
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create an empty coalescer.
    pub fn new() -> Self {
        Self {
            flights: Arc::new(DashMap::with_hasher(RandomState::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Number of keys currently being computed.
    pub fn in_flight(&self) -> usize {
        self.flights.len()
    }

    /// Run `work` for `key` unless an execution for it is already running.
    ///
    /// Returns the result and whether it was produced by another caller.
    /// With `wait` set, waiting on another caller's execution gives up after
    /// that long. It does not bound `work` itself when this caller leads.
    ///
    /// # Errors
    /// Returns `Elapsed` if `wait` passed before the shared result arrived.
    pub async fn run<F, Fut>(
        &self,
        key: K,
        wait: Option<Duration>,
        work: F,
    ) -> Result<(V, bool), Elapsed>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        let deadline = wait.map(|wait| Instant::now() + wait);
        loop {
            let role = match self.flights.entry(key.clone()) {
                Entry::Occupied(occupied) => Role::Follower(occupied.get().1.clone()),
                Entry::Vacant(vacant) => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let (tx, rx) = watch::channel(None);
                    vacant.insert((id, rx));
                    Role::Leader(id, tx)
                }
            };

            match role {
                Role::Follower(mut rx) => {
                    // An error means the leader went away without a result
                    let shared = match deadline {
                        Some(deadline) => {
                            tokio::time::timeout_at(deadline, rx.wait_for(Option::is_some))
                                .await?
                                .ok()
                                .and_then(|value| value.clone())
                        }
                        None => rx
                            .wait_for(Option::is_some)
                            .await
                            .ok()
                            .and_then(|value| value.clone()),
                    };
                    if let Some(value) = shared {
                        return Ok((value, true));
                    }
                }
                Role::Leader(id, tx) => {
                    let flight = Flight {
                        flights: Arc::clone(&self.flights),
                        key,
                        id,
                        tx,
                    };
                    let value = work().await;
                    flight.tx.send_replace(Some(value.clone()));
                    drop(flight);
                    return Ok((value, false));
                }
            }
        }
    }
}
