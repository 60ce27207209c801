//! Circuit breaker guarding the distributed store.
//!
//! Counts consecutive store failures. Once the threshold is reached the
//! breaker opens and callers stop touching the distributed store, serving from
//! the local store instead. After the recovery timeout one caller is let
//! through as a trial call; its outcome closes or reopens the breaker.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};

/// Breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Store healthy, every call goes to it
    Closed = 0,
    /// Store considered down, calls are diverted
    Open = 1,
    /// One trial call is in flight
    HalfOpen = 2,
}

impl CircuitState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

/// Configuration for the breaker.
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the breaker
    pub failure_threshold: u32,
    /// How long to divert calls before probing again
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(30),
        }
    }
}

/// Outcome of recording a call result, reporting state changes to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// State unchanged
    None,
    /// The breaker just opened
    Opened,
    /// The breaker just closed
    Closed,
}

/// Lock-free failure counter with timed recovery.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: AtomicU8,
    consecutive_failures: AtomicU32,
    // When the breaker opened or last handed out a trial call
    stamp_nanos: AtomicU64,
    config: CircuitBreakerConfig,
    epoch: Instant,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            state: AtomicU8::new(CircuitState::Closed as u8),
            consecutive_failures: AtomicU32::new(0),
            stamp_nanos: AtomicU64::new(0),
            config,
            epoch: Instant::now(),
        }
    }

    /// Current state.
    pub fn state(&self) -> CircuitState {
        CircuitState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Number of failures since the last success.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// Check whether a call may go to the guarded store.
    ///
    /// While open, exactly one caller per recovery timeout is let through as a
    /// trial call; everyone else keeps being diverted until it resolves. A
    /// trial call whose caller was cancelled before reporting back does not
    /// keep the breaker half-open: another one is handed out once the recovery
    /// timeout has passed again.
    pub fn allow_request(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open | CircuitState::HalfOpen => self.claim_trial(),
        }
    }

    fn claim_trial(&self) -> bool {
        let stamp = self.stamp_nanos.load(Ordering::Acquire);
        let now = self.elapsed_nanos();
        if Duration::from_nanos(now.saturating_sub(stamp)) < self.config.recovery_timeout {
            return false;
        }
        if self
            .stamp_nanos
            .compare_exchange(stamp, now, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        // No-op if the breaker closed meanwhile or is already half-open
        let _ = self.state.compare_exchange(
            CircuitState::Open as u8,
            CircuitState::HalfOpen as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        true
    }

    /// Record a successful call.
    pub fn record_success(&self) -> Transition {
        self.consecutive_failures.store(0, Ordering::Release);
        let previous = self
            .state
            .swap(CircuitState::Closed as u8, Ordering::AcqRel);
        if CircuitState::from_u8(previous) == CircuitState::Closed {
            Transition::None
        } else {
            Transition::Closed
        }
    }

    /// Record a failed call.
    pub fn record_failure(&self) -> Transition {
        let failures = self
            .consecutive_failures
            .fetch_add(1, Ordering::AcqRel)
            .saturating_add(1);

        match self.state() {
            CircuitState::HalfOpen => {
                self.open();
                Transition::None
            }
            CircuitState::Closed if failures >= self.config.failure_threshold => {
                let opened = self
                    .state
                    .compare_exchange(
                        CircuitState::Closed as u8,
                        CircuitState::Open as u8,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok();
                if opened {
                    self.stamp();
                    Transition::Opened
                } else {
                    Transition::None
                }
            }
            _ => Transition::None,
        }
    }

    /// Force the breaker open, restarting the recovery timer.
    pub fn open(&self) {
        self.stamp();
        self.state.store(CircuitState::Open as u8, Ordering::Release);
    }

    fn stamp(&self) {
        self.stamp_nanos.store(self.elapsed_nanos(), Ordering::Release);
    }

    fn elapsed_nanos(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn breaker(threshold: u32, recovery: Duration) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: threshold,
            recovery_timeout: recovery,
        })
    }

    #[test]
    fn test_opens_at_threshold() {
        let cb = breaker(3, Duration::from_secs(60));

        assert_eq!(cb.record_failure(), Transition::None);
        assert_eq!(cb.record_failure(), Transition::None);
        assert!(cb.allow_request());
        assert_eq!(cb.record_failure(), Transition::Opened);

        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow_request());
    }

    #[test]
    fn test_success_resets_count() {
        let cb = breaker(2, Duration::from_secs(60));

        cb.record_failure();
        assert_eq!(cb.record_success(), Transition::None);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 1);
    }

    #[test]
    fn test_single_trial_after_recovery() {
        let cb = breaker(1, Duration::from_millis(20));
        cb.record_failure();

        thread::sleep(Duration::from_millis(40));
        assert!(cb.allow_request());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(!cb.allow_request());

        assert_eq!(cb.record_success(), Transition::Closed);
        assert!(cb.allow_request());
    }

    #[test]
    fn test_failed_trial_reopens() {
        let cb = breaker(1, Duration::from_millis(20));
        cb.record_failure();

        thread::sleep(Duration::from_millis(40));
        assert!(cb.allow_request());
        cb.record_failure();

        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow_request());
    }

    #[test]
    fn test_abandoned_trial_is_handed_out_again() {
        let cb = breaker(1, Duration::from_millis(20));
        cb.record_failure();

        thread::sleep(Duration::from_millis(40));
        // The trial caller never reports back
        assert!(cb.allow_request());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(!cb.allow_request());

        thread::sleep(Duration::from_millis(40));
        assert!(cb.allow_request());
        assert!(!cb.allow_request());

        assert_eq!(cb.record_success(), Transition::Closed);
        assert!(cb.allow_request());
    }

    #[test]
    fn test_concurrent_trial_has_one_winner() {
        let cb = Arc::new(breaker(1, Duration::from_millis(10)));
        cb.record_failure();
        thread::sleep(Duration::from_millis(30));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cb = Arc::clone(&cb);
                thread::spawn(move || cb.allow_request())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|allowed| *allowed)
            .count();

        assert_eq!(winners, 1);
    }
}
