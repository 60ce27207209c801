//! Fixed-window admission arithmetic.
//!
//! A window is a fixed-length slice of wall-clock time aligned to the Unix epoch.
//! Every client identity gets one counter per window bucket; the counter starts
//! from zero in each new bucket, so nothing carries over between windows.
//!
//! The tradeoff of aligned windows is that a client can spend its full quota at
//! the end of one window and again at the start of the next, so up to twice the
//! nominal limit may be admitted within a short interval straddling a boundary.

use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Error returned when a window is configured with unusable parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WindowError {
    /// The request limit must be greater than zero
    #[error("request limit must be greater than 0")]
    ZeroLimit,
    /// The window length must be at least one millisecond
    #[error("window length must be at least 1ms")]
    ZeroLength,
}

/// Milliseconds elapsed since the Unix epoch, saturating at zero for earlier times.
pub fn unix_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis().try_into().unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDecision {
    /// The request may proceed.
    Allowed {
        /// Post-increment count in the current window
        count: u64,
        /// Requests left in the current window
        remaining: u64,
    },
    /// The identity exhausted its quota for the current window.
    Denied {
        /// Configured per-window limit
        limit: u64,
        /// Time until the current window closes
        retry_after: Duration,
    },
}

impl AdmissionDecision {
    /// Check if the request was admitted.
    pub fn is_allowed(&self) -> bool {
        matches!(self, AdmissionDecision::Allowed { .. })
    }

    /// Check if the request was denied.
    pub fn is_denied(&self) -> bool {
        matches!(self, AdmissionDecision::Denied { .. })
    }

    /// Time to wait before the next window opens, if denied.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            AdmissionDecision::Denied { retry_after, .. } => Some(*retry_after),
            AdmissionDecision::Allowed { .. } => None,
        }
    }
}

/// Fixed-window counter parameters.
///
/// # Example
/// ```
/// use lingua_gate::FixedWindow;
/// use std::time::{Duration, UNIX_EPOCH};
///
/// let window = FixedWindow::new(2, Duration::from_secs(60)).unwrap();
/// let t = UNIX_EPOCH + Duration::from_secs(125);
///
/// assert_eq!(window.bucket(t), 2);
/// assert!(window.decide(2, t).is_allowed());
/// assert!(window.decide(3, t).is_denied());
/// assert_eq!(window.retry_after(t), Duration::from_secs(55));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedWindow {
    limit: u64,
    length: Duration,
}

impl FixedWindow {
    /// Create a window admitting `limit` requests per `length`.
    ///
    /// # Errors
    /// Returns `WindowError` if either parameter is zero.
    pub fn new(limit: u64, length: Duration) -> Result<Self, WindowError> {
        if limit == 0 {
            return Err(WindowError::ZeroLimit);
        }
        if length.as_millis() == 0 {
            return Err(WindowError::ZeroLength);
        }
        Ok(Self { limit, length })
    }

    /// Maximum requests admitted per window.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Length of each window.
    pub fn length(&self) -> Duration {
        self.length
    }

    fn length_millis(&self) -> u64 {
        self.length.as_millis().try_into().unwrap_or(u64::MAX)
    }

    /// Index of the window containing `now`.
    pub fn bucket(&self, now: SystemTime) -> u64 {
        unix_millis(now) / self.length_millis()
    }

    /// Time remaining until the window containing `now` closes.
    pub fn retry_after(&self, now: SystemTime) -> Duration {
        let len = self.length_millis();
        let into_window = unix_millis(now) % len;
        Duration::from_millis(len - into_window)
    }

    /// Decide on a request given the counter value after incrementing it.
    pub fn decide(&self, count: u64, now: SystemTime) -> AdmissionDecision {
        if count > self.limit {
            AdmissionDecision::Denied {
                limit: self.limit,
                retry_after: self.retry_after(now),
            }
        } else {
            AdmissionDecision::Allowed {
                count,
                remaining: self.limit - count,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn test_zero_parameters_rejected() {
        assert_eq!(
            FixedWindow::new(0, Duration::from_secs(60)),
            Err(WindowError::ZeroLimit)
        );
        assert_eq!(
            FixedWindow::new(10, Duration::from_micros(10)),
            Err(WindowError::ZeroLength)
        );
    }

    #[test]
    fn test_bucket_alignment() {
        let window = FixedWindow::new(5, Duration::from_secs(60)).unwrap();

        assert_eq!(window.bucket(at(0)), 0);
        assert_eq!(window.bucket(at(59)), 0);
        assert_eq!(window.bucket(at(60)), 1);
        assert_eq!(window.bucket(at(61)), 1);
        assert_eq!(window.bucket(at(3600)), 60);
    }

    #[test]
    fn test_decide_at_limit_boundary() {
        let window = FixedWindow::new(2, Duration::from_secs(60)).unwrap();
        let now = at(10);

        assert_eq!(
            window.decide(1, now),
            AdmissionDecision::Allowed {
                count: 1,
                remaining: 1
            }
        );
        assert_eq!(
            window.decide(2, now),
            AdmissionDecision::Allowed {
                count: 2,
                remaining: 0
            }
        );

        let denied = window.decide(3, now);
        assert!(denied.is_denied());
        assert_eq!(denied.retry_after(), Some(Duration::from_secs(50)));
    }

    #[test]
    fn test_retry_after_never_zero() {
        let window = FixedWindow::new(1, Duration::from_secs(60)).unwrap();
        // Exactly on a boundary the full window is ahead
        assert_eq!(window.retry_after(at(120)), Duration::from_secs(60));
    }

    #[test]
    fn test_pre_epoch_time_saturates() {
        let before = UNIX_EPOCH - Duration::from_secs(5);
        assert_eq!(unix_millis(before), 0);
    }
}
