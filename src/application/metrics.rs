//! Gateway counters.
//!
//! Cheap atomic counters updated on the request path and readable at any time
//! through a snapshot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters describing gateway behaviour.
///
/// Cloning shares the underlying counters.
#[derive(Debug, Clone, Default)]
pub struct GatewayMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    requests_admitted: AtomicU64,
    requests_denied: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    translations_started: AtomicU64,
    translations_coalesced: AtomicU64,
    translation_failures: AtomicU64,
    store_fallbacks: AtomicU64,
}

impl GatewayMetrics {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_admitted(&self) {
        self.inner.requests_admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_denied(&self) {
        self.inner.requests_denied.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_hit(&self) {
        self.inner.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_miss(&self) {
        self.inner.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_translation_started(&self) {
        self.inner
            .translations_started
            .fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_coalesced(&self) {
        self.inner
            .translations_coalesced
            .fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_translation_failure(&self) {
        self.inner
            .translation_failures
            .fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_store_fallback(&self) {
        self.inner.store_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of translator invocations actually made.
    pub fn translations_started(&self) -> u64 {
        self.inner.translations_started.load(Ordering::Relaxed)
    }

    /// Number of store operations served locally because the distributed store failed.
    pub fn store_fallbacks(&self) -> u64 {
        self.inner.store_fallbacks.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        MetricsSnapshot {
            requests_admitted: load(&self.inner.requests_admitted),
            requests_denied: load(&self.inner.requests_denied),
            cache_hits: load(&self.inner.cache_hits),
            cache_misses: load(&self.inner.cache_misses),
            translations_started: load(&self.inner.translations_started),
            translations_coalesced: load(&self.inner.translations_coalesced),
            translation_failures: load(&self.inner.translation_failures),
            store_fallbacks: load(&self.inner.store_fallbacks),
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        for counter in [
            &self.inner.requests_admitted,
            &self.inner.requests_denied,
            &self.inner.cache_hits,
            &self.inner.cache_misses,
            &self.inner.translations_started,
            &self.inner.translations_coalesced,
            &self.inner.translation_failures,
            &self.inner.store_fallbacks,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// A point-in-time copy of the gateway counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    /// Requests that passed admission control
    pub requests_admitted: u64,
    /// Requests rejected by admission control
    pub requests_denied: u64,
    /// Lookups answered from the result cache
    pub cache_hits: u64,
    /// Lookups that found nothing fresh
    pub cache_misses: u64,
    /// Translator invocations
    pub translations_started: u64,
    /// Requests that shared another request's translator call
    pub translations_coalesced: u64,
    /// Translator calls that failed or timed out
    pub translation_failures: u64,
    /// Store operations diverted to the local store
    pub store_fallbacks: u64,
}

impl MetricsSnapshot {
    /// Fraction of cache lookups that hit, 0.0 when there were none.
    pub fn cache_hit_rate(&self) -> f64 {
        ratio(self.cache_hits, self.cache_hits + self.cache_misses)
    }

    /// Fraction of admission checks that were denied, 0.0 when there were none.
    pub fn denial_rate(&self) -> f64 {
        ratio(
            self.requests_denied,
            self.requests_admitted + self.requests_denied,
        )
    }
}

fn ratio(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_counters() {
        let metrics = GatewayMetrics::new();
        let other = metrics.clone();

        other.record_cache_hit();
        other.record_translation_started();

        assert_eq!(metrics.snapshot().cache_hits, 1);
        assert_eq!(metrics.translations_started(), 1);
    }

    #[test]
    fn test_rates() {
        let metrics = GatewayMetrics::new();
        assert_eq!(metrics.snapshot().cache_hit_rate(), 0.0);

        metrics.record_cache_hit();
        metrics.record_cache_miss();
        metrics.record_cache_miss();
        metrics.record_cache_miss();
        metrics.record_admitted();
        metrics.record_denied();

        let snapshot = metrics.snapshot();
        assert!((snapshot.cache_hit_rate() - 0.25).abs() < f64::EPSILON);
        assert!((snapshot.denial_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_reset() {
        let metrics = GatewayMetrics::new();
        metrics.record_store_fallback();
        metrics.record_translation_failure();
        metrics.reset();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }
}
