//! Translation gateway orchestration.
//!
//! For each request the gateway:
//!
//! 1. Validates the request shape
//! 2. Counts it against the client's rate limit, short-circuiting on denial
//! 3. Builds the session context hint when the caller asked for it
//! 4. Looks the fingerprint up in the result cache
//! 5. On a miss, calls the translator once per fingerprint no matter how many
//!    identical requests are in flight, and caches the result
//! 6. Records the exchange in the caller's session
//!
//! A translator failure or timeout is returned to every caller waiting on that
//! translation. Nothing is cached and no session is updated in that case.

use crate::application::admission::AdmissionController;
use crate::application::cache::ResultCache;
use crate::application::context::SessionContextStore;
use crate::application::metrics::GatewayMetrics;
use crate::application::ports::{Clock, TranslateCall, Translator, TranslatorError};
use crate::application::singleflight::SingleFlight;
use crate::domain::fingerprint::CacheFingerprint;
use crate::domain::translation::{
    CacheEntry, ResultOrigin, Translation, TranslationRequest, TranslationResponse,
    ValidationError,
};
use crate::domain::window::AdmissionDecision;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Most requests accepted by one batch call.
pub const MAX_BATCH_SIZE: usize = 100;

/// Request-level failures returned to callers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    /// The request was malformed
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),
    /// The client exceeded its rate limit
    #[error("rate limit exceeded, retry after {retry_after:?}")]
    AdmissionDenied {
        /// Time until the current window closes
        retry_after: Duration,
    },
    /// The translator failed or timed out
    #[error(transparent)]
    TranslationFailure(TranslatorError),
}

impl GatewayError {
    /// HTTP status an outer layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::Validation(_) => 400,
            GatewayError::AdmissionDenied { .. } => 429,
            GatewayError::TranslationFailure(TranslatorError::Timeout(_)) => 504,
            GatewayError::TranslationFailure(TranslatorError::Failed(_)) => 502,
        }
    }
}

/// Per-request limits of the gateway.
#[derive(Debug, Clone, Copy)]
pub struct GatewayOptions {
    /// Maximum request text length in characters
    pub max_text_chars: usize,
    /// Translator bound for requests without their own timeout
    pub translate_timeout: Duration,
    /// Lifetime of cached results
    pub cache_ttl: Duration,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            max_text_chars: 5000,
            translate_timeout: Duration::from_secs(30),
            cache_ttl: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Computed {
    translation: Translation,
    from_cache: bool,
}

type Outcome = Result<Computed, GatewayError>;

/// Entry point for translate operations.
#[derive(Debug, Clone)]
pub struct TranslationGateway {
    admission: AdmissionController,
    sessions: SessionContextStore,
    cache: ResultCache,
    translator: Arc<dyn Translator>,
    clock: Arc<dyn Clock>,
    flights: Arc<SingleFlight<CacheFingerprint, Outcome>>,
    options: GatewayOptions,
    metrics: GatewayMetrics,
}

impl TranslationGateway {
    /// Assemble a gateway from its components.
    pub fn new(
        admission: AdmissionController,
        sessions: SessionContextStore,
        cache: ResultCache,
        translator: Arc<dyn Translator>,
        clock: Arc<dyn Clock>,
        options: GatewayOptions,
        metrics: GatewayMetrics,
    ) -> Self {
        Self {
            admission,
            sessions,
            cache,
            translator,
            clock,
            flights: Arc::new(SingleFlight::new()),
            options,
            metrics,
        }
    }

    /// Gateway counters.
    pub fn metrics(&self) -> &GatewayMetrics {
        &self.metrics
    }

    /// Session history store.
    pub fn sessions(&self) -> &SessionContextStore {
        &self.sessions
    }

    /// Handle one translate request.
    ///
    /// # Errors
    /// Returns `GatewayError::Validation` for malformed requests,
    /// `GatewayError::AdmissionDenied` when the client is over its limit and
    /// `GatewayError::TranslationFailure` when the translator fails or times out.
    pub async fn handle(
        &self,
        request: TranslationRequest,
    ) -> Result<TranslationResponse, GatewayError> {
        let started = Instant::now();
        request.validate(self.options.max_text_chars)?;

        if let AdmissionDecision::Denied { retry_after, .. } =
            self.admission.admit(&request.client).await
        {
            return Err(GatewayError::AdmissionDenied { retry_after });
        }

        let context_hint = match (&request.session, request.use_context) {
            (Some(session), true) => self.sessions.context(session).await,
            _ => String::new(),
        };

        let fingerprint = CacheFingerprint::compute(
            &request.text,
            &request.source_lang,
            &request.target_lang,
            request.style.as_str(),
            &context_hint,
        );

        if let Some(entry) = self.cache.lookup(&fingerprint).await {
            self.metrics.record_cache_hit();
            tracing::debug!(fingerprint = %fingerprint, "Cache hit");
            return Ok(respond(
                &request,
                entry.to_translation(),
                ResultOrigin::Cache,
                started,
            ));
        }
        self.metrics.record_cache_miss();
        tracing::debug!(fingerprint = %fingerprint, "Cache miss");

        // Bounds this caller's wait on a shared flight as well as its own call
        let timeout = request.timeout.unwrap_or(self.options.translate_timeout);
        let flight = self
            .flights
            .run(fingerprint, Some(timeout), || {
                self.compute(&request, &context_hint, fingerprint, timeout)
            })
            .await;
        let (outcome, shared) = match flight {
            Ok(flight) => flight,
            Err(_) => {
                self.metrics.record_translation_failure();
                tracing::warn!(
                    fingerprint = %fingerprint,
                    timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    "Gave up waiting on shared translation"
                );
                return Err(GatewayError::TranslationFailure(TranslatorError::Timeout(
                    timeout,
                )));
            }
        };
        let computed = outcome?;

        let origin = if computed.from_cache {
            ResultOrigin::Cache
        } else if shared {
            self.metrics.record_coalesced();
            ResultOrigin::Coalesced
        } else {
            ResultOrigin::Fresh
        };

        if let Some(session) = &request.session {
            if origin != ResultOrigin::Cache {
                self.sessions
                    .append(session, &request.text, &computed.translation.translated_text)
                    .await;
            }
        }

        Ok(respond(&request, computed.translation, origin, started))
    }

    /// Handle up to [`MAX_BATCH_SIZE`] requests in order.
    ///
    /// Every item is admitted separately, so a batch can be partially denied.
    ///
    /// # Errors
    /// Returns `GatewayError::Validation` if the batch is too large. Per-item
    /// failures are reported in the returned vector.
    pub async fn handle_batch(
        &self,
        requests: Vec<TranslationRequest>,
    ) -> Result<Vec<Result<TranslationResponse, GatewayError>>, GatewayError> {
        if requests.len() > MAX_BATCH_SIZE {
            return Err(ValidationError::BatchTooLarge {
                len: requests.len(),
                max: MAX_BATCH_SIZE,
            }
            .into());
        }

        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            results.push(self.handle(request).await);
        }
        Ok(results)
    }

    /// Translate and cache. Runs once per fingerprint among concurrent callers.
    async fn compute(
        &self,
        request: &TranslationRequest,
        context_hint: &str,
        fingerprint: CacheFingerprint,
        timeout: Duration,
    ) -> Outcome {
        // A previous leader may have finished between our lookup and now
        if let Some(entry) = self.cache.lookup(&fingerprint).await {
            return Ok(Computed {
                translation: entry.to_translation(),
                from_cache: true,
            });
        }

        self.metrics.record_translation_started();
        let call = TranslateCall {
            text: &request.text,
            source_lang: &request.source_lang,
            target_lang: &request.target_lang,
            style: request.style,
            context_hint,
            timeout,
        };

        let result = match tokio::time::timeout(timeout, self.translator.translate(call)).await {
            Ok(result) => result,
            Err(_) => Err(TranslatorError::Timeout(timeout)),
        };

        match result {
            Ok(translation) => {
                let entry = CacheEntry::from_translation(
                    &translation,
                    self.clock.now(),
                    self.options.cache_ttl,
                );
                self.cache.store(&fingerprint, &entry).await;
                Ok(Computed {
                    translation,
                    from_cache: false,
                })
            }
            Err(e) => {
                self.metrics.record_translation_failure();
                tracing::error!(fingerprint = %fingerprint, error = %e, "Translation failed");
                Err(GatewayError::TranslationFailure(e))
            }
        }
    }
}

fn respond(
    request: &TranslationRequest,
    translation: Translation,
    origin: ResultOrigin,
    started: Instant,
) -> TranslationResponse {
    TranslationResponse {
        translated_text: translation.translated_text,
        confidence: translation.confidence,
        model_used: translation.model_used,
        source_lang: request.source_lang.clone(),
        target_lang: request.target_lang.clone(),
        style: request.style,
        origin,
        elapsed: started.elapsed(),
    }
}
