//! Scriptable translator for testing.

use crate::application::ports::{TranslateCall, Translator, TranslatorError};
use crate::domain::translation::Translation;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Translator double that counts calls and can be slowed down or made to fail.
///
/// Translates by prefixing the target language, so `"hi"` to `es` becomes
/// `"[es] hi"`.
///
/// # Examples
///
/// ```
/// use lingua_gate::application::ports::{TranslateCall, Translator};
/// use lingua_gate::domain::translation::Style;
/// use lingua_gate::infrastructure::mocks::MockTranslator;
/// use std::time::Duration;
///
/// # tokio_test_block(async {
/// let translator = MockTranslator::new();
/// let call = TranslateCall {
///     text: "hi",
///     source_lang: "en",
///     target_lang: "es",
///     style: Style::General,
///     context_hint: "",
///     timeout: Duration::from_secs(1),
/// };
/// let out = translator.translate(call).await.unwrap();
/// assert_eq!(out.translated_text, "[es] hi");
/// assert_eq!(translator.calls(), 1);
/// # });
/// # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockTranslator {
    calls: Arc<AtomicUsize>,
    failures_left: Arc<AtomicUsize>,
    delay_ms: Arc<AtomicU64>,
    last_context: Arc<Mutex<Option<String>>>,
}

impl MockTranslator {
    /// Create a translator answering immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every call after `delay`.
    pub fn with_delay(self, delay: Duration) -> Self {
        self.set_delay(delay);
        self
    }

    /// Change the delay for subsequent calls.
    pub fn set_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.delay_ms.store(millis, Ordering::SeqCst);
    }

    /// Fail the next `count` calls.
    pub fn fail_next(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    /// Number of calls received, including failed ones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Context hint of the most recent call.
    pub fn last_context(&self) -> Option<String> {
        self.last_context
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl Translator for MockTranslator {
    async fn translate(&self, call: TranslateCall<'_>) -> Result<Translation, TranslatorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self
            .last_context
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(call.context_hint.to_string());

        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let should_fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(TranslatorError::Failed("injected failure".to_string()));
        }

        Ok(Translation {
            translated_text: format!("[{}] {}", call.target_lang, call.text),
            confidence: 0.9,
            model_used: "mock-translator".to_string(),
        })
    }
}
