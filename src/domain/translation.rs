//! Translation requests, results and cache entries.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime};
use thiserror::Error;

use crate::domain::window::unix_millis;

/// Identity a request is rate limited under (typically the caller address).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    /// Wrap an identity string.
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    /// The identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity scoping a conversation, supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap a session identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Translation register.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Style {
    /// No particular register
    #[default]
    General,
    /// Formal and professional
    Formal,
    /// Casual and friendly
    Casual,
    /// Precise technical wording
    Technical,
    /// Literary and poetic
    Literary,
}

impl Style {
    /// Lowercase name of the style.
    pub fn as_str(&self) -> &'static str {
        match self {
            Style::General => "general",
            Style::Formal => "formal",
            Style::Casual => "casual",
            Style::Technical => "technical",
            Style::Literary => "literary",
        }
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown style name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown translation style: {0}")]
pub struct UnknownStyle(pub String);

impl FromStr for Style {
    type Err = UnknownStyle;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "general" => Ok(Style::General),
            "formal" => Ok(Style::Formal),
            "casual" => Ok(Style::Casual),
            "technical" => Ok(Style::Technical),
            "literary" => Ok(Style::Literary),
            _ => Err(UnknownStyle(s.to_string())),
        }
    }
}

/// Source language value meaning "detect it".
pub const AUTO_DETECT: &str = "auto";

/// Reasons a request is rejected before it reaches admission control.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The text was empty or whitespace only
    #[error("missing required field: text")]
    EmptyText,
    /// The text exceeds the configured maximum
    #[error("text too long ({len} chars, max {max})")]
    TextTooLong {
        /// Length of the submitted text in characters
        len: usize,
        /// Configured maximum
        max: usize,
    },
    /// The target language was empty
    #[error("missing required field: target_lang")]
    MissingTargetLanguage,
    /// A batch holds more requests than allowed
    #[error("batch too large ({len} items, max {max})")]
    BatchTooLarge {
        /// Number of submitted requests
        len: usize,
        /// Configured maximum
        max: usize,
    },
}

/// A translate operation as handed to the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationRequest {
    /// Identity the request is rate limited under
    pub client: ClientIdentity,
    /// Text to translate
    pub text: String,
    /// Source language code, or `auto`
    pub source_lang: String,
    /// Target language code
    pub target_lang: String,
    /// Translation register
    pub style: Style,
    /// Conversation the request belongs to, if any
    pub session: Option<SessionId>,
    /// Whether recent conversation exchanges should be passed as context
    pub use_context: bool,
    /// Per-request bound on the translator call, overriding the default
    pub timeout: Option<Duration>,
}

impl TranslationRequest {
    /// Create a request with auto-detected source language and general style.
    pub fn new(
        client: ClientIdentity,
        text: impl Into<String>,
        target_lang: impl Into<String>,
    ) -> Self {
        Self {
            client,
            text: text.into(),
            source_lang: AUTO_DETECT.to_string(),
            target_lang: target_lang.into(),
            style: Style::General,
            session: None,
            use_context: false,
            timeout: None,
        }
    }

    /// Set the source language.
    pub fn with_source_lang(mut self, source_lang: impl Into<String>) -> Self {
        self.source_lang = source_lang.into();
        self
    }

    /// Set the style.
    pub fn with_style(mut self, style: Style) -> Self {
        self.style = style;
        self
    }

    /// Attach the request to a session, optionally using its context.
    pub fn with_session(mut self, session: SessionId, use_context: bool) -> Self {
        self.session = Some(session);
        self.use_context = use_context;
        self
    }

    /// Bound the translator call for this request.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Check the request shape.
    ///
    /// # Errors
    /// Returns `ValidationError` for empty text, oversize text or a missing target language.
    pub fn validate(&self, max_chars: usize) -> Result<(), ValidationError> {
        if self.text.trim().is_empty() {
            return Err(ValidationError::EmptyText);
        }
        let len = self.text.chars().count();
        if len > max_chars {
            return Err(ValidationError::TextTooLong {
                len,
                max: max_chars,
            });
        }
        if self.target_lang.trim().is_empty() {
            return Err(ValidationError::MissingTargetLanguage);
        }
        Ok(())
    }
}

/// Output of the external translator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Translation {
    /// Translated text
    pub translated_text: String,
    /// Confidence in `[0, 1]`
    pub confidence: f32,
    /// Identifier of the model that produced the translation
    pub model_used: String,
}

/// A stored translation result with a fixed freshness deadline.
///
/// The deadline is set at write time and never extended by reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Translated text
    pub translated_text: String,
    /// Confidence in `[0, 1]`
    pub confidence: f32,
    /// Model that produced the translation
    pub model_used: String,
    /// Creation time, milliseconds since the Unix epoch
    pub created_at_ms: u64,
    /// Time to live in milliseconds
    pub ttl_ms: u64,
}

impl CacheEntry {
    /// Build an entry for a fresh translation.
    pub fn from_translation(translation: &Translation, created_at: SystemTime, ttl: Duration) -> Self {
        Self {
            translated_text: translation.translated_text.clone(),
            confidence: translation.confidence,
            model_used: translation.model_used.clone(),
            created_at_ms: unix_millis(created_at),
            ttl_ms: ttl.as_millis().try_into().unwrap_or(u64::MAX),
        }
    }

    /// Time to live.
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    /// Check if the entry may still be served at `now`.
    pub fn is_fresh(&self, now: SystemTime) -> bool {
        unix_millis(now) < self.created_at_ms.saturating_add(self.ttl_ms)
    }

    /// Convert back into a translator result.
    pub fn to_translation(&self) -> Translation {
        Translation {
            translated_text: self.translated_text.clone(),
            confidence: self.confidence,
            model_used: self.model_used.clone(),
        }
    }
}

/// Where a response's translation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultOrigin {
    /// Served from the result cache
    Cache,
    /// Computed by the translator for this request
    Fresh,
    /// Computed by the translator for a concurrent identical request and shared
    Coalesced,
}

/// Gateway response for a translate operation.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationResponse {
    /// Translated text
    pub translated_text: String,
    /// Confidence in `[0, 1]`
    pub confidence: f32,
    /// Model that produced the translation
    pub model_used: String,
    /// Source language as requested
    pub source_lang: String,
    /// Target language
    pub target_lang: String,
    /// Translation register
    pub style: Style,
    /// Where the translation came from
    pub origin: ResultOrigin,
    /// Processing time inside the gateway
    pub elapsed: Duration,
}

impl TranslationResponse {
    /// Check if the response was served from the cache.
    pub fn cached(&self) -> bool {
        self.origin == ResultOrigin::Cache
    }
}
