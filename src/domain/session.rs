//! Conversation exchanges and context hints.
//!
//! A session keeps the last K exchanges in insertion order. The most recent
//! few are rendered into a short hint string that biases the translator
//! toward consistency with what was said before.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One translated turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    /// Text as submitted by the caller
    pub source_text: String,
    /// Translation returned for it
    pub translated_text: String,
    /// Wall-clock time of the exchange, milliseconds since the Unix epoch
    pub timestamp_ms: u64,
}

impl Exchange {
    /// Create a new exchange.
    pub fn new(
        source_text: impl Into<String>,
        translated_text: impl Into<String>,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            source_text: source_text.into(),
            translated_text: translated_text.into(),
            timestamp_ms,
        }
    }

    fn render(&self) -> String {
        format!(
            "Previous: {} -> {}",
            self.source_text, self.translated_text
        )
    }
}

/// Bounded FIFO of exchanges.
///
/// Pushing into a full history evicts the oldest exchange first, so the
/// length never exceeds the capacity, not even transiently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationHistory {
    capacity: usize,
    exchanges: VecDeque<Exchange>,
}

impl ConversationHistory {
    /// Create an empty history holding at most `capacity` exchanges.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            exchanges: VecDeque::with_capacity(capacity),
        }
    }

    /// Rebuild a history from stored exchanges, keeping only the newest `capacity`.
    pub fn from_exchanges(capacity: usize, exchanges: impl IntoIterator<Item = Exchange>) -> Self {
        let mut history = Self::new(capacity);
        for exchange in exchanges {
            history.push(exchange);
        }
        history
    }

    /// Append an exchange, evicting the oldest one if the history is full.
    pub fn push(&mut self, exchange: Exchange) {
        if self.capacity == 0 {
            return;
        }
        while self.exchanges.len() >= self.capacity {
            self.exchanges.pop_front();
        }
        self.exchanges.push_back(exchange);
    }

    /// Number of exchanges held.
    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    /// Check if the history is empty.
    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    /// Exchanges oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Exchange> {
        self.exchanges.iter()
    }

    /// Consume the history, returning its exchanges oldest first.
    pub fn into_exchanges(self) -> Vec<Exchange> {
        self.exchanges.into()
    }

    /// Render the context hint for this history.
    pub fn context_hint(&self, limits: ContextLimits) -> String {
        let exchanges: Vec<Exchange> = self.exchanges.iter().cloned().collect();
        render_context_hint(&exchanges, limits)
    }
}

/// Bounds applied when rendering a context hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextLimits {
    /// How many of the most recent exchanges to include
    pub max_exchanges: usize,
    /// Upper bound on the hint length in characters
    pub max_chars: usize,
}

impl Default for ContextLimits {
    fn default() -> Self {
        Self {
            max_exchanges: 3,
            max_chars: 1000,
        }
    }
}

const SEPARATOR: &str = " | ";

/// Render the most recent exchanges, oldest first, into a bounded hint.
///
/// When the rendered hint is too long the oldest parts go first; a single part
/// that alone exceeds the bound is truncated on a character boundary.
///
/// # Example
/// ```
/// use lingua_gate::domain::session::{render_context_hint, ContextLimits, Exchange};
///
/// let exchanges = vec![
///     Exchange::new("hello", "hola", 1),
///     Exchange::new("thanks", "gracias", 2),
/// ];
/// let hint = render_context_hint(&exchanges, ContextLimits::default());
/// assert_eq!(hint, "Previous: hello -> hola | Previous: thanks -> gracias");
/// ```
pub fn render_context_hint(exchanges: &[Exchange], limits: ContextLimits) -> String {
    if limits.max_exchanges == 0 || limits.max_chars == 0 {
        return String::new();
    }

    let start = exchanges.len().saturating_sub(limits.max_exchanges);
    let mut parts: VecDeque<String> = exchanges[start..].iter().map(Exchange::render).collect();

    let char_len = |parts: &VecDeque<String>| -> usize {
        let text: usize = parts.iter().map(|p| p.chars().count()).sum();
        text + SEPARATOR.len() * parts.len().saturating_sub(1)
    };

    while parts.len() > 1 && char_len(&parts) > limits.max_chars {
        parts.pop_front();
    }

    let hint = parts.into_iter().collect::<Vec<_>>().join(SEPARATOR);
    if hint.chars().count() > limits.max_chars {
        hint.chars().take(limits.max_chars).collect()
    } else {
        hint
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ex(source: &str, translated: &str) -> Exchange {
        Exchange::new(source, translated, 0)
    }

    #[test]
    fn test_history_never_exceeds_capacity() {
        let mut history = ConversationHistory::new(2);
        history.push(ex("a", "A"));
        history.push(ex("b", "B"));
        history.push(ex("c", "C"));

        assert_eq!(history.len(), 2);
        let sources: Vec<_> = history.iter().map(|e| e.source_text.as_str()).collect();
        assert_eq!(sources, vec!["b", "c"]);
    }

    #[test]
    fn test_zero_capacity_history_stays_empty() {
        let mut history = ConversationHistory::new(0);
        history.push(ex("a", "A"));
        assert!(history.is_empty());
    }

    #[test]
    fn test_from_exchanges_keeps_newest() {
        let history =
            ConversationHistory::from_exchanges(3, (0..10).map(|i| ex(&i.to_string(), "x")));
        let sources: Vec<_> = history.iter().map(|e| e.source_text.clone()).collect();
        assert_eq!(sources, vec!["7", "8", "9"]);
    }

    #[test]
    fn test_context_uses_most_recent_exchanges_oldest_first() {
        let exchanges: Vec<_> = ["a", "b", "c", "d"]
            .iter()
            .map(|s| ex(s, &s.to_uppercase()))
            .collect();
        let hint = render_context_hint(&exchanges, ContextLimits::default());
        assert_eq!(
            hint,
            "Previous: b -> B | Previous: c -> C | Previous: d -> D"
        );
    }

    #[test]
    fn test_context_empty_without_exchanges() {
        assert_eq!(render_context_hint(&[], ContextLimits::default()), "");
    }

    #[test]
    fn test_context_drops_oldest_when_too_long() {
        let exchanges = vec![ex("first", "1"), ex("second", "2")];
        let limits = ContextLimits {
            max_exchanges: 3,
            max_chars: 25,
        };
        // "Previous: second -> 2" is 21 chars, both together exceed 25
        assert_eq!(render_context_hint(&exchanges, limits), "Previous: second -> 2");
    }

    #[test]
    fn test_context_truncates_single_oversize_part() {
        let exchanges = vec![ex("ñandú ñandú ñandú", "rhea")];
        let limits = ContextLimits {
            max_exchanges: 3,
            max_chars: 12,
        };
        let hint = render_context_hint(&exchanges, limits);
        assert_eq!(hint.chars().count(), 12);
        assert_eq!(hint, "Previous: ña");
    }
}
