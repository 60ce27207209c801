//! Cache fingerprint computation.
//!
//! A fingerprint identifies one cacheable unit of translation work:
//! - Normalized source text
//! - Source language (or `auto`)
//! - Target language
//! - Style
//! - Context hint
//!
//! Text is normalized before hashing so that case and whitespace differences
//! land on the same fingerprint, while any change to the words does not.

use std::fmt;

/// Normalize text for fingerprinting.
///
/// Trims the ends, collapses every run of whitespace to a single space and
/// lowercases the result.
///
/// # Example
/// ```
/// use lingua_gate::domain::fingerprint::normalize_text;
///
/// assert_eq!(normalize_text("  Hello\t\n  World "), "hello world");
/// ```
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for word in text.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.extend(word.chars().flat_map(char::to_lowercase));
    }
    out
}

/// Deterministic content hash over the inputs of a translation.
///
/// Uses blake3 so the same inputs hash identically across processes and
/// machines, which matters when nodes share a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheFingerprint([u8; 32]);

impl CacheFingerprint {
    /// Compute a fingerprint from translation inputs.
    ///
    /// Each field is length-prefixed, so moving characters between adjacent
    /// fields always changes the hash.
    pub fn compute(
        text: &str,
        source_lang: &str,
        target_lang: &str,
        style: &str,
        context_hint: &str,
    ) -> Self {
        let mut hasher = blake3::Hasher::new();

        let normalized = normalize_text(text);
        let source = source_lang.trim().to_ascii_lowercase();
        let target = target_lang.trim().to_ascii_lowercase();
        let style = style.trim().to_ascii_lowercase();

        for field in [
            normalized.as_str(),
            source.as_str(),
            target.as_str(),
            style.as_str(),
            context_hint,
        ] {
            hasher.update(&(field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }

        CacheFingerprint(*hasher.finalize().as_bytes())
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex rendering, used as a storage key suffix.
    pub fn to_hex(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CacheFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}
