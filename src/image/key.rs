//! Cache key derivation from image URLs.

use std::fmt;

/// Filesystem-safe cache key derived from an absolute URL.
///
/// All non-alphanumeric characters are stripped, so the key doubles as the
/// disk cache filename. Distinct URLs that differ only in punctuation share
/// a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageKey(String);

impl ImageKey {
    /// Derives the key for the given absolute URL.
    pub fn from_url(url: &str) -> Self {
        Self(url.chars().filter(|c| c.is_ascii_alphanumeric()).collect())
    }

    /// The sanitized key string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
