use std::fmt;

use serde::{Deserialize, Serialize};

/// Reserved value meaning "no object" or "empty subtree".
pub const BLANK_HASH: &str = "blankblankblankblankblank";

/// Accepted length range for a persisted hash string.
///
/// Persisted indices may carry damaged hash strings. Anything outside the
/// band is treated as absent rather than handed to a backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashBand {
    pub min: usize,
    pub max: usize,
}

impl HashBand {
    pub const DEFAULT: Self = Self { min: 20, max: 150 };

    pub fn contains(&self, len: usize) -> bool {
        len >= self.min && len <= self.max
    }
}

impl Default for HashBand {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Key of an immutable blob held by a storage driver.
///
/// Everything in the store except the root pointer is addressed by a
/// `ContentHash`. A blank hash (empty, or equal to [`BLANK_HASH`]) is never
/// loaded or stored.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// The blank sentinel.
    pub fn blank() -> Self {
        Self(BLANK_HASH.to_string())
    }

    /// Wrap a hash string, coercing anything outside the default band to blank.
    pub fn normalize(value: impl Into<String>) -> Self {
        Self::normalize_with(value, HashBand::DEFAULT)
    }

    /// Wrap a hash string, coercing anything outside `band` to blank.
    pub fn normalize_with(value: impl Into<String>, band: HashBand) -> Self {
        let value = value.into();
        if value.is_empty() || value == BLANK_HASH || !band.contains(value.len()) {
            Self::blank()
        } else {
            Self(value)
        }
    }

    /// Build a hash from raw digest bytes.
    pub fn from_digest(digest: &[u8; 32]) -> Self {
        Self(hex::encode(digest))
    }

    /// Returns `true` for the empty string or the sentinel.
    pub fn is_blank(&self) -> bool {
        self.0.is_empty() || self.0 == BLANK_HASH
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ContentHash {
    fn default() -> Self {
        Self::blank()
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_blank() {
            write!(f, "ContentHash(blank)")
        } else {
            let short: String = self.0.chars().take(8).collect();
            write!(f, "ContentHash({short})")
        }
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn blank_forms() {
        assert!(ContentHash::blank().is_blank());
        assert!(ContentHash::normalize("").is_blank());
        assert!(ContentHash::normalize(BLANK_HASH).is_blank());
        assert!(ContentHash::default().is_blank());
    }

    #[test]
    fn digest_hash_is_kept() {
        let hash = ContentHash::from_digest(&[7u8; 32]);
        assert!(!hash.is_blank());
        assert_eq!(ContentHash::normalize(hash.as_str()), hash);
    }

    #[test]
    fn serde_is_transparent() {
        let hash = ContentHash::from_digest(&[1u8; 32]);
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", hash.as_str()));
    }

    proptest! {
        #[test]
        fn out_of_band_lengths_become_blank(len in 0usize..400) {
            let candidate = "a".repeat(len);
            let hash = ContentHash::normalize(candidate);
            prop_assert_eq!(hash.is_blank(), !HashBand::DEFAULT.contains(len));
        }
    }
}
