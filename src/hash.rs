//! Content hashing for change detection.
//!
//! The digest is only ever compared against another digest of the same
//! algorithm; it is never used to authenticate content.

use sha2::{Digest, Sha256};
use std::fmt;

/// Hex-encoded SHA-256 digest of a byte sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash(String);

impl ContentHash {
    /// Hash `data`.
    pub fn of(data: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(data)))
    }

    /// Wrap a digest received from a peer (e.g. an `X-Custom-Hash` header).
    pub fn from_hex(value: impl Into<String>) -> Self {
        Self(value.into().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
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

    #[test]
    fn test_hash_is_deterministic() {
        let a = ContentHash::of(b"host=db1\n");
        let b = ContentHash::of(b"host=db1\n");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_distinct_inputs_distinct_hashes() {
        let fixtures: [&[u8]; 5] = [b"", b"host=db1", b"host=db2", b"host=db1\n", b"{\"host\":\"db1\"}"];
        for (i, left) in fixtures.iter().enumerate() {
            for right in &fixtures[i + 1..] {
                assert_ne!(ContentHash::of(left), ContentHash::of(right));
            }
        }
    }

    #[test]
    fn test_from_hex_normalizes_case() {
        let hash = ContentHash::of(b"abc");
        let echoed = ContentHash::from_hex(hash.as_str().to_uppercase());
        assert_eq!(hash, echoed);
    }
}
