//! Blake3 digests: blockhashes, bank hashes and branch identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A 32-byte Blake3 digest.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hash([u8; 32]);

impl Hash {
    /// Digest length in bytes.
    pub const BYTES: usize = 32;

    /// The all-zero digest, used as "no hash yet".
    pub const ZERO: Self = Self([0u8; 32]);

    /// Digest of `data`.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Digest of the concatenation of `parts`.
    pub fn from_parts(parts: &[&[u8]]) -> Self {
        let mut hasher = blake3::Hasher::new();
        parts.iter().for_each(|p| {
            hasher.update(p);
        });
        Self(*hasher.finalize().as_bytes())
    }

    /// Wrap an existing digest.
    pub const fn new(digest: [u8; 32]) -> Self {
        Self(digest)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_bytes(self) -> [u8; 32] {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self == &Self::ZERO
    }

    /// Lowercase hex encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, HexError> {
        s.parse()
    }
}

impl FromStr for Hash {
    type Err = HexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != Self::BYTES * 2 {
            return Err(HexError::InvalidLength {
                expected: Self::BYTES * 2,
                actual: s.len(),
            });
        }
        let mut digest = [0u8; 32];
        hex::decode_to_slice(s, &mut digest).map_err(|_| HexError::InvalidHex)?;
        Ok(Self(digest))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form: first and last four bytes.
        write!(
            f,
            "Hash({}..{})",
            hex::encode(&self.0[..4]),
            hex::encode(&self.0[28..])
        )
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Errors parsing a hex digest.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HexError {
    #[error("hex digest must be {expected} characters, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("not a hex string")]
    InvalidHex,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blockhash_is_stable() {
        let a = Hash::from_bytes(b"slot 100");
        assert_eq!(a, Hash::from_bytes(b"slot 100"));
        assert_ne!(a, Hash::from_bytes(b"slot 101"));
    }

    #[test]
    fn test_parts_hash_like_concatenation() {
        assert_eq!(
            Hash::from_parts(&[b"bank", b"hash"]),
            Hash::from_bytes(b"bankhash")
        );
    }

    #[test]
    fn test_hex_parsing() {
        assert_eq!(
            Hash::from_hex("abcd"),
            Err(HexError::InvalidLength {
                expected: 64,
                actual: 4
            })
        );
        assert_eq!("zz".repeat(32).parse::<Hash>(), Err(HexError::InvalidHex));

        let bank_hash = Hash::from_bytes(b"bank 7");
        assert_eq!(bank_hash.to_string().parse::<Hash>(), Ok(bank_hash));
    }

    #[test]
    fn test_zero_is_default() {
        assert!(Hash::default().is_zero());
        assert!(!Hash::from_bytes(b"").is_zero());
        assert_eq!(format!("{:?}", Hash::ZERO), "Hash(00000000..00000000)");
    }
}
