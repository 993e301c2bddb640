//! Ed25519 key pairs and signatures.
//!
//! Validators sign re-published vote transactions with both their node
//! identity and their vote authority. Both are plain Ed25519 keys.

use crate::Pubkey;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An Ed25519 key pair for signing.
#[derive(Clone)]
pub struct Keypair(ed25519_dalek::SigningKey);

impl Keypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        Keypair(ed25519_dalek::SigningKey::generate(&mut csprng))
    }

    /// Generate a keypair from a seed (for testing/simulation).
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Keypair(ed25519_dalek::SigningKey::from_bytes(seed))
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> Signature {
        use ed25519_dalek::Signer;
        Signature(self.0.sign(message).to_bytes())
    }

    /// Get the public key.
    pub fn pubkey(&self) -> Pubkey {
        Pubkey(self.0.verifying_key().to_bytes())
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keypair({:?})", self.pubkey())
    }
}

/// A 64-byte Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature(#[serde(with = "signature_bytes")] pub [u8; 64]);

impl Signature {
    /// Size of a signature in bytes.
    pub const BYTES: usize = 64;

    /// Create a zero/placeholder signature.
    pub fn zero() -> Self {
        Signature([0u8; 64])
    }

    /// Get the signature bytes.
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    /// Verify this signature over `message` against `signer`.
    pub fn verify(&self, signer: &Pubkey, message: &[u8]) -> bool {
        use ed25519_dalek::Verifier;
        let key = match ed25519_dalek::VerifyingKey::from_bytes(signer.as_bytes()) {
            Ok(key) => key,
            Err(_) => return false,
        };
        let sig = ed25519_dalek::Signature::from_bytes(&self.0);
        key.verify(message, &sig).is_ok()
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}..)", &hex::encode(self.0)[..16])
    }
}

// serde only derives arrays up to 32 elements.
mod signature_bytes {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 64], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 64], D::Error> {
        let bytes: Vec<u8> = Deserialize::deserialize(deserializer)?;
        bytes
            .try_into()
            .map_err(|v: Vec<u8>| D::Error::invalid_length(v.len(), &"64 signature bytes"))
    }
}
