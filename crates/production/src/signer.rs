//! Ed25519 vote signer.

use forkline_core::VoteSigner;
use forkline_types::{Hash, Keypair, Pubkey, Signature};

/// Signs with a single key acting as node identity and vote authority.
#[derive(Debug, Clone)]
pub struct KeypairSigner {
    keypair: Keypair,
    vote_account: Pubkey,
}

impl KeypairSigner {
    pub fn new(keypair: Keypair, vote_account: Pubkey) -> Self {
        Self {
            keypair,
            vote_account,
        }
    }

    /// Use the vote account address derived from the identity key.
    pub fn with_derived_vote_account(keypair: Keypair) -> Self {
        let identity = keypair.pubkey();
        let vote_account = Pubkey(Hash::from_parts(&[b"vote account", &identity.0]).to_bytes());
        Self::new(keypair, vote_account)
    }
}

impl VoteSigner for KeypairSigner {
    fn identity(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    fn vote_account(&self) -> Pubkey {
        self.vote_account
    }

    fn sign(&self, message: &[u8]) -> Signature {
        self.keypair.sign(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signatures_verify_under_identity() {
        let signer = KeypairSigner::with_derived_vote_account(Keypair::from_seed(&[4; 32]));
        let sig = signer.sign(b"vote");
        assert!(sig.verify(&signer.identity(), b"vote"));
        assert!(!sig.verify(&signer.identity(), b"other"));
        assert_ne!(signer.vote_account(), signer.identity());
    }
}
