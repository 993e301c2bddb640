//! Vote transaction format.
//!
//! Votes arrive in two ways: landed in blocks (executed by the executor)
//! and raw over gossip. Gossip votes are parsed, re-stamped, re-signed and
//! re-published by replay.

use crate::{CodecError, Hash, Pubkey, Signature, Slot};
use serde::{Deserialize, Serialize};

/// Domain tag prepended to a vote message before signing.
pub const DOMAIN_VOTE: &[u8] = b"forkline_vote:";

/// The tower state carried by a vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteStateUpdate {
    /// Tower root, if the voter has one.
    pub root: Option<Slot>,
    /// Voted slots, oldest first.
    pub slots: Vec<Slot>,
    /// Bank hash of the last voted slot.
    pub hash: Hash,
    /// Wall-clock timestamp, in seconds.
    pub timestamp: Option<i64>,
}

impl VoteStateUpdate {
    /// The most recent voted slot.
    pub fn last_slot(&self) -> Option<Slot> {
        self.slots.last().copied()
    }
}

/// The signed part of a vote transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteMessage {
    /// Validator identity paying the fee.
    pub node_identity: Pubkey,
    /// Vote account being updated.
    pub vote_account: Pubkey,
    /// Authorized voter of the vote account.
    pub authority: Pubkey,
    /// Recent blockhash.
    pub recent_blockhash: Hash,
    /// The vote itself.
    pub vote: VoteStateUpdate,
}

impl VoteMessage {
    /// Bytes that signers sign.
    pub fn signing_bytes(&self) -> Result<Vec<u8>, CodecError> {
        let body = bincode::serialize(self).map_err(|e| CodecError::Encode(e.to_string()))?;
        let mut message = Vec::with_capacity(DOMAIN_VOTE.len() + body.len());
        message.extend_from_slice(DOMAIN_VOTE);
        message.extend_from_slice(&body);
        Ok(message)
    }
}

/// A vote transaction: the message plus identity and authority signatures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTransaction {
    /// Signatures, identity first then authority.
    pub signatures: Vec<Signature>,
    /// Signed message.
    pub message: VoteMessage,
}

impl VoteTransaction {
    /// Parse a serialized vote transaction.
    pub fn parse(bytes: &[u8]) -> Result<Self, CodecError> {
        bincode::deserialize(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }

    /// Serialize for publication.
    pub fn serialize(&self) -> Result<Vec<u8>, CodecError> {
        bincode::serialize(self).map_err(|e| CodecError::Encode(e.to_string()))
    }

    /// Replace the signatures with fresh ones over the current message.
    ///
    /// `sign` is invoked once per required signer with the signer's key.
    pub fn resign<F>(&mut self, mut sign: F) -> Result<(), CodecError>
    where
        F: FnMut(&Pubkey, &[u8]) -> Signature,
    {
        let bytes = self.message.signing_bytes()?;
        let identity = sign(&self.message.node_identity, &bytes);
        let authority = sign(&self.message.authority, &bytes);
        self.signatures = vec![identity, authority];
        Ok(())
    }

    /// Check both signatures against the message.
    pub fn verify(&self) -> bool {
        let Ok(bytes) = self.message.signing_bytes() else {
            return false;
        };
        match self.signatures.as_slice() {
            [identity, authority] => {
                identity.verify(&self.message.node_identity, &bytes)
                    && authority.verify(&self.message.authority, &bytes)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Keypair;

    fn vote_txn(identity: &Keypair) -> VoteTransaction {
        VoteTransaction {
            signatures: vec![],
            message: VoteMessage {
                node_identity: identity.pubkey(),
                vote_account: Pubkey([9u8; 32]),
                authority: identity.pubkey(),
                recent_blockhash: Hash::from_bytes(b"recent"),
                vote: VoteStateUpdate {
                    root: Some(Slot(10)),
                    slots: vec![Slot(11), Slot(12)],
                    hash: Hash::from_bytes(b"bank 12"),
                    timestamp: None,
                },
            },
        }
    }

    #[test]
    fn test_parse_serialized() {
        let identity = Keypair::from_seed(&[3u8; 32]);
        let txn = vote_txn(&identity);
        let parsed = VoteTransaction::parse(&txn.serialize().unwrap()).unwrap();
        assert_eq!(parsed, txn);
        assert_eq!(parsed.message.vote.last_slot(), Some(Slot(12)));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(VoteTransaction::parse(b"not a vote").is_err());
    }

    #[test]
    fn test_resign_after_timestamp_patch() {
        let identity = Keypair::from_seed(&[3u8; 32]);
        let mut txn = vote_txn(&identity);
        txn.resign(|_, msg| identity.sign(msg)).unwrap();
        assert!(txn.verify());

        // Patching the timestamp invalidates the old signatures.
        txn.message.vote.timestamp = Some(12345678);
        assert!(!txn.verify());

        txn.resign(|_, msg| identity.sign(msg)).unwrap();
        assert!(txn.verify());
    }
}
