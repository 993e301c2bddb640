//! Replayable transactions.
//!
//! Replay never interprets transaction payloads itself: the executor does.
//! What replay needs is the account lock set, used to partition a
//! microblock into non-conflicting waves.

use crate::{Hash, Pubkey};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A transaction as carried in a microblock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Number of signatures attached to the transaction (fee basis).
    pub signature_count: u8,
    /// Accounts the transaction writes.
    pub writable: Vec<Pubkey>,
    /// Accounts the transaction only reads.
    pub readonly: Vec<Pubkey>,
    /// Opaque instruction payload, interpreted by the executor.
    pub payload: Vec<u8>,
}

impl Transaction {
    /// Create a transaction.
    pub fn new(
        signature_count: u8,
        writable: Vec<Pubkey>,
        readonly: Vec<Pubkey>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            signature_count,
            writable,
            readonly,
            payload,
        }
    }

    /// Content hash of the transaction.
    pub fn hash(&self) -> Hash {
        let mut parts: Vec<&[u8]> = Vec::with_capacity(self.writable.len() + self.readonly.len() + 2);
        let count = [self.signature_count];
        parts.push(&count);
        parts.extend(self.writable.iter().map(|k| k.as_bytes().as_slice()));
        parts.extend(self.readonly.iter().map(|k| k.as_bytes().as_slice()));
        parts.push(&self.payload);
        Hash::from_parts(&parts)
    }

    /// All accounts referenced by the transaction.
    pub fn account_keys(&self) -> impl Iterator<Item = &Pubkey> {
        self.writable.iter().chain(self.readonly.iter())
    }

    /// Whether the two transactions hold conflicting account locks.
    ///
    /// Two transactions conflict when either writes an account the other
    /// references at all.
    pub fn conflicts_with(&self, other: &Transaction) -> bool {
        let mine: HashSet<&Pubkey> = self.writable.iter().collect();
        let theirs: HashSet<&Pubkey> = other.writable.iter().collect();
        other.account_keys().any(|k| mine.contains(k))
            || self.account_keys().any(|k| theirs.contains(k))
    }

    /// Serialized size in bytes.
    pub fn size(&self) -> usize {
        // 1 (sig count) + 2x u64 length prefixes + keys + u64 prefix + payload
        1 + 8 + 32 * self.writable.len() + 8 + 32 * self.readonly.len() + 8 + self.payload.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: u8) -> Pubkey {
        Pubkey([n; 32])
    }

    #[test]
    fn test_conflicts() {
        let a = Transaction::new(1, vec![key(1)], vec![key(2)], vec![]);
        let b = Transaction::new(1, vec![key(3)], vec![key(2)], vec![]);
        let c = Transaction::new(1, vec![key(2)], vec![], vec![]);

        // Shared read-only accounts do not conflict.
        assert!(!a.conflicts_with(&b));
        // Writing an account another transaction reads does.
        assert!(a.conflicts_with(&c));
        assert!(c.conflicts_with(&b));
    }

    #[test]
    fn test_hash_depends_on_payload() {
        let a = Transaction::new(1, vec![key(1)], vec![], b"one".to_vec());
        let b = Transaction::new(1, vec![key(1)], vec![], b"two".to_vec());
        assert_ne!(a.hash(), b.hash());
        assert_eq!(a.hash(), a.clone().hash());
    }

    #[test]
    fn test_size_matches_bincode() {
        let txn = Transaction::new(2, vec![key(1), key(2)], vec![key(3)], b"payload".to_vec());
        assert_eq!(txn.size(), bincode::serialize(&txn).unwrap().len());
    }
}
