//! Domain-specific identifier types.

use crate::Hash;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Slot number: the position of a block in the ledger.
///
/// Slots are the primary key of everything in the replay pipeline (ghost
/// nodes, frontier forks, blockstore entries, bank hash entries).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Slot(pub u64);

impl Slot {
    /// The genesis slot.
    pub const GENESIS: Self = Slot(0);

    /// Get the next slot.
    pub fn next(self) -> Self {
        Slot(self.0 + 1)
    }

    /// Get the previous slot (returns None at genesis).
    pub fn prev(self) -> Option<Self> {
        self.0.checked_sub(1).map(Slot)
    }

    /// Number of slots between `self` and an earlier slot (zero if `earlier` is later).
    pub fn distance_from(self, earlier: Slot) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Slot {
    fn from(slot: u64) -> Self {
        Slot(slot)
    }
}

/// A 32-byte account address or validator identity.
#[derive(
    Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Pubkey(pub [u8; 32]);

impl Pubkey {
    /// Wrap raw key bytes.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert key to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "Pubkey({}..)", &hex[..8])
    }
}

impl fmt::Display for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Identifier of a branch in the versioned account store.
///
/// Every executed block gets its own branch keyed by `(blockhash, slot)`,
/// layered on top of its parent's branch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct BranchId {
    /// Slot the branch belongs to.
    pub slot: Slot,
    /// Blockhash of the block executed in the branch.
    pub blockhash: Hash,
}

impl BranchId {
    /// Create a branch identifier.
    pub fn new(blockhash: Hash, slot: Slot) -> Self {
        Self { slot, blockhash }
    }

    /// Branch used for a speculatively packed block whose blockhash is not yet known.
    pub fn speculative(slot: Slot) -> Self {
        Self {
            slot,
            blockhash: Hash::ZERO,
        }
    }

    /// Whether this branch was created for a speculatively packed block.
    pub fn is_speculative(&self) -> bool {
        self.blockhash.is_zero()
    }
}

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Branch({}, {:?})", self.slot, self.blockhash)
    }
}
