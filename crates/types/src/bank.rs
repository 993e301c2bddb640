//! Per-slot bank state.

use crate::{BranchId, EpochContext, Hash, Slot};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Errors encoding or decoding persisted replay state.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization failed.
    #[error("encode failed: {0}")]
    Encode(String),

    /// Deserialization failed.
    #[error("decode failed: {0}")]
    Decode(String),
}

/// State of a bank that is persisted at the end of every slot.
///
/// Replay restores a fork that is not resident in memory by decoding the
/// parent's `SlotBank` from the account store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotBank {
    /// Slot of this bank.
    pub slot: Slot,
    /// Slot of the parent bank.
    pub prev_slot: Slot,
    /// Fees collected while executing the slot.
    pub collected_fees: u64,
    /// Rent collected while executing the slot.
    pub collected_rent: u64,
    /// PoH hash at the end of the slot.
    pub poh: Hash,
    /// Last blockhash of the slot.
    pub last_blockhash: Hash,
    /// Bank hash once the slot is finalized.
    pub bank_hash: Hash,
    /// Signatures processed in the slot.
    pub signature_count: u64,
}

impl SlotBank {
    /// Bank of the bootstrap (snapshot or genesis) slot.
    pub fn bootstrap(slot: Slot, last_blockhash: Hash, bank_hash: Hash) -> Self {
        Self {
            slot,
            prev_slot: slot,
            poh: last_blockhash,
            last_blockhash,
            bank_hash,
            ..Default::default()
        }
    }

    /// Encode for persistence.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        bincode::serialize(self).map_err(|e| CodecError::Encode(e.to_string()))
    }

    /// Decode persisted bank state.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        bincode::deserialize(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }

    /// Turn a parent bank into the starting state of its child slot.
    ///
    /// Per-slot accumulators are reset. `slot` keeps pointing at the parent
    /// until the child's fork is prepared.
    pub fn reset_for_child(&mut self) {
        self.prev_slot = self.slot;
        self.collected_fees = 0;
        self.collected_rent = 0;
        self.signature_count = 0;
    }
}

/// Execution context of one fork: its bank plus references to the epoch
/// context and the account-store branch it executes against.
#[derive(Debug, Clone)]
pub struct SlotExecutionContext {
    /// Bank state.
    pub bank: SlotBank,
    /// Account-store branch.
    pub branch: BranchId,
    /// Epoch context shared by every fork of the epoch.
    pub epoch: Arc<EpochContext>,
}

impl SlotExecutionContext {
    /// Create a context.
    pub fn new(bank: SlotBank, branch: BranchId, epoch: Arc<EpochContext>) -> Self {
        Self {
            bank,
            branch,
            epoch,
        }
    }

    /// Current slot.
    pub fn slot(&self) -> Slot {
        self.bank.slot
    }

    /// Parent slot.
    pub fn parent_slot(&self) -> Slot {
        self.bank.prev_slot
    }
}
