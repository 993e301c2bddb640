//! Errors reported by replay collaborators.

use forkline_types::{BranchId, Slot};

/// Errors from the versioned account store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Branch does not exist.
    #[error("unknown branch {0}")]
    UnknownBranch(BranchId),

    /// Branch already exists.
    #[error("branch {0} already exists")]
    DuplicateBranch(BranchId),

    /// Too many live branches.
    #[error("branch pool exhausted ({max} live branches)")]
    BranchPoolExhausted {
        /// Pool size.
        max: usize,
    },
}

/// Errors from the blockstore.
#[derive(Debug, thiserror::Error)]
pub enum BlockstoreError {
    /// Slot is not stored.
    #[error("slot {0} not in blockstore")]
    UnknownSlot(Slot),

    /// Checkpoint I/O failed.
    #[error("checkpoint failed: {0}")]
    Checkpoint(#[from] std::io::Error),
}

/// Errors from the transaction executor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutorError {
    /// A transaction failed.
    #[error("transaction failed: {0}")]
    TransactionFailed(String),

    /// Block-level preparation or finalization failed.
    #[error("block {stage} failed for slot {slot}: {reason}")]
    Block {
        /// Stage ("prepare" or "finalize").
        stage: &'static str,
        /// Slot of the block.
        slot: Slot,
        /// Failure reason.
        reason: String,
    },

    /// Account store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
