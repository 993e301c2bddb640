//! Fork lifecycle and parallel execution.
//!
//! This crate owns the execution side of replay:
//!
//! - [`ForkTable`]: pool of per-fork execution contexts and the frontier
//!   index of active chain tips
//! - [`WavePool`]: worker pool executing a microblock wave by wave
//! - [`restore_slot_ctx`]: rebuilding a parent context from the account store

mod fork;
mod restore;
mod wave;

pub use fork::{Fork, ForkCheckpoint, ForkError, ForkId, ForkTable};
pub use restore::restore_slot_ctx;
pub use wave::{BatchOutcome, TxnFailure, WavePool};

use forkline_core::StoreError;
use forkline_types::{BranchId, CodecError, Slot};

/// Errors from the execution layer.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// The blockstore has no blockhash for the slot.
    #[error("missing block hash of slot {0}")]
    MissingBlockHash(Slot),

    /// The account store has no branch for the slot.
    #[error("missing branch {0}")]
    MissingBranch(BranchId),

    /// The branch has no slot bank record.
    #[error("missing slot bank in {0}")]
    MissingSlotBank(BranchId),

    /// The slot bank record is corrupt.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Account store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The worker pool could not be built.
    #[error("worker pool: {0}")]
    WorkerPool(String),
}
