//! Fatal replay errors.

use forkline_choreo::GhostError;
use forkline_core::{BlockstoreError, ExecutorError, FragmentError, StoreError};
use forkline_execution::{ExecutionError, ForkError};
use forkline_types::{CodecError, Hash, Slot};

/// Conditions replay cannot continue from. The runner halts on every one.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    /// A fragment is outside its declared bounds.
    #[error("malformed input: {0}")]
    MalformedInput(#[from] FragmentError),

    /// The parent context could not be located or restored.
    #[error("missing ancestor {parent} of slot {slot}: {source}")]
    MissingAncestor {
        /// Slot being prepared.
        slot: Slot,
        /// Parent that could not be restored.
        parent: Slot,
        /// Cause.
        #[source]
        source: ExecutionError,
    },

    /// Execution layer failure (worker pool, store commit).
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// Fork table invariant violated or pool exhausted.
    #[error(transparent)]
    Fork(#[from] ForkError),

    /// Fork-choice tree error.
    #[error(transparent)]
    Ghost(#[from] GhostError),

    /// Account store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Blockstore failure.
    #[error(transparent)]
    Blockstore(#[from] BlockstoreError),

    /// Block-level executor step failed.
    #[error("executor {stage} failed at slot {slot}: {source}")]
    Executor {
        /// Step that failed.
        stage: &'static str,
        /// Slot.
        slot: Slot,
        /// Cause.
        #[source]
        source: ExecutorError,
    },

    /// Slot bank encoding failed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The local bank hash disagrees with the cluster.
    #[error("bank hash mismatch at slot {slot}: local {local}, cluster {corroborated}")]
    BankHashMismatch {
        /// Slot.
        slot: Slot,
        /// Locally computed hash.
        local: Hash,
        /// Hash backed by a supermajority.
        corroborated: Hash,
    },
}
