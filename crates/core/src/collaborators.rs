//! External collaborators of the replay pipeline.
//!
//! Replay drives these through trait objects. All of them are shared
//! across the orchestrator and the execution worker pool, so they take
//! `&self` and synchronise internally.

use crate::{BlockstoreError, ExecutorError, StoreError};
use forkline_types::{
    BranchId, EpochContext, Hash, Pubkey, Signature, Slot, SlotExecutionContext, Transaction,
};
use std::path::Path;

// ═══════════════════════════════════════════════════════════════════════════
// Versioned account store
// ═══════════════════════════════════════════════════════════════════════════

/// Key of a record in the versioned store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKey {
    /// An account.
    Account(Pubkey),
    /// The slot bank of the branch's block.
    SlotBank,
}

/// Branching key-value store of account state.
///
/// Every block executes in its own branch layered on its parent's. Reads
/// fall through to ancestors; writes stay branch-local until published.
pub trait VersionedStore: Send + Sync {
    /// Create `branch` as a child of `parent`.
    fn prepare(&self, parent: &BranchId, branch: BranchId) -> Result<(), StoreError>;

    /// Whether `branch` exists.
    fn exists(&self, branch: &BranchId) -> bool;

    /// Read a record as seen from `branch`, walking ancestors.
    fn get(&self, branch: &BranchId, key: &RecordKey) -> Result<Option<Vec<u8>>, StoreError>;

    /// Write a record into `branch`.
    fn put(&self, branch: &BranchId, key: RecordKey, value: Vec<u8>) -> Result<(), StoreError>;

    /// Keys written directly in `branch`, in key order.
    fn branch_records(&self, branch: &BranchId) -> Result<Vec<RecordKey>, StoreError>;

    /// Discard `branch` and all of its descendants.
    fn cancel(&self, branch: &BranchId) -> Result<(), StoreError>;

    /// Make `branch` the new root: fold its ancestors into it and discard
    /// every branch that does not descend from it. Returns how many
    /// branches were removed.
    fn publish(&self, branch: &BranchId) -> Result<usize, StoreError>;
}

// ═══════════════════════════════════════════════════════════════════════════
// Executor
// ═══════════════════════════════════════════════════════════════════════════

/// A vote that landed in a replayed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LandedVote {
    /// Vote account of the voter.
    pub vote_account: Pubkey,
    /// Last voted slot.
    pub slot: Slot,
    /// Bank hash the voter computed for `slot`.
    pub hash: Hash,
    /// Voter's tower root.
    pub root: Option<Slot>,
}

/// Effects of one successfully executed transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxnOutcome {
    /// Fee charged.
    pub fee: u64,
    /// Signatures verified.
    pub signatures: u64,
    /// Account writes, committed after the wave.
    pub writes: Vec<(Pubkey, Vec<u8>)>,
    /// Vote carried by the transaction, if it is a vote.
    pub vote: Option<LandedVote>,
}

/// Result of finalizing a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSummary {
    /// Bank hash of the block.
    pub bank_hash: Hash,
}

/// Transaction execution engine.
pub trait Executor: Send + Sync {
    /// Partition a microblock into waves of non-conflicting transactions.
    ///
    /// Each wave holds indices into `txns`. Waves run in order; the
    /// transactions of one wave run in parallel. The default assigns each
    /// transaction to the first wave after the last wave it conflicts with.
    fn partition_waves(&self, txns: &[Transaction]) -> Vec<Vec<usize>> {
        let mut waves: Vec<Vec<usize>> = Vec::new();
        for (idx, txn) in txns.iter().enumerate() {
            let after = waves
                .iter()
                .rposition(|wave| wave.iter().any(|&j| txns[j].conflicts_with(txn)))
                .map(|w| w + 1)
                .unwrap_or(0);
            match waves.get_mut(after) {
                Some(wave) => wave.push(idx),
                None => waves.push(vec![idx]),
            }
        }
        waves
    }

    /// Block-level setup before the first transaction of a block.
    fn prepare_block(
        &self,
        ctx: &SlotExecutionContext,
        store: &dyn VersionedStore,
    ) -> Result<(), ExecutorError>;

    /// Commit executor-side state of branches that fell behind the
    /// execution window. Called once per prepared block.
    fn publish_old_branches(
        &self,
        _ctx: &SlotExecutionContext,
        _store: &dyn VersionedStore,
    ) -> Result<(), ExecutorError> {
        Ok(())
    }

    /// Execute one transaction against `ctx`'s branch.
    ///
    /// Must not write to the store: writes are returned and committed by
    /// the caller once the whole wave succeeded.
    fn execute(
        &self,
        ctx: &SlotExecutionContext,
        txn: &Transaction,
        store: &dyn VersionedStore,
    ) -> Result<TxnOutcome, ExecutorError>;

    /// Compute the bank hash of a finished block.
    fn finalize_block(
        &self,
        ctx: &SlotExecutionContext,
        store: &dyn VersionedStore,
    ) -> Result<BlockSummary, ExecutorError>;

    /// Epoch context after crossing into `new_epoch`.
    fn epoch_rollover(&self, epoch: &EpochContext, new_epoch: u64) -> EpochContext {
        epoch.rolled_over(new_epoch)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Blockstore
// ═══════════════════════════════════════════════════════════════════════════

/// Durable store of received blocks.
pub trait Blockstore: Send + Sync {
    /// Whether `slot` was already replayed.
    fn is_processed(&self, slot: Slot) -> bool;

    /// Blockhash of `slot`, if known.
    fn block_hash(&self, slot: Slot) -> Option<Hash>;

    /// Bank hash of `slot`, if processed.
    fn bank_hash(&self, slot: Slot) -> Option<Hash>;

    /// Mark `slot` processed with its computed bank hash.
    fn mark_processed(
        &self,
        slot: Slot,
        parent: Slot,
        blockhash: Hash,
        bank_hash: Hash,
    ) -> Result<(), BlockstoreError>;

    /// Current root (the highest slot known to be rooted).
    fn root(&self) -> Slot;

    /// Advance the root to `root` and prune everything not descending
    /// from it. Returns the number of pruned slots.
    fn publish(&self, root: Slot) -> Result<usize, BlockstoreError>;

    /// Best-effort dump of the store's state to `path`.
    fn checkpoint(&self, path: &Path) -> Result<(), BlockstoreError>;
}

// ═══════════════════════════════════════════════════════════════════════════
// Signing and capture
// ═══════════════════════════════════════════════════════════════════════════

/// Signs vote transactions on behalf of the local validator.
pub trait VoteSigner: Send + Sync {
    /// Validator identity (also used as the vote authority).
    fn identity(&self) -> Pubkey;

    /// The local vote account.
    fn vote_account(&self) -> Pubkey;

    /// Sign a message with the identity key.
    fn sign(&self, message: &[u8]) -> Signature;
}

/// Optional debug capture invoked at block boundaries.
pub trait ReplayCollector: Send {
    /// A new block was prepared on top of `parent`.
    fn on_block_prepare(&mut self, slot: Slot, parent: Slot);

    /// A block was finalized.
    fn on_block_finalize(&mut self, slot: Slot, bank_hash: Hash);

    /// Flush captured data.
    fn flush(&mut self) -> std::io::Result<()>;
}
