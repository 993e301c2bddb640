//! Deterministic executor.
//!
//! Every transaction overwrites its writable accounts with a hash chained
//! from the account's previous value. Vote transactions (payloads that
//! parse as a [`VoteTransaction`]) additionally report a landed vote. The
//! bank hash chains the parent bank hash with the block's writes, so two
//! replicas replaying the same blocks agree.

use forkline_core::{
    BlockSummary, Executor, ExecutorError, LandedVote, RecordKey, TxnOutcome, VersionedStore,
};
use forkline_types::{Hash, SlotExecutionContext, Transaction, VoteTransaction};
use std::collections::HashSet;
use tracing::trace;

/// Executor for simulation and tests.
#[derive(Debug, Clone, Default)]
pub struct SimExecutor {
    failing: HashSet<Hash>,
}

impl SimExecutor {
    /// Fee charged per signature.
    pub const FEE_PER_SIGNATURE: u64 = 5000;

    /// Create an executor where every transaction succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the transaction with hash `txn` fail.
    pub fn with_failing(mut self, txn: Hash) -> Self {
        self.failing.insert(txn);
        self
    }

    fn landed_vote(txn: &Transaction) -> Option<LandedVote> {
        let vote = VoteTransaction::parse(&txn.payload).ok()?;
        let update = &vote.message.vote;
        Some(LandedVote {
            vote_account: vote.message.vote_account,
            slot: update.last_slot()?,
            hash: update.hash,
            root: update.root,
        })
    }
}

impl Executor for SimExecutor {
    fn prepare_block(
        &self,
        ctx: &SlotExecutionContext,
        _store: &dyn VersionedStore,
    ) -> Result<(), ExecutorError> {
        trace!(slot = ctx.bank.slot.0, "Block prepared");
        Ok(())
    }

    fn execute(
        &self,
        ctx: &SlotExecutionContext,
        txn: &Transaction,
        store: &dyn VersionedStore,
    ) -> Result<TxnOutcome, ExecutorError> {
        let txn_hash = txn.hash();
        if self.failing.contains(&txn_hash) {
            return Err(ExecutorError::TransactionFailed(format!(
                "txn {txn_hash:?} rejected"
            )));
        }

        let mut writes = Vec::with_capacity(txn.writable.len());
        for account in &txn.writable {
            let prev = store
                .get(&ctx.branch, &RecordKey::Account(*account))?
                .unwrap_or_default();
            let next = Hash::from_parts(&[&prev, txn_hash.as_bytes()]);
            writes.push((*account, next.to_bytes().to_vec()));
        }

        Ok(TxnOutcome {
            fee: txn.signature_count as u64 * Self::FEE_PER_SIGNATURE,
            signatures: txn.signature_count as u64,
            writes,
            vote: Self::landed_vote(txn),
        })
    }

    fn finalize_block(
        &self,
        ctx: &SlotExecutionContext,
        store: &dyn VersionedStore,
    ) -> Result<BlockSummary, ExecutorError> {
        let bank = &ctx.bank;
        let mut hasher_input: Vec<Vec<u8>> = vec![
            bank.bank_hash.to_bytes().to_vec(),
            bank.last_blockhash.to_bytes().to_vec(),
            bank.slot.0.to_le_bytes().to_vec(),
            bank.signature_count.to_le_bytes().to_vec(),
        ];
        for key in store.branch_records(&ctx.branch)? {
            if let RecordKey::Account(account) = key {
                let value = store.get(&ctx.branch, &key)?.unwrap_or_default();
                hasher_input.push(account.as_bytes().to_vec());
                hasher_input.push(value);
            }
        }
        let parts: Vec<&[u8]> = hasher_input.iter().map(Vec::as_slice).collect();
        Ok(BlockSummary {
            bank_hash: Hash::from_parts(&parts),
        })
    }
}
