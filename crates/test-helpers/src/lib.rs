//! Shared fixtures for forkline tests.

use forkline_types::{
    BranchId, EpochContext, EpochSchedule, EpochStakes, Hash, Keypair, Pubkey, Slot, SlotBank,
    SlotExecutionContext, Transaction, VoteAccountStake,
};
use std::sync::Arc;

/// Slots per epoch used by [`test_epoch_ctx`].
pub const TEST_SLOTS_PER_EPOCH: u64 = 32;

/// Deterministic pubkey `[n; 32]`.
pub fn test_pubkey(n: u8) -> Pubkey {
    Pubkey([n; 32])
}

/// Deterministic keypair derived from `n`.
pub fn test_keypair(n: u8) -> Keypair {
    Keypair::from_seed(&[n; 32])
}

/// Deterministic blockhash of `slot`.
pub fn test_blockhash(slot: u64) -> Hash {
    Hash::from_parts(&[b"blockhash", &slot.to_le_bytes()])
}

/// Single-signature transaction writing and reading the given test keys.
pub fn test_txn(writable: &[u8], readonly: &[u8]) -> Transaction {
    Transaction::new(
        1,
        writable.iter().map(|&n| test_pubkey(n)).collect(),
        readonly.iter().map(|&n| test_pubkey(n)).collect(),
        Vec::new(),
    )
}

/// Vote accounts `vote_account = [100 + i; 32]`, `node = [i; 32]` with the given stakes.
pub fn test_stakes(stakes: &[u64]) -> EpochStakes {
    EpochStakes::new(
        stakes
            .iter()
            .enumerate()
            .map(|(i, &stake)| VoteAccountStake {
                vote_account: test_vote_account(i as u8),
                node_identity: test_pubkey(i as u8),
                stake,
            })
            .collect(),
    )
}

/// Vote account of test validator `i`.
pub fn test_vote_account(i: u8) -> Pubkey {
    test_pubkey(100 + i)
}

/// Epoch context with three validators staking 10, 10 and 10.
pub fn test_epoch_ctx() -> Arc<EpochContext> {
    Arc::new(test_epoch_ctx_with(&[10, 10, 10]))
}

/// Epoch context with the given validator stakes.
pub fn test_epoch_ctx_with(stakes: &[u64]) -> EpochContext {
    let stakes = test_stakes(stakes);
    EpochContext {
        schedule: EpochSchedule::new(TEST_SLOTS_PER_EPOCH),
        epoch: 0,
        stakes: stakes.clone(),
        next_stakes: Some(stakes),
        hashes_per_tick: 10,
        ticks_per_slot: 8,
        ns_per_slot: 400_000_000,
        genesis_hash: test_blockhash(0),
    }
}

/// Bank of `slot` whose parent is `slot - 1`.
pub fn test_bank(slot: u64) -> SlotBank {
    SlotBank {
        slot: Slot(slot),
        prev_slot: Slot(slot.saturating_sub(1)),
        poh: test_blockhash(slot),
        last_blockhash: test_blockhash(slot),
        ..Default::default()
    }
}

/// Execution context of `slot` on its own branch.
pub fn test_slot_ctx(slot: u64) -> SlotExecutionContext {
    SlotExecutionContext::new(
        test_bank(slot),
        BranchId::new(test_blockhash(slot), Slot(slot)),
        test_epoch_ctx(),
    )
}
