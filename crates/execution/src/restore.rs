//! Restoring a fork's execution context from the account store.

use crate::ExecutionError;
use forkline_core::{Blockstore, RecordKey, VersionedStore};
use forkline_types::{BranchId, EpochContext, Slot, SlotBank, SlotExecutionContext};
use std::sync::Arc;
use tracing::info;

/// Rebuild the execution context of `slot` from its persisted slot bank.
///
/// The branch is located by `(blockhash(slot), slot)`. The restored bank is
/// ready to be the parent of a new block: its per-slot accumulators are
/// cleared.
pub fn restore_slot_ctx(
    blockstore: &dyn Blockstore,
    store: &dyn VersionedStore,
    slot: Slot,
    epoch: Arc<EpochContext>,
) -> Result<SlotExecutionContext, ExecutionError> {
    let blockhash = blockstore
        .block_hash(slot)
        .ok_or(ExecutionError::MissingBlockHash(slot))?;
    let branch = BranchId::new(blockhash, slot);
    if !store.exists(&branch) {
        return Err(ExecutionError::MissingBranch(branch));
    }
    let bytes = store
        .get(&branch, &RecordKey::SlotBank)?
        .ok_or(ExecutionError::MissingSlotBank(branch))?;
    let mut bank = SlotBank::decode(&bytes)?;

    info!(
        slot = bank.slot.0,
        bank_hash = %bank.bank_hash,
        poh = %bank.poh,
        "Recovered slot bank"
    );

    bank.slot = slot;
    bank.reset_for_child();
    Ok(SlotExecutionContext::new(bank, branch, epoch))
}
