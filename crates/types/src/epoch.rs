//! Epochs and their stake distribution.

use crate::{Hash, Pubkey, Slot};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Check if `voted` stake is a supermajority (> 2/3) of `total`.
pub fn has_supermajority(voted: u64, total: u64) -> bool {
    (voted as u128) * 3 > (total as u128) * 2
}

/// Fixed-length epoch schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawEpochSchedule", into = "RawEpochSchedule")]
pub struct EpochSchedule {
    slots_per_epoch: u64,
}

#[derive(Serialize, Deserialize)]
struct RawEpochSchedule {
    slots_per_epoch: u64,
}

/// A schedule with zero slots per epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("slots_per_epoch must be at least 1")]
pub struct EmptyEpochError;

impl TryFrom<RawEpochSchedule> for EpochSchedule {
    type Error = EmptyEpochError;

    fn try_from(raw: RawEpochSchedule) -> Result<Self, Self::Error> {
        if raw.slots_per_epoch == 0 {
            return Err(EmptyEpochError);
        }
        Ok(Self {
            slots_per_epoch: raw.slots_per_epoch,
        })
    }
}

impl From<EpochSchedule> for RawEpochSchedule {
    fn from(schedule: EpochSchedule) -> Self {
        Self {
            slots_per_epoch: schedule.slots_per_epoch,
        }
    }
}

impl EpochSchedule {
    /// Create a schedule. `slots_per_epoch` of zero is clamped to one.
    pub fn new(slots_per_epoch: u64) -> Self {
        Self {
            slots_per_epoch: slots_per_epoch.max(1),
        }
    }

    /// Number of slots in every epoch. Never zero.
    pub fn slots_per_epoch(&self) -> u64 {
        self.slots_per_epoch
    }

    /// Epoch containing `slot`, and the slot's index within it.
    pub fn slot_to_epoch(&self, slot: Slot) -> (u64, u64) {
        (slot.0 / self.slots_per_epoch, slot.0 % self.slots_per_epoch)
    }

    /// Epoch containing `slot`.
    pub fn epoch_of(&self, slot: Slot) -> u64 {
        self.slot_to_epoch(slot).0
    }

    /// First slot of `epoch`.
    pub fn epoch_first_slot(&self, epoch: u64) -> Slot {
        Slot(epoch * self.slots_per_epoch)
    }

    /// Whether moving from `parent` to `slot` crosses into a new epoch.
    ///
    /// Also true when `slot` is the first slot of its epoch, so a block
    /// replayed directly at an epoch start still triggers the rollover.
    pub fn is_boundary(&self, parent: Slot, slot: Slot) -> bool {
        let (prev_epoch, _) = self.slot_to_epoch(parent);
        let (new_epoch, idx) = self.slot_to_epoch(slot);
        prev_epoch < new_epoch || idx == 0
    }
}

impl Default for EpochSchedule {
    fn default() -> Self {
        Self::new(432_000)
    }
}

/// Stake delegated to one vote account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteAccountStake {
    /// The vote account.
    pub vote_account: Pubkey,
    /// Identity of the validator operating the vote account.
    pub node_identity: Pubkey,
    /// Activated stake.
    pub stake: u64,
}

/// A single entry of a stake-weight snapshot: one validator identity and
/// the total stake of every vote account it operates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeWeight {
    /// Validator identity.
    pub key: Pubkey,
    /// Aggregate stake.
    pub stake: u64,
}

/// Vote-account stake distribution of one epoch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochStakes {
    accounts: Vec<VoteAccountStake>,
}

impl EpochStakes {
    /// Create from a list of vote accounts.
    pub fn new(accounts: Vec<VoteAccountStake>) -> Self {
        Self { accounts }
    }

    /// Vote accounts in this distribution.
    pub fn accounts(&self) -> &[VoteAccountStake] {
        &self.accounts
    }

    /// Whether there are no vote accounts.
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Stake of a vote account (zero if unknown).
    pub fn stake_of(&self, vote_account: &Pubkey) -> u64 {
        self.accounts
            .iter()
            .find(|a| &a.vote_account == vote_account)
            .map(|a| a.stake)
            .unwrap_or(0)
    }

    /// Total activated stake.
    pub fn total_stake(&self) -> u64 {
        self.accounts.iter().map(|a| a.stake).sum()
    }

    /// Stake aggregated per node identity, zero-stake entries dropped,
    /// ordered by stake descending then identity ascending.
    pub fn weights_by_node(&self) -> Vec<StakeWeight> {
        let mut by_node: HashMap<Pubkey, u64> = HashMap::new();
        for account in &self.accounts {
            *by_node.entry(account.node_identity).or_insert(0) += account.stake;
        }
        let mut weights: Vec<StakeWeight> = by_node
            .into_iter()
            .filter(|(_, stake)| *stake > 0)
            .map(|(key, stake)| StakeWeight { key, stake })
            .collect();
        weights.sort_by(|a, b| b.stake.cmp(&a.stake).then(a.key.cmp(&b.key)));
        weights
    }
}

/// Epoch-wide parameters shared by every slot of an epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochContext {
    /// Epoch schedule.
    pub schedule: EpochSchedule,
    /// Active epoch.
    pub epoch: u64,
    /// Stake distribution of the active epoch.
    pub stakes: EpochStakes,
    /// Stake distribution of the next epoch, once known.
    pub next_stakes: Option<EpochStakes>,
    /// PoH hashes per tick.
    pub hashes_per_tick: u64,
    /// Ticks per slot.
    pub ticks_per_slot: u64,
    /// Target slot duration in nanoseconds.
    pub ns_per_slot: u64,
    /// Hash of the last PoH entry of the bootstrap slot.
    pub genesis_hash: Hash,
}

impl EpochContext {
    /// Total stake of the active epoch.
    pub fn total_stake(&self) -> u64 {
        self.stakes.total_stake()
    }

    /// Duration of a single PoH hash in nanoseconds.
    pub fn hashcnt_duration_ns(&self) -> f64 {
        let hashes_per_slot = self.hashes_per_tick.saturating_mul(self.ticks_per_slot);
        if hashes_per_slot == 0 {
            return 0.0;
        }
        self.ns_per_slot as f64 / hashes_per_slot as f64
    }

    /// Context of the epoch following a rollover to `new_epoch`.
    ///
    /// The pending next-epoch stakes become active. With no pending stakes
    /// the current distribution carries over.
    pub fn rolled_over(&self, new_epoch: u64) -> Self {
        let stakes = self
            .next_stakes
            .clone()
            .unwrap_or_else(|| self.stakes.clone());
        Self {
            epoch: new_epoch,
            stakes: stakes.clone(),
            next_stakes: Some(stakes),
            ..self.clone()
        }
    }
}
