//! Outbound message types for downstream pipeline stages.

use crate::ReplayFlags;
use forkline_types::{BranchId, Hash, Pubkey, Slot, StakeWeight, Transaction};

/// Messages for the block-production (PoH) stage.
#[derive(Debug, Clone, PartialEq)]
pub enum PohMessage {
    /// A replayed microblock forwarded for continued block production.
    Microblock {
        /// Slot of the microblock.
        slot: Slot,
        /// Replay flags of the microblock.
        flags: ReplayFlags,
        /// Transactions.
        txns: Vec<Transaction>,
        /// Blockhash of the canonical fork to build on.
        trailer_hash: Hash,
    },

    /// One-time init message sent before the first forwarded microblock.
    Init {
        /// PoH hashes per tick.
        hashcnt_per_tick: u64,
        /// Ticks per slot.
        ticks_per_slot: u64,
        /// Duration of one hash in nanoseconds.
        hashcnt_duration_ns: f64,
        /// Hash of the last PoH entry.
        last_entry_hash: Hash,
        /// Tick height at the start of the current slot.
        tick_height: u64,
    },
}

/// Notifications about replayed state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayNotification {
    /// Accounts written by a finalized block (bounded batch).
    AccountsSaved {
        /// Branch the accounts were saved in.
        branch: BranchId,
        /// Account ids.
        accounts: Vec<Pubkey>,
    },

    /// A block finished executing.
    SlotExecuted {
        /// Executed slot.
        slot: Slot,
        /// Parent slot.
        parent: Slot,
        /// Current root of the blockstore.
        root: Slot,
        /// Computed bank hash.
        bank_hash: Hash,
    },
}

/// Stake-weight snapshot of one epoch, sent at epoch boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakeWeightsMessage {
    /// Epoch the weights apply to.
    pub epoch: u64,
    /// Number of staked identities.
    pub staked_count: usize,
    /// First slot of the epoch.
    pub start_slot: Slot,
    /// Number of slots in the epoch.
    pub slot_count: u64,
    /// Weights, heaviest first.
    pub weights: Vec<StakeWeight>,
}

/// Outbound messages, tagged by destination.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    // ═══════════════════════════════════════════════════════════════════════
    // Block production
    // ═══════════════════════════════════════════════════════════════════════
    /// Message for the PoH stage.
    Poh(PohMessage),

    // ═══════════════════════════════════════════════════════════════════════
    // Subscribers
    // ═══════════════════════════════════════════════════════════════════════
    /// Replay notification.
    Notify(ReplayNotification),

    /// Epoch stake weights for the leader schedule.
    StakeWeights(StakeWeightsMessage),

    // ═══════════════════════════════════════════════════════════════════════
    // Gossip
    // ═══════════════════════════════════════════════════════════════════════
    /// Re-signed vote transaction bytes.
    GossipVote(Vec<u8>),
}

impl OutboundMessage {
    /// Get a human-readable name for this message type.
    pub fn type_name(&self) -> &'static str {
        match self {
            OutboundMessage::Poh(PohMessage::Microblock { .. }) => "PohMicroblock",
            OutboundMessage::Poh(PohMessage::Init { .. }) => "PohInit",
            OutboundMessage::Notify(ReplayNotification::AccountsSaved { .. }) => "AccountsSaved",
            OutboundMessage::Notify(ReplayNotification::SlotExecuted { .. }) => "SlotExecuted",
            OutboundMessage::StakeWeights(_) => "StakeWeights",
            OutboundMessage::GossipVote(_) => "GossipVote",
        }
    }
}
