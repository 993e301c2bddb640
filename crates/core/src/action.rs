//! Actions and outcomes returned by the replay state machine.

use crate::{OutboundMessage, PohMessage, ReplayNotification, StakeWeightsMessage};
use forkline_types::{Hash, Slot};

/// Side effects the runner performs on behalf of the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Publish a message downstream.
    Publish(OutboundMessage),

    /// Every transaction of the fragment with this sequence number has
    /// been retired. Upstream may reuse the buffers.
    BatchRetired {
        /// Sequence number of the retired fragment.
        seq: u64,
    },
}

impl Action {
    /// Publish a PoH message.
    pub fn poh(msg: PohMessage) -> Self {
        Action::Publish(OutboundMessage::Poh(msg))
    }

    /// Publish a notification.
    pub fn notify(msg: ReplayNotification) -> Self {
        Action::Publish(OutboundMessage::Notify(msg))
    }

    /// Publish a stake-weight snapshot.
    pub fn stake_weights(msg: StakeWeightsMessage) -> Self {
        Action::Publish(OutboundMessage::StakeWeights(msg))
    }

    /// Get a human-readable name for this action.
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::Publish(msg) => msg.type_name(),
            Action::BatchRetired { .. } => "BatchRetired",
        }
    }
}

/// Why a fragment was dropped without executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterReason {
    /// The slot is already marked processed in the blockstore.
    AlreadyProcessed,
    /// The packer sent a packet type replay does not handle.
    UnsupportedPacket,
}

/// Non-fatal result of handling one fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    /// Dropped without executing.
    Filtered {
        /// Target slot.
        slot: Slot,
        /// Reason.
        reason: FilterReason,
    },

    /// The parent fork is still executing. Redelivery will retry.
    Deferred {
        /// Target slot.
        slot: Slot,
        /// Busy parent slot.
        parent_slot: Slot,
    },

    /// The transaction batch failed to execute.
    ExecutionFailed {
        /// Target slot.
        slot: Slot,
        /// Whether the block was self-packed.
        speculative: bool,
    },

    /// The microblock executed; the block is not finished yet.
    Executed {
        /// Target slot.
        slot: Slot,
    },

    /// The final microblock executed and the block was finalized.
    Finalized {
        /// Finalized slot.
        slot: Slot,
        /// Computed bank hash.
        bank_hash: Hash,
    },

    /// A gossip vote was re-signed and re-published.
    VoteRelayed {
        /// Last slot of the vote.
        slot: Slot,
    },

    /// A gossip vote was dropped (voting disabled or unparseable).
    VoteDropped,
}

impl HandleOutcome {
    /// Whether the fragment's transactions still need redelivery.
    pub fn is_deferred(&self) -> bool {
        matches!(self, HandleOutcome::Deferred { .. })
    }
}

/// Result of one `StateMachine::handle` call.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Actions for the runner, in order.
    pub actions: Vec<Action>,
    /// What happened to the fragment.
    pub outcome: HandleOutcome,
}

impl Transition {
    /// Create a transition.
    pub fn new(actions: Vec<Action>, outcome: HandleOutcome) -> Self {
        Self { actions, outcome }
    }

    /// Outbound messages among the actions.
    pub fn messages(&self) -> impl Iterator<Item = &OutboundMessage> {
        self.actions.iter().filter_map(|a| match a {
            Action::Publish(msg) => Some(msg),
            Action::BatchRetired { .. } => None,
        })
    }

    /// Sequence number retired by this transition, if any.
    pub fn retired(&self) -> Option<u64> {
        self.actions.iter().find_map(|a| match a {
            Action::BatchRetired { seq } => Some(*seq),
            Action::Publish(_) => None,
        })
    }
}
