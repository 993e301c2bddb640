//! Inbound fragments consumed by the replay state machine.

use bitflags::bitflags;
use forkline_types::{Hash, Slot, Transaction};

/// Maximum number of transactions in a single replayed microblock.
pub const MAX_TXNS_PER_REPLAY: usize = 4096;

/// Maximum size of a self-packed microblock or a gossip vote, in bytes.
pub const MAX_FRAGMENT_SZ: usize = u16::MAX as usize;

bitflags! {
    /// Flags describing a replayed microblock.
    pub struct ReplayFlags: u8 {
        /// Microblock received from the block source.
        const MICROBLOCK        = 0x01;
        /// Last microblock of its block.
        const FINISHED_BLOCK    = 0x02;
        /// The node is catching up with the cluster.
        const CATCHING_UP       = 0x04;
        /// Microblock assembled by the local packer.
        const PACKED_MICROBLOCK = 0x08;
        /// Leader pipeline init message.
        const INIT              = 0x10;
    }
}

/// Slot and flags of a block-sourced microblock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayTag {
    /// Slot the microblock belongs to.
    pub slot: Slot,
    /// Microblock flags.
    pub flags: ReplayFlags,
}

/// Kind of a packet coming from the local packer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    /// A packed microblock.
    Microblock,
    /// The packer finished the block.
    DonePacking,
    /// Anything else.
    Other(u8),
}

/// Trailer of a self-packed microblock: the bank it was packed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BankTrailer {
    /// Slot of the execution context the packer built on.
    pub bank: Slot,
}

/// Payload of an inbound fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentKind {
    /// Microblock of a block received from the network or the ledger.
    BlockMicroblock {
        /// Slot and flags.
        tag: ReplayTag,
        /// Parent slot of the block.
        parent_slot: Slot,
        /// Blockhash of the block.
        blockhash: Hash,
        /// Transactions.
        txns: Vec<Transaction>,
    },

    /// Microblock speculatively assembled by the local packer.
    PackedMicroblock {
        /// Slot being packed.
        slot: Slot,
        /// Packet type.
        packet_type: PacketType,
        /// Transactions.
        txns: Vec<Transaction>,
        /// Bank trailer.
        trailer: BankTrailer,
    },

    /// Raw vote transaction from gossip.
    GossipVote(Vec<u8>),
}

/// A sequenced inbound fragment.
///
/// `seq` is the producer's sequence number. It is echoed back in
/// `Action::BatchRetired` once the fragment's transactions are retired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Producer sequence number.
    pub seq: u64,
    /// Payload.
    pub kind: FragmentKind,
}

/// An inbound fragment fell outside the declared bounds.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FragmentError {
    /// Too many transactions in one microblock.
    #[error("microblock at seq {seq} carries {count} transactions (max {max})")]
    TooManyTransactions {
        /// Fragment sequence.
        seq: u64,
        /// Transaction count.
        count: usize,
        /// Limit.
        max: usize,
    },

    /// Fragment larger than the buffer it was declared in.
    #[error("fragment at seq {seq} is {size} bytes (max {max})")]
    Oversized {
        /// Fragment sequence.
        seq: u64,
        /// Fragment size.
        size: usize,
        /// Limit.
        max: usize,
    },
}

impl Fragment {
    /// Create a block-sourced microblock fragment.
    pub fn block(
        seq: u64,
        slot: Slot,
        flags: ReplayFlags,
        parent_slot: Slot,
        blockhash: Hash,
        txns: Vec<Transaction>,
    ) -> Self {
        Self {
            seq,
            kind: FragmentKind::BlockMicroblock {
                tag: ReplayTag { slot, flags },
                parent_slot,
                blockhash,
                txns,
            },
        }
    }

    /// Create a self-packed microblock fragment.
    pub fn packed(seq: u64, slot: Slot, bank: Slot, txns: Vec<Transaction>) -> Self {
        Self {
            seq,
            kind: FragmentKind::PackedMicroblock {
                slot,
                packet_type: PacketType::Microblock,
                txns,
                trailer: BankTrailer { bank },
            },
        }
    }

    /// Create a gossip vote fragment.
    pub fn gossip_vote(seq: u64, payload: Vec<u8>) -> Self {
        Self {
            seq,
            kind: FragmentKind::GossipVote(payload),
        }
    }

    /// Target slot, for microblock fragments.
    pub fn slot(&self) -> Option<Slot> {
        match &self.kind {
            FragmentKind::BlockMicroblock { tag, .. } => Some(tag.slot),
            FragmentKind::PackedMicroblock { slot, .. } => Some(*slot),
            FragmentKind::GossipVote(_) => None,
        }
    }

    /// Check the fragment against the declared buffer bounds.
    pub fn validate(&self) -> Result<(), FragmentError> {
        match &self.kind {
            FragmentKind::BlockMicroblock { txns, .. } => self.check_count(txns.len()),
            FragmentKind::PackedMicroblock { txns, .. } => {
                self.check_count(txns.len())?;
                let size: usize = txns.iter().map(Transaction::size).sum();
                self.check_size(size)
            }
            FragmentKind::GossipVote(payload) => self.check_size(payload.len()),
        }
    }

    fn check_count(&self, count: usize) -> Result<(), FragmentError> {
        if count > MAX_TXNS_PER_REPLAY {
            return Err(FragmentError::TooManyTransactions {
                seq: self.seq,
                count,
                max: MAX_TXNS_PER_REPLAY,
            });
        }
        Ok(())
    }

    fn check_size(&self, size: usize) -> Result<(), FragmentError> {
        if size > MAX_FRAGMENT_SZ {
            return Err(FragmentError::Oversized {
                seq: self.seq,
                size,
                max: MAX_FRAGMENT_SZ,
            });
        }
        Ok(())
    }
}
