//! Core types for the forkline replay pipeline.
//!
//! This crate provides the fundamental types shared by fork choice,
//! execution and the replay orchestrator:
//!
//! - Primitives: [`Hash`], [`Slot`], [`Pubkey`], [`BranchId`]
//! - Cryptography: [`Keypair`], [`Signature`]
//! - Ledger data: [`Transaction`], [`SlotBank`], [`SlotExecutionContext`]
//! - Epochs: [`EpochSchedule`], [`EpochStakes`], [`EpochContext`]
//! - Votes: [`VoteTransaction`]

mod bank;
mod crypto;
mod epoch;
mod hash;
mod identifiers;
mod transaction;
mod vote;

pub use bank::{CodecError, SlotBank, SlotExecutionContext};
pub use crypto::{Keypair, Signature};
pub use epoch::{
    has_supermajority, EmptyEpochError, EpochContext, EpochSchedule, EpochStakes, StakeWeight,
    VoteAccountStake,
};
pub use hash::{Hash, HexError};
pub use identifiers::{BranchId, Pubkey, Slot};
pub use transaction::Transaction;
pub use vote::{VoteMessage, VoteStateUpdate, VoteTransaction, DOMAIN_VOTE};
