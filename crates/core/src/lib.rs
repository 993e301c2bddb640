//! Core types for forkline replay.
//!
//! This crate defines the boundary of the replay state machine:
//!
//! - [`Fragment`]: inbound microblocks and gossip votes
//! - [`Action`] / [`Transition`]: what the state machine asks the runner to do
//! - [`OutboundMessage`]: messages for downstream stages
//! - [`StateMachine`]: the synchronous state machine trait
//! - [`Executor`], [`VersionedStore`], [`Blockstore`], [`VoteSigner`],
//!   [`ReplayCollector`]: external collaborators

mod action;
mod collaborators;
mod error;
mod fragment;
mod message;
mod traits;

pub use action::{Action, FilterReason, HandleOutcome, Transition};
pub use collaborators::{
    BlockSummary, Blockstore, Executor, LandedVote, RecordKey, ReplayCollector, TxnOutcome,
    VersionedStore, VoteSigner,
};
pub use error::{BlockstoreError, ExecutorError, StoreError};
pub use fragment::{
    BankTrailer, Fragment, FragmentError, FragmentKind, PacketType, ReplayFlags, ReplayTag,
    MAX_FRAGMENT_SZ, MAX_TXNS_PER_REPLAY,
};
pub use message::{OutboundMessage, PohMessage, ReplayNotification, StakeWeightsMessage};
pub use traits::StateMachine;
