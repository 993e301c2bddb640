//! Replay orchestrator.
//!
//! [`ReplayState`] composes the fork table, the execution worker pool, the
//! tower with its fork-choice tree and the bank hash comparator into one
//! synchronous state machine. It consumes microblock and gossip vote
//! fragments and returns the messages to publish as actions.

mod config;
mod error;
mod state;

pub use config::ReplayConfig;
pub use error::ReplayError;
pub use state::{Collaborators, ReplayState};
