//! Fork choice for forkline replay.
//!
//! - [`GhostTree`]: stake-weighted LMD-GHOST tree over replayed slots
//! - [`Tower`]: the voting policy boundary, with [`HeaviestForkTower`] as
//!   the default policy
//! - [`BankHashComparator`]: agreement between the local bank hash and
//!   the hashes other validators voted for

mod bank_hash_cmp;
mod ghost;
mod tower;

pub use bank_hash_cmp::{
    BankHashComparator, BankHashMismatch, HashCheck, SharedBankHashComparator, StaleBankHash,
};
pub use ghost::{
    GhostError, GhostNode, GhostTree, GhostVote, EQV_SAFE_PCT, GHOST_PRINT_DEPTH_DEFAULT,
};
pub use tower::{HeaviestForkTower, Tower};
