//! Deterministic in-memory collaborators for replay.
//!
//! This crate provides everything the replay orchestrator needs to run
//! without a real ledger: a versioned account store, a blockstore, an
//! executor and a seeded fork workload. Given the same seed, a workload
//! replayed against these collaborators produces identical bank hashes
//! every run.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  SimBlock  ┌──────────────────────────────────┐
//! │ ForkWorkload │───────────▶│ Fragments (one per microblock)   │
//! │  (ChaCha8)   │            └────────────────┬─────────────────┘
//! └──────▲───────┘                             │ replay
//!        │ bank hashes                         ▼
//! ┌──────┴───────┐   ┌────────────┐   ┌──────────────────┐
//! │ SimBlockstore│◀──│ SimExecutor│──▶│ SimStore (im)    │
//! └──────────────┘   └────────────┘   └──────────────────┘
//! ```

mod blockstore;
mod executor;
mod store;
mod workload;

pub use blockstore::{BlockMeta, SimBlockstore};
pub use executor::SimExecutor;
pub use store::SimStore;
pub use workload::{ForkWorkload, SimBlock, SimValidator, WorkloadConfig};
