//! Fork arena and frontier index.
//!
//! A [`Fork`] is a chain tip under active execution. Forks are allocated
//! from a fixed-size pool and indexed by their tip slot in the frontier.
//! When a fork advances, its frontier key is renamed in place: the
//! execution context moves with it and is never copied.

use forkline_core::LandedVote;
use forkline_types::{BranchId, EpochContext, Slot, SlotBank, SlotExecutionContext};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Errors from fork table operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ForkError {
    /// Every pool entry is in use.
    #[error("fork pool exhausted ({max} forks)")]
    PoolExhausted {
        /// Pool size.
        max: usize,
    },

    /// A frontier entry already exists for the slot.
    #[error("invariant violation: slot {0} already in the frontier")]
    DuplicateFrontier(Slot),

    /// No frontier entry for the slot.
    #[error("slot {0} not in the frontier")]
    NotInFrontier(Slot),

    /// The fork id does not refer to a live fork.
    #[error("stale fork id {0}")]
    StaleFork(ForkId),
}

/// Index of a fork in the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ForkId(usize);

impl fmt::Display for ForkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fork-{}", self.0)
    }
}

/// State needed to reinstate a fork's parent if its block is abandoned.
#[derive(Debug, Clone)]
pub struct ForkCheckpoint {
    /// Parent bank as it was before the block was prepared.
    pub bank: SlotBank,
    /// Parent branch.
    pub branch: BranchId,
    /// Parent epoch context.
    pub epoch: Arc<EpochContext>,
    /// Active epoch replaced when preparing the block rolled replay into a
    /// new epoch.
    pub superseded_epoch: Option<Arc<EpochContext>>,
}

/// A chain tip under active execution.
#[derive(Debug)]
pub struct Fork {
    slot: Slot,
    /// A block is being executed on this fork.
    pub executing: bool,
    /// Execution context.
    pub ctx: SlotExecutionContext,
    /// Votes landed by the block being executed.
    pub landed_votes: Vec<LandedVote>,
    /// Parent state captured when the current block was prepared.
    pub checkpoint: Option<ForkCheckpoint>,
}

impl Fork {
    /// Tip slot (the fork's frontier key while indexed).
    pub fn slot(&self) -> Slot {
        self.slot
    }
}

/// Fixed-size fork pool plus the frontier index.
#[derive(Debug)]
pub struct ForkTable {
    pool: Vec<Option<Fork>>,
    free: Vec<usize>,
    frontier: HashMap<Slot, ForkId>,
    max: usize,
}

impl ForkTable {
    /// Create a table able to hold `max` forks.
    pub fn new(max: usize) -> Self {
        Self {
            pool: Vec::new(),
            free: Vec::new(),
            frontier: HashMap::new(),
            max,
        }
    }

    /// Pool size.
    pub fn capacity(&self) -> usize {
        self.max
    }

    /// Live forks (indexed or not).
    pub fn len(&self) -> usize {
        self.pool.len() - self.free.len()
    }

    /// Whether no fork is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Allocate a fork with tip `slot`. The fork is not indexed until
    /// [`frontier_insert`](Self::frontier_insert).
    pub fn acquire(&mut self, slot: Slot, ctx: SlotExecutionContext) -> Result<ForkId, ForkError> {
        let fork = Fork {
            slot,
            executing: false,
            ctx,
            landed_votes: Vec::new(),
            checkpoint: None,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.pool[idx] = Some(fork);
                idx
            }
            None if self.pool.len() < self.max => {
                self.pool.push(Some(fork));
                self.pool.len() - 1
            }
            None => return Err(ForkError::PoolExhausted { max: self.max }),
        };
        trace!(slot = slot.0, fork = idx, "Fork acquired");
        Ok(ForkId(idx))
    }

    /// Return a fork to the pool, removing its frontier entry if it has one.
    pub fn release(&mut self, id: ForkId) -> Option<Fork> {
        let fork = self.pool.get_mut(id.0)?.take()?;
        if self.frontier.get(&fork.slot) == Some(&id) {
            self.frontier.remove(&fork.slot);
        }
        self.free.push(id.0);
        trace!(slot = fork.slot.0, fork = id.0, "Fork released");
        Some(fork)
    }

    /// Get a fork.
    pub fn get(&self, id: ForkId) -> Option<&Fork> {
        self.pool.get(id.0)?.as_ref()
    }

    /// Get a fork mutably.
    pub fn get_mut(&mut self, id: ForkId) -> Option<&mut Fork> {
        self.pool.get_mut(id.0)?.as_mut()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Frontier
    // ═══════════════════════════════════════════════════════════════════════

    /// Index a fork under its tip slot.
    ///
    /// An existing entry for the slot is a protocol invariant violation.
    pub fn frontier_insert(&mut self, id: ForkId) -> Result<(), ForkError> {
        let slot = self.get(id).ok_or(ForkError::StaleFork(id))?.slot;
        if self.frontier.contains_key(&slot) {
            return Err(ForkError::DuplicateFrontier(slot));
        }
        self.frontier.insert(slot, id);
        Ok(())
    }

    /// Remove the frontier entry for `slot`. The fork stays allocated.
    pub fn frontier_remove(&mut self, slot: Slot) -> Option<ForkId> {
        self.frontier.remove(&slot)
    }

    /// Fork indexed under `slot`.
    pub fn frontier_query(&self, slot: Slot) -> Option<ForkId> {
        self.frontier.get(&slot).copied()
    }

    /// Number of frontier entries.
    pub fn frontier_len(&self) -> usize {
        self.frontier.len()
    }

    /// Frontier entries, ordered by slot.
    pub fn frontier(&self) -> Vec<(Slot, ForkId)> {
        let mut entries: Vec<_> = self.frontier.iter().map(|(s, id)| (*s, *id)).collect();
        entries.sort();
        entries
    }

    /// Move the fork indexed at `from` to tip `to`.
    pub fn advance(&mut self, from: Slot, to: Slot) -> Result<ForkId, ForkError> {
        if from == to {
            return self.frontier_query(from).ok_or(ForkError::NotInFrontier(from));
        }
        if self.frontier.contains_key(&to) {
            return Err(ForkError::DuplicateFrontier(to));
        }
        let id = self
            .frontier
            .remove(&from)
            .ok_or(ForkError::NotInFrontier(from))?;
        let fork = self.get_mut(id).ok_or(ForkError::StaleFork(id))?;
        fork.slot = to;
        self.frontier.insert(to, id);
        trace!(from = from.0, to = to.0, fork = id.0, "Fork advanced");
        Ok(id)
    }
}
