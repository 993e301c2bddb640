//! Voting policy boundary.
//!
//! Replay only needs three things from the voting policy: to be told when
//! a fork finished executing, to pick the fork subsequent blocks build on,
//! and to learn about stake changes. [`HeaviestForkTower`] is the default
//! policy: it follows the LMD-GHOST head without lockouts and roots the
//! deepest ancestor of the head that a supermajority of stake has rooted.

use crate::ghost::{GhostError, GhostTree};
use forkline_execution::{Fork, ForkId, ForkTable};
use forkline_types::{has_supermajority, EpochContext, Slot};
use tracing::{debug, info};

/// Consensus policy selecting the canonical tip.
pub trait Tower: Send {
    /// Current root.
    fn root(&self) -> Slot;

    /// Total stake of the active epoch.
    fn total_stake(&self) -> u64;

    /// Fork-choice tree.
    fn ghost(&self) -> &GhostTree;

    /// Mutable fork-choice tree.
    fn ghost_mut(&mut self) -> &mut GhostTree;

    /// `fork` just finished executing its block.
    ///
    /// Returns the new root when it advanced. The caller is responsible for
    /// publishing the root to the ghost and the stores.
    fn fork_update(&mut self, fork: &Fork) -> Result<Option<Slot>, GhostError>;

    /// The fork subsequent execution and voting should build on.
    fn reset_fork_select(&self, forks: &ForkTable) -> Option<ForkId>;

    /// The active epoch's stake distribution changed.
    fn epoch_update(&mut self, epoch: &EpochContext);
}

/// Heaviest-fork policy without lockouts.
#[derive(Debug)]
pub struct HeaviestForkTower {
    ghost: GhostTree,
    root: Slot,
    total_stake: u64,
    last_updated: Option<Slot>,
}

impl HeaviestForkTower {
    /// Create a tower rooted at `root`.
    pub fn new(root: Slot, ghost_node_max: usize, ghost_vote_max: usize) -> Self {
        Self {
            ghost: GhostTree::init(root, ghost_node_max, ghost_vote_max),
            root,
            total_stake: 0,
            last_updated: None,
        }
    }

    /// Slot of the most recently updated fork.
    pub fn last_updated(&self) -> Option<Slot> {
        self.last_updated
    }

    /// Deepest ancestor-or-self of the head above the current root that a
    /// supermajority has rooted.
    fn rootable(&self) -> Option<Slot> {
        let mut curr = Some(self.ghost.head_query().slot());
        while let Some(slot) = curr {
            if slot <= self.root {
                return None;
            }
            let rooted = self
                .ghost
                .node_query(slot)
                .map(|n| n.rooted_stake())
                .unwrap_or(0);
            if has_supermajority(rooted, self.total_stake) {
                return Some(slot);
            }
            curr = self.ghost.parent(slot);
        }
        None
    }
}

impl Tower for HeaviestForkTower {
    fn root(&self) -> Slot {
        self.root
    }

    fn total_stake(&self) -> u64 {
        self.total_stake
    }

    fn ghost(&self) -> &GhostTree {
        &self.ghost
    }

    fn ghost_mut(&mut self) -> &mut GhostTree {
        &mut self.ghost
    }

    fn fork_update(&mut self, fork: &Fork) -> Result<Option<Slot>, GhostError> {
        let slot = fork.slot();
        if !self.ghost.contains(slot) {
            self.ghost.node_insert(slot, fork.ctx.parent_slot())?;
        }
        self.last_updated = Some(slot);

        let stakes = &fork.ctx.epoch.stakes;
        for vote in &fork.landed_votes {
            let stake = stakes.stake_of(&vote.vote_account);
            if stake == 0 {
                debug!(slot = slot.0, voter = ?vote.vote_account, "Ignoring unstaked vote");
                continue;
            }
            if !self.ghost.contains(vote.slot) {
                debug!(
                    slot = slot.0,
                    vote_slot = vote.slot.0,
                    "Ignoring vote for a slot outside the ghost"
                );
                continue;
            }
            self.ghost
                .replay_vote_upsert(vote.slot, vote.vote_account, stake)?;
            if let Some(root) = vote.root.filter(|r| self.ghost.contains(*r)) {
                self.ghost
                    .rooted_vote_upsert(root, vote.vote_account, stake)?;
            }
        }

        let new_root = self.rootable();
        if let Some(root) = new_root {
            info!(old_root = self.root.0, new_root = root.0, "Tower root advanced");
            self.root = root;
        }
        Ok(new_root)
    }

    fn reset_fork_select(&self, forks: &ForkTable) -> Option<ForkId> {
        let head = self.ghost.head_query().slot();
        if let Some(id) = forks.frontier_query(head) {
            return Some(id);
        }

        // A fork built on the head may still be executing, in which case
        // it is not resident in the ghost yet.
        let descendant = forks
            .frontier()
            .into_iter()
            .rev()
            .find(|(_, id)| {
                forks.get(*id).is_some_and(|fork| {
                    let parent = fork.ctx.parent_slot();
                    parent == head || self.ghost.is_ancestor(head, parent)
                })
            })
            .map(|(_, id)| id);
        descendant.or_else(|| self.last_updated.and_then(|s| forks.frontier_query(s)))
    }

    fn epoch_update(&mut self, epoch: &EpochContext) {
        self.total_stake = epoch.total_stake();
        debug!(epoch = epoch.epoch, total_stake = self.total_stake, "Tower epoch update");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forkline_core::LandedVote;
    use forkline_test_helpers::{test_blockhash, test_epoch_ctx, test_slot_ctx, test_vote_account};
    use forkline_types::Hash;
    use tracing_test::traced_test;

    fn tower() -> HeaviestForkTower {
        let mut tower = HeaviestForkTower::new(Slot(0), 64, 64);
        tower.epoch_update(&test_epoch_ctx());
        tower
    }

    fn vote(voter: u8, slot: u64, root: Option<u64>) -> LandedVote {
        LandedVote {
            vote_account: test_vote_account(voter),
            slot: Slot(slot),
            hash: Hash::ZERO,
            root: root.map(Slot),
        }
    }

    /// Finalize `slot` on top of `parent` with the given landed votes.
    fn update(
        tower: &mut HeaviestForkTower,
        forks: &mut ForkTable,
        slot: u64,
        parent: u64,
        votes: Vec<LandedVote>,
    ) -> Option<Slot> {
        let mut ctx = test_slot_ctx(slot);
        ctx.bank.prev_slot = Slot(parent);
        let id = forks.acquire(Slot(slot), ctx).unwrap();
        forks.frontier_remove(Slot(parent));
        forks.frontier_insert(id).unwrap();
        let fork = forks.get_mut(id).unwrap();
        fork.landed_votes = votes;
        tower.fork_update(forks.get(id).unwrap()).unwrap()
    }

    #[test]
    fn test_fork_update_inserts_and_weighs() {
        let mut tower = tower();
        let mut forks = ForkTable::new(8);
        update(&mut tower, &mut forks, 1, 0, vec![]);
        update(&mut tower, &mut forks, 2, 1, vec![vote(0, 1, None), vote(1, 1, None)]);

        assert_eq!(tower.total_stake(), 30);
        assert_eq!(tower.ghost().node_query(Slot(1)).unwrap().weight(), 20);
        assert_eq!(tower.ghost().head_query().slot(), Slot(2));
        assert_eq!(tower.last_updated(), Some(Slot(2)));
    }

    #[traced_test]
    #[test]
    fn test_unknown_and_unstaked_votes_ignored() {
        let mut tower = tower();
        let mut forks = ForkTable::new(8);
        update(&mut tower, &mut forks, 1, 0, vec![vote(9, 0, None), vote(0, 7, None)]);

        assert_eq!(tower.ghost().root().weight(), 0);
        assert!(logs_contain("Ignoring unstaked vote"));
        assert!(logs_contain("Ignoring vote for a slot outside the ghost"));
    }

    #[test]
    fn test_root_advances_on_supermajority_root() {
        let mut tower = tower();
        let mut forks = ForkTable::new(8);
        update(&mut tower, &mut forks, 1, 0, vec![]);
        update(&mut tower, &mut forks, 2, 1, vec![]);

        // Two of three validators root slot 1: exactly 2/3, not enough.
        let root = update(
            &mut tower,
            &mut forks,
            3,
            2,
            vec![vote(0, 2, Some(1)), vote(1, 2, Some(1))],
        );
        assert_eq!(root, None);
        assert_eq!(tower.root(), Slot(0));

        let root = update(&mut tower, &mut forks, 4, 3, vec![vote(2, 3, Some(1))]);
        assert_eq!(root, Some(Slot(1)));
        assert_eq!(tower.root(), Slot(1));
        // The ghost is published by the caller.
        assert_eq!(tower.ghost().root().slot(), Slot(0));
    }

    #[test]
    fn test_reset_follows_head() {
        let mut tower = tower();
        let mut forks = ForkTable::new(8);
        update(&mut tower, &mut forks, 1, 0, vec![]);
        update(&mut tower, &mut forks, 2, 0, vec![]);
        // Equal weight: lower slot wins.
        let reset = tower.reset_fork_select(&forks).unwrap();
        assert_eq!(forks.get(reset).unwrap().slot(), Slot(1));

        update(&mut tower, &mut forks, 3, 2, vec![vote(0, 2, None)]);
        let reset = tower.reset_fork_select(&forks).unwrap();
        assert_eq!(forks.get(reset).unwrap().slot(), Slot(3));
    }

    #[test]
    fn test_reset_falls_back_to_executing_descendant() {
        let mut tower = tower();
        let mut forks = ForkTable::new(8);
        update(&mut tower, &mut forks, 1, 0, vec![]);
        update(&mut tower, &mut forks, 3, 0, vec![]);
        assert_eq!(tower.ghost().head_query().slot(), Slot(1));

        // Slot 2 starts executing on top of the head and takes over its key.
        let mut ctx = test_slot_ctx(2);
        ctx.bank.prev_slot = Slot(1);
        let id = forks.acquire(Slot(2), ctx).unwrap();
        forks.frontier_remove(Slot(1));
        forks.frontier_insert(id).unwrap();

        assert_eq!(tower.reset_fork_select(&forks), Some(id));
        assert_eq!(
            forks.get(id).unwrap().ctx.bank.last_blockhash,
            test_blockhash(2)
        );
    }

    #[test]
    fn test_reset_falls_back_to_last_updated() {
        let mut tower = tower();
        let mut forks = ForkTable::new(8);
        update(&mut tower, &mut forks, 1, 0, vec![]);
        update(&mut tower, &mut forks, 3, 0, vec![]);
        forks.frontier_remove(Slot(1));

        let reset = tower.reset_fork_select(&forks).unwrap();
        assert_eq!(forks.get(reset).unwrap().slot(), Slot(3));
    }
}
