//! LMD-GHOST fork choice.
//!
//! The tree holds one node per replayed slot above the root. Every node
//! carries the stake of the validators whose latest replay vote is for that
//! slot, and a `weight` equal to its own stake plus the weight of all its
//! children. The head is found by descending from the root into the
//! heaviest child until reaching a leaf.
//!
//! Nodes live in an arena addressed by index, with a `slot -> index` map.
//! Pruned entries go onto a free list and are reused.

use forkline_types::{Pubkey, Slot};
use std::collections::HashMap;
use std::fmt::Write;
use tracing::{debug, trace};

/// Fraction of total stake a slot needs before it is safe from equivocation.
pub const EQV_SAFE_PCT: u64 = 52;

/// Default ancestor depth for [`GhostTree::render`].
pub const GHOST_PRINT_DEPTH_DEFAULT: usize = 8;

/// Errors from ghost tree operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GhostError {
    /// The parent of an inserted slot is not in the tree.
    #[error("unknown parent {parent} for slot {slot}")]
    UnknownParent {
        /// Inserted slot.
        slot: Slot,
        /// Missing parent.
        parent: Slot,
    },

    /// The slot is already in the tree.
    #[error("slot {0} already in ghost")]
    DuplicateSlot(Slot),

    /// The slot is not in the tree.
    #[error("slot {0} not in ghost")]
    UnknownSlot(Slot),

    /// Node pool at capacity.
    #[error("ghost node pool exhausted ({max} nodes)")]
    PoolExhausted {
        /// Pool size.
        max: usize,
    },

    /// Vote map at capacity.
    #[error("ghost vote pool exhausted ({max} voters)")]
    VotePoolExhausted {
        /// Pool size.
        max: usize,
    },
}

/// A node of the ghost tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GhostNode {
    slot: Slot,
    weight: u64,
    stake: u64,
    gossip_stake: u64,
    rooted_stake: u64,
    eqv: bool,
    parent: Option<usize>,
    children: Vec<usize>,
}

impl GhostNode {
    fn new(slot: Slot, parent: Option<usize>) -> Self {
        Self {
            slot,
            weight: 0,
            stake: 0,
            gossip_stake: 0,
            rooted_stake: 0,
            eqv: false,
            parent,
            children: Vec::new(),
        }
    }

    /// Slot of the node.
    pub fn slot(&self) -> Slot {
        self.slot
    }

    /// Stake voting for this node or any descendant.
    pub fn weight(&self) -> u64 {
        self.weight
    }

    /// Replay-vote stake on exactly this slot.
    pub fn stake(&self) -> u64 {
        self.stake
    }

    /// Stake of gossip votes on this slot.
    pub fn gossip_stake(&self) -> u64 {
        self.gossip_stake
    }

    /// Stake of validators whose tower root is this slot.
    pub fn rooted_stake(&self) -> u64 {
        self.rooted_stake
    }

    /// Whether an equivocation was observed for this slot.
    pub fn is_equivocating(&self) -> bool {
        self.eqv
    }

    /// Number of children.
    pub fn child_count(&self) -> usize {
        self.children.len()
    }
}

/// Latest vote of one validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GhostVote {
    /// Voted slot.
    pub slot: Slot,
    /// Stake counted for the vote.
    pub stake: u64,
}

/// Which per-node stake counter a latest-vote map feeds.
#[derive(Clone, Copy)]
enum VoteKind {
    Replay,
    Gossip,
    Rooted,
}

/// Weighted fork-choice tree.
#[derive(Debug, Clone)]
pub struct GhostTree {
    nodes: Vec<Option<GhostNode>>,
    free: Vec<usize>,
    index: HashMap<Slot, usize>,
    root: usize,
    replay_votes: HashMap<Pubkey, GhostVote>,
    gossip_votes: HashMap<Pubkey, GhostVote>,
    rooted_votes: HashMap<Pubkey, GhostVote>,
    node_max: usize,
    vote_max: usize,
}

impl GhostTree {
    /// Create a tree holding only `root`.
    pub fn init(root: Slot, node_max: usize, vote_max: usize) -> Self {
        let mut index = HashMap::new();
        index.insert(root, 0);
        debug!(root = root.0, node_max, vote_max, "Ghost initialized");
        Self {
            nodes: vec![Some(GhostNode::new(root, None))],
            free: Vec::new(),
            index,
            root: 0,
            replay_votes: HashMap::new(),
            gossip_votes: HashMap::new(),
            rooted_votes: HashMap::new(),
            node_max: node_max.max(1),
            vote_max,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Arena access
    // ═══════════════════════════════════════════════════════════════════════

    fn node(&self, idx: usize) -> &GhostNode {
        // Indices come from `index` or from links of live nodes.
        self.nodes[idx]
            .as_ref()
            .unwrap_or_else(|| unreachable!("ghost index {idx} points at a free entry"))
    }

    fn node_mut(&mut self, idx: usize) -> &mut GhostNode {
        self.nodes[idx]
            .as_mut()
            .unwrap_or_else(|| unreachable!("ghost index {idx} points at a free entry"))
    }

    fn alloc(&mut self, node: GhostNode) -> usize {
        match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = Some(node);
                idx
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Queries
    // ═══════════════════════════════════════════════════════════════════════

    /// The root node.
    pub fn root(&self) -> &GhostNode {
        self.node(self.root)
    }

    /// Number of resident nodes.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Always false: the root is always resident.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Look up a node.
    pub fn node_query(&self, slot: Slot) -> Option<&GhostNode> {
        self.index.get(&slot).map(|&idx| self.node(idx))
    }

    /// Whether `slot` is resident.
    pub fn contains(&self, slot: Slot) -> bool {
        self.index.contains_key(&slot)
    }

    /// Parent slot of `slot`.
    pub fn parent(&self, slot: Slot) -> Option<Slot> {
        let idx = *self.index.get(&slot)?;
        self.node(idx).parent.map(|p| self.node(p).slot)
    }

    /// Child slots of `slot`, in insertion order.
    pub fn children(&self, slot: Slot) -> Vec<Slot> {
        self.index
            .get(&slot)
            .map(|&idx| {
                self.node(idx)
                    .children
                    .iter()
                    .map(|&c| self.node(c).slot)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether `ancestor` is a strict ancestor of `slot`.
    pub fn is_ancestor(&self, ancestor: Slot, slot: Slot) -> bool {
        let Some(&idx) = self.index.get(&slot) else {
            return false;
        };
        let mut curr = self.node(idx).parent;
        while let Some(p) = curr {
            let node = self.node(p);
            if node.slot == ancestor {
                return true;
            }
            curr = node.parent;
        }
        false
    }

    /// Latest replay vote of `pubkey`.
    pub fn vote_query(&self, pubkey: &Pubkey) -> Option<GhostVote> {
        self.replay_votes.get(pubkey).copied()
    }

    /// Iterate resident nodes in arena order.
    pub fn nodes(&self) -> impl Iterator<Item = &GhostNode> {
        self.nodes.iter().flatten()
    }

    /// The fork-choice head.
    ///
    /// Descends from the root into the heaviest child. Among children of
    /// equal weight the lowest slot wins.
    pub fn head_query(&self) -> &GhostNode {
        let mut curr = self.node(self.root);
        while let Some(&best) = curr.children.iter().max_by(|&&a, &&b| {
            let (a, b) = (self.node(a), self.node(b));
            a.weight.cmp(&b.weight).then(b.slot.cmp(&a.slot))
        }) {
            curr = self.node(best);
        }
        curr
    }

    /// Whether `slot` holds enough stake to be safe from equivocation.
    pub fn is_eqv_safe(&self, slot: Slot, total_stake: u64) -> bool {
        self.node_query(slot).is_some_and(|n| {
            (n.weight as u128) * 100 >= (total_stake as u128) * EQV_SAFE_PCT as u128
        })
    }

    /// Whether `slot` is optimistically confirmed (weight >= 2/3 of stake).
    pub fn is_optimistically_confirmed(&self, slot: Slot, total_stake: u64) -> bool {
        self.node_query(slot)
            .is_some_and(|n| (n.weight as u128) * 3 >= (total_stake as u128) * 2)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Mutations
    // ═══════════════════════════════════════════════════════════════════════

    /// Insert `slot` as a child of `parent`.
    pub fn node_insert(&mut self, slot: Slot, parent: Slot) -> Result<&GhostNode, GhostError> {
        if self.index.contains_key(&slot) {
            return Err(GhostError::DuplicateSlot(slot));
        }
        let parent_idx = *self
            .index
            .get(&parent)
            .ok_or(GhostError::UnknownParent { slot, parent })?;
        if self.index.len() >= self.node_max {
            return Err(GhostError::PoolExhausted { max: self.node_max });
        }

        let idx = self.alloc(GhostNode::new(slot, Some(parent_idx)));
        self.node_mut(parent_idx).children.push(idx);
        self.index.insert(slot, idx);
        trace!(slot = slot.0, parent = parent.0, "Ghost node inserted");
        Ok(self.node(idx))
    }

    /// Record `pubkey`'s latest replay vote for `slot`.
    ///
    /// The stake of the previous vote is removed from the old slot and all
    /// its ancestors before the new stake is added along the new slot's
    /// ancestry.
    pub fn replay_vote_upsert(
        &mut self,
        slot: Slot,
        pubkey: Pubkey,
        stake: u64,
    ) -> Result<(), GhostError> {
        self.vote_upsert(VoteKind::Replay, slot, pubkey, stake)
    }

    /// Record `pubkey`'s latest gossip vote. Only `gossip_stake` of the
    /// target changes; weights are untouched.
    pub fn gossip_vote_upsert(
        &mut self,
        slot: Slot,
        pubkey: Pubkey,
        stake: u64,
    ) -> Result<(), GhostError> {
        self.vote_upsert(VoteKind::Gossip, slot, pubkey, stake)
    }

    /// Record `pubkey`'s latest tower root. Only `rooted_stake` of the
    /// target changes.
    pub fn rooted_vote_upsert(
        &mut self,
        slot: Slot,
        pubkey: Pubkey,
        stake: u64,
    ) -> Result<(), GhostError> {
        self.vote_upsert(VoteKind::Rooted, slot, pubkey, stake)
    }

    fn votes_mut(&mut self, kind: VoteKind) -> &mut HashMap<Pubkey, GhostVote> {
        match kind {
            VoteKind::Replay => &mut self.replay_votes,
            VoteKind::Gossip => &mut self.gossip_votes,
            VoteKind::Rooted => &mut self.rooted_votes,
        }
    }

    fn vote_upsert(
        &mut self,
        kind: VoteKind,
        slot: Slot,
        pubkey: Pubkey,
        stake: u64,
    ) -> Result<(), GhostError> {
        let idx = *self.index.get(&slot).ok_or(GhostError::UnknownSlot(slot))?;
        let vote_max = self.vote_max;
        let votes = self.votes_mut(kind);
        if !votes.contains_key(&pubkey) && votes.len() >= vote_max {
            return Err(GhostError::VotePoolExhausted { max: vote_max });
        }

        if let Some(prev) = votes.insert(pubkey, GhostVote { slot, stake }) {
            // Votes referencing pruned slots are dropped on publish.
            if let Some(&prev_idx) = self.index.get(&prev.slot) {
                self.apply(kind, prev_idx, prev.stake, false);
            }
        }
        self.apply(kind, idx, stake, true);
        trace!(slot = slot.0, voter = ?pubkey, stake, "Ghost vote upserted");
        Ok(())
    }

    fn apply(&mut self, kind: VoteKind, idx: usize, stake: u64, add: bool) {
        let adjust = |v: &mut u64| {
            if add {
                *v += stake;
            } else {
                *v -= stake;
            }
        };
        let node = self.node_mut(idx);
        match kind {
            VoteKind::Gossip => adjust(&mut node.gossip_stake),
            VoteKind::Rooted => adjust(&mut node.rooted_stake),
            VoteKind::Replay => {
                adjust(&mut node.stake);
                let mut curr = Some(idx);
                while let Some(i) = curr {
                    let node = self.node_mut(i);
                    adjust(&mut node.weight);
                    curr = node.parent;
                }
            }
        }
    }

    /// Flag `slot` as equivocating.
    pub fn mark_equivocation(&mut self, slot: Slot) -> Result<(), GhostError> {
        let idx = *self.index.get(&slot).ok_or(GhostError::UnknownSlot(slot))?;
        self.node_mut(idx).eqv = true;
        debug!(slot = slot.0, "Ghost node marked equivocating");
        Ok(())
    }

    /// Make `new_root` the root, pruning every node that does not descend
    /// from it along with the votes that reference pruned slots.
    ///
    /// Returns the number of pruned nodes.
    pub fn publish(&mut self, new_root: Slot) -> Result<usize, GhostError> {
        let root_idx = *self
            .index
            .get(&new_root)
            .ok_or(GhostError::UnknownSlot(new_root))?;
        if root_idx == self.root {
            return Ok(0);
        }

        let mut keep = vec![false; self.nodes.len()];
        let mut stack = vec![root_idx];
        while let Some(idx) = stack.pop() {
            keep[idx] = true;
            stack.extend(self.node(idx).children.iter().copied());
        }

        let mut pruned = 0;
        for (idx, kept) in keep.into_iter().enumerate() {
            if kept {
                continue;
            }
            if let Some(node) = self.nodes[idx].take() {
                self.index.remove(&node.slot);
                self.free.push(idx);
                pruned += 1;
            }
        }

        let index = &self.index;
        for votes in [
            &mut self.replay_votes,
            &mut self.gossip_votes,
            &mut self.rooted_votes,
        ] {
            votes.retain(|_, vote| index.contains_key(&vote.slot));
        }

        self.node_mut(root_idx).parent = None;
        self.root = root_idx;
        debug!(root = new_root.0, pruned, remaining = self.len(), "Ghost published");
        Ok(pruned)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Rendering
    // ═══════════════════════════════════════════════════════════════════════

    /// Pretty-print the subtree around `start`.
    ///
    /// Walks up to `depth` ancestors from `start` (stopping at the root) and
    /// renders that ancestor's subtree, one node per line with its share of
    /// `total_stake`.
    pub fn render(&self, start: Slot, depth: usize, total_stake: u64) -> String {
        let Some(&start_idx) = self.index.get(&start) else {
            return format!("[Ghost] slot {start} not found\n");
        };
        let mut top = start_idx;
        for _ in 0..depth {
            match self.node(top).parent {
                Some(p) => top = p,
                None => break,
            }
        }

        let mut out = String::from("[Ghost]\n");
        self.render_node(&mut out, top, "", None, total_stake);
        out
    }

    fn render_node(
        &self,
        out: &mut String,
        idx: usize,
        prefix: &str,
        last: Option<bool>,
        total_stake: u64,
    ) {
        let node = self.node(idx);
        let pct = if total_stake == 0 {
            0.0
        } else {
            node.weight as f64 / total_stake as f64 * 100.0
        };
        let (branch, child_prefix) = match last {
            None => ("", prefix.to_string()),
            Some(true) => ("└── ", format!("{prefix}    ")),
            Some(false) => ("├── ", format!("{prefix}│   ")),
        };
        let eqv = if node.eqv { " eqv" } else { "" };
        // Writing into a String cannot fail.
        let _ = writeln!(
            out,
            "{prefix}{branch}{} ({pct:.2}%, {}){eqv}",
            node.slot, node.weight
        );

        let count = node.children.len();
        for (i, &child) in node.children.iter().enumerate() {
            self.render_node(out, child, &child_prefix, Some(i + 1 == count), total_stake);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forkline_test_helpers::test_pubkey;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use tracing_test::traced_test;

    fn tree(root: u64) -> GhostTree {
        GhostTree::init(Slot(root), 1024, 1024)
    }

    /// Checks `weight == stake + sum(children weights)` for every node.
    fn assert_weights_exact(ghost: &GhostTree) {
        for node in ghost.nodes() {
            let children: u64 = node.children.iter().map(|&c| ghost.node(c).weight).sum();
            assert_eq!(
                node.weight,
                node.stake + children,
                "weight invariant broken at slot {}",
                node.slot
            );
        }
    }

    #[traced_test]
    #[test]
    fn test_head_follows_single_vote() {
        let mut ghost = tree(100);
        ghost.node_insert(Slot(101), Slot(100)).unwrap();
        ghost.node_insert(Slot(102), Slot(101)).unwrap();
        ghost.replay_vote_upsert(Slot(101), test_pubkey(1), 10).unwrap();

        assert_eq!(ghost.head_query().slot(), Slot(102));
        assert_eq!(ghost.node_query(Slot(101)).unwrap().weight(), 10);
        assert_eq!(ghost.node_query(Slot(100)).unwrap().weight(), 10);
        assert_eq!(ghost.node_query(Slot(102)).unwrap().weight(), 0);
        assert_weights_exact(&ghost);
    }

    #[traced_test]
    #[test]
    fn test_heavier_sibling_wins() {
        let mut ghost = tree(100);
        ghost.node_insert(Slot(101), Slot(100)).unwrap();
        ghost.node_insert(Slot(102), Slot(101)).unwrap();
        ghost.replay_vote_upsert(Slot(101), test_pubkey(1), 10).unwrap();
        ghost.node_insert(Slot(150), Slot(100)).unwrap();
        ghost.replay_vote_upsert(Slot(150), test_pubkey(2), 20).unwrap();

        assert_eq!(ghost.head_query().slot(), Slot(150));
        assert_eq!(ghost.root().weight(), 30);
        assert_weights_exact(&ghost);
    }

    #[test]
    fn test_tie_breaks_to_lower_slot() {
        let mut ghost = tree(0);
        ghost.node_insert(Slot(2), Slot(0)).unwrap();
        ghost.node_insert(Slot(1), Slot(0)).unwrap();
        assert_eq!(ghost.head_query().slot(), Slot(1));

        ghost.replay_vote_upsert(Slot(2), test_pubkey(1), 5).unwrap();
        ghost.replay_vote_upsert(Slot(1), test_pubkey(2), 5).unwrap();
        assert_eq!(ghost.head_query().slot(), Slot(1));
    }

    #[test]
    fn test_vote_moves_between_forks() {
        let mut ghost = tree(0);
        ghost.node_insert(Slot(1), Slot(0)).unwrap();
        ghost.node_insert(Slot(2), Slot(1)).unwrap();
        ghost.node_insert(Slot(3), Slot(0)).unwrap();

        let voter = test_pubkey(1);
        ghost.replay_vote_upsert(Slot(2), voter, 7).unwrap();
        ghost.replay_vote_upsert(Slot(3), voter, 7).unwrap();

        assert_eq!(ghost.node_query(Slot(1)).unwrap().weight(), 0);
        assert_eq!(ghost.node_query(Slot(2)).unwrap().weight(), 0);
        assert_eq!(ghost.node_query(Slot(3)).unwrap().weight(), 7);
        assert_eq!(ghost.root().weight(), 7);
        assert_eq!(ghost.vote_query(&voter), Some(GhostVote { slot: Slot(3), stake: 7 }));
        assert_weights_exact(&ghost);

        // Re-voting the same slot does not double count.
        ghost.replay_vote_upsert(Slot(3), voter, 7).unwrap();
        assert_eq!(ghost.root().weight(), 7);
    }

    #[test]
    fn test_insert_errors() {
        let mut ghost = GhostTree::init(Slot(0), 2, 1);
        assert_eq!(
            ghost.node_insert(Slot(5), Slot(4)).unwrap_err(),
            GhostError::UnknownParent {
                slot: Slot(5),
                parent: Slot(4)
            }
        );
        ghost.node_insert(Slot(1), Slot(0)).unwrap();
        assert_eq!(
            ghost.node_insert(Slot(1), Slot(0)).unwrap_err(),
            GhostError::DuplicateSlot(Slot(1))
        );
        assert_eq!(
            ghost.node_insert(Slot(2), Slot(1)).unwrap_err(),
            GhostError::PoolExhausted { max: 2 }
        );

        ghost.replay_vote_upsert(Slot(1), test_pubkey(1), 1).unwrap();
        assert_eq!(
            ghost.replay_vote_upsert(Slot(1), test_pubkey(2), 1),
            Err(GhostError::VotePoolExhausted { max: 1 })
        );
        assert_eq!(
            ghost.replay_vote_upsert(Slot(9), test_pubkey(1), 1),
            Err(GhostError::UnknownSlot(Slot(9)))
        );
    }

    #[test]
    fn test_gossip_votes_leave_weights_alone() {
        let mut ghost = tree(0);
        ghost.node_insert(Slot(1), Slot(0)).unwrap();
        ghost.node_insert(Slot(2), Slot(1)).unwrap();

        let voter = test_pubkey(1);
        ghost.gossip_vote_upsert(Slot(2), voter, 40).unwrap();
        assert_eq!(ghost.node_query(Slot(2)).unwrap().gossip_stake(), 40);
        assert!(ghost.nodes().all(|n| n.weight() == 0));

        ghost.gossip_vote_upsert(Slot(1), voter, 40).unwrap();
        assert_eq!(ghost.node_query(Slot(2)).unwrap().gossip_stake(), 0);
        assert_eq!(ghost.node_query(Slot(1)).unwrap().gossip_stake(), 40);
        assert!(ghost.nodes().all(|n| n.weight() == 0));
    }

    #[test]
    fn test_rooted_votes_only_touch_target() {
        let mut ghost = tree(0);
        ghost.node_insert(Slot(1), Slot(0)).unwrap();
        ghost.rooted_vote_upsert(Slot(1), test_pubkey(1), 9).unwrap();
        assert_eq!(ghost.node_query(Slot(1)).unwrap().rooted_stake(), 9);
        assert_eq!(ghost.root().rooted_stake(), 0);
        assert_eq!(ghost.root().weight(), 0);
    }

    #[traced_test]
    #[test]
    fn test_publish_prunes_non_descendants() {
        let mut ghost = tree(0);
        ghost.node_insert(Slot(1), Slot(0)).unwrap();
        ghost.node_insert(Slot(2), Slot(1)).unwrap();
        ghost.node_insert(Slot(3), Slot(1)).unwrap();
        ghost.node_insert(Slot(4), Slot(0)).unwrap();
        ghost.node_insert(Slot(5), Slot(2)).unwrap();

        ghost.replay_vote_upsert(Slot(4), test_pubkey(1), 100).unwrap();
        ghost.replay_vote_upsert(Slot(5), test_pubkey(2), 10).unwrap();
        ghost.replay_vote_upsert(Slot(0), test_pubkey(3), 10).unwrap();
        assert_eq!(ghost.head_query().slot(), Slot(4));

        let pruned = ghost.publish(Slot(2)).unwrap();
        assert_eq!(pruned, 4);
        assert_eq!(ghost.len(), 2);
        assert_eq!(ghost.root().slot(), Slot(2));
        assert_eq!(ghost.parent(Slot(2)), None);
        assert!(!ghost.contains(Slot(4)));
        assert!(!ghost.contains(Slot(3)));
        assert_eq!(ghost.head_query().slot(), Slot(5));
        assert_eq!(ghost.vote_query(&test_pubkey(1)), None);
        assert_eq!(ghost.vote_query(&test_pubkey(3)), None);
        assert!(ghost.vote_query(&test_pubkey(2)).is_some());
        assert_weights_exact(&ghost);

        // Freed entries are reused.
        ghost.node_insert(Slot(6), Slot(5)).unwrap();
        assert_eq!(ghost.nodes.len(), 6);

        // A pruned voter can vote again.
        ghost.replay_vote_upsert(Slot(6), test_pubkey(1), 100).unwrap();
        assert_eq!(ghost.root().weight(), 110);
        assert_weights_exact(&ghost);
    }

    #[test]
    fn test_publish_unknown_root() {
        let mut ghost = tree(0);
        assert_eq!(ghost.publish(Slot(3)), Err(GhostError::UnknownSlot(Slot(3))));
        assert_eq!(ghost.publish(Slot(0)), Ok(0));
    }

    #[test]
    fn test_ancestry_and_thresholds() {
        let mut ghost = tree(0);
        ghost.node_insert(Slot(1), Slot(0)).unwrap();
        ghost.node_insert(Slot(2), Slot(1)).unwrap();
        assert!(ghost.is_ancestor(Slot(0), Slot(2)));
        assert!(ghost.is_ancestor(Slot(1), Slot(2)));
        assert!(!ghost.is_ancestor(Slot(2), Slot(2)));
        assert!(!ghost.is_ancestor(Slot(2), Slot(1)));

        ghost.replay_vote_upsert(Slot(2), test_pubkey(1), 52).unwrap();
        assert!(ghost.is_eqv_safe(Slot(1), 100));
        assert!(!ghost.is_optimistically_confirmed(Slot(1), 100));
        ghost.replay_vote_upsert(Slot(2), test_pubkey(2), 15).unwrap();
        assert!(ghost.is_optimistically_confirmed(Slot(1), 100));
        assert!(!ghost.is_eqv_safe(Slot(7), 100));

        ghost.mark_equivocation(Slot(2)).unwrap();
        assert!(ghost.node_query(Slot(2)).unwrap().is_equivocating());
    }

    #[test]
    fn test_render() {
        let mut ghost = tree(100);
        ghost.node_insert(Slot(101), Slot(100)).unwrap();
        ghost.node_insert(Slot(102), Slot(101)).unwrap();
        ghost.node_insert(Slot(150), Slot(100)).unwrap();
        ghost.replay_vote_upsert(Slot(150), test_pubkey(1), 20).unwrap();
        ghost.replay_vote_upsert(Slot(101), test_pubkey(2), 10).unwrap();

        let rendered = ghost.render(Slot(102), GHOST_PRINT_DEPTH_DEFAULT, 30);
        let expected = "[Ghost]\n\
                        100 (100.00%, 30)\n\
                        ├── 101 (33.33%, 10)\n\
                        │   └── 102 (0.00%, 0)\n\
                        └── 150 (66.67%, 20)\n";
        assert_eq!(rendered, expected);

        // Limited depth starts lower in the tree.
        let shallow = ghost.render(Slot(102), 1, 30);
        assert!(shallow.starts_with("[Ghost]\n101 "));
    }

    #[test]
    fn test_random_votes_keep_weights_exact() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut ghost = tree(0);
        let mut slots = vec![Slot(0)];
        for slot in 1..200u64 {
            let parent = slots[rng.gen_range(0..slots.len())];
            ghost.node_insert(Slot(slot), parent).unwrap();
            slots.push(Slot(slot));

            let voter = test_pubkey(rng.gen_range(0..16));
            let target = slots[rng.gen_range(0..slots.len())];
            ghost.replay_vote_upsert(target, voter, rng.gen_range(1..100)).unwrap();
        }
        assert_weights_exact(&ghost);

        // Head is reachable from the root through child links.
        let head = ghost.head_query().slot();
        assert!(head == ghost.root().slot() || ghost.is_ancestor(ghost.root().slot(), head));
        assert_eq!(ghost.head_query().child_count(), 0);

        // Each voter is counted exactly once at the root.
        let total: u64 = (0..16)
            .filter_map(|n| ghost.vote_query(&test_pubkey(n)))
            .map(|v| v.stake)
            .sum();
        assert_eq!(ghost.root().weight(), total);
    }
}
