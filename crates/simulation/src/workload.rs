//! Seeded fork workload.
//!
//! Generates a stream of blocks that mostly extend the latest block and
//! occasionally fork off one of its recent ancestors. Every block carries
//! vote transactions from the simulated validators for its parent, using
//! the bank hash replay computed for it, so fork choice and bank hash
//! agreement see realistic traffic.

use forkline_core::{Blockstore, Fragment, ReplayFlags};
use forkline_types::{
    EpochStakes, Hash, Keypair, Pubkey, Slot, Transaction, VoteAccountStake, VoteMessage,
    VoteStateUpdate, VoteTransaction,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use tracing::trace;

/// Workload parameters.
#[derive(Debug, Clone)]
pub struct WorkloadConfig {
    /// RNG seed.
    pub seed: u64,
    /// Probability that a block forks off an ancestor of the latest block.
    pub fork_probability: f64,
    /// Probability that a slot is skipped.
    pub skip_probability: f64,
    /// Microblocks per block.
    pub microblocks_per_block: usize,
    /// Plain transactions per microblock.
    pub txns_per_microblock: usize,
    /// Size of the account space.
    pub accounts: u8,
    /// How many ancestors behind its vote a validator's tower root sits.
    pub vote_root_depth: usize,
    /// Flag blocks as catching up (suppresses the leader pipeline init).
    pub catching_up: bool,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            fork_probability: 0.1,
            skip_probability: 0.05,
            microblocks_per_block: 2,
            txns_per_microblock: 8,
            accounts: 32,
            vote_root_depth: 4,
            catching_up: false,
        }
    }
}

impl WorkloadConfig {
    /// Set the seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the fork probability.
    pub fn with_fork_probability(mut self, p: f64) -> Self {
        self.fork_probability = p;
        self
    }
}

/// A simulated validator.
#[derive(Debug, Clone)]
pub struct SimValidator {
    /// Identity and vote authority.
    pub keypair: Keypair,
    /// Vote account.
    pub vote_account: Pubkey,
    /// Stake.
    pub stake: u64,
}

impl SimValidator {
    /// Deterministically generate `count` validators with equal stake.
    pub fn generate(count: usize, seed: u64, stake: u64) -> Vec<Self> {
        (0..count)
            .map(|i| {
                let mut key_seed = [0u8; 32];
                key_seed[..8].copy_from_slice(&seed.to_le_bytes());
                key_seed[8..16].copy_from_slice(&(i as u64).to_le_bytes());
                let keypair = Keypair::from_seed(&key_seed);
                let vote_account = Pubkey(Hash::from_parts(&[b"vote", &key_seed]).to_bytes());
                Self {
                    keypair,
                    vote_account,
                    stake,
                }
            })
            .collect()
    }

    /// Epoch stakes of a validator set.
    pub fn epoch_stakes(validators: &[SimValidator]) -> EpochStakes {
        EpochStakes::new(
            validators
                .iter()
                .map(|v| VoteAccountStake {
                    vote_account: v.vote_account,
                    node_identity: v.keypair.pubkey(),
                    stake: v.stake,
                })
                .collect(),
        )
    }

    /// Signed vote transaction for `slot`.
    pub fn vote(&self, slot: Slot, hash: Hash, root: Option<Slot>) -> VoteTransaction {
        let mut txn = VoteTransaction {
            signatures: Vec::new(),
            message: VoteMessage {
                node_identity: self.keypair.pubkey(),
                vote_account: self.vote_account,
                authority: self.keypair.pubkey(),
                recent_blockhash: hash,
                vote: VoteStateUpdate {
                    root,
                    slots: vec![slot],
                    hash,
                    timestamp: None,
                },
            },
        };
        // The message is plain data; encoding it cannot fail.
        let _ = txn.resign(|_, msg| self.keypair.sign(msg));
        txn
    }
}

/// A generated block.
#[derive(Debug, Clone)]
pub struct SimBlock {
    /// Slot.
    pub slot: Slot,
    /// Parent slot.
    pub parent: Slot,
    /// Blockhash.
    pub blockhash: Hash,
    /// Transactions, per microblock.
    pub microblocks: Vec<Vec<Transaction>>,
    /// Catching-up flag.
    pub catching_up: bool,
}

impl SimBlock {
    /// Block-sourced fragments of this block, numbered from `first_seq`.
    /// The last one is flagged as finishing the block.
    pub fn fragments(&self, first_seq: u64) -> Vec<Fragment> {
        let count = self.microblocks.len();
        self.microblocks
            .iter()
            .enumerate()
            .map(|(i, txns)| {
                let mut flags = ReplayFlags::MICROBLOCK;
                if i + 1 == count {
                    flags |= ReplayFlags::FINISHED_BLOCK;
                }
                if self.catching_up {
                    flags |= ReplayFlags::CATCHING_UP;
                }
                Fragment::block(
                    first_seq + i as u64,
                    self.slot,
                    flags,
                    self.parent,
                    self.blockhash,
                    txns.clone(),
                )
            })
            .collect()
    }
}

/// Seeded block generator.
pub struct ForkWorkload {
    config: WorkloadConfig,
    rng: ChaCha8Rng,
    validators: Vec<SimValidator>,
    parents: HashMap<Slot, Slot>,
    head: Slot,
    next_slot: Slot,
}

impl ForkWorkload {
    /// Create a workload building on `root`.
    pub fn new(config: WorkloadConfig, root: Slot, validators: Vec<SimValidator>) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self {
            config,
            rng,
            validators,
            parents: HashMap::new(),
            head: root,
            next_slot: root.next(),
        }
    }

    /// Simulated validators.
    pub fn validators(&self) -> &[SimValidator] {
        &self.validators
    }

    /// Most recently generated block.
    pub fn head(&self) -> Slot {
        self.head
    }

    fn ancestor(&self, slot: Slot, hops: usize) -> Option<Slot> {
        let mut curr = slot;
        for _ in 0..hops {
            curr = *self.parents.get(&curr)?;
        }
        Some(curr)
    }

    fn pubkey(&self, n: u8) -> Pubkey {
        Pubkey(Hash::from_parts(&[b"account", &[n]]).to_bytes())
    }

    /// Generate the next block. Vote targets are looked up in `blockstore`,
    /// so blocks should be generated after their parent was replayed.
    pub fn next_block(&mut self, blockstore: &dyn Blockstore) -> SimBlock {
        let parent = if self.rng.gen_bool(self.config.fork_probability) {
            let hops = self.rng.gen_range(1..=2);
            self.ancestor(self.head, hops).unwrap_or(self.head)
        } else {
            self.head
        };

        if self.rng.gen_bool(self.config.skip_probability) {
            self.next_slot = self.next_slot.next();
        }
        let slot = self.next_slot;
        self.next_slot = slot.next();
        self.parents.insert(slot, parent);
        self.head = slot;

        let blockhash = Hash::from_parts(&[
            b"sim block",
            &slot.0.to_le_bytes(),
            &parent.0.to_le_bytes(),
            &self.config.seed.to_le_bytes(),
        ]);

        let mut microblocks = Vec::with_capacity(self.config.microblocks_per_block.max(1));
        let mut first = self.votes_for(parent, blockstore);
        for _ in 0..self.config.microblocks_per_block.max(1) {
            let mut txns = std::mem::take(&mut first);
            for _ in 0..self.config.txns_per_microblock {
                let accounts = self.config.accounts.max(2);
                let w = self.rng.gen_range(0..accounts);
                let r = self.rng.gen_range(0..accounts);
                let payload = self.rng.gen::<u64>().to_le_bytes().to_vec();
                txns.push(Transaction::new(
                    1,
                    vec![self.pubkey(w)],
                    vec![self.pubkey(r)],
                    payload,
                ));
            }
            microblocks.push(txns);
        }

        trace!(slot = slot.0, parent = parent.0, "Generated block");
        SimBlock {
            slot,
            parent,
            blockhash,
            microblocks,
            catching_up: self.config.catching_up,
        }
    }

    fn votes_for(&self, slot: Slot, blockstore: &dyn Blockstore) -> Vec<Transaction> {
        let Some(hash) = blockstore.bank_hash(slot) else {
            return Vec::new();
        };
        let root = self.ancestor(slot, self.config.vote_root_depth);
        self.validators
            .iter()
            .filter_map(|v| {
                let payload = v.vote(slot, hash, root).serialize().ok()?;
                Some(Transaction::new(2, vec![v.vote_account], vec![], payload))
            })
            .collect()
    }

    /// A gossip vote from a random validator for the latest replayed block.
    pub fn gossip_vote(&mut self, blockstore: &dyn Blockstore) -> Option<Vec<u8>> {
        if self.validators.is_empty() {
            return None;
        }
        let hash = blockstore.bank_hash(self.head)?;
        let idx = self.rng.gen_range(0..self.validators.len());
        let root = self.ancestor(self.head, self.config.vote_root_depth);
        self.validators[idx]
            .vote(self.head, hash, root)
            .serialize()
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SimBlockstore;
    use forkline_core::FragmentKind;

    fn blockstore() -> SimBlockstore {
        SimBlockstore::new(Slot(0), Hash::ZERO, Hash::from_bytes(b"genesis bank"))
    }

    #[test]
    fn test_same_seed_same_blocks() {
        let bs = blockstore();
        let validators = SimValidator::generate(3, 1, 100);
        let mut a = ForkWorkload::new(WorkloadConfig::default().with_seed(9), Slot(0), validators.clone());
        let mut b = ForkWorkload::new(WorkloadConfig::default().with_seed(9), Slot(0), validators);
        for _ in 0..20 {
            let (x, y) = (a.next_block(&bs), b.next_block(&bs));
            assert_eq!((x.slot, x.parent, x.blockhash), (y.slot, y.parent, y.blockhash));
            assert_eq!(x.microblocks, y.microblocks);
        }
    }

    #[test]
    fn test_first_block_votes_for_root() {
        let bs = blockstore();
        let validators = SimValidator::generate(3, 1, 100);
        let mut workload = ForkWorkload::new(WorkloadConfig::default(), Slot(0), validators);
        let block = workload.next_block(&bs);
        assert_eq!(block.parent, Slot(0));

        let votes: Vec<_> = block.microblocks[0]
            .iter()
            .filter_map(|t| VoteTransaction::parse(&t.payload).ok())
            .collect();
        assert_eq!(votes.len(), 3);
        assert!(votes.iter().all(|v| v.verify()));
        assert!(votes
            .iter()
            .all(|v| v.message.vote.last_slot() == Some(Slot(0))));
    }

    #[test]
    fn test_fragments_flag_last_microblock() {
        let bs = blockstore();
        let mut workload = ForkWorkload::new(WorkloadConfig::default(), Slot(0), vec![]);
        let block = workload.next_block(&bs);
        let fragments = block.fragments(10);
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].seq, 10);

        let flags: Vec<ReplayFlags> = fragments
            .iter()
            .map(|f| match &f.kind {
                FragmentKind::BlockMicroblock { tag, .. } => tag.flags,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(flags[0], ReplayFlags::MICROBLOCK);
        assert_eq!(flags[1], ReplayFlags::MICROBLOCK | ReplayFlags::FINISHED_BLOCK);
    }

    #[test]
    fn test_stakes_match_validators() {
        let validators = SimValidator::generate(4, 3, 25);
        let stakes = SimValidator::epoch_stakes(&validators);
        assert_eq!(stakes.total_stake(), 100);
        assert_eq!(stakes.stake_of(&validators[2].vote_account), 25);
    }
}
