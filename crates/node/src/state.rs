//! Replay orchestrator state machine.
//!
//! Consumes one fragment at a time and drives every block through
//! prepare, execute and finalize. Fork choice, the fork table and the tower
//! are only ever touched from [`ReplayState::handle`]; the worker pool sees
//! nothing but the execution context of the block being replayed.

use crate::{ReplayConfig, ReplayError};
use forkline_choreo::{
    BankHashComparator, BankHashMismatch, GhostTree, HeaviestForkTower,
    SharedBankHashComparator, Tower, GHOST_PRINT_DEPTH_DEFAULT,
};
use forkline_core::{
    Action, Blockstore, Executor, FilterReason, Fragment, FragmentKind, HandleOutcome,
    OutboundMessage, PacketType, PohMessage, RecordKey, ReplayCollector, ReplayFlags,
    ReplayNotification, StakeWeightsMessage, StateMachine, Transition, VersionedStore,
    VoteSigner,
};
use forkline_execution::{
    restore_slot_ctx, ExecutionError, ForkCheckpoint, ForkError, ForkId, ForkTable, WavePool,
};
use forkline_types::{
    BranchId, EpochContext, EpochStakes, Hash, Pubkey, Slot, SlotBank, SlotExecutionContext,
    Transaction, VoteTransaction,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn, Level};

// ═══════════════════════════════════════════════════════════════════════════
// Collaborators
// ═══════════════════════════════════════════════════════════════════════════

/// External services the orchestrator drives.
pub struct Collaborators {
    /// Transaction executor.
    pub executor: Arc<dyn Executor>,
    /// Versioned account store.
    pub store: Arc<dyn VersionedStore>,
    /// Blockstore.
    pub blockstore: Arc<dyn Blockstore>,
    /// Vote signer, required to relay gossip votes.
    pub signer: Option<Arc<dyn VoteSigner>>,
    /// Debug capture.
    pub collector: Option<Box<dyn ReplayCollector>>,
}

impl Collaborators {
    /// Create the required collaborators.
    pub fn new(
        executor: Arc<dyn Executor>,
        store: Arc<dyn VersionedStore>,
        blockstore: Arc<dyn Blockstore>,
    ) -> Self {
        Self {
            executor,
            store,
            blockstore,
            signer: None,
            collector: None,
        }
    }

    /// Attach a vote signer.
    pub fn with_signer(mut self, signer: Arc<dyn VoteSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Attach a debug collector.
    pub fn with_collector(mut self, collector: Box<dyn ReplayCollector>) -> Self {
        self.collector = Some(collector);
        self
    }
}

/// A microblock normalised across block-sourced and self-packed fragments.
struct Microblock {
    slot: Slot,
    parent_slot: Slot,
    flags: ReplayFlags,
    /// Known for block-sourced microblocks only.
    blockhash: Option<Hash>,
    txns: Vec<Transaction>,
}

impl Microblock {
    fn is_packed(&self) -> bool {
        self.flags.contains(ReplayFlags::PACKED_MICROBLOCK)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// State
// ═══════════════════════════════════════════════════════════════════════════

/// Replay orchestrator.
pub struct ReplayState {
    config: ReplayConfig,

    executor: Arc<dyn Executor>,
    store: Arc<dyn VersionedStore>,
    blockstore: Arc<dyn Blockstore>,
    signer: Option<Arc<dyn VoteSigner>>,
    collector: Option<Box<dyn ReplayCollector>>,

    /// Chain tips under execution, keyed by tip slot.
    forks: ForkTable,

    /// Voting policy, owning the fork-choice tree.
    tower: Box<dyn Tower>,

    /// Bank hash agreement, shared with epoch bookkeeping.
    bank_hash_cmp: SharedBankHashComparator,

    /// Worker pool for transaction waves.
    pool: WavePool,

    /// Context of the epoch replay is currently in.
    epoch: Arc<EpochContext>,

    /// Fork selected by the tower after the last finalized block.
    reset_slot: Slot,
    reset_blockhash: Hash,

    /// Whether the PoH init message was sent.
    poh_init_done: bool,

    now: Duration,
}

impl std::fmt::Debug for ReplayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayState")
            .field("root", &self.tower.root())
            .field("frontier", &self.forks.frontier_len())
            .field("reset_slot", &self.reset_slot)
            .field("epoch", &self.epoch.epoch)
            .finish_non_exhaustive()
    }
}

impl ReplayState {
    /// Boot replay on top of the snapshot (or genesis) bank.
    ///
    /// The bank's slot must already be processed in the blockstore and its
    /// branch must exist in the account store. Returns the stake-weight
    /// snapshots to publish.
    pub fn boot(
        config: ReplayConfig,
        collaborators: Collaborators,
        bank: SlotBank,
        epoch: EpochContext,
    ) -> Result<(Self, Vec<Action>), ReplayError> {
        let tower = HeaviestForkTower::new(bank.slot, config.ghost_node_max, config.ghost_vote_max);
        Self::boot_with_tower(config, collaborators, Box::new(tower), bank, epoch)
    }

    /// Boot with a custom voting policy rooted at the bank's slot.
    pub fn boot_with_tower(
        config: ReplayConfig,
        collaborators: Collaborators,
        mut tower: Box<dyn Tower>,
        bank: SlotBank,
        epoch: EpochContext,
    ) -> Result<(Self, Vec<Action>), ReplayError> {
        let Collaborators {
            executor,
            store,
            blockstore,
            signer,
            collector,
        } = collaborators;
        let root = bank.slot;
        let epoch = Arc::new(epoch);

        let blockhash = blockstore
            .block_hash(root)
            .ok_or(ExecutionError::MissingBlockHash(root))?;
        let branch = BranchId::new(blockhash, root);
        if !store.exists(&branch) {
            return Err(ExecutionError::MissingBranch(branch).into());
        }
        store.put(&branch, RecordKey::SlotBank, bank.encode()?)?;

        let mut boot_bank = bank.clone();
        boot_bank.reset_for_child();
        let mut forks = ForkTable::new(config.fork_max);
        let id = forks.acquire(
            root,
            SlotExecutionContext::new(boot_bank, branch, epoch.clone()),
        )?;
        forks.frontier_insert(id)?;

        tower.epoch_update(&epoch);
        let bank_hash_cmp = BankHashComparator::new(root, epoch.total_stake()).shared();
        let pool = WavePool::new(config.worker_count)?;

        info!(
            root = root.0,
            bank_hash = %bank.bank_hash,
            epoch = epoch.epoch,
            total_stake = epoch.total_stake(),
            workers = pool.workers(),
            "Replay booted"
        );

        let actions = stake_weight_actions(&epoch);
        let state = Self {
            config,
            executor,
            store,
            blockstore,
            signer,
            collector,
            forks,
            tower,
            bank_hash_cmp,
            pool,
            epoch,
            reset_slot: root,
            reset_blockhash: bank.last_blockhash,
            poh_init_done: false,
            now: Duration::ZERO,
        };
        Ok((state, actions))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════

    /// Configuration.
    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    /// Current root.
    pub fn root(&self) -> Slot {
        self.tower.root()
    }

    /// Fork-choice tree.
    pub fn ghost(&self) -> &GhostTree {
        self.tower.ghost()
    }

    /// Fork table.
    pub fn forks(&self) -> &ForkTable {
        &self.forks
    }

    /// Bank hash comparator.
    pub fn bank_hash_cmp(&self) -> SharedBankHashComparator {
        self.bank_hash_cmp.clone()
    }

    /// Highest slot known to agree with the cluster.
    pub fn watermark(&self) -> Slot {
        self.bank_hash_cmp.lock().watermark()
    }

    /// Active epoch context.
    pub fn epoch(&self) -> &Arc<EpochContext> {
        &self.epoch
    }

    /// Slot and blockhash of the fork selected for block production.
    pub fn reset_fork(&self) -> (Slot, Hash) {
        (self.reset_slot, self.reset_blockhash)
    }

    /// Whether the PoH init message was sent.
    pub fn is_poh_init_done(&self) -> bool {
        self.poh_init_done
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Gossip votes
    // ═══════════════════════════════════════════════════════════════════════

    fn on_gossip_vote(&mut self, payload: &[u8]) -> Result<Transition, ReplayError> {
        let mut vote = match VoteTransaction::parse(payload) {
            Ok(vote) => vote,
            Err(e) => {
                warn!(error = %e, size = payload.len(), "Failed to parse gossip vote");
                return Ok(Transition::new(vec![], HandleOutcome::VoteDropped));
            }
        };

        let last_slot = vote.message.vote.last_slot();
        if let Some(slot) = last_slot {
            let voter = vote.message.vote_account;
            let stake = self.epoch.stakes.stake_of(&voter);
            if stake > 0 && self.tower.ghost().contains(slot) {
                self.tower.ghost_mut().gossip_vote_upsert(slot, voter, stake)?;
            }
        }

        let signer = match &self.signer {
            Some(signer) if self.config.vote => signer.clone(),
            _ => return Ok(Transition::new(vec![], HandleOutcome::VoteDropped)),
        };

        let identity = signer.identity();
        vote.message.vote.timestamp = Some(self.now.as_secs() as i64);
        vote.message.node_identity = identity;
        vote.message.authority = identity;
        vote.message.vote_account = signer.vote_account();
        vote.resign(|_, message| signer.sign(message))?;
        let bytes = vote.serialize()?;

        let slot = last_slot.unwrap_or(Slot::GENESIS);
        debug!(slot = slot.0, size = bytes.len(), "Relaying gossip vote");
        Ok(Transition::new(
            vec![Action::Publish(OutboundMessage::GossipVote(bytes))],
            HandleOutcome::VoteRelayed { slot },
        ))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Microblocks
    // ═══════════════════════════════════════════════════════════════════════

    fn on_microblock(&mut self, seq: u64, mb: Microblock) -> Result<Transition, ReplayError> {
        let mut actions = Vec::new();
        let (outcome, forward) = self.replay_microblock(&mut actions, &mb)?;
        if outcome.is_deferred() {
            return Ok(Transition::new(actions, outcome));
        }
        actions.push(Action::BatchRetired { seq });

        if forward {
            self.maybe_init_poh(&mut actions, mb.flags);
            if self.poh_init_done
                && !mb.flags.contains(ReplayFlags::FINISHED_BLOCK)
                && mb
                    .flags
                    .intersects(ReplayFlags::MICROBLOCK | ReplayFlags::PACKED_MICROBLOCK)
            {
                actions.push(Action::poh(PohMessage::Microblock {
                    slot: mb.slot,
                    flags: mb.flags,
                    txns: mb.txns,
                    trailer_hash: self.reset_blockhash,
                }));
            }
        }
        Ok(Transition::new(actions, outcome))
    }

    /// Returns the outcome and whether the microblock continues downstream.
    fn replay_microblock(
        &mut self,
        actions: &mut Vec<Action>,
        mb: &Microblock,
    ) -> Result<(HandleOutcome, bool), ReplayError> {
        let slot = mb.slot;
        if self.blockstore.is_processed(slot) {
            debug!(slot = slot.0, "Slot already processed");
            return Ok((
                HandleOutcome::Filtered {
                    slot,
                    reason: FilterReason::AlreadyProcessed,
                },
                false,
            ));
        }

        let (id, prepared, boundary) = match self.forks.frontier_query(slot) {
            Some(id) => (id, false, false),
            None => {
                let parent_busy = self
                    .forks
                    .frontier_query(mb.parent_slot)
                    .and_then(|id| self.forks.get(id))
                    .is_some_and(|fork| fork.executing);
                if parent_busy {
                    warn!(
                        slot = slot.0,
                        parent_slot = mb.parent_slot.0,
                        "Parent fork still executing, deferring"
                    );
                    return Ok((
                        HandleOutcome::Deferred {
                            slot,
                            parent_slot: mb.parent_slot,
                        },
                        false,
                    ));
                }
                let (id, boundary) = self.prepare_fork(mb)?;
                (id, true, boundary)
            }
        };

        let started = Instant::now();
        let fork = self.forks.get_mut(id).ok_or(ForkError::StaleFork(id))?;
        let batch = self
            .pool
            .execute(&*self.executor, &*self.store, &mut fork.ctx, &mb.txns)?;
        fork.landed_votes.extend(batch.votes.iter().copied());
        debug!(
            slot = slot.0,
            txns = mb.txns.len(),
            executed = batch.executed,
            waves = batch.waves,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Microblock executed"
        );

        if let Some(failure) = batch.failure {
            let speculative = mb.is_packed();
            if speculative && !prepared {
                warn!(
                    slot = slot.0,
                    index = failure.index,
                    error = %failure.error,
                    "Speculative microblock failed, keeping block"
                );
                return Ok((HandleOutcome::ExecutionFailed { slot, speculative }, true));
            }
            warn!(
                slot = slot.0,
                index = failure.index,
                error = %failure.error,
                speculative,
                "Block invalid"
            );
            self.abandon(actions, id, !prepared)?;
            return Ok((HandleOutcome::ExecutionFailed { slot, speculative }, false));
        }
        if boundary {
            actions.extend(stake_weight_actions(&self.epoch));
        }

        if mb.flags.contains(ReplayFlags::FINISHED_BLOCK) {
            let blockhash = mb.blockhash.unwrap_or(Hash::ZERO);
            let outcome = self.finalize(actions, id, blockhash, mb)?;
            let forward = matches!(outcome, HandleOutcome::Finalized { .. });
            return Ok((outcome, forward));
        }
        Ok((HandleOutcome::Executed { slot }, true))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Prepare
    // ═══════════════════════════════════════════════════════════════════════

    /// Locate or restore the parent fork and move it onto `mb.slot`.
    ///
    /// Also returns whether the block opens an epoch, in which case the
    /// stake weights are published once its first microblock executes.
    fn prepare_fork(&mut self, mb: &Microblock) -> Result<(ForkId, bool), ReplayError> {
        let started = Instant::now();
        let (slot, parent) = (mb.slot, mb.parent_slot);

        let parent_id = match self.forks.frontier_query(parent) {
            Some(id) => id,
            None => {
                let ctx = restore_slot_ctx(
                    &*self.blockstore,
                    &*self.store,
                    parent,
                    self.epoch.clone(),
                )
                .map_err(|source| {
                    error!(slot = slot.0, parent_slot = parent.0, error = %source, "Missing ancestor");
                    ReplayError::MissingAncestor {
                        slot,
                        parent,
                        source,
                    }
                })?;
                let id = self.forks.acquire(parent, ctx)?;
                self.forks.frontier_insert(id)?;
                id
            }
        };

        let branch = match mb.blockhash {
            Some(blockhash) => BranchId::new(blockhash, slot),
            None => BranchId::speculative(slot),
        };
        let parent_fork = self
            .forks
            .get(parent_id)
            .ok_or(ForkError::StaleFork(parent_id))?;
        let checkpoint = ForkCheckpoint {
            bank: parent_fork.ctx.bank.clone(),
            branch: parent_fork.ctx.branch,
            epoch: parent_fork.ctx.epoch.clone(),
            superseded_epoch: None,
        };
        self.store.prepare(&checkpoint.branch, branch)?;

        let id = self.forks.advance(parent, slot)?;
        let fork = self.forks.get_mut(id).ok_or(ForkError::StaleFork(id))?;
        fork.executing = true;
        fork.ctx.bank.prev_slot = fork.ctx.bank.slot;
        fork.ctx.bank.slot = slot;
        fork.ctx.branch = branch;
        fork.landed_votes.clear();
        fork.checkpoint = Some(checkpoint);

        self.executor
            .publish_old_branches(&fork.ctx, &*self.store)
            .map_err(|source| ReplayError::Executor {
                stage: "publish_old_branches",
                slot,
                source,
            })?;

        let boundary = slot != Slot::GENESIS && self.epoch.schedule.is_boundary(parent, slot);
        if boundary {
            let new_epoch = self.epoch.schedule.epoch_of(slot);
            if new_epoch != self.epoch.epoch {
                let rolled = Arc::new(self.executor.epoch_rollover(&self.epoch, new_epoch));
                let superseded = std::mem::replace(&mut self.epoch, rolled);
                if let Some(checkpoint) = fork.checkpoint.as_mut() {
                    checkpoint.superseded_epoch = Some(superseded);
                }
                self.tower.epoch_update(&self.epoch);
                self.bank_hash_cmp
                    .lock()
                    .set_total_stake(self.epoch.total_stake());
                info!(
                    slot = slot.0,
                    epoch = new_epoch,
                    total_stake = self.epoch.total_stake(),
                    "Epoch rollover"
                );
            }
            fork.ctx.epoch = self.epoch.clone();
        }

        self.executor
            .prepare_block(&fork.ctx, &*self.store)
            .map_err(|source| ReplayError::Executor {
                stage: "prepare",
                slot,
                source,
            })?;

        if let Some(collector) = self.collector.as_mut() {
            collector.on_block_prepare(slot, parent);
        }

        debug!(
            slot = slot.0,
            parent_slot = parent.0,
            branch = %branch,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Fork prepared"
        );
        Ok((id, boundary))
    }

    /// Roll back the block executing on fork `id` and reinstate its parent.
    ///
    /// An epoch rollover the block triggered is undone as well. When its
    /// stake weights already went out (`announced`), the restored epoch's
    /// weights are published again.
    fn abandon(
        &mut self,
        actions: &mut Vec<Action>,
        id: ForkId,
        announced: bool,
    ) -> Result<(), ReplayError> {
        let fork = self.forks.get_mut(id).ok_or(ForkError::StaleFork(id))?;
        let slot = fork.slot();
        let parent = fork.ctx.parent_slot();
        let checkpoint = fork.checkpoint.take();
        let block_epoch = fork.ctx.epoch.clone();
        self.store.cancel(&fork.ctx.branch)?;

        let Some(ForkCheckpoint {
            bank,
            branch,
            epoch,
            superseded_epoch,
        }) = checkpoint
        else {
            self.forks.release(id);
            debug!(slot = slot.0, "Fork released");
            return Ok(());
        };

        if let Some(superseded) = superseded_epoch {
            if Arc::ptr_eq(&self.epoch, &block_epoch) {
                info!(
                    slot = slot.0,
                    epoch = superseded.epoch,
                    abandoned_epoch = block_epoch.epoch,
                    "Epoch rollover undone"
                );
                self.epoch = superseded;
                self.tower.epoch_update(&self.epoch);
                self.bank_hash_cmp
                    .lock()
                    .set_total_stake(self.epoch.total_stake());
                if announced {
                    actions.extend(stake_weight_actions(&self.epoch));
                }
            }
        }

        match self.forks.advance(slot, parent) {
            Ok(id) => {
                let fork = self.forks.get_mut(id).ok_or(ForkError::StaleFork(id))?;
                fork.ctx.bank = bank;
                fork.ctx.branch = branch;
                fork.ctx.epoch = epoch;
                fork.executing = false;
                fork.landed_votes.clear();
            }
            // The parent was restored for a sibling in the meantime.
            Err(ForkError::DuplicateFrontier(_)) => {
                self.forks.release(id);
            }
            Err(e) => return Err(e.into()),
        }
        debug!(slot = slot.0, parent_slot = parent.0, "Fork abandoned");
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Finalize
    // ═══════════════════════════════════════════════════════════════════════

    fn finalize(
        &mut self,
        actions: &mut Vec<Action>,
        id: ForkId,
        blockhash: Hash,
        mb: &Microblock,
    ) -> Result<HandleOutcome, ReplayError> {
        let started = Instant::now();
        let fork = self.forks.get_mut(id).ok_or(ForkError::StaleFork(id))?;
        let slot = fork.slot();
        fork.ctx.bank.poh = blockhash;
        fork.ctx.bank.last_blockhash = blockhash;

        let summary = match self.executor.finalize_block(&fork.ctx, &*self.store) {
            Ok(summary) => summary,
            Err(e) => {
                warn!(slot = slot.0, error = %e, "Block finalize failed");
                self.abandon(actions, id, true)?;
                return Ok(HandleOutcome::ExecutionFailed {
                    slot,
                    speculative: false,
                });
            }
        };
        let bank_hash = summary.bank_hash;
        fork.ctx.bank.bank_hash = bank_hash;

        // Accounts written by the block, before the final branch is stacked.
        let accounts: Vec<Pubkey> = self
            .store
            .branch_records(&fork.ctx.branch)?
            .into_iter()
            .filter_map(|key| match key {
                RecordKey::Account(account) => Some(account),
                RecordKey::SlotBank => None,
            })
            .collect();
        if fork.ctx.branch.is_speculative() {
            let branch = BranchId::new(blockhash, slot);
            self.store.prepare(&fork.ctx.branch, branch)?;
            fork.ctx.branch = branch;
        }
        self.store
            .put(&fork.ctx.branch, RecordKey::SlotBank, fork.ctx.bank.encode()?)?;

        let branch = fork.ctx.branch;
        let parent = fork.ctx.parent_slot();
        for chunk in accounts.chunks(self.config.notif_accounts_max.max(1)) {
            actions.push(Action::notify(ReplayNotification::AccountsSaved {
                branch,
                accounts: chunk.to_vec(),
            }));
        }
        actions.push(Action::notify(ReplayNotification::SlotExecuted {
            slot,
            parent,
            root: self.blockstore.root(),
            bank_hash,
        }));

        self.blockstore
            .mark_processed(slot, parent, blockhash, bank_hash)?;
        fork.executing = false;
        fork.checkpoint = None;
        if let Some(collector) = self.collector.as_mut() {
            collector.on_block_finalize(slot, bank_hash);
        }

        let stakes = &fork.ctx.epoch.stakes;
        let observations: Vec<_> = fork
            .landed_votes
            .iter()
            .map(|v| (v.slot, v.hash, v.vote_account, stakes.stake_of(&v.vote_account)))
            .filter(|(.., stake)| *stake > 0)
            .collect();

        let new_root = self.tower.fork_update(fork)?;
        self.select_reset_fork(actions, slot, mb);

        if tracing::enabled!(Level::DEBUG) {
            let ghost = self.tower.ghost();
            debug!(
                "{}",
                ghost.render(slot, GHOST_PRINT_DEPTH_DEFAULT, self.tower.total_stake())
            );
        }
        if let Some(root) = new_root {
            self.publish_root(root)?;
        }

        if let Some(fork) = self.forks.get_mut(id) {
            fork.ctx.bank.collected_fees = 0;
            fork.ctx.bank.collected_rent = 0;
            fork.ctx.bank.signature_count = 0;
        }

        let scanned = {
            let mut cmp = self.bank_hash_cmp.lock();
            if let Err(stale) = cmp.insert(slot, bank_hash, true, 0) {
                error!(
                    slot = slot.0,
                    bank_hash = %bank_hash,
                    watermark = stale.watermark.0,
                    "Bank hash finalized behind the watermark, not compared"
                );
            }
            for (voted, hash, voter, stake) in observations {
                cmp.observe(voted, hash, voter, stake);
            }
            cmp.scan(slot)
        };
        if let Err(mismatch) = scanned {
            return Err(self.halt_on_mismatch(mismatch));
        }

        debug!(
            slot = slot.0,
            bank_hash = %bank_hash,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Block finalized"
        );
        Ok(HandleOutcome::Finalized { slot, bank_hash })
    }

    /// Ask the tower for the fork to build on and hand it to PoH.
    fn select_reset_fork(&mut self, actions: &mut Vec<Action>, slot: Slot, mb: &Microblock) {
        let head = self.tower.ghost().head_query().slot();
        if head.0.saturating_add(self.config.head_lag_max) < slot.0 {
            warn!(
                slot = slot.0,
                head = head.0,
                "Fork choice head too far behind, not resetting"
            );
            return;
        }
        let Some(reset) = self
            .tower
            .reset_fork_select(&self.forks)
            .and_then(|id| self.forks.get(id))
        else {
            warn!(slot = slot.0, head = head.0, "No reset fork selected");
            return;
        };
        self.reset_slot = reset.slot();
        self.reset_blockhash = reset.ctx.bank.last_blockhash;

        if self.poh_init_done {
            actions.push(Action::poh(PohMessage::Microblock {
                slot: self.reset_slot,
                flags: mb.flags,
                txns: mb.txns.clone(),
                trailer_hash: self.reset_blockhash,
            }));
        }
    }

    /// Advance every store to `root`.
    fn publish_root(&mut self, root: Slot) -> Result<(), ReplayError> {
        let ghost = self.tower.ghost();
        let descends = |slot: Slot| slot == root || ghost.is_ancestor(root, slot);
        let doomed: Vec<ForkId> = self
            .forks
            .frontier()
            .into_iter()
            .filter(|(slot, id)| {
                if ghost.contains(*slot) {
                    return !descends(*slot);
                }
                // Still executing: judge by its parent.
                self.forks
                    .get(*id)
                    .map_or(true, |fork| !descends(fork.ctx.parent_slot()))
            })
            .map(|(_, id)| id)
            .collect();
        let released = doomed.len();
        for id in doomed {
            self.forks.release(id);
        }

        let blockhash = self
            .blockstore
            .block_hash(root)
            .ok_or(ExecutionError::MissingBlockHash(root))?;
        let branches = self.store.publish(&BranchId::new(blockhash, root))?;
        let blocks = self.blockstore.publish(root)?;
        let nodes = self.tower.ghost_mut().publish(root)?;
        let entries = self.bank_hash_cmp.lock().prune(root);

        info!(
            root = root.0,
            released,
            branches,
            blocks,
            nodes,
            entries,
            "Root published"
        );
        Ok(())
    }

    fn halt_on_mismatch(&mut self, mismatch: BankHashMismatch) -> ReplayError {
        if let Some(collector) = self.collector.as_mut() {
            if let Err(e) = collector.flush() {
                warn!(error = %e, "Failed to flush replay capture");
            }
        }
        if let Some(path) = &self.config.blockstore_checkpoint {
            match self.blockstore.checkpoint(path) {
                Ok(()) => info!(path = %path.display(), "Blockstore checkpointed"),
                Err(e) => warn!(path = %path.display(), error = %e, "Blockstore checkpoint failed"),
            }
        }
        error!(
            slot = mismatch.slot.0,
            local = %mismatch.local,
            corroborated = %mismatch.corroborated,
            "Bank hash mismatch, halting replay"
        );
        ReplayError::BankHashMismatch {
            slot: mismatch.slot,
            local: mismatch.local,
            corroborated: mismatch.corroborated,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // PoH
    // ═══════════════════════════════════════════════════════════════════════

    fn maybe_init_poh(&mut self, actions: &mut Vec<Action>, flags: ReplayFlags) {
        if self.poh_init_done || flags.contains(ReplayFlags::CATCHING_UP) {
            return;
        }
        let epoch = &self.epoch;
        actions.push(Action::poh(PohMessage::Init {
            hashcnt_per_tick: epoch.hashes_per_tick,
            ticks_per_slot: epoch.ticks_per_slot,
            hashcnt_duration_ns: epoch.hashcnt_duration_ns(),
            last_entry_hash: self.reset_blockhash,
            tick_height: self.reset_slot.0 * epoch.ticks_per_slot,
        }));
        self.poh_init_done = true;
        info!(
            reset_slot = self.reset_slot.0,
            last_entry_hash = %self.reset_blockhash,
            "PoH init sent"
        );
    }
}

/// Stake-weight snapshots of the active epoch and, when known, the next.
fn stake_weight_actions(epoch: &EpochContext) -> Vec<Action> {
    let snapshot = |number: u64, stakes: &EpochStakes| {
        let weights = stakes.weights_by_node();
        Action::stake_weights(StakeWeightsMessage {
            epoch: number,
            staked_count: weights.len(),
            start_slot: epoch.schedule.epoch_first_slot(number),
            slot_count: epoch.schedule.slots_per_epoch(),
            weights,
        })
    };
    let mut actions = vec![snapshot(epoch.epoch, &epoch.stakes)];
    if let Some(next) = epoch.next_stakes.as_ref().filter(|s| !s.is_empty()) {
        actions.push(snapshot(epoch.epoch + 1, next));
    }
    actions
}

// ═══════════════════════════════════════════════════════════════════════════
// StateMachine
// ═══════════════════════════════════════════════════════════════════════════

impl StateMachine for ReplayState {
    type Error = ReplayError;

    fn handle(&mut self, fragment: Fragment) -> Result<Transition, ReplayError> {
        if let Err(e) = fragment.validate() {
            error!(error = %e, "Malformed fragment");
            return Err(e.into());
        }

        let seq = fragment.seq;
        match fragment.kind {
            FragmentKind::GossipVote(payload) => self.on_gossip_vote(&payload),
            FragmentKind::BlockMicroblock {
                tag,
                parent_slot,
                blockhash,
                txns,
            } => self.on_microblock(
                seq,
                Microblock {
                    slot: tag.slot,
                    parent_slot,
                    flags: tag.flags,
                    blockhash: Some(blockhash),
                    txns,
                },
            ),
            FragmentKind::PackedMicroblock {
                slot,
                packet_type,
                txns,
                trailer,
            } => {
                if packet_type != PacketType::Microblock {
                    warn!(slot = slot.0, ?packet_type, "Unsupported packet type");
                    return Ok(Transition::new(
                        vec![Action::BatchRetired { seq }],
                        HandleOutcome::Filtered {
                            slot,
                            reason: FilterReason::UnsupportedPacket,
                        },
                    ));
                }
                self.on_microblock(
                    seq,
                    Microblock {
                        slot,
                        parent_slot: trailer.bank,
                        flags: ReplayFlags::PACKED_MICROBLOCK,
                        blockhash: None,
                        txns,
                    },
                )
            }
        }
    }

    fn set_time(&mut self, now: Duration) {
        self.now = now;
    }

    fn now(&self) -> Duration {
        self.now
    }
}
