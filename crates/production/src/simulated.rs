//! Simulated cluster wiring for the node binary.
//!
//! Boots a [`ReplayState`] on in-memory collaborators and feeds it a
//! seeded fork workload through the runner's channels.

use crate::collector::SlotsFileCollector;
use crate::config::{ConfigError, NodeConfig, WorkloadSettings};
use crate::runner::{RetireCredit, RunnerStopped};
use crate::signer::KeypairSigner;
use forkline_core::{Action, Blockstore, Fragment, VoteSigner};
use forkline_node::{Collaborators, ReplayError, ReplayState};
use forkline_simulation::{ForkWorkload, SimBlockstore, SimExecutor, SimStore, SimValidator};
use forkline_types::{BranchId, EpochContext, EpochSchedule, Hash, Slot, SlotBank};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// PoH parameters of the simulated cluster.
const HASHES_PER_TICK: u64 = 12_500;
const TICKS_PER_SLOT: u64 = 64;
const NS_PER_SLOT: u64 = 400_000_000;

/// Errors setting up a simulated node.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to create slots file {path}: {source}")]
    SlotsFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("boot failed: {0}")]
    Boot(#[from] ReplayError),
}

/// A booted node and the cluster that feeds it.
pub struct SimulatedNode {
    pub state: ReplayState,
    /// Messages produced at boot.
    pub boot_actions: Vec<Action>,
    pub blockstore: Arc<SimBlockstore>,
    pub workload: ForkWorkload,
}

/// Counts from feeding a workload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStats {
    pub blocks: u64,
    pub fragments: u64,
    pub gossip_votes: u64,
    /// Last generated block.
    pub head: Slot,
}

fn genesis_bank(seed: u64) -> SlotBank {
    let seed = seed.to_le_bytes();
    SlotBank::bootstrap(
        Slot(0),
        Hash::from_parts(&[b"genesis", &seed]),
        Hash::from_parts(&[b"genesis bank", &seed]),
    )
}

fn epoch_context(
    settings: &WorkloadSettings,
    validators: &[SimValidator],
    genesis: Hash,
) -> EpochContext {
    let stakes = SimValidator::epoch_stakes(validators);
    EpochContext {
        schedule: EpochSchedule::new(settings.slots_per_epoch),
        epoch: 0,
        stakes: stakes.clone(),
        next_stakes: Some(stakes),
        hashes_per_tick: HASHES_PER_TICK,
        ticks_per_slot: TICKS_PER_SLOT,
        ns_per_slot: NS_PER_SLOT,
        genesis_hash: genesis,
    }
}

/// Boot a node at genesis of a simulated cluster.
pub fn boot_simulated(config: &NodeConfig) -> Result<SimulatedNode, SetupError> {
    let settings = &config.workload;
    let bank = genesis_bank(settings.seed);
    let validators = SimValidator::generate(
        settings.validators,
        settings.seed,
        settings.stake_per_validator,
    );
    let epoch = epoch_context(settings, &validators, bank.last_blockhash);

    let blockstore = Arc::new(SimBlockstore::new(
        bank.slot,
        bank.last_blockhash,
        bank.bank_hash,
    ));
    let store = Arc::new(SimStore::new(
        BranchId::new(bank.last_blockhash, bank.slot),
        config.replay.fork_max,
    ));
    let mut collaborators = Collaborators::new(
        Arc::new(SimExecutor::new()),
        store,
        blockstore.clone(),
    );
    if let Some(keypair) = config.identity_keypair()? {
        let signer = KeypairSigner::with_derived_vote_account(keypair);
        info!(identity = %signer.identity(), "Vote signer loaded");
        collaborators = collaborators.with_signer(Arc::new(signer));
    }
    if let Some(path) = &config.slots_file {
        let collector = SlotsFileCollector::create(path).map_err(|source| SetupError::SlotsFile {
            path: path.clone(),
            source,
        })?;
        collaborators = collaborators.with_collector(Box::new(collector));
    }

    let (state, boot_actions) =
        ReplayState::boot(config.replay.clone(), collaborators, bank, epoch)?;
    let workload = ForkWorkload::new(settings.workload_config(), Slot(0), validators);

    Ok(SimulatedNode {
        state,
        boot_actions,
        blockstore,
        workload,
    })
}

/// Feed `settings.slots` generated blocks to the runner.
///
/// Each block is sent within the credit window and must be fully retired
/// before the next one is generated, since the next block carries votes on
/// this one's bank hash.
pub async fn feed_workload(
    workload: &mut ForkWorkload,
    blockstore: &SimBlockstore,
    settings: &WorkloadSettings,
    fragments: &mpsc::Sender<Fragment>,
    credit: &mut RetireCredit,
) -> Result<FeedStats, RunnerStopped> {
    let mut stats = FeedStats::default();
    let mut seq = 0;

    for _ in 0..settings.slots {
        let block = workload.next_block(blockstore);
        let batch = block.fragments(seq + 1);
        seq += batch.len() as u64;

        for fragment in batch {
            credit.wait_for_room(stats.fragments).await?;
            fragments.send(fragment).await.map_err(|_| RunnerStopped)?;
            stats.fragments += 1;
        }
        credit.wait_until_retired(stats.fragments).await?;
        stats.blocks += 1;
        stats.head = block.slot;
        debug!(slot = block.slot.0, parent = block.parent.0, "Block fed");

        if settings.gossip_votes {
            if let Some(vote) = workload.gossip_vote(blockstore) {
                seq += 1;
                fragments
                    .send(Fragment::gossip_vote(seq, vote))
                    .await
                    .map_err(|_| RunnerStopped)?;
                stats.gossip_votes += 1;
            }
        }
    }

    info!(
        blocks = stats.blocks,
        head = stats.head.0,
        root = blockstore.root().0,
        "Workload fed"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelConfig;
    use crate::runner::{ReplayRunner, RunSummary, RunnerHandle};
    use forkline_core::OutboundMessage;

    async fn run(
        config: NodeConfig,
    ) -> (RunSummary, FeedStats, Vec<OutboundMessage>, Arc<SimBlockstore>) {
        let SimulatedNode {
            state,
            boot_actions,
            blockstore,
            mut workload,
        } = boot_simulated(&config).unwrap();
        let RunnerHandle {
            fragments,
            mut messages,
            mut credit,
            thread,
        } = ReplayRunner::spawn(state, boot_actions, config.channels).unwrap();

        let consumer = tokio::spawn(async move {
            let mut all = Vec::new();
            while let Some(msg) = messages.recv().await {
                all.push(msg);
            }
            all
        });

        let stats = feed_workload(
            &mut workload,
            &blockstore,
            &config.workload,
            &fragments,
            &mut credit,
        )
        .await
        .unwrap();
        drop(fragments);

        let summary = tokio::task::spawn_blocking(move || thread.join())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let messages = consumer.await.unwrap();
        (summary, stats, messages, blockstore)
    }

    fn config(seed: u64, slots: u64) -> NodeConfig {
        let mut config = NodeConfig::default().with_seed(seed).with_slots(slots);
        config.replay = config.replay.with_worker_count(2);
        config.channels = ChannelConfig {
            fragment_depth: 2,
            message_depth: 16,
        };
        config
    }

    #[tokio::test]
    async fn test_every_block_finalizes() {
        let (summary, stats, messages, blockstore) = run(config(3, 24)).await;
        assert_eq!(stats.blocks, 24);
        assert_eq!(summary.finalized, 24);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.last_finalized.map(|(slot, _)| slot), Some(stats.head));
        assert!(summary.root > Slot(0));
        assert_eq!(blockstore.root(), summary.root);

        let executed = messages
            .iter()
            .filter(|m| m.type_name() == "SlotExecuted")
            .count();
        assert_eq!(executed, 24);
    }

    #[tokio::test]
    async fn test_same_seed_same_hashes() {
        let (a, _, _, _) = run(config(8, 12)).await;
        let (b, _, _, _) = run(config(8, 12)).await;
        assert_eq!(a.last_finalized, b.last_finalized);
        assert_eq!(a.root, b.root);
    }

    #[tokio::test]
    async fn test_votes_relayed_with_identity() {
        let mut config = config(5, 8);
        config.replay = config.replay.with_vote(true);
        config.identity_seed = Some(hex::encode([9u8; 32]));
        let (summary, stats, messages, _) = run(config).await;

        assert_eq!(summary.votes_relayed, stats.gossip_votes);
        let relayed = messages
            .iter()
            .filter(|m| matches!(m, OutboundMessage::GossipVote(_)))
            .count() as u64;
        assert_eq!(relayed, stats.gossip_votes);
    }

    #[tokio::test]
    async fn test_slots_file_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slots.txt");
        let mut config = config(2, 6);
        config.slots_file = Some(path.clone());
        let (summary, _, _, _) = run(config).await;

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count() as u64, summary.finalized);
    }
}
