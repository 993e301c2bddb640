//! Replay configuration.

use serde::Deserialize;
use std::path::PathBuf;

/// Configuration of the replay orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Fork pool size, i.e. the maximum number of blocks in flight.
    pub fork_max: usize,

    /// Maximum number of slots resident in the fork-choice tree.
    pub ghost_node_max: usize,

    /// Maximum number of validators tracked by the fork-choice tree.
    pub ghost_vote_max: usize,

    /// Execution worker threads.
    pub worker_count: usize,

    /// Re-sign and echo vote transactions received from gossip.
    pub vote: bool,

    /// Account ids per `AccountsSaved` notification.
    pub notif_accounts_max: usize,

    /// How far the fork-choice head may trail the executed slot before
    /// fork selection is skipped.
    pub head_lag_max: u64,

    /// Where to checkpoint the blockstore when a bank hash mismatch halts
    /// replay.
    pub blockstore_checkpoint: Option<PathBuf>,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            fork_max: 1024,
            ghost_node_max: 1024,
            ghost_vote_max: 65536,
            worker_count: 4,
            vote: false,
            notif_accounts_max: 32,
            head_lag_max: 32,
            blockstore_checkpoint: None,
        }
    }
}

impl ReplayConfig {
    /// Set the fork pool size.
    pub fn with_fork_max(mut self, fork_max: usize) -> Self {
        self.fork_max = fork_max;
        self
    }

    /// Set the fork-choice tree capacity.
    pub fn with_ghost_max(mut self, nodes: usize, votes: usize) -> Self {
        self.ghost_node_max = nodes;
        self.ghost_vote_max = votes;
        self
    }

    /// Set the number of execution workers.
    pub fn with_worker_count(mut self, workers: usize) -> Self {
        self.worker_count = workers;
        self
    }

    /// Enable or disable gossip vote relaying.
    pub fn with_vote(mut self, vote: bool) -> Self {
        self.vote = vote;
        self
    }

    /// Set the account batch size of `AccountsSaved` notifications.
    pub fn with_notif_accounts_max(mut self, max: usize) -> Self {
        self.notif_accounts_max = max;
        self
    }

    /// Set the blockstore checkpoint path.
    pub fn with_blockstore_checkpoint(mut self, path: impl Into<PathBuf>) -> Self {
        self.blockstore_checkpoint = Some(path.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let config = ReplayConfig::default()
            .with_fork_max(8)
            .with_ghost_max(16, 32)
            .with_vote(true)
            .with_blockstore_checkpoint("/tmp/ckpt");
        assert_eq!(config.fork_max, 8);
        assert_eq!((config.ghost_node_max, config.ghost_vote_max), (16, 32));
        assert!(config.vote);
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.blockstore_checkpoint, Some(PathBuf::from("/tmp/ckpt")));
    }
}
