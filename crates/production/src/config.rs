//! Node configuration, loaded from TOML.

use forkline_node::ReplayConfig;
use forkline_simulation::WorkloadConfig;
use forkline_types::Keypair;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Errors loading a [`NodeConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("identity seed is not hex: {0}")]
    IdentityHex(#[from] hex::FromHexError),

    #[error("identity seed must be 32 bytes, got {0}")]
    IdentityLength(usize),
}

/// Top-level node configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Replay orchestrator settings.
    pub replay: ReplayConfig,

    /// Channel depths between the runner and its peers.
    pub channels: ChannelConfig,

    /// Log filter directive, used when `RUST_LOG` is unset.
    pub log_level: Option<String>,

    /// Hex-encoded 32-byte seed of the vote signing key. Without it gossip
    /// votes are never re-signed.
    pub identity_seed: Option<String>,

    /// File that receives one line per executed slot.
    pub slots_file: Option<PathBuf>,

    /// Simulated cluster traffic.
    pub workload: WorkloadSettings,
}

/// Bounded channel depths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Fragments queued ahead of the runner. This is also the credit
    /// window producers wait on.
    pub fragment_depth: usize,

    /// Outbound messages queued ahead of consumers.
    pub message_depth: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            fragment_depth: 256,
            message_depth: 1024,
        }
    }
}

/// Simulated cluster driving the node.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WorkloadSettings {
    pub seed: u64,
    pub slots: u64,
    pub validators: usize,
    pub stake_per_validator: u64,
    pub slots_per_epoch: u64,
    pub fork_probability: f64,
    pub skip_probability: f64,
    pub microblocks_per_block: usize,
    pub txns_per_microblock: usize,
    /// Send one gossip vote after every block.
    pub gossip_votes: bool,
}

impl Default for WorkloadSettings {
    fn default() -> Self {
        Self {
            seed: 0,
            slots: 64,
            validators: 4,
            stake_per_validator: 100,
            slots_per_epoch: 32,
            fork_probability: 0.1,
            skip_probability: 0.05,
            microblocks_per_block: 2,
            txns_per_microblock: 8,
            gossip_votes: true,
        }
    }
}

impl WorkloadSettings {
    /// Generator parameters for [`forkline_simulation::ForkWorkload`].
    pub fn workload_config(&self) -> WorkloadConfig {
        WorkloadConfig {
            seed: self.seed,
            fork_probability: self.fork_probability,
            skip_probability: self.skip_probability,
            microblocks_per_block: self.microblocks_per_block,
            txns_per_microblock: self.txns_per_microblock,
            ..WorkloadConfig::default()
        }
    }
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Override the workload seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.workload.seed = seed;
        self
    }

    /// Override the number of generated slots.
    pub fn with_slots(mut self, slots: u64) -> Self {
        self.workload.slots = slots;
        self
    }

    /// Decode the vote signing key, if configured.
    pub fn identity_keypair(&self) -> Result<Option<Keypair>, ConfigError> {
        let Some(seed) = &self.identity_seed else {
            return Ok(None);
        };
        let bytes = hex::decode(seed.trim())?;
        let seed: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| ConfigError::IdentityLength(bytes.len()))?;
        Ok(Some(Keypair::from_seed(&seed)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = NodeConfig::from_toml("").unwrap();
        assert_eq!(config.replay, ReplayConfig::default());
        assert_eq!(config.channels, ChannelConfig::default());
        assert_eq!(config.workload, WorkloadSettings::default());
        assert!(config.identity_keypair().unwrap().is_none());
    }

    #[test]
    fn test_sample_config() {
        let sample = r#"
log_level = "debug"
identity_seed = "0101010101010101010101010101010101010101010101010101010101010101"
slots_file = "/tmp/slots.txt"

[replay]
fork_max = 64
vote = true
blockstore_checkpoint = "/tmp/blockstore.ckpt"

[channels]
fragment_depth = 8

[workload]
seed = 7
slots = 10
fork_probability = 0.5
"#;
        let config = NodeConfig::from_toml(sample).unwrap();
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.replay.fork_max, 64);
        assert!(config.replay.vote);
        assert_eq!(config.replay.ghost_node_max, 1024);
        assert_eq!(
            config.replay.blockstore_checkpoint,
            Some(PathBuf::from("/tmp/blockstore.ckpt"))
        );
        assert_eq!(config.channels.fragment_depth, 8);
        assert_eq!(config.channels.message_depth, 1024);
        assert_eq!(config.workload.seed, 7);
        assert_eq!(config.workload.validators, 4);

        let keypair = config.identity_keypair().unwrap().unwrap();
        assert_eq!(keypair.pubkey(), Keypair::from_seed(&[1; 32]).pubkey());

        let workload = config.workload.workload_config();
        assert_eq!(workload.seed, 7);
        assert_eq!(workload.fork_probability, 0.5);
    }

    #[test]
    fn test_cli_overrides() {
        let config = NodeConfig::default().with_seed(3).with_slots(12);
        assert_eq!((config.workload.seed, config.workload.slots), (3, 12));
    }

    #[test]
    fn test_bad_identity_seed() {
        let config = NodeConfig::from_toml(r#"identity_seed = "abcd""#).unwrap();
        assert!(matches!(
            config.identity_keypair(),
            Err(ConfigError::IdentityLength(2))
        ));

        let config = NodeConfig::from_toml(r#"identity_seed = "zz""#).unwrap();
        assert!(matches!(
            config.identity_keypair(),
            Err(ConfigError::IdentityHex(_))
        ));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let err = NodeConfig::from_toml("[replay]\nfork_max = \"many\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
