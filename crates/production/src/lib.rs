//! Production runner for forkline replay.
//!
//! - [`ReplayRunner`]: drives the replay state machine on its own thread
//!   behind bounded channels, with a `watch`-based retire credit
//! - [`NodeConfig`]: TOML configuration
//! - [`SlotsFileCollector`], [`KeypairSigner`]: concrete collaborators
//! - [`boot_simulated`] / [`feed_workload`]: a simulated cluster to replay

mod collector;
mod config;
mod logging;
mod runner;
mod signer;
mod simulated;

pub use collector::SlotsFileCollector;
pub use config::{ChannelConfig, ConfigError, NodeConfig, WorkloadSettings};
pub use logging::{init_logging, log_filter, LoggingError};
pub use runner::{ReplayRunner, RetireCredit, RunSummary, RunnerHandle, RunnerStopped};
pub use signer::KeypairSigner;
pub use simulated::{boot_simulated, feed_workload, FeedStats, SetupError, SimulatedNode};
