//! Forkline replay node.
//!
//! Boots replay at genesis of a simulated cluster, replays a seeded fork
//! workload through the threaded runner and prints what happened.

use anyhow::{anyhow, Context};
use clap::Parser;
use forkline_core::OutboundMessage;
use forkline_production::{
    boot_simulated, feed_workload, init_logging, NodeConfig, ReplayRunner, RunnerHandle,
    SimulatedNode,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::warn;

#[derive(Parser)]
#[command(name = "forkline-node")]
#[command(about = "Replay a simulated fork workload")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Workload seed (overrides the config file)
    #[arg(long)]
    seed: Option<u64>,

    /// Number of blocks to generate (overrides the config file)
    #[arg(long)]
    slots: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => NodeConfig::from_file(path)?,
        None => NodeConfig::default(),
    };
    if let Some(seed) = cli.seed {
        config = config.with_seed(seed);
    }
    if let Some(slots) = cli.slots {
        config = config.with_slots(slots);
    }
    init_logging(config.log_level.as_deref())?;

    let SimulatedNode {
        state,
        boot_actions,
        blockstore,
        mut workload,
    } = boot_simulated(&config)?;
    let RunnerHandle {
        fragments,
        mut messages,
        mut credit,
        thread,
    } = ReplayRunner::spawn(state, boot_actions, config.channels)
        .context("failed to spawn replay thread")?;

    let consumer = tokio::spawn(async move {
        let mut counts: BTreeMap<&'static str, u64> = BTreeMap::new();
        while let Some(msg) = messages.recv().await {
            *counts.entry(msg.type_name()).or_default() += 1;
            if let OutboundMessage::Notify(notification) = &msg {
                tracing::trace!(?notification, "Notification");
            }
        }
        counts
    });

    let fed = feed_workload(
        &mut workload,
        &blockstore,
        &config.workload,
        &fragments,
        &mut credit,
    )
    .await;
    drop(fragments);

    let replay = tokio::task::spawn_blocking(move || thread.join())
        .await?
        .map_err(|_| anyhow!("replay thread panicked"))?;
    let counts = consumer.await?;

    let summary = replay.context("replay halted")?;
    let fed = match fed {
        Ok(fed) => fed,
        Err(e) => {
            warn!(error = %e, "Workload interrupted");
            return Err(e.into());
        }
    };

    println!("Replayed {} blocks ({} fragments)", fed.blocks, fed.fragments);
    println!("  finalized:     {}", summary.finalized);
    println!("  failed:        {}", summary.failed);
    println!("  filtered:      {}", summary.filtered);
    println!("  deferrals:     {}", summary.deferrals);
    println!(
        "  gossip votes:  {} relayed, {} dropped",
        summary.votes_relayed, summary.votes_dropped
    );
    if let Some((slot, bank_hash)) = summary.last_finalized {
        println!("  last block:    {} (bank hash {})", slot, bank_hash);
    }
    println!("  root:          {}", summary.root);
    println!("  agreed up to:  {}", summary.watermark);
    println!("Messages:");
    for (name, count) in counts {
        println!("  {:<14} {}", name, count);
    }
    Ok(())
}
