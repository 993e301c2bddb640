//! Threaded replay runner.
//!
//! The replay state machine is synchronous and blocks on its worker pool,
//! so it runs on a dedicated OS thread. Fragments arrive on a bounded
//! channel; outbound messages leave on another. Every retired fragment
//! bumps a counter on a `watch` channel that producers treat as credit.
//!
//! ```text
//!  producer ──Fragment──▶ [ replay thread ] ──OutboundMessage──▶ consumers
//!      ▲                         │
//!      └──── retired count ◀─────┘ (watch)
//! ```
//!
//! A fragment whose parent block is still executing is held by the runner
//! and redelivered after the next fragment that makes progress. The first
//! [`ReplayError`] stops the thread and is returned from its join handle.

use crate::config::ChannelConfig;
use forkline_core::{Action, Fragment, HandleOutcome, OutboundMessage, StateMachine};
use forkline_node::{ReplayError, ReplayState};
use forkline_types::{Hash, Slot};
use std::collections::VecDeque;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, trace, warn};

/// The replay thread exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("replay runner stopped")]
pub struct RunnerStopped;

/// What the runner did before it stopped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Fragments handled, redeliveries included.
    pub handled: u64,
    /// Blocks finalized.
    pub finalized: u64,
    /// Fragments filtered without executing.
    pub filtered: u64,
    /// Microblocks that failed to execute.
    pub failed: u64,
    /// Times a fragment was deferred.
    pub deferrals: u64,
    /// Gossip votes re-signed and re-published.
    pub votes_relayed: u64,
    /// Gossip votes dropped.
    pub votes_dropped: u64,
    /// Most recently finalized block and its bank hash.
    pub last_finalized: Option<(Slot, Hash)>,
    /// Root when the runner stopped.
    pub root: Slot,
    /// Bank hash agreement watermark when the runner stopped.
    pub watermark: Slot,
}

impl RunSummary {
    fn record(&mut self, outcome: &HandleOutcome) {
        self.handled += 1;
        match *outcome {
            HandleOutcome::Filtered { .. } => self.filtered += 1,
            HandleOutcome::Deferred { .. } => self.deferrals += 1,
            HandleOutcome::ExecutionFailed { .. } => self.failed += 1,
            HandleOutcome::Executed { .. } => {}
            HandleOutcome::Finalized { slot, bank_hash } => {
                self.finalized += 1;
                self.last_finalized = Some((slot, bank_hash));
            }
            HandleOutcome::VoteRelayed { .. } => self.votes_relayed += 1,
            HandleOutcome::VoteDropped => self.votes_dropped += 1,
        }
    }
}

/// Credit view over the runner's retired-fragment counter.
#[derive(Debug, Clone)]
pub struct RetireCredit {
    retired: watch::Receiver<u64>,
    window: u64,
}

impl RetireCredit {
    /// Fragments retired so far.
    pub fn retired(&self) -> u64 {
        *self.retired.borrow()
    }

    /// Number of fragments that may be outstanding at once.
    pub fn window(&self) -> u64 {
        self.window
    }

    /// Wait until another fragment may be sent, given `sent` so far.
    pub async fn wait_for_room(&mut self, sent: u64) -> Result<(), RunnerStopped> {
        let window = self.window;
        self.retired
            .wait_for(|retired| sent.saturating_sub(*retired) < window)
            .await
            .map(|_| ())
            .map_err(|_| RunnerStopped)
    }

    /// Wait until all `sent` fragments are retired.
    pub async fn wait_until_retired(&mut self, sent: u64) -> Result<(), RunnerStopped> {
        self.retired
            .wait_for(|retired| *retired >= sent)
            .await
            .map(|_| ())
            .map_err(|_| RunnerStopped)
    }
}

/// Endpoints of a spawned runner.
#[derive(Debug)]
pub struct RunnerHandle {
    /// Fragment input.
    pub fragments: mpsc::Sender<Fragment>,
    /// Outbound messages, in the order replay produced them.
    pub messages: mpsc::Receiver<OutboundMessage>,
    /// Retired-fragment credit.
    pub credit: RetireCredit,
    /// The replay thread.
    pub thread: JoinHandle<Result<RunSummary, ReplayError>>,
}

/// Drives a [`ReplayState`] from channels.
pub struct ReplayRunner {
    state: ReplayState,
    inbound: mpsc::Receiver<Fragment>,
    outbound: mpsc::Sender<OutboundMessage>,
    retired_tx: watch::Sender<u64>,
    retired: u64,
    deferred: VecDeque<Fragment>,
    started: Instant,
    summary: RunSummary,
}

impl ReplayRunner {
    /// Spawn the replay thread.
    ///
    /// Messages the state machine produced at boot are queued ahead of
    /// everything else.
    pub fn spawn(
        state: ReplayState,
        boot_actions: Vec<Action>,
        channels: ChannelConfig,
    ) -> std::io::Result<RunnerHandle> {
        let (fragment_tx, inbound) = mpsc::channel(channels.fragment_depth.max(1));
        let (outbound, messages) =
            mpsc::channel(channels.message_depth.max(1).max(boot_actions.len()));
        let (retired_tx, retired_rx) = watch::channel(0);

        queue_boot_messages(&outbound, boot_actions);

        let runner = ReplayRunner {
            state,
            inbound,
            outbound,
            retired_tx,
            retired: 0,
            deferred: VecDeque::new(),
            started: Instant::now(),
            summary: RunSummary::default(),
        };
        let thread = thread::Builder::new()
            .name("replay".into())
            .spawn(move || runner.run())?;

        Ok(RunnerHandle {
            fragments: fragment_tx,
            messages,
            credit: RetireCredit {
                retired: retired_rx,
                window: channels.fragment_depth.max(1) as u64,
            },
            thread,
        })
    }

    fn run(mut self) -> Result<RunSummary, ReplayError> {
        info!(root = self.state.root().0, "Replay runner started");

        while let Some(fragment) = self.inbound.blocking_recv() {
            if let Err(e) = self.drive(fragment) {
                error!(
                    error = %e,
                    handled = self.summary.handled,
                    "Replay halted"
                );
                return Err(e);
            }
        }

        if !self.deferred.is_empty() {
            warn!(
                count = self.deferred.len(),
                "Dropping deferred fragments at shutdown"
            );
        }
        self.summary.root = self.state.root();
        self.summary.watermark = self.state.watermark();
        info!(
            handled = self.summary.handled,
            finalized = self.summary.finalized,
            root = self.summary.root.0,
            "Replay runner stopped"
        );
        Ok(self.summary)
    }

    fn drive(&mut self, fragment: Fragment) -> Result<(), ReplayError> {
        if self.step(fragment)? {
            self.redeliver()?;
        }
        Ok(())
    }

    /// Handle one fragment. Returns whether it made progress.
    fn step(&mut self, fragment: Fragment) -> Result<bool, ReplayError> {
        self.state.set_time(self.started.elapsed());
        let transition = self.state.handle(fragment.clone())?;
        self.summary.record(&transition.outcome);

        if transition.outcome.is_deferred() {
            trace!(seq = fragment.seq, "Holding deferred fragment");
            self.deferred.push_back(fragment);
            return Ok(false);
        }
        for action in transition.actions {
            self.perform(action);
        }
        Ok(true)
    }

    /// Retry every held fragment once.
    fn redeliver(&mut self) -> Result<(), ReplayError> {
        for _ in 0..self.deferred.len() {
            let Some(fragment) = self.deferred.pop_front() else {
                break;
            };
            debug!(seq = fragment.seq, "Redelivering deferred fragment");
            self.step(fragment)?;
        }
        Ok(())
    }

    fn perform(&mut self, action: Action) {
        match action {
            Action::Publish(msg) => {
                let name = msg.type_name();
                if self.outbound.blocking_send(msg).is_err() {
                    trace!(message = name, "No consumer, message dropped");
                }
            }
            Action::BatchRetired { seq } => {
                self.retired += 1;
                self.retired_tx.send_replace(self.retired);
                trace!(seq, retired = self.retired, "Batch retired");
            }
        }
    }
}

/// Queue the boot messages on `outbound`, returning how many fit.
fn queue_boot_messages(outbound: &mpsc::Sender<OutboundMessage>, actions: Vec<Action>) -> usize {
    let mut queued = 0;
    for action in actions {
        let Action::Publish(msg) = action else {
            continue;
        };
        let kind = msg.type_name();
        match outbound.try_send(msg) {
            Ok(()) => queued += 1,
            Err(e) => error!(message = kind, error = %e, "Boot message dropped"),
        }
    }
    queued
}
