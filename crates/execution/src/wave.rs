//! Parallel wave execution.
//!
//! A microblock is split by the executor into waves of non-conflicting
//! transactions. Each wave runs on a fixed rayon pool; the calling thread
//! blocks until the wave is done before committing its writes and starting
//! the next one.

use crate::ExecutionError;
use forkline_core::{Executor, ExecutorError, LandedVote, RecordKey, TxnOutcome, VersionedStore};
use forkline_types::{SlotExecutionContext, Transaction};
use rayon::prelude::*;
use tracing::{debug, trace};

/// A transaction that failed to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxnFailure {
    /// Index of the transaction in the microblock.
    pub index: usize,
    /// Executor error.
    pub error: ExecutorError,
}

/// Result of executing one microblock.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Transactions executed and committed.
    pub executed: usize,
    /// Waves run (including a failed one).
    pub waves: usize,
    /// First failure, in microblock order. Execution stops at the wave
    /// containing it and nothing of that wave is committed.
    pub failure: Option<TxnFailure>,
    /// Votes carried by committed transactions.
    pub votes: Vec<LandedVote>,
}

impl BatchOutcome {
    /// Whether every transaction executed.
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Fixed pool of execution workers.
pub struct WavePool {
    pool: rayon::ThreadPool,
    workers: usize,
}

impl std::fmt::Debug for WavePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WavePool")
            .field("workers", &self.workers)
            .finish()
    }
}

impl WavePool {
    /// Create a pool with `workers` threads.
    pub fn new(workers: usize) -> Result<Self, ExecutionError> {
        let workers = workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("forkline-exec-{i}"))
            .build()
            .map_err(|e| ExecutionError::WorkerPool(e.to_string()))?;
        Ok(Self { pool, workers })
    }

    /// Number of worker threads.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Execute `txns` against `ctx`'s branch.
    ///
    /// Transaction failures are reported in the outcome. An `Err` means the
    /// store rejected a commit.
    pub fn execute(
        &self,
        executor: &dyn Executor,
        store: &dyn VersionedStore,
        ctx: &mut SlotExecutionContext,
        txns: &[Transaction],
    ) -> Result<BatchOutcome, ExecutionError> {
        let mut outcome = BatchOutcome::default();
        if txns.is_empty() {
            return Ok(outcome);
        }

        let waves = executor.partition_waves(txns);
        for wave in waves {
            outcome.waves += 1;
            let shared: &SlotExecutionContext = ctx;
            let results: Vec<(usize, Result<TxnOutcome, ExecutorError>)> =
                self.pool.install(|| {
                    wave.par_iter()
                        .map(|&i| (i, executor.execute(shared, &txns[i], store)))
                        .collect()
                });

            let failure = results
                .iter()
                .filter_map(|(i, r)| r.as_ref().err().map(|e| (*i, e)))
                .min_by_key(|(i, _)| *i);
            if let Some((index, error)) = failure {
                debug!(
                    slot = ctx.bank.slot.0,
                    index,
                    error = %error,
                    "Transaction failed, stopping microblock"
                );
                outcome.failure = Some(TxnFailure {
                    index,
                    error: error.clone(),
                });
                return Ok(outcome);
            }

            for (_, result) in results {
                // Failures were handled above.
                let Ok(txn) = result else { continue };
                for (account, data) in txn.writes {
                    store.put(&ctx.branch, RecordKey::Account(account), data)?;
                }
                ctx.bank.collected_fees += txn.fee;
                ctx.bank.signature_count += txn.signatures;
                outcome.votes.extend(txn.vote);
                outcome.executed += 1;
            }
            trace!(slot = ctx.bank.slot.0, wave = outcome.waves, size = wave.len(), "Wave committed");
        }
        Ok(outcome)
    }
}
