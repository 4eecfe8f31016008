//! Bounded parallel execution of a run's batches.
//!
//! Epistemic foundation:
//! - K_i: At most `size` batches evaluate at the same time (semaphore)
//! - K_i: Outcomes are reported in batch order, whatever the finish order
//! - I^B: A fatal batch error stops batches that have not started yet

use super::{BatchJob, BatchWorker};
use crate::models::{BatchSummary, GenerationPlan, NlsgenError};
use crate::shard::CommittedShard;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Semaphore;
use tracing::{error, warn};

/// What became of one batch.
#[derive(Debug)]
pub enum BatchOutcome {
    Committed {
        shard: CommittedShard,
        summary: BatchSummary,
    },
    Failed {
        index: usize,
        reason: String,
    },
    /// Never ran, or stopped early, because the run was aborted
    Skipped { index: usize },
}

impl BatchOutcome {
    pub fn index(&self) -> usize {
        match self {
            Self::Committed { summary, .. } => summary.index,
            Self::Failed { index, .. } | Self::Skipped { index } => *index,
        }
    }
}

/// Result of running every batch of a plan.
#[derive(Debug, Default)]
pub struct PoolRun {
    pub outcomes: Vec<BatchOutcome>,
    /// First error that aborted the run
    pub fatal: Option<NlsgenError>,
}

/// Worker pool running batches on blocking threads.
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
}

impl WorkerPool {
    /// Create a new worker pool.
    pub fn new(size: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(size.max(1))),
        }
    }

    /// Run every batch of `plan` with `worker`.
    pub async fn run(&self, worker: BatchWorker, plan: &GenerationPlan) -> PoolRun {
        let worker = Arc::new(worker);
        let abort = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::with_capacity(plan.batch_count);

        for (index, count) in plan.batches() {
            let worker = Arc::clone(&worker);
            let abort = Arc::clone(&abort);
            let semaphore = Arc::clone(&self.semaphore);

            let handle = tokio::spawn(async move {
                let permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| NlsgenError::Internal("Semaphore closed".to_string()))?;
                if abort.load(Ordering::Relaxed) {
                    return Ok(None);
                }

                let job = BatchJob { index, count };
                tokio::task::spawn_blocking(move || {
                    let result = worker.run(job, &abort);
                    // Raised before the permit is released.
                    if matches!(&result, Err(e) if e.is_fatal()) {
                        abort.store(true, Ordering::Relaxed);
                    }
                    drop(permit);
                    result
                })
                .await
                .map_err(|e| NlsgenError::Internal(format!("Batch {index} panicked: {e}")))?
            });
            handles.push((index, handle));
        }

        let mut run = PoolRun::default();
        for (index, handle) in handles {
            let result = handle
                .await
                .map_err(|e| NlsgenError::Internal(format!("Batch task {index} failed: {e}")))
                .and_then(|r| r);

            let outcome = match result {
                Ok(Some((shard, summary))) => BatchOutcome::Committed { shard, summary },
                Ok(None) => BatchOutcome::Skipped { index },
                Err(e) if e.is_fatal() => {
                    error!(batch = index, error = %e, "Batch failed, aborting run");
                    let reason = e.to_string();
                    abort.store(true, Ordering::Relaxed);
                    if run.fatal.is_none() {
                        run.fatal = Some(e);
                    }
                    BatchOutcome::Failed { index, reason }
                }
                Err(e) => {
                    warn!(batch = index, error = %e, "Batch failed, shard discarded");
                    BatchOutcome::Failed {
                        index,
                        reason: e.to_string(),
                    }
                }
            };
            run.outcomes.push(outcome);
        }

        run
    }
}
