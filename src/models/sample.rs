//! Sample and result types for nlsgen.
//!
//! K_i: These types represent the core data flow through the pipeline.

use super::NlsgenError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Candidate input vector, index-aligned with the equation's inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRequest {
    pub inputs: Vec<f64>,
}

impl SampleRequest {
    pub fn new(inputs: Vec<f64>) -> Self {
        Self { inputs }
    }
}

/// Outcome of evaluating one candidate.
///
/// K_i: `accepted == false` means the equation did not converge; such
/// results are counted but never written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleResult {
    pub inputs: Vec<f64>,
    pub outputs: Vec<f64>,
    pub accepted: bool,
}

impl SampleResult {
    pub fn accepted(inputs: Vec<f64>, outputs: Vec<f64>) -> Self {
        Self {
            inputs,
            outputs,
            accepted: true,
        }
    }

    pub fn rejected(inputs: Vec<f64>) -> Self {
        Self {
            inputs,
            outputs: Vec::new(),
            accepted: false,
        }
    }

    /// Dataset row: inputs followed by outputs.
    pub fn row(&self) -> impl Iterator<Item = f64> + '_ {
        self.inputs.iter().chain(self.outputs.iter()).copied()
    }
}

/// Partition of the requested sample count into batches.
///
/// K_i: `per_batch_count.len() == batch_count >= 1` and the entries sum to
/// `total_count`; leading batches absorb the remainder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationPlan {
    pub total_count: usize,
    pub batch_count: usize,
    pub per_batch_count: Vec<usize>,
}

impl GenerationPlan {
    /// Split `total_count` into `batch_count` batches as evenly as possible.
    pub fn new(total_count: usize, batch_count: usize) -> Result<Self, NlsgenError> {
        if batch_count == 0 {
            return Err(super::ConfigError::NonPositive("n_batches").into());
        }

        let base = total_count / batch_count;
        let remainder = total_count % batch_count;
        let per_batch_count = (0..batch_count)
            .map(|i| if i < remainder { base + 1 } else { base })
            .collect();

        Ok(Self {
            total_count,
            batch_count,
            per_batch_count,
        })
    }

    /// Iterate `(batch_index, count)`.
    pub fn batches(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.per_batch_count.iter().copied().enumerate()
    }
}

/// Per-worker random-walk state.
///
/// K_i: Holds the last accepted sample; its outputs are the solver's
/// initial guess for the next evaluation, which keeps the walk on one branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkState {
    pub last_accepted_inputs: Vec<f64>,
    pub last_accepted_outputs: Vec<f64>,
}

impl WalkState {
    /// Split a dataset row into inputs and outputs.
    ///
    /// B_i(row has the expected width) → Option
    pub fn from_row(row: &[f64], n_inputs: usize) -> Option<Self> {
        if row.len() <= n_inputs {
            return None;
        }
        let (inputs, outputs) = row.split_at(n_inputs);
        Some(Self {
            last_accepted_inputs: inputs.to_vec(),
            last_accepted_outputs: outputs.to_vec(),
        })
    }
}

/// Counters a batch reports back with its committed shard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Batch index within the plan
    pub index: usize,
    /// Slots assigned to the batch
    pub requested: usize,
    /// Rows written to the shard
    pub accepted: usize,
    /// Slots that exhausted their retry budget
    pub non_convergent: usize,
    /// Evaluation calls made, retries included
    pub attempts: usize,
}

/// Final statistics of one equation's generation run.
///
/// K_i: `accepted + failed == requested`, so an under-filled dataset is
/// always visible to the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationReport {
    /// Equation the data belongs to
    pub equation_id: u64,

    /// Dataset file
    pub dataset: PathBuf,

    /// New rows requested
    pub requested: usize,

    /// New rows merged into the dataset
    pub accepted: usize,

    /// Requested rows that did not make it into the dataset
    pub failed: usize,

    /// Slots that exhausted their retry budget
    pub non_convergent: usize,

    /// Evaluation calls made, retries included
    pub attempts: usize,

    /// Rows present before this run (append mode)
    pub prior_rows: usize,

    /// Rows in the dataset after this run
    pub total_rows: usize,

    /// Batches whose shard could not be committed or merged; re-run these
    pub failed_batches: Vec<usize>,

    /// Total runtime in seconds
    pub runtime_secs: f64,

    /// accepted / attempts
    pub acceptance_rate: f64,

    /// Accepted rows per hour
    pub throughput_per_hour: f64,
}

impl GenerationReport {
    /// Fill derived fields from the counters.
    pub fn finalize(&mut self) {
        self.failed = self.requested.saturating_sub(self.accepted);
        self.total_rows = self.prior_rows + self.accepted;
        if self.attempts > 0 {
            self.acceptance_rate = self.accepted as f64 / self.attempts as f64;
        }
        if self.runtime_secs > 0.0 {
            self.throughput_per_hour = self.accepted as f64 / self.runtime_secs * 3600.0;
        }
    }

    /// Fold a merged batch into the totals.
    pub fn absorb(&mut self, batch: &BatchSummary) {
        self.accepted += batch.accepted;
        self.non_convergent += batch.non_convergent;
        self.attempts += batch.attempts;
    }

    /// True when every requested row landed in the dataset.
    pub fn is_complete(&self) -> bool {
        self.failed == 0 && self.failed_batches.is_empty()
    }
}
