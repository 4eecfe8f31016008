//! Merge log for crash-tolerant shard merging.
//!
//! Epistemic foundation:
//! - K_i: Each batch is Pending, Committed, Merging, Merged or Failed
//! - K_i: The log is persisted atomically (write-then-rename) after every
//!   transition
//! - B_i: A log from an earlier run may exist → recovery
//! - I^B: Crash during a merge → the dataset is cut back to the offset
//!   recorded before the shard was appended

use super::{CommittedShard, Dataset, PARTIAL_SUFFIX};
use crate::models::{BatchSummary, GenerationPlan, NlsgenError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const LOG_FILE: &str = "merge_log.json";

/// Status of one batch's shard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ShardStatus {
    /// Not yet reported back
    Pending,
    /// Shard file complete on disk
    Committed,
    /// Being appended; dataset was `offset` bytes before
    Merging { offset: u64 },
    /// Rows are part of the dataset
    Merged,
    /// Excluded from the dataset; re-run this batch
    Failed { reason: String },
}

/// Log entry for a single batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardEntry {
    pub batch: usize,
    pub requested: usize,
    #[serde(flatten)]
    pub status: ShardStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<BatchSummary>,
    pub updated_at: DateTime<Utc>,
}

/// Persisted state of one run's merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeLogState {
    pub run_id: String,
    pub equation_id: u64,
    pub dataset: PathBuf,
    pub entries: Vec<ShardEntry>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What recovery found from a previous run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Run id of the previous log, if one existed
    pub previous_run: Option<String>,
    /// Batch whose half-appended rows were cut from the dataset
    pub rolled_back: Option<usize>,
    /// Batches of the previous run that never reached the dataset
    pub unmerged: Vec<usize>,
    /// Partial shard files removed
    pub removed_partials: usize,
}

/// Merge log manager for one work directory.
pub struct MergeLog {
    dir: PathBuf,
    log_path: PathBuf,
    state: MergeLogState,
}

impl MergeLog {
    /// Restore a consistent state after an earlier run.
    ///
    /// Must run before the dataset is opened.
    pub fn recover(dir: &Path, dataset: &Path) -> Result<RecoveryReport> {
        let mut report = RecoveryReport::default();
        if !dir.exists() {
            return Ok(report);
        }

        let log_path = dir.join(LOG_FILE);
        if log_path.exists() {
            let state = Self::load(&log_path)?;
            report.previous_run = Some(state.run_id.clone());

            for entry in &state.entries {
                if let ShardStatus::Merging { offset } = entry.status {
                    if state.dataset == dataset && dataset.exists() {
                        warn!(
                            batch = entry.batch,
                            offset,
                            "Previous merge was interrupted, rolling back dataset"
                        );
                        Dataset::truncate(dataset, offset)?;
                        report.rolled_back = Some(entry.batch);
                    }
                }
                if entry.status != ShardStatus::Merged {
                    report.unmerged.push(entry.batch);
                }
            }

            if !report.unmerged.is_empty() {
                warn!(
                    run_id = %state.run_id,
                    batches = ?report.unmerged,
                    "Previous run left batches unmerged"
                );
            }
        }

        let pattern = dir.join(format!("*{PARTIAL_SUFFIX}"));
        let partials: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())
            .map_err(|e| NlsgenError::Internal(format!("Invalid glob pattern: {e}")))?
            .filter_map(|r| r.ok())
            .collect();
        for partial in partials {
            warn!(path = %partial.display(), "Discarding partial shard");
            fs::remove_file(&partial).map_err(|e| NlsgenError::io("removing partial shard", e))?;
            report.removed_partials += 1;
        }

        Ok(report)
    }

    /// Start a new log for `plan`, replacing any previous one.
    pub fn begin(
        dir: &Path,
        run_id: &str,
        equation_id: u64,
        dataset: &Path,
        plan: &GenerationPlan,
    ) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| NlsgenError::io("creating work dir", e))?;

        let now = Utc::now();
        let entries = plan
            .batches()
            .map(|(batch, requested)| ShardEntry {
                batch,
                requested,
                status: ShardStatus::Pending,
                path: None,
                summary: None,
                updated_at: now,
            })
            .collect();

        let log = Self {
            dir: dir.to_path_buf(),
            log_path: dir.join(LOG_FILE),
            state: MergeLogState {
                run_id: run_id.to_string(),
                equation_id,
                dataset: dataset.to_path_buf(),
                entries,
                started_at: now,
                updated_at: now,
            },
        };
        log.save()?;
        info!(run_id, batches = plan.batch_count, "Merge log started");
        Ok(log)
    }

    fn load(path: &Path) -> Result<MergeLogState> {
        let file = File::open(path).map_err(|e| NlsgenError::io("opening merge log", e))?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|e| NlsgenError::ParseError(format!("Invalid merge log: {e}")))
    }

    /// Save the log to disk (atomic write).
    pub fn save(&self) -> Result<()> {
        let temp_path = self.dir.join("merge_log.tmp.json");
        let file =
            File::create(&temp_path).map_err(|e| NlsgenError::io("creating temp merge log", e))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &self.state)
            .map_err(|e| NlsgenError::Internal(format!("Serializing merge log: {e}")))?;

        fs::rename(&temp_path, &self.log_path)
            .map_err(|e| NlsgenError::io("renaming merge log", e))?;

        debug!("Merge log saved");
        Ok(())
    }

    fn transition(&mut self, batch: usize, status: ShardStatus) -> Result<&mut ShardEntry> {
        let now = Utc::now();
        self.state.updated_at = now;
        let entry = self
            .state
            .entries
            .get_mut(batch)
            .ok_or_else(|| NlsgenError::Internal(format!("No merge log entry for batch {batch}")))?;
        entry.status = status;
        entry.updated_at = now;
        Ok(entry)
    }

    pub fn mark_committed(&mut self, shard: &CommittedShard, summary: BatchSummary) -> Result<()> {
        let entry = self.transition(shard.batch, ShardStatus::Committed)?;
        entry.path = Some(shard.path.clone());
        entry.summary = Some(summary);
        self.save()
    }

    pub fn mark_merging(&mut self, batch: usize, offset: u64) -> Result<()> {
        self.transition(batch, ShardStatus::Merging { offset })?;
        self.save()
    }

    pub fn mark_merged(&mut self, batch: usize) -> Result<()> {
        self.transition(batch, ShardStatus::Merged)?;
        self.save()
    }

    pub fn mark_failed(&mut self, batch: usize, reason: impl Into<String>) -> Result<()> {
        self.transition(
            batch,
            ShardStatus::Failed {
                reason: reason.into(),
            },
        )?;
        self.save()
    }

    /// Committed entries in ascending batch order.
    pub fn committed(&self) -> Vec<ShardEntry> {
        self.state
            .entries
            .iter()
            .filter(|e| e.status == ShardStatus::Committed)
            .cloned()
            .collect()
    }

    /// Batches that did not reach the dataset.
    pub fn failed_batches(&self) -> Vec<usize> {
        self.state
            .entries
            .iter()
            .filter(|e| e.status != ShardStatus::Merged)
            .map(|e| e.batch)
            .collect()
    }

    /// Delete merged shards and the log itself.
    pub fn cleanup(self) -> Result<()> {
        for entry in &self.state.entries {
            if let (ShardStatus::Merged, Some(path)) = (&entry.status, &entry.path) {
                fs::remove_file(path).map_err(|e| NlsgenError::io("removing shard", e))?;
            }
        }
        fs::remove_file(&self.log_path).map_err(|e| NlsgenError::io("removing merge log", e))?;

        // Leftovers of failed runs keep the directory alive.
        if fs::remove_dir(&self.dir).is_err() {
            debug!(dir = %self.dir.display(), "Work dir not empty, keeping it");
        }
        debug!(run_id = %self.state.run_id, "Shards cleaned up");
        Ok(())
    }
}
