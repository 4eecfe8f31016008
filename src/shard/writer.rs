//! Per-batch shard files with commit-or-absent semantics.
//!
//! Epistemic foundation:
//! - K_i: A shard is written to `<name>.csv.tmp` and renamed to `<name>.csv`
//!   only after a full flush and fsync, so a `.csv` shard is always complete
//! - B_i: Disk may fill up mid-batch → Result, batch fails alone
//! - I^B: Crash mid-batch → `.csv.tmp` left behind, discarded on recovery

use crate::models::{NlsgenError, Result, SampleResult};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Suffix of shards that are still being written.
pub const PARTIAL_SUFFIX: &str = ".csv.tmp";

/// A fully flushed shard, eligible for merging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedShard {
    pub batch: usize,
    pub path: PathBuf,
    pub rows: usize,
}

/// Writer for one batch's shard.
pub struct ShardWriter {
    batch: usize,
    partial_path: PathBuf,
    final_path: PathBuf,
    writer: Option<csv::Writer<File>>,
    rows: usize,
    finished: bool,
}

impl ShardWriter {
    /// Shard file name for a batch of a run.
    pub fn file_name(run_id: &str, batch: usize) -> String {
        format!("{run_id}_batch{batch}.csv")
    }

    /// Start a shard and write its header.
    pub fn create(dir: &Path, run_id: &str, batch: usize, columns: &[String]) -> Result<Self> {
        let final_path = dir.join(Self::file_name(run_id, batch));
        let partial_path = dir.join(format!("{run_id}_batch{batch}{PARTIAL_SUFFIX}"));

        let file = File::create(&partial_path)
            .map_err(|e| NlsgenError::io(format!("creating shard {}", partial_path.display()), e))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer
            .write_record(columns)
            .map_err(|e| NlsgenError::csv("writing shard header", e))?;

        debug!(batch, path = %partial_path.display(), "Shard started");
        Ok(Self {
            batch,
            partial_path,
            final_path,
            writer: Some(writer),
            rows: 0,
            finished: false,
        })
    }

    /// Append an accepted sample as a row.
    pub fn write(&mut self, result: &SampleResult) -> Result<()> {
        if !result.accepted {
            return Err(NlsgenError::Internal(
                "Rejected sample passed to shard writer".to_string(),
            ));
        }
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| NlsgenError::Internal("Shard already finished".to_string()))?;

        let row: Vec<f64> = result.row().collect();
        writer
            .serialize(&row)
            .map_err(|e| NlsgenError::csv("writing shard row", e))?;
        self.rows += 1;
        Ok(())
    }

    /// Rows written so far.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Flush, fsync and rename into place.
    pub fn commit(mut self) -> Result<CommittedShard> {
        let writer = self
            .writer
            .take()
            .ok_or_else(|| NlsgenError::Internal("Shard already finished".to_string()))?;

        let file = writer
            .into_inner()
            .map_err(|e| NlsgenError::io("flushing shard", e.into_error()))?;
        file.sync_all()
            .map_err(|e| NlsgenError::io("syncing shard", e))?;
        drop(file);

        fs::rename(&self.partial_path, &self.final_path).map_err(|e| {
            NlsgenError::io(format!("committing shard {}", self.final_path.display()), e)
        })?;

        self.finished = true;
        debug!(batch = self.batch, rows = self.rows, "Shard committed");
        Ok(CommittedShard {
            batch: self.batch,
            path: self.final_path.clone(),
            rows: self.rows,
        })
    }

    /// Discard the shard.
    pub fn abort(mut self) -> Result<()> {
        self.writer.take();
        self.finished = true;
        if self.partial_path.exists() {
            fs::remove_file(&self.partial_path)
                .map_err(|e| NlsgenError::io("removing partial shard", e))?;
        }
        debug!(batch = self.batch, "Shard aborted");
        Ok(())
    }
}

impl Drop for ShardWriter {
    fn drop(&mut self) {
        if !self.finished {
            self.writer.take();
            warn!(
                batch = self.batch,
                rows = self.rows,
                "Shard dropped without commit, discarding"
            );
            let _ = fs::remove_file(&self.partial_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn columns() -> Vec<String> {
        vec!["s".to_string(), "r".to_string(), "y".to_string()]
    }

    #[test]
    fn test_commit_renames_complete_shard() {
        let dir = TempDir::new().unwrap();
        let mut shard = ShardWriter::create(dir.path(), "run_a", 0, &columns()).unwrap();
        shard
            .write(&SampleResult::accepted(vec![0.5, 2.0], vec![1.25]))
            .unwrap();
        shard
            .write(&SampleResult::accepted(vec![0.25, 3.0], vec![-1.5]))
            .unwrap();

        let committed = shard.commit().unwrap();
        assert_eq!(committed.rows, 2);
        assert!(committed.path.ends_with("run_a_batch0.csv"));
        assert!(!dir.path().join("run_a_batch0.csv.tmp").exists());

        let content = fs::read_to_string(&committed.path).unwrap();
        assert_eq!(content, "s,r,y\n0.5,2.0,1.25\n0.25,3.0,-1.5\n");
    }

    #[test]
    fn test_rejected_sample_is_refused() {
        let dir = TempDir::new().unwrap();
        let mut shard = ShardWriter::create(dir.path(), "run_a", 0, &columns()).unwrap();
        assert!(shard.write(&SampleResult::rejected(vec![0.5, 2.0])).is_err());
        assert_eq!(shard.rows(), 0);
        shard.abort().unwrap();
    }

    #[test]
    fn test_dropped_shard_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        {
            let mut shard = ShardWriter::create(dir.path(), "run_a", 3, &columns()).unwrap();
            shard
                .write(&SampleResult::accepted(vec![0.5, 2.0], vec![1.25]))
                .unwrap();
        }
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_commit_onto_directory_fails() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("run_a_batch1.csv")).unwrap();
        let shard = ShardWriter::create(dir.path(), "run_a", 1, &columns()).unwrap();
        let err = shard.commit().unwrap_err();
        assert!(!err.is_fatal());
    }
}
