//! The final append-only dataset.
//!
//! Epistemic foundation:
//! - K_i: Header is input names then output names, never rewritten
//! - K_i: Rows are only ever appended, so a merged prefix stays byte-identical
//! - B_i: An existing file matches the expected columns (might not) → Result

use crate::models::{NlsgenError, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Handle on a dataset file, owned by the coordinator.
#[derive(Debug)]
pub struct Dataset {
    path: PathBuf,
    columns: Vec<String>,
    rows: usize,
    last_row: Option<Vec<f64>>,
    /// Last record has no line terminator yet
    unterminated: bool,
}

impl Dataset {
    /// Open `path` for append if requested and present, otherwise create it
    /// fresh with a header.
    pub fn open(path: &Path, columns: &[String], append: bool) -> Result<Self> {
        let existing = fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false);
        if append && existing {
            return Self::open_existing(path, columns);
        }
        Self::create(path, columns)
    }

    fn create(path: &Path, columns: &[String]) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| NlsgenError::io("creating dataset dir", e))?;
        }

        let file = File::create(path).map_err(|e| NlsgenError::io("creating dataset", e))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer
            .write_record(columns)
            .map_err(|e| NlsgenError::csv("writing dataset header", e))?;
        let file = writer
            .into_inner()
            .map_err(|e| NlsgenError::io("flushing dataset header", e.into_error()))?;
        file.sync_all()
            .map_err(|e| NlsgenError::io("syncing dataset", e))?;

        debug!(path = %path.display(), "Created dataset");
        Ok(Self {
            path: path.to_path_buf(),
            columns: columns.to_vec(),
            rows: 0,
            last_row: None,
            unterminated: false,
        })
    }

    fn open_existing(path: &Path, columns: &[String]) -> Result<Self> {
        let mut reader =
            csv::Reader::from_path(path).map_err(|e| NlsgenError::csv("opening dataset", e))?;

        let found: Vec<String> = reader
            .headers()
            .map_err(|e| NlsgenError::csv("reading dataset header", e))?
            .iter()
            .map(str::to_string)
            .collect();
        if found != columns {
            return Err(NlsgenError::DatasetMismatch {
                path: path.to_path_buf(),
                expected: columns.to_vec(),
                found,
            });
        }

        let mut rows = 0;
        let mut last = None;
        for record in reader.records() {
            last = Some(record.map_err(|e| NlsgenError::csv("reading dataset", e))?);
            rows += 1;
        }
        let last_row = last.as_ref().map(parse_record).transpose()?;
        let unterminated = !ends_with_newline(path)?;

        info!(path = %path.display(), rows, "Appending to existing dataset");
        Ok(Self {
            path: path.to_path_buf(),
            columns: columns.to_vec(),
            rows,
            last_row,
            unterminated,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Data rows, header excluded.
    pub fn row_count(&self) -> usize {
        self.rows
    }

    /// Last data row, if any.
    pub fn last_row(&self) -> Option<&[f64]> {
        self.last_row.as_deref()
    }

    /// Current file size; the offset a merge starts at.
    pub fn byte_len(&self) -> Result<u64> {
        fs::metadata(&self.path)
            .map(|m| m.len())
            .map_err(|e| NlsgenError::io("reading dataset size", e))
    }

    /// Append every row of a committed shard. Returns the number of rows.
    pub fn append_shard(&mut self, shard: &Path) -> Result<usize> {
        let mut reader =
            csv::Reader::from_path(shard).map_err(|e| NlsgenError::csv("opening shard", e))?;
        let header = reader
            .headers()
            .map_err(|e| NlsgenError::csv("reading shard header", e))?;
        if header.iter().ne(self.columns.iter().map(String::as_str)) {
            return Err(NlsgenError::DatasetMismatch {
                path: shard.to_path_buf(),
                expected: self.columns.clone(),
                found: header.iter().map(str::to_string).collect(),
            });
        }

        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| NlsgenError::io("opening dataset for append", e))?;
        if self.unterminated {
            file.write_all(b"\n")
                .map_err(|e| NlsgenError::io("terminating last dataset row", e))?;
        }
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        let mut rows = 0;
        let mut last = None;
        for record in reader.records() {
            let record = record.map_err(|e| NlsgenError::csv("reading shard", e))?;
            writer
                .write_record(&record)
                .map_err(|e| NlsgenError::csv("appending to dataset", e))?;
            last = Some(record);
            rows += 1;
        }

        let file = writer
            .into_inner()
            .map_err(|e| NlsgenError::io("flushing dataset", e.into_error()))?;
        file.sync_all()
            .map_err(|e| NlsgenError::io("syncing dataset", e))?;

        self.unterminated = false;
        if let Some(record) = last {
            self.last_row = Some(parse_record(&record)?);
        }
        self.rows += rows;
        Ok(rows)
    }

    /// Cut the file back to `len` bytes, dropping a partially appended shard.
    pub fn truncate(path: &Path, len: u64) -> Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|e| NlsgenError::io("opening dataset for rollback", e))?;
        file.set_len(len)
            .map_err(|e| NlsgenError::io("truncating dataset", e))?;
        file.sync_all()
            .map_err(|e| NlsgenError::io("syncing dataset", e))
    }

    /// Read all data rows of a dataset file.
    pub fn read_rows(path: &Path) -> Result<Vec<Vec<f64>>> {
        let mut reader =
            csv::Reader::from_path(path).map_err(|e| NlsgenError::csv("opening dataset", e))?;
        reader
            .records()
            .map(|record| {
                let record = record.map_err(|e| NlsgenError::csv("reading dataset", e))?;
                parse_record(&record)
            })
            .collect()
    }
}

/// Whether a non-empty file ends with a line terminator.
fn ends_with_newline(path: &Path) -> Result<bool> {
    let mut file = File::open(path).map_err(|e| NlsgenError::io("opening dataset", e))?;
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))
        .and_then(|_| file.read_exact(&mut last))
        .map_err(|e| NlsgenError::io("reading dataset end", e))?;
    Ok(last[0] == b'\n')
}

fn parse_record(record: &csv::StringRecord) -> Result<Vec<f64>> {
    record
        .iter()
        .map(|field| {
            field.trim().parse::<f64>().map_err(|e| {
                NlsgenError::ParseError(format!("Invalid value '{field}' in dataset: {e}"))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn columns() -> Vec<String> {
        vec!["s".to_string(), "r".to_string(), "y".to_string()]
    }

    fn write_shard(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("s,r,y\n{body}")).unwrap();
        path
    }

    #[test]
    fn test_create_writes_header_only() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data/eq_14.csv");
        let dataset = Dataset::open(&path, &columns(), false).unwrap();

        assert_eq!(dataset.row_count(), 0);
        assert_eq!(fs::read_to_string(&path).unwrap(), "s,r,y\n");
    }

    #[test]
    fn test_append_keeps_existing_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("eq_14.csv");
        let shard_a = write_shard(dir.path(), "a.csv", "0.5,2.0,1.25\n");
        let shard_b = write_shard(dir.path(), "b.csv", "0.25,3.0,-1.5\n0.75,1.5,0.5\n");

        let mut dataset = Dataset::open(&path, &columns(), false).unwrap();
        assert_eq!(dataset.append_shard(&shard_a).unwrap(), 1);
        let before = fs::read(&path).unwrap();

        let mut dataset = Dataset::open(&path, &columns(), true).unwrap();
        assert_eq!(dataset.row_count(), 1);
        assert_eq!(dataset.last_row(), Some(&[0.5, 2.0, 1.25][..]));
        assert_eq!(dataset.append_shard(&shard_b).unwrap(), 2);

        let after = fs::read(&path).unwrap();
        assert!(after.starts_with(&before));
        assert_eq!(dataset.row_count(), 3);
        assert_eq!(dataset.last_row(), Some(&[0.75, 1.5, 0.5][..]));
        assert_eq!(Dataset::read_rows(&path).unwrap().len(), 3);
    }

    #[test]
    fn test_append_after_unterminated_last_row() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("eq_14.csv");
        fs::write(&path, "s,r,y\n0.5,2.0,1.8").unwrap();
        let shard = write_shard(dir.path(), "a.csv", "0.25,3.0,-1.5\n");

        let mut dataset = Dataset::open(&path, &columns(), true).unwrap();
        assert_eq!(dataset.last_row(), Some(&[0.5, 2.0, 1.8][..]));
        assert_eq!(dataset.append_shard(&shard).unwrap(), 1);

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "s,r,y\n0.5,2.0,1.8\n0.25,3.0,-1.5\n"
        );
        assert_eq!(Dataset::read_rows(&path).unwrap().len(), 2);

        let mut dataset = Dataset::open(&path, &columns(), true).unwrap();
        assert_eq!(dataset.append_shard(&shard).unwrap(), 1);
        assert_eq!(Dataset::read_rows(&path).unwrap().len(), 3);
    }

    #[test]
    fn test_open_without_append_truncates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("eq_14.csv");
        fs::write(&path, "s,r,y\n0.5,2.0,1.25\n").unwrap();

        let dataset = Dataset::open(&path, &columns(), false).unwrap();
        assert_eq!(dataset.row_count(), 0);
        assert_eq!(fs::read_to_string(&path).unwrap(), "s,r,y\n");
    }

    #[test]
    fn test_append_with_other_columns_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("eq_14.csv");
        fs::write(&path, "s,y\n0.5,1.25\n").unwrap();

        assert!(matches!(
            Dataset::open(&path, &columns(), true),
            Err(NlsgenError::DatasetMismatch { .. })
        ));
    }

    #[test]
    fn test_truncate_rolls_back_partial_append() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("eq_14.csv");
        let dataset = Dataset::open(&path, &columns(), false).unwrap();
        let offset = dataset.byte_len().unwrap();

        let mut content = fs::read(&path).unwrap();
        content.extend_from_slice(b"0.5,2.0,1.2");
        fs::write(&path, &content).unwrap();

        Dataset::truncate(&path, offset).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "s,r,y\n");
    }
}
