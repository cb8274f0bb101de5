//! Batched CSV output for per-frame records.
//!
//! Rows are buffered per key and appended to `<output_dir>/<key>.csv` in batches of `max_len`, so a
//! tracking loop does not touch the file system on every frame. The header is written only when the
//! file is created. Each cache owns its buffers; two caches never share pending rows.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Serialize;
use tracing::debug;

use crate::error::{ParadigmError, Result};

pub const DEFAULT_MAX_LEN: usize = 50;

pub struct RowCache<T> {
    output_dir: PathBuf,
    max_len: usize,
    rows: IndexMap<String, Vec<T>>,
}

impl<T: Serialize> RowCache<T> {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            max_len: DEFAULT_MAX_LEN,
            rows: IndexMap::new(),
        }
    }

    /// Batch size, at least 1
    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len.max(1);
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn path(&self, key: &str) -> PathBuf {
        self.output_dir.join(format!("{}.csv", key))
    }

    /// Rows of `key` not yet written
    pub fn pending(&self, key: &str) -> usize {
        self.rows.get(key).map_or(0, |rows| rows.len())
    }

    /// Buffers `row` under `key`, writing the batch out once it holds `max_len` rows.
    /// Returns whether a flush happened.
    pub fn push(&mut self, key: &str, row: T) -> Result<bool> {
        let rows = self.rows.entry(key.to_string()).or_default();
        rows.push(row);
        if rows.len() >= self.max_len {
            self.flush(key)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Appends the pending rows of `key` to its file, returns how many were written
    pub fn flush(&mut self, key: &str) -> Result<usize> {
        let rows = match self.rows.get_mut(key) {
            Some(rows) if !rows.is_empty() => std::mem::take(rows),
            _ => return Ok(0),
        };
        let path = self.path(key);
        let io_err = |source| ParadigmError::Io {
            path: path.clone(),
            source,
        };
        let csv_err = |source| ParadigmError::Csv {
            source_name: path.display().to_string(),
            source,
        };

        let new_file = !path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_err)?;
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(new_file)
            .from_writer(file);
        for row in &rows {
            wtr.serialize(row).map_err(csv_err)?;
        }
        wtr.flush().map_err(io_err)?;
        debug!("Saved {} rows to {}", rows.len(), path.display());
        Ok(rows.len())
    }

    /// Flushes every key, returns the total number of rows written
    pub fn flush_all(&mut self) -> Result<usize> {
        let keys: Vec<String> = self.rows.keys().cloned().collect();
        let mut written = 0;
        for key in keys {
            written += self.flush(&key)?;
        }
        Ok(written)
    }
}
