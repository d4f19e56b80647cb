//! Append-only failure log.
//!
//! One line per failed device. The file is opened once at startup and shared by every
//! device task through the [`FailureSink`] trait, which only allows appending. Each record
//! is formatted up front and written with a single `write_all` under a mutex, so lines
//! from concurrent tasks never interleave.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Local};

use crate::error::FailureKind;

/// A failed device, as recorded in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub timestamp: DateTime<Local>,
    pub display_name: String,
    pub kind: FailureKind,
    pub hint: String,
}

impl FailureRecord {
    pub fn new(display_name: impl Into<String>, kind: FailureKind, hint: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            display_name: display_name.into(),
            kind,
            hint: hint.into(),
        }
    }

    /// Renders the record as one log line, newline included.
    pub fn to_line(&self) -> String {
        let hint = self.hint.replace(['\r', '\n'], " ");
        format!(
            "WARNING {} [{}] {}: {}\n",
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.6f"),
            self.display_name,
            self.kind,
            hint
        )
    }
}

/// Destination for failure records.
pub trait FailureSink: Send + Sync {
    fn append(&self, record: &FailureRecord) -> io::Result<()>;
}

/// File-backed failure log.
pub struct FailureLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl FailureLog {
    /// Opens (or creates) the log in append mode. Existing content is kept.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FailureSink for FailureLog {
    fn append(&self, record: &FailureRecord) -> io::Result<()> {
        let line = record.to_line();
        let mut file = self
            .file
            .lock()
            .map_err(|_| io::Error::other("failure log lock poisoned"))?;
        file.write_all(line.as_bytes())?;
        file.flush()
    }
}

/// In-memory sink, for dry runs and tests.
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<FailureRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything appended so far.
    pub fn records(&self) -> Vec<FailureRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

impl FailureSink for MemorySink {
    fn append(&self, record: &FailureRecord) -> io::Result<()> {
        self.records
            .lock()
            .map_err(|_| io::Error::other("memory sink lock poisoned"))?
            .push(record.clone());
        Ok(())
    }
}
