//! Daily attendance ledger.
//!
//! One row per identity per day. The first write for a given
//! `(identity, date)` wins; later writes for the same pair are reported as
//! [`MergeOutcome::SkippedDuplicate`] and leave the ledger untouched. Rows are
//! only ever appended.
//!
//! The ledger does not lock its storage. Callers must serialize merges
//! against the same store.

use crate::types::Identity;
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

pub const LEDGER_HEADER: [&str; 4] = ["Name", "Date", "Time", "Status"];
pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M:%S";

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("ledger I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("ledger CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("identity {0:?} is blank and cannot be recorded")]
    InvalidIdentity(String),
    #[error("malformed ledger row in {path} at line {line}: {reason}")]
    Malformed {
        path: PathBuf,
        line: u64,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Present,
    Absent,
    Leave,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Present => "Present",
            Status::Absent => "Absent",
            Status::Leave => "Leave",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Present" => Ok(Status::Present),
            "Absent" => Ok(Status::Absent),
            "Leave" => Ok(Status::Leave),
            other => Err(format!("unknown status {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerRow {
    pub identity: Identity,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub status: Status,
}

impl LedgerRow {
    fn to_record(&self) -> [String; 4] {
        [
            self.identity.to_string(),
            self.date.format(DATE_FORMAT).to_string(),
            self.time.format(TIME_FORMAT).to_string(),
            self.status.to_string(),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    /// A row for this identity and date already existed; nothing was written.
    SkippedDuplicate,
}

/// Persistence behind a [`Ledger`].
pub trait LedgerStore {
    /// Rows recorded for `date`. Creates the day's (empty) ledger if absent.
    fn load(&mut self, date: NaiveDate) -> Result<Vec<LedgerRow>, LedgerError>;

    /// Append one row to the ledger for `row.date` and persist it.
    fn append(&mut self, row: &LedgerRow) -> Result<(), LedgerError>;
}

pub struct Ledger<S> {
    store: S,
}

impl<S: LedgerStore> Ledger<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Record `status` for `identity` on `date` unless a row already exists.
    ///
    /// Blank identities are rejected before the store is touched.
    pub fn merge_record(
        &mut self,
        identity: &Identity,
        date: NaiveDate,
        time: NaiveTime,
        status: Status,
    ) -> Result<MergeOutcome, LedgerError> {
        if identity.as_str().trim().is_empty() {
            return Err(LedgerError::InvalidIdentity(identity.to_string()));
        }

        let existing = self.store.load(date)?;
        if existing
            .iter()
            .any(|row| &row.identity == identity && row.date == date)
        {
            tracing::debug!(identity = %identity, %date, %status, "ledger row exists; skipping");
            return Ok(MergeOutcome::SkippedDuplicate);
        }

        let row = LedgerRow {
            identity: identity.clone(),
            date,
            time,
            status,
        };
        self.store.append(&row)?;
        tracing::info!(
            identity = %identity,
            %date,
            time = %row.time.format(TIME_FORMAT),
            %status,
            "ledger row appended"
        );
        Ok(MergeOutcome::Inserted)
    }

    /// Rows recorded for `date`, in file order.
    pub fn rows(&mut self, date: NaiveDate) -> Result<Vec<LedgerRow>, LedgerError> {
        self.store.load(date)
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

/// In-memory store, for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    days: BTreeMap<NaiveDate, Vec<LedgerRow>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn load(&mut self, date: NaiveDate) -> Result<Vec<LedgerRow>, LedgerError> {
        Ok(self.days.entry(date).or_default().clone())
    }

    fn append(&mut self, row: &LedgerRow) -> Result<(), LedgerError> {
        self.days.entry(row.date).or_default().push(row.clone());
        Ok(())
    }
}

/// One CSV file per day: `<dir>/Attendance_YYYY-MM-DD.csv`.
#[derive(Debug, Clone)]
pub struct CsvLedgerStore {
    dir: PathBuf,
}

impl CsvLedgerStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the ledger for `date`.
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("Attendance_{}.csv", date.format(DATE_FORMAT)))
    }

    /// Create the day's file with its header row if it does not exist yet.
    fn ensure_file(&self, path: &Path) -> Result<(), LedgerError> {
        if path.exists() {
            return Ok(());
        }
        let io_err = |source| LedgerError::Io { path: path.to_path_buf(), source };

        std::fs::create_dir_all(&self.dir).map_err(io_err)?;
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(io_err)?;

        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        writer.write_record(LEDGER_HEADER).map_err(|source| LedgerError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        writer.flush().map_err(io_err)?;
        writer.get_ref().sync_all().map_err(io_err)?;

        tracing::info!(path = %path.display(), "created ledger file");
        Ok(())
    }

    /// Parse a day's file. Fields are taken verbatim so names compare
    /// exactly as they were written.
    fn read_rows(path: &Path) -> Result<Vec<LedgerRow>, LedgerError> {
        let csv_err = |source| LedgerError::Csv { path: path.to_path_buf(), source };
        let malformed = |line: u64, reason: String| LedgerError::Malformed {
            path: path.to_path_buf(),
            line,
            reason,
        };

        let file = File::open(path).map_err(|source| LedgerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(file);

        let headers = reader.headers().map_err(csv_err)?.clone();
        if headers.iter().ne(LEDGER_HEADER) {
            return Err(malformed(1, format!("unexpected header {headers:?}")));
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(csv_err)?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            let field = |i: usize| record.get(i).unwrap_or_default();

            let name = field(0);
            if name.trim().is_empty() {
                return Err(malformed(line, "blank name".to_string()));
            }
            let date = NaiveDate::parse_from_str(field(1), DATE_FORMAT)
                .map_err(|e| malformed(line, format!("date {:?}: {e}", field(1))))?;
            let time = NaiveTime::parse_from_str(field(2), TIME_FORMAT)
                .map_err(|e| malformed(line, format!("time {:?}: {e}", field(2))))?;
            let status = field(3).parse::<Status>().map_err(|e| malformed(line, e))?;

            rows.push(LedgerRow {
                identity: Identity::new(name),
                date,
                time,
                status,
            });
        }
        Ok(rows)
    }
}

impl LedgerStore for CsvLedgerStore {
    fn load(&mut self, date: NaiveDate) -> Result<Vec<LedgerRow>, LedgerError> {
        let path = self.path_for(date);
        self.ensure_file(&path)?;
        Self::read_rows(&path)
    }

    fn append(&mut self, row: &LedgerRow) -> Result<(), LedgerError> {
        let path = self.path_for(row.date);
        self.ensure_file(&path)?;
        let io_err = |source| LedgerError::Io { path: path.clone(), source };

        let file = OpenOptions::new().append(true).open(&path).map_err(io_err)?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        writer.write_record(row.to_record()).map_err(|source| LedgerError::Csv {
            path: path.clone(),
            source,
        })?;
        writer.flush().map_err(io_err)?;
        writer.get_ref().sync_all().map_err(io_err)?;
        Ok(())
    }
}
