use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{Local, NaiveDateTime, TimeZone, Utc};

use crate::error::Result;

/// Seconds since the Unix epoch.
pub type Timestamp = i64;

/// All known snapshots keyed by their timestamp.
pub type ChainMap = BTreeMap<Timestamp, ChainEntry>;

/// Raw relative path → how it differs from the live source.
pub type DiffMap = HashMap<Vec<u8>, DiffStatus>;

/// Forward-only listing produced by the engine.
pub type FileRecordStream = Box<dyn Iterator<Item = Result<FileRecord>> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackupKind {
    Full,
    Incremental,
}

impl fmt::Display for BackupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackupKind::Full => "Full",
            BackupKind::Incremental => "Incremental",
        })
    }
}

/// One stored snapshot as reported by the engine's collection status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEntry {
    pub timestamp: Timestamp,
    pub kind: BackupKind,
    pub pretty_time: String,
    pub file_count: usize,
}

impl ChainEntry {
    pub fn new(timestamp: Timestamp, kind: BackupKind, file_count: usize) -> Self {
        Self {
            timestamp,
            kind,
            pretty_time: pretty_time(timestamp),
            file_count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryType {
    Directory,
    RegularFile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiffStatus {
    Unchanged,
    Added,
    Changed,
    Deleted,
}

impl DiffStatus {
    pub fn is_difference(self) -> bool {
        !matches!(self, DiffStatus::Unchanged)
    }
}

/// One entry of a snapshot listing. `path` is the raw `/`-separated relative
/// path as the engine emitted it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: Vec<u8>,
    pub mtime: Timestamp,
    pub entry_type: EntryType,
    pub diff_status: Option<DiffStatus>,
}

impl FileRecord {
    pub fn new(path: impl Into<Vec<u8>>, mtime: Timestamp, entry_type: EntryType) -> Self {
        Self {
            path: path.into(),
            mtime,
            entry_type,
            diff_status: None,
        }
    }

    pub fn with_status(mut self, status: DiffStatus) -> Self {
        self.diff_status = Some(status);
        self
    }

    pub fn path_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.path)
    }
}

const PRETTY_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

/// Local-time rendering used for chain lists and tree dates,
/// e.g. `Tue Jan  1 00:00:00 2019`.
pub fn pretty_time(ts: Timestamp) -> String {
    match Local.timestamp_opt(ts, 0).earliest() {
        Some(dt) => dt.format(PRETTY_FORMAT).to_string(),
        None => ts.to_string(),
    }
}

/// Inverse of [`pretty_time`]; tolerates the double space before
/// single-digit days.
pub fn parse_pretty_time(text: &str) -> Option<Timestamp> {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let naive = NaiveDateTime::parse_from_str(&collapsed, "%a %b %d %H:%M:%S %Y").ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp())
}

/// Engine machine-log time, e.g. `20190101T000000Z` (UTC).
pub fn parse_engine_time(text: &str) -> Option<Timestamp> {
    let naive = NaiveDateTime::parse_from_str(text, "%Y%m%dT%H%M%SZ").ok()?;
    Some(Utc.from_utc_datetime(&naive).timestamp())
}

/// Point-in-time argument understood by the engine's `--time` option.
pub fn engine_time_arg(ts: Timestamp) -> String {
    match Utc.timestamp_opt(ts, 0).single() {
        Some(dt) => dt.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        None => ts.to_string(),
    }
}
