use std::path::PathBuf;
use std::sync::Arc;

use crate::engine::{CallOwner, ChainMap, DiffMap, Timestamp};
use crate::error::{KyrianError, Result};
use crate::progress::ProgressReport;
use crate::tree::SnapshotTree;

/// How a task ended.
#[derive(Debug)]
pub enum Outcome<T> {
    Succeeded(T),
    Failed(KyrianError),
    Cancelled,
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded(_))
    }

    pub fn error(&self) -> Option<&KyrianError> {
        match self {
            Outcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}

impl<T> From<Result<T>> for Outcome<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(v) => Outcome::Succeeded(v),
            Err(e) => Outcome::Failed(e),
        }
    }
}

/// Identifies one tree-build request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TreeRequest(pub(super) u64);

impl TreeRequest {
    pub fn id(&self) -> u64 {
        self.0
    }

    pub(super) fn owner(&self) -> CallOwner {
        CallOwner(self.0)
    }
}

/// Restore of a single path (`file`, raw relative path bytes) or of the
/// whole snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryRequest {
    pub file: Option<Vec<u8>>,
    pub time: Option<Timestamp>,
    pub destination: PathBuf,
    pub force: bool,
}

/// A finished tree build.
#[derive(Debug, Clone)]
pub struct TreeSnapshot {
    pub time: Timestamp,
    pub tree: SnapshotTree,
    /// Present when highlighting was requested.
    pub diff: Option<Arc<DiffMap>>,
    /// The file listing came from the snapshot cache.
    pub from_cache: bool,
}

#[derive(Debug)]
pub enum Event {
    /// A chain listing finished, either on request or after a backup.
    ChainsRefreshed(Outcome<ChainMap>),
    BackupFinished(Outcome<()>),
    RecoveryFinished {
        request: RecoveryRequest,
        outcome: Outcome<()>,
    },
    TreeBuilt {
        request: TreeRequest,
        time: Timestamp,
        outcome: Outcome<TreeSnapshot>,
    },
    Progress(ProgressReport),
}

/// Timestamp of the most recent chain.
pub fn newest_chain(chains: &ChainMap) -> Option<Timestamp> {
    chains.keys().next_back().copied()
}
