use std::ffi::OsString;
use std::fmt;
use std::sync::Arc;

use super::types::{ChainEntry, DiffMap, FileRecordStream};
use crate::error::Result;
use crate::progress::TransferCounters;

/// The backup engine itself. Each method receives a fully prepared argument
/// list (action word first) and blocks until the engine is done; only
/// `list_current_files` returns early with a lazy stream.
///
/// Implementations are not expected to be reentrant: [`EngineGateway`]
/// serializes every call.
///
/// [`EngineGateway`]: super::EngineGateway
pub trait EngineDriver: Send {
    fn collection_status(&mut self, args: &[OsString]) -> Result<Vec<ChainEntry>>;

    /// Depth-first, lexicographically ordered listing. The first record is
    /// the snapshot root.
    fn list_current_files(&mut self, args: &[OsString]) -> Result<FileRecordStream>;

    fn verify(&mut self, args: &[OsString]) -> Result<DiffMap>;

    fn restore(&mut self, args: &[OsString]) -> Result<()>;

    /// Publishes transfer progress into `counters` while running.
    fn backup(&mut self, args: &[OsString], counters: &TransferCounters) -> Result<()>;

    /// Handle that forcibly stops whatever the driver is running.
    fn abort_handle(&self) -> AbortHandle {
        AbortHandle::noop()
    }
}

/// Forced-termination hook for the in-flight engine call. Aborting when
/// nothing is running is harmless. Callers that must not disturb other
/// callers go through [`EngineGateway::abort_call`].
///
/// [`EngineGateway::abort_call`]: super::EngineGateway::abort_call
#[derive(Clone)]
pub struct AbortHandle {
    abort: Arc<dyn Fn() -> bool + Send + Sync>,
}

impl AbortHandle {
    pub fn new(abort: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        Self {
            abort: Arc::new(abort),
        }
    }

    pub fn noop() -> Self {
        Self::new(|| false)
    }

    /// Returns whether something was actually stopped.
    pub fn abort(&self) -> bool {
        (self.abort)()
    }
}

impl fmt::Debug for AbortHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AbortHandle")
    }
}
