use std::ffi::OsString;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use super::driver::{AbortHandle, EngineDriver};
use super::types::{engine_time_arg, ChainMap, DiffMap, FileRecord, FileRecordStream, Timestamp};
use crate::config::Profile;
use crate::error::{KyrianError, Result};
use crate::platform::fs::{is_vacant, os_arg};
use crate::progress::TransferCounters;

/// Tag carried by an engine call so it can later be terminated without
/// touching calls made by anyone else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallOwner(pub u64);

/// The only way into the engine. Owns the active profile and the driver, and
/// lets exactly one engine call be in flight at a time.
pub struct EngineGateway {
    profile: Profile,
    driver: Mutex<Box<dyn EngineDriver>>,
    /// Owner of the call holding `driver`, if it was tagged.
    owner: Mutex<Option<CallOwner>>,
    abort: AbortHandle,
    counters: Arc<TransferCounters>,
    force: AtomicBool,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn action_args<const N: usize>(words: [&str; N]) -> Vec<OsString> {
    words.into_iter().map(OsString::from).collect()
}

impl EngineGateway {
    pub fn new(profile: Profile, driver: Box<dyn EngineDriver>) -> Self {
        let abort = driver.abort_handle();
        Self {
            profile,
            driver: Mutex::new(driver),
            owner: Mutex::new(None),
            abort,
            counters: Arc::new(TransferCounters::new()),
            force: AtomicBool::new(false),
        }
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Counters the driver fills during [`backup`](Self::backup).
    pub fn counters(&self) -> Arc<TransferCounters> {
        Arc::clone(&self.counters)
    }

    /// Kill the in-flight engine call if, and only if, it was started on
    /// behalf of `owner`. Returns whether a call was stopped.
    pub fn abort_call(&self, owner: CallOwner) -> bool {
        // Held across the kill so the call cannot finish and hand the engine
        // to someone else in between.
        let current = lock(&self.owner);
        if *current != Some(owner) {
            return false;
        }
        debug!(owner = owner.0, "terminating engine call");
        self.abort.abort()
    }

    fn engine(&self, owner: Option<CallOwner>) -> EngineLock<'_> {
        let driver = lock(&self.driver);
        *lock(&self.owner) = owner;
        EngineLock {
            owner: &self.owner,
            driver,
        }
    }

    /// Encryption and agent flags, followed by the selection flags.
    fn common_flags(&self) -> Vec<OsString> {
        self.engine_flags()
            .chain(self.profile.selection_flags.iter().map(OsString::from))
            .collect()
    }

    fn engine_flags(&self) -> impl Iterator<Item = OsString> {
        self.profile.engine_flags().into_iter().map(OsString::from)
    }

    fn push_time(args: &mut Vec<OsString>, time: Option<Timestamp>) {
        if let Some(ts) = time {
            args.push("--time".into());
            args.push(engine_time_arg(ts).into());
        }
    }

    pub fn list_chains(&self) -> Result<ChainMap> {
        let target = self.profile.target()?;
        let mut args = action_args(["collection-status"]);
        args.extend(self.engine_flags());
        args.push(target.into());

        let entries = self.engine(None).collection_status(&args)?;
        Ok(entries.into_iter().map(|e| (e.timestamp, e)).collect())
    }

    /// Lazy listing of the snapshot at `time` (latest when `None`). The
    /// gateway stays busy until the returned listing is dropped.
    pub fn list_files(&self, time: Option<Timestamp>) -> Result<FileListing<'_>> {
        self.list_files_for(None, time)
    }

    /// [`list_files`](Self::list_files) tagged with `owner`.
    pub fn list_files_for(
        &self,
        owner: Option<CallOwner>,
        time: Option<Timestamp>,
    ) -> Result<FileListing<'_>> {
        let target = self.profile.target()?;
        let mut args = action_args(["list-current-files"]);
        Self::push_time(&mut args, time);
        args.extend(self.engine_flags());
        args.push(target.into());

        let mut engine = self.engine(owner);
        let records = engine.list_current_files(&args)?;
        Ok(FileListing {
            records,
            _engine: engine,
        })
    }

    pub fn diff(&self, time: Option<Timestamp>) -> Result<DiffMap> {
        self.diff_for(None, time)
    }

    /// [`diff`](Self::diff) tagged with `owner`.
    pub fn diff_for(&self, owner: Option<CallOwner>, time: Option<Timestamp>) -> Result<DiffMap> {
        let (source, target) = self.profile.source_and_target()?;
        let mut args = action_args(["verify", "--compare-data"]);
        Self::push_time(&mut args, time);
        args.extend(self.common_flags());
        args.push(target.into());
        args.push(source.into());

        self.engine(owner).verify(&args)
    }

    /// Fails with `DestinationNotEmpty` unless `destination` is vacant or the
    /// force flag is set.
    pub fn check_destination(&self, destination: &Path) -> Result<()> {
        if self.force_overwrite() || is_vacant(destination)? {
            return Ok(());
        }
        Err(KyrianError::DestinationNotEmpty(destination.to_path_buf()))
    }

    /// Restore `file` (raw relative path) or the whole snapshot as of `time`
    /// into `destination`.
    pub fn restore(
        &self,
        destination: &Path,
        file: Option<&[u8]>,
        time: Option<Timestamp>,
    ) -> Result<()> {
        let target = self.profile.target()?;
        self.check_destination(destination)?;

        let mut args = action_args(["restore"]);
        if self.force_overwrite() {
            args.push("--force".into());
        }
        if let Some(file) = file {
            args.push("--file-to-restore".into());
            args.push(os_arg(file));
        }
        Self::push_time(&mut args, time);
        args.extend(self.engine_flags());
        args.push(target.into());
        args.push(destination.into());

        info!(
            destination = %destination.display(),
            file = ?file.map(String::from_utf8_lossy),
            "restoring"
        );
        self.engine(None).restore(&args)
    }

    pub fn backup(&self) -> Result<()> {
        let (source, target) = self.profile.source_and_target()?;
        let mut args = self.common_flags();
        args.push(source.into());
        args.push(target.into());

        let mut engine = self.engine(None);
        self.counters.reset();
        engine.backup(&args, &self.counters)
    }

    pub fn force_overwrite(&self) -> bool {
        self.force.load(Ordering::Acquire)
    }

    /// Set the force-overwrite flag until the guard is dropped.
    pub fn scoped_force(&self, force: bool) -> ForceGuard<'_> {
        self.force.store(force, Ordering::Release);
        ForceGuard { flag: &self.force }
    }
}

/// Exclusive use of the driver. The owner tag is cleared before the driver
/// is released.
struct EngineLock<'a> {
    owner: &'a Mutex<Option<CallOwner>>,
    driver: MutexGuard<'a, Box<dyn EngineDriver>>,
}

impl Deref for EngineLock<'_> {
    type Target = Box<dyn EngineDriver>;

    fn deref(&self) -> &Self::Target {
        &self.driver
    }
}

impl DerefMut for EngineLock<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.driver
    }
}

impl Drop for EngineLock<'_> {
    fn drop(&mut self) {
        *lock(self.owner) = None;
    }
}

/// Clears the force-overwrite flag on drop, whatever the outcome.
#[must_use]
pub struct ForceGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for ForceGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// A running snapshot listing. Holds the gateway's engine lock; the stream
/// is dropped (and its engine process reaped) before the lock is released.
pub struct FileListing<'a> {
    records: FileRecordStream,
    _engine: EngineLock<'a>,
}

impl Iterator for FileListing<'_> {
    type Item = Result<FileRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.records.next()
    }
}
