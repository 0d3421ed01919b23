//! Runs engine work on background threads while keeping the engine single
//! flight: Backup and Recovery exclude each other, TreeBuild is preempted by
//! either of them and by newer tree requests, and ProgressPoll lives exactly
//! as long as a backup.

mod cache;
mod events;
mod slot;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, warn};

pub use self::events::{newest_chain, Event, Outcome, RecoveryRequest, TreeRequest, TreeSnapshot};
pub use self::slot::{SlotState, TaskKind};

use self::cache::SnapshotCache;
use self::slot::{ExclusiveClaim, TaskSlot};
use crate::config::{Profile, Settings};
use crate::engine::{CallOwner, ChainMap, EngineGateway, Timestamp};
use crate::error::Result;
use crate::progress::poll_progress;
use crate::tree::{apply_highlights, build_tree, Lookup};

/// How often a preempting task checks whether a cancelled tree build exited,
/// and, past the grace period, retries terminating its engine call.
const STOP_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorOptions {
    pub poll_interval: Duration,
    /// How long a cancelled tree build may keep running before its engine
    /// call is killed.
    pub grace_period: Duration,
}

impl From<&Settings> for CoordinatorOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            poll_interval: settings.poll_interval(),
            grace_period: settings.tree_grace_period(),
        }
    }
}

struct RunningBuild {
    request: TreeRequest,
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

struct Inner {
    gateway: EngineGateway,
    options: CoordinatorOptions,
    backup: TaskSlot,
    recovery: TaskSlot,
    tree: TaskSlot,
    poll: TaskSlot,
    /// Held by whichever of Backup/Recovery is running.
    exclusive: AtomicBool,
    /// Most recent tree build; older ones are owned by their successor.
    build: Mutex<Option<RunningBuild>>,
    next_request: AtomicU64,
    chains: Mutex<ChainMap>,
    cache: Mutex<SnapshotCache>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    events: Sender<Event>,
}

/// Front door for callers: every `start_*` returns immediately and the
/// result arrives on [`events`](Self::events).
pub struct TaskCoordinator {
    inner: Arc<Inner>,
    events: Receiver<Event>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl TaskCoordinator {
    pub fn new(gateway: EngineGateway, options: CoordinatorOptions) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            inner: Arc::new(Inner {
                gateway,
                options,
                backup: TaskSlot::new(),
                recovery: TaskSlot::new(),
                tree: TaskSlot::new(),
                poll: TaskSlot::new(),
                exclusive: AtomicBool::new(false),
                build: Mutex::new(None),
                next_request: AtomicU64::new(0),
                chains: Mutex::new(ChainMap::new()),
                cache: Mutex::new(SnapshotCache::default()),
                workers: Mutex::new(Vec::new()),
                events: tx,
            }),
            events: rx,
        }
    }

    pub fn events(&self) -> &Receiver<Event> {
        &self.events
    }

    pub fn profile(&self) -> &Profile {
        self.inner.gateway.profile()
    }

    pub fn slot_state(&self, kind: TaskKind) -> SlotState {
        self.inner.slot(kind).state()
    }

    /// Whether a restore would currently be allowed to overwrite.
    pub fn force_overwrite(&self) -> bool {
        self.inner.gateway.force_overwrite()
    }

    /// Chains from the last successful listing.
    pub fn chains(&self) -> ChainMap {
        lock(&self.inner.chains).clone()
    }

    /// Query the engine for the chain list on a worker thread. The result
    /// arrives as [`Event::ChainsRefreshed`].
    pub fn start_chain_refresh(&self) -> Result<()> {
        self.inner.gateway.profile().target()?;
        let inner = Arc::clone(&self.inner);
        self.spawn_worker("chain-refresh", move || {
            let listed = inner.gateway.list_chains();
            inner.publish_chains(listed);
        })?;
        Ok(())
    }

    /// Returns `Ok(false)` if Backup or Recovery is already running.
    pub fn start_backup(&self) -> Result<bool> {
        self.inner.gateway.profile().source_and_target()?;
        self.start_exclusive(TaskKind::Backup, "backup", |inner, claim| {
            inner.run_backup(claim)
        })
    }

    /// Restore one path, or the whole snapshot when `request.file` is `None`.
    /// Returns `Ok(false)` if Backup or Recovery is already running.
    pub fn start_recovery(&self, request: RecoveryRequest) -> Result<bool> {
        self.inner.gateway.profile().target()?;
        self.start_exclusive(TaskKind::Recovery, "recovery", move |inner, claim| {
            inner.run_recovery(request, claim)
        })
    }

    /// Whole-snapshot restore.
    pub fn start_restore_snapshot(
        &self,
        time: Option<Timestamp>,
        destination: impl Into<std::path::PathBuf>,
        force: bool,
    ) -> Result<bool> {
        self.start_recovery(RecoveryRequest {
            file: None,
            time,
            destination: destination.into(),
            force,
        })
    }

    fn start_exclusive<F>(&self, kind: TaskKind, name: &str, run: F) -> Result<bool>
    where
        F: for<'a> FnOnce(&'a Inner, ExclusiveClaim<'a>) + Send + 'static,
    {
        let Some(claim) = ExclusiveClaim::try_claim(&self.inner.exclusive) else {
            debug!(task = %kind, "dropping request: backup or recovery already running");
            return Ok(false);
        };
        let slot = self.inner.slot(kind);
        slot.set_running(true);

        let inner = Arc::clone(&self.inner);
        let spawned = self.spawn_worker(name, move || {
            let inner = &*inner;
            run(inner, ExclusiveClaim::adopt(&inner.exclusive))
        });
        match spawned {
            Ok(()) => {
                // Released by the worker from here on.
                std::mem::forget(claim);
                Ok(true)
            }
            Err(e) => {
                slot.set_running(false);
                Err(e.into())
            }
        }
    }

    /// Start a thread that [`shutdown`](Self::shutdown) waits for.
    fn spawn_worker<F>(&self, name: &str, run: F) -> std::io::Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = thread::Builder::new().name(name.into()).spawn(run)?;
        let mut workers = lock(&self.inner.workers);
        workers.retain(|h| !h.is_finished());
        workers.push(handle);
        Ok(())
    }

    /// Build the tree for the snapshot at `time`, replacing any build still
    /// in progress. Returns `Ok(None)` when dropped because Backup or
    /// Recovery is running.
    pub fn start_tree_build(&self, time: Timestamp, highlight: bool) -> Result<Option<TreeRequest>> {
        let profile = self.inner.gateway.profile();
        profile.target()?;
        if highlight {
            profile.source_and_target()?;
        }

        let mut current = lock(&self.inner.build);
        if self.inner.exclusive.load(Ordering::Acquire) {
            debug!(time, "dropping tree build: backup or recovery running");
            return Ok(None);
        }

        let request = TreeRequest(self.inner.next_request.fetch_add(1, Ordering::Relaxed) + 1);
        let previous = current.take();
        if let Some(prev) = &previous {
            debug!(stale = prev.request.id(), request = request.id(), "superseding tree build");
            prev.cancel.store(true, Ordering::Release);
        }

        let cancel = Arc::new(AtomicBool::new(false));
        let inner = Arc::clone(&self.inner);
        let flag = Arc::clone(&cancel);
        let handle = thread::Builder::new()
            .name("tree-build".into())
            .spawn(move || inner.run_tree_build(request, time, highlight, &flag, previous))?;

        self.inner.tree.set_running(true);
        *current = Some(RunningBuild {
            request,
            cancel,
            handle,
        });
        Ok(Some(request))
    }

    /// Stop any tree build, then wait for Backup/Recovery and chain
    /// refreshes to finish.
    pub fn shutdown(&self) {
        self.inner.preempt_tree_build();
        let workers: Vec<_> = lock(&self.inner.workers).drain(..).collect();
        for handle in workers {
            if handle.join().is_err() {
                warn!("worker thread panicked");
            }
        }
    }
}

impl Inner {
    fn slot(&self, kind: TaskKind) -> &TaskSlot {
        match kind {
            TaskKind::Backup => &self.backup,
            TaskKind::Recovery => &self.recovery,
            TaskKind::TreeBuild => &self.tree,
            TaskKind::ProgressPoll => &self.poll,
        }
    }

    fn emit(&self, event: Event) {
        let _ = self.events.send(event);
    }

    fn run_backup(&self, claim: ExclusiveClaim<'_>) {
        let idle = self.backup.idle_on_drop();
        self.preempt_tree_build();
        info!("backup started");

        let counters = self.gateway.counters();
        counters.reset();
        let (cancel_tx, cancel_rx) = crossbeam_channel::bounded::<()>(1);
        let events = self.events.clone();
        let interval = self.options.poll_interval;
        self.poll.set_running(true);
        let poller = thread::Builder::new()
            .name("progress-poll".into())
            .spawn(move || {
                poll_progress(&counters, interval, &cancel_rx, |report| {
                    let _ = events.send(Event::Progress(report));
                })
            });
        if let Err(e) = &poller {
            warn!("cannot start progress poller: {e}");
        }

        let result = {
            let _engine = self.backup.engine_section();
            self.gateway.backup()
        };

        drop(cancel_tx);
        if let Ok(handle) = poller {
            if handle.join().is_err() {
                warn!("progress poller panicked");
            }
        }
        self.poll.set_running(false);
        lock(&self.cache).invalidate_diffs();

        match &result {
            Ok(()) => {
                info!("backup finished");
                self.refresh_chains();
            }
            Err(e) => warn!("backup failed: {e}"),
        }
        drop(idle);
        drop(claim);
        self.emit(Event::BackupFinished(result.into()));
    }

    fn refresh_chains(&self) {
        let listed = {
            let _engine = self.backup.engine_section();
            self.gateway.list_chains()
        };
        self.publish_chains(listed);
    }

    /// Record a chain listing, forget cached snapshots that are gone, and
    /// report it.
    fn publish_chains(&self, listed: Result<ChainMap>) {
        match &listed {
            Ok(chains) => {
                *lock(&self.chains) = chains.clone();
                lock(&self.cache).retain(|time| chains.contains_key(&time));
            }
            Err(e) => warn!("cannot list chains: {e}"),
        }
        self.emit(Event::ChainsRefreshed(listed.into()));
    }

    fn run_recovery(&self, request: RecoveryRequest, claim: ExclusiveClaim<'_>) {
        let idle = self.recovery.idle_on_drop();
        self.preempt_tree_build();
        info!(
            destination = %request.destination.display(),
            file = ?request.file.as_deref().map(String::from_utf8_lossy),
            "recovery started"
        );

        let result = {
            let _force = self.gateway.scoped_force(request.force);
            self.gateway
                .check_destination(&request.destination)
                .and_then(|()| {
                    let _engine = self.recovery.engine_section();
                    self.gateway.restore(
                        &request.destination,
                        request.file.as_deref(),
                        request.time,
                    )
                })
        };
        lock(&self.cache).invalidate_diffs();

        match &result {
            Ok(()) => info!("recovery finished"),
            Err(e) => warn!("recovery failed: {e}"),
        }
        drop(idle);
        drop(claim);
        self.emit(Event::RecoveryFinished {
            request,
            outcome: result.into(),
        });
    }

    /// Cancel the current tree build, give it the grace period, then kill its
    /// engine call and wait for the thread.
    fn preempt_tree_build(&self) {
        let running = lock(&self.build).take();
        if let Some(build) = running {
            build.cancel.store(true, Ordering::Release);
            self.stop_build(build);
        }
        let current = lock(&self.build);
        if current.is_none() {
            self.tree.set_running(false);
        }
    }

    /// Past the grace period only the build's own engine call is killed; if
    /// it is still waiting for the engine, the kill is retried until that
    /// call starts or the thread exits.
    fn stop_build(&self, build: RunningBuild) {
        let grace = self.options.grace_period;
        let deadline = Instant::now() + grace;
        let owner = build.request.owner();
        let mut warned = false;
        while !build.handle.is_finished() {
            if Instant::now() >= deadline {
                if !warned {
                    warned = true;
                    warn!(
                        request = build.request.id(),
                        "tree build still running {grace:?} after cancellation; terminating engine call"
                    );
                }
                if self.gateway.abort_call(owner) {
                    break;
                }
            }
            thread::sleep(STOP_POLL);
        }
        if build.handle.join().is_err() {
            warn!(request = build.request.id(), "tree build thread panicked");
        }
    }

    fn run_tree_build(
        &self,
        request: TreeRequest,
        time: Timestamp,
        highlight: bool,
        cancel: &AtomicBool,
        previous: Option<RunningBuild>,
    ) {
        if let Some(prev) = previous {
            self.stop_build(prev);
        }

        let outcome = if cancel.load(Ordering::Acquire) {
            Outcome::Cancelled
        } else {
            info!(request = request.id(), time, highlight, "tree build started");
            match self.build_snapshot(request.owner(), time, highlight, cancel) {
                Ok(Some(snapshot)) => Outcome::Succeeded(snapshot),
                Ok(None) => Outcome::Cancelled,
                Err(e) => Outcome::Failed(e),
            }
        };
        // A superseded build reports nothing it produced.
        let outcome = if cancel.load(Ordering::Acquire) {
            Outcome::Cancelled
        } else {
            outcome
        };

        match &outcome {
            Outcome::Succeeded(_) => info!(request = request.id(), "tree build finished"),
            Outcome::Failed(e) => warn!(request = request.id(), "tree build failed: {e}"),
            Outcome::Cancelled => debug!(request = request.id(), "tree build cancelled"),
        }
        {
            let current = lock(&self.build);
            let latest = current.as_ref().map(|b| b.request);
            if latest.is_none() || latest == Some(request) {
                self.tree.set_running(false);
            }
        }
        self.emit(Event::TreeBuilt {
            request,
            time,
            outcome,
        });
    }

    fn build_snapshot(
        &self,
        owner: CallOwner,
        time: Timestamp,
        highlight: bool,
        cancel: &AtomicBool,
    ) -> Result<Option<TreeSnapshot>> {
        let (cached_tree, cached_diff) = {
            let cache = lock(&self.cache);
            (cache.tree(time), cache.diff(time))
        };

        let diff = match (highlight, cached_diff) {
            (false, _) => None,
            (true, Some(diff)) => {
                debug!(time, "diff cache hit");
                Some(diff)
            }
            (true, None) => {
                let diff = {
                    let _engine = self.tree.engine_section();
                    Arc::new(self.gateway.diff_for(Some(owner), Some(time))?)
                };
                lock(&self.cache).store_diff(time, Arc::clone(&diff));
                Some(diff)
            }
        };
        if cancel.load(Ordering::Acquire) {
            return Ok(None);
        }

        let from_cache = cached_tree.is_some();
        let mut tree = match cached_tree {
            Some(tree) => {
                debug!(time, "tree cache hit");
                tree
            }
            None => {
                let built = {
                    let _engine = self.tree.engine_section();
                    let listing = self.gateway.list_files_for(Some(owner), Some(time))?;
                    let root = self.gateway.profile().source_name();
                    build_tree(listing, &root, time, Lookup::Ordered, cancel)?
                };
                let Some(tree) = built else {
                    return Ok(None);
                };
                lock(&self.cache).store_tree(time, tree.clone());
                tree
            }
        };

        if let Some(diff) = &diff {
            if !apply_highlights(&mut tree, diff, cancel) {
                return Ok(None);
            }
        }
        Ok(Some(TreeSnapshot {
            time,
            tree,
            diff,
            from_cache,
        }))
    }
}
