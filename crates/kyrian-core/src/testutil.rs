use std::collections::HashMap;
use std::ffi::OsString;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::engine::{
    engine_time_arg, AbortHandle, ChainEntry, DiffMap, EngineDriver, FileRecord, FileRecordStream,
    Timestamp,
};
use crate::error::{KyrianError, Result};
use crate::progress::{TransferCounters, TransferSample};

#[derive(Default)]
struct GateState {
    open: bool,
    waiting: usize,
    killed: bool,
}

/// Blocks an engine action until opened, or until the driver is aborted.
#[derive(Default)]
pub struct Gate {
    state: Mutex<GateState>,
    changed: Condvar,
}

impl Gate {
    pub fn open(&self) {
        let mut st = self.state.lock().unwrap();
        st.open = true;
        self.changed.notify_all();
    }

    /// Wait until some call is blocked on this gate.
    pub fn wait_entered(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut st = self.state.lock().unwrap();
        while st.waiting == 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            st = self.changed.wait_timeout(st, deadline - now).unwrap().0;
        }
        true
    }

    fn pass(&self, action: &'static str) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        st.waiting += 1;
        self.changed.notify_all();
        while !st.open && !st.killed {
            st = self.changed.wait(st).unwrap();
        }
        st.waiting -= 1;
        if std::mem::take(&mut st.killed) {
            return Err(KyrianError::Engine {
                action,
                code: None,
                message: "killed".into(),
            });
        }
        Ok(())
    }

    fn kill(&self) -> bool {
        let mut st = self.state.lock().unwrap();
        if st.waiting == 0 {
            return false;
        }
        st.killed = true;
        self.changed.notify_all();
        true
    }
}

/// Everything a [`ScriptedEngine`] answers with, and what it observed.
#[derive(Default)]
pub struct Script {
    pub chains: Mutex<Vec<ChainEntry>>,
    /// Keyed by the `--time` argument; `None` for "latest".
    listings: Mutex<HashMap<Option<String>, Vec<FileRecord>>>,
    diffs: Mutex<HashMap<Option<String>, DiffMap>>,
    pub progress: Mutex<Vec<TransferSample>>,
    /// Action → exit code to fail with.
    pub failures: Mutex<HashMap<&'static str, i32>>,
    gates: Mutex<HashMap<&'static str, Arc<Gate>>>,
    pub calls: Mutex<Vec<(&'static str, Vec<String>)>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl Script {
    pub fn set_listing(&self, time: Timestamp, paths: &[(&str, crate::engine::EntryType)]) {
        let records = paths
            .iter()
            .map(|(p, t)| FileRecord::new(*p, time, *t))
            .collect();
        self.listings
            .lock()
            .unwrap()
            .insert(Some(engine_time_arg(time)), records);
    }

    pub fn set_diff(&self, time: Timestamp, entries: &[(&str, crate::engine::DiffStatus)]) {
        let diff = entries
            .iter()
            .map(|(p, s)| (p.as_bytes().to_vec(), *s))
            .collect();
        self.diffs
            .lock()
            .unwrap()
            .insert(Some(engine_time_arg(time)), diff);
    }

    pub fn fail(&self, action: &'static str, code: i32) {
        self.failures.lock().unwrap().insert(action, code);
    }

    /// Close a gate on `action`; calls block until it is opened.
    pub fn gate(&self, action: &'static str) -> Arc<Gate> {
        Arc::clone(self.gates.lock().unwrap().entry(action).or_default())
    }

    pub fn calls_to(&self, action: &str) -> Vec<Vec<String>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(a, _)| *a == action)
            .map(|(_, args)| args.clone())
            .collect()
    }

    /// Highest number of engine calls observed in flight at once.
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn enter(self: &Arc<Self>, action: &'static str, args: &[OsString]) -> Result<ActiveCall> {
        let recorded = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        self.calls.lock().unwrap().push((action, recorded));
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        let call = ActiveCall(Arc::clone(self));

        let gate = self.gates.lock().unwrap().get(action).cloned();
        if let Some(gate) = gate {
            gate.pass(action)?;
        }
        if let Some(&code) = self.failures.lock().unwrap().get(action) {
            return Err(KyrianError::Engine {
                action,
                code: Some(code),
                message: format!("scripted {action} failure"),
            });
        }
        Ok(call)
    }
}

/// Counts one in-flight engine call until dropped.
struct ActiveCall(Arc<Script>);

impl Drop for ActiveCall {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Keeps the listing call counted as in flight until the stream is dropped.
struct ScriptedListing {
    records: std::vec::IntoIter<FileRecord>,
    _call: ActiveCall,
}

impl Iterator for ScriptedListing {
    type Item = Result<FileRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.records.next().map(Ok)
    }
}

fn time_arg(args: &[OsString]) -> Option<String> {
    args.iter()
        .position(|a| a == "--time")
        .and_then(|i| args.get(i + 1))
        .map(|a| a.to_string_lossy().into_owned())
}

/// In-memory engine for coordinator and gateway tests.
#[derive(Clone, Default)]
pub struct ScriptedEngine {
    script: Arc<Script>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self) -> Arc<Script> {
        Arc::clone(&self.script)
    }
}

impl EngineDriver for ScriptedEngine {
    fn collection_status(&mut self, args: &[OsString]) -> Result<Vec<ChainEntry>> {
        let _call = self.script.enter("collection-status", args)?;
        Ok(self.script.chains.lock().unwrap().clone())
    }

    fn list_current_files(&mut self, args: &[OsString]) -> Result<FileRecordStream> {
        let call = self.script.enter("list-current-files", args)?;
        let records = self
            .script
            .listings
            .lock()
            .unwrap()
            .get(&time_arg(args))
            .cloned()
            .unwrap_or_default();
        Ok(Box::new(ScriptedListing {
            records: records.into_iter(),
            _call: call,
        }))
    }

    fn verify(&mut self, args: &[OsString]) -> Result<DiffMap> {
        let _call = self.script.enter("verify", args)?;
        Ok(self
            .script
            .diffs
            .lock()
            .unwrap()
            .get(&time_arg(args))
            .cloned()
            .unwrap_or_default())
    }

    fn restore(&mut self, args: &[OsString]) -> Result<()> {
        let _call = self.script.enter("restore", args)?;
        Ok(())
    }

    fn backup(&mut self, args: &[OsString], counters: &TransferCounters) -> Result<()> {
        let samples = self.script.progress.lock().unwrap().clone();
        let mut samples = samples.into_iter();
        // The first sample is visible while the call is gated.
        if let Some(first) = samples.next() {
            counters.record(first);
        }
        let _call = self.script.enter("backup", args)?;
        for sample in samples {
            counters.record(sample);
            std::thread::sleep(Duration::from_millis(5));
        }
        Ok(())
    }

    fn abort_handle(&self) -> AbortHandle {
        let script = Arc::clone(&self.script);
        AbortHandle::new(move || {
            let gates: Vec<_> = script.gates.lock().unwrap().values().cloned().collect();
            gates.iter().fold(false, |killed, g| g.kill() || killed)
        })
    }
}
