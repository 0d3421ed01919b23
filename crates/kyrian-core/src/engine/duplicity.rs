use std::ffi::OsString;
use std::process::Command;

use tracing::{debug, warn};

use super::driver::{AbortHandle, EngineDriver};
use super::parse;
use super::types::{ChainEntry, DiffMap, FileRecord, FileRecordStream};
use crate::error::{KyrianError, Result};
use crate::platform::process::{EngineProcess, ProcessSlot};
use crate::progress::TransferCounters;

/// Machine-readable log on stdout.
const MACHINE_LOG: [&str; 2] = ["--log-fd", "1"];

/// Drives the engine as a child process, one invocation per call.
pub struct DuplicityDriver {
    program: String,
    slot: ProcessSlot,
}

impl DuplicityDriver {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            slot: ProcessSlot::new(),
        }
    }

    fn spawn(&self, action: &'static str, args: &[OsString], extra: &[&str]) -> Result<EngineProcess> {
        let mut cmd = Command::new(&self.program);
        cmd.args(args).args(extra).env("LC_ALL", "C");
        debug!(program = %self.program, ?args, "invoking engine");
        EngineProcess::spawn(&mut cmd, &self.slot).map_err(|e| KyrianError::Engine {
            action,
            code: None,
            message: format!("cannot start '{}': {e}", self.program),
        })
    }
}

/// Reap `process` and turn an unexpected exit status into an engine error.
fn finish(action: &'static str, process: EngineProcess, ok_codes: &[i32]) -> Result<()> {
    let exit = process.wait()?;
    match exit.status.code() {
        Some(code) if ok_codes.contains(&code) => Ok(()),
        code => {
            if !exit.stderr.trim().is_empty() {
                warn!(action, "engine stderr:\n{}", exit.stderr.trim_end());
            }
            Err(KyrianError::Engine {
                action,
                code,
                message: exit.summary(),
            })
        }
    }
}

impl EngineDriver for DuplicityDriver {
    fn collection_status(&mut self, args: &[OsString]) -> Result<Vec<ChainEntry>> {
        let mut process = self.spawn("collection-status", args, &[])?;
        let text = process.read_to_end()?;
        finish("collection-status", process, &[0])?;
        parse::collection_status(&text)
    }

    fn list_current_files(&mut self, args: &[OsString]) -> Result<FileRecordStream> {
        let process = self.spawn("list-current-files", args, &MACHINE_LOG)?;
        Ok(Box::new(FileListStream {
            process: Some(process),
        }))
    }

    fn verify(&mut self, args: &[OsString]) -> Result<DiffMap> {
        let mut process = self.spawn("verify", args, &MACHINE_LOG)?;
        let mut diff = DiffMap::new();
        while let Some(line) = process.next_line() {
            if let Some(entry) = parse::diff_line(&line?) {
                let (path, status) = entry?;
                diff.insert(path, status);
            }
        }
        // Exit status 1 means "differences found".
        finish("verify", process, &[0, 1])?;
        Ok(diff)
    }

    fn restore(&mut self, args: &[OsString]) -> Result<()> {
        let process = self.spawn("restore", args, &[])?;
        finish("restore", process, &[0])
    }

    fn backup(&mut self, args: &[OsString], counters: &TransferCounters) -> Result<()> {
        let mut process = self.spawn("backup", args, &["--progress", MACHINE_LOG[0], MACHINE_LOG[1]])?;
        while let Some(line) = process.next_line() {
            match parse::progress_line(&String::from_utf8_lossy(&line?)) {
                Some(Ok(sample)) => counters.record(sample),
                Some(Err(e)) => debug!("ignoring progress line: {e}"),
                None => {}
            }
        }
        finish("backup", process, &[0])
    }

    fn abort_handle(&self) -> AbortHandle {
        let slot = self.slot.clone();
        AbortHandle::new(move || slot.kill())
    }
}

/// Lazy listing over a running `list-current-files`. Dropping it early kills
/// the child.
struct FileListStream {
    process: Option<EngineProcess>,
}

impl Iterator for FileListStream {
    type Item = Result<FileRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let process = self.process.as_mut()?;
            match process.next_line() {
                Some(Ok(line)) => {
                    if let Some(record) = parse::file_list_line(&line) {
                        return Some(record);
                    }
                }
                Some(Err(e)) => {
                    self.process = None;
                    return Some(Err(e.into()));
                }
                None => {
                    let process = self.process.take()?;
                    return finish("list-current-files", process, &[0]).err().map(Err);
                }
            }
        }
    }
}
