use std::io::{self, BufRead, BufReader, Read};
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

/// Longest stderr excerpt carried into an error message.
const STDERR_TAIL_BYTES: usize = 4096;

/// Shared handle to the engine child currently running, if any. Any thread
/// holding a clone may kill it.
#[derive(Clone, Default)]
pub struct ProcessSlot {
    child: Arc<Mutex<Option<Child>>>,
}

impl ProcessSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Child>> {
        self.child.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Kill the running child. Returns whether there was one.
    pub fn kill(&self) -> bool {
        let mut guard = self.lock();
        match guard.as_mut() {
            Some(child) => {
                if let Err(e) = child.kill() {
                    tracing::debug!(pid = child.id(), "kill failed: {e}");
                }
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    fn is_occupied(&self) -> bool {
        self.lock().is_some()
    }
}

/// How a finished child exited, with the tail of its stderr.
#[derive(Debug)]
pub struct ProcessExit {
    pub status: ExitStatus,
    pub stderr: String,
}

impl ProcessExit {
    /// Last non-empty stderr line, or a description of the exit status.
    pub fn summary(&self) -> String {
        self.stderr
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.status.to_string())
    }
}

/// A spawned engine invocation whose stdout is read line by line. The child
/// lives in a [`ProcessSlot`] so it can be killed from another thread while
/// this side is blocked reading.
pub struct EngineProcess {
    slot: ProcessSlot,
    stdout: Option<BufReader<ChildStdout>>,
    stderr: Option<JoinHandle<String>>,
}

impl EngineProcess {
    pub fn spawn(cmd: &mut Command, slot: &ProcessSlot) -> io::Result<Self> {
        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = child.stdout.take().map(BufReader::new);
        let stderr = child.stderr.take().map(|mut r| {
            std::thread::spawn(move || {
                let mut buf = Vec::new();
                r.read_to_end(&mut buf).ok();
                let start = buf.len().saturating_sub(STDERR_TAIL_BYTES);
                String::from_utf8_lossy(&buf[start..]).into_owned()
            })
        });

        tracing::debug!(pid = child.id(), "engine process started");
        *slot.lock() = Some(child);

        Ok(Self {
            slot: slot.clone(),
            stdout,
            stderr,
        })
    }

    /// Next stdout line as raw bytes without its terminator, or `None` at
    /// end of output.
    pub fn next_line(&mut self) -> Option<io::Result<Vec<u8>>> {
        let reader = self.stdout.as_mut()?;
        let mut buf = Vec::new();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => {
                self.stdout = None;
                None
            }
            Ok(_) => {
                while matches!(buf.last(), Some(b'\n' | b'\r')) {
                    buf.pop();
                }
                Some(Ok(buf))
            }
            Err(e) => {
                self.stdout = None;
                Some(Err(e))
            }
        }
    }

    /// Read the remaining stdout as text.
    pub fn read_to_end(&mut self) -> io::Result<String> {
        let mut out = String::new();
        while let Some(line) = self.next_line() {
            out.push_str(&String::from_utf8_lossy(&line?));
            out.push('\n');
        }
        Ok(out)
    }

    /// Drain stdout, reap the child and collect its stderr.
    pub fn wait(mut self) -> io::Result<ProcessExit> {
        // Unread output would keep the child blocked on a full pipe.
        while let Some(line) = self.next_line() {
            line?;
        }
        let child = self.slot.lock().take();
        let status = match child {
            Some(mut child) => child.wait()?,
            None => {
                return Err(io::Error::other(
                    "engine process vanished from its slot",
                ))
            }
        };
        let stderr = self
            .stderr
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or_default();
        Ok(ProcessExit { status, stderr })
    }
}

impl Drop for EngineProcess {
    fn drop(&mut self) {
        let child = self.slot.lock().take();
        if let Some(mut child) = child {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}
