use std::io::{self, IsTerminal, Stderr, Write};
use std::sync::atomic::{AtomicBool, Ordering::Relaxed};
use std::sync::{Mutex, MutexGuard};

use tracing_subscriber::fmt::MakeWriter;

use kyrian_core::progress::ProgressReport;

use crate::format::{format_eta, format_rate};

const DEFAULT_PROGRESS_COLUMNS: usize = 120;
const BAR_WIDTH: usize = 24;

// ---------------------------------------------------------------------------
// Shared state between the progress renderer and the tracing writer
// ---------------------------------------------------------------------------

/// True while a backup progress line is being displayed on stderr.
static PROGRESS_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Serializes all stderr writes between the progress renderer and tracing.
static STDERR_LOCK: Mutex<()> = Mutex::new(());

fn acquire_stderr_lock() -> MutexGuard<'static, ()> {
    STDERR_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// Progress-aware tracing writer
// ---------------------------------------------------------------------------

/// A [`MakeWriter`] that clears the progress line before each tracing event,
/// preventing log messages from corrupting the `\r`-based progress display.
pub(crate) struct ProgressAwareStderr;

/// Holds the `STDERR_LOCK` guard for the entire lifetime of a single tracing
/// write, so the lock spans from the line-clear through the full log message.
pub(crate) struct ProgressWriter {
    _guard: MutexGuard<'static, ()>,
    inner: Stderr,
}

impl Write for ProgressWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<'a> MakeWriter<'a> for ProgressAwareStderr {
    type Writer = ProgressWriter;

    fn make_writer(&'a self) -> Self::Writer {
        let guard = acquire_stderr_lock();
        let mut stderr = io::stderr();

        if PROGRESS_ACTIVE.load(Relaxed) && stderr.is_terminal() {
            let _ = stderr.write_all(b"\r\x1b[2K");
        }

        ProgressWriter {
            _guard: guard,
            inner: stderr,
        }
    }
}

// ---------------------------------------------------------------------------
// Backup progress renderer
// ---------------------------------------------------------------------------

pub(crate) struct BackupProgressRenderer {
    last_line_len: usize,
    rendered_any: bool,
    interactive: bool,
}

impl BackupProgressRenderer {
    pub(crate) fn new() -> Self {
        let interactive = io::stderr().is_terminal();
        PROGRESS_ACTIVE.store(interactive, Relaxed);
        Self {
            last_line_len: 0,
            rendered_any: false,
            interactive,
        }
    }

    pub(crate) fn on_report(&mut self, report: &ProgressReport) {
        let line = progress_line(report);
        let _guard = acquire_stderr_lock();
        if !self.interactive {
            // One line per change when stderr is a pipe or file.
            eprintln!("{line}");
            return;
        }
        let line: String = line.chars().take(terminal_columns().saturating_sub(1)).collect();
        let line_len = line.chars().count();
        let pad_len = self.last_line_len.saturating_sub(line_len);
        eprint!("\r{line}{}", " ".repeat(pad_len));
        let _ = io::stderr().flush();
        self.last_line_len = line_len;
        self.rendered_any = true;
    }

    pub(crate) fn finish(&mut self) {
        if self.rendered_any {
            let _guard = acquire_stderr_lock();
            eprintln!();
        }
        PROGRESS_ACTIVE.store(false, Relaxed);
        self.rendered_any = false;
        self.last_line_len = 0;
    }
}

impl Drop for BackupProgressRenderer {
    fn drop(&mut self) {
        PROGRESS_ACTIVE.store(false, Relaxed);
    }
}

fn progress_line(report: &ProgressReport) -> String {
    let filled = (report.percent as usize * BAR_WIDTH) / 100;
    let bar = format!("{}{}", "#".repeat(filled), "-".repeat(BAR_WIDTH - filled));
    let eta = match report.eta {
        _ if report.is_complete() => "done".to_string(),
        Some(eta) => format!("ETA {}", format_eta(eta)),
        None => "ETA -".to_string(),
    };
    let stalled = if report.stalled { "  (stalled)" } else { "" };
    format!(
        "[{bar}] {:>3}%  {eta}  {}{stalled}",
        report.percent,
        format_rate(report.throughput)
    )
}

fn terminal_columns() -> usize {
    terminal_columns_os()
        .or_else(|| {
            std::env::var("COLUMNS")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .filter(|&v| v > 0)
        })
        .unwrap_or(DEFAULT_PROGRESS_COLUMNS)
}

/// Query the OS for the terminal width of stderr.
#[cfg(unix)]
fn terminal_columns_os() -> Option<usize> {
    use libc::{ioctl, winsize, STDERR_FILENO, TIOCGWINSZ};
    unsafe {
        let mut ws: winsize = std::mem::zeroed();
        if ioctl(STDERR_FILENO, TIOCGWINSZ, &mut ws) == 0 && ws.ws_col > 0 {
            Some(ws.ws_col as usize)
        } else {
            None
        }
    }
}

#[cfg(not(unix))]
fn terminal_columns_os() -> Option<usize> {
    None
}
