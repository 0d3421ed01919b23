use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Backup,
    Recovery,
    TreeBuild,
    ProgressPoll,
}

#[cfg(test)]
impl TaskKind {
    pub(crate) const ALL: [TaskKind; 4] = [
        TaskKind::Backup,
        TaskKind::Recovery,
        TaskKind::TreeBuild,
        TaskKind::ProgressPoll,
    ];
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskKind::Backup => "backup",
            TaskKind::Recovery => "recovery",
            TaskKind::TreeBuild => "tree-build",
            TaskKind::ProgressPoll => "progress-poll",
        })
    }
}

/// Observable state of one task slot. `safe` is false only while the task
/// is inside an engine call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotState {
    pub running: bool,
    pub safe: bool,
}

impl SlotState {
    pub fn is_idle(&self) -> bool {
        !self.running
    }
}

/// One long-lived slot per task kind.
#[derive(Debug)]
pub(super) struct TaskSlot {
    running: AtomicBool,
    safe: AtomicBool,
}

impl TaskSlot {
    pub(super) fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            safe: AtomicBool::new(true),
        }
    }

    pub(super) fn state(&self) -> SlotState {
        SlotState {
            running: self.running.load(Ordering::Acquire),
            safe: self.safe.load(Ordering::Acquire),
        }
    }

    pub(super) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    /// Marks the slot idle when dropped, including on unwind.
    pub(super) fn idle_on_drop(&self) -> IdleOnDrop<'_> {
        IdleOnDrop(self)
    }

    /// Clears `safe` until the returned guard is dropped.
    pub(super) fn engine_section(&self) -> EngineSection<'_> {
        self.safe.store(false, Ordering::Release);
        EngineSection(self)
    }
}

pub(super) struct IdleOnDrop<'a>(&'a TaskSlot);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        self.0.set_running(false);
    }
}

pub(super) struct EngineSection<'a>(&'a TaskSlot);

impl Drop for EngineSection<'_> {
    fn drop(&mut self) {
        self.0.safe.store(true, Ordering::Release);
    }
}

/// Claim on the Backup/Recovery exclusion gate, released on drop.
pub(super) struct ExclusiveClaim<'a>(&'a AtomicBool);

impl<'a> ExclusiveClaim<'a> {
    pub(super) fn try_claim(gate: &'a AtomicBool) -> Option<Self> {
        gate.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(gate))
    }

    /// Re-wrap a gate already claimed on another thread.
    pub(super) fn adopt(gate: &'a AtomicBool) -> Self {
        Self(gate)
    }
}

impl Drop for ExclusiveClaim<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
