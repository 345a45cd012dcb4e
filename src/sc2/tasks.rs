use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

/// Independent jobs hosted by the game monitor worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    /// Write decided game results into the active match.
    UpdateScore,
    /// Push the current match score into the game UI when a game goes live.
    ToggleScore,
    /// Open the production tab when a game goes live.
    ToggleProduction,
}

impl Task {
    pub const ALL: [Task; 3] = [Task::UpdateScore, Task::ToggleScore, Task::ToggleProduction];

    fn slot(self) -> usize {
        match self {
            Task::UpdateScore => 0,
            Task::ToggleScore => 1,
            Task::ToggleProduction => 2,
        }
    }
}

/// Shared on/off switches, cloned into the monitor and the reconciler.
/// The monitor exits once every task is off.
#[derive(Debug, Clone, Default)]
pub struct TaskFlags(Arc<[AtomicBool; 3]>);

impl TaskFlags {
    pub fn with(tasks: &[Task]) -> Self {
        let flags = TaskFlags::default();
        for &task in tasks {
            flags.set(task, true);
        }
        flags
    }

    pub fn set(&self, task: Task, active: bool) {
        let previous = self.0[task.slot()].swap(active, Ordering::SeqCst);
        if previous != active {
            info!("Task {:?} {}", task, if active { "started" } else { "stopped" });
        }
    }

    pub fn is_active(&self, task: Task) -> bool {
        self.0[task.slot()].load(Ordering::SeqCst)
    }

    pub fn any_active(&self) -> bool {
        Task::ALL.iter().any(|&t| self.is_active(t))
    }

    /// Any task that needs the game window (toggle score or production).
    pub fn toggling(&self) -> bool {
        self.is_active(Task::ToggleScore) || self.is_active(Task::ToggleProduction)
    }

    /// Switch every task off; the monitor stops at its next check.
    pub fn stop_all(&self) {
        for task in Task::ALL {
            self.set(task, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_are_shared() {
        let flags = TaskFlags::with(&[Task::UpdateScore]);
        let clone = flags.clone();
        assert!(clone.is_active(Task::UpdateScore));
        assert!(!clone.toggling());

        clone.set(Task::ToggleProduction, true);
        assert!(flags.toggling());

        flags.stop_all();
        assert!(!clone.any_active());
    }
}
