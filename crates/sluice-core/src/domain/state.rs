//! Task lifecycle state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Task state.
///
/// State transitions:
/// - Queued -> Running -> Done
/// - Queued -> Running -> Failed (retries exhausted)
///
/// Nothing leaves `Done` or `Failed`. A task abandoned by a hard shutdown
/// stays in `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Admitted into the buffer, not yet picked up.
    Queued,

    /// Picked up by a worker (possibly between retries).
    Running,

    /// An attempt succeeded.
    Done,

    /// Every allowed attempt failed.
    Failed,
}

impl TaskState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Done | TaskState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Queued => "queued",
            TaskState::Running => "running",
            TaskState::Done => "done",
            TaskState::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
