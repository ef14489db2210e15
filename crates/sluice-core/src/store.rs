//! State store: task id -> lifecycle state.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{TaskId, TaskState};

/// Latest known state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEntry {
    pub state: TaskState,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCounts {
    pub queued: usize,
    pub running: usize,
    pub done: usize,
    pub failed: usize,
}

/// Store port.
///
/// Shared by the queue (writes `Queued` on admission) and every worker
/// (writes the rest). No operation fails or blocks beyond its critical section.
pub trait StateStore: Send + Sync {
    /// Unconditional upsert.
    fn set_state(&self, id: &TaskId, state: TaskState);

    fn get_state(&self, id: &TaskId) -> Option<TaskState>;

    fn has(&self, id: &TaskId) -> bool;

    /// Maintenance only; the retry flow never deletes.
    fn delete(&self, id: &TaskId);

    fn entry(&self, id: &TaskId) -> Option<StateEntry>;

    fn counts(&self) -> StateCounts;
}

/// In-memory store behind a single mutex.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    data: Mutex<HashMap<TaskId, StateEntry>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(HashMap::with_capacity(128)),
        }
    }

    // Every write is a single insert/remove, so a poisoned map is still consistent.
    fn lock(&self) -> MutexGuard<'_, HashMap<TaskId, StateEntry>> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StateStore for InMemoryStateStore {
    fn set_state(&self, id: &TaskId, state: TaskState) {
        let entry = StateEntry {
            state,
            updated_at: Utc::now(),
        };
        self.lock().insert(id.clone(), entry);
    }

    fn get_state(&self, id: &TaskId) -> Option<TaskState> {
        self.lock().get(id).map(|e| e.state)
    }

    fn has(&self, id: &TaskId) -> bool {
        self.lock().contains_key(id)
    }

    fn delete(&self, id: &TaskId) {
        self.lock().remove(id);
    }

    fn entry(&self, id: &TaskId) -> Option<StateEntry> {
        self.lock().get(id).copied()
    }

    fn counts(&self) -> StateCounts {
        let data = self.lock();
        let mut counts = StateCounts::default();
        for entry in data.values() {
            match entry.state {
                TaskState::Queued => counts.queued += 1,
                TaskState::Running => counts.running += 1,
                TaskState::Done => counts.done += 1,
                TaskState::Failed => counts.failed += 1,
            }
        }
        counts
    }
}
