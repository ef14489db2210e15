use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller-supplied task identifier.
///
/// Uniqueness is not enforced here; the state store doubles as the
/// admission de-duplication index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A unit of submitted work.
///
/// Immutable once built: the queue and workers only ever read it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    payload: String,
    max_retries: u32,
}

impl Task {
    pub fn new(id: impl Into<TaskId>, payload: impl Into<String>, max_retries: u32) -> Self {
        Self {
            id: id.into(),
            payload: payload.into(),
            max_retries,
        }
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    /// Opaque payload; never interpreted by the core.
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Retries allowed after the first failed attempt.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}
