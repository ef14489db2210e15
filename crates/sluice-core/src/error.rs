use std::time::Duration;

use thiserror::Error;

/// Admission errors returned synchronously by `BoundedQueue::enqueue`.
///
/// The core never retries these; the caller decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The id is already known to the store (or is empty).
    #[error("duplicate task id")]
    DuplicateId,

    #[error("queue is full")]
    QueueFull,

    #[error("queue is closed")]
    Closed,
}

/// A single execution attempt failed.
///
/// Consumed by the retry loop; never surfaced past the worker pool.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("simulated failure")]
    Simulated,

    #[error("{0}")]
    Failed(String),
}

/// The drain did not finish before the shutdown deadline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("workers did not drain within {deadline:?} ({buffered} task(s) still buffered)")]
pub struct ShutdownTimeout {
    pub deadline: Duration,
    pub buffered: usize,
}
