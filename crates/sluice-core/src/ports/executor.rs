//! Executor port - the task-specific work.

use async_trait::async_trait;
use rand::rngs::StdRng;

use crate::domain::Task;
use crate::error::ExecutionError;

/// Runs one attempt of a task.
///
/// `rng` is the calling worker's own random source, lent for the duration
/// of the attempt. Implementations that need randomness draw from it
/// instead of a process-wide generator.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, task: &Task, rng: &mut StdRng) -> Result<(), ExecutionError>;
}
