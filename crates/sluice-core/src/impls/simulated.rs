//! Simulated execution used by the reference deployment.
//!
//! Sleeps for a random processing time and fails with a fixed probability.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use rand::rngs::StdRng;

use crate::domain::Task;
use crate::error::ExecutionError;
use crate::ports::{Executor, Sleeper};

pub const FAILURE_PROBABILITY: f64 = 0.20;

pub const MIN_PROCESSING: Duration = Duration::from_millis(100);
pub const MAX_PROCESSING: Duration = Duration::from_millis(500);

/// True with probability `p`.
pub fn should_fail<R: Rng + ?Sized>(rng: &mut R, p: f64) -> bool {
    if p <= 0.0 {
        return false;
    }
    if p >= 1.0 {
        return true;
    }
    rng.gen_range(0.0..1.0) < p
}

/// Uniform in `[MIN_PROCESSING, MAX_PROCESSING]`.
pub fn simulated_duration<R: Rng + ?Sized>(rng: &mut R) -> Duration {
    if MAX_PROCESSING <= MIN_PROCESSING {
        return MIN_PROCESSING;
    }
    let span = (MAX_PROCESSING - MIN_PROCESSING).as_nanos() as u64;
    MIN_PROCESSING + Duration::from_nanos(rng.gen_range(0..=span))
}

pub struct SimulatedExecutor {
    sleeper: Arc<dyn Sleeper>,
    failure_probability: f64,
}

impl SimulatedExecutor {
    pub fn new(sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            sleeper,
            failure_probability: FAILURE_PROBABILITY,
        }
    }

    pub fn with_failure_probability(mut self, p: f64) -> Self {
        self.failure_probability = p;
        self
    }
}

#[async_trait]
impl Executor for SimulatedExecutor {
    async fn execute(&self, task: &Task, rng: &mut StdRng) -> Result<(), ExecutionError> {
        // draw everything up front; the rng is not held across the sleep
        let processing = simulated_duration(rng);
        let fail = should_fail(rng, self.failure_probability);

        tracing::trace!(task_id = %task.id(), ?processing, "simulating work");
        self.sleeper.sleep(processing).await;

        if fail {
            return Err(ExecutionError::Simulated);
        }
        Ok(())
    }
}
