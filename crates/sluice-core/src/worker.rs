use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use futures::FutureExt;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tokio::task::JoinSet;

use crate::backoff::BackoffPolicy;
use crate::domain::{Task, TaskState};
use crate::error::ExecutionError;
use crate::impls::SimulatedExecutor;
use crate::ports::{Executor, ShutdownSignal, Sleeper, TokioSleeper};
use crate::queue::{BoundedQueue, TaskStream};
use crate::store::StateStore;

/// Pool settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of workers; 0 is coerced to 1.
    pub workers: usize,
    pub backoff: BackoffPolicy,
}

impl PoolConfig {
    pub const DEFAULT_WORKERS: usize = 4;
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: Self::DEFAULT_WORKERS,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Fixed-size worker pool.
///
/// - every worker owns a `StdRng`, seeded from `with_seed` when given
///   (reproducible) or from the clock otherwise
/// - the executor defaults to a `SimulatedExecutor` on the pool's sleeper
pub struct WorkerPool {
    config: PoolConfig,
    seed: Option<u64>,
    executor: Option<Arc<dyn Executor>>,
    sleeper: Arc<dyn Sleeper>,
}

impl WorkerPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            seed: None,
            executor: None,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Base seed the per-worker seeds are drawn from.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn effective_workers(&self) -> usize {
        self.config.workers.max(1)
    }

    /// Run workers until shutdown fires or the queue is closed and drained.
    ///
    /// Returns only after every worker has returned. Dropping the returned
    /// future aborts all workers.
    pub async fn run(
        &self,
        shutdown: ShutdownSignal,
        queue: &BoundedQueue,
        store: Arc<dyn StateStore>,
    ) {
        let n = self.effective_workers();
        let seeds = derive_seeds(self.seed, n);
        let executor: Arc<dyn Executor> = match &self.executor {
            Some(executor) => Arc::clone(executor),
            None => Arc::new(SimulatedExecutor::new(Arc::clone(&self.sleeper))),
        };

        tracing::info!(workers = n, "worker pool starting");

        let mut workers = JoinSet::new();
        for (worker_id, seed) in seeds.into_iter().enumerate() {
            let worker = Worker {
                id: worker_id,
                rng: StdRng::seed_from_u64(seed),
                stream: queue.take(),
                store: Arc::clone(&store),
                executor: Arc::clone(&executor),
                sleeper: Arc::clone(&self.sleeper),
                backoff: self.config.backoff,
                shutdown: shutdown.clone(),
            };
            workers.spawn(worker.run());
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "worker terminated abnormally");
            }
        }

        tracing::info!("worker pool stopped");
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

/// Per-worker seeds: drawn from the base seed, or spread out from the clock.
fn derive_seeds(base: Option<u64>, n: usize) -> Vec<u64> {
    if let Some(base) = base {
        let mut rng = StdRng::seed_from_u64(base);
        return (0..n).map(|_| rng.next_u64()).collect();
    }

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default();
    (0..n as u64)
        .map(|i| now.wrapping_add(i.wrapping_mul(1_000_003)))
        .collect()
}

/// How a single task ended for this worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Finished {
    Done,
    Failed,
    /// Shutdown fired mid-task; state stays `Running`.
    Abandoned,
}

struct Worker {
    id: usize,
    rng: StdRng,
    stream: TaskStream,
    store: Arc<dyn StateStore>,
    executor: Arc<dyn Executor>,
    sleeper: Arc<dyn Sleeper>,
    backoff: BackoffPolicy,
    shutdown: ShutdownSignal,
}

impl Worker {
    async fn run(mut self) {
        loop {
            let task = tokio::select! {
                biased;
                _ = self.shutdown.triggered() => {
                    tracing::debug!(worker_id = self.id, "shutdown observed while idle");
                    return;
                }
                task = self.stream.recv() => task,
            };

            let Some(task) = task else {
                tracing::debug!(worker_id = self.id, "queue drained");
                return;
            };

            if self.process(task).await == Finished::Abandoned {
                return;
            }
        }
    }

    /// Retry loop for one task: attempt, back off, attempt, ...
    async fn process(&mut self, task: Task) -> Finished {
        let id = task.id().clone();
        self.store.set_state(&id, TaskState::Running);

        let mut attempt: u32 = 0;
        loop {
            if self.shutdown.is_triggered() {
                tracing::warn!(worker_id = self.id, task_id = %id, attempt, "task abandoned on shutdown");
                return Finished::Abandoned;
            }

            // a panicking executor costs one attempt, not the worker
            let result = AssertUnwindSafe(self.executor.execute(&task, &mut self.rng))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(panicked(panic.as_ref())));
            let err = match result {
                Ok(()) => {
                    self.store.set_state(&id, TaskState::Done);
                    tracing::debug!(worker_id = self.id, task_id = %id, attempts = attempt + 1, "task done");
                    return Finished::Done;
                }
                Err(err) => err,
            };

            attempt = attempt.saturating_add(1);
            if attempt > task.max_retries() {
                self.store.set_state(&id, TaskState::Failed);
                tracing::warn!(
                    worker_id = self.id,
                    task_id = %id,
                    attempts = attempt,
                    error = %err,
                    "task failed, retries exhausted"
                );
                return Finished::Failed;
            }

            let delay = self.backoff.delay(attempt, &mut self.rng);
            tracing::debug!(
                worker_id = self.id,
                task_id = %id,
                attempt,
                ?delay,
                error = %err,
                "attempt failed, retrying"
            );
            if delay.is_zero() {
                continue;
            }

            tokio::select! {
                biased;
                _ = self.shutdown.triggered() => {
                    tracing::warn!(worker_id = self.id, task_id = %id, attempt, "task abandoned during backoff");
                    return Finished::Abandoned;
                }
                _ = self.sleeper.sleep(delay) => {}
            }
        }
    }
}

fn panicked(panic: &(dyn Any + Send)) -> ExecutionError {
    let message = panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload");
    ExecutionError::Failed(format!("executor panicked: {message}"))
}
