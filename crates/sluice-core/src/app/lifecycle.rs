//! Lifecycle - startup and drain-then-stop shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::error::ShutdownTimeout;
use crate::ports::{ShutdownTrigger, shutdown_signal};
use crate::queue::BoundedQueue;
use crate::store::{InMemoryStateStore, StateStore};
use crate::worker::WorkerPool;

/// A queue, its store and a pool running in the background.
///
/// # Shutdown order
/// 1. close the queue (no new admissions, buffered tasks keep flowing)
/// 2. wait for the pool to drain, up to a deadline
/// 3. past the deadline: fire the shutdown signal and abort the pool
pub struct Service {
    queue: Arc<BoundedQueue>,
    store: Arc<dyn StateStore>,
    trigger: ShutdownTrigger,
    pool_task: JoinHandle<()>,
}

impl Service {
    /// Start `pool` over a fresh in-memory store and a queue of `queue_capacity`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(queue_capacity: usize, pool: WorkerPool) -> Self {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
        Self::start_with_store(queue_capacity, pool, store)
    }

    pub fn start_with_store(
        queue_capacity: usize,
        pool: WorkerPool,
        store: Arc<dyn StateStore>,
    ) -> Self {
        let queue = Arc::new(BoundedQueue::new(queue_capacity, Arc::clone(&store)));
        let (trigger, signal) = shutdown_signal();

        tracing::info!(
            capacity = queue.capacity(),
            workers = pool.effective_workers(),
            "service starting"
        );

        let pool_task = tokio::spawn({
            let queue = Arc::clone(&queue);
            let store = Arc::clone(&store);
            async move { pool.run(signal, &queue, store).await }
        });

        Self {
            queue,
            store,
            trigger,
            pool_task,
        }
    }

    pub fn queue(&self) -> &Arc<BoundedQueue> {
        &self.queue
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// Hard stop: workers abandon what they are doing. The queue stays open.
    pub fn cancel(&self) {
        self.trigger.trigger();
    }

    /// Has the pool returned (drained or cancelled)?
    pub fn is_finished(&self) -> bool {
        self.pool_task.is_finished()
    }

    /// Close the queue and wait for the pool to drain, bounded by `deadline`.
    pub async fn shutdown(self, deadline: Duration) -> Result<(), ShutdownTimeout> {
        let Self {
            queue,
            trigger,
            mut pool_task,
            ..
        } = self;

        queue.close();
        tracing::info!(
            buffered = queue.len(),
            "queue closed: rejecting new tasks, draining buffered tasks"
        );

        match tokio::time::timeout(deadline, &mut pool_task).await {
            Ok(joined) => {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "worker pool task failed");
                }
                tracing::info!("workers drained and stopped");
                Ok(())
            }
            Err(_) => {
                let buffered = queue.len();
                trigger.trigger();
                pool_task.abort();
                // JoinError::Cancelled is expected here
                let _ = pool_task.await;
                Err(ShutdownTimeout { deadline, buffered })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use rand::rngs::StdRng;

    use super::*;
    use crate::domain::{Task, TaskId, TaskState};
    use crate::error::{ExecutionError, QueueError};
    use crate::ports::Executor;
    use crate::worker::PoolConfig;

    struct Succeed;

    #[async_trait]
    impl Executor for Succeed {
        async fn execute(&self, _task: &Task, _rng: &mut StdRng) -> Result<(), ExecutionError> {
            Ok(())
        }
    }

    struct Hang;

    #[async_trait]
    impl Executor for Hang {
        async fn execute(&self, _task: &Task, _rng: &mut StdRng) -> Result<(), ExecutionError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    fn pool(workers: usize, executor: Arc<dyn Executor>) -> WorkerPool {
        WorkerPool::new(PoolConfig {
            workers,
            ..PoolConfig::default()
        })
        .with_seed(1)
        .with_executor(executor)
    }

    #[tokio::test]
    async fn shutdown_drains_buffered_tasks() {
        let service = Service::start(16, pool(2, Arc::new(Succeed)));
        for i in 0..10 {
            service.queue().enqueue(Task::new(format!("t{i}"), "", 0)).unwrap();
        }
        let store = Arc::clone(service.store());
        let queue = Arc::clone(service.queue());

        service.shutdown(Duration::from_secs(5)).await.unwrap();

        assert_eq!(store.counts().done, 10);
        assert_eq!(queue.enqueue(Task::new("late", "", 0)), Err(QueueError::Closed));
    }

    #[tokio::test]
    async fn shutdown_reports_timeout_and_stops_workers() {
        let service = Service::start(16, pool(1, Arc::new(Hang)));
        service.queue().enqueue(Task::new("stuck", "", 0)).unwrap();
        service.queue().enqueue(Task::new("waiting", "", 0)).unwrap();
        let store = Arc::clone(service.store());

        // let the worker pick up the first task
        tokio::time::sleep(Duration::from_millis(50)).await;

        let err = service
            .shutdown(Duration::from_millis(50))
            .await
            .unwrap_err();
        assert_eq!(err.buffered, 1);

        // abandoned mid-attempt: no terminal state is written
        assert_eq!(store.get_state(&TaskId::new("stuck")), Some(TaskState::Running));
        assert_eq!(store.get_state(&TaskId::new("waiting")), Some(TaskState::Queued));
    }

    #[tokio::test]
    async fn cancel_stops_pool_without_closing_queue() {
        let service = Service::start(4, pool(3, Arc::new(Succeed)));
        service.cancel();

        tokio::time::timeout(Duration::from_secs(1), async {
            while !service.is_finished() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert!(service.queue().accepting());
    }
}
