//! Bounded queue: admission control in front of the worker pool.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use crate::domain::{Task, TaskState};
use crate::error::QueueError;
use crate::store::StateStore;

/// Buffer and accepting flag; always mutated together under one lock.
#[derive(Debug)]
struct QueueState {
    buffer: VecDeque<Task>,
    accepting: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    /// Wakes consumers on admission (one) and on close (all).
    notify: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Fixed-capacity FIFO buffer of pending tasks.
///
/// `enqueue` never waits for room: a full buffer is reported as
/// `QueueError::QueueFull`, which is the backpressure signal.
pub struct BoundedQueue {
    shared: Arc<Shared>,
    capacity: usize,
    store: Arc<dyn StateStore>,
}

impl BoundedQueue {
    /// `capacity` is coerced to at least 1.
    pub fn new(capacity: usize, store: Arc<dyn StateStore>) -> Self {
        let capacity = capacity.max(1);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState {
                    buffer: VecDeque::with_capacity(capacity),
                    accepting: true,
                }),
                notify: Notify::new(),
            }),
            capacity,
            store,
        }
    }

    /// Admit a task.
    ///
    /// The closed check, duplicate check, capacity check, insert and the
    /// `Queued` store write all happen under the queue lock, so a concurrent
    /// `enqueue` of the same id or a concurrent `close` cannot interleave.
    pub fn enqueue(&self, task: Task) -> Result<(), QueueError> {
        if task.id().is_empty() {
            return Err(QueueError::DuplicateId);
        }

        {
            let mut state = self.shared.lock();
            if !state.accepting {
                return Err(QueueError::Closed);
            }
            if self.store.has(task.id()) {
                return Err(QueueError::DuplicateId);
            }
            if state.buffer.len() >= self.capacity {
                return Err(QueueError::QueueFull);
            }

            self.store.set_state(task.id(), TaskState::Queued);
            state.buffer.push_back(task);
        } // Lock released here

        self.shared.notify.notify_one();
        Ok(())
    }

    /// Draining handle for consumers.
    pub fn take(&self) -> TaskStream {
        TaskStream {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Stop admitting tasks. Buffered tasks are still handed out.
    ///
    /// Idempotent.
    pub fn close(&self) {
        {
            let mut state = self.shared.lock();
            if !state.accepting {
                return;
            }
            state.accepting = false;
        }
        self.shared.notify.notify_waiters();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.shared.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn accepting(&self) -> bool {
        self.shared.lock().accepting
    }
}

/// Receiving side of a `BoundedQueue`.
///
/// Clones share the same buffer; each task is handed to exactly one receiver.
#[derive(Clone)]
pub struct TaskStream {
    shared: Arc<Shared>,
}

impl TaskStream {
    /// Next task in admission order.
    ///
    /// Waits while the queue is open and empty. Returns `None` once the
    /// queue is closed and fully drained.
    pub async fn recv(&mut self) -> Option<Task> {
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            // register before looking at the buffer so a concurrent
            // notify_one / notify_waiters is not missed
            notified.as_mut().enable();

            {
                let mut state = self.shared.lock();
                if let Some(task) = state.buffer.pop_front() {
                    return Some(task);
                }
                if !state.accepting {
                    return None;
                }
            }

            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::domain::TaskId;
    use crate::store::InMemoryStateStore;

    fn queue(capacity: usize) -> (BoundedQueue, Arc<InMemoryStateStore>) {
        let store = Arc::new(InMemoryStateStore::new());
        (BoundedQueue::new(capacity, store.clone()), store)
    }

    #[test]
    fn enqueue_marks_queued() {
        let (q, store) = queue(4);
        q.enqueue(Task::new("a", "payload", 0)).unwrap();

        assert_eq!(store.get_state(&TaskId::new("a")), Some(TaskState::Queued));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn same_id_is_admitted_once() {
        let (q, _store) = queue(4);
        assert_eq!(q.enqueue(Task::new("dup", "", 0)), Ok(()));
        assert_eq!(q.enqueue(Task::new("dup", "other", 3)), Err(QueueError::DuplicateId));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn empty_id_is_rejected_as_duplicate() {
        let (q, store) = queue(4);
        assert_eq!(q.enqueue(Task::new("", "", 0)), Err(QueueError::DuplicateId));
        assert!(!store.has(&TaskId::new("")));
    }

    #[test]
    fn full_buffer_rejects() {
        let (q, store) = queue(3);
        for i in 0..3 {
            q.enqueue(Task::new(format!("t{i}"), "", 0)).unwrap();
        }
        assert_eq!(q.enqueue(Task::new("t3", "", 0)), Err(QueueError::QueueFull));
        assert_eq!(q.len(), q.capacity());
        // rejected tasks leave no trace in the store
        assert!(!store.has(&TaskId::new("t3")));
    }

    #[test]
    fn capacity_is_at_least_one() {
        let (q, _store) = queue(0);
        assert_eq!(q.capacity(), 1);
        q.enqueue(Task::new("a", "", 0)).unwrap();
        assert_eq!(q.enqueue(Task::new("b", "", 0)), Err(QueueError::QueueFull));
    }

    #[test]
    fn closed_queue_rejects_even_with_room() {
        let (q, _store) = queue(4);
        q.close();
        assert!(!q.accepting());
        assert_eq!(q.enqueue(Task::new("a", "", 0)), Err(QueueError::Closed));
    }

    #[test]
    fn closed_check_wins_over_duplicate_check() {
        let (q, _store) = queue(4);
        q.enqueue(Task::new("a", "", 0)).unwrap();
        q.close();
        assert_eq!(q.enqueue(Task::new("a", "", 0)), Err(QueueError::Closed));
    }

    #[test]
    fn close_is_idempotent() {
        let (q, _store) = queue(4);
        q.close();
        q.close();
        assert!(!q.accepting());
    }

    #[tokio::test]
    async fn stream_is_fifo_then_ends_after_close() {
        let (q, _store) = queue(4);
        for id in ["a", "b", "c"] {
            q.enqueue(Task::new(id, "", 0)).unwrap();
        }
        q.close();

        let mut stream = q.take();
        let mut seen = Vec::new();
        while let Some(task) = stream.recv().await {
            seen.push(task.id().to_string());
        }
        assert_eq!(seen, ["a", "b", "c"]);
        assert!(stream.recv().await.is_none());
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn waiting_consumer_is_woken_by_enqueue() {
        let (q, _store) = queue(4);
        let mut stream = q.take();

        let waiter = tokio::spawn(async move { stream.recv().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        q.enqueue(Task::new("late", "", 0)).unwrap();

        let got = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.map(|t| t.id().to_string()), Some("late".to_string()));
    }

    #[tokio::test]
    async fn close_wakes_every_waiting_consumer() {
        let (q, _store) = queue(4);
        let mut waiters = Vec::new();
        for _ in 0..3 {
            let mut stream = q.take();
            waiters.push(tokio::spawn(async move { stream.recv().await }));
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        q.close();

        for w in waiters {
            let got = tokio::time::timeout(Duration::from_secs(1), w)
                .await
                .unwrap()
                .unwrap();
            assert!(got.is_none());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_duplicates_admit_exactly_one() {
        let store = Arc::new(InMemoryStateStore::new());
        let q = Arc::new(BoundedQueue::new(64, store));

        let mut joins = Vec::new();
        for i in 0..16 {
            let q = Arc::clone(&q);
            joins.push(tokio::spawn(async move {
                q.enqueue(Task::new("same", format!("p{i}"), 0))
            }));
        }

        let mut ok = 0;
        for j in joins {
            match j.await.unwrap() {
                Ok(()) => ok += 1,
                Err(e) => assert_eq!(e, QueueError::DuplicateId),
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn close_racing_enqueues_freezes_admission() {
        let (q, store) = queue(16);
        let start = std::sync::Barrier::new(9);

        let (admitted, frozen) = std::thread::scope(|scope| {
            let producers: Vec<_> = (0..8)
                .map(|p| {
                    let (q, start) = (&q, &start);
                    scope.spawn(move || {
                        start.wait();
                        (0..50)
                            .filter(|i| match q.enqueue(Task::new(format!("p{p}-{i}"), "", 0)) {
                                Ok(()) => true,
                                Err(e) => {
                                    assert!(matches!(e, QueueError::QueueFull | QueueError::Closed));
                                    false
                                }
                            })
                            .count()
                    })
                })
                .collect();

            let closer = scope.spawn(|| {
                start.wait();
                std::thread::yield_now();
                q.close();
                // no consumer: the buffer can only grow through admission
                q.len()
            });

            let admitted: usize = producers.into_iter().map(|h| h.join().unwrap()).sum();
            (admitted, closer.join().unwrap())
        });

        assert_eq!(q.len(), frozen);
        assert_eq!(q.len(), admitted);
        assert!(q.len() <= q.capacity());
        assert_eq!(store.counts().queued, admitted);
        assert_eq!(q.enqueue(Task::new("late", "", 0)), Err(QueueError::Closed));
    }
}
