//! sluice-core
//!
//! Bounded in-process task queue with a retrying worker pool.
//!
//! # Modules
//! - **domain**: `Task`, `TaskId`, `TaskState`
//! - **backoff**: full-jitter exponential backoff
//! - **store**: task id -> state (`StateStore`, `InMemoryStateStore`)
//! - **queue**: admission-controlled FIFO (`BoundedQueue`, `TaskStream`)
//! - **worker**: fixed-size pool with the per-task retry loop (`WorkerPool`)
//! - **ports**: capabilities the pool runs against (`Executor`, `Sleeper`, shutdown signal)
//! - **impls**: `SimulatedExecutor`
//! - **app**: `Service`, the start / drain / stop lifecycle

pub mod app;
pub mod backoff;
pub mod domain;
pub mod error;
pub mod impls;
pub mod ports;
pub mod queue;
pub mod store;
pub mod worker;

pub use app::Service;
pub use backoff::BackoffPolicy;
pub use domain::{Task, TaskId, TaskState};
pub use error::{ExecutionError, QueueError, ShutdownTimeout};
pub use queue::{BoundedQueue, TaskStream};
pub use store::{InMemoryStateStore, StateStore};
pub use worker::{PoolConfig, WorkerPool};
