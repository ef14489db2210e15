//! Ports: the capabilities the worker pool is built against.
//!
//! Each is a single-method seam so tests can swap in deterministic fakes
//! (scripted executors, sleepers that only record durations).

pub mod executor;
pub mod shutdown;
pub mod sleeper;

pub use self::executor::Executor;
pub use self::shutdown::{ShutdownSignal, ShutdownTrigger, shutdown_signal};
pub use self::sleeper::{Sleeper, TokioSleeper};
