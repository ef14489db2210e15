//! App: wiring the queue, store and pool into a running service.

pub mod lifecycle;

pub use self::lifecycle::Service;
