//! Impls: concrete capabilities.

pub mod simulated;

pub use self::simulated::SimulatedExecutor;
