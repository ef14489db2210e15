//! Domain model: tasks and their lifecycle state.

pub mod state;
pub mod task;

pub use self::state::TaskState;
pub use self::task::{Task, TaskId};
