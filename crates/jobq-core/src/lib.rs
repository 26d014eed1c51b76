mod error;
mod priority;
mod task;

pub use error::{QueueError, Result};
pub use priority::Priority;
pub use task::{JobId, JobStatus, Task, TaskBuilder, TaskName, TaskOpts};

/// Maximum size of a task's serialized JSON args (and of a job result).
pub const MAX_ARGS_SIZE: usize = 1024 * 1024; // 1MiB
