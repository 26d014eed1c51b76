use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Args exceed maximum serialized size of {max} bytes (got {actual})")]
    ArgsTooLarge { max: usize, actual: usize },

    #[error("Task name must not be empty")]
    EmptyTaskName,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job in invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    #[error("Timeout exceeded")]
    Timeout,

    #[error("Maximum retries exceeded")]
    RetriesExhausted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, QueueError>;
