mod async_client;
mod sync_client;

pub use async_client::AsyncQueueClient;
pub use sync_client::QueueClient;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Job not found")]
    JobNotFound,

    #[error("Timeout")]
    Timeout,

    #[error("Broker rejected request: {0}")]
    Rejected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Build a worker id of the form `<hostname>-<pid>-<random>`.
pub(crate) fn generate_worker_id() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    let pid = std::process::id();
    let random = uuid::Uuid::new_v4().simple().to_string();

    format!("{host}-{pid}-{}", &random[..8])
}
