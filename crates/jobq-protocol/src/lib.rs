mod codec;
mod message;

pub use codec::FrameCodec;
pub use message::{
    AcceptedResponse, DequeueRequest, EnqueueRequest, FrameKind, HeartbeatRequest, Message,
    RejectedResponse, ReportRequest, StatusRequest,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Unknown frame kind: {0}")]
    UnknownFrameKind(u8),

    #[error("Frame too large: {0} bytes")]
    FrameTooLarge(usize),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Maximum wire frame size: 2MiB (1MiB args plus descriptor overhead).
pub const MAX_FRAME_SIZE: usize = 2 * 1024 * 1024;
