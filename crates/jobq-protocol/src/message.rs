use jobq_core::{JobId, Task};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Frame kinds on the wire, one byte after the length prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    Enqueue = 1,
    Dequeue = 2,
    Report = 3,
    Heartbeat = 4,
    Accepted = 5,
    Rejected = 6,
    Status = 7,
}

impl FrameKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(FrameKind::Enqueue),
            2 => Some(FrameKind::Dequeue),
            3 => Some(FrameKind::Report),
            4 => Some(FrameKind::Heartbeat),
            5 => Some(FrameKind::Accepted),
            6 => Some(FrameKind::Rejected),
            7 => Some(FrameKind::Status),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

/// Broker protocol messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    /// Producer submits a task descriptor.
    Enqueue(EnqueueRequest),

    /// Worker asks for the next ready task.
    Dequeue(DequeueRequest),

    /// Worker reports a job outcome.
    Report(ReportRequest),

    /// Worker liveness signal.
    Heartbeat(HeartbeatRequest),

    /// Positive response, optionally carrying a task descriptor.
    Accepted(AcceptedResponse),

    /// Negative response with a reason.
    Rejected(RejectedResponse),

    /// Query the current descriptor for a job.
    Status(StatusRequest),
}

impl Message {
    pub fn frame_kind(&self) -> FrameKind {
        match self {
            Message::Enqueue(_) => FrameKind::Enqueue,
            Message::Dequeue(_) => FrameKind::Dequeue,
            Message::Report(_) => FrameKind::Report,
            Message::Heartbeat(_) => FrameKind::Heartbeat,
            Message::Accepted(_) => FrameKind::Accepted,
            Message::Rejected(_) => FrameKind::Rejected,
            Message::Status(_) => FrameKind::Status,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueRequest {
    pub task: Task,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DequeueRequest {
    pub worker_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRequest {
    pub job_id: JobId,
    pub worker_id: String,
    pub success: bool,
    pub result: Option<Value>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub worker_id: String,
    pub active_jobs: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRequest {
    pub job_id: JobId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptedResponse {
    /// Task descriptor, when the request yields one (Dequeue, Status).
    pub task: Option<Task>,
    /// Optional human-readable note.
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedResponse {
    pub reason: String,
}
