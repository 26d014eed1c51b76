use crate::{ClientError, Result};
use jobq_core::{JobId, JobStatus, Task, TaskOpts};
use jobq_protocol::{
    DequeueRequest, EnqueueRequest, FrameCodec, HeartbeatRequest, Message, ReportRequest,
    StatusRequest,
};

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio_util::codec::Framed;
use tracing::debug;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Async queue client. One connection per request, framed with the jobq
/// protocol codec.
pub struct AsyncQueueClient {
    broker_address: String,
    worker_id: String,
    poll_interval: Duration,
    shutdown_requested: Arc<AtomicBool>,
    shutdown_notify: Arc<Notify>,
}

impl AsyncQueueClient {
    /// Connect to a broker. The connection is probed once; requests open
    /// their own short-lived connections afterwards.
    pub async fn connect(broker_address: impl Into<String>) -> Result<Self> {
        let broker_address = broker_address.into();

        let _ = TcpStream::connect(&broker_address)
            .await
            .map_err(|e| ClientError::Connection(e.to_string()))?;

        Ok(AsyncQueueClient {
            broker_address,
            worker_id: crate::generate_worker_id(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            shutdown_requested: Arc::new(AtomicBool::new(false)),
            shutdown_notify: Arc::new(Notify::new()),
        })
    }

    /// Use an explicit worker id instead of the generated one.
    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = worker_id.into();
        self
    }

    /// Override the dequeue poll interval.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Request shutdown: any blocked or future `dequeue_task` call returns
    /// `Ok(None)`.
    pub fn shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
        self.shutdown_notify.notify_waiters();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    async fn request(&self, message: Message) -> Result<Message> {
        let stream = TcpStream::connect(&self.broker_address)
            .await
            .map_err(|e| ClientError::Connection(e.to_string()))?;
        let mut framed = Framed::new(stream, FrameCodec);

        framed
            .send(message)
            .await
            .map_err(|e| ClientError::Protocol(e.to_string()))?;

        match framed.next().await {
            Some(Ok(response)) => Ok(response),
            Some(Err(e)) => Err(ClientError::Protocol(e.to_string())),
            None => Err(ClientError::Connection("Connection closed".to_string())),
        }
    }

    /// Enqueue a new task by name, args and options; returns the job id.
    pub async fn enqueue_task(
        &self,
        task_name: impl Into<String>,
        args: Value,
        opts: TaskOpts,
    ) -> Result<JobId> {
        let task = Task::with_opts(task_name, args, opts)
            .map_err(|e| ClientError::Protocol(e.to_string()))?;
        self.enqueue(task).await
    }

    /// Enqueue a pre-built task descriptor.
    pub async fn enqueue(&self, task: Task) -> Result<JobId> {
        let job_id = task.job_id;

        match self.request(Message::Enqueue(EnqueueRequest { task })).await? {
            Message::Accepted(_) => Ok(job_id),
            Message::Rejected(rej) => Err(ClientError::Rejected(rej.reason)),
            _ => Err(ClientError::Protocol("Unexpected response".to_string())),
        }
    }

    /// Dequeue the next task for this worker.
    ///
    /// Blocks until a task is available, polling the broker between empty
    /// responses. Returns `Ok(None)` only after `shutdown` has been
    /// requested; an empty queue alone never ends the wait.
    pub async fn dequeue_task(&self) -> Result<Option<Task>> {
        loop {
            if self.is_shutdown() {
                return Ok(None);
            }

            let response = self
                .request(Message::Dequeue(DequeueRequest {
                    worker_id: self.worker_id.clone(),
                }))
                .await?;

            match response {
                Message::Accepted(acc) => {
                    if let Some(task) = acc.task {
                        return Ok(Some(task));
                    }
                    // Nothing ready; wait out the poll interval unless
                    // shutdown interrupts it.
                    tokio::select! {
                        _ = self.shutdown_notify.notified() => return Ok(None),
                        _ = tokio::time::sleep(self.poll_interval) => {}
                    }
                }
                Message::Rejected(rej) => return Err(ClientError::Rejected(rej.reason)),
                _ => return Err(ClientError::Protocol("Unexpected response".to_string())),
            }
        }
    }

    /// Report a successful job outcome.
    pub async fn report_success(&self, job_id: JobId, result: Value) -> Result<()> {
        self.report(job_id, true, Some(result), None).await
    }

    /// Report a failed job outcome.
    pub async fn report_failure(&self, job_id: JobId, error: impl Into<String>) -> Result<()> {
        self.report(job_id, false, None, Some(error.into())).await
    }

    async fn report(
        &self,
        job_id: JobId,
        success: bool,
        result: Option<Value>,
        error: Option<String>,
    ) -> Result<()> {
        let message = Message::Report(ReportRequest {
            job_id,
            worker_id: self.worker_id.clone(),
            success,
            result,
            error,
        });

        match self.request(message).await? {
            Message::Accepted(_) => {
                debug!("Report for job {job_id} acknowledged");
                Ok(())
            }
            Message::Rejected(rej) => Err(ClientError::Rejected(rej.reason)),
            _ => Err(ClientError::Protocol("Unexpected response".to_string())),
        }
    }

    /// Send a liveness heartbeat with the current active job count.
    pub async fn heartbeat(&self, active_jobs: usize) -> Result<()> {
        let message = Message::Heartbeat(HeartbeatRequest {
            worker_id: self.worker_id.clone(),
            active_jobs,
        });

        match self.request(message).await? {
            Message::Accepted(_) => Ok(()),
            Message::Rejected(rej) => Err(ClientError::Rejected(rej.reason)),
            _ => Err(ClientError::Protocol("Unexpected response".to_string())),
        }
    }

    /// Fetch the current descriptor for a job, if the broker still has it.
    pub async fn job_status(&self, job_id: JobId) -> Result<Option<Task>> {
        match self.request(Message::Status(StatusRequest { job_id })).await? {
            Message::Accepted(acc) => Ok(acc.task),
            Message::Rejected(_) => Ok(None),
            _ => Err(ClientError::Protocol("Unexpected response".to_string())),
        }
    }

    /// Poll until the job reaches a terminal state or the timeout elapses.
    pub async fn wait_for_result(&self, job_id: JobId, timeout: Duration) -> Result<Value> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if tokio::time::Instant::now() > deadline {
                return Err(ClientError::Timeout);
            }

            match self.job_status(job_id).await? {
                Some(task) => match task.status {
                    JobStatus::Completed => {
                        return task
                            .result
                            .ok_or_else(|| ClientError::Protocol("No result recorded".to_string()));
                    }
                    JobStatus::Failed | JobStatus::DeadLetter => {
                        return Err(ClientError::Rejected(
                            task.error.unwrap_or_else(|| "Job failed".to_string()),
                        ));
                    }
                    _ => {
                        tokio::time::sleep(self.poll_interval).await;
                    }
                },
                None => return Err(ClientError::JobNotFound),
            }
        }
    }
}
