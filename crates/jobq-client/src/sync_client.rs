use crate::async_client::AsyncQueueClient;
use crate::{ClientError, Result};
use jobq_core::{JobId, Task, TaskOpts};
use serde_json::Value;
use std::time::Duration;

/// Blocking queue client for synchronous callers; owns a Tokio runtime and
/// wraps the async client. `dequeue_task` blocks the calling thread.
pub struct QueueClient {
    runtime: tokio::runtime::Runtime,
    inner: AsyncQueueClient,
}

impl QueueClient {
    /// Connect to a broker.
    pub fn connect(broker_address: impl Into<String>) -> Result<Self> {
        let runtime = tokio::runtime::Runtime::new()
            .map_err(|e| ClientError::Connection(e.to_string()))?;

        let broker_address = broker_address.into();
        let inner = runtime.block_on(AsyncQueueClient::connect(broker_address))?;

        Ok(QueueClient { runtime, inner })
    }

    pub fn worker_id(&self) -> &str {
        self.inner.worker_id()
    }

    /// Enqueue a new task; returns the job id.
    pub fn enqueue_task(
        &self,
        task_name: impl Into<String>,
        args: Value,
        opts: TaskOpts,
    ) -> Result<JobId> {
        self.runtime
            .block_on(self.inner.enqueue_task(task_name, args, opts))
    }

    /// Enqueue a pre-built task descriptor.
    pub fn enqueue(&self, task: Task) -> Result<JobId> {
        self.runtime.block_on(self.inner.enqueue(task))
    }

    /// Blocking dequeue: returns the next task, or `None` after `shutdown`.
    pub fn dequeue_task(&self) -> Result<Option<Task>> {
        self.runtime.block_on(self.inner.dequeue_task())
    }

    /// Report a successful job outcome.
    pub fn report_success(&self, job_id: JobId, result: Value) -> Result<()> {
        self.runtime.block_on(self.inner.report_success(job_id, result))
    }

    /// Report a failed job outcome.
    pub fn report_failure(&self, job_id: JobId, error: impl Into<String>) -> Result<()> {
        self.runtime.block_on(self.inner.report_failure(job_id, error))
    }

    /// Fetch the current descriptor for a job.
    pub fn job_status(&self, job_id: JobId) -> Result<Option<Task>> {
        self.runtime.block_on(self.inner.job_status(job_id))
    }

    /// Block until the job reaches a terminal state or the timeout elapses.
    pub fn wait_for_result(&self, job_id: JobId, timeout: Duration) -> Result<Value> {
        self.runtime
            .block_on(self.inner.wait_for_result(job_id, timeout))
    }

    /// Make any pending or future dequeue return `Ok(None)`.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }
}
