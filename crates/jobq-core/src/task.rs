use crate::{Priority, QueueError, Result, MAX_ARGS_SIZE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Unique identifier for a job.
pub type JobId = Uuid;

/// Task name identifying which handler runs the job (e.g. "transcribe").
pub type TaskName = String;

/// Status of a job in the queue system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting in the queue to be claimed by a worker.
    Queued,
    /// Claimed and currently executing on a worker.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error (may be retried).
    Failed,
    /// Exhausted all retries and parked in the dead letter queue.
    DeadLetter,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::DeadLetter => "dead_letter",
        }
    }
}

/// Per-task execution options supplied by the producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOpts {
    /// Scheduling tier relative to other queued jobs.
    #[serde(default)]
    pub priority: Priority,

    /// How many times the broker re-queues the job after a failure.
    #[serde(default = "TaskOpts::default_max_retries")]
    pub max_retries: u32,

    /// Execution timeout in seconds (0 means the worker default applies).
    #[serde(default = "TaskOpts::default_timeout_secs")]
    pub timeout_secs: u32,
}

impl TaskOpts {
    fn default_max_retries() -> u32 {
        3
    }

    fn default_timeout_secs() -> u32 {
        300
    }
}

impl Default for TaskOpts {
    fn default() -> Self {
        TaskOpts {
            priority: Priority::default(),
            max_retries: Self::default_max_retries(),
            timeout_secs: Self::default_timeout_secs(),
        }
    }
}

/// Task descriptor: the record a producer enqueues and a worker dequeues.
///
/// Carries the job identity, the task name used to look up a handler, the
/// JSON args handed to that handler, and the options governing scheduling
/// and retries, plus the broker-managed lifecycle bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Job identifier, used for correlation in logs and result reporting.
    pub job_id: JobId,

    /// Task name (selects the handler on the worker side).
    pub task_name: TaskName,

    /// Handler arguments as an arbitrary JSON document (max 1MiB serialized).
    pub args: Value,

    /// Producer-supplied execution options.
    pub opts: TaskOpts,

    /// Current lifecycle status.
    pub status: JobStatus,

    /// When the job was created.
    pub created_at: DateTime<Utc>,

    /// Earliest time the job may be dequeued (moved forward by retries).
    pub scheduled_at: DateTime<Utc>,

    /// Last state transition timestamp.
    pub updated_at: DateTime<Utc>,

    /// Number of failed attempts so far.
    pub retry_count: u32,

    /// Worker currently holding the job, if running.
    pub worker_id: Option<String>,

    /// Handler result, once completed.
    pub result: Option<Value>,

    /// Error message from the most recent failed attempt.
    pub error: Option<String>,

    /// When the job reached a terminal attempt (success or failure).
    pub completed_at: Option<DateTime<Utc>>,

    /// Lease expiry for running jobs; past this the broker may reclaim.
    pub lease_expires_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a new queued task with default options.
    pub fn new(task_name: impl Into<TaskName>, args: Value) -> Result<Self> {
        Self::with_opts(task_name, args, TaskOpts::default())
    }

    /// Create a new queued task with explicit options.
    pub fn with_opts(
        task_name: impl Into<TaskName>,
        args: Value,
        opts: TaskOpts,
    ) -> Result<Self> {
        let task_name = task_name.into();
        if task_name.is_empty() {
            return Err(QueueError::EmptyTaskName);
        }
        check_args_size(&args)?;

        let now = Utc::now();
        Ok(Task {
            job_id: Uuid::new_v4(),
            task_name,
            args,
            opts,
            status: JobStatus::Queued,
            created_at: now,
            scheduled_at: now,
            updated_at: now,
            retry_count: 0,
            worker_id: None,
            result: None,
            error: None,
            completed_at: None,
            lease_expires_at: None,
        })
    }

    /// Start building a task with custom options.
    pub fn builder(task_name: impl Into<TaskName>, args: Value) -> TaskBuilder {
        TaskBuilder::new(task_name, args)
    }

    /// Serialize the task descriptor to JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(QueueError::from)
    }

    /// Deserialize a task descriptor from JSON bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(QueueError::from)
    }

    /// Whether the scheduled time has passed and the job may be dequeued.
    pub fn is_ready(&self) -> bool {
        self.scheduled_at <= Utc::now()
    }

    /// Whether the broker may re-queue this job after a failure.
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.opts.max_retries
    }

    /// Retry delay with exponential backoff, capped at one hour.
    pub fn retry_delay_secs(&self) -> u64 {
        const BASE_DELAY: u64 = 5;
        const MAX_DELAY: u64 = 3600;

        BASE_DELAY
            .saturating_mul(2u64.saturating_pow(self.retry_count))
            .min(MAX_DELAY)
    }

    /// Mark the job as claimed by a worker under a lease.
    pub fn claim(&mut self, worker_id: String, lease_secs: u64) {
        let now = Utc::now();
        self.status = JobStatus::Running;
        self.worker_id = Some(worker_id);
        self.updated_at = now;
        self.lease_expires_at = Some(now + chrono::Duration::seconds(lease_secs as i64));
    }

    /// Mark the job as completed with the handler's result.
    pub fn complete(&mut self, result: Value) -> Result<()> {
        check_args_size(&result)?;

        self.status = JobStatus::Completed;
        self.result = Some(result);
        self.completed_at = Some(Utc::now());
        self.updated_at = Utc::now();
        self.worker_id = None;
        self.lease_expires_at = None;
        Ok(())
    }

    /// Mark the job as failed.
    pub fn fail(&mut self, error: String) {
        self.status = JobStatus::Failed;
        self.error = Some(error);
        self.completed_at = Some(Utc::now());
        self.updated_at = Utc::now();
        self.worker_id = None;
        self.lease_expires_at = None;
    }

    /// Park the job in the dead letter queue.
    pub fn dead_letter(&mut self) {
        self.status = JobStatus::DeadLetter;
        self.updated_at = Utc::now();
        self.worker_id = None;
        self.lease_expires_at = None;
    }

    /// Return the job to the queue (lease expired or worker lost).
    pub fn release(&mut self) {
        self.status = JobStatus::Queued;
        self.worker_id = None;
        self.lease_expires_at = None;
        self.updated_at = Utc::now();
    }

    /// Record a failed attempt and reschedule with backoff.
    pub fn retry(&mut self) {
        self.retry_count += 1;
        let delay = self.retry_delay_secs();
        self.scheduled_at = Utc::now() + chrono::Duration::seconds(delay as i64);
        self.status = JobStatus::Queued;
        self.worker_id = None;
        self.lease_expires_at = None;
        self.updated_at = Utc::now();
    }

    /// Extend the lease on a running job.
    pub fn renew_lease(&mut self, lease_secs: u64) {
        let now = Utc::now();
        self.lease_expires_at = Some(now + chrono::Duration::seconds(lease_secs as i64));
        self.updated_at = now;
    }

    /// Whether the running job's lease has expired.
    pub fn is_lease_expired(&self) -> bool {
        match self.lease_expires_at {
            Some(expires) => expires <= Utc::now(),
            None => false,
        }
    }
}

fn check_args_size(value: &Value) -> Result<()> {
    let size = serde_json::to_vec(value)?.len();
    if size > MAX_ARGS_SIZE {
        return Err(QueueError::ArgsTooLarge {
            max: MAX_ARGS_SIZE,
            actual: size,
        });
    }
    Ok(())
}

/// Builder for tasks with non-default scheduling or retry settings.
pub struct TaskBuilder {
    task_name: TaskName,
    args: Value,
    opts: TaskOpts,
    scheduled_at: Option<DateTime<Utc>>,
}

impl TaskBuilder {
    pub fn new(task_name: impl Into<TaskName>, args: Value) -> Self {
        TaskBuilder {
            task_name: task_name.into(),
            args,
            opts: TaskOpts::default(),
            scheduled_at: None,
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.opts.priority = priority;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.opts.max_retries = max_retries;
        self
    }

    pub fn timeout_secs(mut self, timeout_secs: u32) -> Self {
        self.opts.timeout_secs = timeout_secs;
        self
    }

    pub fn scheduled_at(mut self, scheduled_at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(scheduled_at);
        self
    }

    pub fn build(self) -> Result<Task> {
        let mut task = Task::with_opts(self.task_name, self.args, self.opts)?;
        if let Some(scheduled_at) = self.scheduled_at {
            task.scheduled_at = scheduled_at;
        }
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_task_creation() {
        let task = Task::new("transcribe", json!({"media_url": "http://x/y.mp3"})).unwrap();

        assert_eq!(task.task_name, "transcribe");
        assert_eq!(task.status, JobStatus::Queued);
        assert_eq!(task.retry_count, 0);
        assert!(task.is_ready());
    }

    #[test]
    fn test_empty_task_name_rejected() {
        assert!(matches!(
            Task::new("", json!(null)),
            Err(QueueError::EmptyTaskName)
        ));
    }

    #[test]
    fn test_serialization_roundtrip() {
        let task = Task::builder("nlp", json!({"post_id": 42}))
            .priority(Priority::High)
            .build()
            .unwrap();

        let bytes = task.to_bytes().unwrap();
        let decoded = Task::from_bytes(&bytes).unwrap();

        assert_eq!(decoded.job_id, task.job_id);
        assert_eq!(decoded.task_name, task.task_name);
        assert_eq!(decoded.args, task.args);
        assert_eq!(decoded.opts, task.opts);
    }

    #[test]
    fn test_builder_options() {
        let scheduled = Utc::now() + chrono::Duration::hours(1);
        let task = Task::builder("transcribe", json!({}))
            .priority(Priority::High)
            .max_retries(5)
            .timeout_secs(600)
            .scheduled_at(scheduled)
            .build()
            .unwrap();

        assert_eq!(task.opts.priority, Priority::High);
        assert_eq!(task.opts.max_retries, 5);
        assert_eq!(task.opts.timeout_secs, 600);
        assert_eq!(task.scheduled_at, scheduled);
        assert!(!task.is_ready());
    }

    #[test]
    fn test_claim_and_complete() {
        let mut task = Task::new("echo", json!("hi")).unwrap();

        task.claim("worker-1".to_string(), 30);
        assert_eq!(task.status, JobStatus::Running);
        assert_eq!(task.worker_id.as_deref(), Some("worker-1"));
        assert!(!task.is_lease_expired());

        task.complete(json!("hi")).unwrap();
        assert_eq!(task.status, JobStatus::Completed);
        assert!(task.worker_id.is_none());
        assert!(task.lease_expires_at.is_none());
    }

    #[test]
    fn test_retry_reschedules_with_backoff() {
        let mut task = Task::new("echo", json!(null)).unwrap();

        task.claim("worker-1".to_string(), 30);
        task.fail("boom".to_string());
        assert!(task.can_retry());

        task.retry();
        assert_eq!(task.retry_count, 1);
        assert_eq!(task.status, JobStatus::Queued);
        assert!(!task.is_ready());
    }

    #[test]
    fn test_args_size_limit() {
        let big = json!("x".repeat(MAX_ARGS_SIZE + 1));
        assert!(matches!(
            Task::new("echo", big),
            Err(QueueError::ArgsTooLarge { .. })
        ));
    }

    proptest! {
        #[test]
        fn retry_delay_is_bounded_and_monotone(retries in 0u32..64) {
            let mut task = Task::new("echo", serde_json::Value::Null).unwrap();
            task.retry_count = retries;
            let delay = task.retry_delay_secs();
            prop_assert!(delay >= 5);
            prop_assert!(delay <= 3600);

            task.retry_count = retries.saturating_add(1);
            prop_assert!(task.retry_delay_secs() >= delay);
        }
    }
}
