use crate::executor::JobExecutor;
use crate::handler::{HandlerRegistry, HandlerResult};
use jobq_core::{JobId, Task, TaskName, TaskOpts};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// A job staged for execution via `queue_job`.
struct StagedJob {
    job_id: JobId,
    task_name: TaskName,
    args: Value,
    opts: TaskOpts,
}

/// Outcome of one executed job, in staging order.
#[derive(Debug)]
pub struct JobReport {
    pub job_id: JobId,
    pub task_name: TaskName,
    pub outcome: HandlerResult,
    pub elapsed: Duration,
}

impl JobReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Job execution engine with a two-phase contract: `queue_job` stages work
/// locally, `run` executes everything staged, in order, one job at a time.
///
/// The worker owns no queue connection; the dispatch loop feeds it tasks and
/// forwards its reports to the broker.
pub struct Worker {
    worker_id: String,
    registry: Arc<HandlerRegistry>,
    staged: Mutex<VecDeque<StagedJob>>,
    active: AtomicUsize,
}

impl Worker {
    pub fn new(worker_id: impl Into<String>, registry: HandlerRegistry) -> Self {
        Worker {
            worker_id: worker_id.into(),
            registry: Arc::new(registry),
            staged: Mutex::new(VecDeque::new()),
            active: AtomicUsize::new(0),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Stage a job for the next `run`, preserving the caller's job id for
    /// correlation.
    pub fn queue_job(
        &self,
        task_name: impl Into<TaskName>,
        args: Value,
        opts: TaskOpts,
        job_id: JobId,
    ) {
        let job = StagedJob {
            job_id,
            task_name: task_name.into(),
            args,
            opts,
        };
        self.staged.lock().push_back(job);
    }

    /// Number of jobs staged but not yet run.
    pub fn staged_len(&self) -> usize {
        self.staged.lock().len()
    }

    /// Jobs currently executing (0 or 1; execution is sequential).
    pub fn active_jobs(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Execute every staged job sequentially, in staging order, and return
    /// one report per job. A job with no registered handler yields a failed
    /// report; it never aborts the run.
    pub async fn run(&self) -> Vec<JobReport> {
        let mut reports = Vec::new();

        while let Some(job) = self.pop_staged() {
            self.active.store(1, Ordering::SeqCst);
            let report = self.execute_staged(job).await;
            self.active.store(0, Ordering::SeqCst);
            reports.push(report);
        }

        reports
    }

    fn pop_staged(&self) -> Option<StagedJob> {
        self.staged.lock().pop_front()
    }

    async fn execute_staged(&self, job: StagedJob) -> JobReport {
        let started = Instant::now();

        let outcome = match self.registry.get(&job.task_name) {
            Some(handler) => {
                // Rebuild a descriptor for the executor's timeout handling.
                let mut task = match Task::with_opts(job.task_name.clone(), job.args, job.opts) {
                    Ok(task) => task,
                    Err(e) => {
                        return JobReport {
                            job_id: job.job_id,
                            task_name: job.task_name,
                            outcome: Err(format!("Invalid job: {e}")),
                            elapsed: started.elapsed(),
                        }
                    }
                };
                task.job_id = job.job_id;

                debug!("Running job {} ({})", job.job_id, job.task_name);
                JobExecutor::new(handler).execute(&task).await
            }
            None => {
                warn!(
                    "No handler registered for task '{}' (job {})",
                    job.task_name, job.job_id
                );
                Err(format!("No handler for task '{}'", job.task_name))
            }
        };

        JobReport {
            job_id: job.job_id,
            task_name: job.task_name,
            outcome,
            elapsed: started.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{EchoHandler, JobHandler};
    use async_trait::async_trait;
    use serde_json::json;
    use uuid::Uuid;

    /// Records the order in which args arrive.
    struct RecordingHandler {
        seen: Arc<Mutex<Vec<Value>>>,
    }

    #[async_trait]
    impl JobHandler for RecordingHandler {
        async fn run(&self, args: Value) -> HandlerResult {
            self.seen.lock().push(args.clone());
            Ok(args)
        }
    }

    #[test]
    fn test_queue_job_stages_without_running() {
        let worker = Worker::new("w1", HandlerRegistry::new());
        worker.queue_job("echo", json!(1), TaskOpts::default(), Uuid::new_v4());

        assert_eq!(worker.staged_len(), 1);
        assert_eq!(worker.active_jobs(), 0);
    }

    #[tokio::test]
    async fn test_run_executes_staged_jobs_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let registry = HandlerRegistry::new();
        registry.register("record", RecordingHandler { seen: seen.clone() });

        let worker = Worker::new("w1", registry);

        let ids: Vec<JobId> = (0..5).map(|_| Uuid::new_v4()).collect();
        for (n, id) in ids.iter().enumerate() {
            worker.queue_job("record", json!(n), TaskOpts::default(), *id);
        }

        let reports = worker.run().await;

        // Exactly one report per staged job, in staging order.
        assert_eq!(reports.len(), 5);
        for (n, report) in reports.iter().enumerate() {
            assert_eq!(report.job_id, ids[n]);
            assert!(report.is_success());
        }

        let order: Vec<Value> = seen.lock().clone();
        assert_eq!(order, (0..5).map(|n| json!(n)).collect::<Vec<_>>());
        assert_eq!(worker.staged_len(), 0);
    }

    #[tokio::test]
    async fn test_missing_handler_fails_job_only() {
        let registry = HandlerRegistry::new();
        registry.register("echo", EchoHandler);

        let worker = Worker::new("w1", registry);
        worker.queue_job("unknown", json!(null), TaskOpts::default(), Uuid::new_v4());
        worker.queue_job("echo", json!("ok"), TaskOpts::default(), Uuid::new_v4());

        let reports = worker.run().await;

        assert_eq!(reports.len(), 2);
        assert!(reports[0].outcome.as_ref().unwrap_err().contains("No handler"));
        assert_eq!(reports[1].outcome.as_ref().unwrap(), &json!("ok"));
    }
}
