use crate::handler::{HandlerResult, JobHandler};
use jobq_core::Task;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Runs a single job through its handler, enforcing the task timeout and
/// containing handler panics.
pub struct JobExecutor {
    handler: Arc<dyn JobHandler>,
}

impl JobExecutor {
    pub fn new(handler: Arc<dyn JobHandler>) -> Self {
        JobExecutor { handler }
    }

    pub async fn execute(&self, task: &Task) -> HandlerResult {
        let job_id = task.job_id;
        let timeout_duration = if task.opts.timeout_secs > 0 {
            Duration::from_secs(task.opts.timeout_secs as u64)
        } else {
            DEFAULT_TIMEOUT
        };

        debug!("Executing job {job_id} with timeout {timeout_duration:?}");

        // Run on a separate task so a panicking handler surfaces as a
        // JoinError instead of tearing down the dispatch loop.
        let handler = self.handler.clone();
        let args = task.args.clone();
        let attempt = tokio::spawn(async move { handler.run(args).await });

        match timeout(timeout_duration, attempt).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) if join_error.is_panic() => {
                error!("Job {job_id} panicked during execution");
                Err("Job panicked during execution".to_string())
            }
            Ok(Err(_)) => {
                error!("Job {job_id} was cancelled");
                Err("Job was cancelled".to_string())
            }
            Err(_) => {
                error!("Job {job_id} timed out after {timeout_duration:?}");
                Err(format!("Job timed out after {timeout_duration:?}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{EchoHandler, SleepHandler};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    #[tokio::test]
    async fn test_execute_success() {
        let executor = JobExecutor::new(Arc::new(EchoHandler));
        let task = Task::new("echo", json!("payload")).unwrap();

        let result = executor.execute(&task).await.unwrap();
        assert_eq!(result, json!("payload"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_timeout() {
        let executor = JobExecutor::new(Arc::new(SleepHandler));
        let task = Task::builder("sleep", json!({"millis": 5000}))
            .timeout_secs(1)
            .build()
            .unwrap();

        let err = executor.execute(&task).await.unwrap_err();
        assert!(err.contains("timed out"));
    }

    struct PanicHandler;

    #[async_trait]
    impl JobHandler for PanicHandler {
        async fn run(&self, _args: Value) -> HandlerResult {
            panic!("handler bug");
        }
    }

    #[tokio::test]
    async fn test_panic_contained_as_failure() {
        let executor = JobExecutor::new(Arc::new(PanicHandler));
        let task = Task::new("boom", json!(null)).unwrap();

        let err = executor.execute(&task).await.unwrap_err();
        assert!(err.contains("panicked"));
    }
}
