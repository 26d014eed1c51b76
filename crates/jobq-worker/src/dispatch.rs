use crate::worker::Worker;
use jobq_client::{AsyncQueueClient, ClientError};
use std::sync::Arc;
use tracing::{error, info, warn};

/// The dispatch loop: pull one task descriptor at a time from the queue and
/// execute it synchronously before pulling the next.
///
/// Per task, exactly two lines are logged at info level: a START line before
/// execution and a DONE line after, both tagged with job id and task name.
/// Handler failures are reported to the broker and do not stop the loop,
/// and neither does a broker-rejected report; only transport errors
/// propagate to the caller.
pub struct Dispatcher {
    client: Arc<AsyncQueueClient>,
    worker: Arc<Worker>,
}

impl Dispatcher {
    pub fn new(client: Arc<AsyncQueueClient>, worker: Arc<Worker>) -> Self {
        Dispatcher { client, worker }
    }

    /// Run until the client's dequeue reports shutdown.
    ///
    /// `dequeue_task` blocks while the queue is empty; it returns `None`
    /// only once shutdown has been requested on the client, which is the
    /// loop's termination condition.
    pub async fn run(&self) -> jobq_client::Result<()> {
        info!("Worker {} started and waiting for tasks", self.worker.worker_id());

        while let Some(task) = self.client.dequeue_task().await? {
            info!("START task {}: {}", task.job_id, task.task_name);

            self.worker
                .queue_job(&task.task_name, task.args, task.opts, task.job_id);
            let reports = self.worker.run().await;

            info!("DONE task {}: {}", task.job_id, task.task_name);

            for report in reports {
                let ack = match report.outcome {
                    Ok(result) => self.client.report_success(report.job_id, result).await,
                    Err(reason) => {
                        error!("Task {} failed: {reason}", report.job_id);
                        self.client.report_failure(report.job_id, reason).await
                    }
                };

                match ack {
                    Ok(()) => {}
                    // A stale report (the lease lapsed and the job moved on
                    // without us) is the broker's call; keep dispatching.
                    Err(ClientError::Rejected(reason)) => {
                        warn!("Report for job {} rejected: {reason}", report.job_id);
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        info!("Dispatch loop stopped");
        Ok(())
    }
}
