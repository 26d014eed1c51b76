use crate::{config::BrokerConfig, queue::JobQueue, worker_registry::WorkerRegistry};
use jobq_core::JobStatus;
use jobq_persistence::JobStore;
use jobq_protocol::{
    AcceptedResponse, DequeueRequest, EnqueueRequest, FrameCodec, HeartbeatRequest, Message,
    RejectedResponse, ReportRequest, StatusRequest,
};

use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};

const LEASE_SECS: u64 = 30;
const HEARTBEAT_TIMEOUT_SECS: i64 = 30;
const SWEEP_INTERVAL_SECS: u64 = 10;

/// Broker server: accepts framed TCP connections from producers and workers,
/// backed by the in-memory queue and the durable job store.
pub struct Broker {
    config: Arc<BrokerConfig>,
    queue: Arc<JobQueue>,
    store: Arc<JobStore>,
    workers: Arc<WorkerRegistry>,
    shutdown: Arc<Notify>,
}

impl Broker {
    pub fn new(config: BrokerConfig) -> anyhow::Result<Self> {
        let store = JobStore::open(config.to_store_config())?;

        // Release jobs a previous process left running.
        store.recover()?;

        let queue = JobQueue::new();
        let queued = store.queued_jobs()?;
        info!("Loading {} queued jobs into memory", queued.len());
        for task in queued {
            queue.push(task);
        }

        Ok(Broker {
            config: Arc::new(config),
            queue: Arc::new(queue),
            store: Arc::new(store),
            workers: Arc::new(WorkerRegistry::new(HEARTBEAT_TIMEOUT_SECS)),
            shutdown: Arc::new(Notify::new()),
        })
    }

    /// Run the accept loop until shutdown is requested.
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        let addr = format!("{}:{}", self.config.network.host, self.config.network.port);
        let listener = TcpListener::bind(&addr).await?;

        info!("Broker listening on {addr}");

        let sweeper = self.clone();
        tokio::spawn(async move {
            sweeper.sweep_loop().await;
        });

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            debug!("New connection from {peer}");
                            let broker = self.clone();
                            tokio::spawn(async move {
                                if let Err(e) = broker.handle_connection(stream).await {
                                    error!("Connection error: {e}");
                                }
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {e}");
                        }
                    }
                }
                _ = self.shutdown.notified() => {
                    info!("Shutting down broker");
                    break;
                }
            }
        }

        Ok(())
    }

    async fn handle_connection(&self, stream: TcpStream) -> anyhow::Result<()> {
        let mut framed = Framed::new(stream, FrameCodec);

        while let Some(result) = framed.next().await {
            match result {
                Ok(message) => {
                    let response = self.handle_message(message);
                    framed.send(response).await?;
                }
                Err(e) => {
                    error!("Protocol error: {e}");
                    break;
                }
            }
        }

        Ok(())
    }

    fn handle_message(&self, message: Message) -> Message {
        match message {
            Message::Enqueue(req) => self.handle_enqueue(req),
            Message::Dequeue(req) => self.handle_dequeue(req),
            Message::Report(req) => self.handle_report(req),
            Message::Heartbeat(req) => self.handle_heartbeat(req),
            Message::Status(req) => self.handle_status(req),
            _ => Message::Rejected(RejectedResponse {
                reason: "Unexpected frame".to_string(),
            }),
        }
    }

    fn handle_enqueue(&self, req: EnqueueRequest) -> Message {
        let task = req.task;
        let job_id = task.job_id;

        if self.queue.len() >= self.config.network.queue_depth_limit {
            warn!("Queue depth limit reached, rejecting job {job_id}");
            return Message::Rejected(RejectedResponse {
                reason: "Queue depth limit reached".to_string(),
            });
        }

        match self.store.enqueue_job(task.clone()) {
            Ok(()) => {
                self.queue.push(task);
                info!("Enqueued job {job_id}");
                Message::Accepted(AcceptedResponse {
                    task: None,
                    note: Some(format!("Job {job_id} enqueued")),
                })
            }
            Err(e) => {
                error!("Failed to enqueue job {job_id}: {e}");
                Message::Rejected(RejectedResponse {
                    reason: format!("Failed to enqueue job: {e}"),
                })
            }
        }
    }

    fn handle_dequeue(&self, req: DequeueRequest) -> Message {
        let worker_id = req.worker_id;

        if self.workers.get(&worker_id).is_none() {
            self.workers.register(worker_id.clone());
            info!("Registered worker {worker_id}");
        }
        self.workers.touch(&worker_id);

        let Some(task) = self.queue.pop() else {
            return Message::Accepted(AcceptedResponse {
                task: None,
                note: Some("No jobs ready".to_string()),
            });
        };

        let job_id = task.job_id;
        match self.store.claim_job(&job_id, worker_id.clone(), LEASE_SECS) {
            Ok(claimed) => {
                self.workers.assign_job(&worker_id, job_id);
                debug!("Worker {worker_id} claimed job {job_id}");
                Message::Accepted(AcceptedResponse {
                    task: Some(claimed),
                    note: None,
                })
            }
            Err(e) => {
                error!("Failed to claim job {job_id}: {e}");
                self.queue.push(task);
                Message::Rejected(RejectedResponse {
                    reason: format!("Failed to claim job: {e}"),
                })
            }
        }
    }

    fn handle_report(&self, req: ReportRequest) -> Message {
        let job_id = req.job_id;
        self.workers.clear_job(&req.worker_id, &job_id);

        if req.success {
            let result = req.result.unwrap_or(serde_json::Value::Null);
            match self.store.complete_job(&job_id, result) {
                Ok(()) => {
                    info!("Job {job_id} completed");
                    Message::Accepted(AcceptedResponse {
                        task: None,
                        note: Some("Result recorded".to_string()),
                    })
                }
                Err(e) => {
                    error!("Failed to record result for job {job_id}: {e}");
                    Message::Rejected(RejectedResponse {
                        reason: format!("Failed to record result: {e}"),
                    })
                }
            }
        } else {
            let error = req.error.unwrap_or_else(|| "Unknown error".to_string());
            match self.store.fail_job(&job_id, error) {
                Ok(task) => {
                    match task.status {
                        JobStatus::Queued => {
                            info!(
                                "Job {job_id} failed, retry {} scheduled",
                                task.retry_count
                            );
                            self.queue.push(task);
                        }
                        JobStatus::DeadLetter => {
                            warn!("Job {job_id} moved to dead letter queue");
                        }
                        _ => {}
                    }
                    Message::Accepted(AcceptedResponse {
                        task: None,
                        note: Some("Failure recorded".to_string()),
                    })
                }
                Err(e) => {
                    error!("Failed to record failure for job {job_id}: {e}");
                    Message::Rejected(RejectedResponse {
                        reason: format!("Failed to record failure: {e}"),
                    })
                }
            }
        }
    }

    fn handle_heartbeat(&self, req: HeartbeatRequest) -> Message {
        if self.workers.update_heartbeat(&req.worker_id, req.active_jobs) {
            debug!("Heartbeat from worker {}", req.worker_id);

            // A live worker keeps the leases on its in-flight jobs; without
            // renewal any job outlasting one lease would be re-queued and
            // run twice.
            if let Some(worker) = self.workers.get(&req.worker_id) {
                for job_id in &worker.leased_jobs {
                    if let Err(e) = self.store.renew_lease(job_id, LEASE_SECS) {
                        warn!("Failed to renew lease on job {job_id}: {e}");
                    }
                }
            }

            Message::Accepted(AcceptedResponse {
                task: None,
                note: None,
            })
        } else {
            warn!("Heartbeat from unknown worker {}", req.worker_id);
            Message::Rejected(RejectedResponse {
                reason: "Worker not registered".to_string(),
            })
        }
    }

    fn handle_status(&self, req: StatusRequest) -> Message {
        match self.store.get_job(&req.job_id) {
            Ok(Some(task)) => Message::Accepted(AcceptedResponse {
                task: Some(task),
                note: None,
            }),
            Ok(None) => Message::Rejected(RejectedResponse {
                reason: "Job not found".to_string(),
            }),
            Err(e) => Message::Rejected(RejectedResponse {
                reason: format!("Status lookup failed: {e}"),
            }),
        }
    }

    /// Periodic maintenance: reclaim expired leases, evict dead workers,
    /// purge completed jobs past retention.
    async fn sweep_loop(&self) {
        let mut interval = tokio::time::interval(Duration::from_secs(SWEEP_INTERVAL_SECS));

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.reclaim_expired_leases();
                    self.evict_dead_workers();
                    if let Err(e) = self.store.purge_old_completed() {
                        error!("Failed to purge completed jobs: {e}");
                    }
                    let (high, normal, low) = self.queue.depth_by_priority();
                    debug!(
                        "Queue depth high={high} normal={normal} low={low}, workers alive={}",
                        self.workers.count_alive()
                    );
                }
                _ = self.shutdown.notified() => {
                    break;
                }
            }
        }
    }

    /// At-least-once delivery: running jobs whose lease has lapsed go back to
    /// the queue, whether the worker died or is merely stuck.
    fn reclaim_expired_leases(&self) {
        let running = match self.store.running_jobs() {
            Ok(jobs) => jobs,
            Err(e) => {
                error!("Failed to list running jobs: {e}");
                return;
            }
        };

        for task in running.into_iter().filter(|t| t.is_lease_expired()) {
            let job_id = task.job_id;
            warn!("Lease expired for job {job_id}, reclaiming");

            if let Some(worker_id) = &task.worker_id {
                self.workers.clear_job(worker_id, &job_id);
            }

            match self.store.release_job(&job_id) {
                Ok(released) => self.queue.push(released),
                Err(e) => error!("Failed to release job {job_id}: {e}"),
            }
        }
    }

    fn evict_dead_workers(&self) {
        for worker in self.workers.evict_dead() {
            info!("Evicted dead worker {}", worker.worker_id);
            // Leases left behind are reclaimed by the expiry sweep.
        }
    }

    pub fn store(&self) -> Arc<JobStore> {
        self.store.clone()
    }

    pub fn queue(&self) -> Arc<JobQueue> {
        self.queue.clone()
    }

    pub fn workers(&self) -> Arc<WorkerRegistry> {
        self.workers.clone()
    }

    /// Request shutdown of the accept and sweep loops.
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}
