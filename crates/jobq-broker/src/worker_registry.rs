use chrono::{DateTime, Duration, Utc};
use jobq_core::JobId;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Broker-side view of a connected worker.
#[derive(Debug, Clone)]
pub struct WorkerInfo {
    pub worker_id: String,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    /// Jobs currently leased to this worker.
    pub leased_jobs: Vec<JobId>,
    /// Active job count as reported in the last heartbeat.
    pub reported_active: usize,
}

impl WorkerInfo {
    fn new(worker_id: String) -> Self {
        let now = Utc::now();
        WorkerInfo {
            worker_id,
            registered_at: now,
            last_heartbeat: now,
            leased_jobs: Vec::new(),
            reported_active: 0,
        }
    }

    /// Whether the last heartbeat is within the timeout window.
    pub fn is_alive(&self, timeout_secs: i64) -> bool {
        Utc::now() - self.last_heartbeat < Duration::seconds(timeout_secs)
    }

    fn heartbeat(&mut self, active: usize) {
        self.last_heartbeat = Utc::now();
        self.reported_active = active;
    }
}

/// Registry of workers that have contacted the broker.
pub struct WorkerRegistry {
    workers: RwLock<HashMap<String, WorkerInfo>>,
    heartbeat_timeout_secs: i64,
}

impl WorkerRegistry {
    pub fn new(heartbeat_timeout_secs: i64) -> Self {
        WorkerRegistry {
            workers: RwLock::new(HashMap::new()),
            heartbeat_timeout_secs,
        }
    }

    /// Register a worker, replacing any previous record under the same id.
    pub fn register(&self, worker_id: String) -> WorkerInfo {
        let info = WorkerInfo::new(worker_id.clone());
        self.workers.write().insert(worker_id, info.clone());
        info
    }

    /// Record a heartbeat; false when the worker is unknown.
    pub fn update_heartbeat(&self, worker_id: &str, active: usize) -> bool {
        match self.workers.write().get_mut(worker_id) {
            Some(worker) => {
                worker.heartbeat(active);
                true
            }
            None => false,
        }
    }

    /// Record liveness only, leaving the reported active count alone.
    /// A dequeue poll is as good a liveness signal as a heartbeat.
    pub fn touch(&self, worker_id: &str) -> bool {
        match self.workers.write().get_mut(worker_id) {
            Some(worker) => {
                worker.last_heartbeat = Utc::now();
                true
            }
            None => false,
        }
    }

    pub fn get(&self, worker_id: &str) -> Option<WorkerInfo> {
        self.workers.read().get(worker_id).cloned()
    }

    /// Record that a job is leased to a worker.
    pub fn assign_job(&self, worker_id: &str, job_id: JobId) {
        if let Some(worker) = self.workers.write().get_mut(worker_id) {
            if !worker.leased_jobs.contains(&job_id) {
                worker.leased_jobs.push(job_id);
            }
        }
    }

    /// Clear a job lease from a worker.
    pub fn clear_job(&self, worker_id: &str, job_id: &JobId) {
        if let Some(worker) = self.workers.write().get_mut(worker_id) {
            worker.leased_jobs.retain(|id| id != job_id);
        }
    }

    /// Drop workers whose heartbeat has timed out, returning them. Leases
    /// they held are reclaimed by the broker's lease-expiry sweep.
    pub fn evict_dead(&self) -> Vec<WorkerInfo> {
        let mut workers = self.workers.write();
        let dead_ids: Vec<String> = workers
            .values()
            .filter(|w| !w.is_alive(self.heartbeat_timeout_secs))
            .map(|w| w.worker_id.clone())
            .collect();

        dead_ids
            .into_iter()
            .filter_map(|id| workers.remove(&id))
            .collect()
    }

    pub fn count_alive(&self) -> usize {
        self.workers
            .read()
            .values()
            .filter(|w| w.is_alive(self.heartbeat_timeout_secs))
            .count()
    }

    pub fn count_total(&self) -> usize {
        self.workers.read().len()
    }
}
