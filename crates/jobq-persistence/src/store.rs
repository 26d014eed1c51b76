use crate::{PersistenceError, Result, WalEntry, WriteAheadLog};
use chrono::{Duration, Utc};
use jobq_core::{JobId, JobStatus, Task};
use rocksdb::{ColumnFamilyDescriptor, Options, WriteBatch, DB};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Configuration for the durable job store.
#[derive(Debug, Clone)]
pub struct JobStoreConfig {
    pub data_dir: PathBuf,
    pub completed_retention_days: i64,
}

impl Default for JobStoreConfig {
    fn default() -> Self {
        JobStoreConfig {
            data_dir: PathBuf::from("./data"),
            completed_retention_days: 7,
        }
    }
}

const CF_QUEUED: &str = "queued";
const CF_RUNNING: &str = "running";
const CF_COMPLETED: &str = "completed";
const CF_FAILED: &str = "failed";
const CF_DEAD_LETTER: &str = "dead_letter";

const ALL_CFS: &[&str] = &[CF_QUEUED, CF_RUNNING, CF_COMPLETED, CF_FAILED, CF_DEAD_LETTER];

fn cf_for_status(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Queued => CF_QUEUED,
        JobStatus::Running => CF_RUNNING,
        JobStatus::Completed => CF_COMPLETED,
        JobStatus::Failed => CF_FAILED,
        JobStatus::DeadLetter => CF_DEAD_LETTER,
    }
}

/// Durable job store: RocksDB with one column family per status, fronted by
/// a write-ahead log. Every transition is logged before the store mutates.
pub struct JobStore {
    db: Arc<DB>,
    wal: Arc<WriteAheadLog>,
    config: JobStoreConfig,
}

impl JobStore {
    /// Open or create the store under the configured data directory.
    pub fn open(config: JobStoreConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let db_path = config.data_dir.join("jobs");
        let wal_path = config.data_dir.join("wal");

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, db_path, cf_descriptors)?;
        let wal = WriteAheadLog::open(wal_path)?;

        info!("Opened job store at {:?}", config.data_dir);

        Ok(JobStore {
            db: Arc::new(db),
            wal: Arc::new(wal),
            config,
        })
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| PersistenceError::Other(format!("column family {name} not found")))
    }

    /// Persist a newly enqueued job.
    pub fn enqueue_job(&self, mut task: Task) -> Result<()> {
        self.wal.append(WalEntry::Enqueued {
            task: task.clone(),
            timestamp: Utc::now(),
        })?;

        task.status = JobStatus::Queued;
        let key = task.job_id.as_bytes();
        let value = task.to_bytes()?;
        self.db.put_cf(self.cf(CF_QUEUED)?, key, value)?;

        debug!("Persisted job {}", task.job_id);
        Ok(())
    }

    /// Look up a job by id across all status column families.
    pub fn get_job(&self, job_id: &JobId) -> Result<Option<Task>> {
        let key = job_id.as_bytes();

        for cf_name in ALL_CFS {
            if let Some(value) = self.db.get_cf(self.cf(cf_name)?, key)? {
                return Ok(Some(Task::from_bytes(&value)?));
            }
        }

        Ok(None)
    }

    /// Move a queued job to running under a lease for the given worker.
    pub fn claim_job(&self, job_id: &JobId, worker_id: String, lease_secs: u64) -> Result<Task> {
        let key = job_id.as_bytes();

        let queued_cf = self.cf(CF_QUEUED)?;
        let value = self
            .db
            .get_cf(queued_cf, key)?
            .ok_or_else(|| PersistenceError::JobNotFound(job_id.to_string()))?;
        let mut task = Task::from_bytes(&value)?;

        self.wal.append(WalEntry::Claimed {
            job_id: *job_id,
            worker_id: worker_id.clone(),
            timestamp: Utc::now(),
        })?;

        task.claim(worker_id.clone(), lease_secs);

        let mut batch = WriteBatch::default();
        batch.delete_cf(queued_cf, key);
        batch.put_cf(self.cf(CF_RUNNING)?, key, task.to_bytes()?);
        self.db.write(batch)?;

        debug!("Claimed job {job_id} for worker {worker_id}");
        Ok(task)
    }

    /// Extend the lease on a running job. Leases are not logged; a renewal
    /// lost to a crash just means the job is reclaimed a little early.
    pub fn renew_lease(&self, job_id: &JobId, lease_secs: u64) -> Result<()> {
        let key = job_id.as_bytes();

        let running_cf = self.cf(CF_RUNNING)?;
        let value = self
            .db
            .get_cf(running_cf, key)?
            .ok_or_else(|| PersistenceError::JobNotFound(job_id.to_string()))?;
        let mut task = Task::from_bytes(&value)?;

        task.renew_lease(lease_secs);
        self.db.put_cf(running_cf, key, task.to_bytes()?)?;

        debug!("Renewed lease on job {job_id}");
        Ok(())
    }

    /// Record a successful job outcome.
    pub fn complete_job(&self, job_id: &JobId, result: Value) -> Result<()> {
        let key = job_id.as_bytes();

        let running_cf = self.cf(CF_RUNNING)?;
        let value = self
            .db
            .get_cf(running_cf, key)?
            .ok_or_else(|| PersistenceError::JobNotFound(job_id.to_string()))?;
        let mut task = Task::from_bytes(&value)?;

        self.wal.append(WalEntry::Completed {
            job_id: *job_id,
            result: result.clone(),
            timestamp: Utc::now(),
        })?;

        task.complete(result)?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(running_cf, key);
        batch.put_cf(self.cf(CF_COMPLETED)?, key, task.to_bytes()?);
        self.db.write(batch)?;

        debug!("Completed job {job_id}");
        Ok(())
    }

    /// Record a failed attempt. The job either goes back to queued with
    /// backoff, or to the dead letter queue once retries are exhausted.
    /// Returns the task in its post-transition state.
    pub fn fail_job(&self, job_id: &JobId, error: String) -> Result<Task> {
        let key = job_id.as_bytes();

        let running_cf = self.cf(CF_RUNNING)?;
        let value = self
            .db
            .get_cf(running_cf, key)?
            .ok_or_else(|| PersistenceError::JobNotFound(job_id.to_string()))?;
        let mut task = Task::from_bytes(&value)?;

        self.wal.append(WalEntry::Failed {
            job_id: *job_id,
            error: error.clone(),
            timestamp: Utc::now(),
        })?;

        task.fail(error);

        let destination_cf = if task.can_retry() {
            task.retry();
            self.cf(CF_QUEUED)?
        } else {
            task.dead_letter();
            self.wal.append(WalEntry::DeadLettered {
                job_id: *job_id,
                timestamp: Utc::now(),
            })?;
            self.cf(CF_DEAD_LETTER)?
        };

        let mut batch = WriteBatch::default();
        batch.delete_cf(running_cf, key);
        batch.put_cf(destination_cf, key, task.to_bytes()?);
        self.db.write(batch)?;

        debug!(
            "Failed job {job_id} (retry_count: {}, status: {})",
            task.retry_count,
            task.status.as_str()
        );
        Ok(task)
    }

    /// Return a running job to the queue (lease expired or worker lost).
    pub fn release_job(&self, job_id: &JobId) -> Result<Task> {
        let key = job_id.as_bytes();

        let running_cf = self.cf(CF_RUNNING)?;
        let value = self
            .db
            .get_cf(running_cf, key)?
            .ok_or_else(|| PersistenceError::JobNotFound(job_id.to_string()))?;
        let mut task = Task::from_bytes(&value)?;

        self.wal.append(WalEntry::Released {
            job_id: *job_id,
            timestamp: Utc::now(),
        })?;

        task.release();

        let mut batch = WriteBatch::default();
        batch.delete_cf(running_cf, key);
        batch.put_cf(self.cf(CF_QUEUED)?, key, task.to_bytes()?);
        self.db.write(batch)?;

        debug!("Released job {job_id}");
        Ok(task)
    }

    /// All jobs currently queued.
    pub fn queued_jobs(&self) -> Result<Vec<Task>> {
        self.jobs_in_cf(CF_QUEUED)
    }

    /// All jobs currently running.
    pub fn running_jobs(&self) -> Result<Vec<Task>> {
        self.jobs_in_cf(CF_RUNNING)
    }

    /// All jobs with the given status.
    pub fn jobs_with_status(&self, status: JobStatus) -> Result<Vec<Task>> {
        self.jobs_in_cf(cf_for_status(status))
    }

    fn jobs_in_cf(&self, cf_name: &str) -> Result<Vec<Task>> {
        let cf = self.cf(cf_name)?;
        let mut tasks = Vec::new();

        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (_key, value) = item?;
            tasks.push(Task::from_bytes(&value)?);
        }

        Ok(tasks)
    }

    /// Delete completed jobs older than the retention window.
    pub fn purge_old_completed(&self) -> Result<usize> {
        let cutoff = Utc::now() - Duration::days(self.config.completed_retention_days);
        let completed_cf = self.cf(CF_COMPLETED)?;

        let mut batch = WriteBatch::default();
        let mut count = 0;

        for item in self.db.iterator_cf(completed_cf, rocksdb::IteratorMode::Start) {
            let (key, value) = item?;
            let task = Task::from_bytes(&value)?;

            if matches!(task.completed_at, Some(done) if done < cutoff) {
                batch.delete_cf(completed_cf, &key);
                count += 1;
            }
        }

        if count > 0 {
            self.db.write(batch)?;
            info!("Purged {count} completed jobs past retention");
        }

        Ok(count)
    }

    /// Startup recovery: any job still marked running belonged to a worker
    /// that did not outlive the previous broker process, so release it.
    pub fn recover(&self) -> Result<usize> {
        let running = self.running_jobs()?;
        let count = running.len();

        for task in running {
            warn!("Recovering running job {} (worker lost)", task.job_id);
            self.release_job(&task.job_id)?;
        }

        if count > 0 {
            info!("Recovery released {count} jobs back to the queue");
        }
        Ok(count)
    }

    /// Count jobs with the given status.
    pub fn count_by_status(&self, status: JobStatus) -> Result<usize> {
        Ok(self.jobs_with_status(status)?.len())
    }

    /// Flush the write-ahead log to disk.
    pub fn sync_wal(&self) -> Result<()> {
        self.wal.sync()
    }
}
