use jobq_core::{JobId, Priority, Task};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

/// Heap entry ordering queued jobs by priority, then FIFO by creation time.
#[derive(Clone)]
struct QueuedJob {
    task: Task,
}

impl PartialEq for QueuedJob {
    fn eq(&self, other: &Self) -> bool {
        self.task.job_id == other.task.job_id
    }
}

impl Eq for QueuedJob {}

impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedJob {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.task.opts.priority.cmp(&other.task.opts.priority) {
            // Within a tier, earlier created_at wins (max-heap, so reversed).
            Ordering::Equal => other.task.created_at.cmp(&self.task.created_at),
            ordering => ordering,
        }
    }
}

/// In-memory priority queue over the queued jobs.
///
/// The heap may hold stale entries for jobs removed by id; `pop` skips any
/// entry no longer present in the index.
pub struct JobQueue {
    heap: RwLock<BinaryHeap<QueuedJob>>,
    index: RwLock<HashMap<JobId, Task>>,
}

impl JobQueue {
    pub fn new() -> Self {
        JobQueue {
            heap: RwLock::new(BinaryHeap::new()),
            index: RwLock::new(HashMap::new()),
        }
    }

    /// Add a job to the queue.
    pub fn push(&self, task: Task) {
        let job_id = task.job_id;
        self.heap.write().push(QueuedJob { task: task.clone() });
        self.index.write().insert(job_id, task);
    }

    /// Take the highest-priority ready job, if any.
    ///
    /// If the top job is scheduled in the future this returns `None` rather
    /// than handing out a lower-priority job ahead of it.
    pub fn pop(&self) -> Option<Task> {
        let mut heap = self.heap.write();
        let mut index = self.index.write();

        while let Some(entry) = heap.pop() {
            if !index.contains_key(&entry.task.job_id) {
                // Stale entry for a job removed by id.
                continue;
            }

            if entry.task.is_ready() {
                index.remove(&entry.task.job_id);
                return Some(entry.task);
            }

            heap.push(entry);
            return None;
        }

        None
    }

    /// Remove a job by id without dequeuing it.
    pub fn remove(&self, job_id: &JobId) -> Option<Task> {
        self.index.write().remove(job_id)
    }

    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queue depth broken down by priority tier: (high, normal, low).
    pub fn depth_by_priority(&self) -> (usize, usize, usize) {
        let index = self.index.read();
        let mut high = 0;
        let mut normal = 0;
        let mut low = 0;

        for task in index.values() {
            match task.opts.priority {
                Priority::High => high += 1,
                Priority::Normal => normal += 1,
                Priority::Low => low += 1,
            }
        }

        (high, normal, low)
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}
