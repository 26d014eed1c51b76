use crate::{PersistenceError, Result};
use chrono::{DateTime, Utc};
use jobq_core::{JobId, Task};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

/// Write-ahead log entries, one per job state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WalEntry {
    /// Job accepted from a producer.
    Enqueued { task: Task, timestamp: DateTime<Utc> },

    /// Job claimed by a worker under a lease.
    Claimed {
        job_id: JobId,
        worker_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Job finished successfully.
    Completed {
        job_id: JobId,
        result: Value,
        timestamp: DateTime<Utc>,
    },

    /// Job attempt failed.
    Failed {
        job_id: JobId,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Job parked in the dead letter queue.
    DeadLettered { job_id: JobId, timestamp: DateTime<Utc> },

    /// Job returned to the queue (lease expired or worker lost).
    Released { job_id: JobId, timestamp: DateTime<Utc> },
}

/// Append-only log backing crash recovery for the job store.
pub struct WriteAheadLog {
    db: Arc<rocksdb::DB>,
    sequence: Arc<Mutex<u64>>,
}

impl WriteAheadLog {
    /// Create or open the log at the given path.
    pub fn open(path: PathBuf) -> Result<Self> {
        let mut opts = rocksdb::Options::default();
        opts.create_if_missing(true);

        let db = rocksdb::DB::open(&opts, path)?;

        // Resume numbering after the last persisted entry.
        let mut iter = db.raw_iterator();
        iter.seek_to_last();

        let sequence = if iter.valid() {
            match iter.key() {
                Some(key) => {
                    let key: [u8; 8] = key.try_into().map_err(|_| {
                        PersistenceError::Wal("invalid key length".to_string())
                    })?;
                    u64::from_be_bytes(key) + 1
                }
                None => 0,
            }
        } else {
            0
        };
        drop(iter);

        Ok(WriteAheadLog {
            db: Arc::new(db),
            sequence: Arc::new(Mutex::new(sequence)),
        })
    }

    /// Append an entry, returning its sequence number.
    pub fn append(&self, entry: WalEntry) -> Result<u64> {
        let mut seq = self.sequence.lock();
        let seq_num = *seq;

        let key = seq_num.to_be_bytes();
        let value = serde_json::to_vec(&entry)?;
        self.db.put(key, value)?;

        *seq += 1;
        Ok(seq_num)
    }

    /// Read the entry at a sequence number, if present.
    pub fn get(&self, seq_num: u64) -> Result<Option<WalEntry>> {
        match self.db.get(seq_num.to_be_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    /// Replay all entries starting at a sequence number.
    pub fn replay_from(&self, start_seq: u64) -> Result<Vec<(u64, WalEntry)>> {
        let mut entries = Vec::new();
        let mut iter = self.db.raw_iterator();
        iter.seek(start_seq.to_be_bytes());

        while iter.valid() {
            if let (Some(key), Some(value)) = (iter.key(), iter.value()) {
                let seq = u64::from_be_bytes(
                    key.try_into()
                        .map_err(|_| PersistenceError::Wal("invalid key length".to_string()))?,
                );
                let entry: WalEntry = serde_json::from_slice(value)?;
                entries.push((seq, entry));
            }
            iter.next();
        }

        Ok(entries)
    }

    /// All entries from the beginning of the log.
    pub fn all_entries(&self) -> Result<Vec<(u64, WalEntry)>> {
        self.replay_from(0)
    }

    /// Delete entries up to a sequence number, inclusive.
    pub fn truncate(&self, up_to_seq: u64) -> Result<()> {
        for seq in 0..=up_to_seq {
            self.db.delete(seq.to_be_bytes())?;
        }
        Ok(())
    }

    /// Keep only the most recent `keep_last_n` entries.
    pub fn compact(&self, keep_last_n: u64) -> Result<()> {
        let current = *self.sequence.lock();
        if current > keep_last_n {
            self.truncate(current - keep_last_n - 1)?;
        }
        Ok(())
    }

    /// Flush the log to disk.
    pub fn sync(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn enqueue_entry() -> WalEntry {
        let task = Task::new("transcribe", json!({"media_url": "x"})).unwrap();
        WalEntry::Enqueued {
            task,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_append_and_replay() {
        let temp_dir = TempDir::new().unwrap();
        let wal = WriteAheadLog::open(temp_dir.path().join("wal")).unwrap();

        assert_eq!(wal.append(enqueue_entry()).unwrap(), 0);
        assert_eq!(wal.append(enqueue_entry()).unwrap(), 1);

        assert_eq!(wal.all_entries().unwrap().len(), 2);

        let tail = wal.replay_from(1).unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].0, 1);
    }

    #[test]
    fn test_sequence_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("wal");

        {
            let wal = WriteAheadLog::open(path.clone()).unwrap();
            wal.append(enqueue_entry()).unwrap();
        }

        let wal = WriteAheadLog::open(path).unwrap();
        assert_eq!(wal.all_entries().unwrap().len(), 1);
        assert_eq!(wal.append(enqueue_entry()).unwrap(), 1);
    }

    #[test]
    fn test_corrupt_key_rejected_on_open() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("wal");

        {
            let mut opts = rocksdb::Options::default();
            opts.create_if_missing(true);
            let db = rocksdb::DB::open(&opts, &path).unwrap();
            db.put(b"junk", b"{}").unwrap();
        }

        assert!(matches!(
            WriteAheadLog::open(path),
            Err(PersistenceError::Wal(_))
        ));
    }

    #[test]
    fn test_compact_keeps_recent_entries() {
        let temp_dir = TempDir::new().unwrap();
        let wal = WriteAheadLog::open(temp_dir.path().join("wal")).unwrap();

        for _ in 0..10 {
            wal.append(enqueue_entry()).unwrap();
        }

        wal.compact(3).unwrap();

        let entries = wal.all_entries().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].0, 7);
    }
}
