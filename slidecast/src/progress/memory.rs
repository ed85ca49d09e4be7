use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use super::ProgressPublisher;
use crate::render::job::ProgressRecord;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct StoredRecord {
    record: ProgressRecord,
    expires_at: Instant,
}

/// In-memory progress store with per-record TTL. Records expire after the
/// configured TTL regardless of stage, so finished jobs do not accumulate.
pub struct InMemoryProgressStore {
    records: DashMap<Uuid, StoredRecord>,
    ttl: Duration,
}

impl InMemoryProgressStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            records: DashMap::new(),
            ttl,
        }
    }

    /// Spawn a background task that periodically drops expired records.
    /// Runs until `cancel` fires.
    pub fn spawn_sweeper(store: Arc<Self>, cancel: CancellationToken) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let before = store.records.len();
                        let now = Instant::now();
                        store.records.retain(|_, stored| stored.expires_at > now);
                        let swept = before - store.records.len();
                        if swept > 0 {
                            debug!(swept, "Swept expired progress records");
                        }
                    }
                }
            }
        });
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl ProgressPublisher for InMemoryProgressStore {
    fn publish(&self, job_id: Uuid, record: ProgressRecord) {
        if let Some(existing) = self.records.get(&job_id) {
            if existing.record.stage.is_terminal() && existing.expires_at > Instant::now() {
                warn!(
                    %job_id,
                    stage = %record.stage,
                    "Discarding publish for job already in a terminal stage"
                );
                return;
            }
        }

        trace!(%job_id, stage = %record.stage, progress = record.progress, "Publishing progress");
        self.records.insert(
            job_id,
            StoredRecord {
                record,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    fn read(&self, job_id: Uuid) -> Option<ProgressRecord> {
        let stored = self.records.get(&job_id)?;
        if stored.expires_at <= Instant::now() {
            return None;
        }
        Some(stored.record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::job::JobStage;

    fn record(stage: JobStage, progress: u8) -> ProgressRecord {
        ProgressRecord::new(stage, progress, format!("{stage}"))
    }

    #[test]
    fn test_publish_and_read() {
        let store = InMemoryProgressStore::new(Duration::from_secs(3600));
        let job_id = Uuid::new_v4();

        assert!(store.read(job_id).is_none());

        store.publish(job_id, record(JobStage::Initializing, 0));
        store.publish(job_id, record(JobStage::Processing, 35));

        let latest = store.read(job_id).unwrap();
        assert_eq!(latest.stage, JobStage::Processing);
        assert_eq!(latest.progress, 35);
    }

    #[test]
    fn test_terminal_record_latches() {
        let store = InMemoryProgressStore::new(Duration::from_secs(3600));
        let job_id = Uuid::new_v4();

        store.publish(job_id, record(JobStage::Encoding, 75));
        store.publish(job_id, record(JobStage::Completed, 100));
        store.publish(job_id, record(JobStage::Processing, 10));

        let latest = store.read(job_id).unwrap();
        assert_eq!(latest.stage, JobStage::Completed);
        assert_eq!(latest.progress, 100);
    }

    #[test]
    fn test_expired_record_not_readable() {
        let store = InMemoryProgressStore::new(Duration::ZERO);
        let job_id = Uuid::new_v4();

        store.publish(job_id, record(JobStage::Initializing, 0));
        assert!(store.read(job_id).is_none());
    }

    #[test]
    fn test_jobs_are_independent() {
        let store = InMemoryProgressStore::new(Duration::from_secs(3600));
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        store.publish(a, record(JobStage::Encoding, 75));
        store.publish(b, record(JobStage::Initializing, 0));

        assert_eq!(store.read(a).unwrap().stage, JobStage::Encoding);
        assert_eq!(store.read(b).unwrap().stage, JobStage::Initializing);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_sweeper_drops_expired_records() {
        let store = Arc::new(InMemoryProgressStore::new(Duration::ZERO));
        let job_id = Uuid::new_v4();
        store.publish(job_id, record(JobStage::Initializing, 0));
        assert_eq!(store.len(), 1);

        let cancel = CancellationToken::new();
        InMemoryProgressStore::spawn_sweeper(store.clone(), cancel.clone());
        // First interval tick fires immediately.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.is_empty());
        cancel.cancel();
    }
}
