//! Progress publication: each job exposes a single latest-state record that
//! pollers and event streams read.

mod memory;

pub use memory::InMemoryProgressStore;

use uuid::Uuid;

use crate::render::job::ProgressRecord;

/// Sink for job progress records. Implementations keep only the latest
/// record per job and must latch terminal records: once a job reaches
/// `completed` or `error`, later publishes for it are discarded.
pub trait ProgressPublisher: Send + Sync {
    /// Store `record` as the latest state of `job_id`.
    fn publish(&self, job_id: Uuid, record: ProgressRecord);

    /// Read the latest record for `job_id`, if one exists and has not
    /// expired.
    fn read(&self, job_id: Uuid) -> Option<ProgressRecord>;
}
