//! In-memory FIFO job queue with at-most-once claims.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::render::RenderSpec;

const DEPTH_WARNING_THRESHOLD: usize = 100;

/// A queued render job, immutable after enqueue.
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub job_id: Uuid,
    pub spec: RenderSpec,
    pub enqueued_at: DateTime<Utc>,
}

struct QueueState {
    pending: VecDeque<QueuedJob>,
    /// Every job id ever enqueued. Ids are never reused, so this doubles as
    /// the duplicate-submission guard.
    seen: HashSet<Uuid>,
}

/// FIFO queue feeding the worker pool. Each job is claimed by exactly one
/// worker; a claimed job is never requeued.
pub struct JobQueue {
    state: Mutex<QueueState>,
    notify: Arc<Notify>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                seen: HashSet::new(),
            }),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Enqueue a job. Returns false if this job id was already submitted.
    pub fn enqueue(&self, job_id: Uuid, spec: RenderSpec) -> bool {
        let depth = {
            let mut state = self.state.lock();
            if !state.seen.insert(job_id) {
                warn!(%job_id, "Duplicate job submission ignored");
                return false;
            }
            state.pending.push_back(QueuedJob {
                job_id,
                spec,
                enqueued_at: Utc::now(),
            });
            state.pending.len()
        };

        if depth >= DEPTH_WARNING_THRESHOLD {
            warn!(depth, "Queue depth is high");
        } else {
            debug!(%job_id, depth, "Job enqueued");
        }
        self.notify.notify_waiters();
        true
    }

    /// Claim the oldest pending job, if any.
    pub fn dequeue(&self) -> Option<QueuedJob> {
        self.state.lock().pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().pending.is_empty()
    }

    /// Notifier fired on every enqueue, for workers to wait on.
    pub fn notifier(&self) -> Arc<Notify> {
        self.notify.clone()
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}
