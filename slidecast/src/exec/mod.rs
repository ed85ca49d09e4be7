//! Execution strategies: run a job inline on the caller's request, or hand it
//! to the background worker pool.

pub mod queue;
pub mod worker_pool;

pub use queue::{JobQueue, QueuedJob};
pub use worker_pool::{WorkerPool, WorkerPoolConfig};

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use crate::progress::ProgressPublisher;
use crate::render::job::{JobStage, ProgressRecord};
use crate::render::{JobLifecycleManager, RenderSpec};
use crate::{Error, Result};

/// How an accepted render spec gets executed. Both strategies mint the job id
/// themselves; a spec never carries one.
#[async_trait]
pub trait ExecutionStrategy: Send + Sync {
    /// Accept a validated spec and return its job id. Queued submission
    /// returns as soon as the job is enqueued; inline submission returns
    /// only after the job reaches a terminal state.
    async fn submit(&self, spec: RenderSpec) -> Result<Uuid>;

    /// True when submission defers execution to background workers.
    fn is_queued(&self) -> bool;
}

/// Runs each job to completion before returning from `submit`. Intended for
/// single-user deployments and tests; the caller's request blocks for the
/// whole render.
pub struct InlineExecutor {
    manager: Arc<JobLifecycleManager>,
}

impl InlineExecutor {
    pub fn new(manager: Arc<JobLifecycleManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl ExecutionStrategy for InlineExecutor {
    async fn submit(&self, spec: RenderSpec) -> Result<Uuid> {
        let job_id = Uuid::new_v4();
        info!(%job_id, session_id = %spec.session_id, "Executing job inline");
        self.manager.execute(job_id, &spec).await;
        Ok(job_id)
    }

    fn is_queued(&self) -> bool {
        false
    }
}

/// Enqueues jobs for the worker pool and returns immediately. An initial
/// progress record is published at submit time so pollers see the job
/// before a worker claims it.
pub struct QueuedExecutor {
    queue: Arc<JobQueue>,
    publisher: Arc<dyn ProgressPublisher>,
}

impl QueuedExecutor {
    pub fn new(queue: Arc<JobQueue>, publisher: Arc<dyn ProgressPublisher>) -> Self {
        Self { queue, publisher }
    }
}

#[async_trait]
impl ExecutionStrategy for QueuedExecutor {
    async fn submit(&self, spec: RenderSpec) -> Result<Uuid> {
        let job_id = Uuid::new_v4();
        if !self.queue.enqueue(job_id, spec) {
            // Freshly minted v4 ids cannot collide in practice.
            return Err(Error::Other(format!("Job id collision for {job_id}")));
        }
        self.publisher.publish(
            job_id,
            ProgressRecord::new(JobStage::Initializing, 0, "Job queued"),
        );
        info!(%job_id, "Job queued for background execution");
        Ok(job_id)
    }

    fn is_queued(&self) -> bool {
        true
    }
}
