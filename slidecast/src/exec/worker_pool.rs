//! Worker pool draining the job queue in the background.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::queue::JobQueue;
use crate::progress::ProgressPublisher;
use crate::render::job::{FailureKind, JobOutcome, JobStage, ProgressRecord};
use crate::render::JobLifecycleManager;

/// Configuration for the render worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Maximum concurrent render jobs.
    pub max_workers: usize,
    /// Hard cap on a single job, including its retries.
    pub job_timeout_secs: u64,
    /// Poll interval in milliseconds, the fallback when notifications are
    /// missed.
    pub poll_interval_ms: u64,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            max_workers: 2,
            job_timeout_secs: 35 * 60,
            poll_interval_ms: 100,
        }
    }
}

/// A pool of render workers. Each worker waits on the queue notifier, claims
/// one job at a time, and drives it through the lifecycle manager under a
/// hard timeout.
pub struct WorkerPool {
    config: WorkerPoolConfig,
    semaphore: Arc<Semaphore>,
    cancellation_token: CancellationToken,
    tasks: parking_lot::Mutex<Option<JoinSet<()>>>,
}

impl WorkerPool {
    pub fn new(config: WorkerPoolConfig) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(config.max_workers)),
            config,
            cancellation_token: CancellationToken::new(),
            tasks: parking_lot::Mutex::new(Some(JoinSet::new())),
        }
    }

    /// Spawn the worker tasks.
    pub fn start(
        &self,
        queue: Arc<JobQueue>,
        manager: Arc<JobLifecycleManager>,
        publisher: Arc<dyn ProgressPublisher>,
    ) {
        let poll_interval = std::time::Duration::from_millis(self.config.poll_interval_ms);
        let job_timeout = std::time::Duration::from_secs(self.config.job_timeout_secs);

        info!(workers = self.config.max_workers, "Starting render worker pool");

        let mut tasks = self.tasks.lock();
        if let Some(ref mut join_set) = *tasks {
            for i in 0..self.config.max_workers {
                let semaphore = self.semaphore.clone();
                let cancellation_token = self.cancellation_token.clone();
                let queue = queue.clone();
                let manager = manager.clone();
                let publisher = publisher.clone();
                let notifier = queue.notifier();

                join_set.spawn(async move {
                    debug!(worker = i, "Render worker started");

                    loop {
                        if cancellation_token.is_cancelled() {
                            debug!(worker = i, "Render worker shutting down");
                            break;
                        }

                        tokio::select! {
                            _ = cancellation_token.cancelled() => break,
                            _ = notifier.notified() => {}
                            _ = tokio::time::sleep(poll_interval) => {}
                        }

                        let permit = match semaphore.clone().try_acquire_owned() {
                            Ok(p) => p,
                            Err(_) => continue,
                        };

                        let Some(job) = queue.dequeue() else {
                            drop(permit);
                            continue;
                        };

                        let queued_ms = (chrono::Utc::now() - job.enqueued_at)
                            .num_milliseconds()
                            .max(0);
                        debug!(
                            worker = i,
                            job_id = %job.job_id,
                            queued_ms,
                            "Worker claimed job"
                        );

                        let result = tokio::time::timeout(
                            job_timeout,
                            manager.execute(job.job_id, &job.spec),
                        )
                        .await;

                        match result {
                            Ok(outcome) => {
                                debug!(
                                    worker = i,
                                    job_id = %job.job_id,
                                    success = outcome.is_success(),
                                    "Job finished"
                                );
                            }
                            Err(_) => {
                                error!(
                                    worker = i,
                                    job_id = %job.job_id,
                                    timeout_secs = job_timeout.as_secs(),
                                    "Job exceeded hard timeout"
                                );
                                publish_timeout(&*publisher, job.job_id, job_timeout.as_secs());
                            }
                        }

                        drop(permit);
                    }
                });
            }
        }
    }

    /// Stop the pool and wait for workers to exit. In-flight jobs are
    /// abandoned at the next await point.
    pub async fn stop(&self) {
        info!("Stopping render worker pool");
        self.cancellation_token.cancel();

        let tasks = self.tasks.lock().take();
        if let Some(mut join_set) = tasks {
            while join_set.join_next().await.is_some() {}
        }
        info!("Render worker pool stopped");
    }
}

/// Publish the terminal record for a job killed by the hard timeout. The
/// lifecycle manager's future was dropped, so nothing else will.
fn publish_timeout(publisher: &dyn ProgressPublisher, job_id: Uuid, timeout_secs: u64) {
    let progress = publisher.read(job_id).map(|r| r.progress).unwrap_or(0);
    let message = format!("Job exceeded the {timeout_secs}s execution limit");
    publisher.publish(
        job_id,
        ProgressRecord::new(JobStage::Error, progress, message.clone()).with_result(
            JobOutcome::Failure {
                kind: FailureKind::Fatal,
                message,
            },
        ),
    );
}
