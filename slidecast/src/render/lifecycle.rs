//! The per-job state machine: drives a render spec through composition,
//! audio synchronization and encoding, publishing progress at every step.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::time::sleep;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::audio::AudioSynchronizer;
use super::compositor::{Compositor, Frame};
use super::encoder::EncodeInvoker;
use super::job::{FailureKind, JobOutcome, JobStage, ProgressRecord};
use super::spec::RenderSpec;
use crate::config::RetryConfig;
use crate::progress::ProgressPublisher;
use crate::storage::{AssetStore, ImageAsset};
use crate::{Error, Result};

/// True for failures worth retrying: resource pressure and encode timeouts.
/// Everything else (bad spec, missing assets, broken inputs) will fail the
/// same way again.
fn is_transient(error: &Error) -> bool {
    matches!(
        error,
        Error::EncodeTimeout { .. } | Error::ResourceExhausted(_)
    )
}

fn failure_kind(error: &Error) -> FailureKind {
    match error {
        Error::Validation(_) => FailureKind::Validation,
        Error::NotFound { .. } => FailureKind::NotFound,
        Error::PathViolation { .. } => FailureKind::PathViolation,
        Error::EncodeTimeout { .. } | Error::ResourceExhausted(_) => FailureKind::Transient,
        _ => FailureKind::Fatal,
    }
}

/// Orchestrates one job at a time from spec to terminal outcome. Shared
/// across workers; all per-job state lives on the stack of `execute`.
pub struct JobLifecycleManager {
    assets: AssetStore,
    synchronizer: AudioSynchronizer,
    encoder: EncodeInvoker,
    publisher: Arc<dyn ProgressPublisher>,
    retry: RetryConfig,
}

impl JobLifecycleManager {
    pub fn new(
        assets: AssetStore,
        synchronizer: AudioSynchronizer,
        encoder: EncodeInvoker,
        publisher: Arc<dyn ProgressPublisher>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            assets,
            synchronizer,
            encoder,
            publisher,
            retry,
        }
    }

    /// Run a job to its terminal outcome, retrying transient failures up to
    /// the configured budget. Every attempt restarts the state machine from
    /// `initializing`.
    pub async fn execute(&self, job_id: Uuid, spec: &RenderSpec) -> JobOutcome {
        let mut attempt = 1u32;
        loop {
            match self.run_once(job_id, spec).await {
                Ok(outcome) => return outcome,
                Err(e) if is_transient(&e) && attempt < self.retry.max_attempts => {
                    warn!(
                        %job_id,
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        error = %e,
                        "Transient failure, retrying after backoff"
                    );
                    sleep(self.retry.backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(%job_id, attempt, error = %e, "Job failed");
                    return self.publish_failure(job_id, &e);
                }
            }
        }
    }

    /// One pass of the full state machine. Any error aborts the pass; the
    /// caller decides whether to retry.
    async fn run_once(&self, job_id: Uuid, spec: &RenderSpec) -> Result<JobOutcome> {
        self.publish(job_id, JobStage::Initializing, 0, "Preparing job");

        let images = self.assets.list_session_images(&spec.session_id).await?;
        if images.is_empty() {
            return Err(Error::validation("Session contains no images"));
        }
        self.publish(
            job_id,
            JobStage::Processing,
            10,
            format!("Found {} images", images.len()),
        );

        let frames = self.compose_frames(job_id, spec, &images).await?;
        self.publish(job_id, JobStage::Concatenating, 60, "Assembling frame sequence");

        let video_duration = frames.len() as f64 * spec.duration_per_image;
        let workdir = tempfile::tempdir()?;
        let audio = match spec.audio_id {
            Some(audio_id) => {
                self.publish(job_id, JobStage::Audio, 65, "Synchronizing audio");
                self.prepare_audio(job_id, &audio_id, video_duration, workdir.path())
                    .await
            }
            None => None,
        };

        self.publish(job_id, JobStage::Encoding, 75, "Encoding video");
        let artifact = self.assets.artifact_path(&job_id)?;
        let file_size = self
            .encoder
            .encode(&frames, audio.as_deref(), spec.resolution, &artifact)
            .await?;

        let outcome = JobOutcome::Success {
            video_id: job_id,
            file_size,
            download_url: format!("/api/videos/{}", job_id),
        };
        self.publisher.publish(
            job_id,
            ProgressRecord::new(JobStage::Completed, 100, "Video ready")
                .with_result(outcome.clone()),
        );
        info!(%job_id, file_size, "Job completed");
        Ok(outcome)
    }

    /// Compose one frame per image, skipping images that fail to decode.
    /// Fails only when no image survives.
    async fn compose_frames(
        &self,
        job_id: Uuid,
        spec: &RenderSpec,
        images: &[ImageAsset],
    ) -> Result<Vec<Frame>> {
        let compositor = Compositor::new(spec.resolution);
        let total = images.len();
        let mut frames = Vec::with_capacity(total);

        for image in images {
            let progress = 10 + (image.ordinal * 50 / total) as u8;
            self.publish(
                job_id,
                JobStage::Processing,
                progress,
                format!("Processing image {}/{}", image.ordinal + 1, total),
            );
            match compositor
                .compose_file(&image.path, spec.duration_per_image)
                .await
            {
                Ok(frame) => frames.push(frame),
                Err(e) => {
                    warn!(
                        %job_id,
                        path = %image.path.display(),
                        error = %e,
                        "Skipping undecodable image"
                    );
                }
            }
        }

        if frames.is_empty() {
            return Err(Error::validation("No image in the session could be decoded"));
        }
        Ok(frames)
    }

    /// Resolve and synchronize the audio track. Any failure here degrades
    /// the job to a silent video instead of failing it.
    async fn prepare_audio(
        &self,
        job_id: Uuid,
        audio_id: &Uuid,
        video_duration: f64,
        workdir: &std::path::Path,
    ) -> Option<PathBuf> {
        let result: Result<Option<PathBuf>> = async {
            let Some(src) = self.assets.find_audio(audio_id).await? else {
                warn!(%job_id, %audio_id, "Audio asset not found, rendering without audio");
                return Ok(None);
            };
            let trim = self.assets.load_trim_window(audio_id).await?;
            let synced = self
                .synchronizer
                .synchronize(&src, trim.as_ref(), video_duration, workdir)
                .await?;
            Ok(Some(synced))
        }
        .await;

        match result {
            Ok(audio) => audio,
            Err(e) => {
                warn!(%job_id, %audio_id, error = %e, "Audio synchronization failed, rendering without audio");
                None
            }
        }
    }

    /// Publish the terminal error record for a job. Progress keeps its
    /// last-known value so observers never see it move backwards.
    fn publish_failure(&self, job_id: Uuid, error: &Error) -> JobOutcome {
        let progress = self
            .publisher
            .read(job_id)
            .map(|r| r.progress)
            .unwrap_or(0);
        let outcome = JobOutcome::Failure {
            kind: failure_kind(error),
            message: error.to_string(),
        };
        self.publisher.publish(
            job_id,
            ProgressRecord::new(JobStage::Error, progress, error.to_string())
                .with_result(outcome.clone()),
        );
        outcome
    }

    fn publish(&self, job_id: Uuid, stage: JobStage, progress: u8, message: impl Into<String>) {
        self.publisher
            .publish(job_id, ProgressRecord::new(stage, progress, message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(is_transient(&Error::EncodeTimeout { secs: 300 }));
        assert!(is_transient(&Error::ResourceExhausted("oom".to_string())));
        assert!(!is_transient(&Error::validation("bad")));
        assert!(!is_transient(&Error::not_found("session", "x")));
    }

    #[test]
    fn test_failure_kind_mapping() {
        assert_eq!(
            failure_kind(&Error::validation("bad")),
            FailureKind::Validation
        );
        assert_eq!(
            failure_kind(&Error::not_found("session", "x")),
            FailureKind::NotFound
        );
        assert_eq!(
            failure_kind(&Error::path_violation("/etc/passwd")),
            FailureKind::PathViolation
        );
        assert_eq!(
            failure_kind(&Error::EncodeTimeout { secs: 1 }),
            FailureKind::Transient
        );
        assert_eq!(
            failure_kind(&Error::Other("boom".to_string())),
            FailureKind::Fatal
        );
    }
}
