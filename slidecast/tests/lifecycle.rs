//! End-to-end lifecycle tests against a temp asset layout. ffmpeg is not
//! available here, so encode steps use a nonexistent binary and the tests
//! assert everything up to and including the terminal record.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use image::RgbImage;
use parking_lot::Mutex;
use tempfile::TempDir;
use uuid::Uuid;

use slidecast::config::{RetryConfig, StorageConfig};
use slidecast::progress::ProgressPublisher;
use slidecast::render::audio::AudioSynchronizer;
use slidecast::render::encoder::EncodeInvoker;
use slidecast::render::job::{FailureKind, JobOutcome, JobStage, ProgressRecord};
use slidecast::render::{JobLifecycleManager, RenderSpec, Resolution, Transition};
use slidecast::storage::AssetStore;

/// Publisher that keeps the full record history per job, not just the latest.
#[derive(Default)]
struct RecordingPublisher {
    records: Mutex<Vec<ProgressRecord>>,
}

impl ProgressPublisher for RecordingPublisher {
    fn publish(&self, _job_id: Uuid, record: ProgressRecord) {
        self.records.lock().push(record);
    }

    fn read(&self, _job_id: Uuid) -> Option<ProgressRecord> {
        self.records.lock().last().cloned()
    }
}

impl RecordingPublisher {
    fn stages(&self) -> Vec<JobStage> {
        self.records.lock().iter().map(|r| r.stage).collect()
    }

    fn last(&self) -> ProgressRecord {
        self.records.lock().last().cloned().unwrap()
    }

    fn assert_monotonic_progress(&self) {
        let records = self.records.lock();
        for pair in records.windows(2) {
            assert!(
                pair[1].progress >= pair[0].progress,
                "progress went backwards: {} -> {}",
                pair[0].progress,
                pair[1].progress
            );
        }
    }
}

struct Harness {
    _dir: TempDir,
    store: AssetStore,
    publisher: Arc<RecordingPublisher>,
    manager: JobLifecycleManager,
    uploads: std::path::PathBuf,
    audio_dir: std::path::PathBuf,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let config = StorageConfig {
        uploads_dir: dir.path().join("uploads"),
        audio_dir: dir.path().join("audio"),
        output_dir: dir.path().join("output"),
    };
    let store = AssetStore::new(&config);
    let publisher = Arc::new(RecordingPublisher::default());

    // A nonexistent ffmpeg makes the encode step fail fast with an IO error.
    let manager = JobLifecycleManager::new(
        store.clone(),
        AudioSynchronizer::new("/nonexistent/ffmpeg", "/nonexistent/ffprobe"),
        EncodeInvoker::new("/nonexistent/ffmpeg"),
        publisher.clone(),
        RetryConfig {
            max_attempts: 1,
            backoff: Duration::ZERO,
        },
    );

    Harness {
        store,
        publisher,
        manager,
        uploads: config.uploads_dir.clone(),
        audio_dir: config.audio_dir.clone(),
        _dir: dir,
    }
}

fn spec(session_id: Uuid) -> RenderSpec {
    RenderSpec {
        session_id,
        audio_id: None,
        duration_per_image: 2.0,
        transition: Transition::Fade,
        resolution: Resolution::new(640, 480),
    }
}

fn write_png(dir: &Path, name: &str) {
    RgbImage::new(8, 8).save(dir.join(name)).unwrap();
}

fn make_session(h: &Harness, images: usize, corrupt: usize) -> Uuid {
    let session_id = Uuid::new_v4();
    let session_dir = h.uploads.join(session_id.to_string());
    std::fs::create_dir_all(&session_dir).unwrap();
    for i in 0..images {
        write_png(&session_dir, &format!("img_{i}.png"));
    }
    for i in 0..corrupt {
        std::fs::write(session_dir.join(format!("bad_{i}.png")), b"not an image").unwrap();
    }
    session_id
}

#[tokio::test]
async fn missing_session_fails_without_retry() {
    let h = harness();
    h.store.ensure_layout().await.unwrap();
    let job_id = Uuid::new_v4();

    let outcome = h.manager.execute(job_id, &spec(Uuid::new_v4())).await;

    match outcome {
        JobOutcome::Failure { kind, .. } => assert_eq!(kind, FailureKind::NotFound),
        other => panic!("expected failure, got {other:?}"),
    }
    let last = h.publisher.last();
    assert_eq!(last.stage, JobStage::Error);
    assert!(last.result.is_some());
}

#[tokio::test]
async fn all_corrupt_images_is_a_validation_failure() {
    let h = harness();
    h.store.ensure_layout().await.unwrap();
    let session_id = make_session(&h, 0, 5);
    let job_id = Uuid::new_v4();

    let outcome = h.manager.execute(job_id, &spec(session_id)).await;

    match outcome {
        JobOutcome::Failure { kind, .. } => assert_eq!(kind, FailureKind::Validation),
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(h.publisher.last().stage, JobStage::Error);
}

#[tokio::test]
async fn stage_sequence_runs_forward_until_encode() {
    let h = harness();
    h.store.ensure_layout().await.unwrap();
    let session_id = make_session(&h, 3, 0);
    let job_id = Uuid::new_v4();

    let outcome = h.manager.execute(job_id, &spec(session_id)).await;

    // The encode step fails (no ffmpeg), so the terminal stage is error, but
    // every prior stage must have been visited in order.
    assert!(!outcome.is_success());
    let stages = h.publisher.stages();
    let first_of = |stage: JobStage| stages.iter().position(|s| *s == stage);

    let init = first_of(JobStage::Initializing).expect("initializing published");
    let processing = first_of(JobStage::Processing).expect("processing published");
    let concat = first_of(JobStage::Concatenating).expect("concatenating published");
    let encoding = first_of(JobStage::Encoding).expect("encoding published");
    assert!(init < processing && processing < concat && concat < encoding);
    assert_eq!(*stages.last().unwrap(), JobStage::Error);

    h.publisher.assert_monotonic_progress();
    // The terminal error carries the last-known progress, not a reset.
    assert_eq!(h.publisher.last().progress, 75);
}

#[tokio::test]
async fn one_corrupt_image_does_not_fail_the_batch() {
    let h = harness();
    h.store.ensure_layout().await.unwrap();
    let session_id = make_session(&h, 4, 1);
    let job_id = Uuid::new_v4();

    let outcome = h.manager.execute(job_id, &spec(session_id)).await;

    // Composition survived (the failure kind is the encoder's, not a
    // no-decodable-images validation error).
    match outcome {
        JobOutcome::Failure { kind, .. } => assert_eq!(kind, FailureKind::Fatal),
        other => panic!("expected encode failure, got {other:?}"),
    }
    let stages = h.publisher.stages();
    assert!(stages.contains(&JobStage::Encoding));
}

#[tokio::test]
async fn missing_audio_degrades_instead_of_failing() {
    let h = harness();
    h.store.ensure_layout().await.unwrap();
    let session_id = make_session(&h, 2, 0);
    let job_id = Uuid::new_v4();

    let mut spec = spec(session_id);
    spec.audio_id = Some(Uuid::new_v4());

    h.manager.execute(job_id, &spec).await;

    // The audio stage is entered, the missing asset is skipped, and the job
    // still reaches the encode step.
    let stages = h.publisher.stages();
    assert!(stages.contains(&JobStage::Audio));
    assert!(stages.contains(&JobStage::Encoding));
}

#[tokio::test]
async fn broken_trim_sidecar_also_degrades() {
    let h = harness();
    h.store.ensure_layout().await.unwrap();
    let session_id = make_session(&h, 2, 0);
    let audio_id = Uuid::new_v4();
    std::fs::write(h.audio_dir.join(format!("{audio_id}.mp3")), b"zz").unwrap();
    std::fs::write(
        h.audio_dir.join(format!("{audio_id}_trim.json")),
        b"{not json",
    )
    .unwrap();

    let mut spec = spec(session_id);
    spec.audio_id = Some(audio_id);

    h.manager.execute(Uuid::new_v4(), &spec).await;

    let stages = h.publisher.stages();
    assert!(stages.contains(&JobStage::Audio));
    assert!(stages.contains(&JobStage::Encoding));
}
