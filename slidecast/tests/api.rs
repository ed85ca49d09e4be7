//! HTTP surface tests driven through the router with in-memory services.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use image::RgbImage;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

use slidecast::api::{AppState, routes};
use slidecast::config::StorageConfig;
use slidecast::exec::{JobQueue, QueuedExecutor};
use slidecast::progress::{InMemoryProgressStore, ProgressPublisher};
use slidecast::storage::AssetStore;

struct TestApp {
    _dir: TempDir,
    router: Router,
    progress: Arc<InMemoryProgressStore>,
    uploads: std::path::PathBuf,
    output: std::path::PathBuf,
}

/// Router wired to a queued executor whose queue nobody drains: submissions
/// are accepted and visible in the progress store, but never executed.
fn test_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let config = StorageConfig {
        uploads_dir: dir.path().join("uploads"),
        audio_dir: dir.path().join("audio"),
        output_dir: dir.path().join("output"),
    };
    for d in [&config.uploads_dir, &config.audio_dir, &config.output_dir] {
        std::fs::create_dir_all(d).unwrap();
    }

    let assets = Arc::new(AssetStore::new(&config));
    let progress = Arc::new(InMemoryProgressStore::new(Duration::from_secs(3600)));
    let publisher: Arc<dyn ProgressPublisher> = progress.clone();
    let queue = Arc::new(JobQueue::new());
    let executor = Arc::new(QueuedExecutor::new(queue, publisher.clone()));

    let state = AppState::new(executor, publisher, assets);
    TestApp {
        router: routes::create_router(state),
        progress,
        uploads: config.uploads_dir.clone(),
        output: config.output_dir.clone(),
        _dir: dir,
    }
}

fn make_session(app: &TestApp) -> Uuid {
    let session_id = Uuid::new_v4();
    let session_dir = app.uploads.join(session_id.to_string());
    std::fs::create_dir_all(&session_dir).unwrap();
    RgbImage::new(8, 8).save(session_dir.join("one.png")).unwrap();
    session_id
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn health_reports_mode() {
    let app = test_app();
    let response = app.router.oneshot(get("/api/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn submit_accepts_valid_request() {
    let app = test_app();
    let session_id = make_session(&app);

    let response = app
        .router
        .oneshot(post_json(
            "/api/render",
            serde_json::json!({
                "session_id": session_id.to_string(),
                "duration_per_image": 3.0,
                "transition": "fade",
                "resolution": "1280x720",
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    // The executor published an initial record, so the job is visible
    // somewhere in the progress store straight away.
    assert_eq!(app.progress.len(), 1);
}

#[tokio::test]
async fn submit_rejects_bad_duration() {
    let app = test_app();
    let session_id = make_session(&app);

    for duration in [0.4, 10.5, f64::NAN] {
        let response = app
            .router
            .clone()
            .oneshot(post_json(
                "/api/render",
                serde_json::json!({
                    "session_id": session_id.to_string(),
                    "duration_per_image": if duration.is_nan() { serde_json::json!(null) } else { serde_json::json!(duration) },
                    "resolution": "1280x720",
                }),
            ))
            .await
            .unwrap();
        assert_ne!(response.status(), StatusCode::ACCEPTED, "duration {duration}");
    }
    assert!(app.progress.is_empty());
}

#[tokio::test]
async fn submit_rejects_unlisted_resolution() {
    let app = test_app();
    let session_id = make_session(&app);

    let response = app
        .router
        .oneshot(post_json(
            "/api/render",
            serde_json::json!({
                "session_id": session_id.to_string(),
                "duration_per_image": 3.0,
                "resolution": "1000x1000",
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn submit_rejects_traversal_shaped_session_id() {
    let app = test_app();

    let response = app
        .router
        .oneshot(post_json(
            "/api/render",
            serde_json::json!({
                "session_id": "../../etc/passwd",
                "duration_per_image": 3.0,
                "resolution": "1280x720",
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn submit_rejects_unknown_session() {
    let app = test_app();

    let response = app
        .router
        .oneshot(post_json(
            "/api/render",
            serde_json::json!({
                "session_id": Uuid::new_v4().to_string(),
                "duration_per_image": 3.0,
                "resolution": "1280x720",
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_job_status_is_not_found() {
    let app = test_app();
    let response = app
        .router
        .oneshot(get(&format!("/api/jobs/{}", Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_job_id_is_a_validation_error() {
    let app = test_app();
    let response = app
        .router
        .oneshot(get("/api/jobs/not-a-uuid"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn unknown_video_is_not_found() {
    let app = test_app();
    let response = app
        .router
        .oneshot(get(&format!("/api/videos/{}", Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn existing_video_is_served_as_mp4() {
    let app = test_app();
    let video_id = Uuid::new_v4();
    std::fs::write(app.output.join(format!("{video_id}.mp4")), b"mp4bytes").unwrap();

    let response = app
        .router
        .oneshot(get(&format!("/api/videos/{video_id}")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "video/mp4"
    );
}
