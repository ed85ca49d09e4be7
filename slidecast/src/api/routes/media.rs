//! Artifact download route.

use axum::{
    Router,
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::Response,
    routing::get,
};
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::storage::pathsafe;

/// Create the videos router.
pub fn router() -> Router<AppState> {
    Router::new().route("/{video_id}", get(download_video))
}

/// Stream a rendered artifact. The video id is the job id that produced it.
async fn download_video(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> ApiResult<Response> {
    if !pathsafe::is_valid_identifier(&video_id) {
        return Err(ApiError::validation(format!(
            "'{}' is not a valid video id",
            video_id
        )));
    }
    let video_id = Uuid::try_parse(&video_id)
        .map_err(|_| ApiError::validation(format!("'{}' is not a valid video id", video_id)))?;

    let path = state
        .assets
        .find_artifact(&video_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("video with id '{}' not found", video_id)))?;

    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to open artifact: {}", e)))?;
    let size = file
        .metadata()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to stat artifact: {}", e)))?
        .len();

    let body = Body::from_stream(ReaderStream::new(file));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "video/mp4")
        .header(header::CONTENT_LENGTH, size)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}.mp4\"", video_id),
        )
        .body(body)
        .map_err(|e| ApiError::internal(format!("Failed to build response: {}", e)))
}
