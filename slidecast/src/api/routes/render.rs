//! Render submission route.

use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::render::spec::{RenderSpec, Resolution, Transition};
use crate::storage::pathsafe;

/// Create the render router.
pub fn router() -> Router<AppState> {
    Router::new().route("/", post(submit_render))
}

/// A render submission. Identifiers arrive as strings and are syntax-checked
/// before they touch the filesystem layer.
#[derive(Debug, Deserialize)]
pub struct RenderRequest {
    pub session_id: String,
    #[serde(default)]
    pub audio_id: Option<String>,
    pub duration_per_image: f64,
    #[serde(default)]
    pub transition: Transition,
    pub resolution: String,
}

#[derive(Debug, Serialize)]
pub struct RenderResponse {
    pub job_id: Uuid,
    /// False when the job already ran to completion inline.
    pub queued: bool,
}

fn parse_identifier(value: &str, field: &str) -> Result<Uuid, ApiError> {
    if !pathsafe::is_valid_identifier(value) {
        return Err(ApiError::validation(format!(
            "'{}' is not a valid {}",
            value, field
        )));
    }
    Uuid::try_parse(value)
        .map_err(|_| ApiError::validation(format!("'{}' is not a valid {}", value, field)))
}

/// Validate a submission and hand it to the configured execution strategy.
async fn submit_render(
    State(state): State<AppState>,
    Json(request): Json<RenderRequest>,
) -> ApiResult<(StatusCode, Json<RenderResponse>)> {
    let session_id = parse_identifier(&request.session_id, "session id")?;
    let audio_id = request
        .audio_id
        .as_deref()
        .map(|id| parse_identifier(id, "audio id"))
        .transpose()?;
    let resolution: Resolution = request.resolution.parse()?;

    let spec = RenderSpec {
        session_id,
        audio_id,
        duration_per_image: request.duration_per_image,
        transition: request.transition,
        resolution,
    };
    spec.validate()?;

    // Reject empty or missing sessions before a job exists at all.
    let images = state.assets.list_session_images(&session_id).await?;
    if images.is_empty() {
        return Err(ApiError::validation("Session contains no images"));
    }

    let queued = state.executor.is_queued();
    let job_id = state.executor.submit(spec).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(RenderResponse { job_id, queued }),
    ))
}
