//! Job status routes: one-shot polling and a server-sent event stream.

use std::time::{Duration, Instant};

use axum::{
    Json, Router,
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
};
use chrono::{DateTime, Utc};
use futures::Stream;
use futures::stream;
use serde::Serialize;
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::render::job::JobOutcome;

/// How often the event stream re-reads the progress store.
const STREAM_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// A stream watching a job that never finishes gives up after this long.
const STREAM_TIMEOUT: Duration = Duration::from_secs(600);

/// Create the jobs router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{job_id}", get(job_status))
        .route("/{job_id}/events", get(job_events))
}

#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub stage: crate::render::job::JobStage,
    pub progress: u8,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobOutcome>,
}

fn parse_job_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::try_parse(raw).map_err(|_| ApiError::validation(format!("'{}' is not a valid job id", raw)))
}

/// One-shot status poll.
async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusResponse>> {
    let job_id = parse_job_id(&job_id)?;
    let record = state
        .progress
        .read(job_id)
        .ok_or_else(|| ApiError::not_found(format!("job with id '{}' not found", job_id)))?;

    Ok(Json(JobStatusResponse {
        job_id,
        stage: record.stage,
        progress: record.progress,
        message: record.message,
        timestamp: record.timestamp,
        result: record.result,
    }))
}

enum StreamState {
    Connect,
    Watch {
        last_seen: Option<DateTime<Utc>>,
        started: Instant,
    },
    Done,
}

/// Server-sent event stream of progress changes. Emits a connection ack,
/// then one event per observed change, and ends after a terminal stage or
/// the watch timeout.
async fn job_events(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, axum::Error>>>> {
    let job_id = parse_job_id(&job_id)?;
    let progress = state.progress.clone();

    let stream = stream::unfold(StreamState::Connect, move |stream_state| {
        let progress = progress.clone();
        async move {
            match stream_state {
                StreamState::Connect => {
                    let event = Event::default()
                        .event("connected")
                        .data(format!("{{\"job_id\":\"{}\"}}", job_id));
                    Some((
                        Ok(event),
                        StreamState::Watch {
                            last_seen: None,
                            started: Instant::now(),
                        },
                    ))
                }
                StreamState::Watch { last_seen, started } => {
                    loop {
                        if started.elapsed() >= STREAM_TIMEOUT {
                            let event = Event::default()
                                .event("error")
                                .data("{\"message\":\"Stream timed out waiting for progress\"}");
                            return Some((Ok(event), StreamState::Done));
                        }

                        if let Some(record) = progress.read(job_id)
                            && last_seen != Some(record.timestamp)
                        {
                            let next = if record.stage.is_terminal() {
                                StreamState::Done
                            } else {
                                StreamState::Watch {
                                    last_seen: Some(record.timestamp),
                                    started,
                                }
                            };
                            return Some((Event::default().json_data(&record), next));
                        }

                        tokio::time::sleep(STREAM_POLL_INTERVAL).await;
                    }
                }
                StreamState::Done => None,
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
