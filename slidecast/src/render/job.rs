//! Job lifecycle types: stages, progress records, terminal outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named phase of a job's execution. Transitions are strictly forward
/// except `Error`, which is reachable from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStage {
    Initializing,
    Processing,
    Concatenating,
    Audio,
    Encoding,
    Completed,
    Error,
}

impl JobStage {
    /// Terminal stages never publish again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStage::Completed | JobStage::Error)
    }
}

impl std::fmt::Display for JobStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStage::Initializing => "initializing",
            JobStage::Processing => "processing",
            JobStage::Concatenating => "concatenating",
            JobStage::Audio => "audio",
            JobStage::Encoding => "encoding",
            JobStage::Completed => "completed",
            JobStage::Error => "error",
        };
        f.write_str(s)
    }
}

/// Failure classification surfaced in a terminal error result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    NotFound,
    PathViolation,
    /// A transient failure that exhausted its retry budget.
    Transient,
    Fatal,
}

/// The single tagged result type returned from every terminal path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum JobOutcome {
    Success {
        video_id: Uuid,
        file_size: u64,
        download_url: String,
    },
    Failure {
        kind: FailureKind,
        message: String,
    },
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Success { .. })
    }
}

/// The progress tuple published per job id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub stage: JobStage,
    /// 0-100, non-decreasing within a single run of a job.
    pub progress: u8,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Present only on terminal records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JobOutcome>,
}

impl ProgressRecord {
    pub fn new(stage: JobStage, progress: u8, message: impl Into<String>) -> Self {
        Self {
            stage,
            progress,
            message: message.into(),
            timestamp: Utc::now(),
            result: None,
        }
    }

    pub fn with_result(mut self, result: JobOutcome) -> Self {
        self.result = Some(result);
        self
    }
}
