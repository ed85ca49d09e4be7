//! Application configuration loaded from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How submitted jobs are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Run the job on the submitting path before returning.
    Inline,
    /// Hand the job to the background worker pool.
    #[default]
    Queued,
}

impl FromStr for ExecutionMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inline" | "sync" => Ok(Self::Inline),
            "queued" | "worker" => Ok(Self::Queued),
            other => Err(crate::Error::validation(format!(
                "Unknown execution mode '{}', expected 'inline' or 'queued'",
                other
            ))),
        }
    }
}

/// Storage layout: one data root with per-asset subdirectories.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Session image uploads, one subdirectory per session id.
    pub uploads_dir: PathBuf,
    /// Audio assets, one file per audio id plus optional trim sidecar.
    pub audio_dir: PathBuf,
    /// Rendered artifacts, named by job id.
    pub output_dir: PathBuf,
}

impl StorageConfig {
    fn from_data_dir(data_dir: &std::path::Path) -> Self {
        Self {
            uploads_dir: data_dir.join("uploads"),
            audio_dir: data_dir.join("audio"),
            output_dir: data_dir.join("output"),
        }
    }
}

/// External tool paths (ffmpeg/ffprobe).
#[derive(Debug, Clone)]
pub struct ToolConfig {
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
        }
    }
}

/// Retry policy for transient job failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Total attempts, including the first run.
    pub max_attempts: u32,
    /// Delay between attempts.
    pub backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(60),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub tools: ToolConfig,
    pub retry: RetryConfig,
    pub execution_mode: ExecutionMode,
    /// Background worker count for the queued strategy.
    pub workers: usize,
    /// Hard cap on a single job run, enforced by the worker pool.
    pub job_timeout: Duration,
    /// Retention for published progress records.
    pub progress_ttl: Duration,
    /// Directory for rolling log files.
    pub log_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::from_data_dir(std::path::Path::new("data")),
            tools: ToolConfig::default(),
            retry: RetryConfig::default(),
            execution_mode: ExecutionMode::default(),
            workers: 2,
            job_timeout: Duration::from_secs(35 * 60),
            progress_ttl: Duration::from_secs(3600),
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables, falling back to defaults.
    ///
    /// Supported env vars:
    /// - `SLIDECAST_DATA_DIR` - root for uploads/audio/output
    /// - `SLIDECAST_EXECUTION_MODE` - "inline" or "queued"
    /// - `SLIDECAST_WORKERS` - worker pool size
    /// - `SLIDECAST_JOB_TIMEOUT_SECS` - per-job hard timeout
    /// - `SLIDECAST_LOG_DIR` - log file directory
    /// - `FFMPEG_PATH` / `FFPROBE_PATH` - tool binary overrides
    pub fn from_env_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(data_dir) = std::env::var("SLIDECAST_DATA_DIR")
            && !data_dir.trim().is_empty()
        {
            config.storage = StorageConfig::from_data_dir(std::path::Path::new(&data_dir));
        }

        if let Ok(mode) = std::env::var("SLIDECAST_EXECUTION_MODE")
            && let Ok(parsed) = mode.parse::<ExecutionMode>()
        {
            config.execution_mode = parsed;
        }

        if let Ok(workers) = std::env::var("SLIDECAST_WORKERS")
            && let Ok(parsed) = workers.parse::<usize>()
            && parsed > 0
        {
            config.workers = parsed;
        }

        if let Ok(timeout) = std::env::var("SLIDECAST_JOB_TIMEOUT_SECS")
            && let Ok(parsed) = timeout.parse::<u64>()
            && parsed > 0
        {
            config.job_timeout = Duration::from_secs(parsed);
        }

        if let Ok(log_dir) = std::env::var("SLIDECAST_LOG_DIR")
            && !log_dir.trim().is_empty()
        {
            config.log_dir = PathBuf::from(log_dir);
        }

        if let Ok(path) = std::env::var("FFMPEG_PATH")
            && !path.trim().is_empty()
        {
            config.tools.ffmpeg_path = path;
        }

        if let Ok(path) = std::env::var("FFPROBE_PATH")
            && !path.trim().is_empty()
        {
            config.tools.ffprobe_path = path;
        }

        config
    }
}
