//! Audio synchronization: optional trim window, then stretch (truncate or
//! loop) to match the video duration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info};

use super::command::run_with_timeout;
use crate::{Error, Result};

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);
const SYNC_TIMEOUT: Duration = Duration::from_secs(300);

/// Optional sub-range of an audio asset, persisted as a sidecar next to the
/// asset. Bounds are clamped into the asset's real duration at use time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrimWindow {
    #[serde(default)]
    pub start: Option<f64>,
    #[serde(default)]
    pub end: Option<f64>,
}

impl TrimWindow {
    /// Clamp the window into `[0, duration]` with `start <= end`. Returns
    /// `None` when the clamped window covers the whole asset, so callers can
    /// skip a no-op trim.
    pub fn clamp(&self, duration: f64) -> Option<(f64, f64)> {
        let start = self.start.unwrap_or(0.0).clamp(0.0, duration);
        let end = self.end.unwrap_or(duration).clamp(start, duration);

        if start > 0.0 || end < duration {
            Some((start, end))
        } else {
            None
        }
    }
}

/// How the (possibly trimmed) audio is stretched to the video duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StretchPlan {
    /// Durations already match.
    AsIs,
    /// Audio is longer: keep the first `Tv` seconds.
    Truncate,
    /// Audio is shorter: concatenate `repeats` copies, then truncate to `Tv`.
    Loop { repeats: u32 },
}

impl StretchPlan {
    pub fn for_durations(audio: f64, video: f64) -> Self {
        if audio > video {
            StretchPlan::Truncate
        } else if audio < video {
            StretchPlan::Loop {
                repeats: (video / audio).floor() as u32 + 1,
            }
        } else {
            StretchPlan::AsIs
        }
    }
}

/// Loads an audio asset, applies its trim window, and produces a track of
/// exactly the target duration.
#[derive(Debug, Clone)]
pub struct AudioSynchronizer {
    ffmpeg_path: String,
    ffprobe_path: String,
}

impl AudioSynchronizer {
    pub fn new(ffmpeg_path: impl Into<String>, ffprobe_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
        }
    }

    /// Probe an audio file's duration in seconds.
    pub async fn probe_duration(&self, path: &Path) -> Result<f64> {
        let mut cmd = Command::new(&self.ffprobe_path);
        cmd.args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "json",
        ])
        .arg(path)
        .env("LC_ALL", "C");

        let output = run_with_timeout(&mut cmd, PROBE_TIMEOUT).await?;
        if !output.status.success() {
            return Err(Error::Other(format!(
                "ffprobe failed on {}: {}",
                path.display(),
                output.stderr_tail
            )));
        }

        let parsed: serde_json::Value = serde_json::from_str(&output.stdout)?;
        parsed["format"]["duration"]
            .as_str()
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|d| *d > 0.0)
            .ok_or_else(|| Error::Other(format!("No duration reported for {}", path.display())))
    }

    /// Produce an audio track of exactly `target_duration` seconds from
    /// `src`, applying the trim window first, into `workdir`.
    pub async fn synchronize(
        &self,
        src: &Path,
        trim: Option<&TrimWindow>,
        target_duration: f64,
        workdir: &Path,
    ) -> Result<PathBuf> {
        let full_duration = self.probe_duration(src).await?;

        let (effective, trimmed_duration) = match trim.and_then(|t| t.clamp(full_duration)) {
            Some((start, end)) => {
                let trimmed = workdir.join("audio_trimmed.m4a");
                self.extract_window(src, start, end, &trimmed).await?;
                info!(start, end, "Applied audio trim window");
                (trimmed, end - start)
            }
            None => (src.to_path_buf(), full_duration),
        };

        if trimmed_duration <= 0.0 {
            return Err(Error::Other("Audio is empty after trimming".to_string()));
        }

        let plan = StretchPlan::for_durations(trimmed_duration, target_duration);
        debug!(?plan, trimmed_duration, target_duration, "Audio stretch plan");

        let out = workdir.join("audio_synced.m4a");
        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.args(["-y", "-hide_banner"]);
        if let StretchPlan::Loop { repeats } = plan {
            // -stream_loop counts extra repetitions beyond the first pass.
            cmd.args(["-stream_loop", &(repeats - 1).to_string()]);
        }
        cmd.arg("-i")
            .arg(&effective)
            .args(["-vn", "-t", &format!("{:.3}", target_duration), "-c:a", "aac"])
            .arg(&out)
            .env("LC_ALL", "C");

        let output = run_with_timeout(&mut cmd, SYNC_TIMEOUT).await?;
        if !output.status.success() {
            return Err(Error::Other(format!(
                "Audio synchronization failed (exit {}): {}",
                output.status.code().unwrap_or(-1),
                output.stderr_tail
            )));
        }

        Ok(out)
    }

    async fn extract_window(&self, src: &Path, start: f64, end: f64, out: &Path) -> Result<()> {
        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.args(["-y", "-hide_banner"])
            .args(["-ss", &format!("{:.3}", start), "-to", &format!("{:.3}", end)])
            .arg("-i")
            .arg(src)
            .args(["-vn", "-c:a", "aac"])
            .arg(out)
            .env("LC_ALL", "C");

        let output = run_with_timeout(&mut cmd, SYNC_TIMEOUT).await?;
        if !output.status.success() {
            return Err(Error::Other(format!(
                "Audio trim failed (exit {}): {}",
                output.status.code().unwrap_or(-1),
                output.stderr_tail
            )));
        }
        Ok(())
    }
}
