//! Final MP4 encoding: composed frames (plus an optional synchronized audio
//! track) go through a single ffmpeg invocation using the concat demuxer.

use std::path::Path;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, warn};

use super::command::run_with_timeout;
use super::compositor::Frame;
use super::spec::Resolution;
use crate::{Error, Result};

const ENCODE_TIMEOUT: Duration = Duration::from_secs(300);
const OUTPUT_FPS: u32 = 30;

/// Target video bitrate for a resolution, keyed on total pixel count.
pub fn bitrate_for(resolution: Resolution) -> &'static str {
    let pixels = resolution.pixel_count();
    if pixels >= 3840 * 2160 {
        "20000k"
    } else if pixels >= 2560 * 1440 {
        "12000k"
    } else if pixels >= 1920 * 1080 {
        "8000k"
    } else if pixels >= 1280 * 720 {
        "5000k"
    } else {
        "2500k"
    }
}

/// Encoder diagnostics that indicate memory exhaustion rather than a broken
/// input. These map to `Error::ResourceExhausted` so the lifecycle retry
/// budget applies instead of failing the job outright.
fn is_memory_exhaustion(diagnostics: &str) -> bool {
    let lower = diagnostics.to_ascii_lowercase();
    lower.contains("cannot allocate memory")
        || lower.contains("out of memory")
        || lower.contains("memory allocation")
}

fn encoder_threads() -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2);
    (cores / 2).clamp(1, 4)
}

/// Render the ffconcat listing for a frame sequence. The demuxer ignores the
/// duration of the final entry, so the last file is listed twice.
fn concat_listing(entries: &[(String, f64)]) -> String {
    let mut listing = String::new();
    for (file, duration) in entries {
        listing.push_str(&format!("file '{}'\nduration {:.3}\n", file, duration));
    }
    if let Some((last, _)) = entries.last() {
        listing.push_str(&format!("file '{}'\n", last));
    }
    listing
}

/// Drives ffmpeg to produce the final artifact.
#[derive(Debug, Clone)]
pub struct EncodeInvoker {
    ffmpeg_path: String,
}

impl EncodeInvoker {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    /// Encode `frames` (and optionally `audio`) into an MP4 at `out`.
    /// Returns the artifact size in bytes.
    pub async fn encode(
        &self,
        frames: &[Frame],
        audio: Option<&Path>,
        resolution: Resolution,
        out: &Path,
    ) -> Result<u64> {
        if frames.is_empty() {
            return Err(Error::validation("No frames to encode"));
        }

        let workdir = tempfile::tempdir()?;
        let mut entries = Vec::with_capacity(frames.len());
        for (idx, frame) in frames.iter().enumerate() {
            let name = format!("frame_{idx:04}.png");
            frame.image.save(workdir.path().join(&name))?;
            entries.push((name, frame.duration));
        }

        let list_path = workdir.path().join("frames.txt");
        tokio::fs::write(&list_path, concat_listing(&entries)).await?;

        let bitrate = bitrate_for(resolution);
        let threads = encoder_threads();
        debug!(
            frames = frames.len(),
            bitrate,
            threads,
            has_audio = audio.is_some(),
            "Starting encode"
        );

        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.args(["-y", "-hide_banner", "-f", "concat", "-safe", "0"])
            .arg("-i")
            .arg(&list_path);
        if let Some(audio) = audio {
            cmd.arg("-i").arg(audio);
        }
        cmd.args(["-c:v", "libx264", "-preset", "medium"])
            .args(["-b:v", bitrate])
            .args(["-pix_fmt", "yuv420p"])
            .args(["-movflags", "+faststart"])
            .args(["-r", &OUTPUT_FPS.to_string()])
            .args(["-threads", &threads.to_string()]);
        if audio.is_some() {
            cmd.args(["-c:a", "aac", "-shortest"]);
        }
        cmd.arg(out).env("LC_ALL", "C");

        let output = match run_with_timeout(&mut cmd, ENCODE_TIMEOUT).await {
            Ok(output) => output,
            Err(e) => {
                self.discard_partial(out).await;
                return Err(e);
            }
        };

        if !output.status.success() {
            self.discard_partial(out).await;
            if is_memory_exhaustion(&output.stderr_tail) {
                return Err(Error::ResourceExhausted(format!(
                    "ffmpeg ran out of memory (exit {})",
                    output.status.code().unwrap_or(-1)
                )));
            }
            return Err(Error::Encode {
                message: format!(
                    "ffmpeg exited with status {}",
                    output.status.code().unwrap_or(-1)
                ),
                diagnostics: output.stderr_tail,
            });
        }

        let size = tokio::fs::metadata(out).await?.len();
        info!(
            path = %out.display(),
            size,
            elapsed_secs = output.duration,
            "Encode finished"
        );
        Ok(size)
    }

    async fn discard_partial(&self, out: &Path) {
        if tokio::fs::try_exists(out).await.unwrap_or(false) {
            if let Err(e) = tokio::fs::remove_file(out).await {
                warn!(path = %out.display(), error = %e, "Failed to remove partial output");
            }
        }
    }
}
