//! On-disk asset layout: session images, audio assets, rendered artifacts.

pub mod pathsafe;

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::render::audio::TrimWindow;
use crate::{Error, Result};

/// Image extensions accepted in a session directory.
const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "gif", "bmp", "webp"];

/// One image in a session, in upload order.
#[derive(Debug, Clone)]
pub struct ImageAsset {
    pub path: PathBuf,
    /// Zero-based position in upload order.
    pub ordinal: usize,
}

/// Resolves identifiers to safe on-disk locations for the three asset roots.
///
/// All directories are read-only from a job's perspective except
/// `output_dir`, which is written only by the worker owning the job id.
#[derive(Debug, Clone)]
pub struct AssetStore {
    uploads_dir: PathBuf,
    audio_dir: PathBuf,
    output_dir: PathBuf,
}

impl AssetStore {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            uploads_dir: config.uploads_dir.clone(),
            audio_dir: config.audio_dir.clone(),
            output_dir: config.output_dir.clone(),
        }
    }

    /// Create the asset directories if they do not exist.
    pub async fn ensure_layout(&self) -> Result<()> {
        for dir in [&self.uploads_dir, &self.audio_dir, &self.output_dir] {
            tokio::fs::create_dir_all(dir).await?;
        }
        Ok(())
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// List a session's images in upload order (file creation time, not
    /// filename sort). Fails with not-found if the session directory is
    /// missing.
    pub async fn list_session_images(&self, session_id: &Uuid) -> Result<Vec<ImageAsset>> {
        let session_dir =
            pathsafe::resolve(&self.uploads_dir, [session_id.to_string().as_str()])
                .map_err(|_| Error::not_found("session", session_id.to_string()))?;

        if !session_dir.is_dir() {
            return Err(Error::not_found("session", session_id.to_string()));
        }

        let mut entries: Vec<(PathBuf, SystemTime)> = Vec::new();
        let mut dir = tokio::fs::read_dir(&session_dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if !path.is_file() || !has_image_extension(&path) {
                continue;
            }
            let meta = entry.metadata().await?;
            let created = meta.created().or_else(|_| meta.modified())?;
            entries.push((path, created));
        }

        // Tie-break on the name so the order is stable for same-second uploads.
        entries.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

        debug!(
            session_id = %session_id,
            count = entries.len(),
            "Listed session images"
        );

        Ok(entries
            .into_iter()
            .enumerate()
            .map(|(ordinal, (path, _))| ImageAsset { path, ordinal })
            .collect())
    }

    /// Find an audio asset by id. The extension is unknown (upload or
    /// download decides it), so the directory is scanned for a matching stem.
    pub async fn find_audio(&self, audio_id: &Uuid) -> Result<Option<PathBuf>> {
        let id = audio_id.to_string();
        let mut dir = tokio::fs::read_dir(&self.audio_dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if path.file_stem().and_then(|s| s.to_str()) == Some(id.as_str()) {
                let real = pathsafe::resolve(
                    &self.audio_dir,
                    [path.file_name().and_then(|n| n.to_str()).unwrap_or("")],
                )?;
                return Ok(Some(real));
            }
        }
        Ok(None)
    }

    /// Load the optional trim window persisted next to an audio asset.
    pub async fn load_trim_window(&self, audio_id: &Uuid) -> Result<Option<TrimWindow>> {
        let sidecar =
            pathsafe::resolve(&self.audio_dir, [format!("{}_trim.json", audio_id).as_str()])?;
        if !sidecar.is_file() {
            return Ok(None);
        }
        let contents = tokio::fs::read_to_string(&sidecar).await?;
        let window: TrimWindow = serde_json::from_str(&contents)?;
        Ok(Some(window))
    }

    /// The artifact path for a job. The file name is always the job id, so
    /// the caller can derive it and no two jobs can collide.
    pub fn artifact_path(&self, job_id: &Uuid) -> Result<PathBuf> {
        pathsafe::resolve(&self.output_dir, [format!("{}.mp4", job_id).as_str()])
    }

    /// Look up an existing artifact by id, if any.
    pub async fn find_artifact(&self, video_id: &Uuid) -> Result<Option<PathBuf>> {
        let path = self.artifact_path(video_id)?;
        if path.is_file() { Ok(Some(path)) } else { Ok(None) }
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let lower = e.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&lower.as_str())
        })
        .unwrap_or(false)
}
