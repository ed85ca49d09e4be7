//! Image compositing: decode, orient, scale, and letterbox one image into a
//! fixed-resolution frame.

use std::io::Cursor;
use std::path::Path;

use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageReader, RgbImage, imageops};
use tracing::debug;

use super::spec::Resolution;
use crate::Result;

/// One composed frame with its display duration in seconds.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub duration: f64,
}

/// Composes arbitrary images into uniform frames at a fixed resolution.
#[derive(Debug, Clone, Copy)]
pub struct Compositor {
    resolution: Resolution,
}

impl Compositor {
    pub fn new(resolution: Resolution) -> Self {
        Self { resolution }
    }

    /// Decode `bytes` into a letterboxed frame.
    ///
    /// The image is rotated per its embedded orientation metadata (absent or
    /// unreadable metadata is a no-op), converted to RGB, scaled uniformly to
    /// fit inside the target resolution without cropping, and centered on an
    /// opaque black canvas.
    pub fn compose(&self, bytes: &[u8], duration: f64) -> Result<Frame> {
        let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
        let mut decoder = reader.into_decoder()?;
        let orientation = decoder
            .orientation()
            .unwrap_or(Orientation::NoTransforms);

        let mut decoded = DynamicImage::from_decoder(decoder)?;
        decoded.apply_orientation(orientation);
        let rgb = decoded.to_rgb8();

        let (target_w, target_h) = (self.resolution.width, self.resolution.height);
        let (src_w, src_h) = (rgb.width(), rgb.height());

        // Uniform scale preserving aspect ratio; never crops, may upscale.
        let scale = f64::min(
            target_w as f64 / src_w as f64,
            target_h as f64 / src_h as f64,
        );
        let new_w = ((src_w as f64 * scale).round() as u32).max(1);
        let new_h = ((src_h as f64 * scale).round() as u32).max(1);

        let resized = imageops::resize(&rgb, new_w, new_h, imageops::FilterType::Lanczos3);

        // RgbImage::new zero-fills, which is the opaque black canvas.
        let mut canvas = RgbImage::new(target_w, target_h);
        let x = (target_w.saturating_sub(new_w)) / 2;
        let y = (target_h.saturating_sub(new_h)) / 2;
        imageops::replace(&mut canvas, &resized, x as i64, y as i64);

        debug!(
            src = format!("{}x{}", src_w, src_h),
            scaled = format!("{}x{}", new_w, new_h),
            target = %self.resolution,
            "Composed frame"
        );

        Ok(Frame {
            image: canvas,
            duration,
        })
    }

    /// Read and compose an image file.
    pub async fn compose_file(&self, path: &Path, duration: f64) -> Result<Frame> {
        let bytes = tokio::fs::read(path).await?;
        self.compose(&bytes, duration)
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }
}
