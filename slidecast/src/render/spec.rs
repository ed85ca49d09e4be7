//! Render request specification and validation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Per-image display duration bounds in seconds.
pub const MIN_DURATION_PER_IMAGE: f64 = 0.5;
pub const MAX_DURATION_PER_IMAGE: f64 = 10.0;

/// Accepted output resolutions: six landscape targets and their portrait
/// transpositions.
pub const RESOLUTION_WHITELIST: [(u32, u32); 12] = [
    (640, 480),
    (854, 480),
    (1280, 720),
    (1920, 1080),
    (2560, 1440),
    (3840, 2160),
    (480, 640),
    (480, 854),
    (720, 1280),
    (1080, 1920),
    (1440, 2560),
    (2160, 3840),
];

/// Output resolution, serialized as `"WxH"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_whitelisted(&self) -> bool {
        RESOLUTION_WHITELIST.contains(&(self.width, self.height))
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (w, h) = s
            .split_once('x')
            .ok_or_else(|| Error::validation(format!("Invalid resolution '{}'", s)))?;
        let width = w
            .parse::<u32>()
            .map_err(|_| Error::validation(format!("Invalid resolution '{}'", s)))?;
        let height = h
            .parse::<u32>()
            .map_err(|_| Error::validation(format!("Invalid resolution '{}'", s)))?;
        Ok(Self { width, height })
    }
}

impl Serialize for Resolution {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Resolution {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Transition between images. Accepted and validated, but currently has no
/// effect on the rendered artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    None,
    #[default]
    Fade,
    Slide,
}

/// A caller-supplied render request, immutable once accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderSpec {
    pub session_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_id: Option<Uuid>,
    pub duration_per_image: f64,
    #[serde(default)]
    pub transition: Transition,
    pub resolution: Resolution,
}

impl RenderSpec {
    /// Validate field ranges. Identifier syntax is checked at the API edge
    /// before the ids are parsed into `Uuid`s.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_DURATION_PER_IMAGE..=MAX_DURATION_PER_IMAGE).contains(&self.duration_per_image)
            || !self.duration_per_image.is_finite()
        {
            return Err(Error::validation(format!(
                "Duration must be between {} and {} seconds",
                MIN_DURATION_PER_IMAGE, MAX_DURATION_PER_IMAGE
            )));
        }

        if !self.resolution.is_whitelisted() {
            return Err(Error::validation(format!(
                "Invalid resolution '{}'. Must be one of: {}",
                self.resolution,
                RESOLUTION_WHITELIST
                    .iter()
                    .map(|(w, h)| format!("{}x{}", w, h))
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }

        Ok(())
    }
}
