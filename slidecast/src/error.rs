//! Application-wide error types.

use std::path::PathBuf;
use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid path: {path} escapes its base directory")]
    PathViolation { path: PathBuf },

    #[error("Encoder failed: {message}")]
    Encode { message: String, diagnostics: String },

    #[error("Encoder timed out after {secs}s")]
    EncodeTimeout { secs: u64 },

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn path_violation(path: impl Into<PathBuf>) -> Self {
        Self::PathViolation { path: path.into() }
    }
}
