//! HTTP API: render submission, job status (poll and stream), artifact
//! download, and health.

pub mod error;
pub mod routes;
pub mod server;

pub use error::{ApiError, ApiResult};
pub use server::{ApiServer, ApiServerConfig, AppState};
