//! slidecast library crate.
//!
//! This module exposes the core functionality for integration testing.

pub mod api;
pub mod config;
pub mod error;
pub mod exec;
pub mod logging;
pub mod progress;
pub mod render;
pub mod storage;

pub use error::{Error, Result};
