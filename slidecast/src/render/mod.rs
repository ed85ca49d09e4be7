//! The render pipeline: spec validation, frame composition, audio
//! synchronization, encoding, and the job state machine tying them together.

pub mod audio;
pub mod command;
pub mod compositor;
pub mod encoder;
pub mod job;
pub mod lifecycle;
pub mod spec;

pub use job::{FailureKind, JobOutcome, JobStage, ProgressRecord};
pub use lifecycle::JobLifecycleManager;
pub use spec::{RenderSpec, Resolution, Transition};
