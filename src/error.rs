use thiserror::Error;

use crate::inference::runtime::{ComputePreference, ModelVariant};

// Main pipeline error type

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Model unavailable for {variant:?}/{preference:?}: {reason}")]
    ModelUnavailable {
        variant: ModelVariant,
        preference: ComputePreference,
        reason: String,
    },
    #[error("Inference failed: {0}")]
    InferenceFailed(String),
    #[error("Persistence failed: {0}")]
    PersistenceFailed(String),
    #[error("Session error: {0}")]
    Session(#[from] SessionStateError),
    #[error("Pipeline controller is no longer running")]
    ControllerClosed,
}

// Best-shot session state machine violations
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStateError {
    #[error("Session is already running")]
    AlreadyRunning,
    #[error("Session is not running")]
    NotRunning,
    #[error("Session has not completed")]
    NotCompleted,
}
