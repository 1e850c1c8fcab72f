pub mod bestshot;
pub mod capture;
pub mod common;
pub mod config;
pub mod controller;
pub mod error;
pub mod inference;
pub mod logging;
pub mod rules;

pub use bestshot::{BestShotCandidate, BestShotSession, SessionState};
pub use capture::{CaptureCoordinator, CaptureOutcome, ObscuringStyle, PhotoStore, PrivacyFilter};
pub use common::{CameraFacing, ClassificationResult, DeviceOrientation, FrameSample};
pub use config::Configuration;
pub use controller::{ControlCommand, PipelineBuilder, PipelineController, StateSnapshot};
pub use error::{PipelineError, SessionStateError};
pub use inference::{
    ComputePreference, InferenceCoordinator, InferenceRuntime, ModelCache, ModelHandle, ModelKey,
    ModelVariant,
};
pub use rules::{evaluate, InterestRule, RuleSet, RuleVerdict};
