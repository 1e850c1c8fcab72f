pub mod cache;
pub mod coordinator;
pub mod runtime;

pub use cache::ModelCache;
pub use coordinator::InferenceCoordinator;
pub use runtime::{ComputePreference, InferenceRuntime, ModelHandle, ModelKey, ModelVariant};
