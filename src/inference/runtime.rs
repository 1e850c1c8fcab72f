use async_trait::async_trait;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PipelineError;

/// Which classifier network to run. The supported set is small and fixed;
/// every switch point matches exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelVariant {
    Compact,
    Balanced,
    Accurate,
}

/// Hint about which hardware accelerator the runtime should prefer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComputePreference {
    Cpu,
    Gpu,
    NeuralEngine,
}

/// Cache key for one loaded model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelKey {
    pub variant: ModelVariant,
    pub preference: ComputePreference,
}

impl ModelKey {
    pub fn new(variant: ModelVariant, preference: ComputePreference) -> Self {
        Self {
            variant,
            preference,
        }
    }
}

/// Opaque handle to a loaded model.
///
/// Created by the runtime, owned exclusively by the [`ModelCache`]; the
/// coordinator borrows it per invocation and never outlives the cache entry.
///
/// [`ModelCache`]: crate::inference::cache::ModelCache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelHandle {
    key: ModelKey,
    id: Uuid,
}

impl ModelHandle {
    pub fn new(key: ModelKey) -> Self {
        Self {
            key,
            id: Uuid::new_v4(),
        }
    }

    pub fn key(&self) -> ModelKey {
        self.key
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

/// Seam to the external on-device inference runtime.
///
/// Both calls are potentially slow and potentially failing; the rest of the
/// pipeline treats them as black boxes.
#[async_trait]
pub trait InferenceRuntime: Send + Sync {
    /// Loads (or compiles) the model for `key`. Order of hundreds of
    /// milliseconds on first use per variant.
    async fn load_model(&self, key: ModelKey) -> Result<ModelHandle, PipelineError>;

    /// Runs one inference pass, returning unranked (label, confidence) pairs.
    async fn run(
        &self,
        handle: &ModelHandle,
        image: &DynamicImage,
    ) -> Result<Vec<(String, f32)>, PipelineError>;
}
