use serde::Deserialize;
use std::path::Path;

use crate::capture::privacy::ObscuringStyle;
use crate::inference::runtime::{ComputePreference, ModelVariant};

/// Pipeline configuration. Thresholds are product inputs, not algorithmic
/// constants; the defaults here are only fallbacks for missing settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub model_variant: ModelVariant,
    pub compute_preference: ComputePreference,
    /// Floor applied to live-feed results before they leave the coordinator.
    /// Stricter than photo-mode thresholds, since live frames carry motion
    /// blur and compression artifacts.
    pub live_noise_floor: f32,
    /// Cap on ranked results per frame.
    pub max_results: usize,
    pub best_shot_capacity: usize,
    pub best_shot_duration_secs: u64,
    pub best_shot_confidence_floor: f32,
    pub assisted_capture: bool,
    pub privacy_filter_enabled: bool,
    pub privacy_filter_style: ObscuringStyle,
    /// Capacity of the frame hand-off channel; kept at 1 so frames arriving
    /// while the controller is busy are dropped, not queued.
    pub frame_buffer_size: usize,
    pub command_buffer_size: usize,
    pub snapshot_buffer_size: usize,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            model_variant: ModelVariant::Balanced,
            compute_preference: ComputePreference::NeuralEngine,
            live_noise_floor: 0.35,
            max_results: 5,
            best_shot_capacity: 3,
            best_shot_duration_secs: 10,
            best_shot_confidence_floor: 0.5,
            assisted_capture: false,
            privacy_filter_enabled: false,
            privacy_filter_style: ObscuringStyle::Pixelated,
            frame_buffer_size: 1,
            command_buffer_size: 16,
            snapshot_buffer_size: 32,
        }
    }
}

impl Configuration {
    /// Loads configuration from a TOML file, falling back to defaults for
    /// missing fields.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .build()?
            .try_deserialize()
    }
}
