use async_trait::async_trait;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// External photo-library write capability. Write-once from the core's
/// perspective: the outcome is logged and a failure is surfaced, never
/// retried automatically.
#[async_trait]
pub trait PhotoStore: Send + Sync {
    async fn save(
        &self,
        image: &DynamicImage,
        location: Option<GeoLocation>,
    ) -> Result<(), PipelineError>;
}
