use async_trait::async_trait;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// How detected face regions are obscured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObscuringStyle {
    Soft,
    Pixelated,
    Solid,
}

/// External face-obscuring capability.
///
/// Implementations return the input unchanged when no faces are found. The
/// capture coordinator always invokes this on the full-resolution still, not
/// the downscaled live-inference frame, so the obscuring operates on the
/// pixels that are actually persisted.
#[async_trait]
pub trait PrivacyFilter: Send + Sync {
    async fn apply(&self, image: DynamicImage, style: ObscuringStyle) -> DynamicImage;
}
