use chrono::{DateTime, Utc};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Physical orientation of the device when the frame was delivered.
///
/// Live-feed frames carry no embedded orientation metadata, so the pipeline
/// must be told how to rotate them before inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceOrientation {
    Portrait,
    PortraitUpsideDown,
    LandscapeLeft,
    LandscapeRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraFacing {
    Back,
    Front,
}

/// One camera frame handed to the pipeline.
///
/// The pixel buffer is shared, never copied per clone, and is released as
/// soon as the frame is either classified or dropped. Frames are never
/// queued beyond the single in-flight classification.
#[derive(Clone)]
pub struct FrameSample {
    frame_id: Uuid,
    image: Arc<DynamicImage>,
    captured_at: DateTime<Utc>,
    orientation: DeviceOrientation,
    facing: CameraFacing,
}

impl FrameSample {
    pub fn new(
        image: DynamicImage,
        captured_at: DateTime<Utc>,
        orientation: DeviceOrientation,
        facing: CameraFacing,
    ) -> Self {
        Self {
            frame_id: Uuid::new_v4(),
            image: Arc::new(image),
            captured_at,
            orientation,
            facing,
        }
    }

    pub fn frame_id(&self) -> Uuid {
        self.frame_id
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn orientation(&self) -> DeviceOrientation {
        self.orientation
    }

    pub fn facing(&self) -> CameraFacing {
        self.facing
    }

    /// Shared reference to the raw (uncorrected) pixel buffer.
    pub fn image(&self) -> Arc<DynamicImage> {
        Arc::clone(&self.image)
    }

    /// Produces an upright image for inference.
    ///
    /// Rotation is derived from the device orientation; front-camera frames
    /// are additionally mirrored so labels match what the user sees in the
    /// preview.
    pub fn oriented(&self) -> DynamicImage {
        let rotated = match self.orientation {
            DeviceOrientation::Portrait => self.image.rotate90(),
            DeviceOrientation::PortraitUpsideDown => self.image.rotate270(),
            DeviceOrientation::LandscapeLeft => (*self.image).clone(),
            DeviceOrientation::LandscapeRight => self.image.rotate180(),
        };
        match self.facing {
            CameraFacing::Back => rotated,
            CameraFacing::Front => rotated.fliph(),
        }
    }
}
