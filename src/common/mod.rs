pub mod classification;
pub mod frame;

pub use classification::{normalize_results, ClassificationResult};
pub use frame::{CameraFacing, DeviceOrientation, FrameSample};
