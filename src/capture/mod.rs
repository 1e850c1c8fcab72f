pub mod coordinator;
pub mod persistence;
pub mod privacy;

pub use coordinator::{CaptureCoordinator, CaptureOutcome};
pub use persistence::{GeoLocation, PhotoStore};
pub use privacy::{ObscuringStyle, PrivacyFilter};
