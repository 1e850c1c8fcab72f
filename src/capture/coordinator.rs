use std::sync::Arc;

use image::DynamicImage;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::capture::persistence::{GeoLocation, PhotoStore};
use crate::capture::privacy::{ObscuringStyle, PrivacyFilter};
use crate::error::PipelineError;

/// Outcome of a shutter attempt. `GateClosed` is an expected, non-error
/// result of assisted mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    Saved,
    GateClosed,
}

/// Orchestrates shutter gating, privacy filtering and persistence handoff
/// without owning any of their internals.
///
/// The gate is read from a watch channel fed by the pipeline controller, so
/// the coordinator always sees the verdict derived from the latest
/// classification.
pub struct CaptureCoordinator {
    gate: watch::Receiver<bool>,
    privacy_filter: Arc<dyn PrivacyFilter>,
    store: Arc<dyn PhotoStore>,
    privacy_enabled: bool,
    style: ObscuringStyle,
}

impl CaptureCoordinator {
    pub fn new(
        gate: watch::Receiver<bool>,
        privacy_filter: Arc<dyn PrivacyFilter>,
        store: Arc<dyn PhotoStore>,
        privacy_enabled: bool,
        style: ObscuringStyle,
    ) -> Self {
        Self {
            gate,
            privacy_filter,
            store,
            privacy_enabled,
            style,
        }
    }

    /// Builds a coordinator with the persisted privacy preferences.
    pub fn from_config(
        gate: watch::Receiver<bool>,
        privacy_filter: Arc<dyn PrivacyFilter>,
        store: Arc<dyn PhotoStore>,
        configuration: &crate::config::Configuration,
    ) -> Self {
        Self::new(
            gate,
            privacy_filter,
            store,
            configuration.privacy_filter_enabled,
            configuration.privacy_filter_style,
        )
    }

    /// Applies a settings change without rebuilding the coordinator.
    pub fn set_privacy(&mut self, enabled: bool, style: ObscuringStyle) {
        self.privacy_enabled = enabled;
        self.style = style;
    }

    pub fn gate_open(&self) -> bool {
        *self.gate.borrow()
    }

    /// Attempts a capture of the full-resolution still.
    ///
    /// In assisted mode the shutter is refused while the gate is closed; in
    /// that case neither the privacy filter nor persistence is invoked. The
    /// privacy filter runs on the still that is saved, never on the
    /// downscaled live-inference frame.
    pub async fn attempt_capture(
        &self,
        still: DynamicImage,
        assisted_mode: bool,
        location: Option<GeoLocation>,
    ) -> Result<CaptureOutcome, PipelineError> {
        if assisted_mode && !self.gate_open() {
            debug!("assisted capture refused, gate closed");
            return Ok(CaptureOutcome::GateClosed);
        }

        let image = if self.privacy_enabled {
            self.privacy_filter.apply(still, self.style).await
        } else {
            still
        };

        match self.store.save(&image, location).await {
            Ok(()) => {
                info!("capture persisted");
                Ok(CaptureOutcome::Saved)
            }
            Err(e) => {
                warn!("capture persistence failed: {}", e);
                Err(e)
            }
        }
    }
}
