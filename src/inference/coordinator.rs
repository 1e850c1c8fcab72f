use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::common::{normalize_results, ClassificationResult, FrameSample};
use crate::inference::runtime::{InferenceRuntime, ModelHandle};

/// Wraps the external inference runtime and enforces the single-flight
/// invariant: at most one classification is outstanding at any instant.
///
/// Frames arriving while a call is in flight are dropped, not queued. This is
/// the pipeline's backpressure mechanism, trading completeness for bounded
/// latency and memory.
pub struct InferenceCoordinator<R: InferenceRuntime> {
    runtime: Arc<R>,
    in_flight: Arc<Semaphore>,
    dropped_frames: AtomicU64,
    noise_floor: f32,
    max_results: usize,
}

impl<R: InferenceRuntime> InferenceCoordinator<R> {
    /// `noise_floor` is the live-feed floor, stricter than photo-mode
    /// thresholds because live frames carry motion blur and compression
    /// artifacts.
    pub fn new(runtime: Arc<R>, noise_floor: f32, max_results: usize) -> Self {
        Self {
            runtime,
            in_flight: Arc::new(Semaphore::new(1)),
            dropped_frames: AtomicU64::new(0),
            noise_floor,
            max_results,
        }
    }

    /// Single-flight admission. Returns a permit that must be held for the
    /// duration of the classify call, or `None` when a call is already in
    /// flight, in which case the frame is counted as dropped.
    pub fn try_admit(&self, frame: &FrameSample) -> Option<OwnedSemaphorePermit> {
        match Arc::clone(&self.in_flight).try_acquire_owned() {
            Ok(permit) => Some(permit),
            Err(_) => {
                self.dropped_frames.fetch_add(1, Ordering::Relaxed);
                debug!(frame_id = %frame.frame_id(), "inference busy, frame dropped");
                None
            }
        }
    }

    /// Frames dropped so far by single-flight admission.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// Classifies one frame with the given model handle.
    ///
    /// The frame is orientation-corrected before inference. Returns `None`
    /// when the call is cancelled (the caller must discard the frame without
    /// touching shared state); runtime errors yield an empty result list and
    /// are never retried for the same frame.
    pub async fn classify(
        &self,
        frame: &FrameSample,
        handle: &ModelHandle,
        token: &CancellationToken,
    ) -> Option<Vec<ClassificationResult>> {
        if token.is_cancelled() {
            debug!(frame_id = %frame.frame_id(), "classify skipped, token already cancelled");
            return None;
        }

        let upright = frame.oriented();

        let raw = tokio::select! {
            _ = token.cancelled() => {
                debug!(frame_id = %frame.frame_id(), "classify cancelled mid-flight");
                return None;
            }
            raw = self.runtime.run(handle, &upright) => raw,
        };

        match raw {
            Ok(pairs) => Some(normalize_results(
                pairs,
                frame.captured_at(),
                self.noise_floor,
                self.max_results,
            )),
            Err(e) => {
                warn!(frame_id = %frame.frame_id(), "inference failed, frame skipped: {}", e);
                Some(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{CameraFacing, DeviceOrientation};
    use crate::error::PipelineError;
    use crate::inference::runtime::{ComputePreference, ModelKey, ModelVariant};
    use async_trait::async_trait;
    use chrono::Utc;
    use image::{DynamicImage, ImageBuffer, Rgb};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn frame() -> FrameSample {
        let img: DynamicImage = DynamicImage::ImageRgb8(
            ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(8, 8, Rgb([0, 0, 0])),
        );
        FrameSample::new(
            img,
            Utc::now(),
            DeviceOrientation::Portrait,
            CameraFacing::Back,
        )
    }

    fn handle() -> ModelHandle {
        ModelHandle::new(ModelKey::new(
            ModelVariant::Balanced,
            ComputePreference::NeuralEngine,
        ))
    }

    /// Runtime that records how many `run` calls overlap.
    struct OverlapProbe {
        current: AtomicUsize,
        high_water: AtomicUsize,
    }

    impl OverlapProbe {
        fn new() -> Self {
            Self {
                current: AtomicUsize::new(0),
                high_water: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl InferenceRuntime for OverlapProbe {
        async fn load_model(&self, key: ModelKey) -> Result<ModelHandle, PipelineError> {
            Ok(ModelHandle::new(key))
        }

        async fn run(
            &self,
            _handle: &ModelHandle,
            _image: &DynamicImage,
        ) -> Result<Vec<(String, f32)>, PipelineError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.high_water.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(vec![("cat".to_string(), 0.8)])
        }
    }

    struct FixedRuntime(Vec<(String, f32)>);

    #[async_trait]
    impl InferenceRuntime for FixedRuntime {
        async fn load_model(&self, key: ModelKey) -> Result<ModelHandle, PipelineError> {
            Ok(ModelHandle::new(key))
        }

        async fn run(
            &self,
            _handle: &ModelHandle,
            _image: &DynamicImage,
        ) -> Result<Vec<(String, f32)>, PipelineError> {
            Ok(self.0.clone())
        }
    }

    struct FailingRuntime;

    #[async_trait]
    impl InferenceRuntime for FailingRuntime {
        async fn load_model(&self, key: ModelKey) -> Result<ModelHandle, PipelineError> {
            Ok(ModelHandle::new(key))
        }

        async fn run(
            &self,
            _handle: &ModelHandle,
            _image: &DynamicImage,
        ) -> Result<Vec<(String, f32)>, PipelineError> {
            Err(PipelineError::InferenceFailed("probe".to_string()))
        }
    }

    #[tokio::test]
    async fn at_most_one_classify_in_flight_under_concurrent_injection() {
        let runtime = Arc::new(OverlapProbe::new());
        let coordinator = Arc::new(InferenceCoordinator::new(Arc::clone(&runtime), 0.0, 5));
        let model = Arc::new(handle());

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let coordinator = Arc::clone(&coordinator);
            let model = Arc::clone(&model);
            tasks.push(tokio::spawn(async move {
                let f = frame();
                let Some(permit) = coordinator.try_admit(&f) else {
                    return false;
                };
                let token = CancellationToken::new();
                let result = coordinator.classify(&f, &model, &token).await;
                drop(permit);
                result.is_some()
            }));
        }

        let admitted = futures::future::join_all(tasks)
            .await
            .into_iter()
            .filter(|r| *r.as_ref().unwrap())
            .count() as u64;

        assert_eq!(runtime.high_water.load(Ordering::SeqCst), 1);
        assert!(admitted >= 1);
        assert_eq!(coordinator.dropped_frames(), 16 - admitted);
    }

    #[tokio::test]
    async fn results_are_ranked_and_noise_filtered() {
        let runtime = Arc::new(FixedRuntime(vec![
            ("dog".to_string(), 0.2),
            ("cat".to_string(), 0.9),
            ("bird".to_string(), 0.6),
        ]));
        let coordinator = InferenceCoordinator::new(runtime, 0.5, 5);
        let results = coordinator
            .classify(&frame(), &handle(), &CancellationToken::new())
            .await
            .unwrap();
        let labels: Vec<&str> = results.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["cat", "bird"]);
    }

    #[tokio::test]
    async fn runtime_failure_yields_empty_results() {
        let coordinator = InferenceCoordinator::new(Arc::new(FailingRuntime), 0.0, 5);
        let results = coordinator
            .classify(&frame(), &handle(), &CancellationToken::new())
            .await;
        assert_eq!(results, Some(Vec::new()));
    }

    #[tokio::test]
    async fn cancelled_token_discards_the_call() {
        let coordinator = InferenceCoordinator::new(Arc::new(OverlapProbe::new()), 0.0, 5);
        let token = CancellationToken::new();
        token.cancel();
        let results = coordinator.classify(&frame(), &handle(), &token).await;
        assert!(results.is_none());
    }
}
