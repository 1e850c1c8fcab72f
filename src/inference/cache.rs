use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::inference::runtime::{InferenceRuntime, ModelHandle, ModelKey};

/// Explicitly owned cache of loaded model handles, keyed by
/// (variant, compute preference).
///
/// Construction is expensive, so `acquire` builds a handle at most once per
/// key: concurrent acquires for different keys proceed in parallel, while
/// acquires for the same key serialize on that key's cell. A failed
/// construction leaves the cell empty, so the next acquire retries instead of
/// returning a poisoned entry. Switching variants never evicts handles for
/// other keys; the supported variant set is small and fixed, so the map stays
/// bounded.
pub struct ModelCache<R: InferenceRuntime> {
    runtime: Arc<R>,
    cells: Mutex<HashMap<ModelKey, Arc<OnceCell<Arc<ModelHandle>>>>>,
}

impl<R: InferenceRuntime> ModelCache<R> {
    pub fn new(runtime: Arc<R>) -> Self {
        Self {
            runtime,
            cells: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached handle for `key`, constructing it on first use.
    /// May suspend for the duration of a model load.
    pub async fn acquire(&self, key: ModelKey) -> Result<Arc<ModelHandle>, PipelineError> {
        let cell = {
            let mut cells = self.cells.lock().await;
            Arc::clone(cells.entry(key).or_default())
        };

        if let Some(handle) = cell.get() {
            debug!(?key, "model cache hit");
            return Ok(Arc::clone(handle));
        }

        let handle = cell
            .get_or_try_init(|| async {
                info!(?key, "loading model");
                self.runtime.load_model(key).await.map(Arc::new)
            })
            .await?;
        Ok(Arc::clone(handle))
    }

    /// Drops the cached handle for `key`, if any. The next acquire rebuilds it.
    pub async fn invalidate(&self, key: ModelKey) {
        self.cells.lock().await.remove(&key);
    }

    /// Number of fully constructed handles currently cached.
    pub async fn len(&self) -> usize {
        self.cells
            .lock()
            .await
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::runtime::{ComputePreference, ModelVariant};
    use async_trait::async_trait;
    use image::DynamicImage;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingRuntime {
        loads: AtomicUsize,
        fail_first: AtomicUsize,
    }

    impl CountingRuntime {
        fn new(failures_before_success: usize) -> Self {
            Self {
                loads: AtomicUsize::new(0),
                fail_first: AtomicUsize::new(failures_before_success),
            }
        }
    }

    #[async_trait]
    impl InferenceRuntime for CountingRuntime {
        async fn load_model(&self, key: ModelKey) -> Result<ModelHandle, PipelineError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self
                .fail_first
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(PipelineError::ModelUnavailable {
                    variant: key.variant,
                    preference: key.preference,
                    reason: "compute preference refused".to_string(),
                });
            }
            Ok(ModelHandle::new(key))
        }

        async fn run(
            &self,
            _handle: &ModelHandle,
            _image: &DynamicImage,
        ) -> Result<Vec<(String, f32)>, PipelineError> {
            Ok(Vec::new())
        }
    }

    fn key(variant: ModelVariant) -> ModelKey {
        ModelKey::new(variant, ComputePreference::NeuralEngine)
    }

    #[tokio::test]
    async fn acquire_reuses_existing_handle() {
        let cache = ModelCache::new(Arc::new(CountingRuntime::new(0)));
        let a = cache.acquire(key(ModelVariant::Balanced)).await.unwrap();
        let b = cache.acquire(key(ModelVariant::Balanced)).await.unwrap();
        assert_eq!(a.id(), b.id());
        assert_eq!(cache.runtime.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_keys_get_distinct_handles_without_eviction() {
        let cache = ModelCache::new(Arc::new(CountingRuntime::new(0)));
        let a = cache.acquire(key(ModelVariant::Compact)).await.unwrap();
        let b = cache.acquire(key(ModelVariant::Accurate)).await.unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(cache.len().await, 2);

        // Re-acquiring the first key still hits the cache.
        let a2 = cache.acquire(key(ModelVariant::Compact)).await.unwrap();
        assert_eq!(a.id(), a2.id());
    }

    #[tokio::test]
    async fn failed_construction_is_not_cached() {
        let cache = ModelCache::new(Arc::new(CountingRuntime::new(1)));
        let first = cache.acquire(key(ModelVariant::Balanced)).await;
        assert!(matches!(
            first,
            Err(PipelineError::ModelUnavailable { .. })
        ));
        assert_eq!(cache.len().await, 0);

        // Next acquire retries construction and succeeds.
        let second = cache.acquire(key(ModelVariant::Balanced)).await;
        assert!(second.is_ok());
        assert_eq!(cache.runtime.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_acquires_for_same_key_construct_once() {
        let cache = Arc::new(ModelCache::new(Arc::new(CountingRuntime::new(0))));
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.acquire(key(ModelVariant::Balanced)).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(cache.runtime.loads.load(Ordering::SeqCst), 1);
    }
}
