use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use image::DynamicImage;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bestshot::{BestShotCandidate, BestShotSession, SessionState};
use crate::common::{ClassificationResult, FrameSample};
use crate::config::Configuration;
use crate::error::{PipelineError, SessionStateError};
use crate::inference::{
    ComputePreference, InferenceCoordinator, InferenceRuntime, ModelCache, ModelHandle, ModelKey,
    ModelVariant,
};
use crate::rules::{evaluate, RuleSet, RuleVerdict};

/// Commands accepted by the pipeline controller.
pub enum ControlCommand {
    SetRules(RuleSet),
    SetModel(ModelVariant, ComputePreference),
    StartBestShot {
        target_label: String,
        duration: Duration,
        confidence_floor: f32,
    },
    CancelBestShot,
    TakeBestShot(oneshot::Sender<Result<Vec<BestShotCandidate>, SessionStateError>>),
    Shutdown,
}

/// Externally observable pipeline state, pushed through a single update
/// channel after every state-affecting event. The UI renders snapshots; it
/// never reads controller state directly. Serializable so host apps can
/// forward snapshots across a UI bridge as JSON.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StateSnapshot {
    pub gate: bool,
    pub active_labels: Vec<String>,
    pub session_state: SessionState,
    pub session_candidates: usize,
    pub dropped_frames: u64,
}

/// Completed classification handed back onto the coordinating context.
struct Completion {
    generation: u64,
    results: Vec<ClassificationResult>,
    payload: Arc<DynamicImage>,
    observed_at: DateTime<Utc>,
}

/// Handle to the running pipeline. Frame delivery and commands enter here;
/// state leaves through the snapshot channel and the gate watch.
pub struct PipelineController {
    frame_tx: mpsc::Sender<FrameSample>,
    command_tx: mpsc::Sender<ControlCommand>,
    gate_rx: watch::Receiver<bool>,
    cancel_token: CancellationToken,
    task: JoinHandle<()>,
}

impl PipelineController {
    /// Non-blocking frame entry point, called from the camera delivery
    /// context at native cadence. Returns false when the frame was dropped
    /// because the pipeline is busy; dropping is the backpressure policy,
    /// frames are never queued.
    pub fn offer_frame(&self, frame: FrameSample) -> bool {
        self.frame_tx.try_send(frame).is_ok()
    }

    pub async fn send(&self, command: ControlCommand) -> Result<(), PipelineError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| PipelineError::ControllerClosed)
    }

    /// Latest-value view of the capture gate, for the capture coordinator.
    pub fn gate(&self) -> watch::Receiver<bool> {
        self.gate_rx.clone()
    }

    /// Starts a best-shot window using the configured duration and floor.
    pub async fn start_best_shot(
        &self,
        target_label: impl Into<String>,
        configuration: &Configuration,
    ) -> Result<(), PipelineError> {
        self.send(ControlCommand::StartBestShot {
            target_label: target_label.into(),
            duration: Duration::from_secs(configuration.best_shot_duration_secs),
            confidence_floor: configuration.best_shot_confidence_floor,
        })
        .await
    }

    /// Consumes the short list of a Completed best-shot session.
    pub async fn take_best_shot(&self) -> Result<Vec<BestShotCandidate>, PipelineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(ControlCommand::TakeBestShot(reply_tx)).await?;
        let result = reply_rx
            .await
            .map_err(|_| PipelineError::ControllerClosed)?;
        result.map_err(PipelineError::from)
    }

    /// Cancels the running controller task; any in-flight classification and
    /// Running best-shot session are cancelled with it.
    pub fn stop(&self) {
        self.cancel_token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for PipelineController {
    fn drop(&mut self) {
        self.stop();
    }
}

pub struct PipelineBuilder<R: InferenceRuntime + 'static> {
    configuration: Configuration,
    runtime: Arc<R>,
    rules: RuleSet,
}

impl<R: InferenceRuntime + 'static> PipelineBuilder<R> {
    pub fn new(configuration: Configuration, runtime: Arc<R>) -> Self {
        Self {
            configuration,
            runtime,
            rules: RuleSet::new(),
        }
    }

    /// Seeds the active interest rules; they can be replaced later with
    /// [`ControlCommand::SetRules`].
    pub fn rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    /// Spawns the coordinating task and returns the controller handle plus
    /// the snapshot channel.
    pub fn build(self) -> (PipelineController, mpsc::Receiver<StateSnapshot>) {
        let configuration = self.configuration;
        let (frame_tx, frame_rx) = mpsc::channel(configuration.frame_buffer_size.max(1));
        let (command_tx, command_rx) = mpsc::channel(configuration.command_buffer_size.max(1));
        let (snapshot_tx, snapshot_rx) = mpsc::channel(configuration.snapshot_buffer_size.max(1));
        let (completion_tx, completion_rx) = mpsc::channel(2);
        let (gate_tx, gate_rx) = watch::channel(false);
        let cancel_token = CancellationToken::new();

        let cache = Arc::new(ModelCache::new(Arc::clone(&self.runtime)));
        let coordinator = Arc::new(InferenceCoordinator::new(
            Arc::clone(&self.runtime),
            configuration.live_noise_floor,
            configuration.max_results,
        ));

        let task = ControllerTask {
            cache,
            coordinator,
            rules: self.rules,
            session: BestShotSession::with_capacity(configuration.best_shot_capacity),
            active_key: ModelKey::new(
                configuration.model_variant,
                configuration.compute_preference,
            ),
            model: None,
            generation: 0,
            flight_token: CancellationToken::new(),
            latest_results: Vec::new(),
            latest_verdict: RuleVerdict::default(),
            gate_tx,
            snapshot_tx,
            completion_tx,
        };
        let run_token = cancel_token.clone();
        let task = tokio::spawn(task.run(frame_rx, command_rx, completion_rx, run_token));

        (
            PipelineController {
                frame_tx,
                command_tx,
                gate_rx,
                cancel_token,
                task,
            },
            snapshot_rx,
        )
    }
}

/// The coordinating context. Owns every piece of externally observable
/// mutable state (rules, session, gate) and serializes all mutations; frame
/// delivery and inference run off this task and hand completions back in.
struct ControllerTask<R: InferenceRuntime + 'static> {
    cache: Arc<ModelCache<R>>,
    coordinator: Arc<InferenceCoordinator<R>>,
    rules: RuleSet,
    session: BestShotSession,
    active_key: ModelKey,
    model: Option<Arc<ModelHandle>>,
    generation: u64,
    flight_token: CancellationToken,
    latest_results: Vec<ClassificationResult>,
    latest_verdict: RuleVerdict,
    gate_tx: watch::Sender<bool>,
    snapshot_tx: mpsc::Sender<StateSnapshot>,
    completion_tx: mpsc::Sender<Completion>,
}

impl<R: InferenceRuntime + 'static> ControllerTask<R> {
    async fn run(
        mut self,
        mut frame_rx: mpsc::Receiver<FrameSample>,
        mut command_rx: mpsc::Receiver<ControlCommand>,
        mut completion_rx: mpsc::Receiver<Completion>,
        cancel_token: CancellationToken,
    ) {
        info!("pipeline controller started");
        let mut ticker = tokio::time::interval(Duration::from_millis(100));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    self.teardown();
                    break;
                }
                Some(frame) = frame_rx.recv() => self.handle_frame(frame).await,
                Some(done) = completion_rx.recv() => self.handle_completion(done),
                command = command_rx.recv() => {
                    match command {
                        Some(command) => {
                            if self.handle_command(command) {
                                self.teardown();
                                break;
                            }
                        }
                        // Every controller handle is gone.
                        None => {
                            self.teardown();
                            break;
                        }
                    }
                }
                _ = ticker.tick() => self.handle_tick(Utc::now()),
            }
        }
        info!("pipeline controller stopped");
    }

    fn teardown(&mut self) {
        self.flight_token.cancel();
        if self.session.state() == SessionState::Running {
            let _ = self.session.cancel();
        }
    }

    /// One frame from the camera context. Errors here never stop the loop;
    /// the live pipeline's value is continuity.
    async fn handle_frame(&mut self, frame: FrameSample) {
        let Some(model) = self.ensure_model().await else {
            // Transient: retried on the next frame's acquire.
            return;
        };
        let Some(permit) = self.coordinator.try_admit(&frame) else {
            return;
        };

        let coordinator = Arc::clone(&self.coordinator);
        let token = self.flight_token.clone();
        let generation = self.generation;
        let completion_tx = self.completion_tx.clone();
        tokio::spawn(async move {
            let payload = frame.image();
            let observed_at = frame.captured_at();
            let results = coordinator.classify(&frame, &model, &token).await;
            drop(permit);
            if let Some(results) = results {
                let _ = completion_tx
                    .send(Completion {
                        generation,
                        results,
                        payload,
                        observed_at,
                    })
                    .await;
            }
        });
    }

    async fn ensure_model(&mut self) -> Option<Arc<ModelHandle>> {
        if let Some(model) = &self.model {
            return Some(Arc::clone(model));
        }
        match self.cache.acquire(self.active_key).await {
            Ok(model) => {
                self.model = Some(Arc::clone(&model));
                Some(model)
            }
            Err(e) => {
                warn!("model acquire failed: {}", e);
                None
            }
        }
    }

    fn handle_completion(&mut self, done: Completion) {
        if done.generation != self.generation {
            debug!("discarding stale classification from superseded model");
            return;
        }

        self.latest_verdict = evaluate(&done.results, &self.rules);

        if self.session.state() == SessionState::Running {
            let target = self.session.target_label().to_string();
            if let Some(result) = done
                .results
                .iter()
                .find(|r| r.label.eq_ignore_ascii_case(&target))
            {
                self.session.offer(
                    &result.label,
                    BestShotCandidate {
                        confidence: result.confidence,
                        observed_at: done.observed_at,
                        payload: Arc::clone(&done.payload),
                    },
                );
            }
        }
        self.session.tick(Utc::now());
        self.latest_results = done.results;
        self.publish_snapshot();
    }

    /// Returns true when the controller should shut down.
    fn handle_command(&mut self, command: ControlCommand) -> bool {
        match command {
            ControlCommand::SetRules(rules) => {
                self.rules = rules;
                // Re-derive the gate from the latest classification so a rule
                // change takes effect without waiting for the next frame.
                self.latest_verdict = evaluate(&self.latest_results, &self.rules);
                self.publish_snapshot();
            }
            ControlCommand::SetModel(variant, preference) => {
                let key = ModelKey::new(variant, preference);
                if key != self.active_key {
                    info!(?key, "switching model");
                    // Cancel the in-flight call bound to the old handle and
                    // fence off any completion it already produced.
                    self.flight_token.cancel();
                    self.flight_token = CancellationToken::new();
                    self.generation += 1;
                    self.active_key = key;
                    self.model = None;
                }
            }
            ControlCommand::StartBestShot {
                target_label,
                duration,
                confidence_floor,
            } => {
                match self
                    .session
                    .start(target_label, duration, confidence_floor, Utc::now())
                {
                    Ok(()) => info!(target = %self.session.target_label(), "best-shot session started"),
                    Err(e) => warn!("best-shot start rejected: {}", e),
                }
                self.publish_snapshot();
            }
            ControlCommand::CancelBestShot => {
                if let Err(e) = self.session.cancel() {
                    debug!("best-shot cancel ignored: {}", e);
                }
                self.publish_snapshot();
            }
            ControlCommand::TakeBestShot(reply) => {
                let _ = reply.send(self.session.result());
                self.publish_snapshot();
            }
            ControlCommand::Shutdown => return true,
        }
        false
    }

    fn handle_tick(&mut self, now: DateTime<Utc>) {
        if self.session.state() == SessionState::Running
            && self.session.tick(now) == SessionState::Completed
        {
            self.publish_snapshot();
        }
    }

    fn publish_snapshot(&mut self) {
        self.gate_tx.send_replace(self.latest_verdict.gate);
        let snapshot = StateSnapshot {
            gate: self.latest_verdict.gate,
            active_labels: self.latest_verdict.active_labels.clone(),
            session_state: self.session.state(),
            session_candidates: self.session.candidate_count(),
            dropped_frames: self.coordinator.dropped_frames(),
        };
        if self.snapshot_tx.try_send(snapshot).is_err() {
            debug!("snapshot receiver lagging, update dropped");
        }
    }
}
