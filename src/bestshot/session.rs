use chrono::{DateTime, TimeDelta, Utc};
use image::DynamicImage;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::SessionStateError;

/// Default number of candidates a session retains. More than one is kept on
/// purpose: a later sharpness/quality pass is meant to pick among the
/// short-listed frames, so top-1 retention would throw away its input.
pub const DEFAULT_CAPACITY: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum SessionState {
    Idle,
    Running,
    Completed,
    Cancelled,
}

/// One scored observation retained by a running session. The payload is the
/// full-resolution image reference for the frame, shared, and dropped as soon
/// as the candidate is evicted or the session reaches a terminal state.
#[derive(Clone)]
pub struct BestShotCandidate {
    pub confidence: f32,
    pub observed_at: DateTime<Utc>,
    pub payload: Arc<DynamicImage>,
}

/// Time-boxed accumulator that retains the top-K highest-confidence
/// observations of one target label.
///
/// State machine: Idle → Running → {Completed, Cancelled}; terminal states
/// only leave via a fresh `start`. The candidate collection never exceeds K
/// and stays sorted descending by confidence with earliest-timestamp-wins
/// tie-break. Mutated only from the coordinating context, so no locking.
pub struct BestShotSession {
    target_label: String,
    duration_budget: TimeDelta,
    confidence_floor: f32,
    started_at: DateTime<Utc>,
    state: SessionState,
    capacity: usize,
    candidates: Vec<BestShotCandidate>,
}

impl BestShotSession {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            target_label: String::new(),
            duration_budget: TimeDelta::zero(),
            confidence_floor: 0.0,
            started_at: DateTime::<Utc>::MIN_UTC,
            state: SessionState::Idle,
            capacity: capacity.max(1),
            candidates: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn target_label(&self) -> &str {
        &self.target_label
    }

    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }

    /// Starts a fresh window. Valid from Idle or a terminal state.
    pub fn start(
        &mut self,
        target_label: impl Into<String>,
        duration_budget: Duration,
        confidence_floor: f32,
        now: DateTime<Utc>,
    ) -> Result<(), SessionStateError> {
        if self.state == SessionState::Running {
            return Err(SessionStateError::AlreadyRunning);
        }
        self.target_label = target_label.into();
        self.duration_budget =
            TimeDelta::from_std(duration_budget).unwrap_or(TimeDelta::MAX);
        self.confidence_floor = confidence_floor;
        self.started_at = now;
        self.state = SessionState::Running;
        self.candidates = Vec::with_capacity(self.capacity);
        Ok(())
    }

    /// Offers one observation. Ignored unless the session is Running, the
    /// label matches the target (case-insensitive) and the confidence clears
    /// the floor. Offering a candidate at or below the current minimum of a
    /// full collection is a no-op.
    pub fn offer(&mut self, label: &str, candidate: BestShotCandidate) {
        if self.state != SessionState::Running {
            return;
        }
        if !label.eq_ignore_ascii_case(&self.target_label) {
            return;
        }
        if candidate.confidence < self.confidence_floor {
            return;
        }
        if self.candidates.len() == self.capacity {
            let min = self
                .candidates
                .last()
                .map(|c| c.confidence)
                .unwrap_or(0.0);
            if candidate.confidence <= min {
                return;
            }
        }

        // O(K) insert; K is small and fixed. Equal confidences keep the
        // earlier timestamp first.
        let pos = self
            .candidates
            .iter()
            .position(|c| {
                candidate.confidence > c.confidence
                    || (candidate.confidence == c.confidence
                        && candidate.observed_at < c.observed_at)
            })
            .unwrap_or(self.candidates.len());
        self.candidates.insert(pos, candidate);
        self.candidates.truncate(self.capacity);
    }

    /// Drives time-based completion. Returns the state after the check.
    pub fn tick(&mut self, now: DateTime<Utc>) -> SessionState {
        if self.state == SessionState::Running && now - self.started_at >= self.duration_budget {
            debug!(target = %self.target_label, "best-shot window elapsed");
            self.state = SessionState::Completed;
        }
        self.state
    }

    /// Time left in the window while Running.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        if self.state != SessionState::Running {
            return None;
        }
        (self.duration_budget - (now - self.started_at))
            .to_std()
            .ok()
    }

    /// Cancels a Running session and releases every candidate payload.
    pub fn cancel(&mut self) -> Result<(), SessionStateError> {
        if self.state != SessionState::Running {
            return Err(SessionStateError::NotRunning);
        }
        self.state = SessionState::Cancelled;
        self.candidates.clear();
        Ok(())
    }

    /// Consumes the short list once Completed, returning candidates sorted
    /// descending by confidence. The caller picks what to persist; payloads
    /// it does not keep drop with the returned vector. The session returns to
    /// Idle.
    pub fn result(&mut self) -> Result<Vec<BestShotCandidate>, SessionStateError> {
        if self.state != SessionState::Completed {
            return Err(SessionStateError::NotCompleted);
        }
        self.state = SessionState::Idle;
        Ok(std::mem::take(&mut self.candidates))
    }
}

impl Default for BestShotSession {
    fn default() -> Self {
        Self::new()
    }
}
