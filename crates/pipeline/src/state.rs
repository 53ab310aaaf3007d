//! Shared run state

use detection::Detection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// Lifecycle of the pipeline loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Running,
    /// Stop requested; the loop exits at its next check
    Stopping,
    /// An error ceiling was breached; the source has been released
    Faulted,
}

#[derive(Debug, Clone)]
struct RunState {
    phase: RunPhase,
    source_id: Option<String>,
    current_detections: Vec<Detection>,
    current_fps: f64,
    frames_processed: u64,
    last_error: Option<String>,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            phase: RunPhase::Idle,
            source_id: None,
            current_detections: Vec::new(),
            current_fps: 0.0,
            frames_processed: 0,
            last_error: None,
        }
    }
}

/// Point-in-time copy of the run state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStateView {
    pub is_running: bool,
    pub phase: RunPhase,
    pub source_id: Option<String>,
    /// Detections of the latest processed frame
    pub current_detections: Vec<Detection>,
    pub current_fps: f64,
    pub frames_processed: u64,
    pub last_error: Option<String>,
}

impl RunStateView {
    /// Object count of the latest frame
    pub fn current_objects(&self) -> usize {
        self.current_detections.len()
    }

    /// Distinct classes in the latest frame
    pub fn current_classes(&self) -> usize {
        self.current_detections
            .iter()
            .map(|d| d.class_name.as_str())
            .collect::<BTreeSet<_>>()
            .len()
    }
}

/// Run state behind a single lock
///
/// The pipeline loop and controller are the only writers. Everyone else reads
/// through `snapshot`.
#[derive(Debug, Clone, Default)]
pub struct SharedRunState {
    inner: Arc<Mutex<RunState>>,
}

impl SharedRunState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter `Running` for `source_id` with zeroed per-run counters
    pub fn begin(&self, source_id: &str) {
        let mut state = self.lock();
        *state = RunState {
            phase: RunPhase::Running,
            source_id: Some(source_id.to_string()),
            ..RunState::default()
        };
        info!("Pipeline running on source {}", source_id);
    }

    /// Publish the results of one processed frame, replacing the previous frame's detections
    pub fn update_frame(&self, detections: &[Detection], fps: f64) {
        let mut state = self.lock();
        state.current_detections = detections.to_vec();
        state.current_fps = fps;
        state.frames_processed += 1;
    }

    /// Mark a running loop as asked to stop
    pub fn request_stop(&self) {
        let mut state = self.lock();
        if state.phase == RunPhase::Running {
            state.phase = RunPhase::Stopping;
            debug!("Pipeline stop requested");
        }
    }

    /// Record the end of a run
    ///
    /// `error` is set when the run faulted; a clean stop returns to `Idle`.
    pub fn finish(&self, error: Option<String>) {
        let mut state = self.lock();
        state.phase = if error.is_some() { RunPhase::Faulted } else { RunPhase::Idle };
        state.last_error = error;
        state.current_detections.clear();
        state.current_fps = 0.0;
    }

    /// Return a faulted run to `Idle`, keeping the error for inspection
    pub fn settle(&self) {
        let mut state = self.lock();
        if matches!(state.phase, RunPhase::Faulted | RunPhase::Stopping) {
            state.phase = RunPhase::Idle;
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock().phase == RunPhase::Running
    }

    pub fn phase(&self) -> RunPhase {
        self.lock().phase
    }

    pub fn snapshot(&self) -> RunStateView {
        let state = self.lock();
        RunStateView {
            is_running: state.phase == RunPhase::Running,
            phase: state.phase,
            source_id: state.source_id.clone(),
            current_detections: state.current_detections.clone(),
            current_fps: state.current_fps,
            frames_processed: state.frames_processed,
            last_error: state.last_error.clone(),
        }
    }

    /// Object count of the latest frame
    pub fn current_objects(&self) -> usize {
        self.lock().current_detections.len()
    }

    fn lock(&self) -> MutexGuard<'_, RunState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use detection::RawBox;

    fn detections(boxes: &[RawBox]) -> Vec<Detection> {
        boxes.iter().filter_map(|b| Detection::from_raw(b, 640, 480)).collect()
    }

    #[test]
    fn test_lifecycle() {
        let state = SharedRunState::new();
        assert_eq!(state.phase(), RunPhase::Idle);
        assert!(!state.snapshot().is_running);

        state.begin("0");
        let people = detections(&[
            RawBox::new(0.0, 0.0, 10.0, 10.0, 0, 0.9),
            RawBox::new(20.0, 0.0, 30.0, 10.0, 0, 0.8),
            RawBox::new(40.0, 0.0, 50.0, 10.0, 2, 0.7),
        ]);
        state.update_frame(&people, 24.0);
        let view = state.snapshot();
        assert!(view.is_running);
        assert_eq!(view.current_objects(), 3);
        assert_eq!(view.current_classes(), 2);
        assert_eq!(view.frames_processed, 1);

        state.request_stop();
        assert_eq!(state.phase(), RunPhase::Stopping);
        assert!(!state.is_running());

        state.finish(None);
        assert_eq!(state.phase(), RunPhase::Idle);
    }

    #[test]
    fn test_fault_then_settle() {
        let state = SharedRunState::new();
        state.begin("cam");
        state.finish(Some("read failed".to_string()));

        let view = state.snapshot();
        assert_eq!(view.phase, RunPhase::Faulted);
        assert!(!view.is_running);
        assert_eq!(view.last_error.as_deref(), Some("read failed"));

        state.settle();
        assert_eq!(state.phase(), RunPhase::Idle);
    }

    #[test]
    fn test_begin_resets_counters() {
        let state = SharedRunState::new();
        state.begin("a");
        state.update_frame(&[], 10.0);
        state.begin("b");

        let view = state.snapshot();
        assert_eq!(view.frames_processed, 0);
        assert_eq!(view.source_id.as_deref(), Some("b"));
    }

    #[test]
    fn test_update_replaces_previous_frame() {
        let state = SharedRunState::new();
        state.begin("cam");
        state.update_frame(&detections(&[RawBox::new(0.0, 0.0, 10.0, 10.0, 0, 0.9)]), 10.0);
        state.update_frame(&detections(&[RawBox::new(0.0, 0.0, 10.0, 10.0, 2, 0.9)]), 10.0);

        let view = state.snapshot();
        assert_eq!(view.current_objects(), 1);
        assert_eq!(view.current_detections[0].class_name, "car");
        assert_eq!(view.frames_processed, 2);

        state.finish(None);
        assert_eq!(state.current_objects(), 0);
    }

    #[test]
    fn test_clones_share_state() {
        let state = SharedRunState::new();
        let reader = state.clone();
        state.begin("x");
        assert!(reader.is_running());
    }
}
