//! Scripted detection backend for tests and demos

use crate::backend::{DetectionBackend, InferenceRequest};
use crate::object::RawBox;
use crate::DetectionError;
use camera_capture::VideoFrame;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Records the tracking flag of every inference call
#[derive(Debug, Clone, Default)]
pub struct BackendProbe {
    calls: Arc<Mutex<Vec<bool>>>,
}

impl BackendProbe {
    /// Tracking flag of each call, in call order
    pub fn calls(&self) -> Vec<bool> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record(&self, tracking: bool) {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).push(tracking);
    }
}

/// Backend that replays queued per-frame results
///
/// Each successful call pops one queued result; once the queue is empty the
/// `repeat` result (empty by default) is returned forever.
pub struct ScriptedBackend {
    queue: VecDeque<Vec<RawBox>>,
    repeat: Vec<RawBox>,
    fail_tracking: bool,
    fail_plain: bool,
    probe: BackendProbe,
}

impl ScriptedBackend {
    /// Replay one result per frame, then no detections
    pub fn new(frames: impl IntoIterator<Item = Vec<RawBox>>) -> Self {
        Self {
            queue: frames.into_iter().collect(),
            repeat: Vec::new(),
            fail_tracking: false,
            fail_plain: false,
            probe: BackendProbe::default(),
        }
    }

    /// Return the same boxes for every frame
    pub fn repeating(boxes: Vec<RawBox>) -> Self {
        let mut backend = Self::new(Vec::new());
        backend.repeat = boxes;
        backend
    }

    /// Make every tracking request fail
    pub fn fail_tracking(mut self) -> Self {
        self.fail_tracking = true;
        self
    }

    /// Make every plain request fail
    pub fn fail_plain(mut self) -> Self {
        self.fail_plain = true;
        self
    }

    pub fn probe(&self) -> BackendProbe {
        self.probe.clone()
    }
}

impl DetectionBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn infer(&mut self, _frame: &VideoFrame, request: &InferenceRequest) -> Result<Vec<RawBox>, DetectionError> {
        self.probe.record(request.tracking);

        if request.tracking && self.fail_tracking {
            return Err(DetectionError::TrackingUnsupported(self.name()));
        }
        if !request.tracking && self.fail_plain {
            return Err(DetectionError::Inference("scripted failure".to_string()));
        }

        let boxes = self.queue.pop_front().unwrap_or_else(|| self.repeat.clone());
        Ok(boxes
            .into_iter()
            .map(|mut raw| {
                if !request.tracking {
                    raw.track_id = None;
                }
                raw
            })
            .collect())
    }
}
