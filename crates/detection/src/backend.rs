//! Detection backend contract and the tracking/plain fallback chain

use crate::config::DetectorConfig;
use crate::object::RawBox;
use crate::DetectionError;
use camera_capture::VideoFrame;
use tracing::{debug, warn};

/// Parameters passed with every inference call
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceRequest {
    /// Ask the backend to attach persistent track ids
    pub tracking: bool,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
    pub agnostic_nms: bool,
}

impl InferenceRequest {
    pub fn from_config(config: &DetectorConfig, tracking: bool) -> Self {
        Self {
            tracking,
            confidence_threshold: config.confidence_threshold,
            iou_threshold: config.iou_threshold,
            max_detections: config.max_detections,
            agnostic_nms: config.agnostic_nms,
        }
    }

    /// Same request with tracking turned off
    pub fn plain(&self) -> Self {
        Self {
            tracking: false,
            ..self.clone()
        }
    }
}

/// Object-detection capability
///
/// Implementations are treated as black boxes: given a frame they return
/// boxes in that frame's pixel coordinates. Backends that cannot track
/// return `DetectionError::TrackingUnsupported` for tracking requests.
pub trait DetectionBackend: Send {
    /// Short backend identifier for logs and the API
    fn name(&self) -> &'static str;

    /// Run inference on one frame
    fn infer(&mut self, frame: &VideoFrame, request: &InferenceRequest) -> Result<Vec<RawBox>, DetectionError>;
}

/// Which step of the fallback chain produced the boxes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferenceMode {
    Tracking,
    Plain,
    /// Every attempt failed; the frame has no detections
    Unavailable,
}

/// Boxes together with the mode that produced them
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceOutcome {
    pub mode: InferenceMode,
    pub boxes: Vec<RawBox>,
}

impl InferenceOutcome {
    fn unavailable() -> Self {
        Self {
            mode: InferenceMode::Unavailable,
            boxes: Vec::new(),
        }
    }
}

/// Run tracking inference, then plain inference, then give up with no boxes
///
/// When `request.tracking` is false only the plain call is attempted.
/// Never fails: backend errors degrade to the next step.
pub fn infer_with_fallback(
    backend: &mut dyn DetectionBackend,
    frame: &VideoFrame,
    request: &InferenceRequest,
) -> InferenceOutcome {
    if request.tracking {
        match backend.infer(frame, request) {
            Ok(boxes) => {
                return InferenceOutcome {
                    mode: InferenceMode::Tracking,
                    boxes,
                }
            }
            Err(e) => debug!("Tracking inference failed on {}: {}, falling back", backend.name(), e),
        }
    }

    match backend.infer(frame, &request.plain()) {
        Ok(boxes) => InferenceOutcome {
            mode: InferenceMode::Plain,
            boxes,
        },
        Err(e) => {
            warn!("Inference failed on {}: {}", backend.name(), e);
            InferenceOutcome::unavailable()
        }
    }
}
