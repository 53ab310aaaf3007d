//! Detector Adapter
//!
//! Wraps an external object-detection capability:
//! - Tracking inference with plain-inference fallback
//! - Validation and normalization of raw boxes into `Detection` records
//! - Per-class counters, rolling confidence/FPS windows, and track history
//! - Bounding box, label, trajectory, and summary annotation

pub mod annotate;
pub mod backend;
pub mod backends;
pub mod classes;
pub mod config;
pub mod detector;
pub mod object;
pub mod testing;

pub use annotate::Annotator;
pub use backend::{infer_with_fallback, DetectionBackend, InferenceMode, InferenceOutcome, InferenceRequest};
pub use classes::{class_name, ClassPalette, COCO_CLASSES};
pub use config::DetectorConfig;
pub use detector::{DetectionOutput, ObjectDetector};
pub use object::{filter_detections, Detection, RawBox};

use thiserror::Error;

/// Detection error types
#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Tracking mode not supported by backend {0}")]
    TrackingUnsupported(&'static str),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
