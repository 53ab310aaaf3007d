//! Frame Pipeline
//!
//! Runs frames from a source through the detector and out as encoded JPEGs:
//! - `FrameStream`: the per-run loop as a pull-based iterator with a stop token
//! - `SharedRunState`: the single-lock run state read by status endpoints
//! - `PipelineController`: idempotent start/stop of the one active run
//! - `BatchProcessor`: bounded offline processing of a finite source
//! - Multipart framing for MJPEG responses

pub mod batch;
pub mod config;
pub mod context;
pub mod controller;
pub mod telemetry;
pub mod multipart;
pub mod state;
pub mod stream;

pub use batch::{BatchProcessor, BatchProgress, BatchReport, BatchSummary, FrameDetections, VIDEO_SOURCE};
pub use config::PipelineConfig;
pub use context::PipelineContext;
pub use controller::{EncodedFrame, PipelineController, StartOutcome};
pub use multipart::{multipart_frame, BOUNDARY, CONTENT_TYPE};
pub use state::{RunPhase, RunStateView, SharedRunState};
pub use stream::{FrameEncoder, FrameStream, StopToken};

use camera_capture::CameraError;
use detection::DetectionError;
use thiserror::Error;

/// Pipeline error types
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Frame source error: {0}")]
    Source(#[from] CameraError),

    #[error("Detection error: {0}")]
    Detection(#[from] DetectionError),

    #[error("Failed to spawn pipeline thread: {0}")]
    Spawn(String),

    #[error("Batch processing already in progress")]
    Busy,
}
