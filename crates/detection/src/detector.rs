//! Object Detector Implementation

use crate::annotate::Annotator;
use crate::backend::{infer_with_fallback, DetectionBackend, InferenceMode, InferenceRequest};
use crate::backends::build_backend;
use crate::config::DetectorConfig;
use crate::object::{filter_detections, Detection};
use crate::DetectionError;
use camera_capture::{VideoFrame, DEFAULT_HEIGHT, DEFAULT_WIDTH};
use stats_engine::{PerformanceMetrics, Statistics, StatsEngine};
use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};
use tracking::{Point, TrackManager};

/// Result of one detection call
#[derive(Debug, Clone)]
pub struct DetectionOutput {
    /// Input frame with boxes, labels, trajectories, and summary drawn on it
    pub annotated: VideoFrame,
    pub detections: Vec<Detection>,
    /// Mean of the FPS window including this frame
    pub avg_fps: f64,
    /// Seconds spent in this call
    pub processing_time: f64,
    pub mode: InferenceMode,
}

impl DetectionOutput {
    fn blank() -> Self {
        Self {
            annotated: VideoFrame::blank(DEFAULT_WIDTH, DEFAULT_HEIGHT),
            detections: Vec::new(),
            avg_fps: 0.0,
            processing_time: 0.0,
            mode: InferenceMode::Unavailable,
        }
    }
}

/// Statistics and track history, mutated together under one lock
struct DetectorState {
    stats: StatsEngine,
    tracks: TrackManager,
}

/// Detector adapter over a detection backend
///
/// `detect` takes `&self`; backend calls are serialized through their own
/// lock and the statistics/track state through another, so one-shot
/// requests can share the detector with a running pipeline.
pub struct ObjectDetector {
    config: DetectorConfig,
    backend_name: &'static str,
    backend: Mutex<Box<dyn DetectionBackend>>,
    state: Mutex<DetectorState>,
    annotator: Annotator,
}

impl ObjectDetector {
    /// Build the detector and the backend named by the configuration
    pub fn new(config: DetectorConfig) -> Result<Self, DetectionError> {
        let backend = build_backend(&config)?;
        Self::with_backend(config, backend)
    }

    /// Build the detector around an existing backend
    pub fn with_backend(config: DetectorConfig, backend: Box<dyn DetectionBackend>) -> Result<Self, DetectionError> {
        let annotator = Annotator::load(config.font_path.as_deref())?;
        let backend_name = backend.name();
        info!(
            "Object detector ready (backend: {}, confidence: {}, labels: {})",
            backend_name,
            config.confidence_threshold,
            annotator.has_font()
        );

        Ok(Self {
            state: Mutex::new(DetectorState {
                stats: StatsEngine::new(config.stats.clone()),
                tracks: TrackManager::new(config.tracker.clone()),
            }),
            backend_name,
            backend: Mutex::new(backend),
            annotator,
            config,
        })
    }

    /// Detect, record, and annotate objects in one frame
    pub fn detect(&self, frame: &VideoFrame, track: bool) -> Result<DetectionOutput, DetectionError> {
        if frame.is_empty() {
            debug!("Empty frame, returning blank output");
            return Ok(DetectionOutput::blank());
        }
        if !frame.is_consistent() {
            return Err(DetectionError::InvalidFrame(format!(
                "{} bytes for a {}x{} frame",
                frame.data.len(),
                frame.width,
                frame.height
            )));
        }

        let start = Instant::now();

        let request = InferenceRequest::from_config(&self.config, track);
        let outcome = {
            let mut backend = self.backend.lock().unwrap_or_else(|e| e.into_inner());
            infer_with_fallback(backend.as_mut(), frame, &request)
        };

        let detections: Vec<Detection> = outcome
            .boxes
            .iter()
            .filter_map(|raw| Detection::from_raw(raw, frame.width, frame.height))
            .collect();

        let mut image = frame
            .to_image()
            .map_err(|e| DetectionError::InvalidFrame(e.to_string()))?;

        let (frame_number, trajectories) = {
            let mut state = self.lock_state();
            let frame_number = state.stats.increment_frame();
            state.tracks.advance_frame();

            let timestamp = unix_seconds();
            let mut trajectories: Vec<(String, Vec<(Point, Point)>, Point)> = Vec::new();
            for detection in &detections {
                state
                    .stats
                    .record_detection(&detection.class_name, detection.confidence, timestamp);
                if let Some(id) = detection.track_id {
                    let center = detection.center();
                    state.tracks.update(id, center);
                    trajectories.push((detection.class_name.clone(), state.tracks.segments(id), center));
                }
            }
            (frame_number, trajectories)
        };

        for detection in &detections {
            self.annotator.draw_detection(&mut image, detection);
        }
        for (class_name, segments, center) in &trajectories {
            self.annotator.draw_trajectory(&mut image, class_name, segments, *center);
        }

        let processing_time = start.elapsed().as_secs_f64();
        let fps_instant = if processing_time > 0.0 { 1.0 / processing_time } else { 0.0 };

        let (avg_fps, avg_confidence) = {
            let mut state = self.lock_state();
            let avg_fps = state.stats.record(processing_time, fps_instant);
            (avg_fps, state.stats.avg_confidence())
        };

        let classes: BTreeSet<&str> = detections.iter().map(|d| d.class_name.as_str()).collect();
        let summary = [
            format!(
                "Frame: {} | FPS: {:.1} | Processing: {:.1}ms",
                frame_number,
                avg_fps,
                processing_time * 1000.0
            ),
            format!(
                "Objects: {} | Classes: {} | Avg Conf: {:.2}",
                detections.len(),
                classes.len(),
                avg_confidence
            ),
        ];
        self.annotator.draw_summary(&mut image, &summary);

        let mut annotated = VideoFrame::from_image(image);
        annotated.timestamp_ns = frame.timestamp_ns;
        annotated.sequence = frame.sequence;

        Ok(DetectionOutput {
            annotated,
            detections,
            avg_fps,
            processing_time,
            mode: outcome.mode,
        })
    }

    /// Snapshot of detection statistics
    pub fn statistics(&self) -> Statistics {
        self.lock_state().stats.statistics()
    }

    /// Snapshot of timing and throughput
    pub fn performance_metrics(&self) -> PerformanceMetrics {
        self.lock_state().stats.performance_metrics()
    }

    /// Clear statistics and track histories together
    pub fn reset_statistics(&self) {
        let mut state = self.lock_state();
        state.stats.reset();
        state.tracks.clear();
    }

    /// Recent centers of a track, oldest first
    pub fn trajectory(&self, track_id: i64) -> Vec<Option<Point>> {
        self.lock_state().tracks.trajectory(track_id)
    }

    /// Number of live tracks
    pub fn track_count(&self) -> usize {
        self.lock_state().tracks.len()
    }

    /// Filter with the configured confidence threshold as the default floor
    pub fn filter_detections(
        &self,
        detections: &[Detection],
        min_confidence: Option<f64>,
        classes: Option<&[String]>,
        min_area: Option<i64>,
    ) -> Vec<Detection> {
        let floor = min_confidence.unwrap_or(self.config.confidence_threshold as f64);
        filter_detections(detections, floor, classes, min_area)
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend_name
    }

    fn lock_state(&self) -> MutexGuard<'_, DetectorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn unix_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
