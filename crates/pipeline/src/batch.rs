//! Offline processing of finite sources (uploaded videos, image sets)

use crate::PipelineError;
use camera_capture::{CameraError, FrameSource, ImageSequenceSource};
use detection::{Detection, ObjectDetector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use storage::DetectionLog;
use tracing::{debug, info, warn};

/// Source tag recorded for batch detections
pub const VIDEO_SOURCE: &str = "mobile_video";

/// Aggregate results of one batch run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total_objects: u64,
    /// Detections per class
    pub classes: BTreeMap<String, u64>,
    pub frames_with_detections: u64,
    pub avg_confidence: f64,
    pub processing_time_secs: f64,
    /// Mean detector time per frame
    pub avg_processing_time_ms: f64,
    pub frames_processed: u64,
    /// Read failure that ended the batch early
    pub read_error: Option<String>,
}

/// Detections of one batch frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameDetections {
    /// Zero-based frame index within the batch
    pub frame: u64,
    pub detections: Vec<Detection>,
    pub count: usize,
}

/// Summary plus per-frame results of one batch run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub summary: BatchSummary,
    pub frames: Vec<FrameDetections>,
}

/// Progress of the batch currently running, if any
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchProgress {
    pub is_processing: bool,
    pub progress_percent: f64,
    pub frames_processed: u64,
}

/// Runs detection over every frame of a finite source
///
/// Tracking is off: frames of a batch are not assumed to be consecutive.
/// One batch runs at a time.
pub struct BatchProcessor {
    detector: Arc<ObjectDetector>,
    log: Arc<dyn DetectionLog>,
    progress: Mutex<BatchProgress>,
}

impl BatchProcessor {
    pub fn new(detector: Arc<ObjectDetector>, log: Arc<dyn DetectionLog>) -> Self {
        Self {
            detector,
            log,
            progress: Mutex::new(BatchProgress::default()),
        }
    }

    /// Process an image file or a directory of images
    pub fn process_path(&self, path: impl AsRef<Path>, max_frames: Option<usize>) -> Result<BatchReport, PipelineError> {
        let mut source = ImageSequenceSource::open(path, false)?;
        self.process_source(&mut source, max_frames)
    }

    /// Process up to `max_frames` frames (all when `None`), then release the source
    pub fn process_source(
        &self,
        source: &mut dyn FrameSource,
        max_frames: Option<usize>,
    ) -> Result<BatchReport, PipelineError> {
        {
            let mut progress = self.lock_progress();
            if progress.is_processing {
                return Err(PipelineError::Busy);
            }
            *progress = BatchProgress {
                is_processing: true,
                ..BatchProgress::default()
            };
        }

        let result = self.run(source, max_frames);
        source.release();
        self.lock_progress().is_processing = false;
        result
    }

    fn run(&self, source: &mut dyn FrameSource, max_frames: Option<usize>) -> Result<BatchReport, PipelineError> {
        let start = Instant::now();
        let total = match (source.frame_count_hint(), max_frames) {
            (Some(hint), Some(cap)) => Some(hint.min(cap)),
            (hint, cap) => hint.or(cap),
        };
        info!("Batch processing started ({} frames expected)", total.map_or("unknown".to_string(), |t| t.to_string()));

        let mut summary = BatchSummary::default();
        let mut frames = Vec::new();
        let mut confidence_sum = 0.0;
        let mut detector_time = 0.0;

        loop {
            if max_frames.is_some_and(|cap| summary.frames_processed as usize >= cap) {
                break;
            }
            let frame = match source.read() {
                Ok(frame) => frame,
                Err(CameraError::EndOfStream) => break,
                Err(e) => {
                    warn!("Batch source failed after {} frames: {}", summary.frames_processed, e);
                    summary.read_error = Some(e.to_string());
                    break;
                }
            };

            let output = self.detector.detect(&frame, false)?;
            let frame_index = summary.frames_processed;
            summary.frames_processed += 1;
            detector_time += output.processing_time;

            if !output.detections.is_empty() {
                summary.frames_with_detections += 1;
            }
            for detection in &output.detections {
                summary.total_objects += 1;
                confidence_sum += detection.confidence;
                *summary.classes.entry(detection.class_name.clone()).or_insert(0) += 1;

                if let Err(e) = self.log.log_detection(
                    &detection.class_name,
                    detection.confidence,
                    detection.bbox,
                    frame_index,
                    VIDEO_SOURCE,
                    detection.track_id,
                ) {
                    debug!("Detection log failed: {}", e);
                }
            }
            frames.push(FrameDetections {
                frame: frame_index,
                count: output.detections.len(),
                detections: output.detections,
            });

            let mut progress = self.lock_progress();
            progress.frames_processed = summary.frames_processed;
            if let Some(total) = total.filter(|t| *t > 0) {
                progress.progress_percent = (summary.frames_processed as f64 / total as f64 * 100.0).min(100.0);
            }
        }

        if summary.total_objects > 0 {
            summary.avg_confidence = confidence_sum / summary.total_objects as f64;
        }
        if summary.frames_processed > 0 {
            summary.avg_processing_time_ms = detector_time / summary.frames_processed as f64 * 1000.0;
        }
        summary.processing_time_secs = start.elapsed().as_secs_f64();
        self.lock_progress().progress_percent = 100.0;

        info!(
            "Batch processing finished: {} frames, {} objects in {:.2}s",
            summary.frames_processed, summary.total_objects, summary.processing_time_secs
        );
        Ok(BatchReport { summary, frames })
    }

    pub fn progress(&self) -> BatchProgress {
        self.lock_progress().clone()
    }

    fn lock_progress(&self) -> MutexGuard<'_, BatchProgress> {
        self.progress.lock().unwrap_or_else(|e| e.into_inner())
    }
}
