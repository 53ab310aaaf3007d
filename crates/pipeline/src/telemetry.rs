//! Prometheus metric names and recorders for the pipeline

use metrics::{counter, gauge, histogram};

/// Metric names as constants for consistency
pub mod names {
    pub const FRAMES_PROCESSED_TOTAL: &str = "vision_frames_processed_total";
    pub const FRAMES_DROPPED_TOTAL: &str = "vision_frames_dropped_total";
    pub const READ_ERRORS_TOTAL: &str = "vision_read_errors_total";
    pub const ITERATION_ERRORS_TOTAL: &str = "vision_iteration_errors_total";
    pub const LOG_FAILURES_TOTAL: &str = "vision_log_failures_total";
    pub const ALERTS_TOTAL: &str = "vision_alerts_total";
    pub const RUNS_FAULTED_TOTAL: &str = "vision_runs_faulted_total";
    pub const DETECTIONS_PER_FRAME: &str = "vision_detections_per_frame";
    pub const PIPELINE_FPS: &str = "vision_pipeline_fps";
    pub const PIPELINE_RUNNING: &str = "vision_pipeline_running";
}

/// Record one processed frame
pub fn record_frame(detections: usize, fps: f64) {
    counter!(names::FRAMES_PROCESSED_TOTAL).increment(1);
    histogram!(names::DETECTIONS_PER_FRAME).record(detections as f64);
    gauge!(names::PIPELINE_FPS).set(fps);
}

/// Record a frame dropped because it could not be encoded
pub fn record_dropped_frame() {
    counter!(names::FRAMES_DROPPED_TOTAL).increment(1);
}

pub fn record_read_error() {
    counter!(names::READ_ERRORS_TOTAL).increment(1);
}

pub fn record_iteration_error() {
    counter!(names::ITERATION_ERRORS_TOTAL).increment(1);
}

/// Record a swallowed logging-collaborator failure
pub fn record_log_failure(kind: &'static str) {
    counter!(names::LOG_FAILURES_TOTAL, "kind" => kind).increment(1);
}

pub fn record_alert(class_name: &str) {
    let labels = [("class", class_name.to_string())];
    counter!(names::ALERTS_TOTAL, &labels).increment(1);
}

pub fn record_fault() {
    counter!(names::RUNS_FAULTED_TOTAL).increment(1);
}

pub fn set_running(running: bool) {
    gauge!(names::PIPELINE_RUNNING).set(if running { 1.0 } else { 0.0 });
}
