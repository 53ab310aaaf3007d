//! Statistics Engine Implementation

use crate::quality::quality_score;
use ring_buffer::RollingWindow;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Window sizes for the rolling statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// FPS samples kept for the smoothed FPS (default: 30)
    pub fps_window: usize,
    /// Processing-time samples kept (default: 100)
    pub processing_window: usize,
    /// Confidence samples kept for the quality score (default: 100)
    pub confidence_window: usize,
    /// Recent (confidence, timestamp) samples kept per class (default: 100)
    pub class_history_capacity: usize,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            fps_window: 30,
            processing_window: 100,
            confidence_window: 100,
            class_history_capacity: 100,
        }
    }
}

/// One recent detection of a class
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassSample {
    pub confidence: f64,
    /// Seconds since the Unix epoch
    pub timestamp: f64,
}

/// Point-in-time detection statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub total_detections: u64,
    pub unique_classes: u64,
    pub detection_counts: BTreeMap<String, u64>,
    pub class_detection_history: BTreeMap<String, Vec<ClassSample>>,
    pub avg_confidence: f64,
    pub frame_count: u64,
    /// Seconds
    pub avg_processing_time: f64,
    pub avg_fps: f64,
    pub quality_score: f64,
}

/// Point-in-time performance metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub avg_processing_time_ms: f64,
    pub max_processing_time_ms: f64,
    pub min_processing_time_ms: f64,
    pub avg_fps: f64,
    pub max_fps: f64,
    pub min_fps: f64,
    pub total_frames: u64,
    pub quality_score: f64,
}

/// Rolling statistics for one detector
///
/// Not internally synchronized. The owner keeps it behind the same lock as the
/// rest of its per-run state so snapshots are computed without tearing.
#[derive(Debug, Clone)]
pub struct StatsEngine {
    config: StatsConfig,
    fps: RollingWindow<f64>,
    processing_times: RollingWindow<f64>,
    confidences: RollingWindow<f64>,
    detection_counts: BTreeMap<String, u64>,
    class_history: BTreeMap<String, RollingWindow<ClassSample>>,
    frame_count: u64,
}

impl StatsEngine {
    /// Create a new statistics engine
    pub fn new(config: StatsConfig) -> Self {
        Self {
            fps: RollingWindow::new(config.fps_window),
            processing_times: RollingWindow::new(config.processing_window),
            confidences: RollingWindow::new(config.confidence_window),
            detection_counts: BTreeMap::new(),
            class_history: BTreeMap::new(),
            frame_count: 0,
            config,
        }
    }

    /// Count a processed frame, returning the new frame number
    pub fn increment_frame(&mut self) -> u64 {
        self.frame_count += 1;
        self.frame_count
    }

    /// Record one accepted detection
    pub fn record_detection(&mut self, class_name: &str, confidence: f64, timestamp: f64) {
        *self.detection_counts.entry(class_name.to_string()).or_insert(0) += 1;

        let capacity = self.config.class_history_capacity;
        self.class_history
            .entry(class_name.to_string())
            .or_insert_with(|| RollingWindow::new(capacity))
            .push(ClassSample {
                confidence,
                timestamp,
            });

        self.confidences.push(confidence);
    }

    /// Record frame timing, returning the smoothed FPS including this sample
    pub fn record(&mut self, processing_time: f64, fps_instant: f64) -> f64 {
        self.processing_times.push(processing_time);
        self.fps.push(fps_instant);
        self.fps.mean()
    }

    pub fn avg_fps(&self) -> f64 {
        self.fps.mean()
    }

    pub fn avg_confidence(&self) -> f64 {
        self.confidences.mean()
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn quality_score(&self) -> f64 {
        quality_score(&self.confidences)
    }

    /// Snapshot of the detection statistics
    pub fn statistics(&self) -> Statistics {
        Statistics {
            total_detections: self.detection_counts.values().sum(),
            unique_classes: self.detection_counts.len() as u64,
            detection_counts: self.detection_counts.clone(),
            class_detection_history: self
                .class_history
                .iter()
                .map(|(class, window)| (class.clone(), window.to_vec()))
                .collect(),
            avg_confidence: self.confidences.mean(),
            frame_count: self.frame_count,
            avg_processing_time: self.processing_times.mean(),
            avg_fps: self.fps.mean(),
            quality_score: self.quality_score(),
        }
    }

    /// Snapshot of timing and throughput
    pub fn performance_metrics(&self) -> PerformanceMetrics {
        PerformanceMetrics {
            avg_processing_time_ms: self.processing_times.mean() * 1000.0,
            max_processing_time_ms: self.processing_times.max() * 1000.0,
            min_processing_time_ms: self.processing_times.min() * 1000.0,
            avg_fps: self.fps.mean(),
            max_fps: self.fps.max(),
            min_fps: self.fps.min(),
            total_frames: self.frame_count,
            quality_score: self.quality_score(),
        }
    }

    /// Clear every counter and window
    pub fn reset(&mut self) {
        self.fps.clear();
        self.processing_times.clear();
        self.confidences.clear();
        self.detection_counts.clear();
        self.class_history.clear();
        self.frame_count = 0;
        info!("Detection statistics reset");
    }
}

impl Default for StatsEngine {
    fn default() -> Self {
        Self::new(StatsConfig::default())
    }
}
