//! Detector configuration

use serde::{Deserialize, Serialize};
use stats_engine::StatsConfig;
use tracking::TrackerConfig;

/// Detector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Minimum confidence requested from the model
    pub confidence_threshold: f32,

    /// IoU threshold for non-max suppression
    pub iou_threshold: f32,

    /// Maximum detections per image
    pub max_detections: usize,

    /// Suppress overlapping boxes across classes
    pub agnostic_nms: bool,

    /// Square model input size (pixels)
    pub input_size: u32,

    /// ONNX model path; without one the null backend is used
    pub model_path: Option<String>,

    /// TrueType/OpenType font for labels; without one text is skipped
    pub font_path: Option<String>,

    /// Rolling statistics windows
    pub stats: StatsConfig,

    /// Track history settings
    pub tracker: TrackerConfig,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.35,
            iou_threshold: 0.5,
            max_detections: 100,
            agnostic_nms: false,
            input_size: 640,
            model_path: None,
            font_path: None,
            stats: StatsConfig::default(),
            tracker: TrackerConfig::default(),
        }
    }
}
