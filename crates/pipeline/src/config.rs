//! Pipeline configuration

use serde::{Deserialize, Serialize};

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Processing width (frames are resized before detection)
    pub width: u32,
    /// Processing height
    pub height: u32,
    /// JPEG quality of emitted frames (1-100)
    pub jpeg_quality: u8,
    /// Consecutive read failures that fault the run
    pub max_read_errors: u32,
    /// Consecutive iteration failures that fault the run
    pub max_general_errors: u32,
    /// Pause after a failed read (ms)
    pub read_backoff_ms: u64,
    /// Pause after a failed iteration (ms)
    pub error_backoff_ms: u64,
    /// Seconds between progress log lines
    pub progress_interval_secs: u64,
    /// Frame cap for batch requests
    pub batch_max_frames: usize,
    /// Encoded frames buffered for slow viewers
    pub broadcast_capacity: usize,
    /// Request track ids from the detector while streaming
    pub tracking: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            jpeg_quality: 90,
            max_read_errors: 10,
            max_general_errors: 10,
            read_backoff_ms: 100,
            error_backoff_ms: 50,
            progress_interval_secs: 5,
            batch_max_frames: 30,
            broadcast_capacity: 8,
            tracking: true,
        }
    }
}
