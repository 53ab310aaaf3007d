//! Alerting System
//!
//! Tallies detections per frame and raises a threshold alert for every
//! watched class whose count in that frame reaches the configured threshold.

mod manager;

pub use manager::{Alert, AlertConfig, AlertManager, AlertState, THRESHOLD_ALERT};
