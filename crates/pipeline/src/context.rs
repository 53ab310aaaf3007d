//! Collaborators shared by every run

use crate::config::PipelineConfig;
use crate::state::SharedRunState;
use alerting::AlertConfig;
use detection::ObjectDetector;
use std::sync::Arc;
use storage::DetectionLog;

/// Everything a run needs besides its frame source
#[derive(Clone)]
pub struct PipelineContext {
    pub detector: Arc<ObjectDetector>,
    pub log: Arc<dyn DetectionLog>,
    pub state: SharedRunState,
    pub config: PipelineConfig,
    pub alerts: AlertConfig,
}

impl PipelineContext {
    pub fn new(
        detector: Arc<ObjectDetector>,
        log: Arc<dyn DetectionLog>,
        config: PipelineConfig,
        alerts: AlertConfig,
    ) -> Self {
        Self {
            detector,
            log,
            state: SharedRunState::new(),
            config,
            alerts,
        }
    }
}
