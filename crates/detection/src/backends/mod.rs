//! Concrete detection backends

#[cfg(feature = "backend-tract")]
pub mod tract;

use crate::backend::{DetectionBackend, InferenceRequest};
use crate::config::DetectorConfig;
use crate::object::RawBox;
use crate::DetectionError;
use camera_capture::VideoFrame;
use tracing::warn;

/// Backend that never finds anything
///
/// Used when no model is configured so the rest of the pipeline still runs.
#[derive(Debug, Default)]
pub struct NullBackend;

impl DetectionBackend for NullBackend {
    fn name(&self) -> &'static str {
        "null"
    }

    fn infer(&mut self, _frame: &VideoFrame, _request: &InferenceRequest) -> Result<Vec<RawBox>, DetectionError> {
        Ok(Vec::new())
    }
}

/// Build the backend selected by the configuration
pub fn build_backend(config: &DetectorConfig) -> Result<Box<dyn DetectionBackend>, DetectionError> {
    let Some(model_path) = config.model_path.as_deref() else {
        warn!("No model path configured. Using null backend.");
        return Ok(Box::new(NullBackend));
    };

    #[cfg(feature = "backend-tract")]
    {
        let backend = tract::TractBackend::load(model_path, config.input_size)?;
        Ok(Box::new(backend))
    }

    #[cfg(not(feature = "backend-tract"))]
    {
        Err(DetectionError::ModelLoad(format!(
            "{}: built without an inference backend (enable the backend-tract feature)",
            model_path
        )))
    }
}
