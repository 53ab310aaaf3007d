//! Pipeline controller: the single owner of the active run

use crate::context::PipelineContext;
use crate::state::RunStateView;
use crate::stream::{FrameStream, StopToken};
use crate::PipelineError;
use camera_capture::{CameraError, FrameSource};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Encoded JPEG shared between viewers
pub type EncodedFrame = Arc<Vec<u8>>;

/// Result of a start request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// The same source is already streaming; nothing was opened
    AlreadyRunning,
}

struct ActiveRun {
    source_id: String,
    stop: StopToken,
    handle: Option<JoinHandle<()>>,
}

impl ActiveRun {
    fn is_live(&self) -> bool {
        self.handle.as_ref().map_or(false, |h| !h.is_finished())
    }

    fn shutdown(mut self) {
        self.stop.stop();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Pipeline thread for {} panicked", self.source_id);
            }
        }
    }
}

/// Starts, stops, and observes the one pipeline loop
///
/// The loop runs on a dedicated thread and fans encoded frames out through a
/// broadcast channel. Starting the source that is already live is a no-op;
/// starting a different source stops the current run first.
pub struct PipelineController {
    context: PipelineContext,
    active: Mutex<Option<ActiveRun>>,
    frames: broadcast::Sender<EncodedFrame>,
    loop_starts: AtomicU64,
}

impl PipelineController {
    pub fn new(context: PipelineContext) -> Self {
        let (frames, _) = broadcast::channel(context.config.broadcast_capacity.max(1));
        Self {
            context,
            active: Mutex::new(None),
            frames,
            loop_starts: AtomicU64::new(0),
        }
    }

    /// Start streaming `source_id`, opening it with `opener` only when needed
    pub fn start<F>(&self, source_id: &str, opener: F) -> Result<StartOutcome, PipelineError>
    where
        F: FnOnce() -> Result<Box<dyn FrameSource>, CameraError>,
    {
        let mut active = self.lock_active();

        if let Some(run) = active.as_ref() {
            if run.source_id == source_id && run.is_live() {
                info!("Pipeline already running on {}", source_id);
                return Ok(StartOutcome::AlreadyRunning);
            }
        }

        if let Some(previous) = active.take() {
            info!("Stopping pipeline on {} before switching to {}", previous.source_id, source_id);
            self.context.state.request_stop();
            previous.shutdown();
        }

        let source = opener().map_err(|e| {
            error!("Failed to open source {}: {}", source_id, e);
            e
        })?;

        let stop = StopToken::new();
        let stream = FrameStream::new(source, self.context.clone(), stop.clone(), source_id);
        let frames = self.frames.clone();
        let handle = thread::Builder::new()
            .name("frame-pipeline".to_string())
            .spawn(move || {
                for jpeg in stream {
                    // no receivers is fine; frames are simply not viewed
                    let _ = frames.send(Arc::new(jpeg));
                }
            })
            .map_err(|e| {
                self.context.state.finish(Some(e.to_string()));
                PipelineError::Spawn(e.to_string())
            })?;

        self.loop_starts.fetch_add(1, Ordering::SeqCst);
        *active = Some(ActiveRun {
            source_id: source_id.to_string(),
            stop,
            handle: Some(handle),
        });
        Ok(StartOutcome::Started)
    }

    /// Stop the active run and wait for its thread; false when nothing was active
    pub fn stop(&self) -> bool {
        let run = self.lock_active().take();
        match run {
            Some(run) => {
                self.context.state.request_stop();
                run.shutdown();
                self.context.state.settle();
                true
            }
            None => {
                warn!("Stop requested with no active pipeline");
                false
            }
        }
    }

    /// Receiver of the encoded frames of whichever run is active
    pub fn subscribe(&self) -> broadcast::Receiver<EncodedFrame> {
        self.frames.subscribe()
    }

    pub fn snapshot(&self) -> RunStateView {
        self.context.state.snapshot()
    }

    /// Source of the live run, if any
    pub fn active_source(&self) -> Option<String> {
        self.lock_active()
            .as_ref()
            .filter(|run| run.is_live())
            .map(|run| run.source_id.clone())
    }

    /// Number of loops started since creation
    pub fn loop_starts(&self) -> u64 {
        self.loop_starts.load(Ordering::SeqCst)
    }

    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveRun>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for PipelineController {
    fn drop(&mut self) {
        if let Some(run) = self.lock_active().take() {
            run.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use alerting::AlertConfig;
    use camera_capture::testing::ScriptedSource;
    use camera_capture::VideoFrame;
    use detection::testing::ScriptedBackend;
    use detection::{DetectorConfig, ObjectDetector};
    use storage::Repository;

    fn controller() -> PipelineController {
        let detector =
            ObjectDetector::with_backend(DetectorConfig::default(), Box::new(ScriptedBackend::repeating(Vec::new())))
                .unwrap();
        let config = PipelineConfig {
            width: 32,
            height: 24,
            read_backoff_ms: 0,
            error_backoff_ms: 0,
            ..Default::default()
        };
        PipelineController::new(PipelineContext::new(
            Arc::new(detector),
            Arc::new(Repository::new()),
            config,
            AlertConfig::default(),
        ))
    }

    fn live_source() -> Result<Box<dyn FrameSource>, CameraError> {
        Ok(Box::new(ScriptedSource::repeating(VideoFrame::blank(32, 24))))
    }

    #[test]
    fn test_stop_without_run() {
        assert!(!controller().stop());
    }

    #[test]
    fn test_open_failure_leaves_idle() {
        let controller = controller();
        let result = controller.start("missing", || Err(CameraError::Open("no device".into())));

        assert!(matches!(result, Err(PipelineError::Source(_))));
        assert_eq!(controller.loop_starts(), 0);
        assert!(!controller.snapshot().is_running);
    }

    #[test]
    fn test_switching_source_replaces_run() {
        let controller = controller();
        assert_eq!(controller.start("a", live_source).unwrap(), StartOutcome::Started);
        assert_eq!(controller.start("b", live_source).unwrap(), StartOutcome::Started);

        assert_eq!(controller.loop_starts(), 2);
        assert_eq!(controller.active_source().as_deref(), Some("b"));
        assert!(controller.stop());
        assert!(!controller.snapshot().is_running);
    }
}
