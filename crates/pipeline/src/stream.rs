//! Frame pipeline loop

use crate::context::PipelineContext;
use crate::telemetry;
use crate::PipelineError;
use alerting::AlertManager;
use camera_capture::{CameraError, FrameSource, VideoFrame};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Cooperative cancellation flag, checked at the top of every iteration
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Compresses an annotated frame at the given JPEG quality
pub type FrameEncoder = fn(&VideoFrame, u8) -> Result<Vec<u8>, CameraError>;

/// One run of the pipeline loop, yielding encoded JPEG frames
///
/// Each `next()` reads and processes frames until one is emitted or the run
/// ends. The run ends on a stop request, or when consecutive read failures or
/// consecutive iteration failures reach their ceilings. On the way out the
/// source is released and the shared state leaves `Running`.
pub struct FrameStream {
    source: Box<dyn FrameSource>,
    context: PipelineContext,
    alerts: AlertManager,
    stop: StopToken,
    source_tag: String,
    encoder: FrameEncoder,
    frame_count: u64,
    read_errors: u32,
    general_errors: u32,
    last_progress: Instant,
    finished: bool,
}

impl FrameStream {
    /// Start a run over an opened source
    pub fn new(source: Box<dyn FrameSource>, context: PipelineContext, stop: StopToken, source_tag: &str) -> Self {
        context.state.begin(source_tag);
        telemetry::set_running(true);
        Self {
            alerts: AlertManager::new(context.alerts.clone()),
            source,
            context,
            stop,
            source_tag: source_tag.to_string(),
            encoder: VideoFrame::encode_jpeg,
            frame_count: 0,
            read_errors: 0,
            general_errors: 0,
            last_progress: Instant::now(),
            finished: false,
        }
    }

    /// Replace the JPEG encoder used for emitted frames
    pub fn with_encoder(mut self, encoder: FrameEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    /// Frames that made it through detection in this run
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Current run of consecutive iteration failures
    pub fn iteration_errors(&self) -> u32 {
        self.general_errors
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Resize, detect, publish, log, alert, then encode one frame
    ///
    /// `Ok(None)` means the frame was processed but could not be encoded.
    fn process(&mut self, frame: VideoFrame) -> Result<Option<Vec<u8>>, PipelineError> {
        let config = &self.context.config;
        // Empty frames go straight to the detector, which answers with a blank frame
        let frame = if frame.is_empty() {
            frame
        } else {
            frame.resize(config.width, config.height)?
        };
        let output = self.context.detector.detect(&frame, config.tracking)?;

        self.context.state.update_frame(&output.detections, output.avg_fps);
        telemetry::record_frame(output.detections.len(), output.avg_fps);

        let frame_number = self.frame_count + 1;
        for detection in &output.detections {
            if let Err(e) = self.context.log.log_detection(
                &detection.class_name,
                detection.confidence,
                detection.bbox,
                frame_number,
                &self.source_tag,
                detection.track_id,
            ) {
                debug!("Detection log failed: {}", e);
                telemetry::record_log_failure("detection");
            }
        }

        let raised = self
            .alerts
            .evaluate(frame_number, output.detections.iter().map(|d| d.class_name.as_str()));
        for alert in raised {
            warn!("{}", alert.message);
            telemetry::record_alert(&alert.class_name);
            if let Err(e) = self
                .context
                .log
                .log_alert(&alert.alert_type, &alert.message, &alert.class_name, alert.count)
            {
                debug!("Alert log failed: {}", e);
                telemetry::record_log_failure("alert");
            }
        }

        self.frame_count = frame_number;

        match (self.encoder)(&output.annotated, config.jpeg_quality) {
            Ok(jpeg) => Ok(Some(jpeg)),
            Err(e) => {
                debug!("Dropping frame {}: {}", frame_number, e);
                telemetry::record_dropped_frame();
                Ok(None)
            }
        }
    }

    fn log_progress(&mut self) {
        let interval = Duration::from_secs(self.context.config.progress_interval_secs);
        if self.last_progress.elapsed() >= interval {
            let view = self.context.state.snapshot();
            info!(
                "Processed {} frames | Objects: {} | FPS: {:.1}",
                self.frame_count,
                view.current_objects(),
                view.current_fps
            );
            self.last_progress = Instant::now();
        }
    }

    fn finish(&mut self, error: Option<String>) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.source.release();
        if let Some(reason) = &error {
            error!("Pipeline faulted on {}: {}", self.source_tag, reason);
            telemetry::record_fault();
        } else {
            info!("Pipeline stopped on {} after {} frames", self.source_tag, self.frame_count);
        }
        self.context.state.finish(error);
        telemetry::set_running(false);
    }
}

impl Iterator for FrameStream {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        loop {
            if self.finished {
                return None;
            }
            if self.stop.is_stopped() {
                self.finish(None);
                return None;
            }

            let frame = match self.source.read() {
                Ok(frame) => {
                    self.read_errors = 0;
                    frame
                }
                Err(e) => {
                    self.read_errors += 1;
                    telemetry::record_read_error();
                    warn!(
                        "Frame read failed ({}/{}): {}",
                        self.read_errors, self.context.config.max_read_errors, e
                    );
                    if self.read_errors >= self.context.config.max_read_errors {
                        self.finish(Some(format!("{} consecutive read failures: {}", self.read_errors, e)));
                        return None;
                    }
                    backoff(self.context.config.read_backoff_ms);
                    continue;
                }
            };

            match self.process(frame) {
                Ok(encoded) => {
                    self.general_errors = 0;
                    self.log_progress();
                    if let Some(jpeg) = encoded {
                        return Some(jpeg);
                    }
                }
                Err(e) => {
                    self.general_errors += 1;
                    telemetry::record_iteration_error();
                    warn!(
                        "Pipeline iteration failed ({}/{}): {}",
                        self.general_errors, self.context.config.max_general_errors, e
                    );
                    if self.general_errors >= self.context.config.max_general_errors {
                        self.finish(Some(format!("{} consecutive iteration failures: {}", self.general_errors, e)));
                        return None;
                    }
                    backoff(self.context.config.error_backoff_ms);
                }
            }
        }
    }
}

impl Drop for FrameStream {
    fn drop(&mut self) {
        self.finish(None);
    }
}

fn backoff(ms: u64) {
    if ms > 0 {
        thread::sleep(Duration::from_millis(ms));
    }
}
