//! End-to-end pipeline scenarios with scripted sources and backends

use alerting::AlertConfig;
use camera_capture::testing::{Exhausted, ScriptedSource, Step};
use camera_capture::{CameraError, FrameSource, VideoFrame};
use detection::testing::ScriptedBackend;
use detection::{DetectorConfig, ObjectDetector, RawBox};
use pipeline::{
    FrameStream, PipelineConfig, PipelineContext, PipelineController, RunPhase, StartOutcome, StopToken,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use storage::{DetectionLog, Repository, StorageError};
use tokio::sync::broadcast::error::RecvError;

fn test_config() -> PipelineConfig {
    PipelineConfig {
        read_backoff_ms: 0,
        error_backoff_ms: 0,
        ..Default::default()
    }
}

fn context_with(backend: ScriptedBackend, log: Arc<dyn DetectionLog>, config: PipelineConfig) -> PipelineContext {
    let detector = ObjectDetector::with_backend(DetectorConfig::default(), Box::new(backend)).unwrap();
    PipelineContext::new(Arc::new(detector), log, config, AlertConfig::default())
}

fn context(backend: ScriptedBackend) -> (PipelineContext, Arc<Repository>) {
    let repo = Arc::new(Repository::new());
    (context_with(backend, repo.clone(), test_config()), repo)
}

fn frames(n: usize) -> ScriptedSource {
    ScriptedSource::frames(vec![VideoFrame::blank(640, 480); n])
}

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

struct FailingLog;

impl DetectionLog for FailingLog {
    fn log_detection(
        &self,
        _class_name: &str,
        _confidence: f64,
        _bbox: [i32; 4],
        _frame_number: u64,
        _source: &str,
        _track_id: Option<i64>,
    ) -> Result<(), StorageError> {
        Err(StorageError::DatabaseError("disk full".to_string()))
    }

    fn log_alert(&self, _alert_type: &str, _message: &str, _class_name: &str, _count: usize) -> Result<(), StorageError> {
        Err(StorageError::DatabaseError("disk full".to_string()))
    }
}

#[test]
fn track_trajectory_spans_two_frames() {
    let backend = ScriptedBackend::new(vec![
        vec![RawBox::new(90.0, 90.0, 110.0, 110.0, 0, 0.9).with_track(7)],
        vec![RawBox::new(100.0, 90.0, 120.0, 110.0, 0, 0.9).with_track(7)],
    ]);
    let (ctx, _) = context(backend);
    let detector = ctx.detector.clone();

    let mut stream = FrameStream::new(Box::new(frames(2)), ctx, StopToken::new(), "0");
    assert!(stream.next().is_some());
    assert!(stream.next().is_some());

    assert_eq!(detector.trajectory(7), vec![Some((100, 100)), Some((110, 100))]);
}

#[test]
fn five_people_raise_exactly_one_alert() {
    let people: Vec<RawBox> = (0..5)
        .map(|i| RawBox::new(i as f32 * 100.0, 10.0, i as f32 * 100.0 + 50.0, 200.0, 0, 0.8))
        .collect();
    let (ctx, repo) = context(ScriptedBackend::new(vec![people]));

    let mut stream = FrameStream::new(Box::new(frames(1)), ctx, StopToken::new(), "0");
    assert!(stream.next().is_some());

    let alerts = repo.recent_alerts(10).unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].class_name, "person");
    assert_eq!(alerts[0].count, 5);
    assert_eq!(alerts[0].message, "Alert: 5 person(s) detected!");
}

#[test]
fn out_of_range_confidence_is_discarded() {
    let (ctx, repo) = context(ScriptedBackend::new(vec![vec![RawBox::new(10.0, 10.0, 50.0, 50.0, 0, 1.5)]]));
    let detector = ctx.detector.clone();

    let mut stream = FrameStream::new(Box::new(frames(1)), ctx.clone(), StopToken::new(), "0");
    assert!(stream.next().is_some());

    assert_eq!(detector.statistics().total_detections, 0);
    assert_eq!(repo.detection_count(), 0);
    assert!(ctx.state.snapshot().current_detections.is_empty());
}

#[test]
fn reset_after_run_zeroes_statistics() {
    let (ctx, _) = context(ScriptedBackend::repeating(vec![RawBox::new(10.0, 10.0, 50.0, 50.0, 2, 0.7)]));
    let detector = ctx.detector.clone();

    let stream = FrameStream::new(Box::new(frames(4)), ctx, StopToken::new(), "0");
    assert_eq!(stream.count(), 4);
    assert_eq!(detector.statistics().frame_count, 4);

    detector.reset_statistics();
    let stats = detector.statistics();
    assert_eq!(stats.total_detections, 0);
    assert_eq!(stats.frame_count, 0);
    assert_eq!(stats.quality_score, 0.0);
}

#[test]
fn read_error_ceiling_faults_the_run() {
    let (ctx, _) = context(ScriptedBackend::repeating(Vec::new()));
    let source = ScriptedSource::failing();
    let probe = source.probe();

    let stream = FrameStream::new(Box::new(source), ctx.clone(), StopToken::new(), "0");
    assert_eq!(stream.count(), 0);

    assert_eq!(probe.reads(), 10);
    assert!(probe.released());
    let view = ctx.state.snapshot();
    assert_eq!(view.phase, RunPhase::Faulted);
    assert!(!view.is_running);
}

#[test]
fn nine_read_errors_do_not_fault() {
    let (ctx, _) = context(ScriptedBackend::repeating(Vec::new()));
    let mut steps: Vec<Step> = (0..9).map(|_| Step::Fail("timeout".into())).collect();
    steps.push(Step::Frame(VideoFrame::blank(640, 480)));
    let source = ScriptedSource::new(steps, Exhausted::Fail);

    let stream = FrameStream::new(Box::new(source), ctx.clone(), StopToken::new(), "0");
    assert_eq!(stream.count(), 1);
    assert_eq!(ctx.state.snapshot().frames_processed, 1);
}

fn malformed_frame() -> VideoFrame {
    VideoFrame::new(vec![0; 10], 640, 480, 0, 0)
}

fn failing_encoder(_frame: &VideoFrame, _quality: u8) -> Result<Vec<u8>, CameraError> {
    Err(CameraError::Encode("encoder rejected frame".to_string()))
}

#[test]
fn iteration_error_ceiling_faults_the_run() {
    let (ctx, _) = context(ScriptedBackend::repeating(Vec::new()));
    let source = ScriptedSource::frames(vec![malformed_frame(); 12]);
    let probe = source.probe();

    let stream = FrameStream::new(Box::new(source), ctx.clone(), StopToken::new(), "0");
    assert_eq!(stream.count(), 0);

    assert_eq!(probe.reads(), 10);
    assert!(probe.released());
    let view = ctx.state.snapshot();
    assert_eq!(view.phase, RunPhase::Faulted);
    assert!(!view.is_running);
    assert!(view.last_error.unwrap().contains("iteration failures"));
}

#[test]
fn nine_iteration_errors_do_not_fault() {
    let (ctx, _) = context(ScriptedBackend::repeating(Vec::new()));
    let mut steps: Vec<Step> = (0..9).map(|_| Step::Frame(malformed_frame())).collect();
    steps.push(Step::Frame(VideoFrame::blank(640, 480)));
    let source = ScriptedSource::new(steps, Exhausted::Repeat(VideoFrame::blank(640, 480)));

    let stop = StopToken::new();
    let mut stream = FrameStream::new(Box::new(source), ctx.clone(), stop.clone(), "0");
    assert!(stream.next().is_some());
    assert_eq!(stream.iteration_errors(), 0);
    assert!(ctx.state.is_running());

    stop.stop();
    assert!(stream.next().is_none());
    assert_eq!(ctx.state.phase(), RunPhase::Idle);
}

#[test]
fn encode_failure_drops_frame_without_counting() {
    let (ctx, _) = context(ScriptedBackend::repeating(Vec::new()));
    let source = ScriptedSource::frames(vec![VideoFrame::blank(640, 480); 12]);

    let mut stream =
        FrameStream::new(Box::new(source), ctx.clone(), StopToken::new(), "0").with_encoder(failing_encoder);
    assert!(stream.next().is_none());

    assert_eq!(stream.frame_count(), 12);
    assert_eq!(stream.iteration_errors(), 0);
    let view = ctx.state.snapshot();
    assert_eq!(view.frames_processed, 12);
    // The run ends on the exhausted source, not on the dropped frames
    assert!(view.last_error.unwrap().contains("read failures"));
}

#[test]
fn run_state_holds_latest_frame_only() {
    let backend = ScriptedBackend::new(vec![
        vec![RawBox::new(10.0, 10.0, 50.0, 50.0, 0, 0.9)],
        vec![
            RawBox::new(10.0, 10.0, 50.0, 50.0, 2, 0.9),
            RawBox::new(60.0, 10.0, 90.0, 50.0, 2, 0.8),
        ],
    ]);
    let (ctx, _) = context(backend);

    let mut stream = FrameStream::new(Box::new(frames(2)), ctx.clone(), StopToken::new(), "0");
    assert!(stream.next().is_some());
    assert_eq!(ctx.state.snapshot().current_detections[0].class_name, "person");
    assert!(stream.next().is_some());

    let view = ctx.state.snapshot();
    assert_eq!(view.current_objects(), 2);
    assert_eq!(view.current_classes(), 1);
    assert!(view.current_detections.iter().all(|d| d.class_name == "car"));
}

#[test]
fn logging_failures_do_not_stop_the_pipeline() {
    let people: Vec<RawBox> = (0..6)
        .map(|i| RawBox::new(i as f32 * 80.0, 0.0, i as f32 * 80.0 + 40.0, 100.0, 0, 0.9))
        .collect();
    let ctx = context_with(ScriptedBackend::repeating(people), Arc::new(FailingLog), test_config());

    let stream = FrameStream::new(Box::new(frames(3)), ctx.clone(), StopToken::new(), "0");
    assert_eq!(stream.count(), 3);
    assert_eq!(ctx.state.snapshot().frames_processed, 3);
}

#[test]
fn starting_the_same_source_twice_runs_one_loop() {
    let (ctx, _) = context(ScriptedBackend::repeating(Vec::new()));
    let controller = PipelineController::new(ctx);
    let opens = AtomicUsize::new(0);
    let opener = || -> Result<Box<dyn FrameSource>, CameraError> {
        opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSource::repeating(VideoFrame::blank(640, 480))))
    };

    assert_eq!(controller.start("0", opener).unwrap(), StartOutcome::Started);
    assert_eq!(controller.start("0", opener).unwrap(), StartOutcome::AlreadyRunning);

    assert_eq!(controller.loop_starts(), 1);
    assert_eq!(opens.load(Ordering::SeqCst), 1);
    assert!(controller.snapshot().is_running);

    assert!(controller.stop());
    let view = controller.snapshot();
    assert!(!view.is_running);
    assert_eq!(view.phase, RunPhase::Idle);
}

#[test]
fn controller_reports_fault_and_restarts() {
    let (ctx, _) = context(ScriptedBackend::repeating(Vec::new()));
    let controller = PipelineController::new(ctx);

    controller
        .start("0", || Ok(Box::new(ScriptedSource::failing()) as Box<dyn FrameSource>))
        .unwrap();
    assert!(wait_for(|| controller.snapshot().phase == RunPhase::Faulted));
    assert!(wait_for(|| controller.active_source().is_none()));

    let outcome = controller
        .start("0", || Ok(Box::new(ScriptedSource::repeating(VideoFrame::blank(64, 48))) as Box<dyn FrameSource>))
        .unwrap();
    assert_eq!(outcome, StartOutcome::Started);
    assert_eq!(controller.loop_starts(), 2);
    controller.stop();
}

#[tokio::test]
async fn subscribers_receive_encoded_frames() {
    let (ctx, _) = context(ScriptedBackend::repeating(Vec::new()));
    let controller = PipelineController::new(ctx);
    let mut rx = controller.subscribe();

    controller
        .start("0", || Ok(Box::new(ScriptedSource::repeating(VideoFrame::blank(320, 240))) as Box<dyn FrameSource>))
        .unwrap();

    let frame = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(frame) => break frame,
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("frame channel closed"),
            }
        }
    })
    .await
    .expect("frame within timeout");
    assert!(frame.starts_with(&[0xFF, 0xD8]));

    controller.stop();
}
