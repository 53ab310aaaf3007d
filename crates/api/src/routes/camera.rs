//! Live source control and the MJPEG feed

use super::blocking;
use crate::{ApiError, ApiResult, SharedState};
use axum::{
    body::Body,
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use camera_capture::{open_source, FrameSource, SourceConfig};
use detection::ObjectDetector;
use pipeline::{multipart_frame, StartOutcome, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// JPEG quality of the per-client camera stream
const CAMERA_STREAM_JPEG_QUALITY: u8 = 80;

#[derive(Debug, Default, Deserialize)]
pub struct StartRequest {
    /// Image file or directory; the configured source when absent
    pub source: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
}

/// Start streaming a source; a no-op when that source is already live
pub async fn start_camera(
    State(state): State<SharedState>,
    body: Option<Json<StartRequest>>,
) -> ApiResult<Json<ActionResponse>> {
    let source = body
        .and_then(|Json(request)| request.source)
        .unwrap_or_else(|| state.config.source.path.clone());
    if source.trim().is_empty() {
        return Err(ApiError::bad_request("source must not be empty"));
    }

    let config = SourceConfig {
        path: source.clone(),
        looping: state.config.source.looping,
    };
    let controller = state.controller.clone();
    let outcome = blocking(move || controller.start(&config.path, || open_source(&config))).await??;

    let message = match outcome {
        StartOutcome::Started => {
            info!("Source {} started", source);
            format!("Source {} started", source)
        }
        StartOutcome::AlreadyRunning => format!("Source {} already running", source),
    };
    Ok(Json(ActionResponse { success: true, message }))
}

pub async fn stop_camera(State(state): State<SharedState>) -> ApiResult<Json<ActionResponse>> {
    let controller = state.controller.clone();
    let stopped = blocking(move || controller.stop()).await?;

    let message = if stopped { "Source stopped" } else { "No source running" };
    Ok(Json(ActionResponse {
        success: true,
        message: message.to_string(),
    }))
}

/// Multipart MJPEG stream of the active run
///
/// Viewers that fall behind skip frames. The body ends at server shutdown.
pub async fn video_feed(State(state): State<SharedState>) -> impl IntoResponse {
    let frames = state.controller.subscribe();
    let shutdown = state.shutdown_signal();

    let stream = futures_util::stream::unfold((frames, shutdown), |(mut frames, mut shutdown)| async move {
        loop {
            if *shutdown.borrow() {
                return None;
            }
            tokio::select! {
                received = frames.recv() => match received {
                    Ok(jpeg) => {
                        let part = multipart_frame(&jpeg);
                        return Some((Ok::<_, Infallible>(part), (frames, shutdown)));
                    }
                    Err(RecvError::Lagged(skipped)) => debug!("Viewer skipped {} frames", skipped),
                    Err(RecvError::Closed) => return None,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
            }
        }
    });

    ([(header::CONTENT_TYPE, CONTENT_TYPE)], Body::from_stream(stream))
}

#[derive(Debug, Default, Deserialize)]
pub struct StreamCameraQuery {
    /// Image file or directory; the configured source when absent
    pub camera_id: Option<String>,
}

/// Tracking MJPEG stream over a source opened for this client alone
///
/// Independent of the shared pipeline run. The source is released when the
/// client disconnects, the source ends, or the server shuts down.
pub async fn stream_camera(
    State(state): State<SharedState>,
    Query(query): Query<StreamCameraQuery>,
) -> ApiResult<impl IntoResponse> {
    let config = SourceConfig {
        path: query.camera_id.unwrap_or_else(|| state.config.source.path.clone()),
        looping: state.config.source.looping,
    };
    let source = blocking(move || open_source(&config))
        .await?
        .map_err(|e| ApiError::bad_request(format!("Cannot open camera: {}", e)))?;

    let (tx, rx) = mpsc::channel::<Vec<u8>>(2);
    let detector = state.detector.clone();
    let (width, height) = (state.config.pipeline.width, state.config.pipeline.height);
    let shutdown = state.shutdown_signal();
    tokio::task::spawn_blocking(move || camera_stream_loop(source, detector, width, height, tx, shutdown));

    let stream = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|part| (Ok::<_, Infallible>(part), rx))
    });
    Ok(([(header::CONTENT_TYPE, CONTENT_TYPE)], Body::from_stream(stream)))
}

fn camera_stream_loop(
    mut source: Box<dyn FrameSource>,
    detector: Arc<ObjectDetector>,
    width: u32,
    height: u32,
    parts: mpsc::Sender<Vec<u8>>,
    shutdown: watch::Receiver<bool>,
) {
    let mut sent = 0u64;
    while !*shutdown.borrow() {
        let frame = match source.read() {
            Ok(frame) if frame.is_empty() => frame,
            Ok(frame) => match frame.resize(width, height) {
                Ok(resized) => resized,
                Err(e) => {
                    warn!("Camera stream frame skipped: {}", e);
                    continue;
                }
            },
            Err(e) => {
                debug!("Camera stream source ended: {}", e);
                break;
            }
        };

        let annotated = match detector.detect(&frame, true) {
            Ok(output) => output.annotated,
            Err(e) => {
                warn!("Detection error: {}", e);
                frame
            }
        };
        let jpeg = match annotated.encode_jpeg(CAMERA_STREAM_JPEG_QUALITY) {
            Ok(jpeg) => jpeg,
            Err(e) => {
                debug!("Camera stream frame dropped: {}", e);
                continue;
            }
        };
        if parts.blocking_send(multipart_frame(&jpeg)).is_err() {
            break;
        }
        sent += 1;
    }
    source.release();
    debug!("Camera stream closed after {} frames", sent);
}

#[cfg(test)]
mod tests {
    use crate::create_router;
    use crate::tests::test_state;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use camera_capture::testing::ScriptedSource;
    use camera_capture::{FrameSource, VideoFrame};
    use detection::testing::ScriptedBackend;
    use futures_util::StreamExt;
    use std::time::Duration;
    use tower::ServiceExt;

    fn post_json(uri: &str, json: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_start_is_idempotent_then_stop() {
        let dir = tempfile::tempdir().unwrap();
        let jpeg = VideoFrame::filled(32, 24, [10, 20, 30]).encode_jpeg(90).unwrap();
        std::fs::write(dir.path().join("0001.jpg"), jpeg).unwrap();
        let request = format!("{{\"source\": {:?}}}", dir.path().to_str().unwrap());

        let state = test_state(ScriptedBackend::repeating(Vec::new()));
        let app = create_router(state.clone());

        let response = app.clone().oneshot(post_json("/start_camera", &request)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["success"], true);

        let response = app.clone().oneshot(post_json("/start_camera", &request)).await.unwrap();
        assert!(json_body(response).await["message"]
            .as_str()
            .unwrap()
            .contains("already running"));
        assert_eq!(state.controller.loop_starts(), 1);

        let response = app.oneshot(post_json("/stop_camera", "{}")).await.unwrap();
        assert_eq!(json_body(response).await["message"], "Source stopped");
        assert!(!state.controller.snapshot().is_running);
    }

    #[tokio::test]
    async fn test_start_missing_source_is_bad_request() {
        let app = create_router(test_state(ScriptedBackend::repeating(Vec::new())));
        let response = app
            .oneshot(post_json("/start_camera", "{\"source\": \"/no/such/frames\"}"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["success"], false);
    }

    #[tokio::test]
    async fn test_video_feed_streams_multipart_parts() {
        let state = test_state(ScriptedBackend::repeating(Vec::new()));
        let app = create_router(state.clone());

        let response = app
            .oneshot(Request::builder().uri("/video_feed").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "multipart/x-mixed-replace; boundary=frame"
        );

        state
            .controller
            .start("scripted", || {
                Ok(Box::new(ScriptedSource::repeating(VideoFrame::blank(64, 48))) as Box<dyn FrameSource>)
            })
            .unwrap();

        let mut body = response.into_body().into_data_stream();
        let part = tokio::time::timeout(Duration::from_secs(5), body.next())
            .await
            .expect("part within timeout")
            .expect("stream open")
            .unwrap();
        assert!(part.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n"));

        state.controller.stop();
    }

    #[tokio::test]
    async fn test_stream_camera_tracks_its_own_source() {
        let dir = tempfile::tempdir().unwrap();
        let jpeg = VideoFrame::filled(32, 24, [10, 20, 30]).encode_jpeg(90).unwrap();
        std::fs::write(dir.path().join("0001.jpg"), jpeg).unwrap();

        let backend = ScriptedBackend::repeating(Vec::new());
        let calls = backend.probe();
        let state = test_state(backend);
        let uri = format!("/mobile/stream_camera?camera_id={}", dir.path().to_str().unwrap());

        let response = create_router(state.clone())
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "multipart/x-mixed-replace; boundary=frame"
        );

        let mut body = response.into_body().into_data_stream();
        let part = tokio::time::timeout(Duration::from_secs(5), body.next())
            .await
            .expect("part within timeout")
            .expect("stream open")
            .unwrap();
        assert!(part.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n"));
        drop(body);

        assert_eq!(calls.calls().first(), Some(&true));
        assert!(!state.controller.snapshot().is_running);
    }

    #[tokio::test]
    async fn test_stream_camera_missing_source_is_bad_request() {
        let app = create_router(test_state(ScriptedBackend::repeating(Vec::new())));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/mobile/stream_camera?camera_id=/no/such/camera")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
