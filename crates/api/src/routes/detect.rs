//! One-shot and batch detection for mobile clients

use super::blocking;
use crate::{ApiError, ApiResult, SharedState};
use axum::{extract::State, Json};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use camera_capture::{decode_image, open_source, SourceConfig, VideoFrame};
use chrono::Utc;
use detection::{Detection, DetectionOutput, ObjectDetector};
use metrics::{counter, histogram};
use pipeline::{BatchProgress, BatchSummary, FrameDetections};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use storage::DetectionLog;
use tracing::{debug, warn};

/// JPEG quality of annotated images returned to clients
const RESULT_JPEG_QUALITY: u8 = 85;
const DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

mod names {
    pub const ONESHOT_IMAGES_TOTAL: &str = "vision_oneshot_images_total";
    pub const ONESHOT_PROCESSING_SECONDS: &str = "vision_oneshot_processing_seconds";
}

/// Decode a base64 image, with or without a `data:` URL prefix
fn decode_base64_frame(encoded: &str) -> ApiResult<VideoFrame> {
    let payload = encoded.split_once(',').map_or(encoded, |(_, data)| data).trim();
    let bytes = STANDARD
        .decode(payload)
        .map_err(|e| ApiError::bad_request(format!("Failed to decode image: {}", e)))?;
    decode_image(&bytes).map_err(|e| ApiError::bad_request(format!("Failed to decode image: {}", e)))
}

/// Letterbox to the processing size and detect without tracking
fn detect_frame(detector: &ObjectDetector, frame: &VideoFrame, width: u32, height: u32) -> ApiResult<DetectionOutput> {
    let frame = frame
        .letterbox(width, height)
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    let output = detector.detect(&frame, false)?;
    histogram!(names::ONESHOT_PROCESSING_SECONDS).record(output.processing_time);
    Ok(output)
}

fn log_detections(log: &dyn DetectionLog, detections: &[Detection], frame_number: u64, source: &str) {
    for detection in detections {
        if let Err(e) = log.log_detection(
            &detection.class_name,
            detection.confidence,
            detection.bbox,
            frame_number,
            source,
            detection.track_id,
        ) {
            warn!("Error logging detection: {}", e);
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DetectImageRequest {
    /// Base64 JPEG or PNG, optionally as a data URL
    pub image: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DetectionMetrics {
    pub processing_time_ms: f64,
    pub fps: f64,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

#[derive(Debug, Serialize)]
pub struct DetectImageResponse {
    pub success: bool,
    pub objects_detected: usize,
    pub detections: Vec<Detection>,
    pub metrics: DetectionMetrics,
    /// Annotated frame as a JPEG data URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl DetectImageResponse {
    fn from_output(output: DetectionOutput) -> Self {
        let image = match output.annotated.encode_jpeg(RESULT_JPEG_QUALITY) {
            Ok(jpeg) => Some(format!("{}{}", DATA_URL_PREFIX, STANDARD.encode(jpeg))),
            Err(e) => {
                debug!("Result image not returned: {}", e);
                None
            }
        };

        Self {
            success: true,
            objects_detected: output.detections.len(),
            metrics: DetectionMetrics {
                processing_time_ms: output.processing_time * 1000.0,
                fps: output.avg_fps,
                timestamp: Utc::now().timestamp_millis(),
            },
            detections: output.detections,
            image,
        }
    }
}

pub async fn detect_image(
    State(state): State<SharedState>,
    Json(request): Json<DetectImageRequest>,
) -> ApiResult<Json<DetectImageResponse>> {
    let encoded = request
        .image
        .ok_or_else(|| ApiError::bad_request("No image provided"))?;
    let frame = decode_base64_frame(&encoded)?;
    counter!(names::ONESHOT_IMAGES_TOTAL, "endpoint" => "detect_image").increment(1);

    let detector = state.detector.clone();
    let (width, height) = (state.config.pipeline.width, state.config.pipeline.height);
    let output = blocking(move || detect_frame(&detector, &frame, width, height)).await??;

    log_detections(state.repository.as_ref(), &output.detections, 0, "mobile_image");
    Ok(Json(DetectImageResponse::from_output(output)))
}

#[derive(Debug, Default, Deserialize)]
pub struct DetectCameraRequest {
    /// Image file or directory; the configured source when absent
    pub camera_id: Option<String>,
}

/// Grab one frame from a source, detect on it, and release the source
pub async fn detect_camera(
    State(state): State<SharedState>,
    body: Option<Json<DetectCameraRequest>>,
) -> ApiResult<Json<DetectImageResponse>> {
    let config = SourceConfig {
        path: body
            .and_then(|Json(request)| request.camera_id)
            .unwrap_or_else(|| state.config.source.path.clone()),
        looping: false,
    };
    if config.path.trim().is_empty() {
        return Err(ApiError::bad_request("Invalid camera_id"));
    }
    counter!(names::ONESHOT_IMAGES_TOTAL, "endpoint" => "detect_camera").increment(1);

    let detector = state.detector.clone();
    let (width, height) = (state.config.pipeline.width, state.config.pipeline.height);
    let output = blocking(move || {
        let mut source =
            open_source(&config).map_err(|e| ApiError::bad_request(format!("Cannot open camera: {}", e)))?;
        let frame = source.read();
        source.release();
        let frame = frame.map_err(|e| ApiError::bad_request(format!("Failed to read camera frame: {}", e)))?;
        detect_frame(&detector, &frame, width, height)
    })
    .await??;

    log_detections(state.repository.as_ref(), &output.detections, 0, "mobile_camera");
    Ok(Json(DetectImageResponse::from_output(output)))
}

#[derive(Debug, Deserialize)]
pub struct BatchDetectRequest {
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchImageResult {
    pub image_index: usize,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub objects_detected: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detections: Option<Vec<Detection>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchMetrics {
    pub avg_processing_time_ms: f64,
    pub total_processing_time_ms: f64,
    pub timestamp: i64,
}

#[derive(Debug, Serialize)]
pub struct BatchDetectResponse {
    pub success: bool,
    pub total_images: usize,
    /// Images past the batch cap that were not processed
    pub skipped: usize,
    pub results: Vec<BatchImageResult>,
    pub metrics: BatchMetrics,
}

/// Detect objects in up to `batch_max_frames` images; one bad image fails only itself
pub async fn batch_detect(
    State(state): State<SharedState>,
    Json(request): Json<BatchDetectRequest>,
) -> ApiResult<Json<BatchDetectResponse>> {
    let mut images = request.images;
    if images.is_empty() {
        return Err(ApiError::bad_request("No images provided"));
    }

    let cap = state.config.pipeline.batch_max_frames;
    let skipped = images.len().saturating_sub(cap);
    if skipped > 0 {
        warn!("Batch of {} images truncated to {}", images.len(), cap);
        images.truncate(cap);
    }
    counter!(names::ONESHOT_IMAGES_TOTAL, "endpoint" => "batch_detect").increment(images.len() as u64);

    let detector = state.detector.clone();
    let log: Arc<dyn DetectionLog> = state.repository.clone();
    let (width, height) = (state.config.pipeline.width, state.config.pipeline.height);

    let (results, total_time) = blocking(move || {
        let mut total_time = 0.0;
        let results: Vec<BatchImageResult> = images
            .iter()
            .enumerate()
            .map(|(index, encoded)| {
                let outcome =
                    decode_base64_frame(encoded).and_then(|frame| detect_frame(&detector, &frame, width, height));
                match outcome {
                    Ok(output) => {
                        total_time += output.processing_time;
                        log_detections(log.as_ref(), &output.detections, index as u64, "mobile_batch");
                        BatchImageResult {
                            image_index: index,
                            success: true,
                            objects_detected: Some(output.detections.len()),
                            processing_time_ms: Some(output.processing_time * 1000.0),
                            detections: Some(output.detections),
                            error: None,
                        }
                    }
                    Err(e) => BatchImageResult {
                        image_index: index,
                        success: false,
                        objects_detected: None,
                        detections: None,
                        processing_time_ms: None,
                        error: Some(e.to_string()),
                    },
                }
            })
            .collect();
        (results, total_time)
    })
    .await?;

    let avg_processing_time_ms = if results.is_empty() {
        0.0
    } else {
        total_time / results.len() as f64 * 1000.0
    };

    Ok(Json(BatchDetectResponse {
        success: true,
        total_images: results.len(),
        skipped,
        metrics: BatchMetrics {
            avg_processing_time_ms,
            total_processing_time_ms: total_time * 1000.0,
            timestamp: Utc::now().timestamp_millis(),
        },
        results,
    }))
}

#[derive(Debug, Deserialize)]
pub struct DetectVideoRequest {
    /// Image file or directory of frames on the server
    pub path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VideoMetrics {
    pub avg_processing_time_ms: f64,
    pub timestamp: i64,
}

#[derive(Debug, Serialize)]
pub struct DetectVideoResponse {
    pub success: bool,
    pub frames_processed: u64,
    pub total_detections: u64,
    pub frame_detections: Vec<FrameDetections>,
    pub summary: BatchSummary,
    pub metrics: VideoMetrics,
}

/// Run batch detection over the first `batch_max_frames` frames of a path
pub async fn detect_video(
    State(state): State<SharedState>,
    Json(request): Json<DetectVideoRequest>,
) -> ApiResult<Json<DetectVideoResponse>> {
    let path = request
        .path
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("No file provided"))?;

    let batch = state.batch.clone();
    let cap = state.config.pipeline.batch_max_frames;
    let report = blocking(move || batch.process_path(&path, Some(cap))).await??;

    Ok(Json(DetectVideoResponse {
        success: true,
        frames_processed: report.summary.frames_processed,
        total_detections: report.summary.total_objects,
        frame_detections: report.frames,
        metrics: VideoMetrics {
            avg_processing_time_ms: report.summary.avg_processing_time_ms,
            timestamp: Utc::now().timestamp_millis(),
        },
        summary: report.summary,
    }))
}

pub async fn batch_progress(State(state): State<SharedState>) -> Json<BatchProgress> {
    Json(state.batch.progress())
}
