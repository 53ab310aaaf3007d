//! Logged detections and alerts

use crate::{ApiError, ApiResult, SharedState};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use storage::{AlertRecord, ClassStatistics, DetectionRecord, StorageError};

fn default_alert_limit() -> usize {
    10
}

fn default_history_limit() -> usize {
    100
}

fn default_high_confidence_limit() -> usize {
    50
}

fn default_min_conf() -> f64 {
    0.8
}

fn check_confidence(value: f64) -> ApiResult<f64> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ApiError::bad_request(format!("confidence {} outside [0, 1]", value)))
    }
}

#[derive(Debug, Deserialize)]
pub struct AlertQuery {
    #[serde(default = "default_alert_limit")]
    pub limit: usize,
}

pub async fn get_alerts(
    State(state): State<SharedState>,
    Query(params): Query<AlertQuery>,
) -> ApiResult<Json<Vec<AlertRecord>>> {
    Ok(Json(state.repository.recent_alerts(params.limit)?))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    pub limit: usize,
    /// Restrict to one class
    #[serde(rename = "class")]
    pub class_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DetectionListResponse {
    pub success: bool,
    pub total: usize,
    pub detections: Vec<DetectionRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl DetectionListResponse {
    fn new(detections: Vec<DetectionRecord>) -> Self {
        Self {
            success: true,
            total: detections.len(),
            detections,
            min_confidence: None,
            timestamp: None,
        }
    }
}

pub async fn get_detection_history(
    State(state): State<SharedState>,
    Query(params): Query<HistoryQuery>,
) -> ApiResult<Json<DetectionListResponse>> {
    let detections = match params.class_name.as_deref() {
        Some(class_name) => state.repository.detections_by_class(class_name, params.limit)?,
        None => state.repository.recent_detections(params.limit)?,
    };

    let mut response = DetectionListResponse::new(detections);
    response.timestamp = Some(Utc::now());
    Ok(Json(response))
}

#[derive(Debug, Serialize)]
pub struct ClassDetailsResponse {
    pub success: bool,
    pub statistics: ClassStatistics,
    pub recent: Vec<DetectionRecord>,
}

/// Aggregate and latest detections of one class; 404 when never seen
pub async fn get_class_details(
    State(state): State<SharedState>,
    Path(class_name): Path<String>,
) -> ApiResult<Json<ClassDetailsResponse>> {
    let statistics = state.repository.class_details(&class_name).map_err(|e| match e {
        StorageError::NotFound => ApiError::NotFound(format!("No detections of class {}", class_name)),
        other => other.into(),
    })?;

    Ok(Json(ClassDetailsResponse {
        success: true,
        recent: state.repository.detections_by_class(&class_name, 20)?,
        statistics,
    }))
}

#[derive(Debug, Deserialize)]
pub struct HighConfidenceQuery {
    #[serde(default = "default_min_conf")]
    pub min_conf: f64,
    #[serde(default = "default_high_confidence_limit")]
    pub limit: usize,
}

pub async fn get_high_confidence_detections(
    State(state): State<SharedState>,
    Query(params): Query<HighConfidenceQuery>,
) -> ApiResult<Json<DetectionListResponse>> {
    let min_confidence = check_confidence(params.min_conf)?;
    let detections = state
        .repository
        .high_confidence_detections(min_confidence, params.limit)?;

    let mut response = DetectionListResponse::new(detections);
    response.min_confidence = Some(min_confidence);
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct FilterRequest {
    /// Defaults to the detector's confidence threshold
    pub min_confidence: Option<f64>,
    pub classes: Option<Vec<String>>,
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

/// Filter the most recent logged detections
///
/// Looks at twice `limit` of the newest records so a selective filter still
/// has something to return.
pub async fn filter_detections(
    State(state): State<SharedState>,
    Json(request): Json<FilterRequest>,
) -> ApiResult<Json<DetectionListResponse>> {
    let min_confidence = match request.min_confidence {
        Some(value) => check_confidence(value)?,
        None => state.detector.config().confidence_threshold as f64,
    };

    let matching: Vec<DetectionRecord> = state
        .repository
        .recent_detections(request.limit.saturating_mul(2))?
        .into_iter()
        .filter(|r| r.confidence >= min_confidence)
        .filter(|r| {
            request
                .classes
                .as_ref()
                .map_or(true, |classes| classes.is_empty() || classes.contains(&r.class_name))
        })
        .collect();

    let total = matching.len();
    let mut response = DetectionListResponse::new(matching.into_iter().take(request.limit).collect());
    response.total = total;
    Ok(Json(response))
}
