//! Statistics, performance, and analytics

use crate::{ApiResult, SharedState};
use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use pipeline::RunStateView;
use serde::Serialize;
use stats_engine::{PerformanceMetrics, Statistics};
use storage::{ClassStatistics, DetectionRecord};
use tracing::info;

/// Recent detections included in the dashboard statistics
const STATS_RECENT_DETECTIONS: usize = 50;

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub current_fps: f64,
    /// Objects in the latest frame
    pub total_objects: usize,
    /// Distinct classes in the latest frame
    pub unique_classes: usize,
    pub class_distribution: Vec<ClassStatistics>,
    pub recent_detections: Vec<DetectionRecord>,
    pub detector_stats: Statistics,
    pub run_state: RunStateView,
    pub timestamp: DateTime<Utc>,
}

pub async fn get_stats(State(state): State<SharedState>) -> ApiResult<Json<StatsResponse>> {
    let run_state = state.controller.snapshot();
    let detector_stats = state.detector.statistics();

    Ok(Json(StatsResponse {
        current_fps: (run_state.current_fps * 100.0).round() / 100.0,
        total_objects: run_state.current_objects(),
        unique_classes: run_state.current_classes(),
        class_distribution: state.repository.class_statistics()?,
        recent_detections: state.repository.recent_detections(STATS_RECENT_DETECTIONS)?,
        detector_stats,
        run_state,
        timestamp: Utc::now(),
    }))
}

#[derive(Debug, Serialize)]
pub struct PerformanceResponse {
    pub success: bool,
    pub metrics: PerformanceMetrics,
}

pub async fn get_performance_metrics(State(state): State<SharedState>) -> Json<PerformanceResponse> {
    Json(PerformanceResponse {
        success: true,
        metrics: state.detector.performance_metrics(),
    })
}

#[derive(Debug, Serialize)]
pub struct AnalyticsSummary {
    pub total_detections: usize,
    pub unique_classes: usize,
    /// Mean of the per-class average confidences
    pub average_confidence: f64,
}

#[derive(Debug, Serialize)]
pub struct AnalyticsResponse {
    pub summary: AnalyticsSummary,
    pub performance: PerformanceMetrics,
    pub detector_stats: Statistics,
    pub class_distribution: Vec<ClassStatistics>,
    pub timestamp: DateTime<Utc>,
}

pub async fn get_analytics(State(state): State<SharedState>) -> ApiResult<Json<AnalyticsResponse>> {
    let class_distribution = state.repository.class_statistics()?;
    let average_confidence = if class_distribution.is_empty() {
        0.0
    } else {
        class_distribution.iter().map(|c| c.avg_confidence).sum::<f64>() / class_distribution.len() as f64
    };

    Ok(Json(AnalyticsResponse {
        summary: AnalyticsSummary {
            total_detections: class_distribution.iter().map(|c| c.count).sum(),
            unique_classes: class_distribution.len(),
            average_confidence,
        },
        performance: state.detector.performance_metrics(),
        detector_stats: state.detector.statistics(),
        class_distribution,
        timestamp: Utc::now(),
    }))
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub success: bool,
    pub message: String,
}

pub async fn reset_statistics(State(state): State<SharedState>) -> Json<ResetResponse> {
    state.detector.reset_statistics();
    info!("Detector statistics reset");
    Json(ResetResponse {
        success: true,
        message: "Statistics reset".to_string(),
    })
}

#[derive(Debug, Serialize)]
pub struct MobileStatsResponse {
    pub success: bool,
    pub current_fps: f64,
    pub current_objects: usize,
    pub unique_classes: usize,
    pub detector_stats: Statistics,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

pub async fn mobile_stats(State(state): State<SharedState>) -> Json<MobileStatsResponse> {
    let run_state = state.controller.snapshot();
    Json(MobileStatsResponse {
        success: true,
        current_fps: run_state.current_fps,
        current_objects: run_state.current_objects(),
        unique_classes: run_state.current_classes(),
        detector_stats: state.detector.statistics(),
        timestamp: Utc::now().timestamp_millis(),
    })
}
