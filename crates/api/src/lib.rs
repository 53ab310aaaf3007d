//! Detection Pipeline API Server
//!
//! HTTP surface over the detection pipeline: start/stop of the live source,
//! the MJPEG feed, statistics, history queries, and one-shot detection.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use detection::ObjectDetector;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use pipeline::{BatchProcessor, PipelineContext, PipelineController, RunPhase, RunStateView};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use storage::Repository;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

pub mod config;
pub mod error;
mod routes;

pub use config::{AppConfig, ServerConfig};
pub use error::{ApiError, ApiResult};

/// Application state shared across handlers
///
/// Every member synchronizes itself, so handlers share it through a plain `Arc`.
pub struct AppState {
    pub config: AppConfig,
    pub detector: Arc<ObjectDetector>,
    pub repository: Arc<Repository>,
    pub controller: Arc<PipelineController>,
    pub batch: Arc<BatchProcessor>,
    /// Prometheus renderer; absent when no recorder was installed
    pub metrics: Option<PrometheusHandle>,
    pub version: String,
    pub start_time: Instant,
    shutdown: watch::Sender<bool>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Build the detector named by the configuration and wire everything around it
    pub fn new(config: AppConfig) -> Result<Self, ApiError> {
        let detector = ObjectDetector::new(config.detector.clone())?;
        Ok(Self::with_detector(config, detector))
    }

    pub fn with_detector(config: AppConfig, detector: ObjectDetector) -> Self {
        let detector = Arc::new(detector);
        let repository = Arc::new(Repository::with_retention(config.retention.clone()));
        let context = PipelineContext::new(
            detector.clone(),
            repository.clone(),
            config.pipeline.clone(),
            config.alerts.clone(),
        );

        Self {
            controller: Arc::new(PipelineController::new(context)),
            batch: Arc::new(BatchProcessor::new(detector.clone(), repository.clone())),
            detector,
            repository,
            metrics: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Instant::now(),
            shutdown: watch::channel(false).0,
            config,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// End open video feeds so graceful shutdown can complete
    pub fn begin_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub backend: String,
    pub pipeline: RunStateView,
    pub detections_logged: usize,
    pub alerts_logged: usize,
}

/// Create the application router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/video_feed", get(routes::camera::video_feed))
        .route("/start_camera", post(routes::camera::start_camera))
        .route("/stop_camera", post(routes::camera::stop_camera))
        .route("/get_stats", get(routes::stats::get_stats))
        .route("/get_performance_metrics", get(routes::stats::get_performance_metrics))
        .route("/get_analytics", get(routes::stats::get_analytics))
        .route("/reset_statistics", post(routes::stats::reset_statistics))
        .route("/get_alerts", get(routes::history::get_alerts))
        .route("/get_detection_history", get(routes::history::get_detection_history))
        .route("/get_class_details/:class_name", get(routes::history::get_class_details))
        .route(
            "/get_high_confidence_detections",
            get(routes::history::get_high_confidence_detections),
        )
        .route("/filter_detections", post(routes::history::filter_detections))
        .route("/mobile/detect_image", post(routes::detect::detect_image))
        .route("/mobile/detect_camera", post(routes::detect::detect_camera))
        .route("/mobile/stream_camera", get(routes::camera::stream_camera))
        .route("/mobile/batch_detect", post(routes::detect::batch_detect))
        .route("/mobile/detect_video", post(routes::detect::detect_video))
        .route("/mobile/batch_progress", get(routes::detect::batch_progress))
        .route("/mobile/stats", get(routes::stats::mobile_stats))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    let pipeline = state.controller.snapshot();
    let status = if pipeline.phase == RunPhase::Faulted { "degraded" } else { "healthy" };

    Json(HealthResponse {
        status: status.to_string(),
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        backend: state.detector.backend_name().to_string(),
        pipeline,
        detections_logged: state.repository.detection_count(),
        alerts_logged: state.repository.alert_count(),
    })
}

/// Prometheus text exposition
async fn metrics_handler(State(state): State<SharedState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

/// Initialize logging at `level` (falls back to INFO when unparseable)
pub fn init_logging(level: &str) -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    let level = level.parse::<Level>().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
}

/// Install the global Prometheus recorder
pub fn init_metrics() -> Result<PrometheusHandle, ApiError> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ApiError::internal(format!("Failed to install Prometheus recorder: {}", e)))
}

/// Run the server until Ctrl-C, then stop the pipeline
pub async fn run_server(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = config.server.addr();
    let state = Arc::new(AppState::new(config)?.with_metrics(init_metrics()?));
    let app = create_router(state.clone());

    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let draining = state.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            ctrl_c().await;
            draining.begin_shutdown();
        })
        .await?;

    let controller = state.controller.clone();
    tokio::task::spawn_blocking(move || controller.stop()).await?;
    info!("API server stopped");

    Ok(())
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
}
