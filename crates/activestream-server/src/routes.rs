//! HTTP routes and handlers

use crate::pipeline::PipelineHandle;
use crate::websocket;
use activestream_core::Keyword;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;

/// Shared state for every handler
#[derive(Clone)]
pub struct AppState {
    pub pipeline: PipelineHandle,
    /// Absent when no recorder is installed
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(pipeline: PipelineHandle) -> Self {
        Self {
            pipeline,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/status", get(status))
        .route("/stats", get(stats))
        .route("/keywords", get(keywords));

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .nest("/api", api_routes)
        .route("/ws", get(websocket::websocket_handler))
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": if state.pipeline.stop.is_cancelled() { "stopping" } else { "ok" },
        "model_version": state.pipeline.stats.model_version(),
        "vocabulary_size": state.pipeline.vocabulary.size(),
    }))
}

async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}

/// Latest status report, once the monitor has produced one
async fn status(State(state): State<AppState>) -> Response {
    match state.pipeline.board.latest() {
        Some(report) => Json(report).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.pipeline.stats.snapshot();
    let confusion = state.pipeline.confusion.snapshot();
    Json(json!({
        "pipeline": snapshot,
        "filter_rate": snapshot.filter_rate(),
        "evaluation": {
            "true_positive": confusion.true_positive,
            "false_positive": confusion.false_positive,
            "true_negative": confusion.true_negative,
            "false_negative": confusion.false_negative,
            "precision": confusion.precision(),
            "recall": confusion.recall(),
            "f1": confusion.f1(),
        },
    }))
}

/// Every keyword ever tracked with its history and verdict counts
async fn keywords(State(state): State<AppState>) -> Json<Vec<Keyword>> {
    Json(state.pipeline.keywords.read().iter().cloned().collect())
}
