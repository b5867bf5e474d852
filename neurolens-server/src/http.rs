//! Neurolens HTTP REST API
//!
//! Axum server running alongside the Unix socket IPC server (port 8767 by default).
//! Each endpoint is a thin handler over an `*_inner` function that builds the IPC
//! request and runs it through the shared router, so both front ends behave the same.
//!
//! Endpoints:
//! - GET    /health                              : storage and capability status
//! - GET    /version                             : server version info
//! - POST   /analyze                             : features for one transcript
//! - GET    /subjects                            : every tracked subject
//! - POST   /subjects/:subject/observations      : extract and record an observation
//! - GET    /subjects/:subject/drift             : percent change against baseline
//! - GET    /subjects/:subject/history?limit=N   : most recent history records
//! - GET    /subjects/:subject/trend/:field      : one field across history
//! - GET    /subjects/:subject/confidence/:field : bootstrap interval of a field's mean
//! - DELETE /subjects/:subject/baseline          : reset the baseline

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use neurolens_core::ipc::{NeurolensRequest, PROTOCOL_VERSION};
use neurolens_core::transcript::segments_from_json;
use neurolens_core::{FeatureField, NeurolensError};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::router::{dispatch, AppState};

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/analyze", post(analyze_handler))
        .route("/subjects", get(subjects_handler))
        .route("/subjects/:subject/observations", post(observe_handler))
        .route("/subjects/:subject/drift", get(drift_handler))
        .route("/subjects/:subject/history", get(history_handler))
        .route("/subjects/:subject/trend/:field", get(trend_handler))
        .route("/subjects/:subject/confidence/:field", get(confidence_handler))
        .route("/subjects/:subject/baseline", delete(reset_baseline_handler))
        .with_state(state)
}

/// Serve until the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: Arc<AppState>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", state.config.http.host, state.config.http.port);
    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Neurolens HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request DTOs
// ============================================================================

/// Segments as `{"segments": [...]}`; times are read leniently.
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub segments: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct ObservationRequest {
    #[serde(default)]
    pub segments: serde_json::Value,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, Default)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ConfidenceQuery {
    pub iterations: Option<usize>,
    pub alpha: Option<f64>,
    pub seed: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: String,
}

impl ErrorResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            error: msg.into(),
            status: "error".to_string(),
        }
    }
}

// ============================================================================
// Inner (directly testable) functions
// ============================================================================

/// NoBaseline → 404, InvalidInput → 400, anything else → 500.
pub fn status_for(err: &NeurolensError) -> StatusCode {
    match err {
        NeurolensError::NoBaseline { .. } => StatusCode::NOT_FOUND,
        NeurolensError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn run(state: &AppState, request: NeurolensRequest) -> (StatusCode, serde_json::Value) {
    match dispatch(request, state).await {
        Ok(data) => (StatusCode::OK, data),
        Err(e) => {
            let status = status_for(&e);
            if status.is_server_error() {
                tracing::error!(error = %e, "HTTP request failed");
            }
            (status, serde_json::json!(ErrorResponse::new(e.to_string())))
        }
    }
}

pub async fn health_inner(state: &AppState) -> (StatusCode, serde_json::Value) {
    match dispatch(NeurolensRequest::Health, state).await {
        Ok(mut data) => {
            data["socket"] = serde_json::json!(state.config.service.resolved_socket_path());
            (StatusCode::OK, data)
        }
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({
                "status": "unhealthy",
                "error": e.to_string(),
            }),
        ),
    }
}

pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": PROTOCOL_VERSION,
    })
}

pub async fn analyze_inner(state: &AppState, req: AnalyzeRequest) -> (StatusCode, serde_json::Value) {
    let segments = segments_from_json(&req.segments);
    let start = Instant::now();
    let (status, mut body) = run(state, NeurolensRequest::Analyze { segments }).await;
    if let Some(obj) = body.as_object_mut().filter(|_| status == StatusCode::OK) {
        obj.insert(
            "took_ms".to_string(),
            serde_json::json!(start.elapsed().as_millis() as u64),
        );
    }
    (status, body)
}

pub async fn observe_inner(
    state: &AppState,
    subject: String,
    req: ObservationRequest,
) -> (StatusCode, serde_json::Value) {
    let segments = segments_from_json(&req.segments);
    run(
        state,
        NeurolensRequest::Observe {
            subject,
            segments,
            date: req.date,
        },
    )
    .await
}

pub async fn subjects_inner(state: &AppState) -> (StatusCode, serde_json::Value) {
    run(state, NeurolensRequest::Subjects).await
}

pub async fn drift_inner(state: &AppState, subject: String) -> (StatusCode, serde_json::Value) {
    run(state, NeurolensRequest::DriftReport { subject }).await
}

pub async fn history_inner(
    state: &AppState,
    subject: String,
    query: HistoryQuery,
) -> (StatusCode, serde_json::Value) {
    run(
        state,
        NeurolensRequest::History {
            subject,
            limit: query.limit,
        },
    )
    .await
}

pub async fn trend_inner(
    state: &AppState,
    subject: String,
    field: &str,
) -> (StatusCode, serde_json::Value) {
    let field: FeatureField = match field.parse() {
        Ok(f) => f,
        Err(e) => return (status_for(&e), serde_json::json!(ErrorResponse::new(e.to_string()))),
    };
    run(state, NeurolensRequest::Trend { subject, field }).await
}

pub async fn confidence_inner(
    state: &AppState,
    subject: String,
    field: &str,
    query: ConfidenceQuery,
) -> (StatusCode, serde_json::Value) {
    let field: FeatureField = match field.parse() {
        Ok(f) => f,
        Err(e) => return (status_for(&e), serde_json::json!(ErrorResponse::new(e.to_string()))),
    };
    run(
        state,
        NeurolensRequest::ConfidenceInterval {
            subject,
            field,
            iterations: query.iterations,
            alpha: query.alpha,
            seed: query.seed,
        },
    )
    .await
}

pub async fn reset_baseline_inner(
    state: &AppState,
    subject: String,
) -> (StatusCode, serde_json::Value) {
    run(state, NeurolensRequest::ResetBaseline { subject }).await
}

// ============================================================================
// Axum handler wrappers (thin, delegating to inner functions)
// ============================================================================

pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn analyze_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AnalyzeRequest>,
) -> impl IntoResponse {
    let (status, body) = analyze_inner(&state, req).await;
    (status, Json(body))
}

pub async fn subjects_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, body) = subjects_inner(&state).await;
    (status, Json(body))
}

pub async fn observe_handler(
    State(state): State<Arc<AppState>>,
    Path(subject): Path<String>,
    Json(req): Json<ObservationRequest>,
) -> impl IntoResponse {
    let (status, body) = observe_inner(&state, subject, req).await;
    (status, Json(body))
}

pub async fn drift_handler(
    State(state): State<Arc<AppState>>,
    Path(subject): Path<String>,
) -> impl IntoResponse {
    let (status, body) = drift_inner(&state, subject).await;
    (status, Json(body))
}

pub async fn history_handler(
    State(state): State<Arc<AppState>>,
    Path(subject): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    let (status, body) = history_inner(&state, subject, query).await;
    (status, Json(body))
}

pub async fn trend_handler(
    State(state): State<Arc<AppState>>,
    Path((subject, field)): Path<(String, String)>,
) -> impl IntoResponse {
    let (status, body) = trend_inner(&state, subject, &field).await;
    (status, Json(body))
}

pub async fn confidence_handler(
    State(state): State<Arc<AppState>>,
    Path((subject, field)): Path<(String, String)>,
    Query(query): Query<ConfidenceQuery>,
) -> impl IntoResponse {
    let (status, body) = confidence_inner(&state, subject, &field, query).await;
    (status, Json(body))
}

pub async fn reset_baseline_handler(
    State(state): State<Arc<AppState>>,
    Path(subject): Path<String>,
) -> impl IntoResponse {
    let (status, body) = reset_baseline_inner(&state, subject).await;
    (status, Json(body))
}
