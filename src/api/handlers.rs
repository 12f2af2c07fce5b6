use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::alerts::{
    CheckReport, Decision, MetricSource, ObservationSnapshot, WarnMetricJob, WarnMetricService,
};
use crate::error::WarnMetricError;
use crate::metrics::{Observation, SendWarnMetricAck, WarnMetricStatus};

/// Application state shared across handlers
pub struct AppState {
    pub service: Arc<WarnMetricService>,
    pub snapshot: Arc<ObservationSnapshot>,
    pub job: Option<Arc<WarnMetricJob>>,
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub job_running: bool,
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        job_running: state.job.as_ref().map(|j| j.is_running()).unwrap_or(false),
    })
}

// ============================================================================
// Status
// ============================================================================

pub async fn pending_statuses(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HashMap<String, WarnMetricStatus>>, ApiError> {
    Ok(Json(state.service.pending_statuses()?))
}

pub async fn metric_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<WarnMetricStatus>, ApiError> {
    Ok(Json(state.service.status(&id)?))
}

// ============================================================================
// Evaluate
// ============================================================================

#[derive(Deserialize)]
pub struct EvaluateRequest {
    pub value: Observation,
}

pub async fn evaluate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<EvaluateRequest>,
) -> Result<Json<CheckReport>, ApiError> {
    state.service.validate(&id, request.value)?;
    state.snapshot.record([(id.clone(), request.value)]);

    let report = state.service.evaluate_and_notify(&id, request.value).await?;
    Ok(Json(report))
}

// ============================================================================
// Acknowledge
// ============================================================================

pub async fn acknowledge(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Option<Json<SendWarnMetricAck>>,
) -> Result<Json<WarnMetricStatus>, ApiError> {
    let ack = body.map(|Json(ack)| ack).unwrap_or_default();
    let status = state.service.acknowledge(&id, ack.force_ack).await?;
    Ok(Json(status))
}

// ============================================================================
// Check cycles
// ============================================================================

#[derive(Serialize)]
pub struct CheckResponse {
    pub checked: usize,
    pub fired: usize,
    pub reports: Vec<CheckReport>,
}

impl From<Vec<CheckReport>> for CheckResponse {
    fn from(reports: Vec<CheckReport>) -> Self {
        Self {
            checked: reports.len(),
            fired: reports
                .iter()
                .filter(|r| r.decision == Some(Decision::Fire))
                .count(),
            reports,
        }
    }
}

/// Record observations and evaluate the full snapshot right away.
///
/// Nothing is recorded unless every value is valid.
pub async fn record_observations(
    State(state): State<Arc<AppState>>,
    Json(values): Json<HashMap<String, Observation>>,
) -> Result<Json<CheckResponse>, ApiError> {
    for (id, observed) in &values {
        state.service.validate(id, *observed)?;
    }

    state.snapshot.record(values);
    let reports = state
        .service
        .run_checks(&state.snapshot.observations())
        .await;
    Ok(Json(reports.into()))
}

/// Run a check cycle now, ignoring the job wait time
pub async fn run_now(State(state): State<Arc<AppState>>) -> Json<CheckResponse> {
    let reports = match &state.job {
        Some(job) => job.run_now().await,
        None => {
            state
                .service
                .run_checks(&state.snapshot.observations())
                .await
        }
    };
    Json(reports.into())
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    BadGateway(String),
    Unavailable(String),
    Internal(String),
}

impl From<WarnMetricError> for ApiError {
    fn from(err: WarnMetricError) -> Self {
        let message = err.to_string();
        match err {
            WarnMetricError::UnknownMetric(_) => ApiError::NotFound(message),
            WarnMetricError::NotFired(_) => ApiError::Conflict(message),
            WarnMetricError::InvalidObservation { .. } => ApiError::BadRequest(message),
            WarnMetricError::StoreUnavailable(_) => ApiError::Unavailable(message),
            WarnMetricError::DispatchFailed(_) => ApiError::BadGateway(message),
            WarnMetricError::Corrupt { .. } => ApiError::Internal(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
