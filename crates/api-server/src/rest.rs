//! REST handlers for dashboard aggregation, bidding-target changes, CPC
//! history and operational probes.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::Json;
use campaign_core::error::CampaignError;
use campaign_core::types::{DashboardFilters, DelegatedCredential, HourlyCpc, TargetChange, TrendResult};
use campaign_engine::{AggregateOutcome, DashboardService, DashboardSnapshot, MutationReceipt};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

const DEFAULT_HISTORY_HOURS: i64 = 24;

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<DashboardService>,
    pub node_id: String,
    pub start_time: Instant,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryParams {
    /// Hours of history to return (default 24).
    pub hours: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordSampleRequest {
    pub campaign_id: String,
    pub account_id: String,
    pub cpc: f64,
    pub cost: f64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordSampleResponse {
    pub ok: bool,
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrendsResponse {
    pub trends: BTreeMap<String, TrendResult>,
    pub generated_at: DateTime<Utc>,
}

/// Map the error taxonomy onto HTTP.
pub fn error_status(e: &CampaignError) -> StatusCode {
    match e {
        CampaignError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
        CampaignError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        CampaignError::UnsupportedStrategy(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CampaignError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        CampaignError::UpstreamRejected(_) => StatusCode::BAD_GATEWAY,
        CampaignError::NotFound(_) => StatusCode::NOT_FOUND,
        CampaignError::Persistence(_)
        | CampaignError::Config(_)
        | CampaignError::Serialization(_)
        | CampaignError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(e: CampaignError) -> ApiError {
    let status = error_status(&e);
    metrics::counter!("api.errors", "kind" => e.kind()).increment(1);
    let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!(error = %e, "Request failed");
        "Internal processing error".to_string()
    } else {
        warn!(error = %e, status = status.as_u16(), "Request rejected");
        e.to_string()
    };
    (
        status,
        Json(ErrorResponse {
            error: e.kind().to_string(),
            message,
        }),
    )
}

fn bad_request(message: String) -> ApiError {
    api_error(CampaignError::InvalidRequest(message))
}

/// The operator's delegated credential from `Authorization: Bearer <token>`.
pub fn bearer_credential(headers: &HeaderMap) -> Option<DelegatedCredential> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    DelegatedCredential::new(token.trim())
}

/// POST /v1/campaigns/aggregate: Run one aggregation cycle.
#[utoipa::path(
    post,
    path = "/v1/campaigns/aggregate",
    tag = "Campaigns",
    request_body = DashboardFilters,
    responses(
        (status = 200, description = "Campaigns and per-date points", body = AggregateOutcome),
        (status = 400, description = "Malformed filters", body = ErrorResponse),
        (status = 401, description = "No delegated credential", body = ErrorResponse),
        (status = 503, description = "Every account failed", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn handle_aggregate(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<DashboardFilters>, JsonRejection>,
) -> Result<Json<AggregateOutcome>, ApiError> {
    let Json(filters) = payload.map_err(|e| bad_request(e.body_text()))?;
    let credential = bearer_credential(&headers);
    metrics::counter!("api.aggregate.requests").increment(1);

    state
        .service
        .refresh(credential.as_ref(), filters)
        .await
        .map(Json)
        .map_err(api_error)
}

/// GET /v1/campaigns/snapshot: Latest published aggregation.
#[utoipa::path(
    get,
    path = "/v1/campaigns/snapshot",
    tag = "Campaigns",
    responses(
        (status = 200, description = "Most recent published cycle", body = DashboardSnapshot),
        (status = 404, description = "No cycle has completed", body = ErrorResponse),
    )
)]
pub async fn handle_snapshot(State(state): State<AppState>) -> Result<Json<DashboardSnapshot>, ApiError> {
    state
        .service
        .snapshot()
        .map(|snapshot| Json(snapshot.as_ref().clone()))
        .map_err(api_error)
}

/// POST /v1/campaigns/target: Change a campaign's CPA or ROAS target.
#[utoipa::path(
    post,
    path = "/v1/campaigns/target",
    tag = "Campaigns",
    request_body = TargetChange,
    responses(
        (status = 200, description = "Change accepted by the platform", body = MutationReceipt),
        (status = 400, description = "Missing or non-numeric fields", body = ErrorResponse),
        (status = 401, description = "No delegated credential", body = ErrorResponse),
        (status = 404, description = "Campaign unknown to the platform", body = ErrorResponse),
        (status = 422, description = "Strategy does not accept this target", body = ErrorResponse),
        (status = 502, description = "Platform rejected the change", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn handle_target(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<TargetChange>, JsonRejection>,
) -> Result<Json<MutationReceipt>, ApiError> {
    let Json(change) = payload.map_err(|e| bad_request(e.body_text()))?;
    let credential = bearer_credential(&headers);

    state
        .service
        .apply_target(credential.as_ref(), change)
        .await
        .map(Json)
        .map_err(api_error)
}

/// GET /v1/campaigns/{campaign_id}/cpc-history: Hourly CPC averages, newest first.
#[utoipa::path(
    get,
    path = "/v1/campaigns/{campaign_id}/cpc-history",
    tag = "History",
    params(
        ("campaign_id" = String, Path, description = "Platform campaign id"),
        HistoryParams,
    ),
    responses(
        (status = 200, description = "Hourly buckets", body = Vec<HourlyCpc>),
        (status = 400, description = "Invalid hours", body = ErrorResponse),
    )
)]
pub async fn handle_cpc_history(
    State(state): State<AppState>,
    Path(campaign_id): Path<String>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> Result<Json<Vec<HourlyCpc>>, ApiError> {
    let Query(params) = params.map_err(|e| bad_request(e.body_text()))?;
    let hours = params.hours.unwrap_or(DEFAULT_HISTORY_HOURS);

    state
        .service
        .cpc_history(&campaign_id, hours)
        .await
        .map(Json)
        .map_err(api_error)
}

/// POST /v1/campaigns/cpc-history: Record one CPC sample.
#[utoipa::path(
    post,
    path = "/v1/campaigns/cpc-history",
    tag = "History",
    request_body = RecordSampleRequest,
    responses(
        (status = 200, description = "Sample stored", body = RecordSampleResponse),
        (status = 400, description = "Malformed sample", body = ErrorResponse),
        (status = 500, description = "History store unavailable", body = ErrorResponse),
    )
)]
pub async fn handle_record_sample(
    State(state): State<AppState>,
    payload: Result<Json<RecordSampleRequest>, JsonRejection>,
) -> Result<Json<RecordSampleResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| bad_request(e.body_text()))?;
    let sample = state
        .service
        .record_sample(request.campaign_id, request.account_id, request.cpc, request.cost)
        .await
        .map_err(api_error)?;

    Ok(Json(RecordSampleResponse {
        ok: true,
        id: sample.id,
        timestamp: sample.timestamp,
    }))
}

/// GET /v1/campaigns/trends: Current trend of every recently sampled campaign.
#[utoipa::path(
    get,
    path = "/v1/campaigns/trends",
    tag = "History",
    responses(
        (status = 200, description = "Trends keyed by campaign id", body = TrendsResponse),
    )
)]
pub async fn handle_trends(State(state): State<AppState>) -> Result<Json<TrendsResponse>, ApiError> {
    let trends = state.service.active_trends().await.map_err(api_error)?;
    Ok(Json(TrendsResponse {
        trends: trends.into_iter().map(|t| (t.campaign_id, t.trend)).collect(),
        generated_at: Utc::now(),
    }))
}

/// GET /health: Health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Operations",
    responses((status = 200, description = "Service healthy", body = HealthResponse))
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /ready: Readiness probe.
#[utoipa::path(
    get,
    path = "/ready",
    tag = "Operations",
    responses((status = 200, description = "Ready to serve traffic"))
)]
pub async fn readiness() -> StatusCode {
    StatusCode::OK
}

/// GET /live: Liveness probe.
#[utoipa::path(
    get,
    path = "/live",
    tag = "Operations",
    responses((status = 200, description = "Process alive"))
)]
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}
