//! HTTP handlers for the submission and read API (§6).
//!
//! One `#[utoipa::path(...)]`-annotated `async fn` per route, query
//! params as a `Deserialize + IntoParams` struct, responses as
//! `Serialize + ToSchema` DTOs distinct from the Ledger's own row types
//! (§9: explicit request/response types validated at the boundary).

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use chrono::{DateTime, Utc};
use resynth_core::models::RequestStatus;
use resynth_core::Request;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::state::AppState;

const MAX_LISTING_LIMIT: i64 = 100;

#[derive(Debug, Deserialize, ToSchema)]
pub struct AnalyzeRequest {
    pub topic: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AnalyzeResponse {
    pub request_id: Uuid,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

fn bad_request(message: impl Into<String>) -> axum::response::Response {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: message.into() })).into_response()
}

fn not_found(message: impl Into<String>) -> axum::response::Response {
    (StatusCode::NOT_FOUND, Json(ErrorResponse { error: message.into() })).into_response()
}

/// `POST /analyze` (§4.3): insert pending, publish the search task,
/// transition to `searching`. If publish fails the request is left
/// `pending` — there is no retry loop here.
#[utoipa::path(
    post,
    path = "/analyze",
    request_body = AnalyzeRequest,
    responses(
        (status = 200, description = "Request accepted", body = AnalyzeResponse),
        (status = 400, description = "Malformed body"),
    ),
    tag = "Intake",
)]
pub async fn submit_analysis(
    State(state): State<AppState>,
    Json(body): Json<AnalyzeRequest>,
) -> impl IntoResponse {
    if body.topic.trim().is_empty() {
        return bad_request("topic must not be empty");
    }

    let request = match state.ledger.create_request(&body.topic).await {
        Ok(request) => request,
        Err(e) => {
            tracing::error!(error = %e, "failed to create request");
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse { error: e.to_string() }))
                .into_response();
        }
    };

    #[derive(Serialize)]
    struct SearchTask {
        request_id: Uuid,
        topic: String,
    }

    match state
        .producer
        .publish(&state.search_topic, &SearchTask { request_id: request.id, topic: body.topic.clone() })
        .await
    {
        Ok(()) => {
            if let Err(e) = state.ledger.mark_searching(request.id).await {
                tracing::error!(request_id = %request.id, error = %e, "failed to mark request searching");
            }
            Json(AnalyzeResponse {
                request_id: request.id,
                status: RequestStatus::Searching.as_str().to_string(),
                message: "Request accepted for processing".to_string(),
            })
            .into_response()
        }
        Err(e) => {
            tracing::error!(request_id = %request.id, error = %e, "failed to publish search task");
            Json(AnalyzeResponse {
                request_id: request.id,
                status: RequestStatus::Pending.as_str().to_string(),
                message: "Request recorded but could not be queued".to_string(),
            })
            .into_response()
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    pub request_id: Uuid,
    pub topic: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub search_results_count: i64,
    pub summary: Option<String>,
    pub inference_time_ms: Option<i32>,
}

/// `GET /status/{request_id}`. `search_results_count` and the analysis
/// projection are explicit SELECTs (§9), never in-memory relationship
/// fields on `Request`.
#[utoipa::path(
    get,
    path = "/status/{request_id}",
    params(("request_id" = Uuid, Path, description = "Request identifier")),
    responses(
        (status = 200, description = "Request status", body = StatusResponse),
        (status = 404, description = "Unknown request"),
    ),
    tag = "Intake",
)]
pub async fn get_status(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
) -> impl IntoResponse {
    let request = match state.ledger.get_request(request_id).await {
        Ok(Some(request)) => request,
        Ok(None) => return not_found(format!("no request with id {request_id}")),
        Err(e) => {
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse { error: e.to_string() }))
                .into_response()
        }
    };

    match build_status_response(&state, request).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => {
            (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse { error: e.to_string() })).into_response()
        }
    }
}

async fn build_status_response(
    state: &AppState,
    request: Request,
) -> Result<StatusResponse, resynth_core::LedgerError> {
    let search_results_count = state.ledger.list_search_results(request.id).await?.len() as i64;
    let analysis = state.ledger.get_analysis_result(request.id).await?;

    Ok(StatusResponse {
        request_id: request.id,
        topic: request.topic,
        status: request.status,
        created_at: request.created_at,
        updated_at: request.updated_at,
        completed_at: request.completed_at,
        error_message: request.error_message,
        search_results_count,
        summary: analysis.as_ref().map(|a| a.summary.clone()),
        inference_time_ms: analysis.as_ref().and_then(|a| a.inference_time_ms),
    })
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListRequestsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ListRequestsResponse {
    pub items: Vec<StatusResponse>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// `GET /api/requests?status=&limit=&offset=`. `limit` is clamped to
/// `MAX_LISTING_LIMIT`; `status=all` or absent disables the filter.
#[utoipa::path(
    get,
    path = "/api/requests",
    params(ListRequestsQuery),
    responses((status = 200, description = "Paged request listing", body = ListRequestsResponse)),
    tag = "Requests",
)]
pub async fn list_requests(
    State(state): State<AppState>,
    Query(params): Query<ListRequestsQuery>,
) -> impl IntoResponse {
    let limit = params.limit.unwrap_or(20).clamp(1, MAX_LISTING_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let status_filter = match params.status.as_deref() {
        None | Some("all") | Some("") => None,
        Some(other) => match RequestStatus::from_str(other) {
            Some(status) => Some(status),
            None => return bad_request(format!("unknown status \"{other}\"")),
        },
    };

    let (requests, total) = match state.ledger.list_requests(status_filter, limit, offset).await {
        Ok(result) => result,
        Err(e) => {
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse { error: e.to_string() }))
                .into_response()
        }
    };

    let mut items = Vec::with_capacity(requests.len());
    for request in requests {
        match build_status_response(&state, request).await {
            Ok(response) => items.push(response),
            Err(e) => {
                return (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse { error: e.to_string() }))
                    .into_response()
            }
        }
    }

    Json(ListRequestsResponse { items, total, limit, offset }).into_response()
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SearchResultDto {
    pub id: i32,
    pub url: String,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<resynth_core::SearchResult> for SearchResultDto {
    fn from(row: resynth_core::SearchResult) -> Self {
        Self { id: row.id, url: row.url, title: row.title, content: row.content, created_at: row.created_at }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AnalysisResultDto {
    pub summary: String,
    pub tokens_used: Option<i32>,
    pub inference_time_ms: Option<i32>,
    pub created_at: DateTime<Utc>,
}

impl From<resynth_core::AnalysisResult> for AnalysisResultDto {
    fn from(row: resynth_core::AnalysisResult) -> Self {
        Self {
            summary: row.summary,
            tokens_used: row.tokens_used,
            inference_time_ms: row.inference_time_ms,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RequestDetailResponse {
    pub request_id: Uuid,
    pub topic: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub search_results: Vec<SearchResultDto>,
    pub analysis_result: Option<AnalysisResultDto>,
}

/// `GET /api/requests/{request_id}` — full projection including every
/// SearchResult and the AnalysisResult, each fetched by its own SELECT.
#[utoipa::path(
    get,
    path = "/api/requests/{request_id}",
    params(("request_id" = Uuid, Path, description = "Request identifier")),
    responses(
        (status = 200, description = "Full request projection", body = RequestDetailResponse),
        (status = 404, description = "Unknown request"),
    ),
    tag = "Requests",
)]
pub async fn get_request_detail(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
) -> impl IntoResponse {
    let request = match state.ledger.get_request(request_id).await {
        Ok(Some(request)) => request,
        Ok(None) => return not_found(format!("no request with id {request_id}")),
        Err(e) => {
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse { error: e.to_string() }))
                .into_response()
        }
    };

    let search_results = match state.ledger.list_search_results(request_id).await {
        Ok(results) => results,
        Err(e) => {
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse { error: e.to_string() }))
                .into_response()
        }
    };

    let analysis_result = match state.ledger.get_analysis_result(request_id).await {
        Ok(result) => result,
        Err(e) => {
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse { error: e.to_string() }))
                .into_response()
        }
    };

    Json(RequestDetailResponse {
        request_id: request.id,
        topic: request.topic,
        status: request.status,
        created_at: request.created_at,
        updated_at: request.updated_at,
        completed_at: request.completed_at,
        error_message: request.error_message,
        search_results: search_results.into_iter().map(SearchResultDto::from).collect(),
        analysis_result: analysis_result.map(AnalysisResultDto::from),
    })
    .into_response()
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HourlyCount {
    pub hour: DateTime<Utc>,
    pub count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MetricsResponse {
    pub total_requests: i64,
    pub success_rate: f64,
    pub avg_inference_time_ms: f64,
    pub requests_by_status: std::collections::HashMap<String, i64>,
    pub requests_by_hour: Vec<HourlyCount>,
}

#[utoipa::path(
    get,
    path = "/api/metrics",
    responses((status = 200, description = "Aggregate pipeline metrics", body = MetricsResponse)),
    tag = "Metrics",
)]
pub async fn get_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match state.ledger.metrics().await {
        Ok(metrics) => Json(MetricsResponse {
            total_requests: metrics.total_requests,
            success_rate: metrics.success_rate,
            avg_inference_time_ms: metrics.avg_inference_time_ms,
            requests_by_status: metrics.requests_by_status.into_iter().collect(),
            requests_by_hour: metrics
                .requests_by_hour
                .into_iter()
                .map(|(hour, count)| HourlyCount { hour, count })
                .collect(),
        })
        .into_response(),
        Err(e) => {
            (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse { error: e.to_string() })).into_response()
        }
    }
}

#[utoipa::path(get, path = "/health", responses((status = 200, description = "Service is up")), tag = "Health")]
pub async fn health() -> impl IntoResponse {
    StatusCode::OK
}
