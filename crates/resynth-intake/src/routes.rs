//! Router assembly, OpenAPI schema, and CORS (§6).
//!
//! CORS is an explicit allow-list built from `CORS_ALLOWED_ORIGINS`
//! rather than a permissive wildcard, since §6 specifies "a configured
//! set of browser origins" (see DESIGN.md).

use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;

use crate::handlers;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::submit_analysis,
        handlers::get_status,
        handlers::list_requests,
        handlers::get_request_detail,
        handlers::get_metrics,
    ),
    components(schemas(
        handlers::AnalyzeRequest,
        handlers::AnalyzeResponse,
        handlers::ErrorResponse,
        handlers::StatusResponse,
        handlers::ListRequestsResponse,
        handlers::RequestDetailResponse,
        handlers::SearchResultDto,
        handlers::AnalysisResultDto,
        handlers::MetricsResponse,
        handlers::HourlyCount,
    )),
    tags(
        (name = "Intake", description = "Topic submission and status"),
        (name = "Requests", description = "Request listing and detail"),
        (name = "Metrics", description = "Aggregate pipeline metrics"),
        (name = "Health", description = "Liveness"),
    ),
)]
struct ApiDoc;

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any)
}

pub fn create_router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/analyze", post(handlers::submit_analysis))
        .route("/status/:request_id", get(handlers::get_status))
        .route("/api/requests", get(handlers::list_requests))
        .route("/api/requests/:request_id", get(handlers::get_request_detail))
        .route("/api/metrics", get(handlers::get_metrics))
        .merge(utoipa_swagger_ui::SwaggerUi::new("/api/docs").url("/api/openapi.json", ApiDoc::openapi()))
        .layer(cors_layer(allowed_origins))
        .with_state(state)
}
