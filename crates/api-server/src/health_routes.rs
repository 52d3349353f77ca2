use axum::{extract::State, routing::get, Json, Router};
use pricing_core::ServiceHealth;
use utoipa::OpenApi;

use crate::{ApiDoc, AppState};

pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/api-docs/openapi.json", get(openapi_json))
}

/// Liveness plus a description of the loaded artifacts.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up with artifacts loaded", body = ServiceHealth)),
    tag = "Health"
)]
pub async fn health(State(state): State<AppState>) -> Json<ServiceHealth> {
    Json(ServiceHealth {
        status: "ok".to_string(),
        backend: state.suggester.backend_name().to_string(),
        model: state.model_info.as_ref().clone(),
    })
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
