//! HTTP front end of the price suggestion service.

pub mod config;
pub mod health_routes;
pub mod pricing_routes;
pub mod request_id;
pub mod security_headers;

use anyhow::Context;
use axum::{
    body::Body,
    http::{header, HeaderValue, Method, Request, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    Json, Router,
};
use ml_engine::PricingEngine;
use pricing_core::{
    ArtifactFingerprint, ArtifactRole, ModelInfo, PricePrediction, PriceSuggester, PricingError,
    ServiceHealth,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use config::ServerConfig;
use security_headers::SecurityHeaders;


// ─── State ──────────────────────────────────────────────────────────────────

/// Shared, read-only dependencies of every handler.
#[derive(Clone)]
pub struct AppState {
    pub suggester: Arc<dyn PriceSuggester>,
    pub model_info: Arc<ModelInfo>,
}

impl AppState {
    pub fn new(suggester: Arc<dyn PriceSuggester>, model_info: ModelInfo) -> Self {
        Self {
            suggester,
            model_info: Arc::new(model_info),
        }
    }

    pub fn from_engine(engine: PricingEngine) -> Self {
        let info = engine.info().clone();
        Self::new(Arc::new(engine), info)
    }
}

// ─── Errors ─────────────────────────────────────────────────────────────────

/// Handler error rendered as `{"success": false, "error": "..."}`.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl AppError {
    pub fn with_status(status: StatusCode, error: anyhow::Error) -> Self {
        Self { status, error }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, err.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("Request failed: {:#}", self.error);
        } else {
            tracing::debug!("Request rejected ({}): {:#}", self.status, self.error);
        }
        let body = Json(json!({
            "success": false,
            "error": format!("{:#}", self.error),
        }));
        (self.status, body).into_response()
    }
}

/// Map PricingError to AppError with appropriate status codes.
pub(crate) fn pricing_err(context: &str, e: PricingError) -> AppError {
    let status = match e {
        PricingError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    AppError::with_status(status, anyhow::anyhow!("{context}: {e}"))
}

// ─── OpenAPI ────────────────────────────────────────────────────────────────

#[derive(OpenApi)]
#[openapi(
    info(title = "Price suggestion service", description = "Gradient-boosted price suggestions with tree-spread confidence"),
    paths(pricing_routes::predict, health_routes::health),
    components(schemas(PricePrediction, ServiceHealth, ModelInfo, ArtifactFingerprint, ArtifactRole)),
    tags(
        (name = "Pricing", description = "Price suggestions"),
        (name = "Health", description = "Service status")
    )
)]
pub struct ApiDoc;

// ─── App ────────────────────────────────────────────────────────────────────

pub fn cors_layer(config: &ServerConfig) -> anyhow::Result<CorsLayer> {
    let Some(origins) = &config.cors_allowed_origins else {
        return Ok(CorsLayer::permissive());
    };
    let origins = origins
        .iter()
        .map(|o| {
            o.parse::<HeaderValue>()
                .with_context(|| format!("Invalid CORS origin '{o}'"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::HeaderName::from_static("x-request-id")]))
}

/// Assemble the app. Fails if the configured CORS origins are not valid
/// header values.
pub fn build_router(state: AppState, config: &ServerConfig) -> anyhow::Result<Router> {
    let cors = cors_layer(config)?;
    let security = SecurityHeaders {
        hsts: config.enable_hsts,
    };

    let router = Router::new()
        .merge(pricing_routes::pricing_routes())
        .merge(health_routes::health_routes())
        .layer(middleware::from_fn_with_state(
            security,
            security_headers::security_headers_middleware,
        ))
        .layer(middleware::from_fn(request_id::request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = tracing::field::Empty,
                )
            }),
        )
        .layer(cors)
        .with_state(state);
    Ok(router)
}

pub fn init_tracing() {
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    if json_logging {
        tracing_subscriber::fmt().json().with_env_filter(filter()).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

pub async fn run_server() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    tracing::info!(
        "Starting price suggestion service v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = ServerConfig::from_env()?;
    tracing::info!("Configuration loaded");
    tracing::info!("  Model dir: {}", config.model_dir.display());
    match &config.cors_allowed_origins {
        Some(origins) => tracing::info!("  CORS origins: {}", origins.join(", ")),
        None => tracing::info!("  CORS origins: any"),
    }
    tracing::info!("  HSTS: {}", config.enable_hsts);

    // Nothing is served until all artifacts are loaded
    let engine =
        PricingEngine::initialize(&config.artifacts).context("Failed to load pricing artifacts")?;
    let state = AppState::from_engine(engine);
    let app = build_router(state, &config)?;

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}
