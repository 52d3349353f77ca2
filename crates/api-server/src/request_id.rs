use axum::{
    extract::Request,
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Reuses the caller's `X-Request-Id` (so pricing calls can be correlated
/// with the backend that made them) or generates a UUID v4, records it on
/// the request span and echoes it on the response.
pub async fn request_id_middleware(
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    let id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty() && s.len() <= 128)
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    tracing::Span::current().record("request_id", id.as_str());

    let mut response = next.run(request).await;
    if let Ok(val) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, val);
    }

    response
}
