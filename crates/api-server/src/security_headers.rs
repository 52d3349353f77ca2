use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};

/// Settings for [`security_headers_middleware`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SecurityHeaders {
    /// Send `Strict-Transport-Security`; only when served behind TLS.
    pub hsts: bool,
}

/// Adds security headers suitable for a JSON-only API to every response.
pub async fn security_headers_middleware(
    State(settings): State<SecurityHeaders>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert("x-content-type-options", HeaderValue::from_static("nosniff"));
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
    );
    headers.insert("referrer-policy", HeaderValue::from_static("no-referrer"));
    // Suggestions depend on live stock levels
    headers.insert("cache-control", HeaderValue::from_static("no-store"));

    if settings.hsts {
        headers.insert(
            "strict-transport-security",
            HeaderValue::from_static("max-age=63072000; includeSubDomains"),
        );
    }

    response
}
