use axum::{extract::Request, http::header, middleware::Next, response::IntoResponse};

/// Hardening headers for server-rendered pages.
///
/// Pages load their own stylesheet and show uploaded images, so the policy
/// allows same-origin resources and nothing else.
pub async fn security_headers_middleware(req: Request, next: Next) -> impl IntoResponse {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        header::HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        header::X_FRAME_OPTIONS,
        header::HeaderValue::from_static("DENY"),
    );
    headers.insert(
        header::REFERRER_POLICY,
        header::HeaderValue::from_static("same-origin"),
    );
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        header::HeaderValue::from_static(
            "default-src 'self'; \
             img-src 'self' data:; \
             style-src 'self' 'unsafe-inline'; \
             form-action 'self'; \
             frame-ancestors 'none'",
        ),
    );

    response
}
