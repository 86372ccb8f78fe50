//! Origin allow-list for the export endpoint.
//!
//! Requests without an `Origin` header (CLI, scripts) pass untouched. A
//! browser request from an origin outside `export.allowed_origins` is
//! rejected before authentication runs.

use crate::error::ApiError;
use crate::metrics::record_auth_failure;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_EXPOSE_HEADERS, ACCESS_CONTROL_MAX_AGE, ORIGIN, VARY,
};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

const ALLOWED_METHODS: &str = "POST, OPTIONS";
const ALLOWED_HEADERS: &str = "authorization, content-type, x-trace-id";
const EXPOSED_HEADERS: &str = "content-disposition";
const PREFLIGHT_MAX_AGE_SECS: &str = "600";

/// CORS middleware for the export routes.
pub async fn export_cors_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let Some(origin) = req.headers().get(ORIGIN).cloned() else {
        return next.run(req).await;
    };

    let allowed = origin
        .to_str()
        .is_ok_and(|o| state.config.export.is_origin_allowed(o));
    if !allowed {
        record_auth_failure("origin_not_allowed");
        tracing::warn!(origin = ?origin, "Rejected export request from disallowed origin");
        return ApiError::Forbidden("origin not allowed".to_string()).into_response();
    }

    let preflight = req.method() == Method::OPTIONS;
    let mut response = next.run(req).await;

    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    headers.append(VARY, HeaderValue::from_static("Origin"));
    headers.insert(
        ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static(EXPOSED_HEADERS),
    );
    if preflight {
        headers.insert(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        );
        headers.insert(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOWED_HEADERS),
        );
        headers.insert(
            ACCESS_CONTROL_MAX_AGE,
            HeaderValue::from_static(PREFLIGHT_MAX_AGE_SECS),
        );
    }

    response
}

/// OPTIONS handler; the middleware adds the allow headers.
pub async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}
