//! Dog archive export endpoint.

use crate::auth::{get_trace_id, require_auth};
use crate::error::{ApiError, ApiResult};
use crate::export::prepare_export;
use crate::metrics::EXPORTS_STARTED;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use kennel_core::{DogId, PermissionRole};
use serde::Deserialize;

/// Maximum export request body size.
const MAX_EXPORT_BODY_SIZE: usize = 4 * 1024;

/// Export request body.
#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    pub dog_id: String,
}

/// POST /v1/dogs/export - Stream one dog's records and media as tar.gz.
pub async fn export_dog(State(state): State<AppState>, req: Request) -> ApiResult<Response> {
    let auth = require_auth(&req)?;
    auth.require_role(PermissionRole::Admin)?;
    let user_id = auth.principal.user_id;
    let trace_id = get_trace_id(&req).map(|t| t.to_string());

    let body: ExportRequest = {
        let bytes = axum::body::to_bytes(req.into_body(), MAX_EXPORT_BODY_SIZE)
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read body: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ApiError::BadRequest(format!("invalid JSON: {e}")))?
    };
    let dog_id = DogId::parse_strict(body.dog_id.trim())
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let export = prepare_export(&state, dog_id).await?;
    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        export.file_name()
    ))
    .map_err(|e| ApiError::Internal(format!("invalid file name: {e}")))?;

    EXPORTS_STARTED.inc();
    tracing::info!(
        dog_id = %dog_id,
        user_id = %user_id,
        trace_id = ?trace_id,
        media = export.media_count(),
        "Dog export started"
    );

    let mut response = (StatusCode::OK, Body::from_stream(export.into_stream())).into_response();
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/gzip"));
    headers.insert(CONTENT_DISPOSITION, disposition);
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    Ok(response)
}
