//! Storage prune endpoint.

use crate::auth::{get_auth, get_trace_id, require_auth};
use crate::error::{ApiError, ApiResult};
use crate::prune::{PruneOptions, PruneResult, run_prune};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Query, Request, State};
use kennel_core::PermissionRole;
use serde::Deserialize;

/// Query parameters of a prune request.
#[derive(Debug, Deserialize)]
pub struct PruneParams {
    /// Report only (default: true).
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
    /// Maximum objects to examine; zero means unlimited.
    #[serde(default)]
    pub limit: u64,
    /// Paths per bulk-delete call; defaults to `prune.default_batch_size`.
    pub batch_size: Option<i64>,
}

fn default_dry_run() -> bool {
    true
}

/// POST /v1/data-management/prune - Reconcile storage and remove orphans.
///
/// Requires the admin role unless `prune.require_admin` is disabled.
pub async fn prune(State(state): State<AppState>, req: Request) -> ApiResult<Json<PruneResult>> {
    if state.config.prune.require_admin {
        let auth = require_auth(&req)?;
        auth.require_role(PermissionRole::Admin)?;
    }

    let Query(params) = Query::<PruneParams>::try_from_uri(req.uri())
        .map_err(|e| ApiError::BadRequest(format!("invalid query: {e}")))?;

    let options = PruneOptions {
        dry_run: params.dry_run,
        limit: params.limit,
        batch_size: params
            .batch_size
            .unwrap_or(state.config.prune.default_batch_size),
        sample_size: state.config.prune.sample_size,
    };

    tracing::info!(
        user_id = ?get_auth(&req).map(|a| a.principal.user_id),
        trace_id = ?get_trace_id(&req).map(|t| t.as_str()),
        dry_run = options.dry_run,
        "Prune requested"
    );

    let result = run_prune(&*state.metadata, &state.media, &state.extractor, options).await?;
    Ok(Json(result))
}
