//! Authentication and authorization middleware.

use crate::error::{ApiError, ApiResult};
use crate::metrics::record_auth_failure;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use kennel_core::{PermissionRole, Principal, hash_token};
use std::collections::HashSet;
use time::OffsetDateTime;
use tracing::Instrument;
use uuid::Uuid;

/// Maximum length for trace IDs.
/// Longer trace IDs are truncated to prevent log bloat and log injection.
const MAX_TRACE_ID_LEN: usize = 128;

/// Trace ID for request correlation.
#[derive(Clone, Debug)]
pub struct TraceId(pub String);

impl TraceId {
    /// Generate a new random trace ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create a trace ID from a client-provided value.
    ///
    /// Truncated to `MAX_TRACE_ID_LEN` characters; anything but printable
    /// ASCII is dropped.
    pub fn from_client(value: &str) -> Self {
        let sanitized: String = value
            .chars()
            .take(MAX_TRACE_ID_LEN)
            .filter(|c| c.is_ascii_graphic() || *c == ' ')
            .collect();

        if sanitized.is_empty() {
            Self::new()
        } else {
            Self(sanitized)
        }
    }

    /// Get the trace ID as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Authenticated request extension.
#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    /// The principal resolved from the bearer token.
    pub principal: Principal,
}

impl AuthenticatedUser {
    /// Require a role, returning 403 if the principal lacks it.
    pub fn require_role(&self, role: PermissionRole) -> ApiResult<()> {
        if self.principal.has_role(role) {
            Ok(())
        } else {
            record_auth_failure("missing_role");
            Err(ApiError::Forbidden(format!("{role} role required")))
        }
    }
}

/// Extract bearer token from Authorization header.
/// Per RFC 6750, the "Bearer" scheme is case-insensitive.
fn extract_bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            if v.len() >= 7 && v[..7].eq_ignore_ascii_case("bearer ") {
                Some(v[7..].trim())
            } else {
                None
            }
        })
        .filter(|token| !token.is_empty())
}

/// Extract trace ID from X-Trace-Id header or generate a new one.
fn extract_or_generate_trace_id(req: &Request) -> TraceId {
    req.headers()
        .get("x-trace-id")
        .and_then(|v| v.to_str().ok())
        .map(TraceId::from_client)
        .unwrap_or_else(TraceId::new)
}

/// Resolve a raw bearer token to a principal.
///
/// Unknown tokens resolve to `None`; expired or revoked tokens are 401.
async fn resolve_principal(state: &AppState, raw_token: &str) -> ApiResult<Option<Principal>> {
    let token_hash = hash_token(raw_token);
    let Some(token_row) = state.metadata.get_token_by_hash(&token_hash).await? else {
        return Ok(None);
    };

    let roles: HashSet<PermissionRole> = state
        .metadata
        .list_roles(token_row.user_id)
        .await?
        .iter()
        .filter_map(|role| match PermissionRole::parse(role) {
            Ok(role) => Some(role),
            Err(_) => {
                tracing::warn!(
                    user_id = %token_row.user_id,
                    invalid_role = %role,
                    "User holds unknown permission role, ignoring"
                );
                None
            }
        })
        .collect();

    let principal = Principal {
        user_id: token_row.user_id,
        token_id: token_row.token_id,
        roles,
        expires_at: token_row.expires_at,
        revoked_at: token_row.revoked_at,
    };

    if !principal.is_valid() {
        record_auth_failure("invalid_token");
        return Err(ApiError::Unauthorized(
            "token expired or revoked".to_string(),
        ));
    }

    // Update last used time (fire and forget)
    let metadata = state.metadata.clone();
    let token_id = token_row.token_id;
    tokio::spawn(async move {
        let _ = metadata
            .touch_token(token_id, OffsetDateTime::now_utc())
            .await;
    });

    Ok(Some(principal))
}

/// Authentication middleware that validates tokens and sets up trace context.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let trace_id = extract_or_generate_trace_id(&req);
    let trace_id_str = trace_id.0.clone();
    req.extensions_mut().insert(trace_id);

    if let Some(raw_token) = extract_bearer_token(&req) {
        let raw_token = raw_token.to_string();
        if let Some(principal) = resolve_principal(&state, &raw_token).await? {
            req.extensions_mut().insert(AuthenticatedUser { principal });
        }
    }

    let response = next
        .run(req)
        .instrument(tracing::info_span!("request", trace_id = %trace_id_str))
        .await;

    Ok(response)
}

/// Require authentication (token must be present and known).
pub fn require_auth(req: &Request) -> ApiResult<&AuthenticatedUser> {
    req.extensions().get::<AuthenticatedUser>().ok_or_else(|| {
        record_auth_failure("missing_token");
        ApiError::Unauthorized("authentication required".to_string())
    })
}

/// Get optional authentication.
pub fn get_auth(req: &Request) -> Option<&AuthenticatedUser> {
    req.extensions().get::<AuthenticatedUser>()
}

/// Get the trace ID from request extensions.
pub fn get_trace_id(req: &Request) -> Option<&TraceId> {
    req.extensions().get::<TraceId>()
}
