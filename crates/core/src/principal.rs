//! Authenticated principals and permission roles.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Role a user holds in the `dog_managers` table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionRole {
    /// Full control, including prune and export.
    Admin,
    /// May edit dog records and post updates.
    Editor,
    /// Read-only access.
    Viewer,
}

impl PermissionRole {
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "admin" => Ok(Self::Admin),
            "editor" => Ok(Self::Editor),
            "viewer" => Ok(Self::Viewer),
            _ => Err(crate::Error::UnknownRole(s.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Editor => "editor",
            Self::Viewer => "viewer",
        }
    }
}

impl fmt::Display for PermissionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A user resolved from a bearer token.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: Uuid,
    pub token_id: Uuid,
    /// Roles granted to the user, across all dogs they manage.
    pub roles: HashSet<PermissionRole>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub revoked_at: Option<OffsetDateTime>,
}

impl Principal {
    /// Check the token backing this principal is neither expired nor revoked.
    pub fn is_valid(&self) -> bool {
        if self.revoked_at.is_some() {
            return false;
        }
        match self.expires_at {
            Some(expires_at) => OffsetDateTime::now_utc() < expires_at,
            None => true,
        }
    }

    pub fn has_role(&self, role: PermissionRole) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(PermissionRole::Admin)
    }
}

/// Hash a bearer token for storage lookup (lowercase SHA-256 hex).
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Normalize a configured token hash: strip an optional `sha256:` prefix,
/// lowercase, and check it is 64 hex characters.
pub fn normalize_token_hash(raw: &str) -> crate::Result<String> {
    let hash = raw.strip_prefix("sha256:").unwrap_or(raw).to_lowercase();
    if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(crate::Error::InvalidToken(
            "expected 64 hex chars".to_string(),
        ));
    }
    Ok(hash)
}
