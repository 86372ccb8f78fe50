//! Admin principal initialization.

use anyhow::{Result, bail};
use kennel_core::PermissionRole;
use kennel_core::config::AdminConfig;
use kennel_core::principal::normalize_token_hash;
use kennel_metadata::MetadataStore;
use kennel_metadata::models::{DogManagerRow, TokenRow, UserRow};
use time::OffsetDateTime;
use uuid::Uuid;

/// Ensure the configured admin user, token and global admin role exist.
///
/// If the token hash changes between restarts, the previous bootstrap token
/// is revoked and a new one is created with the new hash.
pub async fn ensure_admin_token(metadata: &dyn MetadataStore, config: &AdminConfig) -> Result<()> {
    let hash = normalize_token_hash(&config.token_hash)
        .map_err(|e| anyhow::anyhow!("invalid admin token_hash: {e}"))?;

    let now = OffsetDateTime::now_utc();
    let user_id = ensure_admin_user(metadata, &config.email, now).await?;

    if let Some(existing) = metadata.get_token_by_hash(&hash).await? {
        if existing.revoked_at.is_some() {
            bail!(
                "admin token hash matches a revoked token (id={}); \
                 use a new token hash",
                existing.token_id
            );
        }
        if let Some(expires_at) = existing.expires_at
            && expires_at <= now
        {
            bail!(
                "admin token hash matches an expired token (id={}, expired={}); \
                 use a new token hash",
                existing.token_id,
                expires_at
            );
        }
        grant_global_admin(metadata, existing.user_id, now).await?;
        metadata.set_bootstrap_token_id(existing.token_id).await?;
        tracing::debug!("Admin token already exists");
        return Ok(());
    }

    if let Some(prev_id) = metadata.get_bootstrap_token_id().await? {
        metadata.revoke_token(prev_id, now).await?;
        tracing::info!(token_id = %prev_id, "Previous admin token revoked");
    }

    let token = TokenRow {
        token_id: Uuid::new_v4(),
        user_id,
        token_hash: hash,
        expires_at: None,
        revoked_at: None,
        created_at: now,
        last_used_at: None,
        description: config.token_description.clone(),
    };

    metadata.create_token(&token).await?;
    metadata.set_bootstrap_token_id(token.token_id).await?;
    tracing::info!(token_id = %token.token_id, user_id = %user_id, "Admin token created");

    Ok(())
}

async fn ensure_admin_user(
    metadata: &dyn MetadataStore,
    email: &str,
    now: OffsetDateTime,
) -> Result<Uuid> {
    if let Some(user) = metadata.get_user_by_email(email).await? {
        grant_global_admin(metadata, user.user_id, now).await?;
        return Ok(user.user_id);
    }

    let user = UserRow {
        user_id: Uuid::new_v4(),
        email: email.to_string(),
        display_name: Some("Bootstrap administrator".to_string()),
        created_at: now,
    };
    metadata.create_user(&user).await?;
    grant_global_admin(metadata, user.user_id, now).await?;
    tracing::info!(user_id = %user.user_id, email = %email, "Admin user created");
    Ok(user.user_id)
}

async fn grant_global_admin(
    metadata: &dyn MetadataStore,
    user_id: Uuid,
    now: OffsetDateTime,
) -> Result<()> {
    metadata
        .grant_role(&DogManagerRow {
            user_id,
            dog_id: None,
            permission_role: PermissionRole::Admin.as_str().to_string(),
            created_at: now,
        })
        .await?;
    Ok(())
}
