//! Database models mapping to the metadata schema.
//!
//! Rows that are exported to CSV derive `Serialize`; their field order is the
//! CSV column order.

use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Dogs
// =============================================================================

/// Dog record.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DogRow {
    pub id: Uuid,
    pub dog_name: String,
    pub breed: Option<String>,
    /// Program status (e.g. "in_training", "placed", "retired").
    pub status: String,
    /// Public URL or relative storage path of the profile picture.
    pub dog_picture: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Projection of `dogs` scanned when collecting storage references.
#[derive(Debug, Clone, FromRow)]
pub struct DogPictureRow {
    pub id: Uuid,
    pub dog_picture: Option<String>,
}

// =============================================================================
// Dog updates
// =============================================================================

/// Progress update posted about a dog.
///
/// A NULL `update_media_urls` column is read as an empty list.
#[derive(Debug, Clone, Serialize)]
pub struct DogUpdateRow {
    pub id: Uuid,
    pub dog_id: Uuid,
    pub author_id: Option<Uuid>,
    pub content: Option<String>,
    pub update_media_urls: Vec<String>,
    pub approved: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Projection of `dog_updates` scanned when collecting storage references.
#[derive(Debug, Clone)]
pub struct UpdateMediaRow {
    pub id: Uuid,
    pub update_media_urls: Vec<String>,
}

// =============================================================================
// Dog history
// =============================================================================

/// Timeline event in a dog's history (intake, placement, vet visit, ...).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DogHistoryRow {
    pub id: Uuid,
    pub dog_id: Uuid,
    pub event_type: String,
    pub notes: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub event_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

// =============================================================================
// Storage object catalog
// =============================================================================

/// One object known to blob storage.
///
/// `name` is the full path within the bucket.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct StorageObjectRow {
    pub bucket_id: String,
    pub name: String,
    pub size_bytes: i64,
    pub created_at: OffsetDateTime,
}

// =============================================================================
// Users, tokens and roles
// =============================================================================

/// Portal user.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub user_id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub created_at: OffsetDateTime,
}

/// API token record. Only the SHA-256 hash of the token is stored.
#[derive(Debug, Clone, FromRow)]
pub struct TokenRow {
    pub token_id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: Option<OffsetDateTime>,
    pub revoked_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub last_used_at: Option<OffsetDateTime>,
    pub description: Option<String>,
}

/// Role grant in the dog management table.
///
/// A NULL `dog_id` grants the role across all dogs.
#[derive(Debug, Clone, FromRow)]
pub struct DogManagerRow {
    pub user_id: Uuid,
    pub dog_id: Option<Uuid>,
    pub permission_role: String,
    pub created_at: OffsetDateTime,
}
