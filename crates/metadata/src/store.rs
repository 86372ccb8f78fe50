//! Metadata store trait and implementations.

use crate::error::{MetadataError, MetadataResult, map_unique_violation};
use crate::repos::{
    BootstrapRepo, DogHistoryRepo, DogRepo, DogUpdateRepo, StorageObjectRepo, TokenRepo, UserRepo,
};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore:
    DogRepo
    + DogUpdateRepo
    + DogHistoryRepo
    + StorageObjectRepo
    + TokenRepo
    + UserRepo
    + BootstrapRepo
    + Send
    + Sync
{
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Create a new SQLite store, creating the database file if missing.
    pub async fn new(path: impl AsRef<Path>) -> MetadataResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // Single writer connection; avoids "database is locked" under axum concurrency.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        tracing::debug!(path = %path.display(), "Opened SQLite metadata store");

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// Implement all the repository traits for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use crate::repos::objects::FORGET_CHUNK_SIZE;
    use sqlx::types::Json;
    use sqlx::{FromRow, QueryBuilder};
    use time::OffsetDateTime;
    use uuid::Uuid;

    /// `dog_updates` row as stored: the media list is a JSON text column.
    #[derive(FromRow)]
    struct SqliteDogUpdate {
        id: Uuid,
        dog_id: Uuid,
        author_id: Option<Uuid>,
        content: Option<String>,
        update_media_urls: Option<Json<Vec<String>>>,
        approved: bool,
        created_at: OffsetDateTime,
    }

    impl From<SqliteDogUpdate> for DogUpdateRow {
        fn from(row: SqliteDogUpdate) -> Self {
            Self {
                id: row.id,
                dog_id: row.dog_id,
                author_id: row.author_id,
                content: row.content,
                update_media_urls: row.update_media_urls.map(|j| j.0).unwrap_or_default(),
                approved: row.approved,
                created_at: row.created_at,
            }
        }
    }

    #[derive(FromRow)]
    struct SqliteUpdateMedia {
        id: Uuid,
        update_media_urls: Option<Json<Vec<String>>>,
    }

    #[async_trait]
    impl DogRepo for SqliteStore {
        async fn create_dog(&self, dog: &DogRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO dogs (id, dog_name, breed, status, dog_picture, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(dog.id)
            .bind(&dog.dog_name)
            .bind(&dog.breed)
            .bind(&dog.status)
            .bind(&dog.dog_picture)
            .bind(dog.created_at)
            .bind(dog.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_unique_violation(e, || format!("dog {}", dog.id)))?;
            Ok(())
        }

        async fn get_dog(&self, id: Uuid) -> MetadataResult<Option<DogRow>> {
            let row = sqlx::query_as::<_, DogRow>(
                "SELECT id, dog_name, breed, status, dog_picture, created_at, updated_at FROM dogs WHERE id = ?",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn set_dog_picture(
            &self,
            id: Uuid,
            dog_picture: Option<&str>,
        ) -> MetadataResult<()> {
            let result = sqlx::query("UPDATE dogs SET dog_picture = ?, updated_at = ? WHERE id = ?")
                .bind(dog_picture)
                .bind(OffsetDateTime::now_utc())
                .bind(id)
                .execute(&self.pool)
                .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("dog {id}")));
            }
            Ok(())
        }

        async fn list_dog_pictures(&self) -> MetadataResult<Vec<DogPictureRow>> {
            let rows =
                sqlx::query_as::<_, DogPictureRow>("SELECT id, dog_picture FROM dogs ORDER BY id")
                    .fetch_all(&self.pool)
                    .await?;
            Ok(rows)
        }
    }

    #[async_trait]
    impl DogUpdateRepo for SqliteStore {
        async fn create_dog_update(&self, update: &DogUpdateRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO dog_updates (
                    id, dog_id, author_id, content, update_media_urls, approved, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(update.id)
            .bind(update.dog_id)
            .bind(update.author_id)
            .bind(&update.content)
            .bind(Json(&update.update_media_urls))
            .bind(update.approved)
            .bind(update.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_unique_violation(e, || format!("dog update {}", update.id)))?;
            Ok(())
        }

        async fn list_dog_updates(&self, dog_id: Uuid) -> MetadataResult<Vec<DogUpdateRow>> {
            let rows = sqlx::query_as::<_, SqliteDogUpdate>(
                r#"
                SELECT id, dog_id, author_id, content, update_media_urls, approved, created_at
                FROM dog_updates
                WHERE dog_id = ?
                ORDER BY created_at, id
                "#,
            )
            .bind(dog_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows.into_iter().map(DogUpdateRow::from).collect())
        }

        async fn list_update_media(&self) -> MetadataResult<Vec<UpdateMediaRow>> {
            let rows = sqlx::query_as::<_, SqliteUpdateMedia>(
                "SELECT id, update_media_urls FROM dog_updates ORDER BY id",
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(rows
                .into_iter()
                .map(|row| UpdateMediaRow {
                    id: row.id,
                    update_media_urls: row.update_media_urls.map(|j| j.0).unwrap_or_default(),
                })
                .collect())
        }
    }

    #[async_trait]
    impl DogHistoryRepo for SqliteStore {
        async fn create_history_entry(&self, entry: &DogHistoryRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO dog_history (id, dog_id, event_type, notes, event_date, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(entry.id)
            .bind(entry.dog_id)
            .bind(&entry.event_type)
            .bind(&entry.notes)
            .bind(entry.event_date)
            .bind(entry.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_unique_violation(e, || format!("history entry {}", entry.id)))?;
            Ok(())
        }

        async fn list_dog_history(&self, dog_id: Uuid) -> MetadataResult<Vec<DogHistoryRow>> {
            let rows = sqlx::query_as::<_, DogHistoryRow>(
                r#"
                SELECT id, dog_id, event_type, notes, event_date, created_at
                FROM dog_history
                WHERE dog_id = ?
                ORDER BY event_date, id
                "#,
            )
            .bind(dog_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }
    }

    #[async_trait]
    impl StorageObjectRepo for SqliteStore {
        async fn record_storage_object(&self, object: &StorageObjectRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO storage_objects (bucket_id, name, size_bytes, created_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(bucket_id, name) DO UPDATE
                SET size_bytes = excluded.size_bytes, created_at = excluded.created_at
                "#,
            )
            .bind(&object.bucket_id)
            .bind(&object.name)
            .bind(object.size_bytes)
            .bind(object.created_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn list_storage_objects(
            &self,
            buckets: &[String],
            limit: Option<u64>,
        ) -> MetadataResult<Vec<StorageObjectRow>> {
            if buckets.is_empty() {
                return Ok(Vec::new());
            }

            let mut qb = QueryBuilder::<Sqlite>::new(
                "SELECT bucket_id, name, size_bytes, created_at FROM storage_objects WHERE bucket_id IN (",
            );
            let mut separated = qb.separated(", ");
            for bucket in buckets {
                separated.push_bind(bucket);
            }
            separated.push_unseparated(") ORDER BY bucket_id, name");
            if let Some(limit) = limit {
                let limit = i64::try_from(limit).unwrap_or(i64::MAX);
                qb.push(" LIMIT ").push_bind(limit);
            }

            let rows = qb
                .build_query_as::<StorageObjectRow>()
                .fetch_all(&self.pool)
                .await?;
            Ok(rows)
        }

        async fn forget_storage_objects(
            &self,
            bucket: &str,
            names: &[String],
        ) -> MetadataResult<u64> {
            if names.is_empty() {
                return Ok(0);
            }

            let mut tx = self.pool.begin().await?;
            let mut forgotten = 0;
            for chunk in names.chunks(FORGET_CHUNK_SIZE) {
                let mut qb =
                    QueryBuilder::<Sqlite>::new("DELETE FROM storage_objects WHERE bucket_id = ");
                qb.push_bind(bucket);
                qb.push(" AND name IN (");
                let mut separated = qb.separated(", ");
                for name in chunk {
                    separated.push_bind(name);
                }
                separated.push_unseparated(")");

                forgotten += qb.build().execute(&mut *tx).await?.rows_affected();
            }
            tx.commit().await?;
            Ok(forgotten)
        }
    }

    #[async_trait]
    impl TokenRepo for SqliteStore {
        async fn create_token(&self, token: &TokenRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO tokens (
                    token_id, user_id, token_hash, expires_at,
                    revoked_at, created_at, last_used_at, description
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(token.token_id)
            .bind(token.user_id)
            .bind(&token.token_hash)
            .bind(token.expires_at)
            .bind(token.revoked_at)
            .bind(token.created_at)
            .bind(token.last_used_at)
            .bind(&token.description)
            .execute(&self.pool)
            .await
            .map_err(|e| map_unique_violation(e, || "token hash already registered".to_string()))?;
            Ok(())
        }

        async fn get_token_by_hash(&self, token_hash: &str) -> MetadataResult<Option<TokenRow>> {
            let row = sqlx::query_as::<_, TokenRow>("SELECT * FROM tokens WHERE token_hash = ?")
                .bind(token_hash)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn get_token(&self, token_id: Uuid) -> MetadataResult<Option<TokenRow>> {
            let row = sqlx::query_as::<_, TokenRow>("SELECT * FROM tokens WHERE token_id = ?")
                .bind(token_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn touch_token(&self, token_id: Uuid, used_at: OffsetDateTime) -> MetadataResult<()> {
            sqlx::query("UPDATE tokens SET last_used_at = ? WHERE token_id = ?")
                .bind(used_at)
                .bind(token_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        }

        async fn revoke_token(
            &self,
            token_id: Uuid,
            revoked_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            sqlx::query("UPDATE tokens SET revoked_at = ? WHERE token_id = ?")
                .bind(revoked_at)
                .bind(token_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        }
    }

    #[async_trait]
    impl UserRepo for SqliteStore {
        async fn create_user(&self, user: &UserRow) -> MetadataResult<()> {
            sqlx::query(
                "INSERT INTO users (user_id, email, display_name, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(user.user_id)
            .bind(&user.email)
            .bind(&user.display_name)
            .bind(user.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_unique_violation(e, || format!("user '{}'", user.email)))?;
            Ok(())
        }

        async fn get_user(&self, user_id: Uuid) -> MetadataResult<Option<UserRow>> {
            let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn get_user_by_email(&self, email: &str) -> MetadataResult<Option<UserRow>> {
            let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE email = ?")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn grant_role(&self, grant: &DogManagerRow) -> MetadataResult<()> {
            // The unique index treats NULL dog_id as distinct, so global grants are
            // checked explicitly.
            let exists: bool = sqlx::query_scalar(
                r#"
                SELECT EXISTS(
                    SELECT 1 FROM dog_managers
                    WHERE user_id = ? AND dog_id IS ? AND permission_role = ?
                )
                "#,
            )
            .bind(grant.user_id)
            .bind(grant.dog_id)
            .bind(&grant.permission_role)
            .fetch_one(&self.pool)
            .await?;
            if exists {
                return Ok(());
            }

            sqlx::query(
                r#"
                INSERT INTO dog_managers (user_id, dog_id, permission_role, created_at)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(grant.user_id)
            .bind(grant.dog_id)
            .bind(&grant.permission_role)
            .bind(grant.created_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn list_roles(&self, user_id: Uuid) -> MetadataResult<Vec<String>> {
            let roles: Vec<String> = sqlx::query_scalar(
                "SELECT DISTINCT permission_role FROM dog_managers WHERE user_id = ? ORDER BY permission_role",
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(roles)
        }
    }

    #[async_trait]
    impl BootstrapRepo for SqliteStore {
        async fn get_bootstrap_token_id(&self) -> MetadataResult<Option<Uuid>> {
            let value: Option<Option<String>> =
                sqlx::query_scalar("SELECT bootstrap_token_id FROM bootstrap_state WHERE id = 1")
                    .fetch_optional(&self.pool)
                    .await?;
            value
                .flatten()
                .filter(|id| !id.is_empty())
                .map(|id| {
                    Uuid::parse_str(&id).map_err(|e| {
                        MetadataError::Internal(format!(
                            "invalid bootstrap_token_id uuid '{id}': {e}"
                        ))
                    })
                })
                .transpose()
        }

        async fn set_bootstrap_token_id(&self, token_id: Uuid) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO bootstrap_state (id, bootstrap_token_id)
                VALUES (1, ?)
                ON CONFLICT(id) DO UPDATE
                SET bootstrap_token_id = excluded.bootstrap_token_id
                "#,
            )
            .bind(token_id.to_string())
            .execute(&self.pool)
            .await?;
            Ok(())
        }
    }
}

const SCHEMA_SQL: &str = r#"
-- Dogs in the program
CREATE TABLE IF NOT EXISTS dogs (
    id BLOB PRIMARY KEY,
    dog_name TEXT NOT NULL,
    breed TEXT,
    status TEXT NOT NULL DEFAULT 'in_training',
    dog_picture TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Progress updates; update_media_urls holds a JSON array of strings
CREATE TABLE IF NOT EXISTS dog_updates (
    id BLOB PRIMARY KEY,
    dog_id BLOB NOT NULL REFERENCES dogs(id) ON DELETE CASCADE,
    author_id BLOB,
    content TEXT,
    update_media_urls TEXT,
    approved INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_dog_updates_dog ON dog_updates(dog_id, created_at);

-- Dog timeline
CREATE TABLE IF NOT EXISTS dog_history (
    id BLOB PRIMARY KEY,
    dog_id BLOB NOT NULL REFERENCES dogs(id) ON DELETE CASCADE,
    event_type TEXT NOT NULL,
    notes TEXT,
    event_date TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_dog_history_dog ON dog_history(dog_id, event_date);

-- Catalog of objects present in blob storage
CREATE TABLE IF NOT EXISTS storage_objects (
    bucket_id TEXT NOT NULL,
    name TEXT NOT NULL,
    size_bytes INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    PRIMARY KEY (bucket_id, name)
);

-- Users
CREATE TABLE IF NOT EXISTS users (
    user_id BLOB PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    display_name TEXT,
    created_at TEXT NOT NULL
);

-- Role grants; NULL dog_id applies to every dog
CREATE TABLE IF NOT EXISTS dog_managers (
    user_id BLOB NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
    dog_id BLOB REFERENCES dogs(id) ON DELETE CASCADE,
    permission_role TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_dog_managers_grant
    ON dog_managers(user_id, dog_id, permission_role);
CREATE INDEX IF NOT EXISTS idx_dog_managers_user ON dog_managers(user_id);

-- API tokens
CREATE TABLE IF NOT EXISTS tokens (
    token_id BLOB PRIMARY KEY,
    user_id BLOB NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
    token_hash TEXT NOT NULL UNIQUE,
    expires_at TEXT,
    revoked_at TEXT,
    created_at TEXT NOT NULL,
    last_used_at TEXT,
    description TEXT
);
CREATE INDEX IF NOT EXISTS idx_tokens_user ON tokens(user_id);

-- Bootstrap token marker
CREATE TABLE IF NOT EXISTS bootstrap_state (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    bootstrap_token_id TEXT
);
"#;
