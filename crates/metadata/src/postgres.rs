//! PostgreSQL-based metadata store implementation.

use crate::error::{MetadataError, MetadataResult, map_unique_violation};
use crate::models::*;
use crate::repos::{
    BootstrapRepo, DogHistoryRepo, DogRepo, DogUpdateRepo, StorageObjectRepo, TokenRepo, UserRepo,
};
use crate::repos::objects::FORGET_CHUNK_SIZE;
use crate::store::MetadataStore;
use async_trait::async_trait;
use kennel_core::config::PgSslMode;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode as SqlxPgSslMode};
use sqlx::{FromRow, Pool, Postgres};
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

fn postgres_schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                return None;
            }
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

/// `dog_updates` row as stored: the media list is a nullable `text[]`.
#[derive(FromRow)]
struct PgDogUpdate {
    id: Uuid,
    dog_id: Uuid,
    author_id: Option<Uuid>,
    content: Option<String>,
    update_media_urls: Option<Vec<String>>,
    approved: bool,
    created_at: OffsetDateTime,
}

impl From<PgDogUpdate> for DogUpdateRow {
    fn from(row: PgDogUpdate) -> Self {
        Self {
            id: row.id,
            dog_id: row.dog_id,
            author_id: row.author_id,
            content: row.content,
            update_media_urls: row.update_media_urls.unwrap_or_default(),
            approved: row.approved,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct PgUpdateMedia {
    id: Uuid,
    update_media_urls: Option<Vec<String>>,
}

/// PostgreSQL-based metadata store.
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Create a new PostgreSQL store from a connection URL.
    pub async fn from_url(
        url: &str,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let opts = PgConnectOptions::from_str(url)?;
        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    /// Create a new PostgreSQL store from individual connection parameters.
    ///
    /// Lets the password arrive separately (e.g. via environment variables).
    #[allow(clippy::too_many_arguments)]
    pub async fn from_params(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        database: &str,
        ssl_mode: Option<PgSslMode>,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let mut opts = PgConnectOptions::new()
            .host(host)
            .port(port)
            .database(database);

        if let Some(user) = username {
            opts = opts.username(user);
        }

        if let Some(pass) = password {
            opts = opts.password(pass);
        }

        if let Some(mode) = ssl_mode {
            let sqlx_mode = match mode {
                PgSslMode::Disable => SqlxPgSslMode::Disable,
                PgSslMode::Prefer => SqlxPgSslMode::Prefer,
                PgSslMode::Require => SqlxPgSslMode::Require,
            };
            opts = opts.ssl_mode(sqlx_mode);
        }

        tracing::info!(
            host = host,
            port = port,
            database = database,
            username = username.unwrap_or("<none>"),
            ssl_mode = ?ssl_mode,
            "Connecting to PostgreSQL with individual parameters"
        );

        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    async fn connect(
        mut opts: PgConnectOptions,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        if let Some(timeout_ms) = statement_timeout_ms {
            opts = opts.options([("statement_timeout", format!("{}ms", timeout_ms))]);
            tracing::info!("PostgreSQL statement_timeout set to {}ms", timeout_ms);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for PostgresStore {
    async fn migrate(&self) -> MetadataResult<()> {
        // Prepared statements cannot hold several commands; run them one by one.
        for statement in postgres_schema_statements(POSTGRES_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl DogRepo for PostgresStore {
    async fn create_dog(&self, dog: &DogRow) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO dogs (id, dog_name, breed, status, dog_picture, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
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
            "SELECT id, dog_name, breed, status, dog_picture, created_at, updated_at FROM dogs WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn set_dog_picture(&self, id: Uuid, dog_picture: Option<&str>) -> MetadataResult<()> {
        let result = sqlx::query("UPDATE dogs SET dog_picture = $1, updated_at = $2 WHERE id = $3")
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
        let rows = sqlx::query_as::<_, DogPictureRow>("SELECT id, dog_picture FROM dogs ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}

#[async_trait]
impl DogUpdateRepo for PostgresStore {
    async fn create_dog_update(&self, update: &DogUpdateRow) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO dog_updates (
                id, dog_id, author_id, content, update_media_urls, approved, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(update.id)
        .bind(update.dog_id)
        .bind(update.author_id)
        .bind(&update.content)
        .bind(&update.update_media_urls)
        .bind(update.approved)
        .bind(update.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, || format!("dog update {}", update.id)))?;
        Ok(())
    }

    async fn list_dog_updates(&self, dog_id: Uuid) -> MetadataResult<Vec<DogUpdateRow>> {
        let rows = sqlx::query_as::<_, PgDogUpdate>(
            r#"
            SELECT id, dog_id, author_id, content, update_media_urls, approved, created_at
            FROM dog_updates
            WHERE dog_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(dog_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(DogUpdateRow::from).collect())
    }

    async fn list_update_media(&self) -> MetadataResult<Vec<UpdateMediaRow>> {
        let rows = sqlx::query_as::<_, PgUpdateMedia>(
            "SELECT id, update_media_urls FROM dog_updates ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| UpdateMediaRow {
                id: row.id,
                update_media_urls: row.update_media_urls.unwrap_or_default(),
            })
            .collect())
    }
}

#[async_trait]
impl DogHistoryRepo for PostgresStore {
    async fn create_history_entry(&self, entry: &DogHistoryRow) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO dog_history (id, dog_id, event_type, notes, event_date, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
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
            WHERE dog_id = $1
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
impl StorageObjectRepo for PostgresStore {
    async fn record_storage_object(&self, object: &StorageObjectRow) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO storage_objects (bucket_id, name, size_bytes, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT(bucket_id, name) DO UPDATE
            SET size_bytes = EXCLUDED.size_bytes, created_at = EXCLUDED.created_at
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
        // LIMIT NULL means no limit. Byte-wise collation keeps the order identical
        // to the SQLite backend.
        let limit = limit.map(|l| i64::try_from(l).unwrap_or(i64::MAX));
        let rows = sqlx::query_as::<_, StorageObjectRow>(
            r#"
            SELECT bucket_id, name, size_bytes, created_at
            FROM storage_objects
            WHERE bucket_id = ANY($1)
            ORDER BY bucket_id COLLATE "C", name COLLATE "C"
            LIMIT $2
            "#,
        )
        .bind(buckets)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn forget_storage_objects(&self, bucket: &str, names: &[String]) -> MetadataResult<u64> {
        if names.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        let mut forgotten = 0;
        for chunk in names.chunks(FORGET_CHUNK_SIZE) {
            forgotten +=
                sqlx::query("DELETE FROM storage_objects WHERE bucket_id = $1 AND name = ANY($2)")
                    .bind(bucket)
                    .bind(chunk)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();
        }
        tx.commit().await?;
        Ok(forgotten)
    }
}

#[async_trait]
impl TokenRepo for PostgresStore {
    async fn create_token(&self, token: &TokenRow) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tokens (
                token_id, user_id, token_hash, expires_at,
                revoked_at, created_at, last_used_at, description
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
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
        let row = sqlx::query_as::<_, TokenRow>("SELECT * FROM tokens WHERE token_hash = $1")
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn get_token(&self, token_id: Uuid) -> MetadataResult<Option<TokenRow>> {
        let row = sqlx::query_as::<_, TokenRow>("SELECT * FROM tokens WHERE token_id = $1")
            .bind(token_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn touch_token(&self, token_id: Uuid, used_at: OffsetDateTime) -> MetadataResult<()> {
        sqlx::query("UPDATE tokens SET last_used_at = $1 WHERE token_id = $2")
            .bind(used_at)
            .bind(token_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn revoke_token(&self, token_id: Uuid, revoked_at: OffsetDateTime) -> MetadataResult<()> {
        sqlx::query("UPDATE tokens SET revoked_at = $1 WHERE token_id = $2")
            .bind(revoked_at)
            .bind(token_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl UserRepo for PostgresStore {
    async fn create_user(&self, user: &UserRow) -> MetadataResult<()> {
        sqlx::query(
            "INSERT INTO users (user_id, email, display_name, created_at) VALUES ($1, $2, $3, $4)",
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
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn get_user_by_email(&self, email: &str) -> MetadataResult<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn grant_role(&self, grant: &DogManagerRow) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO dog_managers (user_id, dog_id, permission_role, created_at)
            SELECT $1, $2, $3, $4
            WHERE NOT EXISTS (
                SELECT 1 FROM dog_managers
                WHERE user_id = $1 AND dog_id IS NOT DISTINCT FROM $2 AND permission_role = $3
            )
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
            "SELECT DISTINCT permission_role FROM dog_managers WHERE user_id = $1 ORDER BY permission_role",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(roles)
    }
}

#[async_trait]
impl BootstrapRepo for PostgresStore {
    async fn get_bootstrap_token_id(&self) -> MetadataResult<Option<Uuid>> {
        // None: no row. Some(None): row with NULL marker.
        let value: Option<Option<Uuid>> =
            sqlx::query_scalar("SELECT bootstrap_token_id FROM bootstrap_state WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;
        Ok(value.flatten())
    }

    async fn set_bootstrap_token_id(&self, token_id: Uuid) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO bootstrap_state (id, bootstrap_token_id)
            VALUES (1, $1)
            ON CONFLICT(id) DO UPDATE
            SET bootstrap_token_id = EXCLUDED.bootstrap_token_id
            "#,
        )
        .bind(token_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_statements_skip_comment_only_chunks() {
        let schema = "-- header\nCREATE TABLE a (x INT);\n-- trailing comment\n;\n  ;CREATE INDEX i ON a(x);";
        let statements = postgres_schema_statements(schema);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].ends_with("CREATE TABLE a (x INT)"));
        assert_eq!(statements[1], "CREATE INDEX i ON a(x)");
    }

    #[test]
    fn embedded_schema_has_no_empty_statements() {
        let statements = postgres_schema_statements(POSTGRES_SCHEMA);
        assert!(statements.iter().any(|s| s.contains("storage_objects")));
        assert!(statements.iter().all(|s| !s.trim().is_empty()));
    }
}
