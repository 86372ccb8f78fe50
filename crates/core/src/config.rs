//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    /// SECURITY: When enabled, ensure this endpoint is network-restricted
    /// to authorized Prometheus scraper IPs only at the infrastructure level.
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

/// Bootstrap admin principal.
///
/// When present, the server ensures a user, a token with this hash and a
/// global `admin` role exist at start-up. If the hash changes between
/// restarts, the previous bootstrap token is revoked.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Pre-computed hash of the admin token (SHA256 hex, 64 characters,
    /// optionally prefixed with `sha256:`).
    /// Generate with: `echo -n "your-secret-token" | sha256sum`
    pub token_hash: String,
    /// Email recorded on the bootstrap user.
    #[serde(default = "default_admin_email")]
    pub email: String,
    /// Description for the admin token.
    pub token_description: Option<String>,
}

fn default_admin_email() -> String {
    "admin@localhost".to_string()
}

impl AdminConfig {
    /// Create a test configuration.
    ///
    /// **For testing only.** The hash is SHA256 of "test-admin-token".
    pub fn for_testing() -> Self {
        Self {
            token_hash: "17d6bfe05d1b1fb7bc499f8e3f639c7b3eda4c40f321eef8887a0c04c89a99c5"
                .to_string(),
            email: default_admin_email(),
            token_description: Some("Test admin token".to_string()),
        }
    }
}

/// Storage backend configuration.
///
/// Logical buckets (`dog-avatars`, `dog-updates`) become top-level folders
/// under the filesystem root, or key prefixes inside the single S3 bucket.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
    },
    /// S3-compatible storage.
    S3 {
        /// Physical bucket name.
        bucket: String,
        /// Optional endpoint URL (for MinIO, etc.).
        endpoint: Option<String>,
        /// AWS region.
        region: Option<String>,
        /// Optional key prefix.
        prefix: Option<String>,
        /// AWS access key ID. Falls back to the default credential chain if not set.
        /// WARNING: Prefer env vars or IAM roles over storing secrets in config files.
        access_key_id: Option<String>,
        /// AWS secret access key. Falls back to the default credential chain if not set.
        secret_access_key: Option<String>,
        /// Force path-style URLs (e.g., `endpoint/bucket/key` instead of `bucket.endpoint/key`).
        /// Required for MinIO and some S3-compatible services.
        #[serde(default)]
        force_path_style: bool,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/storage"),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::S3 {
                bucket,
                access_key_id,
                secret_access_key,
                ..
            } => {
                if bucket.is_empty() {
                    return Err("s3 config requires a non-empty bucket".to_string());
                }
                match (access_key_id.as_ref(), secret_access_key.as_ref()) {
                    (Some(_), Some(_)) | (None, None) => Ok(()),
                    _ => Err(
                        "s3 config requires both access_key_id and secret_access_key when either is set"
                            .to_string(),
                    ),
                }
            }
            _ => Ok(()),
        }
    }
}

/// PostgreSQL SSL mode configuration.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PgSslMode {
    /// Disable SSL/TLS entirely.
    Disable,
    /// Prefer SSL/TLS but allow unencrypted connections (default).
    #[default]
    Prefer,
    /// Require SSL/TLS for all connections.
    Require,
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database (recommended for testing and small deployments only).
    Sqlite {
        /// Database file path.
        path: PathBuf,
    },
    /// PostgreSQL database.
    Postgres {
        /// Connection URL. Takes precedence over individual fields.
        url: Option<String>,
        /// Database host.
        host: Option<String>,
        /// Database port (default: 5432).
        #[serde(default = "default_pg_port")]
        port: Option<u16>,
        /// Database username.
        username: Option<String>,
        /// Database password.
        /// WARNING: Prefer KENNEL_METADATA__PASSWORD env var over storing in config.
        password: Option<String>,
        /// Database name.
        database: Option<String>,
        /// SSL mode for connections.
        ssl_mode: Option<PgSslMode>,
        /// Maximum connections in the pool.
        #[serde(default = "default_max_connections")]
        max_connections: u32,
        /// Statement timeout in milliseconds. A full prune scans two tables
        /// and the object catalog, so keep this generous.
        #[serde(default = "default_statement_timeout_ms")]
        statement_timeout_ms: Option<u64>,
    },
}

fn default_max_connections() -> u32 {
    10
}

fn default_pg_port() -> Option<u16> {
    Some(5432)
}

fn default_statement_timeout_ms() -> Option<u64> {
    Some(300_000)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/metadata.db"),
        }
    }
}

impl MetadataConfig {
    /// Validate metadata configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            MetadataConfig::Sqlite { .. } => Ok(()),
            MetadataConfig::Postgres {
                url,
                host,
                database,
                ..
            } => match (url.as_ref(), host.as_ref(), database.as_ref()) {
                (Some(_), _, _) => Ok(()),
                (None, Some(_), Some(_)) => Ok(()),
                (None, None, _) => Err(
                    "postgres config requires either 'url' or 'host' + 'database'".to_string(),
                ),
                (None, Some(_), None) => Err(
                    "postgres config requires 'database' when using individual fields"
                        .to_string(),
                ),
            },
        }
    }
}

/// Known storage buckets and the public URL marker.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BucketConfig {
    /// Bucket holding dog profile pictures.
    #[serde(default = "default_avatars_bucket")]
    pub avatars: String,
    /// Bucket holding update media.
    #[serde(default = "default_updates_bucket")]
    pub updates: String,
    /// Path segment preceding `{bucket}/{path}` in stored public URLs.
    #[serde(default = "default_public_url_marker")]
    pub public_url_marker: String,
}

fn default_avatars_bucket() -> String {
    crate::DEFAULT_AVATARS_BUCKET.to_string()
}

fn default_updates_bucket() -> String {
    crate::DEFAULT_UPDATES_BUCKET.to_string()
}

fn default_public_url_marker() -> String {
    crate::DEFAULT_PUBLIC_URL_MARKER.to_string()
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            avatars: default_avatars_bucket(),
            updates: default_updates_bucket(),
            public_url_marker: default_public_url_marker(),
        }
    }
}

impl BucketConfig {
    pub fn names(&self) -> [&str; 2] {
        [self.avatars.as_str(), self.updates.as_str()]
    }

    pub fn validate(&self) -> Result<(), String> {
        for name in self.names() {
            if name.is_empty() || name.contains('/') {
                return Err(format!("invalid bucket name {name:?}"));
            }
        }
        if self.avatars == self.updates {
            return Err("buckets.avatars and buckets.updates must differ".to_string());
        }
        if !self.public_url_marker.starts_with('/') || !self.public_url_marker.ends_with('/') {
            return Err("buckets.public_url_marker must start and end with '/'".to_string());
        }
        Ok(())
    }
}

/// Orphan prune configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PruneConfig {
    /// Paths per bulk-delete call when the request does not override it.
    #[serde(default = "default_prune_batch_size")]
    pub default_batch_size: i64,
    /// Orphan paths per bucket included in dry-run reports.
    #[serde(default = "default_prune_sample_size")]
    pub sample_size: usize,
    /// Require an admin principal to invoke prune (default: true).
    /// Set to false only when the endpoint is restricted at the network layer.
    #[serde(default = "default_prune_require_admin")]
    pub require_admin: bool,
}

fn default_prune_batch_size() -> i64 {
    100
}

fn default_prune_sample_size() -> usize {
    10
}

fn default_prune_require_admin() -> bool {
    true
}

impl Default for PruneConfig {
    fn default() -> Self {
        Self {
            default_batch_size: default_prune_batch_size(),
            sample_size: default_prune_sample_size(),
            require_admin: default_prune_require_admin(),
        }
    }
}

/// Archive export configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Browser origins allowed to call the export endpoint.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl ExportConfig {
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        self.allowed_origins.iter().any(|o| o == origin)
    }

    /// Returns warnings for settings that are allowed but probably mistakes.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        for origin in &self.allowed_origins {
            if origin == "*" {
                warnings.push(
                    "export.allowed_origins contains '*', which is matched literally \
                     and never as a wildcard"
                        .to_string(),
                );
            } else if origin.ends_with('/') {
                warnings.push(format!(
                    "export.allowed_origins entry {origin:?} has a trailing slash; \
                     browsers never send one"
                ));
            }
        }
        warnings
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Bootstrap admin principal (optional).
    pub admin: Option<AdminConfig>,
    #[serde(default)]
    pub buckets: BucketConfig,
    #[serde(default)]
    pub prune: PruneConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Uses filesystem storage, SQLite metadata and
    /// the test admin token.
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            metadata: MetadataConfig::default(),
            admin: Some(AdminConfig::for_testing()),
            buckets: BucketConfig::default(),
            prune: PruneConfig::default(),
            export: ExportConfig {
                allowed_origins: vec!["http://localhost:5173".to_string()],
            },
        }
    }

    /// Validate every section, returning warnings on success.
    pub fn validate(&self) -> Result<Vec<String>, String> {
        self.storage.validate()?;
        self.metadata.validate()?;
        self.buckets.validate()?;
        if let Some(admin) = &self.admin {
            crate::principal::normalize_token_hash(&admin.token_hash)
                .map_err(|e| format!("invalid admin.token_hash: {e}"))?;
        }
        Ok(self.export.validate())
    }
}
