//! Server test utilities.

use kennel_core::config::{AppConfig, MetadataConfig, StorageConfig};
use kennel_core::{PermissionRole, hash_token};
use kennel_metadata::models::{DogManagerRow, TokenRow, UserRow};
use kennel_metadata::{MetadataStore, SqliteStore};
use kennel_server::{AppState, MediaStore, create_router};
use kennel_storage::{FilesystemBackend, ObjectStore};
use std::sync::Arc;
use tempfile::TempDir;
use time::OffsetDateTime;
use uuid::Uuid;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with temporary storage.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let storage_path = temp_dir.path().join("storage");
        let storage: Arc<dyn ObjectStore> = Arc::new(
            FilesystemBackend::new(&storage_path)
                .await
                .expect("Failed to create storage backend"),
        );

        let db_path = temp_dir.path().join("metadata.db");
        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(&db_path)
                .await
                .expect("Failed to create metadata store"),
        );

        let mut config = AppConfig::for_testing();
        config.storage = StorageConfig::Filesystem { path: storage_path };
        config.metadata = MetadataConfig::Sqlite { path: db_path };
        modifier(&mut config);

        let state = AppState::new(config, storage, metadata);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            _temp_dir: temp_dir,
        }
    }

    /// Get access to the underlying metadata.
    pub fn metadata(&self) -> Arc<dyn MetadataStore> {
        self.state.metadata.clone()
    }

    /// Get access to the underlying object store.
    pub fn storage(&self) -> Arc<dyn ObjectStore> {
        self.state.storage().clone()
    }

    /// Storage with catalog bookkeeping.
    pub fn media(&self) -> &MediaStore {
        &self.state.media
    }

    /// Create a user holding `role` (globally) and return a raw token for it.
    pub async fn create_token_with_role(&self, role: Option<PermissionRole>) -> String {
        let metadata = self.metadata();
        let now = OffsetDateTime::now_utc();
        let user = UserRow {
            user_id: Uuid::new_v4(),
            email: format!("{}@example.org", Uuid::new_v4()),
            display_name: Some("Test User".to_string()),
            created_at: now,
        };
        metadata
            .create_user(&user)
            .await
            .expect("Failed to create user");

        if let Some(role) = role {
            metadata
                .grant_role(&DogManagerRow {
                    user_id: user.user_id,
                    dog_id: None,
                    permission_role: role.as_str().to_string(),
                    created_at: now,
                })
                .await
                .expect("Failed to grant role");
        }

        let raw_token = format!("test-token-{}", Uuid::new_v4());
        metadata
            .create_token(&TokenRow {
                token_id: Uuid::new_v4(),
                user_id: user.user_id,
                token_hash: hash_token(&raw_token),
                expires_at: None,
                revoked_at: None,
                created_at: now,
                last_used_at: None,
                description: Some("Test Token".to_string()),
            })
            .await
            .expect("Failed to create token");

        raw_token
    }

    /// Token for a global admin.
    pub async fn admin_token(&self) -> String {
        self.create_token_with_role(Some(PermissionRole::Admin))
            .await
    }
}
