//! User and role repository.

use crate::error::MetadataResult;
use crate::models::{DogManagerRow, UserRow};
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn create_user(&self, user: &UserRow) -> MetadataResult<()>;

    async fn get_user(&self, user_id: Uuid) -> MetadataResult<Option<UserRow>>;

    async fn get_user_by_email(&self, email: &str) -> MetadataResult<Option<UserRow>>;

    /// Grant a role. Granting an existing `(user, dog, role)` is a no-op.
    async fn grant_role(&self, grant: &DogManagerRow) -> MetadataResult<()>;

    /// Distinct role names held by a user across all dogs.
    async fn list_roles(&self, user_id: Uuid) -> MetadataResult<Vec<String>>;
}
