//! Dog update repository.

use crate::error::MetadataResult;
use crate::models::{DogUpdateRow, UpdateMediaRow};
use async_trait::async_trait;
use uuid::Uuid;

/// Repository for dog updates.
#[async_trait]
pub trait DogUpdateRepo: Send + Sync {
    /// Create an update.
    async fn create_dog_update(&self, update: &DogUpdateRow) -> MetadataResult<()>;

    /// Updates for one dog, oldest first.
    async fn list_dog_updates(&self, dog_id: Uuid) -> MetadataResult<Vec<DogUpdateRow>>;

    /// Every update's media column, for reference collection.
    async fn list_update_media(&self) -> MetadataResult<Vec<UpdateMediaRow>>;
}
