//! Dog repository.

use crate::error::MetadataResult;
use crate::models::{DogPictureRow, DogRow};
use async_trait::async_trait;
use uuid::Uuid;

/// Repository for dog records.
#[async_trait]
pub trait DogRepo: Send + Sync {
    /// Create a dog.
    async fn create_dog(&self, dog: &DogRow) -> MetadataResult<()>;

    /// Get a dog by ID.
    async fn get_dog(&self, id: Uuid) -> MetadataResult<Option<DogRow>>;

    /// Replace (or clear) a dog's picture reference.
    async fn set_dog_picture(&self, id: Uuid, dog_picture: Option<&str>) -> MetadataResult<()>;

    /// Every dog's picture column, for reference collection.
    async fn list_dog_pictures(&self) -> MetadataResult<Vec<DogPictureRow>>;
}
