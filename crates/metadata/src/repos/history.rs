//! Dog history repository.

use crate::error::MetadataResult;
use crate::models::DogHistoryRow;
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait DogHistoryRepo: Send + Sync {
    async fn create_history_entry(&self, entry: &DogHistoryRow) -> MetadataResult<()>;

    /// History for one dog in chronological order.
    async fn list_dog_history(&self, dog_id: Uuid) -> MetadataResult<Vec<DogHistoryRow>>;
}
