//! Media store: blob storage kept in step with the storage object catalog.

use bytes::Bytes;
use kennel_metadata::models::StorageObjectRow;
use kennel_metadata::{MetadataError, MetadataStore};
use kennel_storage::{ObjectStore, StorageError};
use std::sync::Arc;
use time::OffsetDateTime;

/// Media store errors.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Catalog(#[from] MetadataError),
}

/// Object storage paired with its catalog.
///
/// Every write records a catalog row and every bulk removal forgets the
/// rows it removed, so the catalog lists exactly what storage holds.
#[derive(Clone)]
pub struct MediaStore {
    storage: Arc<dyn ObjectStore>,
    catalog: Arc<dyn MetadataStore>,
}

impl MediaStore {
    pub fn new(storage: Arc<dyn ObjectStore>, catalog: Arc<dyn MetadataStore>) -> Self {
        Self { storage, catalog }
    }

    /// The underlying object store.
    pub fn storage(&self) -> &Arc<dyn ObjectStore> {
        &self.storage
    }

    /// Store an object and record it in the catalog.
    pub async fn upload(&self, bucket: &str, path: &str, data: Bytes) -> Result<(), MediaError> {
        let size_bytes = i64::try_from(data.len()).unwrap_or(i64::MAX);
        self.storage.put(bucket, path, data).await?;
        self.catalog
            .record_storage_object(&StorageObjectRow {
                bucket_id: bucket.to_string(),
                name: path.to_string(),
                size_bytes,
                created_at: OffsetDateTime::now_utc(),
            })
            .await?;
        tracing::debug!(bucket = %bucket, path = %path, size_bytes, "Media uploaded");
        Ok(())
    }

    /// Remove a batch of objects and forget their catalog rows.
    ///
    /// Fails as a whole if either step fails. Already-missing objects are
    /// not an error, so a failed batch can be retried.
    pub async fn remove_batch(&self, bucket: &str, paths: &[String]) -> Result<(), MediaError> {
        self.storage.remove(bucket, paths).await?;
        let forgotten = self.catalog.forget_storage_objects(bucket, paths).await?;
        tracing::debug!(
            bucket = %bucket,
            removed = paths.len(),
            forgotten,
            "Media batch removed"
        );
        Ok(())
    }
}
