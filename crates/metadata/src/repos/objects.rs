//! Storage object catalog repository.
//!
//! The catalog mirrors what is physically present in blob storage, one row
//! per object. Enumerating it is a single table scan instead of a walk of
//! every storage folder.

use crate::error::MetadataResult;
use crate::models::StorageObjectRow;
use async_trait::async_trait;

/// Names bound per catalog DELETE statement. Keeps any batch under the
/// SQLite bound-variable limit.
pub const FORGET_CHUNK_SIZE: usize = 500;

#[async_trait]
pub trait StorageObjectRepo: Send + Sync {
    /// Insert or refresh a catalog row.
    async fn record_storage_object(&self, object: &StorageObjectRow) -> MetadataResult<()>;

    /// All catalog rows in `buckets`, ordered by `(bucket_id, name)`.
    ///
    /// `limit` truncates the scan.
    async fn list_storage_objects(
        &self,
        buckets: &[String],
        limit: Option<u64>,
    ) -> MetadataResult<Vec<StorageObjectRow>>;

    /// Remove catalog rows for the given names. Returns the rows removed.
    ///
    /// Any number of names is accepted; the removal is applied atomically.
    async fn forget_storage_objects(&self, bucket: &str, names: &[String])
    -> MetadataResult<u64>;
}
