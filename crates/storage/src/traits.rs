//! Storage trait definitions.

use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;

/// Bucketed object store.
///
/// Objects are addressed by a logical bucket name and a `/`-separated path
/// inside that bucket. Backends map buckets to folders or key prefixes.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Get an object's content.
    async fn get(&self, bucket: &str, path: &str) -> StorageResult<Bytes>;

    /// Put an object atomically, replacing any existing content.
    async fn put(&self, bucket: &str, path: &str, data: Bytes) -> StorageResult<()>;

    /// Remove a batch of objects in one call.
    ///
    /// The call either succeeds for the whole batch or returns an error; an
    /// error means the caller must treat every path in the batch as not
    /// deleted. Paths that do not exist are not an error.
    async fn remove(&self, bucket: &str, paths: &[String]) -> StorageResult<()>;

    /// List the names of objects directly inside `folder` (non-recursive).
    ///
    /// `folder` is a path prefix without a trailing slash; an empty folder
    /// lists the bucket root. Names are returned relative to the folder and
    /// sorted. A missing folder lists as empty.
    async fn list(&self, bucket: &str, folder: &str) -> StorageResult<Vec<String>>;

    /// Get the name of this storage backend (e.g. "s3", "filesystem").
    ///
    /// Used for metrics and logging.
    fn backend_name(&self) -> &'static str;

    /// Verify storage backend connectivity.
    ///
    /// Called during server startup; the default implementation returns
    /// Ok(()) for backends that need no verification.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Check a logical bucket name is a single safe path segment.
pub fn validate_bucket(bucket: &str) -> StorageResult<()> {
    let ok = !bucket.is_empty()
        && bucket != "."
        && bucket != ".."
        && bucket
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
    if ok {
        Ok(())
    } else {
        Err(StorageError::InvalidBucket(bucket.to_string()))
    }
}

/// Normalize a folder argument: strip surrounding slashes.
pub fn normalize_folder(folder: &str) -> &str {
    folder.trim_matches('/')
}
