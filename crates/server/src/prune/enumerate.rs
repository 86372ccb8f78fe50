//! Object enumeration from the storage catalog.

use kennel_metadata::MetadataResult;
use kennel_metadata::models::StorageObjectRow;
use kennel_metadata::repos::StorageObjectRepo;

/// Objects physically present in the known buckets.
#[derive(Debug, Clone)]
pub struct Enumeration {
    /// Catalog rows ordered by `(bucket_id, name)`.
    pub objects: Vec<StorageObjectRow>,
    /// True when a limit was applied; the result is then a prefix of the catalog.
    pub truncated: bool,
}

/// One catalog scan over `buckets`. A `limit` of zero means no limit.
pub async fn enumerate_objects<S>(
    store: &S,
    buckets: &[String],
    limit: u64,
) -> MetadataResult<Enumeration>
where
    S: StorageObjectRepo + ?Sized,
{
    let truncated = limit > 0;
    if truncated {
        tracing::warn!(
            limit,
            "Object enumeration is limited; the prune report covers a prefix of storage only"
        );
    }

    let objects = store
        .list_storage_objects(buckets, truncated.then_some(limit))
        .await?;

    Ok(Enumeration { objects, truncated })
}
