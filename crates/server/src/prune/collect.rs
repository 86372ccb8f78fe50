//! Reference collection: every storage object a live row points at.

use kennel_core::ReferenceExtractor;
use kennel_core::reference::composite_key;
use kennel_metadata::MetadataResult;
use kennel_metadata::repos::{DogRepo, DogUpdateRepo};
use std::collections::HashSet;

/// Composite `bucket/path` keys referenced by live rows.
#[derive(Debug, Default, Clone)]
pub struct ReferenceSet {
    keys: HashSet<String>,
}

impl ReferenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a composite key. Returns false if it was already present.
    pub fn insert(&mut self, key: String) -> bool {
        self.keys.insert(key)
    }

    pub fn contains(&self, bucket: &str, path: &str) -> bool {
        self.keys.contains(&composite_key(bucket, path))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Scan `dogs.dog_picture` and every element of `dog_updates.update_media_urls`.
///
/// A read failure aborts the scan; a partial set is never returned.
pub async fn collect_references<S>(
    store: &S,
    extractor: &ReferenceExtractor,
) -> MetadataResult<ReferenceSet>
where
    S: DogRepo + DogUpdateRepo + ?Sized,
{
    let mut references = ReferenceSet::new();

    let pictures = store.list_dog_pictures().await?;
    let picture_rows = pictures.len();
    for row in &pictures {
        if let Some(key) = extractor.extract_key(row.dog_picture.as_deref()) {
            references.insert(key);
        }
    }

    let updates = store.list_update_media().await?;
    let update_rows = updates.len();
    for row in &updates {
        for url in &row.update_media_urls {
            if let Some(key) = extractor.extract_key(Some(url.as_str())) {
                references.insert(key);
            }
        }
    }

    tracing::debug!(
        picture_rows,
        update_rows,
        references = references.len(),
        "Collected storage references"
    );

    Ok(references)
}
