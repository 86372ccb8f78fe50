//! Media planning for one dog's archive.

use kennel_core::config::BucketConfig;
use kennel_core::{DogId, ReferenceExtractor, StorageReference};
use kennel_metadata::models::{DogRow, DogUpdateRow};
use kennel_storage::ObjectStore;
use std::collections::HashSet;

/// Deduplicated media references for one dog, in discovery order.
#[derive(Debug, Default, Clone)]
pub struct ExportMediaSet {
    refs: Vec<StorageReference>,
    seen: HashSet<String>,
}

impl ExportMediaSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reference unless an equal one is already present.
    pub fn insert(&mut self, reference: StorageReference) -> bool {
        if self.seen.insert(reference.key()) {
            self.refs.push(reference);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StorageReference> {
        self.refs.iter()
    }

    pub fn into_vec(self) -> Vec<StorageReference> {
        self.refs
    }
}

/// True when `path` can be placed under an archive folder as-is.
pub fn is_safe_media_path(path: &str) -> bool {
    !path.is_empty()
        && !path.starts_with('/')
        && !path.contains('\\')
        && path
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..")
}

/// Collect the media belonging to `dog`.
///
/// The avatar comes from the dog's stored picture reference. Dogs without
/// one fall back to every object stored under their folder in the avatars
/// bucket. Update media is included when it lives in the updates bucket
/// under the dog's folder.
pub async fn plan_media(
    dog_id: &DogId,
    dog: &DogRow,
    updates: &[DogUpdateRow],
    extractor: &ReferenceExtractor,
    buckets: &BucketConfig,
    storage: &dyn ObjectStore,
) -> ExportMediaSet {
    let mut media = ExportMediaSet::new();
    let prefix = dog_id.folder_prefix();

    match extractor.extract(dog.dog_picture.as_deref()) {
        Some(reference) if reference.bucket == buckets.avatars => {
            add_safe(&mut media, reference);
        }
        Some(reference) => {
            tracing::debug!(
                dog_id = %dog_id,
                bucket = %reference.bucket,
                "Dog picture is outside the avatars bucket, ignoring"
            );
        }
        None => {
            let folder = dog_id.to_string();
            match storage.list(&buckets.avatars, &folder).await {
                Ok(names) => {
                    for name in names {
                        add_safe(
                            &mut media,
                            StorageReference::new(buckets.avatars.as_str(), format!("{prefix}{name}")),
                        );
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        dog_id = %dog_id,
                        error = %e,
                        "Avatar folder listing failed, exporting without avatar"
                    );
                }
            }
        }
    }

    for update in updates {
        for url in &update.update_media_urls {
            let Some(reference) = extractor.extract(Some(url.as_str())) else {
                continue;
            };
            if reference.bucket == buckets.updates && reference.path.starts_with(&prefix) {
                add_safe(&mut media, reference);
            }
        }
    }

    tracing::debug!(dog_id = %dog_id, media = media.len(), "Planned export media");
    media
}

fn add_safe(media: &mut ExportMediaSet, reference: StorageReference) {
    if is_safe_media_path(&reference.path) {
        media.insert(reference);
    } else {
        tracing::warn!(
            bucket = %reference.bucket,
            path = %reference.path,
            "Skipping media with unsafe path"
        );
    }
}
