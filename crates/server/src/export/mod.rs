//! Per-dog archive export.
//!
//! Everything that can fail with a structured error (id validation, the
//! dog lookup and the row reads) happens in [`prepare_export`], before the
//! first byte of the archive is produced. Streaming itself never fails;
//! unreadable media is left out.

pub mod archive;
pub mod plan;

pub use archive::{ArchiveEntry, DataFiles, archive_entries, gzip_stream, sanitize_root, tar_stream};
pub use plan::{ExportMediaSet, is_safe_media_path, plan_media};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use bytes::Bytes;
use futures::Stream;
use kennel_core::DogId;
use kennel_core::csv::to_csv;
use kennel_storage::ObjectStore;
use std::io;
use std::sync::Arc;

/// An export that passed every check and is ready to stream.
pub struct PreparedExport {
    /// Top-level folder inside the archive.
    pub root: String,
    avatars_bucket: String,
    updates_bucket: String,
    data: DataFiles,
    media: ExportMediaSet,
    storage: Arc<dyn ObjectStore>,
}

impl PreparedExport {
    /// Download file name offered to the client.
    pub fn file_name(&self) -> String {
        format!("{}.tar.gz", self.root)
    }

    pub fn media_count(&self) -> usize {
        self.media.len()
    }

    /// The gzip-compressed tar stream.
    pub fn into_stream(self) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
        let entries = archive_entries(
            self.root,
            self.avatars_bucket,
            self.updates_bucket,
            self.data,
            self.media.into_vec(),
            self.storage,
        );
        gzip_stream(tar_stream(entries))
    }
}

/// Load one dog's rows and plan its archive.
pub async fn prepare_export(state: &AppState, dog_id: DogId) -> ApiResult<PreparedExport> {
    let id = *dog_id.as_uuid();
    let dog = state
        .metadata
        .get_dog(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("dog {dog_id} not found")))?;
    let updates = state.metadata.list_dog_updates(id).await?;
    let history = state.metadata.list_dog_history(id).await?;

    let csv_error = |e: kennel_core::Error| ApiError::Internal(format!("csv encoding failed: {e}"));
    let data = DataFiles {
        dog: to_csv(std::slice::from_ref(&dog)).map_err(csv_error)?,
        updates: to_csv(&updates).map_err(csv_error)?,
        history: to_csv(&history).map_err(csv_error)?,
    };

    let buckets = &state.config.buckets;
    let media = plan_media(
        &dog_id,
        &dog,
        &updates,
        &state.extractor,
        buckets,
        state.storage().as_ref(),
    )
    .await;

    Ok(PreparedExport {
        root: sanitize_root(&dog.dog_name, &dog_id.to_string()),
        avatars_bucket: buckets.avatars.clone(),
        updates_bucket: buckets.updates.clone(),
        data,
        media,
        storage: state.storage().clone(),
    })
}
