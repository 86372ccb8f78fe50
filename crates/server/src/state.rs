//! Application state shared across handlers.

use crate::media::MediaStore;
use kennel_core::ReferenceExtractor;
use kennel_core::config::AppConfig;
use kennel_metadata::MetadataStore;
use kennel_storage::ObjectStore;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Metadata store.
    pub metadata: Arc<dyn MetadataStore>,
    /// Object storage with catalog bookkeeping.
    pub media: MediaStore,
    /// Storage URL parser for the configured buckets.
    pub extractor: Arc<ReferenceExtractor>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// Configuration warnings are logged; hard errors are expected to have
    /// been reported by [`AppConfig::validate`] before this point.
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        for warning in config.export.validate() {
            tracing::warn!("Configuration warning: {}", warning);
        }

        let extractor = Arc::new(ReferenceExtractor::from_config(&config.buckets));
        let media = MediaStore::new(storage, metadata.clone());

        Self {
            config: Arc::new(config),
            metadata,
            media,
            extractor,
        }
    }

    /// The underlying object store.
    pub fn storage(&self) -> &Arc<dyn ObjectStore> {
        self.media.storage()
    }
}
