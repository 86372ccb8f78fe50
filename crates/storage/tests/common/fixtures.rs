use bytes::Bytes;
use kennel_storage::{FilesystemBackend, ObjectStore};
use std::sync::Arc;
use tempfile::TempDir;

/// Generate deterministic test data using a seeded pseudo-random generator.
#[allow(dead_code)]
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    for chunk in data.chunks_mut(8) {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

/// Filesystem store rooted in a temp dir that lives as long as the value.
#[allow(dead_code)]
pub struct TempStore {
    pub store: Arc<dyn ObjectStore>,
    pub dir: TempDir,
}

#[allow(dead_code)]
impl TempStore {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp directory");
        let backend = FilesystemBackend::new(dir.path())
            .await
            .expect("Failed to create filesystem backend");
        Self {
            store: Arc::new(backend),
            dir,
        }
    }
}
