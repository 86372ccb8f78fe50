//! Test fixtures for generating test data.

use bytes::Bytes;
use flate2::read::GzDecoder;
use kennel_metadata::MetadataStore;
use kennel_metadata::models::{DogHistoryRow, DogRow, DogUpdateRow};
use std::io::Read;
use time::OffsetDateTime;
use uuid::Uuid;

/// Public URL marker used by the default bucket configuration.
pub const MARKER: &str = "/storage/v1/object/public/";

/// Generate deterministic test data based on a seed.
#[allow(dead_code)]
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    for chunk in data.chunks_mut(8) {
        // Simple LCG for deterministic data
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

/// Relative public URL for an object.
#[allow(dead_code)]
pub fn public_url(bucket: &str, path: &str) -> String {
    format!("{MARKER}{bucket}/{path}")
}

/// Insert a dog and return its row.
#[allow(dead_code)]
pub async fn insert_dog(
    metadata: &dyn MetadataStore,
    name: &str,
    dog_picture: Option<String>,
) -> DogRow {
    let now = OffsetDateTime::now_utc();
    let dog = DogRow {
        id: Uuid::new_v4(),
        dog_name: name.to_string(),
        breed: Some("Golden Retriever".to_string()),
        status: "in_training".to_string(),
        dog_picture,
        created_at: now,
        updated_at: now,
    };
    metadata.create_dog(&dog).await.expect("Failed to create dog");
    dog
}

/// Insert an update carrying `urls` for `dog_id`.
#[allow(dead_code)]
pub async fn insert_update(
    metadata: &dyn MetadataStore,
    dog_id: Uuid,
    content: &str,
    urls: Vec<String>,
) -> DogUpdateRow {
    let update = DogUpdateRow {
        id: Uuid::new_v4(),
        dog_id,
        author_id: None,
        content: Some(content.to_string()),
        update_media_urls: urls,
        approved: true,
        created_at: OffsetDateTime::now_utc(),
    };
    metadata
        .create_dog_update(&update)
        .await
        .expect("Failed to create update");
    update
}

/// Insert a history entry for `dog_id`.
#[allow(dead_code)]
pub async fn insert_history(
    metadata: &dyn MetadataStore,
    dog_id: Uuid,
    event_type: &str,
    notes: Option<&str>,
) -> DogHistoryRow {
    let now = OffsetDateTime::now_utc();
    let entry = DogHistoryRow {
        id: Uuid::new_v4(),
        dog_id,
        event_type: event_type.to_string(),
        notes: notes.map(str::to_string),
        event_date: now,
        created_at: now,
    };
    metadata
        .create_history_entry(&entry)
        .await
        .expect("Failed to create history entry");
    entry
}

/// One decoded archive entry.
#[allow(dead_code)]
#[derive(Debug)]
pub struct DecodedEntry {
    pub path: String,
    pub is_dir: bool,
    pub data: Vec<u8>,
}

/// Decode a tar.gz body into its entries, in archive order.
#[allow(dead_code)]
pub fn decode_archive(body: &[u8]) -> Vec<DecodedEntry> {
    let mut tar_bytes = Vec::new();
    GzDecoder::new(body)
        .read_to_end(&mut tar_bytes)
        .expect("Failed to decompress archive");

    let mut archive = tar::Archive::new(tar_bytes.as_slice());
    archive
        .entries()
        .expect("Failed to read archive")
        .map(|entry| {
            let mut entry = entry.expect("Failed to read entry");
            let path = String::from_utf8(entry.path_bytes().into_owned()).unwrap();
            let is_dir = entry.header().entry_type().is_dir();
            let mut data = Vec::new();
            entry.read_to_end(&mut data).unwrap();
            DecodedEntry { path, is_dir, data }
        })
        .collect()
}

/// Insert `count` catalog rows named `bulk/{i:05}.jpg` into `bucket` in one
/// transaction, without writing blobs. Returns the names.
#[allow(dead_code)]
pub async fn seed_catalog(
    pool: &sqlx::Pool<sqlx::Sqlite>,
    bucket: &str,
    count: usize,
) -> Vec<String> {
    let now = OffsetDateTime::now_utc();
    let names: Vec<String> = (0..count).map(|i| format!("bulk/{i:05}.jpg")).collect();
    let mut tx = pool.begin().await.unwrap();
    for name in &names {
        sqlx::query(
            "INSERT INTO storage_objects (bucket_id, name, size_bytes, created_at) VALUES (?, ?, 1, ?)",
        )
        .bind(bucket)
        .bind(name)
        .bind(now)
        .execute(&mut *tx)
        .await
        .unwrap();
    }
    tx.commit().await.unwrap();
    names
}
