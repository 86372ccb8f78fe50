//! Integration tests for storage reconciliation and orphan pruning.

mod common;

use async_trait::async_trait;
use axum::http::StatusCode;
use bytes::Bytes;
use common::TestServer;
use common::fixtures::{insert_dog, insert_update, public_url, seed_catalog, seeded_bytes};
use common::http::json_request;
use kennel_core::{PermissionRole, ReferenceExtractor};
use kennel_metadata::{MetadataStore, SqliteStore};
use kennel_server::MediaStore;
use kennel_server::prune::{PruneOptions, run_prune};
use kennel_storage::{FilesystemBackend, ObjectStore, StorageError, StorageResult};
use serde_json::json;
use std::sync::Arc;

const PRUNE: &str = "/v1/data-management/prune";

async fn is_stored(storage: &dyn ObjectStore, bucket: &str, path: &str) -> bool {
    match storage.get(bucket, path).await {
        Ok(_) => true,
        Err(StorageError::NotFound(_)) => false,
        Err(e) => panic!("unexpected storage error: {e:?}"),
    }
}

/// Seed one referenced and one unreferenced avatar.
async fn seed_two_objects(server: &TestServer) {
    insert_dog(
        server.metadata().as_ref(),
        "Biscuit",
        Some(public_url("dog-avatars", "x/1.jpg")),
    )
    .await;
    for path in ["x/1.jpg", "x/2.jpg"] {
        server
            .media()
            .upload("dog-avatars", path, seeded_bytes(1, 64))
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_dry_run_reports_single_orphan() {
    let server = TestServer::new().await;
    let token = server.admin_token().await;
    seed_two_objects(&server).await;

    let (status, body) = json_request(&server.router, "POST", PRUNE, None, Some(&token)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["dry_run"], true);
    assert_eq!(body["examined_objects"], 2);
    assert_eq!(body["referenced_objects"], 1);
    assert_eq!(body["orphaned_objects"], json!({"dog-avatars": 1}));
    assert_eq!(body["sample_orphans"], json!({"dog-avatars": ["x/2.jpg"]}));
    assert_eq!(body["truncated"], false);
    assert!(body.get("results").is_none());
}

#[tokio::test]
async fn test_repeated_dry_runs_do_not_mutate() {
    let server = TestServer::new().await;
    let token = server.admin_token().await;
    seed_two_objects(&server).await;

    let uri = format!("{PRUNE}?dry_run=true");
    let (_, first) = json_request(&server.router, "POST", &uri, None, Some(&token)).await;
    let (_, second) = json_request(&server.router, "POST", &uri, None, Some(&token)).await;

    assert_eq!(first, second);
    let storage = server.storage();
    assert!(is_stored(storage.as_ref(), "dog-avatars", "x/1.jpg").await);
    assert!(is_stored(storage.as_ref(), "dog-avatars", "x/2.jpg").await);
}

#[tokio::test]
async fn test_live_prune_deletes_and_is_idempotent() {
    let server = TestServer::new().await;
    let token = server.admin_token().await;
    seed_two_objects(&server).await;

    let uri = format!("{PRUNE}?dry_run=false");
    let (status, body) = json_request(&server.router, "POST", &uri, None, Some(&token)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["dry_run"], false);
    assert!(body.get("sample_orphans").is_none());
    assert_eq!(
        body["results"],
        json!([{"bucket": "dog-avatars", "attempted": 1, "deleted": 1, "errors": []}])
    );

    let storage = server.storage();
    assert!(is_stored(storage.as_ref(), "dog-avatars", "x/1.jpg").await);
    assert!(!is_stored(storage.as_ref(), "dog-avatars", "x/2.jpg").await);

    let (status, again) = json_request(&server.router, "POST", &uri, None, Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["examined_objects"], 1);
    assert_eq!(again["orphaned_objects"], json!({}));
    assert_eq!(again["results"], json!([]));
}

#[tokio::test]
async fn test_update_media_references_are_kept() {
    let server = TestServer::new().await;
    let token = server.admin_token().await;
    let dog = insert_dog(server.metadata().as_ref(), "Pepper", None).await;
    insert_update(
        server.metadata().as_ref(),
        dog.id,
        "first walk",
        vec![
            format!("https://cdn.example.org{}", public_url("dog-updates", "p/walk.mp4")),
            "not a url at all".to_string(),
        ],
    )
    .await;
    for path in ["p/walk.mp4", "p/old.mp4"] {
        server
            .media()
            .upload("dog-updates", path, Bytes::from_static(b"clip"))
            .await
            .unwrap();
    }

    let (_, body) = json_request(&server.router, "POST", PRUNE, None, Some(&token)).await;
    assert_eq!(body["referenced_objects"], 1);
    assert_eq!(body["sample_orphans"], json!({"dog-updates": ["p/old.mp4"]}));
}

#[tokio::test]
async fn test_limit_marks_report_truncated() {
    let server = TestServer::new().await;
    let token = server.admin_token().await;
    seed_two_objects(&server).await;

    let uri = format!("{PRUNE}?limit=1");
    let (status, body) = json_request(&server.router, "POST", &uri, None, Some(&token)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["examined_objects"], 1);
    assert_eq!(body["truncated"], true);
}

#[tokio::test]
async fn test_prune_requires_token() {
    let server = TestServer::new().await;

    let (status, body) = json_request(&server.router, "POST", PRUNE, None, None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthorized");
}

#[tokio::test]
async fn test_prune_requires_admin_role() {
    let server = TestServer::new().await;
    let token = server
        .create_token_with_role(Some(PermissionRole::Viewer))
        .await;

    let (status, body) = json_request(&server.router, "POST", PRUNE, None, Some(&token)).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden");
}

#[tokio::test]
async fn test_prune_open_when_admin_not_required() {
    let server = TestServer::with_config(|config| config.prune.require_admin = false).await;
    seed_two_objects(&server).await;

    let (status, body) = json_request(&server.router, "POST", PRUNE, None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["examined_objects"], 2);
}

#[tokio::test]
async fn test_invalid_query_is_bad_request() {
    let server = TestServer::new().await;
    let token = server.admin_token().await;

    let uri = format!("{PRUNE}?dry_run=maybe");
    let (status, body) = json_request(&server.router, "POST", &uri, None, Some(&token)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "bad_request");
}

/// Object store whose bulk removal fails for any batch containing a
/// path with "locked" in it.
struct LockedPathStore {
    inner: FilesystemBackend,
}

#[async_trait]
impl ObjectStore for LockedPathStore {
    async fn get(&self, bucket: &str, path: &str) -> StorageResult<Bytes> {
        self.inner.get(bucket, path).await
    }

    async fn put(&self, bucket: &str, path: &str, data: Bytes) -> StorageResult<()> {
        self.inner.put(bucket, path, data).await
    }

    async fn remove(&self, bucket: &str, paths: &[String]) -> StorageResult<()> {
        if paths.iter().any(|p| p.contains("locked")) {
            return Err(StorageError::BulkDelete("object is locked".to_string()));
        }
        self.inner.remove(bucket, paths).await
    }

    async fn list(&self, bucket: &str, folder: &str) -> StorageResult<Vec<String>> {
        self.inner.list(bucket, folder).await
    }

    fn backend_name(&self) -> &'static str {
        "locked-path"
    }
}

#[tokio::test]
async fn test_failed_batch_keeps_catalog_rows() {
    let server = TestServer::new().await;
    let temp = tempfile::tempdir().unwrap();
    let storage: Arc<dyn ObjectStore> = Arc::new(LockedPathStore {
        inner: FilesystemBackend::new(temp.path()).await.unwrap(),
    });
    let media = MediaStore::new(storage.clone(), server.metadata());
    for path in ["o/a.jpg", "o/locked.jpg", "o/c.jpg"] {
        media
            .upload("dog-updates", path, Bytes::from_static(b"x"))
            .await
            .unwrap();
    }

    let options = PruneOptions {
        dry_run: false,
        limit: 0,
        batch_size: 1,
        sample_size: 10,
    };
    let extractor = ReferenceExtractor::default();
    let metadata = server.metadata();

    let result = run_prune(metadata.as_ref(), &media, &extractor, options)
        .await
        .unwrap();
    let results = result.results.unwrap();
    assert_eq!(results[0].attempted, 3);
    assert_eq!(results[0].deleted, 2);
    assert_eq!(results[0].errors.len(), 1);
    assert_eq!(results[0].errors[0].path, "o/locked.jpg");
    assert!(results[0].errors[0].message.contains("object is locked"));

    // The failed object is still catalogued and found again on the next run.
    let again = run_prune(metadata.as_ref(), &media, &extractor, options)
        .await
        .unwrap();
    assert_eq!(again.examined_objects, 1);
    assert_eq!(again.orphaned_objects["dog-updates"], 1);
    assert!(is_stored(storage.as_ref(), "dog-updates", "o/locked.jpg").await);
}

#[tokio::test]
async fn test_single_unbounded_batch_converges() {
    let temp = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::new(temp.path().join("metadata.db")).await.unwrap());
    seed_catalog(store.pool(), "dog-updates", 40_000).await;

    let storage: Arc<dyn ObjectStore> =
        Arc::new(FilesystemBackend::new(temp.path().join("storage")).await.unwrap());
    let catalog: Arc<dyn MetadataStore> = store.clone();
    let media = MediaStore::new(storage, catalog);
    let extractor = ReferenceExtractor::default();
    let options = PruneOptions {
        dry_run: false,
        limit: 0,
        batch_size: 0,
        sample_size: 10,
    };

    let result = run_prune(store.as_ref(), &media, &extractor, options)
        .await
        .unwrap();
    let results = result.results.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].attempted, 40_000);
    assert_eq!(results[0].deleted, 40_000);
    assert!(results[0].errors.is_empty());

    let again = run_prune(store.as_ref(), &media, &extractor, options)
        .await
        .unwrap();
    assert_eq!(again.examined_objects, 0);
    assert!(again.orphaned_objects.is_empty());
}
