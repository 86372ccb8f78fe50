#[path = "../src/api_client.rs"]
#[allow(dead_code)] // Some methods are used by the binary but not by tests
mod api_client;

use api_client::{ApiClient, PruneRequest};
use httpmock::Method::{GET, POST};
use httpmock::MockServer;
use serde_json::json;
use std::net::TcpListener;

fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

#[tokio::test]
async fn api_client_prune_dry_run() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    let token = "secret-token";

    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/data-management/prune")
            .query_param("dry_run", "true")
            .query_param("limit", "50")
            .header("authorization", format!("Bearer {token}"));
        then.status(200).json_body(json!({
            "dry_run": true,
            "examined_objects": 2,
            "referenced_objects": 1,
            "orphaned_objects": {"dog-avatars": 1},
            "sample_orphans": {"dog-avatars": ["x/2.jpg"]},
            "truncated": false
        }));
    });

    let client = ApiClient::new(&server.base_url(), token).unwrap();
    let report = client
        .prune(&PruneRequest {
            dry_run: true,
            limit: Some(50),
            batch_size: None,
        })
        .await
        .unwrap();

    mock.assert();
    assert!(report.dry_run);
    assert_eq!(report.examined_objects, 2);
    assert_eq!(report.orphan_total(), 1);
    assert_eq!(
        report.sample_orphans.unwrap()["dog-avatars"],
        vec!["x/2.jpg".to_string()]
    );
    assert!(report.results.is_none());
}

#[tokio::test]
async fn api_client_prune_live_results() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST)
            .path("/v1/data-management/prune")
            .query_param("dry_run", "false")
            .query_param("batch_size", "25");
        then.status(200).json_body(json!({
            "dry_run": false,
            "examined_objects": 6,
            "referenced_objects": 3,
            "orphaned_objects": {"dog-updates": 3},
            "results": [{
                "bucket": "dog-updates",
                "attempted": 3,
                "deleted": 2,
                "errors": [{"path": "a/1.mp4", "message": "bulk delete failed: denied"}]
            }],
            "truncated": false
        }));
    });

    let client = ApiClient::new(&server.base_url(), "t").unwrap();
    let report = client
        .prune(&PruneRequest {
            dry_run: false,
            limit: None,
            batch_size: Some(25),
        })
        .await
        .unwrap();

    assert_eq!(report.deleted_total(), 2);
    assert_eq!(report.error_total(), 1);
    assert!(report.sample_orphans.is_none());
}

#[tokio::test]
async fn api_client_health_without_token() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/v1/health");
        then.status(200)
            .json_body(json!({"status": "ok", "version": "0.1.0"}));
    });

    let client = ApiClient::new(&server.base_url(), "").unwrap();
    let health = client.health().await.unwrap();
    assert_eq!(health.status, "ok");
    assert_eq!(health.version, "0.1.0");
}

#[tokio::test]
async fn api_client_export_returns_streamable_response() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    let dog_id = "7f9c1f3e-2b4d-4e6a-9c1d-0a2b3c4d5e6f";
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/dogs/export")
            .header("authorization", "Bearer t")
            .json_body(json!({"dog_id": dog_id}));
        then.status(200)
            .header("content-type", "application/gzip")
            .body(b"archive-bytes".as_slice());
    });

    let client = ApiClient::new(&server.base_url(), "t").unwrap();
    let response = client.export_dog(dog_id).await.unwrap();
    mock.assert();
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "application/gzip"
    );
    assert_eq!(response.bytes().await.unwrap().as_ref(), b"archive-bytes");
}

#[tokio::test]
async fn api_client_error_includes_status_and_body() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/v1/dogs/export");
        then.status(404)
            .json_body(json!({"error": "dog not found", "code": "not_found"}));
    });

    let client = ApiClient::new(&server.base_url(), "t").unwrap();
    let err = client
        .export_dog("7f9c1f3e-2b4d-4e6a-9c1d-0a2b3c4d5e6f")
        .await
        .unwrap_err()
        .to_string();
    assert!(err.contains("404"));
    assert!(err.contains("not_found"));
}

#[test]
fn api_client_rejects_invalid_url() {
    assert!(ApiClient::new("not a url", "t").is_err());
}
