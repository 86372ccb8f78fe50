//! S3-compatible storage backend using AWS SDK.
//!
//! All logical buckets share one physical bucket; an object lives at
//! `[{prefix}/]{bucket}/{path}`.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ObjectStore, normalize_folder, validate_bucket};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use bytes::Bytes;
use std::time::Duration;
use tracing::instrument;

/// Maximum keys accepted by a single DeleteObjects request.
const MAX_DELETE_KEYS: usize = 1000;

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

fn map_s3_operation_error<E>(err: SdkError<E>) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    StorageError::S3(Box::new(err))
}

fn is_not_found<E>(err: &SdkError<E>) -> bool {
    matches!(err, SdkError::ServiceError(service_err) if service_err.raw().status().as_u16() == 404)
}

/// S3-compatible object store using AWS SDK.
pub struct S3Backend {
    client: Client,
    bucket: String,
    prefix: Option<String>,
}

impl std::fmt::Debug for S3Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Backend")
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl S3Backend {
    /// Create a new S3 backend.
    ///
    /// Without explicit credentials the AWS default provider chain is used.
    /// `force_path_style` selects `endpoint/bucket/key` URLs, which MinIO and
    /// most self-hosted S3 implementations need.
    pub async fn new(
        bucket: &str,
        endpoint: Option<String>,
        region: Option<String>,
        prefix: Option<String>,
        access_key_id: Option<String>,
        secret_access_key: Option<String>,
        force_path_style: bool,
    ) -> StorageResult<Self> {
        let region = aws_config::Region::new(region.unwrap_or_else(|| "us-east-1".to_string()));

        let mut builder = match (access_key_id, secret_access_key) {
            (Some(key_id), Some(secret)) => {
                let credentials =
                    aws_sdk_s3::config::Credentials::new(key_id, secret, None, None, "kennel-config");
                aws_sdk_s3::config::Builder::new()
                    .behavior_version(BehaviorVersion::latest())
                    .region(region)
                    .credentials_provider(credentials)
            }
            (None, None) => {
                let shared = aws_config::defaults(BehaviorVersion::latest())
                    .region(region)
                    .load()
                    .await;
                aws_sdk_s3::config::Builder::from(&shared)
            }
            _ => {
                return Err(StorageError::Config(
                    "s3 config requires both access_key_id and secret_access_key when either is set"
                        .to_string(),
                ));
            }
        };

        if let Some(endpoint) = endpoint {
            // Bare host:port endpoints (e.g. "minio:9000") default to http
            let lower = endpoint.to_ascii_lowercase();
            let endpoint = if lower.starts_with("http://") || lower.starts_with("https://") {
                endpoint
            } else {
                format!("http://{endpoint}")
            };
            builder = builder.endpoint_url(endpoint);
        }

        if force_path_style {
            builder = builder.force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: bucket.to_string(),
            prefix: prefix
                .map(|p| p.trim_matches('/').to_string())
                .filter(|p| !p.is_empty()),
        })
    }

    /// Physical key for a logical object.
    fn full_key(&self, bucket: &str, path: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}/{bucket}/{path}"),
            None => format!("{bucket}/{path}"),
        }
    }

    /// Physical listing prefix (with trailing slash) for a logical folder.
    fn folder_prefix(&self, bucket: &str, folder: &str) -> String {
        let folder = normalize_folder(folder);
        let logical = if folder.is_empty() {
            format!("{bucket}/")
        } else {
            format!("{bucket}/{folder}/")
        };
        match &self.prefix {
            Some(prefix) => format!("{prefix}/{logical}"),
            None => logical,
        }
    }

    async fn delete_chunk(&self, bucket: &str, paths: &[String]) -> StorageResult<()> {
        let objects = paths
            .iter()
            .map(|p| {
                ObjectIdentifier::builder()
                    .key(self.full_key(bucket, p))
                    .build()
                    .map_err(|e| StorageError::S3(Box::new(e)))
            })
            .collect::<StorageResult<Vec<_>>>()?;
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(|e| StorageError::S3(Box::new(e)))?;

        let output = self
            .client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| StorageError::BulkDelete(e.to_string()))?;

        // Quiet mode reports only failures
        let errors = output.errors();
        if let Some(first) = errors.first() {
            return Err(StorageError::BulkDelete(format!(
                "{} of {} keys failed, first {}: {}",
                errors.len(),
                paths.len(),
                first.key().unwrap_or("<unknown>"),
                first.message().unwrap_or("no message")
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for S3Backend {
    #[instrument(skip(self), fields(backend = "s3"))]
    async fn get(&self, bucket: &str, path: &str) -> StorageResult<Bytes> {
        validate_bucket(bucket)?;
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.full_key(bucket, path))
            .send()
            .await
            .map_err(|e| {
                if is_not_found(&e) {
                    StorageError::NotFound(format!("{bucket}/{path}"))
                } else {
                    map_s3_operation_error(e)
                }
            })?;

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::S3(Box::new(e)))?
            .into_bytes();

        Ok(bytes)
    }

    #[instrument(skip(self, data), fields(backend = "s3", size = data.len()))]
    async fn put(&self, bucket: &str, path: &str, data: Bytes) -> StorageResult<()> {
        validate_bucket(bucket)?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.full_key(bucket, path))
            .body(data.into())
            .send()
            .await
            .map_err(map_s3_operation_error)?;
        Ok(())
    }

    #[instrument(skip(self, paths), fields(backend = "s3", count = paths.len()))]
    async fn remove(&self, bucket: &str, paths: &[String]) -> StorageResult<()> {
        validate_bucket(bucket)?;
        for chunk in paths.chunks(MAX_DELETE_KEYS) {
            self.delete_chunk(bucket, chunk).await?;
        }
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn list(&self, bucket: &str, folder: &str) -> StorageResult<Vec<String>> {
        validate_bucket(bucket)?;
        let listing_prefix = self.folder_prefix(bucket, folder);
        let mut names = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&listing_prefix)
                .delimiter("/");

            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }

            let output = request.send().await.map_err(map_s3_operation_error)?;

            for obj in output.contents() {
                if let Some(name) = obj.key().and_then(|k| k.strip_prefix(&listing_prefix))
                    && !name.is_empty()
                {
                    names.push(name.to_string());
                }
            }

            if output.is_truncated() == Some(true) {
                continuation_token = output.next_continuation_token().map(|s| s.to_string());
            } else {
                break;
            }
        }

        names.sort();
        Ok(names)
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn health_check(&self) -> StorageResult<()> {
        let check = self.client.head_bucket().bucket(&self.bucket).send();
        tokio::time::timeout(HEALTH_CHECK_TIMEOUT, check)
            .await
            .map_err(|_| {
                StorageError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!(
                        "S3 health check timed out after {}s",
                        HEALTH_CHECK_TIMEOUT.as_secs()
                    ),
                ))
            })?
            .map_err(map_s3_operation_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn backend(prefix: Option<&str>) -> S3Backend {
        S3Backend::new(
            "media",
            Some("localhost:9000".to_string()),
            Some("us-east-1".to_string()),
            prefix.map(str::to_string),
            Some("access".to_string()),
            Some("secret".to_string()),
            true,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_full_key_layout() {
        let plain = backend(None).await;
        assert_eq!(plain.full_key("dog-avatars", "a/1.jpg"), "dog-avatars/a/1.jpg");

        let prefixed = backend(Some("/prod/")).await;
        assert_eq!(
            prefixed.full_key("dog-avatars", "a/1.jpg"),
            "prod/dog-avatars/a/1.jpg"
        );
    }

    #[tokio::test]
    async fn test_folder_prefix_layout() {
        let prefixed = backend(Some("prod")).await;
        assert_eq!(prefixed.folder_prefix("dog-avatars", "abc/"), "prod/dog-avatars/abc/");
        assert_eq!(prefixed.folder_prefix("dog-avatars", ""), "prod/dog-avatars/");
    }

    #[tokio::test]
    async fn test_empty_prefix_is_ignored() {
        let b = backend(Some("/")).await;
        assert_eq!(b.full_key("x", "y"), "x/y");
    }

    #[tokio::test]
    async fn test_partial_credentials_rejected() {
        let result = S3Backend::new(
            "media",
            None,
            None,
            None,
            Some("access".to_string()),
            None,
            false,
        )
        .await;
        assert!(matches!(result, Err(StorageError::Config(_))));
    }
}
