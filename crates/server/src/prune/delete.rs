//! Batched orphan deletion with per-batch failure accounting.

use crate::media::MediaStore;
use crate::metrics::{PRUNE_BATCH_FAILURES, PRUNE_OBJECTS_DELETED};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bulk removal of objects within one bucket.
///
/// A call either removes every path or fails as a whole.
#[async_trait]
pub trait BulkRemover: Send + Sync {
    async fn remove_batch(&self, bucket: &str, paths: &[String]) -> Result<(), String>;
}

#[async_trait]
impl BulkRemover for MediaStore {
    async fn remove_batch(&self, bucket: &str, paths: &[String]) -> Result<(), String> {
        MediaStore::remove_batch(self, bucket, paths)
            .await
            .map_err(|e| e.to_string())
    }
}

/// A path that could not be deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionError {
    pub path: String,
    pub message: String,
}

/// Deletion outcome for one bucket.
///
/// `attempted == deleted + errors.len()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketDeletionResult {
    pub bucket: String,
    pub attempted: usize,
    pub deleted: usize,
    pub errors: Vec<DeletionError>,
}

/// Batch size to use for `len` paths. Non-positive means one batch.
fn effective_batch_size(batch_size: i64, len: usize) -> usize {
    if batch_size <= 0 {
        len.max(1)
    } else {
        usize::try_from(batch_size).unwrap_or(usize::MAX)
    }
}

/// Delete every orphan, one bulk call per batch, sequentially.
///
/// A failed batch records each of its paths with the batch's error message
/// and the run moves on to the next batch.
pub async fn delete_orphans<R>(
    remover: &R,
    orphans: &BTreeMap<String, Vec<String>>,
    batch_size: i64,
) -> Vec<BucketDeletionResult>
where
    R: BulkRemover + ?Sized,
{
    let mut results = Vec::with_capacity(orphans.len());

    for (bucket, paths) in orphans {
        let mut result = BucketDeletionResult {
            bucket: bucket.clone(),
            attempted: paths.len(),
            deleted: 0,
            errors: Vec::new(),
        };

        let size = effective_batch_size(batch_size, paths.len());
        for (index, batch) in paths.chunks(size).enumerate() {
            match remover.remove_batch(bucket, batch).await {
                Ok(()) => {
                    result.deleted += batch.len();
                    PRUNE_OBJECTS_DELETED
                        .with_label_values(&[bucket.as_str()])
                        .inc_by(batch.len() as u64);
                }
                Err(message) => {
                    tracing::warn!(
                        bucket = %bucket,
                        batch = index,
                        batch_len = batch.len(),
                        error = %message,
                        "Bulk delete batch failed"
                    );
                    PRUNE_BATCH_FAILURES
                        .with_label_values(&[bucket.as_str()])
                        .inc();
                    result
                        .errors
                        .extend(batch.iter().map(|path| DeletionError {
                            path: path.clone(),
                            message: message.clone(),
                        }));
                }
            }
        }

        tracing::info!(
            bucket = %bucket,
            attempted = result.attempted,
            deleted = result.deleted,
            failed = result.errors.len(),
            "Orphan deletion finished for bucket"
        );
        results.push(result);
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every call; fails the calls whose index is listed.
    #[derive(Default)]
    struct RecordingRemover {
        calls: Mutex<Vec<(String, Vec<String>)>>,
        fail_calls: Vec<usize>,
    }

    #[async_trait]
    impl BulkRemover for RecordingRemover {
        async fn remove_batch(&self, bucket: &str, paths: &[String]) -> Result<(), String> {
            let mut calls = self.calls.lock().unwrap();
            let index = calls.len();
            calls.push((bucket.to_string(), paths.to_vec()));
            if self.fail_calls.contains(&index) {
                Err(format!("simulated failure {index}"))
            } else {
                Ok(())
            }
        }
    }

    fn orphans(bucket: &str, paths: &[&str]) -> BTreeMap<String, Vec<String>> {
        BTreeMap::from([(
            bucket.to_string(),
            paths.iter().map(|p| p.to_string()).collect(),
        )])
    }

    #[tokio::test]
    async fn middle_batch_failure_is_isolated() {
        let remover = RecordingRemover {
            fail_calls: vec![1],
            ..Default::default()
        };
        let results =
            delete_orphans(&remover, &orphans("dog-updates", &["a", "b", "c"]), 1).await;

        assert_eq!(results.len(), 1);
        let result = &results[0];
        assert_eq!(result.attempted, 3);
        assert_eq!(result.deleted, 2);
        assert_eq!(
            result.errors,
            vec![DeletionError {
                path: "b".to_string(),
                message: "simulated failure 1".to_string(),
            }]
        );
        assert_eq!(remover.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn failed_batch_contributes_every_path() {
        let remover = RecordingRemover {
            fail_calls: vec![0],
            ..Default::default()
        };
        let results =
            delete_orphans(&remover, &orphans("dog-avatars", &["a", "b", "c", "d", "e"]), 2)
                .await;
        let result = &results[0];
        assert_eq!(result.deleted, 3);
        assert_eq!(result.errors.len(), 2);
        assert!(result.errors.iter().all(|e| e.message == "simulated failure 0"));
        assert_eq!(result.attempted, result.deleted + result.errors.len());
    }

    #[tokio::test]
    async fn non_positive_batch_size_is_one_call() {
        for batch_size in [0, -5] {
            let remover = RecordingRemover::default();
            let results =
                delete_orphans(&remover, &orphans("dog-avatars", &["a", "b", "c"]), batch_size)
                    .await;
            assert_eq!(results[0].deleted, 3);
            let calls = remover.calls.lock().unwrap();
            assert_eq!(calls.len(), 1);
            assert_eq!(calls[0].1.len(), 3);
        }
    }

    #[tokio::test]
    async fn buckets_are_independent() {
        let remover = RecordingRemover {
            fail_calls: vec![0],
            ..Default::default()
        };
        let mut all = orphans("dog-avatars", &["a1"]);
        all.extend(orphans("dog-updates", &["u1", "u2"]));

        let results = delete_orphans(&remover, &all, 10).await;
        assert_eq!(results[0].bucket, "dog-avatars");
        assert_eq!(results[0].deleted, 0);
        assert_eq!(results[1].bucket, "dog-updates");
        assert_eq!(results[1].deleted, 2);
        assert!(results[1].errors.is_empty());
    }
}
