//! Storage reconciliation and orphan pruning.
//!
//! A run collects every reference held by live rows, then enumerates the
//! storage catalog for the known buckets and partitions it into referenced
//! objects and orphans. A dry run reports the partition; a live run deletes
//! the orphans in batches.
//!
//! The reference snapshot is taken strictly before the object snapshot. An
//! object uploaded and referenced between the two snapshots is reported as
//! an orphan, so operators should dry-run first and prune in quiet windows.

pub mod collect;
pub mod delete;
pub mod enumerate;
pub mod reconcile;

pub use collect::{ReferenceSet, collect_references};
pub use delete::{BucketDeletionResult, BulkRemover, DeletionError, delete_orphans};
pub use enumerate::{Enumeration, enumerate_objects};
pub use reconcile::{OrphanPartition, reconcile};

use crate::metrics::{PRUNE_DURATION, PRUNE_OBJECTS_EXAMINED, PRUNE_ORPHANS_FOUND, PRUNE_RUNS};
use kennel_core::ReferenceExtractor;
use kennel_metadata::MetadataResult;
use kennel_metadata::repos::{DogRepo, DogUpdateRepo, StorageObjectRepo};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;

/// Parameters of one prune run.
#[derive(Debug, Clone, Copy)]
pub struct PruneOptions {
    /// Report without deleting.
    pub dry_run: bool,
    /// Maximum objects to enumerate; zero means unlimited.
    pub limit: u64,
    /// Paths per bulk-delete call; non-positive means one call per bucket.
    pub batch_size: i64,
    /// Orphan paths per bucket included in dry-run reports.
    pub sample_size: usize,
}

/// Report of a prune run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneResult {
    pub dry_run: bool,
    pub examined_objects: usize,
    pub referenced_objects: usize,
    /// Orphan count per bucket. Buckets without orphans are omitted.
    pub orphaned_objects: BTreeMap<String, usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_orphans: Option<BTreeMap<String, Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<BucketDeletionResult>>,
    /// The enumeration was limited and covers a prefix of storage only.
    pub truncated: bool,
}

/// Run one reconciliation against `store`, deleting through `remover` unless
/// this is a dry run.
///
/// Any read failure aborts the run before anything is deleted.
pub async fn run_prune<S, R>(
    store: &S,
    remover: &R,
    extractor: &ReferenceExtractor,
    options: PruneOptions,
) -> MetadataResult<PruneResult>
where
    S: DogRepo + DogUpdateRepo + StorageObjectRepo + ?Sized,
    R: BulkRemover + ?Sized,
{
    let started = Instant::now();
    let mode = if options.dry_run { "dry_run" } else { "live" };
    tracing::info!(
        mode,
        limit = options.limit,
        batch_size = options.batch_size,
        "Prune run started"
    );

    let references = collect_references(store, extractor).await?;
    let enumeration = enumerate_objects(store, extractor.known_buckets(), options.limit).await?;
    let partition = reconcile(&enumeration.objects, &references);

    PRUNE_RUNS.with_label_values(&[mode]).inc();
    PRUNE_OBJECTS_EXAMINED.inc_by(enumeration.objects.len() as u64);
    for (bucket, count) in partition.counts() {
        PRUNE_ORPHANS_FOUND
            .with_label_values(&[bucket.as_str()])
            .inc_by(count as u64);
    }

    let (sample_orphans, results) = if options.dry_run {
        (Some(partition.sample(options.sample_size)), None)
    } else {
        let results = delete_orphans(remover, &partition.orphans, options.batch_size).await;
        (None, Some(results))
    };

    let result = PruneResult {
        dry_run: options.dry_run,
        examined_objects: enumeration.objects.len(),
        referenced_objects: partition.keep_count,
        orphaned_objects: partition.counts(),
        sample_orphans,
        results,
        truncated: enumeration.truncated,
    };

    let elapsed = started.elapsed();
    PRUNE_DURATION.observe(elapsed.as_secs_f64());
    tracing::info!(
        mode,
        examined = result.examined_objects,
        referenced = result.referenced_objects,
        orphans = partition.orphan_count(),
        truncated = result.truncated,
        duration_ms = elapsed.as_millis() as u64,
        "Prune run finished"
    );

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kennel_metadata::SqliteStore;
    use kennel_metadata::models::{DogRow, StorageObjectRow};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use time::OffsetDateTime;
    use uuid::Uuid;

    #[derive(Default)]
    struct CountingRemover {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl BulkRemover for CountingRemover {
        async fn remove_batch(&self, _bucket: &str, _paths: &[String]) -> Result<(), String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn options(dry_run: bool) -> PruneOptions {
        PruneOptions {
            dry_run,
            limit: 0,
            batch_size: 100,
            sample_size: 10,
        }
    }

    async fn two_object_store(temp: &tempfile::TempDir) -> SqliteStore {
        let store = SqliteStore::new(temp.path().join("metadata.db"))
            .await
            .unwrap();
        let now = OffsetDateTime::now_utc();
        store
            .create_dog(&DogRow {
                id: Uuid::new_v4(),
                dog_name: "Juniper".to_string(),
                breed: Some("Labrador".to_string()),
                status: "active".to_string(),
                dog_picture: Some("/storage/v1/object/public/dog-avatars/x/1.jpg".to_string()),
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
        for name in ["x/1.jpg", "x/2.jpg"] {
            store
                .record_storage_object(&StorageObjectRow {
                    bucket_id: "dog-avatars".to_string(),
                    name: name.to_string(),
                    size_bytes: 10,
                    created_at: now,
                })
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn dry_run_reports_without_removing() {
        let temp = tempfile::tempdir().unwrap();
        let store = two_object_store(&temp).await;
        let remover = CountingRemover::default();
        let extractor = ReferenceExtractor::default();

        let result = run_prune(&store, &remover, &extractor, options(true))
            .await
            .unwrap();

        assert!(result.dry_run);
        assert_eq!(result.examined_objects, 2);
        assert_eq!(result.referenced_objects, 1);
        assert_eq!(result.orphaned_objects["dog-avatars"], 1);
        assert_eq!(
            result.sample_orphans.as_ref().unwrap()["dog-avatars"],
            vec!["x/2.jpg".to_string()]
        );
        assert!(result.results.is_none());
        assert!(!result.truncated);
        assert_eq!(remover.calls.load(Ordering::SeqCst), 0);

        let again = run_prune(&store, &remover, &extractor, options(true))
            .await
            .unwrap();
        assert_eq!(again, result);
    }

    #[tokio::test]
    async fn live_run_deletes_orphans() {
        let temp = tempfile::tempdir().unwrap();
        let store = two_object_store(&temp).await;
        let remover = CountingRemover::default();

        let result = run_prune(
            &store,
            &remover,
            &ReferenceExtractor::default(),
            options(false),
        )
        .await
        .unwrap();

        assert!(result.sample_orphans.is_none());
        let results = result.results.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].bucket, "dog-avatars");
        assert_eq!(results[0].attempted, 1);
        assert_eq!(results[0].deleted, 1);
        assert_eq!(remover.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn report_omits_absent_sections() {
        let result = PruneResult {
            dry_run: false,
            examined_objects: 0,
            referenced_objects: 0,
            orphaned_objects: BTreeMap::new(),
            sample_orphans: None,
            results: Some(Vec::new()),
            truncated: false,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("sample_orphans").is_none());
        assert_eq!(json["results"], serde_json::json!([]));
        assert_eq!(json["orphaned_objects"], serde_json::json!({}));
    }
}
