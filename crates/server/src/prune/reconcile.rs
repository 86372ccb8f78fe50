//! Partition enumerated objects into referenced and orphaned.

use super::collect::ReferenceSet;
use kennel_metadata::models::StorageObjectRow;
use std::collections::BTreeMap;

/// Result of reconciling storage against the reference set.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OrphanPartition {
    /// Enumerated objects that some row references.
    pub keep_count: usize,
    /// Unreferenced paths per bucket, in enumeration order.
    pub orphans: BTreeMap<String, Vec<String>>,
}

impl OrphanPartition {
    pub fn orphan_count(&self) -> usize {
        self.orphans.values().map(Vec::len).sum()
    }

    /// Orphan count per bucket.
    pub fn counts(&self) -> BTreeMap<String, usize> {
        self.orphans
            .iter()
            .map(|(bucket, paths)| (bucket.clone(), paths.len()))
            .collect()
    }

    /// First `n` orphan paths per bucket.
    pub fn sample(&self, n: usize) -> BTreeMap<String, Vec<String>> {
        self.orphans
            .iter()
            .map(|(bucket, paths)| (bucket.clone(), paths.iter().take(n).cloned().collect()))
            .collect()
    }
}

/// Single pass over the enumeration. Absence from `references` is the only
/// orphan criterion; references to objects that do not exist are ignored.
pub fn reconcile(objects: &[StorageObjectRow], references: &ReferenceSet) -> OrphanPartition {
    let mut partition = OrphanPartition::default();
    for object in objects {
        if references.contains(&object.bucket_id, &object.name) {
            partition.keep_count += 1;
        } else {
            partition
                .orphans
                .entry(object.bucket_id.clone())
                .or_default()
                .push(object.name.clone());
        }
    }
    partition
}
