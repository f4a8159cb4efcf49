//! Immutable snapshot of the whole store.

use std::collections::BTreeMap;
use std::sync::Arc;

/// Path separator between nested bucket names.
///
/// Bucket names come from a fixed schema vocabulary and never contain
/// this character.
pub(crate) const PATH_SEP: char = '/';

/// Ordered key/value map of a single bucket.
pub(crate) type BucketMap = BTreeMap<Vec<u8>, Vec<u8>>;

/// The entire store at one point in time.
///
/// Buckets are shared through `Arc`, so cloning a snapshot is cheap and
/// a write transaction only deep-copies the buckets it actually touches
/// (`Arc::make_mut`).
#[derive(Debug, Default, Clone)]
pub(crate) struct Snapshot {
    buckets: BTreeMap<String, Arc<BucketMap>>,
}

impl Snapshot {
    /// Joins bucket path segments into the internal path string.
    pub(crate) fn path_of(names: &[&str]) -> String {
        names.join(&PATH_SEP.to_string())
    }

    /// Returns the bucket at `path`, if it exists.
    pub(crate) fn bucket(&self, path: &str) -> Option<&Arc<BucketMap>> {
        self.buckets.get(path)
    }

    /// Returns a mutable view of the bucket at `path`, creating it if
    /// absent.
    pub(crate) fn bucket_mut(&mut self, path: &str) -> &mut BucketMap {
        Arc::make_mut(
            self.buckets
                .entry(path.to_owned())
                .or_insert_with(|| Arc::new(BTreeMap::new())),
        )
    }

    /// Removes the bucket at `path` and every bucket nested below it.
    pub(crate) fn drop_bucket(&mut self, path: &str) {
        let child_prefix = format!("{path}{PATH_SEP}");
        self.buckets
            .retain(|name, _| name != path && !name.starts_with(&child_prefix));
    }

    /// Iterates all buckets in path order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (&String, &Arc<BucketMap>)> {
        self.buckets.iter()
    }

    /// Inserts a fully built bucket, used when loading from disk.
    pub(crate) fn insert_bucket(&mut self, path: String, map: BucketMap) {
        self.buckets.insert(path, Arc::new(map));
    }
}
