//! Fluent range queries over entries.

use crate::entity::{
    Entry, INDEX_ENTRY_FEED_READ_UPDATED, INDEX_ENTRY_FEED_STAR_UPDATED, INDEX_ENTRY_FEED_UPDATED,
    INDEX_ENTRY_READ_UPDATED, INDEX_ENTRY_STAR_UPDATED, INDEX_ENTRY_UPDATED,
};
use crate::error::StoreResult;
use crate::object::{self, Object};
use crate::schema::BUCKET_INDEX;
use chrono::{DateTime, Duration, Utc};
use roost_keys::KeyBuilder;
use roost_storage::Transaction;

/// A composable range query over one user's entries.
///
/// Selects the narrowest index for the requested shape: feed and
/// read/star predicates become key-prefix components rather than
/// post-scan filters, so every query costs one ordered range scan.
///
/// Time bounds default to all of history up to one second past now;
/// the extra second keeps entries saved in the query's own wall-clock
/// second inside the window.
///
/// ```no_run
/// # use roost_model::{Database, EntryQuery, StoreError};
/// # fn demo(db: &Database) -> Result<(), StoreError> {
/// let unread = db.select(|tx| {
///     EntryQuery::new(tx, "0000000001").feed("0000000007").unread()
/// })?;
/// # Ok(())
/// # }
/// ```
#[must_use]
pub struct EntryQuery<'tx> {
    tx: &'tx Transaction,
    user_id: String,
    feed_id: Option<String>,
    min: DateTime<Utc>,
    max: DateTime<Utc>,
}

impl<'tx> EntryQuery<'tx> {
    /// Starts a query over one user's entries.
    pub fn new(tx: &'tx Transaction, user_id: &str) -> Self {
        EntryQuery {
            tx,
            user_id: user_id.to_owned(),
            feed_id: None,
            min: DateTime::UNIX_EPOCH,
            max: roost_keys::truncate(Utc::now() + Duration::seconds(1)),
        }
    }

    /// Restricts the query to one feed.
    pub fn feed(mut self, feed_id: &str) -> Self {
        self.feed_id = Some(feed_id.to_owned());
        self
    }

    /// Sets the inclusive lower time bound, at one-second resolution.
    pub fn min(mut self, min: DateTime<Utc>) -> Self {
        self.min = min;
        self
    }

    /// Sets the exclusive upper time bound, at one-second resolution.
    pub fn max(mut self, max: DateTime<Utc>) -> Self {
        self.max = max;
        self
    }

    /// Counts entries in the window without materializing them.
    ///
    /// # Errors
    ///
    /// Engine failures.
    pub fn count(self) -> StoreResult<u64> {
        let (index, min, max) = self.bounds(None);
        let mut total = 0;
        let mut cursor = self
            .tx
            .bucket(&[BUCKET_INDEX, Entry::KIND.name(), index])
            .cursor();
        let mut entry = cursor.seek(min.as_bytes());
        while let Some((key, _)) = entry {
            if key.as_slice() >= max.as_bytes() {
                break;
            }
            total += 1;
            entry = cursor.next();
        }
        Ok(total)
    }

    /// Entries in the window, oldest first.
    ///
    /// # Errors
    ///
    /// Engine or codec failures.
    pub fn get(self) -> StoreResult<Vec<Entry>> {
        let (index, min, max) = self.bounds(None);
        object::scan_index(self.tx, index, min.as_bytes(), max.as_bytes())
    }

    /// Starred entries in the window, oldest first.
    ///
    /// # Errors
    ///
    /// Engine or codec failures.
    pub fn starred(self) -> StoreResult<Vec<Entry>> {
        let (index, min, max) = self.bounds(Some(true));
        object::scan_index(self.tx, index, min.as_bytes(), max.as_bytes())
    }

    /// Unread entries in the window, oldest first.
    ///
    /// # Errors
    ///
    /// Engine or codec failures.
    pub fn unread(self) -> StoreResult<Vec<Entry>> {
        let (index, min, max) = self.bounds(Some(false));
        object::scan_index(self.tx, index, min.as_bytes(), max.as_bytes())
    }

    /// Picks the index matching the query shape and builds the scan
    /// bounds; `flag` is the read/star partition for the boolean
    /// variants.
    fn bounds(&self, flag: Option<bool>) -> (&'static str, String, String) {
        let index = match (&self.feed_id, flag) {
            (Some(_), None) => INDEX_ENTRY_FEED_UPDATED,
            (None, None) => INDEX_ENTRY_UPDATED,
            // *_READ_UPDATED partitions on the read flag: unread scans
            // the false partition. *_STAR_UPDATED partitions on star:
            // starred scans the true partition.
            (Some(_), Some(false)) => INDEX_ENTRY_FEED_READ_UPDATED,
            (None, Some(false)) => INDEX_ENTRY_READ_UPDATED,
            (Some(_), Some(true)) => INDEX_ENTRY_FEED_STAR_UPDATED,
            (None, Some(true)) => INDEX_ENTRY_STAR_UPDATED,
        };

        let prefix = |bound: DateTime<Utc>| {
            let mut builder = KeyBuilder::new().str(&self.user_id);
            if let Some(feed_id) = &self.feed_id {
                builder = builder.str(feed_id);
            }
            if let Some(flag) = flag {
                builder = builder.boolean(flag);
            }
            builder.time(bound).build()
        };

        (index, prefix(self.min), prefix(self.max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use roost_storage::Database;

    fn seed(tx: &Transaction, base: DateTime<Utc>) -> Result<(), StoreError> {
        let rows: [(&str, &str, &str, i64, bool, bool); 5] = [
            ("0000000001", "0000000101", "0000000007", 0, false, false),
            ("0000000001", "0000000102", "0000000007", 1, true, false),
            ("0000000001", "0000000103", "0000000008", 2, false, true),
            ("0000000001", "0000000104", "0000000008", 3, true, true),
            ("0000000002", "0000000101", "0000000007", 0, false, false),
        ];
        for (user, item, feed, hours, read, star) in rows {
            let mut entry = Entry::new(user, item, feed);
            entry.updated = base + Duration::hours(hours);
            entry.read = read;
            entry.star = star;
            entry.save(tx)?;
        }
        Ok(())
    }

    #[test]
    fn count_and_get_agree() {
        let db = Database::memory();
        let base = roost_keys::truncate(Utc::now()) - Duration::hours(10);
        db.update(|tx| seed(tx, base)).expect("seed");
        db.select(|tx| {
            let count = EntryQuery::new(tx, "0000000001").count()?;
            let entries = EntryQuery::new(tx, "0000000001").get()?;
            assert_eq!(count, 4);
            assert_eq!(entries.len(), 4);
            Ok::<(), StoreError>(())
        })
        .expect("select");
    }

    #[test]
    fn results_are_scoped_to_the_user() {
        let db = Database::memory();
        let base = roost_keys::truncate(Utc::now()) - Duration::hours(10);
        db.update(|tx| seed(tx, base)).expect("seed");
        db.select(|tx| {
            let entries = EntryQuery::new(tx, "0000000002").get()?;
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].user_id, "0000000002");
            Ok::<(), StoreError>(())
        })
        .expect("select");
    }

    #[test]
    fn feed_filter_narrows_the_scan() {
        let db = Database::memory();
        let base = roost_keys::truncate(Utc::now()) - Duration::hours(10);
        db.update(|tx| seed(tx, base)).expect("seed");
        db.select(|tx| {
            let entries = EntryQuery::new(tx, "0000000001").feed("0000000008").get()?;
            assert_eq!(entries.len(), 2);
            assert!(entries.iter().all(|e| e.feed_id == "0000000008"));
            Ok::<(), StoreError>(())
        })
        .expect("select");
    }

    #[test]
    fn unread_and_starred_partitions() {
        let db = Database::memory();
        let base = roost_keys::truncate(Utc::now()) - Duration::hours(10);
        db.update(|tx| seed(tx, base)).expect("seed");
        db.select(|tx| {
            let unread = EntryQuery::new(tx, "0000000001").unread()?;
            assert_eq!(unread.len(), 2);
            assert!(unread.iter().all(|e| !e.read));

            let starred = EntryQuery::new(tx, "0000000001").starred()?;
            assert_eq!(starred.len(), 2);
            assert!(starred.iter().all(|e| e.star));

            let starred_feed = EntryQuery::new(tx, "0000000001")
                .feed("0000000008")
                .starred()?;
            assert_eq!(starred_feed.len(), 2);
            Ok::<(), StoreError>(())
        })
        .expect("select");
    }

    #[test]
    fn time_bounds_are_inclusive_min_exclusive_max() {
        let db = Database::memory();
        let base = roost_keys::truncate(Utc::now()) - Duration::hours(10);
        db.update(|tx| seed(tx, base)).expect("seed");
        db.select(|tx| {
            let entries = EntryQuery::new(tx, "0000000001")
                .min(base + Duration::hours(1))
                .max(base + Duration::hours(3))
                .get()?;
            let items: Vec<&str> = entries.iter().map(|e| e.item_id.as_str()).collect();
            assert_eq!(items, ["0000000102", "0000000103"]);
            Ok::<(), StoreError>(())
        })
        .expect("select");
    }

    #[test]
    fn default_window_includes_entries_saved_this_second() {
        let db = Database::memory();
        db.update(|tx| {
            let mut entry = Entry::new("0000000001", "0000000101", "0000000007");
            entry.updated = Utc::now();
            entry.save(tx)
        })
        .expect("update");
        let count = db
            .select(|tx| EntryQuery::new(tx, "0000000001").count())
            .expect("select");
        assert_eq!(count, 1);
    }

    #[test]
    fn entries_come_back_oldest_first() {
        let db = Database::memory();
        let base = roost_keys::truncate(Utc::now()) - Duration::hours(10);
        db.update(|tx| seed(tx, base)).expect("seed");
        db.select(|tx| {
            let entries = EntryQuery::new(tx, "0000000001").get()?;
            let mut sorted = entries.clone();
            sorted.sort_by_key(|e| e.updated);
            assert_eq!(entries, sorted);
            Ok::<(), StoreError>(())
        })
        .expect("select");
    }
}
