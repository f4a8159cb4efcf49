//! The entry entity: one user's read/star state for one item.
//!
//! Entries are the highest-volume entity and carry six secondary
//! indexes, one per query shape the reader UI needs. The engine only
//! supports ordered range scans, so each boolean predicate (read,
//! starred) is baked into its own index partition rather than filtered
//! at read time. The `EntryQuery` builder in the `query` module picks
//! the right index.

use crate::entity::{Item, Subscription};
use crate::error::StoreResult;
use crate::object::{self, IndexKey, Object};
use crate::schema::EntityKind;
use chrono::{DateTime, Utc};
use roost_keys::KeyBuilder;
use roost_storage::Transaction;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub(crate) const INDEX_ENTRY_UPDATED: &str = "Updated";
pub(crate) const INDEX_ENTRY_READ_UPDATED: &str = "ReadUpdated";
pub(crate) const INDEX_ENTRY_STAR_UPDATED: &str = "StarUpdated";
pub(crate) const INDEX_ENTRY_FEED_UPDATED: &str = "FeedUpdated";
pub(crate) const INDEX_ENTRY_FEED_READ_UPDATED: &str = "FeedReadUpdated";
pub(crate) const INDEX_ENTRY_FEED_STAR_UPDATED: &str = "FeedStarUpdated";

/// Per-user state for one item, keyed by `userID|itemID`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Owning user.
    #[serde(rename = "userId")]
    pub user_id: String,
    /// The item this state is about.
    #[serde(rename = "itemId")]
    pub item_id: String,
    /// The item's feed, denormalized for feed-scoped queries.
    #[serde(rename = "feedId")]
    pub feed_id: String,
    /// The item's update time, denormalized for time-range queries.
    #[serde(default)]
    pub updated: DateTime<Utc>,
    /// Whether the user has read the item.
    #[serde(default)]
    pub read: bool,
    /// Whether the user has starred the item.
    #[serde(default)]
    pub star: bool,
}

impl Default for Entry {
    fn default() -> Self {
        Entry {
            user_id: String::new(),
            item_id: String::new(),
            feed_id: String::new(),
            updated: DateTime::UNIX_EPOCH,
            read: false,
            star: false,
        }
    }
}

impl Object for Entry {
    const KIND: EntityKind = EntityKind::Entry;

    fn id(&self) -> String {
        Entry::compound_id(&self.user_id, &self.item_id)
    }

    fn index_keys(&self) -> Vec<IndexKey> {
        vec![
            IndexKey::new(
                INDEX_ENTRY_UPDATED,
                KeyBuilder::new()
                    .str(&self.user_id)
                    .time(self.updated)
                    .str(&self.item_id)
                    .build(),
            ),
            IndexKey::new(
                INDEX_ENTRY_READ_UPDATED,
                KeyBuilder::new()
                    .str(&self.user_id)
                    .boolean(self.read)
                    .time(self.updated)
                    .str(&self.item_id)
                    .build(),
            ),
            IndexKey::new(
                INDEX_ENTRY_STAR_UPDATED,
                KeyBuilder::new()
                    .str(&self.user_id)
                    .boolean(self.star)
                    .time(self.updated)
                    .str(&self.item_id)
                    .build(),
            ),
            IndexKey::new(
                INDEX_ENTRY_FEED_UPDATED,
                KeyBuilder::new()
                    .str(&self.user_id)
                    .str(&self.feed_id)
                    .time(self.updated)
                    .str(&self.item_id)
                    .build(),
            ),
            IndexKey::new(
                INDEX_ENTRY_FEED_READ_UPDATED,
                KeyBuilder::new()
                    .str(&self.user_id)
                    .str(&self.feed_id)
                    .boolean(self.read)
                    .time(self.updated)
                    .str(&self.item_id)
                    .build(),
            ),
            IndexKey::new(
                INDEX_ENTRY_FEED_STAR_UPDATED,
                KeyBuilder::new()
                    .str(&self.user_id)
                    .str(&self.feed_id)
                    .boolean(self.star)
                    .time(self.updated)
                    .str(&self.item_id)
                    .build(),
            ),
        ]
    }

    // Natural key, derived from the foreign-key pair.
    fn assign_id(&mut self, _tx: &Transaction) -> StoreResult<()> {
        Ok(())
    }
}

impl Entry {
    /// The compound primary key for a user/item pair.
    #[must_use]
    pub fn compound_id(user_id: &str, item_id: &str) -> String {
        KeyBuilder::new().str(user_id).str(item_id).build()
    }

    /// Creates an unsaved entry.
    #[must_use]
    pub fn new(user_id: &str, item_id: &str, feed_id: &str) -> Self {
        Entry {
            user_id: user_id.to_owned(),
            item_id: item_id.to_owned(),
            feed_id: feed_id.to_owned(),
            ..Entry::default()
        }
    }

    /// Loads an entry by compound ID.
    ///
    /// # Errors
    ///
    /// Engine or codec failures.
    pub fn get(tx: &Transaction, id: &str) -> StoreResult<Option<Entry>> {
        object::get_object(tx, id)
    }

    /// All entries, in compound-ID order.
    ///
    /// # Errors
    ///
    /// Engine or codec failures.
    pub fn all(tx: &Transaction) -> StoreResult<Vec<Entry>> {
        object::range_objects(tx)
    }

    /// Persists the entry.
    ///
    /// # Errors
    ///
    /// Engine or codec failures.
    pub fn save(&mut self, tx: &Transaction) -> StoreResult<()> {
        object::save_object(tx, self)
    }

    /// Deletes an entry by compound ID; deleting a missing ID succeeds.
    ///
    /// # Errors
    ///
    /// Engine or codec failures.
    pub fn delete(tx: &Transaction, id: &str) -> StoreResult<()> {
        object::delete_object::<Entry>(tx, id)
    }

    /// Fans freshly fetched items out to every subscriber of their
    /// feeds, honoring each subscription's auto-read and auto-star
    /// settings.
    ///
    /// # Errors
    ///
    /// Engine or codec failures.
    pub fn add_items(tx: &Transaction, items: &[Item]) -> StoreResult<()> {
        let mut by_feed: BTreeMap<&str, Vec<&Item>> = BTreeMap::new();
        for item in items {
            by_feed.entry(item.feed_id.as_str()).or_default().push(item);
        }

        for (feed_id, feed_items) in by_feed {
            for subscription in Subscription::for_feed(tx, feed_id)? {
                for item in &feed_items {
                    let mut entry =
                        Entry::new(&subscription.user_id, &item.id, &subscription.feed_id);
                    entry.updated = item.updated;
                    entry.read = subscription.auto_read;
                    entry.star = subscription.auto_star;
                    entry.save(tx)?;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use roost_storage::Database;

    #[test]
    fn compound_id_joins_user_and_item() {
        assert_eq!(Entry::compound_id("0000000001", "0000000042"), "0000000001|0000000042");
    }

    #[test]
    fn save_get_roundtrip() {
        let db = Database::memory();
        db.update(|tx| {
            let mut entry = Entry::new("0000000001", "0000000042", "0000000007");
            entry.star = true;
            entry.save(tx)
        })
        .expect("update");

        let entry = db
            .select(|tx| Entry::get(tx, &Entry::compound_id("0000000001", "0000000042")))
            .expect("select")
            .expect("entry");
        assert!(entry.star);
        assert!(!entry.read);
    }

    #[test]
    fn add_items_fans_out_per_subscription() {
        let db = Database::memory();
        db.update(|tx| {
            let mut reader = Subscription::new("0000000001", "0000000007");
            reader.save(tx)?;
            let mut archiver = Subscription::new("0000000002", "0000000007");
            archiver.auto_read = true;
            archiver.auto_star = true;
            archiver.save(tx)?;

            let mut item = Item::new("0000000007", "guid-1");
            item.save(tx)?;
            Entry::add_items(tx, &[item])?;
            Ok::<(), StoreError>(())
        })
        .expect("update");

        db.select(|tx| {
            let plain = Entry::get(tx, &Entry::compound_id("0000000001", "0000000001"))?
                .expect("reader entry");
            assert!(!plain.read && !plain.star);
            let auto = Entry::get(tx, &Entry::compound_id("0000000002", "0000000001"))?
                .expect("archiver entry");
            assert!(auto.read && auto.star);
            Ok::<(), StoreError>(())
        })
        .expect("select");
    }

    #[test]
    fn add_items_without_subscribers_writes_nothing() {
        let db = Database::memory();
        db.update(|tx| {
            let mut item = Item::new("0000000007", "guid-1");
            item.save(tx)?;
            Entry::add_items(tx, &[item])
        })
        .expect("update");

        let entries = db.select(|tx| Entry::all(tx)).expect("select");
        assert!(entries.is_empty());
    }
}
