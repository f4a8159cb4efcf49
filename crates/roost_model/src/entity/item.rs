//! The item entity: one article as published by a feed.

use crate::config::Config;
use crate::error::StoreResult;
use crate::object::{self, IndexKey, Object};
use crate::schema::EntityKind;
use chrono::{DateTime, Utc};
use roost_keys::KeyBuilder;
use roost_storage::Transaction;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub(crate) const INDEX_GUID: &str = "GUID";

/// An article, shared by every subscriber of its feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Sequence-assigned ID, empty until first save.
    #[serde(default)]
    pub id: String,
    /// Publisher-assigned identifier, unique within the feed.
    pub guid: String,
    /// Owning feed.
    #[serde(rename = "feedId")]
    pub feed_id: String,
    /// When the item was first stored.
    #[serde(default)]
    pub created: DateTime<Utc>,
    /// Publisher's update timestamp.
    #[serde(default)]
    pub updated: DateTime<Utc>,
    /// Link to the article.
    #[serde(default)]
    pub url: String,
    /// Author as published.
    #[serde(default)]
    pub author: String,
    /// Title as published.
    #[serde(default)]
    pub title: String,
    /// Article body.
    #[serde(default)]
    pub content: String,
}

impl Default for Item {
    fn default() -> Self {
        Item {
            id: String::new(),
            guid: String::new(),
            feed_id: String::new(),
            created: DateTime::UNIX_EPOCH,
            updated: DateTime::UNIX_EPOCH,
            url: String::new(),
            author: String::new(),
            title: String::new(),
            content: String::new(),
        }
    }
}

impl Object for Item {
    const KIND: EntityKind = EntityKind::Item;

    fn id(&self) -> String {
        self.id.clone()
    }

    fn index_keys(&self) -> Vec<IndexKey> {
        vec![IndexKey::new(
            INDEX_GUID,
            KeyBuilder::new().str(&self.feed_id).str(&self.guid).build(),
        )]
    }

    fn assign_id(&mut self, tx: &Transaction) -> StoreResult<()> {
        let mut config = Config::get(tx)?;
        config.sequences.item += 1;
        self.id = roost_keys::encode_uint(config.sequences.item);
        config.save(tx)
    }
}

impl Item {
    /// Creates an unsaved item.
    #[must_use]
    pub fn new(feed_id: &str, guid: &str) -> Self {
        Item {
            feed_id: feed_id.to_owned(),
            guid: guid.to_owned(),
            ..Item::default()
        }
    }

    /// Loads an item by ID.
    ///
    /// # Errors
    ///
    /// Engine or codec failures.
    pub fn get(tx: &Transaction, id: &str) -> StoreResult<Option<Item>> {
        object::get_object(tx, id)
    }

    /// Loads an item by its publisher GUID within a feed.
    ///
    /// # Errors
    ///
    /// Engine or codec failures.
    pub fn by_guid(tx: &Transaction, feed_id: &str, guid: &str) -> StoreResult<Option<Item>> {
        let key = KeyBuilder::new().str(feed_id).str(guid).build();
        object::get_by_index(tx, INDEX_GUID, &key)
    }

    /// All items belonging to a feed, in GUID order.
    ///
    /// # Errors
    ///
    /// Engine or codec failures.
    pub fn for_feed(tx: &Transaction, feed_id: &str) -> StoreResult<Vec<Item>> {
        let (min, max) = KeyBuilder::new().str(feed_id).min_max();
        object::scan_index(tx, INDEX_GUID, &min, &max)
    }

    /// All items in ID order.
    ///
    /// # Errors
    ///
    /// Engine or codec failures.
    pub fn all(tx: &Transaction) -> StoreResult<Vec<Item>> {
        object::range_objects(tx)
    }

    /// Persists the item.
    ///
    /// # Errors
    ///
    /// Engine or codec failures.
    pub fn save(&mut self, tx: &Transaction) -> StoreResult<()> {
        object::save_object(tx, self)
    }

    /// Deletes an item by ID; deleting a missing ID succeeds.
    ///
    /// # Errors
    ///
    /// Engine or codec failures.
    pub fn delete(tx: &Transaction, id: &str) -> StoreResult<()> {
        object::delete_object::<Item>(tx, id)
    }

    /// Content fingerprint, used by the fetcher to detect republished
    /// items whose GUID did not change.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.author.as_bytes());
        hasher.update(self.content.as_bytes());
        hasher.update(self.title.as_bytes());
        hasher.update(self.url.as_bytes());
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use roost_storage::Database;

    #[test]
    fn guid_lookup_is_scoped_to_one_feed() {
        let db = Database::memory();
        db.update(|tx| {
            Item::new("0000000001", "guid-a").save(tx)?;
            Item::new("0000000002", "guid-a").save(tx)
        })
        .expect("update");

        let item = db
            .select(|tx| Item::by_guid(tx, "0000000001", "guid-a"))
            .expect("select")
            .expect("item");
        assert_eq!(item.feed_id, "0000000001");
        let missing = db
            .select(|tx| Item::by_guid(tx, "0000000003", "guid-a"))
            .expect("select");
        assert!(missing.is_none());
    }

    #[test]
    fn for_feed_returns_only_that_feeds_items() {
        let db = Database::memory();
        db.update(|tx| {
            Item::new("0000000001", "a").save(tx)?;
            Item::new("0000000001", "b").save(tx)?;
            Item::new("0000000002", "c").save(tx)
        })
        .expect("update");

        let items = db
            .select(|tx| Item::for_feed(tx, "0000000001"))
            .expect("select");
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.feed_id == "0000000001"));
    }

    #[test]
    fn fingerprint_tracks_content_changes() {
        let mut item = Item::new("0000000001", "guid");
        item.title = "title".to_owned();
        let before = item.fingerprint();
        assert_eq!(before, item.fingerprint());
        item.content = "body".to_owned();
        assert_ne!(before, item.fingerprint());
    }

    #[test]
    fn resave_keeps_single_guid_index_entry() {
        let db = Database::memory();
        db.update(|tx| {
            let mut item = Item::new("0000000001", "guid");
            item.save(tx)?;
            item.title = "updated".to_owned();
            item.save(tx)?;
            Ok::<(), StoreError>(())
        })
        .expect("update");

        let items = db
            .select(|tx| Item::for_feed(tx, "0000000001"))
            .expect("select");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "updated");
    }
}
