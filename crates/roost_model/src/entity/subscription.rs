//! The subscription entity: one user's attachment to one feed.
//!
//! Subscriptions use a natural compound key, `userID|feedID`, so the
//! same pair always maps to the same record and re-subscribing is
//! idempotent. `for_user` exploits the key shape directly with a prefix
//! scan over primary data; `for_feed` goes through the reverse index.

use crate::error::StoreResult;
use crate::object::{self, IndexKey, Object};
use crate::schema::EntityKind;
use chrono::{DateTime, Utc};
use roost_keys::KeyBuilder;
use roost_storage::Transaction;
use serde::{Deserialize, Serialize};

pub(crate) const INDEX_FEED: &str = "Feed";

/// A user's subscription to a feed, carrying per-user presentation
/// settings and group membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Owning user.
    #[serde(rename = "userId")]
    pub user_id: String,
    /// Subscribed feed.
    #[serde(rename = "feedId")]
    pub feed_id: String,
    /// Groups this subscription belongs to.
    #[serde(default, rename = "groupIds")]
    pub group_ids: Vec<String>,
    /// When the user subscribed.
    #[serde(default)]
    pub added: DateTime<Utc>,
    /// Per-user title override.
    #[serde(default)]
    pub title: String,
    /// Per-user notes.
    #[serde(default)]
    pub notes: String,
    /// Mark new entries read on arrival.
    #[serde(default, rename = "autoRead")]
    pub auto_read: bool,
    /// Star new entries on arrival.
    #[serde(default, rename = "autoStar")]
    pub auto_star: bool,
}

impl Default for Subscription {
    fn default() -> Self {
        Subscription {
            user_id: String::new(),
            feed_id: String::new(),
            group_ids: Vec::new(),
            added: DateTime::UNIX_EPOCH,
            title: String::new(),
            notes: String::new(),
            auto_read: false,
            auto_star: false,
        }
    }
}

impl Object for Subscription {
    const KIND: EntityKind = EntityKind::Subscription;

    fn id(&self) -> String {
        Subscription::compound_id(&self.user_id, &self.feed_id)
    }

    fn index_keys(&self) -> Vec<IndexKey> {
        vec![IndexKey::new(
            INDEX_FEED,
            KeyBuilder::new().str(&self.feed_id).str(&self.user_id).build(),
        )]
    }

    // Natural key, derived from the foreign-key pair.
    fn assign_id(&mut self, _tx: &Transaction) -> StoreResult<()> {
        Ok(())
    }
}

impl Subscription {
    /// The compound primary key for a user/feed pair.
    #[must_use]
    pub fn compound_id(user_id: &str, feed_id: &str) -> String {
        KeyBuilder::new().str(user_id).str(feed_id).build()
    }

    /// Creates an unsaved subscription stamped with the current time.
    #[must_use]
    pub fn new(user_id: &str, feed_id: &str) -> Self {
        Subscription {
            user_id: user_id.to_owned(),
            feed_id: feed_id.to_owned(),
            added: roost_keys::truncate(Utc::now()),
            ..Subscription::default()
        }
    }

    /// Loads a subscription by compound ID.
    ///
    /// # Errors
    ///
    /// Engine or codec failures.
    pub fn get(tx: &Transaction, id: &str) -> StoreResult<Option<Subscription>> {
        object::get_object(tx, id)
    }

    /// Loads a subscription by its user/feed pair.
    ///
    /// # Errors
    ///
    /// Engine or codec failures.
    pub fn get_pair(
        tx: &Transaction,
        user_id: &str,
        feed_id: &str,
    ) -> StoreResult<Option<Subscription>> {
        object::get_object(tx, &Subscription::compound_id(user_id, feed_id))
    }

    /// All subscriptions owned by a user, in feed-ID order.
    ///
    /// # Errors
    ///
    /// Engine or codec failures.
    pub fn for_user(tx: &Transaction, user_id: &str) -> StoreResult<Vec<Subscription>> {
        let (min, max) = KeyBuilder::new().str(user_id).min_max();
        object::range_objects_between(tx, &min, &max)
    }

    /// All subscriptions to a feed, in user-ID order.
    ///
    /// # Errors
    ///
    /// Engine or codec failures.
    pub fn for_feed(tx: &Transaction, feed_id: &str) -> StoreResult<Vec<Subscription>> {
        let (min, max) = KeyBuilder::new().str(feed_id).min_max();
        object::scan_index(tx, INDEX_FEED, &min, &max)
    }

    /// All subscriptions, in compound-ID order.
    ///
    /// # Errors
    ///
    /// Engine or codec failures.
    pub fn all(tx: &Transaction) -> StoreResult<Vec<Subscription>> {
        object::range_objects(tx)
    }

    /// Persists the subscription.
    ///
    /// # Errors
    ///
    /// Engine or codec failures.
    pub fn save(&mut self, tx: &Transaction) -> StoreResult<()> {
        object::save_object(tx, self)
    }

    /// Deletes a subscription by compound ID; deleting a missing ID
    /// succeeds.
    ///
    /// # Errors
    ///
    /// Engine or codec failures.
    pub fn delete(tx: &Transaction, id: &str) -> StoreResult<()> {
        object::delete_object::<Subscription>(tx, id)
    }

    /// Whether this subscription belongs to a group.
    #[must_use]
    pub fn has_group(&self, group_id: &str) -> bool {
        self.group_ids.iter().any(|id| id == group_id)
    }

    /// Adds the subscription to a group; already a member is a no-op.
    pub fn add_group(&mut self, group_id: &str) {
        if !self.has_group(group_id) {
            self.group_ids.push(group_id.to_owned());
        }
    }

    /// Removes the subscription from a group.
    pub fn remove_group(&mut self, group_id: &str) {
        self.group_ids.retain(|id| id != group_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use roost_storage::Database;

    #[test]
    fn resubscribing_is_idempotent() {
        let db = Database::memory();
        db.update(|tx| {
            Subscription::new("0000000001", "0000000007").save(tx)?;
            let mut again = Subscription::new("0000000001", "0000000007");
            again.title = "renamed".to_owned();
            again.save(tx)
        })
        .expect("update");

        let subs = db
            .select(|tx| Subscription::for_user(tx, "0000000001"))
            .expect("select");
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].title, "renamed");
    }

    #[test]
    fn for_user_scans_only_that_users_prefix() {
        let db = Database::memory();
        db.update(|tx| {
            Subscription::new("0000000001", "0000000007").save(tx)?;
            Subscription::new("0000000001", "0000000008").save(tx)?;
            Subscription::new("0000000002", "0000000007").save(tx)
        })
        .expect("update");

        let subs = db
            .select(|tx| Subscription::for_user(tx, "0000000001"))
            .expect("select");
        let feeds: Vec<&str> = subs.iter().map(|s| s.feed_id.as_str()).collect();
        assert_eq!(feeds, ["0000000007", "0000000008"]);
    }

    #[test]
    fn for_feed_uses_reverse_index() {
        let db = Database::memory();
        db.update(|tx| {
            Subscription::new("0000000002", "0000000007").save(tx)?;
            Subscription::new("0000000001", "0000000007").save(tx)?;
            Subscription::new("0000000001", "0000000008").save(tx)
        })
        .expect("update");

        let subs = db
            .select(|tx| Subscription::for_feed(tx, "0000000007"))
            .expect("select");
        let users: Vec<&str> = subs.iter().map(|s| s.user_id.as_str()).collect();
        assert_eq!(users, ["0000000001", "0000000002"]);
    }

    #[test]
    fn group_membership_helpers() {
        let mut sub = Subscription::new("u", "f");
        sub.add_group("0000000003");
        sub.add_group("0000000003");
        assert_eq!(sub.group_ids, ["0000000003"]);
        assert!(sub.has_group("0000000003"));
        sub.remove_group("0000000003");
        assert!(sub.group_ids.is_empty());
    }

    #[test]
    fn delete_clears_feed_index() {
        let db = Database::memory();
        db.update(|tx| {
            Subscription::new("0000000001", "0000000007").save(tx)?;
            Subscription::delete(tx, &Subscription::compound_id("0000000001", "0000000007"))
        })
        .expect("update");

        let subs = db
            .select(|tx| Subscription::for_feed(tx, "0000000007"))
            .expect("select");
        assert!(subs.is_empty());
        let ok: Result<(), StoreError> = db.update(|tx| Subscription::delete(tx, "missing"));
        ok.expect("deleting a missing id succeeds");
    }
}
