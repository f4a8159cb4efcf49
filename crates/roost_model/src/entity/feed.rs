//! The feed entity and its fetch-scheduling queries.

use crate::config::Config;
use crate::error::{StoreError, StoreResult};
use crate::object::{self, IndexKey, Object};
use crate::schema::EntityKind;
use chrono::{DateTime, Duration, Utc};
use roost_keys::KeyBuilder;
use roost_storage::Transaction;
use serde::{Deserialize, Serialize};

pub(crate) const INDEX_URL: &str = "URL";
pub(crate) const INDEX_NEXT_FETCH: &str = "NextFetch";

/// Fetch succeeded.
pub const STATUS_OK: &str = "OK";
/// Fetch failed; the status message carries the cause.
pub const STATUS_ERROR: &str = "ER";

/// A syndication feed shared by every subscriber.
///
/// URLs are unique case-insensitively; [`Feed::save`] rejects a record
/// whose URL collides with a different feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feed {
    /// Sequence-assigned ID, empty until first save.
    #[serde(default)]
    pub id: String,
    /// Feed URL, unique case-insensitively.
    pub url: String,
    /// Site the feed belongs to.
    #[serde(default, rename = "siteUrl")]
    pub site_url: String,
    /// Last `ETag` header seen, for conditional fetches.
    #[serde(default)]
    pub etag: String,
    /// Last `Last-Modified` header seen, for conditional fetches.
    #[serde(default, rename = "lastModified")]
    pub last_modified: DateTime<Utc>,
    /// Last time new content was observed.
    #[serde(default, rename = "lastUpdated")]
    pub last_updated: DateTime<Utc>,
    /// When the poller should fetch next.
    #[serde(rename = "nextFetch")]
    pub next_fetch: DateTime<Utc>,
    /// Operator notes.
    #[serde(default)]
    pub notes: String,
    /// Feed title as published.
    #[serde(default)]
    pub title: String,
    /// Last fetch outcome, [`STATUS_OK`] or [`STATUS_ERROR`].
    #[serde(default)]
    pub status: String,
    /// Detail for the last status.
    #[serde(default, rename = "statusMessage")]
    pub status_message: String,
    /// When the status last changed.
    #[serde(default, rename = "statusSince")]
    pub status_since: DateTime<Utc>,
}

impl Default for Feed {
    fn default() -> Self {
        Feed {
            id: String::new(),
            url: String::new(),
            site_url: String::new(),
            etag: String::new(),
            last_modified: DateTime::UNIX_EPOCH,
            last_updated: DateTime::UNIX_EPOCH,
            next_fetch: DateTime::UNIX_EPOCH,
            notes: String::new(),
            title: String::new(),
            status: String::new(),
            status_message: String::new(),
            status_since: DateTime::UNIX_EPOCH,
        }
    }
}

impl Object for Feed {
    const KIND: EntityKind = EntityKind::Feed;

    fn id(&self) -> String {
        self.id.clone()
    }

    fn index_keys(&self) -> Vec<IndexKey> {
        vec![
            IndexKey::new(INDEX_URL, KeyBuilder::new().str_lower(&self.url).build()),
            IndexKey::new(
                INDEX_NEXT_FETCH,
                KeyBuilder::new().time(self.next_fetch).str(&self.id).build(),
            ),
        ]
    }

    fn assign_id(&mut self, tx: &Transaction) -> StoreResult<()> {
        let mut config = Config::get(tx)?;
        config.sequences.feed += 1;
        self.id = roost_keys::encode_uint(config.sequences.feed);
        config.save(tx)
    }
}

impl Feed {
    /// Creates an unsaved feed due for an immediate fetch.
    #[must_use]
    pub fn new(url: &str) -> Self {
        Feed {
            url: url.to_owned(),
            next_fetch: roost_keys::truncate(Utc::now()),
            ..Feed::default()
        }
    }

    /// Loads a feed by ID.
    ///
    /// # Errors
    ///
    /// Engine or codec failures.
    pub fn get(tx: &Transaction, id: &str) -> StoreResult<Option<Feed>> {
        object::get_object(tx, id)
    }

    /// Loads a feed by URL, case-insensitively.
    ///
    /// # Errors
    ///
    /// Engine or codec failures.
    pub fn by_url(tx: &Transaction, url: &str) -> StoreResult<Option<Feed>> {
        let key = KeyBuilder::new().str_lower(url).build();
        object::get_by_index(tx, INDEX_URL, &key)
    }

    /// All feeds due for a fetch at or before `max`, soonest first.
    ///
    /// # Errors
    ///
    /// Engine or codec failures.
    pub fn get_next(tx: &Transaction, max: DateTime<Utc>) -> StoreResult<Vec<Feed>> {
        // Exclusive bound just past `max`, aligned to whole seconds.
        let bound = roost_keys::encode_time(max + Duration::seconds(1));
        object::scan_index(tx, INDEX_NEXT_FETCH, &[], bound.as_bytes())
    }

    /// All feeds in ID order.
    ///
    /// # Errors
    ///
    /// Engine or codec failures.
    pub fn all(tx: &Transaction) -> StoreResult<Vec<Feed>> {
        object::range_objects(tx)
    }

    /// Persists the feed, enforcing URL uniqueness.
    ///
    /// # Errors
    ///
    /// [`StoreError::DuplicateKey`] when another feed already holds the
    /// URL; engine or codec failures otherwise.
    pub fn save(&mut self, tx: &Transaction) -> StoreResult<()> {
        if let Some(conflict) = Feed::by_url(tx, &self.url)? {
            if conflict.id != self.id {
                return Err(StoreError::DuplicateKey {
                    entity: Self::KIND.name(),
                    field: "url",
                    value: self.url.clone(),
                });
            }
        }
        object::save_object(tx, self)
    }

    /// Deletes a feed by ID; deleting a missing ID succeeds.
    ///
    /// # Errors
    ///
    /// Engine or codec failures.
    pub fn delete(tx: &Transaction, id: &str) -> StoreResult<()> {
        object::delete_object::<Feed>(tx, id)
    }

    /// Reschedules the next fetch based on how recently the feed had
    /// fresh content: recently active feeds poll every 15 minutes,
    /// quiet feeds hourly, never sooner than 5 minutes from now.
    pub fn update_fetch_time(&mut self, last_updated: DateTime<Utc>) {
        let now = Utc::now();
        let interval = if now - last_updated < Duration::hours(2) {
            Duration::minutes(15)
        } else {
            Duration::hours(1)
        };
        let min = now + Duration::minutes(5);
        let mut next = last_updated;
        while next < min {
            next += interval;
        }
        self.next_fetch = roost_keys::truncate(next);
    }

    /// Forces the next fetch to a fixed offset from now.
    pub fn adjust_fetch_time(&mut self, interval: Duration) {
        self.next_fetch = roost_keys::truncate(Utc::now() + interval);
    }
}
