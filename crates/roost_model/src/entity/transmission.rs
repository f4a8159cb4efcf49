//! The transmission entity: the audit record of one fetch attempt.

use crate::config::Config;
use crate::error::StoreResult;
use crate::object::{self, IndexKey, Object};
use crate::schema::{EntityKind, BUCKET_DATA};
use chrono::{DateTime, Duration, Utc};
use roost_keys::KeyBuilder;
use roost_storage::Transaction;
use serde::{Deserialize, Serialize};

pub(crate) const INDEX_TIME: &str = "Time";
pub(crate) const INDEX_FEED_TIME: &str = "FeedTime";

/// Fetch completed normally.
pub const RESULT_OK: &str = "OK";
/// Feed moved; the message carries the old and new URLs.
pub const RESULT_REDIRECT: &str = "MV";
/// Client-side failure; the message carries the error text.
pub const RESULT_CLIENT_ERROR: &str = "EC";
/// Server-side failure; consult the status code.
pub const RESULT_SERVER_ERROR: &str = "ES";
/// The response body did not parse as a feed.
pub const RESULT_FEED_ERROR: &str = "FP";

/// One fetch attempt against a feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transmission {
    /// Sequence-assigned ID, empty until first save.
    #[serde(default)]
    pub id: String,
    /// Feed that was fetched.
    #[serde(rename = "feedId")]
    pub feed_id: String,
    /// When the fetch started.
    #[serde(rename = "startTime")]
    pub start_time: DateTime<Utc>,
    /// Wall-clock duration of the fetch in milliseconds.
    #[serde(default, rename = "durationMs")]
    pub duration_ms: i64,
    /// Outcome code, one of the `RESULT_*` constants.
    #[serde(default)]
    pub result: String,
    /// Detail for the outcome.
    #[serde(default, rename = "resultMessage")]
    pub result_message: String,
    /// URL that was fetched.
    #[serde(default)]
    pub url: String,
    /// Response size in bytes.
    #[serde(default, rename = "contentLength")]
    pub content_length: i64,
    /// Response `Content-Type`.
    #[serde(default, rename = "contentType")]
    pub content_type: String,
    /// Response `ETag`.
    #[serde(default)]
    pub etag: String,
    /// Response `Last-Modified`.
    #[serde(default, rename = "lastModified")]
    pub last_modified: DateTime<Utc>,
    /// HTTP status code.
    #[serde(default, rename = "statusCode")]
    pub status_code: i32,
    /// Whether the response was gzip-compressed.
    #[serde(default, rename = "gzip")]
    pub uses_gzip: bool,
    /// Items seen in the response.
    #[serde(default, rename = "itemCount")]
    pub item_count: i32,
    /// Items not previously stored.
    #[serde(default, rename = "newItems")]
    pub new_items: i32,
}

impl Default for Transmission {
    fn default() -> Self {
        Transmission {
            id: String::new(),
            feed_id: String::new(),
            start_time: DateTime::UNIX_EPOCH,
            duration_ms: 0,
            result: String::new(),
            result_message: String::new(),
            url: String::new(),
            content_length: 0,
            content_type: String::new(),
            etag: String::new(),
            last_modified: DateTime::UNIX_EPOCH,
            status_code: 0,
            uses_gzip: false,
            item_count: 0,
            new_items: 0,
        }
    }
}

impl Object for Transmission {
    const KIND: EntityKind = EntityKind::Transmission;

    fn id(&self) -> String {
        self.id.clone()
    }

    fn index_keys(&self) -> Vec<IndexKey> {
        vec![
            IndexKey::new(
                INDEX_TIME,
                KeyBuilder::new().time(self.start_time).str(&self.id).build(),
            ),
            IndexKey::new(
                INDEX_FEED_TIME,
                KeyBuilder::new().str(&self.feed_id).time(self.start_time).build(),
            ),
        ]
    }

    fn assign_id(&mut self, tx: &Transaction) -> StoreResult<()> {
        let mut config = Config::get(tx)?;
        config.sequences.transmission += 1;
        self.id = roost_keys::encode_uint(config.sequences.transmission);
        config.save(tx)
    }
}

impl Transmission {
    /// Creates an unsaved transmission stamped with the current time.
    #[must_use]
    pub fn new(feed_id: &str) -> Self {
        Transmission {
            feed_id: feed_id.to_owned(),
            start_time: roost_keys::truncate(Utc::now()),
            ..Transmission::default()
        }
    }

    /// Loads a transmission by ID.
    ///
    /// # Errors
    ///
    /// Engine or codec failures.
    pub fn get(tx: &Transaction, id: &str) -> StoreResult<Option<Transmission>> {
        object::get_object(tx, id)
    }

    /// Fetch attempts against a feed within `since` of now, newest
    /// first.
    ///
    /// # Errors
    ///
    /// Engine or codec failures.
    pub fn for_feed(
        tx: &Transaction,
        feed_id: &str,
        since: Duration,
    ) -> StoreResult<Vec<Transmission>> {
        let now = roost_keys::truncate(Utc::now());
        let min = KeyBuilder::new().str(feed_id).time(now - since).build();
        let max = KeyBuilder::new().str(feed_id).time(now + Duration::seconds(1)).build();
        let mut transmissions =
            object::scan_index::<Transmission>(tx, INDEX_FEED_TIME, min.as_bytes(), max.as_bytes())?;
        transmissions.reverse();
        Ok(transmissions)
    }

    /// The most recent transmission, by assignment order.
    ///
    /// # Errors
    ///
    /// Engine or codec failures.
    pub fn last(tx: &Transaction) -> StoreResult<Option<Transmission>> {
        let mut cursor = tx.bucket(&[BUCKET_DATA, Self::KIND.name()]).cursor();
        match cursor.last() {
            Some((_, data)) => Ok(Some(Transmission::decode(&data)?)),
            None => Ok(None),
        }
    }

    /// Fetch attempts across all feeds in the window ending at `max`,
    /// newest first.
    ///
    /// # Errors
    ///
    /// Engine or codec failures.
    pub fn window(
        tx: &Transaction,
        max: DateTime<Utc>,
        since: Duration,
    ) -> StoreResult<Vec<Transmission>> {
        let min_key = roost_keys::encode_time(max - since);
        let max_key = roost_keys::encode_time(max + Duration::seconds(1));
        let mut transmissions = object::scan_index::<Transmission>(
            tx,
            INDEX_TIME,
            min_key.as_bytes(),
            max_key.as_bytes(),
        )?;
        transmissions.reverse();
        Ok(transmissions)
    }

    /// All transmissions in ID order.
    ///
    /// # Errors
    ///
    /// Engine or codec failures.
    pub fn all(tx: &Transaction) -> StoreResult<Vec<Transmission>> {
        object::range_objects(tx)
    }

    /// Persists the transmission.
    ///
    /// # Errors
    ///
    /// Engine or codec failures.
    pub fn save(&mut self, tx: &Transaction) -> StoreResult<()> {
        object::save_object(tx, self)
    }

    /// Deletes a transmission by ID; deleting a missing ID succeeds.
    ///
    /// # Errors
    ///
    /// Engine or codec failures.
    pub fn delete(tx: &Transaction, id: &str) -> StoreResult<()> {
        object::delete_object::<Transmission>(tx, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use roost_storage::Database;

    fn record(tx: &Transaction, feed_id: &str, minutes_ago: i64) -> Result<String, StoreError> {
        let mut transmission = Transmission::new(feed_id);
        transmission.start_time = roost_keys::truncate(Utc::now()) - Duration::minutes(minutes_ago);
        transmission.result = RESULT_OK.to_owned();
        transmission.save(tx)?;
        Ok(transmission.id)
    }

    #[test]
    fn for_feed_honors_window_and_feed() {
        let db = Database::memory();
        db.update(|tx| {
            record(tx, "0000000007", 10)?;
            record(tx, "0000000007", 60 * 24 * 2)?;
            record(tx, "0000000008", 5)?;
            Ok::<(), StoreError>(())
        })
        .expect("update");

        let recent = db
            .select(|tx| Transmission::for_feed(tx, "0000000007", Duration::days(1)))
            .expect("select");
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].feed_id, "0000000007");
    }

    #[test]
    fn window_is_newest_first() {
        let db = Database::memory();
        db.update(|tx| {
            record(tx, "0000000007", 30)?;
            record(tx, "0000000008", 10)?;
            Ok::<(), StoreError>(())
        })
        .expect("update");

        let all = db
            .select(|tx| Transmission::window(tx, Utc::now(), Duration::hours(1)))
            .expect("select");
        assert_eq!(all.len(), 2);
        assert!(all[0].start_time >= all[1].start_time);
        assert_eq!(all[0].feed_id, "0000000008");
    }

    #[test]
    fn last_returns_highest_id() {
        let db = Database::memory();
        db.update(|tx| {
            record(tx, "0000000007", 10)?;
            record(tx, "0000000008", 20)?;
            Ok::<(), StoreError>(())
        })
        .expect("update");

        let last = db
            .select(|tx| Transmission::last(tx))
            .expect("select")
            .expect("transmission");
        assert_eq!(last.feed_id, "0000000008");
        assert_eq!(last.id, "0000000002");
    }

    #[test]
    fn last_on_empty_store_is_none() {
        let db = Database::memory();
        let last = db.select(|tx| Transmission::last(tx)).expect("select");
        assert!(last.is_none());
    }
}
