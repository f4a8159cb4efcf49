//! The configuration singleton: free-form settings plus the ID
//! sequence counters every numeric entity draws from.

use crate::error::StoreResult;
use crate::object::{self, IndexKey, Object};
use crate::schema::EntityKind;
use roost_storage::Transaction;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The fixed ID of the one configuration record.
pub(crate) const CONFIG_ID: &str = "configuration";

/// Per-entity ID counters; the highest number already handed out.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequences {
    /// Last user ID assigned.
    #[serde(default)]
    pub user: u64,
    /// Last feed ID assigned.
    #[serde(default)]
    pub feed: u64,
    /// Last group ID assigned.
    #[serde(default)]
    pub group: u64,
    /// Last item ID assigned.
    #[serde(default)]
    pub item: u64,
    /// Last transmission ID assigned.
    #[serde(default)]
    pub transmission: u64,
}

/// Application settings and sequence state, stored as a singleton.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Record ID, always [`CONFIG_ID`] once saved.
    #[serde(default)]
    pub id: String,
    /// Free-form key/value settings.
    #[serde(default)]
    pub values: BTreeMap<String, String>,
    /// ID counters for sequence-assigned entities.
    #[serde(default)]
    pub sequences: Sequences,
}

impl Object for Config {
    const KIND: EntityKind = EntityKind::Config;

    fn id(&self) -> String {
        self.id.clone()
    }

    fn index_keys(&self) -> Vec<IndexKey> {
        Vec::new()
    }

    fn assign_id(&mut self, _tx: &Transaction) -> StoreResult<()> {
        self.id = CONFIG_ID.to_owned();
        Ok(())
    }
}

impl Config {
    /// Loads the singleton, or a fresh default if never saved.
    ///
    /// # Errors
    ///
    /// Engine or codec failures.
    pub fn get(tx: &Transaction) -> StoreResult<Config> {
        Ok(object::get_object(tx, CONFIG_ID)?.unwrap_or_default())
    }

    /// Persists the singleton.
    ///
    /// # Errors
    ///
    /// Engine or codec failures.
    pub fn save(&mut self, tx: &Transaction) -> StoreResult<()> {
        object::save_object(tx, self)
    }

    /// Looks up a setting.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Looks up a setting, falling back to a default.
    #[must_use]
    pub fn value_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.value(name).unwrap_or(default)
    }

    /// Sets a setting; an empty value removes the entry.
    pub fn set_value(&mut self, name: &str, value: &str) {
        if value.is_empty() {
            self.values.remove(name);
        } else {
            self.values.insert(name.to_owned(), value.to_owned());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use roost_storage::Database;

    #[test]
    fn get_returns_default_when_never_saved() {
        let db = Database::memory();
        let config: Config = db
            .select(|tx| Config::get(tx))
            .expect("select");
        assert!(config.id.is_empty());
        assert_eq!(config.sequences, Sequences::default());
    }

    #[test]
    fn save_and_reload_singleton() {
        let db = Database::memory();
        db.update(|tx| {
            let mut config = Config::get(tx)?;
            config.set_value("timezone", "UTC");
            config.sequences.feed = 7;
            config.save(tx)
        })
        .expect("update");

        let config: Config = db.select(|tx| Config::get(tx)).expect("select");
        assert_eq!(config.id, CONFIG_ID);
        assert_eq!(config.value("timezone"), Some("UTC"));
        assert_eq!(config.sequences.feed, 7);
    }

    #[test]
    fn empty_value_removes_setting() {
        let mut config = Config::default();
        config.set_value("poll", "5m");
        config.set_value("poll", "");
        assert_eq!(config.value("poll"), None);
        assert_eq!(config.value_or("poll", "10m"), "10m");
    }

    #[test]
    fn saving_twice_keeps_one_record() {
        let db = Database::memory();
        let saved: Result<(), StoreError> = db.update(|tx| {
            let mut config = Config::get(tx)?;
            config.set_value("a", "1");
            config.save(tx)?;
            let mut again = Config::get(tx)?;
            again.set_value("b", "2");
            again.save(tx)
        });
        saved.expect("update");

        let config: Config = db.select(|tx| Config::get(tx)).expect("select");
        assert_eq!(config.value("a"), Some("1"));
        assert_eq!(config.value("b"), Some("2"));
    }
}
