//! The group entity: a user's named collection of subscriptions.

use crate::config::Config;
use crate::error::{StoreError, StoreResult};
use crate::object::{self, IndexKey, Object};
use crate::schema::EntityKind;
use roost_keys::KeyBuilder;
use roost_storage::Transaction;
use serde::{Deserialize, Serialize};

pub(crate) const INDEX_USER_NAME: &str = "UserName";

/// A per-user folder of subscriptions.
///
/// Group names are unique per user; [`Group::save`] rejects a record
/// whose `(user, name)` pair collides with a different group.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Sequence-assigned ID, empty until first save.
    #[serde(default)]
    pub id: String,
    /// Owning user.
    #[serde(rename = "userId")]
    pub user_id: String,
    /// Display name, unique within the owning user.
    pub name: String,
}

impl Object for Group {
    const KIND: EntityKind = EntityKind::Group;

    fn id(&self) -> String {
        self.id.clone()
    }

    fn index_keys(&self) -> Vec<IndexKey> {
        vec![IndexKey::new(
            INDEX_USER_NAME,
            KeyBuilder::new().str(&self.user_id).str(&self.name).build(),
        )]
    }

    fn assign_id(&mut self, tx: &Transaction) -> StoreResult<()> {
        let mut config = Config::get(tx)?;
        config.sequences.group += 1;
        self.id = roost_keys::encode_uint(config.sequences.group);
        config.save(tx)
    }
}

impl Group {
    /// Creates an unsaved group.
    #[must_use]
    pub fn new(user_id: &str, name: &str) -> Self {
        Group {
            user_id: user_id.to_owned(),
            name: name.to_owned(),
            ..Group::default()
        }
    }

    /// Loads a group by ID.
    ///
    /// # Errors
    ///
    /// Engine or codec failures.
    pub fn get(tx: &Transaction, id: &str) -> StoreResult<Option<Group>> {
        object::get_object(tx, id)
    }

    /// All groups owned by a user, in name order.
    ///
    /// # Errors
    ///
    /// Engine or codec failures.
    pub fn for_user(tx: &Transaction, user_id: &str) -> StoreResult<Vec<Group>> {
        let (min, max) = KeyBuilder::new().str(user_id).min_max();
        object::scan_index(tx, INDEX_USER_NAME, &min, &max)
    }

    /// All groups in ID order.
    ///
    /// # Errors
    ///
    /// Engine or codec failures.
    pub fn all(tx: &Transaction) -> StoreResult<Vec<Group>> {
        object::range_objects(tx)
    }

    /// Persists the group, enforcing per-user name uniqueness.
    ///
    /// # Errors
    ///
    /// [`StoreError::DuplicateKey`] when the owning user already has a
    /// group with this name; engine or codec failures otherwise.
    pub fn save(&mut self, tx: &Transaction) -> StoreResult<()> {
        let key = KeyBuilder::new().str(&self.user_id).str(&self.name).build();
        if let Some(conflict) = object::get_by_index::<Group>(tx, INDEX_USER_NAME, &key)? {
            if conflict.id != self.id {
                return Err(StoreError::DuplicateKey {
                    entity: Self::KIND.name(),
                    field: "name",
                    value: self.name.clone(),
                });
            }
        }
        object::save_object(tx, self)
    }

    /// Deletes a group by ID; deleting a missing ID succeeds.
    ///
    /// # Errors
    ///
    /// Engine or codec failures.
    pub fn delete(tx: &Transaction, id: &str) -> StoreResult<()> {
        object::delete_object::<Group>(tx, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roost_storage::Database;

    #[test]
    fn for_user_returns_only_that_users_groups_in_name_order() {
        let db = Database::memory();
        db.update(|tx| {
            Group::new("0000000001", "news").save(tx)?;
            Group::new("0000000001", "comics").save(tx)?;
            Group::new("0000000002", "news").save(tx)
        })
        .expect("update");

        let groups = db
            .select(|tx| Group::for_user(tx, "0000000001"))
            .expect("select");
        let names: Vec<&str> = groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, ["comics", "news"]);
    }

    #[test]
    fn duplicate_name_per_user_rejected() {
        let db = Database::memory();
        db.update(|tx| Group::new("0000000001", "news").save(tx))
            .expect("update");
        let err = db
            .update(|tx| Group::new("0000000001", "news").save(tx))
            .expect_err("duplicate");
        assert!(matches!(err, StoreError::DuplicateKey { field: "name", .. }));
    }

    #[test]
    fn same_name_allowed_for_different_users() {
        let db = Database::memory();
        db.update(|tx| {
            Group::new("0000000001", "news").save(tx)?;
            Group::new("0000000002", "news").save(tx)
        })
        .expect("update");
    }
}
