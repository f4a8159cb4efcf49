//! The user account entity.

use crate::config::Config;
use crate::error::{StoreError, StoreResult};
use crate::object::{self, IndexKey, Object};
use crate::schema::EntityKind;
use roost_keys::KeyBuilder;
use roost_storage::Transaction;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub(crate) const INDEX_USERNAME: &str = "Username";
pub(crate) const INDEX_FEVERHASH: &str = "FeverHash";

/// Password hashing rounds; bumping this invalidates stored hashes.
const HASH_ROUNDS: u32 = 10_000;
const SALT_LEN: usize = 16;

/// A user account.
///
/// Usernames are unique case-insensitively; [`User::save`] rejects a
/// record whose username collides with a different user.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Sequence-assigned ID, empty until first save.
    #[serde(default)]
    pub id: String,
    /// Login name, unique case-insensitively.
    pub username: String,
    /// Salted, iterated digest of the password.
    #[serde(default, rename = "passwordHash")]
    pub password_hash: String,
    /// Digest of `username:password` for API-key style authentication.
    #[serde(default, rename = "feverHash")]
    pub fever_hash: String,
}

impl Object for User {
    const KIND: EntityKind = EntityKind::User;

    fn id(&self) -> String {
        self.id.clone()
    }

    fn index_keys(&self) -> Vec<IndexKey> {
        vec![
            IndexKey::new(
                INDEX_USERNAME,
                KeyBuilder::new().str_lower(&self.username).build(),
            ),
            IndexKey::new(
                INDEX_FEVERHASH,
                KeyBuilder::new().str(&self.fever_hash).build(),
            ),
        ]
    }

    fn assign_id(&mut self, tx: &Transaction) -> StoreResult<()> {
        let mut config = Config::get(tx)?;
        config.sequences.user += 1;
        self.id = roost_keys::encode_uint(config.sequences.user);
        config.save(tx)
    }
}

impl User {
    /// Creates an unsaved user with a freshly hashed password.
    #[must_use]
    pub fn new(username: &str, password: &str) -> Self {
        let mut user = User {
            username: username.to_owned(),
            ..User::default()
        };
        user.set_password(password);
        user
    }

    /// Loads a user by ID.
    ///
    /// # Errors
    ///
    /// Engine or codec failures.
    pub fn get(tx: &Transaction, id: &str) -> StoreResult<Option<User>> {
        object::get_object(tx, id)
    }

    /// Loads a user by username, case-insensitively.
    ///
    /// # Errors
    ///
    /// Engine or codec failures.
    pub fn by_username(tx: &Transaction, username: &str) -> StoreResult<Option<User>> {
        let key = KeyBuilder::new().str_lower(username).build();
        object::get_by_index(tx, INDEX_USERNAME, &key)
    }

    /// Loads a user by its API-key digest.
    ///
    /// # Errors
    ///
    /// Engine or codec failures.
    pub fn by_fever_hash(tx: &Transaction, fever_hash: &str) -> StoreResult<Option<User>> {
        let key = KeyBuilder::new().str(fever_hash).build();
        object::get_by_index(tx, INDEX_FEVERHASH, &key)
    }

    /// All users in ID order.
    ///
    /// # Errors
    ///
    /// Engine or codec failures.
    pub fn all(tx: &Transaction) -> StoreResult<Vec<User>> {
        object::range_objects(tx)
    }

    /// Persists the user, enforcing username uniqueness.
    ///
    /// # Errors
    ///
    /// [`StoreError::DuplicateKey`] when another user already holds the
    /// username; engine or codec failures otherwise.
    pub fn save(&mut self, tx: &Transaction) -> StoreResult<()> {
        if let Some(conflict) = User::by_username(tx, &self.username)? {
            if conflict.id != self.id {
                return Err(StoreError::DuplicateKey {
                    entity: Self::KIND.name(),
                    field: "username",
                    value: self.username.clone(),
                });
            }
        }
        object::save_object(tx, self)
    }

    /// Deletes a user by ID; deleting a missing ID succeeds.
    ///
    /// # Errors
    ///
    /// Engine or codec failures.
    pub fn delete(tx: &Transaction, id: &str) -> StoreResult<()> {
        object::delete_object::<User>(tx, id)
    }

    /// Rehashes the stored password and API-key digests.
    pub fn set_password(&mut self, password: &str) {
        let salt: [u8; SALT_LEN] = rand::random();
        self.password_hash = format!("{}${}", hex(&salt), hex(&digest(&salt, password)));
        self.fever_hash = hex(&Sha256::digest(
            format!("{}:{}", self.username, password).as_bytes(),
        ));
    }

    /// Checks a candidate password against the stored hash.
    #[must_use]
    pub fn verify_password(&self, password: &str) -> bool {
        let Some((salt_hex, digest_hex)) = self.password_hash.split_once('$') else {
            return false;
        };
        let Some(salt) = unhex(salt_hex) else {
            return false;
        };
        hex(&digest(&salt, password)) == digest_hex
    }
}

fn digest(salt: &[u8], password: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    let mut round = hasher.finalize();
    for _ in 1..HASH_ROUNDS {
        round = Sha256::digest(&round);
    }
    round.to_vec()
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn unhex(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&text[i..i + 2], 16).ok())
        .collect()
}
