//! The object contract and the generic persistence engine.
//!
//! Every entity implements [`Object`]; the generic [`save_object`] /
//! [`delete_object`] algorithms keep primary data and every secondary
//! index mutually consistent inside one transaction:
//!
//! - **Save**: if the object already has an ID, decode its previously
//!   stored bytes and delete every index entry the old record owned;
//!   assign an ID if the object has none yet; write the record; write
//!   every index entry the new record owns.
//! - **Delete**: decode the record by ID (a no-op for an absent ID),
//!   delete its index entries, delete the record.
//!
//! A failure anywhere aborts the enclosing transaction, so partial
//! index writes are never durable.

use crate::error::{StoreError, StoreResult};
use crate::schema::{EntityKind, BUCKET_DATA, BUCKET_INDEX};
use roost_storage::Transaction;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// One secondary index entry an object owns, computed from its current
/// field values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexKey {
    /// Index bucket name within the entity's index namespace.
    pub index: &'static str,
    /// Encoded composite key.
    pub key: String,
}

impl IndexKey {
    /// Creates an index entry.
    #[must_use]
    pub fn new(index: &'static str, key: String) -> Self {
        Self { index, key }
    }
}

/// Capability set required of every persistable entity.
pub trait Object: Sized + Serialize + DeserializeOwned {
    /// The entity namespace this type lives in.
    const KIND: EntityKind;

    /// The record's ID; empty until first save for sequence-assigned
    /// entities, derived from foreign keys for natural-key entities.
    fn id(&self) -> String;

    /// The secondary index entries this record should own, computed
    /// from its current field values.
    fn index_keys(&self) -> Vec<IndexKey>;

    /// Assigns an ID on first save: draws the next sequence number, or
    /// is a no-op for natural-key entities.
    ///
    /// # Errors
    ///
    /// Propagates engine or codec failures from the sequence draw.
    fn assign_id(&mut self, tx: &Transaction) -> StoreResult<()>;

    /// Serializes the record.
    ///
    /// # Errors
    ///
    /// [`StoreError::Encode`] if serialization fails.
    fn encode(&self) -> StoreResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|source| StoreError::Encode {
            entity: Self::KIND.name(),
            source,
        })
    }

    /// Deserializes a record from stored bytes into a fresh value.
    ///
    /// # Errors
    ///
    /// [`StoreError::Decode`] if the bytes do not parse.
    fn decode(data: &[u8]) -> StoreResult<Self> {
        serde_json::from_slice(data).map_err(|source| StoreError::Decode {
            entity: Self::KIND.name(),
            source,
        })
    }
}

/// Reads and decodes a record by ID; an absent record is `Ok(None)`.
pub(crate) fn get_object<T: Object>(tx: &Transaction, id: &str) -> StoreResult<Option<T>> {
    let data_bucket = tx.bucket(&[BUCKET_DATA, T::KIND.name()]);
    match data_bucket.get(id.as_bytes()) {
        Some(data) => Ok(Some(T::decode(&data)?)),
        None => Ok(None),
    }
}

/// Saves a record, keeping every secondary index in lockstep.
pub(crate) fn save_object<T: Object>(tx: &Transaction, object: &mut T) -> StoreResult<()> {
    let data_bucket = tx.bucket(&[BUCKET_DATA, T::KIND.name()]);
    let index_bucket = tx.bucket(&[BUCKET_INDEX, T::KIND.name()]);

    if object.id().is_empty() {
        object.assign_id(tx)?;
    } else if let Some(old_data) = data_bucket.get(object.id().as_bytes()) {
        // Remove the index entries owned by the superseded record; the
        // new record may index under different keys.
        let old = T::decode(&old_data)?;
        for entry in old.index_keys() {
            index_bucket
                .bucket(&[entry.index])
                .delete(entry.key.as_bytes())?;
        }
    }

    let id = object.id();
    data_bucket.put(id.as_bytes(), &object.encode()?)?;
    for entry in object.index_keys() {
        index_bucket
            .bucket(&[entry.index])
            .put(entry.key.as_bytes(), id.as_bytes())?;
    }

    Ok(())
}

/// Deletes a record and all of its index entries; deleting a missing or
/// empty ID succeeds without effect.
pub(crate) fn delete_object<T: Object>(tx: &Transaction, id: &str) -> StoreResult<()> {
    if id.is_empty() {
        return Ok(());
    }

    let data_bucket = tx.bucket(&[BUCKET_DATA, T::KIND.name()]);
    if let Some(data) = data_bucket.get(id.as_bytes()) {
        let index_bucket = tx.bucket(&[BUCKET_INDEX, T::KIND.name()]);
        let object = T::decode(&data)?;
        for entry in object.index_keys() {
            index_bucket
                .bucket(&[entry.index])
                .delete(entry.key.as_bytes())?;
        }
        data_bucket.delete(id.as_bytes())?;
    }

    Ok(())
}

/// Decodes every record in the entity's data bucket, in ID order.
pub(crate) fn range_objects<T: Object>(tx: &Transaction) -> StoreResult<Vec<T>> {
    let mut objects = Vec::new();
    let mut cursor = tx.bucket(&[BUCKET_DATA, T::KIND.name()]).cursor();
    let mut entry = cursor.first();
    while let Some((_, value)) = entry {
        objects.push(T::decode(&value)?);
        entry = cursor.next();
    }
    Ok(objects)
}

/// Decodes records in the entity's data bucket whose IDs fall in
/// `[min, max)`.
pub(crate) fn range_objects_between<T: Object>(
    tx: &Transaction,
    min: &[u8],
    max: &[u8],
) -> StoreResult<Vec<T>> {
    let mut objects = Vec::new();
    let mut cursor = tx.bucket(&[BUCKET_DATA, T::KIND.name()]).cursor();
    let mut entry = cursor.seek(min);
    while let Some((key, value)) = entry {
        if key.as_slice() >= max {
            break;
        }
        objects.push(T::decode(&value)?);
        entry = cursor.next();
    }
    Ok(objects)
}

/// Scans an index over `[min, max)` and materializes each referenced
/// record through its primary bucket.
///
/// Index entries pointing at missing records are skipped; the integrity
/// tool repairs such gaps offline.
pub(crate) fn scan_index<T: Object>(
    tx: &Transaction,
    index: &'static str,
    min: &[u8],
    max: &[u8],
) -> StoreResult<Vec<T>> {
    let mut objects = Vec::new();
    let mut cursor = tx
        .bucket(&[BUCKET_INDEX, T::KIND.name(), index])
        .cursor();
    let mut entry = cursor.seek(min);
    while let Some((key, value)) = entry {
        if key.as_slice() >= max {
            break;
        }
        let id = String::from_utf8_lossy(&value);
        if let Some(object) = get_object::<T>(tx, &id)? {
            objects.push(object);
        }
        entry = cursor.next();
    }
    Ok(objects)
}

/// Looks up a single record through an exact-match index key.
pub(crate) fn get_by_index<T: Object>(
    tx: &Transaction,
    index: &'static str,
    key: &str,
) -> StoreResult<Option<T>> {
    let index_bucket = tx.bucket(&[BUCKET_INDEX, T::KIND.name(), index]);
    match index_bucket.get(key.as_bytes()) {
        Some(id) => get_object(tx, &String::from_utf8_lossy(&id)),
        None => Ok(None),
    }
}
