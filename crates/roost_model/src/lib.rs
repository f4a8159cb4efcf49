//! # Roost Model
//!
//! The document store of a feed-aggregation backend: typed entities with
//! automatically maintained secondary indexes on top of the
//! [`roost_storage`] ordered key-value engine.
//!
//! ## Entities
//!
//! Seven entities plus a configuration singleton:
//!
//! | Entity | Identity | Points to |
//! |---|---|---|
//! | [`User`] | sequence | — |
//! | [`Feed`] | sequence | — |
//! | [`Group`] | sequence | User |
//! | [`Item`] | sequence | Feed |
//! | [`Subscription`] | `UserID\|FeedID` | User, Feed, Groups |
//! | [`Entry`] | `UserID\|ItemID` | User, Item, Feed |
//! | [`Transmission`] | sequence | Feed |
//! | [`Config`] | singleton | — |
//!
//! Every store operation runs inside a transaction obtained from
//! [`Database::select`] or [`Database::update`]; saves keep primary data
//! and every secondary index consistent within that one transaction.
//!
//! ## Example
//!
//! ```rust
//! use roost_model::{Database, StoreResult, User};
//!
//! let db = Database::memory();
//! db.update(|tx| {
//!     let mut user = User::new("alice", "hunter2");
//!     user.save(tx)
//! }).unwrap();
//!
//! let found: StoreResult<_> = db.select(|tx| User::by_username(tx, "Alice"));
//! assert!(found.unwrap().is_some());
//! ```
//!
//! The offline integrity / migration tool lives in [`check`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod check;
mod config;
mod entity;
mod error;
mod object;
mod query;
mod schema;

pub use config::{Config, Sequences};
pub use entity::{
    Entry, Feed, Group, Item, Subscription, Transmission, User, RESULT_CLIENT_ERROR,
    RESULT_FEED_ERROR, RESULT_OK, RESULT_REDIRECT, RESULT_SERVER_ERROR, STATUS_ERROR, STATUS_OK,
};
pub use error::{StoreError, StoreResult};
pub use object::{IndexKey, Object};
pub use query::EntryQuery;
pub use schema::EntityKind;

// The storage surface callers need to drive transactions.
pub use roost_storage::{Database, StorageError, Transaction};
