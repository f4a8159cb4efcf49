//! Concrete entities and their typed store operations.
//!
//! Each entity owns its field set, its secondary index definitions,
//! and a small set of associated store functions (`get`, `save`,
//! `delete`, `all`, plus index-backed lookups). The generic
//! persistence engine in the `object` module does the bookkeeping.

mod entry;
mod feed;
mod group;
mod item;
mod subscription;
mod transmission;
mod user;

pub use entry::Entry;
pub use feed::{Feed, STATUS_ERROR, STATUS_OK};
pub use group::Group;
pub use item::Item;
pub use subscription::Subscription;
pub use transmission::{
    Transmission, RESULT_CLIENT_ERROR, RESULT_FEED_ERROR, RESULT_OK, RESULT_REDIRECT,
    RESULT_SERVER_ERROR,
};
pub use user::User;

pub(crate) use entry::{INDEX_ENTRY_FEED_READ_UPDATED, INDEX_ENTRY_FEED_STAR_UPDATED,
    INDEX_ENTRY_FEED_UPDATED, INDEX_ENTRY_READ_UPDATED, INDEX_ENTRY_STAR_UPDATED,
    INDEX_ENTRY_UPDATED};
