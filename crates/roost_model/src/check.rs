//! Offline integrity checking, schema migration, and index rebuild.
//!
//! [`check`] runs against a store no writer has open. It renames the
//! live file aside as a backup, streams every record through decode
//! and re-encode into a fresh file (upgrading records written under an
//! older field set; a record that no longer decodes is logged, counted,
//! and dropped), removes records whose foreign keys no longer resolve,
//! merges feeds that duplicate a URL, and finally drops and rebuilds
//! the whole index namespace from the cleaned data.
//!
//! Every validation pass scans primary data, never an index: the index
//! namespace is not trustworthy until the rebuild at the end.
//!
//! Any failure leaves the backup in place and restores it to the live
//! path, so the tool is safe to re-run.

use crate::config::Config;
use crate::entity::{Entry, Feed, Group, Item, Subscription, Transmission, User};
use crate::error::{StoreError, StoreResult};
use crate::object::Object;
use crate::schema::{EntityKind, BUCKET_DATA, BUCKET_INDEX};
use chrono::Utc;
use roost_storage::{Database, Transaction};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// What a [`check`] run did, pass by pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CheckReport {
    /// Records copied through decode/re-encode.
    pub records_copied: u64,
    /// Records dropped because their stored bytes no longer decode.
    pub records_skipped: u64,
    /// Subscriptions removed for dangling user or feed references.
    pub subscriptions_removed: u64,
    /// Duplicate feeds merged into their oldest survivor.
    pub feeds_merged: u64,
    /// Feeds removed for having no remaining subscription.
    pub feeds_removed: u64,
    /// Groups removed for dangling user references.
    pub groups_removed: u64,
    /// Group references scrubbed from subscriptions.
    pub group_refs_scrubbed: u64,
    /// Items removed for dangling feed references.
    pub items_removed: u64,
    /// Entries removed for dangling user, feed, or item references.
    pub entries_removed: u64,
    /// Transmissions removed for dangling feed references.
    pub transmissions_removed: u64,
    /// Index entries written by the rebuild.
    pub index_entries: u64,
    /// Collisions logged but not repaired.
    pub warnings: Vec<String>,
}

/// Checks and repairs the store at `path`.
///
/// On success the backup is discarded; on any failure the original
/// file is restored and the error returned.
///
/// # Errors
///
/// Engine, codec, or filesystem failures.
pub fn check(path: &Path) -> StoreResult<CheckReport> {
    let backup = backup_path(path);
    info!(path = %path.display(), backup = %backup.display(), "checking store");
    fs::rename(path, &backup)?;

    match run(path, &backup) {
        Ok(report) => {
            let _ = fs::remove_file(&backup);
            let _ = fs::remove_file(lock_path(&backup));
            info!(copied = report.records_copied, "check complete");
            Ok(report)
        }
        Err(err) => {
            warn!(error = %err, "check failed, restoring original");
            let _ = fs::remove_file(path);
            let _ = fs::remove_file(lock_path(path));
            let _ = fs::remove_file(lock_path(&backup));
            let _ = fs::rename(&backup, path);
            Err(err)
        }
    }
}

/// Record counts per entity, for inspection tooling.
///
/// # Errors
///
/// Engine failures.
pub fn stats(db: &Database) -> StoreResult<Vec<(&'static str, u64)>> {
    db.select(|tx| {
        let mut counts = Vec::with_capacity(EntityKind::ALL.len());
        for kind in EntityKind::ALL {
            let mut count = 0;
            let mut cursor = tx.bucket(&[BUCKET_DATA, kind.name()]).cursor();
            let mut entry = cursor.first();
            while entry.is_some() {
                count += 1;
                entry = cursor.next();
            }
            counts.push((kind.name(), count));
        }
        Ok::<_, StoreError>(counts)
    })
}

fn backup_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "store".to_owned());
    let stamp = Utc::now().format("%Y%m%d%H%M%S");
    let mut name = format!("{stem}-{stamp}");
    if let Some(ext) = path.extension() {
        name.push('.');
        name.push_str(&ext.to_string_lossy());
    }
    path.with_file_name(name)
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(".lock");
    path.with_file_name(name)
}

fn run(path: &Path, backup: &Path) -> StoreResult<CheckReport> {
    let old_db = Database::open(backup).map_err(StoreError::from)?;
    let new_db = Database::open(path).map_err(StoreError::from)?;

    let (records_copied, records_skipped) = copy_records(&old_db, &new_db)?;
    drop(old_db);

    info!("validating data");
    let subscriptions_removed = new_db.update(remove_bogus_subscriptions)?;
    let feeds_merged = new_db.update(merge_duplicate_feeds)?;
    let feeds_removed = new_db.update(remove_feeds_without_subscription)?;
    let groups_removed = new_db.update(remove_bogus_groups)?;
    let group_refs_scrubbed = new_db.update(scrub_group_references)?;
    let items_removed = new_db.update(remove_bogus_items)?;
    let entries_removed = new_db.update(remove_bogus_entries)?;
    let transmissions_removed = new_db.update(remove_bogus_transmissions)?;
    let warnings = new_db.select(collect_warnings)?;
    let index_entries = new_db.update(rebuild_indexes)?;

    Ok(CheckReport {
        records_copied,
        records_skipped,
        subscriptions_removed,
        feeds_merged,
        feeds_removed,
        groups_removed,
        group_refs_scrubbed,
        items_removed,
        entries_removed,
        transmissions_removed,
        index_entries,
        warnings,
    })
}

/// Streams every record through decode and re-encode into the new
/// store; a record whose bytes no longer decode is logged and dropped,
/// since recovering from exactly that breakage is the point of the run.
fn copy_records(old_db: &Database, new_db: &Database) -> StoreResult<(u64, u64)> {
    info!("copying records");
    old_db.select(|old_tx| {
        new_db.update(|new_tx| {
            let mut copied = 0;
            let mut skipped = 0;
            for kind in EntityKind::ALL {
                let counts = match kind {
                    EntityKind::Config => copy_kind::<Config>(old_tx, new_tx)?,
                    EntityKind::Entry => copy_kind::<Entry>(old_tx, new_tx)?,
                    EntityKind::Feed => copy_kind::<Feed>(old_tx, new_tx)?,
                    EntityKind::Group => copy_kind::<Group>(old_tx, new_tx)?,
                    EntityKind::Item => copy_kind::<Item>(old_tx, new_tx)?,
                    EntityKind::Subscription => copy_kind::<Subscription>(old_tx, new_tx)?,
                    EntityKind::Transmission => copy_kind::<Transmission>(old_tx, new_tx)?,
                    EntityKind::User => copy_kind::<User>(old_tx, new_tx)?,
                };
                copied += counts.0;
                skipped += counts.1;
            }
            Ok((copied, skipped))
        })
    })
}

fn copy_kind<T: Object>(old_tx: &Transaction, new_tx: &Transaction) -> StoreResult<(u64, u64)> {
    let mut copied = 0;
    let mut skipped = 0;
    let new_bucket = new_tx.bucket(&[BUCKET_DATA, T::KIND.name()]);
    let mut cursor = old_tx.bucket(&[BUCKET_DATA, T::KIND.name()]).cursor();
    let mut record = cursor.first();
    while let Some((key, value)) = record {
        match T::decode(&value) {
            Ok(object) => {
                new_bucket.put(&key, &object.encode()?)?;
                copied += 1;
            }
            Err(err) => {
                warn!(
                    entity = T::KIND.name(),
                    key = %String::from_utf8_lossy(&key),
                    error = %err,
                    "dropping undecodable record"
                );
                skipped += 1;
            }
        }
        record = cursor.next();
    }
    Ok((copied, skipped))
}

fn remove_bogus_subscriptions(tx: &Transaction) -> StoreResult<u64> {
    let users = id_set(User::all(tx)?.iter().map(|u| u.id.clone()));
    let feeds = id_set(Feed::all(tx)?.iter().map(|f| f.id.clone()));

    let mut removed = 0;
    for subscription in Subscription::all(tx)? {
        if !users.contains(&subscription.user_id) {
            warn!(user = %subscription.user_id, id = %subscription.id(), "subscription without user");
        } else if !feeds.contains(&subscription.feed_id) {
            warn!(feed = %subscription.feed_id, id = %subscription.id(), "subscription without feed");
        } else {
            continue;
        }
        Subscription::delete(tx, &subscription.id())?;
        removed += 1;
    }
    Ok(removed)
}

/// Merges feeds sharing a URL (case-insensitively) into the feed with
/// the lowest ID, repointing every subscription of the duplicates.
/// A subscriber of both the survivor and a duplicate keeps one
/// subscription with the union of the group memberships.
fn merge_duplicate_feeds(tx: &Transaction) -> StoreResult<u64> {
    let mut by_url: HashMap<String, Vec<Feed>> = HashMap::new();
    for feed in Feed::all(tx)? {
        by_url.entry(feed.url.to_lowercase()).or_default().push(feed);
    }

    let mut merged = 0;
    for (url, mut feeds) in by_url {
        if feeds.len() < 2 {
            continue;
        }
        feeds.sort_by(|a, b| a.id.cmp(&b.id));
        let survivor = feeds[0].id.clone();
        warn!(%url, %survivor, duplicates = feeds.len() - 1, "merging duplicate feeds");

        for duplicate in &feeds[1..] {
            for mut subscription in Subscription::all(tx)? {
                if subscription.feed_id != duplicate.id {
                    continue;
                }
                Subscription::delete(tx, &subscription.id())?;
                match Subscription::get_pair(tx, &subscription.user_id, &survivor)? {
                    Some(mut existing) => {
                        for group_id in &subscription.group_ids {
                            existing.add_group(group_id);
                        }
                        existing.save(tx)?;
                    }
                    None => {
                        subscription.feed_id = survivor.clone();
                        subscription.save(tx)?;
                    }
                }
            }
            Feed::delete(tx, &duplicate.id)?;
            merged += 1;
        }
    }
    Ok(merged)
}

fn remove_feeds_without_subscription(tx: &Transaction) -> StoreResult<u64> {
    let subscribed = id_set(Subscription::all(tx)?.iter().map(|s| s.feed_id.clone()));

    let mut removed = 0;
    for feed in Feed::all(tx)? {
        if !subscribed.contains(&feed.id) {
            warn!(id = %feed.id, title = %feed.title, "feed without subscription");
            Feed::delete(tx, &feed.id)?;
            removed += 1;
        }
    }
    Ok(removed)
}

fn remove_bogus_groups(tx: &Transaction) -> StoreResult<u64> {
    let users = id_set(User::all(tx)?.iter().map(|u| u.id.clone()));

    let mut removed = 0;
    for group in Group::all(tx)? {
        if !users.contains(&group.user_id) {
            warn!(user = %group.user_id, id = %group.id, "group without user");
            Group::delete(tx, &group.id)?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Drops group references that no longer resolve, or that point at a
/// group owned by a different user.
fn scrub_group_references(tx: &Transaction) -> StoreResult<u64> {
    let mut owners: HashMap<String, String> = HashMap::new();
    for group in Group::all(tx)? {
        owners.insert(group.id.clone(), group.user_id.clone());
    }

    let mut scrubbed = 0;
    for mut subscription in Subscription::all(tx)? {
        let before = subscription.group_ids.len();
        let user_id = subscription.user_id.clone();
        subscription
            .group_ids
            .retain(|group_id| owners.get(group_id) == Some(&user_id));
        let dropped = before - subscription.group_ids.len();
        if dropped > 0 {
            warn!(id = %subscription.id(), dropped, "subscription with invalid groups");
            subscription.save(tx)?;
            scrubbed += dropped as u64;
        }
        if subscription.group_ids.is_empty() {
            warn!(id = %subscription.id(), "subscription without groups");
        }
    }
    Ok(scrubbed)
}

fn remove_bogus_items(tx: &Transaction) -> StoreResult<u64> {
    let feeds = id_set(Feed::all(tx)?.iter().map(|f| f.id.clone()));

    let mut removed = 0;
    for item in Item::all(tx)? {
        if !feeds.contains(&item.feed_id) {
            warn!(feed = %item.feed_id, id = %item.id, guid = %item.guid, "item without feed");
            Item::delete(tx, &item.id)?;
            removed += 1;
        }
    }
    Ok(removed)
}

fn remove_bogus_entries(tx: &Transaction) -> StoreResult<u64> {
    let users = id_set(User::all(tx)?.iter().map(|u| u.id.clone()));
    let feeds = id_set(Feed::all(tx)?.iter().map(|f| f.id.clone()));
    let items = id_set(Item::all(tx)?.iter().map(|i| i.id.clone()));

    let mut removed = 0;
    for entry in Entry::all(tx)? {
        if !users.contains(&entry.user_id) {
            warn!(user = %entry.user_id, id = %entry.id(), "entry without user");
        } else if !feeds.contains(&entry.feed_id) {
            warn!(feed = %entry.feed_id, id = %entry.id(), "entry without feed");
        } else if !items.contains(&entry.item_id) {
            warn!(item = %entry.item_id, id = %entry.id(), "entry without item");
        } else {
            continue;
        }
        Entry::delete(tx, &entry.id())?;
        removed += 1;
    }
    Ok(removed)
}

fn remove_bogus_transmissions(tx: &Transaction) -> StoreResult<u64> {
    let feeds = id_set(Feed::all(tx)?.iter().map(|f| f.id.clone()));

    let mut removed = 0;
    for transmission in Transmission::all(tx)? {
        if !feeds.contains(&transmission.feed_id) {
            warn!(feed = %transmission.feed_id, id = %transmission.id, "transmission without feed");
            Transmission::delete(tx, &transmission.id)?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Collisions on soft-unique fields are ambiguous to repair, so they
/// are reported and left alone.
fn collect_warnings(tx: &Transaction) -> StoreResult<Vec<String>> {
    let mut warnings = Vec::new();

    let mut usernames: HashMap<String, u32> = HashMap::new();
    for user in User::all(tx)? {
        *usernames.entry(user.username.to_lowercase()).or_default() += 1;
    }
    for (username, count) in usernames {
        if count > 1 {
            warnings.push(format!("duplicate username: {username} ({count} users)"));
        }
    }

    let mut group_names: HashMap<(String, String), u32> = HashMap::new();
    for group in Group::all(tx)? {
        *group_names
            .entry((group.user_id.clone(), group.name.to_lowercase()))
            .or_default() += 1;
    }
    for ((user_id, name), count) in group_names {
        if count > 1 {
            warnings.push(format!(
                "duplicate group name for user {user_id}: {name} ({count} groups)"
            ));
        }
    }

    let mut guids: HashMap<(String, String), u32> = HashMap::new();
    for item in Item::all(tx)? {
        *guids
            .entry((item.feed_id.clone(), item.guid.clone()))
            .or_default() += 1;
    }
    for ((feed_id, guid), count) in guids {
        if count > 1 {
            warnings.push(format!(
                "duplicate item guid in feed {feed_id}: {guid} ({count} items)"
            ));
        }
    }

    for warning in &warnings {
        warn!("{warning}");
    }
    Ok(warnings)
}

/// Drops the whole index namespace and recomputes it from data; also
/// the self-healing path after any bug that desynced data and indexes.
fn rebuild_indexes(tx: &Transaction) -> StoreResult<u64> {
    info!("rebuilding indexes");
    tx.drop_bucket(&[BUCKET_INDEX])?;

    let mut written = 0;
    for kind in EntityKind::ALL {
        written += match kind {
            EntityKind::Config => reindex_kind::<Config>(tx)?,
            EntityKind::Entry => reindex_kind::<Entry>(tx)?,
            EntityKind::Feed => reindex_kind::<Feed>(tx)?,
            EntityKind::Group => reindex_kind::<Group>(tx)?,
            EntityKind::Item => reindex_kind::<Item>(tx)?,
            EntityKind::Subscription => reindex_kind::<Subscription>(tx)?,
            EntityKind::Transmission => reindex_kind::<Transmission>(tx)?,
            EntityKind::User => reindex_kind::<User>(tx)?,
        };
    }
    Ok(written)
}

fn reindex_kind<T: Object>(tx: &Transaction) -> StoreResult<u64> {
    let index_bucket = tx.bucket(&[BUCKET_INDEX, T::KIND.name()]);
    let mut written = 0;
    let mut cursor = tx.bucket(&[BUCKET_DATA, T::KIND.name()]).cursor();
    let mut record = cursor.first();
    while let Some((key, value)) = record {
        let object = T::decode(&value)?;
        for entry in object.index_keys() {
            index_bucket
                .bucket(&[entry.index])
                .put(entry.key.as_bytes(), &key)?;
            written += 1;
        }
        record = cursor.next();
    }
    Ok(written)
}

fn id_set(ids: impl Iterator<Item = String>) -> HashSet<String> {
    ids.collect()
}
