//! Entity namespace schema.
//!
//! The store keeps two top-level buckets, `Data` and `Index`, each with
//! one sub-bucket per entity. Index sub-buckets nest one level further,
//! per index name.

/// Top-level bucket holding primary records, keyed by entity ID.
pub(crate) const BUCKET_DATA: &str = "Data";

/// Top-level bucket holding secondary indexes; values are always the
/// owning record's primary ID bytes.
pub(crate) const BUCKET_INDEX: &str = "Index";

/// The closed set of entity namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EntityKind {
    /// Configuration singleton, including sequence counters.
    Config,
    /// Per-user item status.
    Entry,
    /// Feed descriptor.
    Feed,
    /// User-defined subscription group.
    Group,
    /// Item fetched from a feed.
    Item,
    /// A user's attachment to a feed.
    Subscription,
    /// Telemetry of one fetch attempt.
    Transmission,
    /// System user.
    User,
}

impl EntityKind {
    /// Every entity namespace, in a fixed order for whole-store walks.
    pub const ALL: [EntityKind; 8] = [
        EntityKind::Config,
        EntityKind::Entry,
        EntityKind::Feed,
        EntityKind::Group,
        EntityKind::Item,
        EntityKind::Subscription,
        EntityKind::Transmission,
        EntityKind::User,
    ];

    /// The bucket name of this entity namespace.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            EntityKind::Config => "Config",
            EntityKind::Entry => "Entry",
            EntityKind::Feed => "Feed",
            EntityKind::Group => "Group",
            EntityKind::Item => "Item",
            EntityKind::Subscription => "Subscription",
            EntityKind::Transmission => "Transmission",
            EntityKind::User => "User",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_kinds_have_distinct_names() {
        let mut names: Vec<_> = EntityKind::ALL.iter().map(|k| k.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), EntityKind::ALL.len());
    }
}
