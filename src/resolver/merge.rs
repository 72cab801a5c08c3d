//! Merging two tag assignments for the same file.

use crate::tags::Tag;
use std::collections::BTreeSet;

pub type TagSet = BTreeSet<Tag>;

/// Result of reconciling a file's current tags with tags arriving along a
/// new dependency edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Merge {
    /// Current tags are a subset of the incoming ones.
    Keep,
    /// Incoming tags are a subset of the current ones and replace them.
    Narrow(TagSet),
    /// Each side has exactly one tag the other lacks: the intersection plus a
    /// squash marker for each of the two odd tags.
    Squash(TagSet),
    /// No reconciliation possible; the file goes everywhere.
    GiveUp,
}

impl Merge {
    /// Tags to store after this merge.
    pub fn apply(self, current: TagSet) -> TagSet {
        match self {
            Merge::Keep => current,
            Merge::Narrow(tags) | Merge::Squash(tags) => tags,
            Merge::GiveUp => TagSet::new(),
        }
    }
}

pub fn merge(current: &TagSet, incoming: &TagSet) -> Merge {
    if current.is_subset(incoming) {
        return Merge::Keep;
    }
    if incoming.is_subset(current) {
        return Merge::Narrow(incoming.clone());
    }

    let mut only_current = current.difference(incoming);
    let mut only_incoming = incoming.difference(current);

    let (Some(left), None) = (only_current.next(), only_current.next()) else {
        return Merge::GiveUp;
    };
    let (Some(right), None) = (only_incoming.next(), only_incoming.next()) else {
        return Merge::GiveUp;
    };
    if current.iter().any(Tag::is_squash) {
        return Merge::GiveUp;
    }

    let mut merged: TagSet = current.intersection(incoming).cloned().collect();
    merged.insert(Tag::Squash(left.name().to_string()));
    merged.insert(Tag::Squash(right.name().to_string()));
    Merge::Squash(merged)
}
