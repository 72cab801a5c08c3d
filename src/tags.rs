//! File tags and the two selection predicates.
//!
//! On the wire a tag is a plain string; a leading `+` marks an OR-tag. Squash
//! markers only exist while the dependency resolver merges tag sets and never
//! reach a manifest or a file list.
//!
//! Two predicates decide whether a file is selected for a query:
//!
//! - [`TagQuery::selects_strict`] feeds the size estimate. Every plain tag
//!   must be requested, and when OR-tags are present at least one of them must
//!   be requested too.
//! - [`TagQuery::selects_loose`] feeds listing and extraction. Any tag name
//!   matching any requested name (markers ignored on both sides) selects the
//!   file.
//!
//! The two can disagree for the same query.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Prefix that marks an OR-tag on the wire.
pub const OR_MARKER: char = '+';

/// A single tag.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Tag {
    /// Required tag.
    Plain(String),
    /// Member of an "at least one of" group.
    Or(String),
    /// Resolver bookkeeping recording one side of an unreconciled merge.
    Squash(String),
}

impl Tag {
    /// Parse a wire string. `+name` is an OR-tag, anything else is plain.
    pub fn parse(s: &str) -> Self {
        match s.strip_prefix(OR_MARKER) {
            Some(name) => Tag::Or(name.to_string()),
            None => Tag::Plain(s.to_string()),
        }
    }

    /// The tag name without any marker.
    pub fn name(&self) -> &str {
        match self {
            Tag::Plain(name) | Tag::Or(name) | Tag::Squash(name) => name,
        }
    }

    pub fn is_squash(&self) -> bool {
        matches!(self, Tag::Squash(_))
    }
}

/// Squash markers serialize as their bare name; the resolver removes them
/// before anything is written.
impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tag::Plain(name) | Tag::Squash(name) => f.write_str(name),
            Tag::Or(name) => write!(f, "{OR_MARKER}{name}"),
        }
    }
}

impl From<String> for Tag {
    fn from(value: String) -> Self {
        match value.strip_prefix(OR_MARKER) {
            Some(name) => Tag::Or(name.to_string()),
            None => Tag::Plain(value),
        }
    }
}

impl From<&str> for Tag {
    fn from(value: &str) -> Self {
        Tag::parse(value)
    }
}

impl From<Tag> for String {
    fn from(value: Tag) -> Self {
        value.to_string()
    }
}

/// The set of tags requested at selection time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagQuery {
    tags: BTreeSet<Tag>,
}

impl TagQuery {
    /// Build a query from command-line style strings. Order and duplicates
    /// do not matter.
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            tags: tags.into_iter().map(|t| Tag::parse(t.as_ref())).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Requested tags in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.tags.iter()
    }

    /// True if the query holds `name` exactly as a plain string.
    fn has_exact(&self, name: &str) -> bool {
        self.tags.contains(&Tag::Plain(name.to_string()))
    }

    /// True if any requested tag has `name`, ignoring markers.
    fn has_name(&self, name: &str) -> bool {
        self.tags.iter().any(|t| t.name() == name)
    }

    /// Strict selection, used for size estimation.
    pub fn selects_strict(&self, tags: &[Tag]) -> bool {
        if tags.is_empty() {
            return true;
        }

        let mut has_or = false;
        let mut or_matched = false;
        for tag in tags {
            match tag {
                Tag::Plain(name) => {
                    if !self.has_exact(name) {
                        return false;
                    }
                }
                Tag::Or(name) => {
                    has_or = true;
                    or_matched |= self.has_exact(name);
                }
                Tag::Squash(_) => {}
            }
        }

        !has_or || or_matched
    }

    /// Loose selection, used for listing and extraction.
    pub fn selects_loose(&self, tags: &[Tag]) -> bool {
        tags.is_empty() || tags.iter().any(|t| self.has_name(t.name()))
    }
}
