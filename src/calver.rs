//! Calendar versions for kernel bundles.
//!
//! Versions look like `YEAR.MONTH[.PATCH][-MODIFIER]`, e.g. `2023.1`, `2023.1.2`
//! or `2023.1.2-rc1`. The original string is kept verbatim so that formatting a
//! parsed version always reproduces its input.
//!
//! The ordering used here ([`CalVer::less`]) is not a total order. It exists to
//! drive [`best_match`], so `CalVer` does not implement `Ord`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced while parsing or matching versions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalVerError {
    #[error("invalid version string: {input:?}")]
    InvalidFormat { input: String },

    #[error("no match for kernel {query}")]
    NoMatch { query: String },
}

/// A parsed calendar version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CalVer {
    raw: String,
    year: u32,
    month: u32,
    patch: Option<u32>,
    modifier: String,
}

impl CalVer {
    /// Parse a version string.
    ///
    /// Punctuation is validated before any number is read: one or two dots,
    /// at most one dash, and the dash may not precede the last dot. Every
    /// dot-separated segment before the dash must be a non-negative integer.
    /// A modifier is only accepted together with an explicit patch.
    pub fn parse(s: &str) -> Result<Self, CalVerError> {
        let invalid = || CalVerError::InvalidFormat {
            input: s.to_string(),
        };

        let dots = s.matches('.').count();
        if !(1..=2).contains(&dots) {
            return Err(invalid());
        }
        if s.matches('-').count() > 1 {
            return Err(invalid());
        }
        if let (Some(dash), Some(last_dot)) = (s.find('-'), s.rfind('.')) {
            if last_dot > dash {
                return Err(invalid());
            }
        }

        let (numbers, modifier) = match s.split_once('-') {
            Some((numbers, modifier)) => (numbers, modifier),
            None => (s, ""),
        };

        let fields = numbers
            .split('.')
            .map(|field| field.parse::<u32>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>, _>>()?;

        let (year, month, patch) = match fields.as_slice() {
            [year, month] => (*year, *month, None),
            [year, month, patch] => (*year, *month, Some(*patch)),
            _ => return Err(invalid()),
        };

        if !modifier.is_empty() && patch.is_none() {
            return Err(invalid());
        }

        Ok(Self {
            raw: s.to_string(),
            year,
            month,
            patch,
            modifier: modifier.to_string(),
        })
    }

    pub fn year(&self) -> u32 {
        self.year
    }

    /// Alias for [`CalVer::year`].
    pub fn major(&self) -> u32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// Alias for [`CalVer::month`].
    pub fn minor(&self) -> u32 {
        self.month
    }

    /// Patch level, or `None` when the version only had two numeric fields.
    ///
    /// `2023.1` and `2023.1.0` are different versions.
    pub fn patch(&self) -> Option<u32> {
        self.patch
    }

    /// Modifier after the dash, empty if there is none.
    pub fn modifier(&self) -> &str {
        &self.modifier
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Search ordering used by [`best_match`].
    ///
    /// `self` sorts before `other` when neither major nor minor exceeds the
    /// other's, and either `other` has no patch or both have one and ours is not
    /// larger. When major, minor and patch are all equal the modifier breaks the
    /// tie: a pre-release (`-rc1`) sorts before the plain release, two
    /// modifiers compare as strings.
    ///
    /// This is not a total order. A patchless `other` accepts any patch
    /// (`2023.1.5` is less than `2023.1`, never the reverse), and
    /// `2023.2.0` and `2024.1.0` are not less than each other either way.
    pub fn less(&self, other: &CalVer) -> bool {
        let patch_ok = match (self.patch, other.patch) {
            (_, None) => true,
            (Some(mine), Some(theirs)) => mine <= theirs,
            (None, Some(_)) => false,
        };

        if !(self.major() <= other.major() && self.minor() <= other.minor() && patch_ok) {
            return false;
        }

        if self.major() == other.major()
            && self.minor() == other.minor()
            && self.patch == other.patch
        {
            if self.modifier.is_empty() {
                return false;
            }
            if other.modifier.is_empty() {
                return true;
            }
            return self.modifier < other.modifier;
        }

        true
    }
}

impl fmt::Display for CalVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for CalVer {
    type Err = CalVerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CalVer {
    type Error = CalVerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CalVer> for String {
    fn from(value: CalVer) -> Self {
        value.raw
    }
}

/// Order versions the way [`best_match`] expects its input.
///
/// Year, month, then patch with a missing patch after every explicit one,
/// then modifier: any modifier before none, two modifiers as strings. Within
/// one month line this agrees with [`CalVer::less`].
pub fn sort_versions(versions: &mut [CalVer]) {
    sort_versions_by(versions, |v| v);
}

/// [`sort_versions`] for items that carry a version.
pub fn sort_versions_by<T>(items: &mut [T], version: impl Fn(&T) -> &CalVer) {
    items.sort_by(|a, b| sort_key(version(a)).cmp(&sort_key(version(b))));
}

fn sort_key(v: &CalVer) -> (u32, u32, bool, Option<u32>, bool, &str) {
    (
        v.year,
        v.month,
        v.patch.is_none(),
        v.patch,
        v.modifier.is_empty(),
        v.modifier.as_str(),
    )
}

/// Pick the best available version for `query` from an ascending list.
///
/// Binary-searches for the first entry that is not [`less`](CalVer::less)
/// than `query`. If that entry is `query` itself it is returned. A query with
/// a modifier only accepts that exact match. Otherwise the entry just before
/// the search position is accepted when it has the query's year and, if the
/// query names a patch, the same patch.
///
/// The fallback compares only the year; the month line is not checked.
pub fn best_match<'a>(sorted: &'a [CalVer], query: &CalVer) -> Result<&'a CalVer, CalVerError> {
    best_match_index(sorted, query).map(|i| &sorted[i])
}

/// Index form of [`best_match`].
pub fn best_match_index(sorted: &[CalVer], query: &CalVer) -> Result<usize, CalVerError> {
    let no_match = || CalVerError::NoMatch {
        query: query.to_string(),
    };

    let idx = sorted.partition_point(|candidate| candidate.less(query));

    if let Some(found) = sorted.get(idx) {
        if found.as_str() == query.as_str() {
            return Ok(idx);
        }
    }

    if !query.modifier().is_empty() {
        return Err(no_match());
    }

    if idx > 0 {
        let candidate = &sorted[idx - 1];
        if candidate.major() == query.major()
            && (query.patch().is_none() || candidate.patch() == query.patch())
        {
            return Ok(idx - 1);
        }
    }

    Err(no_match())
}
