//! Select command - picks the bundle that best matches a version.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::open_bundle;
use crate::calver::{best_match_index, sort_versions_by, CalVer};

/// Print the path of the bundle among `bundles` that best matches `version`.
pub fn cmd_select<W: Write>(version: &str, bundles: &[PathBuf], mut out: W) -> Result<()> {
    let query = CalVer::parse(version).with_context(|| format!("Invalid version {version:?}"))?;
    let chosen = select_bundle(&query, bundles)?;
    writeln!(out, "{}", chosen.display())?;
    Ok(())
}

/// Open every candidate, order them by version and run the best-match
/// search.
pub fn select_bundle<'a>(query: &CalVer, bundles: &'a [PathBuf]) -> Result<&'a Path> {
    let mut candidates = Vec::with_capacity(bundles.len());
    for path in bundles {
        let bundle = open_bundle(path)?;
        debug!(path = %path.display(), version = %bundle.version(), "Candidate bundle");
        candidates.push((bundle.version().clone(), path.as_path()));
    }
    sort_versions_by(&mut candidates, |(version, _)| version);

    let versions: Vec<CalVer> = candidates.iter().map(|(v, _)| v.clone()).collect();
    let idx = best_match_index(&versions, query)?;
    Ok(candidates[idx].1)
}
