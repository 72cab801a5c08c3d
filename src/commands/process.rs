//! Process command - applies tags to a bundle.

use anyhow::{Context, Result};
use std::io::{self, Write};
use std::path::Path;

use super::open_bundle;
use crate::tags::TagQuery;

/// What `process` should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessMode {
    /// The filtered, uncompressed archive.
    #[default]
    Stream,
    /// Names of the files the archive would contain, one per line.
    DryRun,
    /// Estimated archive size in bytes.
    Size,
}

/// Apply `tags` to `bundle` and write the result selected by `mode`.
pub fn cmd_process<W: Write>(
    bundle: &Path,
    tags: &[String],
    mode: ProcessMode,
    mut out: W,
) -> Result<()> {
    let bundle = open_bundle(bundle)?;
    let query = TagQuery::new(tags);

    match mode {
        ProcessMode::DryRun => {
            for name in bundle.files_list(&query) {
                writeln!(out, "{name}")?;
            }
        }
        ProcessMode::Size => {
            writeln!(out, "{}", bundle.size(&query))?;
        }
        ProcessMode::Stream => {
            let mut stream = bundle.into_filtered_stream(query);
            io::copy(&mut stream, &mut out).context("Failed to write filtered archive")?;
            out.flush()?;
            stream.close()?;
        }
    }
    Ok(())
}
