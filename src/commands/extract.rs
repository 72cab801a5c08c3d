//! Extract command - unpacks a bundle into a directory.

use anyhow::{bail, Context, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::info;

use super::open_bundle;
use crate::bundle::unpack;
use crate::filelist::FileList;
use crate::timing::Timer;

/// Name of the file list written next to the unpacked payloads.
pub const FILE_LIST_NAME: &str = "bundle.toml";

/// Unpack every payload of `bundle` into `dest` and write a `bundle.toml`
/// that recreates the bundle with `create`.
pub fn cmd_extract(bundle: &Path, dest: &Path) -> Result<()> {
    let list_path = dest.join(FILE_LIST_NAME);
    if list_path
        .try_exists()
        .with_context(|| format!("Failed to check {}", list_path.display()))?
    {
        bail!("skipping {FILE_LIST_NAME} because it already exists in {}", dest.display());
    }

    let timer = Timer::start("extract bundle");
    let bundle = open_bundle(bundle)?;
    let mut list = FileList::new(bundle.compiler_compat());

    for file in unpack(bundle, dest).context("Failed to unpack kernel bundle")? {
        list.push(file.path, file.tags);
    }

    let mut out = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&list_path)
        .with_context(|| format!("Failed to create {}", list_path.display()))?;
    out.write_all(list.to_toml()?.as_bytes())?;

    info!(files = list.files.len(), dest = %dest.display(), "Extracted kernel bundle");
    timer.finish();
    Ok(())
}
