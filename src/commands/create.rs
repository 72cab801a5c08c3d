//! Create command - builds a kernel bundle.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

use crate::bundle::write_bundle;
use crate::calver::CalVer;
use crate::filelist::FileList;
use crate::timing::Timer;

/// Build a bundle for `version` from the file list at `config`.
///
/// Writes to `output` if given, otherwise to `out`. A partially written
/// output file is removed on failure.
pub fn cmd_create<W: Write>(
    version: &str,
    config: &Path,
    output: Option<&Path>,
    out: W,
) -> Result<()> {
    let timer = Timer::start("create bundle");

    let version =
        CalVer::parse(version).with_context(|| format!("Invalid bundle version {version:?}"))?;
    let list = FileList::load(config)?;
    let (manifest, sources) = list.to_manifest(version)?;

    info!(
        version = %manifest.version,
        files = manifest.files.len(),
        "Creating kernel bundle"
    );

    match output {
        Some(path) => {
            let result = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))
                .and_then(|file| {
                    let mut writer = write_bundle(BufWriter::new(file), &manifest, &sources)?;
                    writer.flush()?;
                    Ok(())
                });
            if result.is_err() {
                let _ = fs::remove_file(path);
            }
            result?;
        }
        None => {
            let mut writer = write_bundle(BufWriter::new(out), &manifest, &sources)?;
            writer.flush()?;
        }
    }

    timer.finish();
    Ok(())
}
