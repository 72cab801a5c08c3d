//! Unpack every payload of a bundle into a directory.

use super::error::{BundleError, BundleResult};
use super::reader::{entry_file_name, Bundle};
use super::MANIFEST_NAME;
use crate::tags::Tag;
use flate2::read::GzDecoder;
use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tar::Archive;
use tracing::debug;

/// A payload written to disk, with the tags it carried in the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnpackedFile {
    pub path: PathBuf,
    pub tags: Vec<Tag>,
}

/// Write every payload of `bundle` into `dest` (created if needed).
///
/// Entries are checked against the manifest as they are read: a name or size
/// mismatch, a missing entry or an unlisted trailing entry is
/// [`BundleError::Corrupt`]. Files written before the mismatch are left in
/// place.
pub fn unpack<R: Read + Seek>(bundle: Bundle<R>, dest: &Path) -> BundleResult<Vec<UnpackedFile>> {
    let files = bundle.files().to_vec();
    let mut source = bundle.into_inner();
    source.seek(SeekFrom::Start(0))?;

    fs::create_dir_all(dest)?;

    let mut archive = Archive::new(GzDecoder::new(source));
    let mut entries = archive
        .entries()
        .map_err(|e| BundleError::invalid_format(e.to_string()))?;

    // Already validated by Bundle::open.
    entries
        .next()
        .ok_or_else(|| BundleError::corrupt(MANIFEST_NAME, "end of archive"))??;

    let mut unpacked = Vec::with_capacity(files.len());
    for file in &files {
        let mut entry = entries
            .next()
            .ok_or_else(|| BundleError::corrupt(file.name.as_str(), "end of archive"))??;

        let name = entry_file_name(&entry)?;
        if name != file.name || entry.size() != file.size {
            return Err(BundleError::corrupt(
                format!("{} ({} bytes)", file.name, file.size),
                format!("{} ({} bytes)", name, entry.size()),
            ));
        }

        let path = dest.join(&name);
        entry.unpack(&path)?;
        debug!(path = %path.display(), "Unpacked payload");

        unpacked.push(UnpackedFile {
            path,
            tags: file.tags.clone(),
        });
    }

    if let Some(extra) = entries.next() {
        let extra = extra?;
        return Err(BundleError::corrupt(
            "end of archive",
            entry_file_name(&extra)?,
        ));
    }

    Ok(unpacked)
}
