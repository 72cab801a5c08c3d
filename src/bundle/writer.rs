//! Kernel bundle writer.
//!
//! Writes the manifest as the first entry, then each payload verbatim in
//! manifest order. Payloads added from disk keep their filesystem metadata
//! in the entry header.

use super::error::{BundleError, BundleResult};
use super::{BundleManifest, MANIFEST_NAME};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tar::{Builder, Header};
use tracing::debug;

/// Streaming writer for gzip-compressed kernel bundles.
pub struct BundleWriter<W: Write> {
    builder: Builder<GzEncoder<W>>,
}

impl<W: Write> BundleWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            builder: Builder::new(GzEncoder::new(out, Compression::default())),
        }
    }

    /// Append the manifest entry. Must be called before any payload.
    pub fn append_manifest(&mut self, manifest: &BundleManifest) -> BundleResult<()> {
        let data = manifest.encode()?;
        self.append_bytes(MANIFEST_NAME, &data)
    }

    /// Append an in-memory payload as a regular file entry.
    pub fn append_bytes(&mut self, name: &str, data: &[u8]) -> BundleResult<()> {
        let mut header = Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        );
        header.set_entry_type(tar::EntryType::Regular);
        self.builder.append_data(&mut header, name, data)?;
        Ok(())
    }

    /// Append a file from disk under `name`, preserving its metadata.
    pub fn append_path(&mut self, path: &Path, name: &str) -> BundleResult<()> {
        debug!(path = %path.display(), name, "Adding payload");
        self.builder.append_path_with_name(path, name)?;
        Ok(())
    }

    /// Write the end-of-archive marker, flush the compressor and return the
    /// inner writer.
    pub fn finish(self) -> BundleResult<W> {
        let encoder = self.builder.into_inner()?;
        Ok(encoder.finish()?)
    }
}

/// Write a complete bundle: the manifest, then `sources[i]` as the payload
/// for `manifest.files[i]`.
///
/// Every source must exist and have the size recorded in the manifest; a
/// source that changed size since the manifest was built is rejected. Any
/// failure aborts the whole write.
pub fn write_bundle<W: Write>(
    out: W,
    manifest: &BundleManifest,
    sources: &[PathBuf],
) -> BundleResult<W> {
    if sources.len() != manifest.files.len() {
        return Err(BundleError::invalid_format(format!(
            "manifest lists {} files but {} sources were given",
            manifest.files.len(),
            sources.len()
        )));
    }

    let mut writer = BundleWriter::new(out);
    writer.append_manifest(manifest)?;
    for (file, source) in manifest.files.iter().zip(sources) {
        let size = fs::metadata(source)?.len();
        if size != file.size {
            return Err(BundleError::invalid_format(format!(
                "{} is {size} bytes, manifest records {} for {}",
                source.display(),
                file.size,
                file.name
            )));
        }
        writer.append_path(source, &file.name)?;
    }
    writer.finish()
}
