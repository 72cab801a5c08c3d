//! Kernel bundle reader.
//!
//! Opening a bundle decodes only the manifest. Payloads are read later by
//! seeking back to the start and re-scanning the archive.

use super::error::{BundleError, BundleResult};
use super::stream::FilteredStream;
use super::{tar_footprint, BundleManifest, FileEntry, MANIFEST_NAME, TRAILER_SIZE};
use crate::calver::CalVer;
use crate::tags::TagQuery;
use flate2::read::GzDecoder;
use std::io::{Read, Seek, SeekFrom};
use tar::{Archive, Entry};
use tracing::debug;

/// An opened kernel bundle.
///
/// Owns the seekable source for as long as the bundle lives.
#[derive(Debug)]
pub struct Bundle<R> {
    manifest: BundleManifest,
    source: R,
}

impl<R: Read + Seek> Bundle<R> {
    /// Open a bundle and decode its manifest.
    ///
    /// Fails if the archive cannot be decoded or if its first entry is not the
    /// manifest. Payload entries are not touched.
    pub fn open(mut source: R) -> BundleResult<Self> {
        source.seek(SeekFrom::Start(0))?;

        let manifest = {
            let mut archive = Archive::new(GzDecoder::new(&mut source));
            let mut entries = archive
                .entries()
                .map_err(|e| BundleError::invalid_format(e.to_string()))?;
            let entry = entries
                .next()
                .ok_or_else(|| BundleError::invalid_format("archive is empty"))?
                .map_err(|e| BundleError::invalid_format(e.to_string()))?;

            let name = entry_file_name(&entry)?;
            if name != MANIFEST_NAME {
                return Err(BundleError::MissingManifest { found: name });
            }
            let manifest: BundleManifest = serde_json::from_reader(entry)?;
            manifest
        };

        debug!(
            version = %manifest.version,
            files = manifest.files.len(),
            "Opened kernel bundle"
        );

        Ok(Self { manifest, source })
    }

    /// Bundle version.
    pub fn version(&self) -> &CalVer {
        &self.manifest.version
    }

    /// Earliest compatible compiler.
    pub fn compiler_compat(&self) -> &str {
        &self.manifest.compiler_compat
    }

    /// Files in manifest order.
    pub fn files(&self) -> &[FileEntry] {
        &self.manifest.files
    }

    pub fn manifest(&self) -> &BundleManifest {
        &self.manifest
    }

    /// Estimated size in bytes of the archive produced for `query`.
    ///
    /// Uses the strict predicate, so it may count a different set of files
    /// than [`Bundle::files_list`] and [`Bundle::into_filtered_stream`].
    pub fn size(&self, query: &TagQuery) -> u64 {
        self.manifest
            .files
            .iter()
            .filter(|f| query.selects_strict(&f.tags))
            .map(|f| tar_footprint(f.size))
            .sum::<u64>()
            + TRAILER_SIZE
    }

    /// Names of the files the filtered stream would contain.
    pub fn files_list(&self, query: &TagQuery) -> Vec<&str> {
        self.manifest
            .files
            .iter()
            .filter(|f| query.selects_loose(&f.tags))
            .map(|f| f.name.as_str())
            .collect()
    }

    /// Give back the underlying source.
    pub fn into_inner(self) -> R {
        self.source
    }
}

impl<R: Read + Seek + Send + 'static> Bundle<R> {
    /// Stream an uncompressed archive holding only the files selected for
    /// `query`.
    ///
    /// Corruption is reported by the returned stream when the reader gets to
    /// it, not here.
    pub fn into_filtered_stream(self, query: TagQuery) -> FilteredStream {
        FilteredStream::spawn(self.source, self.manifest.files, query)
    }
}

/// Base name of an archive entry.
pub(crate) fn entry_file_name<R: Read>(entry: &Entry<'_, R>) -> BundleResult<String> {
    let path = entry
        .path()
        .map_err(|e| BundleError::invalid_format(e.to_string()))?;
    Ok(path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default())
}
