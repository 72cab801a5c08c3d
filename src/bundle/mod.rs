//! Kernel bundles.
//!
//! A kernel bundle is a gzip-compressed tar archive:
//!
//! ```text
//! vkernel-2023.1.2
//! ├── manifest        # JSON BundleManifest, always the first entry
//! ├── bzImage         # payloads, in manifest order
//! ├── vinitd
//! └── libc.so.6
//! ```
//!
//! The manifest lists every payload with its size and tags. The order of
//! `files` is the physical order of the payload entries and is verified when
//! the bundle is filtered or unpacked.
//!
//! ## Usage
//!
//! ```ignore
//! let bundle = Bundle::open(File::open("vkernel-2023.1.2")?)?;
//! println!("{}", bundle.version());
//!
//! let mut stream = bundle.into_filtered_stream(TagQuery::new(["compat", "debug"]));
//! std::io::copy(&mut stream, &mut std::io::stdout())?;
//! ```

mod error;
mod reader;
mod stream;
mod unpack;
mod writer;

pub use error::{BundleError, BundleResult};
pub use reader::Bundle;
pub use stream::FilteredStream;
pub use unpack::{unpack, UnpackedFile};
pub use writer::{write_bundle, BundleWriter};

use crate::calver::CalVer;
use crate::tags::Tag;
use serde::{Deserialize, Deserializer, Serialize};

/// Entry name of the manifest frame.
pub const MANIFEST_NAME: &str = "manifest";

/// Tar block size used by the size estimate.
pub const BLOCK_SIZE: u64 = 512;

/// Trailing padding added to every size estimate (two zero blocks).
pub const TRAILER_SIZE: u64 = 1024;

/// Metadata for one payload file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Base file name; also the name of the payload entry.
    pub name: String,
    /// Payload size in bytes.
    pub size: u64,
    /// Inclusion tags. Empty means "always included".
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
}

impl FileEntry {
    pub fn new(name: impl Into<String>, size: u64, tags: Vec<Tag>) -> Self {
        Self {
            name: name.into(),
            size,
            tags,
        }
    }
}

/// The JSON document stored in the manifest frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleManifest {
    pub version: CalVer,
    /// Earliest compatible compiler.
    #[serde(rename = "compiler", default)]
    pub compiler_compat: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub files: Vec<FileEntry>,
}

impl BundleManifest {
    pub fn new(version: CalVer, compiler_compat: impl Into<String>) -> Self {
        Self {
            version,
            compiler_compat: compiler_compat.into(),
            files: Vec::new(),
        }
    }

    /// Serialize to JSON. No other normalization is applied.
    pub fn encode(&self) -> BundleResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(data: &[u8]) -> BundleResult<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<FileEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<FileEntry>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Bytes a payload of `size` occupies in a tar stream: one header block plus
/// the data rounded up to whole blocks.
pub fn tar_footprint(size: u64) -> u64 {
    (1 + size.div_ceil(BLOCK_SIZE)) * BLOCK_SIZE
}
