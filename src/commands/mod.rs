//! CLI command handlers.
//!
//! Each submodule handles one `kbundle` subcommand:
//! - `create` - Build a kernel bundle from a TOML file list
//! - `inspect` - Print bundle metadata
//! - `extract` - Unpack a bundle into a directory
//! - `process` - Stream the filtered archive for a set of tags
//! - `select` - Pick the best bundle for a version
//! - `generate_config` - Derive a file list from a payload directory
//! - `fetch_libs` - Copy missing shared objects into a payload directory
//!
//! Handlers write their primary output to the writer they are given, so
//! `main` can hand them stdout and tests a buffer.

pub mod create;
pub mod extract;
pub mod fetch_libs;
pub mod generate_config;
pub mod inspect;
pub mod process;
pub mod select;

pub use create::cmd_create;
pub use extract::cmd_extract;
pub use fetch_libs::cmd_fetch_libs;
pub use generate_config::cmd_generate_config;
pub use inspect::cmd_inspect;
pub use process::cmd_process;
pub use select::cmd_select;

use crate::bundle::Bundle;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Open a bundle file.
pub(crate) fn open_bundle(path: &Path) -> Result<Bundle<BufReader<File>>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    Bundle::open(BufReader::new(file))
        .with_context(|| format!("Failed to read kernel bundle {}", path.display()))
}
