//! Inspect command - prints bundle metadata.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use super::open_bundle;

/// Print version, compiler floor, digest and file list of a bundle.
pub fn cmd_inspect<W: Write>(path: &Path, mut out: W) -> Result<()> {
    let bundle = open_bundle(path)?;
    let digest = sha256_file(path)?;

    writeln!(out, "Version: {}", bundle.version())?;
    writeln!(out, "Earliest Compatible Compiler: {}", bundle.compiler_compat())?;
    writeln!(out, "SHA256: {digest}")?;
    writeln!(out, "Files:")?;
    for file in bundle.files() {
        let tags: Vec<String> = file.tags.iter().map(ToString::to_string).collect();
        writeln!(out, "  {} ({} bytes)", file.name, file.size)?;
        writeln!(out, "    [{}]", tags.join(" "))?;
    }
    Ok(())
}

/// SHA256 of a file's contents as lowercase hex.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .with_context(|| format!("Failed to read {} for hashing", path.display()))?;
    Ok(format!("{:x}", hasher.finalize()))
}
