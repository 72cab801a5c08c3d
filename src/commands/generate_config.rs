//! Generate-config command - derives a file list from a payload directory.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;

use crate::elf::ElfInspector;
use crate::filelist::FileList;
use crate::resolver::{resolve_tags, DependencyGraph, TagFlag};
use crate::timing::Timer;

/// Resolve tags for every file in `dir` and print the TOML file list.
pub fn cmd_generate_config<W: Write>(
    compiler: &str,
    dir: &Path,
    flags: &[TagFlag],
    inspector: &dyn ElfInspector,
    mut out: W,
) -> Result<()> {
    let list = generate_file_list(compiler, dir, flags, inspector)?;
    out.write_all(list.to_toml()?.as_bytes())?;
    Ok(())
}

pub fn generate_file_list(
    compiler: &str,
    dir: &Path,
    flags: &[TagFlag],
    inspector: &dyn ElfInspector,
) -> Result<FileList> {
    let timer = Timer::start("resolve dependency tags");
    let graph = DependencyGraph::scan(dir, inspector)
        .with_context(|| format!("Failed to scan {}", dir.display()))?;
    let resolved = resolve_tags(&graph, flags)?;
    timer.finish();

    let mut list = FileList::new(compiler);
    for file in resolved {
        list.push(dir.join(&file.name), file.tags);
    }
    Ok(list)
}
