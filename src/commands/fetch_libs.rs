//! Fetch-libs command - copies imported shared objects into a directory.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::elf::ElfInspector;
use crate::fetch::{FetchReport, LibraryFetcher};
use crate::timing::Timer;

pub fn cmd_fetch_libs(
    dir: &Path,
    config: &Config,
    inspector: Arc<dyn ElfInspector>,
) -> Result<FetchReport> {
    let timer = Timer::start("fetch shared objects");
    let report = LibraryFetcher::new(dir, config.lib_dirs.clone(), inspector)
        .jobs(config.fetch_jobs)
        .run()?;

    for name in &report.missing {
        warn!("Unable to locate shared object: '{name}'");
    }
    info!(
        copied = report.copied.len(),
        missing = report.missing.len(),
        "Fetched shared objects"
    );
    timer.finish();
    Ok(report)
}
