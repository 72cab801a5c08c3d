//! Shared-object fetcher behind `fetch-libs`.
//!
//! Scans a payload directory for ELF files and copies every transitively
//! imported 64-bit shared object from the host library folders into it.
//! Scans and fetches run as blocking tasks on a tokio runtime, bounded by a
//! semaphore. A mutex-guarded claim set makes sure each library name is
//! searched for and copied once, however many files import it.

use crate::elf::ElfInspector;
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Libraries needed for name resolution, which nothing imports directly.
pub const ALWAYS_REQUIRED: [&str; 3] = ["libnss_dns.so.2", "libnss_files.so.2", "libresolv.so.2"];

/// Library folders containing this are never searched.
const EXCLUDED_PATH_PART: &str = "vmware";

/// Outcome of a fetch run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FetchReport {
    /// Files copied into the destination, sorted.
    pub copied: Vec<PathBuf>,
    /// Library names that were required but not found, sorted.
    pub missing: Vec<String>,
}

pub struct LibraryFetcher {
    dest: PathBuf,
    lib_dirs: Vec<PathBuf>,
    jobs: usize,
    inspector: Arc<dyn ElfInspector>,
}

impl LibraryFetcher {
    pub fn new(dest: &Path, lib_dirs: Vec<PathBuf>, inspector: Arc<dyn ElfInspector>) -> Self {
        Self {
            dest: dest.to_path_buf(),
            lib_dirs,
            jobs: 1,
            inspector,
        }
    }

    /// Maximum number of concurrent scan/fetch tasks (at least 1).
    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Run to completion on a dedicated runtime.
    pub fn run(self) -> Result<FetchReport> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.jobs)
            .thread_name("kbundle-fetch")
            .build()
            .context("Failed to start fetch runtime")?;
        runtime.block_on(self.fetch_all())
    }

    async fn fetch_all(self) -> Result<FetchReport> {
        let jobs = self.jobs;
        let state = Arc::new(FetchState::new(self)?);
        let semaphore = Arc::new(Semaphore::new(jobs));
        let mut tasks = JoinSet::new();

        let mut seed: Vec<Work> = ALWAYS_REQUIRED
            .iter()
            .map(|name| Work::Fetch(name.to_string()))
            .collect();
        for entry in WalkDir::new(&state.dest) {
            let entry = entry.context("Failed to scan destination")?;
            if entry.file_type().is_file() {
                seed.push(Work::Scan(entry.into_path()));
            }
        }
        for work in seed {
            spawn(&mut tasks, &semaphore, &state, work);
        }

        while let Some(joined) = tasks.join_next().await {
            let next = match joined.context("Fetch task failed").and_then(|r| r) {
                Ok(next) => next,
                Err(e) => {
                    tasks.abort_all();
                    return Err(e);
                }
            };
            for work in next {
                spawn(&mut tasks, &semaphore, &state, work);
            }
        }

        Ok(state.report())
    }
}

fn spawn(
    tasks: &mut JoinSet<Result<Vec<Work>>>,
    semaphore: &Arc<Semaphore>,
    state: &Arc<FetchState>,
    work: Work,
) {
    let semaphore = Arc::clone(semaphore);
    let state = Arc::clone(state);
    tasks.spawn(async move {
        let _permit = semaphore.acquire_owned().await?;
        tokio::task::spawn_blocking(move || state.process(work)).await?
    });
}

#[derive(Debug)]
enum Work {
    /// Read the imports of a file.
    Scan(PathBuf),
    /// Find a library by base name and copy it into the destination.
    Fetch(String),
}

struct FetchState {
    dest: PathBuf,
    lib_dirs: Vec<PathBuf>,
    inspector: Arc<dyn ElfInspector>,
    /// Names already being handled, found or not.
    claimed: Mutex<HashSet<String>>,
    /// Names present in the destination.
    found: Mutex<HashSet<String>>,
    copied: Mutex<Vec<PathBuf>>,
}

impl FetchState {
    fn new(fetcher: LibraryFetcher) -> Result<Self> {
        // Files already in the top level of the destination are never
        // replaced by host copies.
        let mut present = HashSet::new();
        for entry in fs::read_dir(&fetcher.dest)
            .with_context(|| format!("Failed to read {}", fetcher.dest.display()))?
        {
            present.insert(entry?.file_name().to_string_lossy().into_owned());
        }

        Ok(Self {
            dest: fetcher.dest,
            lib_dirs: fetcher.lib_dirs,
            inspector: fetcher.inspector,
            claimed: Mutex::new(present.clone()),
            found: Mutex::new(present),
            copied: Mutex::new(Vec::new()),
        })
    }

    fn process(&self, work: Work) -> Result<Vec<Work>> {
        match work {
            Work::Scan(path) => {
                let imports = self
                    .inspector
                    .imported_libraries(&path)
                    .with_context(|| format!("Failed to scan {}", path.display()))?;
                Ok(imports
                    .into_iter()
                    .map(|lib| Work::Fetch(base_name(&lib)))
                    .collect())
            }
            Work::Fetch(name) => {
                if !self.claim(&name) {
                    return Ok(Vec::new());
                }
                match self.locate(&name)? {
                    Some(host) => {
                        self.copy_in(&host, &name)?;
                        Ok(vec![Work::Scan(host)])
                    }
                    None => Ok(Vec::new()),
                }
            }
        }
    }

    /// True if the caller is the first to ask for `name`.
    fn claim(&self, name: &str) -> bool {
        self.claimed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string())
    }

    /// First 64-bit ELF named `name` under the library folders.
    fn locate(&self, name: &str) -> Result<Option<PathBuf>> {
        for dir in &self.lib_dirs {
            if !dir.exists() {
                continue;
            }
            let walker = WalkDir::new(dir)
                .into_iter()
                .filter_entry(|e| !e.path().to_string_lossy().contains(EXCLUDED_PATH_PART));
            for entry in walker {
                let entry = entry.with_context(|| format!("Failed to walk {}", dir.display()))?;
                if entry.file_type().is_dir() || entry.file_name() != name {
                    continue;
                }
                let header = self
                    .inspector
                    .header(entry.path())
                    .with_context(|| format!("Failed to inspect {}", entry.path().display()))?;
                match header {
                    Some(h) if h.class64 => return Ok(Some(entry.into_path())),
                    Some(_) => debug!(path = %entry.path().display(), "Skipping 32-bit library"),
                    None => debug!(path = %entry.path().display(), "Skipping non-ELF match"),
                }
            }
        }
        Ok(None)
    }

    fn copy_in(&self, host: &Path, name: &str) -> Result<()> {
        let local = self.dest.join(name);
        info!("Copying: {} -> {}", host.display(), local.display());
        fs::copy(host, &local)
            .with_context(|| format!("Failed to copy {} to {}", host.display(), local.display()))?;

        self.found
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string());
        self.copied
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(local);
        Ok(())
    }

    fn report(&self) -> FetchReport {
        let claimed = self.claimed.lock().unwrap_or_else(PoisonError::into_inner);
        let found = self.found.lock().unwrap_or_else(PoisonError::into_inner);

        let mut missing: Vec<String> = claimed.difference(&found).cloned().collect();
        missing.sort();
        let mut copied = self
            .copied
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        copied.sort();

        FetchReport { copied, missing }
    }
}

fn base_name(lib: &str) -> String {
    Path::new(lib)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| lib.to_string())
}
