//! Dependency tag resolver.
//!
//! Given a flat directory of kernel payloads and a few explicitly tagged
//! files, propagate tags along shared-library imports so every library is
//! shipped with the programs that need it:
//!
//! ```text
//! --tags strace,debug  →  strace [debug]
//!                           └── libdw.so.1 [debug]
//!                                 └── libz.so.1 [debug] ← also reached from
//!                                                         curl [net] → squash
//! ```
//!
//! Each tagged executable, then each tagged shared library, is a traversal
//! root with its own visited set. Tags already stored for a file are merged
//! with the incoming ones (see [`merge`]). The tag map is shared across
//! roots.

mod merge;

pub use merge::{merge, Merge, TagSet};

use crate::elf::{ElfInspector, ElfKind};
use crate::tags::Tag;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no such file found in DIR: {name}")]
    UnknownFile { name: String },

    #[error("invalid tag flag {flag:?} (expected FILE,TAG[,TAG...])")]
    InvalidFlag { flag: String },

    #[error("failed to inspect {}: {reason}", path.display())]
    Inspect { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// One `--tags FILE,TAG[,TAG...]` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagFlag {
    pub file: String,
    pub tags: Vec<Tag>,
}

impl FromStr for TagFlag {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(',');
        let file = parts.next().unwrap_or_default();
        if file.is_empty() {
            return Err(ResolveError::InvalidFlag { flag: s.to_string() });
        }
        Ok(Self {
            file: file.to_string(),
            tags: parts.filter(|t| !t.is_empty()).map(Tag::parse).collect(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Executable,
    SharedObject,
    Other,
}

/// A file in the scanned directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphFile {
    pub name: String,
    pub kind: FileKind,
    /// Base names of imported shared objects.
    pub imports: Vec<String>,
}

impl GraphFile {
    pub fn new(name: impl Into<String>, kind: FileKind) -> Self {
        Self {
            name: name.into(),
            kind,
            imports: Vec::new(),
        }
    }

    pub fn imports<I, S>(mut self, imports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.imports = imports.into_iter().map(Into::into).collect();
        self
    }
}

/// The files of one directory and their import edges.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    files: Vec<GraphFile>,
    index: HashMap<String, usize>,
}

impl DependencyGraph {
    /// Build a graph from already classified files. Scan order is the order
    /// given.
    pub fn from_files(files: impl IntoIterator<Item = GraphFile>) -> Self {
        let files: Vec<GraphFile> = files.into_iter().collect();
        let index = files
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i))
            .collect();
        Self { files, index }
    }

    /// Classify every regular file in `dir` (sorted by name) and read its
    /// imports.
    pub fn scan(dir: &Path, inspector: &dyn ElfInspector) -> Result<Self, ResolveError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.path().is_file() {
                debug!(path = %entry.path().display(), "Skipping non-file");
                continue;
            }
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();

        let mut files = Vec::with_capacity(names.len());
        for name in names {
            let path = dir.join(&name);
            let inspect_err = |e: anyhow::Error| ResolveError::Inspect {
                path: path.clone(),
                reason: format!("{e:#}"),
            };

            let kind = match inspector.header(&path).map_err(inspect_err)? {
                None => FileKind::Other,
                Some(header) => match header.kind {
                    ElfKind::Executable => FileKind::Executable,
                    ElfKind::SharedObject => FileKind::SharedObject,
                    ElfKind::Other(desc) => {
                        warn!(
                            file = %name,
                            elf_type = %desc,
                            "Unknown ELF type, this file will be included on every disk"
                        );
                        FileKind::Other
                    }
                },
            };

            let imports = if kind == FileKind::Other {
                Vec::new()
            } else {
                inspector
                    .imported_libraries(&path)
                    .map_err(inspect_err)?
                    .into_iter()
                    .map(|lib| base_name(&lib))
                    .collect()
            };

            files.push(GraphFile::new(name, kind).imports(imports));
        }

        Ok(Self::from_files(files))
    }

    pub fn files(&self) -> &[GraphFile] {
        &self.files
    }

    pub fn get(&self, name: &str) -> Option<&GraphFile> {
        self.index.get(name).map(|&i| &self.files[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }
}

/// Final tag assignment for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    pub name: String,
    pub tags: Vec<Tag>,
}

/// Propagate the tags given in `flags` through `graph`.
///
/// Returns every file of the graph: flagged files first in flag order, then
/// the rest sorted by name. Squash markers never appear in the result.
pub fn resolve_tags(
    graph: &DependencyGraph,
    flags: &[TagFlag],
) -> Result<Vec<ResolvedFile>, ResolveError> {
    // `None` is unset; `Some` of an empty set ships everywhere.
    let mut arena: HashMap<&str, Option<TagSet>> = graph
        .files
        .iter()
        .map(|f| (f.name.as_str(), None))
        .collect();

    let mut flagged: Vec<&str> = Vec::new();
    for flag in flags {
        let (name, tags) = arena
            .get_key_value(flag.file.as_str())
            .map(|(k, v)| (*k, v.clone()))
            .ok_or_else(|| ResolveError::UnknownFile {
                name: flag.file.clone(),
            })?;
        let mut tags = tags.unwrap_or_default();
        tags.extend(flag.tags.iter().cloned());
        arena.insert(name, Some(tags));
        if !flagged.contains(&name) {
            flagged.push(name);
        }
    }

    let roots = graph
        .files
        .iter()
        .filter(|f| f.kind == FileKind::Executable)
        .chain(
            graph
                .files
                .iter()
                .filter(|f| f.kind == FileKind::SharedObject),
        );

    for root in roots {
        let tags = arena
            .get(root.name.as_str())
            .cloned()
            .flatten()
            .unwrap_or_default();
        if tags.is_empty() {
            if root.kind == FileKind::Executable {
                warn!(
                    file = %root.name,
                    "Binary has no defined tags, this file will be included on every disk"
                );
            }
            continue;
        }
        debug!(root = %root.name, tags = ?tags, "Resolving dependency tags");
        let mut visited = HashSet::new();
        Traversal {
            graph,
            arena: &mut arena,
            visited: &mut visited,
        }
        .visit(root, tags);
    }

    let mut rest: Vec<&str> = graph
        .files
        .iter()
        .map(|f| f.name.as_str())
        .filter(|n| !flagged.contains(n))
        .collect();
    rest.sort_unstable();

    Ok(flagged
        .into_iter()
        .chain(rest)
        .map(|name| ResolvedFile {
            name: name.to_string(),
            tags: arena
                .remove(name)
                .flatten()
                .unwrap_or_default()
                .into_iter()
                .filter(|t| !t.is_squash())
                .collect(),
        })
        .collect())
}

struct Traversal<'g, 'a> {
    graph: &'g DependencyGraph,
    arena: &'a mut HashMap<&'g str, Option<TagSet>>,
    visited: &'a mut HashSet<&'g str>,
}

impl<'g> Traversal<'g, '_> {
    fn visit(&mut self, file: &'g GraphFile, incoming: TagSet) {
        let name = file.name.as_str();
        if !self.visited.insert(name) {
            return;
        }

        let current = match self.arena.remove(name).flatten() {
            None => incoming,
            Some(stored) => {
                let outcome = merge(&stored, &incoming);
                if outcome == Merge::GiveUp {
                    warn!(
                        file = %name,
                        current = ?stored,
                        incoming = ?incoming,
                        "Unable to merge tags, this file will be included on every disk"
                    );
                }
                outcome.apply(stored)
            }
        };
        self.arena.insert(name, Some(current.clone()));

        for import in &file.imports {
            match self.graph.get(import) {
                Some(dep) => self.visit(dep, current.clone()),
                None => warn!(
                    file = %name,
                    import = %import,
                    "Possible missing shared object"
                ),
            }
        }
    }
}

fn base_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}
