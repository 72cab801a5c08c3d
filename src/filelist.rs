//! TOML file list.
//!
//! The input of `create` and the output of `generate-config` and `extract`:
//!
//! ```toml
//! compiler = "3.3.0"
//!
//! [[file]]
//! path = "/tmp/bzImage"
//! tags = ["compat"]
//! ```

use crate::bundle::{BundleManifest, FileEntry};
use crate::calver::CalVer;
use crate::tags::Tag;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileList {
    /// Earliest compatible compiler.
    #[serde(default)]
    pub compiler: String,
    #[serde(default, rename = "file")]
    pub files: Vec<FileSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSpec {
    pub path: PathBuf,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl FileList {
    pub fn new(compiler: impl Into<String>) -> Self {
        Self {
            compiler: compiler.into(),
            files: Vec::new(),
        }
    }

    pub fn push(&mut self, path: impl Into<PathBuf>, tags: Vec<Tag>) {
        self.files.push(FileSpec {
            path: path.into(),
            tags,
        });
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid file list {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string(self)?)
    }

    /// Stat every listed file and build the manifest for `version`.
    ///
    /// Returns the manifest together with the source path of each entry.
    pub fn to_manifest(&self, version: CalVer) -> Result<(BundleManifest, Vec<PathBuf>)> {
        let mut manifest = BundleManifest::new(version, self.compiler.clone());
        let mut sources = Vec::with_capacity(self.files.len());

        for spec in &self.files {
            let meta = fs::metadata(&spec.path)
                .with_context(|| format!("Failed to stat {}", spec.path.display()))?;
            if !meta.is_file() {
                bail!("{} is not a regular file", spec.path.display());
            }
            let Some(name) = spec.path.file_name() else {
                bail!("{} has no file name", spec.path.display());
            };
            let name = name.to_string_lossy().into_owned();
            if manifest.files.iter().any(|f| f.name == name) {
                bail!("duplicate file name {name:?} in file list");
            }

            manifest
                .files
                .push(FileEntry::new(name, meta.len(), spec.tags.clone()));
            sources.push(spec.path.clone());
        }

        Ok((manifest, sources))
    }
}
