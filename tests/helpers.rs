//! Shared test utilities for kbundle tests.
#![allow(dead_code)]

use anyhow::Result;
use kbundle::elf::{ElfHeader, ElfInspector, ElfKind};
use kbundle::filelist::FileList;
use kbundle::tags::Tag;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Test environment with a payload directory and an output directory.
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    /// Bundle payloads (kernel, init, libraries)
    pub payload: PathBuf,
    /// Bundles, file lists and extraction targets
    pub out: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let payload = temp_dir.path().join("payload");
        let out = temp_dir.path().join("out");
        fs::create_dir_all(&payload).expect("Failed to create payload dir");
        fs::create_dir_all(&out).expect("Failed to create out dir");

        Self {
            _temp_dir: temp_dir,
            payload,
            out,
        }
    }

    /// Write a payload file and return its path.
    pub fn payload_file(&self, name: &str, content: &[u8]) -> PathBuf {
        let path = self.payload.join(name);
        fs::write(&path, content).expect("Failed to write payload");
        path
    }

    /// Write a TOML file list for `files` (name, tags) under `out/`.
    pub fn file_list(&self, compiler: &str, files: &[(&str, &[&str])]) -> PathBuf {
        let mut list = FileList::new(compiler);
        for (name, tags) in files {
            list.push(self.payload.join(name), tags.iter().map(|t| Tag::parse(t)).collect());
        }
        let path = self.out.join("bundle.toml");
        fs::write(&path, list.to_toml().expect("Failed to encode file list"))
            .expect("Failed to write file list");
        path
    }
}

/// Mock ELF file understood by [`FakeElf`]:
///
/// ```text
/// ELF64 EXEC
/// NEEDED libc.so.6
/// ```
pub fn create_mock_elf(path: &Path, class: &str, kind: &str, needed: &[&str]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent dir for ELF");
    }
    let mut content = format!("{class} {kind}\n");
    for lib in needed {
        content.push_str(&format!("NEEDED {lib}\n"));
    }
    fs::write(path, content).expect("Failed to create mock ELF");

    let mut perms = fs::metadata(path).expect("Failed to get metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).expect("Failed to set permissions");
}

pub fn create_mock_binary(path: &Path, needed: &[&str]) {
    create_mock_elf(path, "ELF64", "EXEC", needed);
}

pub fn create_mock_library(path: &Path, needed: &[&str]) {
    create_mock_elf(path, "ELF64", "DYN", needed);
}

/// [`ElfInspector`] reading the text format written by [`create_mock_elf`].
/// Anything else is "not ELF".
pub struct FakeElf;

impl FakeElf {
    fn lines(path: &Path) -> Option<Vec<String>> {
        let text = fs::read_to_string(path).ok()?;
        let lines: Vec<String> = text.lines().map(str::to_string).collect();
        lines.first()?.starts_with("ELF").then_some(lines)
    }
}

impl ElfInspector for FakeElf {
    fn header(&self, path: &Path) -> Result<Option<ElfHeader>> {
        let Some(lines) = Self::lines(path) else {
            return Ok(None);
        };
        let mut parts = lines[0].split_whitespace();
        let class64 = parts.next() == Some("ELF64");
        let kind = match parts.next() {
            Some("EXEC") => ElfKind::Executable,
            Some("DYN") => ElfKind::SharedObject,
            other => ElfKind::Other(other.unwrap_or_default().to_string()),
        };
        Ok(Some(ElfHeader { class64, kind }))
    }

    fn imported_libraries(&self, path: &Path) -> Result<Vec<String>> {
        Ok(Self::lines(path)
            .unwrap_or_default()
            .iter()
            .filter_map(|l| l.strip_prefix("NEEDED "))
            .map(str::to_string)
            .collect())
    }
}

/// Names and bodies of the entries of an uncompressed tar stream.
pub fn tar_entries(data: &[u8]) -> Vec<(String, Vec<u8>)> {
    use std::io::Read;

    let mut archive = tar::Archive::new(data);
    archive
        .entries()
        .expect("Failed to read tar")
        .map(|e| {
            let mut e = e.expect("Failed to read tar entry");
            let name = e.path().expect("entry path").to_string_lossy().into_owned();
            let mut body = Vec::new();
            e.read_to_end(&mut body).expect("Failed to read entry body");
            (name, body)
        })
        .collect()
}
