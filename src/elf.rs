//! ELF inspection.
//!
//! Uses `readelf` instead of parsing ELF in-process, the same way the
//! dependency tooling works on foreign-architecture trees: readelf reads the
//! headers without executing anything.

use crate::process::Cmd;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];

/// ELF object type (`e_type`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElfKind {
    /// `ET_EXEC`
    Executable,
    /// `ET_DYN`; this includes position-independent executables.
    SharedObject,
    /// Anything else, with readelf's description.
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElfHeader {
    pub class64: bool,
    pub kind: ElfKind,
}

/// Source of ELF facts about files on disk.
pub trait ElfInspector: Send + Sync {
    /// Header of `path`, or `None` if it is not an ELF file.
    fn header(&self, path: &Path) -> Result<Option<ElfHeader>>;

    /// `DT_NEEDED` entries of `path`. Empty for non-ELF files and static
    /// binaries.
    fn imported_libraries(&self, path: &Path) -> Result<Vec<String>>;
}

/// [`ElfInspector`] backed by binutils `readelf`.
#[derive(Debug, Clone)]
pub struct Readelf {
    program: PathBuf,
}

impl Readelf {
    /// Locate `program` (a name on PATH or a path).
    pub fn new(program: &str) -> Result<Self> {
        let program = which::which(program)
            .with_context(|| format!("'{program}' not found - is binutils installed?"))?;
        Ok(Self { program })
    }

    fn run(&self, flag: &str, path: &Path) -> Result<Option<String>> {
        let output = Cmd::new(&self.program)
            .arg("-W")
            .arg(flag)
            .arg_path(path)
            .allow_fail()
            .run()?;
        Ok(output.success().then_some(output.stdout))
    }
}

impl ElfInspector for Readelf {
    fn header(&self, path: &Path) -> Result<Option<ElfHeader>> {
        if !has_elf_magic(path)? {
            return Ok(None);
        }
        Ok(self.run("-h", path)?.and_then(|out| parse_header(&out)))
    }

    fn imported_libraries(&self, path: &Path) -> Result<Vec<String>> {
        if !has_elf_magic(path)? {
            return Ok(Vec::new());
        }
        Ok(self
            .run("-d", path)?
            .map(|out| parse_needed(&out))
            .unwrap_or_default())
    }
}

/// True if `path` starts with the ELF magic number.
pub fn has_elf_magic(path: &Path) -> Result<bool> {
    let mut file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut magic = [0u8; 4];
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(magic == ELF_MAGIC),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

/// Parse `readelf -h` output.
///
/// ```text
/// ELF Header:
///   Class:                             ELF64
///   Type:                              EXEC (Executable file)
/// ```
pub fn parse_header(output: &str) -> Option<ElfHeader> {
    let mut class64 = None;
    let mut kind = None;

    for line in output.lines() {
        let Some((key, value)) = line.trim().split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "Class" => class64 = Some(value == "ELF64"),
            "Type" => {
                let code = value.split_whitespace().next().unwrap_or_default();
                kind = Some(match code {
                    "EXEC" => ElfKind::Executable,
                    "DYN" => ElfKind::SharedObject,
                    _ => ElfKind::Other(value.to_string()),
                });
            }
            _ => {}
        }
    }

    Some(ElfHeader {
        class64: class64?,
        kind: kind?,
    })
}

/// Parse `readelf -d` output into `NEEDED` library names.
///
/// ```text
///  0x0000000000000001 (NEEDED)             Shared library: [libc.so.6]
/// ```
pub fn parse_needed(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| line.contains("(NEEDED)"))
        .filter_map(|line| {
            let start = line.find('[')?;
            let end = line[start..].find(']')? + start;
            Some(line[start + 1..end].to_string())
        })
        .collect()
}
