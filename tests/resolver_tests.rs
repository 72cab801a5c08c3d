//! Dependency tag resolution over real directories, using the text-based
//! fake ELF inspector instead of readelf.

mod helpers;

use helpers::{create_mock_binary, create_mock_elf, create_mock_library, FakeElf, TestEnv};
use kbundle::commands::{self, generate_config::generate_file_list};
use kbundle::filelist::FileList;
use kbundle::resolver::{DependencyGraph, FileKind, ResolveError, TagFlag};
use std::fs;

fn flags(raw: &[&str]) -> Vec<TagFlag> {
    raw.iter().map(|f| f.parse().unwrap()).collect()
}

fn tags_for(list: &FileList, name: &str) -> Vec<String> {
    list.files
        .iter()
        .find(|f| f.path.file_name().is_some_and(|n| n == name))
        .unwrap_or_else(|| panic!("{name} missing from file list"))
        .tags
        .iter()
        .map(ToString::to_string)
        .collect()
}

/// A small payload tree:
///
/// ```text
/// vinitd   → libc.so.6
/// strace   → libdw.so.1 → libz.so.1, libc.so.6
/// chronyd  → libz.so.1, libc.so.6
/// libnss_dns.so.2 → libresolv.so.2
/// bzImage, README (not ELF)
/// ```
fn payload_env() -> TestEnv {
    let env = TestEnv::new();
    let p = &env.payload;
    create_mock_binary(&p.join("vinitd"), &["libc.so.6"]);
    create_mock_binary(&p.join("strace"), &["libdw.so.1"]);
    create_mock_binary(&p.join("chronyd"), &["libz.so.1", "/lib64/libc.so.6"]);
    create_mock_library(&p.join("libdw.so.1"), &["libz.so.1", "libc.so.6"]);
    create_mock_library(&p.join("libz.so.1"), &["libc.so.6"]);
    create_mock_library(&p.join("libc.so.6"), &[]);
    create_mock_library(&p.join("libnss_dns.so.2"), &["libresolv.so.2"]);
    create_mock_library(&p.join("libresolv.so.2"), &["libc.so.6"]);
    env.payload_file("bzImage", b"kernel");
    env.payload_file("README", b"docs");
    env
}

#[test]
fn test_scan_classifies_files() {
    let env = payload_env();
    create_mock_elf(&env.payload.join("module.ko"), "ELF64", "REL", &[]);
    fs::create_dir(env.payload.join("subdir")).unwrap();

    let graph = DependencyGraph::scan(&env.payload, &FakeElf).unwrap();

    assert_eq!(graph.get("strace").unwrap().kind, FileKind::Executable);
    assert_eq!(graph.get("libz.so.1").unwrap().kind, FileKind::SharedObject);
    assert_eq!(graph.get("bzImage").unwrap().kind, FileKind::Other);
    assert_eq!(graph.get("module.ko").unwrap().kind, FileKind::Other);
    assert!(!graph.contains("subdir"));
    // Import paths are reduced to base names.
    assert_eq!(graph.get("chronyd").unwrap().imports, ["libz.so.1", "libc.so.6"]);

    let names: Vec<&str> = graph.files().iter().map(|f| f.name.as_str()).collect();
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);
}

#[test]
fn test_generate_file_list_propagates_tags() {
    let env = payload_env();
    let list = generate_file_list(
        "3.3.0",
        &env.payload,
        &flags(&["strace,debug", "chronyd,ntp", "libnss_dns.so.2,logs,ntp"]),
        &FakeElf,
    )
    .unwrap();

    assert_eq!(list.compiler, "3.3.0");
    assert_eq!(tags_for(&list, "strace"), ["debug"]);
    assert_eq!(tags_for(&list, "libdw.so.1"), ["debug"]);
    // Reached with {ntp} from chronyd, then {debug} through libdw.so.1.
    assert!(tags_for(&list, "libz.so.1").is_empty());
    assert_eq!(tags_for(&list, "libresolv.so.2"), ["logs", "ntp"]);
    // libc.so.6 gave up during the strace traversal and stays on every
    // disk even though the libnss_dns.so.2 root reaches it afterwards.
    assert!(tags_for(&list, "libc.so.6").is_empty());
    assert!(tags_for(&list, "vinitd").is_empty());
    assert!(tags_for(&list, "bzImage").is_empty());
}

#[test]
fn test_generate_file_list_order() {
    let env = payload_env();
    let list = generate_file_list(
        "3.3.0",
        &env.payload,
        &flags(&["vinitd,compat", "bzImage,compat"]),
        &FakeElf,
    )
    .unwrap();

    let names: Vec<String> = list
        .files
        .iter()
        .map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        names,
        [
            "vinitd",
            "bzImage",
            "README",
            "chronyd",
            "libc.so.6",
            "libdw.so.1",
            "libnss_dns.so.2",
            "libresolv.so.2",
            "libz.so.1",
            "strace",
        ]
    );
    assert!(list.files.iter().all(|f| f.path.starts_with(&env.payload)));
}

#[test]
fn test_generate_config_output_is_loadable() {
    let env = payload_env();
    let mut out = Vec::new();
    commands::cmd_generate_config(
        "3.3.0",
        &env.payload,
        &flags(&["strace,debug,+compat"]),
        &FakeElf,
        &mut out,
    )
    .unwrap();

    let text = String::from_utf8(out).unwrap();
    assert!(!text.contains('~'));
    let list = FileList::parse(&text).unwrap();
    assert_eq!(tags_for(&list, "strace"), ["debug", "+compat"]);
    assert_eq!(tags_for(&list, "libc.so.6"), ["debug", "+compat"]);
}

#[test]
fn test_generate_config_unknown_file() {
    let env = payload_env();
    let err = generate_file_list("3.3.0", &env.payload, &flags(&["ghost,debug"]), &FakeElf)
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ResolveError>(),
        Some(ResolveError::UnknownFile { name }) if name == "ghost"
    ));
}

#[test]
fn test_generate_config_cycle_terminates() {
    let env = TestEnv::new();
    create_mock_binary(&env.payload.join("prog"), &["libA.so"]);
    create_mock_library(&env.payload.join("libA.so"), &["libB.so"]);
    create_mock_library(&env.payload.join("libB.so"), &["libA.so"]);

    let list = generate_file_list("1.0", &env.payload, &flags(&["prog,net"]), &FakeElf).unwrap();
    assert_eq!(tags_for(&list, "libA.so"), ["net"]);
    assert_eq!(tags_for(&list, "libB.so"), ["net"]);
}
