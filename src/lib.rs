//! kbundle library.
//!
//! Everything the `kbundle` binary does is exposed here for integration
//! testing:
//!
//! - [`calver`] - bundle versions and best-match selection
//! - [`tags`] - file tags and the two selection predicates
//! - [`bundle`] - the container format, filtered streaming and unpacking
//! - [`resolver`] - tag propagation along shared-library imports
//! - [`fetch`] - copying imported shared objects from the host
//! - [`commands`] - CLI command handlers

pub mod bundle;
pub mod calver;
pub mod commands;
pub mod config;
pub mod elf;
pub mod fetch;
pub mod filelist;
pub mod process;
pub mod resolver;
pub mod tags;
pub mod timing;
