//! Configuration management for kbundle.
//!
//! Reads configuration from a .env file and environment variables.
//! Environment variables take precedence over the .env file.

use std::collections::HashMap;
use std::path::PathBuf;

/// Default host library folders searched by `fetch-libs`.
pub const DEFAULT_LIB_DIRS: &str = "/lib:/lib64:/usr/lib";

/// Default number of `fetch-libs` workers.
pub const DEFAULT_FETCH_JOBS: usize = 4;

/// Default log level when neither `RUST_LOG` nor `--verbose` is given.
pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// kbundle configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// readelf program, a name on PATH or a path (KBUNDLE_READELF).
    pub readelf: String,
    /// Host library folders for `fetch-libs` (KBUNDLE_LIB_DIRS).
    pub lib_dirs: Vec<PathBuf>,
    /// Worker pool size for `fetch-libs` (KBUNDLE_FETCH_JOBS).
    pub fetch_jobs: usize,
    /// Default log filter (KBUNDLE_LOG).
    pub log_level: String,
    /// Problems found while loading. Logged by the caller once logging is up.
    pub warnings: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_vars(std::iter::empty::<(String, String)>())
    }
}

impl Config {
    /// Load configuration from .env (if present) and the process environment.
    pub fn load() -> Self {
        dotenvy::dotenv().ok();
        Self::from_vars(std::env::vars())
    }

    /// Build a configuration from key/value pairs. Later pairs win.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let env_vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        let readelf = env_vars
            .get("KBUNDLE_READELF")
            .filter(|s| !s.is_empty())
            .cloned()
            .unwrap_or_else(|| "readelf".to_string());

        let lib_dirs = env_vars
            .get("KBUNDLE_LIB_DIRS")
            .map(String::as_str)
            .unwrap_or(DEFAULT_LIB_DIRS)
            .split(':')
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .collect();

        let mut warnings = Vec::new();

        let fetch_jobs = match env_vars.get("KBUNDLE_FETCH_JOBS") {
            None => DEFAULT_FETCH_JOBS,
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(n) => n.max(1),
                Err(_) => {
                    warnings.push(format!(
                        "Invalid KBUNDLE_FETCH_JOBS {raw:?}, using default {DEFAULT_FETCH_JOBS}"
                    ));
                    DEFAULT_FETCH_JOBS
                }
            },
        };

        let log_level = env_vars
            .get("KBUNDLE_LOG")
            .filter(|s| !s.is_empty())
            .cloned()
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        Self {
            readelf,
            lib_dirs,
            fetch_jobs,
            log_level,
            warnings,
        }
    }
}
