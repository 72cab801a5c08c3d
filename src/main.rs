//! kbundle - kernel bundle tool.
//!
//! Builds, inspects and filters kernel bundles: versioned gzip+tar archives
//! holding a kernel, its init system and their shared libraries, each tagged
//! with the deployment profiles that need it.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use kbundle::commands::{self, process::ProcessMode};
use kbundle::config::Config;
use kbundle::elf::Readelf;
use kbundle::resolver::TagFlag;

#[derive(Parser)]
#[command(name = "kbundle")]
#[command(about = "Kernel bundle builder")]
#[command(version)]
#[command(
    after_help = "QUICK START:\n  kbundle generate-config 3.3.0 out/ --tags strace,debug > bundle.toml\n  kbundle create 2023.1.2 bundle.toml -o kernel-2023.1.2\n  kbundle process kernel-2023.1.2 compat debug > kernel.tar"
)]
struct Cli {
    /// Log at debug level (overrides RUST_LOG and KBUNDLE_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a kernel bundle from a TOML file list
    Create {
        /// Bundle version (YEAR.MONTH[.PATCH][-MODIFIER])
        version: String,
        /// TOML file list
        config: PathBuf,
        /// Write the bundle here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print bundle metadata
    Inspect { bundle: PathBuf },

    /// Unpack a bundle into a directory and write its bundle.toml
    Extract { bundle: PathBuf, dest: PathBuf },

    /// Apply tags to a bundle and write the runtime kernel tar to stdout
    Process {
        bundle: PathBuf,
        #[arg(required = true)]
        tags: Vec<String>,
        /// List files that would be included instead of building an archive
        #[arg(long, conflicts_with = "size")]
        dry_run: bool,
        /// Print the estimated archive size in bytes
        #[arg(long)]
        size: bool,
    },

    /// Print the bundle that best matches VERSION
    Select {
        version: String,
        #[arg(required = true)]
        bundles: Vec<PathBuf>,
    },

    /// Scan DIR and print a file list with dependency-propagated tags
    GenerateConfig {
        /// Earliest compatible compiler
        compiler: String,
        dir: PathBuf,
        /// Apply tags to a file
        #[arg(long = "tags", value_name = "FILE,TAG[,TAG...]")]
        tags: Vec<TagFlag>,
    },

    /// Scan DIR for 64-bit ELF files and fetch all needed shared objects
    #[command(hide = true)]
    FetchLibs { dir: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load();
    init_logging(cli.verbose, &config.log_level);
    for warning in &config.warnings {
        warn!("{warning}");
    }

    let stdout = io::stdout().lock();

    match cli.command {
        Commands::Create {
            version,
            config: list,
            output,
        } => {
            commands::cmd_create(&version, &list, output.as_deref(), stdout)?;
        }

        Commands::Inspect { bundle } => {
            commands::cmd_inspect(&bundle, stdout)?;
        }

        Commands::Extract { bundle, dest } => {
            commands::cmd_extract(&bundle, &dest)?;
        }

        Commands::Process {
            bundle,
            tags,
            dry_run,
            size,
        } => {
            let mode = if dry_run {
                ProcessMode::DryRun
            } else if size {
                ProcessMode::Size
            } else {
                ProcessMode::Stream
            };
            commands::cmd_process(&bundle, &tags, mode, stdout)?;
        }

        Commands::Select { version, bundles } => {
            commands::cmd_select(&version, &bundles, stdout)?;
        }

        Commands::GenerateConfig {
            compiler,
            dir,
            tags,
        } => {
            let readelf = Readelf::new(&config.readelf)?;
            commands::cmd_generate_config(&compiler, &dir, &tags, &readelf, stdout)?;
        }

        Commands::FetchLibs { dir } => {
            let readelf = Readelf::new(&config.readelf)?;
            commands::cmd_fetch_libs(&dir, &config, Arc::new(readelf))?;
        }
    }

    Ok(())
}

/// Log to stderr; stdout carries archives and file lists.
fn init_logging(verbose: bool, default_level: &str) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}
