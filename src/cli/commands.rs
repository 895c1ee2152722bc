use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::debug;

use crate::config;
use crate::logging::{init_logging, LogConfig};
use crate::packages::PackageBinder;
use crate::runtime_config::RuntimeConfig;

/// Command-line interface for nsrouter
#[derive(Parser)]
#[command(name = "nsrouter")]
#[command(about = "Inspect namespace sites: configuration trees and packages", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Debug-level logging
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print a configuration directory as one JSON tree
    Conf {
        /// Directory of yaml/yml/json/toml files; without it the
        /// process-wide tree at NSR_CONFIG_PATH is printed
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Dotted branch to print instead of the whole tree
        #[arg(short, long)]
        get: Option<String>,
    },
    /// List package roots beneath a directory
    Packages {
        /// Site directory to scan
        #[arg(short, long)]
        root: PathBuf,

        /// Marker file name (defaults to NSR_PACKAGE_MARKER or package.yaml)
        #[arg(short, long)]
        marker: Option<String>,
    },
}

/// Parse arguments, set up logging and run the selected command.
pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    let runtime = RuntimeConfig::from_env();
    let log_config = LogConfig::from_env().verbose(cli.verbose || runtime.verbose);
    init_logging(&log_config)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    execute(&cli, &runtime, &mut out)
}

/// Run `cli` and write its JSON output to `out`.
pub fn execute(cli: &Cli, runtime: &RuntimeConfig, out: &mut impl Write) -> Result<()> {
    let value = match &cli.command {
        Commands::Conf { dir, get } => {
            let tree = match dir {
                Some(dir) => config::load_directory(dir)
                    .with_context(|| format!("Failed to load configuration from {}", dir.display()))?,
                None => {
                    let dir = runtime
                        .config_path
                        .as_ref()
                        .context("No configuration directory: pass --dir or set NSR_CONFIG_PATH")?;
                    config::init_global(dir)
                        .with_context(|| format!("Failed to load configuration from {}", dir.display()))?
                        .clone()
                }
            };
            match get {
                Some(branch) => config::lookup(&tree, branch)?.clone(),
                None => tree,
            }
        }
        Commands::Packages { root, marker } => {
            let binder = match marker {
                Some(m) => PackageBinder::with_marker(m),
                None => PackageBinder::from_runtime(runtime),
            };
            debug!(root = %root.display(), marker = binder.marker(), "Scanning for packages");
            let packages = binder
                .inspect(root)
                .with_context(|| format!("Failed to scan {}", root.display()))?;
            serde_json::to_value(packages)?
        }
    };
    write_json(out, &value)
}

fn write_json(out: &mut impl Write, value: &Value) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}
