//! # CLI Module
//!
//! Command-line helpers for inspecting a site before wiring it into a
//! dispatcher.
//!
//! ## Commands
//!
//! ### `conf`
//!
//! Load a configuration directory and print it, or one value from it, as JSON:
//!
//! ```bash
//! nsrouter conf --dir site/conf
//! nsrouter conf --dir site/conf --get site.greet.message
//! NSR_CONFIG_PATH=site/conf nsrouter conf --get site.greet
//! ```
//!
//! ### `packages`
//!
//! List the package roots beneath a directory with their keys, URLs and
//! layout overrides:
//!
//! ```bash
//! nsrouter packages --root site
//! nsrouter packages --root site --marker pkg.toml
//! ```
//!
//! `--verbose` (or `NSR_VERBOSE=1`) switches logging to the debug level. Logs
//! are written to stderr, command output to stdout.

mod commands;

#[cfg(test)]
mod tests;

pub use commands::{execute, run_cli, Cli, Commands};
