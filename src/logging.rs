//! Structured logging setup.
//!
//! Every component logs through `tracing`; this module installs the
//! subscriber. Output goes to stderr so that command output on stdout stays
//! machine-readable.
//!
//! | Variable | Values | Default |
//! |---|---|---|
//! | `NSR_LOG_LEVEL` | trace/debug/info/warn/error | `info` |
//! | `NSR_LOG_FORMAT` | json/pretty | `json` |
//! | `NSR_LOG_FILTER` | comma-separated directives (`nsrouter::binding=trace`) | none |
//! | `NSR_LOG_LOCATION` | include file:line | `false` |
//!
//! `RUST_LOG`, when set, replaces the level-derived filter. `NSR_VERBOSE`
//! forces the `debug` level.

use std::env;

use anyhow::{Context, Result};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::runtime_config::is_truthy;

/// Log format: JSON for machines, pretty-print for people
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub log_level: String,
    pub format: LogFormat,
    /// Extra filter directives (comma-separated)
    pub target_filter: Option<String>,
    pub include_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            format: LogFormat::Json,
            target_filter: None,
            include_location: false,
        }
    }
}

impl LogConfig {
    /// Parse configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        let verbose = env::var("NSR_VERBOSE").is_ok_and(|v| is_truthy(&v));
        let log_level = if verbose {
            "debug".to_string()
        } else {
            env::var("NSR_LOG_LEVEL").unwrap_or_else(|_| "info".to_string())
        };
        Self {
            log_level,
            format: LogFormat::parse(&env::var("NSR_LOG_FORMAT").unwrap_or_else(|_| "json".to_string())),
            target_filter: env::var("NSR_LOG_FILTER").ok().filter(|f| !f.trim().is_empty()),
            include_location: env::var("NSR_LOG_LOCATION").is_ok_and(|v| is_truthy(&v)),
        }
    }

    /// Development preset: debug level, pretty output with locations.
    #[must_use]
    pub fn default_dev() -> Self {
        Self {
            log_level: "debug".to_string(),
            format: LogFormat::Pretty,
            target_filter: None,
            include_location: true,
        }
    }

    #[must_use]
    pub fn verbose(mut self, on: bool) -> Self {
        if on {
            self.log_level = "debug".to_string();
        }
        self
    }

    fn level(&self) -> Level {
        match self.log_level.trim().to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }

    fn env_filter(&self) -> EnvFilter {
        let mut filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level().as_str()));
        if let Some(targets) = &self.target_filter {
            for directive in targets.split(',').map(str::trim).filter(|d| !d.is_empty()) {
                match directive.parse() {
                    Ok(d) => filter = filter.add_directive(d),
                    Err(_) => eprintln!("Warning: Invalid log filter directive: {directive}"),
                }
            }
        }
        filter
    }
}

/// Install the global subscriber. Fails when one is already installed.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let fmt_layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_writer(std::io::stderr)
            .boxed(),
    };
    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(fmt_layer)
        .try_init()
        .context("Failed to initialize logging")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parse() {
        assert_eq!(LogFormat::parse("Pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("anything"), LogFormat::Json);
    }

    #[test]
    fn test_level_parse_and_verbose() {
        let cfg = LogConfig {
            log_level: "WARN".to_string(),
            ..LogConfig::default()
        };
        assert_eq!(cfg.level(), Level::WARN);
        assert_eq!(cfg.verbose(true).level(), Level::DEBUG);
        let bogus = LogConfig {
            log_level: "loud".to_string(),
            ..LogConfig::default()
        };
        assert_eq!(bogus.level(), Level::INFO);
    }
}
