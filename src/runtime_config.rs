//! # Runtime Configuration
//!
//! Process settings read from the environment at startup.
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `NSR_CONFIG_PATH` | directory of the process-wide configuration tree | unset (no global tree) |
//! | `NSR_PACKAGE_MARKER` | file name marking a package root | `package.yaml` |
//! | `NSR_VERBOSE` | `1`/`true`/`yes` forces debug logging | off |
//!
//! ```rust
//! use nsrouter::runtime_config::RuntimeConfig;
//!
//! let cfg = RuntimeConfig::from_env();
//! assert!(!cfg.package_marker.is_empty());
//! ```

use std::env;
use std::path::PathBuf;

use crate::packages::DEFAULT_MARKER;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub config_path: Option<PathBuf>,
    pub package_marker: String,
    pub verbose: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            config_path: None,
            package_marker: DEFAULT_MARKER.to_string(),
            verbose: false,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let config_path = get("NSR_CONFIG_PATH")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);
        let package_marker = get("NSR_PACKAGE_MARKER")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_MARKER.to_string());
        let verbose = get("NSR_VERBOSE").is_some_and(|v| is_truthy(&v));
        RuntimeConfig {
            config_path,
            package_marker,
            verbose,
        }
    }
}

pub(crate) fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
