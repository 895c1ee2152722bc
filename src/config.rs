//! # Configuration trees
//!
//! A configuration directory is a flat collection of structured files. Each
//! file parses into one tree and is keyed by its stem, so `site.yaml` holding
//! `greet: {message: Hello!}` is read back with:
//!
//! ```rust,no_run
//! # fn main() -> nsrouter::Result<()> {
//! let tree = nsrouter::config::load_directory("conf".as_ref())?;
//! let msg = nsrouter::config::lookup(&tree, "site.greet.message")?;
//! assert_eq!(msg, "Hello!");
//! # Ok(())
//! # }
//! ```
//!
//! Recognised extensions: `yaml`, `yml`, `json`, `toml`. Other files are
//! ignored; subdirectories are not traversed.
//!
//! Two kinds of tree exist: one process-wide default tree, loaded once with
//! [`init_global`], and one tree per package, loaded when the package is
//! bound (see [`crate::packages`]).

use std::fs;
use std::path::Path;

use once_cell::sync::OnceCell;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["yaml", "yml", "json", "toml"];

static GLOBAL: OnceCell<Value> = OnceCell::new();

fn extension_of(path: &Path) -> Option<&str> {
    let ext = path.extension()?.to_str()?;
    SUPPORTED_EXTENSIONS.contains(&ext).then_some(ext)
}

/// Parse one configuration file into a tree.
pub fn load_file(path: &Path) -> Result<Value> {
    let ext = extension_of(path).ok_or_else(|| Error::UnsupportedOrMalformedConfig {
        path: path.to_path_buf(),
        reason: format!("supported extensions: {}", SUPPORTED_EXTENSIONS.join(", ")),
    })?;
    let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    if content.trim().is_empty() {
        return Ok(Value::Null);
    }
    let malformed = |reason: String| Error::UnsupportedOrMalformedConfig {
        path: path.to_path_buf(),
        reason,
    };
    match ext {
        "yaml" | "yml" => serde_yaml::from_str(&content).map_err(|e| malformed(e.to_string())),
        "json" => serde_json::from_str(&content).map_err(|e| malformed(e.to_string())),
        _ => toml::from_str(&content).map_err(|e| malformed(e.to_string())),
    }
}

/// Load every recognised file directly inside `dir`, keyed by file stem.
pub fn load_directory(dir: &Path) -> Result<Value> {
    let entries = fs::read_dir(dir).map_err(|e| Error::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        let path = entry.path();
        if path.is_file() && extension_of(&path).is_some() {
            files.push(path);
        }
    }
    files.sort();

    let mut tree = Map::new();
    for path in files {
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if tree.contains_key(stem) {
            warn!(file = %path.display(), key = stem, "Configuration key defined by several files, keeping the first");
            continue;
        }
        debug!(file = %path.display(), key = stem, "Loading configuration file");
        let value = load_file(&path)?;
        tree.insert(stem.to_string(), value);
    }
    info!(dir = %dir.display(), files = tree.len(), "Configuration directory loaded");
    Ok(Value::Object(tree))
}

/// Descend `tree` along a dotted `branch`. Array elements are addressed by
/// index (`servers.0.host`).
pub fn lookup<'a>(tree: &'a Value, branch: &str) -> Result<&'a Value> {
    let mut node = tree;
    for segment in branch.split('.') {
        let next = match node {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        node = next.ok_or_else(|| Error::PathNotFound {
            path: branch.to_string(),
            segment: segment.to_string(),
        })?;
    }
    Ok(node)
}

/// Load the process-wide default tree from `dir`. Later calls keep the first
/// tree.
pub fn init_global(dir: &Path) -> Result<&'static Value> {
    if let Some(existing) = GLOBAL.get() {
        warn!(dir = %dir.display(), "Global configuration already loaded");
        return Ok(existing);
    }
    let tree = load_directory(dir)?;
    Ok(GLOBAL.get_or_init(|| tree))
}

/// The process-wide default tree, if loaded.
#[must_use]
pub fn global() -> Option<&'static Value> {
    GLOBAL.get()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_lookup_descends_objects_and_arrays() {
        let tree = json!({ "site": { "servers": [{ "host": "a" }, { "host": "b" }] } });
        assert_eq!(lookup(&tree, "site.servers.1.host").unwrap(), "b");
        assert!(matches!(
            lookup(&tree, "site.servers.9"),
            Err(Error::PathNotFound { .. })
        ));
        assert!(matches!(
            lookup(&tree, "site.servers.0.host.deeper"),
            Err(Error::PathNotFound { .. })
        ));
    }

    #[test]
    fn test_directory_is_flat_and_filtered() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("site.yaml"), "greet:\n  message: Hello!\n").unwrap();
        fs::write(dir.path().join("db.json"), r#"{"port": 5432}"#).unwrap();
        fs::write(dir.path().join("limits.toml"), "rate = 10\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("deep.yaml"), "x: 1\n").unwrap();

        let tree = load_directory(dir.path()).unwrap();
        let keys: Vec<&String> = tree.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["db", "limits", "site"]);
        assert_eq!(lookup(&tree, "db.port").unwrap(), 5432);
        assert_eq!(lookup(&tree, "limits.rate").unwrap(), 10);
    }

    #[test]
    fn test_malformed_file_fails() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("bad.json"), "{ not json").unwrap();
        let err = load_directory(dir.path()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedOrMalformedConfig { .. }));
    }

    #[test]
    fn test_empty_file_is_null() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("empty.yaml"), "").unwrap();
        let tree = load_directory(dir.path()).unwrap();
        assert_eq!(tree, json!({ "empty": null }));
    }
}
