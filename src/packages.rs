//! # Packages
//!
//! A *site* is a container whose directory holds independently developed
//! packages. A directory is a package root when it directly contains the
//! package marker file (`package.yaml` unless configured otherwise) and no
//! enclosing directory beneath the site has been claimed already; nested
//! markers inside a package are ignored.
//!
//! Binding a package wires, exactly once:
//!
//! - its configuration tree, loaded from `<package dir>/<conf>`
//! - its endpoint struct container `<package>.<struct>`, when declared
//! - a resource root `<package>.<resources>`, bound at the struct container
//! - its introspection key (`urls.root` from the configuration, else the
//!   package's relative path) and its mount URL
//!
//! The marker file may override the default sub-path names:
//!
//! ```yaml
//! struct: api
//! conf: settings
//! ```
//!
//! ## Site walk
//!
//! [`Site::walk`] aggregates the endpoint trees of every package into
//! `{"packages": {key: tree}}`, leaving out packages whose permission
//! predicates the requester does not satisfy.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::binding::{BindingKind, BindingRecord, ResourceBinding};
use crate::config;
use crate::dispatcher::{describe_tree, Dispatcher};
use crate::error::{Error, Result};
use crate::path::NamespacePath;
use crate::permissions::{check_all, Requester};
use crate::registry::Registry;
use crate::runtime_config::RuntimeConfig;

/// Marker file naming a package root.
pub const DEFAULT_MARKER: &str = "package.yaml";

pub const DEFAULT_STRUCT: &str = "endpoints";
pub const DEFAULT_RESOURCES: &str = "resources";
pub const DEFAULT_CONF: &str = "conf";
pub const DEFAULT_PRIVATE: &str = "private";
pub const DEFAULT_TEMPLATES: &str = "templates";

/// Sub-path overrides of one package. Unset entries use the defaults above.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PackageLink {
    /// Endpoint container, relative to the package (`api` or `api/v1`)
    #[serde(rename = "struct")]
    pub struct_path: Option<String>,
    pub resources: Option<String>,
    /// Directories, relative to the package directory
    pub conf: Option<String>,
    pub private: Option<String>,
    pub templates: Option<String>,
}

/// Resolved sub-paths of a bound package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageLayout {
    pub struct_ns: NamespacePath,
    pub resources_ns: NamespacePath,
    pub conf_dir: PathBuf,
    pub private_dir: PathBuf,
    pub templates_dir: PathBuf,
}

impl PackageLayout {
    fn resolve(package: &NamespacePath, directory: &Path, link: &PackageLink) -> Result<Self> {
        let sub = |value: &Option<String>, default: &str| value.clone().unwrap_or_else(|| default.to_string());
        Ok(Self {
            struct_ns: package.join(&sub(&link.struct_path, DEFAULT_STRUCT))?,
            resources_ns: package.join(&sub(&link.resources, DEFAULT_RESOURCES))?,
            conf_dir: directory.join(sub(&link.conf, DEFAULT_CONF)),
            private_dir: directory.join(sub(&link.private, DEFAULT_PRIVATE)),
            templates_dir: directory.join(sub(&link.templates, DEFAULT_TEMPLATES)),
        })
    }
}

/// Package binding record. `bound` flips to true once, on first wiring.
#[derive(Debug, Clone, Default)]
pub struct PackageBinding {
    pub bound: bool,
    pub link: PackageLink,
    pub directory: Option<PathBuf>,
    pub layout: Option<PackageLayout>,
    pub conf: Option<Arc<Value>>,
    /// Introspection key and endpoint container
    pub struct_entry: Option<(String, NamespacePath)>,
    pub url: Option<String>,
}

impl PackageBinding {
    #[must_use]
    pub fn new(link: PackageLink) -> Self {
        Self {
            link,
            ..Self::default()
        }
    }
}

/// Discovered packages of one site.
#[derive(Debug, Clone)]
pub struct Site {
    pub path: NamespacePath,
    pub url: String,
    pub packages: Vec<NamespacePath>,
}

impl Site {
    /// Endpoint trees of every package visible to `requester`.
    pub fn walk(&self, registry: &Registry, requester: &Requester, reduce: bool) -> Result<Value> {
        let mut packages = Map::new();
        for package in &self.packages {
            if !check_all(&registry.package_permissions(package), requester) {
                debug!(package = %package, "Package hidden from requester");
                continue;
            }
            let Some((key, struct_ns)) = registry.package(package).and_then(|p| p.struct_entry) else {
                continue;
            };
            packages.insert(key, describe_tree(registry, &struct_ns, reduce)?);
        }
        Ok(json!({ "packages": packages }))
    }
}

/// One package root found by [`PackageBinder::inspect`].
#[derive(Debug, Clone, Serialize)]
pub struct PackageSummary {
    pub directory: PathBuf,
    /// Directory relative to the scanned root, slash-separated
    pub relative: String,
    pub key: String,
    /// Mount URL relative to the site URL
    pub url: String,
    pub link: PackageLink,
}

/// Discovers and binds the packages of a site.
#[derive(Debug, Clone)]
pub struct PackageBinder {
    marker: String,
}

impl Default for PackageBinder {
    fn default() -> Self {
        Self {
            marker: DEFAULT_MARKER.to_string(),
        }
    }
}

impl PackageBinder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_marker(marker: &str) -> Self {
        Self {
            marker: marker.to_string(),
        }
    }

    #[must_use]
    pub fn from_runtime(cfg: &RuntimeConfig) -> Self {
        Self::with_marker(&cfg.package_marker)
    }

    #[must_use]
    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Package root directories beneath `dir`, outermost claim first, in
    /// file-name order. `dir` itself counts when it carries the marker.
    pub fn scan(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut roots = Vec::new();
        let mut it = WalkDir::new(dir).sort_by_file_name().into_iter();
        while let Some(entry) = it.next() {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(dir).to_path_buf();
                Error::io(path, std::io::Error::other(e.to_string()))
            })?;
            if !entry.file_type().is_dir() {
                continue;
            }
            if entry.path().join(&self.marker).is_file() {
                debug!(dir = %entry.path().display(), "Package root found");
                roots.push(entry.path().to_path_buf());
                it.skip_current_dir();
            }
        }
        Ok(roots)
    }

    /// Find and bind every package under the site container `site`.
    pub fn discover(&self, registry: &Registry, site: &str, url: &str) -> Result<Site> {
        let site_path = NamespacePath::parse(site)?;
        let container = registry.load_container(&site_path)?;
        let site_dir = container
            .location()
            .cloned()
            .ok_or_else(|| Error::MissingLocation {
                path: site_path.to_string(),
            })?;
        let url = url.trim_matches('/').to_string();

        let mut packages = Vec::new();
        for dir in self.scan(&site_dir)? {
            let rel = dir.strip_prefix(&site_dir).unwrap_or(Path::new(""));
            let segments: Vec<String> = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            let package = if segments.is_empty() {
                site_path.clone()
            } else {
                site_path.concat(&NamespacePath::from_segments(&segments)?)
            };
            let link = self.read_marker(&dir)?;
            registry.link(&package.to_string(), link)?;
            bind_package(registry, &package, &dir, &segments, &url)?;
            packages.push(package);
        }
        info!(site = %site_path, packages = packages.len(), "Site discovered");
        Ok(Site {
            path: site_path,
            url,
            packages,
        })
    }

    /// Discover the site, mount every package struct and the site walk on
    /// `dispatcher`.
    pub fn bind(&self, dispatcher: &mut Dispatcher, site: &str, url: &str) -> Result<Site> {
        let registry = Arc::clone(dispatcher.registry());
        let site = self.discover(&registry, site, url)?;
        for package in &site.packages {
            let Some(binding) = registry.package(package) else { continue };
            if let (Some((_, struct_ns)), Some(mount_url)) = (binding.struct_entry, binding.url) {
                dispatcher.mount(&mount_url, &struct_ns.to_string())?;
            }
        }
        dispatcher.mount_site(&site.url, site.clone());
        Ok(site)
    }

    /// Describe the package roots under a plain directory without binding
    /// anything.
    pub fn inspect(&self, root: &Path) -> Result<Vec<PackageSummary>> {
        let fallback = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut out = Vec::new();
        for dir in self.scan(root)? {
            let rel: Vec<String> = dir
                .strip_prefix(root)
                .unwrap_or(Path::new(""))
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            let link = self.read_marker(&dir)?;
            let conf_dir = dir.join(link.conf.as_deref().unwrap_or(DEFAULT_CONF));
            let conf = if conf_dir.is_dir() {
                config::load_directory(&conf_dir)?
            } else {
                Value::Object(Map::new())
            };
            out.push(PackageSummary {
                key: entry_key(&conf, &rel, &fallback),
                url: mount_url("", &conf, &rel),
                relative: rel.join("/"),
                directory: dir,
                link,
            });
        }
        Ok(out)
    }

    /// Sub-path overrides from the marker file in `dir`; an empty marker
    /// means all defaults.
    pub fn read_marker(&self, dir: &Path) -> Result<PackageLink> {
        let path = dir.join(&self.marker);
        let value = if config::SUPPORTED_EXTENSIONS
            .iter()
            .any(|ext| path.extension().is_some_and(|e| e == *ext))
        {
            config::load_file(&path)?
        } else {
            Value::Null
        };
        if value.is_null() {
            return Ok(PackageLink::default());
        }
        serde_json::from_value(value).map_err(|e| Error::UnsupportedOrMalformedConfig {
            path,
            reason: e.to_string(),
        })
    }
}

fn bind_package(
    registry: &Registry,
    package: &NamespacePath,
    dir: &Path,
    rel: &[String],
    site_url: &str,
) -> Result<()> {
    let Some(current) = registry.package(package) else {
        return Ok(());
    };
    if current.bound {
        debug!(package = %package, "Package already bound");
        return Ok(());
    }
    let layout = PackageLayout::resolve(package, dir, &current.link)?;

    let conf = if layout.conf_dir.is_dir() {
        config::load_directory(&layout.conf_dir)?
    } else {
        warn!(package = %package, dir = %layout.conf_dir.display(), "Package has no configuration directory");
        Value::Object(Map::new())
    };

    let struct_ns = match registry.load_container(&layout.struct_ns) {
        Ok(_) => Some(layout.struct_ns.clone()),
        Err(Error::NodeNotFound { .. }) => {
            debug!(package = %package, "Package contributes no endpoints");
            None
        }
        Err(e) => return Err(e),
    };

    let mut struct_entry = None;
    let mut url = None;
    if let Some(struct_ns) = struct_ns {
        match registry.load_container(&layout.resources_ns) {
            Ok(_) => registry.bindings().insert(
                struct_ns.clone(),
                BindingRecord::Resource(ResourceBinding {
                    root: layout.resources_ns.clone(),
                }),
            ),
            Err(Error::NodeNotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        let key = entry_key(&conf, rel, package.name());
        url = Some(mount_url(site_url, &conf, rel));
        struct_entry = Some((key, struct_ns));
    }

    info!(
        package = %package,
        endpoints = struct_entry.as_ref().map(|(k, _)| k.as_str()).unwrap_or("-"),
        url = url.as_deref().unwrap_or("-"),
        "Package bound"
    );
    let conf = Arc::new(conf);
    registry.bindings().upsert(
        package,
        BindingKind::Package,
        || BindingRecord::Package(PackageBinding::default()),
        |record| {
            if let BindingRecord::Package(p) = record {
                p.bound = true;
                p.directory = Some(dir.to_path_buf());
                p.layout = Some(layout);
                p.conf = Some(conf);
                p.struct_entry = struct_entry;
                p.url = url;
            }
        },
    );
    Ok(())
}

/// Introspection key: `urls.root`, else the dotted relative directory.
fn entry_key(conf: &Value, rel: &[String], fallback: &str) -> String {
    conf_str(conf, "urls.root").unwrap_or_else(|| {
        if rel.is_empty() {
            fallback.to_string()
        } else {
            rel.join(".")
        }
    })
}

/// `<site url>/<urls.root or relative dir>[/<urls.struct>]`
fn mount_url(site_url: &str, conf: &Value, rel: &[String]) -> String {
    let mut parts = vec![
        site_url.to_string(),
        conf_str(conf, "urls.root").unwrap_or_else(|| rel.join("/")),
    ];
    if let Some(sub) = conf_str(conf, "urls.struct") {
        parts.push(sub);
    }
    parts.retain(|p| !p.is_empty());
    parts.join("/")
}

fn conf_str(conf: &Value, branch: &str) -> Option<String> {
    config::lookup(conf, branch)
        .ok()
        .and_then(Value::as_str)
        .map(|s| s.trim_matches('/').to_string())
}
