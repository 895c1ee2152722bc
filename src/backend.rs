//! Generic interfaces with swappable backends.
//!
//! A generic interface is a container tree whose leaves forward to a concrete
//! driver. `bind` records, at the interface root, which backend container and
//! which driver subtree answer calls from beneath it; `resolve` maps a caller
//! leaf onto the leaf of the same relative path inside the driver:
//!
//! ```text
//! binding at gen.db:  backend = db, driver = dba
//! caller:             gen.db.connector.insert
//! backend leaf:       db.dba.connector.insert
//! ```
//!
//! There is no fallback: a driver must provide every function the interface
//! calls into.

use std::sync::Arc;

use tracing::{debug, info};

use crate::binding::{BackendBinding, BindingKind, BindingRecord};
use crate::error::{Error, Result};
use crate::namespace::Leaf;
use crate::path::{NamespacePath, ToNamespacePath};
use crate::registry::Registry;

pub struct BackendRegistry<'a> {
    registry: &'a Registry,
}

impl<'a> BackendRegistry<'a> {
    pub(crate) fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    /// Register `driver` of `backend` for calls from beneath `at`.
    ///
    /// A single-segment `backend` name is qualified with the nearest package
    /// enclosing `at`, so unrelated packages may each ship e.g. a `db` backend.
    pub fn bind(&self, backend: &str, at: &str, driver: &str) -> Result<()> {
        let at_path = NamespacePath::parse(at)?;
        let mut backend_path = NamespacePath::parse(backend)?;
        if backend_path.len() == 1 {
            if let Some(package) = self.registry.enclosing_packages(&at_path, false).first() {
                backend_path = package.concat(&backend_path);
            }
        }
        self.store(at_path, backend_path, driver)
    }

    /// Register without package qualification.
    pub fn bind_absolute(&self, backend: &str, at: &str, driver: &str) -> Result<()> {
        self.store(NamespacePath::parse(at)?, NamespacePath::parse(backend)?, driver)
    }

    fn store(&self, at: NamespacePath, backend: NamespacePath, driver: &str) -> Result<()> {
        // the driver becomes a path segment
        NamespacePath::parse(driver)?;
        info!(at = %at, backend = %backend, driver, "Backend bound");
        self.registry.bindings().insert(
            at,
            BindingRecord::Backend(BackendBinding {
                backend,
                driver: driver.to_string(),
            }),
        );
        Ok(())
    }

    /// Backend leaf answering for `caller`.
    pub fn resolve<P: ToNamespacePath + ?Sized>(&self, caller: &P) -> Result<Arc<Leaf>> {
        let caller = caller.to_namespace_path()?;
        let resolved = self.registry.resolve_binding(&caller, BindingKind::Backend)?;
        let BindingRecord::Backend(binding) = resolved.record else {
            return Err(Error::BindingNotFound {
                path: caller.to_string(),
                kind: BindingKind::Backend,
            });
        };
        let below = caller.suffix_below(&resolved.at).unwrap_or_default();
        let target = NamespacePath::from_segments(
            binding
                .backend
                .segments()
                .iter()
                .map(String::as_str)
                .chain(std::iter::once(binding.driver.as_str()))
                .chain(below.iter().map(String::as_str)),
        )?;
        debug!(caller = %caller, backend = %target, "Backend resolved");
        self.registry.load_leaf(&target)
    }
}

impl Registry {
    /// Shorthand for [`BackendRegistry::bind`].
    pub fn bind_backend(&self, backend: &str, at: &str, driver: &str) -> Result<()> {
        self.backends().bind(backend, at, driver)
    }

    /// Shorthand for [`BackendRegistry::bind_absolute`].
    pub fn bind_backend_absolute(&self, backend: &str, at: &str, driver: &str) -> Result<()> {
        self.backends().bind_absolute(backend, at, driver)
    }
}
