//! # Registry
//!
//! The [`Registry`] owns the declared [`Namespace`] and the binding side
//! table. It is built once at startup, wired by the package binder and the
//! registration entry points below, and then shared read-only (usually in an
//! `Arc`) by every request.
//!
//! Registration entry points:
//!
//! | Entry point | Binding |
//! |---|---|
//! | [`Registry::link`] | package layout overrides |
//! | [`BackendRegistry::bind`] | backend driver for a generic interface |
//! | [`ResourceLocator::bind`] | resource root |
//! | [`Registry::redirect`] | method-keyed redirect |
//! | [`Registry::requires`] | package permissions |

use std::sync::Arc;

use http::Method;
use serde_json::Value;
use tracing::{debug, info};

use crate::backend::BackendRegistry;
use crate::binding::{
    self, BindingKind, BindingRecord, BindingTable, PermissionBinding, RedirectBinding,
    ResolvedBinding,
};
use crate::config;
use crate::error::{Error, Result};
use crate::namespace::{Container, Leaf, Namespace, Node};
use crate::packages::{PackageBinding, PackageLink};
use crate::path::{NamespacePath, ToNamespacePath};
use crate::permissions::PermissionRef;
use crate::resources::ResourceLocator;

pub struct Registry {
    namespace: Namespace,
    bindings: BindingTable,
}

impl Registry {
    #[must_use]
    pub fn new(namespace: Namespace) -> Self {
        Self {
            namespace,
            bindings: BindingTable::new(),
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    #[must_use]
    pub fn bindings(&self) -> &BindingTable {
        &self.bindings
    }

    /// Load the node at `path` (cached after the first call).
    pub fn load<P: ToNamespacePath + ?Sized>(&self, path: &P) -> Result<Node> {
        let path = path.to_namespace_path()?;
        self.namespace.load(self, &path)
    }

    pub fn load_container<P: ToNamespacePath + ?Sized>(&self, path: &P) -> Result<Arc<Container>> {
        match self.load(path)? {
            Node::Container(c) => Ok(c),
            Node::Leaf(l) => Err(Error::NotAContainer {
                path: l.path().to_string(),
            }),
        }
    }

    pub fn load_leaf<P: ToNamespacePath + ?Sized>(&self, path: &P) -> Result<Arc<Leaf>> {
        match self.load(path)? {
            Node::Leaf(l) => Ok(l),
            Node::Container(c) => Err(Error::node_not_found(c.path().to_string())),
        }
    }

    /// Authoritative (root-most) binding of `kind` among the ancestors of `path`.
    pub fn resolve_binding<P: ToNamespacePath + ?Sized>(
        &self,
        path: &P,
        kind: BindingKind,
    ) -> Result<ResolvedBinding> {
        let path = path.to_namespace_path()?;
        binding::resolve(self, &path, kind)
    }

    #[must_use]
    pub fn backends(&self) -> BackendRegistry<'_> {
        BackendRegistry::new(self)
    }

    #[must_use]
    pub fn resources(&self) -> ResourceLocator<'_> {
        ResourceLocator::new(self)
    }

    /// Redirect requests for `methods` arriving at container `at` to `to`
    /// (a leaf or another container). Merges with earlier redirects of `at`.
    pub fn redirect(&self, methods: &[Method], at: &str, to: &str) -> Result<()> {
        let at = NamespacePath::parse(at)?;
        let to = NamespacePath::parse(to)?;
        self.bindings.upsert(
            &at,
            BindingKind::Redirect,
            || BindingRecord::Redirect(RedirectBinding::default()),
            |record| {
                if let BindingRecord::Redirect(r) = record {
                    for m in methods {
                        r.targets.insert(m.clone(), to.clone());
                    }
                }
            },
        );
        info!(at = %at, to = %to, methods = ?methods, "Redirect registered");
        Ok(())
    }

    /// Redirect target of exactly `at` for `method`.
    #[must_use]
    pub fn redirect_target(&self, at: &NamespacePath, method: &Method) -> Option<NamespacePath> {
        match self.bindings.get(at, BindingKind::Redirect)? {
            BindingRecord::Redirect(r) => r.targets.get(method).cloned(),
            _ => None,
        }
    }

    /// Declare `package` a package with the given layout overrides. A package
    /// already linked keeps its first registration.
    pub fn link(&self, package: &str, link: PackageLink) -> Result<()> {
        let at = NamespacePath::parse(package)?;
        if self.bindings.contains(&at, BindingKind::Package) {
            debug!(package = %at, "Package already linked");
            return Ok(());
        }
        self.bindings
            .insert(at, BindingRecord::Package(PackageBinding::new(link)));
        Ok(())
    }

    #[must_use]
    pub fn package(&self, at: &NamespacePath) -> Option<PackageBinding> {
        match self.bindings.get(at, BindingKind::Package)? {
            BindingRecord::Package(p) => Some(p),
            _ => None,
        }
    }

    /// Require every predicate to pass before a requester sees `package` in
    /// the site walk.
    pub fn requires(&self, package: &str, predicates: Vec<PermissionRef>) -> Result<()> {
        let at = NamespacePath::parse(package)?;
        self.bindings.insert(
            at,
            BindingRecord::Permissions(PermissionBinding { predicates }),
        );
        Ok(())
    }

    #[must_use]
    pub fn package_permissions(&self, package: &NamespacePath) -> Vec<PermissionRef> {
        match self.bindings.get(package, BindingKind::Permissions) {
            Some(BindingRecord::Permissions(p)) => p.predicates,
            _ => Vec::new(),
        }
    }

    /// Packages enclosing `path`, nearest first.
    #[must_use]
    pub fn enclosing_packages(&self, path: &NamespacePath, include_self: bool) -> Vec<NamespacePath> {
        let own = include_self.then(|| path.clone());
        own.into_iter()
            .chain(path.ancestors())
            .filter(|p| self.bindings.contains(p, BindingKind::Package))
            .collect()
    }

    /// Configuration lookup.
    ///
    /// With `at = None` the process-wide default tree is consulted; otherwise
    /// the tree of the outermost package enclosing `at`. `branch = None`
    /// returns the whole tree.
    pub fn conf<P: ToNamespacePath + ?Sized>(&self, branch: Option<&str>, at: Option<&P>) -> Result<Value> {
        let tree = match at {
            None => config::global()
                .cloned()
                .ok_or_else(|| Error::PathNotFound {
                    path: branch.unwrap_or_default().to_string(),
                    segment: "<global configuration not loaded>".to_string(),
                })?,
            Some(at) => {
                let at = at.to_namespace_path()?;
                let package = self
                    .enclosing_packages(&at, false)
                    .pop()
                    .ok_or_else(|| Error::OutsidePackage {
                        path: at.to_string(),
                    })?;
                self.package(&package)
                    .and_then(|p| p.conf)
                    .map(|c| c.as_ref().clone())
                    .unwrap_or(Value::Object(Default::default()))
            }
        };
        match branch {
            None => Ok(tree),
            Some(b) => config::lookup(&tree, b).cloned(),
        }
    }

    /// Resolve `branch` relative to the parent of the outermost package
    /// enclosing `by`, so packages of one site can call into each other.
    pub fn call(&self, branch: &str, by: &str) -> Result<Arc<Leaf>> {
        let by = NamespacePath::parse(by)?;
        let package = self
            .enclosing_packages(&by, true)
            .pop()
            .ok_or_else(|| Error::OutsidePackage {
                path: by.to_string(),
            })?;
        let base = package.parent().ok_or_else(|| Error::OutsidePackage {
            path: by.to_string(),
        })?;
        self.load_leaf(&base.join(branch)?)
    }
}
