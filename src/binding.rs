//! # Bindings
//!
//! Binding records live in one side table keyed by `(container path, kind)`,
//! never on the nodes themselves. At most one record of a kind exists per
//! container; registering again overwrites it.
//!
//! ## Ancestor resolution
//!
//! [`resolve`] walks the proper ancestors of a path from the longest to the
//! shortest and keeps overwriting its running result on every hit. After the
//! full walk the **shallowest** ancestor carrying the kind is authoritative,
//! even when a closer ancestor also carries one:
//!
//! ```text
//! query:     a.b.c.leaf
//! walk:      a.b.c  ->  a.b (hit, kept)  ->  a (hit, replaces a.b)
//! result:    binding at `a`, depth 1
//! ```
//!
//! Backend selection, resource location and package configuration lookup all
//! go through this walk.

use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};

use dashmap::DashMap;
use http::Method;
use tracing::debug;

use crate::error::{Error, Result};
use crate::packages::PackageBinding;
use crate::path::NamespacePath;
use crate::permissions::PermissionRef;
use crate::registry::Registry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    Backend,
    Resource,
    Package,
    Redirect,
    Permissions,
}

impl Display for BindingKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BindingKind::Backend => "backend",
            BindingKind::Resource => "resource",
            BindingKind::Package => "package",
            BindingKind::Redirect => "redirect",
            BindingKind::Permissions => "permissions",
        };
        f.write_str(name)
    }
}

/// Which backend container and driver answer calls from beneath a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendBinding {
    pub backend: NamespacePath,
    pub driver: String,
}

/// Root container whose on-disk location anchors resource lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceBinding {
    pub root: NamespacePath,
}

/// Per-method redirect targets of one container. Not inherited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedirectBinding {
    pub targets: HashMap<Method, NamespacePath>,
}

/// Predicates a requester must all satisfy to see a package.
#[derive(Clone, Default)]
pub struct PermissionBinding {
    pub predicates: Vec<PermissionRef>,
}

impl fmt::Debug for PermissionBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.predicates.iter().map(|p| p.name()))
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum BindingRecord {
    Backend(BackendBinding),
    Resource(ResourceBinding),
    Package(PackageBinding),
    Redirect(RedirectBinding),
    Permissions(PermissionBinding),
}

impl BindingRecord {
    #[must_use]
    pub fn kind(&self) -> BindingKind {
        match self {
            BindingRecord::Backend(_) => BindingKind::Backend,
            BindingRecord::Resource(_) => BindingKind::Resource,
            BindingRecord::Package(_) => BindingKind::Package,
            BindingRecord::Redirect(_) => BindingKind::Redirect,
            BindingRecord::Permissions(_) => BindingKind::Permissions,
        }
    }
}

/// Outcome of an ancestor walk.
#[derive(Debug, Clone)]
pub struct ResolvedBinding {
    /// Segment count of the container holding the record
    pub depth: usize,
    pub at: NamespacePath,
    pub record: BindingRecord,
}

/// Process-wide side table of binding records.
///
/// Written during startup, read concurrently afterwards.
#[derive(Default)]
pub struct BindingTable {
    records: DashMap<(NamespacePath, BindingKind), BindingRecord>,
}

impl BindingTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `record` at `at`, replacing any record of the same kind.
    pub fn insert(&self, at: NamespacePath, record: BindingRecord) {
        let kind = record.kind();
        debug!(container = %at, kind = %kind, "Binding registered");
        self.records.insert((at, kind), record);
    }

    #[must_use]
    pub fn get(&self, at: &NamespacePath, kind: BindingKind) -> Option<BindingRecord> {
        self.records
            .get(&(at.clone(), kind))
            .map(|r| r.value().clone())
    }

    #[must_use]
    pub fn contains(&self, at: &NamespacePath, kind: BindingKind) -> bool {
        self.records.contains_key(&(at.clone(), kind))
    }

    /// Mutate a record in place (or create it from `init`), returning the
    /// closure's result.
    pub fn upsert<T>(
        &self,
        at: &NamespacePath,
        kind: BindingKind,
        init: impl FnOnce() -> BindingRecord,
        update: impl FnOnce(&mut BindingRecord) -> T,
    ) -> T {
        let mut entry = self.records.entry((at.clone(), kind)).or_insert_with(init);
        update(entry.value_mut())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Find the authoritative binding of `kind` for `path`.
///
/// Every ancestor is loaded first so that bindings declared by container
/// initialisers are in place. Ancestors without a namespace node (e.g. package
/// directories with no declared container) are still consulted.
pub fn resolve(registry: &Registry, path: &NamespacePath, kind: BindingKind) -> Result<ResolvedBinding> {
    let mut found: Option<ResolvedBinding> = None;
    for ancestor in path.ancestors() {
        match registry.namespace().load(registry, &ancestor) {
            Ok(_) => {}
            Err(Error::NodeNotFound { .. }) => {}
            Err(e) => return Err(e),
        }
        if let Some(record) = registry.bindings().get(&ancestor, kind) {
            debug!(
                path = %path,
                kind = %kind,
                candidate = %ancestor,
                "Ancestor carries binding"
            );
            found = Some(ResolvedBinding {
                depth: ancestor.len(),
                at: ancestor,
                record,
            });
        }
    }
    found.ok_or_else(|| Error::BindingNotFound {
        path: path.to_string(),
        kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::Namespace;

    fn registry() -> Registry {
        let mut ns = Namespace::builder();
        ns.container("a.b.c");
        Registry::new(ns.build().unwrap())
    }

    fn resource(root: &str) -> BindingRecord {
        BindingRecord::Resource(ResourceBinding {
            root: NamespacePath::parse(root).unwrap(),
        })
    }

    #[test]
    fn test_shallowest_ancestor_wins() {
        let reg = registry();
        let a = NamespacePath::parse("a").unwrap();
        let ab = NamespacePath::parse("a.b").unwrap();
        reg.bindings().insert(a, resource("res_root"));
        reg.bindings().insert(ab, resource("res_deep"));

        let q = NamespacePath::parse("a.b.c.leaf").unwrap();
        let resolved = resolve(&reg, &q, BindingKind::Resource).unwrap();
        assert_eq!(resolved.depth, 1);
        assert_eq!(resolved.at.to_string(), "a");
        match resolved.record {
            BindingRecord::Resource(r) => assert_eq!(r.root.to_string(), "res_root"),
            _ => panic!("wrong record kind"),
        }
    }

    #[test]
    fn test_debug_output_names_holder_and_predicates() {
        let reg = registry();
        let a = NamespacePath::parse("a").unwrap();
        reg.bindings().insert(
            a,
            BindingRecord::Permissions(PermissionBinding {
                predicates: vec![std::sync::Arc::new(crate::permissions::IsAuthenticated) as PermissionRef],
            }),
        );
        let q = NamespacePath::parse("a.b.c").unwrap();
        let resolved = resolve(&reg, &q, BindingKind::Permissions).unwrap();
        let text = format!("{resolved:?}");
        assert!(text.contains("depth: 1"));
        assert!(text.contains("Permissions"));
        assert!(text.contains("IsAuthenticated"));
    }

    #[test]
    fn test_path_itself_is_not_a_candidate() {
        let reg = registry();
        let abc = NamespacePath::parse("a.b.c").unwrap();
        reg.bindings().insert(abc.clone(), resource("r"));
        let err = resolve(&reg, &abc, BindingKind::Resource).unwrap_err();
        assert!(matches!(err, Error::BindingNotFound { .. }));
    }

    #[test]
    fn test_kinds_are_independent() {
        let reg = registry();
        reg.bindings()
            .insert(NamespacePath::parse("a").unwrap(), resource("r"));
        let q = NamespacePath::parse("a.b.c").unwrap();
        assert!(resolve(&reg, &q, BindingKind::Backend).is_err());
        assert!(resolve(&reg, &q, BindingKind::Resource).is_ok());
    }

    #[test]
    fn test_reregistration_overwrites() {
        let table = BindingTable::new();
        let at = NamespacePath::parse("a").unwrap();
        table.insert(at.clone(), resource("first"));
        table.insert(at.clone(), resource("second"));
        assert_eq!(table.len(), 1);
        match table.get(&at, BindingKind::Resource) {
            Some(BindingRecord::Resource(r)) => assert_eq!(r.root.to_string(), "second"),
            _ => panic!("missing record"),
        }
    }
}
