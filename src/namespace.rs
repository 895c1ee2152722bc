//! # Namespace
//!
//! The namespace is the tree every resolver walks: containers (packages and
//! modules) holding leaf units (callables). It is declared once with
//! [`NamespaceBuilder`] and is immutable afterwards.
//!
//! Nodes are materialised lazily. The first [`Namespace::load`] of a path
//! builds its node, runs the container's `on_load` hook (if any) exactly once
//! and caches the result; every later load returns the same `Arc`.
//!
//! ```rust
//! use nsrouter::endpoint::Endpoint;
//! use nsrouter::namespace::Namespace;
//! use nsrouter::registry::Registry;
//! use serde_json::json;
//!
//! let mut ns = Namespace::builder();
//! ns.container("api.greetings")
//!     .endpoint("hello", Endpoint::get(|_| Ok(json!("hi"))).as_default());
//! let registry = Registry::new(ns.build().unwrap());
//!
//! let a = registry.load("api.greetings.hello").unwrap();
//! let b = registry.load("api.greetings.hello").unwrap();
//! assert!(a.ptr_eq(&b));
//! ```

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde_json::Value;
use tracing::{debug, info};

use crate::endpoint::{Call, CallError, Endpoint, EndpointMeta, HandlerFn, Params};
use crate::error::{Error, Result};
use crate::path::NamespacePath;
use crate::registry::Registry;

/// Initialisation code attached to a container; runs on its first load.
///
/// Hooks typically register bindings (backends, resources, redirects) for the
/// container. A hook that loads its own container (directly or by resolving
/// a binding beneath it) gets [`Error::CyclicLoad`].
pub type InitHook = Arc<dyn Fn(&Registry) -> anyhow::Result<()> + Send + Sync>;

/// A loaded namespace node.
#[derive(Clone, Debug)]
pub enum Node {
    Container(Arc<Container>),
    Leaf(Arc<Leaf>),
}

impl Node {
    #[must_use]
    pub fn path(&self) -> &NamespacePath {
        match self {
            Node::Container(c) => &c.path,
            Node::Leaf(l) => &l.path,
        }
    }

    #[must_use]
    pub fn as_container(&self) -> Option<&Arc<Container>> {
        match self {
            Node::Container(c) => Some(c),
            Node::Leaf(_) => None,
        }
    }

    #[must_use]
    pub fn as_leaf(&self) -> Option<&Arc<Leaf>> {
        match self {
            Node::Leaf(l) => Some(l),
            Node::Container(_) => None,
        }
    }

    /// Reference identity.
    #[must_use]
    pub fn ptr_eq(&self, other: &Node) -> bool {
        match (self, other) {
            (Node::Container(a), Node::Container(b)) => Arc::ptr_eq(a, b),
            (Node::Leaf(a), Node::Leaf(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

pub struct Container {
    path: NamespacePath,
    location: Option<PathBuf>,
    /// Leaves defined here, in registration order
    leaves: Vec<String>,
    /// Names imported from elsewhere
    reexports: BTreeMap<String, NamespacePath>,
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("path", &self.path)
            .field("location", &self.location)
            .field("leaves", &self.leaves)
            .finish()
    }
}

impl Container {
    #[must_use]
    pub fn path(&self) -> &NamespacePath {
        &self.path
    }

    /// On-disk directory, explicit or inherited from the nearest located ancestor.
    #[must_use]
    pub fn location(&self) -> Option<&PathBuf> {
        self.location.as_ref()
    }

    /// Names of leaves directly defined in this container.
    #[must_use]
    pub fn leaf_names(&self) -> &[String] {
        &self.leaves
    }

    /// Path a member name refers to: a defined leaf or a re-exported target.
    #[must_use]
    pub fn member(&self, name: &str) -> Option<NamespacePath> {
        if self.leaves.iter().any(|l| l == name) {
            return self.path.child(name).ok();
        }
        self.reexports.get(name).cloned()
    }
}

pub struct Leaf {
    path: NamespacePath,
    handler: HandlerFn,
    meta: Option<EndpointMeta>,
}

impl fmt::Debug for Leaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Leaf")
            .field("path", &self.path)
            .field("endpoint", &self.is_endpoint())
            .finish()
    }
}

impl Leaf {
    #[must_use]
    pub fn path(&self) -> &NamespacePath {
        &self.path
    }

    /// Endpoint metadata; `None` for plain functions.
    #[must_use]
    pub fn meta(&self) -> Option<&EndpointMeta> {
        self.meta.as_ref()
    }

    #[must_use]
    pub fn is_endpoint(&self) -> bool {
        self.meta.is_some()
    }

    /// Run the handler with the given parameters.
    pub fn invoke(&self, registry: &Registry, params: Params) -> std::result::Result<Value, CallError> {
        let call = Call::new(registry, &self.path, params);
        (self.handler)(&call)
    }
}

#[derive(Default)]
struct ContainerDef {
    location: Option<PathBuf>,
    init: Option<InitHook>,
    leaves: Vec<String>,
    reexports: BTreeMap<String, NamespacePath>,
}

struct LeafDef {
    handler: HandlerFn,
    meta: Option<EndpointMeta>,
}

enum NodeDef {
    Container(ContainerDef),
    Leaf(LeafDef),
}

struct Slot {
    def: NodeDef,
    cell: OnceCell<Node>,
}

thread_local! {
    /// Nodes whose initialiser is running on this thread, keyed by the
    /// owning namespace's address.
    static LOADING: RefCell<Vec<(usize, NamespacePath)>> = const { RefCell::new(Vec::new()) };
}

/// Marks a node as loading until dropped.
struct LoadingGuard;

impl LoadingGuard {
    fn enter(namespace: &Namespace, path: &NamespacePath) -> Result<Self> {
        let key = (namespace as *const Namespace as usize, path.clone());
        LOADING.with(|loading| {
            let mut loading = loading.borrow_mut();
            if loading.contains(&key) {
                return Err(Error::CyclicLoad {
                    path: path.to_string(),
                });
            }
            loading.push(key);
            Ok(LoadingGuard)
        })
    }
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        LOADING.with(|loading| {
            loading.borrow_mut().pop();
        });
    }
}

/// Immutable namespace declaration with a load-once node cache.
pub struct Namespace {
    slots: BTreeMap<NamespacePath, Slot>,
}

impl Namespace {
    #[must_use]
    pub fn builder() -> NamespaceBuilder {
        NamespaceBuilder::default()
    }

    #[must_use]
    pub fn contains(&self, path: &NamespacePath) -> bool {
        self.slots.contains_key(path)
    }

    #[must_use]
    pub fn is_container(&self, path: &NamespacePath) -> bool {
        matches!(
            self.slots.get(path).map(|s| &s.def),
            Some(NodeDef::Container(_))
        )
    }

    /// Containers strictly beneath `root`, in namespace order.
    #[must_use]
    pub fn containers_under(&self, root: &NamespacePath) -> Vec<NamespacePath> {
        self.slots
            .range(root.clone()..)
            .skip_while(|(p, _)| *p == root)
            .take_while(|(p, _)| root.is_ancestor_of(p))
            .filter(|(_, s)| matches!(s.def, NodeDef::Container(_)))
            .map(|(p, _)| p.clone())
            .collect()
    }

    /// Load (or fetch the cached) node at `path`.
    ///
    /// Loading a node again from inside its own initialiser fails with
    /// [`Error::CyclicLoad`] instead of blocking on the cell.
    pub fn load(&self, registry: &Registry, path: &NamespacePath) -> Result<Node> {
        let slot = self
            .slots
            .get(path)
            .ok_or_else(|| Error::node_not_found(path.to_string()))?;
        if let Some(node) = slot.cell.get() {
            return Ok(node.clone());
        }
        let _guard = LoadingGuard::enter(self, path)?;
        slot.cell
            .get_or_try_init(|| Self::materialize(registry, path, &slot.def))
            .cloned()
    }

    fn materialize(registry: &Registry, path: &NamespacePath, def: &NodeDef) -> Result<Node> {
        match def {
            NodeDef::Container(c) => {
                if let Some(init) = &c.init {
                    debug!(container = %path, "Running container initialiser");
                    init(registry).map_err(|source| Error::InitFailed {
                        path: path.to_string(),
                        source,
                    })?;
                }
                debug!(container = %path, leaves = c.leaves.len(), "Container loaded");
                Ok(Node::Container(Arc::new(Container {
                    path: path.clone(),
                    location: c.location.clone(),
                    leaves: c.leaves.clone(),
                    reexports: c.reexports.clone(),
                })))
            }
            NodeDef::Leaf(l) => Ok(Node::Leaf(Arc::new(Leaf {
                path: path.clone(),
                handler: Arc::clone(&l.handler),
                meta: l.meta.clone(),
            }))),
        }
    }
}

/// Collects container and leaf declarations.
///
/// Declaring `a.b.c` implicitly declares the containers `a` and `a.b`.
/// Declaration errors are collected and reported by [`NamespaceBuilder::build`].
#[derive(Default)]
pub struct NamespaceBuilder {
    defs: BTreeMap<NamespacePath, NodeDef>,
    errors: Vec<Error>,
}

impl NamespaceBuilder {
    /// Declare (or reopen) a container.
    pub fn container(&mut self, path: &str) -> ContainerBuilder<'_> {
        let path = match NamespacePath::parse(path) {
            Ok(p) => self.ensure_container(&p).map(|_| p),
            Err(e) => Err(e),
        };
        match path {
            Ok(p) => ContainerBuilder {
                ns: self,
                path: Some(p),
            },
            Err(e) => {
                self.errors.push(e);
                ContainerBuilder { ns: self, path: None }
            }
        }
    }

    fn ensure_container(&mut self, path: &NamespacePath) -> Result<()> {
        let mut chain: Vec<NamespacePath> = path.ancestors().collect();
        chain.reverse();
        chain.push(path.clone());
        for p in chain {
            match self.defs.get(&p) {
                Some(NodeDef::Leaf(_)) => {
                    return Err(Error::InvalidPath {
                        path: p.to_string(),
                        reason: "already declared as a leaf unit".to_string(),
                    })
                }
                Some(NodeDef::Container(_)) => {}
                None => {
                    self.defs
                        .insert(p, NodeDef::Container(ContainerDef::default()));
                }
            }
        }
        Ok(())
    }

    fn container_def(&mut self, path: &NamespacePath) -> Option<&mut ContainerDef> {
        match self.defs.get_mut(path) {
            Some(NodeDef::Container(c)) => Some(c),
            _ => None,
        }
    }

    fn add_leaf(&mut self, container: &NamespacePath, name: &str, leaf: LeafDef) -> Result<()> {
        let path = container.child(name)?;
        if let Some(NodeDef::Container(_)) = self.defs.get(&path) {
            return Err(Error::InvalidPath {
                path: path.to_string(),
                reason: "already declared as a container".to_string(),
            });
        }
        if let Some(def) = self.container_def(container) {
            if !def.leaves.iter().any(|l| l == name) {
                def.leaves.push(name.to_string());
            }
            def.reexports.remove(name);
        }
        self.defs.insert(path, NodeDef::Leaf(leaf));
        Ok(())
    }

    /// Finish declaration. Containers without an explicit location inherit
    /// one from their nearest located ancestor.
    pub fn build(mut self) -> Result<Namespace> {
        if let Some(err) = self.errors.into_iter().next() {
            return Err(err);
        }
        let explicit: BTreeMap<NamespacePath, PathBuf> = self
            .defs
            .iter()
            .filter_map(|(p, d)| match d {
                NodeDef::Container(ContainerDef {
                    location: Some(loc),
                    ..
                }) => Some((p.clone(), loc.clone())),
                _ => None,
            })
            .collect();
        for (path, def) in self.defs.iter_mut() {
            let NodeDef::Container(c) = def else { continue };
            if c.location.is_some() {
                continue;
            }
            let inherited = path.ancestors().find_map(|anc| {
                let base = explicit.get(&anc)?;
                let below = path.suffix_below(&anc)?;
                Some(below.iter().fold(base.clone(), |dir, seg| dir.join(seg)))
            });
            c.location = inherited;
        }
        info!(nodes = self.defs.len(), "Namespace declared");
        Ok(Namespace {
            slots: self
                .defs
                .into_iter()
                .map(|(p, def)| {
                    (
                        p,
                        Slot {
                            def,
                            cell: OnceCell::new(),
                        },
                    )
                })
                .collect(),
        })
    }
}

/// Chained declarations for one container.
pub struct ContainerBuilder<'a> {
    ns: &'a mut NamespaceBuilder,
    path: Option<NamespacePath>,
}

impl ContainerBuilder<'_> {
    fn record(&mut self, res: Result<()>) {
        if let Err(e) = res {
            self.ns.errors.push(e);
        }
    }

    /// On-disk directory backing this container.
    pub fn location(self, dir: impl Into<PathBuf>) -> Self {
        if let Some(path) = self.path.clone() {
            if let Some(def) = self.ns.container_def(&path) {
                def.location = Some(dir.into());
            }
        }
        self
    }

    /// Initialisation hook run once, on the container's first load.
    pub fn on_load<F>(self, hook: F) -> Self
    where
        F: Fn(&Registry) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        if let Some(path) = self.path.clone() {
            if let Some(def) = self.ns.container_def(&path) {
                def.init = Some(Arc::new(hook));
            }
        }
        self
    }

    /// Register an endpoint leaf.
    pub fn endpoint(mut self, name: &str, endpoint: Endpoint) -> Self {
        if let Some(path) = self.path.clone() {
            let (meta, handler) = endpoint.into_parts();
            let res = self.ns.add_leaf(
                &path,
                name,
                LeafDef {
                    handler,
                    meta: Some(meta),
                },
            );
            self.record(res);
        }
        self
    }

    /// Register a plain function leaf (not reachable as an endpoint).
    pub fn function<F>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(&Call<'_>) -> std::result::Result<Value, CallError> + Send + Sync + 'static,
    {
        if let Some(path) = self.path.clone() {
            let res = self.ns.add_leaf(
                &path,
                name,
                LeafDef {
                    handler: Arc::new(handler),
                    meta: None,
                },
            );
            self.record(res);
        }
        self
    }

    /// Make `target` visible under `name` without defining it here.
    pub fn reexport(mut self, name: &str, target: &str) -> Self {
        if let Some(path) = self.path.clone() {
            let res = NamespacePath::parse(target).and_then(|t| {
                path.child(name)?;
                if let Some(def) = self.ns.container_def(&path) {
                    if !def.leaves.iter().any(|l| l == name) {
                        def.reexports.insert(name.to_string(), t);
                    }
                }
                Ok(())
            });
            self.record(res);
        }
        self
    }
}
