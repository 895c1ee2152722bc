//! Dispatcher core: mount selection, endpoint resolution and invocation.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use http::Method;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};

use super::describe::describe_tree;
use crate::endpoint::{CallError, Params};
use crate::error::{Error, Result};
use crate::ids::RequestId;
use crate::namespace::{Leaf, Node};
use crate::packages::Site;
use crate::path::NamespacePath;
use crate::permissions::{check_all, Requester};
use crate::registry::Registry;

const TREE_MARKER: &str = "**";
const HELP_MARKER: &str = "*";
const REDUCE_MARKER: &str = "reduce";
const BRIEF_MARKER: &str = "brief";

/// Inbound request as handed over by the transport.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    /// Query fields; repeated keys collect into arrays, bare keys are `""`
    pub query: Map<String, Value>,
    pub body: Map<String, Value>,
    pub requester: Requester,
    pub request_id: RequestId,
}

impl Request {
    #[must_use]
    pub fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            query: Map::new(),
            body: Map::new(),
            requester: Requester::anonymous(),
            request_id: RequestId::new(),
        }
    }

    #[must_use]
    pub fn get(path: &str) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn post(path: &str) -> Self {
        Self::new(Method::POST, path)
    }

    /// Add one query field; a repeated key turns into an array.
    #[must_use]
    pub fn with_query(mut self, key: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        match self.query.get_mut(key) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                self.query.insert(key.to_string(), value);
            }
        }
        self
    }

    /// Parse a raw query string such as `a=1&a=2&**&reduce`.
    #[must_use]
    pub fn with_query_string(mut self, raw: &str) -> Self {
        let raw = raw.trim_start_matches('?');
        for (k, v) in url::form_urlencoded::parse(raw.as_bytes()) {
            self = self.with_query(&k, v.into_owned());
        }
        self
    }

    /// Body fields; a non-object body is ignored.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        if let Value::Object(map) = body {
            self.body = map;
        }
        self
    }

    #[must_use]
    pub fn with_requester(mut self, requester: Requester) -> Self {
        self.requester = requester;
        self
    }

    #[must_use]
    pub fn with_request_id(mut self, id: RequestId) -> Self {
        self.request_id = id;
        self
    }

    #[must_use]
    pub fn has_marker(&self, marker: &str) -> bool {
        self.query.contains_key(marker)
    }

    /// Query fields overlaid by body fields.
    fn merged_fields(&self) -> Params {
        let mut fields = self.query.clone();
        for (k, v) in &self.body {
            fields.insert(k.clone(), v.clone());
        }
        fields
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCategory {
    Success,
    ClientError,
    ServerError,
}

/// Outcome of one dispatch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchResponse {
    pub status: u16,
    pub body: Value,
    /// Throttle class of the endpoint, when the dispatcher knows its rate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throttle_scope: Option<String>,
}

impl DispatchResponse {
    #[must_use]
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            body,
            throttle_scope: None,
        }
    }

    #[must_use]
    pub fn data(value: Value) -> Self {
        Self::json(200, json!({ "data": value }))
    }

    #[must_use]
    pub fn detail(status: u16, message: &str) -> Self {
        Self::json(status, json!({ "detail": message }))
    }

    #[must_use]
    pub fn category(&self) -> StatusCategory {
        match self.status {
            0..=399 => StatusCategory::Success,
            400..=499 => StatusCategory::ClientError,
            _ => StatusCategory::ServerError,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.category() == StatusCategory::Success
    }
}

/// Response for a resolution or binding error.
fn error_response(err: &Error) -> DispatchResponse {
    let status = match err {
        Error::NodeNotFound { .. } | Error::NotAContainer { .. } | Error::InvalidPath { .. } => 404,
        Error::MethodNotAllowed { .. } => 405,
        Error::EndpointNotFound { .. } | Error::AmbiguousEndpoint { .. } => 403,
        _ => 500,
    };
    DispatchResponse::detail(status, &err.to_string())
}

#[derive(Clone)]
enum MountTarget {
    Struct(NamespacePath),
    Site(Arc<Site>),
}

#[derive(Clone)]
struct Mount {
    prefix: Vec<String>,
    target: MountTarget,
}

/// Path segments are percent-decoded; `+` stays literal outside the query.
fn url_segments(url: &str) -> Vec<String> {
    url.split('/')
        .filter(|s| !s.is_empty())
        .map(|s| {
            urlencoding::decode(s)
                .map(|d| d.into_owned())
                .unwrap_or_else(|_| s.to_string())
        })
        .collect()
}

/// Routes requests below mounted URL prefixes into the namespace.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    mounts: Vec<Mount>,
    /// Known throttle classes and their rates (e.g. `burst -> 60/min`)
    throttle_rates: BTreeMap<String, String>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            mounts: Vec::new(),
            throttle_rates: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    #[must_use]
    pub fn with_throttle_rates(mut self, rates: HashMap<String, String>) -> Self {
        self.throttle_rates = rates.into_iter().collect();
        self
    }

    /// Serve the endpoints below container `root` at `url` and below.
    ///
    /// Mounting the same URL again replaces the earlier mount.
    pub fn mount(&mut self, url: &str, root: &str) -> Result<()> {
        let root = NamespacePath::parse(root)?;
        info!(url, root = %root, "Endpoint tree mounted");
        self.insert_mount(url_segments(url), MountTarget::Struct(root));
        Ok(())
    }

    /// Serve the aggregated walk of `site` at exactly `url`.
    pub fn mount_site(&mut self, url: &str, site: Site) {
        info!(url, site = %site.path, packages = site.packages.len(), "Site walk mounted");
        self.insert_mount(url_segments(url), MountTarget::Site(Arc::new(site)));
    }

    fn insert_mount(&mut self, prefix: Vec<String>, target: MountTarget) {
        let same_kind = |m: &Mount| {
            m.prefix == prefix
                && matches!(
                    (&m.target, &target),
                    (MountTarget::Struct(_), MountTarget::Struct(_))
                        | (MountTarget::Site(_), MountTarget::Site(_))
                )
        };
        if self.mounts.iter().any(same_kind) {
            warn!(url = %prefix.join("/"), "Replacing existing mount");
            self.mounts.retain(|m| !same_kind(m));
        }
        self.mounts.push(Mount { prefix, target });
    }

    /// Longest matching mount. Site walks only answer their exact URL.
    fn select_mount<'m>(&'m self, segments: &[String]) -> Option<(&'m Mount, usize)> {
        self.mounts
            .iter()
            .filter(|m| match m.target {
                MountTarget::Site(_) => m.prefix.as_slice() == segments,
                MountTarget::Struct(_) => segments.starts_with(&m.prefix),
            })
            .max_by_key(|m| (m.prefix.len(), matches!(m.target, MountTarget::Site(_))))
            .map(|m| (m, m.prefix.len()))
    }

    /// Dispatch one request.
    pub fn handle(&self, req: &Request) -> DispatchResponse {
        let start = Instant::now();
        let segments = url_segments(&req.path);
        let response = match self.select_mount(&segments) {
            None => DispatchResponse::detail(404, &format!("no endpoint tree mounted at '{}'", req.path)),
            Some((mount, used)) => match &mount.target {
                MountTarget::Site(site) => self.handle_site(req, site),
                MountTarget::Struct(root) => match extend_branch(root, &segments[used..]) {
                    Ok(branch) => self.handle_branch(req, &branch),
                    Err(e) => error_response(&e),
                },
            },
        };
        info!(
            request_id = %req.request_id,
            method = %req.method,
            path = %req.path,
            status = response.status,
            duration_us = start.elapsed().as_micros() as u64,
            "Request dispatched"
        );
        response
    }

    fn handle_site(&self, req: &Request, site: &Site) -> DispatchResponse {
        if req.method != Method::GET {
            return error_response(&Error::MethodNotAllowed {
                path: site.path.to_string(),
                method: req.method.clone(),
            });
        }
        match site.walk(&self.registry, &req.requester, req.has_marker(REDUCE_MARKER)) {
            Ok(tree) => DispatchResponse::json(200, tree),
            Err(e) => error_response(&e),
        }
    }

    fn handle_branch(&self, req: &Request, branch: &NamespacePath) -> DispatchResponse {
        if req.has_marker(TREE_MARKER) {
            return match describe_tree(&self.registry, branch, req.has_marker(REDUCE_MARKER)) {
                Ok(tree) => DispatchResponse::json(200, json!({ "api": tree })),
                Err(e) => error_response(&e),
            };
        }

        let leaf = match self.resolve_endpoint(&req.method, branch) {
            Ok(leaf) => leaf,
            Err(e) => {
                debug!(request_id = %req.request_id, branch = %branch, error = %e, "Endpoint resolution failed");
                return error_response(&e);
            }
        };
        let Some(meta) = leaf.meta() else {
            return error_response(&Error::node_not_found(leaf.path().to_string()));
        };

        if req.has_marker(HELP_MARKER) {
            let help = meta.describe(leaf.path(), req.has_marker(BRIEF_MARKER));
            return DispatchResponse::json(200, json!({ "help": help }));
        }

        if !check_all(&meta.requires, &req.requester) {
            warn!(request_id = %req.request_id, endpoint = %leaf.path(), "Permission required");
            return DispatchResponse::detail(403, "Permission required");
        }

        let mut fields = req.merged_fields();
        if let Some(key) = &meta.include_request {
            fields.insert(
                key.clone(),
                json!({
                    "method": req.method.as_str(),
                    "path": req.path,
                    "user": req.requester.user,
                    "request_id": req.request_id,
                }),
            );
        }

        let mut response = match meta.binder.bind(fields) {
            Ok(params) => self.invoke(req, &leaf, params),
            Err(e) => call_error_response(&e),
        };
        if self.throttle_rates.contains_key(&meta.throttle) {
            response.throttle_scope = Some(meta.throttle.clone());
        }
        response
    }

    fn invoke(&self, req: &Request, leaf: &Leaf, params: Params) -> DispatchResponse {
        let registry = &self.registry;
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            leaf.invoke(registry, params)
        }));
        match outcome {
            Ok(Ok(value)) => DispatchResponse::data(value),
            Ok(Err(e)) => {
                if let CallError::Failed(source) = &e {
                    error!(request_id = %req.request_id, endpoint = %leaf.path(), error = %source, "Handler failed");
                }
                call_error_response(&e)
            }
            Err(panic) => {
                let panic_message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(
                    request_id = %req.request_id,
                    endpoint = %leaf.path(),
                    panic_message = %panic_message,
                    "Handler panicked"
                );
                DispatchResponse::detail(500, &format!("Handler panicked: {panic_message}"))
            }
        }
    }

    /// Resolve `branch` to the endpoint answering `method`.
    ///
    /// A container answers with its unique default endpoint, else its only
    /// endpoint; with none it follows its redirect for `method` (to a leaf, or
    /// to another container resolved the same way). Any other branch names an
    /// endpoint on its parent container.
    pub fn resolve_endpoint(&self, method: &Method, branch: &NamespacePath) -> Result<Arc<Leaf>> {
        let registry = &self.registry;
        let mut visited: Vec<NamespacePath> = Vec::new();
        let mut current = branch.clone();
        loop {
            let container = match registry.load(&current) {
                Ok(Node::Container(c)) => c,
                Ok(Node::Leaf(_)) | Err(Error::NodeNotFound { .. }) if visited.is_empty() => {
                    return self.named_endpoint(method, &current);
                }
                Ok(Node::Leaf(leaf)) => return accept(method, leaf),
                Err(e) => return Err(e),
            };
            if visited.contains(&current) {
                visited.push(current.clone());
                return Err(Error::RedirectCycle {
                    path: current.to_string(),
                    chain: visited.iter().map(ToString::to_string).collect(),
                });
            }
            visited.push(current.clone());

            let mut endpoints = Vec::new();
            for name in container.leaf_names() {
                let leaf = registry.load_leaf(&current.child(name)?)?;
                if leaf.is_endpoint() {
                    endpoints.push(leaf);
                }
            }
            let defaults: Vec<&Arc<Leaf>> = endpoints
                .iter()
                .filter(|l| l.meta().is_some_and(|m| m.default))
                .collect();
            match (defaults.len(), endpoints.len()) {
                (1, _) => return accept(method, Arc::clone(defaults[0])),
                (0, 1) => return accept(method, Arc::clone(&endpoints[0])),
                (0, 0) => {}
                (0, _) => {
                    return Err(Error::AmbiguousEndpoint {
                        container: current.to_string(),
                        candidates: leaf_names(endpoints.iter()),
                    })
                }
                _ => {
                    return Err(Error::AmbiguousEndpoint {
                        container: current.to_string(),
                        candidates: leaf_names(defaults.into_iter()),
                    })
                }
            }

            let Some(target) = registry.redirect_target(&current, method) else {
                return Err(Error::EndpointNotFound {
                    name: current.name().to_string(),
                    method: method.clone(),
                    container: current.to_string(),
                });
            };
            debug!(from = %current, to = %target, method = %method, "Following redirect");
            current = target;
        }
    }

    /// `branch` minus its final segment is a container; the final segment
    /// names an endpoint defined or re-exported there.
    fn named_endpoint(&self, method: &Method, branch: &NamespacePath) -> Result<Arc<Leaf>> {
        let name = branch.name();
        let parent = branch
            .parent()
            .ok_or_else(|| Error::node_not_found(branch.to_string()))?;
        let container = self.registry.load_container(&parent)?;
        let not_found = || Error::EndpointNotFound {
            name: name.to_string(),
            method: method.clone(),
            container: parent.to_string(),
        };
        let member = container.member(name).ok_or_else(not_found)?;
        let leaf = match self.registry.load_leaf(&member) {
            Ok(leaf) => leaf,
            Err(Error::NodeNotFound { .. }) => return Err(not_found()),
            Err(e) => return Err(e),
        };
        if !leaf.is_endpoint() {
            return Err(not_found());
        }
        accept(method, leaf)
    }
}

fn leaf_names<'l>(leaves: impl Iterator<Item = &'l Arc<Leaf>>) -> Vec<String> {
    leaves.map(|l| l.path().name().to_string()).collect()
}

fn accept(method: &Method, leaf: Arc<Leaf>) -> Result<Arc<Leaf>> {
    match leaf.meta() {
        Some(meta) if meta.accepts(method) => Ok(leaf),
        Some(_) => Err(Error::MethodNotAllowed {
            path: leaf.path().to_string(),
            method: method.clone(),
        }),
        None => Err(Error::node_not_found(leaf.path().to_string())),
    }
}

fn extend_branch(root: &NamespacePath, rest: &[String]) -> Result<NamespacePath> {
    if rest.is_empty() {
        return Ok(root.clone());
    }
    Ok(root.concat(&NamespacePath::from_segments(rest)?))
}

fn call_error_response(err: &CallError) -> DispatchResponse {
    match err {
        CallError::Argument(message) => DispatchResponse::detail(400, message),
        CallError::Mandate { missing, blank } => DispatchResponse::json(
            400,
            json!({ "detail": err.to_string(), "missing": missing, "blank": blank }),
        ),
        CallError::Failed(source) => DispatchResponse::detail(500, &source.to_string()),
    }
}
