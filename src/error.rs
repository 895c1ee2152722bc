//! Error taxonomy shared by every resolver in the crate.
//!
//! Startup-time failures (malformed configuration, failed container
//! initialisation) are meant to abort binding. Dispatch-time failures are
//! converted into structured responses by [`crate::dispatcher`] and never
//! escape a request.

use std::path::PathBuf;

use http::Method;

use crate::binding::BindingKind;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The namespace path does not resolve to any registered unit.
    #[error("no namespace node at '{path}'")]
    NodeNotFound { path: String },

    /// The path resolves to a leaf unit where a container was required.
    #[error("'{path}' is a leaf unit, not a container")]
    NotAContainer { path: String },

    /// No ancestor of `path` carries a binding record of `kind`.
    #[error("no {kind} binding found for '{path}' or any of its ancestors")]
    BindingNotFound { path: String, kind: BindingKind },

    /// The endpoint exists but does not accept `method`.
    #[error("method '{method}' not allowed for endpoint '{path}'")]
    MethodNotAllowed { path: String, method: Method },

    /// Leaf-unit guessing and redirect chasing were exhausted.
    #[error("could not find endpoint '{name}' with HTTP request method '{method}' in '{container}'")]
    EndpointNotFound {
        name: String,
        method: Method,
        container: String,
    },

    /// A container offers several endpoints and none is uniquely marked default.
    #[error("container '{container}' has no unique default endpoint (candidates: {})", candidates.join(", "))]
    AmbiguousEndpoint {
        container: String,
        candidates: Vec<String>,
    },

    /// A redirect chain revisited a container.
    #[error("redirect cycle detected at '{path}' (chain: {})", chain.join(" -> "))]
    RedirectCycle { path: String, chain: Vec<String> },

    /// A configuration file has a recognised extension but cannot be parsed.
    #[error("unsupported or malformed configuration file '{}': {reason}", path.display())]
    UnsupportedOrMalformedConfig { path: PathBuf, reason: String },

    /// A dotted configuration lookup fell off the tree.
    #[error("configuration path '{path}' not found (missing segment '{segment}')")]
    PathNotFound { path: String, segment: String },

    /// The string is not a valid namespace path.
    #[error("invalid namespace path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// A container has no on-disk location to anchor file lookups.
    #[error("container '{path}' has no on-disk location")]
    MissingLocation { path: String },

    /// A container's initialisation hook failed on first load.
    #[error("initialisation of '{path}' failed: {source}")]
    InitFailed {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    /// A node was loaded again from inside its own initialisation hook.
    #[error("'{path}' was loaded again while its initialiser was running")]
    CyclicLoad { path: String },

    /// A caller outside of any package used a package-relative operation.
    #[error("'{path}' is not inside a bound package")]
    OutsidePackage { path: String },

    #[error("I/O error at '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn node_not_found(path: impl Into<String>) -> Self {
        Error::NodeNotFound { path: path.into() }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// True for the failures that mean "nothing lives at that path".
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NodeNotFound { .. })
    }
}
