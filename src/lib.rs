//! # nsrouter
//!
//! **nsrouter** resolves hierarchical paths (`a.b.c` or `/a/b/c`) into callable
//! units registered in a tree of containers, and dispatches requests to them.
//!
//! ## Overview
//!
//! The same ancestor search drives four things:
//!
//! - routing a request to an endpoint (with default endpoints, redirects and
//!   per-endpoint method gating)
//! - selecting a concrete backend behind a generic interface
//! - locating resource files co-located with a unit
//! - binding and describing the packages of a site
//!
//! Binding records live in one side table owned by the [`Registry`]. When
//! several ancestors of a path carry a binding of the same kind, the one
//! closest to the namespace root wins.
//!
//! ## Architecture
//!
//! - **[`path`]** - namespace paths and ancestry
//! - **[`namespace`]** - container and leaf declaration, load-once node cache
//! - **[`binding`]** - binding records and the ancestor resolver
//! - **[`registry`]** - the process-wide registry and registration entry points
//! - **[`backend`]** - generic interfaces bound to backend drivers
//! - **[`resources`]** - resource directories mirrored under a resource root
//! - **[`config`]** - configuration directories and dotted lookups
//! - **[`endpoint`]** - endpoint metadata, handlers and parameter binders
//! - **[`permissions`]** - permission predicates for packages and endpoints
//! - **[`dispatcher`]** - request dispatch and endpoint tree introspection
//! - **[`packages`]** - package discovery, binding and the site walk
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use nsrouter::dispatcher::{Dispatcher, Request};
//! use nsrouter::endpoint::Endpoint;
//! use nsrouter::namespace::Namespace;
//! use nsrouter::Registry;
//! use serde_json::json;
//!
//! let mut ns = Namespace::builder();
//! ns.container("api.greetings")
//!     .endpoint("hello", Endpoint::get(|_| Ok(json!("Hello!"))).as_default());
//! let registry = Arc::new(Registry::new(ns.build().unwrap()));
//!
//! let mut dispatcher = Dispatcher::new(registry);
//! dispatcher.mount("/v1", "api").unwrap();
//!
//! let response = dispatcher.handle(&Request::get("/v1/greetings"));
//! assert_eq!(response.status, 200);
//! assert_eq!(response.body, json!({ "data": "Hello!" }));
//! ```
//!
//! ## Logging
//!
//! All components emit `tracing` events; see [`logging`] for the subscriber
//! and its `NSR_LOG_*` variables.

pub mod backend;
pub mod binding;
pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod endpoint;
pub mod error;
pub mod ids;
pub mod logging;
pub mod namespace;
pub mod packages;
pub mod path;
pub mod permissions;
pub mod registry;
pub mod resources;
pub mod runtime_config;

pub use binding::BindingKind;
pub use dispatcher::{DispatchResponse, Dispatcher, Request};
pub use endpoint::{Call, CallError, Endpoint};
pub use error::{Error, Result};
pub use namespace::Namespace;
pub use packages::{PackageBinder, PackageLink, Site};
pub use path::NamespacePath;
pub use registry::Registry;
