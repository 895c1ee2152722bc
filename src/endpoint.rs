//! Endpoint metadata and the handler calling convention.
//!
//! Leaf units are plain handler closures. A leaf becomes an *endpoint* when it
//! is registered with [`Endpoint`] metadata: accepted methods, the `default`
//! flag, a throttle class, required permissions, the request-inclusion
//! directive and a parameter binder. Metadata is fixed once the container is
//! built.

use std::path::PathBuf;
use std::sync::Arc;

use http::Method;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

use crate::error::Error;
use crate::namespace::Leaf;
use crate::path::NamespacePath;
use crate::permissions::PermissionRef;
use crate::registry::Registry;

/// Merged query and body fields handed to a handler.
pub type Params = Map<String, Value>;

/// Handler signature for every leaf unit.
pub type HandlerFn = Arc<dyn Fn(&Call<'_>) -> Result<Value, CallError> + Send + Sync>;

/// Throttle class assigned when none is given.
pub const DEFAULT_THROTTLE: &str = "base";

/// Failure raised by a handler or by parameter binding.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    /// Arguments do not fit the handler's shape; answered with a client error.
    #[error("{0}")]
    Argument(String),

    /// Required fields were absent or blank.
    #[error("Parameters missing or containing blank value")]
    Mandate {
        missing: Vec<String>,
        blank: Vec<String>,
    },

    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl From<Error> for CallError {
    fn from(err: Error) -> Self {
        CallError::Failed(anyhow::Error::new(err))
    }
}

/// Converts the merged field map into the arguments a handler expects.
///
/// The dispatcher calls this once per request; an `Err(CallError::Argument)`
/// or `Err(CallError::Mandate)` becomes a 400 response.
pub trait ParamBinder: Send + Sync {
    fn bind(&self, fields: Params) -> Result<Params, CallError>;

    /// Parameter summary for full endpoint descriptions.
    fn describe(&self) -> Value {
        Value::Null
    }
}

/// Hands fields through unchanged.
pub struct PassThrough;

impl ParamBinder for PassThrough {
    fn bind(&self, fields: Params) -> Result<Params, CallError> {
        Ok(fields)
    }
}

/// Rejects requests missing `fields`, or carrying blank `strict_fields`.
///
/// Strict fields are also required.
#[derive(Debug, Clone, Default)]
pub struct RequiredFields {
    pub fields: Vec<String>,
    pub strict_fields: Vec<String>,
}

impl RequiredFields {
    #[must_use]
    pub fn new(fields: &[&str]) -> Self {
        Self {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            strict_fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn strict(mut self, fields: &[&str]) -> Self {
        self.strict_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty() || a.iter().all(is_blank),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

impl ParamBinder for RequiredFields {
    fn bind(&self, fields: Params) -> Result<Params, CallError> {
        let missing: Vec<String> = self
            .fields
            .iter()
            .chain(self.strict_fields.iter())
            .filter(|f| !fields.contains_key(f.as_str()))
            .cloned()
            .collect();
        let blank: Vec<String> = self
            .strict_fields
            .iter()
            .filter(|f| fields.get(f.as_str()).is_some_and(is_blank))
            .cloned()
            .collect();
        if missing.is_empty() && blank.is_empty() {
            Ok(fields)
        } else {
            Err(CallError::Mandate { missing, blank })
        }
    }

    fn describe(&self) -> Value {
        json!({ "required": self.fields, "strict": self.strict_fields })
    }
}

/// Metadata attached to an endpoint leaf.
#[derive(Clone)]
pub struct EndpointMeta {
    pub methods: Vec<Method>,
    pub default: bool,
    pub throttle: String,
    pub requires: Vec<PermissionRef>,
    /// When set, request details are injected into the parameters under this key
    pub include_request: Option<String>,
    pub binder: Arc<dyn ParamBinder>,
    pub doc: Option<String>,
}

impl EndpointMeta {
    #[must_use]
    pub fn accepts(&self, method: &Method) -> bool {
        self.methods.iter().any(|m| m == method)
    }

    fn method_names(&self) -> Vec<String> {
        self.methods.iter().map(|m| m.as_str().to_string()).collect()
    }

    /// Brief or full description served for `?*` queries and tree walks.
    #[must_use]
    pub fn describe(&self, path: &NamespacePath, brief: bool) -> Value {
        let summary = self
            .doc
            .as_deref()
            .and_then(|d| d.lines().next())
            .unwrap_or_default();
        if brief {
            return json!({
                "name": path.name(),
                "methods": self.method_names(),
                "default": self.default,
                "doc": summary,
            });
        }
        let requires: Vec<String> = self.requires.iter().map(|p| p.name()).collect();
        json!({
            "name": path.name(),
            "path": path.to_string(),
            "methods": self.method_names(),
            "default": self.default,
            "throttle": self.throttle,
            "requires": requires,
            "include_request": self.include_request,
            "parameters": self.binder.describe(),
            "doc": self.doc.as_deref().unwrap_or_default(),
        })
    }
}

/// Builder for an endpoint registration.
///
/// ```rust
/// use nsrouter::endpoint::{Endpoint, RequiredFields};
/// use serde_json::json;
///
/// let ep = Endpoint::post(|call| Ok(json!({ "title": call.param("title") })))
///     .as_default()
///     .throttle("burst")
///     .binder(RequiredFields::new(&["title"]))
///     .doc("Create an article");
/// assert!(ep.meta().default);
/// ```
#[derive(Clone)]
pub struct Endpoint {
    meta: EndpointMeta,
    handler: HandlerFn,
}

impl Endpoint {
    pub fn new<F>(methods: impl IntoIterator<Item = Method>, handler: F) -> Self
    where
        F: Fn(&Call<'_>) -> Result<Value, CallError> + Send + Sync + 'static,
    {
        let mut unique: Vec<Method> = Vec::new();
        for m in methods {
            if !unique.contains(&m) {
                unique.push(m);
            }
        }
        Self {
            meta: EndpointMeta {
                methods: unique,
                default: false,
                throttle: DEFAULT_THROTTLE.to_string(),
                requires: Vec::new(),
                include_request: None,
                binder: Arc::new(PassThrough),
                doc: None,
            },
            handler: Arc::new(handler),
        }
    }

    pub fn get<F>(handler: F) -> Self
    where
        F: Fn(&Call<'_>) -> Result<Value, CallError> + Send + Sync + 'static,
    {
        Self::new([Method::GET], handler)
    }

    pub fn post<F>(handler: F) -> Self
    where
        F: Fn(&Call<'_>) -> Result<Value, CallError> + Send + Sync + 'static,
    {
        Self::new([Method::POST], handler)
    }

    /// Mark as the container's default endpoint.
    #[must_use]
    pub fn as_default(mut self) -> Self {
        self.meta.default = true;
        self
    }

    #[must_use]
    pub fn throttle(mut self, class: &str) -> Self {
        self.meta.throttle = class.to_string();
        self
    }

    #[must_use]
    pub fn requires(mut self, perm: PermissionRef) -> Self {
        self.meta.requires.push(perm);
        self
    }

    #[must_use]
    pub fn include_request(mut self, key: &str) -> Self {
        self.meta.include_request = Some(key.to_string());
        self
    }

    #[must_use]
    pub fn binder(mut self, binder: impl ParamBinder + 'static) -> Self {
        self.meta.binder = Arc::new(binder);
        self
    }

    #[must_use]
    pub fn doc(mut self, doc: &str) -> Self {
        self.meta.doc = Some(doc.to_string());
        self
    }

    #[must_use]
    pub fn meta(&self) -> &EndpointMeta {
        &self.meta
    }

    pub(crate) fn into_parts(self) -> (EndpointMeta, HandlerFn) {
        (self.meta, self.handler)
    }
}

/// Everything a handler sees for one invocation.
pub struct Call<'a> {
    registry: &'a Registry,
    unit: &'a NamespacePath,
    params: Params,
}

impl<'a> Call<'a> {
    pub fn new(registry: &'a Registry, unit: &'a NamespacePath, params: Params) -> Self {
        Self {
            registry,
            unit,
            params,
        }
    }

    /// Path of the leaf being invoked.
    #[must_use]
    pub fn unit(&self) -> &NamespacePath {
        self.unit
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        self.registry
    }

    #[must_use]
    pub fn params(&self) -> &Params {
        &self.params
    }

    #[must_use]
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    /// A string parameter; single-element lists (as query strings produce) are
    /// unwrapped.
    pub fn str_param(&self, name: &str) -> Result<&str, CallError> {
        let value = match self.params.get(name) {
            Some(Value::Array(items)) if items.len() == 1 => &items[0],
            Some(v) => v,
            None => {
                return Err(CallError::Argument(format!(
                    "missing required argument '{name}'"
                )))
            }
        };
        value
            .as_str()
            .ok_or_else(|| CallError::Argument(format!("argument '{name}' must be a string")))
    }

    /// Deserialize the parameters into a typed argument struct.
    pub fn args<T: DeserializeOwned>(&self) -> Result<T, CallError> {
        serde_json::from_value(Value::Object(self.params.clone()))
            .map_err(|e| CallError::Argument(e.to_string()))
    }

    /// Backend function matching this unit.
    pub fn backend(&self) -> Result<Arc<Leaf>, Error> {
        self.registry.backends().resolve(self.unit)
    }

    /// Invoke the matching backend function with the same parameters.
    pub fn delegate(&self) -> Result<Value, CallError> {
        self.delegate_with(self.params.clone())
    }

    /// Invoke the matching backend function with explicit parameters.
    pub fn delegate_with(&self, params: Params) -> Result<Value, CallError> {
        let backend = self.backend()?;
        backend.invoke(self.registry, params)
    }

    /// File-system path of a resource bound to this unit.
    pub fn resource(&self, sub_path: Option<&str>) -> Result<PathBuf, Error> {
        self.registry.resources().resolve(self.unit, sub_path)
    }

    /// Configuration value from the package enclosing this unit.
    pub fn conf(&self, branch: &str) -> Result<Value, Error> {
        self.registry.conf(Some(branch), Some(self.unit))
    }
}
