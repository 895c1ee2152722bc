//! Resource locator.
//!
//! Resources are auxiliary files kept next to endpoint code, mirrored under a
//! resource root: the unit `X.y.z` with a root bound at `X` reads its files
//! from `<root location>/y/z/`. The returned path is not checked for
//! existence.

use std::path::{Component, Path, PathBuf};

use tracing::{debug, info};

use crate::binding::{BindingKind, BindingRecord, ResourceBinding};
use crate::error::{Error, Result};
use crate::path::{NamespacePath, ToNamespacePath};
use crate::registry::Registry;

pub struct ResourceLocator<'a> {
    registry: &'a Registry,
}

impl<'a> ResourceLocator<'a> {
    pub(crate) fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    /// Anchor resource lookups beneath `at` in the directory of container `root`.
    pub fn bind(&self, root: &str, at: &str) -> Result<()> {
        let root = NamespacePath::parse(root)?;
        let at = NamespacePath::parse(at)?;
        info!(at = %at, root = %root, "Resource root bound");
        self.registry
            .bindings()
            .insert(at, BindingRecord::Resource(ResourceBinding { root }));
        Ok(())
    }

    /// Directory (or file, with `sub_path`) holding resources of `caller`.
    pub fn resolve<P: ToNamespacePath + ?Sized>(&self, caller: &P, sub_path: Option<&str>) -> Result<PathBuf> {
        let caller = caller.to_namespace_path()?;
        let resolved = self.registry.resolve_binding(&caller, BindingKind::Resource)?;
        let BindingRecord::Resource(binding) = resolved.record else {
            return Err(Error::BindingNotFound {
                path: caller.to_string(),
                kind: BindingKind::Resource,
            });
        };
        let root = self.registry.load_container(&binding.root)?;
        let mut path = root
            .location()
            .cloned()
            .ok_or_else(|| Error::MissingLocation {
                path: binding.root.to_string(),
            })?;
        for segment in caller.suffix_below(&resolved.at).unwrap_or_default() {
            path.push(segment);
        }
        if let Some(sub) = sub_path {
            push_relative(&mut path, sub)?;
        }
        debug!(caller = %caller, path = %path.display(), "Resource resolved");
        Ok(path)
    }
}

/// Append `sub`, refusing anything that could leave the base directory.
fn push_relative(base: &mut PathBuf, sub: &str) -> Result<()> {
    for comp in Path::new(sub.trim_start_matches('/')).components() {
        match comp {
            Component::Normal(s) => base.push(s),
            Component::CurDir => {}
            _ => {
                return Err(Error::InvalidPath {
                    path: sub.to_string(),
                    reason: "resource sub-path must stay below its directory".to_string(),
                })
            }
        }
    }
    Ok(())
}

impl Registry {
    /// Shorthand for [`ResourceLocator::bind`].
    pub fn bind_resources(&self, root: &str, at: &str) -> Result<()> {
        self.resources().bind(root, at)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use crate::namespace::Namespace;

    use super::*;

    fn registry() -> Registry {
        let mut ns = Namespace::builder();
        ns.container("res").location("/srv/app/res");
        ns.container("X.y").function("z", |_| Ok(Value::Null));
        Registry::new(ns.build().unwrap())
    }

    #[test]
    fn test_mirrors_caller_path_below_binding() {
        let reg = registry();
        reg.bind_resources("res", "X").unwrap();
        let path = reg.resources().resolve("X.y.z", Some("input.txt")).unwrap();
        assert!(path.ends_with("y/z/input.txt"));
        assert_eq!(path, PathBuf::from("/srv/app/res/y/z/input.txt"));

        let dir = reg.resources().resolve("X.y", None).unwrap();
        assert_eq!(dir, PathBuf::from("/srv/app/res/y"));
    }

    #[test]
    fn test_rejects_traversal() {
        let reg = registry();
        reg.bind_resources("res", "X").unwrap();
        let err = reg
            .resources()
            .resolve("X.y.z", Some("../../secret"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPath { .. }));
    }

    #[test]
    fn test_unbound_caller() {
        let reg = registry();
        let err = reg.resources().resolve("X.y.z", None).unwrap_err();
        assert!(matches!(err, Error::BindingNotFound { .. }));
    }

    #[test]
    fn test_root_without_location() {
        let reg = registry();
        reg.bind_resources("X", "X").unwrap();
        assert!(reg.resources().resolve("X.y.z", None).is_err());
    }
}
