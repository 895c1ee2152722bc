//! Endpoint tree introspection.
//!
//! The tree nests one object per container segment below the walk root; the
//! brief descriptions of the endpoints a container defines sit under `"*"`:
//!
//! ```text
//! {"pkg_a": {"module_a": {"*": [..]}},
//!  "pkg_b": {"pkg_c": {"module_c": {"*": [..]}}}}
//! ```
//!
//! [`reduce`] merges runs of single-child containers into one slashed label,
//! so the second entry becomes `"pkg_b/pkg_c/module_c"`.

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::Result;
use crate::path::NamespacePath;
use crate::registry::Registry;

/// Key holding endpoint descriptions inside a container entry.
pub const ENDPOINTS_KEY: &str = "*";

/// Describe every endpoint defined strictly beneath `root`.
///
/// Endpoints of `root` itself are not part of the tree, and containers
/// without endpoints do not appear.
pub fn describe_tree(registry: &Registry, root: &NamespacePath, reduce_labels: bool) -> Result<Value> {
    registry.load_container(root)?;
    let mut tree = Map::new();
    for path in registry.namespace().containers_under(root) {
        let container = registry.load_container(&path)?;
        let mut endpoints = Vec::new();
        for name in container.leaf_names() {
            let leaf = registry.load_leaf(&path.child(name)?)?;
            if let Some(meta) = leaf.meta() {
                endpoints.push(meta.describe(leaf.path(), true));
            }
        }
        if endpoints.is_empty() {
            continue;
        }
        let below = path.suffix_below(root).unwrap_or_default();
        attach(&mut tree, below, endpoints);
    }
    debug!(root = %root, reduce = reduce_labels, "Endpoint tree described");
    let tree = Value::Object(tree);
    Ok(if reduce_labels { reduce(tree) } else { tree })
}

fn attach(tree: &mut Map<String, Value>, segments: &[String], endpoints: Vec<Value>) {
    let Some((head, rest)) = segments.split_first() else {
        tree.insert(ENDPOINTS_KEY.to_string(), Value::Array(endpoints));
        return;
    };
    let entry = tree
        .entry(head.clone())
        .or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(child) = entry {
        attach(child, rest, endpoints);
    }
}

/// Merge every chain of containers holding exactly one child container (and
/// no endpoints) into a single `a/b/c` label. The set of described endpoints
/// is unchanged.
#[must_use]
pub fn reduce(tree: Value) -> Value {
    let Value::Object(map) = tree else {
        return tree;
    };
    let mut out = Map::new();
    for (key, value) in map {
        if key == ENDPOINTS_KEY {
            out.insert(key, value);
            continue;
        }
        let mut label = key;
        let mut node = value;
        loop {
            let single = match &node {
                Value::Object(m) if m.len() == 1 => m
                    .keys()
                    .next()
                    .filter(|k| k.as_str() != ENDPOINTS_KEY)
                    .cloned(),
                _ => None,
            };
            let Some(child_key) = single else { break };
            let child = match &mut node {
                Value::Object(m) => m.remove(&child_key).unwrap_or(Value::Null),
                _ => Value::Null,
            };
            label = format!("{label}/{child_key}");
            node = child;
        }
        out.insert(label, reduce(node));
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_reduce_merges_single_child_runs() {
        let tree = json!({
            "pkg_a": { "module_a": { "*": [1] }, "module_b": { "*": [2] } },
            "pkg_b": { "pkg_c": { "module_c": { "*": [3] } } }
        });
        let reduced = reduce(tree);
        assert_eq!(
            reduced,
            json!({
                "pkg_a": { "module_a": { "*": [1] }, "module_b": { "*": [2] } },
                "pkg_b/pkg_c/module_c": { "*": [3] }
            })
        );
    }

    #[test]
    fn test_reduce_stops_at_endpoints() {
        let tree = json!({ "a": { "*": [1], "b": { "*": [2] } } });
        assert_eq!(reduce(tree.clone()), tree);
    }
}
