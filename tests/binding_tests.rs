//! Namespace loading and ancestor binding resolution.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use nsrouter::binding::BindingKind;
use nsrouter::namespace::Namespace;
use nsrouter::{Error, PackageLink, Registry};
use serde_json::json;

#[test]
fn test_load_is_idempotent_and_runs_hook_once() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let mut ns = Namespace::builder();
    ns.container("shop.cart")
        .on_load(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .function("total", |_| Ok(json!(0)));
    let reg = Registry::new(ns.build().unwrap());

    let first = reg.load("shop.cart").unwrap();
    let second = reg.load("/shop/cart").unwrap();
    assert!(first.ptr_eq(&second));
    // resolution loads every ancestor; the hook must not run again
    let _ = reg.resolve_binding("shop.cart.total", BindingKind::Backend);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn test_failing_hook_reports_init_failure() {
    let mut ns = Namespace::builder();
    ns.container("broken")
        .on_load(|_| Err(anyhow::anyhow!("database unreachable")));
    let reg = Registry::new(ns.build().unwrap());
    match reg.load("broken") {
        Err(Error::InitFailed { path, source }) => {
            assert_eq!(path, "broken");
            assert!(source.to_string().contains("unreachable"));
        }
        other => panic!("expected init failure, got {:?}", other.err()),
    }
}

#[test]
fn test_missing_node_and_leaf_as_container() {
    let mut ns = Namespace::builder();
    ns.container("a").function("f", |_| Ok(json!(1)));
    let reg = Registry::new(ns.build().unwrap());
    assert!(reg.load("a.g").unwrap_err().is_not_found());
    assert!(matches!(
        reg.load_container("a.f"),
        Err(Error::NotAContainer { .. })
    ));
    assert!(matches!(reg.load("a..f"), Err(Error::InvalidPath { .. })));
}

fn layered_registry() -> Registry {
    let mut ns = Namespace::builder();
    ns.container("app").location("/srv/app");
    ns.container("app.res").location("/srv/app_res");
    ns.container("other_res").location("/srv/other_res");
    ns.container("app.mod.sub")
        .function("f", |c| Ok(json!(c.resource(Some("data.csv"))?)));
    Registry::new(ns.build().unwrap())
}

#[test]
fn test_root_most_binding_wins() {
    let reg = layered_registry();
    reg.bind_resources("other_res", "app.mod").unwrap();
    reg.bind_resources("app.res", "app").unwrap();

    let resolved = reg
        .resolve_binding("app.mod.sub.f", BindingKind::Resource)
        .unwrap();
    assert_eq!(resolved.at.to_string(), "app");
    assert_eq!(resolved.depth, 1);

    let path = reg.resources().resolve("app.mod.sub", Some("x.txt")).unwrap();
    assert_eq!(path, PathBuf::from("/srv/app_res/mod/sub/x.txt"));
}

#[test]
fn test_nearer_binding_used_without_root_binding() {
    let reg = layered_registry();
    reg.bind_resources("other_res", "app.mod").unwrap();
    let path = reg.resources().resolve("app.mod.sub", None).unwrap();
    assert_eq!(path, PathBuf::from("/srv/other_res/sub"));
}

#[test]
fn test_unit_resource_through_call() {
    let reg = layered_registry();
    reg.bind_resources("app.res", "app").unwrap();
    let leaf = reg.load_leaf("app.mod.sub.f").unwrap();
    let value = leaf.invoke(&reg, Default::default()).unwrap();
    assert_eq!(value, json!("/srv/app_res/mod/sub/f/data.csv"));
}

#[test]
fn test_binding_registered_by_hook_is_visible() {
    let mut ns = Namespace::builder();
    ns.container("svc")
        .location("/srv/svc")
        .on_load(|reg| Ok(reg.bind_resources("svc.assets", "svc")?));
    ns.container("svc.assets");
    ns.container("svc.handlers").function("h", |_| Ok(json!(null)));
    let reg = Registry::new(ns.build().unwrap());

    let path = reg.resources().resolve("svc.handlers.h", None).unwrap();
    assert_eq!(path, PathBuf::from("/srv/svc/assets/handlers/h"));
}

#[test]
fn test_backend_selected_through_generic_interface() {
    let mut ns = Namespace::builder();
    ns.container("gen.db.connector")
        .function("insert", |c| c.delegate());
    ns.container("drivers.dba.db.connector").function("insert", |c| {
        Ok(json!({ "driver": "dba", "row": c.param("row").cloned() }))
    });
    ns.container("drivers.dbb.connector")
        .function("insert", |_| Ok(json!({ "driver": "dbb" })));
    let reg = Registry::new(ns.build().unwrap());

    reg.bind_backend_absolute("drivers", "gen.db", "dbb").unwrap();
    reg.bind_backend_absolute("drivers", "gen", "dba").unwrap();

    // the binding on `gen` outranks the one on `gen.db`
    let leaf = reg.backends().resolve("gen.db.connector.insert").unwrap();
    assert_eq!(leaf.path().to_string(), "drivers.dba.db.connector.insert");

    let caller = reg.load_leaf("gen.db.connector.insert").unwrap();
    let mut params = serde_json::Map::new();
    params.insert("row".to_string(), json!({ "id": 7 }));
    let out = caller.invoke(&reg, params).unwrap();
    assert_eq!(out, json!({ "driver": "dba", "row": { "id": 7 } }));
}

#[test]
fn test_call_resolves_relative_to_site() {
    let mut ns = Namespace::builder();
    ns.container("site.blog.endpoints").function("feed", |c| {
        let helper = c.registry().call("shop.util.price", &c.unit().to_string())?;
        helper.invoke(c.registry(), Default::default())
    });
    ns.container("site.shop.util")
        .function("price", |_| Ok(json!(42)));
    let reg = Registry::new(ns.build().unwrap());
    reg.link("site.blog", PackageLink::default()).unwrap();
    reg.link("site.shop", PackageLink::default()).unwrap();

    let leaf = reg.call("shop.util.price", "site.blog.endpoints.feed").unwrap();
    assert_eq!(leaf.path().to_string(), "site.shop.util.price");

    let feed = reg.load_leaf("site.blog.endpoints.feed").unwrap();
    assert_eq!(feed.invoke(&reg, Default::default()).unwrap(), json!(42));

    assert!(matches!(
        reg.call("x", "elsewhere.unit"),
        Err(Error::OutsidePackage { .. })
    ));
}
