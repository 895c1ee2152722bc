//! Configuration directories and the process-wide default tree.

use nsrouter::config;
use nsrouter::namespace::Namespace;
use nsrouter::{Error, Registry};
use serde_json::json;

mod common;
use common::temp_files::TempTree;

#[test]
fn test_directory_mixes_formats() {
    let tree = TempTree::new();
    tree.file("site.yaml", "greet:\n  message: Hello!\n");
    tree.file("db.toml", "[primary]\nhost = \"localhost\"\nport = 5432\n");
    tree.file("servers.json", r#"{"list": [{"name": "a"}, {"name": "b"}]}"#);
    tree.file("notes.txt", "ignored");
    tree.mkdir("nested");

    let conf = config::load_directory(tree.root()).unwrap();
    let keys: Vec<&String> = conf.as_object().unwrap().keys().collect();
    assert_eq!(keys.len(), 3);
    assert_eq!(config::lookup(&conf, "site.greet.message").unwrap(), "Hello!");
    assert_eq!(config::lookup(&conf, "db.primary.port").unwrap(), 5432);
    assert_eq!(config::lookup(&conf, "servers.list.1.name").unwrap(), "b");
    assert!(matches!(
        config::lookup(&conf, "servers.list.7"),
        Err(Error::PathNotFound { .. })
    ));
}

#[test]
fn test_first_file_wins_for_duplicate_stems() {
    let tree = TempTree::new();
    tree.file("app.json", r#"{"from": "json"}"#);
    tree.file("app.yaml", "from: yaml\n");
    let conf = config::load_directory(tree.root()).unwrap();
    assert_eq!(conf["app"]["from"], json!("json"));
}

#[test]
fn test_global_tree() {
    let tree = TempTree::new();
    tree.file("site.yaml", "name: demo\n");
    let reg = Registry::new(Namespace::builder().build().unwrap());

    let loaded = config::init_global(tree.root()).unwrap();
    assert_eq!(loaded["site"]["name"], "demo");
    assert_eq!(
        reg.conf::<str>(Some("site.name"), None).unwrap(),
        json!("demo")
    );

    // a second initialisation keeps the first tree
    let other = TempTree::new();
    other.file("site.yaml", "name: other\n");
    let kept = config::init_global(other.root()).unwrap();
    assert_eq!(kept["site"]["name"], "demo");
}

#[test]
fn test_package_conf_outside_package() {
    let mut ns = Namespace::builder();
    ns.container("loose").function("f", |_| Ok(json!(null)));
    let reg = Registry::new(ns.build().unwrap());
    assert!(matches!(
        reg.conf(Some("x"), Some("loose.f")),
        Err(Error::OutsidePackage { .. })
    ));
}
