//! Unit tests for CLI commands

use std::fs;

use clap::Parser;
use serde_json::{json, Value};
use tempfile::tempdir;

use crate::cli::{execute, Cli, Commands};
use crate::runtime_config::RuntimeConfig;

fn run(args: &[&str]) -> anyhow::Result<Value> {
    let cli = Cli::try_parse_from(args)?;
    let mut out = Vec::new();
    execute(&cli, &RuntimeConfig::default(), &mut out)?;
    Ok(serde_json::from_slice(&out)?)
}

#[test]
fn test_conf_command_parses() {
    let cli = Cli::try_parse_from(["nsrouter", "conf", "--dir", "conf", "--get", "a.b"]).unwrap();
    match cli.command {
        Commands::Conf { dir, get } => {
            assert_eq!(dir.unwrap().to_string_lossy(), "conf");
            assert_eq!(get.as_deref(), Some("a.b"));
        }
        _ => panic!("Expected Conf command"),
    }
    assert!(!cli.verbose);
}

#[test]
fn test_verbose_is_global() {
    let cli = Cli::try_parse_from(["nsrouter", "packages", "--root", "site", "--verbose"]).unwrap();
    assert!(cli.verbose);
}

#[test]
fn test_conf_lookup_output() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("site.yaml"), "greet:\n  message: Hello!\n").unwrap();
    let d = dir.path().to_str().unwrap();

    let value = run(&["nsrouter", "conf", "--dir", d, "--get", "site.greet"]).unwrap();
    assert_eq!(value, json!({ "message": "Hello!" }));

    let whole = run(&["nsrouter", "conf", "--dir", d]).unwrap();
    assert_eq!(whole["site"]["greet"]["message"], "Hello!");

    assert!(run(&["nsrouter", "conf", "--dir", d, "--get", "site.missing"]).is_err());
}

#[test]
fn test_packages_output() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("blog/conf")).unwrap();
    fs::create_dir_all(root.join("tools/shop")).unwrap();
    fs::write(root.join("blog/package.yaml"), "").unwrap();
    fs::write(root.join("blog/conf/urls.yaml"), "root: /journal/\n").unwrap();
    fs::write(root.join("tools/shop/package.yaml"), "struct: api\n").unwrap();

    let value = run(&["nsrouter", "packages", "--root", root.to_str().unwrap()]).unwrap();
    let list = value.as_array().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["key"], "journal");
    assert_eq!(list[0]["url"], "journal");
    assert_eq!(list[1]["relative"], "tools/shop");
    assert_eq!(list[1]["key"], "tools.shop");
    assert_eq!(list[1]["url"], "tools/shop");
    assert_eq!(list[1]["link"]["struct"], "api");
}

#[test]
fn test_conf_falls_back_to_global_tree() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("site.toml"), "[greet]\nmessage = \"Hi\"\n").unwrap();
    let runtime = RuntimeConfig {
        config_path: Some(dir.path().to_path_buf()),
        ..RuntimeConfig::default()
    };
    let cli = Cli::try_parse_from(["nsrouter", "conf", "--get", "site.greet.message"]).unwrap();
    let mut out = Vec::new();
    execute(&cli, &runtime, &mut out).unwrap();
    let value: Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(value, json!("Hi"));

    let bare = Cli::try_parse_from(["nsrouter", "conf"]).unwrap();
    assert!(execute(&bare, &RuntimeConfig::default(), &mut Vec::new()).is_err());
}
