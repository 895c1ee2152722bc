//! Request dispatch through mounted endpoint trees.
//!
//! Covers endpoint selection (defaults, named endpoints, re-exports and
//! redirects), method gating, the `?*` / `?**` markers, request inclusion,
//! throttle scopes and endpoint permissions.

use std::collections::HashMap;

use http::Method;
use nsrouter::dispatcher::{Dispatcher, Request, StatusCategory};
use nsrouter::endpoint::{Endpoint, RequiredFields};
use nsrouter::ids::RequestId;
use nsrouter::namespace::Namespace;
use nsrouter::permissions::{IsAuthenticated, Requester};
use serde_json::{json, Value};
use std::sync::Arc;

mod common;
use common::fixtures;

fn blog_dispatcher() -> Dispatcher {
    let mut ns = Namespace::builder();
    ns.container("api.posts")
        .endpoint(
            "list",
            Endpoint::get(|_| Ok(json!(["first", "second"])))
                .as_default()
                .doc("List posts\nNewest first."),
        )
        .endpoint(
            "create",
            Endpoint::post(|c| Ok(json!({ "created": c.str_param("title")? })))
                .binder(RequiredFields::new(&["title"]))
                .throttle("burst"),
        )
        .function("count", |_| Ok(json!(2)))
        .reexport("tags", "lib.shared.tags");
    ns.container("lib.shared")
        .endpoint("tags", Endpoint::get(|_| Ok(json!(["rust"]))));
    ns.container("api.admin.users.manage").endpoint(
        "ban",
        Endpoint::post(|c| Ok(json!({ "banned": c.str_param("user")? })))
            .requires(Arc::new(IsAuthenticated)),
    );
    ns.container("api.pair")
        .endpoint("one", Endpoint::get(|_| Ok(json!(1))))
        .endpoint("two", Endpoint::get(|_| Ok(json!(2))));
    ns.container("api.echo").endpoint(
        "show",
        Endpoint::new([Method::GET, Method::POST], |c| {
            Ok(c.param("request").cloned().unwrap_or(Value::Null))
        })
        .include_request("request"),
    );
    ns.container("api.old");
    ns.container("api.older");
    ns.container("api.loop_a");
    ns.container("api.loop_b");

    let d = fixtures::dispatcher(ns);
    let reg = d.registry();
    reg.redirect(&[Method::GET], "api.older", "api.old").unwrap();
    reg.redirect(&[Method::GET], "api.old", "api.posts").unwrap();
    reg.redirect(&[Method::GET], "api.loop_a", "api.loop_b").unwrap();
    reg.redirect(&[Method::GET], "api.loop_b", "api.loop_a").unwrap();

    let mut d = d.with_throttle_rates(HashMap::from([("burst".to_string(), "60/min".to_string())]));
    d.mount("/v1", "api").unwrap();
    d
}

#[test]
fn test_container_answers_with_default_endpoint() {
    let d = blog_dispatcher();
    let r = d.handle(&Request::get("/v1/posts"));
    assert_eq!(r.status, 200);
    assert_eq!(r.body, json!({ "data": ["first", "second"] }));
    assert_eq!(r.category(), StatusCategory::Success);
}

#[test]
fn test_get_only_endpoint_rejects_post() {
    let d = blog_dispatcher();
    assert_eq!(d.handle(&Request::post("/v1/posts")).status, 405);
    assert_eq!(d.handle(&Request::post("/v1/posts/list")).status, 405);
    assert_eq!(d.handle(&Request::get("/v1/posts/create")).status, 405);
}

#[test]
fn test_named_endpoint_and_missing_fields() {
    let d = blog_dispatcher();
    let ok = d.handle(&Request::post("/v1/posts/create").with_body(json!({ "title": "Hello" })));
    assert_eq!(ok.status, 200);
    assert_eq!(ok.body["data"]["created"], "Hello");

    let missing = d.handle(&Request::post("/v1/posts/create"));
    assert_eq!(missing.status, 400);
    assert_eq!(missing.body["missing"], json!(["title"]));
}

#[test]
fn test_body_fields_override_query_fields() {
    let d = blog_dispatcher();
    let r = d.handle(
        &Request::post("/v1/posts/create")
            .with_query("title", "from query")
            .with_body(json!({ "title": "from body" })),
    );
    assert_eq!(r.body["data"]["created"], "from body");
}

#[test]
fn test_plain_function_is_not_an_endpoint() {
    let d = blog_dispatcher();
    let r = d.handle(&Request::get("/v1/posts/count"));
    assert_eq!(r.status, 403);
    assert!(r.body["detail"].as_str().unwrap().contains("count"));
}

#[test]
fn test_reexported_endpoint_is_reachable() {
    let d = blog_dispatcher();
    let r = d.handle(&Request::get("/v1/posts/tags"));
    assert_eq!(r.status, 200);
    assert_eq!(r.body, json!({ "data": ["rust"] }));
}

#[test]
fn test_unknown_branch_is_not_found() {
    let d = blog_dispatcher();
    assert_eq!(d.handle(&Request::get("/v1/nope/deeper")).status, 404);
    assert_eq!(d.handle(&Request::get("/v1/posts/nope")).status, 403);
}

#[test]
fn test_ambiguous_container_is_forbidden() {
    let d = blog_dispatcher();
    let r = d.handle(&Request::get("/v1/pair"));
    assert_eq!(r.status, 403);
    let detail = r.body["detail"].as_str().unwrap();
    assert!(detail.contains("one") && detail.contains("two"));
    assert_eq!(d.handle(&Request::get("/v1/pair/two")).body, json!({ "data": 2 }));
}

#[test]
fn test_redirect_chain_reaches_default_endpoint() {
    let d = blog_dispatcher();
    let r = d.handle(&Request::get("/v1/older"));
    assert_eq!(r.status, 200);
    assert_eq!(r.body, json!({ "data": ["first", "second"] }));

    // no POST redirect registered
    assert_eq!(d.handle(&Request::post("/v1/old")).status, 403);
}

#[test]
fn test_redirect_cycle_is_server_error() {
    let d = blog_dispatcher();
    let r = d.handle(&Request::get("/v1/loop_a"));
    assert_eq!(r.status, 500);
    assert!(r.body["detail"].as_str().unwrap().contains("cycle"));
}

#[test]
fn test_resolve_endpoint_directly() {
    let d = blog_dispatcher();
    let branch = nsrouter::NamespacePath::parse("api.older").unwrap();
    let leaf = d.resolve_endpoint(&Method::GET, &branch).unwrap();
    assert_eq!(leaf.path().to_string(), "api.posts.list");
}

#[test]
fn test_help_marker_describes_selected_endpoint() {
    let d = blog_dispatcher();
    let full = d.handle(&Request::get("/v1/posts").with_query_string("*"));
    assert_eq!(full.status, 200);
    assert_eq!(full.body["help"]["path"], "api.posts.list");
    assert_eq!(full.body["help"]["doc"], "List posts\nNewest first.");

    let brief = d.handle(&Request::get("/v1/posts").with_query_string("*&brief"));
    assert_eq!(brief.body["help"]["name"], "list");
    assert_eq!(brief.body["help"]["doc"], "List posts");
    assert!(brief.body["help"].get("path").is_none());
}

fn endpoint_names(tree: &Value, out: &mut Vec<String>) {
    if let Value::Object(map) = tree {
        for (key, value) in map {
            if key == "*" {
                for ep in value.as_array().into_iter().flatten() {
                    out.push(ep["name"].as_str().unwrap_or_default().to_string());
                }
            } else {
                endpoint_names(value, out);
            }
        }
    }
    out.sort();
}

#[test]
fn test_tree_marker_and_reduce_keep_endpoint_set() {
    let d = blog_dispatcher();
    let full = d.handle(&Request::get("/v1").with_query_string("**"));
    assert_eq!(full.status, 200);
    let tree = &full.body["api"];
    assert!(tree["admin"]["users"]["manage"]["*"].is_array());

    let reduced = d.handle(&Request::get("/v1").with_query_string("**&reduce"));
    let reduced_tree = &reduced.body["api"];
    assert!(reduced_tree["admin/users/manage"]["*"].is_array());
    assert!(reduced_tree.get("admin").is_none());

    let mut before = Vec::new();
    endpoint_names(tree, &mut before);
    let mut after = Vec::new();
    endpoint_names(reduced_tree, &mut after);
    assert_eq!(before, after);
    assert!(before.contains(&"ban".to_string()));
}

#[test]
fn test_endpoint_permissions() {
    let d = blog_dispatcher();
    let anon = d.handle(&Request::post("/v1/admin/users/manage").with_query("user", "troll"));
    assert_eq!(anon.status, 403);
    assert_eq!(anon.body["detail"], "Permission required");

    let r = d.handle(
        &Request::post("/v1/admin/users/manage")
            .with_query("user", "troll")
            .with_requester(Requester::user("ann")),
    );
    assert_eq!(r.status, 200);
    assert_eq!(r.body["data"]["banned"], "troll");
}

#[test]
fn test_include_request_injects_details() {
    let d = blog_dispatcher();
    let id = RequestId::new();
    let r = d.handle(
        &Request::get("/v1/echo")
            .with_requester(Requester::user("ann"))
            .with_request_id(id),
    );
    assert_eq!(r.status, 200);
    let injected = &r.body["data"];
    assert_eq!(injected["method"], "GET");
    assert_eq!(injected["path"], "/v1/echo");
    assert_eq!(injected["user"], "ann");
    assert_eq!(injected["request_id"], id.to_string());
}

#[test]
fn test_throttle_scope_only_for_known_classes() {
    let d = blog_dispatcher();
    let r = d.handle(&Request::post("/v1/posts/create").with_query("title", "t"));
    assert_eq!(r.throttle_scope.as_deref(), Some("burst"));
    let r = d.handle(&Request::get("/v1/posts"));
    assert_eq!(r.throttle_scope, None);
}

#[test]
fn test_percent_encoded_segments() {
    let d = blog_dispatcher();
    let r = d.handle(&Request::get("/v1/%70osts"));
    assert_eq!(r.status, 200);
}

#[test]
fn test_shared_dispatcher_across_threads() {
    // nothing is loaded yet, so the threads also race on first loads
    let d = Arc::new(blog_dispatcher());
    let workers: Vec<_> = (0..16)
        .map(|_| {
            let d = Arc::clone(&d);
            std::thread::spawn(move || {
                (0..8)
                    .map(|_| d.handle(&Request::get("/v1/posts")))
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    for worker in workers {
        for r in worker.join().unwrap() {
            assert_eq!(r.status, 200);
            assert_eq!(r.body, json!({ "data": ["first", "second"] }));
        }
    }
}
