//! End-to-end tests over real HTTP.

mod common;

use std::collections::BTreeMap;

use serde_json::json;
use service_gateway::module::{ModuleContext, ModuleExports};
use service_gateway::routing::{RouteCollection, RouteEntry};

use common::{start_gateway, write_file, AUTH_MANIFEST, USERS_MANIFEST};

const CONFIG: &str = r#"
[gateway]
debug = true
admin_token = "secret"
version = "3.1.0"

[services.user_service]
log_level = "INFO"

[[mounts]]
service_name = "user_service"
module_path = "services/users.toml"
url_prefix = "/users"
exclude_endpoints = ["/admin"]

[[mounts]]
service_name = "auth_service"
module_path = "services/auth.toml"
url_prefix = "/auth"
tags = ["Authentication"]
include_endpoints = ["/login", "/logout"]

[[mounts]]
service_name = "orders"
module_path = "services/orders.toml"
"#;

fn service_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "services/users.toml", USERS_MANIFEST);
    write_file(dir.path(), "services/auth.toml", AUTH_MANIFEST);
    dir
}

#[tokio::test]
async fn test_mounted_services_are_served_under_their_prefix() {
    let gw = start_gateway(service_dir(), CONFIG, BTreeMap::new(), |_| {}).await.unwrap();

    let (status, body) = gw.get("/users/").await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({ "users": ["alice", "bob"] }));

    let (status, body) = gw.get("/users/profile").await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({ "service": "user_service", "path": "/profile" }));

    let (status, body) = gw.post("/auth/login", None).await;
    assert_eq!(status, 200);
    assert_eq!(body["token"], "t");

    gw.stop().await;
}

#[tokio::test]
async fn test_filtered_endpoints_are_not_reachable() {
    let gw = start_gateway(service_dir(), CONFIG, BTreeMap::new(), |_| {}).await.unwrap();

    let (status, body) = gw.get("/users/admin").await;
    assert_eq!(status, 404);
    assert_eq!(body["error"], "Not Found");
    assert_eq!(body["path"], "/users/admin");

    let (status, _) = gw.get("/auth/debug").await;
    assert_eq!(status, 404);

    // Method not declared by the route.
    let res = gw.request(reqwest::Method::GET, "/auth/login").await;
    assert_eq!(res.status().as_u16(), 405);

    gw.stop().await;
}

#[tokio::test]
async fn test_unknown_path_gets_json_404() {
    let gw = start_gateway(service_dir(), CONFIG, BTreeMap::new(), |_| {}).await.unwrap();

    let (status, body) = gw.get("/nowhere").await;
    assert_eq!(status, 404);
    assert_eq!(
        body,
        json!({
            "error": "Not Found",
            "message": "The requested resource was not found",
            "path": "/nowhere",
        })
    );

    gw.stop().await;
}

#[tokio::test]
async fn test_failed_service_does_not_affect_others() {
    let gw = start_gateway(service_dir(), CONFIG, BTreeMap::new(), |_| {}).await.unwrap();

    let (_, info) = gw.get("/").await;
    assert_eq!(info["version"], "3.1.0");
    assert_eq!(
        info["services"],
        json!({ "user_service": "loaded", "auth_service": "loaded", "orders": "failed" })
    );

    let (status, health) = gw.get("/health").await;
    assert_eq!(status, 200);
    assert_eq!(health["status"], "degraded");
    assert_eq!(health["gateway"], "operational");
    assert_eq!(health["services"]["orders"], "unhealthy");

    let (_, status) = gw.get("/gateway/status").await;
    assert_eq!(status["router_status"]["total_loaded"], 2);
    assert_eq!(status["router_status"]["total_failed"], 1);
    assert!(status["router_status"]["failed_loads"]["orders"]
        .as_str()
        .unwrap()
        .contains("services/orders.toml"));
    assert_eq!(status["service_configs"]["user_service"], true);
    assert_eq!(status["service_configs"]["auth_service"], false);
    assert_eq!(status["gateway_config"]["admin_token"], "********");

    let (status, _) = gw.get("/orders/anything").await;
    assert_eq!(status, 404);

    gw.stop().await;
}

#[tokio::test]
async fn test_service_listing() {
    let gw = start_gateway(service_dir(), CONFIG, BTreeMap::new(), |_| {}).await.unwrap();

    let (_, listing) = gw.get("/gateway/services").await;
    let services = listing["services"].as_array().unwrap();
    assert_eq!(services.len(), 3);

    let auth = services.iter().find(|s| s["name"] == "auth_service").unwrap();
    assert_eq!(auth["prefix"], "/auth");
    assert_eq!(auth["tags"], json!(["Authentication"]));
    assert_eq!(auth["included_endpoints"], json!(["/login", "/logout"]));
    assert_eq!(auth["endpoints"], json!(["/login", "/logout"]));

    let orders = services.iter().find(|s| s["name"] == "orders").unwrap();
    assert_eq!(orders["prefix"], "/orders");
    assert_eq!(orders["tags"], json!(["Orders"]));
    assert_eq!(orders["mounted"], false);

    gw.stop().await;
}

#[tokio::test]
async fn test_request_id_is_set_and_propagated() {
    let gw = start_gateway(service_dir(), CONFIG, BTreeMap::new(), |_| {}).await.unwrap();

    let res = gw.request(reqwest::Method::GET, "/health").await;
    let generated = res.headers().get("x-request-id").unwrap().to_str().unwrap();
    assert!(uuid::Uuid::parse_str(generated).is_ok());

    let res = reqwest::Client::new()
        .get(gw.url("/users/"))
        .header("x-request-id", "abc-123")
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()["x-request-id"], "abc-123");

    gw.stop().await;
}

#[tokio::test]
async fn test_management_requires_token() {
    let gw = start_gateway(service_dir(), CONFIG, BTreeMap::new(), |_| {}).await.unwrap();

    let (status, body) = gw.post("/gateway/reload/user_service", None).await;
    assert_eq!(status, 401);
    assert_eq!(body["error"], "Unauthorized");

    let (status, _) = gw.post("/gateway/reload/user_service", Some("nope")).await;
    assert_eq!(status, 401);

    let (status, _) = gw.post("/gateway/config/reload", None).await;
    assert_eq!(status, 401);

    gw.stop().await;
}

#[tokio::test]
async fn test_reload_picks_up_changed_module() {
    let gw = start_gateway(service_dir(), CONFIG, BTreeMap::new(), |_| {}).await.unwrap();

    assert_eq!(gw.get("/users/new").await.0, 404);

    std::fs::write(
        gw.path("services/users.toml"),
        format!("{USERS_MANIFEST}\n[[router.routes]]\npath = \"/new\"\nbody = {{ fresh = true }}\n"),
    )
    .unwrap();

    let (status, body) = gw.post("/gateway/reload/user_service", Some("secret")).await;
    assert_eq!(status, 200);
    assert_eq!(body["service"], "user_service");
    assert_eq!(body["endpoints"], json!(["/", "/profile", "/new"]));

    let (status, body) = gw.get("/users/new").await;
    assert_eq!(status, 200);
    assert_eq!(body["fresh"], true);

    // Still filtered after the reload.
    assert_eq!(gw.get("/users/admin").await.0, 404);

    gw.stop().await;
}

#[tokio::test]
async fn test_failed_reload_keeps_previous_mount() {
    let gw = start_gateway(service_dir(), CONFIG, BTreeMap::new(), |_| {}).await.unwrap();

    std::fs::write(gw.path("services/users.toml"), "this is = = not toml").unwrap();

    let (status, body) = gw.post("/gateway/reload/user_service", Some("secret")).await;
    assert_eq!(status, 500);
    assert!(body["message"].as_str().unwrap().contains("import_failure"));

    let (status, _) = gw.get("/users/").await;
    assert_eq!(status, 200);

    let (_, info) = gw.get("/").await;
    assert_eq!(info["services"]["user_service"], "failed");

    gw.stop().await;
}

#[tokio::test]
async fn test_reload_unknown_service() {
    let gw = start_gateway(service_dir(), CONFIG, BTreeMap::new(), |_| {}).await.unwrap();

    let (status, body) = gw.post("/gateway/reload/ghost", Some("secret")).await;
    assert_eq!(status, 404);
    assert!(body["message"].as_str().unwrap().contains("ghost"));

    gw.stop().await;
}

#[tokio::test]
async fn test_reload_forbidden_without_debug() {
    let config = CONFIG.replace("debug = true", "debug = false");
    let gw = start_gateway(service_dir(), &config, BTreeMap::new(), |_| {}).await.unwrap();

    let (status, body) = gw.post("/gateway/reload/user_service", Some("secret")).await;
    assert_eq!(status, 403);
    assert_eq!(body["error"], "Forbidden");

    let (status, _) = gw.post("/gateway/config/reload", Some("secret")).await;
    assert_eq!(status, 403);

    gw.stop().await;
}

#[tokio::test]
async fn test_config_reload_endpoint() {
    let gw = start_gateway(service_dir(), CONFIG, BTreeMap::new(), |_| {}).await.unwrap();

    std::fs::write(
        gw.path("gateway.toml"),
        CONFIG.replace("[services.user_service]", "[services.auth_service]\nissuer = \"me\"\n\n[services.user_service]"),
    )
    .unwrap();

    let (status, body) = gw.post("/gateway/config/reload", Some("secret")).await;
    assert_eq!(status, 200);
    assert_eq!(body["config_status"]["generation"], 1);

    let (_, status) = gw.get("/gateway/status").await;
    assert_eq!(status["service_configs"]["auth_service"], true);

    gw.stop().await;
}

#[tokio::test]
async fn test_env_overrides_reach_modules() {
    async fn hello() -> &'static str {
        "hello"
    }

    let config = r#"
[gateway]
title = "From file"

[services.greeter]
greeting = "hi"

[[mounts]]
service_name = "greeter"
module_path = "greeter"
router_symbol_name = "api"
"#;
    let env = BTreeMap::from([
        ("GATEWAY_TITLE".to_string(), "From env".to_string()),
        ("GREETER_GREETING".to_string(), "bonjour".to_string()),
    ]);

    let gw = start_gateway(tempfile::tempdir().unwrap(), config, env, |resolver| {
        resolver.register("greeter", |ctx: &ModuleContext| -> anyhow::Result<ModuleExports> {
            let greeting = ctx.config().get_str("greeting").unwrap_or("none").to_string();
            let routes = RouteCollection::try_from_entries([
                RouteEntry::get("/hello", hello)?,
                RouteEntry::new("/greeting", [axum::http::Method::GET], move || {
                    let greeting = greeting.clone();
                    async move { greeting }
                })?,
            ])?;
            Ok(ModuleExports::new().with_routes("api", routes))
        });
    })
    .await
    .unwrap();

    let (_, info) = gw.get("/").await;
    assert_eq!(info["message"], "From env");

    let (status, body) = gw.get("/greeter/greeting").await;
    assert_eq!(status, 200);
    assert_eq!(body, "bonjour");

    let (status, _) = gw.get("/greeter/hello").await;
    assert_eq!(status, 200);

    gw.stop().await;
}

#[tokio::test]
async fn test_invalid_mounts_refuse_to_start() {
    let config = r#"
[[mounts]]
service_name = "a"
module_path = "a.toml"
url_prefix = "/api"

[[mounts]]
service_name = "b"
module_path = "b.toml"
url_prefix = "/api/v2"

[[mounts]]
service_name = "c"
module_path = "c.toml"
url_prefix = "/gateway"
"#;
    let err = start_gateway(tempfile::tempdir().unwrap(), config, BTreeMap::new(), |_| {})
        .await
        .err()
        .unwrap();
    let message = err.to_string();
    assert!(message.contains("/api/v2"));
    assert!(message.contains("/gateway"));
}
