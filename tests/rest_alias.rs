//! Rest-alias tools, the REST CRUD switch and the feature adapter, end to end
//! against a mocked upstream.

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::{json, Value};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::*;
use gateway::directory::builtin::{hash_password, UserRecord};
use gateway::manifest::Manifest;
use gateway::mcp::builtin::gateway_features;
use gateway::mcp::features::FeatureAdapter;
use gateway::mcp::rest_crud::RestCrudTools;
use gateway::mcp::Initializer;
use gateway::middleware::rbac::Role;
use gateway::models::settings::Settings;
use gateway::rest::upstream::{HttpRestRouter, ACTING_USER_HEADER};
use gateway::rest::RestRouter;

const MANIFEST: &str = r#"
version: "1"
routes:
  - method: GET
    path: /wp/v2/posts
    description: List posts
  - method: POST
    path: /wp/v2/posts
    capability: publish_content
  - method: DELETE
    path: /wp/v2/posts/(?P<id>[\d]+)
    capability: delete_content
tools:
  - name: list_posts
    description: List posts
    type: read
    method: GET
    route: /wp/v2/posts
  - name: create_post
    description: Create a post
    type: create
    method: POST
    route: /wp/v2/posts
  - name: delete_post
    description: Delete a post
    type: delete
    method: DELETE
    route: /wp/v2/posts/(?P<id>[\d]+)
    input_schema:
      type: object
      properties:
        id: { type: integer }
      required: [id]
resources:
  - uri: mcp://site/about
    name: About
    mime_type: text/plain
    text: A demo site
prompts:
  - name: greet
    arguments:
      - { name: who, required: true }
    messages:
      - { role: user, text: "Say hello to {{who}}" }
"#;

async fn upstream_harness(server: &MockServer, settings: Settings) -> Harness {
    let manifest = Manifest::from_yaml_str(MANIFEST).unwrap();
    let routes: Arc<dyn RestRouter> = Arc::new(
        HttpRestRouter::new(&server.uri(), manifest.routes.clone(), Some("upstream-secret".into())).unwrap(),
    );
    let initializers: Vec<Arc<dyn Initializer>> = vec![
        Arc::new(RestCrudTools::new(routes.clone())),
        Arc::new(FeatureAdapter::new(Arc::new(gateway_features()))),
        Arc::new(manifest),
    ];
    harness_with(settings, routes, initializers).await
}

fn tool_names(reply: &Reply) -> Vec<String> {
    reply.json()["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap().to_string())
        .collect()
}

fn call(name: &str, arguments: Value) -> Value {
    json!({"method": "tools/call", "name": name, "arguments": arguments})
}

#[tokio::test]
async fn test_rest_alias_forwards_to_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wp/v2/posts"))
        .and(query_param("per_page", "2"))
        .and(header(ACTING_USER_HEADER, "2"))
        .and(header("authorization", "Bearer upstream-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}, {"id": 2}])))
        .expect(1)
        .mount(&server)
        .await;

    let h = upstream_harness(&server, enabled()).await;
    let reply = h
        .stdio(
            Some(&basic("editor", EDITOR_PASSWORD)),
            call("list_posts", json!({"per_page": 2})),
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    let text = reply.json()["content"][0]["text"].as_str().unwrap().to_string();
    let posts: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(posts, json!([{"id": 1}, {"id": 2}]));
}

#[tokio::test]
async fn test_path_parameters_and_capabilities() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/wp/v2/posts/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"deleted": true})))
        .expect(1)
        .mount(&server)
        .await;

    let settings = Settings {
        enable_delete_tools: true,
        ..enabled()
    };
    let h = upstream_harness(&server, settings).await;
    h.directory.insert(UserRecord {
        id: 3,
        login: "reader".into(),
        display_name: None,
        role: Role::Subscriber,
        password_hash: Some(hash_password("reader pw")),
    });

    let reply = h
        .stdio(Some(&basic("reader", "reader pw")), call("delete_post", json!({"id": 42})))
        .await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert_eq!(reply.json()["code"], "rest_forbidden");

    let reply = h
        .stdio(Some(&basic("admin", ADMIN_PASSWORD)), call("delete_post", json!({"id": "x"})))
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let reply = h
        .stdio(Some(&basic("admin", ADMIN_PASSWORD)), call("delete_post", json!({"id": 42})))
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json()["content"][0]["text"], r#"{"deleted":true}"#);
}

#[tokio::test]
async fn test_upstream_failure_is_tool_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/wp/v2/posts"))
        .and(body_json(json!({"title": "Hello"})))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"code": "rest_invalid", "message": "Title too short"})),
        )
        .mount(&server)
        .await;

    let settings = Settings {
        enable_create_tools: true,
        ..enabled()
    };
    let h = upstream_harness(&server, settings).await;
    let reply = h
        .stdio(Some(&basic("editor", EDITOR_PASSWORD)), call("create_post", json!({"title": "Hello"})))
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json()["isError"], true);
    let text = reply.json()["content"][0]["text"].as_str().unwrap().to_string();
    assert!(text.contains("400"));
    assert!(text.contains("Title too short"));
}

#[tokio::test]
async fn test_rest_crud_switch_swaps_tool_sets() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wp/v2/posts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let h = upstream_harness(&server, enabled()).await;
    let admin = basic("admin", ADMIN_PASSWORD);

    let names = tool_names(&h.stdio(Some(&admin), json!({"method": "tools/list"})).await);
    assert!(names.contains(&"list_posts".to_string()));
    assert!(!names.contains(&"run_api_function".to_string()));

    let settings = Settings {
        enable_rest_api_crud_tools: true,
        ..enabled()
    };
    settings.save(h.store.as_ref()).await.unwrap();

    let names = tool_names(&h.stdio(Some(&admin), json!({"method": "tools/list"})).await);
    assert!(!names.contains(&"list_posts".to_string()));
    assert!(names.contains(&"list_api_functions".to_string()));
    assert!(names.contains(&"get_function_details".to_string()));
    assert!(names.contains(&"run_api_function".to_string()));

    let reply = h.stdio(Some(&admin), call("list_posts", json!({}))).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let reply = h.stdio(Some(&admin), call("list_api_functions", json!({}))).await;
    let text = reply.json()["content"][0]["text"].as_str().unwrap().to_string();
    let listed: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 3);

    let reply = h
        .stdio(
            Some(&admin),
            call("get_function_details", json!({"route": "/wp/v2/posts/7", "method": "DELETE"})),
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.json()["content"][0]["text"]
        .as_str()
        .unwrap()
        .contains("delete_content"));

    let reply = h
        .stdio(
            Some(&admin),
            call("run_api_function", json!({"route": "/wp/v2/posts", "method": "GET"})),
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json()["content"][0]["text"], "[]");

    // category switches still apply through the generic runner
    let reply = h
        .stdio(
            Some(&admin),
            call("run_api_function", json!({"route": "/wp/v2/posts/7", "method": "DELETE"})),
        )
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let reply = h
        .stdio(
            Some(&admin),
            call("run_api_function", json!({"route": "/wp/v2/missing", "method": "GET"})),
        )
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(reply.json()["message"].as_str().unwrap().contains("does not exist"));

    let reply = h
        .stdio(
            Some(&admin),
            call("run_api_function", json!({"route": "/wp/v2/posts", "method": "TRACE"})),
        )
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_manifest_resources_and_prompts() {
    let server = MockServer::start().await;
    let h = upstream_harness(&server, enabled()).await;
    let auth = basic("editor", EDITOR_PASSWORD);

    let reply = h.stdio(Some(&auth), json!({"method": "resources/list"})).await;
    assert_eq!(reply.json()["resources"][0]["uri"], "mcp://site/about");

    let reply = h
        .stdio(Some(&auth), json!({"method": "resources/read", "uri": "mcp://site/about"}))
        .await;
    assert_eq!(reply.json()["contents"][0]["text"], "A demo site");

    let reply = h
        .stdio(
            Some(&auth),
            json!({"method": "prompts/get", "name": "greet", "arguments": {"who": "Ada"}}),
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json()["messages"][0]["content"]["text"], "Say hello to Ada");

    let reply = h
        .stdio(Some(&auth), json!({"method": "prompts/get", "name": "greet"}))
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_feature_adapter_follows_setting_at_startup() {
    let server = MockServer::start().await;

    let h = upstream_harness(&server, enabled()).await;
    let names = tool_names(
        &h.stdio(Some(&basic("admin", ADMIN_PASSWORD)), json!({"method": "tools/list"}))
            .await,
    );
    assert!(!names.iter().any(|n| n.starts_with("wp_feature_")));

    let settings = Settings {
        features_adapter_enabled: true,
        ..enabled()
    };
    let h = upstream_harness(&server, settings).await;
    let reply = h
        .stdio(
            Some(&basic("editor", EDITOR_PASSWORD)),
            call("wp_feature_gateway/info", json!({})),
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    let text = reply.json()["content"][0]["text"].as_str().unwrap().to_string();
    let info: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(info["name"], env!("CARGO_PKG_NAME"));
}
