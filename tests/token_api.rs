//! Token issuance, listing and revocation plus the administrative API.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};

use common::*;
use gateway::models::settings::Settings;
use gateway::store::KvStore;
use gateway::tokens::{SECRET_KEY, SECRET_LEN};

fn post_json(path: &str, auth: Option<&str>, body: Value) -> Request<Body> {
    let mut req = Request::post(path).header("content-type", "application/json");
    if let Some(auth) = auth {
        req = req.header("authorization", auth);
    }
    req.body(Body::from(body.to_string())).unwrap()
}

fn get_with(path: &str, auth: &str) -> Request<Body> {
    Request::get(path)
        .header("authorization", auth)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_issue_with_credentials() {
    let h = harness().await;
    let reply = h
        .send(post_json(
            "/auth/v1/token",
            None,
            json!({"username": "editor", "password": EDITOR_PASSWORD, "expires_in": 3600}),
        ))
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    let body = reply.json();
    assert_eq!(body["user_id"], EDITOR_ID);
    assert_eq!(body["expires_in"], 3600);
    assert_eq!(body["token"].as_str().unwrap().split('.').count(), 3);

    let secret = h.store.get(SECRET_KEY).await.unwrap().unwrap();
    assert_eq!(secret.as_str().unwrap().len(), SECRET_LEN);

    // the issued token works on the permissive transport
    let auth = format!("Bearer {}", body["token"].as_str().unwrap());
    let reply = h.stdio(Some(&auth), json!({"method": "ping"})).await;
    assert_eq!(reply.status, StatusCode::OK);
}

#[tokio::test]
async fn test_issue_rejections() {
    let h = harness().await;

    let reply = h
        .send(post_json(
            "/auth/v1/token",
            None,
            json!({"username": "editor", "password": "nope"}),
        ))
        .await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert_eq!(reply.json()["code"], "invalid_credentials");

    let reply = h.send(post_json("/auth/v1/token", None, json!({}))).await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);

    let reply = h
        .send(post_json(
            "/auth/v1/token",
            None,
            json!({"username": "admin", "password": ADMIN_PASSWORD, "expires_in": 1800}),
        ))
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.json()["code"], "rest_invalid_param");

    let reply = h
        .send(post_json(
            "/auth/v1/token",
            None,
            json!({"username": "admin", "password": ADMIN_PASSWORD, "expires_in": 31 * 24 * 3600}),
        ))
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_issue_from_session_default_ttl() {
    let h = harness().await;
    let session = h.directory.open_session(ADMIN_ID).unwrap();
    let req = Request::post("/auth/v1/token")
        .header("cookie", format!("mcp_session={}", session))
        .body(Body::empty())
        .unwrap();
    let reply = h.send(req).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json()["user_id"], ADMIN_ID);
    assert_eq!(reply.json()["expires_in"], 3600);
}

#[tokio::test]
async fn test_issuance_ignores_enabled_switch() {
    let h = harness_with(
        Settings::default(),
        std::sync::Arc::new(gateway::rest::NoRoutes),
        vec![],
    )
    .await;
    let reply = h
        .send(post_json(
            "/auth/v1/token",
            None,
            json!({"username": "admin", "password": ADMIN_PASSWORD}),
        ))
        .await;
    assert_eq!(reply.status, StatusCode::OK);
}

#[tokio::test]
async fn test_list_requires_admin() {
    let h = harness().await;
    h.token_for(EDITOR_ID).await;
    h.token_for(ADMIN_ID).await;

    let reply = h
        .send(get_with("/auth/v1/tokens", &basic("admin", ADMIN_PASSWORD)))
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    let listed = reply.json();
    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().all(|t| t["jti"].as_str().unwrap().len() == 32));
    assert!(listed.iter().all(|t| t["revoked"] == false));
    let users: Vec<&str> = listed
        .iter()
        .map(|t| t["user"]["username"].as_str().unwrap())
        .collect();
    assert!(users.contains(&"admin") && users.contains(&"editor"));

    let reply = h
        .send(get_with("/auth/v1/tokens", &basic("editor", EDITOR_PASSWORD)))
        .await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);

    let reply = h
        .send(Request::get("/auth/v1/tokens").body(Body::empty()).unwrap())
        .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_revoke_flow() {
    let h = harness().await;
    let admin = basic("admin", ADMIN_PASSWORD);
    let token = h.token_for(EDITOR_ID).await;

    let listed = h.send(get_with("/auth/v1/tokens", &admin)).await.json();
    let jti = listed[0]["jti"].as_str().unwrap().to_string();

    let reply = h.send(post_json("/auth/v1/revoke", Some(&admin), json!({}))).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.json()["code"], "missing_jti");

    let reply = h
        .send(post_json("/auth/v1/revoke", Some(&admin), json!({"jti": "unknown"})))
        .await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.json()["code"], "token_not_found");

    let editor = basic("editor", EDITOR_PASSWORD);
    let reply = h
        .send(post_json("/auth/v1/revoke", Some(&editor), json!({"jti": jti})))
        .await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);

    let reply = h
        .send(post_json("/auth/v1/revoke", Some(&admin), json!({"jti": jti})))
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(
        reply.json(),
        json!({"success": true, "message": "Token revoked successfully."})
    );

    let reply = h
        .stdio(Some(&format!("Bearer {}", token)), json!({"method": "ping"}))
        .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.json()["code"], "token_invalid");

    // revoked entries stay listed until they expire
    let listed = h.send(get_with("/auth/v1/tokens", &admin)).await.json();
    assert_eq!(listed[0]["revoked"], true);
}

#[tokio::test]
async fn test_admin_settings() {
    let h = harness().await;
    let admin = basic("admin", ADMIN_PASSWORD);

    let reply = h.send(get_with("/admin/v1/settings", &admin)).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json()["enabled"], true);
    assert_eq!(reply.json()["enable_create_tools"], false);

    let update = Request::put("/admin/v1/settings")
        .header("authorization", &admin)
        .header("content-type", "application/json")
        .body(Body::from(json!({"enable_create_tools": true}).to_string()))
        .unwrap();
    let reply = h.send(update).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json()["enable_create_tools"], true);
    assert_eq!(reply.json()["enabled"], true);

    let bad = Request::put("/admin/v1/settings")
        .header("authorization", &admin)
        .header("content-type", "application/json")
        .body(Body::from(json!({"enable_everything": true}).to_string()))
        .unwrap();
    assert_eq!(h.send(bad).await.status, StatusCode::BAD_REQUEST);

    let reply = h
        .send(get_with("/admin/v1/settings", &basic("editor", EDITOR_PASSWORD)))
        .await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);

    // create tools now appear on the transport
    let reply = h.stdio(Some(&admin), json!({"method": "tools/list"})).await;
    let names: Vec<Value> = reply.json()["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].clone())
        .collect();
    assert!(names.contains(&json!("create_note")));
}

#[tokio::test]
async fn test_admin_tool_toggle() {
    let h = harness().await;
    let admin = basic("admin", ADMIN_PASSWORD);

    let toggle = |name: &str, enabled: bool| {
        Request::put(format!("/admin/v1/tools/{}", name))
            .header("authorization", &admin)
            .header("content-type", "application/json")
            .body(Body::from(json!({ "enabled": enabled }).to_string()))
            .unwrap()
    };

    let reply = h.send(toggle("echo", false)).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json(), json!({"name": "echo", "enabled": false}));

    let reply = h
        .stdio(
            Some(&admin),
            json!({"method": "tools/call", "name": "echo", "arguments": {"message": "x"}}),
        )
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let all = h.send(get_with("/admin/v1/tools", &admin)).await.json();
    let echo = all["tools"]
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["name"] == "echo")
        .unwrap()
        .clone();
    assert_eq!(echo["tool_enabled"], false);
    assert_eq!(echo["tool_type_enabled"], true);

    assert_eq!(h.send(toggle("missing", true)).await.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_route_is_json_404() {
    let h = harness().await;
    let reply = h
        .send(Request::get("/auth/v1/nothing").body(Body::empty()).unwrap())
        .await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.json()["code"], "rest_no_route");
}
