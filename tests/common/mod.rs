//! Shared harness: in-memory store, a two-user directory and a small catalog.
#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use tower::ServiceExt;

use gateway::config::Config;
use gateway::directory::builtin::{hash_password, StaticDirectory, UserRecord};
use gateway::directory::UserDirectory;
use gateway::mcp::registry::RegistrationError;
use gateway::mcp::tool::{allow_authenticated, handler_fn, require_capability, Category, ToolDescriptor};
use gateway::mcp::{Catalog, Initializer, Registrar};
use gateway::middleware::rbac::{Capability, Role};
use gateway::models::settings::Settings;
use gateway::rest::{NoRoutes, RestRouter};
use gateway::store::memory::MemoryStore;
use gateway::store::KvStore;
use gateway::AppState;

pub const ADMIN_ID: u64 = 1;
pub const EDITOR_ID: u64 = 2;
pub const ADMIN_PASSWORD: &str = "correct horse";
pub const EDITOR_PASSWORD: &str = "battery staple";

pub struct SampleTools;

impl Initializer for SampleTools {
    fn name(&self) -> &str {
        "sample"
    }

    fn register(&self, registrar: &mut Registrar) -> Result<(), RegistrationError> {
        registrar.register_tool(
            ToolDescriptor::new("echo", "Echo the arguments back", Category::Read)
                .input_schema(json!({
                    "type": "object",
                    "properties": { "message": { "type": "string" } },
                    "required": ["message"]
                }))
                .callback(handler_fn(|args| async move { Ok(args) }), allow_authenticated()),
        )?;
        registrar.register_tool(
            ToolDescriptor::new("create_note", "Create a note", Category::Create)
                .callback(
                    handler_fn(|_| async { Ok(json!({ "id": 10 })) }),
                    require_capability(Capability::PublishContent),
                ),
        )?;
        registrar.register_tool(
            ToolDescriptor::new("explode", "Always fails", Category::Read)
                .callback(handler_fn(|_| async { Err::<Value, _>(anyhow::anyhow!("upstream exploded")) }), allow_authenticated()),
        )
    }
}

pub struct Harness {
    pub state: Arc<AppState>,
    pub store: Arc<dyn KvStore>,
    pub directory: Arc<StaticDirectory>,
    pub app: Router,
}

pub fn directory() -> StaticDirectory {
    StaticDirectory::new([
        UserRecord {
            id: ADMIN_ID,
            login: "admin".into(),
            display_name: Some("Site Admin".into()),
            role: Role::Admin,
            password_hash: Some(hash_password(ADMIN_PASSWORD)),
        },
        UserRecord {
            id: EDITOR_ID,
            login: "editor".into(),
            display_name: None,
            role: Role::Editor,
            password_hash: Some(hash_password(EDITOR_PASSWORD)),
        },
    ])
}

pub async fn harness_with(
    settings: Settings,
    routes: Arc<dyn RestRouter>,
    initializers: Vec<Arc<dyn Initializer>>,
) -> Harness {
    let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    settings.save(store.as_ref()).await.unwrap();

    let directory = Arc::new(directory());
    let catalog = Catalog::initialize(store.clone(), routes, &initializers)
        .await
        .unwrap();
    let dyn_directory: Arc<dyn UserDirectory> = directory.clone();
    let state = Arc::new(AppState::new(
        Config::default(),
        store.clone(),
        dyn_directory,
        catalog,
    ));
    Harness {
        app: gateway::api::app(state.clone()),
        state,
        store,
        directory,
    }
}

pub fn enabled() -> Settings {
    Settings {
        enabled: true,
        ..Default::default()
    }
}

pub async fn harness() -> Harness {
    harness_with(enabled(), Arc::new(NoRoutes), vec![Arc::new(SampleTools)]).await
}

pub fn basic(login: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", login, password)))
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub raw: Vec<u8>,
}

impl Reply {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.raw).unwrap_or(Value::Null)
    }
}

impl Harness {
    pub async fn token_for(&self, user_id: u64) -> String {
        self.state.tokens.issue(user_id, None).await.unwrap().token
    }

    pub async fn send(&self, req: Request<Body>) -> Reply {
        let resp = self.app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let raw = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec();
        Reply { status, headers, raw }
    }

    /// POST to the permissive transport.
    pub async fn stdio(&self, auth: Option<&str>, body: Value) -> Reply {
        let mut req = Request::post("/mcp").header("content-type", "application/json");
        if let Some(auth) = auth {
            req = req.header("authorization", auth);
        }
        self.send(req.body(Body::from(body.to_string())).unwrap()).await
    }

    /// POST to the streamable transport with well-formed headers.
    pub async fn streamable(&self, auth: Option<&str>, body: Value) -> Reply {
        let mut req = Request::post("/mcp/streamable")
            .header("content-type", "application/json")
            .header("accept", "application/json, text/event-stream");
        if let Some(auth) = auth {
            req = req.header("authorization", auth);
        }
        self.send(req.body(Body::from(body.to_string())).unwrap()).await
    }
}
