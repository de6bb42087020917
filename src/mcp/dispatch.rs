//! Method routing shared by both transports.

use std::sync::Arc;

use serde_json::{json, Map, Value};

use super::catalog::Catalog;
use super::types::{
    negotiate_protocol_version, Implementation, InitializeResult, ListChanged, ResourcesCapability,
    ServerCapabilities,
};
use crate::errors::McpError;
use crate::middleware::rbac::Principal;

/// Built-in methods, in the order they are advertised in diagnostics.
pub const BUILTIN_METHODS: &[&str] = &[
    "ping",
    "initialize",
    "tools/list",
    "tools/list/all",
    "tools/call",
    "resources/list",
    "resources/read",
    "prompts/list",
    "prompts/get",
];

pub struct Dispatcher {
    catalog: Arc<Catalog>,
    server_info: Implementation,
    instructions: Option<String>,
}

impl Dispatcher {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            server_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            instructions: None,
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Route one call on behalf of an authenticated principal.
    pub async fn dispatch(&self, method: &str, params: Value, principal: &Principal) -> Result<Value, McpError> {
        tracing::debug!(method, user_id = principal.id, "dispatching MCP method");

        match method {
            "ping" => Ok(json!({})),
            "initialize" => self.initialize(&params),
            "tools/list" => self.list_tools(false).await,
            "tools/list/all" => self.list_tools(true).await,
            "tools/call" => self.call_tool(params, principal).await,
            "resources/list" => Ok(self.catalog.resources.list()),
            "resources/read" => {
                let params = object_params(params)?;
                let uri = required_str(&params, "uri")?;
                self.catalog.resources.read(uri, principal).await
            }
            "prompts/list" => Ok(self.catalog.prompts.list()),
            "prompts/get" => {
                let params = object_params(params)?;
                let name = required_str(&params, "name")?;
                let arguments = match params.get("arguments") {
                    Some(Value::Object(map)) => map.clone(),
                    Some(Value::Null) | None => Map::new(),
                    Some(_) => {
                        return Err(McpError::InvalidRequest(
                            "Prompt arguments must be an object.".to_string(),
                        ))
                    }
                };
                self.catalog.prompts.get(name, &arguments)
            }
            m if m.starts_with("notifications/") => Ok(json!({})),
            other => Err(McpError::InvalidMethod(format!("Method not found: {}", other))),
        }
    }

    fn initialize(&self, params: &Value) -> Result<Value, McpError> {
        let requested = params.get("protocolVersion").and_then(Value::as_str);
        let result = InitializeResult {
            protocol_version: negotiate_protocol_version(requested).to_string(),
            capabilities: ServerCapabilities {
                tools: ListChanged::default(),
                resources: ResourcesCapability::default(),
                prompts: ListChanged::default(),
            },
            server_info: self.server_info.clone(),
            instructions: self.instructions.clone(),
        };
        Ok(serde_json::to_value(result).map_err(anyhow::Error::from)?)
    }

    async fn list_tools(&self, include_disabled: bool) -> Result<Value, McpError> {
        let tools = self.catalog.tools.list(include_disabled).await?;
        Ok(json!({ "tools": tools }))
    }

    async fn call_tool(&self, params: Value, principal: &Principal) -> Result<Value, McpError> {
        let mut params = object_params(params)?;
        let name = match params.remove("name") {
            Some(Value::String(name)) if !name.is_empty() => name,
            _ => {
                return Err(McpError::InvalidRequest(
                    "Missing required parameter: name".to_string(),
                ))
            }
        };
        let args = match (params.remove("arguments"), params.remove("args")) {
            (Some(args), _) | (None, Some(args)) => args,
            (None, None) => Value::Object(params),
        };

        let result = self.catalog.tools.invoke(&name, args, principal).await?;
        Ok(serde_json::to_value(result).map_err(anyhow::Error::from)?)
    }
}

fn object_params(params: Value) -> Result<Map<String, Value>, McpError> {
    match params {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        _ => Err(McpError::InvalidRequest(
            "Params must be an object for this method.".to_string(),
        )),
    }
}

fn required_str<'a>(params: &'a Map<String, Value>, key: &str) -> Result<&'a str, McpError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| McpError::InvalidRequest(format!("Missing required parameter: {}", key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::catalog::Registrar;
    use crate::mcp::tool::{allow_authenticated, handler_fn, Category, ToolDescriptor};
    use crate::middleware::rbac::Role;
    use crate::models::settings::Settings;
    use crate::rest::NoRoutes;
    use crate::store::memory::MemoryStore;

    fn dispatcher() -> Dispatcher {
        let mut r = Registrar::new(Settings::default(), Arc::new(NoRoutes));
        r.register_tool(
            ToolDescriptor::new("echo", "Echo arguments", Category::Read)
                .input_schema(json!({
                    "type": "object",
                    "properties": {"word": {"type": "string"}},
                    "required": ["word"]
                }))
                .callback(handler_fn(|args| async move { Ok(args) }), allow_authenticated()),
        )
        .unwrap();
        Dispatcher::new(Arc::new(r.finish(Arc::new(MemoryStore::new()))))
    }

    fn admin() -> Principal {
        Principal::new(1, "admin", "Admin", Role::Admin)
    }

    #[tokio::test]
    async fn test_ping_and_initialize() {
        let d = dispatcher();
        assert_eq!(d.dispatch("ping", json!({}), &admin()).await.unwrap(), json!({}));

        let init = d
            .dispatch("initialize", json!({"protocolVersion": "2024-11-05"}), &admin())
            .await
            .unwrap();
        assert_eq!(init["protocolVersion"], "2024-11-05");
        assert_eq!(init["serverInfo"]["name"], env!("CARGO_PKG_NAME"));
        assert!(init["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let err = dispatcher().dispatch("tools/destroy", json!({}), &admin()).await.unwrap_err();
        assert_eq!(err.code(), "invalid_method");
        assert_eq!(err.to_string(), "Method not found: tools/destroy");
    }

    #[tokio::test]
    async fn test_call_argument_sources() {
        let d = dispatcher();
        let p = admin();

        let explicit = d
            .dispatch("tools/call", json!({"name": "echo", "arguments": {"word": "a"}}), &p)
            .await
            .unwrap();
        assert_eq!(explicit["content"][0]["text"], r#"{"word":"a"}"#);

        let legacy = d
            .dispatch("tools/call", json!({"name": "echo", "args": {"word": "b"}}), &p)
            .await
            .unwrap();
        assert_eq!(legacy["content"][0]["text"], r#"{"word":"b"}"#);

        let inline = d
            .dispatch("tools/call", json!({"name": "echo", "word": "c"}), &p)
            .await
            .unwrap();
        assert_eq!(inline["content"][0]["text"], r#"{"word":"c"}"#);

        let missing = d.dispatch("tools/call", json!({"name": "echo"}), &p).await.unwrap_err();
        assert_eq!(missing.code(), "invalid_request");
        assert!(missing.to_string().contains("word"));

        let unnamed = d.dispatch("tools/call", json!({}), &p).await.unwrap_err();
        assert_eq!(unnamed.code(), "invalid_request");
    }

    #[tokio::test]
    async fn test_notifications_are_accepted() {
        let d = dispatcher();
        assert!(d
            .dispatch("notifications/initialized", Value::Null, &admin())
            .await
            .is_ok());
    }
}
