//! Permissive transport: `{method, params?, ...}` in, bare result out.
//!
//! Errors are returned as `{code, message, data: {status}}` with the mapped
//! HTTP status. Stray top-level fields are folded into the parameters for
//! clients that never learned to nest them under `params`.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{OriginalUri, State},
    http::HeaderMap,
    Json,
};
use serde_json::{Map, Value};

use crate::errors::McpError;
use crate::mcp::dispatch::BUILTIN_METHODS;
use crate::middleware::gate::Credentials;
use crate::AppState;

/// A parsed permissive-transport call.
#[derive(Debug, Clone, PartialEq)]
pub struct StdioCall {
    pub method: String,
    pub params: Value,
}

/// Parse a request body. Explicit `params` keys win over stray siblings.
pub fn parse_call(body: &[u8]) -> Result<StdioCall, McpError> {
    let invalid = || McpError::InvalidRequest("Invalid request body.".to_string());
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(invalid());
    }
    let Ok(Value::Object(mut map)) = serde_json::from_slice::<Value>(body) else {
        return Err(invalid());
    };

    let method = match map.remove("method") {
        Some(Value::String(m)) if !m.is_empty() => m,
        _ => return Err(McpError::InvalidRequest("Missing required parameter: method".to_string())),
    };

    let mut params = match map.remove("params") {
        Some(Value::Object(p)) => p,
        _ => Map::new(),
    };
    for (key, value) in map {
        if key == "jsonrpc" || key == "id" {
            continue;
        }
        params.entry(key).or_insert(value);
    }

    Ok(StdioCall {
        method,
        params: Value::Object(params),
    })
}

pub async fn handle(
    State(state): State<Arc<AppState>>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, McpError> {
    state.permissive.ensure_enabled().await?;
    let call = parse_call(&body)?;

    let principal = state
        .permissive
        .check(uri.path(), &Credentials::from_headers(&headers))
        .await?
        .ok_or_else(|| anyhow::anyhow!("permissive transport mounted outside the MCP namespace"))?;

    match state.dispatcher.dispatch(&call.method, call.params, &principal).await {
        Ok(result) => Ok(Json(result)),
        Err(McpError::InvalidMethod(message)) => {
            tracing::debug!(method = %call.method, "unknown method on permissive transport");
            Err(McpError::InvalidMethod(format!(
                "{} [DEBUG: method='{}', available={}]",
                message,
                call.method,
                BUILTIN_METHODS.join(",")
            )))
        }
        Err(e) => Err(e),
    }
}
