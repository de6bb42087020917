//! Streamable HTTP transport: JSON-RPC 2.0 envelopes and batches.
//!
//! Transport violations (headers, JSON, envelope shape) answer 400. Method
//! failures are returned in-band as `error` envelopes with status 200.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{OriginalUri, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;

use super::STREAMABLE_PATH;
use crate::errors::McpError;
use crate::mcp::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, INVALID_REQUEST, PARSE_ERROR};
use crate::middleware::gate::Credentials;
use crate::AppState;

pub const SESSION_HEADER: &str = "mcp-session-id";

const ALLOWED_METHODS: &str = "POST, OPTIONS";
const ALLOWED_HEADERS: &str = "content-type, authorization, accept, mcp-session-id";

pub fn router() -> Router<Arc<AppState>> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            HeaderName::from_static(SESSION_HEADER),
        ])
        .expose_headers([HeaderName::from_static(SESSION_HEADER)]);

    // CorsLayer only advertises methods and headers on preflights; every
    // response on this endpoint carries them.
    Router::new()
        .route(STREAMABLE_PATH, post(handle).options(preflight))
        .layer(cors)
        .layer(SetResponseHeaderLayer::if_not_present(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOWED_HEADERS),
        ))
}

/// Keeps `OPTIONS` routable; the CORS layer answers preflights itself.
async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// Transport-level rejection: an error envelope with a null id.
fn reject(status: StatusCode, code: i64, message: impl Into<String>) -> Response {
    let error = JsonRpcError {
        code,
        message: message.into(),
        data: None,
    };
    (status, Json(JsonRpcResponse::failure(Value::Null, error))).into_response()
}

fn reject_with(err: McpError) -> Response {
    reject(err.status(), err.rpc_code(), err.client_message())
}

fn media_type(value: &str) -> &str {
    value.split(';').next().unwrap_or("").trim()
}

fn check_headers(headers: &HeaderMap) -> Result<(), Response> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(media_type)
        .unwrap_or("");
    if !content_type.eq_ignore_ascii_case("application/json") {
        return Err(reject(
            StatusCode::BAD_REQUEST,
            INVALID_REQUEST,
            "Invalid Content-Type header. Expected application/json.",
        ));
    }

    let accepted: Vec<String> = headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|v| media_type(v).to_ascii_lowercase())
        .collect();
    let accepts = |mime: &str| accepted.iter().any(|a| a == mime);
    if !accepts("application/json") || !accepts("text/event-stream") {
        return Err(reject(
            StatusCode::BAD_REQUEST,
            INVALID_REQUEST,
            "Invalid Accept header. Must accept both application/json and text/event-stream.",
        ));
    }
    Ok(())
}

/// Decoded body: one envelope or a batch, in input order.
#[derive(Debug)]
pub enum Payload {
    Single(JsonRpcRequest),
    Batch(Vec<JsonRpcRequest>),
}

pub fn parse_payload(body: &[u8]) -> Result<Payload, (i64, String)> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| (PARSE_ERROR, format!("Parse error: invalid JSON ({})", e)))?;

    let invalid = |msg: &str| (INVALID_REQUEST, msg.to_string());
    match value {
        Value::Object(_) => JsonRpcRequest::from_value(value)
            .map(Payload::Single)
            .map_err(invalid),
        Value::Array(items) if !items.is_empty() => items
            .into_iter()
            .map(JsonRpcRequest::from_value)
            .collect::<Result<Vec<_>, _>>()
            .map(Payload::Batch)
            .map_err(invalid),
        Value::Array(_) => Err(invalid("Invalid Request: empty batch.")),
        _ => Err(invalid("Invalid Request: expected an object or an array of objects.")),
    }
}

pub async fn handle(
    State(state): State<Arc<AppState>>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(e) = state.strict.ensure_enabled().await {
        return reject_with(e);
    }
    if let Err(resp) = check_headers(&headers) {
        return resp;
    }
    let payload = match parse_payload(&body) {
        Ok(p) => p,
        Err((code, message)) => return reject(StatusCode::BAD_REQUEST, code, message),
    };

    let principal = match state
        .strict
        .check(uri.path(), &Credentials::from_headers(&headers))
        .await
    {
        Ok(Some(p)) => p,
        Ok(None) => {
            return reject_with(McpError::Internal(anyhow::anyhow!(
                "streamable transport mounted outside the MCP namespace"
            )))
        }
        Err(e) => {
            if e.is_auth_failure() {
                tracing::warn!(code = e.code(), "streamable request rejected by gate");
            }
            return reject_with(e);
        }
    };

    let (requests, is_batch) = match payload {
        Payload::Single(r) => (vec![r], false),
        Payload::Batch(items) => (items, true),
    };

    let mut initialized = false;
    let mut responses = Vec::with_capacity(requests.len());
    for req in requests {
        let outcome = state
            .dispatcher
            .dispatch(&req.method, req.params, &principal)
            .await;
        let Some(id) = req.id else {
            if let Err(e) = outcome {
                tracing::debug!(method = %req.method, error = %e, "notification failed");
            }
            continue;
        };
        if req.method == "initialize" && outcome.is_ok() {
            initialized = true;
        }
        responses.push(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(e) => JsonRpcResponse::failure(id, e.to_rpc_error()),
        });
    }

    tracing::debug!(batch = is_batch, responses = responses.len(), "streamable request handled");

    let mut resp = match responses.len() {
        0 => return StatusCode::ACCEPTED.into_response(),
        // a batch with a single response is unwrapped to a bare envelope
        1 => Json(responses.remove(0)).into_response(),
        _ => Json(responses).into_response(),
    };
    if initialized {
        let session = uuid::Uuid::new_v4().to_string();
        if let Ok(value) = HeaderValue::from_str(&session) {
            resp.headers_mut().insert(SESSION_HEADER, value);
        }
    }
    resp
}
