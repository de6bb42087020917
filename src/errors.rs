use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::mcp::types::JsonRpcError;

pub const MISSING_AUTH_MESSAGE: &str =
    "Authentication required. Please provide a Bearer token or log in as an administrator.";
pub const MALFORMED_AUTH_MESSAGE: &str =
    "Invalid Authorization header format. Expected 'Bearer <token>'.";

/// Errors surfaced to clients of the MCP transports and the token API.
///
/// Every variant carries a stable string `code()`; the HTTP status and the
/// JSON-RPC numeric code are derived from the variant.
#[derive(Debug, Error)]
pub enum McpError {
    #[error("MCP functionality is currently disabled.")]
    Disabled,

    #[error("{0}")]
    Unauthorized(String),

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("{0}")]
    InvalidToken(String),

    #[error("{0}")]
    TokenInvalid(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    InvalidMethod(String),

    #[error("{0}")]
    InvalidParam(String),

    #[error("JTI is required.")]
    MissingJti,

    #[error("Token not found.")]
    TokenNotFound,

    #[error("{0}")]
    Forbidden(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl McpError {
    pub fn status(&self) -> StatusCode {
        match self {
            McpError::Disabled | McpError::InvalidCredentials | McpError::Forbidden(_) => {
                StatusCode::FORBIDDEN
            }
            McpError::Unauthorized(_) | McpError::InvalidToken(_) | McpError::TokenInvalid(_) => {
                StatusCode::UNAUTHORIZED
            }
            McpError::InvalidRequest(_)
            | McpError::InvalidMethod(_)
            | McpError::InvalidParam(_)
            | McpError::MissingJti => StatusCode::BAD_REQUEST,
            McpError::TokenNotFound => StatusCode::NOT_FOUND,
            McpError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            McpError::Disabled => "mcp_disabled",
            McpError::Unauthorized(_) => "unauthorized",
            McpError::InvalidCredentials => "invalid_credentials",
            McpError::InvalidToken(_) => "invalid_token",
            McpError::TokenInvalid(_) => "token_invalid",
            McpError::InvalidRequest(_) => "invalid_request",
            McpError::InvalidMethod(_) => "invalid_method",
            McpError::InvalidParam(_) => "rest_invalid_param",
            McpError::MissingJti => "missing_jti",
            McpError::TokenNotFound => "token_not_found",
            McpError::Forbidden(_) => "rest_forbidden",
            McpError::Internal(_) => "internal_server_error",
        }
    }

    /// Numeric code used inside JSON-RPC error objects.
    pub fn rpc_code(&self) -> i64 {
        match self {
            McpError::InvalidMethod(_) => -32601,
            McpError::InvalidRequest(_) | McpError::InvalidParam(_) | McpError::MissingJti => {
                -32602
            }
            McpError::Unauthorized(_)
            | McpError::InvalidToken(_)
            | McpError::TokenInvalid(_)
            | McpError::InvalidCredentials => -32001,
            McpError::Disabled | McpError::Forbidden(_) | McpError::TokenNotFound => -32003,
            McpError::Internal(_) => -32603,
        }
    }

    /// Message safe to return to a client. Internal details stay in the logs.
    pub fn client_message(&self) -> String {
        match self {
            McpError::Internal(e) => {
                tracing::error!("Internal error: {:#}", e);
                "internal server error".to_string()
            }
            other => other.to_string(),
        }
    }

    pub fn to_rpc_error(&self) -> JsonRpcError {
        JsonRpcError {
            code: self.rpc_code(),
            message: self.client_message(),
            data: None,
        }
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            McpError::Unauthorized(_)
                | McpError::InvalidCredentials
                | McpError::InvalidToken(_)
                | McpError::TokenInvalid(_)
        )
    }
}

impl IntoResponse for McpError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "code": self.code(),
            "message": self.client_message(),
            "data": { "status": status.as_u16() },
        }));
        (status, body).into_response()
    }
}
