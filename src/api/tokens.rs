//! Token management endpoints.
//!
//!   POST /auth/v1/token   issue a token from credentials or an existing session
//!   POST /auth/v1/revoke  revoke by `jti` (administrators only)
//!   GET  /auth/v1/tokens  list live tokens (administrators only)

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::admin_principal;
use crate::errors::McpError;
use crate::middleware::gate::Credentials;
use crate::middleware::rbac::Principal;
use crate::models::token::{IssuedToken, TokenSummary};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct IssueRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RevokeRequest {
    #[serde(default)]
    pub jti: Option<String>,
}

/// Parse an optional JSON body; an empty body yields the default.
fn parse_body<T: Default + serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, McpError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| McpError::InvalidParam(format!("Invalid parameter(s): {}", e)))
}

async fn issuing_principal(
    state: &AppState,
    headers: &HeaderMap,
    req: &IssueRequest,
) -> Result<Principal, McpError> {
    let directory = state.tokens.directory();
    match (req.username.as_deref(), req.password.as_deref()) {
        (Some(login), Some(password)) if !login.is_empty() => directory
            .verify_password(login, password)
            .await?
            .ok_or(McpError::InvalidCredentials),
        _ => {
            let Some(session) = Credentials::from_headers(headers).session else {
                return Err(McpError::InvalidCredentials);
            };
            directory
                .resolve_session(&session)
                .await?
                .ok_or(McpError::InvalidCredentials)
        }
    }
}

pub async fn issue(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<IssuedToken>, McpError> {
    let req: IssueRequest = parse_body(&body)?;
    let principal = issuing_principal(&state, &headers, &req).await.map_err(|e| {
        tracing::warn!(user = ?req.username, "token issuance refused");
        e
    })?;
    let issued = state.tokens.issue(principal.id, req.expires_in).await?;
    Ok(Json(issued))
}

pub async fn revoke(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, McpError> {
    let caller = admin_principal(&state, &headers).await?;
    let req: RevokeRequest = parse_body(&body)?;
    let jti = req.jti.unwrap_or_default();
    state.tokens.revoke(&jti).await?;
    tracing::info!(jti = %jti, revoked_by = caller.id, "token revoked via API");
    Ok(Json(json!({
        "success": true,
        "message": "Token revoked successfully.",
    })))
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<TokenSummary>>, McpError> {
    let caller = state
        .permissive
        .authenticate(&Credentials::from_headers(&headers))
        .await?;
    Ok(Json(state.tokens.list(&caller).await?))
}
