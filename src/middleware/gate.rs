//! Per-transport authentication policy.
//!
//! The permissive gate accepts a bearer token, an established session or a
//! Basic username/password pair. The strict gate accepts bearer tokens only
//! and additionally requires the highest administrative capability.

use std::sync::Arc;

use axum::http::{header, HeaderMap};
use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::directory::UserDirectory;
use crate::errors::{McpError, MALFORMED_AUTH_MESSAGE, MISSING_AUTH_MESSAGE};
use crate::middleware::rbac::{Capability, Principal};
use crate::models::settings::Settings;
use crate::store::KvStore;
use crate::tokens::TokenService;

/// Path prefix owned by the MCP transports.
pub const MCP_NAMESPACE: &str = "/mcp";
pub const SESSION_COOKIE: &str = "mcp_session";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePolicy {
    Permissive,
    Strict,
}

/// Raw credentials as presented by the client.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub authorization: Option<String>,
    pub session: Option<String>,
}

impl Credentials {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let authorization = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let session = headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == SESSION_COOKIE)
            .map(|(_, value)| value.to_string())
            .filter(|v| !v.is_empty());
        Self {
            authorization,
            session,
        }
    }

    pub fn bearer(token: &str) -> Self {
        Self {
            authorization: Some(format!("Bearer {}", token)),
            session: None,
        }
    }
}

enum AuthHeader<'a> {
    Bearer(&'a str),
    Basic(&'a str),
    Malformed,
}

fn parse_header(value: &str) -> AuthHeader<'_> {
    if let Some(token) = value.strip_prefix("Bearer ") {
        let token = token.trim();
        if token.is_empty() {
            AuthHeader::Malformed
        } else {
            AuthHeader::Bearer(token)
        }
    } else if let Some(encoded) = value.strip_prefix("Basic ") {
        AuthHeader::Basic(encoded.trim())
    } else {
        AuthHeader::Malformed
    }
}

fn decode_basic(encoded: &str) -> Option<(String, String)> {
    let bytes = STANDARD.decode(encoded).ok()?;
    let text = String::from_utf8(bytes).ok()?;
    let (user, pass) = text.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

pub fn is_mcp_path(path: &str) -> bool {
    path == MCP_NAMESPACE || path.starts_with("/mcp/")
}

#[derive(Clone)]
pub struct AuthenticationGate {
    policy: GatePolicy,
    store: Arc<dyn KvStore>,
    tokens: TokenService,
    directory: Arc<dyn UserDirectory>,
}

impl AuthenticationGate {
    pub fn new(policy: GatePolicy, store: Arc<dyn KvStore>, tokens: TokenService) -> Self {
        let directory = tokens.directory().clone();
        Self {
            policy,
            store,
            tokens,
            directory,
        }
    }

    /// Fails with `mcp_disabled` when the global switch is off.
    pub async fn ensure_enabled(&self) -> Result<(), McpError> {
        if Settings::load(self.store.as_ref()).await?.enabled {
            Ok(())
        } else {
            Err(McpError::Disabled)
        }
    }

    /// Full permission check for a request to `path`.
    ///
    /// Returns `Ok(None)` when the path is outside the MCP namespace.
    pub async fn check(&self, path: &str, creds: &Credentials) -> Result<Option<Principal>, McpError> {
        if !is_mcp_path(path) {
            return Ok(None);
        }
        self.ensure_enabled().await?;
        self.authenticate(creds).await.map(Some)
    }

    /// Establish the principal without consulting the global switch.
    pub async fn authenticate(&self, creds: &Credentials) -> Result<Principal, McpError> {
        match self.policy {
            GatePolicy::Permissive => self.authenticate_permissive(creds).await,
            GatePolicy::Strict => self.authenticate_strict(creds).await,
        }
    }

    async fn authenticate_permissive(&self, creds: &Credentials) -> Result<Principal, McpError> {
        match creds.authorization.as_deref().map(parse_header) {
            Some(AuthHeader::Bearer(token)) => self.tokens.validate(token).await,
            Some(AuthHeader::Basic(encoded)) => {
                let (login, password) = decode_basic(encoded)
                    .ok_or_else(|| McpError::Unauthorized(MALFORMED_AUTH_MESSAGE.to_string()))?;
                self.directory
                    .verify_password(&login, &password)
                    .await?
                    .ok_or(McpError::InvalidCredentials)
            }
            Some(AuthHeader::Malformed) => {
                Err(McpError::Unauthorized(MALFORMED_AUTH_MESSAGE.to_string()))
            }
            None => match creds.session.as_deref() {
                Some(session) => self
                    .directory
                    .resolve_session(session)
                    .await?
                    .ok_or_else(|| McpError::Unauthorized(MISSING_AUTH_MESSAGE.to_string())),
                None => Err(McpError::Unauthorized(MISSING_AUTH_MESSAGE.to_string())),
            },
        }
    }

    async fn authenticate_strict(&self, creds: &Credentials) -> Result<Principal, McpError> {
        let principal = match creds.authorization.as_deref().map(parse_header) {
            Some(AuthHeader::Bearer(token)) => self.tokens.validate(token).await?,
            Some(AuthHeader::Basic(_)) => {
                tracing::warn!("credential-pair authentication attempted on strict transport");
                return Err(McpError::Unauthorized(
                    "Username/password authentication is not accepted on this endpoint. Use a Bearer token."
                        .to_string(),
                ));
            }
            Some(AuthHeader::Malformed) => {
                return Err(McpError::Unauthorized(MALFORMED_AUTH_MESSAGE.to_string()))
            }
            None => {
                return Err(McpError::Unauthorized(
                    "Authentication required. Please provide a Bearer token.".to_string(),
                ))
            }
        };

        if !principal.can(Capability::ManageSettings) {
            tracing::warn!(user_id = principal.id, "non-administrator rejected by strict transport");
            return Err(McpError::Forbidden(
                "Administrator privileges are required to use this endpoint.".to_string(),
            ));
        }
        Ok(principal)
    }
}
