use std::sync::Arc;

use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::errors::McpError;
use crate::middleware::gate::Credentials;
use crate::middleware::rbac::{self, Capability, Principal};
use crate::AppState;

pub mod admin;
pub mod stdio;
pub mod streamable;
pub mod tokens;

pub const STREAMABLE_PATH: &str = "/mcp/streamable";

/// Build the full HTTP surface: both MCP transports, the token endpoints
/// and the administrative API.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route(crate::middleware::gate::MCP_NAMESPACE, post(stdio::handle))
        .merge(streamable::router())
        .route("/auth/v1/token", post(tokens::issue))
        .route("/auth/v1/revoke", post(tokens::revoke))
        .route("/auth/v1/tokens", get(tokens::list))
        .route(
            "/admin/v1/settings",
            get(admin::get_settings).put(admin::update_settings),
        )
        .route("/admin/v1/tools", get(admin::list_tools))
        .route("/admin/v1/tools/:name", put(admin::toggle_tool))
        .fallback(fallback_404)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn fallback_404() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "code": "rest_no_route",
            "message": "No route was found matching the URL and request method.",
            "data": { "status": 404 }
        })),
    )
        .into_response()
}

/// Authenticate with the permissive policy and require the highest
/// administrative privilege. Not gated by the global `enabled` switch.
pub(crate) async fn admin_principal(state: &AppState, headers: &HeaderMap) -> Result<Principal, McpError> {
    let principal = state
        .permissive
        .authenticate(&Credentials::from_headers(headers))
        .await?;
    rbac::require(&principal, Capability::ManageSettings)?;
    Ok(principal)
}
