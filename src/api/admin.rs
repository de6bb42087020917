use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::admin_principal;
use crate::errors::McpError;
use crate::models::settings::Settings;
use crate::AppState;

pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Settings>, McpError> {
    admin_principal(&state, &headers).await?;
    Ok(Json(Settings::load(state.store.as_ref()).await?))
}

/// Partial update: only the flags present in the body change.
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(patch): Json<BTreeMap<String, bool>>,
) -> Result<Json<Settings>, McpError> {
    let caller = admin_principal(&state, &headers).await?;
    let mut settings = Settings::load(state.store.as_ref()).await?;
    for (name, value) in &patch {
        settings
            .set_flag(name, *value)
            .map_err(|e| McpError::InvalidParam(format!("Invalid parameter(s): {}", e)))?;
    }
    settings.save(state.store.as_ref()).await?;
    tracing::info!(user_id = caller.id, changed = ?patch.keys().collect::<Vec<_>>(), "settings updated");
    Ok(Json(settings))
}

pub async fn list_tools(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, McpError> {
    admin_principal(&state, &headers).await?;
    let tools = state.dispatcher.catalog().tools.list(true).await?;
    Ok(Json(json!({ "tools": tools })))
}

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub enabled: bool,
}

pub async fn toggle_tool(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Json(req): Json<ToggleRequest>,
) -> Result<Json<Value>, McpError> {
    admin_principal(&state, &headers).await?;
    state.dispatcher.catalog().tools.toggle(&name, req.enabled).await?;
    Ok(Json(json!({ "name": name, "enabled": req.enabled })))
}
