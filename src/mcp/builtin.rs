//! Tools and features the gateway ships with regardless of manifest.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::catalog::{Initializer, Registrar};
use super::features::{FeatureDescriptor, StaticFeatures};
use super::registry::RegistrationError;
use super::tool::{allow_authenticated, handler_fn, Category, ToolContext, ToolDescriptor, ToolHandler};

struct CurrentUser;

#[async_trait]
impl ToolHandler for CurrentUser {
    async fn call(&self, _args: Value, ctx: &ToolContext<'_>) -> anyhow::Result<Value> {
        let mut capabilities: Vec<&_> = ctx.principal.capabilities().collect();
        capabilities.sort_by_key(|c| format!("{:?}", c));
        Ok(json!({
            "id": ctx.principal.id,
            "username": ctx.principal.login,
            "display_name": ctx.principal.display_name,
            "role": ctx.principal.role,
            "capabilities": capabilities,
        }))
    }
}

pub struct CoreTools;

impl Initializer for CoreTools {
    fn name(&self) -> &str {
        "core"
    }

    fn register(&self, registrar: &mut Registrar) -> Result<(), RegistrationError> {
        registrar.register_tool(
            ToolDescriptor::new(
                "get_current_user",
                "Return the authenticated user and their capabilities.",
                Category::Read,
            )
            .callback(Arc::new(CurrentUser), allow_authenticated())
            .annotations(json!({ "readOnlyHint": true })),
        )
    }
}

/// Gateway self-description, exposed through the feature adapter.
pub fn gateway_features() -> StaticFeatures {
    StaticFeatures(vec![FeatureDescriptor {
        id: "gateway/info".to_string(),
        name: "Gateway information".to_string(),
        description: "Name and version of this gateway.".to_string(),
        kind: "resource".to_string(),
        input_schema: None,
        output_schema: Some(json!({
            "type": "object",
            "properties": {
                "name": { "type": "string" },
                "version": { "type": "string" }
            }
        })),
        callback: handler_fn(|_| async {
            Ok(json!({
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            }))
        }),
        permission: allow_authenticated(),
    }])
}
