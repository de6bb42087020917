//! Tool registry: registration-time validation, policy-filtered listing,
//! and invocation.
//!
//! Tools are registered on a [`ToolRegistryBuilder`] during catalog
//! initialization and then sealed into an immutable [`ToolRegistry`]. The
//! only runtime mutation is the persisted per-tool enable flag.

use std::collections::HashMap;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use jsonschema::JSONSchema;
use serde_json::{json, Value};
use thiserror::Error;

use super::tool::{Category, HttpMethod, Invocation, ToolContext, ToolDescriptor};
use super::types::{CallToolResult, McpContent, ToolSummary};
use crate::errors::McpError;
use crate::middleware::rbac::Principal;
use crate::models::settings::{Settings, ToolStates};
use crate::rest::RestRouter;
use crate::store::KvStore;

/// Misconfiguration detected while building the catalog. Fatal at startup.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("Tool name '{0}' must be non-empty and contain no whitespace.")]
    InvalidName(String),

    #[error("A tool named '{0}' is already registered.")]
    Duplicate(String),

    #[error("Tool '{0}' defines both a callback and a REST alias.")]
    ConflictingInvocation(String),

    #[error("Tool '{0}' must define either a callback or a REST alias.")]
    MissingInvocation(String),

    #[error("Tool '{0}' has a callback but no permission check.")]
    MissingPermission(String),

    #[error("The method must be one of the following: GET, POST, PUT, PATCH, DELETE.")]
    InvalidMethod(String),

    #[error("The route {route} with method {method} does not exist.")]
    UnknownRoute { method: HttpMethod, route: String },

    #[error("Invalid schema for tool '{name}': {reason}")]
    InvalidSchema { name: String, reason: String },

    #[error("A resource with URI '{0}' is already registered.")]
    DuplicateResource(String),

    #[error("A prompt named '{0}' is already registered.")]
    DuplicatePrompt(String),

    #[error("Prompt '{name}' is invalid: {reason}")]
    InvalidPrompt { name: String, reason: String },

    #[error("Feature '{id}' has unsupported type '{kind}'.")]
    UnsupportedFeatureType { id: String, kind: String },
}

/// A sealed, validated tool.
pub struct Tool {
    pub name: String,
    pub description: String,
    pub category: Category,
    pub input_schema: Value,
    pub output_schema: Option<Value>,
    pub annotations: Option<Value>,
    pub invocation: Invocation,
    pub disabled_by_rest_crud: bool,
    pub requires_rest_crud: bool,
    validator: JSONSchema,
}

impl Tool {
    fn summary(&self) -> ToolSummary {
        ToolSummary {
            name: self.name.clone(),
            description: self.description.clone(),
            category: self.category,
            input_schema: self.input_schema.clone(),
            output_schema: self.output_schema.clone(),
            annotations: self.annotations.clone(),
            tool_enabled: None,
            tool_type_enabled: None,
        }
    }

    /// True when the REST CRUD switch hides this tool.
    fn hidden_by_rest_crud(&self, settings: &Settings) -> bool {
        if settings.enable_rest_api_crud_tools {
            self.invocation.is_aliased() || self.disabled_by_rest_crud
        } else {
            self.requires_rest_crud
        }
    }

    fn validate_args(&self, args: &Value) -> Result<(), McpError> {
        let missing: Vec<&str> = self
            .input_schema
            .get("required")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .filter(|field| args.get(field).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(McpError::InvalidRequest(format!(
                "Missing required parameter(s): {}",
                missing.join(", ")
            )));
        }

        if let Err(errors) = self.validator.validate(args) {
            let reasons: Vec<String> = errors.map(|e| e.to_string()).collect();
            return Err(McpError::InvalidRequest(format!(
                "Invalid arguments for tool '{}': {}",
                self.name,
                reasons.join("; ")
            )));
        }
        Ok(())
    }
}

fn compile_schema(name: &str, schema: &Value) -> Result<JSONSchema, RegistrationError> {
    if !schema.is_object() {
        return Err(RegistrationError::InvalidSchema {
            name: name.to_string(),
            reason: "schema must be a JSON object".to_string(),
        });
    }
    JSONSchema::compile(schema).map_err(|e| RegistrationError::InvalidSchema {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

/// Registration window for tools. Consumed by [`ToolRegistryBuilder::seal`].
pub struct ToolRegistryBuilder {
    tools: Vec<Tool>,
    routes: Arc<dyn RestRouter>,
}

impl ToolRegistryBuilder {
    pub fn new(routes: Arc<dyn RestRouter>) -> Self {
        Self {
            tools: Vec::new(),
            routes,
        }
    }

    pub fn register(&mut self, d: ToolDescriptor) -> Result<(), RegistrationError> {
        if d.name.is_empty() || d.name.chars().any(char::is_whitespace) {
            return Err(RegistrationError::InvalidName(d.name));
        }
        if self.tools.iter().any(|t| t.name == d.name) {
            return Err(RegistrationError::Duplicate(d.name));
        }

        let invocation = match (d.handler, d.rest_alias) {
            (Some(_), Some(_)) => return Err(RegistrationError::ConflictingInvocation(d.name)),
            (None, None) => return Err(RegistrationError::MissingInvocation(d.name)),
            (Some(handler), None) => {
                let Some(permission) = d.permission else {
                    return Err(RegistrationError::MissingPermission(d.name));
                };
                Invocation::Direct {
                    handler,
                    permission,
                }
            }
            (None, Some(alias)) => {
                let method: HttpMethod = alias
                    .method
                    .parse()
                    .map_err(RegistrationError::InvalidMethod)?;
                if !self.routes.has_route(method, &alias.route) {
                    return Err(RegistrationError::UnknownRoute {
                        method,
                        route: alias.route,
                    });
                }
                Invocation::Aliased {
                    method,
                    route: alias.route,
                }
            }
        };

        let validator = compile_schema(&d.name, &d.input_schema)?;
        if let Some(output) = &d.output_schema {
            compile_schema(&d.name, output)?;
        }

        tracing::debug!(tool = %d.name, category = %d.category, aliased = invocation.is_aliased(), "tool registered");

        self.tools.push(Tool {
            name: d.name,
            description: d.description,
            category: d.category,
            input_schema: d.input_schema,
            output_schema: d.output_schema,
            annotations: d.annotations,
            invocation,
            disabled_by_rest_crud: d.disabled_by_rest_crud,
            requires_rest_crud: d.requires_rest_crud,
            validator,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn seal(self, store: Arc<dyn KvStore>) -> ToolRegistry {
        let index = self
            .tools
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.clone(), i))
            .collect();
        ToolRegistry {
            tools: self.tools,
            index,
            routes: self.routes,
            store,
        }
    }
}

pub struct ToolRegistry {
    tools: Vec<Tool>,
    index: HashMap<String, usize>,
    routes: Arc<dyn RestRouter>,
    store: Arc<dyn KvStore>,
}

impl ToolRegistry {
    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn routes(&self) -> &Arc<dyn RestRouter> {
        &self.routes
    }

    fn is_active(tool: &Tool, settings: &Settings, states: &ToolStates) -> bool {
        settings.category_enabled(tool.category)
            && states.is_enabled(&tool.name)
            && !tool.hidden_by_rest_crud(settings)
    }

    /// Policy-filtered listing. With `include_disabled`, every tool is
    /// returned and annotated with its live state instead.
    pub fn summaries(&self, settings: &Settings, states: &ToolStates, include_disabled: bool) -> Vec<ToolSummary> {
        self.tools
            .iter()
            .filter_map(|tool| {
                if include_disabled {
                    let mut summary = tool.summary();
                    summary.tool_enabled =
                        Some(states.is_enabled(&tool.name) && !tool.hidden_by_rest_crud(settings));
                    summary.tool_type_enabled = Some(settings.category_enabled(tool.category));
                    Some(summary)
                } else if Self::is_active(tool, settings, states) {
                    Some(tool.summary())
                } else {
                    None
                }
            })
            .collect()
    }

    pub async fn list(&self, include_disabled: bool) -> anyhow::Result<Vec<ToolSummary>> {
        let settings = Settings::load(self.store.as_ref()).await?;
        let states = ToolStates::load(self.store.as_ref()).await?;
        Ok(self.summaries(&settings, &states, include_disabled))
    }

    pub async fn invoke(&self, name: &str, args: Value, principal: &Principal) -> Result<CallToolResult, McpError> {
        let tool = self
            .get(name)
            .ok_or_else(|| McpError::InvalidRequest(format!("Tool '{}' not found.", name)))?;

        let settings = Settings::load(self.store.as_ref()).await?;
        if !settings.category_enabled(tool.category) {
            return Err(McpError::InvalidRequest(format!(
                "Tools of type '{}' are currently disabled.",
                tool.category
            )));
        }
        let states = ToolStates::load(self.store.as_ref()).await?;
        if !Self::is_active(tool, &settings, &states) {
            return Err(McpError::InvalidRequest(format!("Tool '{}' is disabled.", name)));
        }

        let permitted = match &tool.invocation {
            Invocation::Direct { permission, .. } => permission(principal),
            Invocation::Aliased { method, route } => self.routes.authorize(*method, route, principal),
        };
        if !permitted {
            tracing::warn!(tool = %name, user_id = principal.id, "tool permission denied");
            return Err(McpError::Forbidden(
                "Sorry, you are not allowed to use this tool.".to_string(),
            ));
        }

        let args = match args {
            Value::Null => json!({}),
            other => other,
        };
        tool.validate_args(&args)?;

        let outcome = match &tool.invocation {
            Invocation::Direct { handler, .. } => {
                let ctx = ToolContext {
                    principal,
                    settings: &settings,
                };
                handler.call(args, &ctx).await
            }
            Invocation::Aliased { method, route } => {
                self.routes.dispatch(*method, route, args, principal).await
            }
        };

        match outcome {
            Ok(raw) => {
                tracing::info!(tool = %name, user_id = principal.id, "tool call succeeded");
                Ok(CallToolResult::single(wrap_content(raw)))
            }
            Err(e) => match e.downcast::<McpError>() {
                Ok(protocol_error) => Err(protocol_error),
                Err(e) => {
                    tracing::warn!(tool = %name, error = %e, "tool call failed");
                    Ok(CallToolResult::failure(format!("{:#}", e)))
                }
            },
        }
    }

    /// Persist the per-tool enable flag.
    pub async fn toggle(&self, name: &str, enabled: bool) -> Result<(), McpError> {
        if self.get(name).is_none() {
            return Err(McpError::InvalidRequest(format!("Tool '{}' not found.", name)));
        }
        let mut states = ToolStates::load(self.store.as_ref()).await?;
        states.set(name, enabled);
        states.save(self.store.as_ref()).await?;
        tracing::info!(tool = %name, enabled, "tool toggled");
        Ok(())
    }
}

/// Wrap a raw callback result into exactly one content item.
///
/// `{type: "image", data|results, mimeType}` becomes an image item with the
/// payload base64-encoded; anything else is JSON-encoded as text.
pub fn wrap_content(raw: Value) -> McpContent {
    if raw.get("type").and_then(Value::as_str) == Some("image") {
        let payload = raw
            .get("data")
            .or_else(|| raw.get("results"))
            .and_then(Value::as_str);
        if let Some(payload) = payload {
            let mime_type = raw
                .get("mimeType")
                .and_then(Value::as_str)
                .unwrap_or("image/png")
                .to_string();
            return McpContent::Image {
                data: STANDARD.encode(payload.as_bytes()),
                mime_type,
            };
        }
    }
    McpContent::Text {
        text: raw.to_string(),
    }
}
