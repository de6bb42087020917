//! Generic REST CRUD tools. Only active while `enable_rest_api_crud_tools`
//! is on, in which case they replace the individual rest-alias tools.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::catalog::{Initializer, Registrar};
use super::registry::RegistrationError;
use super::tool::{allow_authenticated, Category, HttpMethod, ToolContext, ToolDescriptor, ToolHandler};
use crate::errors::McpError;
use crate::rest::RestRouter;

#[derive(Debug, Deserialize)]
struct RouteArgs {
    route: String,
    method: String,
    #[serde(default)]
    data: Value,
}

impl RouteArgs {
    fn parse(args: Value) -> Result<(Self, HttpMethod), McpError> {
        let parsed: RouteArgs = serde_json::from_value(args)
            .map_err(|e| McpError::InvalidRequest(format!("Invalid arguments: {}", e)))?;
        let method = parsed.method.parse().map_err(|_| {
            McpError::InvalidRequest(
                "The method must be one of the following: GET, POST, PUT, PATCH, DELETE.".to_string(),
            )
        })?;
        Ok((parsed, method))
    }
}

struct ListFunctions(Arc<dyn RestRouter>);

#[async_trait]
impl ToolHandler for ListFunctions {
    async fn call(&self, _args: Value, _ctx: &ToolContext<'_>) -> anyhow::Result<Value> {
        let routes: Vec<Value> = self
            .0
            .routes()
            .into_iter()
            .map(|r| json!({ "route": r.path, "method": r.method, "description": r.description }))
            .collect();
        Ok(Value::Array(routes))
    }
}

struct FunctionDetails(Arc<dyn RestRouter>);

#[async_trait]
impl ToolHandler for FunctionDetails {
    async fn call(&self, args: Value, _ctx: &ToolContext<'_>) -> anyhow::Result<Value> {
        let (args, method) = RouteArgs::parse(args)?;
        let route = self.0.find(method, &args.route).ok_or_else(|| {
            McpError::InvalidRequest(format!(
                "The route {} with method {} does not exist.",
                args.route, method
            ))
        })?;
        Ok(serde_json::to_value(route)?)
    }
}

struct RunFunction(Arc<dyn RestRouter>);

#[async_trait]
impl ToolHandler for RunFunction {
    async fn call(&self, args: Value, ctx: &ToolContext<'_>) -> anyhow::Result<Value> {
        let (args, method) = RouteArgs::parse(args)?;

        let category = Category::from(method);
        if !ctx.settings.category_enabled(category) {
            return Err(McpError::InvalidRequest(format!(
                "{} operations are currently disabled.",
                category
            ))
            .into());
        }
        if !self.0.has_route(method, &args.route) {
            return Err(McpError::InvalidRequest(format!(
                "The route {} with method {} does not exist.",
                args.route, method
            ))
            .into());
        }
        if !self.0.authorize(method, &args.route, ctx.principal) {
            return Err(McpError::Forbidden("Sorry, you are not allowed to do that.".to_string()).into());
        }

        tracing::info!(method = %method, route = %args.route, user_id = ctx.principal.id, "running REST function");
        let data = match args.data {
            Value::Null => json!({}),
            other => other,
        };
        self.0.dispatch(method, &args.route, data, ctx.principal).await
    }
}

fn route_schema(with_data: bool) -> Value {
    let mut schema = json!({
        "type": "object",
        "properties": {
            "route": { "type": "string", "description": "The route template or concrete path" },
            "method": { "type": "string", "enum": ["GET", "POST", "PUT", "PATCH", "DELETE"] }
        },
        "required": ["route", "method"]
    });
    if with_data {
        schema["properties"]["data"] = json!({ "type": "object", "description": "Request parameters" });
    }
    schema
}

pub struct RestCrudTools {
    routes: Arc<dyn RestRouter>,
}

impl RestCrudTools {
    pub fn new(routes: Arc<dyn RestRouter>) -> Self {
        Self { routes }
    }
}

impl Initializer for RestCrudTools {
    fn name(&self) -> &str {
        "rest_crud"
    }

    fn register(&self, registrar: &mut Registrar) -> Result<(), RegistrationError> {
        registrar.register_tool(
            ToolDescriptor::new(
                "list_api_functions",
                "List the available REST API routes and their methods.",
                Category::Read,
            )
            .callback(Arc::new(ListFunctions(self.routes.clone())), allow_authenticated())
            .annotations(json!({ "readOnlyHint": true }))
            .requires_rest_crud(),
        )?;
        registrar.register_tool(
            ToolDescriptor::new(
                "get_function_details",
                "Get the details of one REST API route.",
                Category::Read,
            )
            .input_schema(route_schema(false))
            .callback(Arc::new(FunctionDetails(self.routes.clone())), allow_authenticated())
            .annotations(json!({ "readOnlyHint": true }))
            .requires_rest_crud(),
        )?;
        registrar.register_tool(
            ToolDescriptor::new(
                "run_api_function",
                "Call a REST API route with the given method and data.",
                Category::Read,
            )
            .input_schema(route_schema(true))
            .callback(Arc::new(RunFunction(self.routes.clone())), allow_authenticated())
            .requires_rest_crud(),
        )
    }
}
