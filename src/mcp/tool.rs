//! Tool descriptors and the invocation variants a tool can carry.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::middleware::rbac::{Capability, Principal};
use crate::models::settings::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Read,
    Create,
    Update,
    Delete,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Read => "read",
            Category::Create => "create",
            Category::Update => "update",
            Category::Delete => "delete",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(Category::Read),
            "create" => Ok(Category::Create),
            "update" => Ok(Category::Update),
            "delete" => Ok(Category::Delete),
            other => Err(other.to_string()),
        }
    }
}

impl From<HttpMethod> for Category {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Category::Read,
            HttpMethod::Post => Category::Create,
            HttpMethod::Put | HttpMethod::Patch => Category::Update,
            HttpMethod::Delete => Category::Delete,
        }
    }
}

/// Methods a rest-alias tool may forward with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            _ => Err(s.to_string()),
        }
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// What a callback sees besides its arguments.
pub struct ToolContext<'a> {
    pub principal: &'a Principal,
    pub settings: &'a Settings,
}

/// A direct tool implementation.
///
/// Returning an error that downcasts to [`crate::errors::McpError`] surfaces
/// it as a protocol error; any other error becomes an `isError` call result.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: Value, ctx: &ToolContext<'_>) -> anyhow::Result<Value>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    async fn call(&self, args: Value, _ctx: &ToolContext<'_>) -> anyhow::Result<Value> {
        (self.0)(args).await
    }
}

/// Wrap an async closure that only needs its arguments.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn ToolHandler>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

pub type PermissionCheck = Arc<dyn Fn(&Principal) -> bool + Send + Sync>;

pub fn allow_authenticated() -> PermissionCheck {
    Arc::new(|_: &Principal| true)
}

pub fn require_capability(cap: Capability) -> PermissionCheck {
    Arc::new(move |p: &Principal| p.can(cap))
}

/// Forward target of a rest-alias tool, as given at registration. The method
/// is validated when the tool is registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestAlias {
    pub method: String,
    pub route: String,
}

/// How a sealed tool runs.
#[derive(Clone)]
pub enum Invocation {
    Direct {
        handler: Arc<dyn ToolHandler>,
        permission: PermissionCheck,
    },
    Aliased {
        method: HttpMethod,
        route: String,
    },
}

impl Invocation {
    pub fn is_aliased(&self) -> bool {
        matches!(self, Invocation::Aliased { .. })
    }
}

/// Registration input for one tool.
#[derive(Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub category: Category,
    pub input_schema: Value,
    pub output_schema: Option<Value>,
    pub annotations: Option<Value>,
    pub handler: Option<Arc<dyn ToolHandler>>,
    pub permission: Option<PermissionCheck>,
    pub rest_alias: Option<RestAlias>,
    pub disabled_by_rest_crud: bool,
    /// Listed and callable only while the REST CRUD switch is on.
    pub requires_rest_crud: bool,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>, category: Category) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            category,
            input_schema: json!({ "type": "object", "properties": {} }),
            output_schema: None,
            annotations: None,
            handler: None,
            permission: None,
            rest_alias: None,
            disabled_by_rest_crud: false,
            requires_rest_crud: false,
        }
    }

    pub fn input_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    pub fn output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn annotations(mut self, annotations: Value) -> Self {
        self.annotations = Some(annotations);
        self
    }

    pub fn callback(mut self, handler: Arc<dyn ToolHandler>, permission: PermissionCheck) -> Self {
        self.handler = Some(handler);
        self.permission = Some(permission);
        self
    }

    pub fn rest_alias(mut self, method: impl Into<String>, route: impl Into<String>) -> Self {
        self.rest_alias = Some(RestAlias {
            method: method.into(),
            route: route.into(),
        });
        self
    }

    pub fn disabled_by_rest_crud(mut self) -> Self {
        self.disabled_by_rest_crud = true;
        self
    }

    pub fn requires_rest_crud(mut self) -> Self {
        self.requires_rest_crud = true;
        self
    }
}
