use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use super::registry::RegistrationError;
use super::types::ResourceContent;
use crate::errors::McpError;
use crate::middleware::rbac::Principal;

/// Produces the body of a dynamic resource on each read.
#[async_trait]
pub trait ResourceReader: Send + Sync {
    async fn read(&self, uri: &str, principal: &Principal) -> anyhow::Result<String>;
}

#[derive(Clone)]
pub enum ResourceBody {
    Text(String),
    Reader(Arc<dyn ResourceReader>),
}

#[derive(Clone)]
pub struct Resource {
    pub uri: String,
    pub name: String,
    pub description: Option<String>,
    pub mime_type: Option<String>,
    pub body: ResourceBody,
}

impl Resource {
    pub fn text(uri: impl Into<String>, name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            name: name.into(),
            description: None,
            mime_type: Some("text/plain".to_string()),
            body: ResourceBody::Text(text.into()),
        }
    }

    pub fn reader(uri: impl Into<String>, name: impl Into<String>, reader: Arc<dyn ResourceReader>) -> Self {
        Self {
            uri: uri.into(),
            name: name.into(),
            description: None,
            mime_type: Some("application/json".to_string()),
            body: ResourceBody::Reader(reader),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

#[derive(Debug, Serialize)]
struct ResourceSummary<'a> {
    uri: &'a str,
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    mime_type: Option<&'a str>,
}

#[derive(Default)]
pub struct ResourceRegistry {
    resources: Vec<Resource>,
}

impl ResourceRegistry {
    pub fn register(&mut self, resource: Resource) -> Result<(), RegistrationError> {
        if self.resources.iter().any(|r| r.uri == resource.uri) {
            return Err(RegistrationError::DuplicateResource(resource.uri));
        }
        tracing::debug!(uri = %resource.uri, "resource registered");
        self.resources.push(resource);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Result payload of `resources/list`.
    pub fn list(&self) -> Value {
        let resources: Vec<ResourceSummary<'_>> = self
            .resources
            .iter()
            .map(|r| ResourceSummary {
                uri: &r.uri,
                name: &r.name,
                description: r.description.as_deref(),
                mime_type: r.mime_type.as_deref(),
            })
            .collect();
        json!({ "resources": resources })
    }

    /// Result payload of `resources/read`.
    pub async fn read(&self, uri: &str, principal: &Principal) -> Result<Value, McpError> {
        let resource = self
            .resources
            .iter()
            .find(|r| r.uri == uri)
            .ok_or_else(|| McpError::InvalidRequest(format!("Resource '{}' not found.", uri)))?;

        let text = match &resource.body {
            ResourceBody::Text(text) => text.clone(),
            ResourceBody::Reader(reader) => reader.read(uri, principal).await?,
        };
        let content = ResourceContent {
            uri: resource.uri.clone(),
            text: Some(text),
            mime_type: resource.mime_type.clone(),
        };
        Ok(json!({ "contents": [content] }))
    }
}
