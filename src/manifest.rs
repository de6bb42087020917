//! Declarative catalog: rest-alias tools, static resources and prompts loaded
//! from a YAML document, plus the upstream route table they refer to.
//!
//! ```yaml
//! version: "1"
//! routes:
//!   - { method: GET, path: /wp/v2/posts, capability: read }
//! tools:
//!   - name: list_posts
//!     description: List posts
//!     type: read
//!     method: GET
//!     route: /wp/v2/posts
//! ```

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::mcp::catalog::{Initializer, Registrar};
use crate::mcp::prompts::Prompt;
use crate::mcp::registry::RegistrationError;
use crate::mcp::resources::Resource;
use crate::mcp::tool::{Category, ToolDescriptor};
use crate::rest::RouteSpec;

pub const MANIFEST_VERSION: &str = "1";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    #[serde(default)]
    pub routes: Vec<RouteSpec>,
    #[serde(default)]
    pub tools: Vec<ManifestTool>,
    #[serde(default)]
    pub resources: Vec<ManifestResource>,
    #[serde(default)]
    pub prompts: Vec<Prompt>,
}

/// A rest-alias tool. The method is kept as text so an unsupported verb is
/// reported by registration rather than by the YAML parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestTool {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub category: Category,
    pub method: String,
    pub route: String,
    #[serde(default)]
    pub input_schema: Option<Value>,
    #[serde(default)]
    pub output_schema: Option<Value>,
    #[serde(default)]
    pub annotations: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestResource {
    pub uri: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    pub text: String,
}

impl Manifest {
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let manifest: Manifest = serde_yaml::from_str(yaml).context("invalid manifest YAML")?;
        if manifest.version != MANIFEST_VERSION {
            anyhow::bail!(
                "unsupported manifest version '{}' (expected '{}')",
                manifest.version,
                MANIFEST_VERSION
            );
        }
        Ok(manifest)
    }

    pub async fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read manifest {}", path.display()))?;
        let manifest = Self::from_yaml_str(&raw)?;
        tracing::info!(
            path = %path.display(),
            routes = manifest.routes.len(),
            tools = manifest.tools.len(),
            "manifest loaded"
        );
        Ok(manifest)
    }
}

impl Initializer for Manifest {
    fn name(&self) -> &str {
        "manifest"
    }

    fn register(&self, registrar: &mut Registrar) -> Result<(), RegistrationError> {
        for t in &self.tools {
            let mut tool = ToolDescriptor::new(&t.name, &t.description, t.category)
                .rest_alias(&t.method, &t.route);
            if let Some(schema) = &t.input_schema {
                tool = tool.input_schema(schema.clone());
            }
            if let Some(schema) = &t.output_schema {
                tool = tool.output_schema(schema.clone());
            }
            if let Some(annotations) = &t.annotations {
                tool = tool.annotations(annotations.clone());
            }
            registrar.register_tool(tool)?;
        }

        for r in &self.resources {
            let mut resource = Resource::text(&r.uri, &r.name, &r.text);
            if let Some(description) = &r.description {
                resource = resource.with_description(description);
            }
            if let Some(mime_type) = &r.mime_type {
                resource = resource.with_mime_type(mime_type);
            }
            registrar.register_resource(resource)?;
        }

        for p in &self.prompts {
            registrar.register_prompt(p.clone())?;
        }
        Ok(())
    }
}
