//! One-time catalog construction.
//!
//! Settings are loaded first so initializers can read them, then every
//! initializer registers its tools, resources and prompts on a [`Registrar`].
//! Finishing the registrar consumes it, so nothing can be registered once
//! the catalog is serving.

use std::sync::Arc;

use anyhow::Context;

use super::prompts::{Prompt, PromptRegistry};
use super::registry::{RegistrationError, ToolRegistry, ToolRegistryBuilder};
use super::resources::{Resource, ResourceRegistry};
use super::tool::ToolDescriptor;
use crate::models::settings::Settings;
use crate::rest::RestRouter;
use crate::store::KvStore;

/// A source of tools, resources or prompts.
pub trait Initializer: Send + Sync {
    fn name(&self) -> &str;

    fn register(&self, registrar: &mut Registrar) -> Result<(), RegistrationError>;
}

pub struct Registrar {
    settings: Settings,
    tools: ToolRegistryBuilder,
    resources: ResourceRegistry,
    prompts: PromptRegistry,
}

impl Registrar {
    pub fn new(settings: Settings, routes: Arc<dyn RestRouter>) -> Self {
        Self {
            settings,
            tools: ToolRegistryBuilder::new(routes),
            resources: ResourceRegistry::default(),
            prompts: PromptRegistry::default(),
        }
    }

    /// Settings as they were when initialization started.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn register_tool(&mut self, tool: ToolDescriptor) -> Result<(), RegistrationError> {
        self.tools.register(tool)
    }

    pub fn register_resource(&mut self, resource: Resource) -> Result<(), RegistrationError> {
        self.resources.register(resource)
    }

    pub fn register_prompt(&mut self, prompt: Prompt) -> Result<(), RegistrationError> {
        self.prompts.register(prompt)
    }

    pub fn finish(self, store: Arc<dyn KvStore>) -> Catalog {
        Catalog {
            tools: self.tools.seal(store),
            resources: self.resources,
            prompts: self.prompts,
        }
    }
}

/// Everything the dispatcher serves. Immutable after construction.
pub struct Catalog {
    pub tools: ToolRegistry,
    pub resources: ResourceRegistry,
    pub prompts: PromptRegistry,
}

impl Catalog {
    pub async fn initialize(
        store: Arc<dyn KvStore>,
        routes: Arc<dyn RestRouter>,
        initializers: &[Arc<dyn Initializer>],
    ) -> anyhow::Result<Self> {
        let settings = Settings::load(store.as_ref())
            .await
            .context("failed to load settings before catalog initialization")?;

        let mut registrar = Registrar::new(settings, routes);
        for init in initializers {
            init.register(&mut registrar)
                .with_context(|| format!("initializer '{}' failed", init.name()))?;
        }

        let catalog = registrar.finish(store);
        tracing::info!(
            tools = catalog.tools.len(),
            resources = catalog.resources.len(),
            prompts = catalog.prompts.len(),
            "MCP catalog initialized"
        );
        Ok(catalog)
    }
}
