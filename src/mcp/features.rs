//! Mirrors an external feature catalog into the tool registry.

use std::sync::Arc;

use serde_json::Value;

use super::catalog::{Initializer, Registrar};
use super::registry::RegistrationError;
use super::tool::{Category, PermissionCheck, ToolDescriptor, ToolHandler};

pub const FEATURE_TOOL_PREFIX: &str = "wp_feature_";

/// One externally declared feature.
#[derive(Clone)]
pub struct FeatureDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
    /// `resource`, `read`, `create`, `update` or `delete`.
    pub kind: String,
    pub input_schema: Option<Value>,
    pub output_schema: Option<Value>,
    pub callback: Arc<dyn ToolHandler>,
    pub permission: PermissionCheck,
}

/// Source of external features.
pub trait FeatureCatalog: Send + Sync {
    fn features(&self) -> Vec<FeatureDescriptor>;
}

/// A fixed list of features, for hosts that build their catalog up front.
#[derive(Clone, Default)]
pub struct StaticFeatures(pub Vec<FeatureDescriptor>);

impl FeatureCatalog for StaticFeatures {
    fn features(&self) -> Vec<FeatureDescriptor> {
        self.0.clone()
    }
}

/// Tool name for a feature: the prefix followed by the feature id as given.
pub fn feature_tool_name(id: &str) -> String {
    format!("{}{}", FEATURE_TOOL_PREFIX, id)
}

fn feature_category(feature: &FeatureDescriptor) -> Result<Category, RegistrationError> {
    match feature.kind.as_str() {
        "resource" => Ok(Category::Read),
        kind => kind
            .parse()
            .map_err(|kind| RegistrationError::UnsupportedFeatureType {
                id: feature.id.clone(),
                kind,
            }),
    }
}

pub struct FeatureAdapter {
    source: Arc<dyn FeatureCatalog>,
}

impl FeatureAdapter {
    pub fn new(source: Arc<dyn FeatureCatalog>) -> Self {
        Self { source }
    }

    pub fn descriptor(feature: FeatureDescriptor) -> Result<ToolDescriptor, RegistrationError> {
        let category = feature_category(&feature)?;
        let description = if feature.description.is_empty() {
            feature.name.clone()
        } else {
            feature.description.clone()
        };
        let mut tool = ToolDescriptor::new(feature_tool_name(&feature.id), description, category)
            .callback(feature.callback, feature.permission);
        if let Some(schema) = feature.input_schema {
            tool = tool.input_schema(schema);
        }
        if let Some(schema) = feature.output_schema {
            tool = tool.output_schema(schema);
        }
        Ok(tool)
    }
}

impl Initializer for FeatureAdapter {
    fn name(&self) -> &str {
        "features"
    }

    fn register(&self, registrar: &mut Registrar) -> Result<(), RegistrationError> {
        if !registrar.settings().features_adapter_enabled {
            tracing::debug!("feature adapter disabled, skipping");
            return Ok(());
        }
        let features = self.source.features();
        let count = features.len();
        for feature in features {
            registrar.register_tool(Self::descriptor(feature)?)?;
        }
        tracing::info!(count, "external features mirrored as tools");
        Ok(())
    }
}
