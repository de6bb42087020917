use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::mcp::tool::Category;
use crate::store::{self, KvStore};

pub const SETTINGS_KEY: &str = "mcp_settings";
pub const TOOL_STATES_KEY: &str = "mcp_tool_states";

/// Process-wide feature switches, persisted as a single object.
/// Missing keys deserialize to `false`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Global kill switch for both MCP transports.
    pub enabled: bool,
    pub enable_create_tools: bool,
    pub enable_update_tools: bool,
    pub enable_delete_tools: bool,
    /// Experimental: expose generic REST CRUD tools and hide rest-alias tools.
    pub enable_rest_api_crud_tools: bool,
    pub features_adapter_enabled: bool,
}

impl Settings {
    pub async fn load(store: &dyn KvStore) -> anyhow::Result<Self> {
        store::load(store, SETTINGS_KEY).await
    }

    pub async fn save(&self, store: &dyn KvStore) -> anyhow::Result<()> {
        store::save(store, SETTINGS_KEY, self).await
    }

    /// Read tools are always available; the other categories follow their switch.
    pub fn category_enabled(&self, category: Category) -> bool {
        match category {
            Category::Read => true,
            Category::Create => self.enable_create_tools,
            Category::Update => self.enable_update_tools,
            Category::Delete => self.enable_delete_tools,
        }
    }

    /// Set one flag by its persisted name.
    pub fn set_flag(&mut self, name: &str, value: bool) -> anyhow::Result<()> {
        let slot = match name {
            "enabled" => &mut self.enabled,
            "enable_create_tools" => &mut self.enable_create_tools,
            "enable_update_tools" => &mut self.enable_update_tools,
            "enable_delete_tools" => &mut self.enable_delete_tools,
            "enable_rest_api_crud_tools" => &mut self.enable_rest_api_crud_tools,
            "features_adapter_enabled" => &mut self.features_adapter_enabled,
            other => anyhow::bail!("unknown setting '{}'", other),
        };
        *slot = value;
        Ok(())
    }
}

/// Per-tool enable flags. Tools without an entry are enabled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolStates(BTreeMap<String, bool>);

impl ToolStates {
    pub async fn load(store: &dyn KvStore) -> anyhow::Result<Self> {
        store::load(store, TOOL_STATES_KEY).await
    }

    pub async fn save(&self, store: &dyn KvStore) -> anyhow::Result<()> {
        store::save(store, TOOL_STATES_KEY, self).await
    }

    pub fn is_enabled(&self, tool: &str) -> bool {
        self.0.get(tool).copied().unwrap_or(true)
    }

    pub fn set(&mut self, tool: &str, enabled: bool) {
        self.0.insert(tool.to_string(), enabled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    #[test]
    fn test_partial_settings_default_to_false() {
        let s: Settings = serde_json::from_value(serde_json::json!({"enabled": true})).unwrap();
        assert!(s.enabled);
        assert!(!s.enable_create_tools);
        assert!(!s.enable_rest_api_crud_tools);
    }

    #[test]
    fn test_category_enabled() {
        let s = Settings {
            enable_update_tools: true,
            ..Default::default()
        };
        assert!(s.category_enabled(Category::Read));
        assert!(!s.category_enabled(Category::Create));
        assert!(s.category_enabled(Category::Update));
        assert!(!s.category_enabled(Category::Delete));
    }

    #[test]
    fn test_set_flag() {
        let mut s = Settings::default();
        s.set_flag("enable_delete_tools", true).unwrap();
        assert!(s.enable_delete_tools);
        assert!(s.set_flag("enable_everything", true).is_err());
    }

    #[tokio::test]
    async fn test_tool_states_persist() {
        let store = MemoryStore::new();
        let mut states = ToolStates::load(&store).await.unwrap();
        assert!(states.is_enabled("anything"));
        states.set("search_posts", false);
        states.save(&store).await.unwrap();

        let reloaded = ToolStates::load(&store).await.unwrap();
        assert!(!reloaded.is_enabled("search_posts"));
        assert!(reloaded.is_enabled("other"));
    }
}
