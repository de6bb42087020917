//! Prompt templates served through `prompts/list` and `prompts/get`.
//!
//! Message text may reference arguments as `{{name}}`. Optional arguments
//! that were not supplied render as the empty string.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::registry::RegistrationError;
use crate::errors::McpError;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*(\w+)\s*\}\}").expect("static regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptArgument {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub arguments: Vec<PromptArgument>,
    pub messages: Vec<PromptMessage>,
}

impl Prompt {
    fn check(&self) -> Result<(), RegistrationError> {
        let invalid = |reason: String| RegistrationError::InvalidPrompt {
            name: self.name.clone(),
            reason,
        };
        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty".to_string()));
        }
        if self.messages.is_empty() {
            return Err(invalid("at least one message is required".to_string()));
        }
        if let Some(m) = self.messages.iter().find(|m| m.role != "user" && m.role != "assistant") {
            return Err(invalid(format!("unsupported role '{}'", m.role)));
        }
        Ok(())
    }

    pub fn render(&self, args: &Map<String, Value>) -> Result<Value, McpError> {
        let missing: Vec<&str> = self
            .arguments
            .iter()
            .filter(|a| a.required && !args.contains_key(&a.name))
            .map(|a| a.name.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(McpError::InvalidRequest(format!(
                "Missing required argument(s) for prompt '{}': {}",
                self.name,
                missing.join(", ")
            )));
        }

        let messages: Vec<Value> = self
            .messages
            .iter()
            .map(|m| {
                let text = PLACEHOLDER.replace_all(&m.text, |caps: &regex::Captures<'_>| {
                    match args.get(&caps[1]) {
                        Some(Value::String(s)) => s.clone(),
                        Some(Value::Null) | None => String::new(),
                        Some(other) => other.to_string(),
                    }
                });
                json!({
                    "role": m.role,
                    "content": { "type": "text", "text": text },
                })
            })
            .collect();

        let mut result = json!({ "messages": messages });
        if let Some(description) = &self.description {
            result["description"] = json!(description);
        }
        Ok(result)
    }
}

#[derive(Debug, Default)]
pub struct PromptRegistry {
    prompts: Vec<Prompt>,
}

impl PromptRegistry {
    pub fn register(&mut self, prompt: Prompt) -> Result<(), RegistrationError> {
        prompt.check()?;
        if self.prompts.iter().any(|p| p.name == prompt.name) {
            return Err(RegistrationError::DuplicatePrompt(prompt.name));
        }
        self.prompts.push(prompt);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    pub fn list(&self) -> Value {
        let prompts: Vec<Value> = self
            .prompts
            .iter()
            .map(|p| {
                json!({
                    "name": p.name,
                    "description": p.description,
                    "arguments": p.arguments,
                })
            })
            .collect();
        json!({ "prompts": prompts })
    }

    pub fn get(&self, name: &str, args: &Map<String, Value>) -> Result<Value, McpError> {
        self.prompts
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| McpError::InvalidRequest(format!("Prompt '{}' not found.", name)))?
            .render(args)
    }
}
