//! Feature registries.
//!
//! Tools, resources and prompts are registered before the server accepts
//! traffic and the registry is frozen afterwards; the engine only ever
//! reads it. Schema-bearing entries compile their JSON Schema once at
//! registration and validate arguments at call time; entries without a
//! schema bypass validation.

use std::collections::HashMap;
use std::sync::Arc;

use jsonschema::Validator;
use serde_json::Value;
use tracing::debug;

use stratomcp_protocol::types::{Prompt, Resource, Tool};

use crate::error::{ServerError, ServerResult};
use crate::handler::{CompletionProvider, PromptHandler, ResourceHandler, ToolHandler};

/// Registered tool
pub struct ToolEntry {
    /// Wire definition
    pub definition: Tool,
    /// Behavior; definition-only entries have none
    pub handler: Option<Arc<dyn ToolHandler>>,
    /// Compiled input schema
    pub validator: Option<Validator>,
}

/// Registered resource
pub struct ResourceEntry {
    /// Wire definition (the URI may be a `{param}` template)
    pub definition: Resource,
    /// Behavior
    pub handler: Option<Arc<dyn ResourceHandler>>,
}

/// Registered prompt
pub struct PromptEntry {
    /// Wire definition
    pub definition: Prompt,
    /// Behavior
    pub handler: Option<Arc<dyn PromptHandler>>,
    /// Compiled argument schema
    pub validator: Option<Validator>,
}

/// Process-wide registries, read-only once the server is serving
#[derive(Default)]
pub struct HandlerRegistry {
    tools: HashMap<String, ToolEntry>,
    resources: HashMap<String, ResourceEntry>,
    prompts: HashMap<String, PromptEntry>,
    prompt_completions: HashMap<String, Arc<dyn CompletionProvider>>,
    resource_completions: HashMap<String, Arc<dyn CompletionProvider>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("tools", &self.tools.len())
            .field("resources", &self.resources.len())
            .field("prompts", &self.prompts.len())
            .finish()
    }
}

impl HandlerRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool; compiles its input schema when present
    pub fn register_tool(
        &mut self,
        definition: Tool,
        handler: Option<Arc<dyn ToolHandler>>,
    ) -> ServerResult<()> {
        let validator = compile_schema(definition.input_schema.as_ref(), &definition.name)?;
        debug!(tool = %definition.name, "registered tool");
        self.tools.insert(
            definition.name.clone(),
            ToolEntry {
                definition,
                handler,
                validator,
            },
        );
        Ok(())
    }

    /// Register a resource keyed by its URI pattern
    pub fn register_resource(
        &mut self,
        definition: Resource,
        handler: Option<Arc<dyn ResourceHandler>>,
    ) {
        debug!(uri = %definition.uri, "registered resource");
        self.resources.insert(
            definition.uri.clone(),
            ResourceEntry {
                definition,
                handler,
            },
        );
    }

    /// Register a prompt with an optional argument schema
    pub fn register_prompt(
        &mut self,
        definition: Prompt,
        handler: Option<Arc<dyn PromptHandler>>,
        argument_schema: Option<Value>,
    ) -> ServerResult<()> {
        let validator = compile_schema(argument_schema.as_ref(), &definition.name)?;
        debug!(prompt = %definition.name, "registered prompt");
        self.prompts.insert(
            definition.name.clone(),
            PromptEntry {
                definition,
                handler,
                validator,
            },
        );
        Ok(())
    }

    /// Register a completion provider for a prompt name
    pub fn register_prompt_completion(
        &mut self,
        name: impl Into<String>,
        provider: Arc<dyn CompletionProvider>,
    ) {
        self.prompt_completions.insert(name.into(), provider);
    }

    /// Register a completion provider for a resource URI pattern
    pub fn register_resource_completion(
        &mut self,
        uri_pattern: impl Into<String>,
        provider: Arc<dyn CompletionProvider>,
    ) {
        self.resource_completions.insert(uri_pattern.into(), provider);
    }

    /// Tool by name
    pub fn tool(&self, name: &str) -> Option<&ToolEntry> {
        self.tools.get(name)
    }

    /// Resource by exact URI, falling back to template matching
    pub fn resource(&self, uri: &str) -> Option<&ResourceEntry> {
        self.resources.get(uri).or_else(|| {
            self.resources
                .values()
                .find(|entry| uri_pattern_matches(&entry.definition.uri, uri))
        })
    }

    /// Prompt by name
    pub fn prompt(&self, name: &str) -> Option<&PromptEntry> {
        self.prompts.get(name)
    }

    /// Completion provider for a prompt name
    pub fn prompt_completion(&self, name: &str) -> Option<&Arc<dyn CompletionProvider>> {
        self.prompt_completions.get(name)
    }

    /// Completion provider for a resource URI pattern
    pub fn resource_completion(&self, uri: &str) -> Option<&Arc<dyn CompletionProvider>> {
        self.resource_completions.get(uri)
    }

    /// All tool definitions
    pub fn list_tools(&self) -> Vec<Tool> {
        let mut tools: Vec<Tool> = self.tools.values().map(|e| e.definition.clone()).collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// All resource definitions
    pub fn list_resources(&self) -> Vec<Resource> {
        let mut resources: Vec<Resource> =
            self.resources.values().map(|e| e.definition.clone()).collect();
        resources.sort_by(|a, b| a.uri.cmp(&b.uri));
        resources
    }

    /// All prompt definitions
    pub fn list_prompts(&self) -> Vec<Prompt> {
        let mut prompts: Vec<Prompt> =
            self.prompts.values().map(|e| e.definition.clone()).collect();
        prompts.sort_by(|a, b| a.name.cmp(&b.name));
        prompts
    }
}

fn compile_schema(schema: Option<&Value>, owner: &str) -> ServerResult<Option<Validator>> {
    match schema {
        Some(schema) => jsonschema::validator_for(schema)
            .map(Some)
            .map_err(|e| ServerError::Configuration(format!("bad schema for '{owner}': {e}"))),
        None => Ok(None),
    }
}

/// Validate `value` against a compiled schema, shaping failures as
/// structured INVALID_PARAMS details
pub fn validate_against(
    validator: &Validator,
    value: &Value,
    what: &str,
) -> ServerResult<()> {
    let errors: Vec<String> = validator
        .iter_errors(value)
        .map(|e| format!("{}: {}", e.instance_path, e))
        .collect();
    if errors.is_empty() {
        return Ok(());
    }
    Err(ServerError::invalid_params_with_details(
        format!("{what} failed schema validation"),
        serde_json::json!({ "errors": errors }),
    ))
}

/// Whether a `{param}`-style URI template matches a concrete URI.
///
/// Template segments of the form `{name}` match one non-empty segment;
/// everything else must match literally.
pub fn uri_pattern_matches(pattern: &str, uri: &str) -> bool {
    if !pattern.contains('{') {
        return pattern == uri;
    }
    let pattern_parts: Vec<&str> = pattern.split('/').collect();
    let uri_parts: Vec<&str> = uri.split('/').collect();
    if pattern_parts.len() != uri_parts.len() {
        return false;
    }
    pattern_parts.iter().zip(uri_parts.iter()).all(|(p, u)| {
        if p.starts_with('{') && p.ends_with('}') {
            !u.is_empty()
        } else {
            p == u
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn template_matching() {
        assert!(uri_pattern_matches("file:///logs/{date}", "file:///logs/2024-01-01"));
        assert!(!uri_pattern_matches("file:///logs/{date}", "file:///logs/"));
        assert!(!uri_pattern_matches(
            "file:///logs/{date}",
            "file:///metrics/2024-01-01"
        ));
        assert!(uri_pattern_matches("config://app", "config://app"));
        assert!(!uri_pattern_matches("config://app", "config://other"));
    }

    #[test]
    fn resource_lookup_falls_back_to_templates() {
        let mut registry = HandlerRegistry::new();
        registry.register_resource(Resource::new("file:///docs/{name}"), None);
        registry.register_resource(Resource::new("config://app"), None);

        assert!(registry.resource("config://app").is_some());
        assert!(registry.resource("file:///docs/readme").is_some());
        assert!(registry.resource("file:///other/readme").is_none());
    }

    #[test]
    fn bad_schema_is_a_configuration_error() {
        let mut registry = HandlerRegistry::new();
        let definition =
            Tool::new("broken").with_input_schema(json!({"type": "not-a-real-type"}));
        assert!(registry.register_tool(definition, None).is_err());
    }

    #[test]
    fn validation_produces_structured_details() {
        let mut registry = HandlerRegistry::new();
        registry
            .register_tool(
                Tool::new("calc").with_input_schema(json!({
                    "type": "object",
                    "properties": {
                        "a": {"type": "number"},
                    },
                    "required": ["a"],
                })),
                None,
            )
            .unwrap();

        let entry = registry.tool("calc").unwrap();
        let validator = entry.validator.as_ref().unwrap();
        assert!(validate_against(validator, &json!({"a": 1}), "arguments").is_ok());

        let err = validate_against(validator, &json!({}), "arguments").unwrap_err();
        match err {
            ServerError::InvalidParams { details, .. } => {
                let errors = details.unwrap();
                assert!(!errors["errors"].as_array().unwrap().is_empty());
            }
            other => panic!("expected InvalidParams, got {other:?}"),
        }
    }

    #[test]
    fn listings_are_sorted() {
        let mut registry = HandlerRegistry::new();
        registry.register_tool(Tool::new("zeta"), None).unwrap();
        registry.register_tool(Tool::new("alpha"), None).unwrap();
        let names: Vec<String> = registry.list_tools().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
