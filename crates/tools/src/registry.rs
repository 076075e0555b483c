//! `ToolRegistry`: a name → tool map with schema-validated execution.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use agentsdk_domain::error::{Error, Result};
use agentsdk_domain::message::{ToolDescriptor, ToolResult};

use crate::tool::{RequiredFieldsValidator, Tool, Validator};

pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
    validator: Arc<dyn Validator>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
            validator: Arc::new(RequiredFieldsValidator),
        }
    }

    pub fn with_validator(validator: Arc<dyn Validator>) -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
            validator,
        }
    }

    /// Rejects an empty name or a name already registered.
    pub fn register(&self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.name().trim();
        if name.is_empty() {
            return Err(Error::Validation("tool name must not be empty".into()));
        }
        let mut tools = self.tools.write();
        if tools.contains_key(name) {
            return Err(Error::Validation(format!("tool `{name}` is already registered")));
        }
        tools.insert(name.to_string(), tool);
        Ok(())
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.read().values().map(|t| t.descriptor()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.read().contains_key(name)
    }

    /// Looks up `name`, validates `params` against its declared schema (if
    /// non-null), then executes it.
    pub async fn execute(&self, name: &str, params: Value) -> Result<ToolResult> {
        let tool = {
            let tools = self.tools.read();
            tools.get(name).cloned()
        };
        let Some(tool) = tool else {
            return Err(Error::NotFound(format!("tool `{name}` is not registered")));
        };

        let schema = tool.descriptor().input_schema;
        if !schema.is_null() {
            self.validator.validate(&schema, &params)?;
        }

        tool.execute(params).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor {
                name: "echo".into(),
                description: "echoes the `text` field".into(),
                input_schema: serde_json::json!({"required": ["text"]}),
            }
        }
        async fn execute(&self, params: Value) -> Result<ToolResult> {
            let text = params.get("text").and_then(Value::as_str).unwrap_or_default();
            Ok(ToolResult::ok(text))
        }
    }

    #[test]
    fn register_rejects_empty_name() {
        struct Nameless;
        #[async_trait]
        impl Tool for Nameless {
            fn name(&self) -> &str {
                ""
            }
            fn descriptor(&self) -> ToolDescriptor {
                ToolDescriptor { name: "".into(), description: "".into(), input_schema: Value::Null }
            }
            async fn execute(&self, _params: Value) -> Result<ToolResult> {
                Ok(ToolResult::ok(""))
            }
        }
        let registry = ToolRegistry::new();
        assert!(registry.register(Arc::new(Nameless)).is_err());
    }

    #[test]
    fn register_rejects_duplicate_name() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(Echo)).unwrap();
        assert!(registry.register(Arc::new(Echo)).is_err());
    }

    #[tokio::test]
    async fn execute_unknown_tool_fails() {
        let registry = ToolRegistry::new();
        assert!(matches!(registry.execute("missing", Value::Null).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn execute_validates_required_fields_before_running() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(Echo)).unwrap();
        let result = registry.execute("echo", serde_json::json!({})).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn execute_runs_tool_when_params_are_valid() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(Echo)).unwrap();
        let result = registry.execute("echo", serde_json::json!({"text": "hi"})).await.unwrap();
        assert!(result.success);
        assert_eq!(result.output, "hi");
    }
}
