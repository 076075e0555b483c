//! The `Tool` capability trait: anything the registry can execute.

use async_trait::async_trait;
use serde_json::Value;

use agentsdk_domain::error::{Error, Result};
use agentsdk_domain::message::{ToolDescriptor, ToolResult};

/// One callable capability. Implementors describe themselves via
/// [`Tool::descriptor`] and run via [`Tool::execute`].
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn descriptor(&self) -> ToolDescriptor;
    async fn execute(&self, params: Value) -> Result<ToolResult>;
}

/// Validates a tool call's params against the tool's declared schema before
/// `execute` runs. Swappable so callers can plug in a real JSON Schema
/// validator without this crate depending on one directly.
pub trait Validator: Send + Sync {
    fn validate(&self, schema: &Value, params: &Value) -> Result<()>;
}

/// Accepts anything; used when no schema validation is configured.
pub struct NoopValidator;

impl Validator for NoopValidator {
    fn validate(&self, _schema: &Value, _params: &Value) -> Result<()> {
        Ok(())
    }
}

/// Minimal structural check: confirms `params` is an object containing
/// every property the schema marks `required`. Not a full JSON Schema
/// implementation, but enough to catch missing arguments without pulling in
/// a dedicated crate this workspace doesn't otherwise need.
pub struct RequiredFieldsValidator;

impl Validator for RequiredFieldsValidator {
    fn validate(&self, schema: &Value, params: &Value) -> Result<()> {
        let Some(required) = schema.get("required").and_then(Value::as_array) else {
            return Ok(());
        };
        let obj = params.as_object();
        for field in required {
            let Some(name) = field.as_str() else { continue };
            let present = obj.map(|o| o.contains_key(name)).unwrap_or(false);
            if !present {
                return Err(Error::Validation(format!(
                    "validation failed: missing required field `{name}`"
                )));
            }
        }
        Ok(())
    }
}
