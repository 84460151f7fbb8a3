// Tool executor: resolve, validate, invoke, wrap

use crate::handler::{ArgValue, ToolArgs, ToolError};
use crate::protocol::RpcError;
use crate::registry::ToolRegistry;
use crate::types::{CallToolResult, ParamType, ToolDescriptor};
use serde_json::{Map, Value};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Raw argument bag as received on the wire
pub type Arguments = Map<String, Value>;

/// Executes registered tools and turns every outcome into a result envelope
#[derive(Debug, Clone)]
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Execute `name` with `arguments`.
    ///
    /// Never fails at the Rust level: unknown tools, bad arguments, domain
    /// errors and handler panics all come back as an `RpcError`.
    pub fn execute(&self, name: &str, arguments: &Arguments) -> Result<CallToolResult, RpcError> {
        let tool = self.registry.get(name).ok_or_else(|| {
            tracing::warn!(tool = %name, "Unknown tool requested");
            RpcError::tool_not_found(name)
        })?;

        let args = validate(&tool.descriptor, arguments)?;

        let handler = tool.handler.clone();
        let outcome = catch_unwind(AssertUnwindSafe(|| handler.invoke(&args))).map_err(|panic| {
            let detail = panic_message(&*panic);
            tracing::error!(tool = %name, detail = %detail, "Tool handler panicked");
            RpcError::execution(format!("Tool '{}' failed unexpectedly: {}", name, detail))
        })?;

        match outcome {
            Ok(output) => {
                tracing::debug!(tool = %name, "Tool executed");
                Ok(CallToolResult::text(output.render()))
            }
            Err(ToolError::Domain(message)) => {
                tracing::warn!(tool = %name, error = %message, "Tool reported failure");
                Err(RpcError::execution(message))
            }
            Err(ToolError::InvalidArgument(message)) => Err(RpcError::invalid_argument(message)),
        }
    }
}

/// Check `arguments` against the descriptor and convert to typed values
pub fn validate(descriptor: &ToolDescriptor, arguments: &Arguments) -> Result<ToolArgs, RpcError> {
    let mut args = ToolArgs::new();

    for spec in &descriptor.parameters {
        let value = match arguments.get(&spec.name) {
            None | Some(Value::Null) => {
                if spec.required {
                    return Err(RpcError::invalid_argument(format!(
                        "Missing required parameter '{}' for tool '{}'",
                        spec.name, descriptor.name
                    )));
                }
                continue;
            }
            Some(value) => value,
        };

        let converted = match spec.param_type {
            ParamType::Number => to_number(value),
            ParamType::String => to_text(value),
        }
        .ok_or_else(|| {
            RpcError::invalid_argument(format!(
                "Parameter '{}' of tool '{}' must be a {}",
                spec.name, descriptor.name, spec.param_type
            ))
        })?;

        args.insert(spec.name.clone(), converted);
    }

    Ok(args)
}

fn to_number(value: &Value) -> Option<ArgValue> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    // "NaN" and "inf" parse as f64 but are not usable numbers
    .filter(|n| n.is_finite())
    .map(ArgValue::Number)
}

fn to_text(value: &Value) -> Option<ArgValue> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
    .map(ArgValue::Text)
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
