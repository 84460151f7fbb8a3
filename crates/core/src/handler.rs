// Handler contract between the executor and tool providers

use std::collections::HashMap;

/// Failure raised by a tool handler
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    /// Domain-level failure (divide by zero, missing file, ...).
    /// The message is forwarded to the caller verbatim.
    #[error("{0}")]
    Domain(String),

    /// Arguments did not match what the handler needs
    #[error("{0}")]
    InvalidArgument(String),
}

impl ToolError {
    pub fn domain(message: impl Into<String>) -> Self {
        Self::Domain(message.into())
    }
}

/// Argument value after schema validation
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Number(f64),
    Text(String),
}

/// Validated arguments handed to a handler
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArgs {
    values: HashMap<String, ArgValue>,
}

impl ToolArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: ArgValue) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ArgValue) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Fetch a number argument
    pub fn number(&self, name: &str) -> Result<f64, ToolError> {
        match self.values.get(name) {
            Some(ArgValue::Number(n)) => Ok(*n),
            Some(ArgValue::Text(_)) => Err(ToolError::InvalidArgument(format!(
                "Parameter '{}' must be a number",
                name
            ))),
            None => Err(missing(name)),
        }
    }

    /// Fetch a string argument
    pub fn text(&self, name: &str) -> Result<&str, ToolError> {
        match self.values.get(name) {
            Some(ArgValue::Text(s)) => Ok(s),
            Some(ArgValue::Number(_)) => Err(ToolError::InvalidArgument(format!(
                "Parameter '{}' must be a string",
                name
            ))),
            None => Err(missing(name)),
        }
    }
}

fn missing(name: &str) -> ToolError {
    ToolError::InvalidArgument(format!("Missing required parameter '{}'", name))
}

/// Value returned by a handler
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    Number(f64),
    Text(String),
}

impl ToolOutput {
    /// Render as the body of a `text` content block.
    ///
    /// Numbers use the shortest round-trip form, integral values keep a
    /// trailing `.0` (`5.0`, `0.1`, `1e300`, `inf`).
    pub fn render(&self) -> String {
        match self {
            Self::Number(n) => format!("{:?}", n),
            Self::Text(s) => s.clone(),
        }
    }
}

impl From<f64> for ToolOutput {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<String> for ToolOutput {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for ToolOutput {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// Synchronous tool implementation.
///
/// Handlers owning shared state must make themselves safe under concurrent
/// invocation; the executor adds no locking.
pub trait ToolHandler: Send + Sync {
    fn invoke(&self, args: &ToolArgs) -> Result<ToolOutput, ToolError>;
}

impl<F> ToolHandler for F
where
    F: Fn(&ToolArgs) -> Result<ToolOutput, ToolError> + Send + Sync,
{
    fn invoke(&self, args: &ToolArgs) -> Result<ToolOutput, ToolError> {
        (self)(args)
    }
}
