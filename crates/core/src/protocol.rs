// Wire envelope shared by every transport binding (JSON-RPC flavoured)

use crate::types::{CallToolResult, ToolDescriptor};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const JSONRPC_VERSION: &str = "2.0";

/// Method names understood by the dispatcher
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const PING: &str = "ping";
    pub const LIST_TOOLS: &str = "listTools";
    pub const CALL_TOOL: &str = "callTool";
    /// MCP-style aliases
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";
}

/// Request correlation token, echoed verbatim on the response.
///
/// Numbers keep their JSON form, so fractional and out-of-`i64` ids survive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(serde_json::Number),
    String(String),
}

impl RequestId {
    /// Recover an id from an arbitrary JSON value, if it has the right shape
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => Some(Self::Number(n.clone())),
            serde_json::Value::String(s) => Some(Self::String(s.clone())),
            _ => None,
        }
    }
}

impl From<i64> for RequestId {
    fn from(id: i64) -> Self {
        Self::Number(id.into())
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self::String(id.to_string())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::String(s) => write!(f, "{}", s),
        }
    }
}

fn default_version() -> String {
    JSONRPC_VERSION.to_string()
}

/// Request envelope: `{id, method, params}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl RpcRequest {
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: default_version(),
            id: Some(id.into()),
            method: method.into(),
            params,
        }
    }

    pub fn notification(method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: default_version(),
            id: None,
            method: method.into(),
            params,
        }
    }

    pub fn list_tools(id: impl Into<RequestId>) -> Self {
        Self::new(id, methods::LIST_TOOLS, None)
    }

    pub fn call_tool(id: impl Into<RequestId>, params: &CallToolParams) -> serde_json::Result<Self> {
        Ok(Self::new(id, methods::CALL_TOOL, Some(serde_json::to_value(params)?)))
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// Response envelope: `{id, result}` or `{id, error}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<RequestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn success(id: Option<RequestId>, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: default_version(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<RequestId>, error: RpcError) -> Self {
        Self {
            jsonrpc: default_version(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Build a response from a dispatcher outcome
    pub fn from_outcome(id: Option<RequestId>, outcome: Result<serde_json::Value, RpcError>) -> Self {
        match outcome {
            Ok(result) => Self::success(id, result),
            Err(error) => Self::error(id, error),
        }
    }

    /// Collapse the envelope into exactly one of result or error.
    ///
    /// An envelope carrying both prefers the error; one carrying neither is
    /// reported as a parse error.
    pub fn into_outcome(self) -> Result<serde_json::Value, RpcError> {
        match (self.result, self.error) {
            (_, Some(error)) => Err(error),
            (Some(result), None) => Ok(result),
            (None, None) => Err(RpcError::parse_error("response carries neither result nor error")),
        }
    }
}

/// Error taxonomy carried on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ToolNotFound,
    InvalidArgument,
    ToolExecutionError,
    ParseError,
    MethodNotFound,
    TransportError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ToolNotFound => "TOOL_NOT_FOUND",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::ToolExecutionError => "TOOL_EXECUTION_ERROR",
            Self::ParseError => "PARSE_ERROR",
            Self::MethodNotFound => "METHOD_NOT_FOUND",
            Self::TransportError => "TRANSPORT_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error payload: `{code, message}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: ErrorCode,
    pub message: String,
}

impl RpcError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn tool_not_found(name: &str) -> Self {
        Self::new(ErrorCode::ToolNotFound, format!("Tool not found: {}", name))
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ToolExecutionError, message)
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ParseError, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(ErrorCode::MethodNotFound, format!("Method not found: {}", method))
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::TransportError, message)
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for RpcError {}

/// `callTool` params
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallToolParams {
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

/// `listTools` result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListToolsResult {
    pub tools: Vec<ToolDescriptor>,
}

/// `initialize` result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
    pub capabilities: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

/// Correlated outcome of one tool invocation.
///
/// Exactly one of success or failure is populated; the `Result` makes the
/// other two states unrepresentable.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationResult {
    pub id: RequestId,
    pub outcome: Result<CallToolResult, RpcError>,
}

impl InvocationResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Text of the first content block on success
    pub fn text(&self) -> Option<&str> {
        self.outcome.as_ref().ok().and_then(CallToolResult::first_text)
    }

    pub fn error(&self) -> Option<&RpcError> {
        self.outcome.as_ref().err()
    }
}
