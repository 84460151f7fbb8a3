use super::{ApiError, ApiResult};
use crate::config::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use toolbridge_core::{ContentBlock, RpcError, ToolDescriptor};

/// Gateway status
pub async fn status(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(serde_json::json!({
        "service": env!("CARGO_PKG_NAME"),
        "status": "UP",
        "version": env!("CARGO_PKG_VERSION"),
        "upstream": state.upstream,
    }))
}

/// Health check endpoint
pub async fn health_check() -> Json<Value> {
    Json(serde_json::json!({
        "status": "UP",
        "service": env!("CARGO_PKG_NAME"),
        "timestamp": chrono::Utc::now().timestamp_millis(),
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListToolsResponse {
    pub status: String,
    pub tools: Vec<ToolDescriptor>,
    pub count: usize,
}

/// List the upstream tool catalogue
pub async fn list_tools(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<ListToolsResponse>> {
    let tools = state.client.list_tools().await.map_err(ApiError::upstream)?;

    Ok(Json(ListToolsResponse {
        status: "success".to_string(),
        count: tools.len(),
        tools,
    }))
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CallOutcome {
    Success {
        result: Option<String>,
        content: Vec<ContentBlock>,
    },
    Failed {
        error: RpcError,
    },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CallToolResponse {
    pub tool: String,
    pub id: Value,
    #[serde(flatten)]
    pub outcome: CallOutcome,
}

/// Invoke one tool with a JSON object of arguments.
///
/// An empty body means no arguments.
pub async fn call_tool(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Bytes,
) -> ApiResult<Json<CallToolResponse>> {
    let arguments = parse_arguments(&body)?;
    tracing::debug!(tool = %name, args = arguments.len(), "Calling tool");

    let invocation = state
        .client
        .call_tool(&name, arguments)
        .await
        .map_err(ApiError::upstream)?;

    let outcome = match invocation.outcome {
        Ok(result) => CallOutcome::Success {
            result: result.first_text().map(str::to_string),
            content: result.content,
        },
        Err(error) => {
            tracing::warn!(tool = %name, code = error.code.as_str(), "Tool call failed");
            CallOutcome::Failed { error }
        }
    };

    Ok(Json(CallToolResponse {
        tool: name,
        id: serde_json::to_value(&invocation.id)?,
        outcome,
    }))
}

fn parse_arguments(body: &[u8]) -> ApiResult<Map<String, Value>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }

    match serde_json::from_slice::<Value>(body).map_err(ApiError::bad_request)? {
        Value::Object(arguments) => Ok(arguments),
        other => Err(ApiError::bad_request(anyhow::anyhow!(
            "Tool arguments must be a JSON object, got {}",
            kind(&other)
        ))),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
